use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Shared flag that asks a running hyperparameter search to stop.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Cancellation flag plus an optional wall-clock deadline, polled by the
/// solver between epochs.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    flag: Option<CancellationFlag>,
    deadline: Option<Instant>,
}

impl StopSignal {
    pub fn never() -> Self {
        Self::default()
    }

    pub fn new(flag: CancellationFlag, deadline: Option<Instant>) -> Self {
        Self {
            flag: Some(flag),
            deadline,
        }
    }

    pub fn should_stop(&self) -> bool {
        self.flag.as_ref().is_some_and(CancellationFlag::is_cancelled)
            || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_flag_is_shared_between_clones() {
        let flag = CancellationFlag::new();
        let signal = StopSignal::new(flag.clone(), None);
        assert!(!signal.should_stop());
        flag.cancel();
        assert!(signal.should_stop());
    }

    #[test]
    fn test_deadline_in_the_past_stops() {
        let past = Instant::now() - Duration::from_millis(1);
        assert!(StopSignal::new(CancellationFlag::new(), Some(past)).should_stop());
        assert!(!StopSignal::never().should_stop());
    }
}
