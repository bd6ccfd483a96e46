use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A candidate row with a cost (lower is better) and a tie-break key.
#[derive(Debug, Clone, Copy)]
pub struct RankedIndex {
    pub cost: f64,
    pub tie_break: u64,
    pub index: usize,
}

impl RankedIndex {
    pub fn new(cost: f64, tie_break: u64, index: usize) -> Self {
        // NaN never wins a slot; adding 0.0 folds -0.0 into 0.0 so the two tie.
        let cost = if cost.is_nan() { f64::INFINITY } else { cost + 0.0 };
        Self { cost, tie_break, index }
    }
}

impl PartialEq for RankedIndex {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RankedIndex {}

impl PartialOrd for RankedIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RankedIndex {
    /// Greater means worse, so a `BinaryHeap` keeps the worst kept candidate
    /// on top where it can be evicted.
    fn cmp(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then_with(|| self.tie_break.cmp(&other.tie_break))
            .then_with(|| self.index.cmp(&other.index))
    }
}

/// Returns the `k` best candidates ordered best first. Equal costs are broken
/// by ascending `tie_break`, so the result is fully deterministic.
pub fn select_top_k<I>(candidates: I, k: usize) -> Vec<RankedIndex>
where
    I: IntoIterator<Item = RankedIndex>,
{
    if k == 0 {
        return Vec::new();
    }
    let mut heap: BinaryHeap<RankedIndex> = BinaryHeap::with_capacity(k + 1);
    for candidate in candidates {
        if heap.len() < k {
            heap.push(candidate);
        } else if let Some(worst) = heap.peek() {
            if candidate < *worst {
                heap.pop();
                heap.push(candidate);
            }
        }
    }
    // into_sorted_vec is ascending, i.e. best first under our ordering.
    heap.into_sorted_vec()
}
