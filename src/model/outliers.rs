use crate::features::EncodedBatch;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const DEFAULT_IQR_MULTIPLIER: f64 = 1.5;

/// Interquartile fences around the target distribution.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub lower: f64,
    pub upper: f64,
}

impl IqrBounds {
    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    /// Inclusive on both ends. Non-finite values are never inside.
    pub fn contains(&self, value: f64) -> bool {
        value.is_finite() && value >= self.lower && value <= self.upper
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OutlierReport {
    /// Bounds computed on the population as passed in, i.e. what a single
    /// pass would have used.
    pub first_pass_bounds: Option<IqrBounds>,
    /// Bounds of the final pass; `None` for an empty population.
    pub bounds: Option<IqrBounds>,
    pub removed: usize,
    pub passes: usize,
}

/// Quantile of an ascending slice, interpolating linearly between the two
/// nearest order statistics.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let fraction = position - below as f64;
    Some(sorted[below] + (sorted[above] - sorted[below]) * fraction)
}

/// Fences for the finite entries of `values`.
pub fn iqr_bounds(values: &[f64], multiplier: f64) -> Option<IqrBounds> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25)?;
    let q3 = quantile(&sorted, 0.75)?;
    // A negative or NaN multiplier would put the fences inside the quartiles.
    let k = if multiplier.is_finite() { multiplier.max(0.0) } else { 0.0 };
    let iqr = q3 - q1;
    Some(IqrBounds {
        q1,
        q3,
        lower: q1 - k * iqr,
        upper: q3 + k * iqr,
    })
}

/// Drops rows whose target lies outside the IQR fences, recomputing the
/// fences on the survivors until a pass removes nothing.
///
/// Matrix rows, targets and metadata are filtered together. Since the final
/// pass is a no-op, running the filter again on its output removes nothing.
pub fn filter_outliers(batch: EncodedBatch, multiplier: f64) -> (EncodedBatch, OutlierReport) {
    let original = batch.len();
    let first_pass_bounds = iqr_bounds(&batch.targets, multiplier);
    let mut current = batch;
    let mut passes = 0;

    loop {
        passes += 1;
        let Some(bounds) = iqr_bounds(&current.targets, multiplier) else {
            let removed = original - current.len();
            let report = OutlierReport {
                first_pass_bounds,
                bounds: None,
                removed,
                passes,
            };
            return (current, report);
        };

        let keep: Vec<usize> = current
            .targets
            .iter()
            .enumerate()
            .filter(|(_, y)| bounds.contains(**y))
            .map(|(i, _)| i)
            .collect();

        if keep.len() == current.len() {
            let removed = original - current.len();
            debug!(
                removed,
                passes,
                lower = bounds.lower,
                upper = bounds.upper,
                "outlier filter converged"
            );
            return (
                current,
                OutlierReport {
                    first_pass_bounds,
                    bounds: Some(bounds),
                    removed,
                    passes,
                },
            );
        }
        current = current.select_rows(&keep);
    }
}
