use serde::{Deserialize, Serialize};

/// Per-column affine map of the fitted range onto `[0, 1]`.
/// Constant columns map to 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    min: Vec<f64>,
    scale: Vec<f64>,
}

impl MinMaxScaler {
    /// Fits on a row-major matrix with `n_cols` columns.
    pub fn fit(values: &[f64], n_cols: usize) -> Self {
        let mut min = vec![f64::INFINITY; n_cols];
        let mut max = vec![f64::NEG_INFINITY; n_cols];
        if n_cols > 0 {
            for row in values.chunks_exact(n_cols) {
                for (j, &v) in row.iter().enumerate() {
                    min[j] = min[j].min(v);
                    max[j] = max[j].max(v);
                }
            }
        }
        let scale = min
            .iter()
            .zip(&max)
            .map(|(lo, hi)| {
                let range = hi - lo;
                if range.is_finite() && range > 0.0 {
                    1.0 / range
                } else {
                    1.0
                }
            })
            .collect();
        // Columns with no rows keep a zero offset.
        let min = min.into_iter().map(|m| if m.is_finite() { m } else { 0.0 }).collect();
        Self { min, scale }
    }

    pub fn n_features(&self) -> usize {
        self.min.len()
    }

    pub fn transform_row_into(&self, row: &[f64], out: &mut Vec<f64>) {
        out.extend(
            row.iter()
                .zip(self.min.iter().zip(&self.scale))
                .map(|(v, (lo, s))| (v - lo) * s),
        );
    }

    /// Scales a row-major matrix whose width equals [`Self::n_features`].
    pub fn transform(&self, values: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(values.len());
        if self.n_features() == 0 {
            return out;
        }
        for row in values.chunks_exact(self.n_features()) {
            self.transform_row_into(row, &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scales_to_unit_range_and_constant_to_zero() {
        let values = [0.0, 5.0, 10.0, 10.0, 5.0, 20.0, 5.0, 5.0, 15.0];
        let scaler = MinMaxScaler::fit(&values, 3);
        let scaled = scaler.transform(&values);
        assert_eq!(scaled, vec![0.0, 0.0, 0.0, 1.0, 0.0, 1.0, 0.5, 0.0, 0.5]);
    }

    #[test]
    fn test_unseen_values_extrapolate() {
        let scaler = MinMaxScaler::fit(&[0.0, 4.0], 1);
        assert_eq!(scaler.transform(&[8.0, -4.0]), vec![2.0, -1.0]);
    }
}
