use crate::error::{InferenceError, TrainingError};
use crate::features::FeatureMatrix;
use crate::model::cancel::StopSignal;
use crate::model::scaler::MinMaxScaler;
use crate::model::svr::{SolverOptions, SvrModel, SvrParams};
use serde::{Deserialize, Serialize};

/// Min-max scaling followed by SVR, fitted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline {
    scaler: MinMaxScaler,
    regressor: SvrModel,
}

impl FittedPipeline {
    pub fn fit(
        x: &[f64],
        n_features: usize,
        y: &[f64],
        params: &SvrParams,
        options: &SolverOptions,
        stop: &StopSignal,
    ) -> Result<Self, TrainingError> {
        let scaler = MinMaxScaler::fit(x, n_features);
        let scaled = scaler.transform(x);
        let regressor = SvrModel::fit(&scaled, n_features, y, params, options, stop)?;
        Ok(Self { scaler, regressor })
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    pub fn regressor(&self) -> &SvrModel {
        &self.regressor
    }

    /// Predicts a row-major matrix already known to have the right width.
    pub(crate) fn predict_values(&self, x: &[f64]) -> Vec<f64> {
        self.regressor.predict(&self.scaler.transform(x))
    }

    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
        if matrix.n_cols() != self.n_features() {
            return Err(InferenceError::ColumnMismatch {
                expected: self.n_features(),
                actual: matrix.n_cols(),
            });
        }
        Ok(self.predict_values(matrix.values()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predict_rejects_wrong_width() {
        let x = [0.0, 1.0, 1.0, 0.0, 0.5, 0.5];
        let y = [1.0, 2.0, 3.0];
        let pipeline =
            FittedPipeline::fit(&x, 2, &y, &SvrParams::default(), &SolverOptions::default(), &StopSignal::never())
                .unwrap();
        assert_eq!(pipeline.n_features(), 2);

        let narrow = FeatureMatrix::new(vec!["a".into()], vec![1.0, 2.0]).unwrap();
        assert!(matches!(
            pipeline.predict(&narrow),
            Err(InferenceError::ColumnMismatch { expected: 2, actual: 1 })
        ));

        let ok = FeatureMatrix::new(vec!["a".into(), "b".into()], x.to_vec()).unwrap();
        assert_eq!(pipeline.predict(&ok).unwrap().len(), 3);
    }
}
