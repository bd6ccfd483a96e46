use crate::error::InferenceError;
use crate::features::FeatureMatrix;
use crate::model::pipeline::FittedPipeline;
use serde::{Deserialize, Serialize};
use std::time::Instant;

pub const DEFAULT_RESPONSE_TIME_THRESHOLD: f64 = 2.0;

/// Accuracy and latency of a fitted model on held-out rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub r2: f64,
    pub mse: f64,
    pub rmse: f64,
    pub mae: f64,
    pub median_ae: f64,
    /// Wall-clock seconds spent predicting the whole matrix.
    pub prediction_time: f64,
    pub samples_per_second: f64,
    pub meets_time_threshold: bool,
}

/// Coefficient of determination. A constant target scores 1.0 when
/// predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> f64 {
    if y_true.is_empty() {
        return f64::NAN;
    }
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let residual: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let total: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
    if total == 0.0 {
        return if residual == 0.0 { 1.0 } else { 0.0 };
    }
    1.0 - residual / total
}

pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)), y_true.len())
}

pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()), y_true.len())
}

pub fn median_absolute_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let mut errors: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()).collect();
    if errors.is_empty() {
        return f64::NAN;
    }
    errors.sort_by(f64::total_cmp);
    let mid = errors.len() / 2;
    if errors.len() % 2 == 0 {
        (errors[mid - 1] + errors[mid]) / 2.0
    } else {
        errors[mid]
    }
}

fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    if n == 0 {
        return f64::NAN;
    }
    values.sum::<f64>() / n as f64
}

/// Times a full prediction pass over `matrix` and scores it against
/// `targets`. Metrics of an empty matrix are `NaN`.
pub fn evaluate(
    pipeline: &FittedPipeline,
    matrix: &FeatureMatrix,
    targets: &[f64],
    time_threshold: f64,
) -> Result<Evaluation, InferenceError> {
    let started = Instant::now();
    let predictions = pipeline.predict(matrix)?;
    let prediction_time = started.elapsed().as_secs_f64();

    let mse = mean_squared_error(targets, &predictions);
    let samples_per_second = if prediction_time > 0.0 {
        predictions.len() as f64 / prediction_time
    } else {
        0.0
    };
    Ok(Evaluation {
        r2: r2_score(targets, &predictions),
        mse,
        rmse: mse.sqrt(),
        mae: mean_absolute_error(targets, &predictions),
        median_ae: median_absolute_error(targets, &predictions),
        prediction_time,
        samples_per_second,
        meets_time_threshold: prediction_time <= time_threshold,
    })
}
