use thiserror::Error;

/// Invalid biometric input handed to the nutrition calculator.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("weight must be a positive number of kilograms, got {0}")]
    Weight(f64),
    #[error("height must be a positive number of centimetres, got {0}")]
    Height(f64),
    #[error("age must be a positive number of years, got {0}")]
    Age(u32),
}

/// Failures while fitting the duration model.
#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("training set needs at least two distinct target values, found {distinct}")]
    InsufficientTargets { distinct: usize },
    #[error("training set has {rows} rows but cross-validation needs at least {folds}")]
    TooFewRows { rows: usize, folds: usize },
    #[error("degenerate feature matrix: {0}")]
    DegenerateFeatures(String),
    #[error("numerical failure while fitting: {0}")]
    Numerical(String),
    #[error("invalid training configuration: {0}")]
    InvalidConfig(String),
    #[error("hyperparameter search stopped before any candidate completed")]
    Cancelled,
    #[error("could not build worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Failures while predicting with a fitted model.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("no trained model is loaded")]
    NotTrained,
    #[error("feature matrix has {actual} columns but the model was fitted on {expected}")]
    ColumnMismatch { expected: usize, actual: usize },
}

/// Read failures against the recipe store.
#[derive(Error, Debug)]
pub enum DataSourceError {
    #[error("failed to read recipe data from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed recipe CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("required column '{0}' not found in recipe CSV")]
    MissingColumn(String),
    #[error("recipe store unavailable: {0}")]
    Unavailable(String),
}

/// Failures while persisting or loading a model artifact.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("artifact I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("binary artifact encoding error: {0}")]
    Binary(#[from] bincode::Error),
    #[error("JSON artifact encoding error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("artifact is inconsistent: {0}")]
    Inconsistent(String),
    #[error("artifact has {actual} feature columns, expected {expected}")]
    ColumnCount { expected: usize, actual: usize },
}

/// Aggregate error for the service entry points.
#[derive(Error, Debug)]
pub enum RecommenderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error(transparent)]
    DataSource(#[from] DataSourceError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}
