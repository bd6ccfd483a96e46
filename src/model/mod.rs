pub mod artifact;
pub mod cancel;
pub mod metrics;
pub mod outliers;
pub mod pipeline;
pub mod scaler;
pub mod search;
pub mod split;
pub mod svr;

pub use artifact::{ModelArtifact, TrainingMetadata};
pub use cancel::{CancellationFlag, StopSignal};
pub use metrics::{evaluate, Evaluation, DEFAULT_RESPONSE_TIME_THRESHOLD};
pub use outliers::{filter_outliers, IqrBounds, OutlierReport, DEFAULT_IQR_MULTIPLIER};
pub use pipeline::FittedPipeline;
pub use search::{randomized_search, Scoring, SearchConfig, SearchGrid, SearchOutcome, SearchPreset, TrialResult};
pub use split::{train_test_split, TrainTestSplit};
pub use svr::{Gamma, SolverOptions, SvrModel, SvrParams};
