use crate::error::{ArtifactError, InferenceError};
use crate::features::{FeatureEncoder, FeatureMatrix, FeatureVocabulary, ImputeStrategy};
use crate::model::outliers::IqrBounds;
use crate::model::pipeline::FittedPipeline;
use crate::model::search::Scoring;
use crate::model::svr::SvrParams;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tracing::info;

pub const ARTIFACT_VERSION: u32 = 1;

/// Float buffers as base64 in human-readable formats, plain sequences otherwise.
pub(crate) mod base64_floats {
    use base64::{engine::general_purpose, Engine as _};
    use bytemuck::cast_slice;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    const WIDTH: usize = std::mem::size_of::<f64>();

    pub fn serialize<S: Serializer>(values: &[f64], serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            let bytes: &[u8] = cast_slice(values);
            serializer.serialize_str(&general_purpose::STANDARD.encode(bytes))
        } else {
            serializer.collect_seq(values)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<f64>, D::Error> {
        if !deserializer.is_human_readable() {
            return Vec::<f64>::deserialize(deserializer);
        }
        let encoded = String::deserialize(deserializer)?;
        let bytes = general_purpose::STANDARD.decode(encoded).map_err(D::Error::custom)?;
        if bytes.len() % WIDTH != 0 {
            return Err(D::Error::custom(format!(
                "float buffer of {} bytes is not a multiple of {WIDTH}",
                bytes.len()
            )));
        }
        bytes
            .chunks_exact(WIDTH)
            .map(|chunk| {
                chunk
                    .try_into()
                    .map(f64::from_ne_bytes)
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}

/// Bookkeeping about the run that produced an artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetadata {
    pub trained_rows: usize,
    pub cv_score: f64,
    pub scoring: Scoring,
    pub training_seconds: f64,
    pub outlier_bounds: Option<IqrBounds>,
}

/// Everything needed to predict on new recipes: the fitted pipeline and the
/// exact feature layout it was fitted on.
///
/// Constructed only through [`ModelArtifact::new`] or [`ModelArtifact::load`],
/// both of which check that the stored pieces agree on the column count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    version: u32,
    pipeline: FittedPipeline,
    feature_columns: Vec<String>,
    vocabulary: FeatureVocabulary,
    impute: ImputeStrategy,
    /// Training-time column means for [`ImputeStrategy::ColumnMean`].
    #[serde(default)]
    fill_values: Option<Vec<f64>>,
    params: SvrParams,
    metadata: TrainingMetadata,
}

impl ModelArtifact {
    pub fn new(
        pipeline: FittedPipeline,
        encoder: &FeatureEncoder,
        params: SvrParams,
        metadata: TrainingMetadata,
    ) -> Result<Self, ArtifactError> {
        let vocabulary = encoder.vocabulary().clone();
        let artifact = Self {
            version: ARTIFACT_VERSION,
            feature_columns: vocabulary.column_names(),
            pipeline,
            vocabulary,
            impute: encoder.impute_strategy(),
            fill_values: encoder.fill_values().map(<[f64]>::to_vec),
            params,
            metadata,
        };
        artifact.validate(None)?;
        Ok(artifact)
    }

    pub fn pipeline(&self) -> &FittedPipeline {
        &self.pipeline
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.feature_columns
    }

    pub fn vocabulary(&self) -> &FeatureVocabulary {
        &self.vocabulary
    }

    pub fn params(&self) -> &SvrParams {
        &self.params
    }

    pub fn metadata(&self) -> &TrainingMetadata {
        &self.metadata
    }

    /// Encoder bound to the persisted vocabulary and fill values.
    pub fn encoder(&self) -> FeatureEncoder {
        FeatureEncoder::from_vocabulary(self.vocabulary.clone(), self.impute)
            .with_fill_values(self.fill_values.clone())
    }

    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>, InferenceError> {
        if matrix.n_cols() != self.feature_columns.len() {
            return Err(InferenceError::ColumnMismatch {
                expected: self.feature_columns.len(),
                actual: matrix.n_cols(),
            });
        }
        self.pipeline.predict(matrix)
    }

    /// Checks the stored column names against the vocabulary, the scaler and
    /// the support vectors, and optionally against a caller's expectation.
    pub fn validate(&self, expected_columns: Option<usize>) -> Result<(), ArtifactError> {
        if self.version != ARTIFACT_VERSION {
            return Err(ArtifactError::Inconsistent(format!(
                "unsupported artifact version {}",
                self.version
            )));
        }
        let actual = self.feature_columns.len();
        let checks = [
            expected_columns,
            Some(self.vocabulary.width()),
            Some(self.pipeline.n_features()),
            Some(self.pipeline.regressor().n_features()),
        ];
        for expected in checks.into_iter().flatten() {
            if expected != actual {
                return Err(ArtifactError::ColumnCount { expected, actual });
            }
        }
        if let Some(fills) = &self.fill_values {
            if fills.len() != actual {
                return Err(ArtifactError::Inconsistent(format!(
                    "{} fill values for {actual} feature columns",
                    fills.len()
                )));
            }
        }
        if self.feature_columns != self.vocabulary.column_names() {
            return Err(ArtifactError::Inconsistent(
                "feature column names do not match the vocabulary".to_string(),
            ));
        }
        if !self.pipeline.regressor().is_consistent() {
            return Err(ArtifactError::Inconsistent(
                "support vector buffer does not match the coefficient count".to_string(),
            ));
        }
        Ok(())
    }

    /// Writes JSON for a `.json` path and bincode otherwise.
    pub fn save(&self, path: &Path) -> Result<(), ArtifactError> {
        let mut writer = BufWriter::new(File::create(path)?);
        if is_json(path) {
            serde_json::to_writer_pretty(&mut writer, self)?;
        } else {
            bincode::serialize_into(&mut writer, self)?;
        }
        writer.flush()?;
        info!(path = %path.display(), columns = self.feature_columns.len(), "saved model artifact");
        Ok(())
    }

    pub fn load(path: &Path, expected_columns: Option<usize>) -> Result<Self, ArtifactError> {
        let reader = BufReader::new(File::open(path)?);
        let artifact: Self = if is_json(path) {
            serde_json::from_reader(reader)?
        } else {
            bincode::deserialize_from(reader)?
        };
        artifact.validate(expected_columns)?;
        info!(path = %path.display(), columns = artifact.feature_columns.len(), "loaded model artifact");
        Ok(artifact)
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}
