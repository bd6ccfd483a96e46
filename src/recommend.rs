use crate::error::InferenceError;
use crate::features::EncodedBatch;
use crate::model::ModelArtifact;
use crate::ranking::{select_top_k, RankedIndex};
use crate::recipe::{RawRecipeRow, RecipeMetadata};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A recipe whose predicted preparation time is close to the reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationRecommendation {
    pub recipe_id: u64,
    pub name: String,
    pub predicted_minutes: f64,
    /// `|predicted_minutes - reference|`.
    pub deviation: f64,
    pub ingredients: Vec<String>,
    pub tags: Vec<String>,
    pub steps: Vec<String>,
}

/// Orders rows by closeness of their prediction to `reference_minutes`,
/// ascending recipe id breaking ties, and keeps at most `top_n`.
pub fn rank_by_duration(
    predictions: &[f64],
    metadata: &[RecipeMetadata],
    reference_minutes: f64,
    top_n: usize,
) -> Vec<DurationRecommendation> {
    let ranked = select_top_k(
        predictions
            .iter()
            .zip(metadata)
            .enumerate()
            .map(|(index, (predicted, meta))| RankedIndex::new((predicted - reference_minutes).abs(), meta.id, index)),
        top_n,
    );

    ranked
        .into_iter()
        .map(|entry| {
            let meta = &metadata[entry.index];
            let predicted_minutes = predictions[entry.index];
            DurationRecommendation {
                recipe_id: meta.id,
                name: meta.name.clone(),
                predicted_minutes,
                deviation: (predicted_minutes - reference_minutes).abs(),
                ingredients: meta.ingredients.clone(),
                tags: meta.tags.clone(),
                steps: meta.steps.clone(),
            }
        })
        .collect()
}

/// Predicts an already encoded batch and ranks it.
pub fn recommend_from_batch(
    artifact: &ModelArtifact,
    batch: &EncodedBatch,
    reference_minutes: f64,
    top_n: usize,
) -> Result<Vec<DurationRecommendation>, InferenceError> {
    let predictions = artifact.predict(&batch.matrix)?;
    debug!(rows = predictions.len(), reference_minutes, top_n, "ranking recipes by predicted duration");
    Ok(rank_by_duration(&predictions, &batch.metadata, reference_minutes, top_n))
}

/// Encodes `corpus` with the artifact's vocabulary, predicts every recipe and
/// returns the `top_n` whose predicted minutes are closest to the reference.
pub fn recommend_by_duration(
    artifact: Option<&ModelArtifact>,
    corpus: &[RawRecipeRow],
    reference_minutes: f64,
    top_n: usize,
) -> Result<Vec<DurationRecommendation>, InferenceError> {
    let artifact = artifact.ok_or(InferenceError::NotTrained)?;
    let batch = artifact.encoder().encode(corpus);
    recommend_from_batch(artifact, &batch, reference_minutes, top_n)
}
