//! Entry points that tie the store, the scorers and the model together.

use crate::config::TrainingConfig;
use crate::error::{InferenceError, RecommenderError};
use crate::features::{FeatureEncoder, ParseReport};
use crate::model::{
    evaluate, filter_outliers, randomized_search, train_test_split, CancellationFlag, Evaluation, ModelArtifact,
    OutlierReport, Scoring, SvrParams, TrainingMetadata, TrialResult,
};
use crate::nutrition::{rank_by_nutrition, NutritionRecommendation, NutritionTarget, ScoringWeights};
use crate::recipe::{RawRecipeRow, RecipeRecord};
use crate::recommend::{recommend_from_batch, DurationRecommendation};
use crate::store::{RecipeQuery, RecipeStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

pub use crate::nutrition::compute_nutrition_targets;
pub use crate::recommend::recommend_by_duration;

/// What happened during a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub best_params: SvrParams,
    pub cv_score: f64,
    pub scoring: Scoring,
    pub trials: Vec<TrialResult>,
    pub interrupted_trials: usize,
    pub failed_trials: usize,
    /// Seconds from feature encoding through the final refit.
    pub training_seconds: f64,
    /// Held-out metrics; `None` when the population was too small to split.
    pub evaluation: Option<Evaluation>,
    pub rows_total: usize,
    pub rows_with_target: usize,
    pub rows_train: usize,
    pub rows_test: usize,
    pub outliers: OutlierReport,
    pub parse_report: ParseReport,
}

/// Fits a duration model on `corpus`.
///
/// Rows without a usable `minutes` value are left out. The rest are split
/// into train and test partitions; outliers are trimmed from the training
/// partition only, and cross-validation folds are cut from what remains.
pub fn train_model(
    corpus: &[RawRecipeRow],
    config: &TrainingConfig,
    cancel: &CancellationFlag,
) -> Result<(ModelArtifact, TrainingReport), RecommenderError> {
    let started = Instant::now();
    let (encoder, batch) = FeatureEncoder::fit(corpus, config.ingredient_vocabulary.as_slice(), config.impute);

    let labelled: Vec<usize> = batch
        .targets
        .iter()
        .enumerate()
        .filter(|(_, y)| y.is_finite())
        .map(|(i, _)| i)
        .collect();
    if labelled.len() < batch.len() {
        info!(
            excluded = batch.len() - labelled.len(),
            "rows without preparation time excluded from training"
        );
    }
    let batch_report = batch.report;
    let labelled = batch.select_rows(&labelled);

    let split = train_test_split(labelled.len(), config.test_fraction, config.split_seed);
    let test = labelled.select_rows(&split.test);
    let (train, outliers) = filter_outliers(labelled.select_rows(&split.train), config.iqr_multiplier);
    info!(
        train = train.len(),
        test = test.len(),
        outliers_removed = outliers.removed,
        "prepared training data"
    );

    let outcome = randomized_search(&train.matrix, &train.targets, &config.search, cancel)?;
    let training_seconds = started.elapsed().as_secs_f64();

    let evaluation = if test.is_empty() {
        None
    } else {
        Some(evaluate(
            &outcome.pipeline,
            &test.matrix,
            &test.targets,
            config.response_time_threshold,
        )?)
    };
    if let Some(evaluation) = &evaluation {
        info!(
            r2 = evaluation.r2,
            rmse = evaluation.rmse,
            mae = evaluation.mae,
            prediction_time = evaluation.prediction_time,
            meets_time_threshold = evaluation.meets_time_threshold,
            "evaluated on held-out rows"
        );
    }

    let metadata = TrainingMetadata {
        trained_rows: train.len(),
        cv_score: outcome.best_score,
        scoring: config.search.scoring,
        training_seconds,
        outlier_bounds: outliers.bounds,
    };
    let artifact = ModelArtifact::new(outcome.pipeline, &encoder, outcome.best_params, metadata)?;

    let report = TrainingReport {
        best_params: outcome.best_params,
        cv_score: outcome.best_score,
        scoring: config.search.scoring,
        trials: outcome.trials,
        interrupted_trials: outcome.interrupted,
        failed_trials: outcome.failed,
        training_seconds,
        evaluation,
        rows_total: corpus.len(),
        rows_with_target: labelled.len(),
        rows_train: train.len(),
        rows_test: test.len(),
        outliers,
        parse_report: batch_report,
    };
    Ok((artifact, report))
}

/// Scores every recipe in `store` against `target` and keeps the best `top_n`.
pub fn match_recipes_by_nutrition<S: RecipeStore + ?Sized>(
    store: &S,
    target: &NutritionTarget,
    top_n: usize,
    weights: &ScoringWeights,
) -> Result<Vec<NutritionRecommendation>, RecommenderError> {
    let candidates = store.fetch_all()?;
    Ok(rank_by_nutrition(target, &candidates, top_n, weights))
}

/// Recommendation facade over a recipe store and an optional trained model.
///
/// The model is held behind an `Arc` so that readers can keep predicting
/// with one artifact while a retrained one is swapped in.
pub struct RecipeRecommender<S> {
    store: S,
    weights: ScoringWeights,
    model: Option<Arc<ModelArtifact>>,
}

impl<S: RecipeStore> RecipeRecommender<S> {
    pub fn new(store: S, weights: ScoringWeights) -> Self {
        Self {
            store,
            weights,
            model: None,
        }
    }

    pub fn with_model(mut self, model: Arc<ModelArtifact>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn model(&self) -> Option<Arc<ModelArtifact>> {
        self.model.clone()
    }

    pub fn set_model(&mut self, model: Arc<ModelArtifact>) {
        self.model = Some(model);
    }

    pub fn search(&self, query: &RecipeQuery) -> Result<Vec<RecipeRecord>, RecommenderError> {
        Ok(self.store.fetch(query)?)
    }

    pub fn match_recipes_by_nutrition(
        &self,
        target: &NutritionTarget,
        top_n: usize,
    ) -> Result<Vec<NutritionRecommendation>, RecommenderError> {
        match_recipes_by_nutrition(&self.store, target, top_n, &self.weights)
    }

    /// Trains on every recipe in the store and installs the new model.
    pub fn train(
        &mut self,
        config: &TrainingConfig,
        cancel: &CancellationFlag,
    ) -> Result<TrainingReport, RecommenderError> {
        let corpus: Vec<RawRecipeRow> = self.store.fetch_all()?.iter().map(RawRecipeRow::from).collect();
        let (artifact, report) = train_model(&corpus, config, cancel)?;
        self.model = Some(Arc::new(artifact));
        Ok(report)
    }

    /// Ranks the whole store by closeness of predicted minutes to
    /// `reference_minutes`.
    pub fn recommend_by_duration(
        &self,
        reference_minutes: f64,
        top_n: usize,
    ) -> Result<Vec<DurationRecommendation>, RecommenderError> {
        let model = self.model.as_ref().ok_or(InferenceError::NotTrained)?;
        let records = self.store.fetch_all()?;
        let batch = model.encoder().encode_records(&records);
        Ok(recommend_from_batch(model, &batch, reference_minutes, top_n)?)
    }
}
