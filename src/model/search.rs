use crate::error::TrainingError;
use crate::features::FeatureMatrix;
use crate::model::cancel::{CancellationFlag, StopSignal};
use crate::model::metrics::{mean_squared_error, r2_score};
use crate::model::pipeline::FittedPipeline;
use crate::model::split::{kfold, DEFAULT_SEED};
use crate::model::svr::{Gamma, SolverOptions, SvrParams};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Named search configurations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPreset {
    /// Small grid, 3 candidates, 3 folds, negative MSE.
    Basic,
    /// Wide grid, 20 candidates, 5 folds, R².
    #[default]
    Extended,
}

impl FromStr for SearchPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(SearchPreset::Basic),
            "extended" => Ok(SearchPreset::Extended),
            _ => Err(format!("unknown search preset '{s}', expected 'basic' or 'extended'")),
        }
    }
}

impl fmt::Display for SearchPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SearchPreset::Basic => "basic",
            SearchPreset::Extended => "extended",
        })
    }
}

/// Cross-validation score, larger is better for both variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    R2,
    NegMeanSquaredError,
}

impl Scoring {
    pub fn score(self, y_true: &[f64], y_pred: &[f64]) -> f64 {
        match self {
            Scoring::R2 => r2_score(y_true, y_pred),
            Scoring::NegMeanSquaredError => -mean_squared_error(y_true, y_pred),
        }
    }
}

impl fmt::Display for Scoring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scoring::R2 => "r2",
            Scoring::NegMeanSquaredError => "neg_mean_squared_error",
        })
    }
}

/// Cartesian grid of SVR hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchGrid {
    pub c: Vec<f64>,
    pub gamma: Vec<Gamma>,
    pub epsilon: Vec<f64>,
}

impl SearchGrid {
    pub fn len(&self) -> usize {
        self.c.len() * self.gamma.len() * self.epsilon.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grid point `index`, with epsilon varying fastest and C slowest.
    pub fn candidate(&self, index: usize) -> Option<SvrParams> {
        if index >= self.len() {
            return None;
        }
        let n_eps = self.epsilon.len();
        let n_gamma = self.gamma.len();
        Some(SvrParams {
            c: self.c[index / (n_eps * n_gamma)],
            gamma: self.gamma[(index / n_eps) % n_gamma],
            epsilon: self.epsilon[index % n_eps],
        })
    }

    pub fn candidates(&self) -> Vec<SvrParams> {
        (0..self.len()).filter_map(|i| self.candidate(i)).collect()
    }
}

/// Randomized search settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    pub grid: SearchGrid,
    /// Distinct grid points to try; the whole grid when it is not larger.
    pub n_iter: usize,
    pub folds: usize,
    pub scoring: Scoring,
    pub seed: u64,
    /// Worker threads; 0 lets rayon decide.
    pub n_jobs: usize,
    #[serde(default)]
    pub time_budget_secs: Option<f64>,
    #[serde(default)]
    pub solver: SolverOptions,
}

impl SearchConfig {
    pub fn basic() -> Self {
        Self {
            grid: SearchGrid {
                c: vec![0.1, 1.0, 10.0],
                gamma: vec![Gamma::Scale, Gamma::Auto],
                epsilon: vec![0.1],
            },
            n_iter: 3,
            folds: 3,
            scoring: Scoring::NegMeanSquaredError,
            seed: DEFAULT_SEED,
            n_jobs: 0,
            time_budget_secs: None,
            solver: SolverOptions::default(),
        }
    }

    pub fn extended() -> Self {
        Self {
            grid: SearchGrid {
                c: vec![0.1, 1.0, 10.0, 50.0, 100.0, 500.0],
                gamma: vec![
                    Gamma::Scale,
                    Gamma::Auto,
                    Gamma::Value(0.001),
                    Gamma::Value(0.01),
                    Gamma::Value(0.1),
                    Gamma::Value(1.0),
                ],
                epsilon: vec![0.01, 0.1, 0.2, 0.5],
            },
            n_iter: 20,
            folds: 5,
            scoring: Scoring::R2,
            ..Self::basic()
        }
    }

    pub fn from_preset(preset: SearchPreset) -> Self {
        match preset {
            SearchPreset::Basic => Self::basic(),
            SearchPreset::Extended => Self::extended(),
        }
    }

    pub fn validate(&self) -> Result<(), TrainingError> {
        if self.grid.is_empty() {
            return Err(TrainingError::InvalidConfig("search grid is empty".to_string()));
        }
        if self.n_iter == 0 {
            return Err(TrainingError::InvalidConfig("n_iter must be at least 1".to_string()));
        }
        if self.folds < 2 {
            return Err(TrainingError::InvalidConfig(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.folds
            )));
        }
        if let Some(budget) = self.time_budget_secs {
            if !(budget.is_finite() && budget >= 0.0) {
                return Err(TrainingError::InvalidConfig(format!("invalid time budget {budget}")));
            }
        }
        self.grid.candidates().iter().try_for_each(SvrParams::validate)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::extended()
    }
}

/// Cross-validated score of one completed candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialResult {
    pub params: SvrParams,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub best_params: SvrParams,
    pub best_score: f64,
    /// Best candidate refitted on every training row.
    pub pipeline: FittedPipeline,
    /// Completed trials in sampling order.
    pub trials: Vec<TrialResult>,
    /// Candidates cut short by cancellation or the time budget.
    pub interrupted: usize,
    /// Candidates that failed and were discarded.
    pub failed: usize,
}

/// Rejects training populations that cannot produce a meaningful fit.
pub fn check_training_data(matrix: &FeatureMatrix, targets: &[f64], folds: usize) -> Result<(), TrainingError> {
    if matrix.is_empty() || matrix.n_cols() == 0 {
        return Err(TrainingError::DegenerateFeatures(format!(
            "feature matrix is empty ({} rows x {} columns)",
            matrix.n_rows(),
            matrix.n_cols()
        )));
    }
    if targets.len() != matrix.n_rows() {
        return Err(TrainingError::DegenerateFeatures(format!(
            "{} targets for {} feature rows",
            targets.len(),
            matrix.n_rows()
        )));
    }
    if matrix.n_rows() < folds {
        return Err(TrainingError::TooFewRows {
            rows: matrix.n_rows(),
            folds,
        });
    }
    if targets.iter().any(|y| !y.is_finite()) {
        return Err(TrainingError::Numerical("non-finite target value".to_string()));
    }
    if let Some(position) = matrix.values().iter().position(|v| !v.is_finite()) {
        let column = &matrix.columns()[position % matrix.n_cols()];
        return Err(TrainingError::DegenerateFeatures(format!(
            "non-finite value in column '{column}'"
        )));
    }

    let mut distinct = targets.to_vec();
    distinct.sort_by(f64::total_cmp);
    distinct.dedup();
    if distinct.len() < 2 {
        return Err(TrainingError::InsufficientTargets {
            distinct: distinct.len(),
        });
    }

    let first = matrix.row(0);
    if matrix.rows().all(|row| row == first) {
        return Err(TrainingError::DegenerateFeatures("every feature column is constant".to_string()));
    }
    Ok(())
}

/// Indices of the grid points to try, in sampling order.
fn sample_candidates(grid_len: usize, n_iter: usize, seed: u64) -> Vec<usize> {
    if n_iter >= grid_len {
        return (0..grid_len).collect();
    }
    let mut rng = StdRng::seed_from_u64(seed);
    rand::seq::index::sample(&mut rng, grid_len, n_iter).into_vec()
}

/// Trial results sorted into completed, interrupted and failed.
#[derive(Debug, Default)]
struct TrialTally {
    trials: Vec<TrialResult>,
    best: Option<(SvrParams, f64)>,
    interrupted: usize,
    failed: usize,
}

impl TrialTally {
    /// The winning candidate, or why there is none.
    fn best(&self) -> Result<(SvrParams, f64), TrainingError> {
        match self.best {
            Some(best) => Ok(best),
            None if self.interrupted > 0 => Err(TrainingError::Cancelled),
            None => Err(TrainingError::Numerical(format!("all {} candidates failed", self.failed))),
        }
    }
}

/// Keeps completed trials in sampling order. Only a strictly higher mean
/// score replaces the current best.
fn tally_trials(candidates: &[SvrParams], results: Vec<Result<TrialResult, TrainingError>>) -> TrialTally {
    let mut tally = TrialTally::default();
    for (params, result) in candidates.iter().zip(results) {
        match result {
            Ok(trial) => {
                if tally.best.map_or(true, |(_, score)| trial.mean_score > score) {
                    tally.best = Some((trial.params, trial.mean_score));
                }
                tally.trials.push(trial);
            }
            Err(TrainingError::Cancelled) => tally.interrupted += 1,
            Err(error) => {
                warn!(params = %params, %error, "discarding failed trial");
                tally.failed += 1;
            }
        }
    }
    tally
}

struct Fold {
    x_train: Vec<f64>,
    y_train: Vec<f64>,
    x_test: Vec<f64>,
    y_test: Vec<f64>,
}

/// Samples candidates from the grid, scores each by k-fold cross-validation
/// on a bounded worker pool, and refits the best on all rows.
///
/// Ties on the mean score go to the candidate sampled first. Trials that are
/// still running when `cancel` fires or the time budget runs out are
/// discarded; the best completed trial is still refitted.
pub fn randomized_search(
    matrix: &FeatureMatrix,
    targets: &[f64],
    config: &SearchConfig,
    cancel: &CancellationFlag,
) -> Result<SearchOutcome, TrainingError> {
    config.validate()?;
    check_training_data(matrix, targets, config.folds)?;

    let started = Instant::now();
    let deadline = config
        .time_budget_secs
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .and_then(|budget| started.checked_add(budget));
    let stop = StopSignal::new(cancel.clone(), deadline);
    let width = matrix.n_cols();

    let candidates: Vec<SvrParams> = sample_candidates(config.grid.len(), config.n_iter, config.seed)
        .into_iter()
        .filter_map(|i| config.grid.candidate(i))
        .collect();

    let folds: Vec<Fold> = kfold(matrix.n_rows(), config.folds)
        .into_iter()
        .map(|split| Fold {
            x_train: matrix.select_rows(&split.train).values().to_vec(),
            y_train: split.train.iter().map(|&i| targets[i]).collect(),
            x_test: matrix.select_rows(&split.test).values().to_vec(),
            y_test: split.test.iter().map(|&i| targets[i]).collect(),
        })
        .collect();

    info!(
        candidates = candidates.len(),
        folds = folds.len(),
        rows = matrix.n_rows(),
        features = width,
        scoring = %config.scoring,
        "starting randomized hyperparameter search"
    );

    let pool = rayon::ThreadPoolBuilder::new().num_threads(config.n_jobs).build()?;
    let results: Vec<Result<TrialResult, TrainingError>> = pool.install(|| {
        candidates
            .par_iter()
            .map(|params| {
                let fold_scores = folds
                    .par_iter()
                    .map(|fold| {
                        if stop.should_stop() {
                            return Err(TrainingError::Cancelled);
                        }
                        let pipeline =
                            FittedPipeline::fit(&fold.x_train, width, &fold.y_train, params, &config.solver, &stop)?;
                        let predictions = pipeline.predict_values(&fold.x_test);
                        Ok(config.scoring.score(&fold.y_test, &predictions))
                    })
                    .collect::<Result<Vec<f64>, TrainingError>>()?;
                let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
                if !mean_score.is_finite() {
                    return Err(TrainingError::Numerical(format!("mean score is {mean_score}")));
                }
                debug!(params = %params, mean_score, "trial complete");
                Ok(TrialResult {
                    params: *params,
                    mean_score,
                    fold_scores,
                })
            })
            .collect()
    });

    let tally = tally_trials(&candidates, results);
    let (best_params, best_score) = tally.best()?;
    let TrialTally {
        trials,
        interrupted,
        failed,
        ..
    } = tally;
    if interrupted > 0 {
        warn!(interrupted, completed = trials.len(), "search stopped early, refitting best completed candidate");
    }
    info!(
        params = %best_params,
        score = best_score,
        elapsed_secs = started.elapsed().as_secs_f64(),
        "best candidate selected, refitting on full training set"
    );

    let pipeline = pool.install(|| {
        FittedPipeline::fit(
            matrix.values(),
            width,
            targets,
            &best_params,
            &config.solver,
            &StopSignal::never(),
        )
    })?;

    Ok(SearchOutcome {
        best_params,
        best_score,
        pipeline,
        trials,
        interrupted,
        failed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_problem(n: usize) -> (FeatureMatrix, Vec<f64>) {
        let mut values = Vec::with_capacity(n * 2);
        let mut targets = Vec::with_capacity(n);
        for i in 0..n {
            let a = i as f64 / n as f64;
            let b = ((i * 7) % n) as f64 / n as f64;
            values.push(a);
            values.push(b);
            targets.push(10.0 + 30.0 * a + 5.0 * b);
        }
        let matrix = FeatureMatrix::new(vec!["a".into(), "b".into()], values).unwrap();
        (matrix, targets)
    }

    #[test]
    fn test_presets() {
        let basic = SearchConfig::from_preset(SearchPreset::Basic);
        assert_eq!(basic.grid.len(), 6);
        assert_eq!((basic.n_iter, basic.folds, basic.scoring), (3, 3, Scoring::NegMeanSquaredError));

        let extended = SearchConfig::from_preset(SearchPreset::Extended);
        assert_eq!(extended.grid.len(), 144);
        assert_eq!((extended.n_iter, extended.folds, extended.scoring), (20, 5, Scoring::R2));
        assert!(extended.validate().is_ok());
        assert_eq!("Basic".parse::<SearchPreset>(), Ok(SearchPreset::Basic));
    }

    #[test]
    fn test_sampling_is_distinct_and_seeded() {
        let a = sample_candidates(144, 20, 42);
        let b = sample_candidates(144, 20, 42);
        assert_eq!(a, b);
        let mut unique = a.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), 20);
        assert_eq!(sample_candidates(6, 10, 42), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_grid_decoding() {
        let grid = SearchConfig::basic().grid;
        assert_eq!(grid.candidate(0).unwrap().gamma, Gamma::Scale);
        assert_eq!(grid.candidate(1).unwrap().gamma, Gamma::Auto);
        assert_eq!(grid.candidate(5).unwrap().c, 10.0);
        assert!(grid.candidate(6).is_none());
    }

    #[test]
    fn test_search_picks_best_completed_candidate() {
        let (matrix, targets) = toy_problem(30);
        let config = SearchConfig {
            n_jobs: 2,
            ..SearchConfig::basic()
        };
        let outcome = randomized_search(&matrix, &targets, &config, &CancellationFlag::new()).unwrap();
        assert_eq!(outcome.trials.len(), 3);
        let max = outcome
            .trials
            .iter()
            .map(|t| t.mean_score)
            .fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(outcome.best_score, max);
        let first_best = outcome.trials.iter().find(|t| t.mean_score == max).unwrap();
        assert_eq!(outcome.best_params, first_best.params);
        assert_eq!(outcome.pipeline.n_features(), 2);
    }

    #[test]
    fn test_cancelled_search_fails_without_completed_trials() {
        let (matrix, targets) = toy_problem(30);
        let flag = CancellationFlag::new();
        flag.cancel();
        let result = randomized_search(&matrix, &targets, &SearchConfig::basic(), &flag);
        assert!(matches!(result, Err(TrainingError::Cancelled)));

        let zero_budget = SearchConfig {
            time_budget_secs: Some(0.0),
            ..SearchConfig::basic()
        };
        let result = randomized_search(&matrix, &targets, &zero_budget, &CancellationFlag::new());
        assert!(matches!(result, Err(TrainingError::Cancelled)));
    }

    #[test]
    fn test_tally_keeps_best_completed_trial() {
        let grid = SearchConfig::basic().grid;
        let candidates: Vec<SvrParams> = (0..5).map(|i| grid.candidate(i).unwrap()).collect();
        let trial = |i: usize, mean_score: f64| TrialResult {
            params: candidates[i],
            mean_score,
            fold_scores: vec![mean_score],
        };
        let results = vec![
            Ok(trial(0, -4.0)),
            Ok(trial(1, -2.5)),
            Err(TrainingError::Cancelled),
            Ok(trial(3, -2.5)),
            Err(TrainingError::Numerical("diverged".into())),
        ];

        let tally = tally_trials(&candidates, results);
        assert_eq!(tally.trials.len(), 3);
        assert_eq!((tally.interrupted, tally.failed), (1, 1));
        assert_eq!(tally.best().unwrap(), (candidates[1], -2.5));

        let cancelled = tally_trials(
            &candidates[..2],
            vec![Err(TrainingError::Cancelled), Err(TrainingError::Cancelled)],
        );
        assert!(matches!(cancelled.best(), Err(TrainingError::Cancelled)));
        let failed = tally_trials(&candidates[..1], vec![Err(TrainingError::Numerical("nan".into()))]);
        assert!(matches!(failed.best(), Err(TrainingError::Numerical(_))));
    }

    #[test]
    fn test_budget_cut_search_refits_best_completed_trial() {
        let (matrix, targets) = toy_problem(300);
        let config = SearchConfig {
            n_jobs: 1,
            n_iter: 144,
            time_budget_secs: Some(1.0),
            ..SearchConfig::extended()
        };
        let outcome = randomized_search(&matrix, &targets, &config, &CancellationFlag::new()).unwrap();

        assert!(outcome.interrupted > 0);
        assert!(!outcome.trials.is_empty());
        assert_eq!(outcome.trials.len() + outcome.interrupted + outcome.failed, 144);
        let max = outcome
            .trials
            .iter()
            .map(|t| t.mean_score)
            .fold(f64::NEG_INFINITY, f64::max);
        let first_best = outcome.trials.iter().find(|t| t.mean_score == max).unwrap();
        assert_eq!(outcome.best_params, first_best.params);
        assert_eq!(outcome.best_score, max);
        assert_eq!(outcome.pipeline.n_features(), 2);
        assert!(outcome.pipeline.predict_values(matrix.values()).iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_degenerate_inputs_are_rejected() {
        let (matrix, targets) = toy_problem(10);
        let config = SearchConfig::basic();

        let constant_targets = vec![5.0; 10];
        assert!(matches!(
            randomized_search(&matrix, &constant_targets, &config, &CancellationFlag::new()),
            Err(TrainingError::InsufficientTargets { distinct: 1 })
        ));

        let small = matrix.select_rows(&[0, 1]);
        assert!(matches!(
            randomized_search(&small, &targets[..2], &config, &CancellationFlag::new()),
            Err(TrainingError::TooFewRows { rows: 2, folds: 3 })
        ));

        let flat = FeatureMatrix::new(vec!["a".into()], vec![1.0; 10]).unwrap();
        assert!(matches!(
            randomized_search(&flat, &targets, &config, &CancellationFlag::new()),
            Err(TrainingError::DegenerateFeatures(_))
        ));

        let empty = FeatureMatrix::new(vec!["a".into()], vec![]).unwrap();
        assert!(matches!(
            randomized_search(&empty, &[], &config, &CancellationFlag::new()),
            Err(TrainingError::DegenerateFeatures(_))
        ));

        let mut holes = matrix.values().to_vec();
        holes[3] = f64::NAN;
        let holes = FeatureMatrix::new(matrix.columns().to_vec(), holes).unwrap();
        assert!(matches!(
            randomized_search(&holes, &targets, &config, &CancellationFlag::new()),
            Err(TrainingError::DegenerateFeatures(_))
        ));

        let bad = SearchConfig {
            n_iter: 0,
            ..SearchConfig::basic()
        };
        assert!(matches!(
            randomized_search(&matrix, &targets, &bad, &CancellationFlag::new()),
            Err(TrainingError::InvalidConfig(_))
        ));
    }
}
