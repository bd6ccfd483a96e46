use anyhow::{Context, Result};
use recipe_recommender::cli::{parse_args, search_query, Cli, Command};
use recipe_recommender::config::Settings;
use recipe_recommender::model::{CancellationFlag, ModelArtifact};
use recipe_recommender::nutrition::{calculate_energy_breakdown, ScoringWeights};
use recipe_recommender::recipe::RawRecipeRow;
use recipe_recommender::service::{recommend_by_duration, train_model, RecipeRecommender};
use recipe_recommender::store::{load_raw_recipes, InMemoryRecipeStore};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value).context("Failed to render output as JSON")?);
    Ok(())
}

async fn load_corpus(settings: &Settings) -> Result<Vec<RawRecipeRow>> {
    let path = settings.recipes_csv.clone();
    let limit = settings.csv_row_limit();
    let rows = tokio::task::spawn_blocking(move || load_raw_recipes(&path, limit))
        .await
        .context("CSV loading task panicked")?
        .with_context(|| format!("Failed to load recipes from '{}'", settings.recipes_csv.display()))?;
    Ok(rows)
}

async fn load_store(settings: &Settings) -> Result<InMemoryRecipeStore> {
    let rows = load_corpus(settings).await?;
    let mut store = InMemoryRecipeStore::new();
    let summary = store.bulk_load(&rows);
    if summary.errors > 0 || summary.skipped > 0 {
        warn!(
            rejected = summary.errors,
            duplicates = summary.skipped,
            "some recipes could not be stored"
        );
    }
    info!(recipes = store.len(), "recipe store ready");
    Ok(store)
}

async fn load_model(path: PathBuf) -> Result<ModelArtifact> {
    let display = path.display().to_string();
    tokio::task::spawn_blocking(move || ModelArtifact::load(&path, None))
        .await
        .context("Model loading task panicked")?
        .with_context(|| format!("Failed to load model from '{display}'"))
}

fn apply_overrides(settings: &mut Settings, cli: &Cli) {
    if let Some(path) = &cli.recipes_csv {
        settings.recipes_csv = path.clone();
    }
    if let Some(path) = &cli.model {
        settings.model_path = path.clone();
    }
    if let Some(limit) = cli.csv_limit {
        settings.csv_limit = limit;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_args();
    init_tracing(cli.verbose);

    let mut settings = Settings::from_env().context("Invalid RECIPE_REC_* environment configuration")?;
    apply_overrides(&mut settings, &cli);

    match cli.command {
        Command::Targets(profile) => {
            let breakdown = calculate_energy_breakdown(&profile.to_profile())?;
            print_json(&breakdown)?;
        }
        Command::Match { profile, top_n, preset } => {
            let breakdown = calculate_energy_breakdown(&profile.to_profile())?;
            let weights = ScoringWeights::from_preset(preset.unwrap_or(settings.scoring_preset));
            let recommender = RecipeRecommender::new(load_store(&settings).await?, weights);
            let matches = recommender.match_recipes_by_nutrition(&breakdown.targets, top_n)?;
            print_json(&matches)?;
        }
        Command::Train {
            preset,
            jobs,
            time_budget,
            output,
        } => {
            if let Some(path) = output {
                settings.model_path = path;
            }
            if let Some(jobs) = jobs {
                settings.n_jobs = jobs;
            }
            if time_budget.is_some() {
                settings.time_budget_secs = time_budget;
            }
            let config = settings.training_config(preset.unwrap_or(settings.search_preset));
            let corpus = load_corpus(&settings).await?;

            let cancel = CancellationFlag::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupt received, finishing with the best completed trial");
                    on_interrupt.cancel();
                }
            });

            let (artifact, report) = tokio::task::spawn_blocking(move || train_model(&corpus, &config, &cancel))
                .await
                .context("Training task panicked")??;

            let model_path = settings.model_path.clone();
            tokio::task::spawn_blocking(move || artifact.save(&model_path))
                .await
                .context("Model saving task panicked")?
                .with_context(|| format!("Failed to save model to '{}'", settings.model_path.display()))?;
            info!(path = %settings.model_path.display(), "model saved");
            print_json(&report)?;
        }
        Command::Recommend { minutes, top_n } => {
            let artifact = load_model(settings.model_path.clone()).await?;
            let corpus = load_corpus(&settings).await?;
            let recommendations = recommend_by_duration(Some(&artifact), &corpus, minutes, top_n)?;
            print_json(&recommendations)?;
        }
        Command::Search {
            id,
            ingredient,
            tag,
            limit,
        } => {
            let recommender = RecipeRecommender::new(
                load_store(&settings).await?,
                ScoringWeights::from_preset(settings.scoring_preset),
            );
            let recipes = recommender.search(&search_query(id, ingredient, tag, limit))?;
            print_json(&recipes)?;
        }
    }

    Ok(())
}
