use crate::model::SearchPreset;
use crate::nutrition::{ActivityLevel, Gender, ScoringPreset, UserProfile, DEFAULT_TOP_N};
use crate::store::RecipeQuery;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Recipe recommendations by nutrition and preparation time", long_about = None)]
pub struct Cli {
    /// Recipe CSV in the RAW_recipes.csv layout (overrides RECIPE_REC_RECIPES_CSV)
    #[arg(long, global = true)]
    pub recipes_csv: Option<PathBuf>,

    /// Model artifact path (overrides RECIPE_REC_MODEL_PATH)
    #[arg(long, global = true)]
    pub model: Option<PathBuf>,

    /// Maximum CSV rows to read, 0 for all (overrides RECIPE_REC_CSV_LIMIT)
    #[arg(long, global = true)]
    pub csv_limit: Option<usize>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print BMR, TDEE and daily nutrient targets for a profile
    Targets(ProfileArgs),

    /// Rank recipes by how well they fit the profile's daily targets
    Match {
        #[command(flatten)]
        profile: ProfileArgs,

        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,

        /// Weight table: full or core-five
        #[arg(long)]
        preset: Option<ScoringPreset>,
    },

    /// Fit the preparation-time model and save it
    Train {
        /// Search preset: basic or extended
        #[arg(long)]
        preset: Option<SearchPreset>,

        /// Search worker threads, 0 for all cores
        #[arg(long)]
        jobs: Option<usize>,

        /// Stop the search after this many seconds and keep the best finished trial
        #[arg(long)]
        time_budget: Option<f64>,

        /// Where to write the artifact; `.json` for JSON, anything else for bincode
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Recipes whose predicted preparation time is closest to a reference
    Recommend {
        /// Reference duration in minutes
        #[arg(long)]
        minutes: f64,

        #[arg(long, default_value_t = DEFAULT_TOP_N)]
        top_n: usize,
    },

    /// Look up recipes by id, ingredient or tag
    Search {
        #[arg(long)]
        id: Option<u64>,

        /// Substring of an ingredient name
        #[arg(long)]
        ingredient: Option<String>,

        /// Substring of a tag
        #[arg(long)]
        tag: Option<String>,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
}

#[derive(Args, Debug, Clone)]
pub struct ProfileArgs {
    /// Body weight in kilograms
    #[arg(long)]
    pub weight: f64,

    /// Height in centimetres
    #[arg(long)]
    pub height: f64,

    /// Age in whole years
    #[arg(long)]
    pub age: u32,

    /// male or female
    #[arg(long)]
    pub gender: String,

    /// sedentary, light, moderate, active or very_active
    #[arg(long)]
    pub activity: Option<String>,
}

impl ProfileArgs {
    pub fn to_profile(&self) -> UserProfile {
        UserProfile {
            weight_kg: self.weight,
            height_cm: self.height,
            age_years: self.age,
            gender: self.gender.parse::<Gender>().unwrap_or(Gender::Female),
            activity_level: ActivityLevel::parse_or_default(self.activity.as_deref()),
        }
    }
}

/// Builds the store query for the `search` subcommand.
pub fn search_query(id: Option<u64>, ingredient: Option<String>, tag: Option<String>, limit: usize) -> RecipeQuery {
    let mut query = match id {
        Some(id) => RecipeQuery::by_id(id),
        None => RecipeQuery::all(),
    };
    if let Some(fragment) = ingredient {
        query = query.with_ingredient(fragment);
    }
    if let Some(fragment) = tag {
        query = query.with_tag(fragment);
    }
    query.limit(limit)
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
