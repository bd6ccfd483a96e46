pub mod csv_loader;
pub mod memory;

use crate::error::DataSourceError;
use crate::recipe::RecipeRecord;
use serde::{Deserialize, Serialize};

pub use csv_loader::{load_raw_recipes, read_raw_recipes};
pub use memory::{InMemoryRecipeStore, LoadSummary, RecordError};

/// Filters for a store read. Unset filters match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeQuery {
    pub id: Option<u64>,
    /// Case-insensitive substring of any ingredient name.
    pub ingredient_contains: Option<String>,
    /// Case-insensitive substring of any tag.
    pub tag_contains: Option<String>,
    pub limit: Option<usize>,
}

impl RecipeQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: u64) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn with_ingredient(mut self, fragment: impl Into<String>) -> Self {
        self.ingredient_contains = Some(fragment.into());
        self
    }

    pub fn with_tag(mut self, fragment: impl Into<String>) -> Self {
        self.tag_contains = Some(fragment.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Read access to recipes, whatever holds them.
pub trait RecipeStore: Send + Sync {
    /// Recipes matching `query`, in ascending id order.
    fn fetch(&self, query: &RecipeQuery) -> Result<Vec<RecipeRecord>, DataSourceError>;

    fn fetch_all(&self) -> Result<Vec<RecipeRecord>, DataSourceError> {
        self.fetch(&RecipeQuery::all())
    }
}
