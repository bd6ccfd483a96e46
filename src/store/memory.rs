//! Recipe store held in memory as integer-keyed tables.
//!
//! Recipes, ingredients and tags each live in their own table; the
//! `recipe_ingredient`, `recipe_tag`, `steps` and `nutrition` tables refer
//! to them by id only. Loading is done one recipe at a time: if anything
//! about a recipe fails, every row written for it is removed again before
//! the next one starts.

use crate::error::DataSourceError;
use crate::features::{parse_nutrition, parse_string_list};
use crate::recipe::{Nutrition, RawRecipeRow, RecipeRecord};
use crate::store::{RecipeQuery, RecipeStore};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Bound;
use thiserror::Error;
use tracing::{info, warn};

type IngredientId = usize;
type TagId = usize;

/// Why a single recipe could not be loaded.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("recipe {id}: missing required field '{field}'")]
    MissingField { id: u64, field: &'static str },
    #[error("recipe {id}: minutes must be a non-negative number, got {minutes}")]
    InvalidMinutes { id: u64, minutes: f64 },
    #[error("recipe id {0} is already in the store")]
    DuplicateId(u64),
    #[error("recipe {id}: {kind} {position} has a blank name")]
    BlankName {
        id: u64,
        kind: &'static str,
        position: usize,
    },
}

/// Outcome of a bulk load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSummary {
    pub added: usize,
    pub errors: usize,
    /// Rows whose recipe name was already present.
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
struct RecipeRow {
    name: String,
    minutes: f64,
    n_steps: u32,
    n_ingredients: u32,
}

/// Rows created for the recipe currently being loaded.
struct Journal {
    recipe_id: u64,
    ingredient_mark: usize,
    tag_mark: usize,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryRecipeStore {
    recipes: BTreeMap<u64, RecipeRow>,
    names: HashSet<String>,
    ingredients: Vec<String>,
    ingredient_ids: HashMap<String, IngredientId>,
    tags: Vec<String>,
    tag_ids: HashMap<String, TagId>,
    /// (recipe id, position) -> ingredient id
    recipe_ingredient: BTreeMap<(u64, u32), IngredientId>,
    recipe_tag: BTreeSet<(u64, TagId)>,
    /// (recipe id, step number) -> description
    steps: BTreeMap<(u64, u32), String>,
    nutrition: BTreeMap<u64, Nutrition>,
}

impl InMemoryRecipeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    pub fn ingredient_count(&self) -> usize {
        self.ingredients.len()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Loads each row as its own unit of work. Rows whose name is already in
    /// the store are skipped; rows that fail are rolled back and counted.
    pub fn bulk_load(&mut self, rows: &[RawRecipeRow]) -> LoadSummary {
        let mut summary = LoadSummary::default();
        for row in rows {
            if self.names.contains(row.name.trim()) {
                summary.skipped += 1;
                continue;
            }
            match self.insert(row) {
                Ok(()) => summary.added += 1,
                Err(error) => {
                    warn!(%error, "recipe not loaded");
                    summary.errors += 1;
                }
            }
        }
        info!(
            added = summary.added,
            errors = summary.errors,
            skipped = summary.skipped,
            total = self.len(),
            "bulk load finished"
        );
        summary
    }

    /// Inserts one recipe with all of its cross-references, or nothing.
    pub fn insert(&mut self, row: &RawRecipeRow) -> Result<(), RecordError> {
        let id = row.id;
        let name = row.name.trim();
        if name.is_empty() {
            return Err(RecordError::MissingField { id, field: "name" });
        }
        if self.recipes.contains_key(&id) {
            return Err(RecordError::DuplicateId(id));
        }
        let minutes = row.minutes.ok_or(RecordError::MissingField { id, field: "minutes" })?;
        if !(minutes.is_finite() && minutes >= 0.0) {
            return Err(RecordError::InvalidMinutes { id, minutes });
        }
        let n_steps = row.n_steps.ok_or(RecordError::MissingField { id, field: "n_steps" })?;
        let n_ingredients = row
            .n_ingredients
            .ok_or(RecordError::MissingField { id, field: "n_ingredients" })?;

        self.recipes.insert(
            id,
            RecipeRow {
                name: name.to_string(),
                minutes,
                n_steps,
                n_ingredients,
            },
        );
        let journal = Journal {
            recipe_id: id,
            ingredient_mark: self.ingredients.len(),
            tag_mark: self.tags.len(),
        };

        match self.attach(row) {
            Ok(()) => {
                self.names.insert(name.to_string());
                Ok(())
            }
            Err(error) => {
                self.rollback(journal);
                Err(error)
            }
        }
    }

    fn attach(&mut self, row: &RawRecipeRow) -> Result<(), RecordError> {
        let id = row.id;

        for (position, ingredient) in parse_string_list(&row.ingredients).into_value().iter().enumerate() {
            let ingredient = ingredient.trim();
            if ingredient.is_empty() {
                return Err(RecordError::BlankName {
                    id,
                    kind: "ingredient",
                    position,
                });
            }
            let ingredient_id = intern(&mut self.ingredients, &mut self.ingredient_ids, ingredient);
            self.recipe_ingredient.insert((id, position as u32), ingredient_id);
        }

        for (position, tag) in parse_string_list(&row.tags).into_value().iter().enumerate() {
            let tag = tag.trim();
            if tag.is_empty() {
                return Err(RecordError::BlankName { id, kind: "tag", position });
            }
            let tag_id = intern(&mut self.tags, &mut self.tag_ids, tag);
            self.recipe_tag.insert((id, tag_id));
        }

        for (number, step) in parse_string_list(&row.steps).into_value().into_iter().enumerate() {
            self.steps.insert((id, number as u32 + 1), step);
        }

        let values = parse_nutrition(&row.nutrition).into_value();
        self.nutrition.insert(id, Nutrition::from_array(values));
        Ok(())
    }

    fn rollback(&mut self, journal: Journal) {
        let id = journal.recipe_id;
        self.recipes.remove(&id);
        self.recipe_ingredient.retain(|(recipe, _), _| *recipe != id);
        self.recipe_tag.retain(|(recipe, _)| *recipe != id);
        self.steps.retain(|(recipe, _), _| *recipe != id);
        self.nutrition.remove(&id);

        for name in self.ingredients.drain(journal.ingredient_mark..) {
            self.ingredient_ids.remove(&name);
        }
        for name in self.tags.drain(journal.tag_mark..) {
            self.tag_ids.remove(&name);
        }
    }

    fn record(&self, id: u64, row: &RecipeRow) -> RecipeRecord {
        let ingredients = self
            .recipe_ingredient
            .range((id, 0)..=(id, u32::MAX))
            .map(|(_, &ingredient)| self.ingredients[ingredient].clone())
            .collect();
        let tags = self
            .recipe_tag
            .range((id, 0)..=(id, usize::MAX))
            .map(|&(_, tag)| self.tags[tag].clone())
            .collect();
        let steps = self
            .steps
            .range((id, 0)..=(id, u32::MAX))
            .map(|(_, step)| step.clone())
            .collect();

        RecipeRecord {
            id,
            name: row.name.clone(),
            minutes: row.minutes,
            n_steps: row.n_steps,
            n_ingredients: row.n_ingredients,
            ingredients,
            tags,
            steps,
            nutrition: self.nutrition.get(&id).copied().unwrap_or_default(),
        }
    }

    fn matches(&self, id: u64, query: &RecipeQuery) -> bool {
        if let Some(fragment) = &query.ingredient_contains {
            let fragment = fragment.to_lowercase();
            let found = self
                .recipe_ingredient
                .range((id, 0)..=(id, u32::MAX))
                .any(|(_, &ingredient)| self.ingredients[ingredient].to_lowercase().contains(&fragment));
            if !found {
                return false;
            }
        }
        if let Some(fragment) = &query.tag_contains {
            let fragment = fragment.to_lowercase();
            let found = self
                .recipe_tag
                .range((id, 0)..=(id, usize::MAX))
                .any(|&(_, tag)| self.tags[tag].to_lowercase().contains(&fragment));
            if !found {
                return false;
            }
        }
        true
    }
}

fn intern(names: &mut Vec<String>, ids: &mut HashMap<String, usize>, name: &str) -> usize {
    if let Some(&id) = ids.get(name) {
        return id;
    }
    let id = names.len();
    names.push(name.to_string());
    ids.insert(name.to_string(), id);
    id
}

impl RecipeStore for InMemoryRecipeStore {
    fn fetch(&self, query: &RecipeQuery) -> Result<Vec<RecipeRecord>, DataSourceError> {
        let limit = query.limit.unwrap_or(usize::MAX);
        let ids = match query.id {
            Some(id) => (Bound::Included(id), Bound::Included(id)),
            None => (Bound::Unbounded, Bound::Unbounded),
        };
        Ok(self
            .recipes
            .range(ids)
            .filter(|(id, _)| self.matches(**id, query))
            .take(limit)
            .map(|(id, row)| self.record(*id, row))
            .collect())
    }
}
