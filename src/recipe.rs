use serde::{Deserialize, Serialize};
use std::fmt;

/// The seven nutrients carried by every recipe, in dataset column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Calories,
    TotalFat,
    Sugar,
    Sodium,
    Protein,
    SaturatedFat,
    Carbohydrates,
}

impl Nutrient {
    /// Dataset order: calories, total fat, sugar, sodium, protein, saturated fat, carbohydrates.
    pub const ALL: [Nutrient; 7] = [
        Nutrient::Calories,
        Nutrient::TotalFat,
        Nutrient::Sugar,
        Nutrient::Sodium,
        Nutrient::Protein,
        Nutrient::SaturatedFat,
        Nutrient::Carbohydrates,
    ];

    pub fn column_name(self) -> &'static str {
        match self {
            Nutrient::Calories => "calories",
            Nutrient::TotalFat => "total_fat",
            Nutrient::Sugar => "sugar",
            Nutrient::Sodium => "sodium",
            Nutrient::Protein => "protein",
            Nutrient::SaturatedFat => "saturated_fat",
            Nutrient::Carbohydrates => "carbohydrates",
        }
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// Per-recipe nutrition vector. A `NaN` entry means the value is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Nutrition {
    pub calories: f64,
    pub total_fat: f64,
    pub sugar: f64,
    pub sodium: f64,
    pub protein: f64,
    pub saturated_fat: f64,
    pub carbohydrates: f64,
}

impl Nutrition {
    pub fn from_array(values: [f64; 7]) -> Self {
        let [calories, total_fat, sugar, sodium, protein, saturated_fat, carbohydrates] = values;
        Self {
            calories,
            total_fat,
            sugar,
            sodium,
            protein,
            saturated_fat,
            carbohydrates,
        }
    }

    pub fn to_array(&self) -> [f64; 7] {
        [
            self.calories,
            self.total_fat,
            self.sugar,
            self.sodium,
            self.protein,
            self.saturated_fat,
            self.carbohydrates,
        ]
    }

    pub fn get(&self, nutrient: Nutrient) -> f64 {
        match nutrient {
            Nutrient::Calories => self.calories,
            Nutrient::TotalFat => self.total_fat,
            Nutrient::Sugar => self.sugar,
            Nutrient::Sodium => self.sodium,
            Nutrient::Protein => self.protein,
            Nutrient::SaturatedFat => self.saturated_fat,
            Nutrient::Carbohydrates => self.carbohydrates,
        }
    }
}

/// A fully typed recipe as held by the recipe store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRecord {
    pub id: u64,
    pub name: String,
    pub minutes: f64,
    pub n_steps: u32,
    pub n_ingredients: u32,
    pub ingredients: Vec<String>,
    pub tags: Vec<String>,
    pub steps: Vec<String>,
    pub nutrition: Nutrition,
}

/// A recipe in the semi-structured shape of the source dataset: list columns
/// are still literal text and numeric columns may be blank.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRecipeRow {
    pub id: u64,
    pub name: String,
    pub minutes: Option<f64>,
    pub n_steps: Option<u32>,
    pub n_ingredients: Option<u32>,
    pub ingredients: String,
    pub tags: String,
    pub steps: String,
    pub nutrition: String,
}

impl From<&RecipeRecord> for RawRecipeRow {
    fn from(record: &RecipeRecord) -> Self {
        // JSON is a subset of what the field parsers accept, so a stored
        // record re-parses to exactly the same values.
        let render_list = |items: &[String]| {
            serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
        };
        let nutrition = record
            .nutrition
            .to_array()
            .iter()
            .map(|v| if v.is_finite() { v.to_string() } else { "null".to_string() })
            .collect::<Vec<_>>()
            .join(", ");

        Self {
            id: record.id,
            name: record.name.clone(),
            minutes: Some(record.minutes),
            n_steps: Some(record.n_steps),
            n_ingredients: Some(record.n_ingredients),
            ingredients: render_list(&record.ingredients),
            tags: render_list(&record.tags),
            steps: render_list(&record.steps),
            nutrition: format!("[{}]", nutrition),
        }
    }
}

/// Row-aligned descriptive data that travels with a feature matrix so that
/// predictions can be traced back to recipes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeMetadata {
    pub id: u64,
    pub name: String,
    pub ingredients: Vec<String>,
    pub tags: Vec<String>,
    pub steps: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nutrition_array_order_matches_nutrient_order() {
        let nutrition = Nutrition::from_array([1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
        for (idx, nutrient) in Nutrient::ALL.iter().enumerate() {
            assert_eq!(nutrition.get(*nutrient), (idx + 1) as f64);
        }
        assert_eq!(nutrition.to_array(), [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_raw_row_from_record_renders_json_lists() {
        let record = RecipeRecord {
            id: 7,
            name: "chef's toast".to_string(),
            minutes: 5.0,
            n_steps: 2,
            n_ingredients: 2,
            ingredients: vec!["bread".to_string(), "butter".to_string()],
            tags: vec!["breakfast".to_string()],
            steps: vec!["toast".to_string(), "spread".to_string()],
            nutrition: Nutrition::from_array([100.0, 5.0, 1.0, 2.0, 3.0, f64::NAN, 10.0]),
        };
        let raw = RawRecipeRow::from(&record);
        assert_eq!(raw.ingredients, r#"["bread","butter"]"#);
        assert_eq!(raw.nutrition, "[100, 5, 1, 2, 3, null, 10]");
        assert_eq!(raw.minutes, Some(5.0));
    }
}
