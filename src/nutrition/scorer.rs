use crate::nutrition::targets::NutritionTarget;
use crate::ranking::{select_top_k, RankedIndex};
use crate::recipe::{Nutrient, Nutrition, RecipeRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

pub const DEFAULT_TOP_N: usize = 5;

/// What to do with a nutrient that has no entry in the weight table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmappedNutrientPolicy {
    /// Score the nutrient with this weight.
    DefaultWeight(f64),
    /// Leave the nutrient out of the score.
    Skip,
}

/// Named weight tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoringPreset {
    /// All seven nutrients weighted explicitly.
    #[default]
    Full,
    /// Only calories, protein, carbohydrates, total fat and sugar are
    /// weighted; sodium and saturated fat go through the unmapped policy.
    CoreFive,
}

impl FromStr for ScoringPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "full" => Ok(ScoringPreset::Full),
            "core_five" => Ok(ScoringPreset::CoreFive),
            _ => Err(format!("unknown scoring preset '{s}', expected 'full' or 'core-five'")),
        }
    }
}

/// Per-nutrient weights for the match score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub weights: BTreeMap<Nutrient, f64>,
    pub unmapped: UnmappedNutrientPolicy,
}

impl ScoringWeights {
    pub fn full() -> Self {
        let mut weights = Self::core_five().weights;
        weights.insert(Nutrient::Sodium, -0.05);
        weights.insert(Nutrient::SaturatedFat, -0.05);
        Self {
            weights,
            unmapped: UnmappedNutrientPolicy::DefaultWeight(-0.1),
        }
    }

    pub fn core_five() -> Self {
        let weights = BTreeMap::from([
            (Nutrient::Calories, -0.2),
            (Nutrient::Protein, 0.3),
            (Nutrient::Carbohydrates, 0.2),
            (Nutrient::TotalFat, -0.1),
            (Nutrient::Sugar, -0.1),
        ]);
        Self {
            weights,
            unmapped: UnmappedNutrientPolicy::DefaultWeight(-0.1),
        }
    }

    pub fn from_preset(preset: ScoringPreset) -> Self {
        match preset {
            ScoringPreset::Full => Self::full(),
            ScoringPreset::CoreFive => Self::core_five(),
        }
    }

    pub fn with_unmapped(mut self, policy: UnmappedNutrientPolicy) -> Self {
        self.unmapped = policy;
        self
    }

    fn weight_for(&self, nutrient: Nutrient) -> Option<f64> {
        match self.weights.get(&nutrient) {
            Some(weight) => Some(*weight),
            None => match self.unmapped {
                UnmappedNutrientPolicy::DefaultWeight(weight) => Some(weight),
                UnmappedNutrientPolicy::Skip => None,
            },
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self::full()
    }
}

/// A recipe ranked by how well its nutrition matches the daily targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionRecommendation {
    pub recipe_id: u64,
    pub name: String,
    pub minutes: f64,
    pub nutrition: Nutrition,
    pub score: f64,
    pub ingredients: Vec<String>,
    pub tags: Vec<String>,
    pub steps: Vec<String>,
}

/// Weighted closeness of a nutrition vector to the targets.
///
/// Each nutrient known on both sides contributes
/// `weight * (1 - |actual - target| / max(target, 1))`.
pub fn nutrition_match_score(target: &NutritionTarget, nutrition: &Nutrition, weights: &ScoringWeights) -> f64 {
    let score: f64 = Nutrient::ALL
        .iter()
        .filter_map(|&nutrient| {
            let goal = target.get(nutrient);
            let actual = nutrition.get(nutrient);
            if !goal.is_finite() || !actual.is_finite() {
                return None;
            }
            let weight = weights.weight_for(nutrient)?;
            let deviation = (actual - goal).abs() / goal.max(1.0);
            Some(weight * (1.0 - deviation))
        })
        .sum();
    // An empty sum is -0.0; report it as 0.0.
    score + 0.0
}

/// Ranks candidate recipes against the targets and keeps the best `top_n`.
///
/// Ordering is by score descending with ascending recipe id breaking ties, so
/// the same inputs always yield the same list.
pub fn rank_by_nutrition(
    target: &NutritionTarget,
    candidates: &[RecipeRecord],
    top_n: usize,
    weights: &ScoringWeights,
) -> Vec<NutritionRecommendation> {
    let scores: Vec<f64> = candidates
        .iter()
        .map(|recipe| nutrition_match_score(target, &recipe.nutrition, weights))
        .collect();

    let ranked = select_top_k(
        candidates
            .iter()
            .zip(scores.iter())
            .enumerate()
            .map(|(index, (recipe, score))| RankedIndex::new(-score, recipe.id, index)),
        top_n,
    );

    ranked
        .into_iter()
        .map(|entry| {
            let recipe = &candidates[entry.index];
            NutritionRecommendation {
                recipe_id: recipe.id,
                name: recipe.name.clone(),
                minutes: recipe.minutes,
                nutrition: recipe.nutrition,
                score: scores[entry.index],
                ingredients: recipe.ingredients.clone(),
                tags: recipe.tags.clone(),
                steps: recipe.steps.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nutrition::targets::DAILY_SODIUM_MG;

    fn target() -> NutritionTarget {
        NutritionTarget {
            calories: 2000.0,
            protein: 100.0,
            carbohydrates: 250.0,
            fat_total: 60.0,
            sugar: 50.0,
            sodium: DAILY_SODIUM_MG,
            saturated_fat: 15.0,
        }
    }

    fn recipe(id: u64, nutrition: [f64; 7]) -> RecipeRecord {
        RecipeRecord {
            id,
            name: format!("recipe {id}"),
            minutes: 30.0,
            n_steps: 3,
            n_ingredients: 4,
            ingredients: vec![],
            tags: vec![],
            steps: vec![],
            nutrition: Nutrition::from_array(nutrition),
        }
    }

    #[test]
    fn test_perfect_match_scores_sum_of_weights() {
        let t = target();
        let exact = Nutrition {
            calories: t.calories,
            total_fat: t.fat_total,
            sugar: t.sugar,
            sodium: t.sodium,
            protein: t.protein,
            saturated_fat: t.saturated_fat,
            carbohydrates: t.carbohydrates,
        };
        let score = nutrition_match_score(&t, &exact, &ScoringWeights::full());
        // -0.2 + 0.3 + 0.2 - 0.1 - 0.1 - 0.05 - 0.05
        assert!((score - 0.0).abs() < 1e-12);
    }

    #[test]
    fn test_deviation_uses_floor_of_one() {
        let mut t = target();
        t.protein = 0.5;
        let weights = ScoringWeights {
            weights: BTreeMap::from([(Nutrient::Protein, 1.0)]),
            unmapped: UnmappedNutrientPolicy::Skip,
        };
        let nutrition = Nutrition { protein: 2.5, ..Nutrition::default() };
        // |2.5 - 0.5| / max(0.5, 1) = 2
        let score = nutrition_match_score(&t, &nutrition, &weights);
        assert!((score - (1.0 - 2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_unmapped_policy_controls_missing_weights() {
        let t = target();
        let nutrition = Nutrition::from_array([0.0; 7]);
        let with_default = nutrition_match_score(&t, &nutrition, &ScoringWeights::core_five());
        let skipped = nutrition_match_score(
            &t,
            &nutrition,
            &ScoringWeights::core_five().with_unmapped(UnmappedNutrientPolicy::Skip),
        );
        // Zero intake has deviation 1 everywhere, so every term is 0 either way.
        assert_eq!(with_default, 0.0);
        assert_eq!(skipped, 0.0);

        let half = Nutrition {
            sodium: DAILY_SODIUM_MG / 2.0,
            ..Nutrition::from_array([0.0; 7])
        };
        let with_default = nutrition_match_score(&t, &half, &ScoringWeights::core_five());
        let skipped = nutrition_match_score(
            &t,
            &half,
            &ScoringWeights::core_five().with_unmapped(UnmappedNutrientPolicy::Skip),
        );
        assert!((with_default - (-0.1 * 0.5)).abs() < 1e-12);
        assert_eq!(skipped, 0.0);
    }

    #[test]
    fn test_missing_values_are_ignored() {
        let t = target();
        let nutrition = Nutrition::from_array([f64::NAN; 7]);
        assert_eq!(nutrition_match_score(&t, &nutrition, &ScoringWeights::full()), 0.0);
    }

    #[test]
    fn test_rank_is_deterministic_with_id_tie_break() {
        let t = target();
        let candidates = vec![
            recipe(5, [500.0, 20.0, 10.0, 600.0, 30.0, 5.0, 60.0]),
            recipe(2, [500.0, 20.0, 10.0, 600.0, 30.0, 5.0, 60.0]),
            recipe(9, [1900.0, 55.0, 45.0, 2200.0, 95.0, 14.0, 240.0]),
            recipe(1, [100.0, 1.0, 90.0, 50.0, 2.0, 1.0, 10.0]),
        ];
        let first = rank_by_nutrition(&t, &candidates, 3, &ScoringWeights::full());
        let second = rank_by_nutrition(&t, &candidates, 3, &ScoringWeights::full());
        assert_eq!(first, second);

        let ids: Vec<u64> = first.iter().map(|r| r.recipe_id).collect();
        assert_eq!(ids[1..], [2, 5]);
        assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_top_n_is_capped_and_empty_input_is_empty() {
        let t = target();
        assert!(rank_by_nutrition(&t, &[], DEFAULT_TOP_N, &ScoringWeights::full()).is_empty());

        let candidates = vec![recipe(1, [0.0; 7]), recipe(2, [0.0; 7])];
        assert_eq!(rank_by_nutrition(&t, &candidates, 10, &ScoringWeights::full()).len(), 2);
    }

    #[test]
    fn test_unknown_and_zero_nutrition_tie_by_id() {
        let t = target();
        let candidates = vec![recipe(2, [0.0; 7]), recipe(1, [f64::NAN; 7])];
        let ranked = rank_by_nutrition(&t, &candidates, 2, &ScoringWeights::full());

        assert_eq!(ranked[0].score, ranked[1].score);
        assert!(ranked.iter().all(|r| r.score.is_sign_positive()));
        let ids: Vec<u64> = ranked.iter().map(|r| r.recipe_id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_preset_names_parse() {
        assert_eq!("core-five".parse::<ScoringPreset>(), Ok(ScoringPreset::CoreFive));
        assert_eq!(" Full ".parse::<ScoringPreset>(), Ok(ScoringPreset::Full));
        assert!("balanced".parse::<ScoringPreset>().is_err());
    }
}
