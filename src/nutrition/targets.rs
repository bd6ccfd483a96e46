use crate::error::ValidationError;
use crate::recipe::Nutrient;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Recommended daily sodium intake in milligrams, independent of the profile.
pub const DAILY_SODIUM_MG: f64 = 2300.0;

/// Protein grams per kilogram of body weight.
const PROTEIN_G_PER_KG: f64 = 1.6;

const KCAL_PER_G_CARB: f64 = 4.0;
const KCAL_PER_G_FAT: f64 = 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = std::convert::Infallible;

    /// Anything that is not recognisably male takes the female branch of the
    /// formula, mirroring the equation's "otherwise" constant.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "male" | "m" | "man" | "hombre" => Gender::Male,
            _ => Gender::Female,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Sedentary,
    Light,
    #[default]
    Moderate,
    Active,
    VeryActive,
}

impl ActivityLevel {
    /// TDEE multiplier applied to the basal metabolic rate.
    pub fn multiplier(self) -> f64 {
        match self {
            ActivityLevel::Sedentary => 1.2,
            ActivityLevel::Light => 1.375,
            ActivityLevel::Moderate => 1.55,
            ActivityLevel::Active => 1.725,
            ActivityLevel::VeryActive => 1.9,
        }
    }

    /// Lenient parse: missing or unrecognised labels fall back to `Moderate`.
    pub fn parse_or_default(label: Option<&str>) -> Self {
        label.and_then(Self::parse_label).unwrap_or_default()
    }

    fn parse_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "sedentary" | "sedentario" => Some(ActivityLevel::Sedentary),
            "light" | "lightly_active" | "ligero" => Some(ActivityLevel::Light),
            "moderate" | "moderately_active" | "moderado" => Some(ActivityLevel::Moderate),
            "active" | "activo" => Some(ActivityLevel::Active),
            "very_active" | "extra_active" | "muy_activo" => Some(ActivityLevel::VeryActive),
            _ => None,
        }
    }
}

/// Biometric profile used to derive daily targets. Built per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub weight_kg: f64,
    pub height_cm: f64,
    pub age_years: u32,
    pub gender: Gender,
    #[serde(default)]
    pub activity_level: ActivityLevel,
}

/// Daily nutrient targets. Units follow the recipe dataset: kcal, grams, and
/// milligrams for sodium.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NutritionTarget {
    pub calories: f64,
    pub protein: f64,
    pub carbohydrates: f64,
    pub fat_total: f64,
    pub sugar: f64,
    pub sodium: f64,
    pub saturated_fat: f64,
}

impl NutritionTarget {
    pub fn get(&self, nutrient: Nutrient) -> f64 {
        match nutrient {
            Nutrient::Calories => self.calories,
            Nutrient::TotalFat => self.fat_total,
            Nutrient::Sugar => self.sugar,
            Nutrient::Sodium => self.sodium,
            Nutrient::Protein => self.protein,
            Nutrient::SaturatedFat => self.saturated_fat,
            Nutrient::Carbohydrates => self.carbohydrates,
        }
    }
}

/// Targets together with the intermediate energy figures they came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnergyBreakdown {
    pub bmr: f64,
    pub tdee: f64,
    pub targets: NutritionTarget,
}

/// Basal metabolic rate via the Mifflin-St Jeor equation.
///
/// `BMR = 10 * weight_kg + 6.25 * height_cm - 5 * age + s`, where `s` is +5
/// for men and -161 otherwise.
pub fn mifflin_st_jeor(weight_kg: f64, height_cm: f64, age_years: u32, gender: Gender) -> f64 {
    let base = 10.0 * weight_kg + 6.25 * height_cm - 5.0 * f64::from(age_years);
    match gender {
        Gender::Male => base + 5.0,
        Gender::Female => base - 161.0,
    }
}

/// Computes BMR, TDEE and the derived daily nutrient targets for a profile.
///
/// # Errors
/// Returns a `ValidationError` when weight or height is not a positive finite
/// number, or when age is zero.
pub fn calculate_energy_breakdown(profile: &UserProfile) -> Result<EnergyBreakdown, ValidationError> {
    if !(profile.weight_kg.is_finite() && profile.weight_kg > 0.0) {
        return Err(ValidationError::Weight(profile.weight_kg));
    }
    if !(profile.height_cm.is_finite() && profile.height_cm > 0.0) {
        return Err(ValidationError::Height(profile.height_cm));
    }
    if profile.age_years == 0 {
        return Err(ValidationError::Age(profile.age_years));
    }

    let bmr = mifflin_st_jeor(profile.weight_kg, profile.height_cm, profile.age_years, profile.gender);
    let tdee = bmr * profile.activity_level.multiplier();

    let targets = NutritionTarget {
        calories: tdee,
        protein: profile.weight_kg * PROTEIN_G_PER_KG,
        carbohydrates: 0.45 * tdee / KCAL_PER_G_CARB,
        fat_total: 0.25 * tdee / KCAL_PER_G_FAT,
        sugar: 0.10 * tdee / KCAL_PER_G_CARB,
        sodium: DAILY_SODIUM_MG,
        saturated_fat: 0.07 * tdee / KCAL_PER_G_FAT,
    };

    Ok(EnergyBreakdown { bmr, tdee, targets })
}

/// Daily nutrient targets for a profile.
pub fn compute_nutrition_targets(profile: &UserProfile) -> Result<NutritionTarget, ValidationError> {
    calculate_energy_breakdown(profile).map(|breakdown| breakdown.targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_profile() -> UserProfile {
        UserProfile {
            weight_kg: 75.0,
            height_cm: 175.0,
            age_years: 30,
            gender: Gender::Female,
            activity_level: ActivityLevel::Moderate,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected {expected}, got {actual}");
    }

    #[test]
    fn test_reference_female_profile() {
        let breakdown = calculate_energy_breakdown(&reference_profile()).unwrap();
        assert_close(breakdown.bmr, 1532.75);
        assert_close(breakdown.targets.calories, 2375.7625);
        assert_close(breakdown.targets.protein, 120.0);
        assert_eq!(breakdown.targets.sodium, 2300.0);
        assert_close(breakdown.targets.carbohydrates, 0.45 * 2375.7625 / 4.0);
        assert_close(breakdown.targets.fat_total, 0.25 * 2375.7625 / 9.0);
        assert_close(breakdown.targets.sugar, 0.10 * 2375.7625 / 4.0);
        assert_close(breakdown.targets.saturated_fat, 0.07 * 2375.7625 / 9.0);
    }

    #[test]
    fn test_male_offset() {
        let mut profile = reference_profile();
        profile.gender = Gender::Male;
        let breakdown = calculate_energy_breakdown(&profile).unwrap();
        // 1532.75 + 161 + 5
        assert_close(breakdown.bmr, 1698.75);
    }

    #[test]
    fn test_activity_multipliers() {
        let table = [
            ("sedentary", 1.2),
            ("light", 1.375),
            ("moderate", 1.55),
            ("active", 1.725),
            ("very_active", 1.9),
        ];
        for (label, expected) in table {
            assert_eq!(ActivityLevel::parse_or_default(Some(label)).multiplier(), expected, "{label}");
        }
    }

    #[test]
    fn test_unrecognised_activity_falls_back_to_moderate() {
        assert_eq!(ActivityLevel::parse_or_default(Some("couch potato")).multiplier(), 1.55);
        assert_eq!(ActivityLevel::parse_or_default(Some("")).multiplier(), 1.55);
        assert_eq!(ActivityLevel::parse_or_default(None), ActivityLevel::Moderate);
    }

    #[test]
    fn test_activity_aliases() {
        assert_eq!(ActivityLevel::parse_or_default(Some("Very Active")), ActivityLevel::VeryActive);
        assert_eq!(ActivityLevel::parse_or_default(Some("muy_activo")), ActivityLevel::VeryActive);
        assert_eq!(ActivityLevel::parse_or_default(Some("SEDENTARIO")), ActivityLevel::Sedentary);
    }

    #[test]
    fn test_gender_parse() {
        assert_eq!("Male".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("hombre".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("female".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("mujer".parse::<Gender>().unwrap(), Gender::Female);
    }

    #[test]
    fn test_rejects_invalid_biometrics() {
        let mut profile = reference_profile();
        profile.weight_kg = 0.0;
        assert_eq!(compute_nutrition_targets(&profile), Err(ValidationError::Weight(0.0)));

        let mut profile = reference_profile();
        profile.height_cm = -1.0;
        assert_eq!(compute_nutrition_targets(&profile), Err(ValidationError::Height(-1.0)));

        let mut profile = reference_profile();
        profile.age_years = 0;
        assert_eq!(compute_nutrition_targets(&profile), Err(ValidationError::Age(0)));

        let mut profile = reference_profile();
        profile.weight_kg = f64::NAN;
        assert!(matches!(compute_nutrition_targets(&profile), Err(ValidationError::Weight(_))));
    }
}
