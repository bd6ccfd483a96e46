pub mod scorer;
pub mod targets;

pub use scorer::{
    nutrition_match_score, rank_by_nutrition, NutritionRecommendation, ScoringPreset, ScoringWeights,
    UnmappedNutrientPolicy, DEFAULT_TOP_N,
};
pub use targets::{
    calculate_energy_breakdown, compute_nutrition_targets, ActivityLevel, EnergyBreakdown, Gender,
    NutritionTarget, UserProfile,
};
