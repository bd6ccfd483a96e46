pub mod parse;
pub mod pipeline;

pub use parse::{parse_nutrition, parse_string_list, FieldParse, FieldParseError, NUTRITION_WIDTH};
pub use pipeline::{
    EncodedBatch, FeatureEncoder, FeatureMatrix, FeatureVocabulary, ImputeStrategy, ParseReport,
    BASE_COLUMNS, DEFAULT_INGREDIENT_VOCABULARY,
};
