use crate::features::parse::{parse_nutrition, parse_string_list, NUTRITION_WIDTH};
use crate::recipe::{Nutrient, RawRecipeRow, RecipeMetadata, RecipeRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, warn};

/// Ingredients flagged by default. Matching is exact on lower-cased names.
pub const DEFAULT_INGREDIENT_VOCABULARY: [&str; 13] = [
    "flour", "sugar", "salt", "butter", "milk", "egg", "water", "olive oil", "garlic", "onion", "pepper",
    "chicken", "vanilla",
];

/// Numeric columns that lead every feature row.
pub const BASE_COLUMNS: [&str; 4] = ["n_steps", "n_ingredients", "steps_complexity", "ingredient_density"];

const INGREDIENT_PREFIX: &str = "ingredient_";
const TAG_PREFIX: &str = "tag_";

/// The categorical vocabularies that fix the feature layout.
///
/// The ingredient list is chosen up front; the tag list is learned from the
/// batch a model is fitted on and must travel with that model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVocabulary {
    ingredients: Vec<String>,
    tags: Vec<String>,
}

impl FeatureVocabulary {
    /// Ingredients are lower-cased and de-duplicated keeping first occurrence;
    /// tags are de-duplicated and sorted.
    pub fn new<I, T>(ingredients: I, tags: T) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        T: IntoIterator,
        T::Item: AsRef<str>,
    {
        let mut seen = HashSet::new();
        let ingredients = ingredients
            .into_iter()
            .map(|name| name.as_ref().trim().to_lowercase())
            .filter(|name| !name.is_empty() && seen.insert(name.clone()))
            .collect();
        let tags = tags
            .into_iter()
            .map(|tag| tag.as_ref().trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Self { ingredients, tags }
    }

    pub fn ingredients(&self) -> &[String] {
        &self.ingredients
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    /// Number of feature columns this vocabulary produces.
    pub fn width(&self) -> usize {
        BASE_COLUMNS.len() + self.ingredients.len() + NUTRITION_WIDTH + self.tags.len()
    }

    /// Ordered feature column names.
    pub fn column_names(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(self.width());
        columns.extend(BASE_COLUMNS.iter().map(|c| c.to_string()));
        columns.extend(self.ingredients.iter().map(|i| format!("{INGREDIENT_PREFIX}{i}")));
        columns.extend(Nutrient::ALL.iter().map(|n| n.column_name().to_string()));
        columns.extend(self.tags.iter().map(|t| format!("{TAG_PREFIX}{t}")));
        columns
    }
}

/// How missing numeric cells are filled once the matrix is assembled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputeStrategy {
    #[default]
    Zero,
    /// Mean of the column's known values in the rows the encoder was fitted
    /// on. An encoder without fitted means falls back to the batch at hand.
    ColumnMean,
}

/// Dense row-major matrix with named columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    values: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Returns `None` when `values` is not a whole number of rows.
    pub fn new(columns: Vec<String>, values: Vec<f64>) -> Option<Self> {
        let width = columns.len();
        if width == 0 {
            return values.is_empty().then_some(Self { columns, values, n_rows: 0 });
        }
        if values.len() % width != 0 {
            return None;
        }
        let n_rows = values.len() / width;
        Some(Self { columns, values, n_rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.n_cols();
        &self.values[index * width..(index + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// New matrix holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut values = Vec::with_capacity(indices.len() * self.n_cols());
        for &i in indices {
            values.extend_from_slice(self.row(i));
        }
        Self {
            columns: self.columns.clone(),
            values,
            n_rows: indices.len(),
        }
    }
}

/// Per-batch tally of fields that fell back to their defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParseReport {
    pub rows: usize,
    pub ingredient_fallbacks: usize,
    pub tag_fallbacks: usize,
    pub step_fallbacks: usize,
    pub nutrition_fallbacks: usize,
    pub imputed_cells: usize,
}

impl ParseReport {
    pub fn total_fallbacks(&self) -> usize {
        self.ingredient_fallbacks + self.tag_fallbacks + self.step_fallbacks + self.nutrition_fallbacks
    }
}

/// Feature matrix plus row-aligned targets and metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    pub matrix: FeatureMatrix,
    /// Preparation minutes; `NaN` where the source row had none.
    pub targets: Vec<f64>,
    pub metadata: Vec<RecipeMetadata>,
    pub report: ParseReport,
}

impl EncodedBatch {
    pub fn len(&self) -> usize {
        self.matrix.n_rows()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            matrix: self.matrix.select_rows(indices),
            targets: indices.iter().map(|&i| self.targets[i]).collect(),
            metadata: indices.iter().map(|&i| self.metadata[i].clone()).collect(),
            report: self.report,
        }
    }
}

struct ParsedRow {
    id: u64,
    name: String,
    minutes: Option<f64>,
    n_steps: Option<u32>,
    n_ingredients: Option<u32>,
    ingredients: Vec<String>,
    tags: Vec<String>,
    steps: Vec<String>,
    nutrition: [f64; NUTRITION_WIDTH],
}

/// Turns recipe rows into model-ready feature matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEncoder {
    vocabulary: FeatureVocabulary,
    impute: ImputeStrategy,
    fill_values: Option<Vec<f64>>,
}

impl FeatureEncoder {
    /// Encoder bound to an existing vocabulary, typically the one stored in a
    /// model artifact.
    pub fn from_vocabulary(vocabulary: FeatureVocabulary, impute: ImputeStrategy) -> Self {
        Self {
            vocabulary,
            impute,
            fill_values: None,
        }
    }

    /// Pins the per-column fill values used for missing cells. Values whose
    /// length differs from the vocabulary width are dropped.
    pub fn with_fill_values(mut self, fill_values: Option<Vec<f64>>) -> Self {
        let width = self.vocabulary.width();
        self.fill_values = fill_values.filter(|fills| fills.len() == width);
        self
    }

    /// Learns the tag vocabulary from `rows` and encodes them with it.
    pub fn fit<S: AsRef<str>>(
        rows: &[RawRecipeRow],
        ingredient_vocabulary: &[S],
        impute: ImputeStrategy,
    ) -> (Self, EncodedBatch) {
        let (parsed, report) = parse_rows(rows);
        let vocabulary = FeatureVocabulary::new(
            ingredient_vocabulary.iter().map(|s| s.as_ref()),
            parsed.iter().flat_map(|row| row.tags.iter()),
        );
        debug!(
            rows = rows.len(),
            tags = vocabulary.tags().len(),
            ingredients = vocabulary.ingredients().len(),
            "fitted feature vocabulary"
        );
        let mut encoder = Self::from_vocabulary(vocabulary, impute);
        let (batch, fills) = encoder.assemble(parsed, report);
        if impute == ImputeStrategy::ColumnMean {
            encoder.fill_values = Some(fills);
        }
        (encoder, batch)
    }

    pub fn vocabulary(&self) -> &FeatureVocabulary {
        &self.vocabulary
    }

    pub fn impute_strategy(&self) -> ImputeStrategy {
        self.impute
    }

    /// Fill values learned by [`FeatureEncoder::fit`] under
    /// [`ImputeStrategy::ColumnMean`].
    pub fn fill_values(&self) -> Option<&[f64]> {
        self.fill_values.as_deref()
    }

    /// Encodes rows with this encoder's fixed vocabulary. Tags outside the
    /// vocabulary are ignored.
    pub fn encode(&self, rows: &[RawRecipeRow]) -> EncodedBatch {
        let (parsed, report) = parse_rows(rows);
        self.assemble(parsed, report).0
    }

    /// Encodes typed store records through the same path as raw rows.
    pub fn encode_records(&self, records: &[RecipeRecord]) -> EncodedBatch {
        let rows: Vec<RawRecipeRow> = records.iter().map(RawRecipeRow::from).collect();
        self.encode(&rows)
    }

    /// Builds the matrix and fills missing cells; also returns the per-column
    /// fill values that were applied.
    fn assemble(&self, parsed: Vec<ParsedRow>, mut report: ParseReport) -> (EncodedBatch, Vec<f64>) {
        let columns = self.vocabulary.column_names();
        let width = columns.len();
        let mut values = Vec::with_capacity(parsed.len() * width);
        let mut targets = Vec::with_capacity(parsed.len());
        let mut metadata = Vec::with_capacity(parsed.len());

        for row in parsed {
            let n_steps = row.n_steps.map_or(f64::NAN, f64::from);
            let n_ingredients = row.n_ingredients.map_or(f64::NAN, f64::from);
            values.push(n_steps);
            values.push(n_ingredients);
            values.push(n_steps * n_ingredients);
            values.push(if n_steps.is_nan() {
                f64::NAN
            } else {
                n_ingredients / n_steps.max(1.0)
            });

            let present: HashSet<String> = row.ingredients.iter().map(|i| i.trim().to_lowercase()).collect();
            values.extend(
                self.vocabulary
                    .ingredients()
                    .iter()
                    .map(|name| if present.contains(name) { 1.0 } else { 0.0 }),
            );

            values.extend_from_slice(&row.nutrition);

            let tags: HashSet<&str> = row.tags.iter().map(|t| t.trim()).collect();
            values.extend(
                self.vocabulary
                    .tags()
                    .iter()
                    .map(|tag| if tags.contains(tag.as_str()) { 1.0 } else { 0.0 }),
            );

            targets.push(row.minutes.unwrap_or(f64::NAN));
            metadata.push(RecipeMetadata {
                id: row.id,
                name: row.name,
                ingredients: row.ingredients,
                tags: row.tags,
                steps: row.steps,
            });
        }

        let fills = match &self.fill_values {
            Some(learned) if learned.len() == width => learned.clone(),
            _ => column_fill_values(&values, width, self.impute),
        };
        report.imputed_cells = fill_missing(&mut values, width, &fills);
        if report.imputed_cells > 0 {
            debug!(cells = report.imputed_cells, strategy = ?self.impute, "imputed missing feature values");
        }

        let matrix = FeatureMatrix {
            columns,
            n_rows: targets.len(),
            values,
        };
        (EncodedBatch { matrix, targets, metadata, report }, fills)
    }
}

fn parse_rows(rows: &[RawRecipeRow]) -> (Vec<ParsedRow>, ParseReport) {
    let mut report = ParseReport {
        rows: rows.len(),
        ..ParseReport::default()
    };

    let parsed = rows
        .iter()
        .map(|row| {
            let ingredients = parse_string_list(&row.ingredients);
            let tags = parse_string_list(&row.tags);
            let steps = parse_string_list(&row.steps);
            let nutrition = parse_nutrition(&row.nutrition);

            if let Some(error) = ingredients.error() {
                report.ingredient_fallbacks += 1;
                debug!(recipe_id = row.id, %error, "ingredient list unparsable, using empty list");
            }
            if let Some(error) = tags.error() {
                report.tag_fallbacks += 1;
                debug!(recipe_id = row.id, %error, "tag list unparsable, using empty list");
            }
            if steps.is_fallback() {
                report.step_fallbacks += 1;
            }
            if let Some(error) = nutrition.error() {
                report.nutrition_fallbacks += 1;
                debug!(recipe_id = row.id, %error, "nutrition unparsable, using zeros");
            }

            ParsedRow {
                id: row.id,
                name: row.name.clone(),
                minutes: row.minutes.filter(|m| m.is_finite()),
                n_steps: row.n_steps,
                n_ingredients: row.n_ingredients,
                ingredients: ingredients.into_value(),
                tags: tags.into_value(),
                steps: steps.into_value(),
                nutrition: nutrition.into_value(),
            }
        })
        .collect();

    if report.total_fallbacks() > 0 {
        warn!(
            rows = report.rows,
            ingredients = report.ingredient_fallbacks,
            tags = report.tag_fallbacks,
            steps = report.step_fallbacks,
            nutrition = report.nutrition_fallbacks,
            "some recipe fields could not be parsed and were replaced by defaults"
        );
    }
    (parsed, report)
}

/// Fill value for each column under `strategy`, from the finite cells of
/// `values`.
fn column_fill_values(values: &[f64], width: usize, strategy: ImputeStrategy) -> Vec<f64> {
    match strategy {
        ImputeStrategy::Zero => vec![0.0; width],
        ImputeStrategy::ColumnMean => {
            let mut sums = vec![0.0; width];
            let mut counts = vec![0usize; width];
            if width > 0 {
                for row in values.chunks_exact(width) {
                    for (col, value) in row.iter().enumerate().filter(|(_, v)| v.is_finite()) {
                        sums[col] += value;
                        counts[col] += 1;
                    }
                }
            }
            sums.iter()
                .zip(&counts)
                .map(|(sum, &count)| if count == 0 { 0.0 } else { sum / count as f64 })
                .collect()
        }
    }
}

/// Replaces non-finite cells with their column's fill value; returns how
/// many were filled.
fn fill_missing(values: &mut [f64], width: usize, fills: &[f64]) -> usize {
    if width == 0 {
        return 0;
    }
    let mut filled = 0;
    for row in values.chunks_exact_mut(width) {
        for (cell, fill) in row.iter_mut().zip(fills) {
            if !cell.is_finite() {
                *cell = *fill;
                filled += 1;
            }
        }
    }
    filled
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(id: u64, ingredients: &str, tags: &str, nutrition: &str) -> RawRecipeRow {
        RawRecipeRow {
            id,
            name: format!("recipe {id}"),
            minutes: Some(30.0),
            n_steps: Some(4),
            n_ingredients: Some(6),
            ingredients: ingredients.to_string(),
            tags: tags.to_string(),
            steps: "['mix', 'bake']".to_string(),
            nutrition: nutrition.to_string(),
        }
    }

    fn default_vocab() -> Vec<String> {
        DEFAULT_INGREDIENT_VOCABULARY.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_column_layout() {
        let rows = vec![
            raw(1, "['Flour', 'sugar']", "['easy', 'dessert']", "[100, 1, 2, 3, 4, 5, 6]"),
            raw(2, "['chicken']", "['dinner', 'easy']", "[200, 1, 2, 3, 4, 5, 6]"),
        ];
        let (encoder, batch) = FeatureEncoder::fit(&rows, &default_vocab(), ImputeStrategy::Zero);
        let columns = batch.matrix.columns();

        assert_eq!(&columns[..4], &BASE_COLUMNS.map(String::from));
        assert_eq!(columns[4], "ingredient_flour");
        assert_eq!(columns[4 + 13], "calories");
        assert_eq!(&columns[columns.len() - 3..], &["tag_dessert", "tag_dinner", "tag_easy"]);
        assert_eq!(columns.len(), encoder.vocabulary().width());
        assert_eq!(encoder.vocabulary().tags(), &["dessert", "dinner", "easy"]);
    }

    #[test]
    fn test_derived_features_and_flags() {
        let rows = vec![raw(1, "['Flour', 'brown sugar', 'egg']", "['easy']", "[100, 1, 2, 3, 4, 5, 6]")];
        let (_, batch) = FeatureEncoder::fit(&rows, &default_vocab(), ImputeStrategy::Zero);
        let m = &batch.matrix;
        let row = m.row(0);

        assert_eq!(row[m.column_index("steps_complexity").unwrap()], 24.0);
        assert_eq!(row[m.column_index("ingredient_density").unwrap()], 1.5);
        assert_eq!(row[m.column_index("ingredient_flour").unwrap()], 1.0);
        assert_eq!(row[m.column_index("ingredient_egg").unwrap()], 1.0);
        // Exact match only: "brown sugar" is not "sugar".
        assert_eq!(row[m.column_index("ingredient_sugar").unwrap()], 0.0);
        assert_eq!(row[m.column_index("carbohydrates").unwrap()], 6.0);
        assert_eq!(batch.targets, vec![30.0]);
        assert_eq!(batch.metadata[0].steps, vec!["mix", "bake"]);
    }

    #[test]
    fn test_zero_steps_density_guard() {
        let mut row = raw(1, "['egg']", "[]", "[1, 2, 3, 4, 5, 6, 7]");
        row.n_steps = Some(0);
        row.n_ingredients = Some(3);
        let (_, batch) = FeatureEncoder::fit(&[row], &default_vocab(), ImputeStrategy::Zero);
        let m = &batch.matrix;
        assert_eq!(m.row(0)[m.column_index("ingredient_density").unwrap()], 3.0);
        assert_eq!(m.row(0)[m.column_index("steps_complexity").unwrap()], 0.0);
    }

    #[test]
    fn test_malformed_ingredients_give_zero_flags() {
        let rows = vec![raw(1, "[flour, 'sugar", "['easy']", "[1, 2, 3, 4, 5, 6, 7]")];
        let (_, batch) = FeatureEncoder::fit(&rows, &default_vocab(), ImputeStrategy::Zero);
        let m = &batch.matrix;
        for name in DEFAULT_INGREDIENT_VOCABULARY {
            let col = m.column_index(&format!("ingredient_{name}")).unwrap();
            assert_eq!(m.row(0)[col], 0.0);
        }
        assert_eq!(batch.report.ingredient_fallbacks, 1);
        assert!(batch.metadata[0].ingredients.is_empty());
    }

    #[test]
    fn test_encoding_is_idempotent() {
        let rows = vec![
            raw(1, "['salt', 'water']", "['soup']", "[50.5, 1, 0, 300, 2, 0, 9.25]"),
            raw(2, "broken", "['soup', 'vegan']", "nonsense"),
        ];
        let (encoder, first) = FeatureEncoder::fit(&rows, &default_vocab(), ImputeStrategy::ColumnMean);
        let second = encoder.encode(&rows);
        let first_bits: Vec<u64> = first.matrix.values().iter().map(|v| v.to_bits()).collect();
        let second_bits: Vec<u64> = second.matrix.values().iter().map(|v| v.to_bits()).collect();
        assert_eq!(first_bits, second_bits);
    }

    #[test]
    fn test_inference_uses_fitted_tag_vocabulary() {
        let train = vec![raw(1, "[]", "['easy', 'quick']", "[1, 2, 3, 4, 5, 6, 7]")];
        let (encoder, fitted) = FeatureEncoder::fit(&train, &default_vocab(), ImputeStrategy::Zero);

        let fresh = vec![raw(9, "[]", "['quick', 'holiday', 'brand-new']", "[1, 2, 3, 4, 5, 6, 7]")];
        let batch = encoder.encode(&fresh);
        assert_eq!(batch.matrix.columns(), fitted.matrix.columns());
        let m = &batch.matrix;
        assert_eq!(m.row(0)[m.column_index("tag_quick").unwrap()], 1.0);
        assert_eq!(m.row(0)[m.column_index("tag_easy").unwrap()], 0.0);
        assert!(m.column_index("tag_holiday").is_none());
    }

    #[test]
    fn test_missing_values_imputed_by_strategy() {
        let mut a = raw(1, "[]", "[]", "[100, null, 2, 3, 4, 5, 6]");
        a.n_steps = None;
        let b = raw(2, "[]", "[]", "[300, 10, 2, 3, 4, 5, 6]");
        let rows = vec![a, b];

        let (_, zero) = FeatureEncoder::fit(&rows, &default_vocab(), ImputeStrategy::Zero);
        let m = &zero.matrix;
        assert_eq!(m.row(0)[m.column_index("total_fat").unwrap()], 0.0);
        assert_eq!(m.row(0)[m.column_index("n_steps").unwrap()], 0.0);

        let (_, mean) = FeatureEncoder::fit(&rows, &default_vocab(), ImputeStrategy::ColumnMean);
        let m = &mean.matrix;
        assert_eq!(m.row(0)[m.column_index("total_fat").unwrap()], 10.0);
        assert_eq!(m.row(0)[m.column_index("n_steps").unwrap()], 4.0);
        assert_eq!(m.row(0)[m.column_index("steps_complexity").unwrap()], 24.0);
        assert!(mean.matrix.values().iter().all(|v| v.is_finite()));
        assert_eq!(mean.report.imputed_cells, 4);
    }

    #[test]
    fn test_inference_imputes_with_fitted_means() {
        let mut a = raw(1, "[]", "[]", "[100, 4, 2, 3, 4, 5, 6]");
        a.n_steps = Some(2);
        let mut b = raw(2, "[]", "[]", "[300, 10, 2, 3, 4, 5, 6]");
        b.n_steps = Some(6);
        let (encoder, _) = FeatureEncoder::fit(&[a, b], &default_vocab(), ImputeStrategy::ColumnMean);
        let fills = encoder.fill_values().unwrap();
        assert_eq!(fills.len(), encoder.vocabulary().width());

        let mut lone = raw(7, "[]", "[]", "[50, null, 2, 3, 4, 5, 6]");
        lone.n_steps = None;
        let mut other = raw(8, "[]", "[]", "[50, 90, 2, 3, 4, 5, 6]");
        other.n_steps = Some(40);

        let alone = encoder.encode(std::slice::from_ref(&lone));
        let together = encoder.encode(&[lone, other]);
        assert_eq!(alone.matrix.row(0), together.matrix.row(0));

        let m = &alone.matrix;
        assert_eq!(m.row(0)[m.column_index("total_fat").unwrap()], 7.0);
        assert_eq!(m.row(0)[m.column_index("n_steps").unwrap()], 4.0);

        let plain = [raw(3, "[]", "[]", "[1, 2, 3, 4, 5, 6, 7]")];
        let (zero, _) = FeatureEncoder::fit(&plain, &default_vocab(), ImputeStrategy::Zero);
        assert!(zero.fill_values().is_none());
        let unpinned = FeatureEncoder::from_vocabulary(encoder.vocabulary().clone(), ImputeStrategy::ColumnMean)
            .with_fill_values(Some(vec![1.0]));
        assert!(unpinned.fill_values().is_none());
    }

    #[test]
    fn test_select_rows_keeps_alignment() {
        let rows = vec![
            raw(1, "[]", "[]", "[1, 0, 0, 0, 0, 0, 0]"),
            raw(2, "[]", "[]", "[2, 0, 0, 0, 0, 0, 0]"),
            raw(3, "[]", "[]", "[3, 0, 0, 0, 0, 0, 0]"),
        ];
        let (_, batch) = FeatureEncoder::fit(&rows, &default_vocab(), ImputeStrategy::Zero);
        let subset = batch.select_rows(&[2, 0]);
        let cal = subset.matrix.column_index("calories").unwrap();
        assert_eq!(subset.matrix.row(0)[cal], 3.0);
        assert_eq!(subset.metadata[0].id, 3);
        assert_eq!(subset.metadata[1].id, 1);
        assert_eq!(subset.len(), 2);
    }
}
