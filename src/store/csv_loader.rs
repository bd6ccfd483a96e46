use crate::error::DataSourceError;
use crate::recipe::RawRecipeRow;
use csv::ReaderBuilder;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

// Columns of the food.com RAW_recipes.csv export that the loader needs.
const NAME_COL: &str = "name";
const ID_COL: &str = "id";
const MINUTES_COL: &str = "minutes";
const TAGS_COL: &str = "tags";
const NUTRITION_COL: &str = "nutrition";
const N_STEPS_COL: &str = "n_steps";
const STEPS_COL: &str = "steps";
const INGREDIENTS_COL: &str = "ingredients";
const N_INGREDIENTS_COL: &str = "n_ingredients";

fn parse_optional_f64(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Counts are sometimes exported as floats ("7.0").
fn parse_optional_count(s: &str) -> Option<u32> {
    let s = s.trim();
    s.parse::<u32>().ok().or_else(|| {
        s.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v <= f64::from(u32::MAX))
            .map(|v| v as u32)
    })
}

/// Reads at most `limit` data rows from a recipe CSV file.
pub fn load_raw_recipes(csv_path: &Path, limit: Option<usize>) -> Result<Vec<RawRecipeRow>, DataSourceError> {
    let file = File::open(csv_path).map_err(|source| DataSourceError::Io {
        path: csv_path.display().to_string(),
        source,
    })?;
    let rows = read_raw_recipes(file, limit)?;
    info!(path = %csv_path.display(), rows = rows.len(), "loaded recipe CSV");
    Ok(rows)
}

/// Parses recipe CSV from any reader. Unknown columns are ignored; rows
/// without a name or a numeric id are skipped. The limit counts data rows
/// read, skipped or not.
pub fn read_raw_recipes<R: Read>(reader: R, limit: Option<usize>) -> Result<Vec<RawRecipeRow>, DataSourceError> {
    let mut rdr = ReaderBuilder::new().has_headers(true).from_reader(reader);
    let headers = rdr.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| DataSourceError::MissingColumn(name.to_string()))
    };
    let name_idx = column(NAME_COL)?;
    let id_idx = column(ID_COL)?;
    let minutes_idx = column(MINUTES_COL)?;
    let tags_idx = column(TAGS_COL)?;
    let nutrition_idx = column(NUTRITION_COL)?;
    let n_steps_idx = column(N_STEPS_COL)?;
    let steps_idx = column(STEPS_COL)?;
    let ingredients_idx = column(INGREDIENTS_COL)?;
    let n_ingredients_idx = column(N_INGREDIENTS_COL)?;

    let mut rows = Vec::new();
    let mut skipped = 0usize;
    for (row_index, result) in rdr.records().take(limit.unwrap_or(usize::MAX)).enumerate() {
        let record = result?;
        let field = |idx: usize| record.get(idx).unwrap_or("");

        let name = field(name_idx).trim();
        let id = field(id_idx).trim().parse::<u64>().ok();
        let (Some(id), false) = (id, name.is_empty()) else {
            debug!(row_index, "skipping recipe row without name or id");
            skipped += 1;
            continue;
        };

        rows.push(RawRecipeRow {
            id,
            name: name.to_string(),
            minutes: parse_optional_f64(field(minutes_idx)),
            n_steps: parse_optional_count(field(n_steps_idx)),
            n_ingredients: parse_optional_count(field(n_ingredients_idx)),
            ingredients: field(ingredients_idx).to_string(),
            tags: field(tags_idx).to_string(),
            steps: field(steps_idx).to_string(),
            nutrition: field(nutrition_idx).to_string(),
        });
    }
    if skipped > 0 {
        info!(skipped, "skipped recipe rows without name or id");
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "name,id,minutes,contributor_id,submitted,tags,nutrition,n_steps,steps,description,ingredients,n_ingredients";

    fn create_test_csv_file() -> Result<NamedTempFile> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "{HEADER}")?;
        writeln!(
            file,
            r#"arriba baked winter squash,137739,55,47892,2005-09-16,"['60-minutes-or-less', 'vegetables']","[51.5, 0.0, 13.0, 0.0, 2.0, 0.0, 4.0]",11,"['make a choice', 'cut in half']",autumn,"['winter squash', 'olive oil', 'salt']",3"#
        )?;
        writeln!(
            file,
            r#"a bit different breakfast pizza,31490,,26278,2002-06-17,"['breakfast']","[173.4, 18.0, 0.0, 17.0, 22.0, 35.0, 1.0]",9.0,"['preheat oven']",,"['eggs', 'milk']","#
        )?;
        writeln!(file, r#",5000,10,1,2003-01-01,"[]","[]",1,"[]",,"[]",0"#)?;
        writeln!(file, r#"no id,abc,10,1,2003-01-01,"[]","[]",1,"[]",,"[]",0"#)?;
        file.flush()?;
        Ok(file)
    }

    #[test]
    fn test_load_raw_recipes_success() -> Result<()> {
        let file = create_test_csv_file()?;
        let rows = load_raw_recipes(file.path(), None)?;
        assert_eq!(rows.len(), 2);

        let squash = &rows[0];
        assert_eq!(squash.id, 137739);
        assert_eq!(squash.minutes, Some(55.0));
        assert_eq!(squash.n_steps, Some(11));
        assert_eq!(squash.n_ingredients, Some(3));
        assert_eq!(squash.ingredients, "['winter squash', 'olive oil', 'salt']");

        let pizza = &rows[1];
        assert_eq!(pizza.minutes, None);
        assert_eq!(pizza.n_steps, Some(9));
        assert_eq!(pizza.n_ingredients, None);
        Ok(())
    }

    #[test]
    fn test_limit_counts_rows_read() -> Result<()> {
        let file = create_test_csv_file()?;
        assert_eq!(load_raw_recipes(file.path(), Some(1))?.len(), 1);
        assert_eq!(load_raw_recipes(file.path(), Some(3))?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_missing_column() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "name,id,tags,nutrition,n_steps,steps,ingredients,n_ingredients")?;
        file.flush()?;
        let result = load_raw_recipes(file.path(), None);
        assert!(matches!(result, Err(DataSourceError::MissingColumn(ref c)) if c == "minutes"));
        Ok(())
    }

    #[test]
    fn test_file_not_found() {
        let result = load_raw_recipes(Path::new("this_file_does_not_exist.csv"), None);
        assert!(matches!(result, Err(DataSourceError::Io { .. })));
    }
}
