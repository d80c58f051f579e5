use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use tracing::warn;

use crate::db::Database;
use crate::models::{ImportSummary, Ingredient, NewIngredient, validate_new_ingredient};

#[derive(Debug, Deserialize)]
struct IngredientRecord {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    measurement_unit: Option<String>,
    #[serde(default)]
    unit: Option<String>,
}

impl IngredientRecord {
    /// `Ok(None)` for a row with a blank name or unit; `Err` for a row that
    /// fails validation (too long, multi-line).
    fn into_new_ingredient(self) -> Result<Option<NewIngredient>> {
        let name = self.name.unwrap_or_default();
        let unit = self.measurement_unit.or(self.unit).unwrap_or_default();
        if name.trim().is_empty() || unit.trim().is_empty() {
            return Ok(None);
        }
        validate_new_ingredient(&name, &unit).map(Some)
    }
}

/// Rows that passed validation, plus the count of rows left out.
#[derive(Debug, Default)]
pub struct ParsedIngredients {
    pub rows: Vec<NewIngredient>,
    pub skipped: usize,
}

impl ParsedIngredients {
    fn push(&mut self, row_number: usize, record: IngredientRecord) {
        match record.into_new_ingredient() {
            Ok(Some(ingredient)) => self.rows.push(ingredient),
            Ok(None) => self.skipped += 1,
            Err(err) => {
                warn!(row = row_number, error = %format!("{err:#}"), "skipping invalid ingredient row");
                self.skipped += 1;
            }
        }
    }
}

/// Parse an ingredient CSV with a `name,measurement_unit` header
/// (`unit` is accepted in place of `measurement_unit`).
pub fn parse_ingredients_csv<R: Read>(reader: R) -> Result<ParsedIngredients> {
    let mut rdr = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV headers")?.clone();
    if !headers.iter().any(|h| h.eq_ignore_ascii_case("name")) {
        bail!("Missing required column: name");
    }
    if !headers
        .iter()
        .any(|h| h.eq_ignore_ascii_case("measurement_unit") || h.eq_ignore_ascii_case("unit"))
    {
        bail!("Missing required column: measurement_unit");
    }

    let col =
        |name: &str| -> Option<usize> { headers.iter().position(|h| h.eq_ignore_ascii_case(name)) };
    let idx_name = col("name");
    let idx_unit = col("measurement_unit").or_else(|| col("unit"));

    let mut parsed = ParsedIngredients::default();
    for (line_num, result) in rdr.records().enumerate() {
        let row_number = line_num + 2;
        let record = result.with_context(|| format!("Failed to parse CSV row {row_number}"))?;
        let field = |idx: Option<usize>| idx.and_then(|i| record.get(i)).map(String::from);
        parsed.push(
            row_number,
            IngredientRecord {
                name: field(idx_name),
                measurement_unit: field(idx_unit),
                unit: None,
            },
        );
    }
    Ok(parsed)
}

/// Parse a JSON array of `{"name": ..., "measurement_unit": ...}` objects.
pub fn parse_ingredients_json<R: Read>(reader: R) -> Result<ParsedIngredients> {
    let records: Vec<IngredientRecord> =
        serde_json::from_reader(reader).context("Failed to parse ingredient JSON")?;
    let mut parsed = ParsedIngredients::default();
    for (i, record) in records.into_iter().enumerate() {
        parsed.push(i + 1, record);
    }
    Ok(parsed)
}

/// Read an ingredient file, dispatching on the `.csv` / `.json` extension.
pub fn parse_ingredients_file(path: &Path) -> Result<ParsedIngredients> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;
    match ext.as_str() {
        "csv" => parse_ingredients_csv(file),
        "json" => parse_ingredients_json(file),
        _ => bail!("Only .csv and .json ingredient files are supported"),
    }
}

/// Upsert parsed rows in a single transaction. Returns the summary and every
/// stored record (created or pre-existing), in row order. A failing row
/// leaves the database unchanged.
pub fn import_ingredients(
    db: &Database,
    parsed: &ParsedIngredients,
) -> Result<(ImportSummary, Vec<Ingredient>)> {
    let results = db.upsert_ingredients(&parsed.rows)?;
    let mut summary = ImportSummary {
        rows_parsed: parsed.rows.len(),
        skipped: parsed.skipped,
        ..ImportSummary::default()
    };
    let mut stored = Vec::with_capacity(results.len());
    for (ingredient, created) in results {
        if created {
            summary.created += 1;
        } else {
            summary.existing += 1;
        }
        stored.push(ingredient);
    }
    Ok((summary, stored))
}
