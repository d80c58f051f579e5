use std::fmt;
use std::str::FromStr;

use anyhow::bail;

use crate::error::ShoppingListError;
use crate::models::AggregatedItem;

/// Body served when the cart is empty, so the download is always available.
pub const EMPTY_LIST_PLACEHOLDER: &str = "Shopping list is empty.\n";

const CSV_HEADER: [&str; 3] = ["name", "measurement_unit", "total_amount"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Text,
    Csv,
    Json,
}

impl ExportFormat {
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => "text/plain; charset=utf-8",
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
        }
    }

    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Text => "shopping_list.txt",
            Self::Csv => "shopping_list.csv",
            Self::Json => "shopping_list.json",
        }
    }

    /// What to serve when there is nothing to buy.
    #[must_use]
    pub fn placeholder(self) -> Vec<u8> {
        match self {
            Self::Text => EMPTY_LIST_PLACEHOLDER.as_bytes().to_vec(),
            Self::Csv => format!("{}\n", CSV_HEADER.join(",")).into_bytes(),
            Self::Json => b"[]\n".to_vec(),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "txt" | "text" => Ok(Self::Text),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => bail!("Unsupported shopping list format '{other}'. Use txt, csv or json"),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "txt",
            Self::Csv => "csv",
            Self::Json => "json",
        })
    }
}

/// Render a consolidated list as a downloadable file.
///
/// Output is a pure function of `items`: the same list always produces the
/// same bytes. The text format is one line per item,
/// `{name} — {amount} {unit}`, each terminated by `\n`; an empty list
/// renders as an empty body (header-only for CSV).
pub fn format_shopping_list(
    items: &[AggregatedItem],
    format: ExportFormat,
) -> Result<Vec<u8>, ShoppingListError> {
    for item in items {
        validate_item(item)?;
    }
    match format {
        ExportFormat::Text => Ok(render_text(items)),
        ExportFormat::Csv => render_csv(items),
        ExportFormat::Json => render_json(items),
    }
}

fn validate_item(item: &AggregatedItem) -> Result<(), ShoppingListError> {
    let invalid = |reason: &str| ShoppingListError::Serialization {
        name: item.name.clone(),
        reason: reason.to_string(),
    };
    if item.name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if item.measurement_unit.trim().is_empty() {
        return Err(invalid("measurement unit is empty"));
    }
    if item.name.contains(['\n', '\r']) || item.measurement_unit.contains(['\n', '\r']) {
        return Err(invalid("name or unit contains a line break"));
    }
    if item.total_amount.value().is_sign_negative() || item.total_amount.value().is_zero() {
        return Err(invalid("total amount is not positive"));
    }
    Ok(())
}

fn render_text(items: &[AggregatedItem]) -> Vec<u8> {
    let mut out = String::new();
    for item in items {
        out.push_str(&format!(
            "{} \u{2014} {} {}\n",
            item.name, item.total_amount, item.measurement_unit
        ));
    }
    out.into_bytes()
}

fn render_csv(items: &[AggregatedItem]) -> Result<Vec<u8>, ShoppingListError> {
    let csv_error = |err: &dyn fmt::Display| ShoppingListError::Serialization {
        name: "<csv>".to_string(),
        reason: err.to_string(),
    };
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer
        .write_record(CSV_HEADER)
        .map_err(|e| csv_error(&e))?;
    for item in items {
        writer
            .write_record([
                item.name.as_str(),
                item.measurement_unit.as_str(),
                item.total_amount.to_string().as_str(),
            ])
            .map_err(|e| csv_error(&e))?;
    }
    writer.into_inner().map_err(|e| csv_error(&e))
}

fn render_json(items: &[AggregatedItem]) -> Result<Vec<u8>, ShoppingListError> {
    let mut body =
        serde_json::to_vec_pretty(items).map_err(|e| ShoppingListError::Serialization {
            name: "<json>".to_string(),
            reason: e.to_string(),
        })?;
    body.push(b'\n');
    Ok(body)
}
