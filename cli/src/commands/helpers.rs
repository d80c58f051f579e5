use anyhow::{Context, Result, bail};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{AggregatedItem, Amount, Ingredient};

/// Parse a recipe line given as `name:unit:amount` (e.g. "Tomato:g:200").
/// The name may itself contain colons; unit and amount are taken from the end.
pub(crate) fn parse_recipe_line(s: &str) -> Result<(String, String, Amount)> {
    let mut parts = s.rsplitn(3, ':');
    let (Some(amount), Some(unit), Some(name)) = (parts.next(), parts.next(), parts.next()) else {
        bail!("Invalid ingredient '{s}'. Use name:unit:amount, e.g. 'Tomato:g:200'");
    };
    let name = name.trim();
    let unit = unit.trim();
    if name.is_empty() || unit.is_empty() {
        bail!("Invalid ingredient '{s}'. Name and unit must not be empty");
    }
    let amount: Amount = amount
        .parse()
        .with_context(|| format!("Invalid amount in '{s}'"))?;
    Ok((name.to_string(), unit.to_string(), amount))
}

pub(crate) fn print_ingredient_table(ingredients: &[Ingredient]) {
    #[derive(Tabled)]
    struct IngredientRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let rows: Vec<IngredientRow> = ingredients
        .iter()
        .map(|i| IngredientRow {
            id: i.id,
            name: truncate(&i.name, 40),
            unit: i.measurement_unit.clone(),
        })
        .collect();

    let table = Table::new(&rows).with(Style::rounded()).to_string();
    println!("{table}");
}

pub(crate) fn print_shopping_list_table(items: &[AggregatedItem]) {
    #[derive(Tabled)]
    struct ItemRow {
        #[tabled(rename = "Ingredient")]
        name: String,
        #[tabled(rename = "Amount")]
        amount: String,
        #[tabled(rename = "Unit")]
        unit: String,
    }

    let rows: Vec<ItemRow> = items
        .iter()
        .map(|i| ItemRow {
            name: truncate(&i.name, 40),
            amount: i.total_amount.to_string(),
            unit: i.measurement_unit.clone(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(1..2)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
