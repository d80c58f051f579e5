use anyhow::{Context, Result, bail};
use std::path::Path;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use pantry_core::models::{Amount, IngredientId, RecipeDetail, RecipeId};
use pantry_core::service::PantryService;

use super::helpers::{json_error, parse_recipe_line, truncate};

/// Unit recorded for Cooklang ingredients that carry a count but no unit.
const DEFAULT_COUNT_UNIT: &str = "pcs";

pub(crate) fn cmd_recipe_create(service: &PantryService, name: &str, json: bool) -> Result<()> {
    let recipe = service.db().create_recipe(name)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&recipe)?);
    } else {
        let id = recipe.id;
        let name = &recipe.name;
        println!("Created recipe: {name} (id: {id})");
        println!("Set ingredients with: pantry recipe set {id} \"Tomato:g:200\" ...");
    }
    Ok(())
}

/// Replace the recipe's ingredient list. Ingredients missing from the catalog
/// are added to it.
pub(crate) fn cmd_recipe_set(
    service: &PantryService,
    recipe_id: RecipeId,
    lines: &[String],
    json: bool,
) -> Result<()> {
    let parsed = lines
        .iter()
        .map(|line| parse_recipe_line(line))
        .collect::<Result<Vec<_>>>()?;

    let mut resolved: Vec<(IngredientId, Amount)> = Vec::with_capacity(parsed.len());
    for (name, unit, amount) in parsed {
        let (ingredient, _) = service.add_ingredient(&name, &unit)?;
        resolved.push((ingredient.id, amount));
    }

    let detail = service.db().set_recipe_ingredients(recipe_id, &resolved)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        print_recipe_detail(&detail);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_show(service: &PantryService, recipe_id: RecipeId, json: bool) -> Result<()> {
    let detail = service.db().get_recipe_detail(recipe_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        print_recipe_detail(&detail);
    }
    Ok(())
}

pub(crate) fn cmd_recipe_list(service: &PantryService, json: bool) -> Result<()> {
    #[derive(Tabled)]
    struct RecipeRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Ingredients")]
        ingredients: usize,
    }

    let details = {
        let db = service.db();
        db.list_recipes()?
            .into_iter()
            .map(|r| db.get_recipe_detail(r.id))
            .collect::<Result<Vec<_>>>()?
    };
    if details.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No recipes found");
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&details)?);
        return Ok(());
    }

    let rows: Vec<RecipeRow> = details
        .iter()
        .map(|r| RecipeRow {
            id: r.id,
            name: truncate(&r.name, 40),
            ingredients: r.ingredients.len(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_recipe_delete(service: &PantryService, recipe_id: RecipeId, json: bool) -> Result<()> {
    if service.db().delete_recipe(recipe_id)? {
        if json {
            println!("{}", serde_json::json!({ "deleted": recipe_id }));
        } else {
            println!("Deleted recipe {recipe_id}");
        }
    } else {
        if json {
            println!("{}", json_error(&format!("Recipe {recipe_id} not found")));
        } else {
            eprintln!("Recipe {recipe_id} not found");
        }
        process::exit(2);
    }
    Ok(())
}

/// Create a recipe from a Cooklang (.cook) file.
pub(crate) fn cmd_recipe_import(
    service: &PantryService,
    file: &Path,
    name_override: Option<String>,
    json: bool,
) -> Result<()> {
    let input = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read file: {}", file.display()))?;

    let (recipe_data, _report) = cooklang::parse(&input)
        .into_result()
        .map_err(|e| anyhow::anyhow!("Failed to parse Cooklang file: {e}"))?;

    let name = name_override
        .or_else(|| recipe_data.metadata.title().map(String::from))
        .or_else(|| file.file_stem().and_then(|s| s.to_str()).map(String::from))
        .context("Could not determine recipe name. Use --name to specify one")?;

    let converter = cooklang::Converter::default();
    let grouped = recipe_data.group_ingredients(&converter);

    let mut lines = Vec::new();
    for gi in &grouped {
        let ingredient_name = gi.ingredient.display_name().to_string();
        match cooklang_line(gi) {
            Some((unit, amount)) => lines.push((ingredient_name, unit, amount)),
            None => eprintln!("Warning: '{ingredient_name}' has no numeric quantity, skipped"),
        }
    }

    if lines.is_empty() {
        bail!("No ingredients with quantities found in recipe");
    }

    let mut resolved: Vec<(IngredientId, Amount)> = Vec::with_capacity(lines.len());
    for (ingredient_name, unit, amount) in &lines {
        let (ingredient, _) = service.add_ingredient(ingredient_name, unit)?;
        resolved.push((ingredient.id, *amount));
    }

    let detail = {
        let db = service.db();
        let recipe = db.create_recipe(&name)?;
        db.set_recipe_ingredients(recipe.id, &resolved)?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        let rname = &detail.name;
        let id = detail.id;
        let count = detail.ingredients.len();
        println!("Imported recipe: {rname} (id: {id}, {count} ingredients)");
    }
    Ok(())
}

/// First quantity of a grouped Cooklang ingredient as `(unit, amount)`.
/// Ranges use their lower bound; text quantities are not usable.
fn cooklang_line(gi: &cooklang::ingredient_list::GroupedIngredient<'_>) -> Option<(String, Amount)> {
    let qty: &cooklang::Quantity = gi.quantity.iter().next()?;
    let value = match qty.value() {
        cooklang::Value::Number(n) => n.value(),
        cooklang::Value::Range { start, .. } => start.value(),
        cooklang::Value::Text(_) => return None,
    };
    let amount = Amount::from_f64(value).ok()?;
    let unit = qty.unit().map_or_else(|| DEFAULT_COUNT_UNIT.to_string(), String::from);
    Some((unit, amount))
}

fn print_recipe_detail(detail: &RecipeDetail) {
    let name = &detail.name;
    let id = detail.id;
    println!("=== {name} (id: {id}) ===");
    if detail.ingredients.is_empty() {
        println!("  No ingredients");
        return;
    }
    for entry in &detail.ingredients {
        let iname = &entry.ingredient.name;
        let unit = &entry.ingredient.measurement_unit;
        let amount = entry.amount;
        println!("    {iname} \u{2014} {amount} {unit}");
    }
}
