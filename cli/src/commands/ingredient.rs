use anyhow::Result;
use std::path::Path;
use std::process;

use pantry_core::service::PantryService;

use super::helpers::print_ingredient_table;

pub(crate) fn cmd_ingredient_search(
    service: &PantryService,
    prefix: &str,
    limit: usize,
    json: bool,
) -> Result<()> {
    let found = service.search_ingredients(prefix, limit);

    if found.is_empty() {
        if json {
            println!("[]");
        } else {
            eprintln!("No ingredients start with '{}'", prefix.trim());
        }
        process::exit(2);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        print_ingredient_table(&found);
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_add(
    service: &PantryService,
    name: &str,
    unit: &str,
    json: bool,
) -> Result<()> {
    let (ingredient, created) = service.add_ingredient(name, unit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ingredient)?);
    } else if created {
        let id = ingredient.id;
        println!(
            "Added ingredient: {} ({}) (id: {id})",
            ingredient.name, ingredient.measurement_unit
        );
    } else {
        let id = ingredient.id;
        println!(
            "Ingredient already cataloged: {} ({}) (id: {id})",
            ingredient.name, ingredient.measurement_unit
        );
    }
    Ok(())
}

pub(crate) fn cmd_ingredient_import(service: &PantryService, file: &Path, json: bool) -> Result<()> {
    let summary = service.import_ingredients(file)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let skipped = summary.skipped;
    if summary.rows_parsed == 0 {
        eprintln!("No valid rows to import in {} ({skipped} skipped)", file.display());
        return Ok(());
    }
    let created = summary.created;
    let existing = summary.existing;
    println!(
        "Import finished. Created: {created}, already present: {existing}, skipped: {skipped}. From file: {}",
        file.display()
    );
    Ok(())
}
