use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

use pantry_core::error::ShoppingListError;
use pantry_core::export::ExportFormat;
use pantry_core::models::UserId;
use pantry_core::service::PantryService;

use super::helpers::print_shopping_list_table;

/// Write the consolidated list to `output` (or stdout), or show it as a table.
pub(crate) fn cmd_shopping_list(
    service: &PantryService,
    user_id: UserId,
    format: ExportFormat,
    output: Option<&Path>,
    table: bool,
) -> Result<()> {
    if table {
        match service.build_shopping_list(user_id) {
            Ok(list) => {
                for missing in &list.missing_recipes {
                    let id = missing.recipe_id;
                    eprintln!("Warning: recipe {id} skipped: {}", missing.reason);
                }
                print_shopping_list_table(&list.items);
            }
            Err(ShoppingListError::EmptyCart { .. }) => {
                eprintln!("Nothing to export: the shopping cart is empty");
            }
            Err(err) => return Err(err.into()),
        }
        return Ok(());
    }

    let export = service.export_shopping_list(user_id, format)?;
    for missing in &export.missing_recipes {
        let id = missing.recipe_id;
        eprintln!("Warning: recipe {id} skipped: {}", missing.reason);
    }

    if let Some(path) = output {
        std::fs::write(path, &export.body)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        let count = export.item_count;
        eprintln!("Wrote {count} items to {}", path.display());
    } else {
        std::io::stdout()
            .write_all(&export.body)
            .context("Failed to write shopping list to stdout")?;
    }
    Ok(())
}
