use anyhow::Result;
use std::process;

use pantry_core::models::{RecipeId, UserId};
use pantry_core::ports::CartStore;
use pantry_core::service::PantryService;

use super::helpers::json_error;

pub(crate) fn cmd_cart_add(
    service: &PantryService,
    user_id: UserId,
    recipe_id: RecipeId,
    json: bool,
) -> Result<()> {
    if service.db().add_to_cart(user_id, recipe_id)? {
        if json {
            println!("{}", serde_json::json!({ "added": recipe_id, "user_id": user_id }));
        } else {
            println!("Added recipe {recipe_id} to the shopping cart of user {user_id}");
        }
    } else {
        if json {
            println!("{}", json_error("Already in the shopping cart"));
        } else {
            eprintln!("Recipe {recipe_id} is already in the shopping cart");
        }
        process::exit(2);
    }
    Ok(())
}

pub(crate) fn cmd_cart_remove(
    service: &PantryService,
    user_id: UserId,
    recipe_id: RecipeId,
    json: bool,
) -> Result<()> {
    if service.db().remove_from_cart(user_id, recipe_id)? {
        if json {
            println!("{}", serde_json::json!({ "removed": recipe_id, "user_id": user_id }));
        } else {
            println!("Removed recipe {recipe_id} from the shopping cart of user {user_id}");
        }
    } else {
        if json {
            println!("{}", json_error("Not in the shopping cart"));
        } else {
            eprintln!("Recipe {recipe_id} is not in the shopping cart");
        }
        process::exit(2);
    }
    Ok(())
}

pub(crate) fn cmd_cart_show(service: &PantryService, user_id: UserId, json: bool) -> Result<()> {
    let recipes = {
        let db = service.db();
        let ids = db.cart_recipe_ids(user_id)?;
        let mut recipes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(recipe) = db.get_recipe(id)? {
                recipes.push(recipe);
            }
        }
        recipes
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&recipes)?);
        return Ok(());
    }
    if recipes.is_empty() {
        eprintln!("Shopping cart of user {user_id} is empty");
        return Ok(());
    }
    println!("Shopping cart of user {user_id}:");
    for recipe in &recipes {
        let id = recipe.id;
        let name = &recipe.name;
        println!("  [{id}] {name}");
    }
    Ok(())
}
