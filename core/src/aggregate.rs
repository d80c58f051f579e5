use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::error::ShoppingListError;
use crate::models::{
    AggregatedItem, Amount, IngredientKey, MissingRecipeData, RecipeId, RecipeLookup,
    ShoppingList, UserId,
};
use crate::ports::{CartStore, RecipeIngredientIndex};

struct Tally {
    display_name: String,
    unit: String,
    total: Amount,
}

/// Consolidate every recipe in the user's cart into one shopping list.
///
/// Amounts are summed per `(normalized name, unit)`, both within a recipe and
/// across recipes. Recipes whose ingredients cannot be resolved are skipped
/// and reported in `missing_recipes`. Items come out sorted by normalized
/// name, then unit. The display name of an item is the name of its first
/// contributing line, taking recipes in ascending id order.
///
/// Nothing is written anywhere: dropping the call midway leaves no trace.
pub fn build_shopping_list<C, R>(
    cart: &C,
    index: &R,
    user_id: UserId,
) -> Result<ShoppingList, ShoppingListError>
where
    C: CartStore + ?Sized,
    R: RecipeIngredientIndex + ?Sized,
{
    let recipe_ids = cart
        .cart_recipe_ids(user_id)
        .map_err(ShoppingListError::Storage)?;
    if recipe_ids.is_empty() {
        return Err(ShoppingListError::EmptyCart { user_id });
    }

    let mut totals: BTreeMap<IngredientKey, Tally> = BTreeMap::new();
    let mut missing_recipes = Vec::new();

    for recipe_id in recipe_ids {
        let entries = match index.recipe_ingredients(recipe_id) {
            Ok(RecipeLookup::Found(entries)) => entries,
            Ok(RecipeLookup::NotFound) => {
                missing_recipes.push(skip_recipe(user_id, recipe_id, "recipe not found".into()));
                continue;
            }
            Err(err) => {
                missing_recipes.push(skip_recipe(user_id, recipe_id, format!("{err:#}")));
                continue;
            }
        };

        for entry in entries {
            let key = entry.ingredient.key();
            match totals.get_mut(&key) {
                Some(tally) => {
                    tally.total = tally.total.checked_add(entry.amount).ok_or_else(|| {
                        ShoppingListError::AmountOverflow {
                            name: tally.display_name.clone(),
                            unit: tally.unit.clone(),
                        }
                    })?;
                }
                None => {
                    let tally = Tally {
                        display_name: entry.ingredient.name.trim().to_string(),
                        unit: key.unit.clone(),
                        total: entry.amount,
                    };
                    totals.insert(key, tally);
                }
            }
        }
    }

    let items: Vec<AggregatedItem> = totals
        .into_values()
        .map(|tally| AggregatedItem {
            name: tally.display_name,
            measurement_unit: tally.unit,
            total_amount: tally.total,
        })
        .collect();

    debug!(
        user_id,
        items = items.len(),
        skipped = missing_recipes.len(),
        "built shopping list"
    );

    Ok(ShoppingList {
        user_id,
        items,
        missing_recipes,
    })
}

fn skip_recipe(user_id: UserId, recipe_id: RecipeId, reason: String) -> MissingRecipeData {
    let missing = MissingRecipeData { recipe_id, reason };
    let err = ShoppingListError::MissingRecipeData(missing.clone());
    warn!(user_id, recipe_id, error = %err, "skipping recipe in shopping list");
    missing
}
