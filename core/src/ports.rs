//! Read-side interfaces the shopping-list engine consumes.
//!
//! Cart contents and recipe ingredient lists are owned elsewhere; the engine
//! only reads them through these traits. `Database` implements both for the
//! SQLite store and `MemoryStore` implements both in memory.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::Result;

use crate::models::{RecipeId, RecipeIngredientEntry, RecipeLookup, UserId};

pub trait CartStore {
    /// Recipes currently in the user's shopping cart.
    fn cart_recipe_ids(&self, user_id: UserId) -> Result<BTreeSet<RecipeId>>;
}

pub trait RecipeIngredientIndex {
    /// The recipe's ingredient lines in authoring order, or `NotFound` when
    /// the recipe does not exist (e.g. deleted after it was put in a cart).
    fn recipe_ingredients(&self, recipe_id: RecipeId) -> Result<RecipeLookup>;
}

/// Thread-safe in-memory store. A recipe's ingredient list is always replaced
/// as a whole, so readers never observe a partially edited recipe.
#[derive(Debug, Default)]
pub struct MemoryStore {
    carts: RwLock<HashMap<UserId, BTreeSet<RecipeId>>>,
    recipes: RwLock<HashMap<RecipeId, Arc<[RecipeIngredientEntry]>>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish (or replace) the full ingredient list of a recipe.
    pub fn publish_recipe(&self, recipe_id: RecipeId, entries: Vec<RecipeIngredientEntry>) {
        self.recipes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(recipe_id, entries.into());
    }

    pub fn remove_recipe(&self, recipe_id: RecipeId) -> bool {
        self.recipes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&recipe_id)
            .is_some()
    }

    /// Returns `false` if the recipe was already in the cart.
    pub fn add_to_cart(&self, user_id: UserId, recipe_id: RecipeId) -> bool {
        self.carts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(user_id)
            .or_default()
            .insert(recipe_id)
    }

    pub fn remove_from_cart(&self, user_id: UserId, recipe_id: RecipeId) -> bool {
        self.carts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&user_id)
            .is_some_and(|cart| cart.remove(&recipe_id))
    }
}

impl CartStore for MemoryStore {
    fn cart_recipe_ids(&self, user_id: UserId) -> Result<BTreeSet<RecipeId>> {
        Ok(self
            .carts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&user_id)
            .cloned()
            .unwrap_or_default())
    }
}

impl RecipeIngredientIndex for MemoryStore {
    fn recipe_ingredients(&self, recipe_id: RecipeId) -> Result<RecipeLookup> {
        let entries = self
            .recipes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&recipe_id)
            .cloned();
        Ok(entries.map_or(RecipeLookup::NotFound, |entries| {
            RecipeLookup::Found(entries.to_vec())
        }))
    }
}
