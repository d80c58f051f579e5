use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Local;
use rusqlite::{Connection, OptionalExtension, params};

use crate::models::{
    Amount, Ingredient, IngredientId, NewIngredient, Recipe, RecipeDetail, RecipeId,
    RecipeIngredientEntry, RecipeLookup, UserId, normalize_name, validate_recipe_name,
};
use crate::ports::{CartStore, RecipeIngredientIndex};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL CHECK (length(trim(name)) > 0),
                    name_key TEXT NOT NULL,
                    measurement_unit TEXT NOT NULL CHECK (length(trim(measurement_unit)) > 0),
                    UNIQUE (name_key, measurement_unit)
                );

                CREATE TABLE IF NOT EXISTS recipes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS recipe_ingredients (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    ingredient_id INTEGER NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
                    position INTEGER NOT NULL,
                    amount TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS shopping_cart (
                    user_id INTEGER NOT NULL,
                    recipe_id INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                    added_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, recipe_id)
                );

                CREATE INDEX IF NOT EXISTS idx_ingredients_name_key ON ingredients(name_key);
                CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe ON recipe_ingredients(recipe_id);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Ingredients ---

    fn ingredient_from_row(row: &rusqlite::Row) -> rusqlite::Result<Ingredient> {
        Ok(Ingredient {
            id: row.get(0)?,
            name: row.get(1)?,
            measurement_unit: row.get(2)?,
        })
    }

    /// Insert the ingredient unless its `(normalized name, unit)` key is
    /// already stored. Returns the stored record and whether it was newly
    /// created; a case variant of an existing name returns the existing row.
    pub fn upsert_ingredient(&self, ingredient: &NewIngredient) -> Result<(Ingredient, bool)> {
        let name_key = normalize_name(&ingredient.name);
        let inserted = self
            .conn
            .execute(
                "INSERT INTO ingredients (name, name_key, measurement_unit) VALUES (?1, ?2, ?3)
                 ON CONFLICT (name_key, measurement_unit) DO NOTHING",
                params![ingredient.name, name_key, ingredient.measurement_unit],
            )
            .with_context(|| format!("Failed to store ingredient '{}'", ingredient.name))?;
        let stored = self
            .conn
            .query_row(
                "SELECT id, name, measurement_unit FROM ingredients
                 WHERE name_key = ?1 AND measurement_unit = ?2",
                params![name_key, ingredient.measurement_unit],
                Self::ingredient_from_row,
            )
            .context("Failed to read back ingredient")?;
        Ok((stored, inserted > 0))
    }

    /// Upsert a batch in one transaction: either every row is stored or,
    /// on the first failure, none are.
    pub fn upsert_ingredients(&self, rows: &[NewIngredient]) -> Result<Vec<(Ingredient, bool)>> {
        let tx = self.conn.unchecked_transaction()?;
        let stored = rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                self.upsert_ingredient(row)
                    .with_context(|| format!("Failed to import row {}", i + 1))
            })
            .collect::<Result<Vec<_>>>()?;
        tx.commit()?;
        Ok(stored)
    }

    pub fn get_ingredient(&self, id: IngredientId) -> Result<Option<Ingredient>> {
        let ingredient = self
            .conn
            .query_row(
                "SELECT id, name, measurement_unit FROM ingredients WHERE id = ?1",
                params![id],
                Self::ingredient_from_row,
            )
            .optional()?;
        Ok(ingredient)
    }

    /// Every cataloged ingredient in insertion (id) order.
    pub fn list_ingredients(&self) -> Result<Vec<Ingredient>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, measurement_unit FROM ingredients ORDER BY id")?;
        let ingredients = stmt
            .query_map([], Self::ingredient_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ingredients)
    }

    // --- Recipes ---

    pub fn create_recipe(&self, name: &str) -> Result<Recipe> {
        let name = validate_recipe_name(name)?;
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO recipes (name, created_at) VALUES (?1, ?2)",
            params![name, now],
        )?;
        Ok(Recipe {
            id: self.conn.last_insert_rowid(),
            name,
            created_at: now,
        })
    }

    pub fn get_recipe(&self, id: RecipeId) -> Result<Option<Recipe>> {
        let recipe = self
            .conn
            .query_row(
                "SELECT id, name, created_at FROM recipes WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Recipe {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(recipe)
    }

    pub fn list_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, created_at FROM recipes ORDER BY id")?;
        let recipes = stmt
            .query_map([], |row| {
                Ok(Recipe {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(recipes)
    }

    pub fn get_recipe_detail(&self, id: RecipeId) -> Result<RecipeDetail> {
        let recipe = self
            .get_recipe(id)?
            .with_context(|| format!("Recipe {id} not found"))?;
        let ingredients = self.load_recipe_entries(id)?;
        Ok(RecipeDetail {
            id: recipe.id,
            name: recipe.name,
            created_at: recipe.created_at,
            ingredients,
        })
    }

    /// Replace a recipe's whole ingredient list in one transaction, so a
    /// concurrent reader sees either the old list or the new one.
    pub fn set_recipe_ingredients(
        &self,
        recipe_id: RecipeId,
        lines: &[(IngredientId, Amount)],
    ) -> Result<RecipeDetail> {
        let tx = self.conn.unchecked_transaction()?;
        if self.get_recipe(recipe_id)?.is_none() {
            bail!("Recipe {recipe_id} not found");
        }
        for (ingredient_id, _) in lines {
            if self.get_ingredient(*ingredient_id)?.is_none() {
                bail!("Ingredient with id {ingredient_id} not found");
            }
        }
        tx.execute(
            "DELETE FROM recipe_ingredients WHERE recipe_id = ?1",
            params![recipe_id],
        )?;
        for (position, (ingredient_id, amount)) in lines.iter().enumerate() {
            tx.execute(
                "INSERT INTO recipe_ingredients (recipe_id, ingredient_id, position, amount)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    recipe_id,
                    ingredient_id,
                    i64::try_from(position)?,
                    amount.to_string()
                ],
            )?;
        }
        tx.commit()?;
        self.get_recipe_detail(recipe_id)
    }

    pub fn delete_recipe(&self, id: RecipeId) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM recipes WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn load_recipe_entries(&self, recipe_id: RecipeId) -> Result<Vec<RecipeIngredientEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.name, i.measurement_unit, ri.amount
             FROM recipe_ingredients ri JOIN ingredients i ON ri.ingredient_id = i.id
             WHERE ri.recipe_id = ?1
             ORDER BY ri.position, ri.id",
        )?;
        let rows = stmt
            .query_map(params![recipe_id], |row| {
                Ok((Self::ingredient_from_row(row)?, row.get::<_, String>(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(ingredient, amount)| {
                let amount = amount.parse::<Amount>().with_context(|| {
                    format!("Corrupt amount for '{}' in recipe {recipe_id}", ingredient.name)
                })?;
                Ok(RecipeIngredientEntry { ingredient, amount })
            })
            .collect()
    }

    // --- Shopping cart ---

    /// Returns `false` if the recipe was already in the cart.
    pub fn add_to_cart(&self, user_id: UserId, recipe_id: RecipeId) -> Result<bool> {
        if self.get_recipe(recipe_id)?.is_none() {
            bail!("Recipe {recipe_id} not found");
        }
        let now = Local::now().to_rfc3339();
        let rows = self.conn.execute(
            "INSERT OR IGNORE INTO shopping_cart (user_id, recipe_id, added_at) VALUES (?1, ?2, ?3)",
            params![user_id, recipe_id, now],
        )?;
        Ok(rows > 0)
    }

    pub fn remove_from_cart(&self, user_id: UserId, recipe_id: RecipeId) -> Result<bool> {
        let rows = self.conn.execute(
            "DELETE FROM shopping_cart WHERE user_id = ?1 AND recipe_id = ?2",
            params![user_id, recipe_id],
        )?;
        Ok(rows > 0)
    }
}

impl CartStore for Database {
    fn cart_recipe_ids(&self, user_id: UserId) -> Result<BTreeSet<RecipeId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT recipe_id FROM shopping_cart WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<Result<BTreeSet<RecipeId>, _>>()?;
        Ok(ids)
    }
}

impl RecipeIngredientIndex for Database {
    fn recipe_ingredients(&self, recipe_id: RecipeId) -> Result<RecipeLookup> {
        if self.get_recipe(recipe_id)?.is_none() {
            return Ok(RecipeLookup::NotFound);
        }
        Ok(RecipeLookup::Found(self.load_recipe_entries(recipe_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::validate_new_ingredient;

    fn add_ingredient(db: &Database, name: &str, unit: &str) -> Ingredient {
        db.upsert_ingredient(&validate_new_ingredient(name, unit).unwrap())
            .unwrap()
            .0
    }

    fn amount(s: &str) -> Amount {
        s.parse().unwrap()
    }

    #[test]
    fn test_upsert_ingredient_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let new = validate_new_ingredient("Tomato", "g").unwrap();
        let (first, created) = db.upsert_ingredient(&new).unwrap();
        assert!(created);
        let (second, created) = db.upsert_ingredient(&new).unwrap();
        assert!(!created);
        assert_eq!(first, second);

        let other_unit = validate_new_ingredient("Tomato", "pcs").unwrap();
        let (third, created) = db.upsert_ingredient(&other_unit).unwrap();
        assert!(created);
        assert_ne!(first.id, third.id);
        assert_eq!(db.list_ingredients().unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_ingredient_ignores_name_case() {
        let db = Database::open_in_memory().unwrap();
        let (first, created) = db
            .upsert_ingredient(&validate_new_ingredient("Tomato", "g").unwrap())
            .unwrap();
        assert!(created);
        let (second, created) = db
            .upsert_ingredient(&validate_new_ingredient(" tomato", "g").unwrap())
            .unwrap();
        assert!(!created);
        assert_eq!(second, first);
        assert_eq!(second.name, "Tomato");
        assert_eq!(db.list_ingredients().unwrap().len(), 1);
    }

    #[test]
    fn test_upsert_ingredients_rolls_back_on_failure() {
        let db = Database::open_in_memory().unwrap();
        add_ingredient(&db, "Salt", "g");
        let rows = vec![
            validate_new_ingredient("Pepper", "g").unwrap(),
            NewIngredient {
                name: "   ".to_string(),
                measurement_unit: "g".to_string(),
            },
        ];
        let err = db.upsert_ingredients(&rows).unwrap_err();
        assert!(format!("{err:#}").contains("row 2"));
        let names: Vec<String> = db
            .list_ingredients()
            .unwrap()
            .into_iter()
            .map(|i| i.name)
            .collect();
        assert_eq!(names, vec!["Salt"]);
    }

    #[test]
    fn test_set_recipe_ingredients_replaces_list() {
        let db = Database::open_in_memory().unwrap();
        let tomato = add_ingredient(&db, "Tomato", "g");
        let salt = add_ingredient(&db, "Salt", "g");
        let recipe = db.create_recipe("Salad").unwrap();

        db.set_recipe_ingredients(
            recipe.id,
            &[(tomato.id, amount("200")), (tomato.id, amount("50"))],
        )
        .unwrap();
        let detail = db
            .set_recipe_ingredients(recipe.id, &[(salt.id, amount("2.5"))])
            .unwrap();
        assert_eq!(detail.ingredients.len(), 1);
        assert_eq!(detail.ingredients[0].ingredient.name, "Salt");
        assert_eq!(detail.ingredients[0].amount.to_string(), "2.5");
    }

    #[test]
    fn test_set_recipe_ingredients_keeps_order_and_duplicates() {
        let db = Database::open_in_memory().unwrap();
        let tomato = add_ingredient(&db, "Tomato", "g");
        let onion = add_ingredient(&db, "Onion", "pcs");
        let recipe = db.create_recipe("Sauce").unwrap();
        let detail = db
            .set_recipe_ingredients(
                recipe.id,
                &[
                    (tomato.id, amount("200")),
                    (onion.id, amount("1")),
                    (tomato.id, amount("50")),
                ],
            )
            .unwrap();
        let names: Vec<&str> = detail
            .ingredients
            .iter()
            .map(|e| e.ingredient.name.as_str())
            .collect();
        assert_eq!(names, vec!["Tomato", "Onion", "Tomato"]);
    }

    #[test]
    fn test_set_recipe_ingredients_rejects_unknown_ingredient() {
        let db = Database::open_in_memory().unwrap();
        let tomato = add_ingredient(&db, "Tomato", "g");
        let recipe = db.create_recipe("Salad").unwrap();
        db.set_recipe_ingredients(recipe.id, &[(tomato.id, amount("100"))])
            .unwrap();

        let lines = [(tomato.id, amount("1")), (999, amount("1"))];
        assert!(db.set_recipe_ingredients(recipe.id, &lines).is_err());
        // The previous list is untouched.
        let detail = db.get_recipe_detail(recipe.id).unwrap();
        assert_eq!(detail.ingredients.len(), 1);
        assert_eq!(detail.ingredients[0].amount.to_string(), "100");
        assert!(db.set_recipe_ingredients(42, &[]).is_err());
    }

    #[test]
    fn test_cart_add_remove() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe("Soup").unwrap();
        assert!(db.add_to_cart(1, recipe.id).unwrap());
        assert!(!db.add_to_cart(1, recipe.id).unwrap());
        assert!(db.add_to_cart(1, 999).is_err());
        assert_eq!(
            db.cart_recipe_ids(1).unwrap(),
            BTreeSet::from([recipe.id])
        );
        assert!(db.cart_recipe_ids(2).unwrap().is_empty());
        assert!(db.remove_from_cart(1, recipe.id).unwrap());
        assert!(!db.remove_from_cart(1, recipe.id).unwrap());
    }

    #[test]
    fn test_delete_recipe_cascades() {
        let db = Database::open_in_memory().unwrap();
        let tomato = add_ingredient(&db, "Tomato", "g");
        let recipe = db.create_recipe("Salad").unwrap();
        db.set_recipe_ingredients(recipe.id, &[(tomato.id, amount("100"))])
            .unwrap();
        db.add_to_cart(1, recipe.id).unwrap();

        assert!(db.delete_recipe(recipe.id).unwrap());
        assert!(!db.delete_recipe(recipe.id).unwrap());
        assert!(db.cart_recipe_ids(1).unwrap().is_empty());
        assert_eq!(
            db.recipe_ingredients(recipe.id).unwrap(),
            RecipeLookup::NotFound
        );
    }

    #[test]
    fn test_recipe_lookup_for_recipe_without_ingredients() {
        let db = Database::open_in_memory().unwrap();
        let recipe = db.create_recipe("Water").unwrap();
        assert_eq!(
            db.recipe_ingredients(recipe.id).unwrap(),
            RecipeLookup::Found(Vec::new())
        );
    }

    #[test]
    fn test_open_on_disk_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pantry.db");
        {
            let db = Database::open(&path).unwrap();
            add_ingredient(&db, "Rice", "g");
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.list_ingredients().unwrap()[0].name, "Rice");
    }
}
