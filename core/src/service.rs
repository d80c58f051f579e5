use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::Result;
use tracing::info;

use crate::aggregate::build_shopping_list;
use crate::catalog::IngredientCatalog;
use crate::db::Database;
use crate::error::ShoppingListError;
use crate::export::{ExportFormat, format_shopping_list};
use crate::import::{import_ingredients, parse_ingredients_file};
use crate::models::{
    ImportSummary, Ingredient, MissingRecipeData, RecipeId, RecipeLookup, ShoppingList, UserId,
    validate_new_ingredient,
};
use crate::ports::{CartStore, RecipeIngredientIndex};

/// A rendered shopping list ready to be served as a download.
#[derive(Debug, Clone)]
pub struct ShoppingListExport {
    pub body: Vec<u8>,
    pub content_type: &'static str,
    pub filename: &'static str,
    pub item_count: usize,
    pub missing_recipes: Vec<MissingRecipeData>,
}

/// Facade over the store and the in-memory catalog. The catalog is loaded
/// from the database on open and rebuilt after every catalog write.
///
/// The SQLite connection sits behind a mutex; catalog searches never take it.
pub struct PantryService {
    db: Mutex<Database>,
    catalog: IngredientCatalog,
}

impl PantryService {
    pub fn new(db: Database) -> Result<Self> {
        let catalog = IngredientCatalog::from_ingredients(db.list_ingredients()?);
        info!(ingredients = catalog.len(), "ingredient catalog loaded");
        Ok(Self {
            db: Mutex::new(db),
            catalog,
        })
    }

    pub fn open(db_path: &Path) -> Result<Self> {
        Self::new(Database::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Database::open_in_memory()?)
    }

    /// Exclusive access to the underlying store.
    pub fn db(&self) -> MutexGuard<'_, Database> {
        lock(&self.db)
    }

    #[must_use]
    pub fn catalog(&self) -> &IngredientCatalog {
        &self.catalog
    }

    // --- Catalog ---

    #[must_use]
    pub fn search_ingredients(&self, prefix: &str, limit: usize) -> Vec<Ingredient> {
        self.catalog.search(prefix, limit)
    }

    /// Returns the stored ingredient and whether it was newly created.
    ///
    /// The store lock is held until the catalog is updated, so catalog
    /// writers publish in the same order as the database commits.
    pub fn add_ingredient(&self, name: &str, measurement_unit: &str) -> Result<(Ingredient, bool)> {
        let new = validate_new_ingredient(name, measurement_unit)?;
        let db = self.db();
        let (ingredient, created) = db.upsert_ingredient(&new)?;
        if created {
            self.catalog.insert(ingredient.clone());
        }
        Ok((ingredient, created))
    }

    pub fn import_ingredients(&self, path: &Path) -> Result<ImportSummary> {
        let parsed = parse_ingredients_file(path)?;
        let db = self.db();
        let (summary, _) = import_ingredients(&db, &parsed)?;
        if summary.created > 0 {
            self.catalog.replace(db.list_ingredients()?);
        }
        drop(db);
        info!(
            path = %path.display(),
            rows = summary.rows_parsed,
            created = summary.created,
            existing = summary.existing,
            skipped = summary.skipped,
            "ingredient import finished"
        );
        Ok(summary)
    }

    /// Rebuild the catalog snapshot from the database. Returns the new version.
    pub fn reload_catalog(&self) -> Result<u64> {
        let db = self.db();
        let ingredients = db.list_ingredients()?;
        Ok(self.catalog.replace(ingredients))
    }

    // --- Shopping list ---

    /// Aggregate the user's cart. The store lock is taken per read rather
    /// than for the whole aggregation.
    pub fn build_shopping_list(&self, user_id: UserId) -> Result<ShoppingList, ShoppingListError> {
        let store = SharedStore(&self.db);
        build_shopping_list(&store, &store, user_id)
    }

    /// Render the user's shopping list. An empty cart is not an error here:
    /// it yields the format's placeholder body.
    pub fn export_shopping_list(
        &self,
        user_id: UserId,
        format: ExportFormat,
    ) -> Result<ShoppingListExport, ShoppingListError> {
        let (body, item_count, missing_recipes) = match self.build_shopping_list(user_id) {
            Ok(list) if list.items.is_empty() => (format.placeholder(), 0, list.missing_recipes),
            Ok(list) => (
                format_shopping_list(&list.items, format)?,
                list.items.len(),
                list.missing_recipes,
            ),
            Err(ShoppingListError::EmptyCart { .. }) => (format.placeholder(), 0, Vec::new()),
            Err(err) => return Err(err),
        };
        Ok(ShoppingListExport {
            body,
            content_type: format.content_type(),
            filename: format.file_name(),
            item_count,
            missing_recipes,
        })
    }
}

fn lock(db: &Mutex<Database>) -> MutexGuard<'_, Database> {
    db.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Read ports over the shared connection, locking once per call.
struct SharedStore<'a>(&'a Mutex<Database>);

impl CartStore for SharedStore<'_> {
    fn cart_recipe_ids(&self, user_id: UserId) -> Result<BTreeSet<RecipeId>> {
        lock(self.0).cart_recipe_ids(user_id)
    }
}

impl RecipeIngredientIndex for SharedStore<'_> {
    fn recipe_ingredients(&self, recipe_id: RecipeId) -> Result<RecipeLookup> {
        lock(self.0).recipe_ingredients(recipe_id)
    }
}
