//! In-memory ingredient catalog with prefix search.
//!
//! The catalog is published as immutable, versioned snapshots. Readers grab
//! the current `Arc<CatalogSnapshot>` and search it without holding any lock,
//! so a rebuild never exposes a half-built index. Writers are serialized and
//! publish a complete new snapshot by swapping the pointer.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use crate::models::{Ingredient, IngredientId, IngredientKey, normalize_name};

#[derive(Debug, Clone)]
struct CatalogEntry {
    normalized_name: String,
    ingredient: Ingredient,
    seq: usize,
}

/// One published version of the catalog, sorted by
/// `(normalized name, unit, insertion order)`.
#[derive(Debug, Default)]
pub struct CatalogSnapshot {
    version: u64,
    entries: Vec<CatalogEntry>,
}

impl CatalogSnapshot {
    /// Build a snapshot from ingredients in insertion order. Later duplicates
    /// of an already seen `(name, unit)` key are dropped.
    #[must_use]
    pub fn build(version: u64, ingredients: impl IntoIterator<Item = Ingredient>) -> Self {
        let mut seen = HashSet::new();
        let mut entries: Vec<CatalogEntry> = ingredients
            .into_iter()
            .filter(|ingredient| seen.insert(ingredient.key()))
            .enumerate()
            .map(|(seq, ingredient)| CatalogEntry {
                normalized_name: normalize_name(&ingredient.name),
                ingredient,
                seq,
            })
            .collect();
        entries.sort_by(|a, b| {
            a.normalized_name
                .cmp(&b.normalized_name)
                .then_with(|| {
                    a.ingredient
                        .measurement_unit
                        .cmp(&b.ingredient.measurement_unit)
                })
                .then_with(|| a.seq.cmp(&b.seq))
        });
        Self { version, entries }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ingredients whose normalized name starts with the normalized `prefix`,
    /// at most `limit` of them. A blank prefix or a zero limit matches nothing.
    ///
    /// Binary search locates the first candidate; matches are contiguous in
    /// sort order, so the scan stops at the first non-match.
    #[must_use]
    pub fn search(&self, prefix: &str, limit: usize) -> Vec<Ingredient> {
        let needle = normalize_name(prefix);
        if needle.is_empty() || limit == 0 {
            return Vec::new();
        }
        let start = self
            .entries
            .partition_point(|entry| entry.normalized_name.as_str() < needle.as_str());
        self.entries[start..]
            .iter()
            .take_while(|entry| entry.normalized_name.starts_with(&needle))
            .take(limit)
            .map(|entry| entry.ingredient.clone())
            .collect()
    }

    #[must_use]
    pub fn get(&self, id: IngredientId) -> Option<&Ingredient> {
        self.entries
            .iter()
            .map(|entry| &entry.ingredient)
            .find(|ingredient| ingredient.id == id)
    }

    #[must_use]
    pub fn contains_key(&self, key: &IngredientKey) -> bool {
        self.entries.iter().any(|entry| {
            entry.normalized_name == key.name && entry.ingredient.measurement_unit == key.unit
        })
    }

    /// All ingredients in the order they were first inserted.
    #[must_use]
    pub fn ingredients(&self) -> Vec<Ingredient> {
        let mut entries: Vec<&CatalogEntry> = self.entries.iter().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries
            .into_iter()
            .map(|entry| entry.ingredient.clone())
            .collect()
    }
}

/// Shared, read-mostly catalog. Cheap to search from many threads at once.
#[derive(Debug, Default)]
pub struct IngredientCatalog {
    current: RwLock<Arc<CatalogSnapshot>>,
    writer: Mutex<()>,
}

impl IngredientCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_ingredients(ingredients: impl IntoIterator<Item = Ingredient>) -> Self {
        Self {
            current: RwLock::new(Arc::new(CatalogSnapshot::build(1, ingredients))),
            writer: Mutex::new(()),
        }
    }

    /// The currently published snapshot. Stays valid (and unchanged) for as
    /// long as the caller holds it, even across later rebuilds.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    #[must_use]
    pub fn search(&self, prefix: &str, limit: usize) -> Vec<Ingredient> {
        self.snapshot().search(prefix, limit)
    }

    #[must_use]
    pub fn get(&self, id: IngredientId) -> Option<Ingredient> {
        self.snapshot().get(id).cloned()
    }

    /// Rebuild the catalog from scratch and publish it. Returns the new version.
    pub fn replace(&self, ingredients: impl IntoIterator<Item = Ingredient>) -> u64 {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let version = self.snapshot().version() + 1;
        self.publish(CatalogSnapshot::build(version, ingredients));
        version
    }

    /// Copy-on-write insert. Returns `false` when the `(name, unit)` key is
    /// already cataloged, in which case nothing is published.
    pub fn insert(&self, ingredient: Ingredient) -> bool {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        if current.contains_key(&ingredient.key()) {
            return false;
        }
        let mut ingredients = current.ingredients();
        ingredients.push(ingredient);
        self.publish(CatalogSnapshot::build(current.version() + 1, ingredients));
        true
    }

    fn publish(&self, snapshot: CatalogSnapshot) {
        tracing::debug!(
            version = snapshot.version(),
            entries = snapshot.len(),
            "publishing ingredient catalog snapshot"
        );
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ingredient(id: i64, name: &str, unit: &str) -> Ingredient {
        Ingredient {
            id,
            name: name.to_string(),
            measurement_unit: unit.to_string(),
        }
    }

    fn sample_catalog() -> IngredientCatalog {
        IngredientCatalog::from_ingredients(vec![
            ingredient(1, "Tomato", "g"),
            ingredient(2, "tomato paste", "g"),
            ingredient(3, "Milk", "ml"),
            ingredient(4, "Milk", "l"),
            ingredient(5, "помидор", "г"),
            ingredient(6, "свежий помидор", "г"),
            ingredient(7, "Tofu", "g"),
            ingredient(8, "Apple", "pcs"),
        ])
    }

    fn names(found: &[Ingredient]) -> Vec<(&str, &str)> {
        found
            .iter()
            .map(|i| (i.name.as_str(), i.measurement_unit.as_str()))
            .collect()
    }

    #[test]
    fn test_prefix_search_is_case_insensitive_and_trimmed() {
        let catalog = sample_catalog();
        let found = catalog.search("  TOM ", 10);
        assert_eq!(names(&found), vec![("Tomato", "g"), ("tomato paste", "g")]);
    }

    #[test]
    fn test_prefix_is_anchored_at_name_start() {
        let catalog = sample_catalog();
        let found = catalog.search("пом", 10);
        assert_eq!(names(&found), vec![("помидор", "г")]);
        assert!(catalog.search("омидор", 10).is_empty());
    }

    #[test]
    fn test_results_ordered_by_name_then_unit() {
        let catalog = sample_catalog();
        let found = catalog.search("milk", 10);
        assert_eq!(names(&found), vec![("Milk", "l"), ("Milk", "ml")]);

        let found = catalog.search("t", 10);
        assert_eq!(
            names(&found),
            vec![("Tofu", "g"), ("Tomato", "g"), ("tomato paste", "g")]
        );
    }

    #[test]
    fn test_limit_truncates_and_zero_returns_empty() {
        let catalog = sample_catalog();
        assert_eq!(catalog.search("t", 2).len(), 2);
        assert!(catalog.search("t", 0).is_empty());
    }

    #[test]
    fn test_blank_prefix_matches_nothing() {
        let catalog = sample_catalog();
        assert!(catalog.search("", 10).is_empty());
        assert!(catalog.search("   ", 10).is_empty());
    }

    #[test]
    fn test_empty_catalog_search() {
        let catalog = IngredientCatalog::new();
        assert!(catalog.is_empty());
        assert!(catalog.search("a", 10).is_empty());
    }

    #[test]
    fn test_every_result_matches_and_nothing_is_missed() {
        let catalog = sample_catalog();
        let all = catalog.snapshot().ingredients();
        for prefix in ["t", "to", "tom", "m", "mi", "п", "с", "a", "z", "tomato p"] {
            let found = catalog.search(prefix, usize::MAX);
            let needle = normalize_name(prefix);
            assert!(found.iter().all(|i| normalize_name(&i.name).starts_with(&needle)));
            let expected = all
                .iter()
                .filter(|i| normalize_name(&i.name).starts_with(&needle))
                .count();
            assert_eq!(found.len(), expected, "prefix {prefix}");
            assert_eq!(found, catalog.search(prefix, usize::MAX));
        }
    }

    #[test]
    fn test_duplicate_keys_keep_first_inserted() {
        let catalog = IngredientCatalog::from_ingredients(vec![
            ingredient(1, "Salt", "g"),
            ingredient(2, "salt ", "g"),
            ingredient(3, "Salt", "kg"),
        ]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.search("salt", 10)[0].id, 1);
    }

    #[test]
    fn test_insert_publishes_new_version() {
        let catalog = sample_catalog();
        let before = catalog.snapshot();
        assert!(catalog.insert(ingredient(9, "Tarragon", "g")));
        assert!(!catalog.insert(ingredient(10, "tarragon", "g")));
        assert_eq!(catalog.version(), before.version() + 1);

        // The old snapshot is untouched.
        assert!(before.search("tarr", 10).is_empty());
        assert_eq!(catalog.search("tarr", 10).len(), 1);
        assert_eq!(catalog.get(9).unwrap().name, "Tarragon");
    }

    #[test]
    fn test_replace_rebuilds_catalog() {
        let catalog = sample_catalog();
        let version = catalog.replace(vec![ingredient(1, "Basil", "g")]);
        assert_eq!(version, 2);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.search("tom", 10).is_empty());
    }

    #[test]
    fn test_concurrent_readers_see_consistent_snapshots() {
        let catalog = Arc::new(sample_catalog());
        std::thread::scope(|scope| {
            for _ in 0..4 {
                let catalog = Arc::clone(&catalog);
                scope.spawn(move || {
                    for _ in 0..200 {
                        let snapshot = catalog.snapshot();
                        let found = snapshot.search("t", usize::MAX);
                        let expected = snapshot
                            .ingredients()
                            .iter()
                            .filter(|i| normalize_name(&i.name).starts_with('t'))
                            .count();
                        assert_eq!(found.len(), expected);
                    }
                });
            }
            for n in 0..50 {
                catalog.insert(ingredient(100 + n, &format!("Thyme {n}"), "g"));
            }
        });
        assert_eq!(catalog.search("thyme", usize::MAX).len(), 50);
    }
}
