use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Serialize};

pub type IngredientId = i64;
pub type RecipeId = i64;
pub type UserId = i64;

pub const INGREDIENT_NAME_MAX_LENGTH: usize = 128;
pub const MEASUREMENT_UNIT_MAX_LENGTH: usize = 64;
pub const RECIPE_NAME_MAX_LENGTH: usize = 256;

/// A strictly positive decimal quantity.
///
/// Stored normalized (no trailing fractional zeros) so that equal quantities
/// render identically regardless of how they were written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self> {
        if value <= Decimal::ZERO {
            bail!("Amount must be greater than 0 (got {value})");
        }
        Ok(Self(value.normalize()))
    }

    /// Convert a float quantity (e.g. parsed from a recipe file), rounded to
    /// three fractional digits.
    pub fn from_f64(value: f64) -> Result<Self> {
        let decimal = Decimal::from_f64(value)
            .with_context(|| format!("Amount {value} is not a finite number"))?;
        Self::new(decimal.round_dp(3))
    }

    #[must_use]
    pub fn value(self) -> Decimal {
        self.0
    }

    #[must_use]
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(|sum| Self(sum.normalize()))
    }
}

impl FromStr for Amount {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let value = Decimal::from_str(s).with_context(|| format!("Invalid amount: '{s}'"))?;
        Self::new(value)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// Case-fold an ingredient name for comparison: trims surrounding whitespace
/// and lowercases (Unicode-aware, so "Помидор" and "помидор" collide).
#[must_use]
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[must_use]
pub fn normalize_unit(unit: &str) -> String {
    unit.trim().to_string()
}

/// Aggregation key: the same name in two different units is never merged.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IngredientKey {
    pub name: String,
    pub unit: String,
}

impl IngredientKey {
    #[must_use]
    pub fn new(name: &str, unit: &str) -> Self {
        Self {
            name: normalize_name(name),
            unit: normalize_unit(unit),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    pub id: IngredientId,
    pub name: String,
    pub measurement_unit: String,
}

impl Ingredient {
    #[must_use]
    pub fn key(&self) -> IngredientKey {
        IngredientKey::new(&self.name, &self.measurement_unit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIngredient {
    pub name: String,
    pub measurement_unit: String,
}

/// Trim and validate a catalog entry before it is stored.
pub fn validate_new_ingredient(name: &str, measurement_unit: &str) -> Result<NewIngredient> {
    let name = name.trim();
    let unit = normalize_unit(measurement_unit);
    if name.is_empty() {
        bail!("Ingredient name must not be empty");
    }
    if unit.is_empty() {
        bail!("Measurement unit must not be empty");
    }
    if name.chars().count() > INGREDIENT_NAME_MAX_LENGTH {
        bail!("Ingredient name must be at most {INGREDIENT_NAME_MAX_LENGTH} characters");
    }
    if unit.chars().count() > MEASUREMENT_UNIT_MAX_LENGTH {
        bail!("Measurement unit must be at most {MEASUREMENT_UNIT_MAX_LENGTH} characters");
    }
    if name.contains(['\n', '\r']) || unit.contains(['\n', '\r']) {
        bail!("Ingredient name and unit must be single-line");
    }
    Ok(NewIngredient {
        name: name.to_string(),
        measurement_unit: unit,
    })
}

pub fn validate_recipe_name(name: &str) -> Result<String> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Recipe name must not be empty");
    }
    if name.chars().count() > RECIPE_NAME_MAX_LENGTH {
        bail!("Recipe name must be at most {RECIPE_NAME_MAX_LENGTH} characters");
    }
    Ok(name.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecipeIngredientEntry {
    pub ingredient: Ingredient,
    pub amount: Amount,
}

/// Result of resolving a recipe's ingredient list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipeLookup {
    Found(Vec<RecipeIngredientEntry>),
    NotFound,
}

#[derive(Debug, Clone, Serialize)]
pub struct Recipe {
    pub id: RecipeId,
    pub name: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RecipeDetail {
    pub id: RecipeId,
    pub name: String,
    pub created_at: String,
    pub ingredients: Vec<RecipeIngredientEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregatedItem {
    pub name: String,
    pub measurement_unit: String,
    pub total_amount: Amount,
}

/// A cart recipe whose ingredients could not be resolved and was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingRecipeData {
    pub recipe_id: RecipeId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShoppingList {
    pub user_id: UserId,
    pub items: Vec<AggregatedItem>,
    pub missing_recipes: Vec<MissingRecipeData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub rows_parsed: usize,
    pub created: usize,
    pub existing: usize,
    /// Blank or invalid rows that were left out.
    pub skipped: usize,
}
