use thiserror::Error;

use crate::models::{MissingRecipeData, UserId};

/// Failures of the shopping-list path (aggregation and export).
#[derive(Debug, Error)]
pub enum ShoppingListError {
    /// The user's cart holds no recipes. Callers usually render this as
    /// "nothing to export" rather than a failure.
    #[error("shopping cart of user {user_id} is empty")]
    EmptyCart { user_id: UserId },

    /// Recorded per recipe and skipped; aggregation continues.
    #[error("ingredients of recipe {} could not be resolved: {}", .0.recipe_id, .0.reason)]
    MissingRecipeData(MissingRecipeData),

    #[error("cannot serialize shopping list item '{name}': {reason}")]
    Serialization { name: String, reason: String },

    #[error("total amount of '{name}' ({unit}) overflows")]
    AmountOverflow { name: String, unit: String },

    #[error("storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl ShoppingListError {
    /// Whether the error should be shown to the end user as a normal state
    /// rather than reported as an internal failure.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(self, Self::EmptyCart { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_empty_cart_is_user_facing() {
        assert!(ShoppingListError::EmptyCart { user_id: 1 }.is_user_facing());
        assert!(
            !ShoppingListError::Serialization {
                name: "x".to_string(),
                reason: "bad".to_string(),
            }
            .is_user_facing()
        );
        assert!(!ShoppingListError::Storage(anyhow::anyhow!("disk gone")).is_user_facing());
    }

    #[test]
    fn test_missing_recipe_message() {
        let err = ShoppingListError::MissingRecipeData(MissingRecipeData {
            recipe_id: 7,
            reason: "recipe not found".to_string(),
        });
        assert_eq!(
            err.to_string(),
            "ingredients of recipe 7 could not be resolved: recipe not found"
        );
    }
}
