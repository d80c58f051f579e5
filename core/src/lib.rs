//! Shopping-list consolidation and ingredient search.
//!
//! The engine reads a user's cart and each recipe's ingredient lines through
//! the [`ports`] traits, sums identical `(name, unit)` ingredients with exact
//! decimal arithmetic and renders the result for download. The ingredient
//! catalog is an immutable, versioned snapshot searched by name prefix.

pub mod aggregate;
pub mod catalog;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod ports;
pub mod service;
