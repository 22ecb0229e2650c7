//! Identifier naming conversion.
//!
//! # Responsibility
//! - Map camelCase identifiers to the SNAKE_CASE form used for default table
//!   and column names.
//! - Provide the comparison helper used whenever a declared name is checked
//!   against a live database name.
//!
//! # Invariants
//! - Conversion is pure and idempotent on already-converted input.
//! - Every default table/column name in the crate goes through this module.

use once_cell::sync::Lazy;
use regex::Regex;

static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new("([a-z])([A-Z])").expect("camel boundary pattern"));

/// Converts a camelCase identifier to its underscore-separated, upper-cased
/// form. An underscore is inserted at every lower-to-upper case boundary.
pub fn camel_to_under_score(camel: &str) -> String {
    CAMEL_BOUNDARY
        .replace_all(camel, "${1}_${2}")
        .to_uppercase()
}

/// Returns whether `camel` and `under_score` name the same identifier once
/// both are normalized to the underscore form.
pub fn is_camel_for_under_score(camel: &str, under_score: &str) -> bool {
    camel_to_under_score(camel) == under_score.to_uppercase()
}
