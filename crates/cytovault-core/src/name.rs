// cytovault-core/src/name.rs
// ============================================================================
// Module: Cytovault Name Validator
// Description: Safe-identifier grammar for catalog-bound names.
// Purpose: Reject unsafe or path-traversal-prone identifiers before storage.
// Dependencies: crate::error
// ============================================================================

//! ## Overview
//! Catalog names double as array-store path components, so every name is
//! validated against a restrictive grammar before it reaches either store:
//! a leading ASCII alphanumeric followed by up to 254 alphanumeric, dot,
//! hyphen, or underscore characters, with `..` rejected outright. The
//! validator is a pure function with no I/O.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::error::NameError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted name length, leading character included.
const MAX_NAME_LENGTH: usize = 255;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Validates a catalog-bound name against the safe-identifier grammar.
///
/// Returns the name unchanged when it is accepted so call sites can validate
/// and bind in one expression.
///
/// # Errors
///
/// Returns [`NameError`] when the name is empty, contains `..`, or fails the
/// grammar.
pub fn validate_name<'a>(value: &'a str, field: &str) -> Result<&'a str, NameError> {
    if value.is_empty() {
        return Err(NameError::Empty {
            field: field.to_owned(),
        });
    }
    if value.contains("..") {
        return Err(NameError::Traversal {
            field: field.to_owned(),
            value: value.to_owned(),
        });
    }
    if value.len() > MAX_NAME_LENGTH {
        return Err(NameError::Grammar {
            field: field.to_owned(),
            value: value.to_owned(),
        });
    }
    let mut chars = value.chars();
    let leading_ok = chars.next().is_some_and(|c| c.is_ascii_alphanumeric());
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !leading_ok || !rest_ok {
        return Err(NameError::Grammar {
            field: field.to_owned(),
            value: value.to_owned(),
        });
    }
    Ok(value)
}
