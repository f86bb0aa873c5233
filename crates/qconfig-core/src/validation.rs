//! # Validation Module
//!
//! Input validation for identities and item names.
//!
//! Item names double as file names in the durable cache, so they are checked
//! before any path is built from them.

use crate::error::{CoreError, CoreResult};
use crate::types::ClientIdentity;
use crate::VERSION_FILE_NAME;

/// Validates that every identity field is present.
pub fn validate_identity(identity: &ClientIdentity) -> CoreResult<()> {
    let fields = [
        ("name", &identity.project_name),
        ("token", &identity.project_token),
        ("get_token_url", &identity.token_endpoint_url),
        ("get_entrypoint_url", &identity.entrypoint_url),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            return Err(CoreError::MissingField { field });
        }
    }
    Ok(())
}

/// Validates a config item name.
///
/// ## Rules
/// - Must not be empty
/// - Must not contain `/`, `\` or NUL
/// - Must not be `.`, `..` or the version-index file name
///
/// ## Example
/// ```rust
/// use qconfig_core::validation::validate_item_name;
///
/// assert!(validate_item_name("db.properties").is_ok());
/// assert!(validate_item_name("../secrets").is_err());
/// ```
pub fn validate_item_name(name: &str) -> CoreResult<()> {
    let invalid = |reason: &'static str| -> CoreResult<()> {
        Err(CoreError::InvalidItemName {
            name: name.to_string(),
            reason,
        })
    };

    if name.is_empty() {
        return invalid("must not be empty");
    }
    if name.contains(|c: char| matches!(c, '/' | '\\' | '\0')) {
        return invalid("must not contain path separators");
    }
    if name == "." || name == ".." {
        return invalid("must not be a relative path component");
    }
    if name == VERSION_FILE_NAME {
        return invalid("is reserved for the version index");
    }
    Ok(())
}
