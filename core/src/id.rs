//! Correlation identifiers for uploads and tasks.

use uuid::Uuid;

/// Returns the caller's identifier when given, otherwise a fresh random v4 id.
pub fn generate(id: Option<Uuid>) -> Uuid {
    id.unwrap_or_else(Uuid::new_v4)
}

/// Treats an empty string the same as an absent one.
pub(crate) fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
