//! Field-name validation.
//!
//! Keys become path segments in flattened output (`parent.child.field`), so
//! `.` and every other punctuation or whitespace character is rejected.
//! Alphanumerics plus `_`, `/` and `@` are allowed.

use crate::error::{fatal, UsageError};

/// Returns `true` if `name` may be used as a field or group name.
#[must_use]
pub fn valid(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '/' | '@'))
}

/// Abort unless `name` is a valid key.
#[track_caller]
pub(crate) fn check(name: &str) {
    if !valid(name) {
        fatal(UsageError::InvalidKey(name.to_string()));
    }
}
