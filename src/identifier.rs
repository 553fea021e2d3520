//! Caller-side identifier normalization.
//!
//! The limiter keys on identifiers exactly as given. Account emails arrive
//! in whatever case and padding the user typed, so callers fold them before
//! asking the limiter anything.

use std::borrow::Cow;

/// Trim surrounding whitespace and lowercase.
///
/// Borrows when the input is already normalized.
pub fn normalize(identifier: &str) -> Cow<'_, str> {
    let trimmed = identifier.trim();
    if trimmed
        .chars()
        .any(|c| !c.to_lowercase().eq(std::iter::once(c)))
    {
        Cow::Owned(trimmed.to_lowercase())
    } else {
        Cow::Borrowed(trimmed)
    }
}
