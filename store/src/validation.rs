//! Field limits enforced on every write.

use crate::error::Result;
use crate::error::StoreError;

pub(crate) const MAX_NAME_CHARS: usize = 200;
pub(crate) const MAX_DESCRIPTION_CHARS: usize = 2000;
pub(crate) const MAX_TITLE_CHARS: usize = 200;
pub(crate) const MAX_FLAGS: usize = 20;
pub(crate) const MAX_COMMENT_CHARS: usize = 4000;
pub(crate) const MAX_REVIEWER_CHARS: usize = 200;
pub(crate) const MAX_TEMPLATE_CHARS: usize = 20_000;

/// Trim `value` and require it to be non-empty and at most `max` characters.
pub(crate) fn required_text(field: &str, value: &str, max: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(StoreError::invalid(format!("{field} must not be empty")));
    }
    bounded(field, trimmed, max)?;
    Ok(trimmed.to_string())
}

/// Like [`required_text`] but blank input becomes `None`.
pub(crate) fn optional_text(field: &str, value: Option<&str>, max: usize) -> Result<Option<String>> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => {
            bounded(field, v, max)?;
            Ok(Some(v.to_string()))
        }
        None => Ok(None),
    }
}

pub(crate) fn bounded(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.chars().count();
    if len > max {
        return Err(StoreError::invalid(format!(
            "{field} exceeds {max} characters ({len})"
        )));
    }
    Ok(())
}

pub(crate) fn rating(value: Option<u8>) -> Result<Option<u8>> {
    match value {
        Some(r) if !(1..=5).contains(&r) => Err(StoreError::invalid(format!(
            "rating must be between 1 and 5, got {r}"
        ))),
        other => Ok(other),
    }
}

pub(crate) fn flags(values: Vec<String>) -> Result<Vec<String>> {
    let flags: Vec<String> = values
        .into_iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if flags.len() > MAX_FLAGS {
        return Err(StoreError::invalid(format!(
            "at most {MAX_FLAGS} flags allowed, got {}",
            flags.len()
        )));
    }
    Ok(flags)
}
