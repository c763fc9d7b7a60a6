pub mod documents;
pub mod evaluation;
pub mod health;
pub mod predict;
pub mod sessions;
pub mod train;

use crate::core::errors::ApiError;

/// Rejects blank required string fields with a 400.
pub(crate) fn require_field(name: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} is required", name)));
    }
    Ok(())
}
