//! Validation helpers for DTOs.

use validator::ValidationError;

const MAX_PARTICIPANT_ID_LENGTH: usize = 64;
const MAX_CATEGORY_LENGTH: usize = 32;

/// Validates that a participant ID is 1 to 64 characters without whitespace or `/`.
pub fn validate_participant_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.chars().count() > MAX_PARTICIPANT_ID_LENGTH {
        let mut err = ValidationError::new("participant_id_length");
        err.message = Some(
            format!(
                "Participant ID must be between 1 and {MAX_PARTICIPANT_ID_LENGTH} characters (got {})",
                id.chars().count()
            )
            .into(),
        );
        return Err(err);
    }

    if id.chars().any(|c| c.is_whitespace() || c == '/') {
        let mut err = ValidationError::new("participant_id_format");
        err.message = Some("Participant ID must not contain whitespace or `/`".into());
        return Err(err);
    }

    Ok(())
}

/// Validates that a category is a short lowercase slug (`a-z`, `0-9`, `-`, `_`).
///
/// Categories end up in question file names and profile service paths.
pub fn validate_category(category: &str) -> Result<(), ValidationError> {
    if category.is_empty() || category.len() > MAX_CATEGORY_LENGTH {
        let mut err = ValidationError::new("category_length");
        err.message = Some(
            format!("Category must be between 1 and {MAX_CATEGORY_LENGTH} characters").into(),
        );
        return Err(err);
    }

    if !category
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("category_format");
        err.message = Some("Category must contain only lowercase letters, digits, `-` or `_`".into());
        return Err(err);
    }

    Ok(())
}
