//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest suggestion accepted, in characters after trimming.
pub const MAX_SUGGESTION_CHARS: usize = 140;

/// Validates that a suggestion is non-empty and at most [`MAX_SUGGESTION_CHARS`] characters
/// once surrounding whitespace is removed.
pub fn validate_suggestion_text(text: &str) -> Result<(), ValidationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        let mut err = ValidationError::new("suggestion_empty");
        err.message = Some("Suggestion must not be empty".into());
        return Err(err);
    }

    let length = trimmed.chars().count();
    if length > MAX_SUGGESTION_CHARS {
        let mut err = ValidationError::new("suggestion_length");
        err.message = Some(
            format!("Suggestion must be at most {MAX_SUGGESTION_CHARS} characters (got {length})")
                .into(),
        );
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_regular_suggestions() {
        assert!(validate_suggestion_text("tacos").is_ok());
        assert!(validate_suggestion_text("  padded  ").is_ok());
        assert!(validate_suggestion_text(&"é".repeat(140)).is_ok());
    }

    #[test]
    fn rejects_blank_suggestions() {
        assert!(validate_suggestion_text("").is_err());
        assert!(validate_suggestion_text("   \n").is_err());
    }

    #[test]
    fn rejects_overlong_suggestions() {
        let err = validate_suggestion_text(&"a".repeat(141)).unwrap_err();
        assert_eq!(err.code, "suggestion_length");
    }
}
