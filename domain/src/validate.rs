//! Lightweight input validation helpers. Keep logic minimal and deterministic.

use crate::CoreError;

/// Upper bound on stored URL length, in bytes.
pub const MAX_URL_LEN: usize = 2048;

/// Validate an original URL and return it trimmed.
///
/// Only emptiness and length are checked; the service shortens whatever the
/// client sends.
pub fn validate_original_url(s: &str) -> Result<&str, CoreError> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation("url is required".into()));
    }
    if trimmed.len() > MAX_URL_LEN {
        return Err(CoreError::Validation("url too long".into()));
    }
    Ok(trimmed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_validation_basic() {
        assert_eq!(
            validate_original_url("https://example.com").unwrap(),
            "https://example.com"
        );
        assert_eq!(validate_original_url("  http://e.com \n").unwrap(), "http://e.com");
        assert!(validate_original_url("").is_err());
        assert!(validate_original_url(" \t ").is_err());
    }

    #[test]
    fn url_length_cap() {
        let long = format!("https://e.com/{}", "a".repeat(MAX_URL_LEN));
        assert!(matches!(
            validate_original_url(&long),
            Err(CoreError::Validation(_))
        ));
    }
}
