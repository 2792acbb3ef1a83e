use std::borrow::Cow;

use validator::ValidationError;

use super::path::validate_segment;

/// Validate that a string can be used as a single document store path segment.
///
/// Attribute values become collection and document ids, so they must satisfy
/// the same rules as any other path segment.
pub fn validate_path_segment(value: &str) -> Result<(), ValidationError> {
    validate_segment(value).map_err(|e| {
        let mut err = ValidationError::new("invalid_path_segment");
        err.message = Some(Cow::Owned(e.to_string()));
        err
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path_segment() {
        assert!(validate_path_segment("RebelEspresso").is_ok());
        assert!(validate_path_segment("re-2.0-0000002").is_ok());

        let err = validate_path_segment("a/b").unwrap_err();
        assert_eq!(err.code, "invalid_path_segment");
        assert!(err.message.unwrap().contains("'/'"));

        assert!(validate_path_segment("..").is_err());
        assert!(validate_path_segment("__meta__").is_err());
    }
}
