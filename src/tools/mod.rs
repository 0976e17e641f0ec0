use serde_json::Value;

use crate::config::MAX_PAGE_SIZE;
use crate::error::OtMcpError;
use crate::util::project_fields;

pub mod disease;
pub mod drug;
pub mod graphql;
pub mod meta;
pub mod search;
pub mod target;
pub mod workflow;

pub const DEFAULT_PAGE_INDEX: i64 = 0;
pub const DEFAULT_PAGE_SIZE: i64 = 10;

pub(crate) fn validate_page_index(page_index: i64) -> Result<(), OtMcpError> {
    if page_index < 0 {
        return Err(OtMcpError::InvalidArgument(
            "page_index must be an integer >= 0.".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_page_size(page_size: i64) -> Result<(), OtMcpError> {
    if page_size < 1 {
        return Err(OtMcpError::InvalidArgument(
            "page_size must be an integer >= 1.".into(),
        ));
    }
    if page_size > MAX_PAGE_SIZE {
        return Err(OtMcpError::InvalidArgument(format!(
            "page_size must be <= {MAX_PAGE_SIZE}."
        )));
    }
    Ok(())
}

pub(crate) fn validate_size(size: i64) -> Result<(), OtMcpError> {
    if size < 1 {
        return Err(OtMcpError::InvalidArgument(
            "size must be an integer >= 1.".into(),
        ));
    }
    Ok(())
}

pub(crate) fn validate_threshold(threshold: Option<f64>) -> Result<(), OtMcpError> {
    if let Some(value) = threshold
        && !(0.0..=1.0).contains(&value)
    {
        return Err(OtMcpError::InvalidArgument(
            "threshold must be between 0 and 1 when provided.".into(),
        ));
    }
    Ok(())
}

/// Prunes a tool payload down to the requested dot-paths when the caller
/// asked for specific fields.
pub(crate) fn apply_fields(payload: Value, fields: Option<&[String]>) -> Value {
    match fields {
        Some(paths) if !paths.is_empty() => project_fields(&payload, paths),
        _ => payload,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn page_bounds_are_enforced() {
        assert!(validate_page_index(0).is_ok());
        assert!(validate_page_size(500).is_ok());

        let err = validate_page_index(-1).unwrap_err();
        assert!(err.to_string().contains("page_index must be an integer >= 0."));

        let err = validate_page_size(0).unwrap_err();
        assert!(err.to_string().contains("page_size must be an integer >= 1."));

        let err = validate_page_size(501).unwrap_err();
        assert!(err.to_string().contains("page_size must be <= 500."));
    }

    #[test]
    fn size_and_threshold_bounds_are_enforced() {
        assert!(validate_size(1).is_ok());
        assert!(validate_size(0).is_err());

        assert!(validate_threshold(None).is_ok());
        assert!(validate_threshold(Some(0.0)).is_ok());
        assert!(validate_threshold(Some(1.0)).is_ok());

        let err = validate_threshold(Some(1.5)).unwrap_err();
        assert!(
            err.to_string()
                .contains("threshold must be between 0 and 1 when provided.")
        );
        assert!(validate_threshold(Some(f64::NAN)).is_err());
    }

    #[test]
    fn field_projection_is_skipped_without_paths() {
        let payload = json!({"target": {"id": "ENSG1", "biotype": "protein_coding"}});
        assert_eq!(apply_fields(payload.clone(), None), payload);
        assert_eq!(apply_fields(payload.clone(), Some(&[])), payload);

        let projected = apply_fields(payload, Some(&["target.id".to_string()]));
        assert_eq!(projected, json!({"target": {"id": "ENSG1"}}));
    }
}
