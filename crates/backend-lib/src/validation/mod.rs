// ============================
// crates/backend-lib/src/validation/mod.rs
// ============================
//! Inbound event validation.
//!
//! Payload content stays opaque to the relay; only the routing metadata
//! (project identifier) and the cursor coordinates it rewrites are checked.

use regex::Regex;
use sketch_common::ClientEvent;
use std::sync::LazyLock;
use thiserror::Error;

const MAX_PROJECT_ID_LENGTH: usize = 128;

static PROJECT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:\-]+$").expect("project id pattern is valid"));

/// Possible validation errors
#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Invalid project ID: {0}")]
    InvalidProjectId(String),

    #[error("Invalid cursor position: {0}")]
    InvalidCursor(String),
}

/// Result type for validation operations
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validate a project identifier.
///
/// Project ids are otherwise opaque to the relay, but only a URL- and log-safe
/// character set is accepted so ids can appear in `/api/sessions/{id}` paths
/// and log fields unescaped. Database object ids, slugs and UUIDs all fit.
pub fn validate_project_id(project_id: &str) -> ValidationResult<&str> {
    if project_id.is_empty() {
        return Err(ValidationError::InvalidProjectId(
            "Project ID must not be empty".to_string(),
        ));
    }

    if project_id.len() > MAX_PROJECT_ID_LENGTH {
        return Err(ValidationError::InvalidProjectId(format!(
            "Project ID cannot exceed {MAX_PROJECT_ID_LENGTH} characters"
        )));
    }

    if !PROJECT_ID_REGEX.is_match(project_id) {
        return Err(ValidationError::InvalidProjectId(
            "Project ID contains invalid characters".to_string(),
        ));
    }

    Ok(project_id)
}

/// Cursor coordinates must be finite numbers
pub fn validate_cursor(x: f64, y: f64) -> ValidationResult<(f64, f64)> {
    if !x.is_finite() || !y.is_finite() {
        return Err(ValidationError::InvalidCursor(format!(
            "coordinates must be finite, got ({x}, {y})"
        )));
    }
    Ok((x, y))
}

/// Validate a client event before it reaches the relay
pub fn validate_client_event(event: &ClientEvent) -> ValidationResult<()> {
    validate_project_id(event.project_id())?;

    if let ClientEvent::CursorMove { x, y, .. } = event {
        validate_cursor(*x, *y)?;
    }

    Ok(())
}
