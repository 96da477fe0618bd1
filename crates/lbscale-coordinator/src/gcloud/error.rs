//! gcloud error classification and handling
//!
//! `gcloud` reports failures as free text on stderr with a non-zero exit
//! status. The provider's reason codes appear inside that text, so
//! classification matches on the reason code first and the human phrasing
//! second.

use thiserror::Error;

/// Result alias for calls into the compute command layer
pub type GcloudResult<T> = std::result::Result<T, GcloudError>;

/// gcloud error categories for idempotency, retry and teardown logic
#[derive(Debug, Error)]
pub enum GcloudError {
    /// Resource was not found (safe to skip in teardown)
    #[error("resource not found: {message}")]
    NotFound { message: String },

    /// Resource already exists (safe to accept in create operations)
    #[error("resource already exists: {message}")]
    AlreadyExists { message: String },

    /// Resource is still referenced by another resource (retryable)
    #[error("resource is in use by another resource: {message}")]
    ResourceInUse { message: String },

    /// Rate limit exceeded (retryable with backoff)
    #[error("rate limit exceeded: {message}")]
    Throttled { message: String },

    /// Resource has a pending operation (retryable)
    #[error("resource not ready: {message}")]
    NotReady { message: String },

    /// Any other non-zero exit
    #[error("gcloud exited with status {}: {message}", status_label(.status))]
    Command { status: Option<i32>, message: String },

    /// The CLI could not be started at all
    #[error("failed to run '{program}'")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// Structured output did not match the expected shape
    #[error("failed to decode gcloud output")]
    Decode(#[from] serde_json::Error),
}

impl GcloudError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, GcloudError::NotFound { .. })
    }

    /// Check if this is an "already exists" error
    pub fn is_already_exists(&self) -> bool {
        matches!(self, GcloudError::AlreadyExists { .. })
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GcloudError::ResourceInUse { .. }
                | GcloudError::Throttled { .. }
                | GcloudError::NotReady { .. }
        )
    }
}

fn status_label(status: &Option<i32>) -> String {
    status.map_or_else(|| "unknown".to_string(), |s| s.to_string())
}

/// Markers for "not found" conditions
const NOT_FOUND_MARKERS: &[&str] = &["was not found", "notFound", "could not be found"];

/// Markers for "already exists" conditions
const ALREADY_EXISTS_MARKERS: &[&str] = &["already exists", "alreadyExists"];

/// Markers for dependency violations (resource still referenced)
const IN_USE_MARKERS: &[&str] = &["resourceInUseByAnotherResource", "is already being used by"];

/// Markers for throttling
const THROTTLING_MARKERS: &[&str] = &["rateLimitExceeded", "Rate Limit Exceeded"];

/// Markers for resources with an operation in flight
const NOT_READY_MARKERS: &[&str] = &["resourceNotReady", "is not ready"];

/// Classify a failed gcloud invocation from its exit status and stderr.
pub fn classify_failure(status: Option<i32>, stderr: &str) -> GcloudError {
    let message = summarize_stderr(stderr);
    let contains_any = |markers: &[&str]| markers.iter().any(|m| stderr.contains(m));

    // In-use errors mention the referencing resource, which may itself be
    // described as "not found" in the same message; check them first.
    if contains_any(IN_USE_MARKERS) {
        GcloudError::ResourceInUse { message }
    } else if contains_any(NOT_FOUND_MARKERS) {
        GcloudError::NotFound { message }
    } else if contains_any(ALREADY_EXISTS_MARKERS) {
        GcloudError::AlreadyExists { message }
    } else if contains_any(THROTTLING_MARKERS) {
        GcloudError::Throttled { message }
    } else if contains_any(NOT_READY_MARKERS) {
        GcloudError::NotReady { message }
    } else {
        GcloudError::Command { status, message }
    }
}

/// Collapse gcloud's multi-line error text into one line without the
/// `ERROR: (gcloud.compute.x y)` preamble.
fn summarize_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(|l| l.trim().trim_start_matches("- ").trim())
        .filter(|l| !l.is_empty())
        .map(|l| match l.strip_prefix("ERROR: ") {
            Some(rest) => rest
                .split_once(") ")
                .filter(|_| rest.starts_with('('))
                .map_or(rest, |(_, msg)| msg),
            None => l,
        })
        .collect();

    if lines.is_empty() {
        "no error output".to_string()
    } else {
        lines.join(" ")
    }
}

/// Turn a "not found" failure into `Ok(None)`.
pub fn ignore_not_found<T>(result: GcloudResult<T>) -> GcloudResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// Turn an "already exists" failure into `Ok(None)`.
pub fn ignore_already_exists<T>(result: GcloudResult<T>) -> GcloudResult<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_already_exists() => Ok(None),
        Err(e) => Err(e),
    }
}
