use anyhow::Error;
use thiserror::Error;

/// Application-level error types for gsverify-rs.
///
/// These cover configuration, manifest loading and scenario verdicts. Transport and
/// process failures never show up here: the executor, the HTTP probe, the safety
/// validator and the fixture reconciler report those as values.
///
/// ## Exit Codes
///
/// Each variant maps to an exit code (via `exit_code()`):
/// - 1: General errors (Io, ExpectationMismatch)
/// - 2: Configuration errors (MissingVariable, InvalidConfig, InvalidManifest, InvalidUri)
/// - 3: One or more scenarios failed
#[derive(Error, Debug, PartialEq)]
pub enum HarnessError {
    /// A required environment variable is not set.
    #[error("Missing required environment variable: {0}")]
    MissingVariable(String),

    /// Configuration error (non-retryable).
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Scenario/fixture manifest could not be parsed or expanded.
    #[error("Invalid manifest: {0}")]
    InvalidManifest(String),

    /// Invalid storage URI or URL.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Observed behaviour differs from the declared expectation.
    #[error("Expectation mismatch: {0}")]
    ExpectationMismatch(String),

    /// Some scenarios of a run failed.
    #[error("Scenario failures: {failed} of {total} failed")]
    ScenarioFailures { failed: usize, total: usize },
}

impl HarnessError {
    /// Get the appropriate process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            HarnessError::MissingVariable(_)
            | HarnessError::InvalidConfig(_)
            | HarnessError::InvalidManifest(_)
            | HarnessError::InvalidUri(_) => 2,
            HarnessError::ScenarioFailures { .. } => 3,
            _ => 1,
        }
    }
}

/// Extract the exit code from an anyhow::Error, defaulting to 1.
pub fn exit_code_from_error(e: &Error) -> i32 {
    if let Some(err) = e.downcast_ref::<HarnessError>() {
        return err.exit_code();
    }
    1
}

/// Returns true if the anyhow::Error wraps a missing-variable error.
pub fn is_missing_variable_error(e: &Error) -> bool {
    matches!(
        e.downcast_ref::<HarnessError>(),
        Some(HarnessError::MissingVariable(_))
    )
}

/// Classified cause of a failed remote storage action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageErrorKind {
    /// The object vanished between the existence check and the action.
    NotFound,
    /// The acting principal lacks the delete/move permission.
    PermissionDenied,
    Other,
}

// Signal substrings emitted by the storage CLI. Matched case-insensitively.
const NOT_FOUND_SIGNALS: &[&str] = &["404", "not found", "matched no objects"];
const PERMISSION_SIGNALS: &[&str] = &[
    "403",
    "storage.objects.delete",
    "does not have permission",
    "permission denied",
];

/// Classify the error text of a failed storage command.
///
/// This is the only place where error text is inspected. Permission signals win over
/// not-found signals because the CLI reports "403 ... or it may not exist" for objects
/// the caller cannot see.
pub fn classify_storage_error(message: &str) -> StorageErrorKind {
    let message = message.to_lowercase();

    if PERMISSION_SIGNALS
        .iter()
        .any(|signal| message.contains(signal))
    {
        return StorageErrorKind::PermissionDenied;
    }

    if NOT_FOUND_SIGNALS.iter().any(|signal| message.contains(signal)) {
        return StorageErrorKind::NotFound;
    }

    StorageErrorKind::Other
}
