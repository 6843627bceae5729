use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;

use crate::types::error::{HarnessError, StorageErrorKind};

pub mod error;

/// Storage CLI verbs driven by the harness.
///
/// `Remove` is never part of a scenario; the fixture reconciler issues it to delete copies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandVerb {
    #[serde(alias = "ls")]
    List,
    #[serde(alias = "cp")]
    Copy,
    #[serde(alias = "mv")]
    Move,
    #[serde(alias = "sign-url")]
    SignUrl,
    #[serde(alias = "rm")]
    Remove,
}

impl CommandVerb {
    /// Token placed on the command line after the prefix.
    pub fn token(&self) -> &'static str {
        match self {
            Self::List => "ls",
            Self::Copy => "cp",
            Self::Move => "mv",
            Self::SignUrl => "sign-url",
            Self::Remove => "rm",
        }
    }
}

impl fmt::Display for CommandVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

/// A path argument: either a remote object URI (`scheme://bucket/key`) or a local path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectPath {
    Remote {
        uri: String,
        bucket: String,
        key: String,
    },
    Local(PathBuf),
}

impl ObjectPath {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }

    pub fn bucket(&self) -> Option<&str> {
        match self {
            Self::Remote { bucket, .. } => Some(bucket),
            Self::Local(_) => None,
        }
    }
}

impl FromStr for ObjectPath {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((scheme, rest)) = s.split_once("://") else {
            if s.is_empty() {
                return Err(HarnessError::InvalidUri("empty path".to_string()));
            }
            return Ok(Self::Local(PathBuf::from(s)));
        };

        if scheme.is_empty() || !scheme.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(HarnessError::InvalidUri(s.to_string()));
        }

        let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
        if bucket.is_empty() {
            return Err(HarnessError::InvalidUri(s.to_string()));
        }

        Ok(Self::Remote {
            uri: s.to_string(),
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }
}

impl fmt::Display for ObjectPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { uri, .. } => f.write_str(uri),
            Self::Local(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One invocation of the storage CLI: `<prefix> <verb> [source] [destination] [flags...]`.
///
/// Built once from a scenario table and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub prefix: String,
    pub verb: CommandVerb,
    pub source: Option<ObjectPath>,
    pub destination: Option<ObjectPath>,
    pub flags: Vec<String>,
}

impl CommandDescriptor {
    pub fn new(prefix: &str, verb: CommandVerb) -> Self {
        Self {
            prefix: prefix.to_string(),
            verb,
            source: None,
            destination: None,
            flags: Vec::new(),
        }
    }

    pub fn with_source(mut self, source: ObjectPath) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_destination(mut self, destination: ObjectPath) -> Self {
        self.destination = Some(destination);
        self
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }

    /// Check that the populated path fields match what the verb uses.
    ///
    /// LIST takes an optional source (no source lists buckets), SIGN_URL and REMOVE take
    /// exactly a source, COPY and MOVE take both paths.
    pub fn validate(&self) -> Result<(), HarnessError> {
        let (needs_source, allows_destination) = match self.verb {
            CommandVerb::List => (false, false),
            CommandVerb::SignUrl | CommandVerb::Remove => (true, false),
            CommandVerb::Copy | CommandVerb::Move => (true, true),
        };

        if needs_source && self.source.is_none() {
            return Err(HarnessError::InvalidConfig(format!(
                "{} requires a source path",
                self.verb
            )));
        }
        if !allows_destination && self.destination.is_some() {
            return Err(HarnessError::InvalidConfig(format!(
                "{} does not take a destination path",
                self.verb
            )));
        }
        if allows_destination && self.destination.is_none() {
            return Err(HarnessError::InvalidConfig(format!(
                "{} requires a destination path",
                self.verb
            )));
        }
        Ok(())
    }
}

/// Outcome of running one command line to completion.
///
/// On success `stdout` is authoritative; on failure the error text is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            ..Self::default()
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Error text of a failed run: the failure message, falling back to stderr.
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or(&self.stderr)
    }

    /// The stream that carries the verdict: stdout on success, error text on failure.
    pub fn authoritative_text(&self) -> &str {
        if self.success {
            &self.stdout
        } else {
            self.error_text()
        }
    }
}

/// What cleanup does with a fixture's destination object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixtureLifecycle {
    /// Created by COPY: deleted on cleanup.
    Ephemeral,
    /// Created by MOVE: moved back to its original path on cleanup.
    Relocatable,
    /// Created by a verb that leaves no remote artifact.
    Untracked,
}

/// Intended lifecycle of one remote test object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureDescriptor {
    pub id: String,
    /// Local file uploaded to `source` when the remote object is missing before a run.
    pub local_source: Option<PathBuf>,
    /// Original path of the object the owning command reads from.
    pub source: Option<ObjectPath>,
    /// Where the owning command leaves its artifact.
    pub destination: ObjectPath,
    pub verb: CommandVerb,
    pub expect_success: bool,
}

impl FixtureDescriptor {
    pub fn lifecycle(&self) -> FixtureLifecycle {
        match self.verb {
            CommandVerb::Copy => FixtureLifecycle::Ephemeral,
            CommandVerb::Move => FixtureLifecycle::Relocatable,
            _ => FixtureLifecycle::Untracked,
        }
    }

    /// Whether cleanup has anything to consider for this fixture.
    ///
    /// Fixtures whose owning command is expected to fail never produce a remote artifact.
    pub fn is_reconcilable(&self) -> bool {
        self.expect_success
            && self.destination.is_remote()
            && self.lifecycle() != FixtureLifecycle::Untracked
    }
}

/// Verdict of the URL safety check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SafetyResult {
    pub is_safe: bool,
    pub reason: Option<String>,
}

pub const SAFETY_SKIPPED_REASON: &str = "skipped";

impl SafetyResult {
    pub fn safe() -> Self {
        Self {
            is_safe: true,
            reason: None,
        }
    }

    pub fn skipped() -> Self {
        Self {
            is_safe: true,
            reason: Some(SAFETY_SKIPPED_REASON.to_string()),
        }
    }

    pub fn degraded(detail: &str) -> Self {
        Self {
            is_safe: true,
            reason: Some(format!("{SAFETY_SKIPPED_REASON}: {detail}")),
        }
    }

    pub fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            is_safe: false,
            reason: Some(reason.into()),
        }
    }

    /// True when no real check ran. Callers must report this apart from a genuine pass.
    pub fn is_skipped(&self) -> bool {
        self.is_safe
            && self
                .reason
                .as_deref()
                .is_some_and(|r| r.starts_with(SAFETY_SKIPPED_REASON))
    }
}

/// Result of one HTTP probe against a signed URL.
///
/// `status_code` may be set even when `succeeded` is false; it is the authoritative signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResult {
    pub succeeded: bool,
    pub status_code: Option<u16>,
    pub error: Option<String>,
}

/// Whether a signed URL is past its expiration instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    Expired,
    NotExpired,
    /// No recognised expiration encoding. Never to be read as "not expired".
    Unknown,
}

/// Per-fixture result of the setup pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupOutcome {
    AlreadyPresent,
    Uploaded,
    /// Nothing to upload: no local source or no remote source path.
    NotApplicable,
    Failed {
        kind: StorageErrorKind,
        message: String,
    },
}

/// Corrective action applied during cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Deleted,
    MovedBack,
}

/// Per-fixture result of a reconcile pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Cleaned(CleanupAction),
    /// Destination absent at check time: already clean or never created.
    SkippedAbsent,
    /// Object vanished between the check and the action.
    SkippedRaceLost,
    SkippedPermission {
        message: String,
    },
    SkippedOther {
        message: String,
    },
    /// Expected-failure fixture, local destination, or no corrective action defined.
    NotApplicable,
}

impl ReconcileOutcome {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::SkippedPermission { .. } | Self::SkippedOther { .. }
        )
    }
}

/// Outcome of one fixture, tagged with its id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixtureReport<T> {
    pub fixture_id: String,
    pub outcome: T,
}
