pub mod args;
pub mod dotenv;

use std::collections::HashMap;
use std::fmt;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::debug;
use zeroize_derive::{Zeroize, ZeroizeOnDrop};

use crate::types::error::HarnessError;

pub const DEFAULT_CLI_PREFIX: &str = "gcloud storage";
pub const DEFAULT_DURATION_TOLERANCE_SECONDS: i64 = 60;
pub const DEFAULT_HTTP_TIMEOUT_MILLISECONDS: u64 = 10_000;
pub const DEFAULT_EXPIRY_WAIT_MILLISECONDS: u64 = 3_000;
pub const DEFAULT_SAFE_BROWSING_ENDPOINT: &str =
    "https://safebrowsing.googleapis.com/v4/threatMatches:find";
pub const DEFAULT_SAFE_BROWSING_CLIENT_ID: &str = "gsverify-rs";
pub const DEFAULT_SIGNED_URL_HOST: &str = "https://storage.googleapis.com";
pub const DEFAULT_RECONCILE_WORKER_SIZE: u16 = 4;
pub const DEFAULT_DOWNLOAD_DIR: &str = "./test-data/local-files/downloaded-files/";

const CI_ENV_VAR: &str = "CI";
const DOCKER_ENV_VAR: &str = "DOCKER";
const REGION_ENV_VAR: &str = "GCLOUD_BUCKET_REGION";

/// Main configuration for the harness.
///
/// Policy parameters (tolerance, timeouts, endpoints) plus the execution context the
/// command builder adapts flags to. Constructed once at process start and passed by
/// reference into every component.
///
/// ```
/// use gsverify_rs::Config;
///
/// let mut config = Config::default();
/// assert_eq!(config.duration_tolerance_seconds, 60);
/// assert_eq!(config.http_timeout_milliseconds, 10_000);
/// config.duration_tolerance_seconds = 120;
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub cli_prefix: String,
    pub execution_context: ExecutionContext,
    pub duration_tolerance_seconds: i64,
    pub http_timeout_milliseconds: u64,
    pub expiry_wait_milliseconds: u64,
    pub safe_browsing_endpoint: String,
    pub safe_browsing_client_id: String,
    pub safe_browsing_client_version: String,
    pub signed_url_host: String,
    pub reconcile_worker_size: u16,
    pub download_dir: PathBuf,
    pub tracing_config: Option<TracingConfig>,
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cli_prefix: DEFAULT_CLI_PREFIX.to_string(),
            execution_context: ExecutionContext::default(),
            duration_tolerance_seconds: DEFAULT_DURATION_TOLERANCE_SECONDS,
            http_timeout_milliseconds: DEFAULT_HTTP_TIMEOUT_MILLISECONDS,
            expiry_wait_milliseconds: DEFAULT_EXPIRY_WAIT_MILLISECONDS,
            safe_browsing_endpoint: DEFAULT_SAFE_BROWSING_ENDPOINT.to_string(),
            safe_browsing_client_id: DEFAULT_SAFE_BROWSING_CLIENT_ID.to_string(),
            safe_browsing_client_version: env!("CARGO_PKG_VERSION").to_string(),
            signed_url_host: DEFAULT_SIGNED_URL_HOST.to_string(),
            reconcile_worker_size: DEFAULT_RECONCILE_WORKER_SIZE,
            download_dir: PathBuf::from(DEFAULT_DOWNLOAD_DIR),
            tracing_config: None,
            auto_complete_shell: None,
        }
    }
}

/// Environment the storage CLI runs in.
///
/// `ambient_auth` is set in CI and container runs, where the CLI is already authenticated
/// as the service account and impersonation flags must be dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub ambient_auth: bool,
    pub region_override: Option<String>,
}

impl ExecutionContext {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let is_set = |name: &str| lookup(name).is_some_and(|v| !v.is_empty());
        ExecutionContext {
            ambient_auth: is_set(CI_ENV_VAR) || is_set(DOCKER_ENV_VAR),
            region_override: lookup(REGION_ENV_VAR).filter(|v| !v.is_empty()),
        }
    }
}

/// Tracing (logging) configuration.
#[derive(Debug, Clone, Copy)]
pub struct TracingConfig {
    pub tracing_level: log::Level,
    pub json_tracing: bool,
    pub span_events_tracing: bool,
    pub disable_color_tracing: bool,
}

/// Buckets the scenarios address by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketRole {
    Main,
    Empty,
    MoveDest,
}

impl BucketRole {
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Main => "GCLOUD_BUCKET_MAIN",
            Self::Empty => "GCLOUD_BUCKET_EMPTY",
            Self::MoveDest => "GCLOUD_BUCKET_MOVE_DEST",
        }
    }
}

pub const SERVICE_ACCOUNT_ENV_VAR: &str = "SERVICE_ACCOUNT";
pub const PROJECT_ID_ENV_VAR: &str = "PROJECT_ID";
pub const SAFE_BROWSING_KEY_ENV_VAR: &str = "GOOGLE_SAFE_BROWSING_API_KEY";

const CREDENTIAL_ENV_VARS: &[&str] = &[
    "GCLOUD_BUCKET_MAIN",
    "GCLOUD_BUCKET_EMPTY",
    "GCLOUD_BUCKET_MOVE_DEST",
    SERVICE_ACCOUNT_ENV_VAR,
    PROJECT_ID_ENV_VAR,
    REGION_ENV_VAR,
    SAFE_BROWSING_KEY_ENV_VAR,
];

/// API key with secure zeroization; redacted in `Debug`.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        ApiKey(key.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl Debug for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(** redacted **)")
    }
}

/// Explicit credential provider.
///
/// Snapshot of the credential-bearing variables, taken once. Required values fail fast
/// with the name of the missing variable; the Safe Browsing key is optional.
#[derive(Clone, Default)]
pub struct Credentials {
    values: HashMap<String, String>,
    safe_browsing_key: Option<ApiKey>,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("values", &self.values)
            .field("safe_browsing_key", &self.safe_browsing_key)
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`Credentials::from_env`], but outside CI/Docker also reads `.env` files in
    /// `dir`. Process environment wins over file values.
    pub fn load(dir: &Path, context: &ExecutionContext) -> Result<Self> {
        if context.ambient_auth {
            return Ok(Self::from_env());
        }

        let from_file: HashMap<String, String> = dotenv::load_dotenv(dir, CREDENTIAL_ENV_VARS)?
            .into_iter()
            .collect();
        debug!(count = from_file.len(), "credential values loaded from .env.");

        Ok(Self::from_lookup(|name| {
            std::env::var(name)
                .ok()
                .or_else(|| from_file.get(name).cloned())
        }))
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = CREDENTIAL_ENV_VARS
            .iter()
            .filter(|name| **name != SAFE_BROWSING_KEY_ENV_VAR)
            .filter_map(|name| {
                lookup(name)
                    .filter(|v| !v.is_empty())
                    .map(|v| (name.to_string(), v))
            })
            .collect();
        let safe_browsing_key = lookup(SAFE_BROWSING_KEY_ENV_VAR)
            .filter(|v| !v.is_empty())
            .map(ApiKey::new);

        Credentials {
            values,
            safe_browsing_key,
        }
    }

    fn required(&self, name: &str) -> Result<String, HarnessError> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| HarnessError::MissingVariable(name.to_string()))
    }

    pub fn bucket(&self, role: BucketRole) -> Result<String, HarnessError> {
        self.required(role.env_var())
    }

    pub fn service_account(&self) -> Result<String, HarnessError> {
        self.required(SERVICE_ACCOUNT_ENV_VAR)
    }

    pub fn project_id(&self) -> Result<String, HarnessError> {
        self.required(PROJECT_ID_ENV_VAR)
    }

    pub fn region(&self) -> Result<String, HarnessError> {
        self.required(REGION_ENV_VAR)
    }

    pub fn safe_browsing_key(&self) -> Option<&ApiKey> {
        self.safe_browsing_key.as_ref()
    }
}
