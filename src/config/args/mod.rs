use crate::config::{
    Config, DEFAULT_CLI_PREFIX, DEFAULT_DOWNLOAD_DIR, DEFAULT_DURATION_TOLERANCE_SECONDS,
    DEFAULT_EXPIRY_WAIT_MILLISECONDS, DEFAULT_HTTP_TIMEOUT_MILLISECONDS,
    DEFAULT_RECONCILE_WORKER_SIZE, DEFAULT_SAFE_BROWSING_ENDPOINT, DEFAULT_SIGNED_URL_HOST,
    ExecutionContext, TracingConfig,
};
use clap::builder::NonEmptyStringValueParser;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use std::ffi::OsString;
use std::path::PathBuf;

pub mod value_parser;

use value_parser::file_exist::is_file_exist;
use value_parser::url::check_scheme;


// ---------------------------------------------------------------------------
// Default constants
// ---------------------------------------------------------------------------

const DEFAULT_SCENARIO_PARALLELISM: u16 = 4;
const DEFAULT_ENV_DIR: &str = ".";
const DEFAULT_JSON_TRACING: bool = false;
const DEFAULT_SPAN_EVENTS_TRACING: bool = false;
const DEFAULT_DISABLE_COLOR_TRACING: bool = false;
const DEFAULT_AMBIENT_AUTH: bool = false;

// ---------------------------------------------------------------------------
// Error messages
// ---------------------------------------------------------------------------

const ERROR_MESSAGE_COMMAND_REQUIRED: &str =
    "A command is required (setup, teardown, run or check-url).";
const ERROR_MESSAGE_WORKER_SIZE_ZERO: &str = "Reconcile worker size must be at least 1.";
const ERROR_MESSAGE_PARALLELISM_ZERO: &str = "Scenario parallelism must be at least 1.";
const ERROR_MESSAGE_NEGATIVE_TOLERANCE: &str = "Duration tolerance must not be negative.";
const ERROR_MESSAGE_HTTP_TIMEOUT_ZERO: &str = "HTTP timeout must be at least 1 millisecond.";

// ---------------------------------------------------------------------------
// CLIArgs (clap-derived argument struct)
// ---------------------------------------------------------------------------

/// gsverify - verification harness for the gcloud storage CLI.
///
/// Runs declared scenarios against live buckets, validates signed URLs,
/// and keeps bucket fixtures idempotent across runs.
///
/// Example:
///   gsverify setup ./manifest.json
///   gsverify run ./manifest.json --with-fixtures -v
///   gsverify check-url 'https://storage.googleapis.com/b/k?Expires=...' --expected-duration-seconds 300 --get
#[derive(Parser, Clone, Debug)]
#[command(name = "gsverify", version, about, long_about = None)]
pub struct CLIArgs {
    #[command(subcommand)]
    pub command: Option<HarnessCommand>,

    // -----------------------------------------------------------------------
    // General options
    // -----------------------------------------------------------------------
    /// Command prefix placed before every storage verb.
    #[arg(long, env, global = true, default_value = DEFAULT_CLI_PREFIX, value_parser = NonEmptyStringValueParser::new(), help_heading = "General")]
    pub cli_prefix: String,

    /// Directory searched for a .env file with bucket and credential variables.
    #[arg(long, env, global = true, default_value = DEFAULT_ENV_DIR, help_heading = "General")]
    pub env_dir: PathBuf,

    /// Treat the process as already authenticated (as under CI or Docker).
    #[arg(long, env, global = true, default_value_t = DEFAULT_AMBIENT_AUTH, help_heading = "General")]
    pub ambient_auth: bool,

    /// Local directory downloads land in; cleaned on teardown.
    #[arg(long, env, global = true, default_value = DEFAULT_DOWNLOAD_DIR, help_heading = "General")]
    pub download_dir: PathBuf,

    // -----------------------------------------------------------------------
    // Signed URL options
    // -----------------------------------------------------------------------
    /// Allowed difference between requested and actual URL lifetime, in seconds.
    #[arg(long, env, global = true, default_value_t = DEFAULT_DURATION_TOLERANCE_SECONDS, allow_negative_numbers = true, help_heading = "Signed URL")]
    pub duration_tolerance_seconds: i64,

    /// Timeout for each HTTP probe, in milliseconds.
    #[arg(long, env, global = true, default_value_t = DEFAULT_HTTP_TIMEOUT_MILLISECONDS, help_heading = "Signed URL")]
    pub http_timeout_milliseconds: u64,

    /// Wait before probing a URL that is expected to have expired, in milliseconds.
    #[arg(long, env, global = true, default_value_t = DEFAULT_EXPIRY_WAIT_MILLISECONDS, help_heading = "Signed URL")]
    pub expiry_wait_milliseconds: u64,

    /// Host signed URLs are issued for.
    #[arg(long, env, global = true, default_value = DEFAULT_SIGNED_URL_HOST, value_parser = check_scheme, help_heading = "Signed URL")]
    pub signed_url_host: String,

    /// Safe Browsing threatMatches:find endpoint.
    #[arg(long, env, global = true, default_value = DEFAULT_SAFE_BROWSING_ENDPOINT, value_parser = check_scheme, help_heading = "Signed URL")]
    pub safe_browsing_endpoint: String,

    // -----------------------------------------------------------------------
    // Fixture options
    // -----------------------------------------------------------------------
    /// Number of fixtures checked and reconciled concurrently.
    #[arg(long, env, global = true, default_value_t = DEFAULT_RECONCILE_WORKER_SIZE, help_heading = "Fixtures")]
    pub reconcile_worker_size: u16,

    // -----------------------------------------------------------------------
    // Logging options
    // -----------------------------------------------------------------------
    /// Verbosity level. -q (quiet), default (normal), -v, -vv, -vvv.
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Output logs in JSON format.
    #[arg(long, env, global = true, default_value_t = DEFAULT_JSON_TRACING, help_heading = "Logging")]
    pub json_tracing: bool,

    /// Enable tracing span events.
    #[arg(long, env, global = true, default_value_t = DEFAULT_SPAN_EVENTS_TRACING, help_heading = "Logging")]
    pub span_events_tracing: bool,

    /// Disable colored output in logs.
    #[arg(long, env, global = true, default_value_t = DEFAULT_DISABLE_COLOR_TRACING, help_heading = "Logging")]
    pub disable_color_tracing: bool,

    /// Generate shell completions.
    #[arg(long, env, help_heading = "Advanced")]
    pub auto_complete_shell: Option<clap_complete::shells::Shell>,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum HarnessCommand {
    /// Create the download directory and upload missing fixtures.
    Setup {
        /// Scenario/fixture manifest (JSON).
        #[arg(value_parser = is_file_exist)]
        manifest: String,
    },

    /// Restore moved fixtures, delete copied ones, and clean the download directory.
    Teardown {
        /// Scenario/fixture manifest (JSON).
        #[arg(value_parser = is_file_exist)]
        manifest: String,

        /// Leave the download directory as it is.
        #[arg(long)]
        keep_download_dir: bool,
    },

    /// Run manifest scenarios and report every expectation mismatch.
    Run {
        /// Scenario/fixture manifest (JSON).
        #[arg(value_parser = is_file_exist)]
        manifest: String,

        /// Number of scenarios run concurrently.
        #[arg(long, env = "SCENARIO_PARALLELISM", default_value_t = DEFAULT_SCENARIO_PARALLELISM)]
        parallelism: u16,

        /// Run only the scenario with this id. Repeatable.
        #[arg(long = "scenario", value_name = "ID")]
        scenarios: Vec<String>,

        /// Run setup before the scenarios and teardown after them.
        #[arg(long)]
        with_fixtures: bool,
    },

    /// Inspect one signed URL: expiration, lifetime, safety and optional probes.
    CheckUrl {
        #[arg(value_parser = check_scheme)]
        url: String,

        /// Expected lifetime; checked against the configured tolerance.
        #[arg(long)]
        expected_duration_seconds: Option<i64>,

        /// Probe the URL with GET and expect 200.
        #[arg(long)]
        get: bool,

        /// Probe the URL with POST and expect 403.
        #[arg(long)]
        post: bool,
    },
}

// ---------------------------------------------------------------------------
// parse_from_args (public API)
// ---------------------------------------------------------------------------

/// Parse command-line arguments into a `CLIArgs` struct.
///
/// # Example
///
/// ```
/// use gsverify_rs::config::args::{HarnessCommand, parse_from_args};
///
/// let args = vec!["gsverify", "check-url", "https://storage.googleapis.com/b/k", "--get"];
/// let cli_args = parse_from_args(args).unwrap();
/// assert!(matches!(cli_args.command, Some(HarnessCommand::CheckUrl { get: true, .. })));
/// ```
pub fn parse_from_args<I, T>(args: I) -> Result<CLIArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    CLIArgs::try_parse_from(args)
}

/// Parse arguments and build a Config in one step.
pub fn build_config_from_args<I, T>(args: I) -> Result<Config, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli_args = CLIArgs::try_parse_from(args).map_err(|e| e.to_string())?;
    Config::try_from(cli_args)
}

impl CLIArgs {
    fn validate(&self) -> Result<(), String> {
        if self.command.is_none() && self.auto_complete_shell.is_none() {
            return Err(ERROR_MESSAGE_COMMAND_REQUIRED.to_string());
        }
        if self.reconcile_worker_size == 0 {
            return Err(ERROR_MESSAGE_WORKER_SIZE_ZERO.to_string());
        }
        if let Some(HarnessCommand::Run { parallelism: 0, .. }) = self.command {
            return Err(ERROR_MESSAGE_PARALLELISM_ZERO.to_string());
        }
        if self.duration_tolerance_seconds < 0 {
            return Err(ERROR_MESSAGE_NEGATIVE_TOLERANCE.to_string());
        }
        if self.http_timeout_milliseconds == 0 {
            return Err(ERROR_MESSAGE_HTTP_TIMEOUT_ZERO.to_string());
        }
        Ok(())
    }

    fn build_tracing_config(&self) -> Option<TracingConfig> {
        let log_level = self.verbosity.log_level()?;

        Some(TracingConfig {
            tracing_level: log_level,
            json_tracing: self.json_tracing,
            span_events_tracing: self.span_events_tracing,
            disable_color_tracing: self.disable_color_tracing,
        })
    }

    fn build_execution_context(&self) -> ExecutionContext {
        let mut context = ExecutionContext::from_env();
        context.ambient_auth |= self.ambient_auth;
        context
    }
}

impl TryFrom<CLIArgs> for Config {
    type Error = String;

    fn try_from(args: CLIArgs) -> Result<Self, Self::Error> {
        args.validate()?;

        Ok(Config {
            cli_prefix: args.cli_prefix.clone(),
            execution_context: args.build_execution_context(),
            duration_tolerance_seconds: args.duration_tolerance_seconds,
            http_timeout_milliseconds: args.http_timeout_milliseconds,
            expiry_wait_milliseconds: args.expiry_wait_milliseconds,
            safe_browsing_endpoint: args.safe_browsing_endpoint.clone(),
            signed_url_host: args.signed_url_host.clone(),
            reconcile_worker_size: args.reconcile_worker_size,
            download_dir: args.download_dir.clone(),
            tracing_config: args.build_tracing_config(),
            auto_complete_shell: args.auto_complete_shell,
            ..Config::default()
        })
    }
}
