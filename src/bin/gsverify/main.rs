use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use tracing::{debug, error, trace, warn};

use gsverify_rs::config::Config;
use gsverify_rs::config::args::HarnessCommand;
use gsverify_rs::fixtures::local::{cleanup_download_dir, ensure_download_dir};
use gsverify_rs::manifest::Manifest;
use gsverify_rs::scenario::summarize;
use gsverify_rs::signed_url::duration::is_within_tolerance;
use gsverify_rs::types::error::{HarnessError, is_missing_variable_error};
use gsverify_rs::types::{ExpiryStatus, FixtureDescriptor, SetupOutcome};
use gsverify_rs::{
    CLIArgs, Credentials, FixtureReconciler, HttpProbe, ScenarioReport, ScenarioRunner,
    ShellCommandExecutor,
    SignedUrl, Store, UrlSafetyValidator, create_store, exit_code_from_error,
};

mod report;
mod tracing_init;

const IMPERSONATION_FLAG: &str = "--impersonate-service-account";
const EXPECTED_GET_STATUS: u16 = 200;
const EXPECTED_POST_STATUS: u16 = 403;

/// gsverify - verification harness for the gcloud storage CLI.
///
/// This binary is a thin wrapper over the gsverify-rs library.
/// All core functionality is implemented in the library crate.
#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    let (command, env_dir, config) = load_config_exit_if_err();

    if let Some(shell) = config.auto_complete_shell {
        generate(
            shell,
            &mut CLIArgs::command(),
            "gsverify",
            &mut std::io::stdout(),
        );
        return;
    }

    start_tracing_if_necessary(&config);

    trace!("config = {:?}", config);

    let Some(command) = command else {
        return;
    };
    if let Err(e) = run(command, &env_dir, config).await {
        error!("{e:#}");
        eprintln!("gsverify: {e:#}");
        if is_missing_variable_error(&e) {
            eprintln!("hint: export the variable or add it to a .env file in --env-dir.");
        }
        std::process::exit(exit_code_from_error(&e));
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
fn load_config_exit_if_err() -> (Option<HarnessCommand>, PathBuf, Config) {
    let args = CLIArgs::parse();
    let command = args.command.clone();
    let env_dir = args.env_dir.clone();
    match Config::try_from(args) {
        Ok(config) => (command, env_dir, config),
        Err(error_message) => {
            clap::Error::raw(clap::error::ErrorKind::ValueValidation, error_message).exit()
        }
    }
}

fn start_tracing_if_necessary(config: &Config) -> bool {
    let Some(tracing_config) = &config.tracing_config else {
        return false;
    };

    tracing_init::init_tracing(tracing_config);
    true
}

/// Everything the fixture and scenario flows share, built once per process.
struct Harness {
    config: Config,
    credentials: Credentials,
    store: Store,
    show_result: bool,
}

impl Harness {
    fn new(config: Config, env_dir: &Path) -> Result<Self> {
        let credentials = Credentials::load(env_dir, &config.execution_context)?;
        let store = create_store(
            &config,
            Box::new(ShellCommandExecutor::new()),
            store_flags(&credentials),
        );
        let show_result = report::is_show_result_needed(&config);
        Ok(Self {
            config,
            credentials,
            store,
            show_result,
        })
    }

    fn load_manifest(&self, path: &str) -> Result<Manifest> {
        Manifest::load(Path::new(path), &self.config.cli_prefix, &self.credentials)
    }

    fn print(&self, line: &str) {
        if self.show_result {
            println!("{line}");
        }
    }

    async fn setup(&self, fixtures: &[FixtureDescriptor]) -> Result<()> {
        ensure_download_dir(&self.config.download_dir)?;

        let reconciler = FixtureReconciler::from_config(&self.config, self.store.clone());
        for outcome in reconciler.ensure_present(fixtures).await {
            if let SetupOutcome::Failed { message, .. } = &outcome.outcome {
                warn!(fixture = %outcome.fixture_id, error = %message.trim(), "fixture setup failed.");
            }
            self.print(&report::setup_line(&outcome));
        }
        Ok(())
    }

    async fn teardown(&self, fixtures: &[FixtureDescriptor], keep_download_dir: bool) -> Result<()> {
        let reconciler = FixtureReconciler::from_config(&self.config, self.store.clone());
        for outcome in reconciler.reconcile(fixtures).await {
            if outcome.outcome.is_warning() {
                warn!(fixture = %outcome.fixture_id, outcome = ?outcome.outcome, "fixture cleanup skipped.");
            }
            self.print(&report::reconcile_line(&outcome));
        }

        if !keep_download_dir {
            let removed = cleanup_download_dir(&self.config.download_dir)?;
            debug!(removed = removed, "download directory cleaned.");
        }
        Ok(())
    }

    async fn run_scenarios(
        &self,
        manifest: &Manifest,
        parallelism: u16,
        only: &[String],
        with_fixtures: bool,
    ) -> Result<()> {
        let scenarios: Vec<_> = manifest
            .scenarios
            .iter()
            .filter(|s| only.is_empty() || only.contains(&s.id))
            .cloned()
            .collect();
        if let Some(missing) = only.iter().find(|id| !scenarios.iter().any(|s| &s.id == *id)) {
            return Err(HarnessError::InvalidConfig(format!("unknown scenario id {missing}")).into());
        }

        let fixtures = manifest.all_fixtures();
        if with_fixtures {
            self.setup(&fixtures).await?;
        }

        let runner = ScenarioRunner::new(
            &self.config,
            Box::new(ShellCommandExecutor::new()),
            self.store.clone(),
            self.credentials.safe_browsing_key().cloned(),
        )?;

        let start_time = tokio::time::Instant::now();
        let reports = runner.run_all(&scenarios, parallelism).await;
        for report in &reports {
            for line in report::scenario_lines(report) {
                self.print(&line);
            }
        }
        self.print(&report::summary_line(&reports));
        debug!(
            duration_sec = %format!("{:.3}", start_time.elapsed().as_secs_f32()),
            "scenarios completed."
        );

        let teardown = if with_fixtures {
            self.teardown(&fixtures, false).await
        } else {
            Ok(())
        };
        run_verdict(&reports, teardown)
    }

    async fn check_url(
        &self,
        url: &str,
        expected_duration_seconds: Option<i64>,
        get: bool,
        post: bool,
    ) -> Result<()> {
        let signed_url = SignedUrl::new(url);
        let mut failures = Vec::new();

        match signed_url.expiration() {
            Some(expiration) => self.print(&format!("expiration: {}", expiration.to_rfc3339())),
            None => self.print("expiration: unknown"),
        }
        let status = signed_url.expiry_status(chrono::Utc::now());
        self.print(&format!("status: {status:?}"));
        if status == ExpiryStatus::Expired {
            failures.push("URL has expired".to_string());
        }

        if let Some(expected) = expected_duration_seconds {
            let tolerance = self.config.duration_tolerance_seconds;
            if !is_within_tolerance(url, expected, tolerance) {
                failures.push(format!(
                    "lifetime is not within {tolerance}s of the expected {expected}s"
                ));
            }
        }

        let safety = UrlSafetyValidator::from_config(&self.config)?
            .check(url, self.credentials.safe_browsing_key())
            .await;
        if safety.is_skipped() {
            self.print(&format!(
                "safety: {}",
                safety.reason.as_deref().unwrap_or("skipped")
            ));
        } else if safety.is_safe {
            self.print("safety: safe");
        } else {
            failures.push(format!(
                "URL flagged as unsafe: {}",
                safety.reason.as_deref().unwrap_or("no reason given")
            ));
        }

        let probe = HttpProbe::from_config(&self.config)?;
        if get {
            let result = probe.get(url).await;
            self.print(&format!("GET: {:?}", result.status_code));
            if result.status_code != Some(EXPECTED_GET_STATUS) {
                failures.push(format!("GET returned {:?}, expected {EXPECTED_GET_STATUS}", result.status_code));
            }
        }
        if post {
            let result = probe.post(url).await;
            self.print(&format!("POST: {:?}", result.status_code));
            if result.status_code != Some(EXPECTED_POST_STATUS) {
                failures.push(format!("POST returned {:?}, expected {EXPECTED_POST_STATUS}", result.status_code));
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::ExpectationMismatch(failures.join("; ")).into())
        }
    }
}

/// Verdict of a scenario run. Cleanup always runs; a teardown error is logged and never
/// replaces the scenario result.
fn run_verdict(reports: &[ScenarioReport], teardown: Result<()>) -> Result<()> {
    if let Err(e) = teardown {
        warn!(error = %format!("{e:#}"), "fixture teardown failed.");
    }
    summarize(reports)?;
    Ok(())
}

/// Impersonation flag for the store's own commands, when a service account is configured.
fn store_flags(credentials: &Credentials) -> Vec<String> {
    credentials
        .service_account()
        .map(|account| vec![format!("{IMPERSONATION_FLAG}={account}")])
        .unwrap_or_default()
}

async fn run(command: HarnessCommand, env_dir: &Path, config: Config) -> Result<()> {
    let harness = Harness::new(config, env_dir)?;

    match command {
        HarnessCommand::Setup { manifest } => {
            let manifest = harness.load_manifest(&manifest)?;
            harness.setup(&manifest.all_fixtures()).await
        }
        HarnessCommand::Teardown {
            manifest,
            keep_download_dir,
        } => {
            let manifest = harness.load_manifest(&manifest)?;
            harness
                .teardown(&manifest.all_fixtures(), keep_download_dir)
                .await
        }
        HarnessCommand::Run {
            manifest,
            parallelism,
            scenarios,
            with_fixtures,
        } => {
            let manifest = harness.load_manifest(&manifest)?;
            harness
                .run_scenarios(&manifest, parallelism, &scenarios, with_fixtures)
                .await
        }
        HarnessCommand::CheckUrl {
            url,
            expected_duration_seconds,
            get,
            post,
        } => {
            harness
                .check_url(&url, expected_duration_seconds, get, post)
                .await
        }
    }
}
