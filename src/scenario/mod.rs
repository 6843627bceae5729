//! Scenario execution and expectation checks.
//!
//! A [`Scenario`] is one CLI invocation plus the behaviour it is expected to show.
//! [`ScenarioRunner::run`] executes it and collects every mismatch into a
//! [`ScenarioReport`] instead of stopping at the first one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use fancy_regex::Regex;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::command::{Executor, execute_descriptor};
use crate::config::{ApiKey, Config, ExecutionContext};
use crate::signed_url::SignedUrl;
use crate::signed_url::duration::is_within_tolerance;
use crate::storage::Store;
use crate::types::error::HarnessError;
use crate::types::{CommandDescriptor, CommandVerb, ExecutionResult};
use crate::validation::{HttpProbe, UrlSafetyValidator};

const DEFAULT_GET_STATUS: u16 = 200;
const DEFAULT_POST_STATUS: u16 = 403;
const EXPIRED_STATUS_FLOOR: u16 = 400;

/// Checks applied to the URL printed by a successful SIGN_URL command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignedUrlChecks {
    pub expected_duration_seconds: Option<i64>,
    /// Overrides the configured tolerance for this scenario.
    pub duration_tolerance_seconds: Option<i64>,
    pub http_get: bool,
    pub http_post: bool,
    /// Expected probe status; GET defaults to 200 and POST to 403.
    pub expected_http_status: Option<u16>,
    /// Wait out the URL's lifetime, then expect GET to be rejected.
    pub expect_expired: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expectation {
    pub success: bool,
    /// Substring of stdout on success; case-insensitive regex over the error on failure.
    pub output: Option<String>,
    pub signed_url: SignedUrlChecks,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scenario {
    pub id: String,
    pub description: String,
    pub descriptor: CommandDescriptor,
    pub expectation: Expectation,
    /// Local file that backs the scenario's remote source object.
    pub local_source: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScenarioReport {
    pub scenario_id: String,
    pub passed: bool,
    pub failures: Vec<String>,
    pub notes: Vec<String>,
}

impl ScenarioReport {
    fn new(scenario_id: &str) -> Self {
        Self {
            scenario_id: scenario_id.to_string(),
            ..Self::default()
        }
    }

    fn fail(&mut self, message: impl Into<String>) {
        self.failures.push(message.into());
    }

    fn note(&mut self, message: impl Into<String>) {
        self.notes.push(message.into());
    }

    fn finish(mut self) -> Self {
        self.passed = self.failures.is_empty();
        self
    }
}

/// Runs scenarios against the live CLI and validates the results.
#[derive(Clone)]
pub struct ScenarioRunner {
    executor: Executor,
    store: Store,
    context: ExecutionContext,
    probe: HttpProbe,
    safety: UrlSafetyValidator,
    safe_browsing_key: Option<ApiKey>,
    duration_tolerance_seconds: i64,
    expiry_wait: Duration,
    signed_url_host: String,
}

impl ScenarioRunner {
    pub fn new(
        config: &Config,
        executor: Executor,
        store: Store,
        safe_browsing_key: Option<ApiKey>,
    ) -> Result<Self> {
        Ok(Self {
            executor,
            store,
            context: config.execution_context.clone(),
            probe: HttpProbe::from_config(config)?,
            safety: UrlSafetyValidator::from_config(config)?,
            safe_browsing_key,
            duration_tolerance_seconds: config.duration_tolerance_seconds,
            expiry_wait: Duration::from_millis(config.expiry_wait_milliseconds),
            signed_url_host: config.signed_url_host.clone(),
        })
    }

    pub async fn run(&self, scenario: &Scenario) -> ScenarioReport {
        let mut report = ScenarioReport::new(&scenario.id);
        debug!(scenario = %scenario.id, description = %scenario.description, "scenario start.");

        if let Err(e) = scenario.descriptor.validate() {
            report.fail(e.to_string());
            return report.finish();
        }

        let result = execute_descriptor(self.executor.as_ref(), &scenario.descriptor, &self.context).await;
        let expectation = &scenario.expectation;

        if result.success != expectation.success {
            report.fail(format!(
                "expected success={}, got success={}: {}",
                expectation.success,
                result.success,
                result.authoritative_text().trim()
            ));
        }

        if let Some(expected_output) = &expectation.output {
            check_output(&mut report, &result, expected_output);
        }

        if result.success {
            match scenario.descriptor.verb {
                CommandVerb::Copy | CommandVerb::Move => {
                    self.check_destination(&mut report, &scenario.descriptor).await;
                }
                CommandVerb::SignUrl => {
                    self.check_signed_url(&mut report, &result, &expectation.signed_url)
                        .await;
                }
                CommandVerb::List | CommandVerb::Remove => {}
            }
        }

        let report = report.finish();
        if report.passed {
            debug!(scenario = %scenario.id, "scenario passed.");
        } else {
            info!(scenario = %scenario.id, failures = report.failures.len(), "scenario failed.");
        }
        report
    }

    /// Run every scenario with at most `parallelism` in flight; reports keep input order.
    pub async fn run_all(&self, scenarios: &[Scenario], parallelism: u16) -> Vec<ScenarioReport> {
        let semaphore = Arc::new(Semaphore::new(parallelism.max(1) as usize));
        let mut join_set = JoinSet::new();

        for (index, scenario) in scenarios.iter().enumerate() {
            let runner = self.clone();
            let scenario = scenario.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, runner.run(&scenario).await)
            });
        }

        let mut reports: Vec<ScenarioReport> = scenarios
            .iter()
            .map(|scenario| {
                let mut report = ScenarioReport::new(&scenario.id);
                report.fail("scenario task did not complete");
                report
            })
            .collect();
        while let Some(join_result) = join_set.join_next().await {
            match join_result {
                Ok((index, report)) => reports[index] = report,
                Err(e) => warn!(error = %e, "scenario task did not complete."),
            }
        }
        reports
    }

    async fn check_destination(&self, report: &mut ScenarioReport, descriptor: &CommandDescriptor) {
        let Some(destination) = &descriptor.destination else {
            return;
        };
        match self.store.exists(destination).await {
            Ok(true) => {}
            Ok(false) => report.fail(format!("destination {destination} does not exist")),
            Err(e) => report.fail(format!("could not verify destination {destination}: {e:#}")),
        }
    }

    async fn check_signed_url(
        &self,
        report: &mut ScenarioReport,
        result: &ExecutionResult,
        checks: &SignedUrlChecks,
    ) {
        let Some(signed_url) = SignedUrl::from_output_for_host(&result.stdout, &self.signed_url_host)
        else {
            report.fail("no signed URL found in command output");
            return;
        };
        let url = signed_url.as_str();
        report.note(format!("signed URL: {url}"));

        let safety = self.safety.check(url, self.safe_browsing_key.as_ref()).await;
        if !safety.is_safe {
            report.fail(format!(
                "URL flagged as unsafe: {}",
                safety.reason.as_deref().unwrap_or("no reason given")
            ));
            return;
        }
        if safety.is_skipped() {
            report.note(format!(
                "URL safety check {}",
                safety.reason.as_deref().unwrap_or("skipped")
            ));
        }

        if let Some(expected) = checks.expected_duration_seconds {
            let tolerance = checks
                .duration_tolerance_seconds
                .unwrap_or(self.duration_tolerance_seconds);
            if !is_within_tolerance(url, expected, tolerance) {
                report.fail(format!(
                    "expiration is not within {tolerance}s of the expected {expected}s (expires at {})",
                    signed_url
                        .expiration()
                        .map(|e| e.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string())
                ));
            }
        }

        if checks.http_get {
            let expected = checks.expected_http_status.unwrap_or(DEFAULT_GET_STATUS);
            let probe = self.probe.get(url).await;
            if probe.status_code != Some(expected) {
                report.fail(format!(
                    "GET returned {}, expected {expected}",
                    describe_status(probe.status_code, probe.error.as_deref())
                ));
            }
        }

        if checks.http_post {
            let expected = checks.expected_http_status.unwrap_or(DEFAULT_POST_STATUS);
            let probe = self.probe.post(url).await;
            if probe.status_code != Some(expected) {
                report.fail(format!(
                    "POST returned {}, expected {expected}",
                    describe_status(probe.status_code, probe.error.as_deref())
                ));
            }
        }

        if checks.expect_expired {
            tokio::time::sleep(self.expiry_wait).await;
            let probe = self.probe.get(url).await;
            match probe.status_code {
                Some(status) if status >= EXPIRED_STATUS_FLOOR => {}
                other => report.fail(format!(
                    "expired URL was not rejected: GET returned {}",
                    describe_status(other, probe.error.as_deref())
                )),
            }
        }
    }
}

fn check_output(report: &mut ScenarioReport, result: &ExecutionResult, expected: &str) {
    if result.success {
        if !result.stdout.contains(expected) {
            report.fail(format!("stdout does not contain {expected:?}"));
        }
        return;
    }

    match Regex::new(&format!("(?i){expected}")) {
        Ok(regex) => match regex.is_match(result.error_text()) {
            Ok(true) => {}
            Ok(false) => report.fail(format!(
                "error output does not match /{expected}/i: {}",
                result.error_text().trim()
            )),
            Err(e) => report.fail(format!("could not match /{expected}/i: {e}")),
        },
        Err(e) => report.fail(format!("invalid expected output pattern {expected:?}: {e}")),
    }
}

fn describe_status(status: Option<u16>, error: Option<&str>) -> String {
    match (status, error) {
        (Some(status), _) => status.to_string(),
        (None, Some(error)) => format!("no status ({error})"),
        (None, None) => "no status".to_string(),
    }
}

/// Turn failed reports into [`HarnessError::ScenarioFailures`].
pub fn summarize(reports: &[ScenarioReport]) -> Result<(), HarnessError> {
    let failed = reports.iter().filter(|r| !r.passed).count();
    if failed == 0 {
        return Ok(());
    }
    Err(HarnessError::ScenarioFailures {
        failed,
        total: reports.len(),
    })
}
