/*!
# Overview
gsverify-rs is a verification harness for the `gcloud storage` CLI.
It drives the CLI against live buckets, checks every command against a declared
expectation, validates signed URLs, and keeps bucket fixtures in a known state.

## Features
- **Signed URL validation**: expiration parsing for both `Expires` and
  `X-Goog-Date` + `X-Goog-Expires` encodings, duration tolerance, expiry status
- **HTTP probing**: GET/POST against signed URLs to confirm method scoping and expiry
- **URL safety**: Safe Browsing lookup plus local heuristics, skipped without a key
- **Idempotent fixtures**: upload-if-absent setup and race-safe cleanup that
  never fails a run
- **Library-First**: the `gsverify` CLI is a thin wrapper over this library

## As a Library

```toml
[dependencies]
gsverify-rs = "0.1"
tokio = { version = "1", features = ["full"] }
```

```no_run
use gsverify_rs::config::args::parse_from_args;
use gsverify_rs::{
    Config, Credentials, FixtureReconciler, ShellCommandExecutor, create_store,
};

#[tokio::main]
async fn main() {
    let args = vec!["gsverify", "teardown", "./manifest.json"];
    let parsed_args = parse_from_args(args).unwrap();
    let config = Config::try_from(parsed_args).unwrap();

    let credentials = Credentials::from_env();
    let manifest = gsverify_rs::Manifest::load(
        std::path::Path::new("./manifest.json"),
        &config.cli_prefix,
        &credentials,
    )
    .unwrap();

    let store = create_store(&config, Box::new(ShellCommandExecutor), Vec::new());
    let reconciler = FixtureReconciler::from_config(&config, store);
    for report in reconciler.reconcile(&manifest.all_fixtures()).await {
        println!("{}: {:?}", report.fixture_id, report.outcome);
    }
}
```
*/

#![allow(clippy::collapsible_if)]

pub mod command;
pub mod config;
pub mod fixtures;
pub mod manifest;
pub mod scenario;
pub mod signed_url;
pub mod storage;
pub mod types;
pub mod validation;

pub use command::{CommandExecutor, Executor, ShellCommandExecutor, adapt_flags, build_command_line};
pub use config::args::CLIArgs;
pub use config::{Config, Credentials, ExecutionContext};
pub use fixtures::FixtureReconciler;
pub use manifest::Manifest;
pub use scenario::{Scenario, ScenarioReport, ScenarioRunner};
pub use signed_url::SignedUrl;
pub use signed_url::duration::is_within_tolerance;
pub use storage::{RemoteStoreTrait, Store, create_store};
pub use types::error::{HarnessError, exit_code_from_error};
pub use validation::{HttpProbe, UrlSafetyValidator};

#[cfg(test)]
mod test_utils;
