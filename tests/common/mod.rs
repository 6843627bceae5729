//! Shared E2E test infrastructure for gsverify-rs.
//!
//! Provides `TestHelper` for object management and harness execution against live
//! buckets through the real `gcloud storage` CLI. Bucket names and the service account
//! come from the same environment variables the harness itself reads.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use gsverify_rs::config::args::build_config_from_args;
use gsverify_rs::config::{BucketRole, Credentials};
use gsverify_rs::types::ObjectPath;
use gsverify_rs::{
    CommandExecutor, Config, Executor, RemoteStoreTrait, ShellCommandExecutor, Store,
    create_store,
};
use tempfile::TempDir;
use uuid::Uuid;

/// RAII guard that deletes the tracked objects when dropped.
///
/// This ensures cleanup ALWAYS runs, even if the test panics.
pub struct ObjectGuard {
    helper: Arc<TestHelper>,
    paths: Vec<ObjectPath>,
}

impl Drop for ObjectGuard {
    fn drop(&mut self) {
        let helper = self.helper.clone();
        let paths = std::mem::take(&mut self.paths);
        // Catch panics from block_on() to avoid double-panic abort when the
        // runtime is shutting down (e.g., if the test already panicked).
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            tokio::task::block_in_place(|| {
                tokio::runtime::Handle::current().block_on(async move {
                    for path in paths {
                        let _ = helper.store.delete(&path).await;
                    }
                });
            });
        }));
    }
}

/// Shared test helper for E2E tests.
pub struct TestHelper {
    pub config: Config,
    pub credentials: Credentials,
    pub store: Store,
    pub executor: Executor,
    local_dir: TempDir,
}

impl TestHelper {
    pub async fn new() -> Arc<Self> {
        let config = Self::build_config(vec!["setup", "Cargo.toml"]);
        let credentials = Credentials::from_env();
        let flags = credentials
            .service_account()
            .map(|sa| vec![format!("--impersonate-service-account={sa}")])
            .unwrap_or_default();
        let executor: Executor = Box::new(ShellCommandExecutor::new());
        let store = create_store(&config, executor.clone(), flags);

        Arc::new(Self {
            config,
            credentials,
            store,
            executor,
            local_dir: tempfile::tempdir().unwrap(),
        })
    }

    /// Build a Config from CLI-style arguments (the program name is prepended).
    pub fn build_config(args: Vec<&str>) -> Config {
        let mut full = vec!["gsverify", "-qq"];
        full.extend(args);
        build_config_from_args(full).unwrap()
    }

    pub fn bucket(&self, role: BucketRole) -> String {
        self.credentials.bucket(role).unwrap()
    }

    pub fn service_account(&self) -> String {
        self.credentials.service_account().unwrap()
    }

    /// A fresh object path under `role`'s bucket.
    pub fn generate_object_path(&self, role: BucketRole, stem: &str) -> ObjectPath {
        format!("gs://{}/gsverify-e2e/{stem}-{}.json", self.bucket(role), Uuid::new_v4())
            .parse()
            .unwrap()
    }

    /// Write a small JSON file into the helper's scratch directory.
    pub fn local_file(&self, name: &str) -> PathBuf {
        let path = self.local_dir.path().join(name);
        std::fs::write(&path, format!("{{\"name\":\"{name}\"}}")).unwrap();
        path
    }

    pub async fn upload(&self, remote: &ObjectPath) {
        let local = self.local_file(&format!("{}.json", Uuid::new_v4()));
        self.store.upload(&local, remote).await.unwrap();
    }

    pub async fn exists(&self, path: &ObjectPath) -> bool {
        self.store.exists(path).await.unwrap()
    }

    pub async fn sign_url(&self, path: &ObjectPath, flags: &[&str]) -> String {
        let command_line = format!(
            "{} sign-url {path} --impersonate-service-account={} {}",
            self.config.cli_prefix,
            self.service_account(),
            flags.join(" ")
        );
        let result = self.executor.execute(&command_line).await;
        assert!(result.success, "sign-url failed: {}", result.error_text());
        result.stdout
    }

    pub fn guard(self: &Arc<Self>, paths: Vec<ObjectPath>) -> ObjectGuard {
        ObjectGuard {
            helper: self.clone(),
            paths,
        }
    }
}

/// Default timeout for E2E tests (5 minutes).
///
/// Signed URL expiry tests wait out the URL lifetime, so this is generous.
pub const E2E_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);

/// Wraps an async E2E test body with a timeout.
///
/// Usage:
/// ```ignore
/// #[tokio::test(flavor = "multi_thread")]
/// async fn e2e_my_test() {
///     e2e_timeout!(async {
///         // test body here
///     });
/// }
/// ```
#[macro_export]
macro_rules! e2e_timeout {
    ($body:expr) => {
        tokio::time::timeout(common::E2E_TIMEOUT, $body)
            .await
            .expect("E2E test timed out")
    };
}
