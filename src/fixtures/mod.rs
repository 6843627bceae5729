//! Remote fixture lifecycle: setup before a suite and reconciliation after it.
//!
//! Correctness under concurrent workers comes from check-then-act, never from locking.
//! For each fixture the existence check strictly precedes the single corrective action,
//! and nothing is cached between the two. There is no retry.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, trace};

use crate::config::Config;
use crate::storage::Store;
use crate::types::error::{StorageErrorKind, classify_storage_error};
use crate::types::{
    CleanupAction, FixtureDescriptor, FixtureLifecycle, FixtureReport, ObjectPath,
    ReconcileOutcome, SetupOutcome,
};

pub mod local;
#[cfg(test)]
mod reconcile_properties;

/// Idempotent setup and best-effort cleanup of remote fixtures.
///
/// Neither pass returns an error: every fixture gets an outcome, returned in
/// descriptor order, and the caller decides how to report warnings.
#[derive(Clone)]
pub struct FixtureReconciler {
    store: Store,
    worker_size: usize,
}

impl FixtureReconciler {
    pub fn new(store: Store, worker_size: u16) -> Self {
        Self {
            store,
            worker_size: worker_size.max(1) as usize,
        }
    }

    pub fn from_config(config: &Config, store: Store) -> Self {
        Self::new(store, config.reconcile_worker_size)
    }

    /// Upload every fixture's local source to its remote source path when absent.
    ///
    /// Existing objects are never overwritten; running this twice is the same as once.
    pub async fn ensure_present(
        &self,
        fixtures: &[FixtureDescriptor],
    ) -> Vec<FixtureReport<SetupOutcome>> {
        let store = self.store.clone();
        self.for_each(fixtures, SetupOutcome::Failed {
            kind: StorageErrorKind::Other,
            message: "setup task aborted".to_string(),
        }, move |fixture| {
            let store = store.clone();
            async move { ensure_one(&store, &fixture).await }
        })
        .await
    }

    /// Bring each fixture's destination back to baseline.
    ///
    /// COPY artifacts are deleted, MOVE artifacts are moved back to their source.
    /// Absent destinations and lost races are terminal and silent; permission and other
    /// errors become warning outcomes.
    pub async fn reconcile(
        &self,
        fixtures: &[FixtureDescriptor],
    ) -> Vec<FixtureReport<ReconcileOutcome>> {
        let store = self.store.clone();
        self.for_each(fixtures, ReconcileOutcome::SkippedOther {
            message: "reconcile task aborted".to_string(),
        }, move |fixture| {
            let store = store.clone();
            async move { reconcile_one(&store, &fixture).await }
        })
        .await
    }

    async fn for_each<T, F, Fut>(
        &self,
        fixtures: &[FixtureDescriptor],
        aborted: T,
        task: F,
    ) -> Vec<FixtureReport<T>>
    where
        T: Clone + Send + 'static,
        F: Fn(FixtureDescriptor) -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.worker_size));
        let mut join_set = JoinSet::new();

        for (index, fixture) in fixtures.iter().enumerate() {
            let semaphore = semaphore.clone();
            let work = task(fixture.clone());
            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                (index, work.await)
            });
        }

        let mut outcomes: Vec<T> = vec![aborted; fixtures.len()];
        while let Some(join_result) = join_set.join_next().await {
            match join_result {
                Ok((index, outcome)) => outcomes[index] = outcome,
                Err(e) => debug!(error = %e, "fixture task did not complete."),
            }
        }

        fixtures
            .iter()
            .zip(outcomes)
            .map(|(fixture, outcome)| FixtureReport {
                fixture_id: fixture.id.clone(),
                outcome,
            })
            .collect()
    }
}

async fn ensure_one(store: &Store, fixture: &FixtureDescriptor) -> SetupOutcome {
    let (Some(local_source), Some(remote)) = (&fixture.local_source, &fixture.source) else {
        return SetupOutcome::NotApplicable;
    };
    if !remote.is_remote() {
        return SetupOutcome::NotApplicable;
    }

    match store.exists(remote).await {
        Ok(true) => {
            trace!(fixture = %fixture.id, path = %remote, "fixture already present.");
            return SetupOutcome::AlreadyPresent;
        }
        Ok(false) => {}
        Err(e) => return setup_failure(fixture, e),
    }

    match store.upload(local_source, remote).await {
        Ok(()) => {
            debug!(fixture = %fixture.id, path = %remote, "fixture uploaded.");
            SetupOutcome::Uploaded
        }
        Err(e) => setup_failure(fixture, e),
    }
}

fn setup_failure(fixture: &FixtureDescriptor, e: anyhow::Error) -> SetupOutcome {
    let message = format!("{e:#}");
    let kind = classify_storage_error(&message);
    debug!(fixture = %fixture.id, kind = ?kind, "fixture setup failed.");
    SetupOutcome::Failed { kind, message }
}

async fn reconcile_one(store: &Store, fixture: &FixtureDescriptor) -> ReconcileOutcome {
    if !fixture.is_reconcilable() {
        return ReconcileOutcome::NotApplicable;
    }
    if fixture.lifecycle() == FixtureLifecycle::Relocatable
        && !fixture.source.as_ref().is_some_and(ObjectPath::is_remote)
    {
        return ReconcileOutcome::NotApplicable;
    }
    let destination = &fixture.destination;

    // Re-checked on every pass, immediately before acting.
    match store.exists(destination).await {
        Ok(true) => {}
        Ok(false) => {
            trace!(fixture = %fixture.id, path = %destination, "destination absent.");
            return ReconcileOutcome::SkippedAbsent;
        }
        Err(e) => {
            let message = format!("{e:#}");
            return match classify_storage_error(&message) {
                StorageErrorKind::NotFound => ReconcileOutcome::SkippedAbsent,
                StorageErrorKind::PermissionDenied => {
                    ReconcileOutcome::SkippedPermission { message }
                }
                StorageErrorKind::Other => ReconcileOutcome::SkippedOther { message },
            };
        }
    }

    let (action, result) = match fixture.lifecycle() {
        FixtureLifecycle::Relocatable => match &fixture.source {
            Some(source @ ObjectPath::Remote { .. }) => (
                CleanupAction::MovedBack,
                store.move_object(destination, source).await,
            ),
            _ => return ReconcileOutcome::NotApplicable,
        },
        FixtureLifecycle::Ephemeral => {
            (CleanupAction::Deleted, store.delete(destination).await)
        }
        FixtureLifecycle::Untracked => return ReconcileOutcome::NotApplicable,
    };

    match result {
        Ok(()) => {
            debug!(fixture = %fixture.id, action = ?action, "fixture cleaned.");
            ReconcileOutcome::Cleaned(action)
        }
        Err(e) => {
            let message = format!("{e:#}");
            let outcome = match classify_storage_error(&message) {
                StorageErrorKind::NotFound => ReconcileOutcome::SkippedRaceLost,
                StorageErrorKind::PermissionDenied => {
                    ReconcileOutcome::SkippedPermission { message }
                }
                StorageErrorKind::Other => ReconcileOutcome::SkippedOther { message },
            };
            debug!(fixture = %fixture.id, outcome = ?outcome, "fixture cleanup skipped.");
            outcome
        }
    }
}
