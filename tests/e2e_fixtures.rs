//! E2E tests for fixture setup and reconciliation against live buckets.

#![cfg(e2e_test)]

mod common;

use common::TestHelper;
use gsverify_rs::FixtureReconciler;
use gsverify_rs::config::BucketRole;
use gsverify_rs::types::{
    CleanupAction, CommandVerb, FixtureDescriptor, ReconcileOutcome, SetupOutcome,
};

#[tokio::test(flavor = "multi_thread")]
async fn e2e_ensure_present_is_idempotent() {
    e2e_timeout!(async {
        // Purpose: Setup uploads a missing fixture once and leaves it alone afterwards.
        // Expected: first pass Uploaded, second pass AlreadyPresent.

        let helper = TestHelper::new().await;
        let source = helper.generate_object_path(BucketRole::Main, "setup");
        let _guard = helper.guard(vec![source.clone()]);

        let fixture = FixtureDescriptor {
            id: "SETUP-001".to_string(),
            local_source: Some(helper.local_file("setup.json")),
            source: Some(source.clone()),
            destination: source.clone(),
            verb: CommandVerb::SignUrl,
            expect_success: true,
        };
        let reconciler = FixtureReconciler::from_config(&helper.config, helper.store.clone());

        let first = reconciler.ensure_present(&[fixture.clone()]).await;
        assert_eq!(first[0].outcome, SetupOutcome::Uploaded);
        assert!(helper.exists(&source).await);

        let second = reconciler.ensure_present(&[fixture]).await;
        assert_eq!(second[0].outcome, SetupOutcome::AlreadyPresent);
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_reconcile_deletes_copy() {
    e2e_timeout!(async {
        // Purpose: A COPY artifact is deleted; a second pass finds nothing to do.

        let helper = TestHelper::new().await;
        let source = helper.generate_object_path(BucketRole::Main, "copy-src");
        let destination = helper.generate_object_path(BucketRole::Main, "copy-dst");
        let _guard = helper.guard(vec![source.clone(), destination.clone()]);
        helper.upload(&destination).await;

        let fixture = FixtureDescriptor {
            id: "CP-002".to_string(),
            local_source: None,
            source: Some(source),
            destination: destination.clone(),
            verb: CommandVerb::Copy,
            expect_success: true,
        };
        let reconciler = FixtureReconciler::from_config(&helper.config, helper.store.clone());

        let first = reconciler.reconcile(&[fixture.clone()]).await;
        assert_eq!(first[0].outcome, ReconcileOutcome::Cleaned(CleanupAction::Deleted));
        assert!(!helper.exists(&destination).await);

        let second = reconciler.reconcile(&[fixture]).await;
        assert_eq!(second[0].outcome, ReconcileOutcome::SkippedAbsent);
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_reconcile_moves_back() {
    e2e_timeout!(async {
        // Purpose: A MOVE artifact is moved back to its original path.
        // Expected: destination absent, source present afterwards.

        let helper = TestHelper::new().await;
        let source = helper.generate_object_path(BucketRole::Main, "move-src");
        let destination = helper.generate_object_path(BucketRole::MoveDest, "move-dst");
        let _guard = helper.guard(vec![source.clone(), destination.clone()]);
        helper.upload(&destination).await;

        let fixture = FixtureDescriptor {
            id: "MV-001".to_string(),
            local_source: None,
            source: Some(source.clone()),
            destination: destination.clone(),
            verb: CommandVerb::Move,
            expect_success: true,
        };
        let reconciler = FixtureReconciler::from_config(&helper.config, helper.store.clone());

        let outcome = reconciler.reconcile(&[fixture]).await;
        assert_eq!(outcome[0].outcome, ReconcileOutcome::Cleaned(CleanupAction::MovedBack));
        assert!(!helper.exists(&destination).await);
        assert!(helper.exists(&source).await);
    });
}

#[tokio::test(flavor = "multi_thread")]
async fn e2e_concurrent_reconcile_never_fails() {
    e2e_timeout!(async {
        // Purpose: Two workers clean the same COPY fixture at once.
        // Expected: no warnings, exactly one of them reports the delete.

        let helper = TestHelper::new().await;
        let destination = helper.generate_object_path(BucketRole::Main, "race");
        let _guard = helper.guard(vec![destination.clone()]);
        helper.upload(&destination).await;

        let fixture = FixtureDescriptor {
            id: "CP-RACE".to_string(),
            local_source: None,
            source: None,
            destination: destination.clone(),
            verb: CommandVerb::Copy,
            expect_success: true,
        };
        let first = FixtureReconciler::from_config(&helper.config, helper.store.clone());
        let second = FixtureReconciler::from_config(&helper.config, helper.store.clone());
        let fixtures = [fixture];

        let (a, b) = tokio::join!(first.reconcile(&fixtures), second.reconcile(&fixtures));
        assert!(!a[0].outcome.is_warning(), "{:?}", a[0].outcome);
        assert!(!b[0].outcome.is_warning(), "{:?}", b[0].outcome);
        let deleted = [&a[0].outcome, &b[0].outcome]
            .iter()
            .filter(|o| matches!(o, ReconcileOutcome::Cleaned(_)))
            .count();
        assert!(deleted <= 1);
        assert!(!helper.exists(&destination).await);
    });
}
