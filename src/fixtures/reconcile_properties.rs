//! Property-based tests for fixture setup idempotence and reconcile race safety.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::path::PathBuf;

    use proptest::prelude::*;

    use crate::fixtures::FixtureReconciler;
    use crate::test_utils::InMemoryStore;
    use crate::types::{
        CleanupAction, CommandVerb, FixtureDescriptor, ReconcileOutcome, SetupOutcome,
    };

    #[derive(Debug, Clone)]
    struct FixtureSpec {
        verb: CommandVerb,
        expect_success: bool,
        source_present: bool,
        destination_present: bool,
    }

    fn fixture_spec() -> impl Strategy<Value = FixtureSpec> {
        (
            prop_oneof![Just(CommandVerb::Copy), Just(CommandVerb::Move)],
            proptest::bool::weighted(0.8),
            proptest::bool::ANY,
            proptest::bool::ANY,
        )
            .prop_map(|(verb, expect_success, source_present, destination_present)| FixtureSpec {
                verb,
                expect_success,
                source_present,
                destination_present,
            })
    }

    fn source_uri(i: usize) -> String {
        format!("gs://main/original-{i}.json")
    }

    fn destination_uri(i: usize) -> String {
        format!("gs://dest/artifact-{i}.json")
    }

    fn build(specs: &[FixtureSpec]) -> (Vec<FixtureDescriptor>, InMemoryStore) {
        let mut objects = Vec::new();
        let fixtures = specs
            .iter()
            .enumerate()
            .map(|(i, spec)| {
                if spec.source_present {
                    objects.push(source_uri(i));
                }
                if spec.destination_present {
                    objects.push(destination_uri(i));
                }
                FixtureDescriptor {
                    id: format!("F-{i}"),
                    local_source: Some(PathBuf::from(format!("./local/original-{i}.json"))),
                    source: Some(source_uri(i).parse().unwrap()),
                    destination: destination_uri(i).parse().unwrap(),
                    verb: spec.verb,
                    expect_success: spec.expect_success,
                }
            })
            .collect();
        (fixtures, InMemoryStore::with_objects(objects))
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Running setup twice leaves the same object set as running it once, and the
        /// second pass takes no action.
        #[test]
        fn prop_ensure_present_is_idempotent(
            specs in proptest::collection::vec(fixture_spec(), 1..12),
            worker_size in 1u16..6,
        ) {
            let (fixtures, store) = build(&specs);
            let reconciler = FixtureReconciler::new(Box::new(store.clone()), worker_size);

            runtime().block_on(async {
                reconciler.ensure_present(&fixtures).await;
                let after_first = store.objects();
                let actions_after_first = store.actions().len();

                let second = reconciler.ensure_present(&fixtures).await;
                prop_assert_eq!(store.objects(), after_first);
                prop_assert_eq!(store.actions().len(), actions_after_first);
                prop_assert!(second.iter().all(|r| r.outcome == SetupOutcome::AlreadyPresent));
                Ok(())
            })?;
        }

        /// Two concurrent reconcile passes never fail, apply at most one corrective action
        /// per fixture, and leave the state one pass would have left.
        #[test]
        fn prop_concurrent_reconcile_is_race_safe(
            specs in proptest::collection::vec(fixture_spec(), 1..12),
            worker_size in 1u16..6,
        ) {
            let (fixtures, store) = build(&specs);

            let mut expected: HashSet<String> = store.objects();
            for (i, spec) in specs.iter().enumerate() {
                if spec.expect_success && spec.destination_present {
                    expected.remove(&destination_uri(i));
                    if spec.verb == CommandVerb::Move {
                        expected.insert(source_uri(i));
                    }
                }
            }

            let first = FixtureReconciler::new(Box::new(store.clone()), worker_size);
            let second = FixtureReconciler::new(Box::new(store.clone()), worker_size);

            runtime().block_on(async {
                let (a, b) = tokio::join!(first.reconcile(&fixtures), second.reconcile(&fixtures));

                prop_assert_eq!(store.objects(), expected.clone());

                for (i, spec) in specs.iter().enumerate() {
                    let cleaned = [&a[i].outcome, &b[i].outcome]
                        .iter()
                        .filter(|o| matches!(o, ReconcileOutcome::Cleaned(_)))
                        .count();
                    for outcome in [&a[i].outcome, &b[i].outcome] {
                        prop_assert!(!outcome.is_warning());
                    }

                    if spec.expect_success && spec.destination_present {
                        prop_assert_eq!(cleaned, 1);
                        let action = if spec.verb == CommandVerb::Move {
                            CleanupAction::MovedBack
                        } else {
                            CleanupAction::Deleted
                        };
                        prop_assert!(
                            a[i].outcome == ReconcileOutcome::Cleaned(action)
                                || b[i].outcome == ReconcileOutcome::Cleaned(action)
                        );
                    } else {
                        prop_assert_eq!(cleaned, 0);
                    }
                }
                Ok(())
            })?;
        }
    }
}
