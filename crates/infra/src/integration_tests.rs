//! Integration tests for the full event-sourced pipeline.
//!
//! Tests: Command → Repository → EventStore → Projection → ReadModel → Replay
//!
//! Verifies:
//! - Stale writes are rejected without touching the stream
//! - Stored history reduces to the same state as live execution
//! - Replay rebuilds read models identical to the live ones, and its
//!   lifecycle (single run, cancel, fail) is durably recorded

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Utc;
    use serde_json::Value as JsonValue;

    use perfrev_core::{
        Aggregate, AggregateId, AggregateRoot, DomainError, EmployeeId, ExpectedVersion, UserId,
    };
    use perfrev_events::{EventEnvelope, Projection, ProjectionError};
    use perfrev_org::{
        AssignManager, Employee, EmployeeCommand, HierarchyCache, HierarchyResolver, HireEmployee,
        OrgRole, Principal, authorize_employee_access,
    };
    use perfrev_questionnaire::{
        AddCategory, Category, CategoryCommand, CategoryId, DeactivateCategory, RenameCategory,
        ReorderCategory,
    };
    use perfrev_replay::{
        ProjectionReplay, ReplayCommand, ReplayId, ReplayStatus, SetTotalEvents, StartReplay,
    };

    use crate::event_store::{EventStore, InMemoryEventStore, StoredEvent};
    use crate::projections::{
        CATEGORIES_PROJECTION, CategoriesProjection, CategoryReadModel,
        EMPLOYEE_DIRECTORY_PROJECTION, EmployeeDirectoryProjection, EmployeeRecord,
        ReplayCoordinator, ReplayError,
    };
    use crate::read_model::InMemoryReadModelStore;
    use crate::repository::{AggregateRepository, RepositoryError};

    type CategoryStore = Arc<InMemoryReadModelStore<CategoryId, CategoryReadModel>>;
    type DirectoryStore = Arc<InMemoryReadModelStore<EmployeeId, EmployeeRecord>>;
    type Categories = CategoriesProjection<CategoryStore>;
    type Directory = EmployeeDirectoryProjection<DirectoryStore>;

    struct Harness {
        store: Arc<InMemoryEventStore>,
        repo: AggregateRepository<Arc<InMemoryEventStore>>,
        categories: Arc<Categories>,
        directory: Arc<Directory>,
    }

    impl Harness {
        fn new() -> Self {
            perfrev_observability::init();
            let store = Arc::new(InMemoryEventStore::new());
            Self {
                repo: AggregateRepository::new(Arc::clone(&store)),
                store,
                categories: Arc::new(CategoriesProjection::new(Arc::default())),
                directory: Arc::new(EmployeeDirectoryProjection::new(Arc::default())),
            }
        }

        /// Feed committed events to the live projections, as a subscriber would.
        fn project(&self, committed: &[StoredEvent]) {
            for stored in committed {
                let envelope = stored.to_envelope();
                self.categories.apply(&envelope).unwrap();
                self.directory.apply(&envelope).unwrap();
            }
        }

        fn category(&self, id: CategoryId, command: CategoryCommand) {
            let committed = self.repo.execute::<Category>(id, &command).unwrap();
            self.project(&committed);
        }

        fn employee(&self, id: EmployeeId, command: EmployeeCommand) {
            let committed = self.repo.execute::<Employee>(id, &command).unwrap();
            self.project(&committed);
        }

        fn hire(&self, manager: Option<EmployeeId>) -> EmployeeId {
            let id = EmployeeId::new();
            self.employee(
                id,
                EmployeeCommand::HireEmployee(HireEmployee {
                    employee_id: id,
                    full_name: format!("Employee {id}"),
                    manager_id: manager,
                    occurred_at: Utc::now(),
                }),
            );
            id
        }

        fn add_category(&self, name: &str, sort_order: i32) -> CategoryId {
            let id = CategoryId::new(AggregateId::new());
            self.category(
                id,
                CategoryCommand::AddCategory(AddCategory {
                    category_id: id,
                    name: name.to_string(),
                    description: Some(format!("{name} expectations")),
                    sort_order,
                    occurred_at: Utc::now(),
                }),
            );
            id
        }

        /// A small org plus a handful of categories with some history.
        fn seed(&self) {
            let ceo = self.hire(None);
            let vp = self.hire(Some(ceo));
            let eng = self.hire(Some(vp));
            let _ = self.hire(Some(eng));
            let floater = self.hire(None);
            self.employee(
                floater,
                EmployeeCommand::AssignManager(AssignManager {
                    employee_id: floater,
                    manager_id: vp,
                    occurred_at: Utc::now(),
                }),
            );

            let delivery = self.add_category("Delivery", 2);
            let growth = self.add_category("Growth", 1);
            let _ = self.add_category("Collaboration", 3);
            self.category(
                delivery,
                CategoryCommand::RenameCategory(RenameCategory {
                    category_id: delivery,
                    name: "Impact".to_string(),
                    occurred_at: Utc::now(),
                }),
            );
            self.category(
                growth,
                CategoryCommand::ReorderCategory(ReorderCategory {
                    category_id: growth,
                    sort_order: 4,
                    occurred_at: Utc::now(),
                }),
            );
            self.category(
                growth,
                CategoryCommand::DeactivateCategory(DeactivateCategory {
                    category_id: growth,
                    occurred_at: Utc::now(),
                }),
            );
        }

        fn coordinator(
            &self,
            batch_size: usize,
        ) -> (ReplayCoordinator<InMemoryEventStore>, Arc<Categories>, Arc<Directory>) {
            let categories: Arc<Categories> = Arc::new(CategoriesProjection::new(Arc::default()));
            let directory: Arc<Directory> = Arc::new(EmployeeDirectoryProjection::new(Arc::default()));
            let coordinator = ReplayCoordinator::new(Arc::clone(&self.store), batch_size)
                .with_projection(categories.clone())
                .with_projection(directory.clone());
            (coordinator, categories, directory)
        }
    }

    /// Always fails to apply; used to drive the failure path.
    struct Exploding;

    impl Projection for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn subscribes_to(&self, _aggregate_type: &str) -> bool {
            true
        }

        fn apply(&self, _envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
            Err(ProjectionError::Store("disk full".to_string()))
        }

        fn clear(&self) -> Result<(), ProjectionError> {
            Ok(())
        }
    }

    /// Panics on the first event it sees.
    struct Panicking;

    impl Projection for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        fn subscribes_to(&self, _aggregate_type: &str) -> bool {
            true
        }

        fn apply(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
            panic!("cannot project {}", envelope.event_type())
        }

        fn clear(&self) -> Result<(), ProjectionError> {
            Ok(())
        }
    }

    #[test]
    fn stale_save_conflicts_and_leaves_stream_unchanged() {
        let h = Harness::new();
        let id = h.add_category("Delivery", 1);

        let first = h.repo.load::<Category>(id).unwrap();
        let second = h.repo.load::<Category>(id).unwrap();

        let rename = |name: &str| {
            first
                .aggregate
                .handle(&CategoryCommand::RenameCategory(RenameCategory {
                    category_id: id,
                    name: name.to_string(),
                    occurred_at: Utc::now(),
                }))
                .unwrap()
        };

        let v2 = h
            .repo
            .save::<Category>(id, ExpectedVersion::Exact(first.version), &rename("Impact"))
            .unwrap();
        assert_eq!(v2, 2);

        let err = h
            .repo
            .save::<Category>(id, ExpectedVersion::Exact(second.version), &rename("Outcomes"))
            .unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::ConcurrencyConflict {
                expected: ExpectedVersion::Exact(1),
                actual: 2
            }
        ));
        assert_eq!(h.store.load_stream(id.0).unwrap().len(), 2);
        assert_eq!(h.repo.load::<Category>(id).unwrap().aggregate.name(), "Impact");
    }

    #[test]
    fn storage_round_trip_reproduces_live_state() -> anyhow::Result<()> {
        let h = Harness::new();
        let id = CategoryId::new(AggregateId::new());
        let commands = vec![
            CategoryCommand::AddCategory(AddCategory {
                category_id: id,
                name: "Delivery".to_string(),
                description: None,
                sort_order: 3,
                occurred_at: Utc::now(),
            }),
            CategoryCommand::RenameCategory(RenameCategory {
                category_id: id,
                name: "Impact".to_string(),
                occurred_at: Utc::now(),
            }),
            CategoryCommand::ReorderCategory(ReorderCategory {
                category_id: id,
                sort_order: 1,
                occurred_at: Utc::now(),
            }),
        ];

        let mut live = Category::empty(id);
        for command in &commands {
            perfrev_events::execute(&mut live, command)?;
            h.repo.execute::<Category>(id, command)?;
        }

        let loaded = h.repo.load::<Category>(id)?;
        assert_eq!(loaded.aggregate, live);
        assert_eq!(loaded.version, live.version());
        Ok(())
    }

    #[tokio::test]
    async fn replay_rebuilds_read_models_equal_to_live() -> anyhow::Result<()> {
        let h = Harness::new();
        h.seed();

        let (coordinator, categories, directory) = h.coordinator(4);
        let user = UserId::new();

        let handle = coordinator
            .start(CATEGORIES_PROJECTION, user, "schema change")
            .await?;
        assert_eq!(handle.wait().await?, ReplayStatus::Completed);

        let handle = coordinator
            .start(EMPLOYEE_DIRECTORY_PROJECTION, user, "backfill")
            .await?;
        let replay_id = handle.replay_id();
        assert_eq!(handle.wait().await?, ReplayStatus::Completed);

        assert_eq!(categories.list(), h.categories.list());
        assert_eq!(directory.list(), h.directory.list());

        let replay = coordinator.replay(replay_id)?;
        assert_eq!(replay.total_events(), Some(replay.processed_events()));
        assert!(replay.finished_at().is_some());
        Ok(())
    }

    #[tokio::test]
    async fn second_start_is_rejected_while_running() -> anyhow::Result<()> {
        let h = Harness::new();
        h.seed();
        let (coordinator, _, _) = h.coordinator(1);
        let user = UserId::new();

        // The spawned run cannot make progress until this task yields.
        let first = coordinator.start(CATEGORIES_PROJECTION, user, "first").await?;
        let err = coordinator
            .start(CATEGORIES_PROJECTION, user, "second")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::AlreadyRunning { replay_id, .. } if replay_id == first.replay_id()
        ));

        // Other projections are independent.
        let other = coordinator.start(EMPLOYEE_DIRECTORY_PROJECTION, user, "other").await?;

        assert_eq!(first.wait().await?, ReplayStatus::Completed);
        assert_eq!(other.wait().await?, ReplayStatus::Completed);

        let again = coordinator.start(CATEGORIES_PROJECTION, user, "after").await?;
        assert_eq!(again.wait().await?, ReplayStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_is_recorded_after_the_batch_in_flight() -> anyhow::Result<()> {
        let h = Harness::new();
        h.seed();
        let (coordinator, _, _) = h.coordinator(1);
        let (user, operator) = (UserId::new(), UserId::new());

        let handle = coordinator.start(CATEGORIES_PROJECTION, user, "rebuild").await?;
        let replay_id = handle.replay_id();
        handle.cancel(operator);
        assert_eq!(handle.wait().await?, ReplayStatus::Cancelled);

        let replay = coordinator.replay(replay_id)?;
        assert_eq!(replay.status(), ReplayStatus::Cancelled);
        assert_eq!(replay.processed_events(), 1);
        assert_eq!(replay.cancelled_by(), Some(operator));

        // Cancelling again is a no-op; further commands are rejected.
        coordinator.cancel(replay_id, operator)?;
        let err = h
            .repo
            .execute::<ProjectionReplay>(
                replay_id,
                &ReplayCommand::SetTotalEvents(SetTotalEvents {
                    replay_id,
                    total_events: 10,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Domain(DomainError::InvalidTransition(_))));
        Ok(())
    }

    #[tokio::test]
    async fn cancelling_a_completed_replay_is_an_invalid_transition() -> anyhow::Result<()> {
        let h = Harness::new();
        h.seed();
        let (coordinator, _, _) = h.coordinator(100);
        let user = UserId::new();

        let handle = coordinator.start(CATEGORIES_PROJECTION, user, "rebuild").await?;
        let replay_id = handle.replay_id();
        assert_eq!(handle.wait().await?, ReplayStatus::Completed);

        let err = coordinator.cancel(replay_id, user).unwrap_err();
        assert!(matches!(
            err,
            ReplayError::Repository(RepositoryError::Domain(DomainError::InvalidTransition(_)))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn projection_failures_are_recorded() -> anyhow::Result<()> {
        let h = Harness::new();
        h.seed();
        let coordinator =
            ReplayCoordinator::new(Arc::clone(&h.store), 10).with_projection(Arc::new(Exploding));

        let handle = coordinator.start("exploding", UserId::new(), "chaos").await?;
        let replay_id = handle.replay_id();
        assert_eq!(handle.wait().await?, ReplayStatus::Failed);

        let replay = coordinator.replay(replay_id)?;
        assert_eq!(replay.status(), ReplayStatus::Failed);
        assert!(replay.error().unwrap_or_default().contains("disk full"));
        assert_eq!(replay.processed_events(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_projection_is_rejected() {
        let h = Harness::new();
        let (coordinator, _, _) = h.coordinator(10);
        let err = coordinator
            .start("nope", UserId::new(), "typo")
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::UnknownProjection(name) if name == "nope"));
    }

    #[tokio::test]
    async fn a_second_coordinator_sees_the_durable_running_replay() -> anyhow::Result<()> {
        let h = Harness::new();
        h.seed();
        let (first, _, _) = h.coordinator(1);
        let (second, _, _) = h.coordinator(1);
        let user = UserId::new();

        let handle = first.start(CATEGORIES_PROJECTION, user, "first").await?;
        let err = second
            .start(CATEGORIES_PROJECTION, user, "second")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReplayError::AlreadyRunning { replay_id, .. } if replay_id == handle.replay_id()
        ));

        assert_eq!(handle.wait().await?, ReplayStatus::Completed);
        let again = second.start(CATEGORIES_PROJECTION, user, "after").await?;
        assert_eq!(again.wait().await?, ReplayStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn a_replay_left_running_blocks_until_cancelled() -> anyhow::Result<()> {
        let h = Harness::new();
        h.seed();
        let user = UserId::new();

        // A run whose process died after recording its start.
        let orphan = ReplayId::new(AggregateId::new());
        h.repo.execute::<ProjectionReplay>(
            orphan,
            &ReplayCommand::Start(StartReplay {
                replay_id: orphan,
                projection: CATEGORIES_PROJECTION.to_string(),
                initiated_by: user,
                reason: "before restart".to_string(),
                occurred_at: Utc::now(),
            }),
        )?;

        let (coordinator, _, _) = h.coordinator(10);
        let err = coordinator
            .start(CATEGORIES_PROJECTION, user, "after restart")
            .await
            .unwrap_err();
        assert!(matches!(err, ReplayError::AlreadyRunning { replay_id, .. } if replay_id == orphan));

        coordinator.cancel(orphan, user)?;
        assert_eq!(coordinator.status(orphan)?, ReplayStatus::Cancelled);

        let handle = coordinator.start(CATEGORIES_PROJECTION, user, "after restart").await?;
        assert_eq!(handle.wait().await?, ReplayStatus::Completed);
        Ok(())
    }

    #[tokio::test]
    async fn a_panicking_projection_is_recorded_as_failed() -> anyhow::Result<()> {
        let h = Harness::new();
        h.seed();
        let coordinator =
            ReplayCoordinator::new(Arc::clone(&h.store), 10).with_projection(Arc::new(Panicking));
        let user = UserId::new();

        let handle = coordinator.start("panicking", user, "chaos").await?;
        let replay_id = handle.replay_id();
        assert_eq!(handle.wait().await?, ReplayStatus::Failed);
        assert_eq!(coordinator.replay(replay_id)?.error(), Some("replay task panicked"));

        // The failed run no longer holds the projection.
        let again = coordinator.start("panicking", user, "retry").await?;
        assert_eq!(again.wait().await?, ReplayStatus::Failed);
        Ok(())
    }

    #[test]
    fn create_command_for_another_stream_is_rejected() {
        let h = Harness::new();
        let stream = CategoryId::new(AggregateId::new());
        let other = CategoryId::new(AggregateId::new());

        let err = h
            .repo
            .execute::<Category>(
                stream,
                &CategoryCommand::AddCategory(AddCategory {
                    category_id: other,
                    name: "Delivery".to_string(),
                    description: None,
                    sort_order: 1,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Domain(DomainError::InvariantViolation(_))));
        assert!(h.store.load_stream(stream.0).unwrap().is_empty());
    }

    #[test]
    fn hierarchy_cache_follows_the_employee_directory() {
        let h = Harness::new();
        let lead = h.hire(None);
        let manager = h.hire(Some(lead));
        let report = h.hire(None);

        let cache = HierarchyCache::new(Arc::clone(&h.directory), Duration::from_secs(3600));
        let as_lead = Principal::new(lead, OrgRole::TeamLead);

        let resolver = cache.resolver().unwrap();
        assert!(authorize_employee_access(&as_lead, report, &*resolver).is_err());

        let committed = h
            .repo
            .execute::<Employee>(
                report,
                &EmployeeCommand::AssignManager(AssignManager {
                    employee_id: report,
                    manager_id: manager,
                    occurred_at: Utc::now(),
                }),
            )
            .unwrap();
        h.project(&committed);
        for stored in &committed {
            cache.observe(&stored.to_envelope());
        }

        let resolver = cache.resolver().unwrap();
        assert!(resolver.is_in_hierarchy_of(lead, report).unwrap());
        assert!(authorize_employee_access(&as_lead, report, &*resolver).is_ok());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        #[derive(Debug, Clone)]
        enum Step {
            Rename(u8),
            Reorder(i32),
            Describe(Option<u8>),
            Deactivate,
        }

        fn step() -> impl Strategy<Value = Step> {
            prop_oneof![
                (0u8..4).prop_map(Step::Rename),
                (0i32..5).prop_map(Step::Reorder),
                prop::option::of(0u8..3).prop_map(Step::Describe),
                Just(Step::Deactivate),
            ]
        }

        fn command(id: CategoryId, step: &Step) -> CategoryCommand {
            let occurred_at = Utc::now();
            match step {
                Step::Rename(n) => CategoryCommand::RenameCategory(RenameCategory {
                    category_id: id,
                    name: format!("name-{n}"),
                    occurred_at,
                }),
                Step::Reorder(n) => CategoryCommand::ReorderCategory(ReorderCategory {
                    category_id: id,
                    sort_order: *n,
                    occurred_at,
                }),
                Step::Describe(d) => CategoryCommand::ChangeCategoryDescription(
                    perfrev_questionnaire::ChangeCategoryDescription {
                        category_id: id,
                        description: d.map(|n| format!("desc-{n}")),
                        occurred_at,
                    },
                ),
                Step::Deactivate => CategoryCommand::DeactivateCategory(DeactivateCategory {
                    category_id: id,
                    occurred_at,
                }),
            }
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 64,
                ..ProptestConfig::default()
            })]

            /// Property: whatever sequence of commands (accepted or rejected)
            /// runs through the repository, reloading from storage yields the
            /// state of applying the same commands in memory.
            #[test]
            fn reload_matches_in_memory_execution(steps in prop::collection::vec(step(), 0..12)) {
                let h = Harness::new();
                let id = CategoryId::new(AggregateId::new());
                let add = CategoryCommand::AddCategory(AddCategory {
                    category_id: id,
                    name: "seed".to_string(),
                    description: None,
                    sort_order: 0,
                    occurred_at: Utc::now(),
                });

                let mut live = Category::empty(id);
                perfrev_events::execute(&mut live, &add).unwrap();
                h.repo.execute::<Category>(id, &add).unwrap();

                for s in &steps {
                    let cmd = command(id, s);
                    let local = perfrev_events::execute(&mut live, &cmd);
                    let stored = h.repo.execute::<Category>(id, &cmd);
                    prop_assert_eq!(local.is_ok(), stored.is_ok());
                }

                let loaded = h.repo.load::<Category>(id).unwrap();
                prop_assert_eq!(loaded.version, live.version());
                prop_assert_eq!(loaded.aggregate, live);
            }
        }
    }
}
