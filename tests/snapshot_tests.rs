mod helpers;
use helpers::*;

use std::sync::Arc;
use std::time::Duration;

use routeplane::errors::SnapshotError;
use routeplane::factory::TopicSpecification;
use routeplane::snapshot::{Snapshot, SnapshotHealth};
use routeplane::topology::{ConnectorState, Topic};

fn plain_topic(engine: &routeplane::Engine, id: &str) -> Arc<Topic> {
    Arc::new(Topic::new(Arc::clone(&engine.bus), id))
}

fn registry_ids(engine: &routeplane::Engine) -> Vec<String> {
    engine.registry.entries().iter().map(|t| t.id().to_string()).collect()
}

fn snapshot_files(dir: &tempfile::TempDir) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir.path().join("snapshots"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

// =========================================================================================
// 1. FEATURE TESTS
// =========================================================================================

mod features {
    use super::*;

    // --- EXPORT / RETRIEVAL ---

    #[test]
    fn test_export_writes_instance_and_latest() {
        let (engine, tmp) = setup_engine();
        engine
            .topics
            .create(&TopicSpecification::new("orders").with_defaults(true))
            .unwrap();

        let snapshot = engine.snapshots.export(Some("nightly".to_string())).unwrap();

        let files = snapshot_files(&tmp);
        assert_eq!(files.len(), 2);
        assert!(files.contains(&"snapshot.latest.json".to_string()));
        assert!(files
            .iter()
            .any(|f| f.starts_with(&format!("snapshot.{}.", snapshot.id()))));

        assert_eq!(snapshot.description(), Some("nightly"));
        assert_eq!(snapshot.topics().len(), 1);
        assert_eq!(engine.snapshots.last_persisted(), snapshot.timestamp());
    }

    #[test]
    fn test_list_and_get() {
        let (engine, _tmp) = setup_engine();
        engine.registry.register(plain_topic(&engine, "orders")).unwrap();

        let first = engine.snapshots.export(None).unwrap();
        std::thread::sleep(Duration::from_millis(5));
        let second = engine.snapshots.export(None).unwrap();

        let listed = engine.snapshots.list().unwrap();
        assert_eq!(listed, vec![second.descriptor(), first.descriptor()]);

        let loaded = engine.snapshots.get(first.id()).unwrap();
        assert_eq!(loaded.id(), first.id());
        assert_eq!(loaded.timestamp(), first.timestamp());
        assert_eq!(loaded.document().topics, first.document().topics);

        let err = engine.snapshots.get("missing").unwrap_err();
        assert!(matches!(err, SnapshotError::NotExist { ref id } if id == "missing"));
    }

    #[test]
    fn test_no_snapshot_yet() {
        let (engine, _tmp) = setup_engine();

        assert!(engine.snapshots.latest().unwrap().is_none());
        assert_eq!(engine.snapshots.last_persisted(), -1);
        assert!(engine.snapshots.list().unwrap().is_empty());
    }

    #[test]
    fn test_latest_is_loaded_from_disk_and_restorable() {
        let tmp = tempfile::tempdir().unwrap();
        let source = engine_in(&tmp, Arc::new(routeplane::persistence::PersistenceManager::in_memory()), STALE_MS);
        source
            .topics
            .create(&TopicSpecification::new("orders").with_defaults(true))
            .unwrap();
        let exported = source.snapshots.export(None).unwrap();

        // Fresh engine over the same snapshot directory, empty registry and transport.
        let target = engine_in(&tmp, Arc::new(routeplane::persistence::PersistenceManager::in_memory()), STALE_MS);
        let latest = target.snapshots.latest().unwrap().unwrap();
        assert_eq!(latest.id(), exported.id());
        assert!(target.registry.is_empty());

        let summary = target.snapshots.overwrite(&latest).unwrap();
        assert_eq!(summary.added, vec!["orders".to_string()]);

        let restored = target.registry.get("orders").unwrap();
        assert_eq!(*restored, *source.registry.get("orders").unwrap());
        assert_eq!(
            restored.connector("default-connector").unwrap().state(),
            ConnectorState::Active
        );
        assert_eq!(target.transport.exchange_count(), source.transport.exchange_count());
    }

    // --- RECONCILIATION ---

    fn engine_with_a_and_b() -> (routeplane::Engine, tempfile::TempDir, Snapshot) {
        let (engine, tmp) = setup_engine();
        engine
            .registry
            .register(Arc::new(Topic::new(Arc::clone(&engine.bus), "A").with_description("first")))
            .unwrap();
        engine.registry.register(plain_topic(&engine, "B")).unwrap();

        let snapshot = Snapshot::from_parts(
            "s-1",
            None,
            0,
            vec![
                Arc::new(Topic::new(Arc::clone(&engine.bus), "A").with_description("second")),
                plain_topic(&engine, "C"),
            ],
        );
        (engine, tmp, snapshot)
    }

    #[test]
    fn test_merge_keeps_unknown_topics() {
        let (engine, _tmp, snapshot) = engine_with_a_and_b();

        let summary = engine.snapshots.merge(&snapshot).unwrap();

        assert_eq!(registry_ids(&engine), vec!["A", "B", "C"]);
        assert_eq!(engine.registry.get("A").unwrap().description().as_deref(), Some("second"));
        assert_eq!(summary.replaced, vec!["A".to_string()]);
        assert_eq!(summary.retained, vec!["B".to_string()]);
        assert_eq!(summary.added, vec!["C".to_string()]);
        assert!(summary.removed.is_empty());
    }

    #[test]
    fn test_overwrite_matches_the_snapshot() {
        let (engine, _tmp, snapshot) = engine_with_a_and_b();

        let summary = engine.snapshots.overwrite(&snapshot).unwrap();

        assert_eq!(registry_ids(&engine), vec!["A", "C"]);
        assert_eq!(engine.registry.get("A").unwrap().description().as_deref(), Some("second"));
        assert_eq!(summary.removed, vec!["B".to_string()]);
        assert!(summary.retained.is_empty());
    }

    #[test]
    fn test_equal_topics_are_left_alone() {
        let (engine, _tmp) = setup_engine();
        let live = plain_topic(&engine, "A");
        engine.registry.register(Arc::clone(&live)).unwrap();
        let before = engine.registry.last_modified();

        let snapshot = Snapshot::from_parts("s-1", None, 0, vec![plain_topic(&engine, "A")]);
        let summary = engine.snapshots.overwrite(&snapshot).unwrap();

        assert_eq!(summary.unchanged, vec!["A".to_string()]);
        assert!(Arc::ptr_eq(&engine.registry.get("A").unwrap(), &live));
        assert_eq!(engine.registry.last_modified(), before);
    }

    #[test]
    fn test_failures_are_rolled_up_after_every_topic() {
        let (engine, _tmp) = setup_engine();
        engine.registry.register(plain_topic(&engine, "A")).unwrap();
        engine.registry.register(plain_topic(&engine, "B")).unwrap();

        let fail = Switch::new();
        fail.trip();
        let snapshot = Snapshot::from_parts(
            "s-1",
            None,
            0,
            vec![
                flaky_topic(&engine.bus, "A", &fail),
                plain_topic(&engine, "B"),
                plain_topic(&engine, "C"),
            ],
        );

        let rollup = match engine.snapshots.merge(&snapshot) {
            Err(SnapshotError::Rollup(rollup)) => rollup,
            other => panic!("expected a rollup, got {:?}", other.map(|_| ())),
        };

        assert_eq!(rollup.topic_ids(), vec!["A"]);
        assert!(rollup.cause("A").unwrap().to_string().contains("flaky transport refused"));
        // The other topics were still reconciled.
        assert_eq!(registry_ids(&engine), vec!["B", "C"]);
    }

    #[test]
    fn test_failed_unregister_is_rolled_up() {
        let (engine, _tmp) = setup_engine();
        let fail = Switch::new();
        engine.registry.register(plain_topic(&engine, "A")).unwrap();
        engine.registry.register(flaky_topic(&engine.bus, "B", &fail)).unwrap();
        fail.trip_teardown();

        let snapshot = Snapshot::from_parts("s-1", None, 0, vec![plain_topic(&engine, "C")]);
        let rollup = match engine.snapshots.overwrite(&snapshot) {
            Err(SnapshotError::Rollup(rollup)) => rollup,
            other => panic!("expected a rollup, got {:?}", other.map(|_| ())),
        };

        assert_eq!(rollup.topic_ids(), vec!["B"]);
        assert!(rollup.cause("B").unwrap().to_string().contains("refused teardown"));
        // B stays registered; A and C were still reconciled.
        assert_eq!(registry_ids(&engine), vec!["B", "C"]);
    }

    // --- HEALTH ---

    #[test]
    fn test_health_without_snapshot_is_unhealthy() {
        let (engine, _tmp) = setup_engine();

        let health = engine.health.check();

        assert!(!health.is_healthy());
        assert_eq!(
            health,
            SnapshotHealth::Unhealthy {
                reason: "no snapshot has been persisted".to_string()
            }
        );
    }

    #[test]
    fn test_health_after_export_is_healthy() {
        let (engine, _tmp) = setup_engine();
        engine.registry.register(plain_topic(&engine, "A")).unwrap();
        engine.snapshots.export(None).unwrap();

        assert!(engine.health.check().is_healthy());
    }

    #[test]
    fn test_health_turns_stale_after_changes() {
        let (engine, _tmp) = setup_engine_with_threshold(0);
        engine.registry.register(plain_topic(&engine, "A")).unwrap();
        engine.snapshots.export(None).unwrap();

        std::thread::sleep(Duration::from_millis(5));
        engine.registry.register(plain_topic(&engine, "B")).unwrap();

        let health = engine.health.check();
        assert!(!health.is_healthy());
        assert_eq!(engine.health.stale_threshold_ms(), 0);
    }

    #[test]
    fn test_health_wire_shape() {
        let value = serde_json::to_value(SnapshotHealth::Healthy { lag_ms: 12 }).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "healthy", "lag_ms": 12 }));
    }
}
