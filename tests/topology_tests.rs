mod helpers;
use helpers::*;

use std::sync::Arc;

use parking_lot::Mutex;
use routeplane::errors::TopologyError;
use routeplane::events::{EventBus, LifecycleListener};
use routeplane::topology::{
    AccessControlList, AccessRule, ConnectorState, Direction, Group, Partition, PartitionState,
    RouteRequirements, Topic,
};

/// Records whether the partition was already visible in its group when
/// `on_added` / `on_removed` ran.
struct VisibilityProbe {
    group: Arc<Group>,
    seen: Arc<Mutex<Vec<(String, bool)>>>,
}

impl LifecycleListener<Partition> for VisibilityProbe {
    fn on_added(&self, partition: &Partition) -> anyhow::Result<()> {
        let visible = self.group.has_partition(partition.id());
        self.seen.lock().push(("added".to_string(), visible));
        Ok(())
    }

    fn on_removed(&self, partition: &Partition) -> anyhow::Result<()> {
        let visible = self.group.has_partition(partition.id());
        self.seen.lock().push(("removed".to_string(), visible));
        Ok(())
    }
}

// =========================================================================================
// 1. FEATURE TESTS
// =========================================================================================

mod features {
    use super::*;

    #[test]
    fn test_duplicate_partition_is_rejected() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let group = flaky_group(&bus, "orders", "in", Direction::Producer, 0, &ok);

        group.add_partition(flaky_partition(&bus, "orders", "in", "p0", &ok)).unwrap();
        let err = group
            .add_partition(flaky_partition(&bus, "orders", "in", "p0", &ok))
            .unwrap_err();

        assert!(matches!(err, TopologyError::PartitionAlreadyExists { ref partition_id, .. } if partition_id == "p0"));
        assert_eq!(group.partition_count(), 1);
    }

    #[test]
    fn test_add_and_remove_fire_exactly_once_after_mutation() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let group = flaky_group(&bus, "orders", "in", Direction::Producer, 0, &ok);

        let recorder = Recorder::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        bus.partitions.add_listener(Arc::new(recorder.clone()));
        bus.partitions.add_listener(Arc::new(VisibilityProbe {
            group: Arc::clone(&group),
            seen: Arc::clone(&seen),
        }));

        group.add_partition(flaky_partition(&bus, "orders", "in", "p0", &ok)).unwrap();
        group.remove_partition("p0").unwrap();

        assert_eq!(recorder.count("added:partition:p0"), 1);
        assert_eq!(recorder.count("removed:partition:p0"), 1);
        assert_eq!(
            *seen.lock(),
            vec![("added".to_string(), true), ("removed".to_string(), false)]
        );
    }

    #[test]
    fn test_failed_add_fires_nothing() {
        let bus = EventBus::shared();
        let fail = Switch::new();
        let group = flaky_group(&bus, "orders", "in", Direction::Producer, 0, &fail);
        let recorder = Recorder::new();
        bus.partitions.add_listener(Arc::new(recorder.clone()));

        fail.trip();
        let err = group.add_partition(flaky_partition(&bus, "orders", "in", "p0", &fail));

        assert!(matches!(err, Err(TopologyError::Protocol(_))));
        assert_eq!(group.partition_count(), 0);
        assert_eq!(recorder.count("added:partition:p0"), 0);
    }

    #[test]
    fn test_failing_listener_does_not_abort_mutation() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let group = flaky_group(&bus, "orders", "in", Direction::Producer, 0, &ok);

        let recorder = Recorder::new();
        bus.partitions.add_listener(Arc::new(FailingListener));
        bus.partitions.add_listener(Arc::new(recorder.clone()));

        group.add_partition(flaky_partition(&bus, "orders", "in", "p0", &ok)).unwrap();

        assert!(group.has_partition("p0"));
        assert_eq!(recorder.count("added:partition:p0"), 1);
    }

    #[test]
    fn test_removed_listener_is_not_called() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let group = flaky_group(&bus, "orders", "in", Direction::Producer, 0, &ok);
        let recorder = Recorder::new();
        let id = bus.partitions.add_listener(Arc::new(recorder.clone()));

        assert!(bus.partitions.remove_listener(id));
        assert!(!bus.partitions.remove_listener(id));
        group.add_partition(flaky_partition(&bus, "orders", "in", "p0", &ok)).unwrap();

        assert!(recorder.lines().is_empty());
    }

    #[test]
    fn test_partition_state_progression() {
        let bus = EventBus::shared();
        let fail = Switch::new();
        let partition = flaky_partition(&bus, "orders", "in", "p0", &fail);
        assert_eq!(partition.state(), PartitionState::Nonexistent);

        partition.setup().unwrap();
        assert_eq!(partition.state(), PartitionState::Active);

        fail.trip();
        let err = partition.verify().unwrap_err();
        assert_eq!(partition.state(), PartitionState::InError);
        // The driver's own message reaches the caller untouched.
        assert_eq!(err.to_string(), "flaky transport refused verify of orders/in/p0");
        assert!(partition.transition().reason.contains("verify failed"));

        fail.reset();
        partition.verify().unwrap();
        assert_eq!(partition.state(), PartitionState::Active);
    }

    #[test]
    fn test_state_events_only_on_real_changes() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let recorder = Recorder::new();
        bus.partitions.add_listener(Arc::new(recorder.clone()));

        let partition = flaky_partition(&bus, "orders", "in", "p0", &ok);
        partition.setup().unwrap();
        partition.verify().unwrap();
        partition.verify().unwrap();

        assert_eq!(
            recorder.lines(),
            vec![
                "state:partition:p0:NONEXISTENT->ACTIVATING".to_string(),
                "state:partition:p0:ACTIVATING->ACTIVE".to_string(),
            ]
        );
    }

    #[test]
    fn test_deactivate_and_cleanup_states() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let partition = flaky_partition(&bus, "orders", "in", "p0", &ok);

        partition.setup().unwrap();
        partition.deactivate().unwrap();
        assert_eq!(partition.state(), PartitionState::Inactive);
        partition.activate().unwrap();
        assert_eq!(partition.state(), PartitionState::Active);
        partition.cleanup().unwrap();
        assert_eq!(partition.state(), PartitionState::Nonexistent);
    }

    #[test]
    fn test_group_ids_are_unique_across_directions() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let topic = Topic::new(Arc::clone(&bus), "orders");

        topic
            .add_group(flaky_group(&bus, "orders", "shared", Direction::Producer, 1, &ok))
            .unwrap();
        let err = topic
            .add_group(flaky_group(&bus, "orders", "shared", Direction::Consumer, 1, &ok))
            .unwrap_err();

        assert!(matches!(
            err,
            TopologyError::GroupAlreadyExists { direction: Direction::Producer, .. }
        ));
        assert!(topic.consumer_groups().is_empty());
    }

    #[test]
    fn test_group_not_exist_names_direction() {
        let topic = Topic::new(EventBus::shared(), "orders");
        let err = topic.consumer_group("audit").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Topic 'orders' does not contain a ConsumerGroup with an id of 'audit'."
        );
    }

    #[test]
    fn test_connector_requires_both_groups() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let topic = Topic::new(Arc::clone(&bus), "orders");
        let producer = topic
            .add_group(flaky_group(&bus, "orders", "in", Direction::Producer, 1, &ok))
            .unwrap();
        // Built but never added to the topic.
        let stray = flaky_group(&bus, "orders", "out", Direction::Consumer, 1, &ok);

        let connector = scripted_connector(&bus, "orders", "bridge", &producer, &stray, ScriptedConnectorDriver::reporting(1, 1));
        let err = topic.add_connector(connector).unwrap_err();

        assert!(matches!(
            err,
            TopologyError::GroupNotExist { direction: Direction::Consumer, ref group_id, .. } if group_id == "out"
        ));
        assert!(topic.connectors().is_empty());
    }

    #[test]
    fn test_connector_rejects_swapped_directions() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let producer = flaky_group(&bus, "orders", "in", Direction::Producer, 1, &ok);
        let consumer = flaky_group(&bus, "orders", "out", Direction::Consumer, 1, &ok);

        let result = routeplane::topology::Connector::new(
            Arc::clone(&bus),
            "orders",
            "bridge",
            consumer,
            producer,
            Box::new(ScriptedConnectorDriver::reporting(1, 1)),
        );
        assert!(matches!(result, Err(TopologyError::GroupNotExist { direction: Direction::Producer, .. })));
    }

    #[test]
    fn test_referenced_group_cannot_be_removed() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let topic = flaky_topic(&bus, "orders", &ok);
        topic.setup().unwrap();
        let connector = scripted_connector(
            &bus,
            "orders",
            "bridge",
            &topic.producer_group("in").unwrap(),
            &topic.consumer_group("out").unwrap(),
            ScriptedConnectorDriver::reporting(1, 1),
        );
        topic.add_connector(connector).unwrap();

        let err = topic.remove_group(Direction::Producer, "in").unwrap_err();
        assert!(matches!(err, TopologyError::GroupInUse { ref connector_id, .. } if connector_id == "bridge"));

        topic.remove_connector("bridge").unwrap();
        topic.remove_group(Direction::Producer, "in").unwrap();
        assert!(topic.producer_groups().is_empty());
    }

    #[test]
    fn test_connector_link_outcomes() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let producer = flaky_group(&bus, "orders", "in", Direction::Producer, 2, &ok);
        let consumer = flaky_group(&bus, "orders", "out", Direction::Consumer, 2, &ok);
        let driver = ScriptedConnectorDriver::reporting(4, 4);
        let connector = scripted_connector(&bus, "orders", "bridge", &producer, &consumer, driver.clone());

        connector.setup().unwrap();
        assert_eq!(connector.state(), ConnectorState::Active);

        driver.set_report(1, 4);
        connector.verify().unwrap();
        assert_eq!(connector.state(), ConnectorState::PartiallyActive);

        driver.set_report(0, 4);
        let err = connector.verify().unwrap_err();
        assert!(matches!(err, TopologyError::ConnectorUnreachable { total: 4, .. }));
        assert_eq!(connector.state(), ConnectorState::InError);

        driver.set_report(0, 0);
        connector.activate().unwrap();
        assert_eq!(connector.state(), ConnectorState::Active);

        driver.fail.trip();
        assert!(matches!(connector.verify(), Err(TopologyError::Protocol(_))));
        assert_eq!(connector.state(), ConnectorState::InError);

        connector.cleanup().unwrap();
        assert_eq!(connector.state(), ConnectorState::Nonexistent);
    }

    #[test]
    fn test_topic_cleanup_order() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let topic = flaky_topic(&bus, "orders", &ok);
        topic.setup().unwrap();
        let connector = scripted_connector(
            &bus,
            "orders",
            "bridge",
            &topic.producer_group("in").unwrap(),
            &topic.consumer_group("out").unwrap(),
            ScriptedConnectorDriver::reporting(1, 1),
        );
        topic.add_connector(connector).unwrap();

        let recorder = Recorder::new();
        bus.groups.add_listener(Arc::new(recorder.clone()));
        bus.connectors.add_listener(Arc::new(recorder.clone()));

        topic.cleanup().unwrap();

        assert_eq!(
            recorder.lines(),
            vec![
                "removed:connector:bridge".to_string(),
                "removed:group:in".to_string(),
                "removed:group:out".to_string(),
            ]
        );
        assert!(topic.producer_groups().is_empty());
        assert!(topic.consumer_groups().is_empty());
    }

    #[test]
    fn test_cleanup_admits_no_group_between_phases() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let topic = flaky_topic(&bus, "orders", &ok);
        topic.setup().unwrap();

        std::thread::scope(|scope| {
            let adder = scope.spawn(|| {
                for n in 0..500 {
                    let group = flaky_group(&bus, "orders", &format!("late-{}", n), Direction::Producer, 1, &ok);
                    match topic.add_group(group) {
                        Ok(_) | Err(TopologyError::TopicNotExist { .. }) => {}
                        Err(e) => panic!("unexpected error: {}", e),
                    }
                }
            });
            topic.cleanup().unwrap();
            adder.join().unwrap();
        });

        // Whatever landed before the cleanup was removed by it; nothing after.
        assert!(topic.is_retired());
        assert!(topic.producer_groups().is_empty());
        assert!(topic.consumer_groups().is_empty());
    }

    #[test]
    fn test_retired_topic_reopens_on_setup() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let topic = flaky_topic(&bus, "orders", &ok);
        topic.setup().unwrap();
        topic.cleanup().unwrap();

        let err = topic
            .add_group(flaky_group(&bus, "orders", "late", Direction::Producer, 1, &ok))
            .unwrap_err();
        assert!(matches!(err, TopologyError::TopicNotExist { .. }));

        topic.setup().unwrap();
        assert!(!topic.is_retired());
        topic
            .add_group(flaky_group(&bus, "orders", "late", Direction::Producer, 1, &ok))
            .unwrap();
    }

    #[test]
    fn test_failed_partition_teardown_blocks_removal() {
        let bus = EventBus::shared();
        let fail = Switch::new();
        let group = flaky_group(&bus, "orders", "in", Direction::Producer, 0, &fail);
        let partition = group.add_partition(flaky_partition(&bus, "orders", "in", "p0", &fail)).unwrap();
        let recorder = Recorder::new();
        bus.partitions.add_listener(Arc::new(recorder.clone()));

        fail.trip_teardown();
        let err = group.remove_partition("p0").unwrap_err();

        assert_eq!(err.to_string(), "flaky transport refused teardown of orders/in/p0");
        assert!(group.has_partition("p0"));
        assert_eq!(partition.state(), PartitionState::InError);
        assert_eq!(recorder.count("removed:partition:p0"), 0);

        fail.reset();
        group.remove_partition("p0").unwrap();
        assert!(!group.has_partition("p0"));
        assert_eq!(recorder.count("removed:partition:p0"), 1);
    }

    #[test]
    fn test_failed_connector_teardown_blocks_removal() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let topic = flaky_topic(&bus, "orders", &ok);
        topic.setup().unwrap();
        let driver = ScriptedConnectorDriver::reporting(1, 1);
        let connector = scripted_connector(
            &bus,
            "orders",
            "bridge",
            &topic.producer_group("in").unwrap(),
            &topic.consumer_group("out").unwrap(),
            driver.clone(),
        );
        topic.add_connector(connector).unwrap();
        let recorder = Recorder::new();
        bus.connectors.add_listener(Arc::new(recorder.clone()));

        driver.fail.trip_teardown();
        assert!(matches!(topic.remove_connector("bridge"), Err(TopologyError::Protocol(_))));

        let connector = topic.connector("bridge").unwrap();
        assert_eq!(connector.state(), ConnectorState::InError);
        assert_eq!(recorder.count("removed:connector:bridge"), 0);
        // Still referenced, so its groups stay pinned.
        assert!(matches!(
            topic.remove_group(Direction::Producer, "in"),
            Err(TopologyError::GroupInUse { .. })
        ));

        // A failed topic cleanup stops at the connector and leaves the topic open.
        assert!(topic.cleanup().is_err());
        assert!(!topic.is_retired());
        assert_eq!(topic.producer_groups().len(), 1);
    }

    #[test]
    fn test_route_filter_respects_acl() {
        let bus = EventBus::shared();
        let ok = Switch::new();
        let topic = flaky_topic(&bus, "orders", &ok);
        topic.setup().unwrap();
        topic.set_acl(Some(
            AccessControlList::new().with_rule("route", AccessRule::denying(["mallory"])),
        ));

        let err = topic
            .filter(&RouteRequirements::new("orders").with_actor("mallory"))
            .unwrap_err();
        assert!(matches!(err, TopologyError::AccessDenied { ref actor, .. } if actor == "mallory"));

        let routes = topic
            .filter(&RouteRequirements::new("orders").with_actor("alice"))
            .unwrap();
        assert_eq!(routes.producers.len(), 1);
        assert_eq!(routes.consumers.len(), 1);
        assert_eq!(routes.partition_count(), 2);
    }

    #[test]
    fn test_route_filter_skips_broken_partitions() {
        let bus = EventBus::shared();
        let fail = Switch::new();
        let topic = flaky_topic(&bus, "orders", &fail);
        topic.setup().unwrap();

        fail.trip();
        let producer = topic.producer_group("in").unwrap();
        assert!(producer.verify().is_err());

        let routes = topic.filter(&RouteRequirements::new("orders")).unwrap();
        assert!(routes.producers.is_empty());
        assert_eq!(routes.consumers.len(), 1);
    }

    #[test]
    fn test_topic_equality_ignores_runtime_state() {
        let ok = Switch::new();
        let left = flaky_topic(&EventBus::shared(), "orders", &ok);
        let right = flaky_topic(&EventBus::shared(), "orders", &ok);
        left.setup().unwrap();

        assert_eq!(*left, *right);
        right.set_description(Some("changed".to_string()));
        assert_ne!(*left, *right);
    }
}
