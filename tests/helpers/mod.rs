#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::bail;
use parking_lot::Mutex;
use routeplane::config::FactoryConfig;
use routeplane::events::{EventBus, LifecycleListener};
use routeplane::persistence::PersistenceManager;
use routeplane::snapshot::{FileSystemSnapshotStore, JsonSnapshotSerializer};
use routeplane::topology::{
    Connector, ConnectorDriver, Direction, Group, GroupDriver, LinkReport, Partition, PartitionDriver,
    PartitionKey, PartitionState, RouteRequirements, Topic,
};
use routeplane::Engine;
use tempfile::TempDir;

pub const STALE_MS: i64 = 30 * 60 * 1000;

// ==========================================
// ENGINES
// ==========================================

pub fn setup_engine() -> (Engine, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&temp_dir, Arc::new(PersistenceManager::in_memory()), STALE_MS);
    (engine, temp_dir)
}

pub fn setup_engine_with_threshold(stale_threshold_ms: i64) -> (Engine, TempDir) {
    let temp_dir = tempfile::tempdir().unwrap();
    let engine = engine_in(&temp_dir, Arc::new(PersistenceManager::in_memory()), stale_threshold_ms);
    (engine, temp_dir)
}

/// Engine over a SQLite file inside `dir`, so a second call warm-starts.
pub fn sqlite_engine(dir: &TempDir) -> Engine {
    let persistence = PersistenceManager::sqlite(dir.path().join("topology.db")).unwrap();
    engine_in(dir, Arc::new(persistence), STALE_MS)
}

pub fn engine_in(dir: &TempDir, persistence: Arc<PersistenceManager>, stale_threshold_ms: i64) -> Engine {
    let store = FileSystemSnapshotStore::new(
        dir.path().join("snapshots"),
        Box::new(JsonSnapshotSerializer::new()),
    )
    .unwrap();
    Engine::with_parts(persistence, Box::new(store), FactoryConfig::default(), stale_threshold_ms).unwrap()
}

// ==========================================
// SWITCHABLE DRIVERS
// ==========================================

/// Two independent fault flags: one for every operation except teardown,
/// one for teardown alone.
#[derive(Clone, Default)]
pub struct Switch {
    refuse: Arc<AtomicBool>,
    refuse_teardown: Arc<AtomicBool>,
}

impl Switch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trip(&self) {
        self.refuse.store(true, Ordering::SeqCst);
    }

    pub fn trip_teardown(&self) {
        self.refuse_teardown.store(true, Ordering::SeqCst);
    }

    /// Clears both flags.
    pub fn reset(&self) {
        self.refuse.store(false, Ordering::SeqCst);
        self.refuse_teardown.store(false, Ordering::SeqCst);
    }

    pub fn is_tripped(&self) -> bool {
        self.refuse.load(Ordering::SeqCst)
    }

    pub fn is_teardown_tripped(&self) -> bool {
        self.refuse_teardown.load(Ordering::SeqCst)
    }
}

/// Fails operations while its switch is tripped; teardown has its own flag.
pub struct FlakyPartitionDriver {
    pub fail: Switch,
}

impl FlakyPartitionDriver {
    fn check(&self, operation: &str, partition: &PartitionKey) -> anyhow::Result<()> {
        if self.fail.is_tripped() {
            bail!("flaky transport refused {} of {}", operation, partition);
        }
        Ok(())
    }
}

impl PartitionDriver for FlakyPartitionDriver {
    fn kind(&self) -> &str {
        "flaky"
    }

    fn provision(&self, partition: &PartitionKey) -> anyhow::Result<()> {
        self.check("provision", partition)
    }

    fn activate(&self, partition: &PartitionKey) -> anyhow::Result<()> {
        self.check("activate", partition)
    }

    fn deactivate(&self, partition: &PartitionKey) -> anyhow::Result<()> {
        self.check("deactivate", partition)
    }

    fn verify(&self, partition: &PartitionKey) -> anyhow::Result<()> {
        self.check("verify", partition)
    }

    fn teardown(&self, partition: &PartitionKey) -> anyhow::Result<()> {
        if self.fail.is_teardown_tripped() {
            bail!("flaky transport refused teardown of {}", partition);
        }
        Ok(())
    }
}

/// Returns every ACTIVE partition.
pub struct PassThroughGroupDriver;

impl GroupDriver for PassThroughGroupDriver {
    fn kind(&self) -> &str {
        "passthrough"
    }

    fn filter(&self, partitions: Vec<Arc<Partition>>, _requirements: &RouteRequirements) -> Vec<Arc<Partition>> {
        partitions
            .into_iter()
            .filter(|p| p.state() == PartitionState::Active)
            .collect()
    }
}

/// Reports whatever link outcome the test scripts.
#[derive(Clone)]
pub struct ScriptedConnectorDriver {
    pub report: Arc<Mutex<LinkReport>>,
    pub fail: Switch,
}

impl ScriptedConnectorDriver {
    pub fn reporting(reachable: usize, total: usize) -> Self {
        Self {
            report: Arc::new(Mutex::new(LinkReport::new(reachable, total))),
            fail: Switch::new(),
        }
    }

    pub fn set_report(&self, reachable: usize, total: usize) {
        *self.report.lock() = LinkReport::new(reachable, total);
    }
}

impl ConnectorDriver for ScriptedConnectorDriver {
    fn kind(&self) -> &str {
        "scripted"
    }

    fn link(&self, _producer: &Group, _consumer: &Group) -> anyhow::Result<LinkReport> {
        if self.fail.is_tripped() {
            bail!("scripted link failure");
        }
        Ok(*self.report.lock())
    }

    fn verify(&self, producer: &Group, consumer: &Group) -> anyhow::Result<LinkReport> {
        self.link(producer, consumer)
    }

    fn unlink(&self, _producer: &Group, _consumer: &Group) -> anyhow::Result<()> {
        Ok(())
    }

    fn teardown(&self, _producer: &Group, _consumer: &Group) -> anyhow::Result<()> {
        if self.fail.is_teardown_tripped() {
            bail!("scripted teardown failure");
        }
        Ok(())
    }
}

// ==========================================
// BUILDERS
// ==========================================

pub fn flaky_partition(bus: &Arc<EventBus>, topic_id: &str, group_id: &str, id: &str, fail: &Switch) -> Arc<Partition> {
    let driver = FlakyPartitionDriver { fail: fail.clone() };
    Arc::new(Partition::new(
        Arc::clone(bus),
        PartitionKey::new(topic_id, group_id, id),
        Box::new(driver),
    ))
}

/// Group holding `partitions` flaky partitions, attached but not provisioned.
pub fn flaky_group(
    bus: &Arc<EventBus>,
    topic_id: &str,
    group_id: &str,
    direction: Direction,
    partitions: usize,
    fail: &Switch,
) -> Arc<Group> {
    let group = Group::new(Arc::clone(bus), topic_id, group_id, direction, Box::new(PassThroughGroupDriver));
    for n in 0..partitions {
        group
            .attach_partition(flaky_partition(bus, topic_id, group_id, &format!("p{}", n), fail))
            .unwrap();
    }
    Arc::new(group)
}

pub fn scripted_connector(
    bus: &Arc<EventBus>,
    topic_id: &str,
    id: &str,
    producer: &Arc<Group>,
    consumer: &Arc<Group>,
    driver: ScriptedConnectorDriver,
) -> Arc<Connector> {
    Arc::new(
        Connector::new(
            Arc::clone(bus),
            topic_id,
            id,
            Arc::clone(producer),
            Arc::clone(consumer),
            Box::new(driver),
        )
        .unwrap(),
    )
}

/// Topic with one producer and one consumer flaky group, not registered.
pub fn flaky_topic(bus: &Arc<EventBus>, topic_id: &str, fail: &Switch) -> Arc<Topic> {
    let topic = Topic::new(Arc::clone(bus), topic_id);
    topic
        .attach_group(flaky_group(bus, topic_id, "in", Direction::Producer, 1, fail))
        .unwrap();
    topic
        .attach_group(flaky_group(bus, topic_id, "out", Direction::Consumer, 1, fail))
        .unwrap();
    Arc::new(topic)
}

// ==========================================
// LISTENERS
// ==========================================

/// Appends `<event>:<id>` lines to a shared log.
#[derive(Clone, Default)]
pub struct Recorder {
    pub log: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, line: String) {
        self.log.lock().push(line);
    }

    pub fn lines(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn count(&self, line: &str) -> usize {
        self.log.lock().iter().filter(|l| l.as_str() == line).count()
    }
}

impl LifecycleListener<Topic> for Recorder {
    fn on_added(&self, topic: &Topic) -> anyhow::Result<()> {
        self.push(format!("added:topic:{}", topic.id()));
        Ok(())
    }

    fn on_removed(&self, topic: &Topic) -> anyhow::Result<()> {
        self.push(format!("removed:topic:{}", topic.id()));
        Ok(())
    }
}

impl LifecycleListener<Group> for Recorder {
    fn on_added(&self, group: &Group) -> anyhow::Result<()> {
        self.push(format!("added:group:{}", group.id()));
        Ok(())
    }

    fn on_removed(&self, group: &Group) -> anyhow::Result<()> {
        self.push(format!("removed:group:{}", group.id()));
        Ok(())
    }
}

impl LifecycleListener<Connector> for Recorder {
    fn on_added(&self, connector: &Connector) -> anyhow::Result<()> {
        self.push(format!("added:connector:{}", connector.id()));
        Ok(())
    }

    fn on_removed(&self, connector: &Connector) -> anyhow::Result<()> {
        self.push(format!("removed:connector:{}", connector.id()));
        Ok(())
    }
}

impl LifecycleListener<Partition> for Recorder {
    fn on_added(&self, partition: &Partition) -> anyhow::Result<()> {
        self.push(format!("added:partition:{}", partition.id()));
        Ok(())
    }

    fn on_removed(&self, partition: &Partition) -> anyhow::Result<()> {
        self.push(format!("removed:partition:{}", partition.id()));
        Ok(())
    }

    fn on_state_change(
        &self,
        partition: &Partition,
        from: PartitionState,
        to: PartitionState,
        _reason: &str,
    ) -> anyhow::Result<()> {
        self.push(format!("state:partition:{}:{}->{}", partition.id(), from, to));
        Ok(())
    }
}

/// Fails on every hook it implements.
pub struct FailingListener;

impl LifecycleListener<Partition> for FailingListener {
    fn on_added(&self, partition: &Partition) -> anyhow::Result<()> {
        bail!("listener refused partition {}", partition.id())
    }

    fn on_removed(&self, partition: &Partition) -> anyhow::Result<()> {
        bail!("listener refused removal of {}", partition.id())
    }
}

// ==========================================
// BENCHMARK
// ==========================================

pub struct Benchmark {
    pub name: String,
    pub start: Instant,
    pub count: usize,
    pub samples: Vec<Duration>,
}

impl Benchmark {
    pub fn start(name: &str, count: usize) -> Self {
        Self {
            name: name.to_string(),
            start: Instant::now(),
            count,
            samples: Vec::with_capacity(count),
        }
    }

    pub fn record(&mut self, duration: Duration) {
        self.samples.push(duration);
    }

    pub fn stop(mut self) {
        let total = self.start.elapsed();
        let ops_sec = self.count as f64 / total.as_secs_f64();

        self.samples.sort();
        let len = self.samples.len();
        let p50 = self.samples.get(len * 50 / 100).unwrap_or(&Duration::ZERO).as_micros();
        let p99 = self.samples.get(len * 99 / 100).unwrap_or(&Duration::ZERO).as_micros();
        let max = self.samples.last().unwrap_or(&Duration::ZERO).as_micros();

        println!("\n{}", self.name);
        println!(" Throughput:   {:.0} ops/sec", ops_sec);
        println!(" Total Time:   {:.2?}", total);
        println!(" Latency (us): p50: {} | p99: {} | MAX: {}", p50, p99, max);
        println!(" Count:        {}\n", self.count);
    }
}
