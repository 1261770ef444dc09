use std::env;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

// --- CONFIG AGGREGATOR ---

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub persistence: PersistenceConfig,
    pub snapshot: SnapshotConfig,
    pub factory: FactoryConfig,
}

impl Config {
    pub fn global() -> &'static Config {
        CONFIG.get_or_init(Self::load)
    }

    fn load() -> Self {
        dotenv::dotenv().ok();
        Self {
            server: ServerConfig::load(),
            persistence: PersistenceConfig::load(),
            snapshot: SnapshotConfig::load(),
            factory: FactoryConfig::load(),
        }
    }
}

// --- MODULES ---

// SERVER
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub log_level: String,
}

impl ServerConfig {
    fn load() -> Self {
        Self {
            log_level: get_env("ROUTEPLANE_LOG", "info"),
        }
    }
}

// PERSISTENCE
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceBackend {
    Memory,
    Sqlite,
}

impl std::str::FromStr for PersistenceBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(PersistenceBackend::Memory),
            "sqlite" => Ok(PersistenceBackend::Sqlite),
            other => Err(format!("unknown persistence backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    pub backend: PersistenceBackend,
    pub sqlite_path: String,
}

impl PersistenceConfig {
    fn load() -> Self {
        Self {
            backend:     get_env("ROUTEPLANE_PERSISTENCE", "sqlite"),
            sqlite_path: get_env("ROUTEPLANE_SQLITE_PATH", "./data/topology.db"),
        }
    }
}

// SNAPSHOT
#[derive(Debug, Clone)]
pub struct SnapshotConfig {
    pub directory: String,
    pub stale_threshold_ms: i64,
    pub health_interval_secs: u64,
    /// 0 disables periodic export.
    pub export_interval_secs: u64,
    pub export_on_shutdown: bool,
}

impl SnapshotConfig {
    fn load() -> Self {
        Self {
            directory:            get_env("ROUTEPLANE_SNAPSHOT_DIR", "./data/snapshots"),
            stale_threshold_ms:   get_env("ROUTEPLANE_SNAPSHOT_STALE_MS", "1800000"), // 30 minutes
            health_interval_secs: get_env("ROUTEPLANE_HEALTH_INTERVAL_SECS", "60"),
            export_interval_secs: get_env("ROUTEPLANE_SNAPSHOT_EXPORT_SECS", "0"),
            export_on_shutdown:   get_env("ROUTEPLANE_SNAPSHOT_ON_SHUTDOWN", "true"),
        }
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directory: "./data/snapshots".to_string(),
            stale_threshold_ms: 30 * 60 * 1000,
            health_interval_secs: 60,
            export_interval_secs: 0,
            export_on_shutdown: true,
        }
    }
}

// FACTORY
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    pub default_protocol: String,
    pub default_partitions: usize,
}

impl FactoryConfig {
    fn load() -> Self {
        Self {
            default_protocol:   get_env("ROUTEPLANE_DEFAULT_PROTOCOL", "local"),
            default_partitions: get_env("ROUTEPLANE_DEFAULT_PARTITIONS", "1"),
        }
    }
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            default_protocol: "local".to_string(),
            default_partitions: 1,
        }
    }
}

// --- PRIVATE HELPER ---

fn get_env<T: std::str::FromStr>(key: &str, default: &str) -> T
where
    T::Err: std::fmt::Debug,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    match raw.parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("[Config] {} has an invalid value '{}' ({:?}), using '{}'", key, raw, e, default);
            default
                .parse()
                .unwrap_or_else(|e| panic!("Config error: default for {} must be valid: {:?}", key, e))
        }
    }
}
