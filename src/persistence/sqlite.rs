use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use crate::errors::PersistenceError;
use crate::persistence::persister::{not_found, StatePersister};
use crate::persistence::types::{
    DehydratedConnector, DehydratedGroup, DehydratedPartition, DehydratedTopic, StateRecord,
};
use crate::utils::current_time_ms;

/// One connection shared by the four per-kind persisters.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(e) = std::fs::create_dir_all(parent) {
                    tracing::warn!("[Persistence] Cannot create {:?}: {}", parent, e);
                }
            }
        }
        let conn = Connection::open(path)?;
        init_db(&conn)?;
        tracing::info!("[Persistence] SQLite store ready at {:?}", path);
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn persister<S: StateRecord>(&self) -> SqlitePersister<S> {
        SqlitePersister {
            store: self.clone(),
            table: table_name(S::KIND),
            _kind: PhantomData,
        }
    }
}

fn table_name(kind: &str) -> String {
    format!("{}_states", kind)
}

pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA temp_store = MEMORY;",
    )?;

    for kind in [
        DehydratedTopic::KIND,
        DehydratedGroup::KIND,
        DehydratedPartition::KIND,
        DehydratedConnector::KIND,
    ] {
        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY,
                    body TEXT NOT NULL,
                    updated_at INTEGER NOT NULL
                )",
                table_name(kind)
            ),
            [],
        )?;
    }

    Ok(())
}

// ==========================================
// PERSISTER
// ==========================================

/// Stores each record as a JSON body keyed by its record key.
pub struct SqlitePersister<S> {
    store: SqliteStore,
    table: String,
    _kind: PhantomData<fn() -> S>,
}

impl<S: StateRecord> StatePersister<S> for SqlitePersister<S> {
    fn save(&self, state: &S) -> Result<(), PersistenceError> {
        let body = serde_json::to_string(state)?;
        let conn = self.store.conn.lock();
        conn.execute(
            &format!(
                "INSERT INTO {} (id, body, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
                self.table
            ),
            params![state.record_key(), body, current_time_ms()],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<S, PersistenceError> {
        let body: Option<String> = {
            let conn = self.store.conn.lock();
            conn.query_row(
                &format!("SELECT body FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?
        };

        match body {
            Some(body) => Ok(serde_json::from_str(&body)?),
            None => Err(not_found::<S>(id)),
        }
    }

    fn exists(&self, id: &str) -> Result<bool, PersistenceError> {
        let conn = self.store.conn.lock();
        let found: Option<i64> = conn
            .query_row(
                &format!("SELECT 1 FROM {} WHERE id = ?1", self.table),
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn remove(&self, id: &str) -> Result<(), PersistenceError> {
        let conn = self.store.conn.lock();
        let deleted = conn.execute(&format!("DELETE FROM {} WHERE id = ?1", self.table), params![id])?;
        if deleted == 0 {
            return Err(not_found::<S>(id));
        }
        Ok(())
    }

    fn all_ids(&self) -> Result<Vec<String>, PersistenceError> {
        let conn = self.store.conn.lock();
        let mut stmt = conn.prepare(&format!("SELECT id FROM {} ORDER BY id ASC", self.table))?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut ids = Vec::new();
        for id in rows {
            ids.push(id?);
        }
        Ok(ids)
    }
}
