use crate::error::Result;
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::thread;

const SCHEMA_VERSION: i32 = 1;

/// Persistent home of the frame counting policy switch.
pub trait SettingsStore: Send + Sync {
    fn read_bool(&self, key: &str) -> Option<bool>;
    fn write_bool(&self, key: &str, value: bool) -> Result<()>;
}

/// Volatile store, for tests and hosts that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, bool>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(key: &str, value: bool) -> Self {
        let store = Self::default();
        store.values.write().insert(key.to_string(), value);
        store
    }
}

impl SettingsStore for MemorySettings {
    fn read_bool(&self, key: &str) -> Option<bool> {
        self.values.read().get(key).copied()
    }

    fn write_bool(&self, key: &str, value: bool) -> Result<()> {
        self.values.write().insert(key.to_string(), value);
        Ok(())
    }
}

enum WriteCommand {
    Update(String, bool),
    Shutdown,
}

/// Key-value settings in SQLite with an in-memory cache.
///
/// Reads are served from the cache. Writes update the cache immediately and
/// are queued to a worker thread so the render loop never waits on disk.
pub struct SqliteSettings {
    cache: RwLock<HashMap<String, bool>>,
    write_sender: Sender<WriteCommand>,
    write_thread: Option<thread::JoinHandle<()>>,
}

impl SqliteSettings {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        Self::init_database(&conn)?;
        let cache = RwLock::new(Self::load_cache(&conn)?);
        drop(conn);

        let (write_sender, write_receiver): (Sender<WriteCommand>, Receiver<WriteCommand>) = unbounded();
        let write_thread = thread::Builder::new()
            .name("framesync-settings".to_string())
            .spawn(move || Self::write_worker(db_path, write_receiver))?;

        Ok(Self {
            cache,
            write_sender,
            write_thread: Some(write_thread),
        })
    }

    fn init_database(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;

        let current_version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .ok();
        if current_version.is_none() {
            conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![SCHEMA_VERSION],
            )?;
        }

        Ok(())
    }

    fn load_cache(conn: &Connection) -> Result<HashMap<String, bool>> {
        let mut stmt = conn.prepare("SELECT key, value FROM settings")?;
        let rows = stmt.query_map([], |row| {
            let key: String = row.get(0)?;
            let value: i64 = row.get(1)?;
            Ok((key, value == 1))
        })?;

        let mut cache = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            cache.insert(key, value);
        }
        Ok(cache)
    }

    fn write_worker(db_path: PathBuf, receiver: Receiver<WriteCommand>) {
        let conn = match Connection::open(&db_path) {
            Ok(c) => c,
            Err(e) => {
                crate::log_error!("Failed to open settings database in write worker: {}", e);
                return;
            }
        };

        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");

        while let Ok(cmd) = receiver.recv() {
            match cmd {
                WriteCommand::Update(key, value) => {
                    let now = chrono::Utc::now().timestamp();
                    if let Err(e) = conn.execute(
                        "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
                        params![key, value as i64, now],
                    ) {
                        crate::log_error!("Failed to write setting {}: {}", key, e);
                    }
                }
                WriteCommand::Shutdown => break,
            }
        }

        let _ = conn.pragma_update(None, "wal_checkpoint", "TRUNCATE");
    }
}

impl SettingsStore for SqliteSettings {
    fn read_bool(&self, key: &str) -> Option<bool> {
        self.cache.read().get(key).copied()
    }

    fn write_bool(&self, key: &str, value: bool) -> Result<()> {
        self.cache.write().insert(key.to_string(), value);
        self.write_sender
            .send(WriteCommand::Update(key.to_string(), value))
            .map_err(|e| crate::SyncError::Settings(format!("write worker gone: {}", e)))
    }
}

impl Drop for SqliteSettings {
    fn drop(&mut self) {
        let _ = self.write_sender.send(WriteCommand::Shutdown);
        // Pending writes must be on disk before the next process reads the policy
        if let Some(handle) = self.write_thread.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_reads_back_writes() {
        let store = MemorySettings::new();
        assert_eq!(store.read_bool("Framecount"), None);
        store.write_bool("Framecount", true).unwrap();
        assert_eq!(store.read_bool("Framecount"), Some(true));
    }

    #[test]
    fn sqlite_store_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.db");

        {
            let store = SqliteSettings::open(&path).unwrap();
            assert_eq!(store.read_bool("Framecount"), None);
            store.write_bool("Framecount", true).unwrap();
            // cache answers before the worker has written anything
            assert_eq!(store.read_bool("Framecount"), Some(true));
        }

        let store = SqliteSettings::open(&path).unwrap();
        assert_eq!(store.read_bool("Framecount"), Some(true));

        store.write_bool("Framecount", false).unwrap();
        drop(store);
        let store = SqliteSettings::open(&path).unwrap();
        assert_eq!(store.read_bool("Framecount"), Some(false));
    }
}
