//! Persistence adapters for persona memory.
//!
//! Two backends share the same [`MemoryState`] snapshot:
//!
//! - [`JsonRepository`] writes the three-file directory layout
//!   (`associative_memory/nodes.json`, `embeddings.json`, `kw_strength.json`)
//!   that external tooling reads.
//! - [`PersistenceEngine`] keeps one [`PersonaSnapshot`] per persona in a
//!   SQLite database:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS personas (
//!     persona    TEXT PRIMARY KEY,
//!     data       BLOB NOT NULL,
//!     updated_at TEXT NOT NULL,
//!     checksum   TEXT
//! );
//! ```
//!
//! WAL mode allows concurrent readers, and an optional CRC-32 checksum
//! flags corrupted rows on load.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::Utc;
use rusqlite::{Connection, OpenFlags, params};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::Result;
use crate::memory::{MemoryState, MemoryStore};
use crate::reflection::ReflectionCounters;

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

/// CRC-32 (ISO 3309 / ITU-T V.42).
fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            if crc & 1 == 1 {
                crc = (crc >> 1) ^ POLY;
            } else {
                crc >>= 1;
            }
        }
    }
    !crc
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything needed to resume a persona: its memory and its reflection
/// bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaSnapshot {
    /// Store snapshot.
    pub memory: MemoryState,
    /// Reflection counters.
    #[serde(default)]
    pub counters: ReflectionCounters,
}

impl PersonaSnapshot {
    /// Capture a store and its counters.
    #[must_use]
    pub fn capture(store: &MemoryStore, counters: &ReflectionCounters) -> Self {
        Self {
            memory: store.get_state(),
            counters: counters.clone(),
        }
    }

    /// Rebuild the store and hand back the counters.
    ///
    /// # Errors
    /// Propagates [`MemoryStore::from_state`] failures.
    pub fn restore(self) -> Result<(MemoryStore, ReflectionCounters)> {
        Ok((MemoryStore::from_state(self.memory)?, self.counters))
    }
}

// ---------------------------------------------------------------------------
// JsonRepository
// ---------------------------------------------------------------------------

const MEMORY_DIR: &str = "associative_memory";
const NODES_FILE: &str = "nodes.json";
const EMBEDDINGS_FILE: &str = "embeddings.json";
const KW_STRENGTH_FILE: &str = "kw_strength.json";

/// Directory-backed store snapshot in the three-file layout.
#[derive(Debug, Clone)]
pub struct JsonRepository {
    root: PathBuf,
}

impl JsonRepository {
    /// A repository rooted at a persona's save directory.
    #[must_use]
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// The `associative_memory` directory.
    #[must_use]
    pub fn memory_dir(&self) -> PathBuf {
        self.root.join(MEMORY_DIR)
    }

    /// Write the snapshot, creating directories as needed.
    ///
    /// # Errors
    /// [`crate::ReverieError::Io`] or [`crate::ReverieError::Serialization`].
    pub fn save(&self, state: &MemoryState) -> Result<()> {
        let dir = self.memory_dir();
        fs::create_dir_all(&dir)?;
        fs::write(dir.join(NODES_FILE), serde_json::to_vec_pretty(&state.nodes)?)?;
        fs::write(dir.join(EMBEDDINGS_FILE), serde_json::to_vec(&state.embeddings)?)?;
        fs::write(dir.join(KW_STRENGTH_FILE), serde_json::to_vec_pretty(&state.kw_strength)?)?;
        debug!(dir = %dir.display(), nodes = state.nodes.len(), "Saved memory snapshot");
        Ok(())
    }

    /// Read the snapshot. Missing files load as empty.
    ///
    /// # Errors
    /// [`crate::ReverieError::Io`] for unreadable files and
    /// [`crate::ReverieError::Serialization`] for malformed JSON.
    pub fn load(&self) -> Result<MemoryState> {
        let dir = self.memory_dir();
        let state = MemoryState {
            nodes: read_or_default(&dir.join(NODES_FILE))?,
            embeddings: read_or_default(&dir.join(EMBEDDINGS_FILE))?,
            kw_strength: read_or_default(&dir.join(KW_STRENGTH_FILE))?,
        };
        debug!(dir = %dir.display(), nodes = state.nodes.len(), "Loaded memory snapshot");
        Ok(state)
    }

    /// Load and rebuild a store in one step.
    ///
    /// # Errors
    /// As [`Self::load`] and [`MemoryStore::from_state`].
    pub fn load_store(&self) -> Result<MemoryStore> {
        MemoryStore::from_state(self.load()?)
    }
}

fn read_or_default<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(T::default()),
        Err(e) => Err(e.into()),
    }
}

// ---------------------------------------------------------------------------
// PersistenceEngine
// ---------------------------------------------------------------------------

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS personas (
    persona    TEXT PRIMARY KEY,
    data       BLOB NOT NULL,
    updated_at TEXT NOT NULL,
    checksum   TEXT
);";

/// Handle to an open SQLite database of persona snapshots.
///
/// ```no_run
/// # use reverie_core::persistence::{PersistenceEngine, PersonaSnapshot};
/// # use reverie_core::config::PersistenceConfig;
/// let engine = PersistenceEngine::open("town.db", &PersistenceConfig::default())?;
/// engine.save("Isabella Rodriguez", &PersonaSnapshot::default())?;
/// let loaded = engine.load("Isabella Rodriguez")?;
/// # Ok::<(), reverie_core::ReverieError>(())
/// ```
pub struct PersistenceEngine {
    conn: Connection,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for PersistenceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceEngine")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PersistenceEngine {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    /// [`crate::ReverieError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags =
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Persistence engine opened");

        Ok(Self {
            conn,
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// [`crate::ReverieError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    /// Upsert a persona's snapshot.
    ///
    /// # Errors
    /// Serialization or SQLite failures.
    pub fn save(&self, persona: &str, snapshot: &PersonaSnapshot) -> Result<()> {
        let start = Instant::now();
        let json = serde_json::to_vec(snapshot)?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        let now = Utc::now().to_rfc3339();

        self.conn.execute(
            "INSERT INTO personas (persona, data, updated_at, checksum)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(persona) DO UPDATE SET
                data = excluded.data,
                updated_at = excluded.updated_at,
                checksum = excluded.checksum",
            params![persona, json, now, checksum],
        )?;

        debug!(
            persona,
            records = snapshot.memory.nodes.len(),
            bytes = json.len(),
            elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "Saved persona snapshot"
        );
        Ok(())
    }

    /// Load a persona's snapshot, or `None` if it was never saved.
    ///
    /// A checksum mismatch is logged; the data is still returned.
    ///
    /// # Errors
    /// Serialization or SQLite failures.
    pub fn load(&self, persona: &str) -> Result<Option<PersonaSnapshot>> {
        let start = Instant::now();
        let mut stmt = self
            .conn
            .prepare_cached("SELECT data, checksum FROM personas WHERE persona = ?1")?;
        let row: Option<(Vec<u8>, Option<String>)> = stmt
            .query_row(params![persona], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        let Some((data, stored_checksum)) = row else {
            return Ok(None);
        };

        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(&data);
                if expected != actual {
                    warn!(persona, %expected, %actual, "Checksum mismatch, snapshot may be corrupt");
                }
            }
        }

        let snapshot: PersonaSnapshot = serde_json::from_slice(&data)?;
        debug!(
            persona,
            records = snapshot.memory.nodes.len(),
            elapsed_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX),
            "Loaded persona snapshot"
        );
        Ok(Some(snapshot))
    }

    /// Delete a persona's snapshot. Returns whether a row was removed.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn delete(&self, persona: &str) -> Result<bool> {
        let deleted = self
            .conn
            .execute("DELETE FROM personas WHERE persona = ?1", params![persona])?;
        Ok(deleted > 0)
    }

    /// Names of all saved personas, sorted.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn personas(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare_cached("SELECT persona FROM personas ORDER BY persona")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        Ok(rows.collect::<std::result::Result<Vec<String>, _>>()?)
    }

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&self.conn, &mut dest)?;
        backup.run_to_completion(256, std::time::Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Database backup completed"
        );
        Ok(())
    }

    /// Path of the database file, or `:memory:`.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    /// `PRAGMA integrity_check`; `true` when the database is sound.
    ///
    /// # Errors
    /// SQLite failures.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self.conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }
}

/// Converts `QueryReturnedNoRows` into `Ok(None)`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::NewRecord;
    use crate::types::{Embedding, MemoryKind, SimTime, Triple};
    use chrono::NaiveDate;

    fn t0() -> SimTime {
        NaiveDate::from_ymd_opt(2023, 2, 13)
            .and_then(|d| d.and_hms_opt(8, 0, 0))
            .expect("valid date")
    }

    fn sample_store() -> MemoryStore {
        let mut store = MemoryStore::new();
        let event = store
            .add_event(
                NewRecord::new(t0(), Triple::new("Isabella", "is", "cafe"), "Isabella is opening the cafe")
                    .keywords(["isabella", "cafe"])
                    .poignancy(5)
                    .embedding("opening the cafe", Some(Embedding(vec![0.6, 0.8]))),
            )
            .expect("event")
            .id;
        store
            .add_thought(
                NewRecord::new(t0(), Triple::new("Isabella", "plans", "party"), "Isabella wants a party")
                    .keywords(["party"])
                    .poignancy(7)
                    .evidence(vec![event]),
            )
            .expect("thought");
        store
    }

    fn test_config() -> PersistenceConfig {
        PersistenceConfig {
            checksum_enabled: true,
            ..PersistenceConfig::default()
        }
    }

    #[test]
    fn json_repository_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = JsonRepository::new(dir.path());
        let store = sample_store();
        repo.save(&store.get_state()).expect("save");

        assert!(repo.memory_dir().join("nodes.json").exists());
        let nodes = fs::read_to_string(repo.memory_dir().join("nodes.json")).expect("read");
        assert!(nodes.contains("\"node_1\""));
        assert!(nodes.contains("February 13, 2023, 08:00:00"));

        let restored = repo.load_store().expect("load");
        assert_eq!(restored.get_state(), store.get_state());
        assert_eq!(restored.keyword_strength(MemoryKind::Thought, "party"), 1);
    }

    #[test]
    fn json_repository_missing_files_load_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let repo = JsonRepository::new(dir.path());
        let state = repo.load().expect("load");
        assert!(state.nodes.is_empty() && state.embeddings.is_empty());
    }

    #[test]
    fn engine_round_trip_with_counters() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        let mut counters = ReflectionCounters::new(150);
        counters.record_event(5);
        let snapshot = PersonaSnapshot::capture(&sample_store(), &counters);

        engine.save("Isabella Rodriguez", &snapshot).expect("save");
        let loaded = engine.load("Isabella Rodriguez").expect("load").expect("Some");
        assert_eq!(loaded, snapshot);

        let (store, counters) = loaded.restore().expect("restore");
        assert_eq!(store.len(), 2);
        assert_eq!(counters.importance_trigger_curr, 145);
    }

    #[test]
    fn engine_missing_upsert_and_delete() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        assert!(engine.load("nobody").expect("load").is_none());

        engine.save("Klaus", &PersonaSnapshot::default()).expect("save");
        engine
            .save("Klaus", &PersonaSnapshot::capture(&sample_store(), &ReflectionCounters::default()))
            .expect("overwrite");
        engine.save("Maria", &PersonaSnapshot::default()).expect("save");
        assert_eq!(engine.personas().expect("list"), vec!["Klaus".to_string(), "Maria".to_string()]);

        let loaded = engine.load("Klaus").expect("load").expect("Some");
        assert_eq!(loaded.memory.nodes.len(), 2, "second save wins");

        assert!(engine.delete("Klaus").expect("delete"));
        assert!(!engine.delete("Klaus").expect("delete again"));
    }

    #[test]
    fn checksum_mismatch_still_loads() {
        let engine = PersistenceEngine::open_in_memory(&test_config()).expect("open");
        engine
            .save("Klaus", &PersonaSnapshot::capture(&sample_store(), &ReflectionCounters::default()))
            .expect("save");
        engine
            .conn
            .execute("UPDATE personas SET checksum = 'deadbeef' WHERE persona = ?1", params!["Klaus"])
            .expect("corrupt checksum");
        let loaded = engine.load("Klaus").expect("load").expect("Some");
        assert_eq!(loaded.memory.nodes.len(), 2);
    }

    #[test]
    fn file_backup_and_integrity() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = test_config();
        let engine = PersistenceEngine::open(dir.path().join("town.db"), &config).expect("open");
        engine.save("Klaus", &PersonaSnapshot::default()).expect("save");
        assert!(engine.integrity_check().expect("check"));

        let backup_path = dir.path().join("town_backup.db");
        engine.backup(&backup_path).expect("backup");
        let backup = PersistenceEngine::open(&backup_path, &config).expect("open backup");
        assert!(backup.load("Klaus").expect("load").is_some());
    }

    #[test]
    fn crc32_known_vector() {
        assert_eq!(crc32_compute(b"123456789"), 0xCBF4_3926);
    }
}
