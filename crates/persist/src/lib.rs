//! Corral persistence: SQLite-backed workload storage.
//! Keep code tiny and predictable.

#![forbid(unsafe_code)]

use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use corral_core::{ids, CorralError, CorralResult, Document, WorkloadStore};
use metrics::{counter, histogram};
use rusqlite::OptionalExtension;
use tracing::debug;

/// SQLite-backed store. Simple, synchronous; one row per (kind, short id).
pub struct SqliteStore {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("CORRAL_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS workloads (
                kind TEXT NOT NULL,
                id   TEXT NOT NULL,
                ts   INTEGER NOT NULL,
                body BLOB NOT NULL,
                PRIMARY KEY (kind, id)
            )",
            [],
        )
        .context("creating workloads table")?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> CorralResult<MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| CorralError::Internal("sqlite connection lock poisoned".into()))
    }

    /// Number of stored workloads of `kind`.
    pub fn count(&self, kind: &str) -> CorralResult<usize> {
        let db = self.lock()?;
        let n: i64 = db
            .query_row("SELECT COUNT(*) FROM workloads WHERE kind = ?1", [kind], |row| row.get(0))
            .map_err(CorralError::internal)?;
        Ok(n as usize)
    }

    fn load(db: &rusqlite::Connection, kind: &str, id: &str) -> Result<Option<Document>> {
        let blob: Option<Vec<u8>> = db
            .query_row(
                "SELECT body FROM workloads WHERE kind = ?1 AND id = ?2",
                (kind, id),
                |row| row.get(0),
            )
            .optional()?;
        match blob {
            Some(b) => Ok(Some(serde_json::from_str(&maybe_decompress(&b)).context("decoding stored workload")?)),
            None => Ok(None),
        }
    }

    fn save(db: &rusqlite::Connection, kind: &str, id: &str, data: &Document) -> Result<()> {
        let body = serde_json::to_string(data).context("encoding workload")?;
        db.execute(
            "INSERT OR REPLACE INTO workloads(kind, id, ts, body) VALUES (?1, ?2, ?3, ?4)",
            (kind, id, now_ts(), maybe_compress(&body)),
        )?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl WorkloadStore for SqliteStore {
    async fn create(&self, kind: &str, mut data: Document) -> CorralResult<Document> {
        let started = std::time::Instant::now();
        let name = ids::stamp_created(kind, &mut data)?;
        let db = self.lock()?;
        if Self::load(&db, kind, &name).map_err(CorralError::internal)?.is_some() {
            return Err(CorralError::Conflict(format!("{} already exists", ids::composite_id(kind, &name))));
        }
        Self::save(&db, kind, &name, &data).map_err(CorralError::internal)?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        debug!(kind = %kind, name = %name, "persist: created");
        Ok(data)
    }

    async fn update(&self, kind: &str, id: &str, mut data: Document) -> CorralResult<Document> {
        let started = std::time::Instant::now();
        let key = ids::short_id(id);
        let db = self.lock()?;
        let previous = Self::load(&db, kind, key)
            .map_err(CorralError::internal)?
            .ok_or_else(|| CorralError::NotFound(id.to_string()))?;
        ids::carry_stamps(&previous, &mut data);
        Self::save(&db, kind, key, &data).map_err(CorralError::internal)?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(data)
    }

    async fn by_id(&self, kind: &str, id: &str) -> CorralResult<Document> {
        let started = std::time::Instant::now();
        let db = self.lock()?;
        let found = Self::load(&db, kind, ids::short_id(id)).map_err(CorralError::internal)?;
        histogram!("persist_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        found.ok_or_else(|| CorralError::NotFound(id.to_string()))
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".corral");
        let _ = std::fs::create_dir_all(&p);
        p.push("corral.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "corral.db".to_string()
}

pub fn now_ts() -> i64 {
    // seconds since epoch
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_secs() as i64
}

pub fn maybe_compress(body: &str) -> Vec<u8> {
    #[cfg(feature = "zstd")]
    {
        let lvl: i32 = std::env::var("CORRAL_ZSTD_LEVEL").ok().and_then(|s| s.parse().ok()).unwrap_or(3);
        return zstd::encode_all(body.as_bytes(), lvl).unwrap_or_else(|_| body.as_bytes().to_vec());
    }
    body.as_bytes().to_vec()
}

pub fn maybe_decompress(blob: &[u8]) -> String {
    #[cfg(feature = "zstd")]
    {
        if let Ok(de) = zstd::decode_all(std::io::Cursor::new(blob)) {
            return String::from_utf8_lossy(&de).to_string();
        }
    }
    String::from_utf8_lossy(blob).to_string()
}
