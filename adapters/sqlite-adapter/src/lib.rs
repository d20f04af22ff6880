//! sqlite-adapter — SQLite implementation of the domain storage ports for local/dev.
//!
//! Purpose
//! - Provide a lightweight, file-based store to run the shortener locally
//!   without cloud dependencies.
//! - Implements `CounterStore`, `MappingRepository` and `ClickRepository`
//!   from the `domain` crate.
//!
//! Notes
//! - Uses `rusqlite` with the `bundled` feature for portability.
//! - Stores timestamps as milliseconds since UNIX_EPOCH (i64).
//! - The counter increment is a single upsert statement with `RETURNING`,
//!   so it stays atomic across processes sharing the file.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use domain::{
    ClickEvent, ClickRepository, CoreError, CounterStore, MappingRecord, MappingRepository,
    ShortCode,
};
use rusqlite::{params, Connection, OptionalExtension};

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_millis(3000);

/// SQLite-backed repository for local development.
pub struct SqliteRepo {
    conn: Mutex<Connection>,
}

impl SqliteRepo {
    /// Open (or create) a SQLite database at the given path and ensure schema.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, CoreError> {
        let conn = Connection::open(path).map_err(map_sqerr)?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(map_sqerr)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Construct from env var `DB_PATH` (defaults to `./data/surl.db`).
    pub fn from_env() -> Result<Self, CoreError> {
        let path = std::env::var("DB_PATH").unwrap_or_else(|_| "./data/surl.db".to_string());
        // Ensure directory exists
        if let Some(dir) = Path::new(&path).parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        Self::new(path)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn
            .lock()
            .map_err(|_| CoreError::StoreUnavailable("mutex poisoned".into()))
    }
}

fn init_schema(conn: &Connection) -> Result<(), CoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS mappings (
            short_code TEXT PRIMARY KEY,
            original_url TEXT NOT NULL,
            category TEXT NOT NULL,
            summary TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS counters (
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS click_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            short_code TEXT NOT NULL,
            clicked_at INTEGER NOT NULL,
            category TEXT NOT NULL,
            source_ip TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_click_events_clicked_at ON click_events(clicked_at);
        "#,
    )
    .map_err(map_sqerr)
}

impl CounterStore for SqliteRepo {
    fn atomic_increment(&self, key: &str) -> Result<u64, CoreError> {
        let conn = self.lock()?;
        let val: i64 = conn
            .query_row(
                "INSERT INTO counters(name, value) VALUES (?1, 1)
                 ON CONFLICT(name) DO UPDATE SET value = value + 1
                 RETURNING value",
                params![key],
                |row| row.get(0),
            )
            .map_err(map_sqerr)?;
        u64::try_from(val)
            .map_err(|_| CoreError::ConditionalUpdateFailed(format!("counter {key} is negative")))
    }
}

impl MappingRepository for SqliteRepo {
    fn put_record(&self, record: MappingRecord) -> Result<(), CoreError> {
        let conn = self.lock()?;
        let res = conn.execute(
            "INSERT INTO mappings(short_code, original_url, category, summary, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.short_code.as_str(),
                record.original_url,
                record.category,
                record.summary,
                system_time_to_millis(record.created_at),
            ],
        );
        match res {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(CoreError::AlreadyExists)
            }
            Err(e) => Err(map_sqerr(e)),
        }
    }

    fn get_record(&self, code: &ShortCode) -> Result<Option<MappingRecord>, CoreError> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                "SELECT short_code, original_url, category, summary, created_at FROM mappings WHERE short_code = ?1",
                params![code.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, i64>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(map_sqerr)?;
        let Some((code, original_url, category, summary, created_at)) = row else {
            return Ok(None);
        };
        Ok(Some(MappingRecord {
            short_code: parse_stored_code(code)?,
            original_url,
            category,
            summary,
            created_at: millis_to_system_time(created_at),
        }))
    }
}

impl ClickRepository for SqliteRepo {
    fn record_click(&self, event: ClickEvent) -> Result<(), CoreError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO click_events(short_code, clicked_at, category, source_ip) VALUES (?1, ?2, ?3, ?4)",
            params![
                event.short_code.as_str(),
                system_time_to_millis(event.clicked_at),
                event.category,
                event.source_ip,
            ],
        )
        .map_err(map_sqerr)?;
        Ok(())
    }

    fn clicks_since(&self, since: SystemTime) -> Result<Vec<ClickEvent>, CoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT short_code, clicked_at, category, source_ip FROM click_events WHERE clicked_at > ?1 ORDER BY clicked_at",
            )
            .map_err(map_sqerr)?;
        let rows = stmt
            .query_map(params![system_time_to_millis(since)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(map_sqerr)?;
        let mut res = Vec::new();
        for r in rows {
            let (code, clicked_at, category, source_ip) = r.map_err(map_sqerr)?;
            res.push(ClickEvent {
                short_code: parse_stored_code(code)?,
                clicked_at: millis_to_system_time(clicked_at),
                category,
                source_ip,
            });
        }
        Ok(res)
    }
}

fn parse_stored_code(code: String) -> Result<ShortCode, CoreError> {
    ShortCode::parse(code).map_err(|e| CoreError::StoreUnavailable(format!("bad code in db: {e}")))
}

fn map_sqerr<E: std::fmt::Display>(e: E) -> CoreError {
    CoreError::StoreUnavailable(format!("sqlite error: {e}"))
}

fn system_time_to_millis(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis() as i64
}

fn millis_to_system_time(ms: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(ms.max(0) as u64)
}
