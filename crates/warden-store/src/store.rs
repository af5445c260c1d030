use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use warden_core::{
    ActionRecord, DialogueStage, DialogueTurnRecord, Journal, JournalRecord, NeedsTier, Outcome,
    SessionId, TaskOutcome, TaskRecord, TaskRunRecord, TierRecord, Transaction, WardenError,
};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS actions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        request_id TEXT NOT NULL,
        description TEXT NOT NULL,
        urgent INTEGER NOT NULL,
        outcome TEXT NOT NULL,
        rationale TEXT NOT NULL,
        timestamp TEXT NOT NULL,
        checksum TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS transactions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        amount REAL NOT NULL,
        balance_after REAL NOT NULL,
        request_id TEXT,
        memo TEXT NOT NULL DEFAULT '',
        timestamp TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS dialogue_log (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        session_id TEXT NOT NULL,
        stage TEXT NOT NULL,
        turn_text TEXT NOT NULL,
        timestamp TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS hierarchy_of_needs (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        tier INTEGER NOT NULL,
        entered_at TEXT NOT NULL,
        exited_at TEXT
    );

    CREATE TABLE IF NOT EXISTS tasks (
        name TEXT PRIMARY KEY,
        interval_seconds INTEGER NOT NULL,
        required_tier INTEGER NOT NULL,
        last_run_at TEXT
    );

    CREATE TABLE IF NOT EXISTS task_runs (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        task_name TEXT NOT NULL,
        started_at TEXT NOT NULL,
        ended_at TEXT NOT NULL,
        outcome TEXT NOT NULL
    );

    CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_request
        ON transactions(request_id) WHERE request_id IS NOT NULL;
    CREATE INDEX IF NOT EXISTS idx_actions_request ON actions(request_id);
    CREATE INDEX IF NOT EXISTS idx_dialogue_session ON dialogue_log(session_id);
    CREATE INDEX IF NOT EXISTS idx_task_runs_name ON task_runs(task_name);
";

/// Result of walking the `actions` hash chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainReport {
    pub rows: usize,
    /// `seq` of the first row whose checksum does not match, if any.
    pub broken_at: Option<i64>,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.broken_at.is_none()
    }
}

/// SQLite-backed journal.
///
/// Every `actions` row carries a blake3 checksum chained over the previous
/// row's checksum, so edits or deletions in the audit log are detectable with
/// [`SqliteStore::verify_chain`].
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the database at the given path.
    pub fn open(path: &Path) -> warden_core::Result<Self> {
        info!(?path, "opening journal store");

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).map_err(WardenError::store)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(WardenError::store)?;
        conn.execute_batch(SCHEMA).map_err(WardenError::store)?;

        let store = Self {
            db: Arc::new(Mutex::new(conn)),
        };
        match store.verify_chain() {
            Ok(report) if !report.is_intact() => {
                warn!(broken_at = ?report.broken_at, "audit log hash chain is broken")
            }
            Ok(report) => debug!(rows = report.rows, "audit log hash chain verified"),
            Err(e) => warn!(error = %e, "failed to verify audit log hash chain"),
        }
        Ok(store)
    }

    /// Open an in-memory database (for tests and `--ephemeral` runs).
    pub fn open_in_memory() -> warden_core::Result<Self> {
        Self::open(Path::new(":memory:"))
    }

    /// Walk the `actions` table and recompute every checksum.
    pub fn verify_chain(&self) -> warden_core::Result<ChainReport> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare(
                "SELECT seq, request_id, description, urgent, outcome, rationale, timestamp, checksum
                 FROM actions ORDER BY seq ASC",
            )
            .map_err(WardenError::store)?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, bool>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                    row.get::<_, String>(7)?,
                ))
            })
            .map_err(WardenError::store)?;

        let mut prev = String::new();
        let mut count = 0;
        for row in rows {
            let (seq, request_id, description, urgent, outcome, rationale, timestamp, checksum) =
                row.map_err(WardenError::store)?;
            count += 1;
            let expected = chain_checksum(&prev, &request_id, &description, urgent, &outcome, &rationale, &timestamp);
            if expected != checksum {
                return Ok(ChainReport {
                    rows: count,
                    broken_at: Some(seq),
                });
            }
            prev = checksum;
        }
        Ok(ChainReport {
            rows: count,
            broken_at: None,
        })
    }

    /// Get a reference to the raw database connection (for advanced queries).
    pub fn db(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.db.lock()
    }

    fn append_action(conn: &Connection, rec: &ActionRecord) -> rusqlite::Result<()> {
        let prev: String = conn
            .query_row("SELECT checksum FROM actions ORDER BY seq DESC LIMIT 1", [], |r| r.get(0))
            .optional()?
            .unwrap_or_default();
        let request_id = rec.request_id.to_string();
        let timestamp = rec.timestamp.to_rfc3339();
        let checksum = chain_checksum(
            &prev,
            &request_id,
            &rec.description,
            rec.urgent,
            rec.outcome.as_str(),
            &rec.rationale,
            &timestamp,
        );
        conn.execute(
            "INSERT INTO actions (request_id, description, urgent, outcome, rationale, timestamp, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                request_id,
                rec.description,
                rec.urgent,
                rec.outcome.as_str(),
                rec.rationale,
                timestamp,
                checksum
            ],
        )?;
        Ok(())
    }
}

impl Journal for SqliteStore {
    fn append(&self, record: JournalRecord) -> warden_core::Result<()> {
        let table = record.table();
        let mut db = self.db.lock();
        let result = match &record {
            JournalRecord::Action(rec) => Self::append_action(&db, rec),
            JournalRecord::Transaction(tx) => db
                .execute(
                    "INSERT INTO transactions (id, amount, balance_after, request_id, memo, timestamp)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        tx.id.to_string(),
                        tx.amount,
                        tx.balance_after,
                        tx.request_id.map(|id| id.to_string()),
                        tx.memo,
                        tx.timestamp.to_rfc3339()
                    ],
                )
                .map(|_| ()),
            JournalRecord::Dialogue(turn) => db
                .execute(
                    "INSERT INTO dialogue_log (session_id, stage, turn_text, timestamp) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        turn.session_id.to_string(),
                        turn.stage.as_str(),
                        turn.turn_text,
                        turn.timestamp.to_rfc3339()
                    ],
                )
                .map(|_| ()),
            JournalRecord::TierTransition { to, at, .. } => {
                let at = at.to_rfc3339();
                db.transaction().and_then(|tx| {
                    tx.execute(
                        "UPDATE hierarchy_of_needs SET exited_at = ?1 WHERE exited_at IS NULL",
                        params![at],
                    )?;
                    tx.execute(
                        "INSERT INTO hierarchy_of_needs (tier, entered_at, exited_at) VALUES (?1, ?2, NULL)",
                        params![to.as_u8(), at],
                    )?;
                    tx.commit()
                })
            }
            JournalRecord::Task(task) => db
                .execute(
                    "INSERT INTO tasks (name, interval_seconds, required_tier, last_run_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(name) DO UPDATE SET
                        interval_seconds = excluded.interval_seconds,
                        required_tier = excluded.required_tier,
                        last_run_at = excluded.last_run_at",
                    params![
                        task.name,
                        task.interval_seconds as i64,
                        task.required_tier.as_u8(),
                        task.last_run_at.map(|t| t.to_rfc3339())
                    ],
                )
                .map(|_| ()),
            JournalRecord::TaskRun(run) => {
                let outcome = serde_json::to_string(&run.outcome)?;
                db.execute(
                    "INSERT INTO task_runs (task_name, started_at, ended_at, outcome) VALUES (?1, ?2, ?3, ?4)",
                    params![
                        run.task_name,
                        run.started_at.to_rfc3339(),
                        run.ended_at.to_rfc3339(),
                        outcome
                    ],
                )
                .map(|_| ())
            }
        };
        result.map_err(|e| {
            warn!(table, error = %e, "journal append failed");
            WardenError::store(e)
        })
    }

    fn actions(&self, limit: usize) -> warden_core::Result<Vec<ActionRecord>> {
        self.tail(
            "SELECT request_id, description, urgent, outcome, rationale, timestamp
             FROM actions ORDER BY seq DESC LIMIT ?1",
            limit,
            |row| {
                let outcome: String = row.get(3)?;
                Ok(ActionRecord {
                    request_id: uuid_col(row, 0)?,
                    description: row.get(1)?,
                    urgent: row.get(2)?,
                    outcome: Outcome::parse(&outcome).ok_or_else(|| bad_value(3, &outcome))?,
                    rationale: row.get(4)?,
                    timestamp: ts_col(row, 5)?,
                })
            },
        )
    }

    fn transactions(&self, limit: usize) -> warden_core::Result<Vec<Transaction>> {
        self.tail(
            "SELECT id, amount, balance_after, request_id, memo, timestamp
             FROM transactions ORDER BY seq DESC LIMIT ?1",
            limit,
            |row| {
                let request_id: Option<String> = row.get(3)?;
                Ok(Transaction {
                    id: uuid_col(row, 0)?,
                    amount: row.get(1)?,
                    balance_after: row.get(2)?,
                    request_id: request_id
                        .map(|s| Uuid::parse_str(&s).map_err(|e| conversion(3, e)))
                        .transpose()?,
                    memo: row.get(4)?,
                    timestamp: ts_col(row, 5)?,
                })
            },
        )
    }

    fn dialogue(&self, session_id: Option<SessionId>, limit: usize) -> warden_core::Result<Vec<DialogueTurnRecord>> {
        let map = |row: &Row<'_>| -> rusqlite::Result<DialogueTurnRecord> {
            let stage: String = row.get(1)?;
            Ok(DialogueTurnRecord {
                session_id: uuid_col(row, 0)?,
                stage: DialogueStage::parse(&stage).ok_or_else(|| bad_value(1, &stage))?,
                turn_text: row.get(2)?,
                timestamp: ts_col(row, 3)?,
            })
        };
        let db = self.db.lock();
        let mut rows = match session_id {
            Some(id) => {
                let mut stmt = db
                    .prepare(
                        "SELECT session_id, stage, turn_text, timestamp FROM dialogue_log
                         WHERE session_id = ?1 ORDER BY seq DESC LIMIT ?2",
                    )
                    .map_err(WardenError::store)?;
                stmt.query_map(params![id.to_string(), limit as i64], map)
                    .and_then(|r| r.collect::<rusqlite::Result<Vec<_>>>())
                    .map_err(WardenError::store)?
            }
            None => {
                let mut stmt = db
                    .prepare(
                        "SELECT session_id, stage, turn_text, timestamp FROM dialogue_log
                         ORDER BY seq DESC LIMIT ?1",
                    )
                    .map_err(WardenError::store)?;
                stmt.query_map(params![limit as i64], map)
                    .and_then(|r| r.collect::<rusqlite::Result<Vec<_>>>())
                    .map_err(WardenError::store)?
            }
        };
        rows.reverse();
        Ok(rows)
    }

    fn tier_history(&self, limit: usize) -> warden_core::Result<Vec<TierRecord>> {
        self.tail(
            "SELECT tier, entered_at, exited_at FROM hierarchy_of_needs ORDER BY seq DESC LIMIT ?1",
            limit,
            |row| {
                let exited: Option<String> = row.get(2)?;
                Ok(TierRecord {
                    tier: tier_col(row, 0)?,
                    entered_at: ts_col(row, 1)?,
                    exited_at: exited.map(|s| parse_ts(2, &s)).transpose()?,
                })
            },
        )
    }

    fn tasks(&self) -> warden_core::Result<Vec<TaskRecord>> {
        let db = self.db.lock();
        let mut stmt = db
            .prepare("SELECT name, interval_seconds, required_tier, last_run_at FROM tasks ORDER BY name")
            .map_err(WardenError::store)?;
        stmt.query_map([], |row| {
            let last: Option<String> = row.get(3)?;
            Ok(TaskRecord {
                name: row.get(0)?,
                interval_seconds: row.get::<_, i64>(1)?.max(0) as u64,
                required_tier: tier_col(row, 2)?,
                last_run_at: last.map(|s| parse_ts(3, &s)).transpose()?,
            })
        })
        .and_then(|r| r.collect::<rusqlite::Result<Vec<_>>>())
        .map_err(WardenError::store)
    }

    fn task_runs(&self, limit: usize) -> warden_core::Result<Vec<TaskRunRecord>> {
        self.tail(
            "SELECT task_name, started_at, ended_at, outcome FROM task_runs ORDER BY seq DESC LIMIT ?1",
            limit,
            |row| {
                let outcome: String = row.get(3)?;
                Ok(TaskRunRecord {
                    task_name: row.get(0)?,
                    started_at: ts_col(row, 1)?,
                    ended_at: ts_col(row, 2)?,
                    outcome: serde_json::from_str::<TaskOutcome>(&outcome).map_err(|e| conversion(3, e))?,
                })
            },
        )
    }
}

impl SqliteStore {
    /// Run a `... ORDER BY seq DESC LIMIT ?1` query and return rows oldest first.
    fn tail<T, F>(&self, sql: &str, limit: usize, map: F) -> warden_core::Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let db = self.db.lock();
        let mut stmt = db.prepare(sql).map_err(WardenError::store)?;
        let mut rows = stmt
            .query_map(params![limit as i64], map)
            .and_then(|r| r.collect::<rusqlite::Result<Vec<_>>>())
            .map_err(WardenError::store)?;
        rows.reverse();
        Ok(rows)
    }
}

fn chain_checksum(
    prev: &str,
    request_id: &str,
    description: &str,
    urgent: bool,
    outcome: &str,
    rationale: &str,
    timestamp: &str,
) -> String {
    let mut hasher = blake3::Hasher::new();
    for field in [prev, request_id, description, if urgent { "1" } else { "0" }, outcome, rationale, timestamp] {
        hasher.update(&(field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn conversion(idx: usize, err: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn bad_value(idx: usize, value: &str) -> rusqlite::Error {
    conversion(
        idx,
        std::io::Error::new(std::io::ErrorKind::InvalidData, format!("unexpected value '{value}'")),
    )
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| conversion(idx, e))
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_ts(idx, &s)
}

fn uuid_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|e| conversion(idx, e))
}

fn tier_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<NeedsTier> {
    let v: i64 = row.get(idx)?;
    u8::try_from(v)
        .ok()
        .and_then(NeedsTier::from_u8)
        .ok_or_else(|| bad_value(idx, &v.to_string()))
}
