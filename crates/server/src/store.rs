use anyhow::Context;
use bureau_engine::now_ms;
use bureau_protocol::{CliUsage, MeetingPresenceRow, OfficeSnapshot};
use rusqlite::{Connection, OpenFlags, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Latest authoritative inputs pushed by collaborators, plus an append-only
/// event log whose max sequence is the revision pollers compare against.
#[derive(Debug, Clone)]
pub struct Store {
    db_path: PathBuf,
    keep_events: i64,
}

/// Event-log rows kept by default; older rows are trimmed on every append.
pub const DEFAULT_KEEP_EVENTS: i64 = 1_000;

/// A stored value and the event-log sequence that wrote it.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamped<T> {
    pub rev: i64,
    pub value: T,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Snapshot,
    Presence,
    CliUsage,
}

impl InputKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "office.snapshot",
            Self::Presence => "office.presence",
            Self::CliUsage => "office.cli_usage",
        }
    }
}

impl Store {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            keep_events: DEFAULT_KEEP_EVENTS,
        }
    }

    /// Keep at most `n` event-log rows (never fewer than one, so the revision survives).
    pub fn with_keep_events(mut self, n: i64) -> Self {
        self.keep_events = n.max(1);
        self
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn open(&self) -> anyhow::Result<Connection> {
        let path = self.db_path.clone();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create db dir: {}", dir.display()))?;
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("open sqlite db: {}", path.display()))?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        migrate(&conn)?;
        Ok(conn)
    }

    pub fn get_rev(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let rev: Option<i64> =
            conn.query_row("SELECT MAX(seq) FROM event_log", [], |row| row.get(0))?;
        Ok(rev.unwrap_or(0))
    }

    fn put_input<T: Serialize>(&self, kind: InputKind, value: &T) -> anyhow::Result<i64> {
        let payload_json = serde_json::to_string(value)
            .with_context(|| format!("encode {}", kind.as_str()))?;
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let seq = append_event_tx(
            &tx,
            kind.as_str(),
            None,
            serde_json::json!({ "bytes": payload_json.len() }),
            self.keep_events,
        )?;
        tx.execute(
            "INSERT INTO office_inputs (kind, payload_json, updated_at_ms, rev)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(kind) DO UPDATE SET
               payload_json = excluded.payload_json,
               updated_at_ms = excluded.updated_at_ms,
               rev = excluded.rev",
            (kind.as_str(), &payload_json, now_ms(), seq),
        )?;
        tx.commit()?;
        Ok(seq)
    }

    fn get_input<T: DeserializeOwned>(&self, kind: InputKind) -> anyhow::Result<Option<Stamped<T>>> {
        let conn = self.open()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT rev, payload_json FROM office_inputs WHERE kind = ?1",
                [kind.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((rev, payload_json)) = row else {
            return Ok(None);
        };
        let value = serde_json::from_str(&payload_json)
            .with_context(|| format!("decode stored {}", kind.as_str()))?;
        Ok(Some(Stamped { rev, value }))
    }

    pub fn put_snapshot(&self, snapshot: &OfficeSnapshot) -> anyhow::Result<i64> {
        self.put_input(InputKind::Snapshot, snapshot)
    }

    pub fn latest_snapshot(&self) -> anyhow::Result<Option<Stamped<OfficeSnapshot>>> {
        self.get_input(InputKind::Snapshot)
    }

    pub fn put_presence(&self, rows: &[MeetingPresenceRow]) -> anyhow::Result<i64> {
        self.put_input(InputKind::Presence, &rows)
    }

    pub fn latest_presence(&self) -> anyhow::Result<Option<Stamped<Vec<MeetingPresenceRow>>>> {
        self.get_input(InputKind::Presence)
    }

    pub fn put_cli_usage(&self, usage: &CliUsage) -> anyhow::Result<i64> {
        self.put_input(InputKind::CliUsage, usage)
    }

    pub fn latest_cli_usage(&self) -> anyhow::Result<Option<Stamped<CliUsage>>> {
        self.get_input(InputKind::CliUsage)
    }

    /// Audit trail for push events; does not affect any stored input.
    pub fn log_event(
        &self,
        kind: &str,
        event_id: Option<&str>,
        payload: serde_json::Value,
    ) -> anyhow::Result<i64> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let seq = append_event_tx(&tx, kind, event_id, payload, self.keep_events)?;
        tx.commit()?;
        Ok(seq)
    }

    pub fn total_events(&self) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let n = conn.query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(n)
    }

    pub fn count_events(&self, kind: &str) -> anyhow::Result<i64> {
        let conn = self.open()?;
        let n = conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE kind = ?1",
            [kind],
            |row| row.get(0),
        )?;
        Ok(n)
    }
}

fn migrate(conn: &Connection) -> anyhow::Result<()> {
    // user_version + IF NOT EXISTS + best-effort ALTERs keep older files usable.
    let v: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if v < 1 {
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS event_log (
  seq INTEGER PRIMARY KEY AUTOINCREMENT,
  ts_ms INTEGER NOT NULL,
  kind TEXT NOT NULL,
  entity_id TEXT,
  payload_json TEXT NOT NULL DEFAULT '{}'
);

CREATE INDEX IF NOT EXISTS idx_event_log_kind ON event_log(kind);

CREATE TABLE IF NOT EXISTS office_inputs (
  kind TEXT PRIMARY KEY,
  payload_json TEXT NOT NULL DEFAULT '{}',
  updated_at_ms INTEGER NOT NULL
);
"#,
        )?;
        conn.pragma_update(None, "user_version", 1_i64)?;
    }

    ensure_column(conn, "office_inputs", "rev", "INTEGER NOT NULL DEFAULT 0")?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, col: &str, decl: &str) -> anyhow::Result<()> {
    let sql = format!("ALTER TABLE {table} ADD COLUMN {col} {decl}");
    match conn.execute(&sql, []) {
        Ok(_) => Ok(()),
        Err(e) => {
            if e.to_string().to_lowercase().contains("duplicate column") {
                return Ok(());
            }
            Err(e).with_context(|| format!("ensure column {table}.{col}"))
        }
    }
}

fn append_event_tx(
    tx: &rusqlite::Transaction<'_>,
    kind: &str,
    entity_id: Option<&str>,
    payload: serde_json::Value,
    keep: i64,
) -> anyhow::Result<i64> {
    tx.execute(
        "INSERT INTO event_log (ts_ms, kind, entity_id, payload_json) VALUES (?1, ?2, ?3, ?4)",
        (now_ms(), kind, entity_id, payload.to_string()),
    )?;
    let seq = tx.last_insert_rowid();
    // AUTOINCREMENT never reuses a seq, so MAX(seq) stays monotonic after trimming.
    tx.execute("DELETE FROM event_log WHERE seq <= ?1", [seq - keep])?;
    Ok(seq)
}
