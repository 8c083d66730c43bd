/// database.rs – SQLite alert journal using rusqlite.
///
/// Every monitor run is a session; every alert it fires is appended to the
/// `alerts` table so a day's entries and exits can be reviewed after the fact.
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, types::Type, Connection};
use std::sync::{Arc, Mutex};

use crate::alerts::AlertSink;
use crate::models::{AlertEvent, AlertKind, MonitorSession};

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS monitor_sessions (
    session_id      TEXT PRIMARY KEY,
    started_at      TEXT NOT NULL,
    ended_at        TEXT,
    backend_url     TEXT NOT NULL DEFAULT '',
    alerts_fired    INTEGER NOT NULL DEFAULT 0
);

CREATE TABLE IF NOT EXISTS alerts (
    id              INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id      TEXT REFERENCES monitor_sessions(session_id),
    kind            TEXT NOT NULL,
    slot_id         TEXT NOT NULL,
    symbol          TEXT,
    price           REAL,
    pnl             REAL,
    fired_at        TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_alerts_session ON alerts(session_id);
CREATE INDEX IF NOT EXISTS idx_alerts_fired   ON alerts(fired_at);
";

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the SQLite database at *path* and apply the schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).context("opening SQLite database")?;
        conn.execute_batch(SCHEMA).context("applying schema")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().expect("database mutex poisoned");
        f(&conn)
    }

    // ------------------------------------------------------------------
    // Sessions
    // ------------------------------------------------------------------

    pub fn upsert_session(&self, s: &MonitorSession) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO monitor_sessions
                    (session_id, started_at, ended_at, backend_url, alerts_fired)
                 VALUES (?1,?2,?3,?4,?5)
                 ON CONFLICT(session_id) DO UPDATE SET
                    ended_at     = excluded.ended_at,
                    alerts_fired = excluded.alerts_fired",
                params![
                    s.session_id,
                    s.started_at.to_rfc3339(),
                    s.ended_at.map(|t| t.to_rfc3339()),
                    s.backend_url,
                    s.alerts_fired,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_sessions(&self, limit: usize) -> Result<Vec<MonitorSession>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM monitor_sessions ORDER BY started_at DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| {
                Self::row_to_session(row)
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(anyhow::Error::from)
        })
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> Result<MonitorSession, rusqlite::Error> {
        Ok(MonitorSession {
            session_id: row.get("session_id")?,
            started_at: parse_dt(row.get::<_, String>("started_at")?),
            ended_at: row
                .get::<_, Option<String>>("ended_at")?
                .map(parse_dt),
            backend_url: row.get("backend_url")?,
            alerts_fired: row.get("alerts_fired")?,
        })
    }

    // ------------------------------------------------------------------
    // Alerts
    // ------------------------------------------------------------------

    pub fn record_alert(&self, event: &AlertEvent, session_id: Option<&str>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO alerts
                    (session_id, kind, slot_id, symbol, price, pnl, fired_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7)",
                params![
                    session_id,
                    event.kind.as_str(),
                    event.slot_id,
                    event.symbol,
                    event.price,
                    event.pnl,
                    event.at.to_rfc3339(),
                ],
            )?;
            Ok(())
        })
    }

    /// Most recent alerts first.
    pub fn recent_alerts(&self, limit: usize) -> Result<Vec<AlertEvent>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM alerts ORDER BY fired_at DESC, id DESC LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit as i64], |row| Self::row_to_alert(row))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
                .map_err(anyhow::Error::from)
        })
    }

    pub fn alert_count(&self, session_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            let n: u32 = conn.query_row(
                "SELECT COUNT(*) FROM alerts WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
    }

    /// Sum of realised PnL carried by closing alerts of one session.
    pub fn session_closed_pnl(&self, session_id: &str) -> Result<f64> {
        self.with_conn(|conn| {
            let val: f64 = conn.query_row(
                "SELECT COALESCE(SUM(pnl),0.0) FROM alerts
                 WHERE session_id = ?1 AND pnl IS NOT NULL
                   AND kind IN ('sl_hit','tp_hit','closed_profit','closed_loss')",
                params![session_id],
                |row| row.get(0),
            )?;
            Ok(val)
        })
    }

    fn row_to_alert(row: &rusqlite::Row<'_>) -> Result<AlertEvent, rusqlite::Error> {
        let kind_str: String = row.get("kind")?;
        let kind: AlertKind = kind_str.parse().map_err(|e: anyhow::Error| {
            let idx = row.as_ref().column_index("kind").unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into())
        })?;
        Ok(AlertEvent {
            kind,
            slot_id: row.get("slot_id")?,
            symbol: row.get("symbol")?,
            price: row.get("price")?,
            pnl: row.get("pnl")?,
            at: parse_dt(row.get::<_, String>("fired_at")?),
        })
    }
}

// ---------------------------------------------------------------------------
// Journal sink
// ---------------------------------------------------------------------------

/// Alert sink that appends every event to the journal under one session.
pub struct JournalSink {
    db: Arc<Database>,
    session_id: String,
}

impl JournalSink {
    pub fn new(db: Arc<Database>, session_id: impl Into<String>) -> Self {
        Self {
            db,
            session_id: session_id.into(),
        }
    }
}

impl AlertSink for JournalSink {
    fn name(&self) -> &'static str {
        "journal"
    }

    fn deliver(&mut self, event: &AlertEvent) -> Result<()> {
        self.db.record_alert(event, Some(&self.session_id))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_dt(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
