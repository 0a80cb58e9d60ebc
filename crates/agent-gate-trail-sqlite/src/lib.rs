#![forbid(unsafe_code)]

use std::path::Path;

use agent_gate_core::format_rfc3339;
use agent_gate_policy::{serialize_audit_log_json_line, LocalAuditLogRecord};
use agent_gate_trail_core::{AuditTrailStore, TrailEntry, TrailRow};
use anyhow::{Context, Result};
use rusqlite::{params, Connection};

const TRAIL_SCHEMA_VERSION: i64 = 1;

const SCHEMA_V1: &str = r"
CREATE TABLE IF NOT EXISTS schema_migrations (
  version INTEGER PRIMARY KEY,
  applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS audit_trail (
  sequence INTEGER PRIMARY KEY AUTOINCREMENT,
  entry_id TEXT NOT NULL UNIQUE,
  recorded_at TEXT NOT NULL,
  plan_hash TEXT,
  timestamp_utc TEXT NOT NULL,
  user_name TEXT NOT NULL,
  resolved_role TEXT NOT NULL,
  request_id TEXT NOT NULL,
  tool_name TEXT NOT NULL,
  capability TEXT NOT NULL,
  asset_count INTEGER NOT NULL CHECK (asset_count >= 0),
  result TEXT NOT NULL CHECK (result IN ('allowed','blocked')),
  error_code TEXT NOT NULL,
  reason TEXT NOT NULL,
  record_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_trail_request_id ON audit_trail(request_id);

CREATE TRIGGER IF NOT EXISTS trg_audit_trail_no_update
BEFORE UPDATE ON audit_trail
BEGIN
  SELECT RAISE(FAIL, 'audit_trail is append-only');
END;
CREATE TRIGGER IF NOT EXISTS trg_audit_trail_no_delete
BEFORE DELETE ON audit_trail
BEGIN
  SELECT RAISE(FAIL, 'audit_trail is append-only');
END;
";

pub struct SqliteAuditTrailStore {
    conn: Connection,
}

impl SqliteAuditTrailStore {
    /// Open or create a `SQLite` trail database and configure local pragmas.
    ///
    /// # Errors
    /// Returns an error if opening the database or applying pragmas fails.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite database at {}", path.display()))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )
        .context("failed to configure sqlite pragmas")?;

        Ok(Self { conn })
    }

    /// Rows recorded for one request, in sequence order.
    ///
    /// # Errors
    /// Returns an error if the query fails or a stored row cannot be decoded.
    pub fn list_for_request(&self, request_id: &str) -> Result<Vec<TrailRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT sequence, entry_id, recorded_at, plan_hash, record_json
             FROM audit_trail
             WHERE request_id = ?1
             ORDER BY sequence ASC",
        )?;
        let mut rows = stmt.query(params![request_id])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(decode_row(row)?);
        }
        Ok(out)
    }
}

impl AuditTrailStore for SqliteAuditTrailStore {
    fn migrate(&self) -> Result<()> {
        self.conn
            .execute_batch(SCHEMA_V1)
            .context("failed to apply audit trail schema")?;

        let now = format_rfc3339(agent_gate_core::now_utc())?;
        self.conn
            .execute(
                "INSERT OR IGNORE INTO schema_migrations(version, applied_at) VALUES (?1, ?2)",
                params![TRAIL_SCHEMA_VERSION, now],
            )
            .context("failed to record audit trail migration")?;

        Ok(())
    }

    fn append(&self, entry: &TrailEntry) -> Result<i64> {
        let record = &entry.record;
        self.conn
            .execute(
                "INSERT INTO audit_trail(
                    entry_id, recorded_at, plan_hash, timestamp_utc,
                    user_name, resolved_role, request_id, tool_name,
                    capability, asset_count, result, error_code,
                    reason, record_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                params![
                    entry.entry_id.to_string(),
                    format_rfc3339(entry.recorded_at)?,
                    entry.plan_hash,
                    record.timestamp_utc,
                    record.user_name,
                    record.resolved_role,
                    record.request_id,
                    record.tool_name,
                    record.capability,
                    i64::from(record.asset_count),
                    record.result,
                    record.error_code,
                    record.reason,
                    serialize_audit_log_json_line(record)?,
                ],
            )
            .context("failed to append audit trail entry")?;

        let sequence = self.conn.last_insert_rowid();
        tracing::debug!(
            sequence,
            request_id = %record.request_id,
            result = %record.result,
            "appended audit trail row"
        );
        Ok(sequence)
    }

    fn list(&self, limit: Option<usize>) -> Result<Vec<TrailRow>> {
        let limit = match limit {
            Some(limit) => i64::try_from(limit).unwrap_or(i64::MAX),
            None => -1,
        };
        let mut stmt = self.conn.prepare(
            "SELECT sequence, entry_id, recorded_at, plan_hash, record_json
             FROM (
               SELECT sequence, entry_id, recorded_at, plan_hash, record_json
               FROM audit_trail
               ORDER BY sequence DESC
               LIMIT ?1
             )
             ORDER BY sequence ASC",
        )?;

        let mut rows = stmt.query(params![limit])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            out.push(decode_row(row)?);
        }
        Ok(out)
    }
}

fn decode_row(row: &rusqlite::Row<'_>) -> Result<TrailRow> {
    let record_raw: String = row.get(4)?;
    let record: LocalAuditLogRecord =
        serde_json::from_str(&record_raw).context("invalid record_json")?;
    Ok(TrailRow {
        sequence: row.get(0)?,
        entry_id: Some(row.get(1)?),
        recorded_at: Some(row.get(2)?),
        plan_hash: row.get(3)?,
        record,
    })
}
