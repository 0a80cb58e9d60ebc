#![forbid(unsafe_code)]
//! Append-only trail of gate decisions.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use agent_gate_core::now_utc;
use agent_gate_policy::{serialize_audit_log_json_line, LocalAuditLogRecord};
use anyhow::{Context, Result};
use serde::Serialize;
use time::OffsetDateTime;
use ulid::Ulid;

#[derive(Debug, Clone, PartialEq)]
pub struct TrailEntry {
    pub entry_id: Ulid,
    pub recorded_at: OffsetDateTime,
    pub plan_hash: Option<String>,
    pub record: LocalAuditLogRecord,
}

impl TrailEntry {
    #[must_use]
    pub fn new(record: LocalAuditLogRecord, plan_hash: Option<String>) -> Self {
        Self {
            entry_id: Ulid::new(),
            recorded_at: now_utc(),
            plan_hash,
            record,
        }
    }
}

/// A stored entry with its position in the trail.
///
/// Stores that keep only the audit-log line leave `entry_id`, `recorded_at`
/// and `plan_hash` empty.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TrailRow {
    pub sequence: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_hash: Option<String>,
    pub record: LocalAuditLogRecord,
}

pub trait AuditTrailStore {
    #[allow(clippy::missing_errors_doc)]
    fn migrate(&self) -> Result<()>;

    /// Returns the sequence number assigned to the entry.
    #[allow(clippy::missing_errors_doc)]
    fn append(&self, entry: &TrailEntry) -> Result<i64>;

    /// The most recent `limit` rows (all rows for `None`) in ascending
    /// sequence order.
    #[allow(clippy::missing_errors_doc)]
    fn list(&self, limit: Option<usize>) -> Result<Vec<TrailRow>>;
}

/// Keep the last `limit` rows of an ascending list.
#[must_use]
pub fn tail_rows(mut rows: Vec<TrailRow>, limit: Option<usize>) -> Vec<TrailRow> {
    if let Some(limit) = limit {
        let skip = rows.len().saturating_sub(limit);
        rows.drain(..skip);
    }
    rows
}

/// Trail kept as one audit-log JSON line per entry.
#[derive(Debug, Clone)]
pub struct JsonlAuditTrail {
    path: PathBuf,
}

impl JsonlAuditTrail {
    #[must_use]
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(&self) -> Result<Option<BufReader<File>>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let file = File::open(&self.path)
            .with_context(|| format!("failed to read audit trail {}", self.path.display()))?;
        Ok(Some(BufReader::new(file)))
    }

    fn read_lines(&self) -> Result<Vec<String>> {
        let Some(reader) = self.open_reader()? else {
            return Ok(Vec::new());
        };
        let mut lines = Vec::new();
        for line in reader.lines() {
            let line = line
                .with_context(|| format!("failed to read audit trail {}", self.path.display()))?;
            if !line.trim().is_empty() {
                lines.push(line);
            }
        }
        Ok(lines)
    }

    /// Counts entries without keeping any line beyond the one being read.
    fn count_lines(&self) -> Result<usize> {
        let Some(mut reader) = self.open_reader()? else {
            return Ok(0);
        };
        let mut count = 0;
        let mut buffer = String::new();
        loop {
            buffer.clear();
            let read = reader
                .read_line(&mut buffer)
                .with_context(|| format!("failed to read audit trail {}", self.path.display()))?;
            if read == 0 {
                return Ok(count);
            }
            if !buffer.trim().is_empty() {
                count += 1;
            }
        }
    }
}

impl AuditTrailStore for JsonlAuditTrail {
    fn migrate(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("failed to create audit trail directory {}", parent.display())
            })?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open audit trail {}", self.path.display()))?;
        Ok(())
    }

    fn append(&self, entry: &TrailEntry) -> Result<i64> {
        let existing = self.count_lines()?;
        let line = serialize_audit_log_json_line(&entry.record)
            .context("failed to serialize audit log record")?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("failed to open audit trail {}", self.path.display()))?;
        writeln!(file, "{line}")
            .with_context(|| format!("failed to append to audit trail {}", self.path.display()))?;

        let sequence = i64::try_from(existing + 1).context("audit trail sequence overflow")?;
        tracing::debug!(
            sequence,
            request_id = %entry.record.request_id,
            result = %entry.record.result,
            "appended audit trail line"
        );
        Ok(sequence)
    }

    fn list(&self, limit: Option<usize>) -> Result<Vec<TrailRow>> {
        let mut rows = Vec::new();
        for (index, line) in self.read_lines()?.iter().enumerate() {
            let record: LocalAuditLogRecord = serde_json::from_str(line)
                .with_context(|| format!("invalid audit trail line {}", index + 1))?;
            rows.push(TrailRow {
                sequence: i64::try_from(index + 1).context("audit trail sequence overflow")?,
                entry_id: None,
                recorded_at: None,
                plan_hash: None,
                record,
            });
        }
        Ok(tail_rows(rows, limit))
    }
}
