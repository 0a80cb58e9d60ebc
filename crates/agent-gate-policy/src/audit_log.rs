use agent_gate_core::{error_code_text, format_rfc3339, now_utc, TimeFormatError};
use serde::{Deserialize, Serialize};

use crate::gate::GateDecision;

pub const RESULT_ALLOWED: &str = "allowed";
pub const RESULT_BLOCKED: &str = "blocked";

/// One line of the append-only local audit log.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LocalAuditLogRecord {
    pub timestamp_utc: String,
    #[serde(rename = "user")]
    pub user_name: String,
    #[serde(rename = "role")]
    pub resolved_role: String,
    pub request_id: String,
    pub tool_name: String,
    pub capability: String,
    pub asset_count: u32,
    pub result: String,
    pub error_code: String,
    pub reason: String,
}

impl LocalAuditLogRecord {
    /// Build a record for `decision` stamped with the current time.
    ///
    /// # Errors
    /// Returns an error if the timestamp cannot be formatted.
    pub fn from_decision<D: GateDecision>(
        decision: &D,
        user_name: &str,
        resolved_role: &str,
    ) -> Result<Self, TimeFormatError> {
        Ok(Self::from_decision_at(
            decision,
            user_name,
            resolved_role,
            format_rfc3339(now_utc())?,
        ))
    }

    #[must_use]
    pub fn from_decision_at<D: GateDecision>(
        decision: &D,
        user_name: &str,
        resolved_role: &str,
        timestamp_utc: String,
    ) -> Self {
        Self {
            timestamp_utc,
            user_name: user_name.to_string(),
            resolved_role: resolved_role.to_string(),
            request_id: decision.request_id().to_string(),
            tool_name: decision.tool_name().to_string(),
            capability: decision.capability().to_string(),
            asset_count: decision.asset_count(),
            result: if decision.allowed() {
                RESULT_ALLOWED
            } else {
                RESULT_BLOCKED
            }
            .to_string(),
            error_code: error_code_text(decision.error_code()).to_string(),
            reason: decision.reason().to_string(),
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        self.result == RESULT_ALLOWED
    }
}

/// Condensed single-line JSON form of `record`.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn serialize_audit_log_json_line(
    record: &LocalAuditLogRecord,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(record)
}
