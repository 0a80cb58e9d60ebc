#![forbid(unsafe_code)]

//! Shared domain model for the agent execution gateway: the whitelisted tool
//! catalog, the plan model and its minimal contract, dry-run diff reports and
//! the stable policy error-code contract.

mod dry_run;
mod plan;
mod registry;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::{OffsetDateTime, UtcOffset};
use ulid::Ulid;

pub use dry_run::{
    DryRunDiffItem, DryRunDiffReport, DryRunDiffSummary, DryRunObjectType, LocateStrategy,
};
pub use plan::{
    parse_plan_json, plan_hash, plan_to_json_pretty, plan_to_value, validate_minimal_contract,
    AgentPlan, ArgValue, ContractViolation, PlanStep, RiskLevel, StepArgs, PLAN_VERSION,
    ROLLBACK_ALL_OR_NOTHING,
};
pub use registry::{
    ArgSchema, ArgValueType, RegistryError, ToolCapability, ToolDescriptor, ToolRegistry,
    WORKSPACE_ROOT_PREFIX,
};

/// Frozen cap on how many objects the write-like steps of one plan may modify.
pub const MAX_ASSET_MODIFY_LIMIT: u32 = 50;

/// Stable policy error codes shared by the validator and the execution gate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ErrorCode {
    #[serde(rename = "E4001")]
    MissingRequiredField,
    #[serde(rename = "E4002")]
    ToolNotWhitelisted,
    #[serde(rename = "E4003")]
    TypeMismatch,
    #[serde(rename = "E4004")]
    ModifyLimitExceeded,
    #[serde(rename = "E4005")]
    WriteNotConfirmed,
    #[serde(rename = "E4006")]
    SourceControlCheckoutFailed,
    #[serde(rename = "E4007")]
    TransactionRolledBack,
    #[serde(rename = "E4008")]
    RbacDenied,
    #[serde(rename = "E4009")]
    ArgConstraintViolation,
    #[serde(rename = "E4011")]
    LevelRiskArgViolation,
    #[serde(rename = "E4012")]
    NamingMetadataInsufficient,
}

impl ErrorCode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingRequiredField => "E4001",
            Self::ToolNotWhitelisted => "E4002",
            Self::TypeMismatch => "E4003",
            Self::ModifyLimitExceeded => "E4004",
            Self::WriteNotConfirmed => "E4005",
            Self::SourceControlCheckoutFailed => "E4006",
            Self::TransactionRolledBack => "E4007",
            Self::RbacDenied => "E4008",
            Self::ArgConstraintViolation => "E4009",
            Self::LevelRiskArgViolation => "E4011",
            Self::NamingMetadataInsufficient => "E4012",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "E4001" => Some(Self::MissingRequiredField),
            "E4002" => Some(Self::ToolNotWhitelisted),
            "E4003" => Some(Self::TypeMismatch),
            "E4004" => Some(Self::ModifyLimitExceeded),
            "E4005" => Some(Self::WriteNotConfirmed),
            "E4006" => Some(Self::SourceControlCheckoutFailed),
            "E4007" => Some(Self::TransactionRolledBack),
            "E4008" => Some(Self::RbacDenied),
            "E4009" => Some(Self::ArgConstraintViolation),
            "E4011" => Some(Self::LevelRiskArgViolation),
            "E4012" => Some(Self::NamingMetadataInsufficient),
            _ => None,
        }
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serde adapter that writes `None` as the `"-"` no-error sentinel.
pub mod error_code_sentinel {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ErrorCode;

    pub const NO_ERROR: &str = "-";

    /// # Errors
    /// Propagates serializer failures.
    #[allow(clippy::ref_option, clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(
        value: &Option<ErrorCode>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(value.map_or(NO_ERROR, ErrorCode::as_str))
    }

    /// # Errors
    /// Returns an error for strings that are neither the sentinel nor a known code.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ErrorCode>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.is_empty() || raw == NO_ERROR {
            return Ok(None);
        }
        ErrorCode::parse(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown error code: {raw}")))
    }
}

#[must_use]
pub fn error_code_text(code: Option<ErrorCode>) -> &'static str {
    code.map_or(error_code_sentinel::NO_ERROR, ErrorCode::as_str)
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum TimeFormatError {
    #[error("failed to format timestamp: {0}")]
    Format(String),
    #[error("invalid RFC3339 timestamp: {0}")]
    Parse(String),
    #[error("timestamp MUST use UTC offset Z")]
    NotUtc,
}

const UTC_PLUS_8_FORMAT: &str =
    "[year]-[month]-[day]T[hour]:[minute]:[second][offset_hour sign:mandatory]:[offset_minute]";
const RUN_ID_STAMP_FORMAT: &str = "[year][month][day]_[hour][minute][second]";

#[must_use]
pub fn now_utc() -> OffsetDateTime {
    OffsetDateTime::now_utc().to_offset(UtcOffset::UTC)
}

/// Format a timestamp as RFC3339 in UTC.
///
/// # Errors
/// Returns an error when the timestamp cannot be represented.
pub fn format_rfc3339(value: OffsetDateTime) -> Result<String, TimeFormatError> {
    value
        .to_offset(UtcOffset::UTC)
        .format(&time::format_description::well_known::Rfc3339)
        .map_err(|err| TimeFormatError::Format(err.to_string()))
}

/// Parse an RFC3339 timestamp that MUST carry the `Z` offset.
///
/// # Errors
/// Returns an error for malformed timestamps or non-UTC offsets.
pub fn parse_rfc3339_utc(value: &str) -> Result<OffsetDateTime, TimeFormatError> {
    let parsed = OffsetDateTime::parse(value, &time::format_description::well_known::Rfc3339)
        .map_err(|err| TimeFormatError::Parse(err.to_string()))?;
    if parsed.offset() != UtcOffset::UTC {
        return Err(TimeFormatError::NotUtc);
    }
    Ok(parsed)
}

/// Render a UTC instant as ISO-8601 wall-clock time in the fixed `+08:00` zone.
///
/// # Errors
/// Returns an error when the offset or format description cannot be built.
pub fn format_utc_plus8(value: OffsetDateTime) -> Result<String, TimeFormatError> {
    let offset =
        UtcOffset::from_hms(8, 0, 0).map_err(|err| TimeFormatError::Format(err.to_string()))?;
    let description = time::format_description::parse(UTC_PLUS_8_FORMAT)
        .map_err(|err| TimeFormatError::Format(err.to_string()))?;
    value
        .to_offset(offset)
        .format(&description)
        .map_err(|err| TimeFormatError::Format(err.to_string()))
}

/// `YYYYMMDD_HHMMSS` stamp of a UTC instant.
///
/// # Errors
/// Returns an error when the format description cannot be built.
pub fn format_compact_utc_stamp(value: OffsetDateTime) -> Result<String, TimeFormatError> {
    let description = time::format_description::parse(RUN_ID_STAMP_FORMAT)
        .map_err(|err| TimeFormatError::Format(err.to_string()))?;
    value
        .to_offset(UtcOffset::UTC)
        .format(&description)
        .map_err(|err| TimeFormatError::Format(err.to_string()))
}

#[must_use]
pub fn new_request_id() -> String {
    format!("req_{}", Ulid::new())
}

#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a JSON value with stable `serde_json` serialization + SHA-256.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn hash_json(value: &Value) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hash_bytes(&bytes))
}
