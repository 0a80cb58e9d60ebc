use serde::{Deserialize, Serialize};

use crate::plan::RiskLevel;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DryRunObjectType {
    #[default]
    Asset,
    Actor,
}

impl DryRunObjectType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Asset => "asset",
            Self::Actor => "actor",
        }
    }
}

/// How an editor surface should bring a diff item into view.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LocateStrategy {
    #[default]
    SyncBrowser,
    CameraFocus,
}

impl LocateStrategy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SyncBrowser => "sync_browser",
            Self::CameraFocus => "camera_focus",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DryRunDiffItem {
    pub asset_path: String,
    pub field: String,
    pub before: String,
    pub after: String,
    pub tool_name: String,
    pub risk: RiskLevel,
    pub skip_reason: String,
    pub object_type: DryRunObjectType,
    pub locate_strategy: LocateStrategy,
    pub evidence_key: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub actor_path: String,
}

impl DryRunDiffItem {
    #[must_use]
    pub fn is_modifiable(&self) -> bool {
        self.skip_reason.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DryRunDiffSummary {
    pub total_candidates: u32,
    pub modifiable: u32,
    pub skipped: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DryRunDiffReport {
    pub request_id: String,
    pub summary: DryRunDiffSummary,
    pub diff_items: Vec<DryRunDiffItem>,
}

impl DryRunDiffReport {
    #[must_use]
    pub fn new(request_id: &str, diff_items: Vec<DryRunDiffItem>) -> Self {
        let mut report = Self {
            request_id: request_id.to_string(),
            summary: DryRunDiffSummary::default(),
            diff_items,
        };
        report.normalize_and_finalize();
        report
    }

    /// Derive locate strategies and default evidence keys, then recount the
    /// summary from the items.
    pub fn normalize_and_finalize(&mut self) {
        let mut summary = DryRunDiffSummary::default();
        for item in &mut self.diff_items {
            let (strategy, default_key) = match item.object_type {
                DryRunObjectType::Actor => (LocateStrategy::CameraFocus, "actor_path"),
                DryRunObjectType::Asset => (LocateStrategy::SyncBrowser, "asset_path"),
            };
            item.locate_strategy = strategy;
            if item.evidence_key.is_empty() {
                item.evidence_key = default_key.to_string();
            }

            summary.total_candidates += 1;
            if item.is_modifiable() {
                summary.modifiable += 1;
            } else {
                summary.skipped += 1;
            }
        }
        self.summary = summary;
    }

    /// # Errors
    /// Returns an error if JSON serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
