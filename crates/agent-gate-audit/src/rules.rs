use serde::{Deserialize, Serialize};

pub const TEXTURE_NPOT_RULE_ID: &str = "TextureNPOTRule";
pub const HIGH_POLY_AUTO_LOD_RULE_ID: &str = "HighPolyAutoLODRule";
pub const TRIANGLE_EXPECTED_MISMATCH_RULE_ID: &str = "TriangleExpectedMismatchRule";

pub const HIGH_POLY_TRIANGLE_THRESHOLD: u32 = 10_000;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd)]
pub enum AuditSeverity {
    #[default]
    Info,
    Warn,
    Error,
}

impl AuditSeverity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warn => "Warn",
            Self::Error => "Error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    #[default]
    Ok,
    SkippedLockedOrDirty,
}

impl ScanState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::SkippedLockedOrDirty => "skipped_locked_or_dirty",
        }
    }
}

/// Snapshot of one workspace object as seen by a scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditAssetRow {
    pub asset_path: String,
    pub asset_name: String,
    pub asset_class: String,
    pub id: String,
    pub display_name: String,
    pub damage: f64,
    pub representing_mesh_path: String,
    pub texture_width: Option<u32>,
    pub texture_height: Option<u32>,
    pub triangle_count_lod0_actual: Option<u32>,
    pub triangle_count_lod0_expected: Option<u32>,
    pub triangle_source: String,
    pub triangle_source_tag_key: String,
    pub mesh_lod_count: Option<u32>,
    pub mesh_nanite_enabled: Option<bool>,
    pub scan_state: ScanState,
    pub skip_reason: String,
    pub audit_issues: Vec<AuditIssue>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
pub struct AuditIssue {
    pub rule_id: String,
    pub severity: AuditSeverity,
    pub reason: String,
    pub hint: String,
    pub evidence: Vec<(String, String)>,
}

impl AuditIssue {
    fn new(rule_id: &str, severity: AuditSeverity, reason: &str, hint: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            severity,
            reason: reason.to_string(),
            hint: hint.to_string(),
            evidence: Vec::new(),
        }
    }

    pub fn add_evidence(&mut self, key: &str, value: impl ToString) {
        self.evidence.push((key.to_string(), value.to_string()));
    }

    #[must_use]
    pub fn evidence_value(&self, key: &str) -> Option<&str> {
        self.evidence
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }
}

/// A stateless check over one asset row.
pub trait AuditRule: Send + Sync {
    fn rule_id(&self) -> &str;
    fn evaluate(&self, row: &AuditAssetRow, issues: &mut Vec<AuditIssue>);
}

pub struct TextureNpotRule;

impl AuditRule for TextureNpotRule {
    fn rule_id(&self) -> &str {
        TEXTURE_NPOT_RULE_ID
    }

    fn evaluate(&self, row: &AuditAssetRow, issues: &mut Vec<AuditIssue>) {
        let (Some(width), Some(height)) = (row.texture_width, row.texture_height) else {
            return;
        };
        // A zero dimension means the size was never recorded.
        if width == 0 || height == 0 {
            return;
        }
        if width.is_power_of_two() && height.is_power_of_two() {
            return;
        }

        let mut issue = AuditIssue::new(
            TEXTURE_NPOT_RULE_ID,
            AuditSeverity::Error,
            "texture dimensions are not power-of-two",
            "Resize the texture to power-of-two dimensions before enabling mips and streaming.",
        );
        issue.add_evidence("asset_path", &row.asset_path);
        issue.add_evidence("texture_width", width);
        issue.add_evidence("texture_height", height);
        issues.push(issue);
    }
}

pub struct HighPolyAutoLodRule;

impl AuditRule for HighPolyAutoLodRule {
    fn rule_id(&self) -> &str {
        HIGH_POLY_AUTO_LOD_RULE_ID
    }

    fn evaluate(&self, row: &AuditAssetRow, issues: &mut Vec<AuditIssue>) {
        let Some(triangles) = row.triangle_count_lod0_actual else {
            return;
        };
        let Some(lod_count) = row.mesh_lod_count else {
            return;
        };
        if triangles <= HIGH_POLY_TRIANGLE_THRESHOLD
            || row.representing_mesh_path.is_empty()
            || row.mesh_nanite_enabled == Some(true)
            || lod_count > 1
        {
            return;
        }

        let mut issue = AuditIssue::new(
            HIGH_POLY_AUTO_LOD_RULE_ID,
            AuditSeverity::Warn,
            "high triangle mesh is missing additional LODs",
            "Run SetMeshLODGroup(LevelArchitecture) or author LODs for this mesh.",
        );
        issue.add_evidence("asset_path", &row.asset_path);
        issue.add_evidence("representing_mesh_path", &row.representing_mesh_path);
        issue.add_evidence("triangle_count_lod0_actual", triangles);
        issue.add_evidence("mesh_lod_count", lod_count);
        issue.add_evidence(
            "nanite_enabled",
            match row.mesh_nanite_enabled {
                Some(enabled) => enabled.to_string(),
                None => "unknown".to_string(),
            },
        );
        issue.add_evidence("suggested_action", "SetMeshLODGroup(LevelArchitecture)");
        issues.push(issue);
    }
}

pub struct TriangleExpectedMismatchRule;

impl AuditRule for TriangleExpectedMismatchRule {
    fn rule_id(&self) -> &str {
        TRIANGLE_EXPECTED_MISMATCH_RULE_ID
    }

    fn evaluate(&self, row: &AuditAssetRow, issues: &mut Vec<AuditIssue>) {
        let (Some(actual), Some(expected)) =
            (row.triangle_count_lod0_actual, row.triangle_count_lod0_expected)
        else {
            return;
        };
        let delta = i64::from(actual) - i64::from(expected);
        if delta == 0 {
            return;
        }

        let mut issue = AuditIssue::new(
            TRIANGLE_EXPECTED_MISMATCH_RULE_ID,
            AuditSeverity::Warn,
            "triangle_count_lod0 expected value mismatches actual mesh triangles",
            "Use mesh actual value as source of truth; update params.triangle_count_lod0 if this change is intentional.",
        );
        issue.add_evidence("asset_path", &row.asset_path);
        issue.add_evidence("triangle_count_lod0_actual", actual);
        issue.add_evidence("triangle_count_lod0_expected_json", expected);
        issue.add_evidence("triangle_mismatch_delta", delta);
        issue.add_evidence("triangle_source", &row.triangle_source);
        if !row.triangle_source_tag_key.is_empty() {
            issue.add_evidence("source_tag_key", &row.triangle_source_tag_key);
        }
        issues.push(issue);
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum AuditRuleError {
    #[error("rule_id is required")]
    EmptyRuleId,
    #[error("duplicate rule_id: {0}")]
    DuplicateRuleId(String),
    #[error("unknown rule_id: {0}")]
    UnknownRuleId(String),
}

struct RuleEntry {
    rule: Box<dyn AuditRule>,
    enabled: bool,
}

/// Ordered collection of rules; evaluation follows registration order.
#[derive(Default)]
pub struct AuditRuleRegistry {
    rules: Vec<RuleEntry>,
}

impl std::fmt::Debug for AuditRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRuleRegistry")
            .field("rule_ids", &self.rule_ids())
            .finish()
    }
}

impl AuditRuleRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the built-in rules, all enabled.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self {
            rules: vec![
                RuleEntry {
                    rule: Box::new(TextureNpotRule),
                    enabled: true,
                },
                RuleEntry {
                    rule: Box::new(HighPolyAutoLodRule),
                    enabled: true,
                },
                RuleEntry {
                    rule: Box::new(TriangleExpectedMismatchRule),
                    enabled: true,
                },
            ],
        }
    }

    /// # Errors
    /// Returns an error when the rule id is empty or already registered.
    pub fn register(&mut self, rule: Box<dyn AuditRule>) -> Result<(), AuditRuleError> {
        let rule_id = rule.rule_id();
        if rule_id.is_empty() {
            return Err(AuditRuleError::EmptyRuleId);
        }
        if self.position(rule_id).is_some() {
            return Err(AuditRuleError::DuplicateRuleId(rule_id.to_string()));
        }
        self.rules.push(RuleEntry {
            rule,
            enabled: true,
        });
        Ok(())
    }

    /// # Errors
    /// Returns an error when no rule with `rule_id` is registered.
    pub fn set_rule_enabled(&mut self, rule_id: &str, enabled: bool) -> Result<(), AuditRuleError> {
        let index = self
            .position(rule_id)
            .ok_or_else(|| AuditRuleError::UnknownRuleId(rule_id.to_string()))?;
        self.rules[index].enabled = enabled;
        Ok(())
    }

    #[must_use]
    pub fn is_rule_enabled(&self, rule_id: &str) -> bool {
        self.position(rule_id)
            .is_some_and(|index| self.rules[index].enabled)
    }

    #[must_use]
    pub fn rule_ids(&self) -> Vec<&str> {
        self.rules.iter().map(|entry| entry.rule.rule_id()).collect()
    }

    #[must_use]
    pub fn evaluate(&self, row: &AuditAssetRow) -> Vec<AuditIssue> {
        let mut issues = Vec::new();
        for entry in self.rules.iter().filter(|entry| entry.enabled) {
            entry.rule.evaluate(row, &mut issues);
        }
        issues
    }

    fn position(&self, rule_id: &str) -> Option<usize> {
        self.rules
            .iter()
            .position(|entry| entry.rule.rule_id() == rule_id)
    }
}
