use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::registry::ToolCapability;

pub const PLAN_VERSION: i64 = 1;
pub const ROLLBACK_ALL_OR_NOTHING: &str = "all_or_nothing";

const INT_EXACT_TOLERANCE: f64 = 1e-8;

/// Typed view of one argument value. Values that fit none of the shapes the
/// tool schemas declare land in `Other` so the validator can still report them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Text(String),
    TextList(Vec<String>),
    Int(i64),
    Number(f64),
    Other(Value),
}

impl ArgValue {
    #[must_use]
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }

    #[must_use]
    pub fn text_list(values: &[&str]) -> Self {
        Self::TextList(values.iter().map(|value| (*value).to_string()).collect())
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    /// Elements of a list value; `None` entries mark non-string elements.
    #[must_use]
    pub fn list_elements(&self) -> Option<Vec<Option<&str>>> {
        match self {
            Self::TextList(values) => Some(values.iter().map(|value| Some(value.as_str())).collect()),
            Self::Other(Value::Array(values)) => Some(values.iter().map(Value::as_str).collect()),
            _ => None,
        }
    }

    #[must_use]
    pub fn list_len(&self) -> Option<usize> {
        match self {
            Self::TextList(values) => Some(values.len()),
            Self::Other(Value::Array(values)) => Some(values.len()),
            _ => None,
        }
    }

    /// Integral value, accepting floats that round to an integer.
    #[must_use]
    pub fn as_int_exact(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            Self::Number(value) => float_to_int_exact(*value),
            _ => None,
        }
    }
}

impl From<i64> for ArgValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for ArgValue {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

/// Arguments of one step keyed by name.
pub type StepArgs = BTreeMap<String, ArgValue>;

#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    #[default]
    ReadOnly,
    Write,
    Destructive,
}

impl RiskLevel {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::Write => "write",
            Self::Destructive => "destructive",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read_only" => Some(Self::ReadOnly),
            "write" => Some(Self::Write),
            "destructive" => Some(Self::Destructive),
            _ => None,
        }
    }

    #[must_use]
    pub fn from_capability(capability: ToolCapability) -> Self {
        match capability {
            ToolCapability::ReadOnly => Self::ReadOnly,
            ToolCapability::Write => Self::Write,
            ToolCapability::Destructive => Self::Destructive,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct PlanStep {
    pub step_id: String,
    pub tool_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<StepArgs>,
    pub risk_level: RiskLevel,
    pub requires_confirm: bool,
    pub rollback_strategy: String,
    pub expected_evidence: Vec<String>,
}

impl PlanStep {
    /// Objects this step would modify: the `asset_paths` list length, else one
    /// for a singular `asset_path` string, else zero.
    #[must_use]
    pub fn count_modify_targets(&self) -> u32 {
        let Some(args) = &self.args else {
            return 0;
        };
        if let Some(len) = args.get("asset_paths").and_then(ArgValue::list_len) {
            return u32::try_from(len).unwrap_or(u32::MAX);
        }
        if args.get("asset_path").and_then(ArgValue::as_text).is_some() {
            return 1;
        }
        0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AgentPlan {
    pub plan_version: i64,
    pub request_id: String,
    pub intent: String,
    pub steps: Vec<PlanStep>,
}

impl AgentPlan {
    #[must_use]
    pub fn new(request_id: &str, intent: &str) -> Self {
        Self {
            plan_version: PLAN_VERSION,
            request_id: request_id.to_string(),
            intent: intent.to_string(),
            steps: Vec::new(),
        }
    }
}

fn float_to_int_exact(float: f64) -> Option<i64> {
    let rounded = float.round();
    if (float - rounded).abs() > INT_EXACT_TOLERANCE {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let (lower, upper) = (i64::MIN as f64, i64::MAX as f64);
    if rounded < lower || rounded > upper {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    let int = rounded as i64;
    Some(int)
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum ContractViolation {
    #[error("plan_version must be >= 1")]
    PlanVersion,
    #[error("request_id is required")]
    RequestIdMissing,
    #[error("intent is required")]
    IntentMissing,
    #[error("steps must not be empty")]
    StepsEmpty,
    #[error("steps[{index}].{field} is required")]
    StepFieldMissing { index: usize, field: &'static str },
}

impl ContractViolation {
    #[must_use]
    pub fn field_path(&self) -> String {
        match self {
            Self::StepFieldMissing { index, field } => format!("steps[{index}].{field}"),
            _ => "plan".to_string(),
        }
    }
}

/// Minimal structural contract every plan must meet before deeper validation.
///
/// # Errors
/// Returns the first violation, plan-level fields first, then steps in order.
pub fn validate_minimal_contract(plan: &AgentPlan) -> Result<(), ContractViolation> {
    if plan.plan_version < 1 {
        return Err(ContractViolation::PlanVersion);
    }
    if plan.request_id.is_empty() {
        return Err(ContractViolation::RequestIdMissing);
    }
    if plan.intent.is_empty() {
        return Err(ContractViolation::IntentMissing);
    }
    if plan.steps.is_empty() {
        return Err(ContractViolation::StepsEmpty);
    }

    for (index, step) in plan.steps.iter().enumerate() {
        let missing = if step.step_id.is_empty() {
            Some("step_id")
        } else if step.tool_name.is_empty() {
            Some("tool_name")
        } else if step.args.is_none() {
            Some("args")
        } else if step.rollback_strategy.is_empty() {
            Some("rollback_strategy")
        } else {
            None
        };
        if let Some(field) = missing {
            return Err(ContractViolation::StepFieldMissing { index, field });
        }
    }
    Ok(())
}

/// Pretty JSON form of a plan; missing step args serialize as `{}`.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn plan_to_json_pretty(plan: &AgentPlan) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&plan_wire_value(plan)?)
}

/// # Errors
/// Returns an error if JSON serialization fails.
pub fn plan_to_value(plan: &AgentPlan) -> Result<Value, serde_json::Error> {
    plan_wire_value(plan)
}

/// # Errors
/// Returns an error for malformed JSON, unknown fields, or wrongly typed fields.
pub fn parse_plan_json(text: &str) -> Result<AgentPlan, serde_json::Error> {
    serde_json::from_str(text)
}

/// SHA-256 of the plan's canonical JSON.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn plan_hash(plan: &AgentPlan) -> Result<String, serde_json::Error> {
    crate::hash_json(&plan_wire_value(plan)?)
}

fn plan_wire_value(plan: &AgentPlan) -> Result<Value, serde_json::Error> {
    let mut value = serde_json::to_value(plan)?;
    if let Some(Value::Array(steps)) = value.get_mut("steps") {
        for step in steps {
            if let Value::Object(fields) = step {
                fields
                    .entry("args")
                    .or_insert_with(|| Value::Object(serde_json::Map::new()));
            }
        }
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn args_of(value: Value) -> StepArgs {
        must(serde_json::from_value(value))
    }

    fn scan_step(step_id: &str) -> PlanStep {
        PlanStep {
            step_id: step_id.to_string(),
            tool_name: "ScanAssets".to_string(),
            args: Some(StepArgs::new()),
            risk_level: RiskLevel::ReadOnly,
            requires_confirm: false,
            rollback_strategy: ROLLBACK_ALL_OR_NOTHING.to_string(),
            expected_evidence: vec!["asset_path".to_string(), "result".to_string()],
        }
    }

    #[test]
    fn contract_reports_plan_level_violations_first() {
        let mut plan = AgentPlan::new("req_1", "scan_assets");
        plan.plan_version = 0;
        let err = match validate_minimal_contract(&plan) {
            Ok(()) => panic!("expected violation"),
            Err(err) => err,
        };
        assert_eq!(err, ContractViolation::PlanVersion);
        assert_eq!(err.field_path(), "plan");

        plan.plan_version = PLAN_VERSION;
        assert_eq!(
            validate_minimal_contract(&plan),
            Err(ContractViolation::StepsEmpty)
        );

        plan.request_id.clear();
        assert_eq!(
            validate_minimal_contract(&plan).map_err(|err| err.to_string()),
            Err("request_id is required".to_string())
        );
    }

    #[test]
    fn contract_reports_step_field_paths() {
        let mut plan = AgentPlan::new("req_1", "scan_assets");
        plan.steps.push(scan_step("s1"));
        let mut broken = scan_step("s2");
        broken.args = None;
        plan.steps.push(broken);

        let err = match validate_minimal_contract(&plan) {
            Ok(()) => panic!("expected violation"),
            Err(err) => err,
        };
        assert_eq!(err.to_string(), "steps[1].args is required");
        assert_eq!(err.field_path(), "steps[1].args");

        plan.steps[1].args = Some(StepArgs::new());
        plan.steps[1].rollback_strategy.clear();
        let err = match validate_minimal_contract(&plan) {
            Ok(()) => panic!("expected violation"),
            Err(err) => err,
        };
        assert_eq!(err.field_path(), "steps[1].rollback_strategy");
    }

    #[test]
    fn modify_targets_prefer_asset_paths_over_asset_path() {
        let mut step = scan_step("s1");
        step.args = Some(args_of(json!({
            "asset_paths": ["/Game/A", "/Game/B", "/Game/C"],
            "asset_path": "/Game/D"
        })));
        assert_eq!(step.count_modify_targets(), 3);

        step.args = Some(args_of(json!({"asset_path": "/Game/D"})));
        assert_eq!(step.count_modify_targets(), 1);

        step.args = Some(args_of(json!({"asset_paths": "not-a-list"})));
        assert_eq!(step.count_modify_targets(), 0);

        step.args = None;
        assert_eq!(step.count_modify_targets(), 0);
    }

    #[test]
    fn arg_values_decode_into_typed_shapes() {
        let args = args_of(json!({
            "a": "text",
            "b": ["x", "y"],
            "c": 1024,
            "d": 1024.0,
            "e": 1024.5,
            "f": ["x", 3],
            "g": true,
            "h": []
        }));
        assert_eq!(args["a"], ArgValue::text("text"));
        assert_eq!(args["b"], ArgValue::text_list(&["x", "y"]));
        assert_eq!(args["c"].as_int_exact(), Some(1024));
        assert_eq!(args["d"].as_int_exact(), Some(1024));
        assert_eq!(args["e"].as_int_exact(), None);
        assert_eq!(args["a"].as_int_exact(), None);
        assert_eq!(
            args["f"].list_elements(),
            Some(vec![Some("x"), None])
        );
        assert_eq!(args["g"], ArgValue::Other(json!(true)));
        assert_eq!(args["g"].list_len(), None);
        assert_eq!(args["h"].list_len(), Some(0));
    }

    #[test]
    fn plan_json_round_trips_and_hash_is_stable() {
        let mut plan = AgentPlan::new("req_round_trip", "scan_assets");
        plan.steps.push(scan_step("s1"));

        let text = must(plan_to_json_pretty(&plan));
        assert!(text.contains("\"rollback_strategy\": \"all_or_nothing\""));
        let parsed = must(parse_plan_json(&text));
        assert_eq!(parsed, plan);
        assert_eq!(must(plan_hash(&parsed)), must(plan_hash(&plan)));
    }

    #[test]
    fn parse_defaults_missing_fields_for_the_contract() {
        let parsed = must(parse_plan_json(
            r#"{"plan_version":1,"request_id":"req_x","intent":"scan","steps":[{"step_id":"s1","tool_name":"ScanAssets"}]}"#,
        ));
        assert!(parsed.steps[0].args.is_none());
        assert_eq!(parsed.steps[0].risk_level, RiskLevel::ReadOnly);
        assert_eq!(
            validate_minimal_contract(&parsed),
            Err(ContractViolation::StepFieldMissing {
                index: 0,
                field: "args"
            })
        );

        assert!(parse_plan_json(r#"{"plan_version":1,"surprise":true}"#).is_err());
        assert!(parse_plan_json(
            r#"{"steps":[{"risk_level":"catastrophic"}]}"#
        )
        .is_err());
    }

    #[test]
    fn risk_level_follows_capability() {
        assert_eq!(
            RiskLevel::from_capability(ToolCapability::Destructive),
            RiskLevel::Destructive
        );
        assert!(RiskLevel::ReadOnly < RiskLevel::Write);
        assert!(RiskLevel::Write < RiskLevel::Destructive);
        assert_eq!(RiskLevel::parse("write"), Some(RiskLevel::Write));
    }
}
