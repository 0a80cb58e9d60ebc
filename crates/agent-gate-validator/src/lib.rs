#![forbid(unsafe_code)]

//! Fail-fast plan validation against the whitelisted tool registry.
//!
//! Checks run in a fixed order: minimal contract, then per step the tool
//! lookup, risk level, confirmation flag, argument schema, the naming
//! metadata safety check and finally the cumulative modify limit. The first
//! violation ends validation.

use std::collections::BTreeSet;

use agent_gate_core::{
    error_code_sentinel, validate_minimal_contract, AgentPlan, ArgSchema, ArgValue, ArgValueType,
    ErrorCode, PlanStep, RiskLevel, ToolDescriptor, ToolRegistry, MAX_ASSET_MODIFY_LIMIT,
    WORKSPACE_ROOT_PREFIX,
};
use regex::Regex;
use serde::Serialize;

const NAMING_TOOL: &str = "NormalizeAssetNamingByMetadata";
const LEVEL_RISK_TOOL: &str = "ScanLevelMeshRisks";

/// Injected knowledge the validator cannot derive from the plan itself.
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ValidationContext {
    /// Asset paths whose import metadata is known to be unavailable; a naming
    /// step touching any of them cannot produce a safe proposal.
    pub metadata_unavailable_asset_paths: BTreeSet<String>,
}

impl ValidationContext {
    #[must_use]
    pub fn with_metadata_unavailable<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            metadata_unavailable_asset_paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(with = "error_code_sentinel")]
    pub error_code: Option<ErrorCode>,
    pub field: String,
    pub reason: String,
    pub request_id: String,
    pub intent: String,
    pub plan_version: i64,
    pub step_count: usize,
    pub validated_step_count: usize,
    pub write_like_step_count: usize,
    pub total_target_modify_count: u32,
    pub max_risk_level: RiskLevel,
    pub failed_step_index: Option<usize>,
    pub failed_step_id: String,
    pub failed_tool_name: String,
}

impl ValidationResult {
    fn from_plan(plan: &AgentPlan) -> Self {
        Self {
            valid: false,
            error_code: None,
            field: "-".to_string(),
            reason: "ok".to_string(),
            request_id: plan.request_id.clone(),
            intent: plan.intent.clone(),
            plan_version: plan.plan_version,
            step_count: plan.steps.len(),
            validated_step_count: 0,
            write_like_step_count: 0,
            total_target_modify_count: 0,
            max_risk_level: RiskLevel::ReadOnly,
            failed_step_index: None,
            failed_step_id: String::new(),
            failed_tool_name: String::new(),
        }
    }

    fn record_failure(&mut self, failure: Failure, step: Option<(usize, &PlanStep)>) {
        self.valid = false;
        self.error_code = Some(failure.code);
        self.field = failure.field;
        self.reason = failure.reason;
        if let Some((index, step)) = step {
            self.failed_step_index = Some(index);
            self.failed_step_id.clone_from(&step.step_id);
            self.failed_tool_name.clone_from(&step.tool_name);
        }
    }
}

#[derive(Debug)]
struct Failure {
    code: ErrorCode,
    field: String,
    reason: String,
}

impl Failure {
    fn new(code: ErrorCode, field: String, reason: &str) -> Self {
        Self {
            code,
            field,
            reason: reason.to_string(),
        }
    }
}

/// Validate `plan` step by step, stopping at the first violation.
///
/// # Errors
/// Returns the populated result with `valid = false` on the first violation.
#[allow(clippy::result_large_err)]
pub fn validate_plan(
    plan: &AgentPlan,
    registry: &ToolRegistry,
    context: &ValidationContext,
) -> Result<ValidationResult, ValidationResult> {
    let mut result = ValidationResult::from_plan(plan);

    if let Err(violation) = validate_minimal_contract(plan) {
        let failure = Failure {
            code: ErrorCode::MissingRequiredField,
            field: violation.field_path(),
            reason: violation.to_string(),
        };
        result.record_failure(failure, None);
        return Err(result);
    }

    for (index, step) in plan.steps.iter().enumerate() {
        if let Err(failure) = validate_step(step, index, registry, context, &mut result) {
            result.record_failure(failure, Some((index, step)));
            return Err(result);
        }
    }

    result.valid = true;
    result.error_code = None;
    "-".clone_into(&mut result.field);
    "ok".clone_into(&mut result.reason);
    Ok(result)
}

fn validate_step(
    step: &PlanStep,
    index: usize,
    registry: &ToolRegistry,
    context: &ValidationContext,
    result: &mut ValidationResult,
) -> Result<(), Failure> {
    let tool = registry.find(&step.tool_name).ok_or_else(|| {
        Failure::new(
            ErrorCode::ToolNotWhitelisted,
            format!("steps[{index}].tool_name"),
            "tool_not_whitelisted",
        )
    })?;

    if step.risk_level != RiskLevel::from_capability(tool.capability) {
        return Err(Failure::new(
            ErrorCode::TypeMismatch,
            format!("steps[{index}].risk_level"),
            "risk_level_mismatch_with_tool_capability",
        ));
    }

    let write_like = tool.capability.is_write_like();
    if step.requires_confirm != write_like {
        return Err(Failure::new(
            ErrorCode::TypeMismatch,
            format!("steps[{index}].requires_confirm"),
            "requires_confirm_mismatch_with_tool_capability",
        ));
    }

    validate_args(tool, step, index)?;
    check_naming_metadata(step, index, context)?;

    if write_like {
        result.write_like_step_count += 1;
        result.total_target_modify_count = result
            .total_target_modify_count
            .saturating_add(step.count_modify_targets());
        if result.total_target_modify_count > MAX_ASSET_MODIFY_LIMIT {
            return Err(Failure::new(
                ErrorCode::ModifyLimitExceeded,
                format!("steps[{index}].args.asset_paths"),
                "modify_limit_exceeded",
            ));
        }
    }

    result.max_risk_level = result.max_risk_level.max(step.risk_level);
    result.validated_step_count += 1;
    Ok(())
}

/// `ScanLevelMeshRisks` reports type and enum violations on `scope` and
/// `checks` with their own code so level-risk callers can match on it.
fn is_level_risk_special_arg(tool_name: &str, arg_name: &str) -> bool {
    tool_name == LEVEL_RISK_TOOL && matches!(arg_name, "scope" | "checks")
}

fn type_error_code(tool_name: &str, arg_name: &str) -> ErrorCode {
    if is_level_risk_special_arg(tool_name, arg_name) {
        ErrorCode::LevelRiskArgViolation
    } else {
        ErrorCode::TypeMismatch
    }
}

fn param_error_code(tool_name: &str, arg_name: &str) -> ErrorCode {
    if is_level_risk_special_arg(tool_name, arg_name) {
        ErrorCode::LevelRiskArgViolation
    } else {
        ErrorCode::ArgConstraintViolation
    }
}

fn validate_args(tool: &ToolDescriptor, step: &PlanStep, index: usize) -> Result<(), Failure> {
    let Some(args) = &step.args else {
        return Err(Failure::new(
            ErrorCode::MissingRequiredField,
            format!("steps[{index}].args"),
            "args_missing",
        ));
    };

    if let Some(undeclared) = args.keys().find(|name| tool.find_arg(name).is_none()) {
        return Err(Failure::new(
            ErrorCode::ArgConstraintViolation,
            arg_field(index, undeclared),
            "arg_not_declared_in_schema",
        ));
    }

    for schema in &tool.args {
        let Some(value) = args.get(&schema.name) else {
            if schema.required {
                return Err(Failure::new(
                    ErrorCode::MissingRequiredField,
                    arg_field(index, &schema.name),
                    "required_arg_missing",
                ));
            }
            continue;
        };

        let field = arg_field(index, &schema.name);
        match schema.value_type {
            ArgValueType::String => {
                let text = value.as_text().ok_or_else(|| {
                    Failure::new(
                        type_error_code(&tool.tool_name, &schema.name),
                        field.clone(),
                        "arg_type_mismatch_expected_string",
                    )
                })?;
                validate_string(&tool.tool_name, schema, text, &field)?;
            }
            ArgValueType::StringArray => {
                validate_string_array(&tool.tool_name, schema, value, &field)?;
            }
            ArgValueType::Int => validate_int(schema, value, &field)?,
        }
    }
    Ok(())
}

fn validate_string(
    tool_name: &str,
    schema: &ArgSchema,
    text: &str,
    field: &str,
) -> Result<(), Failure> {
    let length = text.chars().count();
    let too_short = schema
        .min_string_len
        .is_some_and(|min| length < min as usize);
    if too_short {
        return Err(Failure::new(
            ErrorCode::ArgConstraintViolation,
            field.to_string(),
            "string_too_short",
        ));
    }
    let too_long = schema
        .max_string_len
        .is_some_and(|max| length > max as usize);
    if too_long {
        return Err(Failure::new(
            ErrorCode::ArgConstraintViolation,
            field.to_string(),
            "string_too_long",
        ));
    }
    if let Some(pattern) = &schema.regex_pattern {
        if !matches_whole(pattern, text) {
            return Err(Failure::new(
                ErrorCode::ArgConstraintViolation,
                field.to_string(),
                "regex_mismatch",
            ));
        }
    }
    if schema.must_start_with_workspace_root && !text.starts_with(WORKSPACE_ROOT_PREFIX) {
        return Err(Failure::new(
            ErrorCode::ArgConstraintViolation,
            field.to_string(),
            "must_start_with_game_path",
        ));
    }
    if !schema.allowed_string_values.is_empty()
        && !schema.allowed_string_values.iter().any(|allowed| allowed == text)
    {
        return Err(Failure::new(
            param_error_code(tool_name, &schema.name),
            field.to_string(),
            "enum_value_not_allowed",
        ));
    }
    Ok(())
}

fn validate_string_array(
    tool_name: &str,
    schema: &ArgSchema,
    value: &ArgValue,
    field: &str,
) -> Result<(), Failure> {
    let elements = value.list_elements().ok_or_else(|| {
        Failure::new(
            type_error_code(tool_name, &schema.name),
            field.to_string(),
            "arg_type_mismatch_expected_string_array",
        )
    })?;

    if schema
        .min_array_len
        .is_some_and(|min| elements.len() < min as usize)
    {
        return Err(Failure::new(
            param_error_code(tool_name, &schema.name),
            field.to_string(),
            "array_too_short",
        ));
    }
    if schema
        .max_array_len
        .is_some_and(|max| elements.len() > max as usize)
    {
        return Err(Failure::new(
            param_error_code(tool_name, &schema.name),
            field.to_string(),
            "array_too_long",
        ));
    }

    for (element_index, element) in elements.into_iter().enumerate() {
        let element_field = format!("{field}[{element_index}]");
        let Some(text) = element else {
            return Err(Failure::new(
                type_error_code(tool_name, &schema.name),
                element_field,
                "array_element_type_mismatch_expected_string",
            ));
        };
        if schema.must_start_with_workspace_root && !text.starts_with(WORKSPACE_ROOT_PREFIX) {
            return Err(Failure::new(
                ErrorCode::ArgConstraintViolation,
                element_field,
                "must_start_with_game_path",
            ));
        }
        if !schema.allowed_string_values.is_empty()
            && !schema.allowed_string_values.iter().any(|allowed| allowed == text)
        {
            return Err(Failure::new(
                param_error_code(tool_name, &schema.name),
                element_field,
                "enum_value_not_allowed",
            ));
        }
    }
    Ok(())
}

fn validate_int(schema: &ArgSchema, value: &ArgValue, field: &str) -> Result<(), Failure> {
    let int = value.as_int_exact().ok_or_else(|| {
        Failure::new(
            ErrorCode::TypeMismatch,
            field.to_string(),
            "arg_type_mismatch_expected_int",
        )
    })?;

    let reason = if !schema.allowed_int_values.is_empty()
        && !schema.allowed_int_values.contains(&int)
    {
        Some("enum_value_not_allowed")
    } else if schema.min_int_value.is_some_and(|min| int < min) {
        Some("int_below_min")
    } else if schema.max_int_value.is_some_and(|max| int > max) {
        Some("int_above_max")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(Failure::new(
            ErrorCode::ArgConstraintViolation,
            field.to_string(),
            reason,
        )),
        None => Ok(()),
    }
}

fn check_naming_metadata(
    step: &PlanStep,
    index: usize,
    context: &ValidationContext,
) -> Result<(), Failure> {
    if step.tool_name != NAMING_TOOL || context.metadata_unavailable_asset_paths.is_empty() {
        return Ok(());
    }
    let Some(elements) = step
        .args
        .as_ref()
        .and_then(|args| args.get("asset_paths"))
        .and_then(ArgValue::list_elements)
    else {
        return Ok(());
    };

    let blocked = elements
        .into_iter()
        .flatten()
        .any(|path| context.metadata_unavailable_asset_paths.contains(path));
    if blocked {
        return Err(Failure::new(
            ErrorCode::NamingMetadataInsufficient,
            arg_field(index, "asset_paths"),
            "naming_metadata_insufficient_no_safe_proposal",
        ));
    }
    Ok(())
}

/// The leftmost match must cover the whole value.
fn matches_whole(pattern: &str, text: &str) -> bool {
    match Regex::new(pattern) {
        Ok(regex) => regex
            .find(text)
            .is_some_and(|found| found.start() == 0 && found.end() == text.len()),
        Err(err) => {
            tracing::warn!(pattern, error = %err, "invalid regex pattern in tool schema");
            false
        }
    }
}

fn arg_field(index: usize, arg_name: &str) -> String {
    format!("steps[{index}].args.{arg_name}")
}
