#![forbid(unsafe_code)]

//! Keyword router that compiles free-form user text into a whitelisted plan.

use agent_gate_core::{
    validate_minimal_contract, AgentPlan, ArgValue, ContractViolation, PlanStep, RiskLevel,
    StepArgs, ToolCapability, ToolRegistry, ROLLBACK_ALL_OR_NOTHING,
};

const NAMING_ACTION_KEYWORDS: &[&str] = &[
    "整理", "归档", "重命名", "命名", "organize", "archive", "rename", "naming",
];
const NAMING_TEMP_KEYWORDS: &[&str] = &["临时", "temp", "tmp"];
const LEVEL_SCOPE_KEYWORDS: &[&str] = &["关卡", "场景", "level"];
const LEVEL_RISK_KEYWORDS: &[&str] = &[
    "碰撞",
    "collision",
    "材质丢失",
    "默认材质",
    "default material",
];
const TEXTURE_KEYWORDS: &[&str] = &["贴图", "texture", "分辨率", "npot"];
const LOD_KEYWORDS: &[&str] = &["面数", "lod"];

const EVIDENCE_BEFORE_AFTER: &[&str] = &["asset_path", "before", "after"];

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum PlanBuildError {
    #[error("empty_input")]
    EmptyInput,
    #[error("tool not found in whitelist: {0}")]
    ToolNotFound(String),
    #[error("asset_compliance_route_produced_no_steps")]
    ComplianceRouteProducedNoSteps,
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

/// Which keyword route produced a plan.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PlanRoute {
    NamingTraceabilityTempAssets,
    LevelRiskCollisionMaterial,
    AssetComplianceTextureLod,
    FallbackScanAssets,
}

impl PlanRoute {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NamingTraceabilityTempAssets => "naming_traceability_temp_assets",
            Self::LevelRiskCollisionMaterial => "level_risk_collision_material",
            Self::AssetComplianceTextureLod => "asset_compliance_texture_lod",
            Self::FallbackScanAssets => "fallback_scan_assets",
        }
    }

    #[must_use]
    pub fn intent(self) -> &'static str {
        match self {
            Self::NamingTraceabilityTempAssets => "normalize_temp_assets_by_metadata",
            Self::LevelRiskCollisionMaterial => "scan_level_mesh_risks",
            Self::AssetComplianceTextureLod => "batch_fix_asset_compliance",
            Self::FallbackScanAssets => "scan_assets",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuiltPlan {
    pub plan: AgentPlan,
    pub route: PlanRoute,
}

impl BuiltPlan {
    #[must_use]
    pub fn route_reason(&self) -> &'static str {
        self.route.as_str()
    }
}

/// Classify `text` by keyword groups and build the matching template plan.
///
/// Routes are tried in precedence order: naming of temporary assets, level
/// collision/material risks, texture/LOD compliance, then a read-only scan.
///
/// # Errors
/// Returns an error for blank input, a template tool missing from `registry`,
/// or a plan that fails the minimal contract.
pub fn build_plan_from_text(
    text: &str,
    request_id: &str,
    registry: &ToolRegistry,
) -> Result<BuiltPlan, PlanBuildError> {
    let text = text.trim().to_lowercase();
    if text.is_empty() {
        return Err(PlanBuildError::EmptyInput);
    }

    let route = classify(&text);
    let mut plan = AgentPlan::new(request_id, route.intent());

    match route {
        PlanRoute::NamingTraceabilityTempAssets => {
            plan.steps.push(step_from_tool(
                registry,
                "s1",
                "NormalizeAssetNamingByMetadata",
                naming_args(),
                EVIDENCE_BEFORE_AFTER,
            )?);
        }
        PlanRoute::LevelRiskCollisionMaterial => {
            plan.steps.push(step_from_tool(
                registry,
                "s1",
                "ScanLevelMeshRisks",
                level_risk_args(),
                &["actor_path", "issue", "evidence"],
            )?);
        }
        PlanRoute::AssetComplianceTextureLod => {
            if contains_any(&text, TEXTURE_KEYWORDS) {
                plan.steps.push(step_from_tool(
                    registry,
                    "s1",
                    "SetTextureMaxSize",
                    texture_args(),
                    EVIDENCE_BEFORE_AFTER,
                )?);
            }
            if contains_any(&text, LOD_KEYWORDS) {
                let step_id = if plan.steps.is_empty() { "s1" } else { "s2" };
                plan.steps.push(step_from_tool(
                    registry,
                    step_id,
                    "SetMeshLODGroup",
                    lod_args(),
                    EVIDENCE_BEFORE_AFTER,
                )?);
            }
            if plan.steps.is_empty() {
                return Err(PlanBuildError::ComplianceRouteProducedNoSteps);
            }
        }
        PlanRoute::FallbackScanAssets => {
            plan.steps.push(step_from_tool(
                registry,
                "s1",
                "ScanAssets",
                StepArgs::new(),
                &["asset_path", "result"],
            )?);
        }
    }

    validate_minimal_contract(&plan)?;
    tracing::debug!(
        request_id,
        route = route.as_str(),
        steps = plan.steps.len(),
        "plan built from text"
    );
    Ok(BuiltPlan { plan, route })
}

fn classify(text: &str) -> PlanRoute {
    if contains_any(text, NAMING_ACTION_KEYWORDS) && contains_any(text, NAMING_TEMP_KEYWORDS) {
        PlanRoute::NamingTraceabilityTempAssets
    } else if contains_any(text, LEVEL_SCOPE_KEYWORDS) && contains_any(text, LEVEL_RISK_KEYWORDS)
    {
        PlanRoute::LevelRiskCollisionMaterial
    } else if contains_any(text, TEXTURE_KEYWORDS) || contains_any(text, LOD_KEYWORDS) {
        PlanRoute::AssetComplianceTextureLod
    } else {
        PlanRoute::FallbackScanAssets
    }
}

fn contains_any(text: &str, keywords: &[&str]) -> bool {
    keywords.iter().any(|keyword| text.contains(keyword))
}

fn step_from_tool(
    registry: &ToolRegistry,
    step_id: &str,
    tool_name: &str,
    args: StepArgs,
    expected_evidence: &[&str],
) -> Result<PlanStep, PlanBuildError> {
    let tool = registry
        .find(tool_name)
        .ok_or_else(|| PlanBuildError::ToolNotFound(tool_name.to_string()))?;

    Ok(PlanStep {
        step_id: step_id.to_string(),
        tool_name: tool.tool_name.clone(),
        args: Some(args),
        risk_level: RiskLevel::from_capability(tool.capability),
        requires_confirm: tool.capability != ToolCapability::ReadOnly || tool.destructive,
        rollback_strategy: ROLLBACK_ALL_OR_NOTHING.to_string(),
        expected_evidence: expected_evidence
            .iter()
            .map(|field| (*field).to_string())
            .collect(),
    })
}

fn args(entries: Vec<(&str, ArgValue)>) -> StepArgs {
    entries
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

fn naming_args() -> StepArgs {
    args(vec![
        (
            "asset_paths",
            ArgValue::text_list(&[
                "/Game/Temp/SM_RockTemp_01.SM_RockTemp_01",
                "/Game/Temp/T_DiffuseTemp_01.T_DiffuseTemp_01",
            ]),
        ),
        ("metadata_source", ArgValue::text("auto")),
        ("prefix_mode", ArgValue::text("auto_by_asset_class")),
        ("target_root", ArgValue::text("/Game/Art/Organized")),
    ])
}

fn level_risk_args() -> StepArgs {
    args(vec![
        ("scope", ArgValue::text("selected")),
        (
            "checks",
            ArgValue::text_list(&["missing_collision", "default_material"]),
        ),
        ("max_actor_count", ArgValue::Int(500)),
    ])
}

fn texture_args() -> StepArgs {
    args(vec![
        (
            "asset_paths",
            ArgValue::text_list(&["/Game/Art/Trees/T_Tree_01_D.T_Tree_01_D"]),
        ),
        ("max_size", ArgValue::Int(1024)),
    ])
}

fn lod_args() -> StepArgs {
    args(vec![
        (
            "asset_paths",
            ArgValue::text_list(&["/Game/Art/Props/SM_Rock_01.SM_Rock_01"]),
        ),
        ("lod_group", ArgValue::text("SmallProp")),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ToolRegistry {
        match ToolRegistry::with_defaults() {
            Ok(registry) => registry,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn must(result: Result<BuiltPlan, PlanBuildError>) -> BuiltPlan {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    fn tool_names(built: &BuiltPlan) -> Vec<&str> {
        built
            .plan
            .steps
            .iter()
            .map(|step| step.tool_name.as_str())
            .collect()
    }

    #[test]
    fn naming_route_requires_action_and_temp_keywords() {
        let built = must(build_plan_from_text(
            "整理临时目录资产，按规范命名并归档",
            "req_naming",
            &registry(),
        ));
        assert_eq!(built.plan.intent, "normalize_temp_assets_by_metadata");
        assert_eq!(built.route_reason(), "naming_traceability_temp_assets");
        assert_eq!(tool_names(&built), vec!["NormalizeAssetNamingByMetadata"]);

        let step = &built.plan.steps[0];
        assert!(step.requires_confirm);
        assert_eq!(step.risk_level, RiskLevel::Write);
        assert_eq!(step.rollback_strategy, "all_or_nothing");
        assert_eq!(step.expected_evidence, vec!["asset_path", "before", "after"]);
        assert_eq!(step.count_modify_targets(), 2);

        let without_temp = must(build_plan_from_text(
            "Rename the hero assets",
            "req_rename",
            &registry(),
        ));
        assert_eq!(without_temp.route, PlanRoute::FallbackScanAssets);
    }

    #[test]
    fn level_risk_route_is_read_only() {
        let built = must(build_plan_from_text(
            "  检查当前关卡选中物体的碰撞和默认材质  ",
            "req_level",
            &registry(),
        ));
        assert_eq!(built.plan.intent, "scan_level_mesh_risks");
        assert_eq!(built.route_reason(), "level_risk_collision_material");
        let step = &built.plan.steps[0];
        assert_eq!(step.tool_name, "ScanLevelMeshRisks");
        assert!(!step.requires_confirm);
        assert_eq!(step.risk_level, RiskLevel::ReadOnly);
        let args = step.args.clone().unwrap_or_default();
        assert_eq!(args.get("max_actor_count"), Some(&ArgValue::Int(500)));
        assert_eq!(args.get("scope"), Some(&ArgValue::text("selected")));
    }

    #[test]
    fn compliance_route_emits_texture_and_lod_steps() {
        let both = must(build_plan_from_text(
            "Fix NPOT texture sizes and LOD groups",
            "req_both",
            &registry(),
        ));
        assert_eq!(both.plan.intent, "batch_fix_asset_compliance");
        assert_eq!(tool_names(&both), vec!["SetTextureMaxSize", "SetMeshLODGroup"]);
        assert_eq!(both.plan.steps[1].step_id, "s2");

        let lod_only = must(build_plan_from_text(
            "面数太高",
            "req_lod",
            &registry(),
        ));
        assert_eq!(tool_names(&lod_only), vec!["SetMeshLODGroup"]);
        assert_eq!(lod_only.plan.steps[0].step_id, "s1");
    }

    #[test]
    fn naming_takes_precedence_over_compliance() {
        let built = must(build_plan_from_text(
            "organize temp textures",
            "req_precedence",
            &registry(),
        ));
        assert_eq!(built.route, PlanRoute::NamingTraceabilityTempAssets);
    }

    #[test]
    fn fallback_scans_assets_and_blank_input_fails() {
        let built = must(build_plan_from_text("hello there", "req_fallback", &registry()));
        assert_eq!(built.plan.intent, "scan_assets");
        assert_eq!(tool_names(&built), vec!["ScanAssets"]);
        assert_eq!(built.plan.steps[0].expected_evidence, vec!["asset_path", "result"]);
        assert!(built.plan.steps[0].args.as_ref().is_some_and(StepArgs::is_empty));

        assert_eq!(
            build_plan_from_text("   ", "req_blank", &registry()),
            Err(PlanBuildError::EmptyInput)
        );
    }

    #[test]
    fn missing_tool_and_bad_request_id_are_reported() {
        let empty = ToolRegistry::new();
        assert_eq!(
            build_plan_from_text("texture", "req_missing", &empty)
                .map_err(|err| err.to_string()),
            Err("tool not found in whitelist: SetTextureMaxSize".to_string())
        );
        assert_eq!(
            build_plan_from_text("texture", "", &registry()),
            Err(PlanBuildError::Contract(ContractViolation::RequestIdMissing))
        );
    }

    #[test]
    fn serialized_plan_keeps_template_args() {
        let built = must(build_plan_from_text("texture", "req_json", &registry()));
        let value = match agent_gate_core::plan_to_value(&built.plan) {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        };
        assert_eq!(value["steps"][0]["args"]["max_size"], serde_json::json!(1024));
        assert_eq!(value["steps"][0]["risk_level"], "write");
    }
}
