use agent_gate_core::{
    error_code_sentinel, ErrorCode, ToolDescriptor, ToolRegistry, MAX_ASSET_MODIFY_LIMIT,
    ROLLBACK_ALL_OR_NOTHING,
};
use serde::{Deserialize, Serialize};

pub const UNKNOWN_CAPABILITY: &str = "unknown";
pub const GUEST_ROLE: &str = "Guest";

/// Capability text and write-like flag for a tool. Tools outside the
/// whitelist are treated as write-like with capability `unknown`.
fn capability_of(tool: Option<&ToolDescriptor>) -> (String, bool) {
    match tool {
        Some(tool) => (
            tool.capability.as_str().to_string(),
            tool.capability.is_write_like(),
        ),
        None => (UNKNOWN_CAPABILITY.to_string(), true),
    }
}

/// Fields every gate decision exposes to the local audit log.
pub trait GateDecision {
    fn request_id(&self) -> &str;
    fn tool_name(&self) -> &str;
    fn capability(&self) -> &str;
    fn allowed(&self) -> bool;
    fn error_code(&self) -> Option<ErrorCode>;
    fn reason(&self) -> &str;
    fn asset_count(&self) -> u32;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ConfirmGateInput {
    pub request_id: String,
    pub step_id: String,
    pub tool_name: String,
    pub requires_confirm: bool,
    pub user_confirmed: bool,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct ConfirmDecision {
    pub allowed: bool,
    #[serde(with = "error_code_sentinel")]
    pub error_code: Option<ErrorCode>,
    pub reason: String,
    pub request_id: String,
    pub step_id: String,
    pub tool_name: String,
    pub capability: String,
    pub write_like: bool,
    pub requires_confirm: bool,
    pub user_confirmed: bool,
}

/// Write-like steps need both a confirm requirement and the user's confirmation.
#[must_use]
pub fn evaluate_confirm_gate(input: &ConfirmGateInput, registry: &ToolRegistry) -> ConfirmDecision {
    let tool = registry.find(&input.tool_name);
    let (capability, write_like) = capability_of(tool);
    let mut decision = ConfirmDecision {
        allowed: false,
        error_code: None,
        reason: String::new(),
        request_id: input.request_id.clone(),
        step_id: input.step_id.clone(),
        tool_name: input.tool_name.clone(),
        capability,
        write_like,
        requires_confirm: input.requires_confirm,
        user_confirmed: input.user_confirmed,
    };

    let blocked = if tool.is_none() {
        Some((ErrorCode::ToolNotWhitelisted, "tool_not_whitelisted"))
    } else if !write_like {
        None
    } else if !input.requires_confirm {
        Some((ErrorCode::WriteNotConfirmed, "write_step_requires_confirm"))
    } else if !input.user_confirmed {
        Some((ErrorCode::WriteNotConfirmed, "user_not_confirmed"))
    } else {
        None
    };

    match blocked {
        Some((code, reason)) => {
            decision.error_code = Some(code);
            decision.reason = reason.to_string();
        }
        None => decision.allowed = true,
    }
    decision
}

impl GateDecision for ConfirmDecision {
    fn request_id(&self) -> &str {
        &self.request_id
    }
    fn tool_name(&self) -> &str {
        &self.tool_name
    }
    fn capability(&self) -> &str {
        &self.capability
    }
    fn allowed(&self) -> bool {
        self.allowed
    }
    fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }
    fn reason(&self) -> &str {
        &self.reason
    }
    fn asset_count(&self) -> u32 {
        0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BlastRadiusInput {
    pub request_id: String,
    pub tool_name: String,
    pub target_modify_count: u32,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct BlastRadiusDecision {
    pub allowed: bool,
    #[serde(with = "error_code_sentinel")]
    pub error_code: Option<ErrorCode>,
    pub reason: String,
    pub request_id: String,
    pub tool_name: String,
    pub capability: String,
    pub write_like: bool,
    pub target_modify_count: u32,
    pub max_asset_modify_limit: u32,
}

/// Read-only tools bypass the cap; write-like tools may touch at most
/// [`MAX_ASSET_MODIFY_LIMIT`] objects.
#[must_use]
pub fn evaluate_blast_radius(
    input: &BlastRadiusInput,
    registry: &ToolRegistry,
) -> BlastRadiusDecision {
    let tool = registry.find(&input.tool_name);
    let (capability, write_like) = capability_of(tool);
    let mut decision = BlastRadiusDecision {
        allowed: false,
        error_code: None,
        reason: String::new(),
        request_id: input.request_id.clone(),
        tool_name: input.tool_name.clone(),
        capability,
        write_like,
        target_modify_count: input.target_modify_count,
        max_asset_modify_limit: MAX_ASSET_MODIFY_LIMIT,
    };

    if tool.is_none() {
        decision.error_code = Some(ErrorCode::ToolNotWhitelisted);
        decision.reason = "tool_not_whitelisted".to_string();
    } else if write_like && input.target_modify_count > MAX_ASSET_MODIFY_LIMIT {
        decision.error_code = Some(ErrorCode::ModifyLimitExceeded);
        decision.reason = "modify_limit_exceeded".to_string();
    } else {
        decision.allowed = true;
    }
    decision
}

impl GateDecision for BlastRadiusDecision {
    fn request_id(&self) -> &str {
        &self.request_id
    }
    fn tool_name(&self) -> &str {
        &self.tool_name
    }
    fn capability(&self) -> &str {
        &self.capability
    }
    fn allowed(&self) -> bool {
        self.allowed
    }
    fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }
    fn reason(&self) -> &str {
        &self.reason
    }
    fn asset_count(&self) -> u32 {
        self.target_modify_count
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionStepSimulation {
    pub step_id: String,
    pub tool_name: String,
    pub should_succeed: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionInput {
    pub request_id: String,
    pub steps: Vec<TransactionStepSimulation>,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct TransactionDecision {
    pub committed: bool,
    pub rolled_back: bool,
    #[serde(with = "error_code_sentinel")]
    pub error_code: Option<ErrorCode>,
    pub reason: String,
    pub request_id: String,
    pub transaction_mode: String,
    pub total_steps: usize,
    pub executed_steps: usize,
    pub committed_steps: usize,
    pub rolled_back_steps: usize,
    /// 1-based position of the step that aborted the transaction.
    pub failed_step_index: Option<usize>,
    pub failed_step_id: String,
    pub failed_tool_name: String,
}

impl TransactionDecision {
    fn fail(
        &mut self,
        code: ErrorCode,
        reason: &str,
        index: usize,
        step: &TransactionStepSimulation,
    ) {
        self.error_code = Some(code);
        self.reason = reason.to_string();
        self.failed_step_index = Some(index + 1);
        self.failed_step_id.clone_from(&step.step_id);
        self.failed_tool_name.clone_from(&step.tool_name);
    }
}

/// Simulate an all-or-nothing run: whitelist preflight over every step, then
/// execution in order until the first failing step rolls everything back.
#[must_use]
pub fn evaluate_all_or_nothing_transaction(
    input: &TransactionInput,
    registry: &ToolRegistry,
) -> TransactionDecision {
    let mut decision = TransactionDecision {
        committed: false,
        rolled_back: false,
        error_code: None,
        reason: String::new(),
        request_id: input.request_id.clone(),
        transaction_mode: ROLLBACK_ALL_OR_NOTHING.to_string(),
        total_steps: input.steps.len(),
        executed_steps: 0,
        committed_steps: 0,
        rolled_back_steps: 0,
        failed_step_index: None,
        failed_step_id: String::new(),
        failed_tool_name: String::new(),
    };

    if let Some((index, step)) = input
        .steps
        .iter()
        .enumerate()
        .find(|(_, step)| !registry.is_whitelisted(&step.tool_name))
    {
        decision.fail(ErrorCode::ToolNotWhitelisted, "tool_not_whitelisted", index, step);
        return decision;
    }

    let mut succeeded = 0;
    for (index, step) in input.steps.iter().enumerate() {
        decision.executed_steps = index + 1;
        if !step.should_succeed {
            decision.rolled_back = true;
            decision.rolled_back_steps = succeeded;
            decision.fail(
                ErrorCode::TransactionRolledBack,
                "step_failed_all_or_nothing_rollback",
                index,
                step,
            );
            return decision;
        }
        succeeded += 1;
    }

    decision.committed = true;
    decision.committed_steps = succeeded;
    decision.reason = "all_steps_committed".to_string();
    decision
}

impl GateDecision for TransactionDecision {
    fn request_id(&self) -> &str {
        &self.request_id
    }
    fn tool_name(&self) -> &str {
        &self.failed_tool_name
    }
    fn capability(&self) -> &str {
        "-"
    }
    fn allowed(&self) -> bool {
        self.committed
    }
    fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }
    fn reason(&self) -> &str {
        &self.reason
    }
    fn asset_count(&self) -> u32 {
        u32::try_from(self.total_steps).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SourceControlInput {
    pub request_id: String,
    pub tool_name: String,
    pub source_control_enabled: bool,
    pub checkout_succeeded: bool,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct SourceControlDecision {
    pub allowed: bool,
    #[serde(with = "error_code_sentinel")]
    pub error_code: Option<ErrorCode>,
    pub reason: String,
    pub request_id: String,
    pub tool_name: String,
    pub capability: String,
    pub write_like: bool,
    pub source_control_enabled: bool,
    pub offline_local_mode: bool,
    pub checkout_attempted: bool,
    pub checkout_succeeded: bool,
}

/// Write-like tools must check out their targets when source control is on;
/// a failed checkout blocks the step instead of continuing locally.
#[must_use]
pub fn evaluate_source_control_fail_fast(
    input: &SourceControlInput,
    registry: &ToolRegistry,
) -> SourceControlDecision {
    let tool = registry.find(&input.tool_name);
    let (capability, write_like) = capability_of(tool);
    let mut decision = SourceControlDecision {
        allowed: false,
        error_code: None,
        reason: String::new(),
        request_id: input.request_id.clone(),
        tool_name: input.tool_name.clone(),
        capability,
        write_like,
        source_control_enabled: input.source_control_enabled,
        offline_local_mode: false,
        checkout_attempted: false,
        checkout_succeeded: false,
    };

    if tool.is_none() {
        decision.error_code = Some(ErrorCode::ToolNotWhitelisted);
        decision.reason = "tool_not_whitelisted".to_string();
        return decision;
    }
    if !write_like {
        decision.allowed = true;
        return decision;
    }
    if !input.source_control_enabled {
        decision.allowed = true;
        decision.offline_local_mode = true;
        decision.reason = "source_control_disabled_offline_local_mode".to_string();
        return decision;
    }

    decision.checkout_attempted = true;
    decision.checkout_succeeded = input.checkout_succeeded;
    if input.checkout_succeeded {
        decision.allowed = true;
        decision.reason = "checkout_succeeded".to_string();
    } else {
        decision.error_code = Some(ErrorCode::SourceControlCheckoutFailed);
        decision.reason = "source_control_checkout_failed_fail_fast".to_string();
    }
    decision
}

impl GateDecision for SourceControlDecision {
    fn request_id(&self) -> &str {
        &self.request_id
    }
    fn tool_name(&self) -> &str {
        &self.tool_name
    }
    fn capability(&self) -> &str {
        &self.capability
    }
    fn allowed(&self) -> bool {
        self.allowed
    }
    fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }
    fn reason(&self) -> &str {
        &self.reason
    }
    fn asset_count(&self) -> u32 {
        0
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RbacInput {
    pub request_id: String,
    pub user_name: String,
    pub resolved_role: String,
    pub user_matched_whitelist: bool,
    pub tool_name: String,
    pub target_asset_count: u32,
    pub allowed_capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct RbacDecision {
    pub allowed: bool,
    #[serde(with = "error_code_sentinel")]
    pub error_code: Option<ErrorCode>,
    pub reason: String,
    pub request_id: String,
    pub user_name: String,
    pub resolved_role: String,
    pub user_matched_whitelist: bool,
    pub guest_fallback: bool,
    pub tool_name: String,
    pub capability: String,
    pub write_like: bool,
    pub target_asset_count: u32,
}

/// Role check against the caller's allowed capabilities. Users missing from
/// the whitelist act as guests.
#[must_use]
pub fn evaluate_mock_rbac(input: &RbacInput, registry: &ToolRegistry) -> RbacDecision {
    let tool = registry.find(&input.tool_name);
    let (capability, write_like) = capability_of(tool);
    let resolved_role = if input.resolved_role.is_empty() {
        GUEST_ROLE.to_string()
    } else {
        input.resolved_role.clone()
    };
    let guest_fallback = !input.user_matched_whitelist;
    let mut decision = RbacDecision {
        allowed: false,
        error_code: None,
        reason: String::new(),
        request_id: input.request_id.clone(),
        user_name: input.user_name.clone(),
        resolved_role,
        user_matched_whitelist: input.user_matched_whitelist,
        guest_fallback,
        tool_name: input.tool_name.clone(),
        capability,
        write_like,
        target_asset_count: input.target_asset_count,
    };

    if tool.is_none() {
        decision.error_code = Some(ErrorCode::ToolNotWhitelisted);
        decision.reason = "tool_not_whitelisted".to_string();
        return decision;
    }

    let permitted = input
        .allowed_capabilities
        .iter()
        .any(|allowed| allowed.eq_ignore_ascii_case(&decision.capability));
    if permitted {
        decision.allowed = true;
        decision.reason = if guest_fallback && !write_like {
            "guest_read_only_allowed"
        } else {
            "rbac_allowed"
        }
        .to_string();
    } else {
        decision.error_code = Some(ErrorCode::RbacDenied);
        decision.reason = if guest_fallback && write_like {
            "guest_read_only_write_blocked"
        } else {
            "capability_not_allowed_by_role"
        }
        .to_string();
    }
    decision
}

impl GateDecision for RbacDecision {
    fn request_id(&self) -> &str {
        &self.request_id
    }
    fn tool_name(&self) -> &str {
        &self.tool_name
    }
    fn capability(&self) -> &str {
        &self.capability
    }
    fn allowed(&self) -> bool {
        self.allowed
    }
    fn error_code(&self) -> Option<ErrorCode> {
        self.error_code
    }
    fn reason(&self) -> &str {
        &self.reason
    }
    fn asset_count(&self) -> u32 {
        self.target_asset_count
    }
}
