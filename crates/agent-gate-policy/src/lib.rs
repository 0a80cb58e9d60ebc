#![forbid(unsafe_code)]
//! Execution gate for agent plans.
//!
//! Each gate is a pure function over its input and the tool registry. The
//! gates are independent; callers compose them in whatever order their
//! execution surface needs and record every decision as a
//! [`LocalAuditLogRecord`].

mod audit_log;
mod config;
mod gate;

pub use audit_log::{
    serialize_audit_log_json_line, LocalAuditLogRecord, RESULT_ALLOWED, RESULT_BLOCKED,
};
pub use config::{
    load_gateway_config, parse_gateway_config_yaml, GatewayConfig, RbacConfig, RbacIdentity,
    RbacUser, SourceControlConfig,
};
pub use gate::{
    evaluate_all_or_nothing_transaction, evaluate_blast_radius, evaluate_confirm_gate,
    evaluate_mock_rbac, evaluate_source_control_fail_fast, BlastRadiusDecision, BlastRadiusInput,
    ConfirmDecision, ConfirmGateInput, GateDecision, RbacDecision, RbacInput,
    SourceControlDecision, SourceControlInput, TransactionDecision, TransactionInput,
    TransactionStepSimulation, GUEST_ROLE, UNKNOWN_CAPABILITY,
};

impl RbacIdentity {
    /// RBAC gate input for this identity acting on `tool_name`.
    #[must_use]
    pub fn rbac_input(&self, request_id: &str, tool_name: &str, target_asset_count: u32) -> RbacInput {
        RbacInput {
            request_id: request_id.to_string(),
            user_name: self.user_name.clone(),
            resolved_role: self.resolved_role.clone(),
            user_matched_whitelist: self.matched_whitelist,
            tool_name: tool_name.to_string(),
            target_asset_count,
            allowed_capabilities: self.allowed_capabilities.clone(),
        }
    }
}
