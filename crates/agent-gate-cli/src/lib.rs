//! Command surface of the `agate` binary.
//!
//! Every command prints one pretty JSON document to stdout. Diagnostics go to
//! stderr through `tracing`, so stdout stays machine-readable. Hosts that
//! embed the gateway can call [`run_cli`] with a parsed [`Cli`].

use std::fs;
use std::path::{Path, PathBuf};

use agent_gate_audit::{
    build_report, load_asset_catalog, report_to_value, run_batched_audit, AuditRuleRegistry,
    DEFAULT_BATCH_SIZE,
};
use agent_gate_core::{
    new_request_id, parse_plan_json, plan_hash, plan_to_value, AgentPlan, DryRunDiffReport,
    ToolRegistry,
};
use agent_gate_planner::build_plan_from_text;
use agent_gate_policy::{
    evaluate_all_or_nothing_transaction, evaluate_blast_radius, evaluate_confirm_gate,
    evaluate_mock_rbac, evaluate_source_control_fail_fast, load_gateway_config,
    BlastRadiusInput, ConfirmGateInput, GateDecision, GatewayConfig, LocalAuditLogRecord,
    RbacIdentity, SourceControlInput, TransactionInput, TransactionStepSimulation,
};
use agent_gate_search::{load_kit_directory, SearchIndexService, DEFAULT_TOP_K};
use agent_gate_trail_core::{AuditTrailStore, TrailEntry};
use agent_gate_trail_sqlite::SqliteAuditTrailStore;
use agent_gate_validator::{validate_plan, ValidationContext};
use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::{json, Value};

pub const EXIT_OK: u8 = 0;
pub const EXIT_INVALID_PLAN: u8 = 2;

const DEFAULT_USER: &str = "anonymous";

#[derive(Debug, Parser)]
#[command(name = "agate")]
#[command(about = "Agent execution safety gateway")]
pub struct Cli {
    /// Gateway config (YAML); built-in defaults when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// `SQLite` audit-trail database.
    #[arg(long, global = true, default_value = "./agent_gate_trail.sqlite3")]
    trail: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Tools {
        #[command(subcommand)]
        command: ToolsCommand,
    },
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },
    Gate {
        #[command(subcommand)]
        command: GateCommand,
    },
    DryRun {
        #[command(subcommand)]
        command: DryRunCommand,
    },
    Audit {
        #[command(subcommand)]
        command: AuditCommand,
    },
    Search {
        #[command(subcommand)]
        command: SearchCommand,
    },
    Trail {
        #[command(subcommand)]
        command: TrailCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum ToolsCommand {
    List,
}

#[derive(Debug, Subcommand)]
pub enum PlanCommand {
    Build(PlanBuildArgs),
    Validate(PlanValidateArgs),
}

#[derive(Debug, Args)]
pub struct PlanBuildArgs {
    #[arg(long)]
    text: String,
    #[arg(long)]
    request_id: Option<String>,
}

#[derive(Debug, Args)]
pub struct PlanValidateArgs {
    #[arg(long)]
    plan: PathBuf,
    #[arg(long = "metadata-unavailable")]
    metadata_unavailable: Vec<String>,
}

#[derive(Debug, Subcommand)]
pub enum GateCommand {
    Confirm(ConfirmArgs),
    BlastRadius(BlastRadiusArgs),
    SourceControl(SourceControlArgs),
    Rbac(RbacArgs),
    Transaction(TransactionArgs),
}

#[derive(Debug, Args)]
pub struct GateCommonArgs {
    #[arg(long)]
    request_id: Option<String>,
    #[arg(long, default_value = DEFAULT_USER)]
    user: String,
    /// Append the decision to the audit trail.
    #[arg(long)]
    record: bool,
}

#[derive(Debug, Args)]
pub struct ConfirmArgs {
    #[arg(long)]
    tool: String,
    #[arg(long, default_value = "s1")]
    step_id: String,
    #[arg(long)]
    requires_confirm: bool,
    #[arg(long)]
    user_confirmed: bool,
    #[command(flatten)]
    common: GateCommonArgs,
}

#[derive(Debug, Args)]
pub struct BlastRadiusArgs {
    #[arg(long)]
    tool: String,
    #[arg(long)]
    target_count: u32,
    #[command(flatten)]
    common: GateCommonArgs,
}

#[derive(Debug, Args)]
pub struct SourceControlArgs {
    #[arg(long)]
    tool: String,
    #[arg(long)]
    checkout_failed: bool,
    #[command(flatten)]
    common: GateCommonArgs,
}

#[derive(Debug, Args)]
pub struct RbacArgs {
    #[arg(long)]
    tool: String,
    #[arg(long, default_value_t = 1)]
    target_count: u32,
    #[command(flatten)]
    common: GateCommonArgs,
}

#[derive(Debug, Args)]
pub struct TransactionArgs {
    #[arg(long)]
    plan: PathBuf,
    /// Simulate a failure at this step id.
    #[arg(long)]
    fail_step: Option<String>,
    #[command(flatten)]
    common: GateCommonArgs,
}

#[derive(Debug, Subcommand)]
pub enum DryRunCommand {
    Diff(DryRunDiffArgs),
}

#[derive(Debug, Args)]
pub struct DryRunDiffArgs {
    #[arg(long)]
    input: PathBuf,
}

#[derive(Debug, Subcommand)]
pub enum AuditCommand {
    Scan(AuditScanArgs),
}

#[derive(Debug, Args)]
pub struct AuditScanArgs {
    #[arg(long)]
    catalog: PathBuf,
    #[arg(long)]
    run_id: Option<String>,
    #[arg(long = "disable-rule")]
    disable_rules: Vec<String>,
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
}

#[derive(Debug, Subcommand)]
pub enum SearchCommand {
    Query(SearchQueryArgs),
}

#[derive(Debug, Args)]
pub struct SearchQueryArgs {
    #[arg(long)]
    kits: PathBuf,
    #[arg(long)]
    text: String,
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    top_k: usize,
}

#[derive(Debug, Subcommand)]
pub enum TrailCommand {
    List(TrailListArgs),
}

#[derive(Debug, Args)]
pub struct TrailListArgs {
    #[arg(long)]
    limit: Option<usize>,
}

/// Executes the parsed command and returns the process exit status.
///
/// # Errors
/// Returns an error when loading inputs, configuration or the audit trail
/// fails, or when a command cannot produce its output.
pub fn run_cli(cli: Cli) -> Result<u8> {
    let config = load_config(cli.config.as_deref())?;
    let registry = ToolRegistry::with_defaults()?;

    match cli.command {
        Command::Tools {
            command: ToolsCommand::List,
        } => {
            print_json(&json!({
                "tool_count": registry.tools().len(),
                "tools": registry.tools(),
            }))?;
            Ok(EXIT_OK)
        }
        Command::Plan { command } => run_plan(command, &registry),
        Command::Gate { command } => run_gate(command, &registry, &config, &cli.trail),
        Command::DryRun {
            command: DryRunCommand::Diff(args),
        } => {
            let raw = fs::read_to_string(&args.input)
                .with_context(|| format!("failed to read dry-run diff {}", args.input.display()))?;
            let mut report: DryRunDiffReport = serde_json::from_str(&raw)
                .map_err(|err| anyhow!("invalid dry-run diff JSON structure: {err}"))?;
            report.normalize_and_finalize();
            println!("{}", report.to_json_pretty()?);
            Ok(EXIT_OK)
        }
        Command::Audit {
            command: AuditCommand::Scan(args),
        } => run_audit_scan(&args),
        Command::Search {
            command: SearchCommand::Query(args),
        } => run_search_query(&args),
        Command::Trail {
            command: TrailCommand::List(args),
        } => {
            let store = open_trail(&cli.trail)?;
            print_json(&store.list(args.limit)?)?;
            Ok(EXIT_OK)
        }
    }
}

fn run_plan(command: PlanCommand, registry: &ToolRegistry) -> Result<u8> {
    match command {
        PlanCommand::Build(args) => {
            let request_id = args.request_id.unwrap_or_else(new_request_id);
            let built = build_plan_from_text(&args.text, &request_id, registry)?;
            print_json(&json!({
                "route_reason": built.route_reason(),
                "plan_hash": plan_hash(&built.plan)?,
                "plan": plan_to_value(&built.plan)?,
            }))?;
            Ok(EXIT_OK)
        }
        PlanCommand::Validate(args) => {
            let plan = read_plan(&args.plan)?;
            let context = ValidationContext::with_metadata_unavailable(args.metadata_unavailable);
            let (result, exit_code) = match validate_plan(&plan, registry, &context) {
                Ok(result) => (result, EXIT_OK),
                Err(result) => {
                    tracing::warn!(
                        error_code = %agent_gate_core::error_code_text(result.error_code),
                        field = %result.field,
                        reason = %result.reason,
                        "plan validation failed"
                    );
                    (result, EXIT_INVALID_PLAN)
                }
            };
            let mut value = serde_json::to_value(&result)?;
            insert_field(&mut value, "plan_hash", json!(plan_hash(&plan)?));
            print_json(&value)?;
            Ok(exit_code)
        }
    }
}

fn run_gate(
    command: GateCommand,
    registry: &ToolRegistry,
    config: &GatewayConfig,
    trail: &Path,
) -> Result<u8> {
    match command {
        GateCommand::Confirm(args) => {
            let decision = evaluate_confirm_gate(
                &ConfirmGateInput {
                    request_id: request_id_or_new(args.common.request_id.as_deref()),
                    step_id: args.step_id,
                    tool_name: args.tool,
                    requires_confirm: args.requires_confirm,
                    user_confirmed: args.user_confirmed,
                },
                registry,
            );
            emit_decision(&decision, &args.common, config, None, trail)
        }
        GateCommand::BlastRadius(args) => {
            let decision = evaluate_blast_radius(
                &BlastRadiusInput {
                    request_id: request_id_or_new(args.common.request_id.as_deref()),
                    tool_name: args.tool,
                    target_modify_count: args.target_count,
                },
                registry,
            );
            emit_decision(&decision, &args.common, config, None, trail)
        }
        GateCommand::SourceControl(args) => {
            let decision = evaluate_source_control_fail_fast(
                &SourceControlInput {
                    request_id: request_id_or_new(args.common.request_id.as_deref()),
                    tool_name: args.tool,
                    source_control_enabled: config.source_control.enabled,
                    checkout_succeeded: !args.checkout_failed,
                },
                registry,
            );
            emit_decision(&decision, &args.common, config, None, trail)
        }
        GateCommand::Rbac(args) => {
            let identity = config.resolve_identity(&args.common.user);
            let request_id = request_id_or_new(args.common.request_id.as_deref());
            let decision = evaluate_mock_rbac(
                &identity.rbac_input(&request_id, &args.tool, args.target_count),
                registry,
            );
            emit_decision(&decision, &args.common, config, None, trail)
        }
        GateCommand::Transaction(args) => {
            let plan = read_plan(&args.plan)?;
            let input = transaction_input(
                &plan,
                args.common.request_id.as_deref(),
                args.fail_step.as_deref(),
            );
            let decision = evaluate_all_or_nothing_transaction(&input, registry);
            emit_decision(&decision, &args.common, config, Some(plan_hash(&plan)?), trail)
        }
    }
}

/// Simulation input for `plan`: every step succeeds except `fail_step`.
#[must_use]
pub fn transaction_input(
    plan: &AgentPlan,
    request_id: Option<&str>,
    fail_step: Option<&str>,
) -> TransactionInput {
    TransactionInput {
        request_id: request_id.map_or_else(|| plan.request_id.clone(), str::to_string),
        steps: plan
            .steps
            .iter()
            .map(|step| TransactionStepSimulation {
                step_id: step.step_id.clone(),
                tool_name: step.tool_name.clone(),
                should_succeed: fail_step != Some(step.step_id.as_str()),
            })
            .collect(),
    }
}

fn emit_decision<D: GateDecision + Serialize>(
    decision: &D,
    common: &GateCommonArgs,
    config: &GatewayConfig,
    plan_hash: Option<String>,
    trail: &Path,
) -> Result<u8> {
    let mut value = serde_json::to_value(decision)?;
    if common.record {
        let identity: RbacIdentity = config.resolve_identity(&common.user);
        let record = LocalAuditLogRecord::from_decision(
            decision,
            &identity.user_name,
            &identity.resolved_role,
        )?;
        let store = open_trail(trail)?;
        let sequence = store.append(&TrailEntry::new(record, plan_hash))?;
        insert_field(&mut value, "trail_sequence", json!(sequence));
    }
    print_json(&value)?;
    Ok(EXIT_OK)
}

fn run_audit_scan(args: &AuditScanArgs) -> Result<u8> {
    let catalog = load_asset_catalog(&args.catalog)?;
    let mut registry = AuditRuleRegistry::with_defaults();
    for rule_id in &args.disable_rules {
        registry.set_rule_enabled(rule_id, false)?;
    }

    let run = run_batched_audit(&catalog, &registry, args.batch_size)?;
    let report = build_report(&run.snapshot, args.run_id.as_deref())?;
    print_json(&json!({
        "scan_summary": run.snapshot.stats.summary(),
        "perf": run.perf,
        "report": report_to_value(&report)?,
    }))?;
    Ok(EXIT_OK)
}

fn run_search_query(args: &SearchQueryArgs) -> Result<u8> {
    let directory = load_kit_directory(&args.kits)?;
    let skipped: Vec<String> = directory
        .failures
        .iter()
        .map(ToString::to_string)
        .collect();

    let mut service = SearchIndexService::new();
    service.rebuild(directory.kits);
    let result = service.query(&args.text, args.top_k);
    print_json(&json!({
        "index_summary": service.stats().summary(),
        "query_summary": result.query.summary(),
        "result_summary": result.summary(),
        "result": result,
        "skipped": skipped,
    }))?;
    Ok(EXIT_OK)
}

fn load_config(path: Option<&Path>) -> Result<GatewayConfig> {
    match path {
        Some(path) => load_gateway_config(path),
        None => Ok(GatewayConfig::default()),
    }
}

fn open_trail(path: &Path) -> Result<SqliteAuditTrailStore> {
    let store = SqliteAuditTrailStore::open(path)?;
    store.migrate()?;
    Ok(store)
}

fn read_plan(path: &Path) -> Result<AgentPlan> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read plan {}", path.display()))?;
    parse_plan_json(&raw).map_err(|err| anyhow!("invalid plan JSON structure: {err}"))
}

fn request_id_or_new(request_id: Option<&str>) -> String {
    request_id.map_or_else(new_request_id, str::to_string)
}

fn insert_field(value: &mut Value, key: &str, field: Value) {
    if let Value::Object(map) = value {
        map.insert(key.to_string(), field);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
