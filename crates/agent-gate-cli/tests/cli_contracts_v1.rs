#![allow(clippy::single_match_else, clippy::uninlined_format_args)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::{json, Value};
use ulid::Ulid;

fn agate_binary_path() -> PathBuf {
    match std::env::var("CARGO_BIN_EXE_agate") {
        Ok(value) => PathBuf::from(value),
        Err(_) => {
            let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../target/debug/agate");
            if !path.exists() {
                let status = Command::new("cargo")
                    .args(["build", "-p", "agent-gate-cli", "--bin", "agate"])
                    .status();
                match status {
                    Ok(value) if value.success() => {}
                    Ok(value) => panic!("failed to build agate binary (status={value})"),
                    Err(err) => panic!("failed to invoke cargo build: {err}"),
                }
            }
            path
        }
    }
}

fn temp_workspace(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("agent-gate-cli-{}-{}", name, Ulid::new()));
    match fs::create_dir_all(&dir) {
        Ok(()) => dir,
        Err(err) => panic!("failed to create temp dir {}: {err}", dir.display()),
    }
}

fn write_file(path: &Path, body: &str) {
    if let Err(err) = fs::write(path, body) {
        panic!("failed to write {}: {err}", path.display());
    }
}

fn agate_output(workspace: &Path, args: &[&str]) -> Output {
    let mut command = Command::new(agate_binary_path());
    command.arg("--trail").arg(workspace.join("trail.sqlite3"));
    for arg in args {
        command.arg(arg);
    }

    match command.output() {
        Ok(output) => output,
        Err(err) => panic!("failed to run agate command {:?}: {err}", args),
    }
}

fn stdout_json(output: &Output) -> Value {
    match serde_json::from_slice::<Value>(&output.stdout) {
        Ok(value) => value,
        Err(err) => panic!(
            "failed to parse stdout as JSON: {err}\nstdout={}\nstderr={}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ),
    }
}

fn success_json(workspace: &Path, args: &[&str]) -> Value {
    let output = agate_output(workspace, args);
    assert!(
        output.status.success(),
        "command {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    stdout_json(&output)
}

fn path_arg(path: &Path) -> &str {
    match path.to_str() {
        Some(value) => value,
        None => panic!("non-utf8 temp path: {}", path.display()),
    }
}

fn built_plan_file(workspace: &Path, text: &str, request_id: &str) -> PathBuf {
    let built = success_json(
        workspace,
        &["plan", "build", "--text", text, "--request-id", request_id],
    );
    let plan_path = workspace.join(format!("{request_id}.plan.json"));
    write_file(&plan_path, &built["plan"].to_string());
    plan_path
}

#[test]
fn help_contract_lists_expected_subcommands() {
    let output = match Command::new(agate_binary_path()).arg("--help").output() {
        Ok(value) => value,
        Err(err) => panic!("failed to run help command: {err}"),
    };

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for required in ["tools", "plan", "gate", "dry-run", "audit", "search", "trail"] {
        assert!(
            stdout.contains(required),
            "help output missing `{}`:\n{}",
            required,
            stdout
        );
    }
}

#[test]
fn tools_list_exposes_whitelisted_catalog() {
    let workspace = temp_workspace("tools");
    let value = success_json(&workspace, &["tools", "list"]);

    let tools = match value["tools"].as_array() {
        Some(tools) => tools,
        None => panic!("tools must be an array: {value}"),
    };
    assert_eq!(value["tool_count"].as_u64(), Some(tools.len() as u64));
    let names: Vec<&str> = tools
        .iter()
        .filter_map(|tool| tool["tool_name"].as_str())
        .collect();
    for expected in ["ScanAssets", "SetTextureMaxSize", "SetMeshLODGroup", "RenameAsset"] {
        assert!(names.contains(&expected), "missing tool {}", expected);
    }
}

#[test]
fn plan_build_then_validate_round_trips_through_files() {
    let workspace = temp_workspace("plan");
    let built = success_json(
        &workspace,
        &[
            "plan",
            "build",
            "--text",
            "texture and lod fixes",
            "--request-id",
            "req_cli_plan",
        ],
    );
    assert_eq!(built["route_reason"], "asset_compliance_texture_lod");
    assert_eq!(built["plan"]["request_id"], "req_cli_plan");
    assert_eq!(built["plan"]["intent"], "batch_fix_asset_compliance");
    assert_eq!(built["plan_hash"].as_str().map(str::len), Some(64));

    let plan_path = workspace.join("plan.json");
    write_file(&plan_path, &built["plan"].to_string());
    let validated = success_json(
        &workspace,
        &["plan", "validate", "--plan", path_arg(&plan_path)],
    );
    assert_eq!(validated["valid"], true);
    assert_eq!(validated["error_code"], "-");
    assert_eq!(validated["reason"], "ok");
    assert_eq!(validated["validated_step_count"], 2);
    assert_eq!(validated["plan_hash"], built["plan_hash"]);
}

#[test]
fn invalid_plan_exits_with_validation_status() {
    let workspace = temp_workspace("invalid-plan");
    let plan_path = workspace.join("plan.json");
    write_file(
        &plan_path,
        &json!({
            "plan_version": 1,
            "request_id": "req_cli_bad",
            "intent": "scan_assets",
            "steps": [{
                "step_id": "s1",
                "tool_name": "DeleteEverything",
                "args": {},
                "risk_level": "destructive",
                "requires_confirm": true,
                "rollback_strategy": "all_or_nothing",
                "expected_evidence": ["asset_path"]
            }]
        })
        .to_string(),
    );

    let output = agate_output(&workspace, &["plan", "validate", "--plan", path_arg(&plan_path)]);
    assert_eq!(output.status.code(), Some(2));
    let value = stdout_json(&output);
    assert_eq!(value["valid"], false);
    assert_eq!(value["error_code"], "E4002");
    assert_eq!(value["failed_step_id"], "s1");
}

#[test]
fn recorded_gate_decisions_land_in_trail() {
    let workspace = temp_workspace("trail");

    let blocked = success_json(
        &workspace,
        &[
            "gate",
            "blast-radius",
            "--tool",
            "RenameAsset",
            "--target-count",
            "51",
            "--request-id",
            "req_cli_blast",
            "--record",
        ],
    );
    assert_eq!(blocked["allowed"], false);
    assert_eq!(blocked["error_code"], "E4004");
    assert_eq!(blocked["reason"], "modify_limit_exceeded");
    assert_eq!(blocked["trail_sequence"], 1);

    let confirmed = success_json(
        &workspace,
        &[
            "gate",
            "confirm",
            "--tool",
            "SetTextureMaxSize",
            "--requires-confirm",
            "--user-confirmed",
            "--request-id",
            "req_cli_confirm",
            "--record",
        ],
    );
    assert_eq!(confirmed["allowed"], true);
    assert_eq!(confirmed["error_code"], "-");
    assert_eq!(confirmed["trail_sequence"], 2);

    let unrecorded = success_json(
        &workspace,
        &["gate", "confirm", "--tool", "SetTextureMaxSize"],
    );
    assert_eq!(unrecorded["allowed"], false);
    assert_eq!(unrecorded["error_code"], "E4005");
    assert!(unrecorded.get("trail_sequence").is_none());

    let rows = success_json(&workspace, &["trail", "list"]);
    let rows = match rows.as_array() {
        Some(rows) => rows.clone(),
        None => panic!("trail list must be an array"),
    };
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["sequence"], 1);
    assert_eq!(rows[0]["record"]["request_id"], "req_cli_blast");
    assert_eq!(rows[0]["record"]["result"], "blocked");
    assert_eq!(rows[0]["record"]["asset_count"], 51);
    assert_eq!(rows[0]["record"]["user"], "anonymous");
    assert_eq!(rows[0]["record"]["role"], "Guest");
    assert_eq!(rows[1]["record"]["result"], "allowed");

    let tail = success_json(&workspace, &["trail", "list", "--limit", "1"]);
    assert_eq!(tail.as_array().map(Vec::len), Some(1));
    assert_eq!(tail[0]["record"]["request_id"], "req_cli_confirm");
}

#[test]
fn config_drives_rbac_and_source_control_gates() {
    let workspace = temp_workspace("config");
    let config_path = workspace.join("gateway.yaml");
    write_file(
        &config_path,
        "source_control:\n  enabled: true\nrbac:\n  users:\n    - user: artist_a\n      role: Artist\n      capabilities: [read_only, write]\n",
    );
    let config = path_arg(&config_path);

    let guest = success_json(
        &workspace,
        &["--config", config, "gate", "rbac", "--tool", "RenameAsset", "--user", "visitor"],
    );
    assert_eq!(guest["allowed"], false);
    assert_eq!(guest["error_code"], "E4008");
    assert_eq!(guest["resolved_role"], "Guest");
    assert_eq!(guest["guest_fallback"], true);

    let artist = success_json(
        &workspace,
        &["--config", config, "gate", "rbac", "--tool", "RenameAsset", "--user", "artist_a"],
    );
    assert_eq!(artist["allowed"], true);
    assert_eq!(artist["resolved_role"], "Artist");

    let checkout = success_json(
        &workspace,
        &[
            "--config",
            config,
            "gate",
            "source-control",
            "--tool",
            "SetTextureMaxSize",
            "--checkout-failed",
        ],
    );
    assert_eq!(checkout["allowed"], false);
    assert_eq!(checkout["error_code"], "E4006");
    assert_eq!(checkout["reason"], "source_control_checkout_failed_fail_fast");

    let offline = success_json(
        &workspace,
        &["gate", "source-control", "--tool", "SetTextureMaxSize"],
    );
    assert_eq!(offline["allowed"], true);
    assert_eq!(offline["offline_local_mode"], true);
}

#[test]
fn transaction_gate_rolls_back_on_failing_step() {
    let workspace = temp_workspace("transaction");
    let plan_path = built_plan_file(&workspace, "texture and lod fixes", "req_cli_tx");
    let plan = path_arg(&plan_path);

    let committed = success_json(&workspace, &["gate", "transaction", "--plan", plan]);
    assert_eq!(committed["committed"], true);
    assert_eq!(committed["request_id"], "req_cli_tx");
    assert_eq!(committed["committed_steps"], 2);

    let rolled_back = success_json(
        &workspace,
        &["gate", "transaction", "--plan", plan, "--fail-step", "s2", "--record"],
    );
    assert_eq!(rolled_back["committed"], false);
    assert_eq!(rolled_back["rolled_back"], true);
    assert_eq!(rolled_back["error_code"], "E4007");
    assert_eq!(rolled_back["failed_step_index"], 2);
    assert_eq!(rolled_back["rolled_back_steps"], 1);

    let rows = success_json(&workspace, &["trail", "list"]);
    assert_eq!(rows.as_array().map(Vec::len), Some(1));
    assert_eq!(rows[0]["record"]["error_code"], "E4007");
    assert_eq!(rows[0]["record"]["capability"], "-");
    assert_eq!(rows[0]["plan_hash"].as_str().map(str::len), Some(64));
}

#[test]
fn dry_run_diff_is_normalized() {
    let workspace = temp_workspace("dry-run");
    let input_path = workspace.join("diff.json");
    write_file(
        &input_path,
        &json!({
            "request_id": "req_cli_diff",
            "summary": {"total_candidates": 99, "modifiable": 99, "skipped": 99},
            "diff_items": [
                {
                    "asset_path": "/Game/Art/T_A.T_A",
                    "field": "max_texture_size",
                    "before": "4096",
                    "after": "1024",
                    "tool_name": "SetTextureMaxSize",
                    "risk": "write"
                },
                {
                    "asset_path": "/Game/Maps/L_Main.L_Main",
                    "actor_path": "/Game/Maps/L_Main.L_Main:PersistentLevel.Rock_3",
                    "field": "collision",
                    "before": "none",
                    "after": "none",
                    "tool_name": "ScanLevelMeshRisks",
                    "risk": "read_only",
                    "object_type": "actor",
                    "skip_reason": "read_only_scan"
                }
            ]
        })
        .to_string(),
    );

    let value = success_json(&workspace, &["dry-run", "diff", "--input", path_arg(&input_path)]);
    assert_eq!(value["summary"]["total_candidates"], 2);
    assert_eq!(value["summary"]["modifiable"], 1);
    assert_eq!(value["summary"]["skipped"], 1);
    assert_eq!(value["diff_items"][0]["locate_strategy"], "sync_browser");
    assert_eq!(value["diff_items"][1]["locate_strategy"], "camera_focus");
}

#[test]
fn audit_scan_reports_npot_and_skips_disabled_rules() {
    let workspace = temp_workspace("audit");
    let catalog_path = workspace.join("catalog.json");
    write_file(
        &catalog_path,
        r#"{"assets": [
            {"object_path": "/Game/T/T_A.T_A", "asset_name": "T_A", "asset_class": "Texture2D", "tags": {"Dimensions": "300x256"}},
            {"object_path": "/Game/T/T_B.T_B", "asset_name": "T_B", "asset_class": "Texture2D", "tags": {"Dimensions": "256x256"}}
        ]}"#,
    );
    let catalog = path_arg(&catalog_path);

    let value = success_json(
        &workspace,
        &["audit", "scan", "--catalog", catalog, "--run-id", "run_cli", "--batch-size", "1"],
    );
    assert_eq!(value["report"]["run_id"], "run_cli");
    assert_eq!(value["perf"]["batch_count"], 2);
    let results = match value["report"]["results"].as_array() {
        Some(results) => results.clone(),
        None => panic!("results must be an array: {value}"),
    };
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["asset_path"], "/Game/T/T_A.T_A");
    assert_eq!(results[0]["rule_id"], "TextureNPOTRule");

    let disabled = success_json(
        &workspace,
        &["audit", "scan", "--catalog", catalog, "--disable-rule", "TextureNPOTRule"],
    );
    assert_eq!(disabled["report"]["results"].as_array().map(Vec::len), Some(0));

    let unknown = agate_output(
        &workspace,
        &["audit", "scan", "--catalog", catalog, "--disable-rule", "NoSuchRule"],
    );
    assert!(!unknown.status.success());
    assert!(String::from_utf8_lossy(&unknown.stderr).contains("unknown rule_id: NoSuchRule"));
}

#[test]
fn search_query_ranks_kits_and_reports_skipped_files() {
    let workspace = temp_workspace("search");
    let kits = workspace.join("kits");
    if let Err(err) = fs::create_dir_all(&kits) {
        panic!("failed to create kit dir: {err}");
    }
    write_file(
        &kits.join("fire_01.json"),
        r#"{"schema_version": 1, "id": "fire_01", "display_name": "Fireball",
            "representing_mesh": "/Game/Seed/SM_Rock.SM_Rock",
            "params": {"damage": 150.0}}"#,
    );
    write_file(
        &kits.join("ice_stun_02.json"),
        r#"{"schema_version": 1, "id": "ice_stun_02", "display_name": "Frost Stun",
            "representing_mesh": "/Game/Seed/SM_Ice.SM_Ice",
            "params": {"damage": 100.0}}"#,
    );
    write_file(&kits.join("broken.json"), r#"{"schema_version": 2}"#);
    write_file(&kits.join("notes.txt"), "not a kit");

    let value = success_json(
        &workspace,
        &["search", "query", "--kits", path_arg(&kits), "--text", "fire"],
    );
    assert_eq!(value["result"]["candidate_count"], 1);
    assert_eq!(value["result"]["hits"][0]["id"], "fire_01");
    let skipped = match value["skipped"].as_array() {
        Some(skipped) => skipped.clone(),
        None => panic!("skipped must be an array: {value}"),
    };
    assert_eq!(skipped.len(), 1);
    assert!(skipped[0]
        .as_str()
        .is_some_and(|line| line.contains("field=schema_version")));
    assert!(value["index_summary"]
        .as_str()
        .is_some_and(|summary| summary.contains("docs=2")));
}
