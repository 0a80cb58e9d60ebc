use agent_gate_core::{format_compact_utc_stamp, format_utc_plus8, TimeFormatError};
use serde::Serialize;
use serde_json::{Map, Value};
use time::OffsetDateTime;

use crate::rules::AuditSeverity;
use crate::scan::AuditScanSnapshot;

#[derive(Debug, thiserror::Error)]
pub enum AuditReportError {
    #[error(transparent)]
    Time(#[from] TimeFormatError),
    #[error("failed to serialize audit report: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AuditResultEntry {
    pub asset_path: String,
    pub asset_name: String,
    pub asset_class: String,
    pub rule_id: String,
    pub severity: AuditSeverity,
    pub reason: String,
    pub hint: String,
    pub triangle_source: String,
    pub scan_state: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub skip_reason: String,
    pub evidence: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditReport {
    pub run_id: String,
    pub generated_utc: OffsetDateTime,
    pub source: String,
    pub results: Vec<AuditResultEntry>,
}

impl AuditReport {
    #[must_use]
    pub fn count_by_severity(&self, severity: AuditSeverity) -> usize {
        self.results
            .iter()
            .filter(|entry| entry.severity == severity)
            .count()
    }
}

/// `audit_YYYYMMDD_HHMMSS` for the given instant.
///
/// # Errors
/// Returns an error if the stamp cannot be formatted.
pub fn default_run_id(generated_utc: OffsetDateTime) -> Result<String, TimeFormatError> {
    Ok(format!("audit_{}", format_compact_utc_stamp(generated_utc)?))
}

/// Flatten every row's issues into report entries.
///
/// # Errors
/// Returns an error if no override is given and the default run id cannot
/// be formatted.
pub fn build_report(
    snapshot: &AuditScanSnapshot,
    run_id_override: Option<&str>,
) -> Result<AuditReport, TimeFormatError> {
    let generated_utc = snapshot.stats.updated_utc;
    let run_id = match run_id_override.filter(|run_id| !run_id.is_empty()) {
        Some(run_id) => run_id.to_string(),
        None => default_run_id(generated_utc)?,
    };

    let mut results = Vec::new();
    for row in &snapshot.rows {
        for issue in &row.audit_issues {
            let mut evidence = Map::new();
            for (key, value) in &issue.evidence {
                evidence.insert(key.clone(), Value::String(value.clone()));
            }
            evidence.insert(
                "scan_state".to_string(),
                Value::String(row.scan_state.as_str().to_string()),
            );
            if !row.triangle_source.is_empty() {
                evidence.insert(
                    "triangle_source".to_string(),
                    Value::String(row.triangle_source.clone()),
                );
            }
            if !row.representing_mesh_path.is_empty() {
                evidence.insert(
                    "representing_mesh_path".to_string(),
                    Value::String(row.representing_mesh_path.clone()),
                );
            }

            results.push(AuditResultEntry {
                asset_path: row.asset_path.clone(),
                asset_name: row.asset_name.clone(),
                asset_class: row.asset_class.clone(),
                rule_id: issue.rule_id.clone(),
                severity: issue.severity,
                reason: issue.reason.clone(),
                hint: issue.hint.clone(),
                triangle_source: row.triangle_source.clone(),
                scan_state: row.scan_state.as_str().to_string(),
                skip_reason: row.skip_reason.clone(),
                evidence,
            });
        }
    }

    Ok(AuditReport {
        run_id,
        generated_utc,
        source: snapshot.stats.source.clone(),
        results,
    })
}

#[derive(Serialize)]
struct AuditReportWire<'a> {
    run_id: &'a str,
    generated_utc: String,
    source: &'a str,
    results: &'a [AuditResultEntry],
}

/// Wire form of `report` with `generated_utc` rendered at `+08:00`.
///
/// # Errors
/// Returns an error if the timestamp cannot be formatted.
pub fn report_to_value(report: &AuditReport) -> Result<Value, AuditReportError> {
    let wire = AuditReportWire {
        run_id: &report.run_id,
        generated_utc: format_utc_plus8(report.generated_utc)?,
        source: &report.source,
        results: &report.results,
    };
    Ok(serde_json::to_value(wire)?)
}

/// Condensed JSON text of `report`.
///
/// # Errors
/// Returns an error if formatting or serialization fails.
pub fn report_to_json(report: &AuditReport) -> Result<String, AuditReportError> {
    Ok(serde_json::to_string(&report_to_value(report)?)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{AuditAssetRow, AuditIssue, ScanState};
    use crate::scan::ScanStats;

    fn snapshot() -> AuditScanSnapshot {
        let mut warn = AuditIssue {
            rule_id: "HighPolyAutoLODRule".to_string(),
            severity: AuditSeverity::Warn,
            reason: "high triangle mesh is missing additional LODs".to_string(),
            hint: "Create LODs".to_string(),
            evidence: Vec::new(),
        };
        warn.add_evidence("triangle_count_lod0_actual", 200_000);
        warn.add_evidence("triangle_source", "tag_cached");

        let mut error = AuditIssue {
            rule_id: "TextureNPOTRule".to_string(),
            severity: AuditSeverity::Error,
            reason: "texture dimensions are not power-of-two".to_string(),
            hint: "Resize texture".to_string(),
            evidence: Vec::new(),
        };
        error.add_evidence("texture_width", 1000);

        let row = AuditAssetRow {
            asset_path: "/Game/HCI/Data/Ability_04.Ability_04".to_string(),
            asset_class: "HCIAbilityKitAsset".to_string(),
            representing_mesh_path: "/Game/Seed/SM_Test.SM_Test".to_string(),
            triangle_source: "tag_cached".to_string(),
            scan_state: ScanState::Ok,
            audit_issues: vec![warn, error],
            ..AuditAssetRow::default()
        };
        let updated_utc = must(OffsetDateTime::from_unix_timestamp(1_770_136_205));
        let stats = ScanStats::from_rows(std::slice::from_ref(&row), 1.5, updated_utc);
        AuditScanSnapshot {
            rows: vec![row],
            stats,
        }
    }

    fn must<T, E: std::fmt::Display>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    #[test]
    fn build_report_flattens_issues_and_enriches_evidence() {
        let report = must(build_report(&snapshot(), Some("audit_test_run_001")));
        assert_eq!(report.run_id, "audit_test_run_001");
        assert_eq!(report.source, "tag_catalog");
        assert_eq!(report.results.len(), 2);
        assert_eq!(report.count_by_severity(AuditSeverity::Error), 1);

        let first = &report.results[0];
        assert_eq!(first.rule_id, "HighPolyAutoLODRule");
        assert_eq!(first.severity.as_str(), "Warn");
        assert_eq!(first.evidence["triangle_count_lod0_actual"], "200000");
        assert_eq!(first.evidence["scan_state"], "ok");
        assert_eq!(
            first.evidence["representing_mesh_path"],
            "/Game/Seed/SM_Test.SM_Test"
        );

        let second = &report.results[1];
        assert_eq!(second.rule_id, "TextureNPOTRule");
        assert_eq!(second.evidence["texture_width"], "1000");
        assert_eq!(second.evidence["triangle_source"], "tag_cached");
    }

    #[test]
    fn default_run_id_uses_snapshot_time() {
        let report = must(build_report(&snapshot(), None));
        assert_eq!(report.run_id, "audit_20260203_163005");
        let empty_override = must(build_report(&snapshot(), Some("")));
        assert_eq!(empty_override.run_id, "audit_20260203_163005");
    }

    #[test]
    fn json_is_condensed_with_plus8_timestamp() {
        let report = must(build_report(&snapshot(), Some("run_json")));
        let text = must(report_to_json(&report));
        assert!(!text.contains('\n'));
        assert!(text.starts_with(
            r#"{"run_id":"run_json","generated_utc":"2026-02-04T00:30:05+08:00","source":"tag_catalog","results":["#
        ));
        let value: Value = must(serde_json::from_str(&text));
        assert_eq!(value["results"][0]["severity"], "Warn");
        assert!(value["results"][0].get("skip_reason").is_none());
    }
}
