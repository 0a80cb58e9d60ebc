#![forbid(unsafe_code)]
//! Compliance audit over workspace asset metadata.
//!
//! A scan turns catalog entries into [`AuditAssetRow`]s, the rule registry
//! attaches issues to every row that was not skipped, and the report builder
//! flattens those issues into the audit report wire format.

mod controller;
mod perf;
mod report;
mod rules;
mod scan;

use std::time::Instant;

use agent_gate_core::now_utc;
use serde::Serialize;

pub use controller::{
    ScanController, ScanControllerError, ScanPhase, DEFAULT_BATCH_SIZE, DEFAULT_LOG_TOP_N,
    UNKNOWN_FAILURE,
};
pub use perf::{assets_per_second, percentile_nearest_rank};
pub use report::{
    build_report, default_run_id, report_to_json, report_to_value, AuditReport,
    AuditReportError, AuditResultEntry,
};
pub use rules::{
    AuditAssetRow, AuditIssue, AuditRule, AuditRuleError, AuditRuleRegistry, AuditSeverity,
    HighPolyAutoLodRule, ScanState, TextureNpotRule, TriangleExpectedMismatchRule,
    HIGH_POLY_AUTO_LOD_RULE_ID, HIGH_POLY_TRIANGLE_THRESHOLD, TEXTURE_NPOT_RULE_ID,
    TRIANGLE_EXPECTED_MISMATCH_RULE_ID,
};
pub use scan::{
    load_asset_catalog, parse_asset_catalog_json, parse_bool_tag, parse_count_tag,
    parse_dimensions_tag, run_audit, scan_catalog, tag_names, AssetCatalog, AuditScanSnapshot,
    CatalogAsset, CatalogScanner, ScanStats, SCAN_SOURCE_TAG_CATALOG,
    TRIANGLE_SOURCE_TAG_CACHED, TRIANGLE_SOURCE_UNAVAILABLE,
};

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct ScanPerf {
    pub batch_count: usize,
    pub assets_per_second: f64,
    pub batch_p50_ms: f64,
    pub batch_p95_ms: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchedAuditRun {
    pub snapshot: AuditScanSnapshot,
    pub perf: ScanPerf,
}

/// Scan `catalog` batch by batch through a [`ScanController`] and evaluate
/// `registry` on every scanned row.
///
/// # Errors
/// Returns an error when `batch_size` is zero.
pub fn run_batched_audit(
    catalog: &AssetCatalog,
    registry: &AuditRuleRegistry,
    batch_size: usize,
) -> Result<BatchedAuditRun, ScanControllerError> {
    let scanner = CatalogScanner::new(catalog);
    let mut controller = ScanController::new();
    controller.start((0..scanner.len()).collect::<Vec<usize>>(), batch_size, DEFAULT_LOG_TOP_N)?;

    let started = Instant::now();
    let mut rows = Vec::with_capacity(scanner.len());
    let mut batch_ms = Vec::new();
    while let Some(range) = controller.dequeue_batch() {
        let batch_started = Instant::now();
        rows.extend(scanner.scan_range(range));
        batch_ms.push(batch_started.elapsed().as_secs_f64() * 1000.0);
    }
    controller.complete();

    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    let mut snapshot = AuditScanSnapshot {
        stats: ScanStats::from_rows(&rows, duration_ms, now_utc()),
        rows,
    };
    run_audit(&mut snapshot, registry);
    tracing::info!(
        summary = %snapshot.stats.summary(),
        batches = batch_ms.len(),
        "batched audit scan finished"
    );

    Ok(BatchedAuditRun {
        perf: ScanPerf {
            batch_count: batch_ms.len(),
            assets_per_second: assets_per_second(snapshot.stats.asset_count, duration_ms),
            batch_p50_ms: percentile_nearest_rank(&batch_ms, 50.0),
            batch_p95_ms: percentile_nearest_rank(&batch_ms, 95.0),
        },
        snapshot,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batched_audit_matches_single_pass_scan() {
        let catalog = match parse_asset_catalog_json(
            r#"{"assets": [
                {"object_path": "/Game/T/T_A.T_A", "asset_class": "Texture2D", "tags": {"Dimensions": "300x256"}},
                {"object_path": "/Game/T/T_B.T_B", "asset_class": "Texture2D", "tags": {"Dimensions": "256x256"}},
                {"object_path": "/Game/T/T_C.T_C", "asset_class": "Texture2D", "package_dirty": true, "tags": {"Dimensions": "3x5"}}
            ]}"#,
        ) {
            Ok(catalog) => catalog,
            Err(err) => panic!("test failure: {err}"),
        };
        let registry = AuditRuleRegistry::with_defaults();

        let run = match run_batched_audit(&catalog, &registry, 2) {
            Ok(run) => run,
            Err(err) => panic!("test failure: {err}"),
        };
        assert_eq!(run.perf.batch_count, 2);
        assert_eq!(run.snapshot.rows.len(), 3);
        assert_eq!(run.snapshot.stats.skipped_locked_or_dirty_count, 1);

        let mut single = scan_catalog(&catalog);
        run_audit(&mut single, &registry);
        assert_eq!(single.rows, run.snapshot.rows);

        let flagged: Vec<&str> = run
            .snapshot
            .rows
            .iter()
            .filter(|row| !row.audit_issues.is_empty())
            .map(|row| row.asset_path.as_str())
            .collect();
        assert_eq!(flagged, vec!["/Game/T/T_A.T_A"]);

        assert_eq!(
            run_batched_audit(&catalog, &registry, 0).err(),
            Some(ScanControllerError::InvalidBatchSize)
        );
    }
}
