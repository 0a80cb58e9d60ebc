use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::time::Instant;

use agent_gate_core::{format_rfc3339, now_utc};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

use crate::rules::{AuditAssetRow, AuditRuleRegistry, ScanState};

pub const SCAN_SOURCE_TAG_CATALOG: &str = "tag_catalog";
pub const TRIANGLE_SOURCE_TAG_CACHED: &str = "tag_cached";
pub const TRIANGLE_SOURCE_UNAVAILABLE: &str = "unavailable";

pub mod tag_names {
    pub const ID: &str = "hci_id";
    pub const DISPLAY_NAME: &str = "hci_display_name";
    pub const DAMAGE: &str = "hci_damage";
    pub const REPRESENTING_MESH: &str = "hci_representing_mesh";

    pub const TRIANGLE_COUNT: [&str; 6] = [
        "hci_triangles_lod0",
        "triangle_count_lod0",
        "triangles_lod0",
        "lod0_triangles",
        "Triangles",
        "NumTriangles",
    ];
    pub const TRIANGLE_EXPECTED: [&str; 4] = [
        "hci_triangle_expected_lod0",
        "triangle_count_lod0_expected",
        "triangle_expected_lod0",
        "hci_triangle_count_lod0_expected",
    ];
    pub const MESH_LOD_COUNT: [&str; 2] = ["LODs", "NumLODs"];
    pub const MESH_NANITE_ENABLED: [&str; 2] = ["NaniteEnabled", "bNaniteEnabled"];
    pub const TEXTURE_DIMENSIONS: [&str; 2] = ["Dimensions", "ImportedSize"];
}

/// Asset metadata exported from the workspace object store.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct AssetCatalog {
    pub assets: Vec<CatalogAsset>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogAsset {
    pub object_path: String,
    pub asset_name: String,
    pub asset_class: String,
    pub package_dirty: bool,
    pub package_read_only: bool,
    #[serde(deserialize_with = "scalar_tags")]
    pub tags: BTreeMap<String, String>,
}

impl CatalogAsset {
    fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Tag values are strings in the store; numbers and booleans are accepted
/// and kept in their JSON text form.
fn scalar_tags<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<BTreeMap<String, String>, D::Error> {
    let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| match value {
            Value::String(text) => Ok((key, text)),
            Value::Number(number) => Ok((key, number.to_string())),
            Value::Bool(flag) => Ok((key, flag.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "tag `{key}` must be a scalar, got {other}"
            ))),
        })
        .collect()
}

/// # Errors
/// Returns an error if the file cannot be read or is not a valid catalog.
pub fn load_asset_catalog(path: &Path) -> Result<AssetCatalog> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read asset catalog {}", path.display()))?;
    parse_asset_catalog_json(&raw)
}

/// # Errors
/// Returns an error if `text` is not a valid catalog document.
pub fn parse_asset_catalog_json(text: &str) -> Result<AssetCatalog> {
    serde_json::from_str(text).map_err(|err| anyhow!("invalid asset catalog JSON structure: {err}"))
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanStats {
    pub source: String,
    pub asset_count: usize,
    pub id_covered_count: usize,
    pub display_name_covered_count: usize,
    pub representing_mesh_covered_count: usize,
    pub triangle_tag_covered_count: usize,
    pub skipped_locked_or_dirty_count: usize,
    pub duration_ms: f64,
    pub updated_utc: OffsetDateTime,
}

impl ScanStats {
    #[must_use]
    pub fn from_rows(rows: &[AuditAssetRow], duration_ms: f64, updated_utc: OffsetDateTime) -> Self {
        let count = |predicate: fn(&AuditAssetRow) -> bool| rows.iter().filter(|row| predicate(row)).count();
        Self {
            source: SCAN_SOURCE_TAG_CATALOG.to_string(),
            asset_count: rows.len(),
            id_covered_count: count(|row| !row.id.is_empty()),
            display_name_covered_count: count(|row| !row.display_name.is_empty()),
            representing_mesh_covered_count: count(|row| !row.representing_mesh_path.is_empty()),
            triangle_tag_covered_count: count(|row| {
                row.triangle_source == TRIANGLE_SOURCE_TAG_CACHED
                    && row.triangle_count_lod0_actual.is_some()
            }),
            skipped_locked_or_dirty_count: count(|row| {
                row.scan_state == ScanState::SkippedLockedOrDirty
            }),
            duration_ms,
            updated_utc,
        }
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let coverage = |covered: usize| {
            #[allow(clippy::cast_precision_loss)]
            let ratio = covered as f64 / self.asset_count.max(1) as f64;
            ratio * 100.0
        };
        format!(
            "source={} assets={} id_coverage={:.1}% display_name_coverage={:.1}% representing_mesh_coverage={:.1}% triangle_tag_coverage={:.1}% skipped_locked_or_dirty={} refresh_ms={:.2} updated_utc={}",
            self.source,
            self.asset_count,
            coverage(self.id_covered_count),
            coverage(self.display_name_covered_count),
            coverage(self.representing_mesh_covered_count),
            coverage(self.triangle_tag_covered_count),
            self.skipped_locked_or_dirty_count,
            self.duration_ms,
            format_rfc3339(self.updated_utc).unwrap_or_default(),
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AuditScanSnapshot {
    pub rows: Vec<AuditAssetRow>,
    pub stats: ScanStats,
}

/// Reads rows out of a catalog. Representing meshes are looked up by object
/// path within the same catalog.
#[derive(Debug)]
pub struct CatalogScanner<'a> {
    catalog: &'a AssetCatalog,
    by_object_path: BTreeMap<&'a str, &'a CatalogAsset>,
}

impl<'a> CatalogScanner<'a> {
    #[must_use]
    pub fn new(catalog: &'a AssetCatalog) -> Self {
        let by_object_path = catalog
            .assets
            .iter()
            .map(|asset| (asset.object_path.as_str(), asset))
            .collect();
        Self {
            catalog,
            by_object_path,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.catalog.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.catalog.assets.is_empty()
    }

    #[must_use]
    pub fn scan_range(&self, range: std::ops::Range<usize>) -> Vec<AuditAssetRow> {
        self.catalog
            .assets
            .get(range)
            .unwrap_or_default()
            .iter()
            .map(|asset| self.scan_asset(asset))
            .collect()
    }

    #[must_use]
    pub fn scan_asset(&self, asset: &CatalogAsset) -> AuditAssetRow {
        let mut row = AuditAssetRow {
            asset_path: asset.object_path.clone(),
            asset_name: asset.asset_name.clone(),
            asset_class: asset.asset_class.clone(),
            id: asset.tag(tag_names::ID).unwrap_or_default().to_string(),
            display_name: asset
                .tag(tag_names::DISPLAY_NAME)
                .unwrap_or_default()
                .to_string(),
            representing_mesh_path: asset
                .tag(tag_names::REPRESENTING_MESH)
                .unwrap_or_default()
                .to_string(),
            damage: asset
                .tag(tag_names::DAMAGE)
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .unwrap_or_default(),
            ..AuditAssetRow::default()
        };

        if let Some(skip_reason) = locked_or_dirty_reason(asset) {
            row.scan_state = ScanState::SkippedLockedOrDirty;
            row.skip_reason = skip_reason.to_string();
            row.triangle_source = TRIANGLE_SOURCE_UNAVAILABLE.to_string();
            return row;
        }

        let mesh = self.representing_mesh(&row.representing_mesh_path);
        match resolve_with_fallback(asset, mesh, &tag_names::TRIANGLE_COUNT, parse_count_tag) {
            Some((triangles, key)) => {
                row.triangle_count_lod0_actual = Some(triangles);
                row.triangle_source = TRIANGLE_SOURCE_TAG_CACHED.to_string();
                row.triangle_source_tag_key = key.to_string();
            }
            None => row.triangle_source = TRIANGLE_SOURCE_UNAVAILABLE.to_string(),
        }
        row.triangle_count_lod0_expected =
            resolve_tag(asset, &tag_names::TRIANGLE_EXPECTED, parse_count_tag).map(|(value, _)| value);
        row.mesh_lod_count =
            resolve_with_fallback(asset, mesh, &tag_names::MESH_LOD_COUNT, parse_count_tag)
                .map(|(value, _)| value);
        row.mesh_nanite_enabled =
            resolve_with_fallback(asset, mesh, &tag_names::MESH_NANITE_ENABLED, parse_bool_tag)
                .map(|(value, _)| value);
        if let Some(((width, height), _)) =
            resolve_tag(asset, &tag_names::TEXTURE_DIMENSIONS, parse_dimensions_tag)
        {
            row.texture_width = Some(width);
            row.texture_height = Some(height);
        }
        row
    }

    fn representing_mesh(&self, path: &str) -> Option<&'a CatalogAsset> {
        if path.is_empty() {
            return None;
        }
        self.by_object_path.get(path).copied()
    }
}

fn locked_or_dirty_reason(asset: &CatalogAsset) -> Option<&'static str> {
    if asset.package_dirty {
        Some("package_dirty")
    } else if asset.package_read_only {
        Some("package_read_only")
    } else {
        None
    }
}

fn resolve_tag<'k, T>(
    asset: &CatalogAsset,
    candidates: &[&'k str],
    parse: fn(&str) -> Option<T>,
) -> Option<(T, &'k str)> {
    candidates
        .iter()
        .find_map(|key| asset.tag(key).and_then(parse).map(|value| (value, *key)))
}

fn resolve_with_fallback<'k, T>(
    asset: &CatalogAsset,
    mesh: Option<&CatalogAsset>,
    candidates: &[&'k str],
    parse: fn(&str) -> Option<T>,
) -> Option<(T, &'k str)> {
    resolve_tag(asset, candidates, parse)
        .or_else(|| mesh.and_then(|mesh| resolve_tag(mesh, candidates, parse)))
}

const MAX_TAG_COUNT: i64 = i32::MAX as i64;

/// Parse a count tag such as `"12,345"`, `"1.2e4"` or `"~300 tris"`.
#[must_use]
pub fn parse_count_tag(raw: &str) -> Option<u32> {
    let normalized: String = raw
        .trim()
        .chars()
        .filter(|ch| *ch != ',' && *ch != ' ')
        .collect();

    if let Ok(parsed) = normalized.parse::<i64>() {
        return u32::try_from(parsed).ok().filter(|value| i64::from(*value) <= MAX_TAG_COUNT);
    }
    if let Ok(parsed) = normalized.parse::<f64>() {
        #[allow(clippy::cast_precision_loss)]
        let in_range = parsed.is_finite() && (0.0..=MAX_TAG_COUNT as f64).contains(&parsed);
        if !in_range {
            return None;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let rounded = parsed.round() as u32;
        return Some(rounded);
    }

    let digits: String = normalized.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return None;
    }
    digits
        .parse::<i64>()
        .ok()
        .filter(|value| *value <= MAX_TAG_COUNT)
        .and_then(|value| u32::try_from(value).ok())
}

#[must_use]
pub fn parse_bool_tag(raw: &str) -> Option<bool> {
    let normalized = raw.trim();
    if normalized.eq_ignore_ascii_case("true") || normalized == "1" {
        Some(true)
    } else if normalized.eq_ignore_ascii_case("false") || normalized == "0" {
        Some(false)
    } else {
        None
    }
}

/// Parse `WxH` (either `x` or `X`); both sides must be positive.
#[must_use]
pub fn parse_dimensions_tag(raw: &str) -> Option<(u32, u32)> {
    let normalized = raw.trim();
    let separator = normalized.find(['x', 'X'])?;
    let width = normalized[..separator].trim().parse::<u32>().ok()?;
    let height = normalized[separator + 1..].trim().parse::<u32>().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}

/// Scan every asset in `catalog` in one pass.
#[must_use]
pub fn scan_catalog(catalog: &AssetCatalog) -> AuditScanSnapshot {
    let started = Instant::now();
    let scanner = CatalogScanner::new(catalog);
    let rows = scanner.scan_range(0..scanner.len());
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
    let stats = ScanStats::from_rows(&rows, duration_ms, now_utc());
    tracing::info!(summary = %stats.summary(), "audit scan finished");
    AuditScanSnapshot { rows, stats }
}

/// Evaluate `registry` against every row that was not skipped.
pub fn run_audit(snapshot: &mut AuditScanSnapshot, registry: &AuditRuleRegistry) {
    for row in &mut snapshot.rows {
        if row.scan_state == ScanState::Ok {
            row.audit_issues = registry.evaluate(row);
        }
    }
}
