use std::collections::BTreeMap;
use std::time::Instant;

use agent_gate_core::{format_rfc3339, now_utc};
use serde::Serialize;
use time::OffsetDateTime;

use crate::kit::ParsedKit;
use crate::query::{run_query, SearchQueryResult};
use crate::schema::{build_document, SearchDocument, SearchIndex, SearchIndexError};

#[derive(Debug, Clone, Copy, Default, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    #[default]
    None,
    FullRebuild,
    IncrementalRefresh,
    IncrementalRemove,
}

impl RefreshMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::FullRebuild => "full_rebuild",
            Self::IncrementalRefresh => "incremental_refresh",
            Self::IncrementalRemove => "incremental_remove",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct IndexStats {
    pub indexed_document_count: usize,
    pub display_name_covered: usize,
    pub scene_covered: usize,
    pub token_covered: usize,
    #[serde(skip)]
    pub last_refresh_utc: Option<OffsetDateTime>,
    pub last_refresh_ms: f64,
    pub last_refresh_mode: RefreshMode,
}

impl IndexStats {
    fn apply(&mut self, document: &SearchDocument, added: bool) {
        let step = |count: &mut usize, covered: bool| {
            if !covered {
                return;
            }
            if added {
                *count += 1;
            } else {
                *count = count.saturating_sub(1);
            }
        };
        step(&mut self.indexed_document_count, true);
        step(&mut self.display_name_covered, !document.display_name.is_empty());
        step(&mut self.scene_covered, !document.usage_scenes.is_empty());
        step(&mut self.token_covered, !document.tokens.is_empty());
    }

    fn coverage(&self, covered: usize) -> f64 {
        if self.indexed_document_count == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let (covered, total) = (covered as f64, self.indexed_document_count as f64);
        covered * 100.0 / total
    }

    #[must_use]
    pub fn summary(&self) -> String {
        let updated = self
            .last_refresh_utc
            .and_then(|utc| format_rfc3339(utc).ok())
            .unwrap_or_else(|| "-".to_string());
        format!(
            "mode={} docs={} display_name_coverage={:.1}% scene_coverage={:.1}% token_coverage={:.1}% refresh_ms={:.2} updated_utc={}",
            self.last_refresh_mode.as_str(),
            self.indexed_document_count,
            self.coverage(self.display_name_covered),
            self.coverage(self.scene_covered),
            self.coverage(self.token_covered),
            self.last_refresh_ms,
            updated,
        )
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum SearchServiceError {
    #[error("asset path must be non-empty")]
    EmptyAssetPath,
    #[error("kit for {path} does not produce a valid search document")]
    InvalidDocument { path: String },
    #[error("id {id} is already indexed by another asset (refresh of {path} rejected)")]
    IdConflict { id: String, path: String },
    #[error("{operation} aborted: stale path mapping detected path={path} id={id}")]
    StaleMapping {
        operation: &'static str,
        path: String,
        id: String,
    },
    #[error("no indexed document for asset path {0}")]
    UnknownAssetPath(String),
    #[error("refresh of {path} failed and restoring id {old_id} also failed")]
    RollbackFailed { path: String, old_id: String },
    #[error(transparent)]
    Index(#[from] SearchIndexError),
}

/// Search index kept in sync with asset paths.
#[derive(Debug, Clone, Default)]
pub struct SearchIndexService {
    index: SearchIndex,
    path_to_id: BTreeMap<String, String>,
    stats: IndexStats,
}

impl SearchIndexService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    #[must_use]
    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    #[must_use]
    pub fn id_for_path(&self, asset_path: &str) -> Option<&str> {
        self.path_to_id.get(asset_path).map(String::as_str)
    }

    /// Replace the whole index with `entries`; duplicate or invalid kits are
    /// skipped.
    pub fn rebuild<I>(&mut self, entries: I) -> &IndexStats
    where
        I: IntoIterator<Item = (String, ParsedKit)>,
    {
        let started = Instant::now();
        self.index.clear();
        self.path_to_id.clear();
        self.stats = IndexStats::default();

        for (asset_path, kit) in entries {
            let document = build_document(&asset_path, &kit);
            let tracked = document.clone();
            if self.index.add_document(document).is_err() {
                tracing::warn!(
                    id = %kit.id,
                    path = %asset_path,
                    "skip duplicated or invalid search document"
                );
                continue;
            }
            self.stats.apply(&tracked, true);
            self.path_to_id.insert(asset_path, tracked.id);
        }

        self.finish_refresh(RefreshMode::FullRebuild, elapsed_ms(started));
        &self.stats
    }

    /// Re-index one asset, replacing whatever document the path had before.
    ///
    /// # Errors
    /// Fails without changing the index when the path is empty, the kit has
    /// no id, the new id belongs to another asset, or the path maps to an id
    /// the index no longer holds.
    pub fn refresh_asset(
        &mut self,
        asset_path: &str,
        kit: &ParsedKit,
    ) -> Result<&IndexStats, SearchServiceError> {
        if asset_path.is_empty() {
            return Err(SearchServiceError::EmptyAssetPath);
        }
        let started = Instant::now();
        let document = build_document(asset_path, kit);
        if !document.is_valid() {
            return Err(SearchServiceError::InvalidDocument {
                path: asset_path.to_string(),
            });
        }

        let old_id = self.path_to_id.get(asset_path).cloned();
        if let Some(old_id) = &old_id {
            if !self.index.contains(old_id) {
                return Err(self.stale_mapping("refresh_asset", asset_path, old_id));
            }
        }
        if let Some(existing) = self.index.get(&document.id) {
            if existing.asset_path != asset_path {
                return Err(SearchServiceError::IdConflict {
                    id: document.id,
                    path: asset_path.to_string(),
                });
            }
        }

        let old_document = match &old_id {
            Some(old_id) => {
                let removed = self.index.remove_document(old_id)?;
                self.stats.apply(&removed, false);
                Some(removed)
            }
            None => None,
        };

        let tracked = document.clone();
        if let Err(err) = self.index.add_document(document) {
            if let Some(old_document) = old_document {
                let old_id = old_document.id.clone();
                let restored = old_document.clone();
                if self.index.add_document(restored).is_err() {
                    tracing::error!(path = %asset_path, old_id = %old_id, "refresh rollback failed");
                    self.path_to_id.remove(asset_path);
                    return Err(SearchServiceError::RollbackFailed {
                        path: asset_path.to_string(),
                        old_id,
                    });
                }
                self.stats.apply(&old_document, true);
            }
            return Err(err.into());
        }

        self.stats.apply(&tracked, true);
        self.path_to_id.insert(asset_path.to_string(), tracked.id);
        self.finish_refresh(RefreshMode::IncrementalRefresh, elapsed_ms(started));
        Ok(&self.stats)
    }

    /// # Errors
    /// Fails when the path is not indexed or its mapping points at an id the
    /// index no longer holds.
    pub fn remove_asset_by_path(&mut self, asset_path: &str) -> Result<&IndexStats, SearchServiceError> {
        let Some(id) = self.path_to_id.get(asset_path).cloned() else {
            return Err(SearchServiceError::UnknownAssetPath(asset_path.to_string()));
        };
        if !self.index.contains(&id) {
            return Err(self.stale_mapping("remove_asset_by_path", asset_path, &id));
        }

        let removed = self.index.remove_document(&id)?;
        self.stats.apply(&removed, false);
        self.path_to_id.remove(asset_path);
        self.finish_refresh(RefreshMode::IncrementalRemove, 0.0);
        Ok(&self.stats)
    }

    #[must_use]
    pub fn query(&self, text: &str, top_k: usize) -> SearchQueryResult {
        run_query(&self.index, text, top_k)
    }

    #[cfg(test)]
    pub(crate) fn index_mut(&mut self) -> &mut SearchIndex {
        &mut self.index
    }

    fn stale_mapping(&self, operation: &'static str, path: &str, id: &str) -> SearchServiceError {
        tracing::error!(
            operation,
            path = %path,
            id = %id,
            indexed = self.index.len(),
            "stale path mapping detected"
        );
        SearchServiceError::StaleMapping {
            operation,
            path: path.to_string(),
            id: id.to_string(),
        }
    }

    fn finish_refresh(&mut self, mode: RefreshMode, refresh_ms: f64) {
        self.stats.last_refresh_mode = mode;
        self.stats.last_refresh_ms = refresh_ms;
        self.stats.last_refresh_utc = Some(now_utc());
        tracing::info!(summary = %self.stats.summary(), "search index updated");
    }
}

fn elapsed_ms(started: Instant) -> f64 {
    started.elapsed().as_secs_f64() * 1000.0
}
