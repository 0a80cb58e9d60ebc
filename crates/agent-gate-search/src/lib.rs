#![forbid(unsafe_code)]
//! Facet search over ability kits.
//!
//! Kit files parse into [`ParsedKit`], [`build_document`] derives the search
//! facets, [`SearchIndexService`] keeps the bucketed index in step with asset
//! paths, and [`run_query`] turns free text into filters and ranked hits.

mod kit;
mod query;
mod schema;
mod service;

pub use kit::{
    load_kit_directory, parse_kit_file, parse_kit_json, KitDirectory, KitErrorCode,
    KitParseError, ParsedKit, SUPPORTED_KIT_SCHEMA_VERSION,
};
pub use query::{
    normalize_query_text, parse_query, run_query, DamagePreference, ParsedSearchQuery, SearchHit,
    SearchQueryResult, DEFAULT_TOP_K, MAX_TOP_K, SUGGEST_DROP_LOWER_DAMAGE, SUGGEST_EMPTY_INDEX,
    SUGGEST_RELAX_FILTERS,
};
pub use schema::{
    build_document, resolve_control_profile, resolve_element, resolve_usage_scenes,
    ControlProfile, DamageTier, Element, SearchDocument, SearchIndex, SearchIndexError,
    UsageScene, LOW_DAMAGE_MAX, MEDIUM_DAMAGE_MAX,
};
pub use service::{IndexStats, RefreshMode, SearchIndexService, SearchServiceError};
