use std::collections::BTreeSet;

use serde::Serialize;

use crate::schema::{
    contains_any, ControlProfile, DamageTier, Element, SearchDocument, SearchIndex, UsageScene,
};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 10;

pub const SUGGEST_EMPTY_INDEX: &str =
    "Index is empty: import or reimport at least one ability kit first.";
pub const SUGGEST_RELAX_FILTERS: &str =
    "No candidates matched: relax the scene or control filters and search again.";
pub const SUGGEST_DROP_LOWER_DAMAGE: &str =
    "Try dropping the lower-damage constraint to confirm the range of similar abilities first.";

const PUNCTUATION: &[char] = &[
    ',', '，', '.', '。', ';', '；', ':', '：', '/', '\\', '"', '\'', '(', ')', '[', ']', '{', '}',
    '|', '!', '?', '？',
];

const FIRE_WORDS: &[&str] = &["fire", "flame", "burn", "火"];
const ICE_WORDS: &[&str] = &["ice", "frost", "chill", "冰"];
const NATURE_WORDS: &[&str] = &["nature", "forest", "jungle", "森林"];
const LIGHTNING_WORDS: &[&str] = &["lightning", "thunder", "shock", "雷"];
const FOREST_WORDS: &[&str] = &["forest", "jungle", "森林"];
const BOSS_WORDS: &[&str] = &["boss", "phase2", "二阶段"];
const HARD_CONTROL_WORDS: &[&str] =
    &["hard control", "hard_control", "stun", "freeze", "眩晕", "冰冻", "硬控"];
const SOFT_CONTROL_WORDS: &[&str] = &["soft control", "soft_control", "slow", "减速", "软控"];
const ANY_CONTROL_WORDS: &[&str] = &["control", "控制", "控场", "控制倾向"];
const HIGH_DAMAGE_WORDS: &[&str] = &["high burst", "high_damage", "高爆发", "高伤", "高伤害", "爆发"];
const MEDIUM_DAMAGE_WORDS: &[&str] = &["medium", "中等"];
const LOW_DAMAGE_WORDS: &[&str] = &["low", "lower", "不高", "更低", "低伤"];
const LOWER_THAN_REFERENCE_WORDS: &[&str] = &["lower", "更低", "不高", "低"];

#[derive(Debug, Clone, Copy, Default, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum DamagePreference {
    #[default]
    Any,
    PreferLow,
    PreferMedium,
    PreferHigh,
}

impl DamagePreference {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::PreferLow => "prefer_low",
            Self::PreferMedium => "prefer_medium",
            Self::PreferHigh => "prefer_high",
        }
    }

    /// Score adjustment in hundredths of a point.
    fn bonus_centi(self, tier: DamageTier) -> i64 {
        match (self, tier) {
            (Self::Any, _) => 0,
            (Self::PreferLow, DamageTier::Low)
            | (Self::PreferMedium, DamageTier::Medium)
            | (Self::PreferHigh, DamageTier::High) => 200,
            (Self::PreferLow, DamageTier::Medium) => 100,
            (Self::PreferLow, DamageTier::High) => -100,
            (Self::PreferMedium, _) => 0,
            (Self::PreferHigh, _) => -50,
        }
    }
}

/// Structured filters extracted from free query text.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct ParsedSearchQuery {
    pub raw_text: String,
    pub normalized_text: String,
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub element: Option<Element>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub control_profile: Option<ControlProfile>,
    pub require_any_control: bool,
    pub scenes: Vec<UsageScene>,
    pub damage_preference: DamagePreference,
    pub lower_damage_than_reference: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_to_id: Option<String>,
    pub tokens: Vec<String>,
}

impl ParsedSearchQuery {
    #[must_use]
    pub fn summary(&self) -> String {
        let mut parts = vec![format!(
            "topk={} damage={} require_any_control={} lower_than_ref={}",
            self.top_k,
            self.damage_preference.as_str(),
            self.require_any_control,
            self.lower_damage_than_reference,
        )];
        if let Some(element) = self.element {
            parts.push(format!("element={}", element.as_str()));
        }
        if let Some(profile) = self.control_profile {
            parts.push(format!("control={}", profile.as_str()));
        }
        if !self.scenes.is_empty() {
            let scenes: Vec<&str> = self.scenes.iter().map(|scene| scene.as_str()).collect();
            parts.push(format!("scenes=[{}]", scenes.join(",")));
        }
        if let Some(similar_to) = &self.similar_to_id {
            parts.push(format!("similar_to={similar_to}"));
        }
        parts.join(" ")
    }
}

/// Lowercase `text` and turn query punctuation into spaces.
#[must_use]
pub fn normalize_query_text(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|ch| if PUNCTUATION.contains(&ch) { ' ' } else { ch })
        .collect()
}

/// Extract filters from `text`; `index` supplies the ids a query may refer to.
#[must_use]
pub fn parse_query(index: &SearchIndex, text: &str, top_k: usize) -> ParsedSearchQuery {
    let normalized = normalize_query_text(text);
    let tokens: BTreeSet<&str> = normalized.split_whitespace().collect();

    let element = if contains_any(&normalized, FIRE_WORDS) {
        Some(Element::Fire)
    } else if contains_any(&normalized, ICE_WORDS) {
        Some(Element::Ice)
    } else if contains_any(&normalized, NATURE_WORDS) {
        Some(Element::Nature)
    } else if contains_any(&normalized, LIGHTNING_WORDS) {
        Some(Element::Lightning)
    } else {
        None
    };

    let mut scenes = Vec::new();
    if contains_any(&normalized, FOREST_WORDS) {
        scenes.push(UsageScene::Forest);
    }
    if contains_any(&normalized, BOSS_WORDS) {
        scenes.push(UsageScene::BossPhase2);
    }

    let (control_profile, require_any_control) = if contains_any(&normalized, HARD_CONTROL_WORDS) {
        (Some(ControlProfile::HardControl), true)
    } else if contains_any(&normalized, SOFT_CONTROL_WORDS) {
        (Some(ControlProfile::SoftControl), true)
    } else {
        (None, contains_any(&normalized, ANY_CONTROL_WORDS))
    };

    let damage_preference = if contains_any(&normalized, HIGH_DAMAGE_WORDS) {
        DamagePreference::PreferHigh
    } else if contains_any(&normalized, MEDIUM_DAMAGE_WORDS) {
        DamagePreference::PreferMedium
    } else if contains_any(&normalized, LOW_DAMAGE_WORDS) {
        DamagePreference::PreferLow
    } else {
        DamagePreference::Any
    };

    let similar_to_id = index
        .documents()
        .map(|document| document.id.as_str())
        .find(|id| normalized.contains(&id.to_lowercase()))
        .map(str::to_string);
    let lower_damage_than_reference =
        similar_to_id.is_some() && contains_any(&normalized, LOWER_THAN_REFERENCE_WORDS);

    ParsedSearchQuery {
        raw_text: text.to_string(),
        top_k: top_k.clamp(1, MAX_TOP_K),
        element,
        control_profile,
        require_any_control,
        scenes,
        damage_preference,
        lower_damage_than_reference,
        similar_to_id,
        tokens: tokens.into_iter().map(str::to_string).collect(),
        normalized_text: normalized,
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub display_name: String,
    pub asset_path: String,
    pub score: f64,
    pub element: Element,
    pub damage: f64,
    pub damage_tier: DamageTier,
    pub control_profile: ControlProfile,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SearchQueryResult {
    pub query: ParsedSearchQuery,
    pub candidate_count: usize,
    pub hits: Vec<SearchHit>,
    pub suggestions: Vec<String>,
}

impl SearchQueryResult {
    #[must_use]
    pub fn summary(&self) -> String {
        let top_ids: Vec<String> = self
            .hits
            .iter()
            .map(|hit| format!("{}({:.2})", hit.id, hit.score))
            .collect();
        format!(
            "candidates={} topk={} top_ids={}",
            self.candidate_count,
            self.query.top_k,
            top_ids.join(",")
        )
    }
}

fn intersect(candidates: &mut BTreeSet<String>, bucket: Option<&BTreeSet<String>>) {
    match bucket {
        Some(ids) => candidates.retain(|id| ids.contains(id)),
        None => candidates.clear(),
    }
}

fn score_centi(
    query: &ParsedSearchQuery,
    document: &SearchDocument,
    reference: Option<&SearchDocument>,
) -> i64 {
    let mut score = 100;
    if query.element == Some(document.element) {
        score += 300;
    }
    for scene in &query.scenes {
        if document.usage_scenes.contains(scene) {
            score += 200;
        }
    }
    if query.require_any_control && document.control_profile != ControlProfile::None {
        score += 150;
    }
    if query.control_profile == Some(document.control_profile) {
        score += 100;
    }
    score += query.damage_preference.bonus_centi(document.damage_tier);

    let overlap = query
        .tokens
        .iter()
        .filter(|token| document.tokens.contains(*token))
        .count();
    let overlap = i64::try_from(overlap).unwrap_or(i64::MAX);
    score += overlap.saturating_mul(35).min(200);

    if let Some(reference) = reference {
        if reference.element == document.element {
            score += 100;
        }
        if reference.control_profile == document.control_profile {
            score += 100;
        }
        let shared_scenes = reference
            .usage_scenes
            .iter()
            .filter(|scene| **scene != UsageScene::General)
            .filter(|scene| document.usage_scenes.contains(*scene))
            .count();
        score += 50 * i64::try_from(shared_scenes).unwrap_or(0);
    }
    score
}

/// Parse `text`, filter the index by the detected facets and rank the rest.
#[must_use]
pub fn run_query(index: &SearchIndex, text: &str, top_k: usize) -> SearchQueryResult {
    let query = parse_query(index, text, top_k);
    let mut result = SearchQueryResult {
        query,
        ..SearchQueryResult::default()
    };
    if index.is_empty() {
        result.suggestions.push(SUGGEST_EMPTY_INDEX.to_string());
        return result;
    }
    let query = &result.query;

    let mut candidates: BTreeSet<String> =
        index.documents().map(|document| document.id.clone()).collect();
    if let Some(element) = query.element {
        intersect(&mut candidates, index.ids_with_element(element));
    }
    if let Some(profile) = query.control_profile {
        intersect(&mut candidates, index.ids_with_control(profile));
    } else if query.require_any_control {
        if let Some(uncontrolled) = index.ids_with_control(ControlProfile::None) {
            candidates.retain(|id| !uncontrolled.contains(id));
        }
    }
    for scene in &query.scenes {
        intersect(&mut candidates, index.ids_with_scene(*scene));
    }

    let reference = query.similar_to_id.as_deref().and_then(|id| index.get(id));
    if query.lower_damage_than_reference {
        if let Some(reference) = reference {
            candidates.retain(|id| {
                index
                    .get(id)
                    .is_some_and(|document| document.damage < reference.damage)
            });
        }
    }

    result.candidate_count = candidates.len();
    if candidates.is_empty() {
        let mut suggestions = vec![SUGGEST_RELAX_FILTERS.to_string()];
        if query.lower_damage_than_reference {
            suggestions.push(SUGGEST_DROP_LOWER_DAMAGE.to_string());
        }
        if let (Some(similar_to), None) = (&query.similar_to_id, reference) {
            suggestions.push(format!(
                "Reference ability {similar_to} does not exist; check the asset id."
            ));
        }
        result.suggestions = suggestions;
        return result;
    }

    let mut ranked: Vec<(i64, &SearchDocument)> = candidates
        .iter()
        .filter_map(|id| index.get(id))
        .map(|document| (score_centi(query, document, reference), document))
        .collect();
    ranked.sort_by(|(left_score, left), (right_score, right)| {
        right_score.cmp(left_score).then_with(|| left.id.cmp(&right.id))
    });
    ranked.truncate(query.top_k);

    result.hits = ranked
        .into_iter()
        .map(|(centi, document)| {
            #[allow(clippy::cast_precision_loss)]
            let score = centi as f64 / 100.0;
            SearchHit {
                id: document.id.clone(),
                display_name: document.display_name.clone(),
                asset_path: document.asset_path.clone(),
                score,
                element: document.element,
                damage: document.damage,
                damage_tier: document.damage_tier,
                control_profile: document.control_profile,
            }
        })
        .collect();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::ParsedKit;
    use crate::schema::build_document;

    fn index() -> SearchIndex {
        let mut index = SearchIndex::new();
        for (id, name, damage) in [
            ("fire_01", "Fireball", 150.0),
            ("ice_stun_02", "Frost Stun", 100.0),
            ("forest_vine_03", "Forest Vine Slow", 90.0),
            ("boss_thunder_04", "Thunder Boss Shock", 450.0),
            ("strike_05", "Heavy Strike", 200.0),
        ] {
            let kit = ParsedKit {
                schema_version: 1,
                id: id.to_string(),
                display_name: name.to_string(),
                damage,
                ..ParsedKit::default()
            };
            if let Err(err) = index.add_document(build_document(&format!("/Game/{id}"), &kit)) {
                panic!("test failure: {err}");
            }
        }
        index
    }

    fn hit_ids(result: &SearchQueryResult) -> Vec<&str> {
        result.hits.iter().map(|hit| hit.id.as_str()).collect()
    }

    #[test]
    fn normalizes_punctuation_and_clamps_top_k() {
        assert_eq!(normalize_query_text("Fire，Stun!(Boss)"), "fire stun  boss ");
        let parsed = parse_query(&SearchIndex::new(), "Fire，Stun!(Boss)", 0);
        assert_eq!(parsed.tokens, vec!["boss", "fire", "stun"]);
        assert_eq!(parsed.top_k, 1);
        assert_eq!(parse_query(&SearchIndex::new(), "x", 50).top_k, MAX_TOP_K);
        assert_eq!(
            parsed.summary(),
            "topk=1 damage=any require_any_control=true lower_than_ref=false element=fire control=hard_control scenes=[boss_phase2]"
        );
    }

    #[test]
    fn element_and_damage_preference_rank_matches() {
        let result = run_query(&index(), "fire high burst", DEFAULT_TOP_K);
        assert_eq!(result.query.element, Some(Element::Fire));
        assert_eq!(result.query.damage_preference, DamagePreference::PreferHigh);
        assert_eq!(result.candidate_count, 1);
        assert_eq!(result.summary(), "candidates=1 topk=5 top_ids=fire_01(3.85)");
        assert!(result.suggestions.is_empty());
    }

    #[test]
    fn any_control_drops_uncontrolled_documents() {
        let result = run_query(&index(), "控制 forest", DEFAULT_TOP_K);
        assert!(result.query.require_any_control);
        assert_eq!(result.query.control_profile, None);
        assert_eq!(result.query.scenes, vec![UsageScene::Forest]);
        assert_eq!(hit_ids(&result), vec!["forest_vine_03"]);
        assert!((result.hits[0].score - 7.85).abs() < 1e-9);
    }

    #[test]
    fn reference_lower_damage_filters_and_ties_sort_by_id() {
        let result = run_query(&index(), "same as strike_05 but 更低", DEFAULT_TOP_K);
        assert_eq!(result.query.similar_to_id.as_deref(), Some("strike_05"));
        assert!(result.query.lower_damage_than_reference);
        assert_eq!(result.query.damage_preference, DamagePreference::PreferLow);
        assert!(result
            .query
            .summary()
            .ends_with("lower_than_ref=true similar_to=strike_05"));
        assert_eq!(hit_ids(&result), vec!["fire_01", "forest_vine_03", "ice_stun_02"]);
        assert!(result.hits.iter().all(|hit| (hit.score - 3.0).abs() < 1e-9));

        let truncated = run_query(&index(), "same as strike_05 but 更低", 2);
        assert_eq!(hit_ids(&truncated), vec!["fire_01", "forest_vine_03"]);
        assert_eq!(truncated.candidate_count, 3);
    }

    #[test]
    fn empty_candidates_carry_suggestions() {
        let result = run_query(&index(), "like boss_thunder_04 but lower", DEFAULT_TOP_K);
        assert_eq!(result.query.element, Some(Element::Lightning));
        assert!(result.query.lower_damage_than_reference);
        assert!(result.hits.is_empty());
        assert_eq!(
            result.suggestions,
            vec![
                SUGGEST_RELAX_FILTERS.to_string(),
                SUGGEST_DROP_LOWER_DAMAGE.to_string()
            ]
        );

        let empty = run_query(&SearchIndex::new(), "fire", DEFAULT_TOP_K);
        assert_eq!(empty.suggestions, vec![SUGGEST_EMPTY_INDEX.to_string()]);
        assert_eq!(empty.summary(), "candidates=0 topk=5 top_ids=");
    }
}
