use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::kit::ParsedKit;

pub const LOW_DAMAGE_MAX: f64 = 120.0;
pub const MEDIUM_DAMAGE_MAX: f64 = 300.0;

#[derive(Debug, Clone, Copy, Default, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Element {
    #[default]
    Unknown,
    Fire,
    Ice,
    Nature,
    Lightning,
    Physical,
}

impl Element {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Fire => "fire",
            Self::Ice => "ice",
            Self::Nature => "nature",
            Self::Lightning => "lightning",
            Self::Physical => "physical",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DamageTier {
    #[default]
    Low,
    Medium,
    High,
}

impl DamageTier {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    #[must_use]
    pub fn from_damage(damage: f64) -> Self {
        if damage <= LOW_DAMAGE_MAX {
            Self::Low
        } else if damage <= MEDIUM_DAMAGE_MAX {
            Self::Medium
        } else {
            Self::High
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ControlProfile {
    #[default]
    None,
    SoftControl,
    HardControl,
}

impl ControlProfile {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SoftControl => "soft_control",
            Self::HardControl => "hard_control",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UsageScene {
    General,
    Forest,
    BossPhase2,
}

impl UsageScene {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Forest => "forest",
            Self::BossPhase2 => "boss_phase2",
        }
    }
}

const FIRE_WORDS: &[&str] = &["fire", "flame", "burn", "火"];
const ICE_WORDS: &[&str] = &["ice", "frost", "chill", "冰"];
const NATURE_WORDS: &[&str] = &["nature", "forest", "vine", "wood", "森林"];
const LIGHTNING_WORDS: &[&str] = &["lightning", "thunder", "shock", "雷"];
const HARD_CONTROL_WORDS: &[&str] = &["stun", "freeze", "root", "knockup", "眩晕", "冰冻", "禁锢"];
const SOFT_CONTROL_WORDS: &[&str] = &["slow", "chill", "snare", "减速", "迟缓"];
const FOREST_SCENE_WORDS: &[&str] = &["forest", "jungle", "wood", "森林"];
const BOSS_SCENE_WORDS: &[&str] = &["boss", "phase2", "p2", "二阶段"];

pub(crate) fn contains_any(text: &str, words: &[&str]) -> bool {
    words.iter().any(|word| text.contains(word))
}

#[must_use]
pub fn resolve_element(searchable: &str) -> Element {
    if contains_any(searchable, FIRE_WORDS) {
        Element::Fire
    } else if contains_any(searchable, ICE_WORDS) {
        Element::Ice
    } else if contains_any(searchable, NATURE_WORDS) {
        Element::Nature
    } else if contains_any(searchable, LIGHTNING_WORDS) {
        Element::Lightning
    } else {
        Element::Physical
    }
}

#[must_use]
pub fn resolve_control_profile(searchable: &str) -> ControlProfile {
    if contains_any(searchable, HARD_CONTROL_WORDS) {
        ControlProfile::HardControl
    } else if contains_any(searchable, SOFT_CONTROL_WORDS) {
        ControlProfile::SoftControl
    } else {
        ControlProfile::None
    }
}

/// Every document is usable in the general scene; keyword hits add more.
#[must_use]
pub fn resolve_usage_scenes(searchable: &str) -> BTreeSet<UsageScene> {
    let mut scenes = BTreeSet::from([UsageScene::General]);
    if contains_any(searchable, FOREST_SCENE_WORDS) {
        scenes.insert(UsageScene::Forest);
    }
    if contains_any(searchable, BOSS_SCENE_WORDS) {
        scenes.insert(UsageScene::BossPhase2);
    }
    scenes
}

fn facet_tokens(document: &SearchDocument) -> Vec<&'static str> {
    let mut tokens: Vec<&'static str> = match document.element {
        Element::Fire => vec!["fire", "flame", "火"],
        Element::Ice => vec!["ice", "frost", "冰"],
        Element::Nature => vec!["nature", "forest", "森林"],
        Element::Lightning => vec!["lightning", "thunder", "雷"],
        Element::Physical => vec!["physical", "物理"],
        Element::Unknown => Vec::new(),
    };
    tokens.extend_from_slice(match document.damage_tier {
        DamageTier::Low => &["low_damage", "low", "不高"],
        DamageTier::Medium => &["mid_damage", "medium", "中等"],
        DamageTier::High => &["high_damage", "high", "高爆发"],
    });
    match document.control_profile {
        ControlProfile::SoftControl => tokens.extend_from_slice(&["soft_control", "slow", "减速"]),
        ControlProfile::HardControl => tokens.extend_from_slice(&["hard_control", "stun", "硬控"]),
        ControlProfile::None => {}
    }
    if document.usage_scenes.contains(&UsageScene::Forest) {
        tokens.extend_from_slice(&["forest", "jungle", "森林"]);
    }
    if document.usage_scenes.contains(&UsageScene::BossPhase2) {
        tokens.extend_from_slice(&["boss", "phase2", "二阶段"]);
    }
    tokens
}

/// Indexed view of one ability kit with its derived facets.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct SearchDocument {
    pub asset_path: String,
    pub id: String,
    pub display_name: String,
    pub damage: f64,
    pub element: Element,
    pub damage_tier: DamageTier,
    pub control_profile: ControlProfile,
    pub usage_scenes: BTreeSet<UsageScene>,
    pub tokens: BTreeSet<String>,
}

impl SearchDocument {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
    }
}

/// Derive the facets of `kit` and bind it to `asset_path`.
#[must_use]
pub fn build_document(asset_path: &str, kit: &ParsedKit) -> SearchDocument {
    let searchable = format!("{} {}", kit.id, kit.display_name).to_lowercase();

    let mut document = SearchDocument {
        asset_path: asset_path.to_string(),
        id: kit.id.clone(),
        display_name: kit.display_name.clone(),
        damage: kit.damage,
        element: resolve_element(&searchable),
        damage_tier: DamageTier::from_damage(kit.damage),
        control_profile: resolve_control_profile(&searchable),
        usage_scenes: resolve_usage_scenes(&searchable),
        tokens: BTreeSet::new(),
    };

    let mut tokens = BTreeSet::new();
    let lower_id = kit.id.to_lowercase();
    if !lower_id.is_empty() {
        tokens.insert(lower_id);
    }
    let lower_name = kit.display_name.to_lowercase();
    tokens.extend(lower_name.split_whitespace().map(str::to_string));
    if !lower_name.is_empty() {
        tokens.insert(lower_name);
    }
    tokens.extend(facet_tokens(&document).into_iter().map(str::to_string));
    document.tokens = tokens;
    document
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum SearchIndexError {
    #[error("search document is invalid: id must be non-empty")]
    InvalidDocument,
    #[error("search document id already indexed: {0}")]
    DuplicateId(String),
    #[error("search document id not indexed: {0}")]
    UnknownId(String),
}

/// Primary id map plus facet buckets derived from it.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    documents: BTreeMap<String, SearchDocument>,
    element_bucket: BTreeMap<Element, BTreeSet<String>>,
    damage_tier_bucket: BTreeMap<DamageTier, BTreeSet<String>>,
    control_bucket: BTreeMap<ControlProfile, BTreeSet<String>>,
    scene_bucket: BTreeMap<UsageScene, BTreeSet<String>>,
    token_bucket: BTreeMap<String, BTreeSet<String>>,
}

fn bucket_insert<K: Ord>(bucket: &mut BTreeMap<K, BTreeSet<String>>, key: K, id: &str) {
    bucket.entry(key).or_default().insert(id.to_string());
}

fn bucket_remove<K: Ord>(bucket: &mut BTreeMap<K, BTreeSet<String>>, key: &K, id: &str) {
    if let Some(ids) = bucket.get_mut(key) {
        ids.remove(id);
        if ids.is_empty() {
            bucket.remove(key);
        }
    }
}

impl SearchIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// # Errors
    /// Rejects invalid documents and ids that are already indexed; the index
    /// is untouched on error.
    pub fn add_document(&mut self, document: SearchDocument) -> Result<(), SearchIndexError> {
        if !document.is_valid() {
            return Err(SearchIndexError::InvalidDocument);
        }
        if self.documents.contains_key(&document.id) {
            return Err(SearchIndexError::DuplicateId(document.id));
        }

        let id = document.id.as_str();
        bucket_insert(&mut self.element_bucket, document.element, id);
        bucket_insert(&mut self.damage_tier_bucket, document.damage_tier, id);
        bucket_insert(&mut self.control_bucket, document.control_profile, id);
        for scene in &document.usage_scenes {
            bucket_insert(&mut self.scene_bucket, *scene, id);
        }
        for token in &document.tokens {
            bucket_insert(&mut self.token_bucket, token.clone(), id);
        }
        self.documents.insert(document.id.clone(), document);
        Ok(())
    }

    /// # Errors
    /// Returns an error when `id` is not indexed.
    pub fn remove_document(&mut self, id: &str) -> Result<SearchDocument, SearchIndexError> {
        let document = self
            .documents
            .remove(id)
            .ok_or_else(|| SearchIndexError::UnknownId(id.to_string()))?;

        bucket_remove(&mut self.element_bucket, &document.element, id);
        bucket_remove(&mut self.damage_tier_bucket, &document.damage_tier, id);
        bucket_remove(&mut self.control_bucket, &document.control_profile, id);
        for scene in &document.usage_scenes {
            bucket_remove(&mut self.scene_bucket, scene, id);
        }
        for token in &document.tokens {
            bucket_remove(&mut self.token_bucket, token, id);
        }
        Ok(document)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&SearchDocument> {
        self.documents.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.documents.contains_key(id)
    }

    /// Documents in ascending id order.
    pub fn documents(&self) -> impl Iterator<Item = &SearchDocument> {
        self.documents.values()
    }

    #[must_use]
    pub fn ids_with_element(&self, element: Element) -> Option<&BTreeSet<String>> {
        self.element_bucket.get(&element)
    }

    #[must_use]
    pub fn ids_with_damage_tier(&self, tier: DamageTier) -> Option<&BTreeSet<String>> {
        self.damage_tier_bucket.get(&tier)
    }

    #[must_use]
    pub fn ids_with_control(&self, profile: ControlProfile) -> Option<&BTreeSet<String>> {
        self.control_bucket.get(&profile)
    }

    #[must_use]
    pub fn ids_with_scene(&self, scene: UsageScene) -> Option<&BTreeSet<String>> {
        self.scene_bucket.get(&scene)
    }

    #[must_use]
    pub fn ids_with_token(&self, token: &str) -> Option<&BTreeSet<String>> {
        self.token_bucket.get(token)
    }

    /// Every id referenced by any facet bucket.
    #[must_use]
    pub fn bucketed_ids(&self) -> BTreeSet<&str> {
        let mut ids = BTreeSet::new();
        let buckets = self
            .element_bucket
            .values()
            .chain(self.damage_tier_bucket.values())
            .chain(self.control_bucket.values())
            .chain(self.scene_bucket.values())
            .chain(self.token_bucket.values());
        for bucket in buckets {
            ids.extend(bucket.iter().map(String::as_str));
        }
        ids
    }
}
