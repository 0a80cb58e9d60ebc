use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Every path-like argument MUST live under this workspace root.
pub const WORKSPACE_ROOT_PREFIX: &str = "/Game/";

const MAX_BATCH_ASSET_PATHS: u32 = 50;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ToolCapability {
    ReadOnly,
    Write,
    Destructive,
}

impl ToolCapability {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReadOnly => "read_only",
            Self::Write => "write",
            Self::Destructive => "destructive",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "read_only" => Some(Self::ReadOnly),
            "write" => Some(Self::Write),
            "destructive" => Some(Self::Destructive),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_write_like(self) -> bool {
        !matches!(self, Self::ReadOnly)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum ArgValueType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "string[]")]
    StringArray,
    #[serde(rename = "int")]
    Int,
}

impl ArgValueType {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::StringArray => "string[]",
            Self::Int => "int",
        }
    }
}

/// Declared shape and constraints of one tool argument.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ArgSchema {
    pub name: String,
    pub value_type: ArgValueType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_array_len: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_array_len: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_int_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_int_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_string_len: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_string_len: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_string_values: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_int_values: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regex_pattern: Option<String>,
    #[serde(default)]
    pub must_start_with_workspace_root: bool,
    #[serde(default)]
    pub allow_subset_of_enum: bool,
}

impl ArgSchema {
    fn base(name: &str, value_type: ArgValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            required: true,
            min_array_len: None,
            max_array_len: None,
            min_int_value: None,
            max_int_value: None,
            min_string_len: None,
            max_string_len: None,
            allowed_string_values: Vec::new(),
            allowed_int_values: Vec::new(),
            regex_pattern: None,
            must_start_with_workspace_root: false,
            allow_subset_of_enum: false,
        }
    }

    #[must_use]
    pub fn string(name: &str) -> Self {
        Self::base(name, ArgValueType::String)
    }

    #[must_use]
    pub fn string_array(name: &str, min_len: u32, max_len: u32) -> Self {
        let mut schema = Self::base(name, ArgValueType::StringArray);
        schema.min_array_len = Some(min_len);
        schema.max_array_len = Some(max_len);
        schema
    }

    #[must_use]
    pub fn int(name: &str) -> Self {
        Self::base(name, ArgValueType::Int)
    }

    #[must_use]
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    #[must_use]
    pub fn with_allowed_strings(mut self, values: &[&str]) -> Self {
        self.allowed_string_values = values.iter().map(|value| (*value).to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_allowed_ints(mut self, values: &[i64]) -> Self {
        self.allowed_int_values = values.to_vec();
        self
    }

    #[must_use]
    pub fn with_int_range(mut self, min: i64, max: i64) -> Self {
        self.min_int_value = Some(min);
        self.max_int_value = Some(max);
        self
    }

    #[must_use]
    pub fn with_string_length(mut self, min: u32, max: u32) -> Self {
        self.min_string_len = Some(min);
        self.max_string_len = Some(max);
        self
    }

    #[must_use]
    pub fn with_regex(mut self, pattern: &str) -> Self {
        self.regex_pattern = Some(pattern.to_string());
        self
    }

    #[must_use]
    pub fn rooted(mut self) -> Self {
        self.must_start_with_workspace_root = true;
        self
    }

    #[must_use]
    pub fn subset_of_enum(mut self) -> Self {
        self.allow_subset_of_enum = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ToolDescriptor {
    pub tool_name: String,
    pub capability: ToolCapability,
    pub supports_dry_run: bool,
    pub supports_undo: bool,
    #[serde(default)]
    pub destructive: bool,
    pub domain: String,
    pub summary: String,
    #[serde(default)]
    pub args: Vec<ArgSchema>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn find_arg(&self, name: &str) -> Option<&ArgSchema> {
        self.args.iter().find(|arg| arg.name == name)
    }
}

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RegistryError {
    #[error("tool_name is empty")]
    EmptyToolName,
    #[error("duplicate tool_name: {0}")]
    DuplicateTool(String),
    #[error("destructive tool must declare destructive capability: {0}")]
    DestructiveCapabilityMissing(String),
    #[error("tool {0} has empty arg name")]
    EmptyArgName(String),
    #[error("tool {tool} has duplicate arg: {arg}")]
    DuplicateArg { tool: String, arg: String },
    #[error("read_only tool cannot be destructive: {0}")]
    ReadOnlyDestructive(String),
    #[error("read_only tool should not declare supports_undo=true: {0}")]
    ReadOnlyWithUndo(String),
    #[error("tool {0} contains empty arg name")]
    FrozenEmptyArgName(String),
    #[error("tool {tool} arg {arg} has invalid {bounds} bounds")]
    InvalidBounds {
        tool: String,
        arg: String,
        bounds: &'static str,
    },
}

/// Ordered whitelist of tools that plans may reference.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index_by_name: BTreeMap<String, usize>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the frozen default catalog.
    ///
    /// # Errors
    /// Returns an error if the built-in catalog violates registration rules.
    pub fn with_defaults() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for descriptor in default_catalog() {
            registry.register(descriptor)?;
        }
        Ok(registry)
    }

    /// # Errors
    /// Returns an error for empty or duplicate tool names, empty or duplicate
    /// arg names, and destructive tools lacking the destructive capability.
    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if descriptor.tool_name.is_empty() {
            return Err(RegistryError::EmptyToolName);
        }
        if self.index_by_name.contains_key(&descriptor.tool_name) {
            return Err(RegistryError::DuplicateTool(descriptor.tool_name));
        }
        if descriptor.destructive && descriptor.capability != ToolCapability::Destructive {
            return Err(RegistryError::DestructiveCapabilityMissing(
                descriptor.tool_name,
            ));
        }

        let mut seen = BTreeSet::new();
        for arg in &descriptor.args {
            if arg.name.is_empty() {
                return Err(RegistryError::EmptyArgName(descriptor.tool_name.clone()));
            }
            if !seen.insert(arg.name.as_str()) {
                return Err(RegistryError::DuplicateArg {
                    tool: descriptor.tool_name.clone(),
                    arg: arg.name.clone(),
                });
            }
        }

        self.index_by_name
            .insert(descriptor.tool_name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    #[must_use]
    pub fn find(&self, tool_name: &str) -> Option<&ToolDescriptor> {
        self.index_by_name
            .get(tool_name)
            .and_then(|index| self.tools.get(*index))
    }

    #[must_use]
    pub fn is_whitelisted(&self, tool_name: &str) -> bool {
        self.index_by_name.contains_key(tool_name)
    }

    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools
            .iter()
            .map(|tool| tool.tool_name.as_str())
            .collect()
    }

    /// Re-check the loaded catalog against the frozen shape rules.
    ///
    /// # Errors
    /// Returns the first violation found, in registration order.
    pub fn validate_frozen_defaults(&self) -> Result<(), RegistryError> {
        for tool in &self.tools {
            if tool.tool_name.is_empty() {
                return Err(RegistryError::EmptyToolName);
            }
            if tool.capability == ToolCapability::ReadOnly {
                if tool.destructive {
                    return Err(RegistryError::ReadOnlyDestructive(tool.tool_name.clone()));
                }
                if tool.supports_undo {
                    return Err(RegistryError::ReadOnlyWithUndo(tool.tool_name.clone()));
                }
            }
            for arg in &tool.args {
                if arg.name.is_empty() {
                    return Err(RegistryError::FrozenEmptyArgName(tool.tool_name.clone()));
                }
                let bounds = if inverted(arg.min_array_len, arg.max_array_len) {
                    Some("array length")
                } else if inverted(arg.min_int_value, arg.max_int_value) {
                    Some("int")
                } else if inverted(arg.min_string_len, arg.max_string_len) {
                    Some("string length")
                } else {
                    None
                };
                if let Some(bounds) = bounds {
                    return Err(RegistryError::InvalidBounds {
                        tool: tool.tool_name.clone(),
                        arg: arg.name.clone(),
                        bounds,
                    });
                }
            }
        }
        Ok(())
    }
}

fn inverted<T: PartialOrd>(min: Option<T>, max: Option<T>) -> bool {
    matches!((min, max), (Some(min), Some(max)) if min > max)
}

fn descriptor(
    tool_name: &str,
    capability: ToolCapability,
    domain: &str,
    summary: &str,
    args: Vec<ArgSchema>,
) -> ToolDescriptor {
    let write_like = capability.is_write_like();
    ToolDescriptor {
        tool_name: tool_name.to_string(),
        capability,
        supports_dry_run: write_like,
        supports_undo: write_like,
        destructive: capability == ToolCapability::Destructive,
        domain: domain.to_string(),
        summary: summary.to_string(),
        args,
    }
}

fn batch_asset_paths() -> ArgSchema {
    ArgSchema::string_array("asset_paths", 1, MAX_BATCH_ASSET_PATHS)
}

fn default_catalog() -> Vec<ToolDescriptor> {
    vec![
        descriptor(
            "ScanAssets",
            ToolCapability::ReadOnly,
            "AssetCompliance",
            "Read-only asset audit scan entry point.",
            Vec::new(),
        ),
        descriptor(
            "SetTextureMaxSize",
            ToolCapability::Write,
            "AssetCompliance",
            "Set texture maximum size using frozen allowed enum values.",
            vec![
                batch_asset_paths(),
                ArgSchema::int("max_size").with_allowed_ints(&[256, 512, 1024, 2048, 4096, 8192]),
            ],
        ),
        descriptor(
            "SetMeshLODGroup",
            ToolCapability::Write,
            "AssetCompliance",
            "Assign mesh LOD group using frozen whitelist.",
            vec![
                batch_asset_paths(),
                ArgSchema::string("lod_group").with_allowed_strings(&[
                    "LevelArchitecture",
                    "SmallProp",
                    "LargeProp",
                    "Foliage",
                    "Character",
                ]),
            ],
        ),
        descriptor(
            "ScanLevelMeshRisks",
            ToolCapability::ReadOnly,
            "LevelRisk",
            "Scan selected/all level actors for missing collision and default material risks.",
            vec![
                ArgSchema::string("scope").with_allowed_strings(&["selected", "all"]),
                ArgSchema::string_array("checks", 1, 2)
                    .with_allowed_strings(&["missing_collision", "default_material"])
                    .subset_of_enum(),
                ArgSchema::int("max_actor_count").with_int_range(1, 5000),
            ],
        ),
        descriptor(
            "NormalizeAssetNamingByMetadata",
            ToolCapability::Write,
            "NamingTraceability",
            "Generate rename/move proposals from import metadata and naming policy.",
            vec![
                batch_asset_paths(),
                ArgSchema::string("metadata_source").with_allowed_strings(&[
                    "auto",
                    "UAssetImportData",
                    "AssetUserData",
                ]),
                ArgSchema::string("prefix_mode").with_allowed_strings(&["auto_by_asset_class"]),
                ArgSchema::string("target_root").rooted(),
            ],
        ),
        descriptor(
            "RenameAsset",
            ToolCapability::Write,
            "NamingTraceability",
            "Rename a single asset with strict identifier regex.",
            vec![
                ArgSchema::string("asset_path").rooted(),
                ArgSchema::string("new_name")
                    .with_string_length(1, 64)
                    .with_regex("^[A-Za-z0-9_]+$"),
            ],
        ),
        descriptor(
            "MoveAsset",
            ToolCapability::Write,
            "NamingTraceability",
            "Move a single asset to a validated /Game path.",
            vec![
                ArgSchema::string("asset_path").rooted(),
                ArgSchema::string("target_path").rooted(),
            ],
        ),
    ]
}
