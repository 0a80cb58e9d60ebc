use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use agent_gate_core::ToolCapability;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::gate::GUEST_ROLE;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct SourceControlConfig {
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RbacUser {
    pub user: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct RbacConfig {
    pub guest_role: String,
    pub guest_capabilities: Vec<String>,
    pub users: Vec<RbacUser>,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            guest_role: GUEST_ROLE.to_string(),
            guest_capabilities: vec![ToolCapability::ReadOnly.as_str().to_string()],
            users: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct GatewayConfig {
    pub source_control: SourceControlConfig,
    pub rbac: RbacConfig,
}

/// Caller identity after whitelist lookup, in the shape the RBAC gate consumes.
#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct RbacIdentity {
    pub user_name: String,
    pub resolved_role: String,
    pub matched_whitelist: bool,
    pub allowed_capabilities: Vec<String>,
}

impl GatewayConfig {
    #[must_use]
    pub fn resolve_identity(&self, user_name: &str) -> RbacIdentity {
        let needle = user_name.trim();
        match self
            .rbac
            .users
            .iter()
            .find(|entry| entry.user.eq_ignore_ascii_case(needle))
        {
            Some(entry) => RbacIdentity {
                user_name: needle.to_string(),
                resolved_role: if entry.role.is_empty() {
                    self.rbac.guest_role.clone()
                } else {
                    entry.role.clone()
                },
                matched_whitelist: true,
                allowed_capabilities: entry.capabilities.clone(),
            },
            None => RbacIdentity {
                user_name: needle.to_string(),
                resolved_role: self.rbac.guest_role.clone(),
                matched_whitelist: false,
                allowed_capabilities: self.rbac.guest_capabilities.clone(),
            },
        }
    }
}

/// Load, validate and normalize a gateway config file.
///
/// # Errors
/// Returns an error if the file cannot be read, is not valid YAML for
/// [`GatewayConfig`], or fails validation.
pub fn load_gateway_config(path: &Path) -> Result<GatewayConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read gateway config {}", path.display()))?;
    parse_gateway_config_yaml(&raw)
}

/// # Errors
/// Returns an error if `yaml` does not describe a valid [`GatewayConfig`].
pub fn parse_gateway_config_yaml(yaml: &str) -> Result<GatewayConfig> {
    let mut config: GatewayConfig = serde_yaml::from_str(yaml)
        .map_err(|err| anyhow!("invalid gateway config YAML structure: {err}"))?;
    normalize(&mut config);
    validate(&config)?;
    tracing::debug!(
        source_control_enabled = config.source_control.enabled,
        rbac_users = config.rbac.users.len(),
        guest_role = %config.rbac.guest_role,
        "loaded gateway config"
    );
    Ok(config)
}

fn normalize(config: &mut GatewayConfig) {
    let rbac = &mut config.rbac;
    rbac.guest_role = rbac.guest_role.trim().to_string();
    if rbac.guest_role.is_empty() {
        rbac.guest_role = GUEST_ROLE.to_string();
    }
    trim_all(&mut rbac.guest_capabilities);
    for user in &mut rbac.users {
        user.user = user.user.trim().to_string();
        user.role = user.role.trim().to_string();
        trim_all(&mut user.capabilities);
    }
}

fn trim_all(values: &mut [String]) {
    for value in values {
        *value = value.trim().to_string();
    }
}

fn validate(config: &GatewayConfig) -> Result<()> {
    ensure_capabilities("rbac.guest_capabilities", &config.rbac.guest_capabilities)?;

    let mut seen = BTreeSet::new();
    for (index, user) in config.rbac.users.iter().enumerate() {
        if user.user.is_empty() {
            return Err(anyhow!("rbac.users[{index}].user must be non-empty"));
        }
        if !seen.insert(user.user.to_ascii_lowercase()) {
            return Err(anyhow!("duplicate rbac user: {}", user.user));
        }
        ensure_capabilities(
            &format!("rbac.users[{index}].capabilities"),
            &user.capabilities,
        )?;
    }
    Ok(())
}

fn ensure_capabilities(field: &str, values: &[String]) -> Result<()> {
    for value in values {
        if ToolCapability::parse(&value.to_ascii_lowercase()).is_none() {
            return Err(anyhow!(
                "{field} contains unknown capability `{value}` (expected read_only|write|destructive)"
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn must<T>(result: Result<T>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => panic!("test failure: {err}"),
        }
    }

    const SAMPLE: &str = r"
source_control:
  enabled: true
rbac:
  guest_role: '  Visitor '
  users:
    - user: ' artist_a '
      role: Artist
      capabilities: [read_only, ' write ']
    - user: lead
      role: Lead
      capabilities: [read_only, write, destructive]
";

    #[test]
    fn defaults_when_document_is_empty() {
        let config = must(parse_gateway_config_yaml("{}"));
        assert_eq!(config, GatewayConfig::default());
        assert!(!config.source_control.enabled);
        assert_eq!(config.rbac.guest_role, "Guest");
        assert_eq!(config.rbac.guest_capabilities, vec!["read_only".to_string()]);
    }

    #[test]
    fn parses_normalizes_and_resolves_users() {
        let config = must(parse_gateway_config_yaml(SAMPLE));
        assert!(config.source_control.enabled);
        assert_eq!(config.rbac.guest_role, "Visitor");

        let artist = config.resolve_identity("ARTIST_A");
        assert!(artist.matched_whitelist);
        assert_eq!(artist.resolved_role, "Artist");
        assert_eq!(
            artist.allowed_capabilities,
            vec!["read_only".to_string(), "write".to_string()]
        );

        let guest = config.resolve_identity("someone_else");
        assert!(!guest.matched_whitelist);
        assert_eq!(guest.resolved_role, "Visitor");
        assert_eq!(guest.allowed_capabilities, vec!["read_only".to_string()]);
    }

    #[test]
    fn rejects_invalid_documents() {
        let unknown_field = parse_gateway_config_yaml("rbac:\n  admins: []\n");
        assert!(unknown_field
            .err()
            .is_some_and(|err| err.to_string().contains("invalid gateway config YAML structure")));

        let duplicate = parse_gateway_config_yaml(
            "rbac:\n  users:\n    - user: a\n    - user: A\n",
        );
        assert!(duplicate
            .err()
            .is_some_and(|err| err.to_string().contains("duplicate rbac user")));

        let empty_user = parse_gateway_config_yaml("rbac:\n  users:\n    - user: '  '\n");
        assert!(empty_user
            .err()
            .is_some_and(|err| err.to_string().contains("rbac.users[0].user")));

        let bad_capability =
            parse_gateway_config_yaml("rbac:\n  guest_capabilities: [read_only, admin]\n");
        assert!(bad_capability
            .err()
            .is_some_and(|err| err.to_string().contains("unknown capability `admin`")));
    }

    #[test]
    fn load_reports_missing_file() {
        let path = std::env::temp_dir().join(format!("agent-gate-missing-{}.yaml", ulid::Ulid::new()));
        let err = load_gateway_config(&path).err();
        assert!(err.is_some_and(|err| err.to_string().contains("failed to read gateway config")));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!("agent-gate-config-{}.yaml", ulid::Ulid::new()));
        must(fs::write(&path, SAMPLE).map_err(anyhow::Error::from));
        let config = must(load_gateway_config(&path));
        assert_eq!(config.rbac.users.len(), 2);
        let _ = fs::remove_file(&path);
    }
}
