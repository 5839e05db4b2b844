//! Tool catalog and caller profiles.
//!
//! Both tables are loaded once at boot from YAML and are read-only
//! afterwards. A caller unknown to the registry gets the default
//! profile: generic instructions and no tools.

use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::{Error, Result};

/// Instructions used when a caller has none configured.
pub const DEFAULT_INSTRUCTIONS: &str = "You are a helpful assistant.";

/// One parameter of a tool, as written in the catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct ParamSpec {
    /// JSON-schema type name ("string", "integer", "number", ...).
    #[serde(rename = "type", default = "default_param_type")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    /// Closed set of allowed values, if any.
    #[serde(default, rename = "enum")]
    pub allowed: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    pub required: bool,
}

fn default_param_type() -> String {
    "string".to_string()
}

/// One tool the assistant may invoke.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSpec {
    #[serde(default)]
    pub description: String,
    /// Controller route as `domain.service`, e.g. `script.open_door`.
    pub ha_service: String,
    /// Gate this tool behind the caller's PIN.
    #[serde(default)]
    pub requires_pin: bool,
    #[serde(default)]
    pub parameters: BTreeMap<String, ParamSpec>,
}

/// The static tool catalog, keyed by tool name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolCatalog {
    #[serde(default)]
    pub tools: BTreeMap<String, ToolSpec>,
}

impl ToolCatalog {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(format!("tools: {e}")))
    }

    pub fn get(&self, name: &str) -> Option<&ToolSpec> {
        self.tools.get(name)
    }
}

/// Per-caller settings from the callers file.
#[derive(Debug, Clone, Deserialize)]
pub struct CallerProfile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_instructions")]
    pub instructions: String,
    #[serde(default)]
    pub available_tools: Vec<String>,
    /// Numeric authentication code for PIN-gated tools. A caller
    /// without a code cannot invoke gated tools at all.
    #[serde(default)]
    pub pin: Option<i64>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_instructions() -> String {
    DEFAULT_INSTRUCTIONS.to_string()
}

impl Default for CallerProfile {
    fn default() -> Self {
        Self {
            display_name: None,
            language: default_language(),
            instructions: default_instructions(),
            available_tools: Vec::new(),
            pin: None,
        }
    }
}

/// All configured callers, keyed by phone number.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallerRegistry {
    #[serde(default)]
    pub callers: HashMap<String, CallerProfile>,
}

impl CallerRegistry {
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(format!("callers: {e}")))
    }

    /// Resolve a caller id, tolerating a missing or extra leading `+`.
    /// Unknown callers get the default profile.
    pub fn lookup(&self, caller_id: &str) -> CallerProfile {
        if let Some(profile) = self.callers.get(caller_id) {
            return profile.clone();
        }
        let stripped = caller_id.trim_start_matches('+');
        if let Some(profile) = self.callers.get(stripped) {
            return profile.clone();
        }
        let prefixed = format!("+{stripped}");
        if let Some(profile) = self.callers.get(&prefixed) {
            return profile.clone();
        }
        CallerProfile::default()
    }
}

/// Endpoints and credentials the engine needs for every call.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub ai_endpoint: String,
    pub ai_api_key: String,
    pub ai_model: String,
    pub ai_voice: String,
    pub ha_base_url: String,
    pub ha_token: String,
}
