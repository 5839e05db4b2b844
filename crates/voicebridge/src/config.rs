//! Configuration loading: environment variables plus YAML tables.
//!
//! Standalone deployments read a `.env` file; containerized ones get
//! the same variables injected. Caller profiles and the tool catalog
//! live in YAML files. Missing YAML files mean empty tables; files
//! that exist but do not parse abort startup.

use anyhow::{bail, Context};
use std::net::IpAddr;
use std::path::Path;

use voicebridge_call_engine::{CallerRegistry, EngineConfig, ToolCatalog};

const DEFAULT_AI_ENDPOINT: &str = "wss://api.openai.com/v1/realtime";
const DEFAULT_AI_MODEL: &str = "gpt-realtime";
const DEFAULT_AI_VOICE: &str = "coral";
const DEFAULT_HA_URL: &str = "http://localhost:8123/api";

#[derive(Debug, Clone)]
pub struct SipSettings {
    pub server: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub bind_ip: Option<IpAddr>,
    pub bind_port: Option<u16>,
}

pub struct AppConfig {
    pub sip: SipSettings,
    pub engine: EngineConfig,
    pub callers: CallerRegistry,
    pub tools: ToolCatalog,
    pub log_level: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        // Standalone mode keeps credentials in .env next to the
        // binary; absence is fine.
        let _ = dotenvy::dotenv();

        let server = env_var("SIP_SERVER").unwrap_or_else(|| "192.168.178.1".to_string());
        let Some(username) = env_var("SIP_USERNAME") else {
            bail!("SIP_USERNAME is not set");
        };
        let Some(password) = env_var("SIP_PASSWORD") else {
            bail!("SIP_PASSWORD is not set");
        };

        let sip = SipSettings {
            server,
            port: parse_env("SIP_PORT")?.unwrap_or(5060),
            username,
            password,
            display_name: env_var("SIP_DISPLAY_NAME")
                .unwrap_or_else(|| "Voice Assistant".to_string()),
            bind_ip: parse_env("SIP_BIND_IP")?,
            bind_port: parse_env("SIP_BIND_PORT")?,
        };

        let Some(ai_api_key) = env_var("OPENAI_API_KEY") else {
            bail!("OPENAI_API_KEY is not set");
        };
        // Supervisor-managed deployments inject their own token.
        let ha_token = env_var("HOMEASSISTANT_TOKEN")
            .or_else(|| env_var("SUPERVISOR_TOKEN"))
            .unwrap_or_default();

        let engine = EngineConfig {
            ai_endpoint: env_var("OPENAI_REALTIME_URL")
                .unwrap_or_else(|| DEFAULT_AI_ENDPOINT.to_string()),
            ai_api_key,
            ai_model: env_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_AI_MODEL.to_string()),
            ai_voice: env_var("OPENAI_VOICE").unwrap_or_else(|| DEFAULT_AI_VOICE.to_string()),
            ha_base_url: env_var("HOMEASSISTANT_URL").unwrap_or_else(|| DEFAULT_HA_URL.to_string()),
            ha_token,
        };

        let caller_path =
            env_var("CALLER_CONFIG_PATH").unwrap_or_else(|| "config/callers.yaml".to_string());
        let tools_path =
            env_var("TOOLS_CONFIG_PATH").unwrap_or_else(|| "config/tools.yaml".to_string());

        let callers = match read_optional(&caller_path)? {
            Some(text) => CallerRegistry::from_yaml(&text)
                .with_context(|| format!("parsing {caller_path}"))?,
            None => CallerRegistry::default(),
        };
        let tools = match read_optional(&tools_path)? {
            Some(text) => {
                ToolCatalog::from_yaml(&text).with_context(|| format!("parsing {tools_path}"))?
            }
            None => ToolCatalog::default(),
        };

        Ok(Self {
            sip,
            engine,
            callers,
            tools,
            log_level: env_var("LOG_LEVEL"),
        })
    }

    /// Redacted one-screen summary for `--dry-run`.
    pub fn summary(&self) -> String {
        format!(
            "SIP:\n  server: {}:{}\n  username: {}\n  password: {}\n\
             AI:\n  endpoint: {}\n  model: {}\n  voice: {}\n  api key: {}\n\
             Controller:\n  url: {}\n  token: {}\n\
             Tables:\n  callers: {}\n  tools: {}",
            self.sip.server,
            self.sip.port,
            self.sip.username,
            set_or_not(!self.sip.password.is_empty()),
            self.engine.ai_endpoint,
            self.engine.ai_model,
            self.engine.ai_voice,
            set_or_not(!self.engine.ai_api_key.is_empty()),
            self.engine.ha_base_url,
            set_or_not(!self.engine.ha_token.is_empty()),
            self.callers.callers.len(),
            self.tools.tools.len(),
        )
    }
}

fn set_or_not(set: bool) -> &'static str {
    if set {
        "SET"
    } else {
        "NOT SET"
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> anyhow::Result<Option<T>> {
    match env_var(name) {
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| anyhow::anyhow!("{name} has an invalid value: {raw}")),
        None => Ok(None),
    }
}

fn read_optional(path: &str) -> anyhow::Result<Option<String>> {
    if !Path::new(path).exists() {
        tracing::warn!(path, "configuration file not found, using empty table");
        return Ok(None);
    }
    std::fs::read_to_string(path)
        .map(Some)
        .with_context(|| format!("reading {path}"))
}
