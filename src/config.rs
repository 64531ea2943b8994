use std::path::{Path, PathBuf};

use anyhow::Context;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::ExitError;

/// Config file name constants.
pub const CONFIG_TOML: &str = "concierge.toml";
pub const CONFIG_JSON: &str = "concierge.json";

/// Used when the configured trigger word is missing or blank.
pub const DEFAULT_TRIGGER_WORD: &str = "MINGAU";

/// Environment fallback for `llm.api_key`.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Find the config file in `dir`, preferring TOML over JSON.
pub fn find_config(dir: &Path) -> Option<PathBuf> {
    let toml_path = dir.join(CONFIG_TOML);
    if toml_path.exists() {
        return Some(toml_path);
    }
    let json_path = dir.join(CONFIG_JSON);
    if json_path.exists() {
        return Some(json_path);
    }
    None
}

/// Look in `dir` first, then the per-user config directory (`~/.config/concierge`).
pub fn discover_config(dir: &Path) -> Option<PathBuf> {
    find_config(dir).or_else(|| dirs::config_dir().and_then(|d| find_config(&d.join("concierge"))))
}

/// Top-level concierge.toml config.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    #[serde(default)]
    pub responder: ResponderConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub staff: StaffConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// What the bot says and when it hands a contact over.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResponderConfig {
    /// Magic word (case-insensitive, matched anywhere in a message) that hands the contact to staff.
    #[serde(default = "default_trigger_word")]
    pub trigger_word: String,
    /// Instructions placed before the conversation transcript in every prompt.
    #[serde(default)]
    pub prompt_preamble: Option<String>,
    /// Sent once when the trigger word is seen.
    #[serde(default = "default_handoff_message")]
    pub handoff_message: String,
    /// Sent when the language model call fails.
    #[serde(default = "default_fallback_reply")]
    pub fallback_reply: String,
    /// Sent when the language model answers with nothing.
    #[serde(default = "default_empty_reply")]
    pub empty_reply: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            trigger_word: default_trigger_word(),
            prompt_preamble: None,
            handoff_message: default_handoff_message(),
            fallback_reply: default_fallback_reply(),
            empty_reply: default_empty_reply(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct LlmConfig {
    /// Gemini API key. Falls back to the GEMINI_API_KEY environment variable.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_30")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_model(),
            base_url: default_base_url(),
            timeout_secs: default_timeout_30(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StaffConfig {
    /// Group chat id that receives staff notices. Notices are skipped when unset.
    #[serde(default)]
    pub group: Option<String>,
    /// Post "started" / "stopped" notices.
    #[serde(default = "default_true")]
    pub announce_lifecycle: bool,
    /// New-contact notice variations; one is picked at random. `{{ phone }}` is substituted.
    #[serde(default = "default_new_contact_templates")]
    pub new_contact_templates: Vec<String>,
}

impl Default for StaffConfig {
    fn default() -> Self {
        Self {
            group: None,
            announce_lifecycle: true,
            new_contact_templates: default_new_contact_templates(),
        }
    }
}

/// Reply pacing. All durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct TimingConfig {
    /// "online" hold before and after typing.
    pub online_ms: u64,
    /// Online hold after the reply is sent, before going unavailable.
    pub cooldown_ms: u64,
    /// Silent wait before anything is shown on a contact's first reply.
    pub first_contact_delay_ms: u64,
    /// Typing time on a contact's first reply.
    pub first_contact_typing_ms: u64,
    pub short_max_chars: usize,
    pub medium_max_chars: usize,
    pub short_base_ms: u64,
    pub short_jitter_ms: u64,
    pub medium_base_ms: u64,
    pub medium_jitter_ms: u64,
    pub long_base_ms: u64,
    pub long_jitter_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            online_ms: 5000,
            cooldown_ms: 5000,
            first_contact_delay_ms: 15000,
            first_contact_typing_ms: 5000,
            short_max_chars: 80,
            medium_max_chars: 250,
            short_base_ms: 1500,
            short_jitter_ms: 500,
            medium_base_ms: 3500,
            medium_jitter_ms: 1000,
            long_base_ms: 5000,
            long_jitter_ms: 2000,
        }
    }
}

/// The process that owns the messaging connection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct BridgeConfig {
    #[serde(default = "default_bridge_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Chat ids ending with this are private chats; everything else is ignored.
    #[serde(default = "default_private_suffix")]
    pub private_suffix: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            command: default_bridge_command(),
            args: Vec::new(),
            private_suffix: default_private_suffix(),
        }
    }
}

/// Reconnect policy for the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct SupervisorConfig {
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Consecutive failed connections before giving up. 0 retries forever.
    pub max_attempts: u32,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            backoff_base_ms: 1000,
            backoff_max_ms: 60_000,
            max_attempts: 0,
        }
    }
}

fn default_trigger_word() -> String { DEFAULT_TRIGGER_WORD.into() }
fn default_handoff_message() -> String { "Please hold on, one of our specialists will be with you shortly...".into() }
fn default_fallback_reply() -> String { "Sorry, I couldn't reach our assistant just now.".into() }
fn default_empty_reply() -> String { "Sorry, I couldn't answer right now.".into() }
fn default_model() -> String { "gemini-2.0-flash".into() }
fn default_base_url() -> String { "https://generativelanguage.googleapis.com/v1beta".into() }
fn default_timeout_30() -> u64 { 30 }
fn default_true() -> bool { true }
fn default_bridge_command() -> String { "concierge-bridge".into() }
fn default_private_suffix() -> String { "@s.whatsapp.net".into() }

fn default_new_contact_templates() -> Vec<String> {
    vec![
        "You have a new message from {{ phone }}. Please take a look.".into(),
        "Message received from {{ phone }}, please check.".into(),
        "A new message just arrived: {{ phone }}. Take a look.".into(),
        "{{ phone }} sent a message. Kindly check it.".into(),
        "There is a new message from number {{ phone }}. Please review.".into(),
        "New notification: message from {{ phone }}. Take a look.".into(),
        "New message detected from {{ phone }}, check it out.".into(),
        "You received a new message from {{ phone }}. Please review.".into(),
        "Heads up: new message from {{ phone }}. Check it now.".into(),
        "{{ phone }} just sent a new message. Please check.".into(),
    ]
}

/// The flat `config.json` layout of earlier deployments.
#[derive(Debug, Deserialize)]
struct LegacyConfig {
    #[serde(default)]
    trigger_word: Option<String>,
    #[serde(default)]
    gemini_prompt: Option<String>,
    #[serde(default)]
    gemini_api_key: Option<String>,
}

impl From<LegacyConfig> for Config {
    fn from(legacy: LegacyConfig) -> Self {
        let mut config = Self::default();
        if let Some(word) = legacy.trigger_word {
            config.responder.trigger_word = word;
        }
        config.responder.prompt_preamble = legacy.gemini_prompt.filter(|p| !p.is_empty());
        config.llm.api_key = legacy.gemini_api_key.filter(|k| !k.is_empty());
        config
    }
}

const LEGACY_KEYS: &[&str] = &["trigger_word", "gemini_prompt", "gemini_api_key"];

impl Config {
    /// Load config from a file (TOML or JSON, auto-detected by extension).
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            "toml" => Self::parse_toml(&contents),
            "json" => Self::parse_json(&contents),
            _ => Self::parse_toml(&contents).or_else(|_| Self::parse_json(&contents)),
        }
    }

    /// Parse config from a TOML string.
    pub fn parse_toml(toml_str: &str) -> anyhow::Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_TOML}: {e}")).into())
    }

    /// Parse config from JSON. Accepts both the sectioned layout and the flat
    /// legacy keys (`trigger_word`, `gemini_prompt`, `gemini_api_key`).
    pub fn parse_json(json: &str) -> anyhow::Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| ExitError::Config(format!("invalid {CONFIG_JSON}: {e}")))?;
        let is_legacy = value
            .as_object()
            .is_some_and(|obj| LEGACY_KEYS.iter().any(|k| obj.contains_key(*k)));
        let parsed = if is_legacy {
            serde_json::from_value::<LegacyConfig>(value).map(Self::from)
        } else {
            serde_json::from_value(value)
        };
        parsed.map_err(|e| ExitError::Config(format!("invalid {CONFIG_JSON}: {e}")).into())
    }

    /// Serialize config to a TOML string with helpful comments.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        let raw = toml::to_string_pretty(self).context("serializing config to TOML")?;

        let mut doc: toml_edit::DocumentMut = raw
            .parse()
            .context("parsing generated TOML for comment injection")?;

        doc.decor_mut()
            .set_prefix("# concierge configuration\n# Run `concierge schema` for every key and its type.\n\n");

        fn set_table_comment(doc: &mut toml_edit::DocumentMut, key: &str, comment: &str) {
            if let Some(tbl) = doc.get_mut(key).and_then(|item| item.as_table_mut()) {
                tbl.decor_mut().set_prefix(comment);
            }
        }

        set_table_comment(&mut doc, "responder", "# What the bot says and when it hands a contact to staff\n");
        set_table_comment(&mut doc, "llm", "\n# Language model (Gemini generateContent)\n");
        set_table_comment(&mut doc, "staff", "\n# Staff group notices\n");
        set_table_comment(&mut doc, "timing", "\n# Reply pacing, milliseconds\n");
        set_table_comment(&mut doc, "bridge", "\n# Messaging bridge process (JSON lines over stdio)\n");
        set_table_comment(&mut doc, "supervisor", "\n# Bridge reconnect backoff\n");

        Ok(doc.to_string())
    }

    /// The trigger word, never blank.
    pub fn trigger_word(&self) -> &str {
        let word = self.responder.trigger_word.trim();
        if word.is_empty() { DEFAULT_TRIGGER_WORD } else { word }
    }

    /// API key from the file, else from `GEMINI_API_KEY`.
    pub fn api_key(&self) -> Option<String> {
        self.llm
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()))
    }
}

/// Config that is re-read at the start of every message cycle.
///
/// A failed reload keeps the last good config and logs a warning.
#[derive(Debug)]
pub struct ConfigSource {
    path: Option<PathBuf>,
    current: Config,
}

impl ConfigSource {
    /// Load `path` (or defaults when `None`). The first load must succeed.
    pub fn open(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let current = match &path {
            Some(p) => Config::load(p)?,
            None => Config::default(),
        };
        Ok(Self { path, current })
    }

    pub const fn fixed(config: Config) -> Self {
        Self { path: None, current: config }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub const fn current(&self) -> &Config {
        &self.current
    }

    /// Re-read the file and return the config for this cycle.
    pub fn reload(&mut self) -> &Config {
        if let Some(path) = &self.path {
            match Config::load(path) {
                Ok(fresh) => self.current = fresh,
                Err(e) => tracing::warn!("keeping previous config, reload failed: {e:#}"),
            }
        }
        &self.current
    }
}
