use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::OperatingMode;

pub const DEFAULT_PREFIX: &str = ".";
pub const DEFAULT_BRIDGE_URL: &str = "ws://127.0.0.1:8765";
pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONVERSATION_TTL_SECS: u64 = 600; // 10 minutes
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300; // 5 minutes
pub const DEFAULT_RECONNECT_BASE_MS: u64 = 3_000;
pub const DEFAULT_RECONNECT_MAX_MS: u64 = 120_000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_INBOUND_BUFFER: usize = 256;

/// Top-level config (tether.toml + TETHER_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TetherConfig {
    pub bot: BotConfig,
    pub status: StatusConfig,
    pub session: SessionConfig,
    pub reconnect: ReconnectConfig,
    pub conversation: ConversationConfig,
    pub gateway: GatewayConfig,
    pub bridge: BridgeConfig,
}

/// Command surface and ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Prefix that marks a message body as a command (e.g. `"."`, `"!"`).
    pub prefix: String,
    /// Owner phone numbers (JID user part, no `+`).
    pub owners: Vec<String>,
    pub mode: OperatingMode,
    /// Text returned by the built-in `alive` command.
    pub alive_message: Option<String>,
    /// Message owners on every successful connection.
    pub startup_notify: bool,
}

impl BotConfig {
    /// Owner numbers without the leading `+`, blanks dropped.
    pub fn owner_numbers(&self) -> Vec<String> {
        self.owners
            .iter()
            .map(|o| o.trim().trim_start_matches('+').to_string())
            .filter(|o| !o.is_empty())
            .collect()
    }
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            owners: Vec::new(),
            mode: OperatingMode::default(),
            alive_message: None,
            startup_notify: false,
        }
    }
}

/// Behaviour for the status broadcast channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub auto_seen: bool,
    pub auto_react: bool,
    /// Emoji set the auto-react picks from uniformly at random.
    pub react_emojis: Vec<String>,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            auto_seen: false,
            auto_react: false,
            react_emojis: vec!["\u{2764}\u{fe0f}".to_string()], // ❤️
        }
    }
}

/// Credential storage and remote bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Directory holding `creds.json`.
    pub dir: String,
    /// Remote credential reference: full URL or an id appended to `remote_base_url`.
    pub remote_ref: Option<String>,
    pub remote_base_url: Option<String>,
    pub download_timeout_secs: u64,
    /// Top-level keys a credential blob must carry to be accepted.
    pub required_keys: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dir: default_session_dir(),
            remote_ref: None,
            remote_base_url: None,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT_SECS,
            required_keys: vec!["noiseKey".to_string(), "signedIdentityKey".to_string()],
        }
    }
}

/// Reconnect backoff policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub base_ms: u64,
    pub max_ms: u64,
    /// Extra random delay as a fraction of the computed delay (0.0 disables).
    pub jitter: f64,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Upper bound on a single connect attempt, handshake included.
    pub connect_timeout_secs: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_ms: DEFAULT_RECONNECT_BASE_MS,
            max_ms: DEFAULT_RECONNECT_MAX_MS,
            jitter: 0.0,
            max_attempts: None,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }
}

/// Expiry of per-sender reply-handler state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    pub ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_CONVERSATION_TTL_SECS,
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upper bound for every outbound call into the messaging client.
    pub send_timeout_secs: u64,
    /// Capacity of the inbound message queue between connection and router.
    pub inbound_buffer: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            send_timeout_secs: DEFAULT_SEND_TIMEOUT_SECS,
            inbound_buffer: DEFAULT_INBOUND_BUFFER,
        }
    }
}

/// WebSocket bridge to the protocol sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub url: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BRIDGE_URL.to_string(),
        }
    }
}

fn default_session_dir() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tether/session", home)
}

impl TetherConfig {
    /// Load config from a TOML file with TETHER_* env var overrides.
    ///
    /// Nested keys use a double underscore: `TETHER_BOT__PREFIX=!`.
    /// A missing file is not an error; every section has defaults.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: TetherConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("TETHER_").split("__"))
            .extract()
            .map_err(|e| crate::error::TetherError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot work with.
    pub fn validate(&self) -> crate::error::Result<()> {
        use crate::error::TetherError;

        if self.bot.prefix.is_empty() {
            return Err(TetherError::Config("bot.prefix must not be empty".into()));
        }
        if self.reconnect.base_ms > self.reconnect.max_ms {
            return Err(TetherError::Config(
                "reconnect.base_ms must not exceed reconnect.max_ms".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.reconnect.jitter) {
            return Err(TetherError::Config(
                "reconnect.jitter must be within 0.0..=1.0".into(),
            ));
        }
        if self.reconnect.connect_timeout_secs == 0 {
            return Err(TetherError::Config(
                "reconnect.connect_timeout_secs must be at least 1".into(),
            ));
        }
        if self.gateway.inbound_buffer == 0 {
            return Err(TetherError::Config(
                "gateway.inbound_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.tether/tether.toml", home)
}
