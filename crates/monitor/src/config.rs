use std::{path::PathBuf, time::Duration};
use thiserror::Error;

/// Expected end-of-block interval of the network plus the default margin.
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_RESULTS_PATH: &str = "monitoring_results.json";
pub const DEFAULT_FOLLOWER_ADDRESS: &str = "localhost:8088";
pub const DEFAULT_PAGERDUTY_URL: &str =
    "https://events.pagerduty.com/generic/2010-04-15/create_event.json";

/// How follower and leader heights are obtained from the follower node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeightTransport {
    /// Run `factom-cli -s <address> get heights`.
    Cli { binary: PathBuf, address: String },
    /// POST a `heights` JSON-RPC request to the node's v2 API.
    Rpc { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatConfig {
    Slack { webhook_url: String },
    Telegram { bot_token: String, chat_id: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagerConfig {
    pub url: String,
    pub service_key: String,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub results_path: PathBuf,
    pub min_interval: Duration,
    pub request_timeout: Duration,
    pub heights: HeightTransport,
    /// The explorer step only runs when an explorer is configured.
    pub explorer_url: Option<String>,
    pub chat: Option<ChatConfig>,
    pub pager: Option<PagerConfig>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("minimum interval must be greater than zero")]
    ZeroInterval,
    #[error("request timeout must be greater than zero")]
    ZeroTimeout,
    #[error("missing value for {0}")]
    Missing(&'static str),
    #[error("invalid url in {name}: {value}")]
    InvalidUrl { name: &'static str, value: String },
}

impl MonitorConfig {
    pub fn new(heights: HeightTransport) -> Self {
        Self {
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            min_interval: DEFAULT_MIN_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            heights,
            explorer_url: None,
            chat: None,
            pager: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_interval.is_zero() {
            return Err(ConfigError::ZeroInterval);
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }

        match &self.heights {
            HeightTransport::Cli { address, .. } if address.trim().is_empty() => {
                return Err(ConfigError::Missing("follower address"));
            }
            HeightTransport::Rpc { url } => check_url("follower rpc url", url)?,
            HeightTransport::Cli { .. } => {}
        }

        if let Some(url) = &self.explorer_url {
            check_url("explorer url", url)?;
        }

        match &self.chat {
            Some(ChatConfig::Slack { webhook_url }) => check_url("slack webhook", webhook_url)?,
            Some(ChatConfig::Telegram { bot_token, .. }) if bot_token.is_empty() => {
                return Err(ConfigError::Missing("telegram bot token"));
            }
            _ => {}
        }

        if let Some(pager) = &self.pager {
            check_url("pagerduty url", &pager.url)?;
            if pager.service_key.is_empty() {
                return Err(ConfigError::Missing("pagerduty service key"));
            }
        }

        Ok(())
    }
}

fn check_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            name,
            value: value.to_owned(),
        })
    }
}
