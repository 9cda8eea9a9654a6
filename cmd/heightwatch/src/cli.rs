use std::{path::PathBuf, time::Duration};

use clap::{Parser as ClapParser, ValueEnum};
use heightwatch_monitor::config::{
    ChatConfig, ConfigError, DEFAULT_FOLLOWER_ADDRESS, DEFAULT_PAGERDUTY_URL,
    DEFAULT_RESULTS_PATH, HeightTransport, MonitorConfig, PagerConfig,
};
use tracing::{Level, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    Cli,
    Rpc,
}

#[derive(ClapParser, Debug, Clone)]
#[command(
    name = "heightwatch",
    version,
    about = "Checks that leader, follower and explorer heights keep advancing"
)]
pub struct Options {
    #[arg(
        long = "results.path",
        value_name = "FILE",
        default_value = DEFAULT_RESULTS_PATH,
        help = "File holding the results of the previous run.",
        help_heading = "Check options",
        env = "HEIGHTWATCH_RESULTS_PATH"
    )]
    pub results_path: PathBuf,
    #[arg(
        long = "check.min-interval",
        value_name = "SECONDS",
        default_value_t = 600,
        help = "Minimum time between two compared runs.",
        long_help = "End-of-block interval of the network plus a margin. Runs closer together than this keep the previous results untouched.",
        help_heading = "Check options",
        env = "HEIGHTWATCH_MIN_INTERVAL"
    )]
    pub min_interval_secs: u64,
    #[arg(
        long = "request.timeout",
        value_name = "SECONDS",
        default_value_t = 10,
        help = "Timeout applied to every outbound call.",
        help_heading = "Check options",
        env = "HEIGHTWATCH_REQUEST_TIMEOUT"
    )]
    pub request_timeout_secs: u64,
    #[arg(
        long = "heights.transport",
        value_enum,
        default_value_t = TransportKind::Cli,
        help = "How heights are read from the follower.",
        help_heading = "Follower options",
        env = "HEIGHTWATCH_HEIGHTS_TRANSPORT"
    )]
    pub transport: TransportKind,
    #[arg(
        long = "follower.address",
        value_name = "HOST:PORT",
        default_value = DEFAULT_FOLLOWER_ADDRESS,
        help_heading = "Follower options",
        env = "HEIGHTWATCH_FOLLOWER_ADDRESS"
    )]
    pub follower_address: String,
    #[arg(
        long = "follower.cli",
        value_name = "PATH",
        default_value = "factom-cli",
        help = "factom-cli binary used by the cli transport.",
        help_heading = "Follower options",
        env = "HEIGHTWATCH_FACTOM_CLI"
    )]
    pub factom_cli: PathBuf,
    #[arg(
        long = "follower.rpc-url",
        value_name = "URL",
        help = "JSON-RPC endpoint used by the rpc transport.",
        long_help = "Defaults to http://<follower.address>/v2.",
        help_heading = "Follower options",
        env = "HEIGHTWATCH_FOLLOWER_RPC_URL"
    )]
    pub follower_rpc_url: Option<String>,
    #[arg(
        long = "explorer.url",
        value_name = "URL",
        help = "Explorer height endpoint. The explorer check only runs when set.",
        help_heading = "Explorer options",
        env = "HEIGHTWATCH_EXPLORER_URL"
    )]
    pub explorer_url: Option<String>,
    #[arg(
        long = "slack.webhook",
        value_name = "URL",
        help_heading = "Alerting options",
        env = "HEIGHTWATCH_SLACK_WEBHOOK"
    )]
    pub slack_webhook: Option<String>,
    #[arg(
        long = "telegram.bot-token",
        value_name = "TOKEN",
        help = "Used for chat alerts when no Slack webhook is set.",
        help_heading = "Alerting options",
        env = "HEIGHTWATCH_TELEGRAM_BOT_TOKEN"
    )]
    pub telegram_bot_token: Option<String>,
    #[arg(
        long = "telegram.chat-id",
        value_name = "CHAT_ID",
        allow_negative_numbers = true,
        help_heading = "Alerting options",
        env = "HEIGHTWATCH_TELEGRAM_CHAT_ID"
    )]
    pub telegram_chat_id: Option<i64>,
    #[arg(
        long = "pagerduty.url",
        value_name = "URL",
        default_value = DEFAULT_PAGERDUTY_URL,
        help_heading = "Alerting options",
        env = "HEIGHTWATCH_PAGERDUTY_URL"
    )]
    pub pagerduty_url: String,
    #[arg(
        long = "pagerduty.service-key",
        value_name = "KEY",
        help = "Paging is disabled when no service key is set.",
        help_heading = "Alerting options",
        env = "HEIGHTWATCH_PAGERDUTY_KEY"
    )]
    pub pagerduty_service_key: Option<String>,
    #[arg(
        long = "log.level",
        default_value_t = Level::INFO,
        value_name = "LOG_LEVEL",
        help = "The verbosity level used for logs.",
        long_help = "Possible values: info, debug, trace, warn, error",
        help_heading = "Logging options",
        env = "HEIGHTWATCH_LOG_LEVEL"
    )]
    pub log_level: Level,
}

impl Options {
    pub fn to_config(&self) -> Result<MonitorConfig, ConfigError> {
        let heights = match self.transport {
            TransportKind::Cli => HeightTransport::Cli {
                binary: self.factom_cli.clone(),
                address: self.follower_address.clone(),
            },
            TransportKind::Rpc => HeightTransport::Rpc {
                url: self
                    .follower_rpc_url
                    .clone()
                    .unwrap_or_else(|| format!("http://{}/v2", self.follower_address)),
            },
        };

        let chat = match (
            &self.slack_webhook,
            &self.telegram_bot_token,
            self.telegram_chat_id,
        ) {
            (Some(webhook_url), _, _) => Some(ChatConfig::Slack {
                webhook_url: webhook_url.clone(),
            }),
            (None, Some(bot_token), Some(chat_id)) => Some(ChatConfig::Telegram {
                bot_token: bot_token.clone(),
                chat_id,
            }),
            (None, Some(_), None) => return Err(ConfigError::Missing("telegram chat id")),
            (None, None, _) => {
                warn!("no chat channel configured, alerts only go to the job output");
                None
            }
        };

        let pager = match &self.pagerduty_service_key {
            Some(service_key) => Some(PagerConfig {
                url: self.pagerduty_url.clone(),
                service_key: service_key.clone(),
            }),
            None => {
                warn!("no PagerDuty service key configured, incidents will not be paged");
                None
            }
        };

        let config = MonitorConfig {
            results_path: self.results_path.clone(),
            min_interval: Duration::from_secs(self.min_interval_secs),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            heights,
            explorer_url: self.explorer_url.clone(),
            chat,
            pager,
        };
        config.validate()?;
        Ok(config)
    }
}
