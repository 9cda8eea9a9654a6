use crate::{
    collector::http_client,
    config::{ChatConfig, PagerConfig},
    models::IncidentKey,
};
use reqwest::Client;
use serde_json::{Value, json};
use std::time::Duration;
use teloxide::{
    Bot,
    prelude::{Request, Requester},
    types::ChatId,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const PAGER_CLIENT: &str = "heightwatch";

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram request failed: {0}")]
    Telegram(#[from] teloxide::RequestError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Error,
}

impl AlertLevel {
    fn slack_color(self) -> &'static str {
        match self {
            AlertLevel::Info => "good",
            AlertLevel::Error => "danger",
        }
    }

    fn slack_mention(self) -> &'static str {
        match self {
            AlertLevel::Info => "<!here>",
            AlertLevel::Error => "<!channel>",
        }
    }

    fn tag(self) -> &'static str {
        match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Error => "ERROR",
        }
    }
}

/// Description and structured details attached to a paging event.
#[derive(Debug, Clone, PartialEq)]
pub struct IncidentEvent {
    pub description: String,
    pub details: Value,
}

impl IncidentEvent {
    pub fn new(description: impl Into<String>, details: Value) -> Self {
        Self {
            description: description.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Trigger,
    Resolve,
}

impl EventKind {
    fn as_str(self) -> &'static str {
        match self {
            EventKind::Trigger => "trigger",
            EventKind::Resolve => "resolve",
        }
    }
}

/// A chat channel that receives human-readable alerts.
#[async_trait::async_trait]
pub trait ChatSink: Send + Sync {
    async fn post(&self, level: AlertLevel, lines: &[String]) -> Result<(), AlertError>;
}

/// A paging system that tracks incidents by key.
///
/// Repeated triggers under the same key must be coalesced into one incident.
#[async_trait::async_trait]
pub trait Pager: Send + Sync {
    async fn send_event(
        &self,
        kind: EventKind,
        event: &IncidentEvent,
        incident_key: &IncidentKey,
    ) -> Result<(), AlertError>;
}

/// Everything a check step may report while classifying a run.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    /// Job output only, nothing leaves the process.
    fn log(&self, lines: &[String]) {
        for line in lines {
            info!("{line}");
        }
    }

    async fn info(&self, lines: &[String]) -> Result<(), AlertError>;

    async fn error(&self, lines: &[String]) -> Result<(), AlertError>;

    /// Opens or refreshes an incident. A key is minted when none is given.
    async fn trigger_incident(
        &self,
        event: &IncidentEvent,
        incident_key: Option<&IncidentKey>,
    ) -> Result<IncidentKey, AlertError>;

    async fn resolve_incident(
        &self,
        event: &IncidentEvent,
        incident_key: &IncidentKey,
    ) -> Result<(), AlertError>;
}

/// Posts Slack attachments to an incoming webhook.
#[derive(Debug, Clone)]
pub struct SlackWebhook {
    client: Client,
    webhook_url: String,
}

impl SlackWebhook {
    pub fn new(webhook_url: String, timeout: Duration) -> Result<Self, AlertError> {
        Ok(Self {
            client: http_client(timeout)?,
            webhook_url,
        })
    }
}

pub fn slack_payload(level: AlertLevel, lines: &[String]) -> Value {
    json!({
        "text": level.slack_mention(),
        "attachments": [{
            "color": level.slack_color(),
            "text": lines.join("\n"),
        }]
    })
}

#[async_trait::async_trait]
impl ChatSink for SlackWebhook {
    async fn post(&self, level: AlertLevel, lines: &[String]) -> Result<(), AlertError> {
        self.client
            .post(&self.webhook_url)
            .json(&slack_payload(level, lines))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct TelegramChat {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramChat {
    pub fn new(bot_token: String, chat_id: i64) -> Self {
        Self {
            bot: Bot::new(bot_token),
            chat_id: ChatId(chat_id),
        }
    }
}

pub fn telegram_message(level: AlertLevel, lines: &[String]) -> String {
    format!("[heightwatch][{}]\n{}", level.tag(), lines.join("\n"))
}

#[async_trait::async_trait]
impl ChatSink for TelegramChat {
    async fn post(&self, level: AlertLevel, lines: &[String]) -> Result<(), AlertError> {
        self.bot
            .send_message(self.chat_id, telegram_message(level, lines))
            .send()
            .await?;
        Ok(())
    }
}

/// PagerDuty generic events API (v1) client.
#[derive(Debug, Clone)]
pub struct PagerDuty {
    client: Client,
    url: String,
    service_key: String,
}

impl PagerDuty {
    pub fn new(config: PagerConfig, timeout: Duration) -> Result<Self, AlertError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: config.url,
            service_key: config.service_key,
        })
    }
}

pub fn pagerduty_payload(
    service_key: &str,
    kind: EventKind,
    event: &IncidentEvent,
    incident_key: &IncidentKey,
) -> Value {
    json!({
        "event_type": kind.as_str(),
        "client": PAGER_CLIENT,
        "service_key": service_key,
        "description": event.description,
        "details": event.details,
        "incident_key": incident_key.as_str(),
    })
}

#[async_trait::async_trait]
impl Pager for PagerDuty {
    async fn send_event(
        &self,
        kind: EventKind,
        event: &IncidentEvent,
        incident_key: &IncidentKey,
    ) -> Result<(), AlertError> {
        self.client
            .post(&self.url)
            .json(&pagerduty_payload(&self.service_key, kind, event, incident_key))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// The production [`Notifier`]: job log plus an optional chat channel and pager.
#[derive(Default)]
pub struct Alerter {
    chat: Option<Box<dyn ChatSink>>,
    pager: Option<Box<dyn Pager>>,
}

impl Alerter {
    pub fn new(chat: Option<Box<dyn ChatSink>>, pager: Option<Box<dyn Pager>>) -> Self {
        Self { chat, pager }
    }

    pub fn from_config(
        chat: Option<&ChatConfig>,
        pager: Option<&PagerConfig>,
        timeout: Duration,
    ) -> Result<Self, AlertError> {
        let chat: Option<Box<dyn ChatSink>> = match chat {
            Some(ChatConfig::Slack { webhook_url }) => {
                Some(Box::new(SlackWebhook::new(webhook_url.clone(), timeout)?))
            }
            Some(ChatConfig::Telegram { bot_token, chat_id }) => {
                Some(Box::new(TelegramChat::new(bot_token.clone(), *chat_id)))
            }
            None => None,
        };
        let pager: Option<Box<dyn Pager>> = match pager {
            Some(config) => Some(Box::new(PagerDuty::new(config.clone(), timeout)?)),
            None => None,
        };
        Ok(Self::new(chat, pager))
    }

    async fn post(&self, level: AlertLevel, lines: &[String]) -> Result<(), AlertError> {
        match &self.chat {
            Some(chat) => chat.post(level, lines).await,
            None => {
                debug!("no chat channel configured, alert kept in job output");
                Ok(())
            }
        }
    }

    async fn send_event(
        &self,
        kind: EventKind,
        event: &IncidentEvent,
        incident_key: &IncidentKey,
    ) -> Result<(), AlertError> {
        match &self.pager {
            Some(pager) => pager.send_event(kind, event, incident_key).await,
            None => {
                warn!(%incident_key, event = kind.as_str(), "paging disabled, incident not sent");
                Ok(())
            }
        }
    }
}

#[async_trait::async_trait]
impl Notifier for Alerter {
    async fn info(&self, lines: &[String]) -> Result<(), AlertError> {
        self.log(lines);
        self.post(AlertLevel::Info, lines).await
    }

    async fn error(&self, lines: &[String]) -> Result<(), AlertError> {
        for line in lines {
            error!("{line}");
        }
        self.post(AlertLevel::Error, lines).await
    }

    async fn trigger_incident(
        &self,
        event: &IncidentEvent,
        incident_key: Option<&IncidentKey>,
    ) -> Result<IncidentKey, AlertError> {
        let incident_key = incident_key.cloned().unwrap_or_else(IncidentKey::mint);
        self.send_event(EventKind::Trigger, event, &incident_key).await?;
        Ok(incident_key)
    }

    async fn resolve_incident(
        &self,
        event: &IncidentEvent,
        incident_key: &IncidentKey,
    ) -> Result<(), AlertError> {
        self.send_event(EventKind::Resolve, event, incident_key).await
    }
}

/// Sends an alert, logging delivery failures instead of returning them.
pub async fn report(notifier: &dyn Notifier, level: AlertLevel, lines: &[String]) {
    let delivered = match level {
        AlertLevel::Info => notifier.info(lines).await,
        AlertLevel::Error => notifier.error(lines).await,
    };
    if let Err(error) = delivered {
        warn!(error = %error, "failed to post chat alert");
    }
}
