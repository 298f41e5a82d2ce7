//! Slack Web API client.
//!
//! Only the two read-only calls the watcher needs: `conversations.list` and
//! `conversations.history`. Both inspect the first page only.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

use crate::error::SlackError;

pub const DEFAULT_API_BASE: &str = "https://slack.com/api";

/// A conversation as returned by `conversations.list`.
#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    /// Archived channels are skipped when resolving a name.
    #[serde(default)]
    pub is_archived: bool,
}

/// Profile attached to messages posted by bots and integrations.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotProfile {
    #[serde(default)]
    pub name: Option<String>,
}

/// A message from `conversations.history`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub bot_profile: Option<BotProfile>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub ts: String,
}

impl Message {
    /// True if the user id, the posting username or the bot profile name is `author`.
    pub fn is_from(&self, author: &str) -> bool {
        self.user.as_deref() == Some(author)
            || self.username.as_deref() == Some(author)
            || self
                .bot_profile
                .as_ref()
                .and_then(|p| p.name.as_deref())
                == Some(author)
    }

    /// Message timestamp as RFC 3339, if `ts` parses.
    pub fn posted_at(&self) -> Option<String> {
        let (secs, frac) = self.ts.split_once('.').unwrap_or((self.ts.as_str(), "0"));
        let secs: i64 = secs.parse().ok()?;
        let micros: u32 = format!("{frac:0<6}").get(..6)?.parse().ok()?;
        chrono::DateTime::from_timestamp(secs, micros * 1000).map(|t| t.to_rfc3339())
    }
}

/// Where the watcher reads channels and messages from.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Non-archived channels visible to the token.
    async fn list_channels(&self) -> Result<Vec<Channel>, SlackError>;

    /// Most recent messages in a channel, newest first.
    async fn channel_history(&self, channel_id: &str) -> Result<Vec<Message>, SlackError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(flatten)]
    body: T,
}

#[derive(Deserialize)]
struct ChannelsPage {
    #[serde(default)]
    channels: Vec<Channel>,
}

#[derive(Deserialize)]
struct HistoryPage {
    #[serde(default)]
    messages: Vec<Message>,
}

/// Slack Web API client authenticated with a bot or user token.
pub struct SlackClient {
    token: String,
    api_base: String,
    history_limit: Option<u32>,
    http: reqwest::Client,
}

impl SlackClient {
    pub fn new(token: String) -> Result<Self, SlackError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            token,
            api_base: DEFAULT_API_BASE.to_string(),
            history_limit: None,
            http,
        })
    }

    pub fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self
    }

    pub fn with_history_limit(mut self, limit: Option<u32>) -> Self {
        self.history_limit = limit;
        self
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> Result<T, SlackError> {
        let resp = self
            .http
            .get(format!("{}/{method}", self.api_base))
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SlackError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let envelope = resp.json::<Envelope<T>>().await?;
        parse_envelope(envelope)
    }
}

fn parse_envelope<T>(envelope: Envelope<T>) -> Result<T, SlackError> {
    if !envelope.ok {
        return Err(SlackError::Api(
            envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
        ));
    }
    Ok(envelope.body)
}

#[async_trait]
impl MessageSource for SlackClient {
    async fn list_channels(&self) -> Result<Vec<Channel>, SlackError> {
        let page: ChannelsPage = self
            .call("conversations.list", &[("exclude_archived", "true".to_string())])
            .await?;
        Ok(page.channels)
    }

    async fn channel_history(&self, channel_id: &str) -> Result<Vec<Message>, SlackError> {
        let mut query = vec![("channel", channel_id.to_string())];
        if let Some(limit) = self.history_limit {
            query.push(("limit", limit.to_string()));
        }
        let page: HistoryPage = self.call("conversations.history", &query).await?;
        Ok(page.messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_channel_list() {
        let json = r#"{
            "ok": true,
            "channels": [
                {"id": "C01", "name": "general", "is_archived": false, "is_channel": true},
                {"id": "C02", "name": "public-uds"}
            ],
            "response_metadata": {"next_cursor": "dGVhbTpDMDYx"}
        }"#;
        let env: Envelope<ChannelsPage> = serde_json::from_str(json).unwrap();
        let page = parse_envelope(env).unwrap();
        assert_eq!(page.channels.len(), 2);
        assert_eq!(page.channels[1].id, "C02");
        assert!(!page.channels[1].is_archived);
    }

    #[test]
    fn parses_history_with_bot_messages() {
        let json = r#"{
            "ok": true,
            "messages": [
                {"type": "message", "subtype": "bot_message", "text": "DUBBD v0.5.0 is out",
                 "ts": "1690000000.000200", "username": "uds-new-release",
                 "bot_profile": {"name": "uds-new-release"}},
                {"type": "message", "user": "U123", "text": "hi", "ts": "1689999999.000100"}
            ],
            "has_more": true
        }"#;
        let env: Envelope<HistoryPage> = serde_json::from_str(json).unwrap();
        let page = parse_envelope(env).unwrap();
        assert_eq!(page.messages.len(), 2);
        assert!(page.messages[0].is_from("uds-new-release"));
        assert!(!page.messages[1].is_from("uds-new-release"));
        assert!(page.messages[1].is_from("U123"));
    }

    #[test]
    fn api_error_surfaces_code() {
        let json = r#"{"ok": false, "error": "invalid_auth"}"#;
        let env: Envelope<ChannelsPage> = serde_json::from_str(json).unwrap();
        match parse_envelope(env) {
            Err(SlackError::Api(code)) => assert_eq!(code, "invalid_auth"),
            other => panic!("expected api error, got {:?}", other.map(|p| p.channels.len())),
        }
    }

    #[test]
    fn message_timestamp_to_rfc3339() {
        let msg = Message {
            ts: "1700000000.000100".to_string(),
            ..Default::default()
        };
        assert_eq!(msg.posted_at().unwrap(), "2023-11-14T22:13:20.000100+00:00");
        let bad = Message {
            ts: "nope".to_string(),
            ..Default::default()
        };
        assert!(bad.posted_at().is_none());
    }

    #[test]
    fn api_base_trailing_slash_is_dropped() {
        let client = SlackClient::new("xoxb-test".into())
            .unwrap()
            .with_api_base("http://localhost:9999/api/");
        assert_eq!(client.api_base, "http://localhost:9999/api");
    }
}
