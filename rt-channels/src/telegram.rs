use crate::error::TitleChangeError;
use crate::traits::ChannelAdapter;
use crate::types::{InboundMessage, MessageFormat, OutboundMessage, TitleChange};
use anyhow::Result;
use chrono::Utc;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;

const TELEGRAM_CHANNEL_ID: &str = "telegram";
const TELEGRAM_LONG_POLL_TIMEOUT_SECS: &str = "30";
const TELEGRAM_ALLOWED_UPDATES: &str = r#"["message"]"#;
const TELEGRAM_NON_TRANSIENT_DELAY: Duration = Duration::from_secs(10);
const TELEGRAM_RETRY_BASE_MS: u64 = 250;
const TELEGRAM_RETRY_MAX_MS: u64 = 30_000;

#[derive(Clone)]
pub struct TelegramAdapter {
    http: reqwest::Client,
    bot_token: String,
}

impl TelegramAdapter {
    pub fn new(bot_token: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            http,
            bot_token: bot_token.to_string(),
        })
    }

    fn api_url(&self, method: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "https://api.telegram.org/bot{}/{}",
            self.bot_token, method
        ))?)
    }
}

#[async_trait::async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn channel_id(&self) -> &str {
        TELEGRAM_CHANNEL_ID
    }

    async fn start(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let adapter = self.clone();
        tokio::spawn(async move {
            if let Err(e) = adapter.run_poll_loop(tx).await {
                tracing::error!(%e, "telegram poll loop exited");
            }
        });
        Ok(())
    }

    async fn send(&self, chat_id: &str, message: OutboundMessage) -> Result<()> {
        let url = self.api_url("sendMessage")?;
        let body = send_message_body(chat_id, &message);
        let resp = self.http.post(url).json(&body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await?;
            return Err(anyhow::anyhow!(
                "telegram send failed: status={status} body={text}"
            ));
        }
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn set_title(
        &self,
        chat_id: &str,
        title: &str,
    ) -> std::result::Result<TitleChange, TitleChangeError> {
        let url = self
            .api_url("setChatTitle")
            .map_err(|e| TitleChangeError::Http(e.to_string()))?;
        let body = serde_json::json!({
            "chat_id": chat_id,
            "title": title,
        });
        let resp = self.http.post(url).json(&body).send().await?;
        let status = resp.status();
        let text = resp.text().await?;
        let parsed = serde_json::from_str::<TelegramApiResponse>(&text).unwrap_or_else(|_| {
            TelegramApiResponse {
                ok: status.is_success(),
                description: Some(text.clone()),
            }
        });
        classify_title_response(status, &parsed)
    }

    fn supports_titles(&self) -> bool {
        true
    }

    fn supports_html(&self) -> bool {
        true
    }
}

impl TelegramAdapter {
    #[tracing::instrument(level = "info", skip_all)]
    async fn run_poll_loop(&self, tx: mpsc::Sender<InboundMessage>) -> Result<()> {
        let mut offset: i64 = 0;
        let mut consecutive_failures: u32 = 0;

        loop {
            let url = self.api_url("getUpdates")?;
            let response = match self
                .http
                .get(url)
                .query(&[
                    ("timeout", TELEGRAM_LONG_POLL_TIMEOUT_SECS),
                    ("offset", &offset.to_string()),
                    ("allowed_updates", TELEGRAM_ALLOWED_UPDATES),
                ])
                .send()
                .await
            {
                Ok(response) => response,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %error,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates request failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_else(|error| {
                    format!("<failed to read telegram error body: {error}>")
                });
                if is_transient_status(status) {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %status,
                        %body,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates transient failure; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                } else {
                    consecutive_failures = 0;
                    tracing::error!(
                        %status,
                        %body,
                        ?TELEGRAM_NON_TRANSIENT_DELAY,
                        "telegram getUpdates non-transient failure; keeping poll loop alive"
                    );
                    tokio::time::sleep(TELEGRAM_NON_TRANSIENT_DELAY).await;
                }
                continue;
            }

            let parsed = match response.json::<TelegramGetUpdatesResponse>().await {
                Ok(parsed) => parsed,
                Err(error) => {
                    consecutive_failures += 1;
                    let delay = transient_retry_delay(consecutive_failures);
                    tracing::warn!(
                        %error,
                        attempt = consecutive_failures,
                        ?delay,
                        "telegram getUpdates payload parse failed; retrying with backoff"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            consecutive_failures = 0;

            let mut updates = parsed.result;
            updates.sort_by_key(|update| update.update_id);
            for update in updates {
                // Advance offset before conversion to avoid poison-update replay loops.
                if update.update_id < offset {
                    continue;
                }
                offset = update.update_id.saturating_add(1);

                if let Some(inbound) = build_message_inbound(update.update_id, update.message.as_ref())
                {
                    tx.send(inbound)
                        .await
                        .map_err(|e| anyhow::anyhow!("telegram inbound queue closed: {e}"))?;
                }
            }
        }
    }
}

fn transient_retry_delay(attempt: u32) -> Duration {
    let multiplier = 1_u64 << attempt.saturating_sub(1).min(10);
    Duration::from_millis((TELEGRAM_RETRY_BASE_MS * multiplier).min(TELEGRAM_RETRY_MAX_MS))
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn send_message_body(chat_id: &str, message: &OutboundMessage) -> serde_json::Value {
    let mut body = serde_json::json!({
        "chat_id": chat_id,
        "text": message.content,
    });
    if message.format == MessageFormat::Html {
        body["parse_mode"] = serde_json::Value::from("HTML");
    }
    body
}

/// Maps a `setChatTitle` response onto the title-change outcome.
fn classify_title_response(
    status: StatusCode,
    response: &TelegramApiResponse,
) -> std::result::Result<TitleChange, TitleChangeError> {
    if response.ok {
        return Ok(TitleChange::Applied);
    }
    let description = response
        .description
        .clone()
        .unwrap_or_else(|| "<no description>".to_string());
    let lowered = description.to_ascii_lowercase();
    if lowered.contains("not modified") {
        return Ok(TitleChange::Unchanged);
    }
    if status == StatusCode::FORBIDDEN
        || lowered.contains("not enough rights")
        || lowered.contains("chat_admin_required")
        || lowered.contains("have no rights")
    {
        return Err(TitleChangeError::InsufficientPermission(description));
    }
    Err(TitleChangeError::Api {
        status: status.as_u16(),
        description,
    })
}

fn build_message_inbound(
    update_id: i64,
    message: Option<&TelegramMessage>,
) -> Option<InboundMessage> {
    let message = message?;
    let chat = message.chat.as_ref()?;
    let content = message
        .text
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())?
        .to_string();
    let sender_id = message
        .from
        .as_ref()
        .map(|user| user.id.to_string())
        .unwrap_or_else(|| format!("chat:{}", chat.id));
    let sender_name = message.from.as_ref().and_then(TelegramUser::display_name);
    let message_id = message
        .message_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| format!("update:{update_id}:message"));

    Some(InboundMessage {
        message_id: message_id.into(),
        channel_id: TELEGRAM_CHANNEL_ID.into(),
        chat_id: chat.id.to_string().into(),
        sender_id: sender_id.into(),
        sender_name,
        is_group: chat.r#type != "private",
        content,
        received_at: Utc::now(),
    })
}

#[derive(Debug, Deserialize)]
struct TelegramApiResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramGetUpdatesResponse {
    #[serde(default)]
    result: Vec<TelegramUpdate>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    #[serde(default)]
    message_id: Option<i64>,
    #[serde(default)]
    from: Option<TelegramUser>,
    #[serde(default)]
    chat: Option<TelegramChat>,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUser {
    id: i64,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl TelegramUser {
    fn display_name(&self) -> Option<String> {
        self.first_name
            .as_deref()
            .or(self.username.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(ToOwned::to_owned)
    }
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
    #[serde(rename = "type")]
    r#type: String,
}

#[cfg(test)]
mod tests {
    use super::{
        TelegramApiResponse, TelegramGetUpdatesResponse, TelegramUpdate, build_message_inbound,
        classify_title_response, send_message_body, transient_retry_delay,
    };
    use crate::error::TitleChangeError;
    use crate::types::{OutboundMessage, TitleChange};
    use reqwest::StatusCode;

    fn api_error(description: &str) -> TelegramApiResponse {
        TelegramApiResponse {
            ok: false,
            description: Some(description.to_string()),
        }
    }

    #[test]
    fn retry_delay_grows_exponentially_and_caps() {
        assert_eq!(transient_retry_delay(1).as_millis(), 250);
        assert_eq!(transient_retry_delay(2).as_millis(), 500);
        assert_eq!(transient_retry_delay(3).as_millis(), 1000);
        assert_eq!(transient_retry_delay(20).as_millis(), 30000);
    }

    #[test]
    fn title_response_classification() {
        let ok = TelegramApiResponse {
            ok: true,
            description: None,
        };
        assert_eq!(
            classify_title_response(StatusCode::OK, &ok).expect("ok"),
            TitleChange::Applied
        );
        assert_eq!(
            classify_title_response(
                StatusCode::BAD_REQUEST,
                &api_error("Bad Request: chat title is not modified")
            )
            .expect("unchanged"),
            TitleChange::Unchanged
        );
        assert!(matches!(
            classify_title_response(
                StatusCode::BAD_REQUEST,
                &api_error("Bad Request: not enough rights to change chat title")
            ),
            Err(TitleChangeError::InsufficientPermission(_))
        ));
        assert!(matches!(
            classify_title_response(
                StatusCode::FORBIDDEN,
                &api_error("Forbidden: bot was kicked from the supergroup chat")
            ),
            Err(TitleChangeError::InsufficientPermission(_))
        ));
        assert!(matches!(
            classify_title_response(
                StatusCode::BAD_REQUEST,
                &api_error("Bad Request: chat not found")
            ),
            Err(TitleChangeError::Api { status: 400, .. })
        ));
    }

    #[test]
    fn inbound_builder_extracts_text_and_sender_name() {
        let parsed: TelegramGetUpdatesResponse = serde_json::from_value(serde_json::json!({
            "ok": true,
            "result": [{
                "update_id": 100,
                "message": {
                    "message_id": 7,
                    "from": { "id": 42, "first_name": "Ada", "username": "ada" },
                    "chat": { "id": -1001384391544_i64, "type": "supergroup" },
                    "text": "  programming and cats  "
                }
            }]
        }))
        .expect("parse updates");
        let update: &TelegramUpdate = &parsed.result[0];
        let inbound = build_message_inbound(update.update_id, update.message.as_ref())
            .expect("text message");
        assert_eq!(inbound.content, "programming and cats");
        assert_eq!(inbound.chat_id.as_str(), "-1001384391544");
        assert_eq!(inbound.sender_id.as_str(), "42");
        assert_eq!(inbound.sender_name.as_deref(), Some("Ada"));
        assert_eq!(inbound.message_id.as_str(), "7");
        assert!(inbound.is_group);
    }

    #[test]
    fn inbound_builder_skips_non_text_and_handles_partial_payloads() {
        let parsed: TelegramGetUpdatesResponse = serde_json::from_value(serde_json::json!({
            "result": [
                { "update_id": 1, "message": { "chat": { "id": 5, "type": "group" }, "photo": [] } },
                { "update_id": 2, "message": { "chat": { "id": 5, "type": "group" }, "text": "hi" } },
                { "update_id": 3 }
            ]
        }))
        .expect("parse updates");
        let built: Vec<_> = parsed
            .result
            .iter()
            .filter_map(|u| build_message_inbound(u.update_id, u.message.as_ref()))
            .collect();
        assert_eq!(built.len(), 1);
        assert_eq!(built[0].sender_id.as_str(), "chat:5");
        assert_eq!(built[0].message_id.as_str(), "update:2:message");
        assert_eq!(built[0].sender_name, None);
    }

    #[test]
    fn send_body_sets_parse_mode_for_html_only() {
        let body = send_message_body("-100", &OutboundMessage::html("<b>hi</b>"));
        assert_eq!(body["chat_id"], "-100");
        assert_eq!(body["text"], "<b>hi</b>");
        assert_eq!(body["parse_mode"], "HTML");

        let body = send_message_body("-100", &OutboundMessage::plain("hi"));
        assert!(body.get("parse_mode").is_none());
        assert!(body.get("reply_parameters").is_none());
    }
}
