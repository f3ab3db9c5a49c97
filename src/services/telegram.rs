// src/services/telegram.rs

//! Telegram Bot API client.
//!
//! Implements both sides of the channel: [`Notifier`] via `sendMessage` and
//! [`UpdateSource`] via long-polling `getUpdates`.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::error::{AppError, Result};
use crate::models::{TelegramConfig, Update};
use crate::services::{Notifier, UpdateSource};
use crate::utils::http::client_with_timeout;

/// Timeout for ordinary (non long-poll) calls.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Extra time granted to a long poll beyond the server-side wait.
const POLL_SLACK: Duration = Duration::from_secs(10);

pub struct TelegramClient {
    client: Client,
    base_url: String,
}

impl TelegramClient {
    /// Create a client. Fails when no bot token is configured.
    pub fn new(config: &TelegramConfig, user_agent: &str) -> Result<Self> {
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| AppError::config("Missing TELEGRAM_TOKEN"))?;

        Ok(Self {
            client: client_with_timeout(user_agent, REQUEST_TIMEOUT_SECS)?,
            base_url: format!("{}/bot{}", config.api_base.trim_end_matches('/'), token),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/{}", self.base_url, method)
    }

    async fn send_once(&self, chat_id: i64, text: &str, parse_mode: Option<&str>) -> Result<()> {
        let body = SendMessage {
            chat_id,
            text,
            parse_mode,
        };
        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?;
        read_api_response::<serde_json::Value>(response).await?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for TelegramClient {
    async fn send(&self, chat_id: i64, text: &str) -> bool {
        match self.send_once(chat_id, text, Some("Markdown")).await {
            Ok(()) => {
                log::debug!("Message sent to {}", chat_id);
                true
            }
            Err(AppError::Telegram(reason)) => {
                log::warn!(
                    "Markdown rejected for {} ({}), retrying as plain text",
                    chat_id,
                    reason
                );
                match self.send_once(chat_id, text, None).await {
                    Ok(()) => true,
                    Err(e) => {
                        log::error!("Failed to send message to {}: {}", chat_id, e);
                        false
                    }
                }
            }
            Err(e) => {
                log::error!("Failed to send message to {}: {}", chat_id, e);
                false
            }
        }
    }
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>> {
        let mut query = vec![
            ("timeout", timeout.as_secs().to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        if let Some(offset) = offset {
            query.push(("offset", offset.to_string()));
        }

        let response = self
            .client
            .get(self.method_url("getUpdates"))
            .query(&query)
            .timeout(timeout + POLL_SLACK)
            .send()
            .await?;

        let updates: Vec<WireUpdate> = read_api_response(response).await?;
        Ok(updates.into_iter().map(Update::from).collect())
    }
}

impl fmt::Debug for TelegramClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramClient")
            .field("base_url", &"[REDACTED]")
            .finish()
    }
}

/// Unwrap the `{ok, result, description}` envelope.
async fn read_api_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;
    let envelope: ApiResponse<T> = serde_json::from_str(&text).map_err(|e| {
        AppError::telegram(format!("HTTP {} with unreadable body: {}", status.as_u16(), e))
    })?;
    envelope.into_result()
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<T> {
        match (self.ok, self.result) {
            (true, Some(result)) => Ok(result),
            _ => Err(AppError::telegram(
                self.description
                    .unwrap_or_else(|| "request failed without description".to_string()),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireUpdate {
    update_id: i64,
    #[serde(default)]
    message: Option<WireMessage>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    chat: WireChat,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    from: Option<WireUser>,
}

#[derive(Debug, Deserialize)]
struct WireChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct WireUser {
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

impl From<WireUpdate> for Update {
    fn from(wire: WireUpdate) -> Self {
        let (chat_id, text, sender) = match wire.message {
            Some(message) => {
                let sender = message
                    .from
                    .and_then(|user| user.username.map(|u| format!("@{u}")).or(user.first_name));
                (message.chat.id, message.text, sender)
            }
            None => (0, None, None),
        };
        Update {
            id: wire.update_id,
            chat_id,
            text,
            sender,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    const PARSE_ERROR: &str =
        r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#;
    const SENT: &str = r#"{"ok":true,"result":{"message_id":7}}"#;

    /// Scripted reply for one request; `None` drops the connection unanswered.
    type Step = Option<(u16, &'static str)>;

    /// Local Bot API stand-in. Records every request body; requests past the
    /// script are answered with success.
    async fn bot_api(script: Vec<Step>) -> (String, Arc<Mutex<Vec<serde_json::Value>>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let bodies = Arc::new(Mutex::new(Vec::new()));
        let seen = bodies.clone();

        tokio::spawn(async move {
            let mut script = script.into_iter();
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let body = read_body(&mut socket).await;
                seen.lock()
                    .unwrap()
                    .push(serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null));

                let Some((status, reply)) = script.next().unwrap_or(Some((200, SENT))) else {
                    continue;
                };
                let response = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{reply}",
                    reply.len()
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        (base, bodies)
    }

    async fn read_body(socket: &mut TcpStream) -> Vec<u8> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let length: usize = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + length {
                    return buf[end + 4..end + 4 + length].to_vec();
                }
            }
            match socket.read(&mut chunk).await {
                Ok(0) | Err(_) => return Vec::new(),
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
            }
        }
    }

    fn client_for(api_base: String) -> TelegramClient {
        let config = TelegramConfig {
            token: Some("123:abc".to_string()),
            api_base,
            ..TelegramConfig::default()
        };
        TelegramClient::new(&config, "menubot-test").unwrap()
    }

    #[tokio::test]
    async fn test_markdown_rejection_retries_as_plain_text() {
        let (base, bodies) = bot_api(vec![Some((400, PARSE_ERROR)), Some((200, SENT))]).await;
        let client = client_for(base);

        assert!(client.send(42, "*unbalanced").await);

        let bodies = bodies.lock().unwrap().clone();
        assert_eq!(bodies.len(), 2);
        assert_eq!(bodies[0]["parse_mode"], "Markdown");
        assert_eq!(bodies[1]["text"], "*unbalanced");
        assert!(bodies[1].get("parse_mode").is_none());
    }

    #[tokio::test]
    async fn test_accepted_markdown_is_sent_once() {
        let (base, bodies) = bot_api(vec![Some((200, SENT))]).await;

        assert!(client_for(base).send(42, "*bold*").await);
        assert_eq!(bodies.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_is_not_retried() {
        let (base, bodies) = bot_api(vec![None]).await;

        assert!(!client_for(base).send(42, "hello").await);
        assert_eq!(bodies.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_updates_envelope_converts_to_domain() {
        let envelope: ApiResponse<Vec<WireUpdate>> = serde_json::from_value(json!({
            "ok": true,
            "result": [
                {"update_id": 101, "message": {"message_id": 1, "chat": {"id": 555, "type": "private"},
                 "from": {"id": 9, "first_name": "Mina", "username": "mina_k"}, "text": "/today"}},
                {"update_id": 102, "edited_message": {"chat": {"id": 555}}},
                {"update_id": 103, "message": {"chat": {"id": 777}, "from": {"id": 3, "first_name": "Ali"}, "text": "hi"}}
            ]
        }))
        .unwrap();

        let updates: Vec<Update> = envelope
            .into_result()
            .unwrap()
            .into_iter()
            .map(Update::from)
            .collect();

        assert_eq!(updates.len(), 3);
        assert_eq!(updates[0].chat_id, 555);
        assert_eq!(updates[0].sender.as_deref(), Some("@mina_k"));
        assert_eq!(updates[0].text.as_deref(), Some("/today"));
        assert_eq!(updates[1].id, 102);
        assert_eq!(updates[1].text, None);
        assert_eq!(updates[2].sender.as_deref(), Some("Ali"));
    }

    #[test]
    fn test_error_envelope_carries_description() {
        let envelope: ApiResponse<serde_json::Value> = serde_json::from_value(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: can't parse entities"
        }))
        .unwrap();

        match envelope.into_result() {
            Err(AppError::Telegram(reason)) => assert!(reason.contains("can't parse entities")),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_request_omits_parse_mode() {
        let body = serde_json::to_value(SendMessage {
            chat_id: 1,
            text: "hi",
            parse_mode: None,
        })
        .unwrap();
        assert!(body.get("parse_mode").is_none());
    }

    #[test]
    fn test_new_requires_token_and_hides_it() {
        assert!(TelegramClient::new(&TelegramConfig::default(), "ua").is_err());

        let config = TelegramConfig {
            token: Some("123:secret".to_string()),
            ..TelegramConfig::default()
        };
        let client = TelegramClient::new(&config, "ua").unwrap();
        assert!(client.method_url("getMe").ends_with("/bot123:secret/getMe"));
        assert!(!format!("{:?}", client).contains("secret"));
    }
}
