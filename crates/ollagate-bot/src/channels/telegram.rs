//! Telegram bot channel — direct HTTP API, no heavy SDK.
//!
//! Long-polls `getUpdates` for text messages and model-selection callback
//! queries; every inbound action is handled in its own task so a slow
//! generation for one user never blocks the others.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ollagate_core::error::{GateError, Result};
use ollagate_core::transport::{ChatId, Transport};

use crate::runtime::GateRuntime;

/// Telegram bot configuration.
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub bot_token: String,
    /// Polling timeout in seconds.
    pub poll_timeout: u64,
}

/// Outbound side of the Telegram API, shared with the core as the
/// [`Transport`] implementation.
pub struct TelegramTransport {
    client: Client,
    api_base: String,
}

impl TelegramTransport {
    fn new(client: Client, api_base: String) -> Self {
        Self { client, api_base }
    }

    pub async fn answer_callback(
        &self,
        callback_query_id: &str,
        text: &str,
        show_alert: bool,
    ) -> Result<()> {
        let body = AnswerCallbackBody {
            callback_query_id: callback_query_id.to_string(),
            text: text.to_string(),
            show_alert,
        };
        self.post("answerCallbackQuery", &body).await
    }

    async fn post<B: Serialize>(&self, method: &str, body: &B) -> Result<()> {
        let url = format!("{}/{}", self.api_base, method);
        let resp = self.client.post(&url).json(body).send().await?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(GateError::Transport(format!(
                "{} failed ({}): {}",
                method,
                status.as_u16(),
                &text[..text.len().min(200)]
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let body = SendMessageBody {
            chat_id,
            text: text.to_string(),
            reply_markup: None,
        };
        self.post("sendMessage", &body).await
    }

    async fn send_choice_prompt(
        &self,
        chat_id: ChatId,
        prompt: &str,
        options: &[(String, String)],
    ) -> Result<()> {
        let keyboard = options
            .iter()
            .map(|(label, token)| {
                vec![InlineKeyboardButton {
                    text: label.clone(),
                    callback_data: token.clone(),
                }]
            })
            .collect();
        let body = SendMessageBody {
            chat_id,
            text: prompt.to_string(),
            reply_markup: Some(InlineKeyboardMarkup {
                inline_keyboard: keyboard,
            }),
        };
        self.post("sendMessage", &body).await
    }

    async fn edit_message(&self, chat_id: ChatId, message_id: i64, text: &str) -> Result<()> {
        let body = EditMessageBody {
            chat_id,
            message_id,
            text: text.to_string(),
        };
        self.post("editMessageText", &body).await
    }

    async fn send_typing(&self, chat_id: ChatId) -> Result<()> {
        let url = format!("{}/sendChatAction", self.api_base);
        let _ = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "chat_id": chat_id, "action": "typing" }))
            .send()
            .await;
        Ok(())
    }
}

/// Telegram bot channel — runs as a long-polling service.
pub struct TelegramChannel {
    config: TelegramConfig,
    client: Client,
    api_base: String,
    transport: Arc<TelegramTransport>,
    shutdown_tx: Option<mpsc::Sender<()>>,
}

impl TelegramChannel {
    pub fn new(config: TelegramConfig) -> Self {
        let api_base = format!("https://api.telegram.org/bot{}", config.bot_token);
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_default();
        let transport = Arc::new(TelegramTransport::new(client.clone(), api_base.clone()));

        Self {
            config,
            client,
            api_base,
            transport,
            shutdown_tx: None,
        }
    }

    /// Outbound half, for wiring into the core.
    pub fn transport(&self) -> Arc<TelegramTransport> {
        self.transport.clone()
    }

    /// Start polling — runs in background, returns immediately.
    pub async fn start(&mut self, runtime: Arc<GateRuntime>) -> Result<()> {
        // Verify token works before spawning anything.
        let me = self.get_me().await?;
        info!(
            "telegram bot started: @{}",
            me.username.unwrap_or_default()
        );

        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        self.shutdown_tx = Some(shutdown_tx);

        let client = self.client.clone();
        let api_base = self.api_base.clone();
        let transport = self.transport.clone();
        let poll_timeout = self.config.poll_timeout;

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            loop {
                if shutdown_rx.try_recv().is_ok() {
                    info!("telegram channel shutting down");
                    break;
                }

                match get_updates(&client, &api_base, offset, poll_timeout).await {
                    Ok(updates) => {
                        for update in updates {
                            offset = update.update_id + 1;
                            dispatch(update, &runtime, &transport);
                        }
                    }
                    Err(e) => {
                        error!("polling error: {}. Retrying in 5s...", e);
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });

        Ok(())
    }

    /// Stop the polling loop.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(()).await;
        }
    }

    async fn get_me(&self) -> Result<TgUser> {
        let url = format!("{}/getMe", self.api_base);
        let resp: TgResponse<TgUser> = self
            .client
            .get(&url)
            .send()
            .await?
            .json()
            .await
            .map_err(|e| GateError::Transport(format!("getMe failed: {}", e)))?;

        if !resp.ok {
            return Err(GateError::Transport("bot token is invalid".into()));
        }
        resp.result
            .ok_or_else(|| GateError::Transport("no result from getMe".into()))
    }
}

/// Route one update into its own task.
fn dispatch(update: TgUpdate, runtime: &Arc<GateRuntime>, transport: &Arc<TelegramTransport>) {
    if let Some(msg) = update.message {
        let Some(text) = msg.text else { return };
        let Some(from) = msg.from else { return };
        if text.is_empty() {
            return;
        }
        let runtime = runtime.clone();
        let chat_id = msg.chat.id;
        tokio::spawn(async move {
            runtime.handle_message(from.id, chat_id, &text).await;
        });
        return;
    }

    if let Some(query) = update.callback_query {
        let runtime = runtime.clone();
        let transport = transport.clone();
        tokio::spawn(async move {
            handle_callback(query, runtime, transport).await;
        });
    }
}

async fn handle_callback(
    query: TgCallbackQuery,
    runtime: Arc<GateRuntime>,
    transport: Arc<TelegramTransport>,
) {
    let Some(data) = query.data else { return };
    let Some(model) = data.strip_prefix("select:") else {
        let _ = transport.answer_callback(&query.id, "", false).await;
        return;
    };
    let Some(origin) = query.message else { return };

    let reply = runtime.select_model(query.from.id, origin.chat.id, model).await;
    if let Err(e) = transport
        .answer_callback(&query.id, &reply.text, !reply.granted)
        .await
    {
        warn!("could not answer callback query: {}", e);
    }
    if reply.granted {
        let _ = transport
            .edit_message(origin.chat.id, origin.message_id, &reply.text)
            .await;
        runtime.warm_up_flow(origin.chat.id, model).await;
    }
}

// ─── Telegram API Types ────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    message: Option<TgMessage>,
    callback_query: Option<TgCallbackQuery>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    text: Option<String>,
    chat: TgChat,
    from: Option<TgUser>,
}

#[derive(Debug, Deserialize)]
struct TgChat {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct TgUser {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgCallbackQuery {
    id: String,
    from: TgUser,
    message: Option<TgMessage>,
    data: Option<String>,
}

#[derive(Debug, Serialize)]
struct SendMessageBody {
    chat_id: i64,
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup {
    inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton {
    text: String,
    callback_data: String,
}

#[derive(Debug, Serialize)]
struct EditMessageBody {
    chat_id: i64,
    message_id: i64,
    text: String,
}

#[derive(Debug, Serialize)]
struct AnswerCallbackBody {
    callback_query_id: String,
    text: String,
    show_alert: bool,
}

// ─── API Helpers ───────────────────────────────────────────

async fn get_updates(
    client: &Client,
    api_base: &str,
    offset: i64,
    timeout: u64,
) -> Result<Vec<TgUpdate>> {
    let url = format!(
        "{}/getUpdates?offset={}&timeout={}&allowed_updates=[\"message\",\"callback_query\"]",
        api_base, offset, timeout
    );

    let resp: TgResponse<Vec<TgUpdate>> = client
        .get(&url)
        .timeout(Duration::from_secs(timeout + 10))
        .send()
        .await?
        .json()
        .await
        .map_err(|e| GateError::Transport(format!("getUpdates parse error: {}", e)))?;

    Ok(resp.result.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choice_prompt_builds_one_button_per_row() {
        let markup = InlineKeyboardMarkup {
            inline_keyboard: vec![
                vec![InlineKeyboardButton {
                    text: "llama3".into(),
                    callback_data: "select:llama3".into(),
                }],
                vec![InlineKeyboardButton {
                    text: "mistral".into(),
                    callback_data: "select:mistral".into(),
                }],
            ],
        };
        let json = serde_json::to_string(&markup).unwrap();
        assert!(json.contains("\"callback_data\":\"select:llama3\""));
        assert!(json.contains("\"callback_data\":\"select:mistral\""));
    }

    #[test]
    fn update_with_callback_query_parses() {
        let json = r#"{
            "update_id": 5,
            "callback_query": {
                "id": "q1",
                "from": {"id": 42, "username": "alice"},
                "message": {"message_id": 9, "chat": {"id": 42}},
                "data": "select:llama3"
            }
        }"#;
        let update: TgUpdate = serde_json::from_str(json).unwrap();
        let query = update.callback_query.unwrap();
        assert_eq!(query.from.id, 42);
        assert_eq!(query.data.as_deref(), Some("select:llama3"));
        assert_eq!(query.message.unwrap().message_id, 9);
    }

    #[test]
    fn plain_message_update_parses() {
        let json = r#"{
            "update_id": 6,
            "message": {
                "message_id": 10,
                "text": "/status",
                "chat": {"id": 42},
                "from": {"id": 42}
            }
        }"#;
        let update: TgUpdate = serde_json::from_str(json).unwrap();
        let msg = update.message.unwrap();
        assert_eq!(msg.text.as_deref(), Some("/status"));
        assert!(update.callback_query.is_none());
    }
}
