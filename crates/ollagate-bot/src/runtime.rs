//! Bot runtime — command dispatch and lifecycle sweeps.
//!
//! The channel layer hands every inbound action here; this module talks to
//! the session core and the engine, and replies through the transport seam.

use std::sync::Arc;

use tracing::{error, info, warn};

use ollagate_core::engine::InferenceEngine;
use ollagate_core::idle::IdleTimer;
use ollagate_core::pending::PendingInput;
use ollagate_core::registry::ActiveUserRegistry;
use ollagate_core::session::{SelectOutcome, SessionManager, UserId};
use ollagate_core::transport::{ChatId, Transport};
use ollagate_core::turn::{busy_text, TurnConfig, TurnOrchestrator};

use crate::texts;

/// Quick result of a model-selection attempt, shown as the callback answer.
#[derive(Debug, Clone)]
pub struct SelectReply {
    pub text: String,
    pub granted: bool,
}

pub struct GateRuntime {
    sessions: Arc<SessionManager>,
    engine: Arc<dyn InferenceEngine>,
    transport: Arc<dyn Transport>,
    timer: Arc<IdleTimer>,
    registry: Arc<ActiveUserRegistry>,
    orchestrator: TurnOrchestrator,
}

impl GateRuntime {
    pub fn new(
        sessions: Arc<SessionManager>,
        engine: Arc<dyn InferenceEngine>,
        transport: Arc<dyn Transport>,
        timer: Arc<IdleTimer>,
        registry: Arc<ActiveUserRegistry>,
        turn_config: TurnConfig,
    ) -> Self {
        let orchestrator = TurnOrchestrator::new(
            sessions.clone(),
            transport.clone(),
            timer.clone(),
            turn_config,
        );
        Self {
            sessions,
            engine,
            transport,
            timer,
            registry,
            orchestrator,
        }
    }

    /// Entry point for every inbound text message.
    pub async fn handle_message(&self, user_id: UserId, chat_id: ChatId, text: &str) {
        self.register(user_id);

        let trimmed = text.trim();
        if let Some(rest) = trimmed.strip_prefix('/') {
            let command = rest.split_whitespace().next().unwrap_or("");
            // Group chats append the bot name: /status@somebot
            let command = command.split('@').next().unwrap_or(command);
            self.handle_command(user_id, chat_id, command).await;
            return;
        }

        if let Err(e) = self
            .orchestrator
            .handle_text(self.engine.as_ref(), user_id, chat_id, trimmed)
            .await
        {
            error!("turn for user {} failed to deliver: {}", user_id, e);
        }
    }

    async fn handle_command(&self, user_id: UserId, chat_id: ChatId, command: &str) {
        match command {
            "start" => self.say(chat_id, texts::START_TEXT).await,
            "help" => self.say(chat_id, texts::HELP_TEXT).await,
            "models" => self.cmd_models(user_id, chat_id).await,
            "status" => self.cmd_status(user_id, chat_id).await,
            "end" => self.cmd_end(user_id, chat_id).await,
            "clearhistory" => self.cmd_clear_history(user_id, chat_id).await,
            "cancel" => {
                self.sessions.set_pending(user_id, None);
                self.say(chat_id, texts::PENDING_CANCELLED).await;
            }
            "settemp" => {
                self.prompt_setting(
                    user_id,
                    chat_id,
                    PendingInput::Temperature,
                    texts::PROMPT_ENTER_TEMPERATURE,
                )
                .await
            }
            "settopp" => {
                self.prompt_setting(
                    user_id,
                    chat_id,
                    PendingInput::TopP,
                    texts::PROMPT_ENTER_TOP_P,
                )
                .await
            }
            "setmax" => {
                self.prompt_setting(
                    user_id,
                    chat_id,
                    PendingInput::MaxTokens,
                    texts::PROMPT_ENTER_MAX_TOKENS,
                )
                .await
            }
            "system" => {
                self.prompt_setting(
                    user_id,
                    chat_id,
                    PendingInput::SystemPrompt,
                    texts::PROMPT_ENTER_SYSTEM,
                )
                .await
            }
            "ping" => self.cmd_ping(chat_id).await,
            _ => self.say(chat_id, texts::UNKNOWN_COMMAND).await,
        }
    }

    async fn cmd_models(&self, user_id: UserId, chat_id: ChatId) {
        if let Some(holder) = self.sessions.busy_holder() {
            if holder != user_id {
                self.say(chat_id, &busy_text(holder)).await;
                return;
            }
        }
        // Soft failure: an unreachable engine reads as "no models".
        let models = self.engine.list_models().await.unwrap_or_default();
        if models.is_empty() {
            self.say(chat_id, texts::NO_MODELS).await;
            return;
        }
        let options: Vec<(String, String)> = models
            .into_iter()
            .map(|m| (m.clone(), format!("select:{}", m)))
            .collect();
        if let Err(e) = self
            .transport
            .send_choice_prompt(chat_id, texts::CHOOSE_MODEL, &options)
            .await
        {
            warn!("could not send model menu to {}: {}", chat_id, e);
        }
    }

    /// Fast half of the selection flow: grab (or fail to grab) the lock.
    pub async fn select_model(&self, user_id: UserId, chat_id: ChatId, model: &str) -> SelectReply {
        self.register(user_id);
        match self.sessions.select_model(user_id, model) {
            SelectOutcome::Busy { holder } => SelectReply {
                text: busy_text(holder),
                granted: false,
            },
            SelectOutcome::Granted => {
                info!("user {} took the engine with model {}", user_id, model);
                self.timer.arm(user_id, chat_id);
                SelectReply {
                    text: texts::model_selected(model),
                    granted: true,
                }
            }
        }
    }

    /// Slow half of the selection flow: force the model into memory.
    pub async fn warm_up_flow(&self, chat_id: ChatId, model: &str) {
        self.say(chat_id, texts::LOADING_MODEL).await;
        match self.engine.warm_up(model).await {
            Ok(()) => self.say(chat_id, texts::MODEL_READY).await,
            Err(e) => self.say(chat_id, &texts::warm_up_failed(&e.to_string())).await,
        }
    }

    async fn cmd_status(&self, user_id: UserId, chat_id: ChatId) {
        let sess = self.sessions.session(user_id);
        let holder = self.sessions.busy_holder();

        let mut lines = vec!["Status:".to_string()];
        lines.push(format!(
            "Current model: {}",
            sess.model_id.as_deref().unwrap_or("—")
        ));
        if let Some(holder) = holder {
            if holder != user_id {
                lines.push(format!("Bot busy, serving user {}", holder));
            }
        }
        lines.push(format!(
            "temperature={}, top_p={}, max_tokens={}",
            sess.options.temperature, sess.options.top_p, sess.options.max_tokens
        ));
        lines.push(
            if sess.system_prompt.is_empty() {
                "System prompt: not set"
            } else {
                "System prompt: set"
            }
            .to_string(),
        );
        self.say(chat_id, &lines.join("\n")).await;

        if sess.model_id.is_some() {
            self.timer.arm(user_id, chat_id);
        }
    }

    async fn cmd_end(&self, user_id: UserId, chat_id: ChatId) {
        let sess = self.sessions.session(user_id);
        if let Some(model) = &sess.model_id {
            self.say(chat_id, texts::UNLOADING_MODEL).await;
            // A failed unload is reported but never leaves the session stuck.
            match self.engine.unload(model).await {
                Ok(()) => self.say(chat_id, texts::MODEL_UNLOADED).await,
                Err(e) => self.say(chat_id, &texts::unload_failed(&e.to_string())).await,
            }
        }
        self.sessions.end_session(user_id);
        self.timer.disarm(user_id);
        self.say(chat_id, texts::SESSION_ENDED).await;
    }

    async fn cmd_clear_history(&self, user_id: UserId, chat_id: ChatId) {
        self.sessions.clear_history(user_id);
        self.say(chat_id, texts::HISTORY_CLEARED).await;
        if self.sessions.session(user_id).model_id.is_some() {
            self.timer.arm(user_id, chat_id);
        }
    }

    async fn cmd_ping(&self, chat_id: ChatId) {
        match self.engine.ping().await {
            Some(info) => self.say(chat_id, &texts::engine_up(&info)).await,
            None => self.say(chat_id, texts::ENGINE_DOWN).await,
        }
    }

    async fn prompt_setting(
        &self,
        user_id: UserId,
        chat_id: ChatId,
        pending: PendingInput,
        prompt: &str,
    ) {
        self.sessions.set_pending(user_id, Some(pending));
        self.say(chat_id, prompt).await;
        self.timer.arm(user_id, chat_id);
    }

    /// Notify every known user that the bot is up again.
    pub async fn startup_notify(&self) {
        self.broadcast(texts::BOT_STARTED).await;
    }

    /// Shutdown sweep: tell everyone, unload everything, release the lock.
    pub async fn shutdown_sweep(&self) {
        info!("shutting down: notifying users and unloading models");
        self.broadcast(texts::BOT_SHUTTING_DOWN).await;

        for model in self.sessions.resident_models() {
            info!("unloading model: {}", model);
            if let Err(e) = self.engine.unload(&model).await {
                warn!("could not unload {}: {}", model, e);
            }
        }
        self.sessions.unload_all();
    }

    /// One task per recipient; a failure for one user never affects others.
    async fn broadcast(&self, text: &str) {
        let users = self.registry.users();
        if users.is_empty() {
            return;
        }
        info!("notifying {} known users", users.len());
        let notifications = users.into_iter().map(|user_id| {
            let transport = self.transport.clone();
            let text = text.to_string();
            async move {
                if let Err(e) = transport.send_text(user_id, &text).await {
                    warn!("failed to notify user {}: {}", user_id, e);
                }
            }
        });
        futures::future::join_all(notifications).await;
    }

    fn register(&self, user_id: UserId) {
        if let Err(e) = self.registry.add(user_id) {
            warn!("could not persist user {}: {}", user_id, e);
        }
    }

    async fn say(&self, chat_id: ChatId, text: &str) {
        if let Err(e) = self.transport.send_text(chat_id, text).await {
            warn!("could not reply to chat {}: {}", chat_id, e);
        }
    }
}
