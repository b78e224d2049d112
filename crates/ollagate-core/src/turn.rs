//! Turn orchestration — what happens to a user's free-text message.
//!
//! Resolves pending settings input first, then admits the message as a chat
//! turn, calls the engine outside the session domain, commits the result to
//! history, chunks the answer for the transport, and re-arms the idle timer.

use std::sync::Arc;

use tracing::{debug, info};

use crate::engine::InferenceEngine;
use crate::error::Result;
use crate::idle::IdleTimer;
use crate::message::chunk_text;
use crate::pending::PendingOutcome;
use crate::session::{SessionManager, TurnAdmission, UserId};
use crate::transport::{ChatId, Transport};

pub const NEED_MODEL: &str = "No model selected. Use /models to pick one first.";

pub fn busy_text(holder: UserId) -> String {
    format!("The bot is busy serving user {}. Try again later.", holder)
}

pub fn engine_error_text(err: &str) -> String {
    format!("Model request failed: {}", err)
}

#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Maximum history entries retained per user (FIFO window).
    pub history_window: usize,
    /// Transport message-size ceiling, in characters.
    pub chunk_size: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            history_window: 20,
            chunk_size: 3800,
        }
    }
}

pub struct TurnOrchestrator {
    sessions: Arc<SessionManager>,
    transport: Arc<dyn Transport>,
    timer: Arc<IdleTimer>,
    config: TurnConfig,
}

impl TurnOrchestrator {
    pub fn new(
        sessions: Arc<SessionManager>,
        transport: Arc<dyn Transport>,
        timer: Arc<IdleTimer>,
        config: TurnConfig,
    ) -> Self {
        Self {
            sessions,
            transport,
            timer,
            config,
        }
    }

    /// Handle one free-text message from a user.
    pub async fn handle_text(
        &self,
        engine: &dyn InferenceEngine,
        user_id: UserId,
        chat_id: ChatId,
        text: &str,
    ) -> Result<()> {
        // Pending settings input swallows the message before the chat path.
        if let Some(outcome) = self.sessions.apply_pending(user_id, text) {
            return match outcome {
                PendingOutcome::Applied { confirmation } => {
                    self.transport.send_text(chat_id, &confirmation).await?;
                    self.timer.arm(user_id, chat_id);
                    Ok(())
                }
                PendingOutcome::Rejected { reason } => {
                    self.transport.send_text(chat_id, reason).await
                }
            };
        }

        let admission = self
            .sessions
            .begin_turn(user_id, text, self.config.history_window);
        let (model, options, messages) = match admission {
            TurnAdmission::Busy { holder } => {
                return self.transport.send_text(chat_id, &busy_text(holder)).await;
            }
            TurnAdmission::NoModel => {
                return self.transport.send_text(chat_id, NEED_MODEL).await;
            }
            TurnAdmission::Ready {
                model,
                options,
                messages,
            } => (model, options, messages),
        };

        debug!(
            "turn for user {}: model={}, {} outbound messages",
            user_id,
            model,
            messages.len()
        );
        let _ = self.transport.send_typing(chat_id).await;

        // The engine call happens outside the session domain; other users'
        // settings commands are not stalled by a slow generation.
        let answer = match engine.chat(&model, &messages, options).await {
            Ok(answer) => answer,
            Err(e) => {
                return self
                    .transport
                    .send_text(chat_id, &engine_error_text(&e.to_string()))
                    .await;
            }
        };

        self.sessions
            .commit_turn(user_id, text, &answer, self.config.history_window);
        info!("turn for user {} completed: {} chars", user_id, answer.len());

        for chunk in chunk_text(&answer, self.config.chunk_size) {
            self.transport.send_text(chat_id, &chunk).await?;
        }
        self.timer.arm(user_id, chat_id);
        Ok(())
    }
}
