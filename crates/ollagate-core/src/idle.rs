//! Inactivity scheduler — auto-ends a session after a fixed idle window.
//!
//! Each arm spawns a detached task that sleeps for the idle delay and then
//! presents its epoch token to the session manager. Rearming or disarming
//! bumps the epoch, so a task that lost the race wakes up, fails the claim,
//! and exits without side effects. At most one live timer per user can ever
//! win.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::engine::InferenceEngine;
use crate::session::{SessionManager, UserId};
use crate::transport::{ChatId, Transport};

pub struct IdleTimer {
    sessions: Arc<SessionManager>,
    engine: Arc<dyn InferenceEngine>,
    transport: Arc<dyn Transport>,
    delay: Duration,
    /// Notice sent to the user after their session is auto-ended.
    notice: String,
}

impl IdleTimer {
    pub fn new(
        sessions: Arc<SessionManager>,
        engine: Arc<dyn InferenceEngine>,
        transport: Arc<dyn Transport>,
        delay: Duration,
        notice: String,
    ) -> Self {
        Self {
            sessions,
            engine,
            transport,
            delay,
            notice,
        }
    }

    /// Arm (or re-arm) the idle timer for a user. Any previously armed timer
    /// for the same user is atomically invalidated.
    pub fn arm(&self, user_id: UserId, chat_id: ChatId) {
        let token = self.sessions.arm_timer(user_id);
        let sessions = self.sessions.clone();
        let engine = self.engine.clone();
        let transport = self.transport.clone();
        let delay = self.delay;
        let notice = self.notice.clone();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            // Claim under the session domain; stale tokens lose here.
            let Some(model) = sessions.claim_timer(user_id, token) else {
                return;
            };

            if let Some(model) = &model {
                if let Err(e) = engine.unload(model).await {
                    warn!("idle unload of {} failed: {}", model, e);
                }
            }
            sessions.end_session(user_id);
            info!("session of user {} ended after idle timeout", user_id);

            // Best-effort: the session reset must complete either way.
            if let Err(e) = transport.send_text(chat_id, &notice).await {
                warn!("could not notify user {} about idle timeout: {}", user_id, e);
            }
        });
    }

    /// Invalidate any armed timer for a user without scheduling a new one.
    pub fn disarm(&self, user_id: UserId) {
        self.sessions.disarm_timer(user_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GenerationOptions;
    use crate::error::{GateError, Result};
    use crate::message::ChatMessage;
    use crate::session::SelectOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingEngine {
        unloads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl InferenceEngine for RecordingEngine {
        async fn list_models(&self) -> Result<Vec<String>> {
            Ok(vec![])
        }
        async fn chat(
            &self,
            _model: &str,
            _messages: &[ChatMessage],
            _options: GenerationOptions,
        ) -> Result<String> {
            Err(GateError::Engine("not under test".into()))
        }
        async fn warm_up(&self, _model: &str) -> Result<()> {
            Ok(())
        }
        async fn unload(&self, model: &str) -> Result<()> {
            self.unloads.lock().unwrap().push(model.to_string());
            Ok(())
        }
        async fn ping(&self) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<(ChatId, String)>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()> {
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            Ok(())
        }
        async fn send_choice_prompt(
            &self,
            _chat_id: ChatId,
            _prompt: &str,
            _options: &[(String, String)],
        ) -> Result<()> {
            Ok(())
        }
        async fn edit_message(&self, _chat_id: ChatId, _message_id: i64, _text: &str) -> Result<()> {
            Ok(())
        }
    }

    fn timer_fixture() -> (
        Arc<SessionManager>,
        Arc<RecordingEngine>,
        Arc<RecordingTransport>,
        IdleTimer,
    ) {
        let sessions = Arc::new(SessionManager::new());
        let engine = Arc::new(RecordingEngine::default());
        let transport = Arc::new(RecordingTransport::default());
        let timer = IdleTimer::new(
            sessions.clone(),
            engine.clone(),
            transport.clone(),
            Duration::from_secs(300),
            "Session ended due to inactivity.".to_string(),
        );
        (sessions, engine, transport, timer)
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn firing_unloads_resets_and_notifies() {
        let (sessions, engine, transport, timer) = timer_fixture();
        assert_eq!(sessions.select_model(1, "llama3"), SelectOutcome::Granted);
        timer.arm(1, 10);

        // Let the spawned timer task register its sleep deadline before the
        // paused clock jumps past it.
        settle().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        settle().await;

        assert_eq!(engine.unloads.lock().unwrap().as_slice(), ["llama3"]);
        assert_eq!(sessions.busy_holder(), None);
        assert_eq!(sessions.session(1).model_id, None);
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn rearmed_timer_supersedes_the_first() {
        let (sessions, engine, transport, timer) = timer_fixture();
        sessions.select_model(1, "llama3");

        timer.arm(1, 10);
        settle().await;
        tokio::time::advance(Duration::from_secs(100)).await;
        timer.arm(1, 10);
        settle().await;

        // Past the first deadline only: the stale timer must be a no-op.
        tokio::time::advance(Duration::from_secs(250)).await;
        settle().await;
        assert!(engine.unloads.lock().unwrap().is_empty());
        assert_eq!(sessions.session(1).model_id.as_deref(), Some("llama3"));
        assert!(transport.sent.lock().unwrap().is_empty());

        // Past the second deadline: exactly one reset happens.
        tokio::time::advance(Duration::from_secs(100)).await;
        settle().await;
        assert_eq!(engine.unloads.lock().unwrap().len(), 1);
        assert_eq!(sessions.session(1).model_id, None);
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn disarmed_timer_never_fires() {
        let (sessions, engine, transport, timer) = timer_fixture();
        sessions.select_model(1, "llama3");
        timer.arm(1, 10);
        timer.disarm(1);

        tokio::time::advance(Duration::from_secs(1000)).await;
        settle().await;

        assert!(engine.unloads.lock().unwrap().is_empty());
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(sessions.session(1).model_id.as_deref(), Some("llama3"));
    }

    #[tokio::test(start_paused = true)]
    async fn firing_without_model_still_resets_quietly() {
        let (_sessions, engine, transport, timer) = timer_fixture();
        timer.arm(2, 20);

        settle().await;
        tokio::time::advance(Duration::from_secs(301)).await;
        settle().await;

        assert!(engine.unloads.lock().unwrap().is_empty());
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
    }
}
