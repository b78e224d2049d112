//! Session manager — per-user state, the exclusive engine lock, and the
//! resident-model set, all under one mutual-exclusion domain.
//!
//! Every read/modify operation on a session, the lock holder, the resident
//! set, or a timer epoch goes through the single internal mutex. The mutex
//! is only ever held for in-memory transitions; engine and transport calls
//! happen outside it.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::engine::GenerationOptions;
use crate::message::ChatMessage;
use crate::pending::{PendingInput, PendingOutcome, PendingValue};

/// Opaque stable user identifier (Telegram user id).
pub type UserId = i64;

/// Per-user session state. Created lazily on first access, lives for the
/// process lifetime unless explicitly ended.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: UserId,
    /// Model this user holds; `None` means no active model. Non-`None` only
    /// while this user is the lock holder.
    pub model_id: Option<String>,
    pub options: GenerationOptions,
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub pending: Option<PendingInput>,
}

impl UserSession {
    fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            model_id: None,
            options: GenerationOptions::default(),
            system_prompt: String::new(),
            history: Vec::new(),
            pending: None,
        }
    }

    fn reset(&mut self) {
        self.model_id = None;
        self.options = GenerationOptions::default();
        self.system_prompt.clear();
        self.history.clear();
        self.pending = None;
    }
}

/// Result of a model selection attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectOutcome {
    Granted,
    /// The lock is held by a different user; nothing was changed.
    Busy { holder: UserId },
}

/// Admission decision for a free-text chat turn.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnAdmission {
    /// Lock held by a different user; nothing was changed.
    Busy { holder: UserId },
    /// No model selected; nothing was changed.
    NoModel,
    /// Turn may proceed with this snapshot.
    Ready {
        model: String,
        options: GenerationOptions,
        messages: Vec<ChatMessage>,
    },
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<UserId, UserSession>,
    /// The single bot-wide lock: which user currently owns the engine.
    lock_holder: Option<UserId>,
    /// Models currently loaded into the engine's serving memory.
    resident: HashSet<String>,
    /// Monotonic per-user timer epochs; a fired timer must present a
    /// matching epoch or it is stale.
    timer_epochs: HashMap<UserId, u64>,
}

/// Single authority over all session and lock state.
pub struct SessionManager {
    inner: Mutex<Inner>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Inner holds no user code that can panic mid-update.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Snapshot of a user's session, creating a default one if absent.
    pub fn session(&self, user_id: UserId) -> UserSession {
        let mut inner = self.lock();
        inner
            .sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id))
            .clone()
    }

    /// Current lock holder, if any.
    pub fn busy_holder(&self) -> Option<UserId> {
        self.lock().lock_holder
    }

    /// Try to grant the engine to `user_id` for `model_id`. The lock grant,
    /// the resident marking, and the session mutation are one atomic step.
    pub fn select_model(&self, user_id: UserId, model_id: &str) -> SelectOutcome {
        let mut inner = self.lock();
        match inner.lock_holder {
            Some(holder) if holder != user_id => SelectOutcome::Busy { holder },
            _ => {
                inner.lock_holder = Some(user_id);
                inner.resident.insert(model_id.to_string());
                inner
                    .sessions
                    .entry(user_id)
                    .or_insert_with(|| UserSession::new(user_id))
                    .model_id = Some(model_id.to_string());
                SelectOutcome::Granted
            }
        }
    }

    /// End a user's session: release the lock if held, clear residency of
    /// the active model, reset all mutable session fields. Returns the model
    /// that was active so the caller can ask the engine to unload it.
    /// Idempotent.
    pub fn end_session(&self, user_id: UserId) -> Option<String> {
        let mut inner = self.lock();
        let model_id = inner
            .sessions
            .get_mut(&user_id)
            .and_then(|s| s.model_id.take());
        if inner.lock_holder == Some(user_id) {
            inner.lock_holder = None;
            if let Some(m) = &model_id {
                inner.resident.remove(m);
            }
        }
        if let Some(sess) = inner.sessions.get_mut(&user_id) {
            sess.reset();
        }
        model_id
    }

    /// Move a user into (or out of) an awaiting-input state.
    pub fn set_pending(&self, user_id: UserId, pending: Option<PendingInput>) {
        let mut inner = self.lock();
        inner
            .sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id))
            .pending = pending;
    }

    /// Feed a free-text message into the pending-input machine.
    ///
    /// Returns `None` when nothing is awaited (the text is a chat turn).
    /// On success the value is stored and the state cleared; on rejection
    /// the state and the stored value stay untouched. Check, validation,
    /// and mutation are one atomic step.
    pub fn apply_pending(&self, user_id: UserId, text: &str) -> Option<PendingOutcome> {
        let mut inner = self.lock();
        let sess = inner
            .sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id));
        let pending = sess.pending?;
        match pending.resolve(text) {
            Ok(value) => {
                let confirmation = value.confirmation();
                match value {
                    PendingValue::Temperature(v) => sess.options.temperature = v,
                    PendingValue::TopP(v) => sess.options.top_p = v,
                    PendingValue::MaxTokens(v) => sess.options.max_tokens = v,
                    PendingValue::SystemPrompt(s) => sess.system_prompt = s,
                }
                sess.pending = None;
                Some(PendingOutcome::Applied { confirmation })
            }
            Err(reason) => Some(PendingOutcome::Rejected { reason }),
        }
    }

    /// Admit or reject a chat turn, and on admission return the outbound
    /// message window: optional system message, then up to `window − 1`
    /// most recent history entries, then the new user message.
    pub fn begin_turn(&self, user_id: UserId, text: &str, window: usize) -> TurnAdmission {
        let mut inner = self.lock();
        if let Some(holder) = inner.lock_holder {
            if holder != user_id {
                return TurnAdmission::Busy { holder };
            }
        }
        let sess = inner
            .sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id));
        let Some(model) = sess.model_id.clone() else {
            return TurnAdmission::NoModel;
        };

        let mut messages = Vec::new();
        if !sess.system_prompt.is_empty() {
            messages.push(ChatMessage::system(&sess.system_prompt));
        }
        let tail = window.saturating_sub(1);
        let start = sess.history.len().saturating_sub(tail);
        messages.extend_from_slice(&sess.history[start..]);
        messages.push(ChatMessage::user(text));

        TurnAdmission::Ready {
            model,
            options: sess.options,
            messages,
        }
    }

    /// Record a completed turn: append the (user, assistant) pair and
    /// enforce the FIFO cap at `window` entries, as one atomic step.
    pub fn commit_turn(&self, user_id: UserId, user_text: &str, answer: &str, window: usize) {
        let mut inner = self.lock();
        let sess = inner
            .sessions
            .entry(user_id)
            .or_insert_with(|| UserSession::new(user_id));
        sess.history.push(ChatMessage::user(user_text));
        sess.history.push(ChatMessage::assistant(answer));
        if sess.history.len() > window {
            let drop = sess.history.len() - window;
            sess.history.drain(..drop);
        }
    }

    /// Clear a user's conversation history without touching the model.
    pub fn clear_history(&self, user_id: UserId) {
        let mut inner = self.lock();
        if let Some(sess) = inner.sessions.get_mut(&user_id) {
            sess.history.clear();
        }
    }

    /// Models currently marked resident in the engine.
    pub fn resident_models(&self) -> Vec<String> {
        self.lock().resident.iter().cloned().collect()
    }

    /// Shutdown sweep: clear the resident set and force-release the lock.
    /// Individual session parameter fields are left alone.
    pub fn unload_all(&self) {
        let mut inner = self.lock();
        inner.resident.clear();
        inner.lock_holder = None;
    }

    // ── Timer epochs ───────────────────────────────────────

    /// Arm a fresh timer epoch for a user, invalidating any prior one.
    /// Returns the token the timer task must present when it fires.
    pub fn arm_timer(&self, user_id: UserId) -> u64 {
        let mut inner = self.lock();
        let epoch = inner.timer_epochs.entry(user_id).or_insert(0);
        *epoch += 1;
        *epoch
    }

    /// Invalidate any armed timer for a user without scheduling a new one.
    pub fn disarm_timer(&self, user_id: UserId) {
        let mut inner = self.lock();
        let epoch = inner.timer_epochs.entry(user_id).or_insert(0);
        *epoch += 1;
    }

    /// A fired timer presents its token here. Wins only if the token still
    /// matches the currently armed epoch; winning invalidates the epoch and
    /// returns the user's active model (if any) for the caller to unload.
    /// A stale token gets `None` and must do nothing.
    pub fn claim_timer(&self, user_id: UserId, token: u64) -> Option<Option<String>> {
        let mut inner = self.lock();
        let epoch = inner.timer_epochs.entry(user_id).or_insert(0);
        if *epoch != token {
            return None;
        }
        *epoch += 1;
        let model = inner
            .sessions
            .get(&user_id)
            .and_then(|s| s.model_id.clone());
        Some(model)
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
