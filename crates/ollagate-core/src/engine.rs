//! Inference engine trait — the abstraction over the local model server.

use async_trait::async_trait;

use crate::error::Result;
use crate::message::ChatMessage;

/// Sampling parameters for a single generation request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f64,
    pub top_p: f64,
    pub max_tokens: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
            max_tokens: 512,
        }
    }
}

/// Client for the locally-running inference engine.
///
/// The chat call here is non-streaming; a streaming implementation can be
/// swapped in behind this same trait without touching the session or lock
/// logic.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// List models the engine can serve. Callers treat an error as an
    /// empty list.
    async fn list_models(&self) -> Result<Vec<String>>;

    /// Run a chat completion and return the full answer text.
    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String>;

    /// Trigger a minimal generation so the model is loaded into serving
    /// memory before the first real turn.
    async fn warm_up(&self, model: &str) -> Result<()>;

    /// Release the model from the engine's memory. Idempotent: unloading a
    /// model that is not resident is not an error.
    async fn unload(&self, model: &str) -> Result<()>;

    /// Probe the engine. Returns a version/status string, or `None` if the
    /// engine is unreachable.
    async fn ping(&self) -> Option<String>;
}
