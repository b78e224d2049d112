//! Transport trait — abstraction for the chat platform the bot talks over.

use async_trait::async_trait;

use crate::error::Result;

/// Chat identifier on the transport side. For direct chats this equals the
/// user id.
pub type ChatId = i64;

/// Outbound side of a chat platform adapter.
///
/// Notifications sent through this trait are best-effort from the core's
/// point of view; chat replies propagate errors to the caller of the turn.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a plain text message.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<()>;

    /// Send a prompt with tappable options. Each option carries a display
    /// label and an opaque token returned verbatim when the user picks it.
    async fn send_choice_prompt(
        &self,
        chat_id: ChatId,
        prompt: &str,
        options: &[(String, String)],
    ) -> Result<()>;

    /// Edit a previously sent message in place.
    async fn edit_message(&self, chat_id: ChatId, message_id: i64, text: &str) -> Result<()>;

    /// Show a "typing" indicator. Purely cosmetic.
    async fn send_typing(&self, _chat_id: ChatId) -> Result<()> {
        Ok(())
    }
}
