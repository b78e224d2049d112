//! # ollagate bot
//!
//! Concrete collaborators around the ollagate core: the Ollama engine
//! client, the Telegram channel (raw Bot API, no SDK), the command runtime,
//! and the startup/shutdown sweep.

pub mod channels;
pub mod engines;
pub mod runtime;
pub mod texts;
