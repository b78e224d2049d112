//! Chat platform adapters.

mod telegram;

pub use telegram::{TelegramChannel, TelegramConfig, TelegramTransport};
