//! Static reply texts.

pub const START_TEXT: &str = "Hi! I'm a gateway to a locally-hosted language model.\n\
Use /models to pick a model, then just send me a message.\n\
/help shows everything I can do.";

pub const HELP_TEXT: &str = "Commands:\n\
/models — list available models and pick one\n\
/status — current model and generation settings\n\
/settemp — set temperature (0.0–2.0)\n\
/settopp — set top_p (0.0–1.0)\n\
/setmax — set max tokens per answer\n\
/system — set the system prompt\n\
/clearhistory — forget the conversation so far\n\
/cancel — cancel a pending settings prompt\n\
/end — end the session and unload the model\n\
/ping — check the inference engine\n\
\n\
Only one person can use the model at a time; idle sessions end \
automatically after a few minutes.";

pub const CHOOSE_MODEL: &str = "Pick a model:";
pub const NO_MODELS: &str =
    "The engine returned no models. Make sure it is running and has models installed.";
pub const LOADING_MODEL: &str = "Loading the model into memory...";
pub const MODEL_READY: &str = "Model is ready.";
pub const UNLOADING_MODEL: &str = "Unloading the model from memory...";
pub const MODEL_UNLOADED: &str = "Model unloaded.";
pub const SESSION_ENDED: &str = "Session ended. Model and settings reset.";
pub const HISTORY_CLEARED: &str = "Conversation history cleared (the model was not restarted).";
pub const PENDING_CANCELLED: &str = "Input prompt cancelled.";
pub const UNKNOWN_COMMAND: &str = "Unknown command. /help lists what I understand.";

pub const PROMPT_ENTER_TEMPERATURE: &str = "Send the new temperature (0.0–2.0), e.g. 0.7.";
pub const PROMPT_ENTER_TOP_P: &str = "Send the new top_p (0.0–1.0), e.g. 0.9.";
pub const PROMPT_ENTER_MAX_TOKENS: &str = "Send the new max_tokens (a whole number > 0), e.g. 512.";
pub const PROMPT_ENTER_SYSTEM: &str =
    "Send the new system prompt. An empty prompt clears it.";

pub const INACTIVITY_ENDED: &str =
    "Session ended due to inactivity. The model was unloaded; use /models to start again.";
pub const BOT_SHUTTING_DOWN: &str =
    "The bot is shutting down. Your session has ended; see you soon.";
pub const BOT_STARTED: &str = "The bot is back online. Use /models to start a session.";

pub const ENGINE_DOWN: &str = "The inference engine is not responding.";

pub fn model_selected(model: &str) -> String {
    format!("Model selected: {}", model)
}

pub fn warm_up_failed(err: &str) -> String {
    format!("Could not prepare the model: {}", err)
}

pub fn unload_failed(err: &str) -> String {
    format!("Could not unload the model: {}", err)
}

pub fn engine_up(info: &str) -> String {
    format!("Engine is up: {}", info)
}
