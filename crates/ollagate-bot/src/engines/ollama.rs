//! Ollama engine client — talks to a local Ollama server over HTTP.
//!
//! Unloading goes through `/api/generate` with `keep_alive: 0`; if that
//! fails, `ollama stop <model>` is tried once via the CLI before giving up.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use ollagate_core::engine::{GenerationOptions, InferenceEngine};
use ollagate_core::error::{GateError, Result};
use ollagate_core::message::ChatMessage;

const PING_TIMEOUT: Duration = Duration::from_secs(2);
const LIST_TIMEOUT: Duration = Duration::from_secs(3);
const WARM_UP_TIMEOUT: Duration = Duration::from_secs(180);
const UNLOAD_TIMEOUT: Duration = Duration::from_secs(60);
const CLI_STOP_TIMEOUT: Duration = Duration::from_secs(30);

pub struct OllamaEngine {
    base_url: String,
    client: Client,
    chat_timeout: Duration,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatBody {
    model: String,
    messages: Vec<WireMessage>,
    stream: bool,
    options: WireOptions,
}

#[derive(Debug, Serialize)]
struct WireOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: String,
}

#[derive(Debug, Serialize)]
struct GenerateBody {
    model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    keep_alive: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct TagsReply {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

#[derive(Debug, Deserialize)]
struct VersionReply {
    version: String,
}

impl OllamaEngine {
    pub fn new(base_url: &str, chat_timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
            chat_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn unload_http(&self, model: &str) -> Result<()> {
        let body = GenerateBody {
            model: model.to_string(),
            prompt: None,
            stream: false,
            keep_alive: Some(0),
            options: None,
        };
        let resp = self
            .client
            .post(self.url("/api/generate"))
            .timeout(UNLOAD_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| GateError::Engine(format!("unload request failed: {}", e)))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(GateError::Engine(format!(
                "unload failed ({}): {}",
                status.as_u16(),
                text
            )));
        }
        Ok(())
    }

    async fn unload_cli(&self, model: &str) -> Result<()> {
        let run = tokio::process::Command::new("ollama")
            .arg("stop")
            .arg(model)
            .output();
        let output = tokio::time::timeout(CLI_STOP_TIMEOUT, run)
            .await
            .map_err(|_| GateError::Engine("ollama stop timed out".to_string()))?
            .map_err(|e| GateError::Engine(format!("could not run ollama stop: {}", e)))?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            Err(GateError::Engine(format!("ollama stop failed: {}", detail)))
        }
    }
}

#[async_trait]
impl InferenceEngine for OllamaEngine {
    async fn list_models(&self) -> Result<Vec<String>> {
        let reply: TagsReply = self
            .client
            .get(self.url("/api/tags"))
            .timeout(LIST_TIMEOUT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(reply
            .models
            .into_iter()
            .map(|m| m.name.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect())
    }

    async fn chat(
        &self,
        model: &str,
        messages: &[ChatMessage],
        options: GenerationOptions,
    ) -> Result<String> {
        let body = ChatBody {
            model: model.to_string(),
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role.to_string(),
                    content: m.content.clone(),
                })
                .collect(),
            stream: false,
            options: WireOptions {
                temperature: options.temperature,
                top_p: options.top_p,
                num_predict: options.max_tokens,
            },
        };

        debug!("chat request to {}: {} messages", model, messages.len());
        let resp = self
            .client
            .post(self.url("/api/chat"))
            .timeout(self.chat_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                GateError::Engine(format!("request failed: {}. Is Ollama running?", e))
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(GateError::Engine(format!(
                "API error ({}): {}",
                status.as_u16(),
                &text[..text.len().min(200)]
            )));
        }

        let reply: ChatReply = resp
            .json()
            .await
            .map_err(|e| GateError::Engine(format!("failed to parse response: {}", e)))?;
        Ok(reply.message.content)
    }

    async fn warm_up(&self, model: &str) -> Result<()> {
        let body = GenerateBody {
            model: model.to_string(),
            prompt: Some("ok".to_string()),
            stream: false,
            keep_alive: None,
            options: Some(serde_json::json!({ "num_predict": 1, "temperature": 0.0 })),
        };
        self.client
            .post(self.url("/api/generate"))
            .timeout(WARM_UP_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| GateError::Engine(format!("warm-up request failed: {}", e)))?
            .error_for_status()
            .map_err(|e| GateError::Engine(format!("warm-up failed: {}", e)))?;
        Ok(())
    }

    async fn unload(&self, model: &str) -> Result<()> {
        match self.unload_http(model).await {
            Ok(()) => Ok(()),
            Err(http_err) => {
                warn!("{}; falling back to CLI stop", http_err);
                self.unload_cli(model).await.map_err(|cli_err| {
                    GateError::Engine(format!("{}; {}", http_err, cli_err))
                })
            }
        }
    }

    async fn ping(&self) -> Option<String> {
        let reply: VersionReply = self
            .client
            .get(self.url("/api/version"))
            .timeout(PING_TIMEOUT)
            .send()
            .await
            .ok()?
            .error_for_status()
            .ok()?
            .json()
            .await
            .ok()?;
        Some(format!("ollama {}", reply.version))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollagate_core::message::Role;

    #[test]
    fn trims_trailing_slash() {
        let engine = OllamaEngine::new("http://192.168.1.20:11434/", Duration::from_secs(120));
        assert_eq!(engine.base_url, "http://192.168.1.20:11434");
        assert_eq!(engine.url("/api/chat"), "http://192.168.1.20:11434/api/chat");
    }

    #[test]
    fn chat_body_serializes_roles_and_options() {
        let body = ChatBody {
            model: "llama3".to_string(),
            messages: vec![
                WireMessage {
                    role: Role::System.to_string(),
                    content: "be brief".to_string(),
                },
                WireMessage {
                    role: Role::User.to_string(),
                    content: "hello".to_string(),
                },
            ],
            stream: false,
            options: WireOptions {
                temperature: 0.7,
                top_p: 0.9,
                num_predict: 512,
            },
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"stream\":false"));
        assert!(json.contains("\"system\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(json.contains("\"num_predict\":512"));
    }

    #[test]
    fn chat_reply_deserializes() {
        let json = r#"{"model":"llama3","message":{"role":"assistant","content":"Hello!"},"done":true}"#;
        let reply: ChatReply = serde_json::from_str(json).unwrap();
        assert_eq!(reply.message.content, "Hello!");
    }

    #[test]
    fn tags_reply_tolerates_missing_models() {
        let reply: TagsReply = serde_json::from_str("{}").unwrap();
        assert!(reply.models.is_empty());

        let reply: TagsReply =
            serde_json::from_str(r#"{"models":[{"name":"llama3"},{"name":"mistral"}]}"#).unwrap();
        let names: Vec<&str> = reply.models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["llama3", "mistral"]);
    }

    #[test]
    fn unload_body_has_zero_keep_alive_and_no_prompt() {
        let body = GenerateBody {
            model: "llama3".to_string(),
            prompt: None,
            stream: false,
            keep_alive: Some(0),
            options: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"keep_alive\":0"));
        assert!(!json.contains("prompt"));
        assert!(!json.contains("options"));
    }
}
