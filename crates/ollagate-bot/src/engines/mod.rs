//! Inference engine clients.

mod ollama;

pub use ollama::OllamaEngine;
