//! # ollagate core
//!
//! Session, lock, and lifecycle management for a single exclusive local
//! inference engine shared by many chat users. This crate owns all the
//! state with real invariants — who holds the engine, what a pending
//! settings prompt means for the next message, when an idle session dies —
//! and talks to the outside world only through the [`engine::InferenceEngine`]
//! and [`transport::Transport`] seams.

pub mod config;
pub mod engine;
pub mod error;
pub mod idle;
pub mod message;
pub mod pending;
pub mod registry;
pub mod session;
pub mod transport;
pub mod turn;
