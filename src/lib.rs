// Public API for integration tests and the demo binary

pub mod actions;
pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod minigame;
pub mod notice;
pub mod party;
pub mod progress;
pub mod types;
pub mod watch;

pub use client::KiadisaClient;
pub use error::{KiadisaError, KiadisaResult};
