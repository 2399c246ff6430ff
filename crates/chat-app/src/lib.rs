#![deny(unsafe_code)]

/// Terminal loop and startup wiring.
pub mod app;
pub mod auth;
/// Conversation model, persistence, session and reply orchestration.
pub mod chat;
pub mod error;
pub mod logging;
/// Layered settings backed by figment.
pub mod settings;
pub mod terminal;

#[cfg(test)]
pub(crate) mod testing;

pub use app::{ChatApp, LaunchOptions, launch};
pub use error::{AppError, AppResult};
