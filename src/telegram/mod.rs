//! Telegram bot integration and handlers

pub mod bot;
pub mod handlers;
pub mod notifications;
pub mod session;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
pub use notifications::{notify_admins_text, AdminNotifier};
