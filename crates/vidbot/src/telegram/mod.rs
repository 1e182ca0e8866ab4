//! Telegram front end: commands, buttons, sessions and the gateway used by
//! the delivery resolver.

pub mod bot;
pub mod callbacks;
pub mod commands;
pub mod downloads;
pub mod gateway;
pub mod handlers;
pub mod menu;
pub mod notifications;
pub mod sessions;

pub use bot::{create_bot, setup_bot_commands, Command};
pub use gateway::TelegramGateway;
pub use handlers::{schema, HandlerDeps};
pub use notifications::TelegramAlerts;
pub use sessions::{PendingChoices, SessionRegistry};
