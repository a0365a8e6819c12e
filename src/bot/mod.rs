//! Bot module for handling Telegram interactions
//!
//! - `commands`: Parses slash commands and their arguments
//! - `actions`: Typed inline button actions carried by action tokens
//! - `message_handler`: Handles incoming text and photo messages
//! - `callback_handler`: Handles inline keyboard callback queries
//! - `ui_builder`: Creates keyboards and formats messages

pub mod actions;
pub mod callback_handler;
pub mod commands;
pub mod message_handler;
pub mod ui_builder;

// Re-export main handler functions for use in main.rs
pub use callback_handler::callback_handler;
pub use message_handler::message_handler;

pub use actions::CallbackAction;
pub use commands::{parse_command, parse_past_days, Command};
