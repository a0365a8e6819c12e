//! # MacroMate Telegram Bot
//!
//! A Telegram bot that estimates nutrition macros for meals described in
//! text or photographed nutrition labels, keeps a per-user food log with
//! favorites, and summarizes daily and multi-day intake.

pub mod action_token;
pub mod aggregator;
pub mod bot;
pub mod circuit_breaker;
pub mod config;
pub mod db;
pub mod errors;
pub mod localization;
pub mod meal;
pub mod oracle;
pub mod state;
