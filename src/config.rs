//! # Configuration Module
//!
//! Runtime configuration loaded from the environment, with defaults for
//! the token store, the macro oracle and its recovery behaviour.

use anyhow::{Context, Result};
use std::env;
use std::str::FromStr;

// Telegram rejects callback data longer than 64 bytes
pub const DEFAULT_CALLBACK_DATA_MAX_BYTES: usize = 64;
pub const DEFAULT_TOKEN_STORE_CAPACITY: usize = 1000;
pub const DEFAULT_TOKEN_STORE_WATERMARK: usize = 500;
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 4096;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Sizing of the action token store
#[derive(Debug, Clone, PartialEq)]
pub struct TokenStoreConfig {
    /// Maximum number of stored entries before eviction triggers
    pub capacity: usize,
    /// Size the store is reduced to once eviction triggers
    pub watermark: usize,
    /// Largest token the transport accepts as button data
    pub max_token_bytes: usize,
    /// Largest serialized payload accepted in store-backed mode
    pub max_payload_bytes: usize,
}

impl TokenStoreConfig {
    /// Clamp inconsistent values instead of failing at startup
    pub fn normalized(mut self) -> Self {
        self.capacity = self.capacity.max(1);
        if self.watermark >= self.capacity {
            self.watermark = self.capacity / 2;
        }
        self
    }
}

impl Default for TokenStoreConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_TOKEN_STORE_CAPACITY,
            watermark: DEFAULT_TOKEN_STORE_WATERMARK,
            max_token_bytes: DEFAULT_CALLBACK_DATA_MAX_BYTES,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }
}

/// Recovery configuration for oracle calls
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Base delay between retries in milliseconds
    pub base_retry_delay_ms: u64,
    /// Maximum delay between retries in milliseconds
    pub max_retry_delay_ms: u64,
    /// Timeout for a single oracle request in seconds
    pub operation_timeout_secs: u64,
    /// Circuit breaker failure threshold
    pub circuit_breaker_threshold: u32,
    /// Circuit breaker reset timeout in seconds
    pub circuit_breaker_reset_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_retry_delay_ms: 500,
            max_retry_delay_ms: 5000,
            operation_timeout_secs: 30,
            circuit_breaker_threshold: 5,
            circuit_breaker_reset_secs: 60,
        }
    }
}

/// Macro oracle (Gemini) settings
#[derive(Debug, Clone)]
pub struct OracleConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub recovery: RecoveryConfig,
}

impl OracleConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            recovery: RecoveryConfig::default(),
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bot_token: String,
    pub database_url: String,
    pub oracle: OracleConfig,
    pub token_store: TokenStoreConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let bot_token = env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN must be set")?;
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let api_key = env::var("GEMINI_API_KEY").context("GEMINI_API_KEY must be set")?;

        let mut oracle = OracleConfig::new(api_key);
        if let Ok(model) = env::var("GEMINI_MODEL") {
            oracle.model = model;
        }

        let defaults = TokenStoreConfig::default();
        let token_store = TokenStoreConfig {
            capacity: env_or("TOKEN_STORE_CAPACITY", defaults.capacity),
            watermark: env_or("TOKEN_STORE_WATERMARK", defaults.watermark),
            max_token_bytes: env_or("CALLBACK_DATA_MAX_BYTES", defaults.max_token_bytes),
            max_payload_bytes: defaults.max_payload_bytes,
        }
        .normalized();

        Ok(Self {
            bot_token,
            database_url,
            oracle,
            token_store,
        })
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
