//! Shared application state handed to every update handler

use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::sync::Arc;
use tracing::info;

use crate::action_token::ActionTokenStore;
use crate::config::AppConfig;
use crate::oracle::MacroOracle;

#[derive(Clone)]
pub struct BotState {
    pub pool: PgPool,
    /// Process-wide button token store; lost on restart
    pub tokens: Arc<ActionTokenStore>,
    pub oracle: Arc<MacroOracle>,
}

impl BotState {
    /// Connect to the database and build the token store and oracle
    pub async fn init(config: &AppConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&config.database_url)
            .await
            .context("Failed to connect to database")?;
        info!("Database connection pool ready");

        Ok(Self::from_parts(
            pool,
            ActionTokenStore::new(config.token_store.clone()),
            MacroOracle::new(config.oracle.clone()),
        ))
    }

    pub fn from_parts(pool: PgPool, tokens: ActionTokenStore, oracle: MacroOracle) -> Self {
        Self {
            pool,
            tokens: Arc::new(tokens),
            oracle: Arc::new(oracle),
        }
    }
}
