use anyhow::Result;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use macromate::bot::{callback_handler, message_handler};
use macromate::config::AppConfig;
use macromate::db;
use macromate::state::BotState;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // LOG_FORMAT=json switches to machine-readable output
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing();
    info!("Starting MacroMate Telegram Bot");

    let config = AppConfig::from_env()?;
    let state = BotState::init(&config).await?;
    db::init_database_schema(&state.pool).await?;

    let bot = Bot::new(&config.bot_token);

    info!(
        token_capacity = config.token_store.capacity,
        model = %config.oracle.model,
        "Bot initialized, starting dispatcher"
    );

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(message_handler))
        .branch(Update::filter_callback_query().endpoint(callback_handler));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}
