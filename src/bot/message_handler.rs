//! Message Handler module for processing incoming Telegram messages

use anyhow::{Context, Result};
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, FileId, InlineKeyboardMarkup};
use tracing::{debug, error, info, warn};

use crate::aggregator::{summarize_day, summarize_period, PeriodWindow};
use crate::db;
use crate::errors::OracleError;
use crate::localization::{t_args_lang, t_lang};
use crate::meal::MacroEstimate;
use crate::state::BotState;

use super::commands::{parse_command, parse_past_days, Command, DEFAULT_PAST_DAYS, MAX_PAST_DAYS};
use super::ui_builder::{
    create_daily_summary_keyboard, create_favorites_keyboard, create_log_confirmation_keyboard,
    create_remove_meal_keyboard, format_daily_summary, format_favorites_list, format_logged_message,
    format_period_rollup,
};

/// Telegram user id as stored in the database
pub(crate) fn db_user_id(user: &teloxide::types::User) -> i64 {
    user.id.0 as i64
}

/// Send a message, attaching the keyboard when there is one
pub(crate) async fn send_with_keyboard(
    bot: &Bot,
    chat_id: ChatId,
    text: String,
    keyboard: Option<InlineKeyboardMarkup>,
) -> Result<()> {
    let mut request = bot.send_message(chat_id, text);
    if let Some(keyboard) = keyboard {
        request = request.reply_markup(keyboard);
    }
    request.await?;
    Ok(())
}

/// Download a Telegram file into memory
pub async fn download_file(bot: &Bot, file_id: FileId) -> Result<Vec<u8>> {
    let file = bot.get_file(file_id).await?;
    let url = format!(
        "https://api.telegram.org/file/bot{}/{}",
        bot.token(),
        file.path
    );

    let response = reqwest::get(&url).await?.error_for_status()?;
    let bytes = response.bytes().await?;
    Ok(bytes.to_vec())
}

fn oracle_error_message(
    err: &OracleError,
    fallback_key: &str,
    language_code: Option<&str>,
) -> String {
    match err {
        OracleError::CircuitOpen => t_lang("error-oracle-unavailable", language_code),
        _ => t_lang(fallback_key, language_code),
    }
}

/// Store an estimate as today's meal and confirm it with an "Add to Favorites" button
async fn log_estimate(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    estimate: &MacroEstimate,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    db::save_meal(&state.pool, user_id, now.date_naive(), now, estimate).await?;

    let text = format_logged_message(estimate, "log-success", None, language_code);
    let keyboard = create_log_confirmation_keyboard(&state.tokens, estimate, language_code);
    send_with_keyboard(bot, chat_id, text, keyboard).await
}

async fn handle_food_entry(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    text: &str,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    bot.send_chat_action(chat_id, ChatAction::Typing).await?;

    let estimate = match state.oracle.estimate_text(text).await {
        Ok(estimate) => estimate,
        Err(e) => {
            error!(user_id, error = %e, "Text macro estimation failed");
            bot.send_message(chat_id, oracle_error_message(&e, "error-processing", language_code))
                .await?;
            return Ok(());
        }
    };

    if !estimate.is_recognized() {
        info!(user_id, "Food description not understood");
        bot.send_message(
            chat_id,
            t_args_lang("log-not-understood", &[("text", text)], language_code),
        )
        .await?;
        return Ok(());
    }

    log_estimate(bot, chat_id, user_id, &estimate, state, language_code).await
}

async fn handle_start(bot: &Bot, chat_id: ChatId, language_code: Option<&str>) -> Result<()> {
    let message = format!(
        "👋 {}\n\n{}\n\n{}\n\n{}",
        t_lang("welcome-title", language_code),
        t_lang("welcome-description", language_code),
        t_lang("welcome-usage", language_code),
        help_text(language_code)
    );
    bot.send_message(chat_id, message).await?;
    Ok(())
}

fn help_text(language_code: Option<&str>) -> String {
    let default_days = DEFAULT_PAST_DAYS.to_string();
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}\n{}\n\n⚠️ {}",
        t_lang("help-commands", language_code),
        t_lang("help-today", language_code),
        t_args_lang("help-past", &[("days", &default_days)], language_code),
        t_lang("help-remove", language_code),
        t_lang("help-favorites", language_code),
        t_lang("help-manage-favorites", language_code),
        t_lang("help-help", language_code),
        t_lang("disclaimer", language_code)
    )
}

async fn handle_today(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    let today = Utc::now().date_naive();
    let meals = db::get_daily_meals(&state.pool, user_id, today).await?;
    let summary = summarize_day(today, meals);
    debug!(user_id, meals = summary.meals.len(), "Sending daily summary");

    let text = format_daily_summary(&summary, language_code);
    let keyboard = create_daily_summary_keyboard(&state.tokens, DEFAULT_PAST_DAYS, language_code);
    send_with_keyboard(bot, chat_id, text, keyboard).await
}

/// Per-day totals for the `days` days before today
pub(crate) async fn show_past_days(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    days: u32,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    let window = PeriodWindow::last_n_days(Utc::now().date_naive(), days);
    let meals = db::get_meals_in_window(&state.pool, user_id, window).await?;
    let rollup = summarize_period(meals);
    debug!(user_id, days, logged_days = rollup.len(), "Sending past days rollup");

    bot.send_message(chat_id, format_period_rollup(&rollup, days, language_code))
        .await?;
    Ok(())
}

async fn handle_remove(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    let meals = db::get_daily_meals(&state.pool, user_id, Utc::now().date_naive()).await?;
    if meals.is_empty() {
        bot.send_message(chat_id, t_lang("remove-empty", language_code))
            .await?;
        return Ok(());
    }

    let keyboard = create_remove_meal_keyboard(&state.tokens, &meals);
    send_with_keyboard(
        bot,
        chat_id,
        format!("🗑️ {}", t_lang("remove-prompt", language_code)),
        Some(keyboard),
    )
    .await
}

async fn handle_favorites(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    manage: bool,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    let favorites = db::get_favorites(&state.pool, user_id).await?;
    if favorites.is_empty() {
        bot.send_message(chat_id, t_lang("favorites-empty", language_code))
            .await?;
        return Ok(());
    }

    let text = if manage {
        format_favorites_list(
            &favorites,
            "favorites-manage-title",
            "favorites-manage-prompt",
            None,
            language_code,
        )
    } else {
        format_favorites_list(
            &favorites,
            "favorites-title",
            "favorites-prompt",
            Some("favorites-manage-hint"),
            language_code,
        )
    };
    let keyboard = create_favorites_keyboard(&state.tokens, &favorites, manage);
    send_with_keyboard(bot, chat_id, text, Some(keyboard)).await
}

async fn handle_command(
    bot: &Bot,
    chat_id: ChatId,
    user_id: i64,
    command: Command,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    debug!(user_id, command = ?command, "Handling command");

    match command {
        Command::Start => handle_start(bot, chat_id, language_code).await,
        Command::Help => {
            bot.send_message(chat_id, help_text(language_code)).await?;
            Ok(())
        }
        Command::Today => handle_today(bot, chat_id, user_id, state, language_code).await,
        Command::PastDays(arg) => match parse_past_days(arg.as_deref()) {
            Some(days) => show_past_days(bot, chat_id, user_id, days, state, language_code).await,
            None => {
                let max = MAX_PAST_DAYS.to_string();
                bot.send_message(
                    chat_id,
                    t_args_lang("past-invalid-days", &[("max", &max)], language_code),
                )
                .await?;
                Ok(())
            }
        },
        Command::Remove => handle_remove(bot, chat_id, user_id, state, language_code).await,
        Command::Favorites => {
            handle_favorites(bot, chat_id, user_id, false, state, language_code).await
        }
        Command::ManageFavorites => {
            handle_favorites(bot, chat_id, user_id, true, state, language_code).await
        }
        Command::Unknown(name) => {
            debug!(user_id, command = %name, "Unknown command");
            bot.send_message(chat_id, t_lang("unknown-command", language_code))
                .await?;
            Ok(())
        }
    }
}

async fn handle_text_message(
    bot: &Bot,
    msg: &Message,
    user_id: i64,
    text: &str,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    match parse_command(text) {
        Some(command) => {
            handle_command(bot, msg.chat.id, user_id, command, state, language_code).await
        }
        None => handle_food_entry(bot, msg.chat.id, user_id, text, state, language_code).await,
    }
}

async fn handle_photo_message(
    bot: &Bot,
    msg: &Message,
    user_id: i64,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<()> {
    let Some(largest_photo) = msg.photo().and_then(|photos| photos.last()) else {
        return Ok(());
    };
    debug!(user_id, "Received photo message from user");

    let image = match download_file(bot, largest_photo.file.id.clone()).await {
        Ok(image) => image,
        Err(e) => {
            error!(user_id, error = %e, "Failed to download image for user");
            bot.send_message(msg.chat.id, t_lang("error-download-failed", language_code))
                .await?;
            return Ok(());
        }
    };

    bot.send_chat_action(msg.chat.id, ChatAction::Typing).await?;

    let weight_hint = msg.caption().unwrap_or("").trim();
    let estimate = match state.oracle.estimate_image(&image, weight_hint).await {
        Ok(estimate) => estimate,
        Err(e) => {
            error!(user_id, error = %e, "Image macro estimation failed");
            bot.send_message(msg.chat.id, oracle_error_message(&e, "error-image", language_code))
                .await?;
            return Ok(());
        }
    };

    if !estimate.is_recognized() {
        info!(user_id, "Nutrition label not understood");
        bot.send_message(msg.chat.id, t_lang("log-image-not-understood", language_code))
            .await?;
        return Ok(());
    }

    log_estimate(bot, msg.chat.id, user_id, &estimate, state, language_code).await
}

pub async fn message_handler(bot: Bot, msg: Message, state: BotState) -> Result<()> {
    let Some(user) = msg.from.as_ref() else {
        warn!(chat_id = %msg.chat.id, "Ignoring message without sender");
        return Ok(());
    };
    let user_id = db_user_id(user);
    let language_code = user.language_code.as_deref();

    let result = if let Some(text) = msg.text() {
        handle_text_message(&bot, &msg, user_id, text, &state, language_code).await
    } else if msg.photo().is_some() {
        handle_photo_message(&bot, &msg, user_id, &state, language_code).await
    } else {
        debug!(user_id, "Received unsupported message type from user");
        bot.send_message(msg.chat.id, t_lang("unsupported-message", language_code))
            .await
            .map(|_| ())
            .context("Failed to send unsupported message notice")
    };

    if let Err(e) = result {
        error!(user_id, error = %e, "Failed to handle message");
        bot.send_message(msg.chat.id, t_lang("error-generic", language_code))
            .await?;
    }

    Ok(())
}
