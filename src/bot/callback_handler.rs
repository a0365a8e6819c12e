//! Callback Handler module for processing inline keyboard callback queries

use anyhow::Result;
use chrono::Utc;
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, MessageId};
use tracing::{debug, error, info};

use crate::db;
use crate::localization::t_lang;
use crate::meal::MacroEstimate;
use crate::state::BotState;

use super::actions::CallbackAction;
use super::message_handler::{db_user_id, show_past_days};
use super::ui_builder::format_logged_message;

/// Where the pressed button lives
struct ButtonMessage {
    chat_id: ChatId,
    message_id: MessageId,
}

async fn edit_message(bot: &Bot, target: &ButtonMessage, text: String) {
    // Editing without a markup drops the spent keyboard, which also retires
    // direct tokens that `discard` cannot reach
    if let Err(e) = bot
        .edit_message_text(target.chat_id, target.message_id, text)
        .await
    {
        error!(chat_id = %target.chat_id, error = %e, "Failed to edit message");
    }
}

async fn add_favorite(
    bot: &Bot,
    target: &ButtonMessage,
    user_id: i64,
    estimate: &MacroEstimate,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<String> {
    let note_key = if db::save_favorite(&state.pool, user_id, estimate).await? {
        "favorite-added"
    } else {
        "favorite-exists"
    };

    let text = format_logged_message(estimate, "log-success", Some(note_key), language_code);
    edit_message(bot, target, text).await;
    Ok(t_lang(note_key, language_code))
}

async fn log_favorite(
    bot: &Bot,
    target: &ButtonMessage,
    user_id: i64,
    favorite_id: i64,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<String> {
    let Some(favorite) = db::get_favorite(&state.pool, favorite_id, user_id).await? else {
        return Ok(t_lang("favorite-missing", language_code));
    };

    let estimate = favorite.estimate();
    let now = Utc::now();
    db::save_meal(&state.pool, user_id, now.date_naive(), now, &estimate).await?;

    bot.send_message(
        target.chat_id,
        format_logged_message(&estimate, "favorite-logged", None, language_code),
    )
    .await?;
    Ok(t_lang("favorite-logged", language_code))
}

async fn delete_favorite(
    bot: &Bot,
    target: &ButtonMessage,
    user_id: i64,
    favorite_id: i64,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<String> {
    let notice = if db::delete_favorite(&state.pool, favorite_id, user_id).await? {
        t_lang("favorite-removed", language_code)
    } else {
        t_lang("favorite-remove-failed", language_code)
    };

    edit_message(bot, target, format!("🗑️ {notice}")).await;
    Ok(notice)
}

async fn remove_meal(
    bot: &Bot,
    target: &ButtonMessage,
    user_id: i64,
    meal_id: i64,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<String> {
    let (emoji, notice) = if db::delete_meal(&state.pool, meal_id, user_id).await? {
        ("✅", t_lang("remove-done", language_code))
    } else {
        ("❌", t_lang("remove-missing", language_code))
    };

    edit_message(bot, target, format!("{emoji} {notice}")).await;
    Ok(notice)
}

/// Carry out a resolved action, returning the notice shown on the button press
async fn perform_action(
    bot: &Bot,
    target: &ButtonMessage,
    user_id: i64,
    action: &CallbackAction,
    state: &BotState,
    language_code: Option<&str>,
) -> Result<Option<String>> {
    let notice = match action {
        CallbackAction::AddFavorite(estimate) => {
            add_favorite(bot, target, user_id, estimate, state, language_code).await?
        }
        CallbackAction::LogFavorite { favorite_id } => {
            log_favorite(bot, target, user_id, *favorite_id, state, language_code).await?
        }
        CallbackAction::DeleteFavorite { favorite_id } => {
            delete_favorite(bot, target, user_id, *favorite_id, state, language_code).await?
        }
        CallbackAction::RemoveMeal { meal_id } => {
            remove_meal(bot, target, user_id, *meal_id, state, language_code).await?
        }
        CallbackAction::ShowPastDays { days } => {
            show_past_days(bot, target.chat_id, user_id, *days, state, language_code).await?;
            return Ok(None);
        }
    };
    Ok(Some(notice))
}

/// Handle callback queries from inline keyboards
pub async fn callback_handler(bot: Bot, q: CallbackQuery, state: BotState) -> Result<()> {
    let user_id = db_user_id(&q.from);
    let language_code = q.from.language_code.as_deref();
    let token = q.data.as_deref().unwrap_or("");
    debug!(user_id, token_length = token.len(), "Received callback query from user");

    let action = match CallbackAction::resolve(&state.tokens, token) {
        Ok(action) => action,
        Err(e) => {
            if e.is_expired() {
                info!(user_id, error = %e, "Button token expired");
            } else {
                error!(user_id, error = %e, "Failed to resolve button token");
            }
            bot.answer_callback_query(q.id.clone())
                .text(t_lang("action-expired", language_code))
                .await?;
            return Ok(());
        }
    };

    let Some(message) = q.message.as_ref() else {
        debug!(user_id, "Callback query without an accessible message");
        bot.answer_callback_query(q.id.clone())
            .text(t_lang("action-expired", language_code))
            .await?;
        return Ok(());
    };
    let target = ButtonMessage {
        chat_id: message.chat().id,
        message_id: message.id(),
    };

    let result = perform_action(&bot, &target, user_id, &action, &state, language_code).await;
    let notice = match result {
        Ok(notice) => {
            if action.is_single_use() {
                state.tokens.discard(token);
            }
            notice
        }
        Err(e) => {
            error!(user_id, action = ?action, error = %e, "Failed to handle button action");
            Some(t_lang("error-generic", language_code))
        }
    };

    let answer = bot.answer_callback_query(q.id.clone());
    match notice {
        Some(text) => answer.text(text).await?,
        None => answer.await?,
    };
    Ok(())
}
