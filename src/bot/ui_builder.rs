//! UI Builder module for creating keyboards and formatting messages

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};
use tracing::warn;

use crate::action_token::ActionTokenStore;
use crate::aggregator::{format_amount, DailySummary, PeriodRollup};
use crate::localization::{t_args_lang, t_lang};
use crate::meal::{FavoriteFood, MacroEstimate, MealRecord};

use super::actions::CallbackAction;

/// Favorites offered as buttons in one message
pub const MAX_FAVORITE_BUTTONS: usize = 50;
/// Favorites spelled out in the message text
pub const MAX_FAVORITES_IN_TEXT: usize = 10;
const BUTTON_LABEL_MAX_CHARS: usize = 60;

/// Shorten a label to `max_chars` characters, marking the cut with an ellipsis
pub fn truncate_label(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{kept}...")
}

fn button(
    store: &ActionTokenStore,
    label: String,
    action: &CallbackAction,
) -> Option<InlineKeyboardButton> {
    match action.mint(store) {
        Ok(token) => Some(InlineKeyboardButton::callback(label, token)),
        Err(e) => {
            warn!(error = %e, action = ?action, "Could not mint button token, dropping button");
            None
        }
    }
}

/// "P: 31.0g | C: 0.0g | ..." line for an estimate
pub fn format_macros_line(estimate: &MacroEstimate, language_code: Option<&str>) -> String {
    t_args_lang(
        "log-macros",
        &[
            ("protein", &format_amount(estimate.protein_g)),
            ("carbs", &format_amount(estimate.carbs_g)),
            ("fats", &format_amount(estimate.fats_g)),
            ("calories", &format_amount(estimate.calories)),
        ],
        language_code,
    )
}

/// Confirmation sent after a meal is logged
///
/// `headline_key` is `log-success` or `favorite-logged`; `note_key` adds a
/// line such as `favorite-added` when the message is edited later.
pub fn format_logged_message(
    estimate: &MacroEstimate,
    headline_key: &str,
    note_key: Option<&str>,
    language_code: Option<&str>,
) -> String {
    let mut message = format!(
        "✅ {}\n\n📝 {}\n📊 {}",
        t_lang(headline_key, language_code),
        t_args_lang("log-food", &[("food", &estimate.parsed_food_item)], language_code),
        format_macros_line(estimate, language_code)
    );
    if let Some(note_key) = note_key {
        message.push_str(&format!("\n\n⭐ {}", t_lang(note_key, language_code)));
    }
    message.push_str(&format!("\n\n{}", t_lang("log-hint", language_code)));
    message
}

/// Keyboard under a logging confirmation
pub fn create_log_confirmation_keyboard(
    store: &ActionTokenStore,
    estimate: &MacroEstimate,
    language_code: Option<&str>,
) -> Option<InlineKeyboardMarkup> {
    let add = button(
        store,
        format!("⭐ {}", t_lang("button-add-favorite", language_code)),
        &CallbackAction::AddFavorite(estimate.clone()),
    )?;
    Some(InlineKeyboardMarkup::new(vec![vec![add]]))
}

/// Today's totals and meal list
pub fn format_daily_summary(summary: &DailySummary, language_code: Option<&str>) -> String {
    if summary.is_empty() {
        return format!("📊 {}", t_lang("today-empty", language_code));
    }

    let totals = &summary.totals;
    let mut meals_text = String::new();
    for meal in &summary.meals {
        meals_text.push_str(&format!(
            "🕐 {}\n   📊 {}\n\n",
            t_args_lang(
                "today-meal-line",
                &[
                    ("time", &meal.meal_time.format("%I:%M %p").to_string()),
                    ("food", &meal.food_item),
                ],
                language_code,
            ),
            t_args_lang(
                "today-meal-detail",
                &[
                    ("calories", &format_amount(meal.calories)),
                    ("protein", &format_amount(meal.protein_g)),
                ],
                language_code,
            )
        ));
    }

    let amount = |key: &str, value: f64| {
        t_args_lang(key, &[("amount", &format_amount(value))], language_code)
    };

    format!(
        "📊 {}\n\n🎯 {}\n💪 {}\n🍞 {}\n🥑 {}\n🔥 {}\n\n🍽 {}\n{}{} 💪",
        t_args_lang(
            "today-title",
            &[("date", &summary.date.format("%Y-%m-%d").to_string())],
            language_code
        ),
        t_lang("today-totals", language_code),
        amount("today-protein", totals.protein_g),
        amount("today-carbs", totals.carbs_g),
        amount("today-fats", totals.fats_g),
        amount("today-calories", totals.calories),
        t_lang("today-meals", language_code),
        meals_text,
        t_lang("today-footer", language_code)
    )
}

/// Button under the daily summary leading to the rollup of previous days
pub fn create_daily_summary_keyboard(
    store: &ActionTokenStore,
    days: u32,
    language_code: Option<&str>,
) -> Option<InlineKeyboardMarkup> {
    let past = button(
        store,
        format!(
            "📈 {}",
            t_args_lang("button-past-days", &[("days", &days.to_string())], language_code)
        ),
        &CallbackAction::ShowPastDays { days },
    )?;
    Some(InlineKeyboardMarkup::new(vec![vec![past]]))
}

/// Per-day totals for the previous `days` days
pub fn format_period_rollup(
    rollup: &PeriodRollup,
    days: u32,
    language_code: Option<&str>,
) -> String {
    let days_arg = days.to_string();
    if rollup.is_empty() {
        return format!(
            "📊 {}",
            t_args_lang("past-empty", &[("days", &days_arg)], language_code)
        );
    }

    let mut text = format!(
        "📈 {}\n\n",
        t_args_lang("past-title", &[("days", &days_arg)], language_code)
    );
    for day in &rollup.days {
        text.push_str(&t_args_lang(
            "past-line",
            &[
                ("date", &day.date.format("%b %-d, %Y").to_string()),
                ("protein", &format_amount(day.totals.protein_g)),
                ("carbs", &format_amount(day.totals.carbs_g)),
                ("fats", &format_amount(day.totals.fats_g)),
                ("calories", &format_amount(day.totals.calories)),
            ],
            language_code,
        ));
        text.push('\n');
    }
    text.push_str(&format!("\n{} 📊", t_lang("past-footer", language_code)));
    text
}

/// One remove button per meal logged today
pub fn create_remove_meal_keyboard(
    store: &ActionTokenStore,
    meals: &[MealRecord],
) -> InlineKeyboardMarkup {
    let rows = meals
        .iter()
        .filter_map(|meal| {
            let label = truncate_label(
                &format!("{} - {}", meal.meal_time.format("%I:%M %p"), meal.food_item),
                BUTTON_LABEL_MAX_CHARS,
            );
            button(store, label, &CallbackAction::RemoveMeal { meal_id: meal.id })
        })
        .map(|b| vec![b])
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}

/// Numbered favorites list used by both `/favorites` and `/managefavorites`
pub fn format_favorites_list(
    favorites: &[FavoriteFood],
    title_key: &str,
    prompt_key: &str,
    footer_key: Option<&str>,
    language_code: Option<&str>,
) -> String {
    let mut text = format!(
        "⭐ {}\n\n{}\n\n",
        t_lang(title_key, language_code),
        t_lang(prompt_key, language_code)
    );

    for (i, favorite) in favorites.iter().take(MAX_FAVORITES_IN_TEXT).enumerate() {
        text.push_str(&format!(
            "{}. {}\n   📊 {}\n\n",
            i + 1,
            favorite.food_item,
            format_macros_line(&favorite.estimate(), language_code)
        ));
    }

    if favorites.len() > MAX_FAVORITES_IN_TEXT {
        let more = (favorites.len() - MAX_FAVORITES_IN_TEXT).to_string();
        text.push_str(&format!(
            "{} ⬇️\n\n",
            t_args_lang("favorites-more", &[("count", &more)], language_code)
        ));
    }

    if let Some(footer_key) = footer_key {
        text.push_str(&t_lang(footer_key, language_code));
    }
    text.trim_end().to_string()
}

/// Buttons for favorites; `manage` switches from logging to deleting
pub fn create_favorites_keyboard(
    store: &ActionTokenStore,
    favorites: &[FavoriteFood],
    manage: bool,
) -> InlineKeyboardMarkup {
    let rows = favorites
        .iter()
        .take(MAX_FAVORITE_BUTTONS)
        .filter_map(|favorite| {
            let label = truncate_label(
                &format!(
                    "{}{} ({} cal)",
                    if manage { "🗑️ " } else { "" },
                    favorite.food_item,
                    format_amount(favorite.calories)
                ),
                BUTTON_LABEL_MAX_CHARS,
            );
            let action = if manage {
                CallbackAction::DeleteFavorite { favorite_id: favorite.id }
            } else {
                CallbackAction::LogFavorite { favorite_id: favorite.id }
            };
            button(store, label, &action)
        })
        .map(|b| vec![b])
        .collect::<Vec<_>>();
    InlineKeyboardMarkup::new(rows)
}
