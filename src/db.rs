//! # Database Module
//!
//! Postgres persistence for logged meals and favorite foods.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::aggregator::{round_one_decimal, PeriodWindow};
use crate::meal::{FavoriteFood, MacroEstimate, MealRecord};

const MEAL_COLUMNS: &str =
    "id, user_id, log_date, meal_time, food_item, protein_g, carbs_g, fats_g, calories";
const FAVORITE_COLUMNS: &str =
    "id, user_id, food_item, protein_g, carbs_g, fats_g, calories, created_at";

/// Initialize the database schema
pub async fn init_database_schema(pool: &PgPool) -> Result<()> {
    info!("Initializing database schema...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS macro_logs (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            log_date DATE NOT NULL,
            meal_time TIMESTAMPTZ NOT NULL,
            food_item TEXT NOT NULL,
            protein_g DOUBLE PRECISION NOT NULL DEFAULT 0,
            carbs_g DOUBLE PRECISION NOT NULL DEFAULT 0,
            fats_g DOUBLE PRECISION NOT NULL DEFAULT 0,
            calories DOUBLE PRECISION NOT NULL DEFAULT 0
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create macro_logs table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_macro_logs_user_date ON macro_logs (user_id, log_date)",
    )
    .execute(pool)
    .await
    .context("Failed to create macro_logs index")?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS favorite_foods (
            id BIGSERIAL PRIMARY KEY,
            user_id BIGINT NOT NULL,
            food_item TEXT NOT NULL,
            protein_g DOUBLE PRECISION NOT NULL DEFAULT 0,
            carbs_g DOUBLE PRECISION NOT NULL DEFAULT 0,
            fats_g DOUBLE PRECISION NOT NULL DEFAULT 0,
            calories DOUBLE PRECISION NOT NULL DEFAULT 0,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            UNIQUE (user_id, food_item)
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create favorite_foods table")?;

    info!("Database schema initialized successfully");
    Ok(())
}

/// Log a meal for a user; amounts are stored rounded to one decimal
pub async fn save_meal(
    pool: &PgPool,
    user_id: i64,
    log_date: NaiveDate,
    meal_time: DateTime<Utc>,
    estimate: &MacroEstimate,
) -> Result<MealRecord> {
    debug!(user_id, %log_date, food = %estimate.parsed_food_item, "Saving meal");

    let record = sqlx::query_as::<_, MealRecord>(&format!(
        "INSERT INTO macro_logs
             (user_id, log_date, meal_time, food_item, protein_g, carbs_g, fats_g, calories)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING {MEAL_COLUMNS}"
    ))
    .bind(user_id)
    .bind(log_date)
    .bind(meal_time)
    .bind(&estimate.parsed_food_item)
    .bind(round_one_decimal(estimate.protein_g))
    .bind(round_one_decimal(estimate.carbs_g))
    .bind(round_one_decimal(estimate.fats_g))
    .bind(round_one_decimal(estimate.calories))
    .fetch_one(pool)
    .await
    .context("Failed to insert meal")?;

    info!(user_id, meal_id = record.id, "Meal saved");
    Ok(record)
}

/// All meals of a user for one day, ordered by meal time
pub async fn get_daily_meals(
    pool: &PgPool,
    user_id: i64,
    date: NaiveDate,
) -> Result<Vec<MealRecord>> {
    let meals = sqlx::query_as::<_, MealRecord>(&format!(
        "SELECT {MEAL_COLUMNS} FROM macro_logs
         WHERE user_id = $1 AND log_date = $2
         ORDER BY meal_time ASC"
    ))
    .bind(user_id)
    .bind(date)
    .fetch_all(pool)
    .await
    .context("Failed to read daily meals")?;

    debug!(user_id, %date, count = meals.len(), "Daily meals loaded");
    Ok(meals)
}

/// Meals of a user whose `log_date` lies in `[window.start, window.end)`
pub async fn get_meals_in_window(
    pool: &PgPool,
    user_id: i64,
    window: PeriodWindow,
) -> Result<Vec<MealRecord>> {
    let meals = sqlx::query_as::<_, MealRecord>(&format!(
        "SELECT {MEAL_COLUMNS} FROM macro_logs
         WHERE user_id = $1 AND log_date >= $2 AND log_date < $3
         ORDER BY log_date DESC, meal_time ASC"
    ))
    .bind(user_id)
    .bind(window.start())
    .bind(window.end())
    .fetch_all(pool)
    .await
    .context("Failed to read meals for period")?;

    debug!(
        user_id,
        start = %window.start(),
        end = %window.end(),
        count = meals.len(),
        "Period meals loaded"
    );
    Ok(meals)
}

/// Delete a meal owned by `user_id`; `false` when nothing matched
pub async fn delete_meal(pool: &PgPool, meal_id: i64, user_id: i64) -> Result<bool> {
    let rows_affected = sqlx::query("DELETE FROM macro_logs WHERE id = $1 AND user_id = $2")
        .bind(meal_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to delete meal")?
        .rows_affected();

    info!(user_id, meal_id, deleted = rows_affected > 0, "Meal delete requested");
    Ok(rows_affected > 0)
}

/// Save a favorite; `false` when the user already has one with that name
pub async fn save_favorite(pool: &PgPool, user_id: i64, estimate: &MacroEstimate) -> Result<bool> {
    let rows_affected = sqlx::query(
        "INSERT INTO favorite_foods (user_id, food_item, protein_g, carbs_g, fats_g, calories)
         VALUES ($1, $2, $3, $4, $5, $6)
         ON CONFLICT (user_id, food_item) DO NOTHING",
    )
    .bind(user_id)
    .bind(&estimate.parsed_food_item)
    .bind(round_one_decimal(estimate.protein_g))
    .bind(round_one_decimal(estimate.carbs_g))
    .bind(round_one_decimal(estimate.fats_g))
    .bind(round_one_decimal(estimate.calories))
    .execute(pool)
    .await
    .context("Failed to insert favorite")?
    .rows_affected();

    info!(user_id, created = rows_affected > 0, "Favorite save requested");
    Ok(rows_affected > 0)
}

/// Favorites of a user, most recently added first
pub async fn get_favorites(pool: &PgPool, user_id: i64) -> Result<Vec<FavoriteFood>> {
    let sql = format!(
        "SELECT {FAVORITE_COLUMNS} FROM favorite_foods
         WHERE user_id = $1
         ORDER BY created_at DESC, id DESC"
    );
    sqlx::query_as::<_, FavoriteFood>(&sql)
        .bind(user_id)
        .fetch_all(pool)
        .await
        .context("Failed to read favorites")
}

pub async fn get_favorite(
    pool: &PgPool,
    favorite_id: i64,
    user_id: i64,
) -> Result<Option<FavoriteFood>> {
    let sql = format!(
        "SELECT {FAVORITE_COLUMNS} FROM favorite_foods WHERE id = $1 AND user_id = $2"
    );
    sqlx::query_as::<_, FavoriteFood>(&sql)
        .bind(favorite_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .context("Failed to read favorite")
}

/// Delete a favorite owned by `user_id`; `false` when nothing matched
pub async fn delete_favorite(pool: &PgPool, favorite_id: i64, user_id: i64) -> Result<bool> {
    let rows_affected = sqlx::query("DELETE FROM favorite_foods WHERE id = $1 AND user_id = $2")
        .bind(favorite_id)
        .bind(user_id)
        .execute(pool)
        .await
        .context("Failed to delete favorite")?
        .rows_affected();

    info!(user_id, favorite_id, deleted = rows_affected > 0, "Favorite delete requested");
    Ok(rows_affected > 0)
}
