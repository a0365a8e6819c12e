//! # Meal Data Model
//!
//! Records stored by the logging flow and the values derived from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

/// A single logged meal as stored in `macro_logs`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct MealRecord {
    pub id: i64,
    pub user_id: i64,
    /// Calendar day the meal was logged for. Bucketing always uses this
    /// field, never the date part of `meal_time`.
    pub log_date: NaiveDate,
    pub meal_time: DateTime<Utc>,
    pub food_item: String,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
    pub calories: f64,
}

impl MealRecord {
    pub fn macros(&self) -> MacroTotals {
        MacroTotals {
            protein_g: self.protein_g,
            carbs_g: self.carbs_g,
            fats_g: self.fats_g,
            calories: self.calories,
        }
    }
}

/// Sums of the four tracked nutrients, kept at full precision
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroTotals {
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
    pub calories: f64,
}

impl MacroTotals {
    pub fn is_zero(&self) -> bool {
        self.protein_g == 0.0 && self.carbs_g == 0.0 && self.fats_g == 0.0 && self.calories == 0.0
    }
}

impl AddAssign for MacroTotals {
    fn add_assign(&mut self, rhs: Self) {
        self.protein_g += rhs.protein_g;
        self.carbs_g += rhs.carbs_g;
        self.fats_g += rhs.fats_g;
        self.calories += rhs.calories;
    }
}

/// A food the user saved for one-tap logging
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FavoriteFood {
    pub id: i64,
    pub user_id: i64,
    pub food_item: String,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fats_g: f64,
    pub calories: f64,
    pub created_at: DateTime<Utc>,
}

impl FavoriteFood {
    pub fn estimate(&self) -> MacroEstimate {
        MacroEstimate {
            protein_g: self.protein_g,
            carbs_g: self.carbs_g,
            fats_g: self.fats_g,
            calories: self.calories,
            parsed_food_item: self.food_item.clone(),
        }
    }
}

/// Nutrition estimate returned by the macro oracle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEstimate {
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fats_g: f64,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub parsed_food_item: String,
}

impl MacroEstimate {
    /// The oracle answers with zeros when it could not identify the food
    pub fn is_recognized(&self) -> bool {
        !(self.protein_g == 0.0 && self.carbs_g == 0.0 && self.fats_g == 0.0)
    }

    pub fn macros(&self) -> MacroTotals {
        MacroTotals {
            protein_g: self.protein_g,
            carbs_g: self.carbs_g,
            fats_g: self.fats_g,
            calories: self.calories,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_totals_add_assign() {
        let mut totals = MacroTotals::default();
        totals += MacroTotals {
            protein_g: 10.0,
            carbs_g: 20.0,
            fats_g: 5.0,
            calories: 165.0,
        };
        totals += MacroTotals {
            protein_g: 1.5,
            carbs_g: 0.0,
            fats_g: 0.5,
            calories: 10.5,
        };

        assert_eq!(totals.protein_g, 11.5);
        assert_eq!(totals.carbs_g, 20.0);
        assert_eq!(totals.fats_g, 5.5);
        assert_eq!(totals.calories, 175.5);
        assert!(!totals.is_zero());
        assert!(MacroTotals::default().is_zero());
    }

    #[test]
    fn test_estimate_recognition() {
        let unknown = MacroEstimate {
            protein_g: 0.0,
            carbs_g: 0.0,
            fats_g: 0.0,
            calories: 12.0,
            parsed_food_item: "black coffee".to_string(),
        };
        assert!(!unknown.is_recognized());

        let apple = MacroEstimate {
            protein_g: 0.3,
            carbs_g: 25.0,
            fats_g: 0.2,
            calories: 95.0,
            parsed_food_item: "1 medium apple".to_string(),
        };
        assert!(apple.is_recognized());
    }

    #[test]
    fn test_estimate_deserializes_with_missing_fields() {
        let estimate: MacroEstimate =
            serde_json::from_str(r#"{"protein_g": 31, "calories": 165}"#).unwrap();
        assert_eq!(estimate.protein_g, 31.0);
        assert_eq!(estimate.carbs_g, 0.0);
        assert_eq!(estimate.calories, 165.0);
        assert!(estimate.parsed_food_item.is_empty());
    }
}
