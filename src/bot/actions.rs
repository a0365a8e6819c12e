//! Typed button actions carried by action tokens

use tracing::debug;

use crate::action_token::{keys, tags, ActionTokenStore, Payload};
use crate::errors::TokenError;
use crate::meal::MacroEstimate;

use super::commands::MAX_PAST_DAYS;
use super::ui_builder::truncate_label;

/// What a pressed inline button asks the bot to do
#[derive(Debug, Clone, PartialEq)]
pub enum CallbackAction {
    AddFavorite(MacroEstimate),
    LogFavorite { favorite_id: i64 },
    DeleteFavorite { favorite_id: i64 },
    RemoveMeal { meal_id: i64 },
    ShowPastDays { days: u32 },
}

impl CallbackAction {
    pub fn to_payload(&self) -> Payload {
        match self {
            CallbackAction::AddFavorite(estimate) => Payload::new()
                .with(keys::ACTION, tags::ADD_FAVORITE)
                .with(keys::PROTEIN, estimate.protein_g)
                .with(keys::CARBS, estimate.carbs_g)
                .with(keys::FATS, estimate.fats_g)
                .with(keys::CALORIES, estimate.calories)
                .with(keys::FOOD, estimate.parsed_food_item.as_str()),
            CallbackAction::LogFavorite { favorite_id } => Payload::new()
                .with(keys::ACTION, tags::LOG_FAVORITE)
                .with(keys::ID, *favorite_id),
            CallbackAction::DeleteFavorite { favorite_id } => Payload::new()
                .with(keys::ACTION, tags::DELETE_FAVORITE)
                .with(keys::ID, *favorite_id),
            CallbackAction::RemoveMeal { meal_id } => Payload::new()
                .with(keys::ACTION, tags::REMOVE_MEAL)
                .with(keys::ID, *meal_id),
            CallbackAction::ShowPastDays { days } => Payload::new()
                .with(keys::ACTION, tags::PAST_DAYS)
                .with(keys::DAYS, i64::from(*days)),
        }
    }

    /// `None` when the payload does not describe a known action
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        let action = match payload.get_text(keys::ACTION)? {
            tags::ADD_FAVORITE => CallbackAction::AddFavorite(MacroEstimate {
                protein_g: payload.get_number(keys::PROTEIN).unwrap_or(0.0),
                carbs_g: payload.get_number(keys::CARBS).unwrap_or(0.0),
                fats_g: payload.get_number(keys::FATS).unwrap_or(0.0),
                calories: payload.get_number(keys::CALORIES).unwrap_or(0.0),
                parsed_food_item: payload.get_text(keys::FOOD)?.to_string(),
            }),
            tags::LOG_FAVORITE => CallbackAction::LogFavorite {
                favorite_id: payload.get_integer(keys::ID)?,
            },
            tags::DELETE_FAVORITE => CallbackAction::DeleteFavorite {
                favorite_id: payload.get_integer(keys::ID)?,
            },
            tags::REMOVE_MEAL => CallbackAction::RemoveMeal {
                meal_id: payload.get_integer(keys::ID)?,
            },
            tags::PAST_DAYS => CallbackAction::ShowPastDays {
                days: u32::try_from(payload.get_integer(keys::DAYS)?)
                    .ok()
                    .filter(|days| (1..=MAX_PAST_DAYS).contains(days))?,
            },
            _ => return None,
        };
        Some(action)
    }

    /// Mint a button token for this action
    ///
    /// A favorite whose food name pushes the payload past the store's limit
    /// is minted with the name shortened until it fits.
    pub fn mint(&self, store: &ActionTokenStore) -> Result<String, TokenError> {
        match self {
            CallbackAction::AddFavorite(estimate) => mint_shortened_favorite(store, estimate),
            _ => store.mint(&self.to_payload()),
        }
    }

    /// Resolve a pressed button's token into an action
    ///
    /// A payload that resolves but names no known action is reported as
    /// malformed, which callers treat like an expired button.
    pub fn resolve(store: &ActionTokenStore, token: &str) -> Result<Self, TokenError> {
        let payload = store.resolve(token)?;
        Self::from_payload(&payload)
            .ok_or_else(|| TokenError::MalformedLegacyToken(token.to_string()))
    }

    /// Actions that stop making sense once carried out
    ///
    /// `discard` only drops store-backed tokens. Direct tokens stay valid,
    /// so the callback handler also edits the pressed keyboard away.
    pub fn is_single_use(&self) -> bool {
        !matches!(
            self,
            CallbackAction::ShowPastDays { .. } | CallbackAction::LogFavorite { .. }
        )
    }
}

fn mint_shortened_favorite(
    store: &ActionTokenStore,
    estimate: &MacroEstimate,
) -> Result<String, TokenError> {
    let payload_limit = store.config().max_payload_bytes;
    let mut estimate = estimate.clone();

    loop {
        let payload = CallbackAction::AddFavorite(estimate.clone()).to_payload();
        let (size, limit) = match store.mint(&payload) {
            Err(TokenError::EncodingTooLarge { size, limit }) => (size, limit),
            other => return other,
        };
        let chars = estimate.parsed_food_item.chars().count();
        // A cut name still needs room for its ellipsis
        if limit != payload_limit || chars <= 3 {
            return Err(TokenError::EncodingTooLarge { size, limit });
        }

        // Bytes left for the name once the rest of the payload is counted
        let budget = limit
            .saturating_sub(size.saturating_sub(estimate.parsed_food_item.len()))
            .saturating_sub(3);
        let mut used = 0;
        let kept = estimate
            .parsed_food_item
            .chars()
            .take_while(|c| {
                used += c.len_utf8();
                used <= budget
            })
            .count();
        let target = (kept + 3).min(chars - 1);
        estimate.parsed_food_item = truncate_label(&estimate.parsed_food_item, target);
        debug!(
            payload_bytes = size,
            limit,
            food_chars = estimate.parsed_food_item.chars().count(),
            "Shortened favorite name to fit action token"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action_token::STORED_PREFIX;

    fn chicken() -> MacroEstimate {
        MacroEstimate {
            protein_g: 31.0,
            carbs_g: 0.0,
            fats_g: 3.6,
            calories: 165.0,
            parsed_food_item: "Grilled chicken breast, 100g, no skin".to_string(),
        }
    }

    #[test]
    fn test_actions_survive_minting() {
        let store = ActionTokenStore::default();
        let actions = vec![
            CallbackAction::AddFavorite(chicken()),
            CallbackAction::LogFavorite { favorite_id: 17 },
            CallbackAction::DeleteFavorite { favorite_id: 4 },
            CallbackAction::RemoveMeal { meal_id: 90210 },
            CallbackAction::ShowPastDays { days: 3 },
        ];

        for action in actions {
            let token = action.mint(&store).unwrap();
            assert!(token.len() <= 64);
            assert_eq!(CallbackAction::resolve(&store, &token).unwrap(), action);
        }
    }

    #[test]
    fn test_add_favorite_uses_store_when_large() {
        let store = ActionTokenStore::default();
        let token = CallbackAction::AddFavorite(chicken()).mint(&store).unwrap();
        assert!(token.starts_with(STORED_PREFIX));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_legacy_tokens_become_actions() {
        let store = ActionTokenStore::default();

        let action =
            CallbackAction::resolve(&store, "add_favorite_31_0_3.6_165_chicken|breast").unwrap();
        assert_eq!(
            action,
            CallbackAction::AddFavorite(MacroEstimate {
                protein_g: 31.0,
                carbs_g: 0.0,
                fats_g: 3.6,
                calories: 165.0,
                parsed_food_item: "chicken_breast".to_string(),
            })
        );

        assert_eq!(
            CallbackAction::resolve(&store, "remove_12").unwrap(),
            CallbackAction::RemoveMeal { meal_id: 12 }
        );
    }

    #[test]
    fn test_legacy_uuid_ids_are_expired() {
        let store = ActionTokenStore::default();
        let err = CallbackAction::resolve(&store, "remove_3f2b1c9e-aaaa-4bbb-8ccc-123456789abc")
            .unwrap_err();
        assert!(err.is_expired());
    }

    #[test]
    fn test_unknown_action_tag_is_rejected() {
        let payload = Payload::new().with(keys::ACTION, "zz").with(keys::ID, 1i64);
        assert_eq!(CallbackAction::from_payload(&payload), None);
        assert_eq!(CallbackAction::from_payload(&Payload::new()), None);
    }

    #[test]
    fn test_out_of_range_days_rejected() {
        for days in [-3i64, 0, 31, 4_000_000_000] {
            let payload = Payload::new()
                .with(keys::ACTION, tags::PAST_DAYS)
                .with(keys::DAYS, days);
            assert_eq!(CallbackAction::from_payload(&payload), None, "days = {days}");
        }
    }

    #[test]
    fn test_huge_past_days_token_is_expired() {
        let store = ActionTokenStore::default();
        let err = CallbackAction::resolve(&store, r#"{"a":"pd","d":4000000000}"#).unwrap_err();
        assert!(err.is_expired());

        assert_eq!(
            CallbackAction::resolve(&store, r#"{"a":"pd","d":30}"#).unwrap(),
            CallbackAction::ShowPastDays { days: 30 }
        );
    }

    #[test]
    fn test_long_favorite_name_is_shortened_to_fit() {
        let store = ActionTokenStore::default();
        let long_name = "very long oracle description ".repeat(200);
        let estimate = MacroEstimate {
            parsed_food_item: long_name.clone(),
            ..chicken()
        };

        let token = CallbackAction::AddFavorite(estimate).mint(&store).unwrap();
        let CallbackAction::AddFavorite(stored) = CallbackAction::resolve(&store, &token).unwrap()
        else {
            panic!("expected an add favorite action");
        };

        assert!(stored.parsed_food_item.starts_with("very long oracle description"));
        assert!(stored.parsed_food_item.ends_with("..."));
        assert!(stored.parsed_food_item.chars().count() < long_name.chars().count());
        assert_eq!(stored.protein_g, 31.0);
        let payload = CallbackAction::AddFavorite(stored).to_payload();
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.len() <= store.config().max_payload_bytes);
    }

    #[test]
    fn test_multibyte_favorite_name_is_shortened_to_fit() {
        let store = ActionTokenStore::default();
        let estimate = MacroEstimate {
            parsed_food_item: "🍕".repeat(3000),
            ..chicken()
        };

        let token = CallbackAction::AddFavorite(estimate).mint(&store).unwrap();
        let CallbackAction::AddFavorite(stored) = CallbackAction::resolve(&store, &token).unwrap()
        else {
            panic!("expected an add favorite action");
        };
        assert!(stored.parsed_food_item.starts_with('🍕'));
        assert!(stored.parsed_food_item.ends_with("..."));
    }

    #[test]
    fn test_other_actions_are_not_shortened() {
        let store = ActionTokenStore::new(crate::config::TokenStoreConfig {
            max_token_bytes: 2,
            ..Default::default()
        });
        // Neither a direct token nor a generated key fits two bytes
        let err = CallbackAction::RemoveMeal { meal_id: 1 }.mint(&store).unwrap_err();
        assert!(matches!(err, TokenError::EncodingTooLarge { limit: 2, .. }));
    }

    #[test]
    fn test_single_use() {
        assert!(CallbackAction::RemoveMeal { meal_id: 1 }.is_single_use());
        assert!(CallbackAction::DeleteFavorite { favorite_id: 1 }.is_single_use());
        assert!(CallbackAction::AddFavorite(chicken()).is_single_use());
        // Favorites lists stay usable for logging the same food again
        assert!(!CallbackAction::LogFavorite { favorite_id: 1 }.is_single_use());
        assert!(!CallbackAction::ShowPastDays { days: 3 }.is_single_use());
    }
}
