//! # Action Token Store
//!
//! Turns button payloads into short strings that fit in Telegram callback
//! data, and turns them back into payloads when the button is pressed.
//!
//! Small payloads are encoded directly as compact JSON and never touch the
//! store. Larger ones get a generated key backed by a bounded,
//! insertion-ordered map. Tokens minted by older bot versions are still
//! decoded on a best-effort basis.
//!
//! # Token Schemes
//!
//! Resolution tries each [`TokenScheme`] in [`TokenScheme::PRIORITY`] order:
//!
//! - **Stored**: raw lookup in the store
//! - **Direct**: the token is a JSON object
//! - **Legacy**: underscore-delimited tokens (`add_favorite_...`, `remove_<id>`, ...)
//!
//! # Eviction
//!
//! When an insert pushes the store above `capacity`, the oldest-inserted
//! entries are dropped in one batch until `watermark` entries remain.
//! Resolution does not refresh an entry's position.

use chrono::Utc;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use rand::distributions::Alphanumeric;
use rand::Rng;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::config::TokenStoreConfig;
use crate::errors::TokenError;

/// Prefix of store-backed tokens
pub const STORED_PREFIX: &str = "s_";
const RANDOM_SUFFIX_LEN: usize = 6;
/// Food description used when a legacy token carries none
pub const UNKNOWN_FOOD: &str = "unknown";

/// Payload keys shared by the bot's button actions and the legacy decoder
pub mod keys {
    pub const ACTION: &str = "a";
    pub const PROTEIN: &str = "p";
    pub const CARBS: &str = "c";
    pub const FATS: &str = "f";
    pub const CALORIES: &str = "k";
    pub const FOOD: &str = "n";
    pub const ID: &str = "i";
    pub const DAYS: &str = "d";
}

/// Action tags stored under [`keys::ACTION`]
pub mod tags {
    pub const ADD_FAVORITE: &str = "af";
    pub const LOG_FAVORITE: &str = "lf";
    pub const DELETE_FAVORITE: &str = "df";
    pub const REMOVE_MEAL: &str = "rm";
    pub const PAST_DAYS: &str = "pd";
}

lazy_static! {
    static ref LEGACY_ADD_FAVORITE: Regex =
        Regex::new(r"^add_favorite_(.*)$").expect("Legacy add_favorite pattern should be valid");
    static ref LEGACY_ID_ACTION: Regex =
        Regex::new(r"^(remove|log_favorite|delete_favorite)_([A-Za-z0-9-]+)$")
            .expect("Legacy id action pattern should be valid");
}

/// A primitive value carried by a payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayloadValue {
    Integer(i64),
    Number(f64),
    Text(String),
}

impl PayloadValue {
    fn is_finite(&self) -> bool {
        match self {
            PayloadValue::Number(n) => n.is_finite(),
            _ => true,
        }
    }
}

impl From<i64> for PayloadValue {
    fn from(value: i64) -> Self {
        PayloadValue::Integer(value)
    }
}

impl From<f64> for PayloadValue {
    fn from(value: f64) -> Self {
        PayloadValue::Number(value)
    }
}

impl From<&str> for PayloadValue {
    fn from(value: &str) -> Self {
        PayloadValue::Text(value.to_string())
    }
}

impl From<String> for PayloadValue {
    fn from(value: String) -> Self {
        PayloadValue::Text(value)
    }
}

/// Deferred action data attached to a button
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(BTreeMap<String, PayloadValue>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<PayloadValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<PayloadValue>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&PayloadValue> {
        self.0.get(key)
    }

    pub fn get_text(&self, key: &str) -> Option<&str> {
        match self.0.get(key)? {
            PayloadValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric value, widening integers
    pub fn get_number(&self, key: &str) -> Option<f64> {
        match self.0.get(key)? {
            PayloadValue::Number(n) => Some(*n),
            PayloadValue::Integer(i) => Some(*i as f64),
            PayloadValue::Text(_) => None,
        }
    }

    pub fn get_integer(&self, key: &str) -> Option<i64> {
        match self.0.get(key)? {
            PayloadValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    fn to_json(&self) -> Result<String, TokenError> {
        if let Some((key, _)) = self.0.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TokenError::Serialization(format!(
                "non-finite number under key '{key}'"
            )));
        }
        Ok(serde_json::to_string(self)?)
    }
}

/// Encoding generations a token may belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenScheme {
    Stored,
    Direct,
    Legacy,
}

impl TokenScheme {
    /// Fixed order in which `resolve` probes the schemes
    pub const PRIORITY: [TokenScheme; 3] =
        [TokenScheme::Stored, TokenScheme::Direct, TokenScheme::Legacy];

    /// Decode without the store; `Stored` always yields `None` here
    pub fn decode_detached(self, token: &str) -> Option<Payload> {
        match self {
            TokenScheme::Stored => None,
            TokenScheme::Direct => decode_direct(token),
            TokenScheme::Legacy => decode_legacy(token),
        }
    }
}

fn decode_direct(token: &str) -> Option<Payload> {
    if !token.starts_with('{') {
        return None;
    }
    serde_json::from_str(token).ok()
}

fn decode_legacy(token: &str) -> Option<Payload> {
    if let Some(caps) = LEGACY_ADD_FAVORITE.captures(token) {
        let mut parts = caps[1].split('_');
        let mut number = || {
            parts
                .next()
                .and_then(|p| p.trim().parse::<f64>().ok())
                .filter(|n| n.is_finite())
                .unwrap_or(0.0)
        };
        let protein = number();
        let carbs = number();
        let fats = number();
        let calories = number();
        let food = parts.collect::<Vec<_>>().join("_").replace('|', "_");
        let food = if food.trim().is_empty() {
            UNKNOWN_FOOD.to_string()
        } else {
            food
        };

        return Some(
            Payload::new()
                .with(keys::ACTION, tags::ADD_FAVORITE)
                .with(keys::PROTEIN, protein)
                .with(keys::CARBS, carbs)
                .with(keys::FATS, fats)
                .with(keys::CALORIES, calories)
                .with(keys::FOOD, food),
        );
    }

    if let Some(caps) = LEGACY_ID_ACTION.captures(token) {
        let tag = match &caps[1] {
            "remove" => tags::REMOVE_MEAL,
            "log_favorite" => tags::LOG_FAVORITE,
            _ => tags::DELETE_FAVORITE,
        };
        // Old rows were keyed by UUID; keep those as text so callers can reject them
        let id: PayloadValue = match caps[2].parse::<i64>() {
            Ok(id) => id.into(),
            Err(_) => caps[2].to_string().into(),
        };
        return Some(Payload::new().with(keys::ACTION, tag).with(keys::ID, id));
    }

    None
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn generate_key() -> String {
    let millis = Utc::now().timestamp_millis().max(0) as u64;
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{STORED_PREFIX}{}{suffix}", to_base36(millis))
}

/// Bounded store mapping short tokens to button payloads
///
/// Created once at startup and shared behind an `Arc`. All mutation goes
/// through a single mutex, so `mint` and `resolve` may be called from any
/// number of concurrent handlers.
#[derive(Debug)]
pub struct ActionTokenStore {
    entries: Mutex<IndexMap<String, Payload>>,
    config: TokenStoreConfig,
}

impl ActionTokenStore {
    /// Create an empty store
    ///
    /// # Examples
    ///
    /// ```rust
    /// use macromate::action_token::{ActionTokenStore, Payload};
    /// use macromate::config::TokenStoreConfig;
    ///
    /// let store = ActionTokenStore::new(TokenStoreConfig::default());
    /// let payload = Payload::new().with("a", "pd").with("d", 3i64);
    /// let token = store.mint(&payload).unwrap();
    /// assert_eq!(store.resolve(&token).unwrap(), payload);
    /// ```
    pub fn new(config: TokenStoreConfig) -> Self {
        let config = config.normalized();
        info!(
            capacity = config.capacity,
            watermark = config.watermark,
            max_token_bytes = config.max_token_bytes,
            "Action token store created"
        );
        Self {
            entries: Mutex::new(IndexMap::with_capacity(config.capacity + 1)),
            config,
        }
    }

    pub fn config(&self) -> &TokenStoreConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, Payload>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode a payload into a token usable as button data
    ///
    /// # Errors
    ///
    /// `EncodingTooLarge` when the payload exceeds `max_payload_bytes` or the
    /// generated key does not fit `max_token_bytes`; `Serialization` for
    /// payloads holding non-finite numbers.
    pub fn mint(&self, payload: &Payload) -> Result<String, TokenError> {
        let json = payload.to_json()?;

        if json.len() <= self.config.max_token_bytes {
            debug!(token_bytes = json.len(), "Minted direct action token");
            return Ok(json);
        }

        if json.len() > self.config.max_payload_bytes {
            warn!(
                payload_bytes = json.len(),
                limit = self.config.max_payload_bytes,
                "Payload too large for action token"
            );
            return Err(TokenError::EncodingTooLarge {
                size: json.len(),
                limit: self.config.max_payload_bytes,
            });
        }

        let mut entries = self.lock();
        let mut token = generate_key();
        while entries.contains_key(&token) {
            token = generate_key();
        }
        if token.len() > self.config.max_token_bytes {
            return Err(TokenError::EncodingTooLarge {
                size: token.len(),
                limit: self.config.max_token_bytes,
            });
        }

        entries.insert(token.clone(), payload.clone());

        if entries.len() > self.config.capacity {
            let evicted = entries.len() - self.config.watermark;
            entries.drain(..evicted);
            info!(
                evicted,
                remaining = entries.len(),
                "Evicted oldest action tokens"
            );
        }

        debug!(token = %token, stored = entries.len(), "Minted stored action token");
        Ok(token)
    }

    /// Decode a token back into its payload
    ///
    /// Resolution does not consume the entry; see [`ActionTokenStore::discard`].
    pub fn resolve(&self, token: &str) -> Result<Payload, TokenError> {
        for scheme in TokenScheme::PRIORITY {
            let decoded = match scheme {
                TokenScheme::Stored => self.lock().get(token).cloned(),
                other => other.decode_detached(token),
            };
            if let Some(payload) = decoded {
                debug!(scheme = ?scheme, "Resolved action token");
                return Ok(payload);
            }
        }

        if token.starts_with(STORED_PREFIX) {
            debug!(token = %token, "Action token not found");
            Err(TokenError::NotFound(token.to_string()))
        } else {
            warn!(token = %token, "Action token matched no known scheme");
            Err(TokenError::MalformedLegacyToken(token.to_string()))
        }
    }

    /// Remove a stored token once its action has been carried out
    ///
    /// Returns `false` for direct or legacy tokens and for unknown keys.
    pub fn discard(&self, token: &str) -> bool {
        self.lock().shift_remove(token).is_some()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.lock().contains_key(token)
    }

    /// Number of store-backed entries
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl Default for ActionTokenStore {
    fn default() -> Self {
        Self::new(TokenStoreConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn small_store(capacity: usize, watermark: usize) -> ActionTokenStore {
        ActionTokenStore::new(TokenStoreConfig {
            capacity,
            watermark,
            ..Default::default()
        })
    }

    fn long_payload(i: usize) -> Payload {
        Payload::new()
            .with(keys::ACTION, tags::ADD_FAVORITE)
            .with(keys::FOOD, format!("grilled chicken breast with rice and broccoli #{i}"))
            .with(keys::PROTEIN, 42.5)
            .with(keys::CALORIES, 610.0)
    }

    #[test]
    fn test_direct_mode_round_trip_skips_store() {
        let store = ActionTokenStore::default();
        let payload = Payload::new().with(keys::ACTION, tags::REMOVE_MEAL).with(keys::ID, 812i64);

        let token = store.mint(&payload).unwrap();
        assert!(token.starts_with('{'));
        assert!(token.len() <= 64);
        assert!(store.is_empty());
        assert_eq!(store.resolve(&token).unwrap(), payload);
    }

    #[test]
    fn test_direct_mode_preserves_fractional_numbers() {
        let store = ActionTokenStore::default();
        let payload = Payload::new()
            .with(keys::PROTEIN, 0.1)
            .with(keys::CALORIES, 99.8)
            .with(keys::FATS, 12.0);

        let token = store.mint(&payload).unwrap();
        let resolved = store.resolve(&token).unwrap();
        assert_eq!(resolved.get_number(keys::PROTEIN), Some(0.1));
        assert_eq!(resolved.get_number(keys::CALORIES), Some(99.8));
        assert_eq!(resolved, payload);
    }

    #[test]
    fn test_stored_mode_round_trip() {
        let store = ActionTokenStore::default();
        let payload = long_payload(1);

        let token = store.mint(&payload).unwrap();
        assert!(token.starts_with(STORED_PREFIX));
        assert!(token.len() <= 64);
        assert_eq!(store.len(), 1);
        assert_eq!(store.resolve(&token).unwrap(), payload);
    }

    #[test]
    fn test_resolve_is_persistent_until_discarded() {
        let store = ActionTokenStore::default();
        let payload = long_payload(7);
        let token = store.mint(&payload).unwrap();

        assert_eq!(store.resolve(&token).unwrap(), payload);
        assert_eq!(store.resolve(&token).unwrap(), payload);
        assert_eq!(store.resolve(&token).unwrap(), payload);

        assert!(store.discard(&token));
        assert!(!store.discard(&token));
        assert_eq!(
            store.resolve(&token),
            Err(TokenError::NotFound(token.clone()))
        );
    }

    #[test]
    fn test_discard_direct_token_is_noop() {
        let store = ActionTokenStore::default();
        let payload = Payload::new().with(keys::ACTION, tags::PAST_DAYS).with(keys::DAYS, 3i64);
        let token = store.mint(&payload).unwrap();

        assert!(!store.discard(&token));
        assert_eq!(store.resolve(&token).unwrap(), payload);
    }

    #[test]
    fn test_eviction_is_oldest_first_and_batched() {
        let store = small_store(10, 4);
        let tokens: Vec<String> = (0..11).map(|i| store.mint(&long_payload(i)).unwrap()).collect();

        // 11th insert crosses capacity and trims down to the watermark
        assert_eq!(store.len(), 4);
        for token in &tokens[..7] {
            assert!(matches!(store.resolve(token), Err(TokenError::NotFound(_))));
        }
        for (i, token) in tokens.iter().enumerate().skip(7) {
            assert_eq!(store.resolve(token).unwrap(), long_payload(i));
        }
    }

    #[test]
    fn test_no_eviction_at_capacity() {
        let store = small_store(5, 2);
        let tokens: Vec<String> = (0..5).map(|i| store.mint(&long_payload(i)).unwrap()).collect();

        assert_eq!(store.len(), 5);
        for token in &tokens {
            assert!(store.resolve(token).is_ok());
        }
    }

    #[test]
    fn test_resolve_does_not_refresh_eviction_order() {
        let store = small_store(3, 1);
        let first = store.mint(&long_payload(0)).unwrap();
        store.mint(&long_payload(1)).unwrap();
        store.mint(&long_payload(2)).unwrap();

        // Touching the oldest entry must not protect it
        assert!(store.resolve(&first).is_ok());
        let newest = store.mint(&long_payload(3)).unwrap();

        assert!(store.resolve(&first).is_err());
        assert_eq!(store.len(), 1);
        assert!(store.contains(&newest));
    }

    #[test]
    fn test_unknown_stored_token_is_not_found() {
        let store = ActionTokenStore::default();
        let err = store.resolve("s_lq2x9k0aB3dE9").unwrap_err();
        assert_eq!(err, TokenError::NotFound("s_lq2x9k0aB3dE9".to_string()));
        assert!(err.is_expired());
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let store = ActionTokenStore::default();
        for token in ["fav_12", "{not json", "", "remove_", "confirm"] {
            let err = store.resolve(token).unwrap_err();
            assert!(matches!(err, TokenError::MalformedLegacyToken(_)), "token {token:?}");
            assert!(err.is_expired());
        }
    }

    #[test]
    fn test_legacy_add_favorite_decodes() {
        let store = ActionTokenStore::default();
        let payload = store
            .resolve("add_favorite_31_0_3.6_165_chicken|breast_grilled")
            .unwrap();

        assert_eq!(payload.get_text(keys::ACTION), Some(tags::ADD_FAVORITE));
        assert_eq!(payload.get_number(keys::PROTEIN), Some(31.0));
        assert_eq!(payload.get_number(keys::CARBS), Some(0.0));
        assert_eq!(payload.get_number(keys::FATS), Some(3.6));
        assert_eq!(payload.get_number(keys::CALORIES), Some(165.0));
        assert_eq!(payload.get_text(keys::FOOD), Some("chicken_breast_grilled"));
    }

    #[test]
    fn test_legacy_add_favorite_defaults_unrecoverable_fields() {
        let payload = TokenScheme::Legacy
            .decode_detached("add_favorite_abc_12_NaN")
            .unwrap();

        assert_eq!(payload.get_number(keys::PROTEIN), Some(0.0));
        assert_eq!(payload.get_number(keys::CARBS), Some(12.0));
        assert_eq!(payload.get_number(keys::FATS), Some(0.0));
        assert_eq!(payload.get_number(keys::CALORIES), Some(0.0));
        assert_eq!(payload.get_text(keys::FOOD), Some(UNKNOWN_FOOD));
    }

    #[test]
    fn test_legacy_id_actions_decode() {
        let remove = TokenScheme::Legacy.decode_detached("remove_42").unwrap();
        assert_eq!(remove.get_text(keys::ACTION), Some(tags::REMOVE_MEAL));
        assert_eq!(remove.get_integer(keys::ID), Some(42));

        let log = TokenScheme::Legacy.decode_detached("log_favorite_7").unwrap();
        assert_eq!(log.get_text(keys::ACTION), Some(tags::LOG_FAVORITE));

        let delete = TokenScheme::Legacy
            .decode_detached("delete_favorite_3f2b1c9e-aaaa-4bbb-8ccc-123456789abc")
            .unwrap();
        assert_eq!(delete.get_text(keys::ACTION), Some(tags::DELETE_FAVORITE));
        assert_eq!(delete.get_integer(keys::ID), None);
        assert!(delete.get_text(keys::ID).is_some());
    }

    #[test]
    fn test_scheme_probes_are_independent() {
        assert!(TokenScheme::Stored.decode_detached("s_anything").is_none());
        assert!(TokenScheme::Direct.decode_detached("remove_42").is_none());
        assert!(TokenScheme::Legacy.decode_detached(r#"{"a":"rm"}"#).is_none());
        assert!(TokenScheme::Direct.decode_detached(r#"{"a":"rm"}"#).is_some());
    }

    #[test]
    fn test_payload_too_large() {
        let store = ActionTokenStore::default();
        let payload = Payload::new().with(keys::FOOD, "x".repeat(5000));

        let err = store.mint(&payload).unwrap_err();
        assert!(matches!(err, TokenError::EncodingTooLarge { limit: 4096, .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_non_finite_numbers_rejected() {
        let store = ActionTokenStore::default();
        let payload = Payload::new().with(keys::CALORIES, f64::NAN);
        assert!(matches!(store.mint(&payload), Err(TokenError::Serialization(_))));
    }

    #[test]
    fn test_tiny_token_budget_forces_store() {
        let store = ActionTokenStore::new(TokenStoreConfig {
            max_token_bytes: 20,
            ..Default::default()
        });
        let payload = Payload::new()
            .with(keys::ACTION, tags::REMOVE_MEAL)
            .with(keys::ID, 123456i64);

        let token = store.mint(&payload).unwrap();
        assert!(token.starts_with(STORED_PREFIX));
        assert!(token.len() <= 20);
        assert_eq!(store.resolve(&token).unwrap(), payload);
    }

    #[test]
    fn test_concurrent_mint_keeps_every_entry() {
        let store = Arc::new(ActionTokenStore::default());

        let tokens: Vec<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|t| {
                    let store = Arc::clone(&store);
                    scope.spawn(move || {
                        (0..50)
                            .map(|i| store.mint(&long_payload(t * 100 + i)).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(tokens.len(), 400);
        assert_eq!(store.len(), 400);
        for token in &tokens {
            assert!(store.resolve(token).is_ok());
        }
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
