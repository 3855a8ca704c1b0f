use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use unicode_normalization::UnicodeNormalization;

use crate::storage::{self, Store};
use crate::token::Token;

pub const EXCLUDED_TOKENS_KEY: &str = "excludedTokens";
pub const POS_STATES_KEY: &str = "pos_states";

pub const POS_CATEGORIES: [&str; 11] = [
    "NOUN", "VERB", "ADJ", "ADV", "PRON", "PROPN", "PART", "AUX", "ADP", "CCONJ", "SCONJ",
];

// NFC, trimmed, lower-cased.
pub fn normalize_surface(value: &str) -> String {
    value.nfc().collect::<String>().trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExcludedToken {
    pub surface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pos: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lemma: Option<String>,
}

impl ExcludedToken {
    pub fn from_surface(surface: &str) -> Self {
        Self {
            surface: surface.trim().to_string(),
            ..Self::default()
        }
    }

    pub fn from_token(token: &Token) -> Self {
        let non_empty = |value: &str| (!value.is_empty()).then(|| value.to_string());
        Self {
            surface: token.surface.trim().to_string(),
            reading: non_empty(&token.reading),
            pos: non_empty(&token.pos),
            lemma: non_empty(&token.lemma),
        }
    }

    fn has_details(&self) -> bool {
        self.reading.is_some() || self.pos.is_some() || self.lemma.is_some()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Surface(String),
    Record(ExcludedToken),
}

impl From<StoredEntry> for ExcludedToken {
    fn from(entry: StoredEntry) -> Self {
        match entry {
            StoredEntry::Surface(surface) => ExcludedToken::from_surface(&surface),
            StoredEntry::Record(record) => record,
        }
    }
}

impl From<&ExcludedToken> for StoredEntry {
    fn from(token: &ExcludedToken) -> Self {
        if token.has_details() {
            StoredEntry::Record(token.clone())
        } else {
            StoredEntry::Surface(token.surface.clone())
        }
    }
}

pub struct TokenFilter {
    store: Arc<dyn Store>,
    excluded: BTreeMap<String, ExcludedToken>,
}

impl TokenFilter {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            excluded: BTreeMap::new(),
        }
    }

    pub async fn initialize(&mut self) -> Result<()> {
        let stored: Option<Vec<StoredEntry>> =
            match storage::get_json(self.store.as_ref(), EXCLUDED_TOKENS_KEY).await {
                Ok(stored) => stored,
                Err(err) => {
                    warn!("failed to load excluded tokens: {:#}", err);
                    None
                }
            };
        self.excluded.clear();
        for entry in stored.unwrap_or_default() {
            self.insert(entry.into());
        }
        debug!("loaded {} excluded tokens", self.excluded.len());
        Ok(())
    }

    pub fn contains(&self, surface: &str) -> bool {
        let key = normalize_surface(surface);
        !key.is_empty() && self.excluded.contains_key(&key)
    }

    pub fn should_exclude(&self, token: &Token) -> bool {
        self.contains(&token.surface)
    }

    pub fn len(&self) -> usize {
        self.excluded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excluded.is_empty()
    }

    pub fn entries(&self) -> Vec<ExcludedToken> {
        self.excluded.values().cloned().collect()
    }

    pub fn surfaces(&self) -> Vec<String> {
        self.excluded
            .values()
            .map(|entry| entry.surface.clone())
            .collect()
    }

    pub async fn add<I, S>(&mut self, words: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut added = 0;
        for word in words {
            if self.insert(ExcludedToken::from_surface(word.as_ref())) {
                added += 1;
            }
        }
        self.persist().await?;
        Ok(added)
    }

    pub async fn add_token(&mut self, token: &Token) -> Result<bool> {
        let added = self.insert(ExcludedToken::from_token(token));
        self.persist().await?;
        Ok(added)
    }

    pub async fn remove<I, S>(&mut self, words: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut removed = 0;
        for word in words {
            if self
                .excluded
                .remove(&normalize_surface(word.as_ref()))
                .is_some()
            {
                removed += 1;
            }
        }
        self.persist().await?;
        Ok(removed)
    }

    pub async fn clear(&mut self) -> Result<()> {
        self.excluded.clear();
        self.persist().await?;
        info!("cleared excluded tokens");
        Ok(())
    }

    fn insert(&mut self, token: ExcludedToken) -> bool {
        let key = normalize_surface(&token.surface);
        if key.is_empty() {
            return false;
        }
        let is_new = !self.excluded.contains_key(&key);
        let keep_existing = !is_new && !token.has_details();
        if !keep_existing {
            self.excluded.insert(key, token);
        }
        is_new
    }

    async fn persist(&self) -> Result<()> {
        let entries: Vec<StoredEntry> = self.excluded.values().map(StoredEntry::from).collect();
        storage::set_json(self.store.as_ref(), EXCLUDED_TOKENS_KEY, &entries).await
    }
}

pub struct PosStates {
    store: Arc<dyn Store>,
    states: BTreeMap<String, bool>,
}

impl PosStates {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            states: default_pos_states(),
        }
    }

    pub async fn initialize(&mut self) -> Result<()> {
        self.states = default_pos_states();
        match storage::get_json::<BTreeMap<String, bool>>(self.store.as_ref(), POS_STATES_KEY)
            .await
        {
            Ok(Some(stored)) => {
                for (pos, enabled) in stored {
                    self.states.insert(pos.to_uppercase(), enabled);
                }
            }
            Ok(None) => {}
            Err(err) => warn!("failed to load POS states, enabling all: {:#}", err),
        }
        Ok(())
    }

    pub fn is_enabled(&self, pos: &str) -> bool {
        let pos = pos.trim();
        if pos.is_empty() {
            return true;
        }
        self.states
            .get(&pos.to_uppercase())
            .copied()
            .unwrap_or(true)
    }

    pub async fn set(&mut self, pos: &str, enabled: bool) -> Result<()> {
        self.states.insert(pos.trim().to_uppercase(), enabled);
        storage::set_json(self.store.as_ref(), POS_STATES_KEY, &self.states).await
    }

    pub fn states(&self) -> &BTreeMap<String, bool> {
        &self.states
    }
}

fn default_pos_states() -> BTreeMap<String, bool> {
    POS_CATEGORIES
        .iter()
        .map(|pos| (pos.to_string(), true))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    #[test]
    fn normalization_folds_case_and_space() {
        assert_eq!(normalize_surface("  Tokyo "), "tokyo");
        assert_eq!(normalize_surface("\u{304B}\u{3099}"), "が");
    }

    #[tokio::test]
    async fn loads_both_stored_formats() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                EXCLUDED_TOKENS_KEY,
                json!(["東京", {"surface": "ＡＢＣ", "pos": "PROPN"}]),
            )
            .await
            .expect("seed");
        let mut filter = TokenFilter::new(store);
        filter.initialize().await.expect("init");
        assert!(filter.contains("東京"));
        assert!(filter.contains(" 東京 "));
        assert!(filter.contains("ＡＢＣ"));
        assert_eq!(filter.len(), 2);
    }

    #[tokio::test]
    async fn changes_are_persisted() {
        let store = Arc::new(MemoryStore::new());
        let mut filter = TokenFilter::new(store.clone());
        filter.initialize().await.expect("init");
        assert_eq!(filter.add(["猫", "犬", "猫"]).await.expect("add"), 2);
        let token = Token {
            surface: "鳥".to_string(),
            reading: "トリ".to_string(),
            pos: "NOUN".to_string(),
            ..Token::default()
        };
        assert!(filter.add_token(&token).await.expect("add token"));
        assert_eq!(filter.remove(["犬"]).await.expect("remove"), 1);

        let stored = store.get(EXCLUDED_TOKENS_KEY).await.expect("get");
        assert_eq!(
            stored,
            Some(json!(["猫", {"surface": "鳥", "reading": "トリ", "pos": "NOUN"}]))
        );

        let mut reloaded = TokenFilter::new(store);
        reloaded.initialize().await.expect("reload");
        assert!(reloaded.should_exclude(&token));
        assert!(!reloaded.contains("犬"));
    }

    #[tokio::test]
    async fn clear_empties_the_set() {
        let store = Arc::new(MemoryStore::new());
        let mut filter = TokenFilter::new(store);
        filter.add(["一"]).await.expect("add");
        filter.clear().await.expect("clear");
        assert!(filter.is_empty());
    }

    #[tokio::test]
    async fn pos_states_default_to_enabled() {
        let store = Arc::new(MemoryStore::new());
        let mut states = PosStates::new(store.clone());
        states.initialize().await.expect("init");
        assert!(states.is_enabled("NOUN"));
        assert!(states.is_enabled("INTJ"));
        states.set("verb", false).await.expect("set");

        let mut reloaded = PosStates::new(store);
        reloaded.initialize().await.expect("reload");
        assert!(!reloaded.is_enabled("VERB"));
        assert_eq!(reloaded.states().len(), POS_CATEGORIES.len());
    }

    #[tokio::test]
    async fn unavailable_store_keeps_defaults() {
        let mut states = PosStates::new(Arc::new(MemoryStore::unavailable()));
        states.initialize().await.expect("init");
        assert!(states.is_enabled("ADJ"));
        let mut filter = TokenFilter::new(Arc::new(MemoryStore::unavailable()));
        filter.initialize().await.expect("init");
        assert!(filter.is_empty());
    }
}
