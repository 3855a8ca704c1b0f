use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::kana::ReadingMode;
use crate::storage::{self, Store};

pub const SETTINGS_KEY: &str = "settings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enable_furigana: bool,
    pub enable_color: bool,
    pub enable_hover: bool,
    pub enable_word_filters: bool,
    pub enable_dictionary: bool,
    pub dark_mode: bool,
    pub reading_type: ReadingMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_furigana: false,
            enable_color: false,
            enable_hover: false,
            enable_word_filters: false,
            enable_dictionary: false,
            dark_mode: false,
            reading_type: ReadingMode::Hiragana,
        }
    }
}

impl Settings {
    pub async fn load(store: &dyn Store) -> Self {
        match storage::get_json::<Settings>(store, SETTINGS_KEY).await {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(err) => {
                warn!("failed to load settings, using defaults: {:#}", err);
                Settings::default()
            }
        }
    }

    pub async fn save(&self, store: &dyn Store) -> Result<()> {
        storage::set_json(store, SETTINGS_KEY, self)
            .await
            .with_context(|| "failed to save settings")
    }

    // Merges a partial record key by key and returns the keys whose value changed.
    // Unknown keys are skipped with a warning; a known key with a wrong type is an error.
    pub fn apply_partial(&mut self, partial: &Map<String, Value>) -> Result<Vec<String>> {
        let Value::Object(mut current) =
            serde_json::to_value(&*self).with_context(|| "failed to serialize settings")?
        else {
            return Err(anyhow!("settings did not serialize to an object"));
        };
        let before = current.clone();
        for (key, value) in partial {
            if !current.contains_key(key) {
                warn!("ignoring unknown setting '{}'", key);
                continue;
            }
            current.insert(key.clone(), value.clone());
        }
        let updated: Settings = serde_json::from_value(Value::Object(current.clone()))
            .with_context(|| "invalid settings update")?;
        let changed = current
            .iter()
            .filter(|(key, value)| before.get(*key) != Some(*value))
            .map(|(key, _)| key.clone())
            .collect();
        *self = updated;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn defaults_match_the_documented_values() {
        let value = serde_json::to_value(Settings::default()).expect("json");
        assert_eq!(
            value,
            json!({
                "enableFurigana": false,
                "enableColor": false,
                "enableHover": false,
                "enableWordFilters": false,
                "enableDictionary": false,
                "darkMode": false,
                "readingType": "hiragana"
            })
        );
    }

    #[test]
    fn partial_update_reports_changed_keys() {
        let mut settings = Settings::default();
        let changed = settings
            .apply_partial(&object(json!({
                "readingType": "katakana",
                "darkMode": false,
                "somethingElse": 1
            })))
            .expect("apply");
        assert_eq!(changed, vec!["readingType".to_string()]);
        assert_eq!(settings.reading_type, ReadingMode::Katakana);
    }

    #[test]
    fn wrong_type_is_rejected_without_changes() {
        let mut settings = Settings::default();
        let err = settings
            .apply_partial(&object(json!({"enableColor": "yes"})))
            .unwrap_err();
        assert!(err.to_string().contains("invalid settings update"));
        assert_eq!(settings, Settings::default());
    }

    #[tokio::test]
    async fn persisted_settings_are_loaded() {
        let store = MemoryStore::new();
        store
            .set(SETTINGS_KEY, json!({"enableHover": true}))
            .await
            .expect("seed");
        let settings = Settings::load(&store).await;
        assert!(settings.enable_hover);
        assert_eq!(settings.reading_type, ReadingMode::Hiragana);

        let mut updated = settings.clone();
        updated.dark_mode = true;
        updated.save(&store).await.expect("save");
        assert!(Settings::load(&store).await.dark_mode);
    }
}
