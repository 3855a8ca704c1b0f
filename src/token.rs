use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

// `offset` is the char (Unicode scalar) index of the surface within the
// paragraph text that was tokenized.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Token {
    pub surface: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub reading: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub lemma: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub pos: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub tag: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub dep: String,
    #[serde(default, deserialize_with = "scalar_as_string")]
    pub head: String,
    #[serde(default, deserialize_with = "morph_map")]
    pub morph: BTreeMap<String, String>,
    pub offset: usize,
    #[serde(default, deserialize_with = "string_or_null")]
    pub ent_iob: String,
    #[serde(default, deserialize_with = "string_or_null")]
    pub ent_type: String,
    #[serde(default, deserialize_with = "flexible_bool")]
    pub is_japanese: bool,
}

impl Token {
    pub fn char_len(&self) -> usize {
        self.surface.chars().count()
    }

    pub fn end(&self) -> usize {
        self.offset + self.char_len()
    }
}

fn string_or_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn scalar_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Null => String::new(),
        serde_json::Value::String(text) => text,
        other => other.to_string(),
    })
}

fn morph_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let serde_json::Value::Object(map) = value else {
        return Ok(BTreeMap::new());
    };
    Ok(map
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect())
}

fn flexible_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Bool(flag) => flag,
        serde_json::Value::String(text) => text.trim().eq_ignore_ascii_case("true"),
        serde_json::Value::Number(number) => number.as_i64().unwrap_or(0) != 0,
        _ => false,
    })
}
