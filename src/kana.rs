use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use wana_kana::ConvertJapanese;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadingMode {
    #[default]
    Hiragana,
    Katakana,
    Romaji,
}

impl ReadingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingMode::Hiragana => "hiragana",
            ReadingMode::Katakana => "katakana",
            ReadingMode::Romaji => "romaji",
        }
    }
}

impl fmt::Display for ReadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReadingMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "hiragana" => Ok(ReadingMode::Hiragana),
            "katakana" => Ok(ReadingMode::Katakana),
            "romaji" => Ok(ReadingMode::Romaji),
            other => Err(anyhow!(
                "unknown reading type '{}' (expected hiragana, katakana or romaji)",
                other
            )),
        }
    }
}

pub fn is_kanji(ch: char) -> bool {
    matches!(
        ch,
        '\u{3400}'..='\u{4DBF}'
            | '\u{4E00}'..='\u{9FFF}'
            | '\u{F900}'..='\u{FAFF}'
            | '\u{20000}'..='\u{2EBEF}'
            | '\u{2F800}'..='\u{2FA1F}'
            | '\u{30000}'..='\u{323AF}'
    )
}

pub fn is_japanese_char(ch: char) -> bool {
    matches!(ch, '\u{3040}'..='\u{30FF}') || is_kanji(ch)
}

pub fn has_japanese(text: &str) -> bool {
    text.chars().any(is_japanese_char)
}

pub fn is_annotatable(text: &str) -> bool {
    text.chars()
        .any(|ch| is_japanese_char(ch) || ch.is_ascii_digit())
}

pub fn to_hiragana(text: &str) -> String {
    text.to_hiragana()
}

pub fn convert(text: &str, mode: ReadingMode) -> String {
    match mode {
        ReadingMode::Hiragana => text.to_hiragana(),
        ReadingMode::Katakana => text.to_katakana(),
        ReadingMode::Romaji => text.to_romaji(),
    }
}
