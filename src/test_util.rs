use anyhow::anyhow;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::services::dictionary::{DictionaryEntry, Sense};
use crate::services::{DictionaryService, ServiceFuture, TokenizerService};
use crate::token::Token;

pub(crate) fn tokens_for(text: &str, entries: &[(&str, &str, &str)]) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut cursor = 0usize;
    let mut tokens = Vec::new();
    for (surface, reading, pos) in entries {
        let needle: Vec<char> = surface.chars().collect();
        let found = (cursor..=chars.len().saturating_sub(needle.len()))
            .find(|start| chars[*start..*start + needle.len()] == needle[..])
            .expect("surface present in text");
        tokens.push(token(surface, reading, pos, found));
        cursor = found + needle.len();
    }
    tokens
}

pub(crate) fn token(surface: &str, reading: &str, pos: &str, offset: usize) -> Token {
    Token {
        surface: surface.to_string(),
        reading: reading.to_string(),
        lemma: surface.to_string(),
        pos: pos.to_string(),
        offset,
        is_japanese: true,
        ..Token::default()
    }
}

// Greedy longest-match tokenizer over a fixed lexicon; unknown chars become
// single-char tokens without reading.
pub(crate) struct FakeTokenizer {
    lexicon: Vec<(String, String, String)>,
    calls: AtomicUsize,
    fail: bool,
}

impl FakeTokenizer {
    pub(crate) fn new(lexicon: &[(&str, &str, &str)]) -> Self {
        let mut lexicon: Vec<(String, String, String)> = lexicon
            .iter()
            .map(|(s, r, p)| (s.to_string(), r.to_string(), p.to_string()))
            .collect();
        lexicon.sort_by_key(|(surface, _, _)| std::cmp::Reverse(surface.chars().count()));
        Self {
            lexicon,
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn tokenize(&self, text: &str) -> Vec<Token> {
        let chars: Vec<char> = text.chars().collect();
        let mut tokens = Vec::new();
        let mut index = 0;
        while index < chars.len() {
            let rest: String = chars[index..].iter().collect();
            let matched = self
                .lexicon
                .iter()
                .find(|(surface, _, _)| rest.starts_with(surface.as_str()));
            match matched {
                Some((surface, reading, pos)) => {
                    tokens.push(token(surface, reading, pos, index));
                    index += surface.chars().count();
                }
                None => {
                    let surface = chars[index].to_string();
                    let mut unknown = token(&surface, "", "X", index);
                    unknown.is_japanese = false;
                    tokens.push(unknown);
                    index += 1;
                }
            }
        }
        tokens
    }
}

impl TokenizerService for FakeTokenizer {
    fn tokenize_batch<'a>(&'a self, texts: &'a [String]) -> ServiceFuture<'a, Vec<Vec<Token>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(anyhow!("tokenizer unavailable"));
            }
            Ok(texts.iter().map(|text| self.tokenize(text)).collect())
        })
    }
}

pub(crate) struct FakeDictionary {
    entries: Vec<DictionaryEntry>,
    pub(crate) lookups: Mutex<Vec<String>>,
}

impl FakeDictionary {
    pub(crate) fn new(entries: Vec<DictionaryEntry>) -> Self {
        Self {
            entries,
            lookups: Mutex::new(Vec::new()),
        }
    }
}

impl DictionaryService for FakeDictionary {
    fn lookup<'a>(&'a self, word: &'a str) -> ServiceFuture<'a, Vec<DictionaryEntry>> {
        Box::pin(async move {
            if let Ok(mut lookups) = self.lookups.lock() {
                lookups.push(word.to_string());
            }
            if self.entries.is_empty() {
                return Err(anyhow!("dictionary unavailable"));
            }
            Ok(self.entries.clone())
        })
    }
}

pub(crate) fn entry(slug: &str, reading: &str, definitions: &[&str]) -> DictionaryEntry {
    DictionaryEntry {
        slug: slug.to_string(),
        reading: reading.to_string(),
        senses: vec![Sense {
            english_definitions: definitions.iter().map(|d| d.to_string()).collect(),
            parts_of_speech: vec!["Noun".to_string()],
        }],
    }
}

pub(crate) fn lexicon() -> Vec<(&'static str, &'static str, &'static str)> {
    vec![
        ("日本語", "ニホンゴ", "NOUN"),
        ("勉強", "ベンキョウ", "NOUN"),
        ("し", "シ", "AUX"),
        ("ます", "マス", "AUX"),
        ("を", "ヲ", "ADP"),
        ("食べる", "タベル", "VERB"),
        ("猫", "ネコ", "NOUN"),
        ("が", "ガ", "ADP"),
        ("好き", "スキ", "ADJ"),
        ("です", "デス", "AUX"),
        ("東京", "トウキョウ", "PROPN"),
        ("に", "ニ", "ADP"),
        ("行く", "イク", "VERB"),
    ]
}
