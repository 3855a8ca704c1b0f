use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::retry::{RetryPolicy, send_with_retry};
use super::{DictionaryService, ServiceFuture, join_url};

const SEARCH_PATH: &str = "api/v1/search/words";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    pub slug: String,
    pub reading: String,
    pub senses: Vec<Sense>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sense {
    #[serde(default)]
    pub english_definitions: Vec<String>,
    #[serde(default)]
    pub parts_of_speech: Vec<String>,
}

pub fn best_match(entries: Vec<DictionaryEntry>) -> Result<DictionaryEntry> {
    entries
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("No definition found."))
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchWord>,
}

#[derive(Deserialize)]
struct SearchWord {
    #[serde(default)]
    slug: String,
    #[serde(default)]
    japanese: Vec<SearchForm>,
    #[serde(default)]
    senses: Vec<Sense>,
}

#[derive(Deserialize)]
struct SearchForm {
    word: Option<String>,
    reading: Option<String>,
}

impl From<SearchWord> for DictionaryEntry {
    fn from(word: SearchWord) -> Self {
        let form = word.japanese.into_iter().next();
        let reading = form
            .as_ref()
            .and_then(|form| form.reading.clone())
            .unwrap_or_else(|| word.slug.clone());
        let slug = if word.slug.is_empty() {
            form.and_then(|form| form.word).unwrap_or_default()
        } else {
            word.slug
        };
        Self {
            slug,
            reading,
            senses: word.senses,
        }
    }
}

// Jisho-style word search: `GET {base}/api/v1/search/words?keyword=`.
#[derive(Clone)]
pub struct JishoDictionary {
    client: reqwest::Client,
    endpoint: String,
    policy: RetryPolicy,
}

impl JishoDictionary {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build dictionary client")?;
        Ok(Self {
            client,
            endpoint: join_url(base_url, SEARCH_PATH),
            policy: RetryPolicy::default(),
        })
    }

    async fn search(&self, word: &str) -> Result<Vec<DictionaryEntry>> {
        let keyword = word.trim();
        if keyword.is_empty() {
            return Err(anyhow!("lookup word is empty"));
        }
        debug!("looking up '{}'", keyword);
        let text = send_with_retry("dictionary", self.policy, || {
            self.client
                .get(&self.endpoint)
                .query(&[("keyword", keyword)])
        })
        .await?;
        let response: SearchResponse =
            serde_json::from_str(&text).with_context(|| "dictionary returned invalid JSON")?;
        Ok(response.data.into_iter().map(DictionaryEntry::from).collect())
    }
}

impl DictionaryService for JishoDictionary {
    fn lookup<'a>(&'a self, word: &'a str) -> ServiceFuture<'a, Vec<DictionaryEntry>> {
        Box::pin(self.search(word))
    }
}
