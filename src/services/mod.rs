use anyhow::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::config::Config;
use crate::token::Token;

pub mod dictionary;
mod retry;
pub mod tokenizer;

pub use dictionary::{DictionaryEntry, JishoDictionary};
pub use tokenizer::HttpTokenizer;

pub type ServiceFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

// Morphological analysis of a batch of paragraphs, one token array per input.
pub trait TokenizerService: Send + Sync {
    fn tokenize_batch<'a>(&'a self, texts: &'a [String]) -> ServiceFuture<'a, Vec<Vec<Token>>>;
}

pub trait DictionaryService: Send + Sync {
    fn lookup<'a>(&'a self, word: &'a str) -> ServiceFuture<'a, Vec<DictionaryEntry>>;
}

#[derive(Clone)]
pub struct Services {
    pub tokenizer: Arc<dyn TokenizerService>,
    pub dictionary: Arc<dyn DictionaryService>,
}

impl Services {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            tokenizer: Arc::new(HttpTokenizer::new(&config.tokenizer_url, config.timeout)?),
            dictionary: Arc::new(JishoDictionary::new(&config.dictionary_url, config.timeout)?),
        })
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim().trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
