use tracing::warn;

use crate::messages::{LookupReply, Request, Response, TokenizeReply};
use crate::services::Services;

#[derive(Clone)]
pub struct Background {
    services: Services,
}

impl Background {
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    pub async fn handle(&self, request: &Request) -> Option<Response> {
        match request {
            Request::TokenizeParagraphs { paragraphs } => {
                Some(Response::Tokenize(self.tokenize(paragraphs).await))
            }
            Request::JishoLookup { word } => Some(Response::Lookup(self.lookup(word).await)),
            _ => None,
        }
    }

    pub async fn tokenize(&self, paragraphs: &[String]) -> TokenizeReply {
        match self.services.tokenizer.tokenize_batch(paragraphs).await {
            Ok(tokens) => TokenizeReply {
                ok: true,
                tokens: Some(tokens),
                err: None,
            },
            Err(err) => {
                warn!("tokenization failed: {:#}", err);
                TokenizeReply {
                    ok: false,
                    tokens: None,
                    err: Some(format!("{:#}", err)),
                }
            }
        }
    }

    pub async fn lookup(&self, word: &str) -> LookupReply {
        match self.services.dictionary.lookup(word).await {
            Ok(entries) => LookupReply {
                ok: true,
                data: Some(entries),
                err: None,
            },
            Err(err) => {
                warn!("dictionary lookup for '{}' failed: {:#}", word, err);
                LookupReply {
                    ok: false,
                    data: None,
                    err: Some(format!("{:#}", err)),
                }
            }
        }
    }
}
