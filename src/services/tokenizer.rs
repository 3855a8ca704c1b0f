use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::retry::{RetryPolicy, send_with_retry};
use super::{ServiceFuture, TokenizerService, join_url};
use crate::token::Token;

const TOKENIZE_PATH: &str = "tokenize_batch";

#[derive(Clone)]
pub struct HttpTokenizer {
    client: reqwest::Client,
    endpoint: String,
    policy: RetryPolicy,
}

#[derive(Serialize)]
struct TokenizeItem<'a> {
    text: &'a str,
}

#[derive(Debug)]
struct PreparedText<'a> {
    index: usize,
    text: &'a str,
    leading: usize,
}

impl HttpTokenizer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .with_context(|| "failed to build tokenizer client")?;
        Ok(Self {
            client,
            endpoint: join_url(base_url, TOKENIZE_PATH),
            policy: RetryPolicy::default(),
        })
    }

    #[cfg(test)]
    fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<Token>>> {
        let prepared = prepare(texts);
        if prepared.is_empty() {
            debug!("nothing to tokenize; skipping request");
            return Ok(vec![Vec::new(); texts.len()]);
        }
        let body: Vec<TokenizeItem<'_>> = prepared
            .iter()
            .map(|item| TokenizeItem { text: item.text })
            .collect();
        debug!("tokenizing {} paragraphs via {}", body.len(), self.endpoint);
        let text = send_with_retry("tokenizer", self.policy, || {
            self.client.post(&self.endpoint).json(&body)
        })
        .await?;
        let rows: Vec<Value> =
            serde_json::from_str(&text).with_context(|| "tokenizer returned invalid JSON")?;
        if rows.len() != prepared.len() {
            warn!(
                "tokenizer returned {} rows for {} paragraphs",
                rows.len(),
                prepared.len()
            );
        }
        Ok(realign(texts.len(), &prepared, rows))
    }
}

impl TokenizerService for HttpTokenizer {
    fn tokenize_batch<'a>(&'a self, texts: &'a [String]) -> ServiceFuture<'a, Vec<Vec<Token>>> {
        Box::pin(self.request(texts))
    }
}

fn prepare(texts: &[String]) -> Vec<PreparedText<'_>> {
    texts
        .iter()
        .enumerate()
        .filter_map(|(index, text)| {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return None;
            }
            let leading = text.chars().count() - text.trim_start().chars().count();
            Some(PreparedText {
                index,
                text: trimmed,
                leading,
            })
        })
        .collect()
}

// Places each returned row at its input index and shifts offsets back to the
// untrimmed text. Rows or tokens that do not parse are dropped.
fn realign(count: usize, prepared: &[PreparedText<'_>], rows: Vec<Value>) -> Vec<Vec<Token>> {
    let mut result = vec![Vec::new(); count];
    for (item, row) in prepared.iter().zip(rows) {
        let Value::Array(values) = row else {
            warn!("tokenizer row for paragraph {} is not an array", item.index);
            continue;
        };
        let mut tokens = Vec::with_capacity(values.len());
        for value in values {
            match serde_json::from_value::<Token>(value) {
                Ok(mut token) => {
                    token.offset += item.leading;
                    tokens.push(token);
                }
                Err(err) => debug!("dropping malformed token in paragraph {}: {}", item.index, err),
            }
        }
        result[item.index] = tokens;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Json;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{}/", addr)
    }

    fn quick_policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn trims_inputs_and_realigns_results() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let recorded = seen.clone();
        let router = Router::new().route(
            "/tokenize_batch",
            post(move |Json(items): Json<Vec<Value>>| {
                let recorded = recorded.clone();
                async move {
                    let mut rows = Vec::new();
                    for item in items {
                        let text = item["text"].as_str().unwrap_or_default().to_string();
                        let first: String = text.chars().take(1).collect();
                        recorded.lock().expect("lock").push(text);
                        rows.push(json!([
                            {"surface": first, "reading": "x", "pos": "NOUN", "offset": 0},
                            {"offset": 1}
                        ]));
                    }
                    Json(Value::Array(rows))
                }
            }),
        );
        let base = serve(router).await;
        let tokenizer = HttpTokenizer::new(&base, Duration::from_secs(5)).expect("client");

        let texts = vec!["  猫です".to_string(), "   ".to_string(), "犬".to_string()];
        let result = tokenizer.tokenize_batch(&texts).await.expect("tokenize");

        assert_eq!(
            *seen.lock().expect("lock"),
            vec!["猫です".to_string(), "犬".to_string()]
        );
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].len(), 1);
        assert_eq!(result[0][0].surface, "猫");
        assert_eq!(result[0][0].offset, 2);
        assert!(result[1].is_empty());
        assert_eq!(result[2][0].offset, 0);
    }

    #[tokio::test]
    async fn short_responses_leave_missing_rows_empty() {
        let router = Router::new().route(
            "/tokenize_batch",
            post(|| async { Json(json!([[{"surface": "猫", "offset": 0}]])) }),
        );
        let base = serve(router).await;
        let tokenizer = HttpTokenizer::new(&base, Duration::from_secs(5)).expect("client");
        let texts = vec!["猫".to_string(), "犬".to_string(), "鳥".to_string()];
        let result = tokenizer.tokenize_batch(&texts).await.expect("tokenize");
        assert_eq!(result.len(), 3);
        assert_eq!(result[0][0].surface, "猫");
        assert!(result[1].is_empty());
        assert!(result[2].is_empty());
    }

    #[tokio::test]
    async fn blank_batch_skips_the_request() {
        let tokenizer =
            HttpTokenizer::new("http://127.0.0.1:9/", Duration::from_secs(1)).expect("client");
        let texts = vec![" ".to_string(), String::new()];
        let result = tokenizer.tokenize_batch(&texts).await.expect("tokenize");
        assert_eq!(result, vec![Vec::<Token>::new(), Vec::new()]);
    }

    #[tokio::test]
    async fn retries_rate_limited_responses() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let router = Router::new().route(
            "/tokenize_batch",
            post(move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                        return (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response();
                    }
                    Json(json!([[{"surface": "猫", "offset": 0}]])).into_response()
                }
            }),
        );
        let base = serve(router).await;
        let tokenizer = HttpTokenizer::new(&base, Duration::from_secs(5))
            .expect("client")
            .with_policy(quick_policy());
        let result = tokenizer
            .tokenize_batch(&["猫".to_string()])
            .await
            .expect("tokenize");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(result[0][0].surface, "猫");
    }

    #[tokio::test]
    async fn server_errors_are_reported() {
        let router = Router::new().route(
            "/tokenize_batch",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = serve(router).await;
        let tokenizer = HttpTokenizer::new(&base, Duration::from_secs(5)).expect("client");
        let err = tokenizer
            .tokenize_batch(&["猫".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("tokenizer error (500"));
    }
}
