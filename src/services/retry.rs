use anyhow::{Result, anyhow};
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

pub(crate) const RATE_LIMIT_MAX_RETRIES: usize = 5;
pub(crate) const RATE_LIMIT_BASE_DELAY: Duration = Duration::from_secs(2);
pub(crate) const RATE_LIMIT_MAX_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub(crate) max_retries: usize,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: RATE_LIMIT_MAX_RETRIES,
            base_delay: RATE_LIMIT_BASE_DELAY,
            max_delay: RATE_LIMIT_MAX_DELAY,
        }
    }
}

pub(crate) fn is_rate_limited(status: StatusCode, body: &str) -> bool {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let code = status.as_u16();
    if code == 529 || code == 503 {
        return true;
    }
    let lower = body.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("too many requests")
}

pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let value = headers.get("retry-after")?.to_str().ok()?.trim();
    if value.is_empty() {
        return None;
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub(crate) async fn send_with_retry<F>(service: &str, policy: RetryPolicy, build: F) -> Result<String>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0usize;
    let mut delay = policy.base_delay;
    loop {
        attempt += 1;
        let response = build()
            .send()
            .await
            .map_err(|err| anyhow!("{} request failed: {}", service, err))?;
        let status = response.status();
        let retry_after = retry_after(response.headers());
        let text = response.text().await.unwrap_or_default();
        if status.is_success() {
            return Ok(text);
        }
        if is_rate_limited(status, &text) && attempt < policy.max_retries {
            delay = wait_with_backoff(service, &policy, attempt, delay, retry_after).await;
            continue;
        }
        return Err(anyhow!("{} error ({}): {}", service, status, text.trim()));
    }
}

async fn wait_with_backoff(
    service: &str,
    policy: &RetryPolicy,
    attempt: usize,
    delay: Duration,
    retry_after: Option<Duration>,
) -> Duration {
    let mut wait = delay;
    if let Some(retry_after) = retry_after
        && retry_after > wait
    {
        wait = retry_after.min(policy.max_delay);
    }
    warn!(
        "{} rate limited; retrying in {:.1}s (attempt {}/{})",
        service,
        wait.as_secs_f32(),
        attempt,
        policy.max_retries
    );
    sleep(wait).await;
    next_delay(policy, delay)
}

fn next_delay(policy: &RetryPolicy, current: Duration) -> Duration {
    current
        .saturating_mul(2)
        .max(policy.base_delay)
        .min(policy.max_delay)
}
