//! 429 backoff policy shared by the OpenAI-compatible HTTP providers.
//!
//! Delay for a rate-limited retry is derived, in order, from a standard
//! `Retry-After` header, a "retry in Xs" hint in the response body, or
//! exponential backoff — each capped at [`MAX_DELAY_SECS`].

use std::time::Duration;

use reqwest::Response;

const BASE_DELAY_SECS: u64 = 2;
const MAX_DELAY_SECS: u64 = 90;

/// Plain exponential backoff for retry number `attempt` (1-based): 2s, 4s,
/// 8s, ... capped at 90s. Used for transport failures and non-429 retries
/// that carry no server-provided hint.
pub fn exponential_backoff(attempt: u32) -> Duration {
    let secs = BASE_DELAY_SECS.saturating_mul(1_u64 << attempt.saturating_sub(1).min(63));
    Duration::from_secs(secs.min(MAX_DELAY_SECS))
}

/// Consumes a 429 response, returning the delay to honor before the next
/// attempt and the response body (so the caller can return it unchanged if
/// this turns out to be the final attempt).
pub async fn rate_limit_delay(response: Response, attempt: u32) -> (Duration, String) {
    let header_delay = retry_after_header(&response);
    let body = response.text().await.unwrap_or_default();
    if let Some(secs) = header_delay {
        return (Duration::from_secs(secs.min(MAX_DELAY_SECS)), body);
    }
    if let Some(secs) = retry_in_body(&body) {
        return (Duration::from_secs(secs.min(MAX_DELAY_SECS)), body);
    }
    (exponential_backoff(attempt), body)
}

fn retry_after_header(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// Matches a "retry in 12s" / "retry in 12 seconds" hint anywhere in a JSON
/// or plain-text error body.
fn retry_in_body(body: &str) -> Option<u64> {
    let lower = body.to_lowercase();
    let idx = lower.find("retry in ")?;
    let rest = lower[idx + "retry in ".len()..].trim_start();
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        assert_eq!(exponential_backoff(1), Duration::from_secs(2));
        assert_eq!(exponential_backoff(2), Duration::from_secs(4));
        assert_eq!(exponential_backoff(3), Duration::from_secs(8));
        assert_eq!(exponential_backoff(10), Duration::from_secs(90));
    }

    #[test]
    fn retry_in_body_parses_seconds_hint() {
        assert_eq!(retry_in_body(r#"{"error":"retry in 12s please"}"#), Some(12));
        assert_eq!(retry_in_body("please retry in 7 seconds"), Some(7));
        assert_eq!(retry_in_body("no hint here"), None);
    }
}
