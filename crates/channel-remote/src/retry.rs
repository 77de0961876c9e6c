//! Bounded retry with a fixed backoff for remote HTTP calls.
//!
//! Transport errors, `429` and `5xx` responses are retried. Every other
//! response is handed back to the caller on the first attempt.

use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use crate::error::{RemoteError, RemoteResult};

/// How many times to try a request and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; values below one are treated as one.
    pub max_attempts: u32,
    /// Fixed delay between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(10),
        }
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Send a request built by `f`, retrying transient failures.
///
/// On exhaustion the last transport error, or the last transient status, is
/// returned as a `RemoteError`.
pub async fn send_with_retry<F, Fut>(
    policy: RetryPolicy,
    uri: &str,
    f: F,
) -> RemoteResult<reqwest::Response>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        let error = match f().await {
            Ok(response) if !is_transient(response.status()) => return Ok(response),
            Ok(response) => RemoteError::Status {
                uri: uri.to_string(),
                status: response.status().as_u16(),
            },
            Err(e) => RemoteError::http(uri, e),
        };
        if attempt < attempts {
            warn!(
                uri,
                attempt,
                max_attempts = attempts,
                error = %error,
                "request failed, retrying in {:?}",
                policy.backoff
            );
            tokio::time::sleep(policy.backoff).await;
        }
        last_error = Some(error);
    }
    Err(last_error.unwrap_or_else(|| RemoteError::Http {
        uri: uri.to_string(),
        message: "no attempts made".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn retry_exhausts_all_attempts_on_transport_failure() {
        let call_count = Arc::new(AtomicU32::new(0));
        let cc = call_count.clone();
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        };

        let result = send_with_retry(policy, "http://127.0.0.1:1/", || {
            let cc = cc.clone();
            async move {
                cc.fetch_add(1, Ordering::SeqCst);
                // closed port, connection refused
                reqwest::Client::builder()
                    .timeout(Duration::from_millis(50))
                    .build()
                    .unwrap()
                    .get("http://127.0.0.1:1/")
                    .send()
                    .await
            }
        })
        .await;

        assert!(matches!(result, Err(RemoteError::Http { .. })));
        assert_eq!(call_count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_transient_statuses() {
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_transient(StatusCode::NOT_FOUND));
        assert!(!is_transient(StatusCode::OK));
    }
}
