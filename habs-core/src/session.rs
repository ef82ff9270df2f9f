//! An explicitly scoped HTTP session: one middleware-wrapped `reqwest::Client`
//! with an optional disk cache, and a retry policy for transport-level hiccups.
//!
//! A session is built at the start of a command and dropped at its end;
//! nothing about it is global.

use crate::cache::{disk_cache, CacheExpiry, MaxAgeOverride};
use crate::error::RetrievalError;
use log::{debug, info, warn};
use reqwest::{Client, Response, StatusCode};
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Transport-level retries, independent of the window fallback.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRetryPolicy {
    /// Retries after the first attempt.
    pub retries: u32,
    /// Back-off before retry `n` is `backoff_factor * 2^(n-1)` seconds.
    pub backoff_factor: f64,
    pub timeout_secs: u64,
}

impl Default for HttpRetryPolicy {
    fn default() -> Self {
        Self {
            retries: 5,
            backoff_factor: 0.2,
            timeout_secs: 120,
        }
    }
}

impl HttpRetryPolicy {
    pub fn delay_before(&self, retry: u32) -> Duration {
        let factor = self.backoff_factor.max(0.0) * 2f64.powi(retry.saturating_sub(1) as i32);
        Duration::try_from_secs_f64(factor).unwrap_or(Duration::ZERO)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503 | 504)
}

pub struct HttpSession {
    client: ClientWithMiddleware,
    policy: HttpRetryPolicy,
}

impl HttpSession {
    /// Build a session; responses are cached under `cache_dir` when given.
    pub fn new(policy: HttpRetryPolicy, cache_dir: Option<&Path>) -> Result<Self, RetrievalError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(policy.timeout_secs))
            .build()
            .map_err(|e| RetrievalError::Network {
                url: String::new(),
                message: format!("failed to build HTTP client: {e}"),
            })?;
        let builder = reqwest_middleware::ClientBuilder::new(client);
        let client = match cache_dir {
            Some(dir) => {
                debug!("Caching HTTP responses under {}", dir.display());
                builder.with(disk_cache(dir)).with(MaxAgeOverride).build()
            }
            None => builder.build(),
        };
        Ok(Self { client, policy })
    }

    /// Send the request produced by `build` without touching the cache.
    pub async fn send<F>(&self, url: &str, build: F) -> Result<Response, RetrievalError>
    where
        F: Fn(&ClientWithMiddleware) -> RequestBuilder,
    {
        self.send_cached(url, CacheExpiry::Bypass, build).await
    }

    /// Send the request produced by `build`, retrying transport errors and
    /// retryable statuses. Other non-success statuses fail immediately.
    pub async fn send_cached<F>(
        &self,
        url: &str,
        expiry: CacheExpiry,
        build: F,
    ) -> Result<Response, RetrievalError>
    where
        F: Fn(&ClientWithMiddleware) -> RequestBuilder,
    {
        let max_tries = self.policy.retries + 1;
        let mut last_error = None;
        for attempt in 1..=max_tries {
            match expiry.apply(build(&self.client)).send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let err = RetrievalError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    };
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    warn!("Attempt {}/{}: {}", attempt, max_tries, err);
                    last_error = Some(err);
                }
                Err(e) => {
                    warn!("Attempt {}/{}: request to {} failed: {}", attempt, max_tries, url, e);
                    last_error = Some(RetrievalError::Network {
                        url: url.to_string(),
                        message: e.to_string(),
                    });
                }
            }

            if attempt < max_tries {
                let delay = self.policy.delay_before(attempt);
                info!("Sleeping for {:?} before retrying {}", delay, url);
                tokio::time::sleep(delay).await;
            }
        }
        Err(last_error.unwrap_or_else(|| RetrievalError::Network {
            url: url.to_string(),
            message: "no attempt was made".to_string(),
        }))
    }

    /// GET `url` as text, served from the cache when `expiry` allows it.
    pub async fn get_text(&self, url: &str, expiry: CacheExpiry) -> Result<String, RetrievalError> {
        let response = self.send_cached(url, expiry, |client| client.get(url)).await?;
        response.text().await.map_err(|e| RetrievalError::Network {
            url: url.to_string(),
            message: format!("failed to read response body: {e}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn backoff_doubles_from_factor() {
        let policy = HttpRetryPolicy::default();
        assert_eq!(policy.delay_before(1), Duration::from_millis(200));
        assert_eq!(policy.delay_before(2), Duration::from_millis(400));
        assert_eq!(policy.delay_before(3), Duration::from_millis(800));
    }

    #[test]
    fn only_transient_statuses_are_retried() {
        assert!(is_retryable(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retryable(StatusCode::BAD_REQUEST));
        assert!(!is_retryable(StatusCode::UNAUTHORIZED));
    }

    /// Local HTTP/1.1 server answering every request with `headers` and a
    /// body naming the request count so far.
    async fn counting_server(headers: &'static str) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                let body = format!("hit {n}");
                let response = format!(
                    "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
                    body.len(),
                    headers,
                    body
                );
                stream.write_all(response.as_bytes()).await.unwrap();
                stream.shutdown().await.ok();
            }
        });
        (format!("http://{addr}/v1/archive"), hits)
    }

    #[tokio::test]
    async fn archive_responses_are_kept_despite_no_store() {
        let dir = tempfile::tempdir().unwrap();
        let (url, hits) = counting_server("Cache-Control: no-store\r\n").await;
        let session = HttpSession::new(HttpRetryPolicy::default(), Some(dir.path())).unwrap();
        assert_eq!(session.get_text(&url, CacheExpiry::Never).await.unwrap(), "hit 1");
        assert_eq!(session.get_text(&url, CacheExpiry::Never).await.unwrap(), "hit 1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        // A new session over the same directory still serves the stored body.
        let reopened = HttpSession::new(HttpRetryPolicy::default(), Some(dir.path())).unwrap();
        assert_eq!(reopened.get_text(&url, CacheExpiry::Never).await.unwrap(), "hit 1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn forecast_responses_are_fresh_for_their_lifetime() {
        let dir = tempfile::tempdir().unwrap();
        let (url, hits) = counting_server("Cache-Control: no-cache\r\n").await;
        let session = HttpSession::new(HttpRetryPolicy::default(), Some(dir.path())).unwrap();
        let hour = CacheExpiry::After(Duration::from_secs(3600));
        assert_eq!(session.get_text(&url, hour).await.unwrap(), "hit 1");
        assert_eq!(session.get_text(&url, hour).await.unwrap(), "hit 1");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn bypassed_requests_always_reach_the_server() {
        let dir = tempfile::tempdir().unwrap();
        let (url, hits) = counting_server("Cache-Control: max-age=3600\r\n").await;
        let session = HttpSession::new(HttpRetryPolicy::default(), Some(dir.path())).unwrap();
        assert_eq!(session.get_text(&url, CacheExpiry::Bypass).await.unwrap(), "hit 1");
        assert_eq!(session.get_text(&url, CacheExpiry::Bypass).await.unwrap(), "hit 2");
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn session_without_cache_dir_fetches_every_time() {
        let (url, hits) = counting_server("").await;
        let session = HttpSession::new(HttpRetryPolicy::default(), None).unwrap();
        session.get_text(&url, CacheExpiry::Never).await.unwrap();
        session.get_text(&url, CacheExpiry::Never).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
