//! Remote posts API client with bounded retries

use ingest_common::types::Post;
use reqwest::{Client, StatusCode};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};
use url::Url;

use super::config::IngestionConfig;

/// Fetch failures. Every per-attempt kind is retried the same way.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("API returned status {0}")]
    Status(u16),

    #[error("failed to read response body: {0}")]
    Body(#[source] reqwest::Error),

    #[error("failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("failed after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },

    #[error("fetch cancelled")]
    Cancelled,
}

/// Linear backoff schedule: the wait after failed attempt `i` (zero-based)
/// is `(i + 1) * base_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    pub fn delay_after(&self, attempt_index: u32) -> Duration {
        self.base_delay.saturating_mul(attempt_index + 1)
    }
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached.
///
/// Both the attempt itself and the backoff wait race against `cancel`;
/// cancellation wins over any attempt error.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt_index = 0;

    loop {
        let result = tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let attempt = attempt_index + 1;
        if attempt >= max_attempts {
            return Err(FetchError::Exhausted {
                attempts: max_attempts,
                source: Box::new(err),
            });
        }

        let delay = policy.delay_after(attempt_index);
        warn!(
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Fetch attempt failed, retrying"
        );

        tokio::select! {
            _ = cancel.cancelled() => return Err(FetchError::Cancelled),
            _ = tokio::time::sleep(delay) => {},
        }

        attempt_index += 1;
    }
}

/// Polls the configured endpoint for the full array of posts
#[derive(Debug, Clone)]
pub struct PostFetcher {
    client: Client,
    endpoint: Url,
    policy: RetryPolicy,
}

impl PostFetcher {
    pub fn new(config: &IngestionConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("ingest-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Transport)?;

        Ok(Self {
            client,
            endpoint: config.api_endpoint.clone(),
            policy: RetryPolicy::new(config.retry_count, config.retry_base_delay),
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Fetch with retries; the whole array or nothing
    #[instrument(skip(self, cancel), fields(endpoint = %self.endpoint))]
    pub async fn fetch(&self, cancel: &CancellationToken) -> Result<Vec<Post>, FetchError> {
        retry_with_backoff(&self.policy, cancel, || self.fetch_once()).await
    }

    /// A single GET; anything but HTTP 200 with a JSON array of posts fails
    pub async fn fetch_once(&self) -> Result<Vec<Post>, FetchError> {
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(FetchError::Transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(FetchError::Body)?;
        let posts: Vec<Post> = serde_json::from_slice(&body)?;

        debug!(count = posts.len(), "Fetched posts");
        Ok(posts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const POSTS_JSON: &str = r#"[
        {"userId": 1, "id": 1, "title": "T1", "body": "B1"},
        {"userId": 1, "id": 2, "title": "T2", "body": "B2"}
    ]"#;

    fn fetcher_for(server: &MockServer, retry_count: u32) -> PostFetcher {
        let config = IngestionConfig {
            api_endpoint: Url::parse(&format!("{}/posts", server.uri())).unwrap(),
            request_timeout: Duration::from_secs(5),
            retry_count,
            retry_base_delay: Duration::from_millis(10),
            ..IngestionConfig::default()
        };
        PostFetcher::new(&config).unwrap()
    }

    /// Operation failing `failures` times before succeeding, counting calls
    fn flaky(
        failures: u32,
        calls: Arc<AtomicU32>,
    ) -> impl FnMut() -> std::future::Ready<Result<u32, FetchError>> {
        move || {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= failures {
                std::future::ready(Err(FetchError::Status(503)))
            } else {
                std::future::ready(Ok(call))
            }
        }
    }

    #[test]
    fn test_linear_backoff_schedule() {
        let policy = RetryPolicy::new(4, Duration::from_secs(1));
        let delays: Vec<_> = (0..3).map(|i| policy.delay_after(i)).collect();
        assert_eq!(
            delays,
            vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)]
        );
        assert_eq!(RetryPolicy::new(0, Duration::from_secs(1)).max_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let result = retry_with_backoff(&policy, &CancellationToken::new(), flaky(2, calls.clone()))
            .await
            .unwrap();

        assert_eq!(result, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // waits of 1s then 2s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3));
        assert!(elapsed < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_reports_attempt_count_when_exhausted() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = Arc::new(AtomicU32::new(0));
        let started = Instant::now();

        let err = retry_with_backoff(&policy, &CancellationToken::new(), flaky(10, calls.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 3, .. }));
        assert_eq!(err.to_string(), "failed after 3 attempts: API returned status 503");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // no wait after the final attempt
        assert!(started.elapsed() < Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_during_backoff_wins() {
        let policy = RetryPolicy::new(5, Duration::from_secs(10));
        let cancel = CancellationToken::new();
        let calls = Arc::new(AtomicU32::new(0));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = retry_with_backoff(&policy, &cancel, flaky(10, calls.clone()))
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_fetch_decodes_posts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/posts"))
            .respond_with(ResponseTemplate::new(200).set_body_string(POSTS_JSON))
            .mount(&server)
            .await;

        let posts = fetcher_for(&server, 3)
            .fetch(&CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(posts.len(), 2);
        assert_eq!(posts[0].title, "T1");
        assert_eq!(posts[1].id, 2);
    }

    #[tokio::test]
    async fn test_fetch_once_rejects_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 1).fetch_once().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(500)));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_fetch_once_rejects_malformed_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 1).fetch_once().await.unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn test_non_200_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 1).fetch_once().await.unwrap_err();
        assert!(matches!(err, FetchError::Status(204)));
    }

    #[tokio::test]
    async fn test_fetch_retries_until_exhausted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let err = fetcher_for(&server, 2)
            .fetch(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, FetchError::Exhausted { attempts: 2, .. }));
        server.verify().await;
    }
}
