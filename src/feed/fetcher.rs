use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

const MAX_RETRIES: u32 = 3;
/// First retry delay; doubles on each further retry (1s, 2s, 4s).
const BASE_RETRY_DELAY: Duration = Duration::from_secs(1);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const USER_AGENT: &str = concat!("podcast-ingest/", env!("CARGO_PKG_VERSION"));
const ACCEPT: &str = "application/rss+xml, application/xml, text/xml";

/// Errors that can occur while downloading feed markup.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the 30-second timeout
    #[error("Request timed out")]
    Timeout,
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body is not valid UTF-8
    #[error("Invalid UTF-8 in feed response")]
    InvalidUtf8,
    /// Body was empty or whitespace only
    #[error("Feed response was empty")]
    Empty,
}

/// Downloads feed markup as text.
///
/// # Behavior
///
/// - Each request has a 30-second timeout
/// - Rate limiting (HTTP 429) and server errors (5xx) trigger exponential
///   backoff (1s, 2s, 4s) with up to 3 retries
/// - Other non-2xx statuses fail immediately with [`FetchError::HttpStatus`]
/// - Response bodies are limited to 10MB
/// - A body shorter than its Content-Length is retried like a 5xx
///
/// # Errors
///
/// Returns [`FetchError`] for the cases above, plus [`FetchError::Empty`]
/// and [`FetchError::InvalidUtf8`] for unusable bodies.
pub async fn fetch_feed(client: &reqwest::Client, url: &str) -> Result<String, FetchError> {
    fetch_with_backoff(client, url, BASE_RETRY_DELAY).await
}

async fn fetch_with_backoff(
    client: &reqwest::Client,
    url: &str,
    base_delay: Duration,
) -> Result<String, FetchError> {
    let mut retry_count = 0;

    let bytes = loop {
        let request = client
            .get(url)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, ACCEPT);

        let response = tokio::time::timeout(REQUEST_TIMEOUT, request.send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            if retry_count >= MAX_RETRIES {
                return Err(if status.is_server_error() {
                    FetchError::HttpStatus(status.as_u16())
                } else {
                    FetchError::RateLimited(MAX_RETRIES)
                });
            }

            let delay = base_delay * (1u32 << retry_count);
            tracing::warn!(
                feed = %url,
                status = %status,
                retry = retry_count + 1,
                delay_ms = delay.as_millis() as u64,
                "Feed request failed, backing off"
            );

            tokio::time::sleep(delay).await;
            retry_count += 1;
            continue;
        }

        // 4xx errors fail immediately
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        match read_limited_bytes(response, MAX_FEED_SIZE).await {
            Ok(bytes) => break bytes,
            Err(FetchError::IncompleteResponse { expected, received })
                if retry_count < MAX_RETRIES =>
            {
                let delay = base_delay * (1u32 << retry_count);
                tracing::debug!(
                    feed = %url,
                    expected = expected,
                    received = received,
                    attempt = retry_count + 1,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying incomplete download"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
            }
            Err(e) => return Err(e),
        }
    };

    let text = String::from_utf8(bytes).map_err(|_| FetchError::InvalidUtf8)?;
    if text.trim().is_empty() {
        return Err(FetchError::Empty);
    }

    tracing::info!(feed = %url, bytes = text.len(), "Fetched feed");
    Ok(text)
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const VALID_RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
    <item><title>Test</title><link>https://example.com/1</link></item>
</channel></rss>"#;

    #[tokio::test]
    async fn test_fetch_success_sends_headers() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .and(header("accept", ACCEPT))
            .and(header("user-agent", USER_AGENT))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(VALID_RSS)
                    .insert_header("Content-Type", "application/rss+xml"),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let body = fetch_feed(&client, &format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert!(body.contains("<rss"));
    }

    #[tokio::test]
    async fn test_fetch_404_fails_without_retry() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_feed(&client, &format!("{}/feed", mock_server.uri())).await;
        match result.unwrap_err() {
            FetchError::HttpStatus(404) => {}
            e => panic!("Expected HttpStatus(404), got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_503_retry_then_success() {
        use wiremock::matchers::any;

        let mock_server = MockServer::start().await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(any())
            .respond_with(ResponseTemplate::new(200).set_body_string(VALID_RSS))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let body = fetch_feed(&client, &format!("{}/feed", mock_server.uri()))
            .await
            .unwrap();
        assert!(body.contains("<item>"));
    }

    #[tokio::test]
    async fn test_fetch_empty_body_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("  \n"))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_feed(&client, &format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::Empty)));
    }

    #[tokio::test]
    async fn test_fetch_invalid_utf8_is_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xff, 0xfe, 0x00]))
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result = fetch_feed(&client, &format!("{}/feed", mock_server.uri())).await;
        assert!(matches!(result, Err(FetchError::InvalidUtf8)));
    }

    // Real sockets and a paused clock do not mix (the request timeout would
    // fire on auto-advance), so retry exhaustion runs with a short base delay.
    const FAST_RETRY: Duration = Duration::from_millis(5);

    #[tokio::test]
    async fn test_fetch_429_exhausts_retries() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .expect(u64::from(MAX_RETRIES) + 1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_with_backoff(&client, &format!("{}/feed", mock_server.uri()), FAST_RETRY).await;
        match result.unwrap_err() {
            FetchError::RateLimited(n) => assert_eq!(n, MAX_RETRIES),
            e => panic!("Expected RateLimited, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_fetch_persistent_5xx_reports_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(u64::from(MAX_RETRIES) + 1)
            .mount(&mock_server)
            .await;

        let client = reqwest::Client::new();
        let result =
            fetch_with_backoff(&client, &format!("{}/feed", mock_server.uri()), FAST_RETRY).await;
        assert!(matches!(result, Err(FetchError::HttpStatus(502))));
    }
}
