//! External API clients and the HTTP plumbing they share.

use std::future::Future;
use std::sync::OnceLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::error::MedMatchError;

pub mod cerebras;
pub(crate) mod rate_limit;
pub mod registry;

const ERROR_BODY_MAX_CHARS: usize = 200;
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 8 * 1024 * 1024;

static HTTP_CLIENT: OnceLock<ClientWithMiddleware> = OnceLock::new();

pub(crate) fn parse_retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    // Retry-After is interpreted as integer seconds when present.
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn retry_sleep_duration(attempt: u32, retry_after_floor: Option<Duration>) -> Duration {
    let backoff = Duration::from_secs(1_u64 << attempt.min(6));
    match retry_after_floor {
        Some(floor) if floor > backoff => floor,
        _ => backoff,
    }
}

/// Returns the shared HTTP client with rate-limit middleware.
///
/// - Timeout: 30 s per request, 10 s connect
/// - Rate limiting: per-upstream sliding windows (see `rate_limit`)
pub(crate) fn shared_client() -> Result<ClientWithMiddleware, MedMatchError> {
    if let Some(client) = HTTP_CLIENT.get() {
        return Ok(client.clone());
    }

    let base_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("medmatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(MedMatchError::HttpClientInit)?;

    let client = ClientBuilder::new(base_client)
        .with(rate_limit::RateLimitMiddleware::new())
        .build();

    match HTTP_CLIENT.set(client.clone()) {
        Ok(()) => Ok(client),
        Err(_) => HTTP_CLIENT
            .get()
            .cloned()
            .ok_or_else(|| MedMatchError::Api {
                api: "http-client".into(),
                message: "Shared HTTP client initialization race".into(),
            }),
    }
}

/// Central retry wrapper shared by the registry and LLM clients.
///
/// `build_request` is invoked on each attempt so request bodies can be
/// reconstructed safely. Status classification:
///
/// - 429: retried, honouring `Retry-After` as a sleep floor; exhaustion
///   surfaces `RateLimit` with the last advertised delay
/// - 5xx: retried with exponential backoff (2^attempt seconds)
/// - timeouts and connect failures: retried
/// - anything else (including 4xx): returned to the caller unretried
pub(crate) async fn retry_send<F, Fut>(
    api: &str,
    max_retries: u32,
    build_request: F,
) -> Result<reqwest::Response, MedMatchError>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<reqwest::Response, reqwest_middleware::Error>>,
{
    let total_attempts = max_retries.saturating_add(1);
    let mut last_server_status: Option<reqwest::StatusCode> = None;
    let mut last_retry_after: Option<Duration> = None;
    let mut timed_out = false;
    let mut last_transport_err: Option<reqwest::Error> = None;

    for attempt in 0..total_attempts {
        let mut retry_after_floor = None;
        match build_request().await {
            Ok(resp)
                if resp.status().is_server_error()
                    || resp.status() == reqwest::StatusCode::TOO_MANY_REQUESTS =>
            {
                let status = resp.status();
                if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                    retry_after_floor = parse_retry_after_header(resp.headers());
                    last_retry_after = retry_after_floor;
                }
                last_server_status = Some(status);
            }
            Ok(resp) => return Ok(resp),
            Err(reqwest_middleware::Error::Reqwest(err))
                if err.is_timeout() || err.is_connect() =>
            {
                timed_out = err.is_timeout();
                last_transport_err = Some(err);
            }
            Err(err) => return Err(err.into()),
        }

        if attempt + 1 < total_attempts {
            tokio::time::sleep(retry_sleep_duration(attempt, retry_after_floor)).await;
        }
    }

    if last_server_status == Some(reqwest::StatusCode::TOO_MANY_REQUESTS) {
        return Err(MedMatchError::RateLimit {
            api: api.to_string(),
            retry_after: last_retry_after.map(|d| d.as_secs()),
        });
    }

    if let Some(status) = last_server_status {
        return Err(MedMatchError::Api {
            api: api.to_string(),
            message: format!("HTTP {status} after {total_attempts} attempts"),
        });
    }

    if timed_out {
        return Err(MedMatchError::Timeout {
            api: api.to_string(),
            attempts: total_attempts,
        });
    }

    if let Some(err) = last_transport_err {
        return Err(MedMatchError::Http(err));
    }

    Err(MedMatchError::Api {
        api: api.to_string(),
        message: format!("All retry attempts exhausted after {total_attempts} attempts"),
    })
}

/// Trimmed single-line excerpt of an error body, capped at 200 characters.
pub(crate) fn body_excerpt(bytes: &[u8]) -> String {
    let full = String::from_utf8_lossy(bytes);
    let flattened = full.trim().replace(['\n', '\r', '\t'], " ");

    let mut excerpt: String = flattened.chars().take(ERROR_BODY_MAX_CHARS).collect();
    if flattened.chars().count() > ERROR_BODY_MAX_CHARS {
        excerpt.push('…');
    }
    excerpt
}

pub(crate) async fn read_limited_body(
    mut resp: reqwest::Response,
    api: &str,
) -> Result<Vec<u8>, MedMatchError> {
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = resp.chunk().await? {
        let next_len = body.len().saturating_add(chunk.len());
        if next_len > DEFAULT_MAX_BODY_BYTES {
            return Err(MedMatchError::Api {
                api: api.to_string(),
                message: format!("Response body exceeded {DEFAULT_MAX_BODY_BYTES} bytes"),
            });
        }
        body.extend_from_slice(&chunk);
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn parse_retry_after_header_parses_integer_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, reqwest::header::HeaderValue::from_static("2"));
        assert_eq!(
            parse_retry_after_header(&headers),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn retry_sleep_duration_uses_retry_after_as_floor() {
        assert_eq!(
            retry_sleep_duration(0, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
        assert_eq!(
            retry_sleep_duration(2, Some(Duration::from_secs(1))),
            Duration::from_secs(4)
        );
        assert_eq!(retry_sleep_duration(1, None), Duration::from_secs(2));
    }

    #[test]
    fn body_excerpt_caps_at_200_chars_and_flattens() {
        let long = "x".repeat(500);
        let excerpt = body_excerpt(long.as_bytes());
        assert_eq!(excerpt.chars().count(), 201);
        assert!(excerpt.ends_with('…'));

        let multiline = body_excerpt(b"line one\nline two");
        assert_eq!(multiline, "line one line two");
    }

    #[tokio::test]
    async fn retry_send_retries_on_too_many_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/retry"))
            .and(query_param("attempt", "0"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/retry"))
            .and(query_param("attempt", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .expect(1)
            .mount(&server)
            .await;

        let client = shared_client().expect("shared client");
        let url = format!("{}/retry", server.uri());
        let attempts = Arc::new(AtomicUsize::new(0));
        let resp = retry_send("test-api", 2, {
            let client = client.clone();
            let url = url.clone();
            let attempts = attempts.clone();
            move || {
                let client = client.clone();
                let url = url.clone();
                let attempts = attempts.clone();
                async move {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                    client
                        .get(&url)
                        .query(&[("attempt", attempt.to_string())])
                        .send()
                        .await
                }
            }
        })
        .await
        .expect("retry_send should retry on 429");

        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn retry_send_fails_fast_on_client_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/bad"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad request"))
            .expect(1)
            .mount(&server)
            .await;

        let client = shared_client().expect("shared client");
        let url = format!("{}/bad", server.uri());
        let resp = retry_send("test-api", 3, {
            let client = client.clone();
            let url = url.clone();
            move || {
                let client = client.clone();
                let url = url.clone();
                async move { client.get(&url).send().await }
            }
        })
        .await
        .expect("4xx responses are returned, not retried");

        assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn retry_send_surfaces_rate_limit_after_exhaustion() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/limited"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .expect(2)
            .mount(&server)
            .await;

        let client = shared_client().expect("shared client");
        let url = format!("{}/limited", server.uri());
        let err = retry_send("test-api", 1, {
            let client = client.clone();
            let url = url.clone();
            move || {
                let client = client.clone();
                let url = url.clone();
                async move { client.get(&url).send().await }
            }
        })
        .await
        .expect_err("exhausted 429 retries should error");

        match err {
            MedMatchError::RateLimit { api, retry_after } => {
                assert_eq!(api, "test-api");
                assert_eq!(retry_after, Some(1));
            }
            other => panic!("expected RateLimit, got {other:?}"),
        }
    }
}
