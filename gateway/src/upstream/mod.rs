pub mod explorer;
pub mod registry;

pub use explorer::ExplorerClient;
pub use registry::RegistryClient;

use anyhow::{Context, Result};
use reqwest::{Client, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::FetchFailure;

/// Timeout-bounded JSON GET. One outbound call per invocation, no retries
/// and no caching; both belong to the callers.
#[derive(Clone)]
pub struct UpstreamClient {
    client: Client,
}

impl UpstreamClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("netrum-gateway/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build upstream HTTP client")?;

        Ok(Self { client })
    }

    pub async fn fetch_json(&self, url: Url, timeout: Duration) -> Result<Value, FetchFailure> {
        debug!("GET {} (timeout {:?})", url, timeout);

        let request = async {
            let resp = self
                .client
                .get(url.clone())
                .header("accept", "application/json")
                .send()
                .await
                .map_err(map_transport_error)?;

            let status = resp.status();
            if !status.is_success() {
                return Err(FetchFailure::UpstreamError {
                    status: status.as_u16(),
                });
            }

            let bytes = resp.bytes().await.map_err(map_transport_error)?;
            serde_json::from_slice::<Value>(&bytes)
                .map_err(|e| FetchFailure::invalid_body(e.to_string()))
        };

        // Dropping the request future on expiry cancels the in-flight call.
        let outcome = match tokio::time::timeout(timeout, request).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FetchFailure::Timeout),
        };

        if let Err(e) = &outcome {
            warn!("Upstream fetch failed: url={}, error={}", redact(&url), e);
        }
        outcome
    }
}

fn map_transport_error(e: reqwest::Error) -> FetchFailure {
    if e.is_timeout() {
        FetchFailure::Timeout
    } else if e.is_decode() || e.is_body() {
        FetchFailure::invalid_body(e.to_string())
    } else {
        FetchFailure::unreachable(e.without_url().to_string())
    }
}

/// Strip credentials from a URL before it reaches the logs.
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "apikey" { "***".to_string() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    if !pairs.is_empty() {
        url.query_pairs_mut().clear().extend_pairs(pairs);
    }
    url.to_string()
}

/// Append each non-empty segment to `base`, keeping any path prefix the
/// base already has. Segments are percent-encoded individually, so a `/`
/// inside an identifier never introduces a new path level.
pub(crate) fn join_segments<'a, I>(base: &Url, segments: I) -> Result<Url>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut joined = base.clone();
    {
        let mut path = joined
            .path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Base URL cannot carry a path: {}", base))?;
        path.pop_if_empty();
        for segment in segments.into_iter().filter(|s| !s.is_empty()) {
            path.push(segment);
        }
    }
    Ok(joined)
}

/// Join a `/`-separated path onto `base`.
pub(crate) fn join_url(base: &Url, path: &str) -> Result<Url> {
    join_segments(base, path.split('/'))
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::get, Json, Router};
    use serde_json::json;

    async fn mock() -> String {
        let router = Router::new()
            .route("/ok", get(|| async { Json(json!({"success": true, "value": 7})) }))
            .route("/broken", get(|| async { StatusCode::SERVICE_UNAVAILABLE }))
            .route("/garbage", get(|| async { "not json" }))
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Json(json!({}))
                }),
            );
        test_support::serve(router).await
    }

    fn url(base: &str, path: &str) -> Url {
        Url::parse(&format!("{}{}", base, path)).unwrap()
    }

    #[tokio::test]
    async fn test_success_returns_json() {
        let base = mock().await;
        let client = UpstreamClient::new().unwrap();
        let v = client
            .fetch_json(url(&base, "/ok"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(v["value"], 7);
    }

    #[tokio::test]
    async fn test_non_2xx_maps_to_upstream_error() {
        let base = mock().await;
        let client = UpstreamClient::new().unwrap();
        let err = client
            .fetch_json(url(&base, "/broken"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err, FetchFailure::UpstreamError { status: 503 });
    }

    #[tokio::test]
    async fn test_bad_body_maps_to_invalid_body() {
        let base = mock().await;
        let client = UpstreamClient::new().unwrap();
        let err = client
            .fetch_json(url(&base, "/garbage"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_body");
    }

    #[tokio::test]
    async fn test_slow_upstream_times_out() {
        let base = mock().await;
        let client = UpstreamClient::new().unwrap();
        let started = std::time::Instant::now();
        let err = client
            .fetch_json(url(&base, "/slow"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert_eq!(err, FetchFailure::Timeout);
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_refused_connection_maps_to_unreachable() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let client = UpstreamClient::new().unwrap();
        let err = client
            .fetch_json(
                url(&format!("http://127.0.0.1:{}", port), "/ok"),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "unreachable");
    }

    #[test]
    fn test_join_url_keeps_base_prefix() {
        let base = Url::parse("https://api.example.com/v2/api").unwrap();
        assert_eq!(
            join_url(&base, "/lite/nodes/id/netrum.lite.a").unwrap().as_str(),
            "https://api.example.com/v2/api/lite/nodes/id/netrum.lite.a"
        );

        let root = Url::parse("https://node.netrumlabs.dev").unwrap();
        assert_eq!(
            join_url(&root, "/lite/nodes/stats").unwrap().as_str(),
            "https://node.netrumlabs.dev/lite/nodes/stats"
        );
    }

    #[test]
    fn test_join_segments_encodes_slashes() {
        let base = Url::parse("https://node.netrumlabs.dev").unwrap();
        let url = join_segments(&base, ["claim", "status", "a/b"]).unwrap();
        assert_eq!(url.as_str(), "https://node.netrumlabs.dev/claim/status/a%2Fb");
    }

    #[test]
    fn test_redact_hides_api_key() {
        let u = Url::parse("https://x.test/api?module=stats&apikey=secret").unwrap();
        let shown = redact(&u);
        assert!(!shown.contains("secret"));
        assert!(shown.contains("module=stats"));
    }
}
