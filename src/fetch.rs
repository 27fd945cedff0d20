use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, HeaderMap, HeaderValue, PRAGMA};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid module url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },
    #[error("request for {url} failed: {reason}")]
    Transport { url: String, reason: String },
}

/// Retrieves payload text for a module URL.
#[async_trait]
pub trait ModuleFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

fn parse_module_url(url: &str) -> Result<url::Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: url.to_string(),
        reason,
    };
    if url.trim().is_empty() {
        return Err(invalid("empty url".into()));
    }
    let parsed = url::Url::parse(url).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

/// Fetches over HTTP(S) without credentials and with caching disabled.
#[derive(Clone)]
pub struct HttpModuleFetcher {
    client: reqwest::Client,
}

impl HttpModuleFetcher {
    pub fn new(timeout: Option<Duration>) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("shadow-umd/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl ModuleFetcher for HttpModuleFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let parsed = parse_module_url(url)?;
        let transport = |err: reqwest::Error| FetchError::Transport {
            url: url.to_string(),
            reason: err.to_string(),
        };
        let resp = self.client.get(parsed).send().await.map_err(transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let body = resp.text().await.map_err(transport)?;
        debug!(%url, bytes = body.len(), "fetched module payload");
        Ok(body)
    }
}

/// Serves payloads from memory; URLs it does not know answer 404.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct StaticModuleFetcher {
    modules: std::collections::HashMap<String, String>,
}

#[cfg(test)]
impl StaticModuleFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, url: impl Into<String>, source: impl Into<String>) -> Self {
        self.modules.insert(url.into(), source.into());
        self
    }
}

#[cfg(test)]
#[async_trait]
impl ModuleFetcher for StaticModuleFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.modules.get(url).cloned().ok_or_else(|| FetchError::Status {
            status: 404,
            url: url.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::get;
    use std::net::SocketAddr;

    async fn spawn_payload_server() -> SocketAddr {
        let app = Router::new()
            .route(
                "/hello.umd.js",
                get(|| async { "window.RemoteComponent = function () { return 'hi' };" }),
            )
            .route(
                "/headers",
                get(|headers: HeaderMap| async move {
                    let cache = headers
                        .get("cache-control")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    let cookie = headers.contains_key("cookie");
                    format!("{cache}|{cookie}")
                }),
            )
            .route("/boom", get(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn fetches_payload_text() {
        let addr = spawn_payload_server().await;
        let fetcher = HttpModuleFetcher::new(None).unwrap();
        let body = fetcher
            .fetch(&format!("http://{addr}/hello.umd.js"))
            .await
            .unwrap();
        assert!(body.contains("RemoteComponent"));
    }

    #[tokio::test]
    async fn sends_no_cache_and_no_credentials() {
        let addr = spawn_payload_server().await;
        let fetcher = HttpModuleFetcher::new(None).unwrap();
        let body = fetcher.fetch(&format!("http://{addr}/headers")).await.unwrap();
        assert_eq!(body, "no-cache|false");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let addr = spawn_payload_server().await;
        let fetcher = HttpModuleFetcher::new(None).unwrap();
        let url = format!("http://{addr}/missing.js");
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert_eq!(err.to_string(), format!("HTTP 404 for {url}"));

        let url = format!("http://{addr}/boom");
        let err = fetcher.fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Status { status: 500, .. }));
    }

    #[tokio::test]
    async fn connection_refused_is_a_transport_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let fetcher = HttpModuleFetcher::new(Some(Duration::from_secs(2))).unwrap();
        let err = fetcher.fetch(&format!("http://{addr}/x.js")).await.unwrap_err();
        assert!(matches!(err, FetchError::Transport { .. }));
    }

    #[tokio::test]
    async fn rejects_empty_and_non_http_urls() {
        let fetcher = HttpModuleFetcher::new(None).unwrap();
        for url in ["", "   ", "not a url", "file:///etc/passwd"] {
            let err = fetcher.fetch(url).await.unwrap_err();
            assert!(matches!(err, FetchError::InvalidUrl { .. }), "{url}: {err}");
        }
    }

    #[tokio::test]
    async fn static_fetcher_answers_404_for_unknown_urls() {
        let fetcher = StaticModuleFetcher::new().with_module("mem://a", "1");
        assert_eq!(fetcher.fetch("mem://a").await.unwrap(), "1");
        assert!(matches!(
            fetcher.fetch("mem://b").await,
            Err(FetchError::Status { status: 404, .. })
        ));
    }
}
