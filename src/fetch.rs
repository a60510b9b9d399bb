//! Out-of-band download of stylesheets the page itself is not allowed to read.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::config::FetchConfig;
use crate::{ExtractError, Result};

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    #[error("network error fetching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("timed out after {timeout:?} fetching {url}")]
    Timeout { url: String, timeout: Duration },

    #[error("invalid stylesheet URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// Fetches raw stylesheet text by URL.
///
/// Implementations report non-2xx responses and transport failures as
/// [`FetchError`]s; they never panic.
#[async_trait]
pub trait StylesheetFetcher: Send + Sync {
    async fn fetch(&self, url: &Url) -> std::result::Result<String, FetchError>;
}

/// Resolves a stylesheet `href` against the page URL.
pub fn resolve_href(page_url: Option<&str>, href: &str) -> std::result::Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::InvalidUrl {
        url: href.to_string(),
        reason,
    };
    match Url::parse(href) {
        Ok(url) => Ok(url),
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = page_url
                .ok_or_else(|| invalid("relative URL and the page URL is unknown".to_string()))?;
            Url::parse(base)
                .and_then(|base| base.join(href))
                .map_err(|e| invalid(e.to_string()))
        }
        Err(e) => Err(invalid(e.to_string())),
    }
}

/// Runs `fetcher` under a deadline.
pub async fn fetch_with_timeout(
    fetcher: &dyn StylesheetFetcher,
    url: &Url,
    timeout: Duration,
) -> std::result::Result<String, FetchError> {
    match tokio::time::timeout(timeout, fetcher.fetch(url)).await {
        Ok(result) => result,
        Err(_) => Err(FetchError::Timeout {
            url: url.to_string(),
            timeout,
        }),
    }
}

/// HTTP(S) fetcher backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()
            .map_err(ExtractError::Network)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StylesheetFetcher for HttpFetcher {
    async fn fetch(&self, url: &Url) -> std::result::Result<String, FetchError> {
        let network = |source: reqwest::Error| FetchError::Network {
            url: url.to_string(),
            source,
        };
        tracing::debug!(%url, "fetching stylesheet");
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "text/css,*/*;q=0.1")
            .send()
            .await
            .map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.text().await.map_err(network)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fetcher() -> HttpFetcher {
        HttpFetcher::new(&FetchConfig {
            user_agent: "pse-test".into(),
            ..FetchConfig::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn returns_body_of_successful_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/site.css"))
            .and(header("user-agent", "pse-test"))
            .respond_with(ResponseTemplate::new(200).set_body_string(".a{color:red}"))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/site.css", server.uri())).unwrap();
        assert_eq!(fetcher().fetch(&url).await.unwrap(), ".a{color:red}");
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/missing.css", server.uri())).unwrap();
        match fetcher().fetch(&url).await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_responses_time_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("body{}")
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let url = Url::parse(&format!("{}/slow.css", server.uri())).unwrap();
        let err = fetch_with_timeout(&fetcher(), &url, Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Timeout { .. }));
    }

    #[tokio::test]
    async fn unreachable_host_is_a_network_error() {
        let url = Url::parse("http://127.0.0.1:9/x.css").unwrap();
        let err = fetcher().fetch(&url).await.unwrap_err();
        assert!(matches!(err, FetchError::Network { .. }));
    }

    #[test]
    fn relative_hrefs_resolve_against_the_page() {
        let url = resolve_href(Some("https://example.com/a/page.html"), "../css/x.css").unwrap();
        assert_eq!(url.as_str(), "https://example.com/css/x.css");
        assert!(matches!(
            resolve_href(None, "x.css"),
            Err(FetchError::InvalidUrl { .. })
        ));
    }
}
