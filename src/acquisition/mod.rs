//! Page acquisition: the fetch-service boundary and the snapshot store.
//!
//! The modeler never talks to the network directly; it goes through the
//! [`FetchService`] trait so tests can substitute canned documents and a
//! future deployment can plug in a script-executing renderer. The bundled
//! implementation is plain HTTP.

pub mod http_client;
pub mod snapshot;

use async_trait::async_trait;
use http_client::HttpClient;
use thiserror::Error;
use tracing::debug;

/// A successfully fetched page, pre-parse.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL as requested.
    pub url: String,
    /// URL after redirects.
    pub final_url: String,
    pub status: u16,
    pub html: String,
}

/// Why a fetch failed. All variants are treated as transient by the modeler:
/// the page is dropped from its batch and never retried.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("transport error fetching {url}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("non-HTML response for {url} ({content_type})")]
    NonHtml { url: String, content_type: String },
}

/// Resolves a URL to a parsed-ready document, following redirects and
/// reporting the post-redirect URL.
#[async_trait]
pub trait FetchService: Send + Sync {
    async fn fetch(&self, url: &str, use_script: bool) -> Result<FetchedPage, FetchError>;
}

/// Plain-HTTP fetch service.
pub struct HttpFetcher {
    client: HttpClient,
    timeout_ms: u64,
}

impl HttpFetcher {
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            client: HttpClient::new(timeout_ms),
            timeout_ms,
        }
    }
}

#[async_trait]
impl FetchService for HttpFetcher {
    async fn fetch(&self, url: &str, use_script: bool) -> Result<FetchedPage, FetchError> {
        if use_script {
            debug!(url, "script execution unavailable over plain HTTP; fetching static DOM");
        }
        let resp = self
            .client
            .get(url, self.timeout_ms)
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        if !(200..300).contains(&resp.status) {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: resp.status,
            });
        }
        if let Some(ct) = &resp.content_type {
            if !ct.contains("html") {
                return Err(FetchError::NonHtml {
                    url: url.to_string(),
                    content_type: ct.clone(),
                });
            }
        }

        Ok(FetchedPage {
            url: resp.url,
            final_url: resp.final_url,
            status: resp.status,
            html: resp.body,
        })
    }
}
