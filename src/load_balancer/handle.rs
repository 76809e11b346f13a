//! Proxy handle: the capability to reach one backend.
//!
//! A handle is created from the backend identifier when the backend is
//! first added to the pool, and moves between the load balancer and the
//! circuit breaker for the rest of its life. Cloning is cheap; all handles
//! share one connection-pooling client.

use std::str::FromStr;
use std::time::Duration;

use axum::body::Body;
use axum::http::uri::{Authority, Scheme};
use axum::http::{header, Method, Request, Response, StatusCode, Uri};
use hyper::body::Incoming;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;
use url::Url;

use crate::error::{PoolError, PoolResult};

/// Client shared by every handle.
pub type HttpClient = Client<HttpConnector, Body>;

/// Build the shared upstream client.
pub fn build_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build(HttpConnector::new())
}

/// Errors from forwarding a request through a handle.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("failed to build upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),
}

#[derive(Debug, Clone)]
pub struct ProxyHandle {
    target: Url,
    authority: Authority,
    base_path: String,
    client: HttpClient,
}

impl ProxyHandle {
    /// Parse `target` as an `http://host[:port][/base]` URL.
    pub fn new(target: &str, client: HttpClient) -> PoolResult<Self> {
        let invalid = |reason: String| PoolError::InvalidTarget {
            target: target.to_string(),
            reason,
        };

        let url = Url::parse(target).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| invalid("missing host".to_string()))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let authority =
            Authority::from_str(&format!("{host}:{port}")).map_err(|e| invalid(e.to_string()))?;
        let base_path = url.path().trim_end_matches('/').to_string();

        Ok(Self {
            target: url,
            authority,
            base_path,
            client,
        })
    }

    pub fn target(&self) -> &Url {
        &self.target
    }

    /// Rewrite `uri` so it points at this backend, keeping path and query
    /// below the backend's base path.
    pub fn upstream_uri(&self, uri: &Uri) -> Result<Uri, axum::http::Error> {
        let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        self.uri_for(path_and_query)
    }

    fn uri_for(&self, path_and_query: &str) -> Result<Uri, axum::http::Error> {
        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(format!("{}{}", self.base_path, path_and_query))
            .build()
    }

    /// Send `request` to the backend and return its response unbuffered.
    pub async fn forward(&self, request: Request<Body>) -> Result<Response<Incoming>, ForwardError> {
        let (mut parts, body) = request.into_parts();
        parts.uri = self.upstream_uri(&parts.uri)?;
        let response = self
            .client
            .request(Request::from_parts(parts, body))
            .await?;
        Ok(response)
    }

    /// Issue a bodiless GET to `path` and report the status code, or `None`
    /// if no status could be observed within `timeout`.
    pub async fn probe(&self, path: &str, timeout: Duration) -> Option<StatusCode> {
        let request = match self.uri_for(path).and_then(|uri| {
            Request::builder()
                .method(Method::GET)
                .uri(uri)
                .header(header::USER_AGENT, "self-healing-proxy-probe")
                .body(Body::empty())
        }) {
            Ok(req) => req,
            Err(e) => {
                tracing::error!(backend = %self.target, error = %e, "Failed to build probe request");
                return None;
            }
        };

        match tokio::time::timeout(timeout, self.client.request(request)).await {
            Ok(Ok(response)) => Some(response.status()),
            Ok(Err(e)) => {
                tracing::debug!(backend = %self.target, error = %e, "Probe failed: connection error");
                None
            }
            Err(_) => {
                tracing::debug!(backend = %self.target, "Probe failed: timeout");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(target: &str) -> PoolResult<ProxyHandle> {
        ProxyHandle::new(target, build_client())
    }

    #[test]
    fn test_rewrites_authority_and_keeps_query() {
        let h = handle("http://127.0.0.1:3000").unwrap();
        let uri: Uri = "/items?page=2".parse().unwrap();
        assert_eq!(
            h.upstream_uri(&uri).unwrap().to_string(),
            "http://127.0.0.1:3000/items?page=2"
        );
    }

    #[test]
    fn test_joins_base_path() {
        let h = handle("http://backend.local/api/").unwrap();
        let uri: Uri = "/v1/users".parse().unwrap();
        assert_eq!(
            h.upstream_uri(&uri).unwrap().to_string(),
            "http://backend.local:80/api/v1/users"
        );
    }

    #[test]
    fn test_rejects_unusable_targets() {
        for target in ["not a url", "127.0.0.1:3000", "https://secure.local", "http://"] {
            assert!(
                matches!(handle(target), Err(PoolError::InvalidTarget { .. })),
                "{target} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_probe_unreachable_backend_reports_nothing() {
        // Port 9 (discard) is not expected to run an HTTP server.
        let h = handle("http://127.0.0.1:9").unwrap();
        assert_eq!(h.probe("/", Duration::from_millis(200)).await, None);
    }
}
