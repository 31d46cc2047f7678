use crate::constants::protocols::ALLOWED_HTTP;
use crate::services::endpoint::{render_scalar, ResolvedRequest};
use crate::services::mapping::HttpMethod;
use async_trait::async_trait;
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("downstream service unavailable: {0}")]
    Unavailable(String),

    #[error("downstream request timed out")]
    Timeout,

    #[error("downstream response body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("invalid downstream url: {0}")]
    InvalidUrl(String),
}

/// A downstream answer. `body` is the parsed JSON, when the payload parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamResponse {
    pub status: u16,
    pub body: Option<Value>,
    pub text: String,
}

impl UpstreamResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            text: body.to_string(),
            body: Some(body),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Issues one HTTP request. Implementations must release any pooled
/// connection on every return path and stop work when the future is dropped.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(
        &self,
        request: &ResolvedRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, TransportError>;
}

#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    base_url: Url,
    client: Client,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, pool_max_idle_per_host: usize) -> Result<Self, TransportError> {
        let base_url = parse_base_url(base_url)?;
        let client = Client::builder()
            .pool_max_idle_per_host(pool_max_idle_per_host)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|err| {
                TransportError::Unavailable(format!("failed to build HTTP client: {}", err))
            })?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL joined with the resolved path, keeping any base path prefix.
    pub fn build_url(&self, request: &ResolvedRequest) -> Result<Url, TransportError> {
        let mut url = self.base_url.clone();
        let prefix = url.path().trim_end_matches('/').to_string();
        let suffix = request.path.trim_start_matches('/');
        url.set_path(&format!("{}/{}", prefix, suffix));

        if !request.query.is_empty() {
            let pairs: Vec<(&str, String)> = request
                .query
                .iter()
                .map(|(key, value)| (key.as_str(), render_scalar(value)))
                .collect();
            let encoded = serde_urlencoded::to_string(&pairs)
                .map_err(|err| TransportError::InvalidUrl(err.to_string()))?;
            url.set_query(Some(&encoded));
        }
        Ok(url)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(
        &self,
        request: &ResolvedRequest,
        timeout: Duration,
    ) -> Result<UpstreamResponse, TransportError> {
        let url = self.build_url(request)?;
        let mut req = self
            .client
            .request(to_reqwest_method(request.method), url)
            .header(reqwest::header::ACCEPT, "application/json")
            .timeout(timeout);
        if let Some(body) = &request.body {
            req = req.json(body);
        }

        let response = req.send().await.map_err(map_reqwest_error)?;
        let status = response.status().as_u16();
        // Reading the body to the end hands the connection back to the pool.
        let bytes = response.bytes().await.map_err(map_reqwest_error)?;
        let text = String::from_utf8_lossy(&bytes).to_string();

        let body = if text.trim().is_empty() {
            None
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(parsed) => Some(parsed),
                Err(err) if (200..300).contains(&status) => {
                    return Err(TransportError::MalformedBody(err.to_string()))
                }
                Err(_) => None,
            }
        };

        Ok(UpstreamResponse { status, body, text })
    }
}

fn to_reqwest_method(method: HttpMethod) -> Method {
    match method {
        HttpMethod::Get => Method::GET,
        HttpMethod::Post => Method::POST,
        HttpMethod::Put => Method::PUT,
        HttpMethod::Delete => Method::DELETE,
    }
}

pub(crate) fn map_reqwest_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        return TransportError::Timeout;
    }
    TransportError::Unavailable(err.to_string())
}

pub fn parse_base_url(raw: &str) -> Result<Url, TransportError> {
    let parsed =
        Url::parse(raw.trim()).map_err(|err| TransportError::InvalidUrl(format!("{}: {}", raw, err)))?;
    if !scheme_allowed(parsed.scheme()) {
        return Err(TransportError::InvalidUrl(format!(
            "{}: only http/https URLs are supported",
            raw
        )));
    }
    Ok(parsed)
}

fn scheme_allowed(scheme: &str) -> bool {
    let normalized = scheme.trim_end_matches(':');
    ALLOWED_HTTP
        .iter()
        .any(|allowed| allowed.trim_end_matches(':') == normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn request(path: &str, query: Value) -> ResolvedRequest {
        ResolvedRequest {
            method: HttpMethod::Get,
            path: path.to_string(),
            query: query.as_object().cloned().unwrap_or_else(Map::new),
            body: None,
        }
    }

    #[test]
    fn build_url_joins_base_and_encodes_query() {
        let transport = ReqwestTransport::new("http://localhost:8080", 4).expect("transport");
        let url = transport
            .build_url(&request(
                "/api/products/search",
                json!({"query": "gaming laptop", "limit": 5}),
            ))
            .expect("url");
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/products/search?limit=5&query=gaming+laptop"
        );
    }

    #[test]
    fn build_url_keeps_base_path_prefix() {
        let transport = ReqwestTransport::new("http://svc.local/v2/", 4).expect("transport");
        let url = transport
            .build_url(&request("/api/products/1", json!({})))
            .expect("url");
        assert_eq!(url.as_str(), "http://svc.local/v2/api/products/1");
    }

    #[test]
    fn build_url_preserves_escaped_path_segments() {
        let transport = ReqwestTransport::new("http://svc.local", 4).expect("transport");
        let url = transport
            .build_url(&request("/api/categories/a%20b%2Fc", json!({})))
            .expect("url");
        assert_eq!(url.path(), "/api/categories/a%20b%2Fc");
    }

    #[test]
    fn rejects_non_http_base_urls() {
        assert!(matches!(
            ReqwestTransport::new("ftp://files.local", 1),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            ReqwestTransport::new("not a url", 1),
            Err(TransportError::InvalidUrl(_))
        ));
    }
}
