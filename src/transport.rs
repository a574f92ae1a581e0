use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use url::Url;

use crate::descriptor::Method;
use crate::{Result, VpcError};

/// Fully rendered HTTP request handed to a [`Transport`].
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Vec<u8>>,
}

/// Raw HTTP response returned by a [`Transport`].
#[derive(Clone, Debug, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

/// Sends one HTTP exchange.
///
/// Implementations report connection-level failures as
/// [`VpcError::Transport`] and return every received response, whatever its
/// status, as `Ok`.
#[async_trait]
pub trait Transport: fmt::Debug + Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
    http: reqwest::Client,
    timeout: Duration,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration, disable_ssl_verification: bool, gzip: bool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(disable_ssl_verification)
            .gzip(gzip)
            .build()
            .map_err(|err| VpcError::Configuration(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, timeout })
    }

    /// Wraps an existing `reqwest` client.
    pub fn with_client(http: reqwest::Client, timeout: Duration) -> Self {
        Self { http, timeout }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self
            .http
            .request(request.method.to_reqwest(), request.url)
            .headers(request.headers)
            .timeout(self.timeout);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(VpcError::transport)?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(VpcError::transport)?;

        Ok(HttpResponse {
            status,
            headers,
            body: body.to_vec(),
        })
    }
}
