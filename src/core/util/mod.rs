use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderMap, HeaderName, HeaderValue, Method, Request, Response,
};
use serde::Serialize;
use tracing::debug;

use crate::{
    error::ServerError,
    logging::{MetricsEvent, MetricsLogger},
    trace::{Trace, TRACEPARENT_HEADER},
};

/// Generic HTTP client.
///
/// A trait is used here so to facilitate native HTTP/TLS when compiled for mobile applications.
#[async_trait]
pub trait AsyncHttpClient: Send + Sync {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>>;
}

pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

const SUCCESS_STATUSES: [u16; 100] = {
    let mut statuses = [0; 100];
    let mut i = 0;
    while i < statuses.len() {
        statuses[i] = 200 + i as u16;
        i += 1;
    }
    statuses
};

/// Every 2xx status, for endpoints where any success will do.
pub(crate) const SUCCESS: &[u16] = &SUCCESS_STATUSES;

/// Settings for [ReqwestClient].
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout. `Some(Duration::ZERO)` and `None` both disable the timeout.
    pub timeout: Option<Duration>,
    /// Accept any TLS certificate. Only meant for tests against local servers.
    pub disable_tls_verification: bool,
    /// Headers added to every request.
    pub additional_headers: Vec<(String, String)>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Some(DEFAULT_HTTP_TIMEOUT),
            disable_tls_verification: false,
            additional_headers: Vec::new(),
        }
    }
}

#[derive(Debug)]
pub struct ReqwestClient(reqwest::Client);

impl AsRef<reqwest::Client> for ReqwestClient {
    fn as_ref(&self) -> &reqwest::Client {
        &self.0
    }
}

impl ReqwestClient {
    pub fn new() -> Result<Self> {
        Self::with_config(&HttpClientConfig::default())
    }

    pub fn with_config(config: &HttpClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        for (name, value) in &config.additional_headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())
                    .with_context(|| format!("invalid header name '{name}'"))?,
                HeaderValue::from_str(value)
                    .with_context(|| format!("invalid value for header '{name}'"))?,
            );
        }

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .default_headers(headers)
            .danger_accept_invalid_certs(config.disable_tls_verification);

        if let Some(timeout) = config.timeout.filter(|t| !t.is_zero()) {
            builder = builder.timeout(timeout);
        }

        builder
            .build()
            .context("unable to build http_client")
            .map(Self)
    }
}

#[async_trait]
impl AsyncHttpClient for ReqwestClient {
    async fn execute(&self, request: Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let response = self
            .0
            .execute(request.try_into().context("unable to convert request")?)
            .await
            .context("http request failed")?;

        let mut builder = Response::builder()
            .status(response.status())
            .version(response.version());

        builder
            .extensions_mut()
            .context("unable to set extensions")?
            .extend(response.extensions().clone());

        builder
            .headers_mut()
            .context("unable to set headers")?
            .extend(response.headers().clone());

        builder
            .body(
                response
                    .bytes()
                    .await
                    .context("failed to extract response body")?
                    .to_vec(),
            )
            .context("unable to construct response")
    }
}

pub(crate) fn base_request(trace: &Trace) -> http::request::Builder {
    Request::builder().header(TRACEPARENT_HEADER, trace.traceparent())
}

/// Describes one outbound call for metrics and error reporting.
pub(crate) struct Call<'a> {
    /// Metrics event text, e.g. "Fetch token via an HTTP POST request to ...".
    pub event: String,
    pub parent_event: &'a str,
    /// Human name of the remote endpoint, used in error messages.
    pub endpoint: &'a str,
    /// Status codes treated as success.
    pub accept: &'a [u16],
}

/// Sends requests through the host's [AsyncHttpClient], tagging them with the
/// interaction's trace and reporting their duration to the metrics sink.
#[derive(Clone, Copy)]
pub(crate) struct Transport<'a> {
    pub client: &'a dyn AsyncHttpClient,
    pub metrics: &'a dyn MetricsLogger,
    pub trace: &'a Trace,
}

impl<'a> Transport<'a> {
    pub fn new(
        client: &'a dyn AsyncHttpClient,
        metrics: &'a dyn MetricsLogger,
        trace: &'a Trace,
    ) -> Self {
        Self {
            client,
            metrics,
            trace,
        }
    }

    pub async fn get(&self, url: &str, call: Call<'_>) -> Result<Vec<u8>> {
        let request = base_request(self.trace)
            .method(Method::GET)
            .uri(url)
            .body(vec![])
            .context("failed to build GET request")?;

        self.send(request, call).await
    }

    pub async fn post_json(
        &self,
        url: &str,
        body: &impl Serialize,
        bearer: Option<&str>,
        call: Call<'_>,
    ) -> Result<Vec<u8>> {
        let body = serde_json::to_vec(body).context("failed to serialize request body")?;

        let mut builder = base_request(self.trace)
            .method(Method::POST)
            .uri(url)
            .header(CONTENT_TYPE, "application/json");

        if let Some(token) = bearer {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = builder.body(body).context("failed to build POST request")?;

        self.send(request, call).await
    }

    pub async fn post_form(
        &self,
        url: &str,
        body: &impl Serialize,
        call: Call<'_>,
    ) -> Result<Vec<u8>> {
        let body = serde_urlencoded::to_string(body).context("failed to encode form body")?;

        let request = base_request(self.trace)
            .method(Method::POST)
            .uri(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body.into_bytes())
            .context("failed to build POST request")?;

        self.send(request, call).await
    }

    pub async fn send(&self, request: Request<Vec<u8>>, call: Call<'_>) -> Result<Vec<u8>> {
        let uri = request.uri().to_string();
        debug!(method = %request.method(), %uri, "sending request");

        let started = Instant::now();
        let response = self
            .client
            .execute(request)
            .await
            .with_context(|| format!("request to {} failed", call.endpoint))?;

        self.metrics.log(&MetricsEvent {
            event: call.event,
            parent_event: call.parent_event.to_owned(),
            duration: started.elapsed(),
        });

        let status = response.status().as_u16();
        let body = response.into_body();

        if !call.accept.contains(&status) {
            debug!(%uri, status, "unexpected response status");
            return Err(ServerError::from_response(status, call.endpoint, &body).into());
        }

        Ok(body)
    }
}
