//! Retrying HTTP transport built on a single shared `reqwest::Client`.
//!
//! Retries cover connection failures, timeouts and the statuses in
//! [`RETRY_STATUSES`], for every method including POST. When retries run out
//! on a retryable status the last response is returned as-is, so callers see
//! the real status and body rather than a synthetic error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use crate::config::TransportConfig;
use crate::contract::{HttpRequest, HttpResponse, MultipartForm, RequestBody, Transport};
use crate::error::TransportError;

pub const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before retry `n` is `backoff_factor * 2^(n-1)`.
    pub backoff_factor: Duration,
    /// Upper bound for a server-supplied `Retry-After`.
    pub max_retry_after: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 4,
            backoff_factor: Duration::from_millis(1500),
            max_retry_after: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.backoff_factor.saturating_mul(2_u32.pow(exponent))
    }

    /// Wait before retry number `retry` (1-based) after `response`.
    pub fn delay_for(&self, retry: u32, response: &HttpResponse) -> Duration {
        if matches!(response.status, 429 | 503) {
            if let Some(seconds) = response
                .header("retry-after")
                .and_then(|value| value.trim().parse::<u64>().ok())
            {
                return Duration::from_secs(seconds).min(self.max_retry_after);
            }
        }
        self.backoff(retry)
    }
}

/// Cheap to clone: clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, TransportError> {
        Self::with_retry_policy(config, config.retry_policy())
    }

    pub fn with_retry_policy(
        config: &TransportConfig,
        retry: RetryPolicy,
    ) -> Result<Self, TransportError> {
        if !config.verify_tls {
            warn!("TLS certificate verification is disabled");
        }
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()
            .map_err(|e| TransportError::Build {
                method: "-".to_string(),
                url: "-".to_string(),
                reason: error_chain(&e),
            })?;
        Ok(HttpTransport { client, retry })
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    fn prepare(&self, request: &HttpRequest) -> Result<reqwest::RequestBuilder, reqwest::Error> {
        let mut builder = self.client.request(request.method.clone(), &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(body),
            RequestBody::Multipart(form) => builder.multipart(to_reqwest_form(form)?),
        };
        Ok(builder)
    }

    async fn attempt(&self, request: &HttpRequest) -> Result<HttpResponse, reqwest::Error> {
        let response = self.prepare(request)?.send().await?;
        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = header_pairs(response.headers());
        let bytes = response.bytes().await?;
        Ok(HttpResponse {
            status,
            method: request.method.clone(),
            url,
            headers,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut retry = 0;
        loop {
            match self.attempt(&request).await {
                Ok(response) => {
                    if RETRY_STATUSES.contains(&response.status) && retry < self.retry.max_retries {
                        retry += 1;
                        let delay = self.retry.delay_for(retry, &response);
                        warn!(
                            method = %request.method,
                            url = %request.url,
                            status = response.status,
                            attempt = retry,
                            backoff_ms = delay.as_millis() as u64,
                            "Retryable status, retrying..."
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    debug!(
                        method = %request.method,
                        url = %request.url,
                        status = response.status,
                        attempts = retry + 1,
                        "Request completed"
                    );
                    return Ok(response);
                }
                Err(e) if is_transient(&e) && retry < self.retry.max_retries => {
                    retry += 1;
                    let delay = self.retry.backoff(retry);
                    warn!(
                        method = %request.method,
                        url = %request.url,
                        error = %e,
                        attempt = retry,
                        backoff_ms = delay.as_millis() as u64,
                        "Request failed, retrying..."
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(classify(&request, &e, retry + 1)),
            }
        }
    }
}

fn to_reqwest_form(form: &MultipartForm) -> Result<reqwest::multipart::Form, reqwest::Error> {
    let part = reqwest::multipart::Part::bytes(form.file.bytes.clone())
        .file_name(form.file.filename.clone())
        .mime_str(&form.file.mime)?;
    let mut multipart = reqwest::multipart::Form::new();
    for (name, value) in &form.fields {
        multipart = multipart.text(name.clone(), value.clone());
    }
    Ok(multipart.part(form.file.field.clone(), part))
}

fn header_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}

fn is_transient(error: &reqwest::Error) -> bool {
    !error.is_builder()
        && !error.is_redirect()
        && (error.is_connect() || error.is_timeout() || error.is_request() || error.is_body())
}

fn classify(request: &HttpRequest, error: &reqwest::Error, attempts: u32) -> TransportError {
    let method = request.method.to_string();
    let url = request.url.clone();
    let message = error_chain(error);
    if error.is_builder() {
        TransportError::Build {
            method,
            url,
            reason: message,
        }
    } else if error.is_timeout() {
        TransportError::Timeout {
            method,
            url,
            attempts,
            message,
        }
    } else if error.is_connect() {
        TransportError::Connect {
            method,
            url,
            attempts,
            message,
        }
    } else {
        TransportError::Network {
            method,
            url,
            attempts,
            message,
        }
    }
}

/// reqwest's top-level message rarely names the cause; walk the chain.
fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
