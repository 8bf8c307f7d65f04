//! The request executor: one retry loop around `reqwest`.

use anyhow::{Context, Result, anyhow, bail};
use log::{debug, warn};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

use crate::agent::random_user_agent;
use crate::decode::{Decoded, decode};
use crate::request::ApiRequest;
use crate::retry::{MaxRetriesError, RetryPolicy, StatusError, backoff_delay};

/// Executes [`ApiRequest`]s against a remote API, applying the configured
/// [`RetryPolicy`] and decoding response bodies leniently.
///
/// Calls are independent of each other: nothing is shared between
/// invocations beyond the underlying connection pool, so the client can be
/// cloned and used concurrently.
#[derive(Clone, Default)]
pub struct ApiClient {
    client: Client,
    policy: RetryPolicy,
}

impl ApiClient {
    /// Creates an executor wrapping the given reqwest client.
    pub fn new(client: Client, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// Creates an executor with a fresh reqwest client.
    pub fn with_policy(policy: RetryPolicy) -> Self {
        Self::new(Client::new(), policy)
    }

    /// Returns a reference to the underlying reqwest client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends the request, retrying per the configured policy, and decodes
    /// the response body of the first successful attempt.
    #[tracing::instrument(skip(self, request))]
    pub async fn execute(&self, request: &ApiRequest) -> Result<Decoded> {
        let url = request.url()?;

        match self.policy {
            RetryPolicy::Backoff {
                max_retries,
                base_delay,
            } => {
                self.execute_backoff(request, &url, max_retries, base_delay)
                    .await
            }
            RetryPolicy::Forever => self.execute_forever(request, &url).await,
        }
    }

    /// Executes the request and deserializes the body into `T`. Only
    /// meaningful for endpoints known to answer with well-formed JSON.
    #[tracing::instrument(skip(self, request))]
    pub async fn execute_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T> {
        match self.execute(request).await? {
            Decoded::Json(value) => {
                serde_json::from_value(value).context("Failed to deserialize JSON response")
            }
            Decoded::Fragments(values) => serde_json::from_value(Value::Array(values))
                .context("Failed to deserialize multi-part JSON response"),
            Decoded::Text(text) => {
                bail!("Expected a JSON response, got plain text ({} bytes)", text.len())
            }
        }
    }

    /// Bounded retry: only 503 is retried, everything else surfaces
    /// immediately.
    async fn execute_backoff(
        &self,
        request: &ApiRequest,
        url: &Url,
        max_retries: usize,
        base_delay: Duration,
    ) -> Result<Decoded> {
        let mut attempt = 0;
        let mut last_error: Option<StatusError> = None;

        while attempt < max_retries {
            match self.send_once(request, url).await {
                Ok(decoded) => return Ok(decoded),
                Err(e) => match e.downcast::<StatusError>() {
                    Ok(status) if status.is_service_unavailable() => {
                        attempt += 1;
                        let delay = backoff_delay(attempt, base_delay);
                        warn!(
                            "Attempt {} failed with status 503, retrying in {}ms...",
                            attempt,
                            delay.as_millis()
                        );
                        last_error = Some(status);
                        tokio::time::sleep(delay).await;
                    }
                    Ok(status) => return Err(status.into()),
                    Err(e) => return Err(e),
                },
            }
        }

        match last_error {
            Some(last) => Err(anyhow::Error::new(MaxRetriesError {
                retries: max_retries,
                last,
            })),
            None => Err(anyhow!("Request failed after {} attempts", max_retries)),
        }
    }

    /// Unbounded retry: every failure is logged and retried with no delay.
    /// Can only return success; see [`RetryPolicy::Forever`].
    async fn execute_forever(&self, request: &ApiRequest, url: &Url) -> Result<Decoded> {
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            match self.send_once(request, url).await {
                Ok(decoded) => return Ok(decoded),
                Err(e) => warn!("Attempt {} failed ({}), retrying...", attempt, e),
            }
        }
    }

    /// One attempt: fresh user-agent, merged headers, optional JSON body.
    async fn send_once(&self, request: &ApiRequest, url: &Url) -> Result<Decoded> {
        let headers = build_headers(&request.headers)?;

        debug!("{} {}", request.method, url);

        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .headers(headers);

        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            return Err(anyhow::Error::new(StatusError { status, body }));
        }

        Ok(decode(&body))
    }
}

/// Default headers with a freshly rolled user-agent; caller-supplied headers
/// are merged on top and win on key collision.
fn build_headers(extra: &[(String, String)]) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(USER_AGENT, HeaderValue::from_static(random_user_agent()));

    for (name, value) in extra {
        let name = name
            .parse::<HeaderName>()
            .with_context(|| format!("Invalid header name: {}", name))?;
        let value = value
            .parse::<HeaderValue>()
            .with_context(|| format!("Invalid value for header {}", name))?;
        headers.insert(name, value);
    }

    Ok(headers)
}
