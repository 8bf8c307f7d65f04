//! Request descriptors and URL construction.

use anyhow::{Context, Result};
use reqwest::{Method, Url};
use serde_json::Value;

/// Describes one API call: method, target, optional JSON body, extra headers
/// and query parameters. Immutable input to a single [`execute`] invocation.
///
/// [`execute`]: crate::ApiClient::execute
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub base: String,
    pub path: String,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(method: Method, base: &str, path: &str) -> Self {
        Self {
            method,
            base: base.to_string(),
            path: path.to_string(),
            body: None,
            headers: Vec::new(),
            query: Vec::new(),
        }
    }

    pub fn get(base: &str, path: &str) -> Self {
        Self::new(Method::GET, base, path)
    }

    pub fn post(base: &str, path: &str) -> Self {
        Self::new(Method::POST, base, path)
    }

    pub fn put(base: &str, path: &str) -> Self {
        Self::new(Method::PUT, base, path)
    }

    pub fn delete(base: &str, path: &str) -> Self {
        Self::new(Method::DELETE, base, path)
    }

    /// Sets the JSON body. Requests without a body omit the field entirely.
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Adds a header. Caller headers win over the client defaults on
    /// key collision.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Adds a query parameter. Parameters keep their insertion order in the
    /// final URL.
    pub fn query(mut self, key: &str, value: &str) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Resolves the path against the base address and appends each query
    /// pair in insertion order.
    pub fn url(&self) -> Result<Url> {
        let base = Url::parse(&self.base)
            .with_context(|| format!("Invalid base address: {}", self.base))?;

        let mut url = base.join(&self.path).with_context(|| {
            format!("Failed to resolve path {:?} against {}", self.path, self.base)
        })?;

        if !self.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }
}
