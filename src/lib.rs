//! Async helper for calling a JSON-over-HTTP upstream that misbehaves in two
//! known ways: it intermittently answers 503 under load, and it sometimes
//! returns several JSON documents joined by a literal `\n&&&\n` line instead
//! of a single body.
//!
//! [`ApiClient::execute`] takes an [`ApiRequest`], rolls a random user-agent
//! on every attempt, retries per the configured [`RetryPolicy`], and decodes
//! the response body on a best-effort basis into a [`Decoded`] value.

pub mod agent;
pub mod client;
pub mod decode;
pub mod request;
pub mod retry;

pub use agent::{USER_AGENTS, random_user_agent};
pub use client::ApiClient;
pub use decode::{Decoded, decode};
pub use request::ApiRequest;
pub use retry::{MaxRetriesError, RetryPolicy, StatusError};
