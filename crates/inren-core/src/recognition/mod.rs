//! Remote invoice recognition through an OpenAI-compatible vision model.
//!
//! A [`RecognitionClient`] rasterizes the first page of a document, sends it to
//! the model and parses the reply into [`InvoiceData`](crate::models::InvoiceData).
//! Requests are admitted through a counting semaphore sized from
//! `max_concurrent`, and each admitted request is retried with a linearly
//! growing delay.

mod client;
mod http;
mod parser;
mod request;

pub use client::{ConnectionReport, RecognitionClient, test_connection};
pub use http::{HttpTransport, REQUEST_TIMEOUT};
pub use parser::{extract_json_object, normalize_date, parse_response};
pub use request::{ChatRequest, SYSTEM_PROMPT, USER_PROMPT};

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::RecognitionError;

/// Delivers a chat completion payload and returns the reply text.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send one request; the result is the first choice's content, possibly empty.
    async fn complete(&self, payload: &Value) -> Result<String, RecognitionError>;
}

/// How many times a request is attempted and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay after failed attempt `attempt` (1-based): `attempt * base_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy_delays() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(2));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts, 1);
    }
}
