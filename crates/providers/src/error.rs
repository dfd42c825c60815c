//! Error type shared by every provider client.

use std::error::Error as _;

use clipforge_core::retry::{is_retryable_status, is_transient_message, RetryError, Retryable};

use crate::render::MediaError;

/// Errors from external generation services, the object store and the
/// media renderer.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-success status code.
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider answered successfully but the payload was unusable.
    #[error("invalid {provider} response: {message}")]
    InvalidResponse {
        provider: &'static str,
        message: String,
    },

    #[error(transparent)]
    Media(#[from] MediaError),

    /// A retried operation ran out of attempts.
    #[error("{operation} failed after {attempts} attempts: {message}")]
    Exhausted {
        operation: &'static str,
        attempts: u32,
        message: String,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl ProviderError {
    pub fn invalid(provider: &'static str, message: impl Into<String>) -> Self {
        ProviderError::InvalidResponse {
            provider,
            message: message.into(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProviderError::Cancelled)
    }

    /// Collapse the outcome of a [`clipforge_core::retry::retry`] loop.
    pub fn from_retry(operation: &'static str, error: RetryError<ProviderError>) -> Self {
        match error {
            RetryError::Fatal { source, .. } => source,
            RetryError::Exhausted { attempts, source } => ProviderError::Exhausted {
                operation,
                attempts,
                message: source.to_string(),
            },
            RetryError::Cancelled { .. } => ProviderError::Cancelled,
        }
    }
}

/// Display text of an error and every source below it.
fn chain_text(error: &reqwest::Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        text.push_str(": ");
        text.push_str(&inner.to_string());
        source = inner.source();
    }
    text
}

impl Retryable for ProviderError {
    fn is_retryable(&self) -> bool {
        match self {
            ProviderError::Request(e) => {
                if let Some(status) = e.status() {
                    return is_retryable_status(status.as_u16());
                }
                e.is_timeout() || e.is_connect() || is_transient_message(&chain_text(e))
            }
            ProviderError::Api { status, .. } => is_retryable_status(*status),
            ProviderError::InvalidResponse { .. }
            | ProviderError::Media(_)
            | ProviderError::Exhausted { .. }
            | ProviderError::Cancelled => false,
        }
    }
}
