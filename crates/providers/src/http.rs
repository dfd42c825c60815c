//! Response helpers shared by the HTTP provider clients.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::ProviderError;

/// Build a client with a whole-request timeout.
pub fn client_with_timeout(timeout: Duration) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

/// Ensure the response has a success status code. Returns the response
/// unchanged on success, or a [`ProviderError::Api`] containing the status
/// and body text on failure.
pub async fn ensure_success(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ProviderError::Api {
            provider,
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

/// Parse a successful JSON response body into the expected type.
pub async fn parse_json<T: DeserializeOwned>(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let response = ensure_success(provider, response).await?;
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| {
        ProviderError::invalid(
            provider,
            format!("{e} (body: {})", truncate(&String::from_utf8_lossy(&body), 500)),
        )
    })
}

/// Read a successful response body as raw bytes.
pub async fn read_bytes(
    provider: &'static str,
    response: reqwest::Response,
) -> Result<Vec<u8>, ProviderError> {
    let response = ensure_success(provider, response).await?;
    Ok(response.bytes().await?.to_vec())
}

/// Cut `text` to at most `max` characters for log and error output.
pub fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("日本語テキスト", 2), "日本");
    }
}
