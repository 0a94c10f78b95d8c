//! Authentication utilities for API requests
//!
//! This module provides utilities for adding provider-specific authentication
//! headers to HTTP requests.

use crate::core::providers::ProviderConnection;

/// Add provider-specific authentication headers to an HTTP request
///
/// - Anthropic: uses `x-api-key` with `anthropic-version`
/// - Local providers without a key: no auth header at all
/// - All others: standard `Authorization: Bearer`
pub fn add_auth_headers(
    request: reqwest::RequestBuilder,
    connection: &ProviderConnection,
) -> reqwest::RequestBuilder {
    let Some(api_key) = connection.api_key.as_deref() else {
        return request;
    };

    if connection.anthropic_mode {
        return request
            .header("x-api-key", api_key)
            .header("anthropic-version", "2023-06-01");
    }

    request.header("Authorization", format!("Bearer {api_key}"))
}
