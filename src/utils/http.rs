// src/utils/http.rs

//! HTTP client utilities.

use std::env;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};

use crate::error::{AppError, Result};
use crate::models::ApiConfig;

/// User agent sent with every API request.
pub const USER_AGENT: &str = concat!("catalog-steward/", env!("CARGO_PKG_VERSION"));

/// Read the bearer token from the configured environment variable.
pub fn access_token(config: &ApiConfig) -> Result<String> {
    let token = env::var(&config.access_token_env).map_err(|_| {
        AppError::config(format!(
            "environment variable {} is not set",
            config.access_token_env
        ))
    })?;
    let token = token.trim().to_string();
    if token.is_empty() {
        return Err(AppError::config(format!(
            "environment variable {} is empty",
            config.access_token_env
        )));
    }
    Ok(token)
}

/// Create an asynchronous HTTP client that authenticates every request.
pub fn create_async_client(config: &ApiConfig) -> Result<reqwest::Client> {
    let token = access_token(config)?;
    let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
        .map_err(|e| AppError::config(format!("invalid access token: {e}")))?;
    auth.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, auth);

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}
