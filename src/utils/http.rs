// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::Result;
use crate::models::CrawlerConfig;

/// Create a configured asynchronous HTTP client for menu pages.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    client_with_timeout(&config.user_agent, config.timeout_secs)
}

/// Create a client whose requests give up after `timeout_secs`.
pub fn client_with_timeout(user_agent: &str, timeout_secs: u64) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;
    Ok(client)
}
