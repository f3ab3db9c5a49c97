// src/error.rs

//! Unified error handling for the menu bot.

use std::fmt;

use thiserror::Error;

/// Result type alias for bot operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Menu page could not be scraped
    #[error("Scrape error for {source_name}: {message}")]
    Scrape {
        source_name: String,
        message: String,
    },

    /// Verdict generation failed for a day
    #[error("Generation error for {day}: {message}")]
    Generation { day: String, message: String },

    /// Telegram Bot API rejected a call
    #[error("Telegram error: {0}")]
    Telegram(String),

    /// Persisted resource is held by another writer
    #[error("Lock error: {0}")]
    Lock(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a scrape error with the source name as context.
    pub fn scrape(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Scrape {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Create a generation error for a day.
    pub fn generation(day: impl fmt::Display, message: impl fmt::Display) -> Self {
        Self::Generation {
            day: day.to_string(),
            message: message.to_string(),
        }
    }

    /// Create a Telegram API error.
    pub fn telegram(message: impl Into<String>) -> Self {
        Self::Telegram(message.into())
    }

    /// Create a lock contention error.
    pub fn lock(message: impl Into<String>) -> Self {
        Self::Lock(message.into())
    }
}
