// src/services/mod.rs

//! External collaborators of the pipeline.
//!
//! Each capability the core depends on is a trait so the pipeline and the
//! poller can be driven by fakes:
//!
//! - [`MenuSource`]: raw menu text for one cafeteria
//! - [`VerdictGenerator`]: raw feed + day → structured verdict
//! - [`Notifier`]: deliver a message to a recipient
//! - [`UpdateSource`]: long-poll for inbound events

pub mod format;
pub mod gemini;
pub mod menu;
pub mod telegram;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{DayKey, Update, VerdictPayload};

pub use gemini::GeminiGenerator;
pub use menu::CafeteriaPage;
pub use telegram::TelegramClient;

/// One feed section.
#[async_trait]
pub trait MenuSource: Send + Sync {
    /// Section header used in the combined feed.
    fn name(&self) -> &str;

    /// Fetch the current menu text.
    async fn fetch_menu(&self) -> Result<String>;
}

/// Produces a verdict for one day from the raw feed.
#[async_trait]
pub trait VerdictGenerator: Send + Sync {
    async fn generate(&self, feed: &str, day: &DayKey) -> Result<VerdictPayload>;
}

/// Delivery sink.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text` to `chat_id`. Failures are logged, not returned.
    async fn send(&self, chat_id: i64, text: &str) -> bool;
}

/// Inbound event stream.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Events with id >= `offset`, waiting up to `timeout` for the first one.
    async fn get_updates(&self, offset: Option<i64>, timeout: Duration) -> Result<Vec<Update>>;
}
