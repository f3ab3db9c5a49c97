// src/models/mod.rs

//! Domain models for the menu bot.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod cache;
mod config;
mod day;
mod update;
mod verdict;

// Re-export all public types
pub use cache::{CacheEntry, CacheMap, Fingerprint};
pub use config::{
    CacheConfig, CafeteriaInfo, Config, CrawlerConfig, GeminiConfig, LoggingConfig,
    PollerConfig, ScheduleConfig, TelegramConfig,
};
pub use day::{DayKey, remaining_days, weekday_name};
pub use update::{Command, Update};
pub use verdict::{DayVerdict, Meal, MealVerdict, PromptVariant, Venue, VerdictPayload, VerdictTally};
