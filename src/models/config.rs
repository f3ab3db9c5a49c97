//! Application configuration structures.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{FixedOffset, Offset, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{DayKey, PromptVariant};

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP settings for menu page fetches
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Menu pages to scrape, in prompt order
    #[serde(default = "defaults::cafeterias")]
    pub cafeterias: Vec<CafeteriaInfo>,

    /// Persisted state locations and cache policy
    #[serde(default)]
    pub cache: CacheConfig,

    /// Verdict generator settings
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Delivery channel settings
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Poll loop retry policy
    #[serde(default)]
    pub poller: PollerConfig,

    /// Calendar settings used to resolve "today"
    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay secrets and chat ids from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Overlay secrets from an arbitrary lookup. Empty values are ignored.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("GEMINI_API_KEY") {
            self.gemini.api_key = Some(key);
        }
        if let Some(token) = get("TELEGRAM_TOKEN") {
            self.telegram.token = Some(token);
        }
        if let Some(chat) = get("TELEGRAM_CHAT_ID") {
            match chat.trim().parse() {
                Ok(id) => self.telegram.default_chat_id = Some(id),
                Err(_) => log::warn!("Ignoring non-numeric TELEGRAM_CHAT_ID: {}", chat),
            }
        }
        if let Some(chat) = get("ADMIN_CHAT_ID") {
            match chat.trim().parse() {
                Ok(id) => self.telegram.admin_chat_id = Some(id),
                Err(_) => log::warn!("Ignoring non-numeric ADMIN_CHAT_ID: {}", chat),
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.cafeterias.is_empty() {
            return Err(AppError::validation("No cafeterias defined"));
        }
        for cafeteria in &self.cafeterias {
            if cafeteria.name.trim().is_empty() {
                return Err(AppError::validation("cafeteria name is empty"));
            }
            url::Url::parse(&cafeteria.url).map_err(|e| {
                AppError::validation(format!("cafeteria {} has bad url: {}", cafeteria.name, e))
            })?;
        }
        if self.cache.freshness_hours == 0 {
            return Err(AppError::validation("cache.freshness_hours must be > 0"));
        }
        if self.cache.weekdays.is_empty() {
            return Err(AppError::validation("cache.weekdays is empty"));
        }
        if let Some(day) = self.cache.weekdays.iter().find(|d| d.weekday().is_none()) {
            return Err(AppError::validation(format!(
                "cache.weekdays contains unknown day '{}'",
                day
            )));
        }
        if self.telegram.poll_timeout_secs == 0 {
            return Err(AppError::validation("telegram.poll_timeout_secs must be > 0"));
        }
        if self.gemini.timeout_secs == 0 {
            return Err(AppError::validation("gemini.timeout_secs must be > 0"));
        }
        if self.poller.initial_backoff_ms == 0 {
            return Err(AppError::validation("poller.initial_backoff_ms must be > 0"));
        }
        if self.poller.initial_backoff_ms > self.poller.max_backoff_ms {
            return Err(AppError::validation(
                "poller.initial_backoff_ms must not exceed poller.max_backoff_ms",
            ));
        }
        if !self.poller.backoff_multiplier.is_finite() || self.poller.backoff_multiplier < 1.0 {
            return Err(AppError::validation(
                "poller.backoff_multiplier must be a finite number >= 1.0",
            ));
        }
        if !(-12..=14).contains(&self.schedule.utc_offset_hours) {
            return Err(AppError::validation(
                "schedule.utc_offset_hours must be within -12..=14",
            ));
        }
        Ok(())
    }

    /// Gemini API key, required by every mode that generates verdicts.
    pub fn require_gemini_key(&self) -> Result<&str> {
        self.gemini
            .api_key
            .as_deref()
            .ok_or_else(|| AppError::config("Missing GEMINI_API_KEY"))
    }

    /// Telegram bot token, required by every mode that talks to Telegram.
    pub fn require_telegram_token(&self) -> Result<&str> {
        self.telegram
            .token
            .as_deref()
            .ok_or_else(|| AppError::config("Missing TELEGRAM_TOKEN"))
    }

    /// Recipient of one-shot notifications.
    pub fn require_default_chat(&self) -> Result<i64> {
        self.telegram
            .default_chat_id
            .ok_or_else(|| AppError::config("Missing TELEGRAM_CHAT_ID"))
    }

    /// Timezone used to decide which weekday "today" is.
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.schedule.utc_offset_hours * 3600).unwrap_or_else(|| Utc.fix())
    }

    /// Maximum age of a reusable cache entry on the single-day path.
    pub fn freshness(&self) -> TimeDelta {
        TimeDelta::hours(self.cache.freshness_hours as i64)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            cafeterias: defaults::cafeterias(),
            cache: CacheConfig::default(),
            gemini: GeminiConfig::default(),
            telegram: TelegramConfig::default(),
            poller: PollerConfig::default(),
            schedule: ScheduleConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// HTTP client settings for menu pages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            timeout_secs: defaults::timeout(),
        }
    }
}

/// A cafeteria menu page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CafeteriaInfo {
    /// Display name, also used as the section header in the feed
    pub name: String,

    /// URL of the weekly menu page
    pub url: String,
}

/// Persisted state and cache policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Directory holding every persisted file
    #[serde(default = "defaults::storage_dir")]
    pub dir: PathBuf,

    #[serde(default = "defaults::cache_file")]
    pub cache_file: String,

    #[serde(default = "defaults::offset_file")]
    pub offset_file: String,

    #[serde(default = "defaults::feedback_file")]
    pub feedback_file: String,

    #[serde(default = "defaults::dashboard_file")]
    pub dashboard_file: String,

    /// Freshness window for single-day reuse
    #[serde(default = "defaults::freshness_hours")]
    pub freshness_hours: u32,

    /// Days covered by the batch refresh and the weekly summary
    #[serde(default = "defaults::weekdays")]
    pub weekdays: Vec<DayKey>,

    /// Age after which an abandoned lock file is taken over
    #[serde(default = "defaults::lock_stale_secs")]
    pub lock_stale_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: defaults::storage_dir(),
            cache_file: defaults::cache_file(),
            offset_file: defaults::offset_file(),
            feedback_file: defaults::feedback_file(),
            dashboard_file: defaults::dashboard_file(),
            freshness_hours: defaults::freshness_hours(),
            weekdays: defaults::weekdays(),
            lock_stale_secs: defaults::lock_stale_secs(),
        }
    }
}

/// Gemini generator settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key; normally supplied through `GEMINI_API_KEY`
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "defaults::gemini_model")]
    pub model: String,

    #[serde(default = "defaults::gemini_api_base")]
    pub api_base: String,

    /// Prompt framing
    #[serde(default)]
    pub variant: PromptVariant,

    /// Manual overrides appended to every prompt
    #[serde(default = "defaults::corrections_file")]
    pub corrections_file: Option<PathBuf>,

    #[serde(default = "defaults::gemini_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: defaults::gemini_model(),
            api_base: defaults::gemini_api_base(),
            variant: PromptVariant::default(),
            corrections_file: defaults::corrections_file(),
            timeout_secs: defaults::gemini_timeout(),
        }
    }
}

impl fmt::Debug for GeminiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("variant", &self.variant)
            .field("corrections_file", &self.corrections_file)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Telegram Bot API settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token; normally supplied through `TELEGRAM_TOKEN`
    #[serde(default)]
    pub token: Option<String>,

    /// Recipient of one-shot runs
    #[serde(default)]
    pub default_chat_id: Option<i64>,

    /// Recipient of user feedback
    #[serde(default)]
    pub admin_chat_id: Option<i64>,

    #[serde(default = "defaults::telegram_api_base")]
    pub api_base: String,

    /// Long-poll timeout passed to getUpdates
    #[serde(default = "defaults::poll_timeout")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: None,
            default_chat_id: None,
            admin_chat_id: None,
            api_base: defaults::telegram_api_base(),
            poll_timeout_secs: defaults::poll_timeout(),
        }
    }
}

impl fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("default_chat_id", &self.default_chat_id)
            .field("admin_chat_id", &self.admin_chat_id)
            .field("api_base", &self.api_base)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

/// Retry policy applied after a failed poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    #[serde(default = "defaults::initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "defaults::max_backoff_ms")]
    pub max_backoff_ms: u64,

    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: defaults::initial_backoff_ms(),
            max_backoff_ms: defaults::max_backoff_ms(),
            backoff_multiplier: defaults::backoff_multiplier(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Offset from UTC, in hours, of the cafeterias' local time
    #[serde(default = "defaults::utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: defaults::utc_offset_hours(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when RUST_LOG is unset
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    use super::CafeteriaInfo;
    use crate::models::DayKey;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; menubot/1.0)".into()
    }
    pub fn timeout() -> u64 {
        15
    }

    pub fn cafeterias() -> Vec<CafeteriaInfo> {
        vec![
            CafeteriaInfo {
                name: "Student Cafeteria".to_string(),
                url: "https://www.kumoh.ac.kr/ko/restaurant01.do".to_string(),
            },
            CafeteriaInfo {
                name: "Professor Cafeteria".to_string(),
                url: "https://www.kumoh.ac.kr/ko/restaurant02.do".to_string(),
            },
            CafeteriaInfo {
                name: "A La Carte".to_string(),
                url: "https://www.kumoh.ac.kr/ko/restaurant04.do".to_string(),
            },
        ]
    }

    // Cache defaults
    pub fn storage_dir() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn cache_file() -> String {
        "menu_cache.json".into()
    }
    pub fn offset_file() -> String {
        "poll_offset.txt".into()
    }
    pub fn feedback_file() -> String {
        "feedback.jsonl".into()
    }
    pub fn dashboard_file() -> String {
        "menu_data.json".into()
    }
    pub fn freshness_hours() -> u32 {
        24
    }
    pub fn weekdays() -> Vec<DayKey> {
        ["Monday", "Tuesday", "Wednesday", "Thursday", "Friday"]
            .into_iter()
            .map(DayKey::from)
            .collect()
    }
    pub fn lock_stale_secs() -> u64 {
        120
    }

    // Gemini defaults
    pub fn gemini_model() -> String {
        "gemini-3-flash-preview".into()
    }
    pub fn gemini_api_base() -> String {
        "https://generativelanguage.googleapis.com/v1beta".into()
    }
    pub fn corrections_file() -> Option<PathBuf> {
        Some(PathBuf::from("corrections.json"))
    }
    pub fn gemini_timeout() -> u64 {
        90
    }

    // Telegram defaults
    pub fn telegram_api_base() -> String {
        "https://api.telegram.org".into()
    }
    pub fn poll_timeout() -> u64 {
        30
    }

    // Poller defaults
    pub fn initial_backoff_ms() -> u64 {
        1_000
    }
    pub fn max_backoff_ms() -> u64 {
        60_000
    }
    pub fn backoff_multiplier() -> f64 {
        2.0
    }

    pub fn utc_offset_hours() -> i32 {
        9
    }

    pub fn log_level() -> String {
        "info".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_user_agent() {
        let mut config = Config::default();
        config.crawler.user_agent = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_bad_cafeteria_url() {
        let mut config = Config::default();
        config.cafeterias[0].url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_finite_backoff_multiplier() {
        let mut config = Config::default();
        config.poller.backoff_multiplier = f64::INFINITY;
        assert!(config.validate().is_err());

        let config: Config = toml::from_str("[poller]\nbackoff_multiplier = nan\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_weekday() {
        let mut config = Config::default();
        config.cache.weekdays.push(DayKey::from("Caturday"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_backoff() {
        let mut config = Config::default();
        config.poller.initial_backoff_ms = 10_000;
        config.poller.max_backoff_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_toml_keeps_section_defaults() {
        let config: Config = toml::from_str(
            r#"
            [cache]
            freshness_hours = 6

            [telegram]
            admin_chat_id = 42
            "#,
        )
        .unwrap();

        assert_eq!(config.cache.freshness_hours, 6);
        assert_eq!(config.cache.cache_file, "menu_cache.json");
        assert_eq!(config.telegram.admin_chat_id, Some(42));
        assert_eq!(config.telegram.poll_timeout_secs, 30);
        assert_eq!(config.cafeterias.len(), 3);
        assert_eq!(config.freshness(), TimeDelta::hours(6));
    }

    #[test]
    fn env_overlay_sets_secrets_and_ignores_garbage() {
        let mut config = Config::default();
        config.apply_env_from(|key| match key {
            "GEMINI_API_KEY" => Some("g-key".to_string()),
            "TELEGRAM_TOKEN" => Some("".to_string()),
            "TELEGRAM_CHAT_ID" => Some("12345".to_string()),
            "ADMIN_CHAT_ID" => Some("admin".to_string()),
            _ => None,
        });

        assert_eq!(config.require_gemini_key().unwrap(), "g-key");
        assert!(config.require_telegram_token().is_err());
        assert_eq!(config.require_default_chat().unwrap(), 12345);
        assert_eq!(config.telegram.admin_chat_id, None);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let mut config = Config::default();
        config.gemini.api_key = Some("super-secret".to_string());
        config.telegram.token = Some("bot-secret".to_string());

        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(!rendered.contains("bot-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn utc_offset_defaults_to_korea() {
        assert_eq!(Config::default().utc_offset().local_minus_utc(), 9 * 3600);
    }
}
