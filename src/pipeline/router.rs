// src/pipeline/router.rs

//! Command dispatch for inbound updates.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, FixedOffset};

use crate::error::{AppError, Result};
use crate::models::{Command, Config, DayKey, Update, remaining_days};
use crate::pipeline::poller::UpdateHandler;
use crate::pipeline::verdict::VerdictPipeline;
use crate::services::{Notifier, format};
use crate::storage::{FeedbackRecord, FeedbackStorage};

const HANDLER_FAILED: &str = "⚠️ Something went wrong. Please try again later.";

pub struct CommandRouter {
    pipeline: Arc<VerdictPipeline>,
    notifier: Arc<dyn Notifier>,
    feedback: Arc<dyn FeedbackStorage>,
    admin_chat_id: Option<i64>,
    weekdays: Vec<DayKey>,
    utc_offset: FixedOffset,
}

impl CommandRouter {
    pub fn new(
        pipeline: Arc<VerdictPipeline>,
        notifier: Arc<dyn Notifier>,
        feedback: Arc<dyn FeedbackStorage>,
        config: &Config,
    ) -> Self {
        Self {
            pipeline,
            notifier,
            feedback,
            admin_chat_id: config.telegram.admin_chat_id,
            weekdays: config.cache.weekdays.clone(),
            utc_offset: config.utc_offset(),
        }
    }

    fn today(&self) -> DayKey {
        DayKey::today(self.pipeline.store().now(), self.utc_offset)
    }

    fn tomorrow(&self) -> DayKey {
        DayKey::tomorrow(self.pipeline.store().now(), self.utc_offset)
    }

    /// Route one update to its handler.
    ///
    /// Updates without a recognized command are ignored. A failing handler
    /// is reported to the sender and the error returned for logging; it never
    /// stops the caller from moving on to the next update.
    pub async fn dispatch(&self, update: &Update) -> Result<()> {
        let Some(command) = update.command() else {
            log::debug!("Ignoring update {} without a command", update.id);
            return Ok(());
        };
        log::info!("Update {}: {:?} from chat {}", update.id, command, update.chat_id);

        let result = match command {
            Command::Start => self.handle_start(update.chat_id).await,
            Command::Today => self.send_day(update.chat_id, &self.today(), false).await,
            Command::Tomorrow => self.send_day(update.chat_id, &self.tomorrow(), false).await,
            Command::Refresh => self.handle_refresh(update.chat_id).await,
            Command::Week => self.handle_week(update.chat_id).await,
            Command::Help => self.reply(update.chat_id, format::HELP).await,
            Command::Feedback(text) => self.handle_feedback(update, &text).await,
        };

        if let Err(e) = &result {
            log::error!("Handler for update {} failed: {}", update.id, e);
            self.notifier.send(update.chat_id, HANDLER_FAILED).await;
        }
        result
    }

    /// Cached status for today and the remaining configured weekdays.
    ///
    /// Read-only: never fetches or generates.
    pub async fn week_summary(&self) -> String {
        let today = self.pipeline.store().now().with_timezone(&self.utc_offset).weekday();
        let entries = self.pipeline.store().load().await;

        let lines: Vec<String> = remaining_days(&self.weekdays, today)
            .iter()
            .map(|day| format::week_line(day, entries.get(day)))
            .collect();
        format::week_message(&lines)
    }

    async fn reply(&self, chat_id: i64, text: &str) -> Result<()> {
        if self.notifier.send(chat_id, text).await {
            Ok(())
        } else {
            Err(AppError::telegram(format!("delivery to {} failed", chat_id)))
        }
    }

    async fn handle_start(&self, chat_id: i64) -> Result<()> {
        self.reply(chat_id, format::WELCOME).await?;
        self.send_day(chat_id, &self.today(), false).await
    }

    async fn handle_refresh(&self, chat_id: i64) -> Result<()> {
        self.reply(chat_id, format::ANALYZING).await?;
        self.send_day(chat_id, &self.today(), true).await
    }

    async fn send_day(&self, chat_id: i64, day: &DayKey, force_refresh: bool) -> Result<()> {
        let text = match self.pipeline.run_for_day(day, force_refresh).await {
            Some(verdict) => format::day_message(day, &verdict),
            None => format::could_not_analyze(day),
        };
        self.reply(chat_id, &text).await
    }

    async fn handle_week(&self, chat_id: i64) -> Result<()> {
        let summary = self.week_summary().await;
        self.reply(chat_id, &summary).await
    }

    async fn handle_feedback(&self, update: &Update, text: &str) -> Result<()> {
        if text.is_empty() {
            return self.reply(update.chat_id, format::FEEDBACK_USAGE).await;
        }

        let record = FeedbackRecord {
            timestamp: self.pipeline.store().now(),
            chat_id: update.chat_id,
            sender: update.sender.clone(),
            text: text.to_string(),
        };
        self.feedback.append_feedback(&record).await?;

        match self.admin_chat_id {
            Some(admin) => {
                let forwarded =
                    format::admin_feedback(update.chat_id, update.sender.as_deref(), text);
                if !self.notifier.send(admin, &forwarded).await {
                    log::warn!("Feedback from {} recorded but not forwarded", update.chat_id);
                }
            }
            None => log::warn!("ADMIN_CHAT_ID not set; feedback only recorded"),
        }

        self.reply(update.chat_id, format::FEEDBACK_THANKS).await
    }
}

#[async_trait]
impl UpdateHandler for CommandRouter {
    async fn handle(&self, update: &Update) -> Result<()> {
        self.dispatch(update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CacheEntry, CacheMap, Fingerprint, VerdictPayload};
    use crate::pipeline::verdict::tests::{CountingGenerator, FakeSource, t0};
    use crate::storage::{CacheStore, MemoryStorage};
    use crate::utils::clock::ManualClock;
    use chrono::{TimeDelta, TimeZone, Utc};
    use serde_json::json;
    use std::sync::Mutex;

    /// Notifier that records every message.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(i64, String)>>,
        failing: Mutex<bool>,
    }

    impl RecordingNotifier {
        fn sent(&self) -> Vec<(i64, String)> {
            self.sent.lock().unwrap().clone()
        }

        fn set_failing(&self, failing: bool) {
            *self.failing.lock().unwrap() = failing;
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, chat_id: i64, text: &str) -> bool {
            if *self.failing.lock().unwrap() {
                return false;
            }
            self.sent.lock().unwrap().push((chat_id, text.to_string()));
            true
        }
    }

    struct Harness {
        router: CommandRouter,
        notifier: Arc<RecordingNotifier>,
        generator: Arc<CountingGenerator>,
        backend: Arc<MemoryStorage>,
        clock: Arc<ManualClock>,
    }

    fn harness_with(backend: MemoryStorage, admin: Option<i64>) -> Harness {
        let generator = Arc::new(CountingGenerator::default());
        let backend = Arc::new(backend);
        let clock = Arc::new(ManualClock::new(t0()));
        let store = Arc::new(CacheStore::with_clock(backend.clone(), clock.clone()));
        let pipeline = Arc::new(VerdictPipeline::new(
            vec![Arc::new(FakeSource::new("Student Cafeteria", "abc"))],
            generator.clone(),
            store,
            TimeDelta::hours(24),
        ));
        let notifier = Arc::new(RecordingNotifier::default());

        let mut config = Config::default();
        config.telegram.admin_chat_id = admin;

        Harness {
            router: CommandRouter::new(pipeline, notifier.clone(), backend.clone(), &config),
            notifier,
            generator,
            backend,
            clock,
        }
    }

    fn harness() -> Harness {
        harness_with(MemoryStorage::new(), Some(1))
    }

    fn update(id: i64, text: &str) -> Update {
        Update {
            id,
            chat_id: 42,
            text: Some(text.to_string()),
            sender: Some("@mina".to_string()),
        }
    }

    #[tokio::test]
    async fn test_today_uses_local_weekday() {
        let h = harness();
        h.router.dispatch(&update(1, "/today")).await.unwrap();

        let sent = h.notifier.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 42);
        assert!(sent[0].1.contains("Kumoh Menu - Monday"));
        assert!(h.backend.snapshot().contains_key(&DayKey::from("Monday")));
    }

    #[tokio::test]
    async fn test_tomorrow_and_start() {
        let h = harness();
        h.router.dispatch(&update(1, "/tomorrow")).await.unwrap();
        h.router.dispatch(&update(2, "/start")).await.unwrap();

        let sent = h.notifier.sent();
        assert!(sent[0].1.contains("Tuesday"));
        assert_eq!(sent[1].1, format::WELCOME);
        assert!(sent[2].1.contains("Monday"));
    }

    #[tokio::test]
    async fn test_refresh_bypasses_cache() {
        let h = harness();
        h.router.dispatch(&update(1, "/today")).await.unwrap();
        h.router.dispatch(&update(2, "/today")).await.unwrap();
        assert_eq!(h.generator.calls(), 1);

        h.router.dispatch(&update(3, "/refresh")).await.unwrap();
        assert_eq!(h.generator.calls(), 2);
        assert_eq!(h.notifier.sent()[2].1, format::ANALYZING);
    }

    #[tokio::test]
    async fn test_generation_failure_replies_with_notice() {
        let h = harness();
        h.generator.fail_for("Monday");
        h.router.dispatch(&update(1, "/today")).await.unwrap();

        assert!(h.notifier.sent()[0].1.contains("Could not analyze the menu for Monday"));
    }

    #[tokio::test]
    async fn test_week_is_read_only() {
        let mut cache = CacheMap::new();
        cache.insert(
            DayKey::from("Wednesday"),
            CacheEntry::new(
                t0(),
                VerdictPayload::new(json!({"day": "Wednesday", "cafeterias": []})),
                Fingerprint::from("f"),
            ),
        );
        let h = harness_with(MemoryStorage::with_cache(cache), None);

        h.router.dispatch(&update(1, "/week")).await.unwrap();

        let text = &h.notifier.sent()[0].1;
        assert!(text.contains("• Monday: not yet available"));
        assert!(text.contains("• Wednesday: ✅ 0"));
        assert!(text.contains("• Friday"));
        assert_eq!(h.generator.calls(), 0);
        assert_eq!(h.backend.cache_writes(), 0);
    }

    #[tokio::test]
    async fn test_week_on_weekend_has_nothing_left() {
        let h = harness();
        // Saturday morning in Korea
        h.clock.set(Utc.with_ymd_and_hms(2026, 10, 24, 1, 0, 0).unwrap());

        assert!(h.router.week_summary().await.contains("No more menus this week"));
    }

    #[tokio::test]
    async fn test_feedback_recorded_and_forwarded() {
        let h = harness();
        h.router
            .dispatch(&update(1, "/feedback the soup had ham"))
            .await
            .unwrap();

        let feedback = h.backend.feedback();
        assert_eq!(feedback.len(), 1);
        assert_eq!(feedback[0].text, "the soup had ham");
        assert_eq!(feedback[0].sender.as_deref(), Some("@mina"));

        let sent = h.notifier.sent();
        assert_eq!(sent[0].0, 1);
        assert!(sent[0].1.contains("the soup had ham"));
        assert_eq!(sent[1], (42, format::FEEDBACK_THANKS.to_string()));
    }

    #[tokio::test]
    async fn test_empty_feedback_gets_usage() {
        let h = harness();
        h.router.dispatch(&update(1, "/feedback")).await.unwrap();

        assert!(h.backend.feedback().is_empty());
        assert_eq!(h.notifier.sent()[0].1, format::FEEDBACK_USAGE);
    }

    #[tokio::test]
    async fn test_unknown_and_plain_text_are_ignored() {
        let h = harness();
        h.router.dispatch(&update(1, "/dance")).await.unwrap();
        h.router.dispatch(&update(2, "hello")).await.unwrap();

        assert!(h.notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_delivery_failure_is_an_error() {
        let h = harness();
        h.notifier.set_failing(true);

        assert!(h.router.dispatch(&update(1, "/help")).await.is_err());
    }
}
