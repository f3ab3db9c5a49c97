// src/pipeline/poller.rs

//! Long-poll loop with at-most-once offset tracking.
//!
//! The loop alternates between two states: `Idle` while dispatching and
//! `AwaitingEvents` while a long poll is outstanding. After each dispatched
//! update the offset is advanced and persisted, whether or not the handler
//! succeeded, so a restart never replays an update that was already handled.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::Update;
use crate::pipeline::backoff::Backoff;
use crate::services::UpdateSource;
use crate::storage::OffsetStorage;

/// Consumer of polled updates.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    async fn handle(&self, update: &Update) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    AwaitingEvents,
}

pub struct UpdatePoller {
    source: Arc<dyn UpdateSource>,
    offsets: Arc<dyn OffsetStorage>,
    handler: Arc<dyn UpdateHandler>,
    timeout: Duration,
    backoff: Backoff,
    offset: Option<i64>,
    state: PollState,
}

impl UpdatePoller {
    pub fn new(
        source: Arc<dyn UpdateSource>,
        offsets: Arc<dyn OffsetStorage>,
        handler: Arc<dyn UpdateHandler>,
        timeout: Duration,
        backoff: Backoff,
    ) -> Self {
        Self {
            source,
            offsets,
            handler,
            timeout,
            backoff,
            offset: None,
            state: PollState::Idle,
        }
    }

    /// Last consumed update id.
    pub fn offset(&self) -> Option<i64> {
        self.offset
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Load the persisted offset. Unreadable state starts from scratch.
    pub async fn restore_offset(&mut self) {
        self.offset = match self.offsets.read_offset().await {
            Ok(offset) => offset,
            Err(e) => {
                log::warn!("Poll offset unreadable, starting fresh: {}", e);
                None
            }
        };
        match self.offset {
            Some(offset) => log::info!("Resuming after update {}", offset),
            None => log::info!("No saved offset; taking pending updates"),
        }
    }

    /// One poll cycle. Returns the number of updates dispatched.
    ///
    /// A failed poll leaves the offset unchanged.
    pub async fn poll_once(&mut self) -> Result<usize> {
        self.state = PollState::AwaitingEvents;
        let polled = self
            .source
            .get_updates(self.offset.map(|o| o + 1), self.timeout)
            .await;
        self.state = PollState::Idle;

        let mut updates = polled?;
        updates.sort_by_key(|u| u.id);

        let mut dispatched = 0;
        for update in updates {
            if self.offset.is_some_and(|offset| update.id <= offset) {
                log::debug!("Skipping already consumed update {}", update.id);
                continue;
            }

            if let Err(e) = self.handler.handle(&update).await {
                log::warn!("Update {} failed: {}", update.id, e);
            }

            self.offset = Some(update.id);
            if let Err(e) = self.offsets.write_offset(update.id).await {
                log::error!("Failed to persist offset {}: {}", update.id, e);
            }
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Poll forever, backing off after failures.
    pub async fn run(&mut self) -> Result<()> {
        self.restore_offset().await;
        log::info!("Polling for updates (timeout {}s)", self.timeout.as_secs());

        loop {
            match self.poll_once().await {
                Ok(count) => {
                    if count > 0 {
                        log::debug!("Dispatched {} updates", count);
                    }
                    self.backoff.reset();
                }
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    log::warn!("Poll failed: {} (retrying in {:?})", e, delay);
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::storage::MemoryStorage;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Source that replays scripted poll results and records requested offsets.
    #[derive(Default)]
    struct ScriptedSource {
        script: Mutex<VecDeque<Result<Vec<Update>>>>,
        requested: Mutex<Vec<Option<i64>>>,
    }

    impl ScriptedSource {
        fn push(&self, result: Result<Vec<Update>>) {
            self.script.lock().unwrap().push_back(result);
        }

        fn requested(&self) -> Vec<Option<i64>> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl UpdateSource for ScriptedSource {
        async fn get_updates(&self, offset: Option<i64>, _timeout: Duration) -> Result<Vec<Update>> {
            self.requested.lock().unwrap().push(offset);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    /// Handler that records ids and fails on the listed ones.
    #[derive(Default)]
    struct FlakyHandler {
        seen: Mutex<Vec<i64>>,
        fail_on: Vec<i64>,
    }

    #[async_trait]
    impl UpdateHandler for FlakyHandler {
        async fn handle(&self, update: &Update) -> Result<()> {
            self.seen.lock().unwrap().push(update.id);
            if self.fail_on.contains(&update.id) {
                return Err(AppError::telegram("handler blew up"));
            }
            Ok(())
        }
    }

    fn update(id: i64) -> Update {
        Update {
            id,
            chat_id: 42,
            text: Some("/today".to_string()),
            sender: None,
        }
    }

    fn poller(
        source: Arc<ScriptedSource>,
        offsets: Arc<MemoryStorage>,
        handler: Arc<FlakyHandler>,
    ) -> UpdatePoller {
        UpdatePoller::new(
            source,
            offsets,
            handler,
            Duration::from_secs(30),
            Backoff::new(Duration::from_millis(1), Duration::from_millis(4), 2.0),
        )
    }

    #[tokio::test]
    async fn test_offset_advances_past_failed_handler() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Ok(vec![update(12), update(10), update(11)]));
        let offsets = Arc::new(MemoryStorage::new());
        let handler = Arc::new(FlakyHandler {
            fail_on: vec![11],
            ..FlakyHandler::default()
        });
        let mut poller = poller(source.clone(), offsets.clone(), handler.clone());

        assert_eq!(poller.poll_once().await.unwrap(), 3);

        assert_eq!(*handler.seen.lock().unwrap(), vec![10, 11, 12]);
        assert_eq!(offsets.offset_history(), vec![10, 11, 12]);
        assert_eq!(poller.offset(), Some(12));
        assert_eq!(poller.state(), PollState::Idle);
    }

    #[tokio::test]
    async fn test_resumes_from_persisted_offset() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Ok(vec![update(7), update(8)]));
        let offsets = Arc::new(MemoryStorage::with_offset(7));
        let handler = Arc::new(FlakyHandler::default());
        let mut poller = poller(source.clone(), offsets.clone(), handler.clone());

        poller.restore_offset().await;
        assert_eq!(poller.poll_once().await.unwrap(), 1);

        assert_eq!(source.requested(), vec![Some(8)]);
        assert_eq!(*handler.seen.lock().unwrap(), vec![8]);
        assert_eq!(offsets.offset(), Some(8));
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_offset() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Ok(vec![update(3)]));
        source.push(Err(AppError::telegram("Bad Gateway")));
        let offsets = Arc::new(MemoryStorage::new());
        let mut poller = poller(source.clone(), offsets.clone(), Arc::new(FlakyHandler::default()));

        poller.poll_once().await.unwrap();
        assert!(poller.poll_once().await.is_err());
        poller.poll_once().await.unwrap();

        assert_eq!(poller.offset(), Some(3));
        assert_eq!(offsets.offset_history(), vec![3]);
        assert_eq!(source.requested(), vec![None, Some(4), Some(4)]);
    }

    #[tokio::test]
    async fn test_offset_write_failure_does_not_replay() {
        let source = Arc::new(ScriptedSource::default());
        source.push(Ok(vec![update(5)]));
        source.push(Ok(vec![update(5), update(6)]));
        let offsets = Arc::new(MemoryStorage::new());
        offsets.set_fail_writes(true);
        let handler = Arc::new(FlakyHandler::default());
        let mut poller = poller(source, offsets, handler.clone());

        poller.poll_once().await.unwrap();
        poller.poll_once().await.unwrap();

        assert_eq!(*handler.seen.lock().unwrap(), vec![5, 6]);
    }
}
