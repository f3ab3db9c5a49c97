// src/pipeline/dashboard.rs

//! Static dashboard export.
//!
//! Writes `{updated_at, fingerprint, week_data}` for a static web page. When
//! the feed has not changed since the last export only `updated_at` moves.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{DayKey, Fingerprint, VerdictPayload};
use crate::pipeline::verdict::VerdictPipeline;
use crate::storage::LocalStorage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dashboard {
    pub updated_at: DateTime<Utc>,
    pub fingerprint: Fingerprint,
    pub week_data: BTreeMap<DayKey, VerdictPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportOutcome {
    /// Feed unchanged; only the timestamp was rewritten
    Touched,
    /// Verdicts rebuilt for this many days
    Rebuilt(usize),
}

/// Export the dashboard for `days` to the storage's dashboard file.
pub async fn export_dashboard(
    pipeline: &VerdictPipeline,
    storage: &LocalStorage,
    days: &[DayKey],
) -> Result<ExportOutcome> {
    let key = storage.dashboard_key();
    let feed = pipeline.fetch_feed().await;
    let now = pipeline.store().now();

    let previous: Option<Dashboard> = match storage.read_json(key).await {
        Ok(previous) => previous,
        Err(e) => {
            log::warn!("Existing dashboard unreadable, rebuilding: {}", e);
            None
        }
    };

    if let Some(mut dashboard) = previous.filter(|d| d.fingerprint == feed.fingerprint) {
        dashboard.updated_at = now;
        storage.write_json(key, &dashboard).await?;
        log::info!("Dashboard unchanged ({}); timestamp updated", feed.fingerprint);
        return Ok(ExportOutcome::Touched);
    }

    let week_data = pipeline.run_for_week_with_feed(days, &feed).await?;
    let count = week_data.len();
    let dashboard = Dashboard {
        updated_at: now,
        fingerprint: feed.fingerprint,
        week_data,
    };
    storage.write_json(key, &dashboard).await?;
    log::info!(
        "Dashboard written to {} ({} days)",
        storage.path(key).display(),
        count
    );
    Ok(ExportOutcome::Rebuilt(count))
}
