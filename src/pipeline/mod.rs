// src/pipeline/mod.rs

//! Bot workflows built on the service and storage seams.
//!
//! - [`VerdictPipeline`]: fetch → fingerprint → reuse or regenerate → cache
//! - [`CommandRouter`]: one inbound command → one reply
//! - [`UpdatePoller`]: long-poll loop with persisted offsets
//! - [`export_dashboard`]: weekly verdicts as a static JSON file

pub mod backoff;
pub mod dashboard;
pub mod poller;
pub mod router;
pub mod verdict;

pub use backoff::Backoff;
pub use dashboard::{Dashboard, ExportOutcome, export_dashboard};
pub use poller::{PollState, UpdateHandler, UpdatePoller};
pub use router::CommandRouter;
pub use verdict::{Feed, VerdictPipeline};
