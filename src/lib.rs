// src/lib.rs
// Public library surface for the binaries and integration tests.

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod fetch;
pub mod job;
pub mod listing;
pub mod metrics;
pub mod notify;
pub mod scheduler;
pub mod seen;

// ---- Re-exports for stable public API ----
pub use crate::context::JobContext;
pub use crate::error::{ConfigError, FetchError, JobError, NotifyError, StoreError};
pub use crate::job::{run_invocation, JobReport, JobState, ReconciliationJob, Trigger};
pub use crate::listing::{Listing, ListingId, SearchFilter};
pub use crate::notify::{NotificationDispatcher, NotificationOutcome, Notice};
pub use crate::seen::{SeenSet, SeenStore};
