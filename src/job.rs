// src/job.rs
//! One invocation: fetch → diff → notify → merge and persist.
//!
//! The seen-set is persisted as `seen ∪ fetched` whatever happened to the
//! individual emails, so a listing whose notification failed is not retried on
//! every later run. A failed fetch aborts before the store is touched.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::context::JobContext;
use crate::error::JobError;
use crate::listing::{Listing, ListingId};
use crate::notify::render::format_price;
use crate::notify::{NotificationOutcome, Notice};
use crate::seen::SeenSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Fetching,
    Diffing,
    Notifying,
    Persisting,
    Done,
    Aborted,
}

/// What the scheduler tells us about this firing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Trigger {
    /// Informational only.
    pub past_due: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub past_due: bool,
    pub fetched: usize,
    pub new: usize,
    pub sent: usize,
    pub failed: usize,
    pub seen_before: usize,
    pub seen_after: usize,
    pub persisted: bool,
}

/// Listings whose id is not in `seen`, in fetch order; a repeated id counts once.
pub fn unseen<'a>(seen: &SeenSet, listings: &'a [Listing]) -> Vec<&'a Listing> {
    let mut taken: HashSet<&ListingId> = HashSet::new();
    listings
        .iter()
        .filter(|l| !seen.contains(&l.id) && taken.insert(&l.id))
        .collect()
}

/// Uniform delay in `[0, max]`, millisecond resolution.
pub fn jitter(max: Duration) -> Duration {
    let max_ms = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::rng().random_range(0..=max_ms))
}

pub struct ReconciliationJob<'a> {
    ctx: &'a JobContext,
    state: JobState,
}

impl<'a> ReconciliationJob<'a> {
    pub fn new(ctx: &'a JobContext) -> Self {
        Self {
            ctx,
            state: JobState::Idle,
        }
    }

    pub fn state(&self) -> JobState {
        self.state
    }

    fn enter(&mut self, next: JobState) {
        debug!(from = ?self.state, to = ?next, "job state");
        self.state = next;
    }

    pub async fn run(&mut self, trigger: Trigger) -> Result<JobReport, JobError> {
        crate::metrics::describe();
        let ctx = self.ctx;
        let mut report = JobReport {
            past_due: trigger.past_due,
            ..JobReport::default()
        };
        if trigger.past_due {
            info!("timer is past due");
        }

        // desynchronise overlapping triggers before touching the provider
        let delay = jitter(ctx.jitter_max);
        if !delay.is_zero() {
            debug!(delay_ms = delay.as_millis() as u64, "startup jitter");
            tokio::time::sleep(delay).await;
        }

        self.enter(JobState::Fetching);
        let listings = match ctx.fetcher.fetch(&ctx.filter).await {
            Ok(v) => v,
            Err(err) => {
                error!(provider = ctx.fetcher.name(), error = %err, "listing search failed");
                counter!("fetch_errors_total").increment(1);
                let notice = Notice::FetchFailure {
                    message: format!(
                        "Erreur lors de l'appel à la recherche {}: {err}",
                        ctx.fetcher.name()
                    ),
                };
                let outcome = ctx.dispatcher.notify(&notice, &ctx.recipient).await;
                if let NotificationOutcome::Failed(reason) = &outcome {
                    warn!(%reason, "operator could not be told about the search failure");
                }
                self.enter(JobState::Aborted);
                return Err(err.into());
            }
        };
        report.fetched = listings.len();
        counter!("listings_fetched_total").increment(listings.len() as u64);

        self.enter(JobState::Diffing);
        let seen = ctx.store.load().await;
        report.seen_before = seen.len();
        let fresh = unseen(&seen, &listings);
        report.new = fresh.len();
        counter!("listings_new_total").increment(fresh.len() as u64);
        debug!(fetched = report.fetched, new = report.new, seen = report.seen_before, "diffed");

        self.enter(JobState::Notifying);
        for listing in fresh {
            info!(
                id = %listing.id,
                url = %listing.url,
                title = %listing.title,
                price = %format_price(listing.price),
                published_at = %listing.published_at,
                "new listing"
            );
            match ctx.dispatcher.notify(&Notice::Listing(listing), &ctx.recipient).await {
                NotificationOutcome::Sent => report.sent += 1,
                NotificationOutcome::Failed(_) => report.failed += 1,
            }
        }
        counter!("notifications_sent_total").increment(report.sent as u64);
        counter!("notifications_failed_total").increment(report.failed as u64);

        self.enter(JobState::Persisting);
        let fetched_ids: Vec<ListingId> = listings.iter().map(|l| l.id.clone()).collect();
        let merged = ctx.store.merge(&seen, &fetched_ids, Utc::now());
        report.seen_after = merged.len();
        match ctx.store.save(&merged).await {
            Ok(()) => report.persisted = true,
            Err(err) => {
                // next run re-derives the union; worst case is a repeat email
                error!(error = %err, location = %ctx.store.location(), "seen-set save failed");
                counter!("seen_store_save_errors_total").increment(1);
            }
        }

        self.enter(JobState::Done);
        info!(
            fetched = report.fetched,
            new = report.new,
            sent = report.sent,
            failed = report.failed,
            seen = report.seen_after,
            persisted = report.persisted,
            "invocation finished"
        );
        Ok(report)
    }
}

/// Run a single invocation against `ctx`.
pub async fn run_invocation(ctx: &JobContext, trigger: Trigger) -> Result<JobReport, JobError> {
    ReconciliationJob::new(ctx).run(trigger).await
}
