// src/scheduler.rs
//! In-process timer for hosts without an external scheduler.
//!
//! Invocations run back-to-back on one task, so they never overlap and the
//! single-writer assumption of the seen-set holds.

use std::future::Future;
use std::time::Duration;

use tokio::time::{self, Instant, MissedTickBehavior};

use crate::context::JobContext;
use crate::job::{run_invocation, Trigger};

#[derive(Clone, Copy, Debug)]
pub struct ScheduleCfg {
    pub every: Duration,
    /// Stop after this many invocations (`None` = until shutdown).
    pub max_runs: Option<usize>,
}

/// A tick is past due when it is served more than one period after it was due.
pub fn is_past_due(scheduled: Instant, now: Instant, every: Duration) -> bool {
    now.saturating_duration_since(scheduled) > every
}

/// Run invocations every `cfg.every` until `shutdown` resolves or `max_runs`
/// is reached. Returns the number of invocations started.
pub async fn run_every<F>(ctx: &JobContext, cfg: ScheduleCfg, shutdown: F) -> usize
where
    F: Future<Output = ()>,
{
    let mut ticker = time::interval(cfg.every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    let mut runs = 0usize;
    loop {
        if cfg.max_runs.is_some_and(|max| runs >= max) {
            break;
        }
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(runs, "scheduler shutdown requested");
                break;
            }
            scheduled = ticker.tick() => {
                let past_due = is_past_due(scheduled, Instant::now(), cfg.every);
                runs += 1;
                // a failed search is already logged and reported by the job
                if let Err(err) = run_invocation(ctx, Trigger { past_due }).await {
                    tracing::debug!(error = %err, "invocation aborted");
                }
            }
        }
    }
    runs
}
