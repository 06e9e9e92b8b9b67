//! Outbox dispatch and the background retry loop.
//!
//! Persistable effects are committed as `pending` rows together with the
//! status change. The store dispatches its own rows right after commit; the
//! retry loop picks up anything left behind (failed dispatches and rows
//! orphaned by a crash between commit and dispatch).

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::interval;
use tracing::{error, info, warn};

use super::interpreter::{execute_effect, InterpreterContext};
use super::repository::{OutboxEntry, RepositoryError};

/// Maximum rows dispatched per loop tick.
const BATCH_SIZE: usize = 100;

/// Cap on the backoff exponent so the delay cannot overflow.
const MAX_BACKOFF_EXPONENT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxSettings {
    pub poll_interval: Duration,
    /// Dispatch attempts before a row is dead.
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(30),
            max_attempts: 3,
            backoff_base: Duration::from_secs(60),
        }
    }
}

impl OutboxSettings {
    /// When a row that has failed `failed_attempts` times (counting the one
    /// that just failed) should be retried, or `None` once it is out of
    /// attempts. The delay is `base × 2^(failed_attempts - 1)`.
    pub fn next_attempt_at(
        &self,
        now: DateTime<Utc>,
        failed_attempts: u32,
    ) -> Option<DateTime<Utc>> {
        if failed_attempts >= self.max_attempts {
            return None;
        }
        let exponent = failed_attempts.saturating_sub(1).min(MAX_BACKOFF_EXPONENT);
        let delay = self.backoff_base.saturating_mul(1u32 << exponent);
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        Some(now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC))
    }

    /// Grace period before the loop may pick up a freshly committed row.
    pub fn first_attempt_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let delay = chrono::Duration::from_std(self.backoff_base).unwrap_or(chrono::Duration::MAX);
        now.checked_add_signed(delay).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

/// What happened to a dispatched row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchOutcome {
    Delivered,
    /// Failed; scheduled for another attempt.
    Retrying,
    /// Failed for the last time.
    Dead,
}

/// Counts per outcome for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub delivered: usize,
    pub retrying: usize,
    pub dead: usize,
}

impl DispatchReport {
    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Delivered => self.delivered += 1,
            DispatchOutcome::Retrying => self.retrying += 1,
            DispatchOutcome::Dead => self.dead += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.delivered + self.retrying + self.dead
    }
}

/// Execute one outbox row and record the result on it.
///
/// Effect failures are absorbed into the row; only failures to update the
/// row itself are returned.
pub async fn dispatch_entry(
    ctx: &InterpreterContext,
    settings: &OutboxSettings,
    entry: &OutboxEntry,
    now: DateTime<Utc>,
) -> Result<DispatchOutcome, RepositoryError> {
    match execute_effect(ctx, &entry.effect).await {
        Ok(()) => {
            ctx.repository.mark_outbox_delivered(entry.id).await?;
            Ok(DispatchOutcome::Delivered)
        }
        Err(e) => {
            let failed_attempts = entry.attempts.saturating_add(1);
            let next = settings.next_attempt_at(now, failed_attempts);
            let message = e.to_string();
            ctx.repository
                .mark_outbox_failed(entry.id, &message, next)
                .await?;
            match next {
                Some(at) => {
                    warn!(
                        "Outbox entry {} ({}) failed attempt {}: {}; retrying at {}",
                        entry.id,
                        entry.effect.kind(),
                        failed_attempts,
                        message,
                        at
                    );
                    Ok(DispatchOutcome::Retrying)
                }
                None => {
                    error!(
                        "Outbox entry {} ({}) is dead after {} attempts: {}",
                        entry.id,
                        entry.effect.kind(),
                        failed_attempts,
                        message
                    );
                    Ok(DispatchOutcome::Dead)
                }
            }
        }
    }
}

/// Dispatch `entries` in order.
pub async fn dispatch_entries(
    ctx: &InterpreterContext,
    settings: &OutboxSettings,
    entries: &[OutboxEntry],
    now: DateTime<Utc>,
) -> DispatchReport {
    let mut report = DispatchReport::default();
    for entry in entries {
        match dispatch_entry(ctx, settings, entry, now).await {
            Ok(outcome) => report.record(outcome),
            Err(e) => error!("Failed to record outbox entry {}: {}", entry.id, e),
        }
    }
    report
}

/// Dispatch every due row once.
pub async fn dispatch_due(
    ctx: &InterpreterContext,
    settings: &OutboxSettings,
    now: DateTime<Utc>,
) -> Result<DispatchReport, RepositoryError> {
    let due = ctx.repository.due_outbox_entries(now, BATCH_SIZE).await?;
    if due.is_empty() {
        return Ok(DispatchReport::default());
    }
    info!("Dispatching {} due outbox entries", due.len());
    Ok(dispatch_entries(ctx, settings, &due, now).await)
}

/// Background loop retrying due outbox rows every `poll_interval`.
pub async fn outbox_retry_loop(ctx: InterpreterContext, settings: OutboxSettings) {
    let mut interval = interval(settings.poll_interval);

    loop {
        interval.tick().await;

        if let Err(e) = dispatch_due(&ctx, &settings, Utc::now()).await {
            error!("Error polling outbox: {}", e);
        }
    }
}
