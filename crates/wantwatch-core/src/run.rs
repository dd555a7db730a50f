//! One complete fetch → compare → persist → notify cycle.
//!
//! Phases run strictly in order: `Loading`, `Processing`, `Persisting`,
//! `Notifying`, `Done`. Nothing is resumable. A fatal error before
//! `Persisting` completes leaves the stored baseline untouched, so rerunning
//! reproduces the same comparison. The baseline is always persisted before any
//! notification is attempted.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::baseline::{BaselineStore, StoreError};
use crate::catalog::{SourceError, TrackedItemSource};
use crate::diff::DiffEngine;
use crate::error::ErrorCode;
use crate::fetch::{CountFetcher, ListingSource};
use crate::model::{IncreasedItem, ItemId, ItemOutcome};
use crate::notify::{Channel, DispatchReport, Message, compose, dispatch};
use crate::retry::RetryPolicy;

/// Tunables for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub retry: RetryPolicy,
    /// Pause between consecutive item fetches.
    pub pacing: Duration,
    /// Classify and compose, but neither persist nor notify.
    pub dry_run: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            pacing: Duration::from_secs(1),
            dry_run: false,
        }
    }
}

impl RunSettings {
    /// No backoff, no pacing.
    #[must_use]
    pub const fn immediate() -> Self {
        Self {
            retry: RetryPolicy::immediate(3),
            pacing: Duration::ZERO,
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Loading,
    Processing,
    Persisting,
    Notifying,
    Done,
}

/// Fatal run failures. Each leaves the stored baseline as it was.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("failed to load baseline: {0}")]
    Load(#[source] StoreError),
    #[error("failed to persist baseline: {0}")]
    Persist(#[source] StoreError),
}

impl RunError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Source(err) => err.code(),
            Self::Load(err) => err.code(),
            Self::Persist(_) => ErrorCode::PersistenceFailure,
        }
    }
}

/// An item whose count could not be fetched and was taken as 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegradedItem {
    pub id: ItemId,
    pub reason: String,
}

/// Everything one run did.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<FixedOffset>,
    /// Last phase completed.
    pub phase: RunPhase,
    pub dry_run: bool,
    pub bootstrap: bool,
    pub persisted: bool,
    pub baseline_entries: usize,
    pub outcomes: Vec<ItemOutcome>,
    pub increased: Vec<IncreasedItem>,
    pub degraded: Vec<DegradedItem>,
    pub message: Option<Message>,
    pub dispatch: Option<DispatchReport>,
}

/// Drives a single run over borrowed collaborators.
pub struct RunCoordinator<'a> {
    store: &'a dyn BaselineStore,
    catalog: &'a dyn TrackedItemSource,
    listings: &'a dyn ListingSource,
    channels: Vec<&'a dyn Channel>,
    settings: RunSettings,
}

impl<'a> RunCoordinator<'a> {
    #[must_use]
    pub fn new(
        store: &'a dyn BaselineStore,
        catalog: &'a dyn TrackedItemSource,
        listings: &'a dyn ListingSource,
        settings: RunSettings,
    ) -> Self {
        Self {
            store,
            catalog,
            listings,
            channels: Vec::new(),
            settings,
        }
    }

    /// Add a notification channel. Channels are tried in insertion order.
    #[must_use]
    pub fn with_channel(mut self, channel: &'a dyn Channel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Execute the cycle. `now` stamps the notification header.
    pub fn run(&self, now: DateTime<FixedOffset>) -> Result<RunReport, RunError> {
        info!(phase = ?RunPhase::Loading, dry_run = self.settings.dry_run, "run started");
        let previous = self.store.load().map_err(|err| {
            error!(code = %err.code(), error = %err, "baseline load failed");
            RunError::Load(err)
        })?;
        let items = self.catalog.tracked_items().map_err(|err| {
            error!(code = %err.code(), error = %err, "tracked items unavailable, aborting");
            RunError::from(err)
        })?;
        info!(items = items.len(), baseline_entries = previous.len(), "tracked items loaded");

        info!(phase = ?RunPhase::Processing, "checking listing counts");
        let fetcher = CountFetcher::new(self.listings, self.settings.retry);
        let mut engine = DiffEngine::new(&previous);
        let bootstrap = engine.is_bootstrap();
        if bootstrap {
            info!("empty baseline: bootstrap run, recording counts without notifying");
        }

        let mut degraded = Vec::new();
        for (idx, item) in items.iter().enumerate() {
            if idx > 0 && !self.settings.pacing.is_zero() {
                thread::sleep(self.settings.pacing);
            }
            let outcome = fetcher.fetch(&item.id);
            if let Some(reason) = &outcome.degraded {
                degraded.push(DegradedItem {
                    id: item.id.clone(),
                    reason: reason.to_string(),
                });
            }
            let classification = engine.observe(item, outcome.count);
            debug!(item = %item.id, count = outcome.count, %classification, "item classified");
        }

        let result = engine.finish();
        let message = compose(&result.increased, now);
        if !degraded.is_empty() {
            warn!(degraded = degraded.len(), "some items were counted as 0");
        }

        let mut report = RunReport {
            started_at: now,
            phase: RunPhase::Processing,
            dry_run: self.settings.dry_run,
            bootstrap,
            persisted: false,
            baseline_entries: result.next_baseline.len(),
            outcomes: result.outcomes,
            increased: result.increased,
            degraded,
            message,
            dispatch: None,
        };

        if self.settings.dry_run {
            info!(increased = report.increased.len(), "dry run: skipping persist and notify");
            return Ok(report);
        }

        info!(phase = ?RunPhase::Persisting, entries = result.next_baseline.len(), "saving baseline");
        self.store.save(&result.next_baseline).map_err(|err| {
            error!(code = %err.code(), error = %err, "baseline save failed, not notifying");
            RunError::Persist(err)
        })?;
        report.persisted = true;
        report.phase = RunPhase::Persisting;

        info!(phase = ?RunPhase::Notifying, increased = report.increased.len(), "notifying");
        if let Some(message) = &report.message {
            report.dispatch = Some(dispatch(message, &self.channels));
        } else {
            info!("no listing increases, nothing to send");
        }
        report.phase = RunPhase::Done;

        info!(
            phase = ?RunPhase::Done,
            items = report.outcomes.len(),
            increased = report.increased.len(),
            "run finished"
        );
        Ok(report)
    }
}
