//! The purge loop: fetch, classify, delete, cool down, repeat.

use std::{collections::HashSet, sync::Arc, time::Duration};

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    BULK_DELETE_MAX, BULK_DELETE_MIN, BulkOutcome, DeleteOutcome, MessageStore, PurgeAborted,
    PurgeError, classify,
};
use crate::config::PurgeConfig;

/// Summary of a purge run. Every counter only ever grows during the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub channel_id: String,
    /// Messages confirmed removed.
    pub total_deleted: u64,
    /// Single deletes answered with forbidden or not found.
    pub skipped: u64,
    /// Single deletes answered with any other non-success status.
    pub failed: u64,
    /// Listing calls made.
    pub iterations: u32,
    pub bulk_requests: u32,
    /// Bulk requests that were rejected and replayed id by id.
    pub bulk_fallbacks: u32,
    /// The run stopped on the iteration cap rather than an empty channel.
    pub safety_cap_reached: bool,
    /// The run stopped because every fetched message had already been tried.
    pub undeletable_remaining: bool,
}

/// Working state of one run. Created per call to [`Purger::purge`].
struct PurgeRun {
    report: PurgeReport,
    attempted: HashSet<String>,
}

impl PurgeRun {
    fn new(channel_id: &str) -> Self {
        Self {
            report: PurgeReport {
                channel_id: channel_id.to_string(),
                ..Default::default()
            },
            attempted: HashSet::new(),
        }
    }

    fn channel_id(&self) -> &str {
        &self.report.channel_id
    }

    fn record(&mut self, outcome: DeleteOutcome) {
        match outcome {
            DeleteOutcome::Deleted => self.report.total_deleted += 1,
            DeleteOutcome::Skipped(_) => self.report.skipped += 1,
            DeleteOutcome::Failed { .. } => self.report.failed += 1,
        }
    }
}

/// Drives purge runs against a [`MessageStore`].
///
/// A `Purger` holds no per-run state and can serve many channels at once;
/// each call to [`Purger::purge`] is an independent sequential run.
pub struct Purger {
    store: Arc<dyn MessageStore>,
    config: PurgeConfig,
}

impl Purger {
    pub fn new(store: Arc<dyn MessageStore>, config: PurgeConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &PurgeConfig {
        &self.config
    }

    /// Delete every message in `channel_id`.
    ///
    /// Returns once a fetch comes back empty, nothing fetched is still
    /// deletable, or the iteration cap is reached. A rate-limit exhaustion,
    /// listing failure, or cancellation aborts the run; the error carries the
    /// report accumulated so far.
    #[tracing::instrument(name = "purge.run", skip(self, cancel))]
    pub async fn purge(
        &self,
        channel_id: &str,
        cancel: &CancellationToken,
    ) -> Result<PurgeReport, PurgeAborted> {
        let mut run = PurgeRun::new(channel_id);

        info!(
            max_iterations = self.config.max_iterations,
            bulk_max_age_days = self.config.bulk_max_age_days,
            "Starting channel purge"
        );

        match self.drive(&mut run, cancel).await {
            Ok(()) => {
                let report = run.report;
                info!(
                    total_deleted = report.total_deleted,
                    skipped = report.skipped,
                    failed = report.failed,
                    iterations = report.iterations,
                    safety_cap_reached = report.safety_cap_reached,
                    undeletable_remaining = report.undeletable_remaining,
                    "Channel purge complete"
                );
                Ok(report)
            }
            Err(error) => {
                let report = run.report;
                warn!(
                    error = %error,
                    total_deleted = report.total_deleted,
                    iterations = report.iterations,
                    "Channel purge aborted"
                );
                Err(PurgeAborted { error, report })
            }
        }
    }

    async fn drive(&self, run: &mut PurgeRun, cancel: &CancellationToken) -> Result<(), PurgeError> {
        loop {
            if run.report.iterations >= self.config.max_iterations {
                warn!(
                    iterations = run.report.iterations,
                    total_deleted = run.report.total_deleted,
                    "Safety iteration cap reached, stopping purge"
                );
                run.report.safety_cap_reached = true;
                return Ok(());
            }
            if cancel.is_cancelled() {
                return Err(PurgeError::Cancelled);
            }
            run.report.iterations += 1;

            let batch = self.store.fetch_batch(run.channel_id()).await?;
            if batch.is_empty() {
                debug!(iteration = run.report.iterations, "Channel is empty");
                return Ok(());
            }

            let fetched = batch.len();
            let fresh: Vec<_> = batch
                .into_iter()
                .filter(|m| !run.attempted.contains(&m.id))
                .collect();
            if fresh.is_empty() {
                warn!(
                    remaining = fetched,
                    "Every fetched message was already tried this run, stopping purge"
                );
                run.report.undeletable_remaining = true;
                return Ok(());
            }
            run.attempted.extend(fresh.iter().map(|m| m.id.clone()));

            let partition = classify(&fresh, Utc::now(), self.config.bulk_max_age());
            debug!(
                iteration = run.report.iterations,
                fetched,
                bulk_eligible = partition.bulk_eligible.len(),
                individual = partition.individual.len(),
                "Processing batch"
            );

            self.delete_recent(run, &partition.bulk_eligible, cancel)
                .await?;
            self.delete_old(run, &partition.individual, cancel).await?;

            debug!(
                iteration = run.report.iterations,
                total_deleted = run.report.total_deleted,
                "Batch processed"
            );
            self.cooldown(self.config.batch_cooldown(), cancel).await?;
        }
    }

    /// Bulk-delete young messages in chunks, replaying a rejected chunk id by id.
    async fn delete_recent(
        &self,
        run: &mut PurgeRun,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), PurgeError> {
        for chunk in ids.chunks(BULK_DELETE_MAX) {
            if chunk.len() < BULK_DELETE_MIN {
                for id in chunk {
                    self.delete_individually(run, id).await?;
                }
            } else {
                run.report.bulk_requests += 1;
                match self.store.bulk_delete(run.channel_id(), chunk).await? {
                    BulkOutcome::Deleted => {
                        run.report.total_deleted += chunk.len() as u64;
                        debug!(count = chunk.len(), "Bulk delete succeeded");
                    }
                    BulkOutcome::Rejected { status } => {
                        run.report.bulk_fallbacks += 1;
                        debug!(
                            status,
                            count = chunk.len(),
                            "Falling back to individual deletes"
                        );
                        for id in chunk {
                            self.delete_individually(run, id).await?;
                            self.cooldown(self.config.fallback_cooldown(), cancel)
                                .await?;
                        }
                    }
                }
            }

            self.cooldown(self.config.bulk_cooldown(), cancel).await?;
        }

        Ok(())
    }

    /// Delete messages too old for the bulk endpoint, one per request.
    async fn delete_old(
        &self,
        run: &mut PurgeRun,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<(), PurgeError> {
        for id in ids {
            self.delete_individually(run, id).await?;
            self.cooldown(self.config.individual_cooldown(), cancel)
                .await?;
        }
        Ok(())
    }

    async fn delete_individually(&self, run: &mut PurgeRun, id: &str) -> Result<(), PurgeError> {
        let outcome = self.store.delete_one(run.channel_id(), id).await?;
        run.record(outcome);
        Ok(())
    }

    async fn cooldown(&self, duration: Duration, cancel: &CancellationToken) -> Result<(), PurgeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PurgeError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}
