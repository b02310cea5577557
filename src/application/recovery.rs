use super::classifier::ALREADY_PROCESSED_CODE;
use super::confirm::PaymentConfirmService;
use crate::config::RecoveryConfig;
use crate::domain::command::{PaymentConfirmationResult, PendingPayment};
use crate::domain::payment::PaymentStatus;
use crate::domain::ports::PaymentStoreRef;
use crate::error::Result;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Tally of one recovery sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub candidates: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unknown: usize,
    /// Candidates another attempt settled or claimed first.
    pub skipped: usize,
    pub errored: usize,
}

impl RecoveryReport {
    fn record(&mut self, result: &Result<PaymentConfirmationResult>) {
        match result {
            Ok(result) if is_already_processed(result) => self.skipped += 1,
            Ok(result) => match result.status {
                PaymentStatus::Success => self.succeeded += 1,
                PaymentStatus::Failure => self.failed += 1,
                PaymentStatus::Unknown => self.unknown += 1,
                PaymentStatus::NotStarted | PaymentStatus::Executing => self.skipped += 1,
            },
            Err(_) => self.errored += 1,
        }
    }
}

fn is_already_processed(result: &PaymentConfirmationResult) -> bool {
    result
        .failure
        .as_ref()
        .is_some_and(|f| f.error_code == ALREADY_PROCESSED_CODE)
}

/// Re-drives payments stuck in `Unknown` or abandoned in `Executing`.
pub struct PaymentRecoveryService {
    store: PaymentStoreRef,
    confirm: Arc<PaymentConfirmService>,
    config: RecoveryConfig,
}

impl PaymentRecoveryService {
    pub fn new(
        store: PaymentStoreRef,
        confirm: Arc<PaymentConfirmService>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            confirm,
            config,
        }
    }

    /// Runs a single sweep over at most `batch_size` candidates.
    ///
    /// Failures are isolated per candidate; a failing query yields an empty
    /// report and is retried on the next tick.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> RecoveryReport {
        let candidates = match self
            .store
            .query_stale_or_unknown(Utc::now(), self.config.batch_size)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "Failed to load recovery candidates");
                return RecoveryReport::default();
            }
        };

        let mut report = RecoveryReport {
            candidates: candidates.len(),
            ..Default::default()
        };
        if candidates.is_empty() {
            return report;
        }

        let results: Vec<_> = stream::iter(candidates)
            .map(|pending| async move {
                let result = self.recover(&pending).await;
                (pending, result)
            })
            .buffer_unordered(self.config.concurrency.max(1))
            .collect()
            .await;

        for (pending, result) in &results {
            report.record(result);
            if let Err(e) = result {
                error!(order_id = %pending.order_id, error = %e, "Recovery attempt failed");
            }
        }

        info!(
            candidates = report.candidates,
            succeeded = report.succeeded,
            failed = report.failed,
            unknown = report.unknown,
            skipped = report.skipped,
            errored = report.errored,
            "Recovery sweep finished"
        );
        report
    }

    async fn recover(&self, pending: &PendingPayment) -> Result<PaymentConfirmationResult> {
        let command = pending.to_confirm_command();
        let result = self.confirm.confirm(&command).await?;

        let unsettled = matches!(result.status, PaymentStatus::Unknown | PaymentStatus::Failure);
        let exhausted = pending
            .orders
            .iter()
            .all(|order| order.fail_count.saturating_add(1) >= order.threshold);
        if unsettled && exhausted && !is_already_processed(&result) {
            warn!(
                order_id = %pending.order_id,
                status = %result.status,
                "Retry budget exhausted, payment needs manual intervention"
            );
        }
        Ok(result)
    }

    /// Sweeps on a fixed interval until `shutdown` is cancelled.
    ///
    /// The first sweep runs one interval after start.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let first_tick = Instant::now() + self.config.interval;
        let mut ticker = tokio::time::interval_at(first_tick, self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            concurrency = self.config.concurrency,
            "Recovery worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Recovery worker shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.sweep().await;
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}
