//! Periodic sweep over silent conversations.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reactivation_core::CandidateSource;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::evaluator::{ConversationEvaluator, EvaluationOutcome};
use crate::shard::Shard;

/// Counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Candidates owned by this shard.
    pub candidates: usize,
    /// Candidates left to other shards.
    pub other_shard: usize,
    pub executed: usize,
    pub waiting: usize,
    pub skipped: usize,
    pub conflicts: usize,
    /// Actions rolled back after a failure.
    pub failed: usize,
    /// Evaluations that returned an error or panicked.
    pub errors: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &EvaluationOutcome) {
        match outcome {
            EvaluationOutcome::Executed(_) => self.executed += 1,
            EvaluationOutcome::Waiting(_) => self.waiting += 1,
            EvaluationOutcome::Skipped(_) => self.skipped += 1,
            EvaluationOutcome::Conflict => self.conflicts += 1,
            EvaluationOutcome::Failed { .. } => self.failed += 1,
        }
    }
}

/// Runs evaluations for every candidate on a bounded worker pool.
///
/// One evaluation's failure never affects another's, and never stops the
/// sweep.
pub struct ReactivationScheduler {
    candidates: Arc<dyn CandidateSource>,
    evaluator: ConversationEvaluator,
    shard: Shard,
    max_concurrency: usize,
    sweep_interval: Duration,
}

impl ReactivationScheduler {
    pub fn new(
        candidates: Arc<dyn CandidateSource>,
        evaluator: ConversationEvaluator,
        shard: Shard,
        max_concurrency: usize,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            candidates,
            evaluator,
            shard,
            max_concurrency: max_concurrency.max(1),
            sweep_interval,
        }
    }

    /// Evaluate every candidate owned by this shard once.
    pub async fn sweep(&self, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();

        let candidates = match self.candidates.candidates(now).await {
            Ok(candidates) => candidates,
            Err(e) => {
                error!("Failed to list reactivation candidates: {}", e);
                report.errors += 1;
                return report;
            }
        };

        let semaphore = Arc::new(Semaphore::new(self.max_concurrency));
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            if !self.shard.owns(&candidate.conversation_id) {
                report.other_shard += 1;
                continue;
            }
            report.candidates += 1;

            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                break;
            };
            let evaluator = self.evaluator.clone();
            tasks.spawn(async move {
                let _permit = permit;
                let result = evaluator.evaluate(&candidate, now).await;
                (candidate, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => report.record(&outcome),
                Ok((candidate, Err(e))) => {
                    warn!(
                        conversation_id = %candidate.conversation_id,
                        tenant_id = %candidate.tenant_id,
                        retryable = e.is_retryable(),
                        "Evaluation failed: {}",
                        e
                    );
                    report.errors += 1;
                }
                Err(e) => {
                    error!("Evaluation task failed: {}", e);
                    report.errors += 1;
                }
            }
        }

        report
    }

    /// Sweep every `sweep_interval` until `shutdown` turns `true`.
    ///
    /// A sweep in progress always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.sweep_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            shard = %self.shard,
            workers = self.max_concurrency,
            sweep_interval = ?self.sweep_interval,
            "Starting reactivation scheduler"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.sweep(Utc::now()).await;
                    if report.candidates > 0 || report.errors > 0 {
                        info!(
                            candidates = report.candidates,
                            executed = report.executed,
                            waiting = report.waiting,
                            skipped = report.skipped,
                            conflicts = report.conflicts,
                            failed = report.failed,
                            errors = report.errors,
                            "Sweep finished"
                        );
                    } else {
                        debug!("Sweep found no candidates");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Reactivation scheduler stopped");
    }
}
