//! Fixed-count, drift-compensated batch loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{error, info, info_span, warn, Instrument};

use crate::plan::BatchPlan;
use crate::rows::RowGenerator;
use crate::sink::{RowSink, TableRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running { tick: u64 },
    Done,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadRunSummary {
    pub ticks_completed: u64,
    pub rows_generated: u64,
    /// Rows rejected individually plus every row of a batch whose sink call failed.
    pub rows_failed: u64,
    /// Batches whose sink call failed outright.
    pub failed_batches: u64,
    pub cancelled: bool,
}

/// Time left in the interval once the tick's own work is accounted for.
pub fn compensated_sleep(interval: Duration, elapsed: Duration) -> Duration {
    interval.saturating_sub(elapsed)
}

pub struct BatchLoadScheduler<R> {
    plan: BatchPlan,
    table: TableRef,
    sink: Arc<dyn RowSink>,
    rows: RowGenerator<R>,
    shutdown: Option<watch::Receiver<bool>>,
    state: SchedulerState,
}

impl<R: Rng + Send> BatchLoadScheduler<R> {
    pub fn new(plan: BatchPlan, table: TableRef, sink: Arc<dyn RowSink>, rows: RowGenerator<R>) -> Self {
        Self {
            plan,
            table,
            sink,
            rows,
            shutdown: None,
            state: SchedulerState::Idle,
        }
    }

    /// Stops the run at the next tick boundary once the receiver reads `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn plan(&self) -> &BatchPlan {
        &self.plan
    }

    /// Runs `total_batches` ticks from tick 0. Sink failures are reported and never retried.
    pub async fn run(&mut self) -> LoadRunSummary {
        let span = info_span!(
            "load_run",
            table = %self.table,
            sink = self.sink.sink_id(),
            total_batches = self.plan.total_batches,
            records_per_batch = self.plan.records_per_batch,
            interval_seconds = self.plan.interval_seconds
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> LoadRunSummary {
        let mut summary = LoadRunSummary::default();
        if self.plan.records_per_batch == 0 {
            warn!(
                records_per_hour = self.plan.records_per_hour,
                batches_per_hour = self.plan.batches_per_hour,
                "hourly target is below the batch count; every batch will be empty"
            );
        }
        info!(total_rows = self.plan.total_rows(), "load run started");

        let interval = self.plan.interval();
        for tick in 0..self.plan.total_batches {
            if self.cancel_requested() {
                summary.cancelled = true;
                break;
            }
            self.state = SchedulerState::Running { tick };
            let tick_start = Instant::now();

            self.run_tick(tick, &mut summary)
                .instrument(info_span!("tick", tick))
                .await;
            summary.ticks_completed += 1;

            if tick + 1 == self.plan.total_batches {
                break;
            }
            let pause = compensated_sleep(interval, tick_start.elapsed());
            if self.sleep_or_cancel(pause).await {
                summary.cancelled = true;
                break;
            }
        }

        self.state = SchedulerState::Done;
        info!(
            ticks = summary.ticks_completed,
            rows = summary.rows_generated,
            failed_rows = summary.rows_failed,
            failed_batches = summary.failed_batches,
            cancelled = summary.cancelled,
            "load run finished"
        );
        summary
    }

    async fn run_tick(&mut self, tick: u64, summary: &mut LoadRunSummary) {
        let batch = self.rows.batch(self.plan.records_per_batch, Utc::now());
        summary.rows_generated += batch.len() as u64;

        match self.sink.insert_batch(&self.table, &batch).await {
            Ok(errors) => {
                for row_error in &errors {
                    warn!(
                        index = row_error.index,
                        comment_id = ?batch.get(row_error.index).map(|r| r.comment_id),
                        error = %row_error.message,
                        "row rejected by sink"
                    );
                }
                summary.rows_failed += errors.len() as u64;
                info!(
                    rows = batch.len(),
                    rejected = errors.len(),
                    "inserted batch {}/{}",
                    tick + 1,
                    self.plan.total_batches
                );
            }
            Err(err) => {
                error!(error = %err, rows = batch.len(), "batch insert failed");
                summary.rows_failed += batch.len() as u64;
                summary.failed_batches += 1;
            }
        }
    }

    fn cancel_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Returns true when cancelled before `pause` elapsed.
    async fn sleep_or_cancel(&mut self, pause: Duration) -> bool {
        let Some(rx) = self.shutdown.as_mut() else {
            sleep(pause).await;
            return false;
        };
        if *rx.borrow() {
            return true;
        }
        // A dropped sender disables the cancel branch; the sleep still completes.
        tokio::select! {
            _ = sleep(pause) => false,
            Ok(_) = rx.wait_for(|stop| *stop) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{RowError, SinkError};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;
    use yci_core::SyntheticRow;

    /// Records the offset from `start` and batch size of every call.
    struct RecordingSink {
        start: Instant,
        delay: Duration,
        reject: Vec<usize>,
        fail: bool,
        calls: Mutex<Vec<(Duration, usize)>>,
    }

    impl RecordingSink {
        fn new(start: Instant) -> Self {
            Self {
                start,
                delay: Duration::ZERO,
                reject: vec![],
                fail: false,
                calls: Mutex::new(vec![]),
            }
        }

        fn offsets_secs(&self) -> Vec<u64> {
            self.calls.lock().unwrap().iter().map(|(at, _)| at.as_secs()).collect()
        }
    }

    #[async_trait]
    impl RowSink for RecordingSink {
        fn sink_id(&self) -> &'static str {
            "recording"
        }

        async fn insert_batch(
            &self,
            _table: &TableRef,
            rows: &[SyntheticRow],
        ) -> Result<Vec<RowError>, SinkError> {
            self.calls.lock().unwrap().push((self.start.elapsed(), rows.len()));
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            if self.fail {
                return Err(SinkError::Unavailable("503 backend error".into()));
            }
            Ok(self
                .reject
                .iter()
                .filter(|&&index| index < rows.len())
                .map(|&index| RowError {
                    index,
                    message: "invalid: bad row".into(),
                })
                .collect())
        }
    }

    fn scheduler(plan: BatchPlan, sink: Arc<RecordingSink>) -> BatchLoadScheduler<StdRng> {
        BatchLoadScheduler::new(
            plan,
            TableRef::new("p", "youtube_comments", "comments_train"),
            sink,
            RowGenerator::new(StdRng::seed_from_u64(3), 180),
        )
    }

    fn three_ticks_of_five() -> BatchPlan {
        BatchPlan::new(1, 15, 1200).unwrap()
    }

    #[test]
    fn compensation_never_goes_negative() {
        let interval = Duration::from_secs(300);
        assert_eq!(compensated_sleep(interval, Duration::from_secs(40)), Duration::from_secs(260));
        assert_eq!(compensated_sleep(interval, Duration::from_secs(300)), Duration::ZERO);
        assert_eq!(compensated_sleep(interval, Duration::from_secs(900)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn row_errors_are_counted_and_the_loop_continues() {
        let sink = Arc::new(RecordingSink {
            reject: vec![1, 3],
            ..RecordingSink::new(Instant::now())
        });
        let mut scheduler = scheduler(three_ticks_of_five(), sink.clone());
        assert_eq!(scheduler.state(), SchedulerState::Idle);

        let summary = scheduler.run().await;
        assert_eq!(
            summary,
            LoadRunSummary {
                ticks_completed: 3,
                rows_generated: 15,
                rows_failed: 6,
                failed_batches: 0,
                cancelled: false,
            }
        );
        assert_eq!(scheduler.state(), SchedulerState::Done);
        let sizes = sink.calls.lock().unwrap().iter().map(|(_, n)| *n).collect::<Vec<_>>();
        assert_eq!(sizes, vec![5, 5, 5]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_sink_does_not_drift_the_schedule() {
        let start = Instant::now();
        let sink = Arc::new(RecordingSink {
            delay: Duration::from_secs(100),
            ..RecordingSink::new(start)
        });
        scheduler(three_ticks_of_five(), sink.clone()).run().await;

        assert_eq!(sink.offsets_secs(), vec![0, 1200, 2400]);
        // No trailing sleep after the last tick.
        assert_eq!(start.elapsed().as_secs(), 2500);
    }

    #[tokio::test(start_paused = true)]
    async fn overrunning_tick_starts_the_next_one_immediately() {
        let start = Instant::now();
        let sink = Arc::new(RecordingSink {
            delay: Duration::from_secs(1500),
            ..RecordingSink::new(start)
        });
        scheduler(three_ticks_of_five(), sink.clone()).run().await;
        assert_eq!(sink.offsets_secs(), vec![0, 1500, 3000]);
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_fails_the_whole_batch_but_not_the_run() {
        let sink = Arc::new(RecordingSink {
            fail: true,
            ..RecordingSink::new(Instant::now())
        });
        let summary = scheduler(three_ticks_of_five(), sink.clone()).run().await;
        assert_eq!(summary.ticks_completed, 3);
        assert_eq!(summary.rows_failed, 15);
        assert_eq!(summary.failed_batches, 3);
        assert_eq!(sink.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn truncated_target_still_ticks_with_empty_batches() {
        let sink = Arc::new(RecordingSink::new(Instant::now()));
        let summary = scheduler(BatchPlan::new(1, 2, 1200).unwrap(), sink.clone())
            .run()
            .await;
        assert_eq!(summary.ticks_completed, 3);
        assert_eq!(summary.rows_generated, 0);
        let sizes = sink.calls.lock().unwrap().iter().map(|(_, n)| *n).collect::<Vec<_>>();
        assert_eq!(sizes, vec![0, 0, 0]);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_hours_goes_straight_to_done() {
        let sink = Arc::new(RecordingSink::new(Instant::now()));
        let mut scheduler = scheduler(BatchPlan::new(0, 1000, 300).unwrap(), sink.clone());
        let summary = scheduler.run().await;
        assert_eq!(summary, LoadRunSummary::default());
        assert_eq!(scheduler.state(), SchedulerState::Done);
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_interrupts_the_inter_tick_sleep() {
        let start = Instant::now();
        let sink = Arc::new(RecordingSink::new(start));
        let (tx, rx) = watch::channel(false);
        let mut scheduler = scheduler(three_ticks_of_five(), sink.clone()).with_shutdown(rx);

        let (summary, _) = tokio::join!(scheduler.run(), async {
            sleep(Duration::from_secs(600)).await;
            tx.send(true).unwrap();
        });

        assert!(summary.cancelled);
        assert_eq!(summary.ticks_completed, 1);
        assert_eq!(start.elapsed().as_secs(), 600);
        assert_eq!(scheduler.state(), SchedulerState::Done);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_shutdown_sender_does_not_cut_sleeps_short() {
        let start = Instant::now();
        let sink = Arc::new(RecordingSink::new(start));
        let (tx, rx) = watch::channel(false);
        drop(tx);
        let summary = scheduler(three_ticks_of_five(), sink.clone())
            .with_shutdown(rx)
            .run()
            .await;
        assert!(!summary.cancelled);
        assert_eq!(sink.offsets_secs(), vec![0, 1200, 2400]);
    }

    #[tokio::test(start_paused = true)]
    async fn default_plan_emits_sixty_batches_of_eighty_three() {
        let sink = Arc::new(RecordingSink::new(Instant::now()));
        let summary = scheduler(BatchPlan::new(5, 1000, 300).unwrap(), sink.clone())
            .run()
            .await;
        assert_eq!(summary.ticks_completed, 60);
        assert_eq!(summary.rows_generated, 4980);
        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 60);
        assert!(calls.iter().all(|(_, n)| *n == 83));
        assert_eq!(calls[59].0.as_secs(), 59 * 300);
    }
}
