//! Hourly target → per-interval batch sizing.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub const SECONDS_PER_HOUR: u64 = 3600;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("interval_seconds must be between 1 and 3600, got {0}")]
    Interval(u64),
    #[error("{hours} hours at {records_per_hour} records/hour overflows the batch count")]
    Overflow { hours: u64, records_per_hour: u64 },
}

/// Computed once at startup, read-only afterwards.
///
/// `records_per_batch` is a floor: 1000/hour at 12 batches/hour emits 83 per batch (996/hour),
/// and a target below `batches_per_hour` yields empty batches rather than skipped ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub hours: u64,
    pub records_per_hour: u64,
    pub interval_seconds: u64,
    pub batches_per_hour: u64,
    pub records_per_batch: u64,
    pub total_batches: u64,
}

impl BatchPlan {
    pub fn new(hours: u64, records_per_hour: u64, interval_seconds: u64) -> Result<Self, PlanError> {
        if interval_seconds == 0 || interval_seconds > SECONDS_PER_HOUR {
            return Err(PlanError::Interval(interval_seconds));
        }
        let batches_per_hour = SECONDS_PER_HOUR / interval_seconds;
        let records_per_batch = records_per_hour / batches_per_hour;
        let overflow = PlanError::Overflow {
            hours,
            records_per_hour,
        };
        let total_batches = hours.checked_mul(batches_per_hour).ok_or_else(|| overflow.clone())?;
        total_batches.checked_mul(records_per_batch).ok_or(overflow)?;
        Ok(Self {
            hours,
            records_per_hour,
            interval_seconds,
            batches_per_hour,
            records_per_batch,
            total_batches,
        })
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn total_rows(&self) -> u64 {
        self.total_batches.saturating_mul(self.records_per_batch)
    }

    /// What actually lands per hour after truncation.
    pub fn effective_hourly_rate(&self) -> u64 {
        self.records_per_batch.saturating_mul(self.batches_per_hour)
    }
}
