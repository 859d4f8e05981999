//! Overdue fine calculation.
//!
//! Lateness is measured in whole minutes and billed per started block of
//! `duration` units: a book one minute late already owes one block.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shelf_types::TimeUnit;

/// Billing parameters: `amount` per `duration` × `unit` of lateness.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinePolicy {
    pub amount: i64,
    pub unit: TimeUnit,
    pub duration: i64,
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self {
            amount: 1000,
            unit: TimeUnit::Day,
            duration: 1,
        }
    }
}

impl FinePolicy {
    pub fn fine(&self, due: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        fine(due, now, self.amount, self.unit, self.duration)
    }
}

/// Number of billing blocks owed for returning at `now` against `due`.
pub fn units_late(due: DateTime<Utc>, now: DateTime<Utc>, unit: TimeUnit, duration: i64) -> i64 {
    if now <= due {
        return 0;
    }
    let late_minutes = (now - due).num_minutes();
    let block_minutes = duration.max(1).saturating_mul(unit.minutes());

    let whole = late_minutes / block_minutes;
    if late_minutes % block_minutes > 0 || whole == 0 {
        whole + 1
    } else {
        whole
    }
}

/// Fine owed for returning at `now` against `due`.
///
/// Zero when on time. Otherwise `units_late × amount`, where a partial
/// block counts as a full one. A non-positive `duration` is treated as 1.
pub fn fine(
    due: DateTime<Utc>,
    now: DateTime<Utc>,
    amount: i64,
    unit: TimeUnit,
    duration: i64,
) -> i64 {
    units_late(due, now, unit, duration).saturating_mul(amount)
}
