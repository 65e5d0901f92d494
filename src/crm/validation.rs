//! Opportunity eligibility rules.
//!
//! Rules never short-circuit: every violated rule contributes a message, in
//! rule order, so the caller sees all reasons at once.

use super::records::OpportunityRecord;
use chrono::{Duration, NaiveDate};
use serde::Serialize;

pub const CLOSED_LOST: &str = "Closed Lost";
pub const CLOSED_WON: &str = "Closed Won";
pub const DEFAULT_STALE_AFTER_DAYS: i64 = 180;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    /// True iff `validation_messages` is empty
    pub valid: bool,
    pub opportunity: OpportunityRecord,
    pub validation_messages: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationRules {
    /// Close dates older than `today - stale_after_days` are rejected
    pub stale_after_days: i64,
}

impl Default for ValidationRules {
    fn default() -> Self {
        Self {
            stale_after_days: DEFAULT_STALE_AFTER_DAYS,
        }
    }
}

impl ValidationRules {
    pub fn new(stale_after_days: i64) -> Self {
        Self { stale_after_days }
    }

    /// Oldest close date still considered current, if representable
    fn cutoff(&self, today: NaiveDate) -> Option<NaiveDate> {
        Duration::try_days(self.stale_after_days).and_then(|window| today.checked_sub_signed(window))
    }

    /// Evaluate every rule against `opportunity` as of `today`.
    pub fn evaluate(&self, opportunity: OpportunityRecord, today: NaiveDate) -> ValidationResult {
        let mut messages = Vec::new();

        if opportunity.stage == CLOSED_LOST {
            messages.push(format!("Opportunity is {}", CLOSED_LOST));
        }

        if opportunity.stage == CLOSED_WON {
            messages.push(format!("Opportunity is already {}", CLOSED_WON));
        }

        // No close date, or a window reaching past the calendar: no cutoff
        if let (Some(close_date), Some(cutoff)) = (opportunity.close_date, self.cutoff(today)) {
            if close_date < cutoff {
                messages.push(format!(
                    "Close date {} is more than {} days in the past",
                    close_date, self.stale_after_days
                ));
            }
        }

        ValidationResult {
            valid: messages.is_empty(),
            opportunity,
            validation_messages: messages,
        }
    }
}
