//! Maintenance-plan state machine and its day-stepped driver.
//!
//! A trial starts from a copy of the base plan produced by [`build_base_plan`]
//! and is stepped day by day by [`TrialDriver`]. Every state-changing event
//! (call, completion, estimator refresh, weekly pass) ends with a
//! [`recalculate`] pass over the rows that have not been called yet.

use thiserror::Error;

pub mod builder;
pub mod driver;
pub mod estimate;
pub mod recalc;
pub mod transition;

pub use builder::{build_base_plan, OCCURRENCES_PER_ITEM};
pub use driver::{run_trial, DayReport, TrialDriver, TrialOutcome, WEEKLY_PASS_DAYS};
pub use estimate::{annual_estimate, refresh_annual_estimate, ESTIMATE_WINDOW_DAYS};
pub use recalc::{recalculate, shifted_counter};
pub use transition::{call_work_orders, complete_work_order, eligible_sets, EligibleSets};

#[derive(Debug, Error, PartialEq)]
pub enum SchedError {
    #[error("plan has no rows; no simulation possible")]
    EmptyPlan,
    #[error("day {day} is outside the usage trace ({num_days} days)")]
    DayOutOfRange { day: u32, num_days: u32 },
}
