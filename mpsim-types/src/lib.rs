use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Days used to annualise a daily usage rate.
pub const DAYS_PER_YEAR: f64 = 365.0;

/// Identifier of one Monte Carlo trial ("simulation" column in output tables).
pub type TrialId = u32;

/// A maintenance activity type with its own counter cycle.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceItem {
    pub name: String,
    pub cycle: f64,
}

/// Damping coefficient in `[0, 1]` applied to observed plan drift.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ShiftFactor(f64);

impl ShiftFactor {
    pub const NONE: ShiftFactor = ShiftFactor(0.0);

    /// Returns `None` for values outside `[0, 1]` (including NaN).
    pub fn new(value: f64) -> Option<Self> {
        if (0.0..=1.0).contains(&value) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn value(self) -> f64 {
        self.0
    }

    /// Partial damping coefficient. Only values strictly inside `(0, 1)` damp;
    /// 0 and 1 both accept the full shift.
    pub fn damping(self) -> Option<f64> {
        if self.0 > 0.0 && self.0 < 1.0 {
            Some(self.0)
        } else {
            None
        }
    }
}

/// Plan-level policy for one parameter combination.
///
/// Every row of a plan is governed by the same policy, so it lives here and is
/// shared read-only by all trials instead of being copied onto each row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanPolicy {
    pub items: Vec<MaintenanceItem>,
    pub package_cycle: f64,
    pub annual_estimate: f64,
    pub recalc_interval_days: u32,
    pub suppressed: bool,
    pub completion_requirement: bool,
    pub early_shift: ShiftFactor,
    pub late_shift: ShiftFactor,
    pub call_horizon_days: u32,
}

impl PlanPolicy {
    /// Lead-time usage buffer for a given annual usage estimate.
    pub fn units_prior_for(&self, annual_estimate: f64) -> f64 {
        annual_estimate / DAYS_PER_YEAR * f64::from(self.call_horizon_days)
    }
}

/// Recorded when a row is called.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CallRecord {
    pub call_day: u32,
    /// `call_day + call_horizon_days`.
    pub planned_day: u32,
    pub work_order_number: u32,
}

/// Recorded when a called row is completed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CompletionRecord {
    pub completion_day: u32,
    /// Cumulative usage observed on the completion day.
    pub completion_counter: f64,
}

/// Lifecycle of a plan row: `Planned -> Called -> Completed`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum RowStatus {
    #[default]
    Planned,
    Called(CallRecord),
    Completed {
        call: CallRecord,
        completion: CompletionRecord,
    },
}

impl RowStatus {
    pub fn is_called(&self) -> bool {
        !matches!(self, RowStatus::Planned)
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, RowStatus::Completed { .. })
    }

    /// Called but not yet completed.
    pub fn is_open(&self) -> bool {
        matches!(self, RowStatus::Called(_))
    }

    pub fn call(&self) -> Option<&CallRecord> {
        match self {
            RowStatus::Planned => None,
            RowStatus::Called(call) | RowStatus::Completed { call, .. } => Some(call),
        }
    }

    pub fn completion(&self) -> Option<&CompletionRecord> {
        match self {
            RowStatus::Completed { completion, .. } => Some(completion),
            _ => None,
        }
    }
}

/// One scheduled occurrence of one maintenance item.
#[derive(Clone, Debug, PartialEq)]
pub struct PlanRow {
    pub item: String,
    pub cycle: f64,
    /// Dense 1-based position within the plan.
    pub call_number: u32,
    /// Counter assigned by the plan builder; never mutated afterwards.
    pub nominal_counter: f64,
    pub next_planned_counter: f64,
    /// `next_planned_counter - units_prior_for_call`.
    pub call_counter: f64,
    pub units_prior_for_call: f64,
    pub annual_estimate: f64,
    pub status: RowStatus,
}

impl PlanRow {
    pub fn called(&self) -> bool {
        self.status.is_called()
    }

    pub fn completed(&self) -> bool {
        self.status.is_completed()
    }
}

/// Plan-wide scalars updated by completions and read by every row.
#[derive(Clone, Debug, PartialEq)]
pub struct TrailingState {
    pub last_completion_counter: f64,
    /// Most recent completion counter per item.
    pub last_completion_counter_item: BTreeMap<String, f64>,
    /// Planned minus actual counter of the most recent completion.
    pub last_completion_counter_var: f64,
    pub last_completed_call_number: u32,
    pub next_call_number: u32,
    pub open_work_orders: bool,
}

impl Default for TrailingState {
    fn default() -> Self {
        Self {
            last_completion_counter: 0.0,
            last_completion_counter_item: BTreeMap::new(),
            last_completion_counter_var: 0.0,
            last_completed_call_number: 0,
            next_call_number: 1,
            open_work_orders: false,
        }
    }
}

impl TrailingState {
    /// Last completion counter of `item`, 0 when it never completed.
    pub fn item_counter(&self, item: &str) -> f64 {
        self.last_completion_counter_item
            .get(item)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Full plan for one trial: ordered rows plus the shared trailing state.
///
/// Cloning a `PlanState` copies all rows and trailing scalars; only the
/// immutable policy is shared.
#[derive(Clone, Debug)]
pub struct PlanState {
    pub policy: Arc<PlanPolicy>,
    pub rows: Vec<PlanRow>,
    pub trailing: TrailingState,
    /// Usage-rate estimate most recently applied to open rows.
    pub annual_estimate: f64,
    pub issued_work_orders: u32,
}

impl PlanState {
    pub fn new(policy: Arc<PlanPolicy>, rows: Vec<PlanRow>) -> Self {
        let annual_estimate = policy.annual_estimate;
        Self {
            policy,
            rows,
            trailing: TrailingState::default(),
            annual_estimate,
            issued_work_orders: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, call_number: u32) -> Option<&PlanRow> {
        self.rows.iter().find(|r| r.call_number == call_number)
    }

    pub fn row_mut(&mut self, call_number: u32) -> Option<&mut PlanRow> {
        self.rows.iter_mut().find(|r| r.call_number == call_number)
    }

    pub fn has_open_work_orders(&self) -> bool {
        self.rows.iter().any(|r| r.status.is_open())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum TraceShapeError {
    #[error("usage on day {day} is negative ({value})")]
    Negative { day: u32, value: f64 },
    #[error("usage on day {day} is not finite")]
    NonFinite { day: u32 },
}

/// Day-indexed usage for one trial. Days are numbered from 1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct UsageTrace {
    increments: Vec<f64>,
    cumulative: Vec<f64>,
}

impl UsageTrace {
    pub fn from_increments(increments: Vec<f64>) -> Result<Self, TraceShapeError> {
        let mut cumulative = Vec::with_capacity(increments.len());
        let mut total = 0.0;
        for (idx, &value) in increments.iter().enumerate() {
            let day = idx as u32 + 1;
            if !value.is_finite() {
                return Err(TraceShapeError::NonFinite { day });
            }
            if value < 0.0 {
                return Err(TraceShapeError::Negative { day, value });
            }
            total += value;
            cumulative.push(total);
        }
        Ok(Self {
            increments,
            cumulative,
        })
    }

    /// Rebuild increments from a running total; the total must not decrease.
    pub fn from_cumulative(cumulative: &[f64]) -> Result<Self, TraceShapeError> {
        let mut prev = 0.0;
        let increments = cumulative
            .iter()
            .map(|&c| {
                let inc = c - prev;
                prev = c;
                inc
            })
            .collect();
        Self::from_increments(increments)
    }

    pub fn num_days(&self) -> u32 {
        self.increments.len() as u32
    }

    pub fn usage_on(&self, day: u32) -> Option<f64> {
        let idx = (day as usize).checked_sub(1)?;
        self.increments.get(idx).copied()
    }

    pub fn cumulative_on(&self, day: u32) -> Option<f64> {
        let idx = (day as usize).checked_sub(1)?;
        self.cumulative.get(idx).copied()
    }

    /// Raw increments of the `len` days ending at `day` (inclusive), clipped
    /// to the start of the trace.
    pub fn window(&self, day: u32, len: u32) -> &[f64] {
        let end = (day as usize).min(self.increments.len());
        let start = (day as usize + 1).saturating_sub(len as usize).max(1) - 1;
        if start >= end {
            return &[];
        }
        &self.increments[start..end]
    }

    pub fn increments(&self) -> &[f64] {
        &self.increments
    }

    pub fn cumulative(&self) -> &[f64] {
        &self.cumulative
    }
}
