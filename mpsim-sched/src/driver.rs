use mpsim_types::{PlanState, TrialId, UsageTrace};
use tracing::{debug, info_span};

use crate::estimate::{refresh_annual_estimate, ESTIMATE_WINDOW_DAYS};
use crate::recalc::recalculate;
use crate::transition::{call_work_orders, complete_work_order, eligible_sets};
use crate::SchedError;

/// Days between forced recalculation passes.
pub const WEEKLY_PASS_DAYS: u32 = 7;

/// What happened on one simulated day.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DayReport {
    pub day: u32,
    pub cumulative: f64,
    pub annual_estimate: Option<f64>,
    pub called: Vec<u32>,
    pub completed: Vec<u32>,
}

/// Finished plan of one trial.
#[derive(Clone, Debug)]
pub struct TrialOutcome {
    pub simulation: TrialId,
    pub state: PlanState,
    pub calls: usize,
    pub completions: usize,
}

/// Steps one trial's private copy of the plan through its usage trace.
pub struct TrialDriver<'a> {
    simulation: TrialId,
    state: PlanState,
    trace: &'a UsageTrace,
    calls: usize,
    completions: usize,
}

impl<'a> TrialDriver<'a> {
    /// Copy `base` for a new trial. Refuses to run against an empty plan.
    pub fn new(base: &PlanState, trace: &'a UsageTrace, simulation: TrialId) -> Result<Self, SchedError> {
        if base.is_empty() {
            return Err(SchedError::EmptyPlan);
        }
        let mut state = base.clone();
        recalculate(&mut state);
        Ok(Self {
            simulation,
            state,
            trace,
            calls: 0,
            completions: 0,
        })
    }

    pub fn state(&self) -> &PlanState {
        &self.state
    }

    /// Advance the plan through `day`: weekly pass, estimator refresh, calls,
    /// then completions.
    pub fn step(&mut self, day: u32) -> Result<DayReport, SchedError> {
        let trace = self.trace;
        let cumulative = trace.cumulative_on(day).ok_or(SchedError::DayOutOfRange {
            day,
            num_days: trace.num_days(),
        })?;
        let mut report = DayReport {
            day,
            cumulative,
            ..DayReport::default()
        };

        if day % WEEKLY_PASS_DAYS == 0 {
            recalculate(&mut self.state);
        }

        if day % self.state.policy.recalc_interval_days.max(1) == 0 {
            let window = trace.window(day, ESTIMATE_WINDOW_DAYS);
            report.annual_estimate = Some(refresh_annual_estimate(&mut self.state, window));
        }

        loop {
            let sets = eligible_sets(&self.state);
            if !sets.calls.iter().any(|&(_, threshold)| cumulative > threshold) {
                break;
            }
            let called = call_work_orders(&mut self.state, day, cumulative);
            if called.is_empty() {
                break;
            }
            report.called.extend(called);
        }

        loop {
            let sets = eligible_sets(&self.state);
            let Some(&(call_number, _)) = sets.completions.iter().find(|&&(_, planned)| planned == day) else {
                break;
            };
            if !complete_work_order(&mut self.state, day, call_number, cumulative) {
                break;
            }
            report.completed.push(call_number);
        }

        self.calls += report.called.len();
        self.completions += report.completed.len();
        Ok(report)
    }

    /// Step every day of the trace and freeze the plan.
    pub fn run(mut self) -> Result<TrialOutcome, SchedError> {
        let span = info_span!("trial", simulation = self.simulation);
        let _guard = span.enter();

        for day in 1..=self.trace.num_days() {
            let report = self.step(day)?;
            if !report.called.is_empty() || !report.completed.is_empty() {
                debug!(
                    day,
                    called = ?report.called,
                    completed = ?report.completed,
                    "plan changed"
                );
            }
        }

        debug!(calls = self.calls, completions = self.completions, "trial finished");
        Ok(TrialOutcome {
            simulation: self.simulation,
            state: self.state,
            calls: self.calls,
            completions: self.completions,
        })
    }
}

/// Run one complete trial on a private copy of `base`.
pub fn run_trial(base: &PlanState, trace: &UsageTrace, simulation: TrialId) -> Result<TrialOutcome, SchedError> {
    TrialDriver::new(base, trace, simulation)?.run()
}
