use mpsim_types::{PlanState, DAYS_PER_YEAR};
use tracing::debug;

use crate::recalc::recalculate;

/// Trailing days of raw usage feeding each estimate.
pub const ESTIMATE_WINDOW_DAYS: u32 = 30;

/// Annualised usage rate of a window of daily samples; 0 for an empty window.
pub fn annual_estimate(window: &[f64]) -> f64 {
    // Running mean so a window of identical values yields that value exactly.
    let mean = window
        .iter()
        .enumerate()
        .fold(0.0, |mean, (idx, &x)| mean + (x - mean) / (idx as f64 + 1.0));
    mean * DAYS_PER_YEAR
}

/// Apply a fresh estimate from `window` to every not-yet-called row, then
/// recalculate. Returns the new estimate.
pub fn refresh_annual_estimate(state: &mut PlanState, window: &[f64]) -> f64 {
    let estimate = annual_estimate(window);
    let units_prior = state.policy.units_prior_for(estimate);
    state.annual_estimate = estimate;

    for row in state.rows.iter_mut().filter(|r| !r.called()) {
        row.annual_estimate = estimate;
        row.units_prior_for_call = units_prior;
    }
    debug!(estimate, units_prior, samples = window.len(), "annual estimate refreshed");

    recalculate(state);
    estimate
}
