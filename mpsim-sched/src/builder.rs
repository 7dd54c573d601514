use std::sync::Arc;

use mpsim_types::{PlanPolicy, PlanRow, PlanState, RowStatus};
use tracing::debug;

/// Occurrences generated per item before ordering and truncation.
pub const OCCURRENCES_PER_ITEM: u32 = 24;

/// Expand the policy's items into the ordered base plan.
///
/// Without suppression every item's occurrences interleave independently,
/// ordered by `(counter, cycle, item)`. With suppression, occurrences that
/// share a counter collapse into the one with the longest cycle. Either way
/// the plan ends at the last occurrence of the shortest-cycle item.
///
/// An empty item set yields an empty plan.
pub fn build_base_plan(policy: Arc<PlanPolicy>) -> PlanState {
    let annual_estimate = policy.annual_estimate;
    let units_prior = policy.units_prior_for(annual_estimate).round_ties_even();

    let mut rows: Vec<PlanRow> = policy
        .items
        .iter()
        .flat_map(|item| {
            (1..=OCCURRENCES_PER_ITEM).map(move |k| {
                let counter = item.cycle * f64::from(k);
                PlanRow {
                    item: item.name.clone(),
                    cycle: item.cycle,
                    call_number: 0,
                    nominal_counter: counter,
                    next_planned_counter: counter,
                    call_counter: counter - units_prior,
                    units_prior_for_call: units_prior,
                    annual_estimate,
                    status: RowStatus::Planned,
                }
            })
        })
        .collect();

    if rows.is_empty() {
        return PlanState::new(policy, rows);
    }

    if policy.suppressed {
        rows.sort_by(|a, b| {
            a.nominal_counter
                .total_cmp(&b.nominal_counter)
                .then(b.cycle.total_cmp(&a.cycle))
                .then_with(|| a.item.cmp(&b.item))
        });
        rows.dedup_by(|later, kept| later.nominal_counter == kept.nominal_counter);
    } else {
        rows.sort_by(|a, b| {
            a.nominal_counter
                .total_cmp(&b.nominal_counter)
                .then(a.cycle.total_cmp(&b.cycle))
                .then_with(|| a.item.cmp(&b.item))
        });
    }

    let min_cycle = rows
        .iter()
        .map(|r| r.cycle)
        .min_by(|a, b| a.total_cmp(b));
    if let Some(min_cycle) = min_cycle {
        if let Some(last) = rows.iter().rposition(|r| r.cycle == min_cycle) {
            rows.truncate(last + 1);
        }
    }

    for (idx, row) in rows.iter_mut().enumerate() {
        row.call_number = idx as u32 + 1;
    }

    debug!(
        rows = rows.len(),
        suppressed = policy.suppressed,
        units_prior,
        "base plan built"
    );
    PlanState::new(policy, rows)
}
