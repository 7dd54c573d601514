use mpsim_types::{CallRecord, CompletionRecord, PlanRow, PlanState, RowStatus};
use tracing::debug;

use crate::recalc::recalculate;

/// Rows that may be called or completed, derived from the current state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EligibleSets {
    /// `(call_number, call_counter)` of callable rows.
    pub calls: Vec<(u32, f64)>,
    /// `(call_number, planned_day)` of open work orders.
    pub completions: Vec<(u32, u32)>,
}

/// Derive both eligible sets from scratch.
pub fn eligible_sets(state: &PlanState) -> EligibleSets {
    let gated = sequencing_gate(state);
    let calls = state
        .rows
        .iter()
        .filter(|r| is_callable(r, gated))
        .map(|r| (r.call_number, r.call_counter))
        .collect();
    let completions = state
        .rows
        .iter()
        .filter_map(|r| match r.status {
            RowStatus::Called(call) => Some((r.call_number, call.planned_day)),
            _ => None,
        })
        .collect();
    EligibleSets { calls, completions }
}

/// Upper bound on callable call numbers while completion-gated sequencing
/// holds back rows behind an open work order.
fn sequencing_gate(state: &PlanState) -> Option<u32> {
    (state.policy.completion_requirement && state.has_open_work_orders())
        .then_some(state.trailing.next_call_number)
}

fn is_callable(row: &PlanRow, gate: Option<u32>) -> bool {
    !row.called() && gate.map_or(true, |max| row.call_number <= max)
}

/// Call every eligible row whose `call_counter` lies below `cumulative`.
///
/// Returns the call numbers that transitioned, in plan order. When any row was
/// called, `next_call_number` moves past the highest one and the plan is
/// recalculated.
pub fn call_work_orders(state: &mut PlanState, day: u32, cumulative: f64) -> Vec<u32> {
    let gate = sequencing_gate(state);
    let planned_day = day.saturating_add(state.policy.call_horizon_days);

    let mut called = Vec::new();
    for row in state.rows.iter_mut() {
        if !is_callable(row, gate) || row.call_counter >= cumulative {
            continue;
        }
        state.issued_work_orders += 1;
        row.status = RowStatus::Called(CallRecord {
            call_day: day,
            planned_day,
            work_order_number: state.issued_work_orders,
        });
        debug!(
            day,
            call_number = row.call_number,
            item = %row.item,
            call_counter = row.call_counter,
            cumulative,
            "work order called"
        );
        called.push(row.call_number);
    }

    if let Some(&highest) = called.last() {
        state.trailing.next_call_number = highest + 1;
        recalculate(state);
    }
    called
}

/// Complete the open work order `call_number` with the observed counter.
///
/// Returns `false` without touching the state when no such open work order
/// exists, e.g. when acting on a stale eligible set.
pub fn complete_work_order(state: &mut PlanState, day: u32, call_number: u32, counter: f64) -> bool {
    let Some(row) = state.row_mut(call_number) else {
        debug!(day, call_number, "completion ignored: no such row");
        return false;
    };
    let RowStatus::Called(call) = row.status else {
        debug!(day, call_number, "completion ignored: row is not open");
        return false;
    };

    row.status = RowStatus::Completed {
        call,
        completion: CompletionRecord {
            completion_day: day,
            completion_counter: counter,
        },
    };
    let planned = row.next_planned_counter;
    let item = row.item.clone();
    debug!(day, call_number, item = %item, planned, counter, "work order completed");

    let trailing = &mut state.trailing;
    trailing.last_completion_counter_var = planned - counter;
    trailing.last_completion_counter_item.insert(item, counter);
    trailing.last_completion_counter = counter;
    trailing.last_completed_call_number = call_number;

    recalculate(state);
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::build_base_plan;
    use mpsim_types::{MaintenanceItem, PlanPolicy, ShiftFactor};

    fn plan(completion_requirement: bool) -> PlanState {
        let mut state = build_base_plan(Arc::new(PlanPolicy {
            items: vec![
                MaintenanceItem {
                    name: "replace couplings".into(),
                    cycle: 20.0,
                },
                MaintenanceItem {
                    name: "overhaul".into(),
                    cycle: 40.0,
                },
            ],
            package_cycle: 20.0,
            annual_estimate: 365.0,
            recalc_interval_days: 7,
            suppressed: false,
            completion_requirement,
            early_shift: ShiftFactor::NONE,
            late_shift: ShiftFactor::NONE,
            call_horizon_days: 1,
        }));
        recalculate(&mut state);
        state
    }

    #[test]
    fn call_then_complete_updates_trailing_state() {
        let mut state = plan(false);
        let counter = state.rows[0].call_counter;

        let called = call_work_orders(&mut state, 1, counter + 1.0);
        assert_eq!(called, vec![1]);
        let call = *state.rows[0].status.call().unwrap();
        assert_eq!(call.call_day, 1);
        assert_eq!(call.planned_day, 2);
        assert_eq!(call.work_order_number, 1);
        assert_eq!(state.trailing.next_call_number, 2);
        assert!(state.trailing.open_work_orders);

        let planned = state.rows[0].next_planned_counter;
        assert!(complete_work_order(&mut state, 2, 1, counter + 2.0));
        let row = &state.rows[0];
        assert!(row.completed() && row.called());
        assert_eq!(row.status.completion().unwrap().completion_counter, counter + 2.0);
        assert_eq!(state.trailing.last_completion_counter, counter + 2.0);
        assert_eq!(state.trailing.item_counter("replace couplings"), counter + 2.0);
        assert_eq!(state.trailing.item_counter("overhaul"), 0.0);
        assert_eq!(state.trailing.last_completion_counter_var, planned - (counter + 2.0));
        assert_eq!(state.trailing.last_completed_call_number, 1);
        assert!(!state.trailing.open_work_orders);
    }

    #[test]
    fn simultaneous_crossings_are_called_together() {
        let mut state = plan(false);
        let called = call_work_orders(&mut state, 3, 100.0);
        let expected: Vec<u32> = state
            .rows
            .iter()
            .filter(|r| r.called())
            .map(|r| r.call_number)
            .collect();
        assert!(called.len() > 1);
        assert_eq!(called, expected);
        assert_eq!(state.trailing.next_call_number, called.last().unwrap() + 1);
        let numbers: Vec<u32> = called
            .iter()
            .map(|&n| state.row(n).unwrap().status.call().unwrap().work_order_number)
            .collect();
        assert_eq!(numbers, (1..=called.len() as u32).collect::<Vec<_>>());
    }

    #[test]
    fn completion_of_unknown_or_planned_row_is_a_no_op() {
        let mut state = plan(false);
        let before = state.clone();
        assert!(!complete_work_order(&mut state, 5, 999, 100.0));
        assert!(!complete_work_order(&mut state, 5, 1, 100.0));
        assert_eq!(state.rows, before.rows);
        assert_eq!(state.trailing, before.trailing);
    }

    #[test]
    fn gated_plan_holds_back_rows_behind_open_order() {
        let mut state = plan(true);
        let first = state.rows[0].call_counter;
        assert_eq!(call_work_orders(&mut state, 1, first + 0.5), vec![1]);
        // Row 2 is the next expected call; rows beyond it stay planned even
        // though usage has passed their thresholds.
        let called = call_work_orders(&mut state, 2, 1_000.0);
        assert_eq!(called, vec![2]);
        assert!(state.rows.iter().skip(2).all(|r| !r.called()));
        let sets = eligible_sets(&state);
        assert!(sets.calls.iter().all(|&(n, _)| n <= state.trailing.next_call_number));
        assert_eq!(sets.completions, vec![(1, 2), (2, 3)]);
    }

    #[test]
    fn huge_call_horizon_saturates_the_planned_day() {
        let mut state = plan(false);
        let policy = Arc::make_mut(&mut state.policy);
        policy.call_horizon_days = u32::MAX;
        let counter = state.rows[0].call_counter;

        assert_eq!(call_work_orders(&mut state, 3, counter + 1.0), vec![1]);
        let call = state.rows[0].status.call().unwrap();
        assert_eq!(call.call_day, 3);
        assert_eq!(call.planned_day, u32::MAX);
    }
}
