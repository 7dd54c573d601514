use mpsim_types::{PlanPolicy, PlanRow, PlanState, TrailingState};

/// Recompute `next_planned_counter` and `call_counter` for every row that has
/// not been called yet. Called rows are never touched.
///
/// The pass is idempotent: without an intervening event a second pass leaves
/// every row unchanged.
pub fn recalculate(state: &mut PlanState) {
    state.trailing.open_work_orders = state.has_open_work_orders();

    let policy = &*state.policy;
    let trailing = &state.trailing;
    for row in state.rows.iter_mut().filter(|r| !r.called()) {
        if !is_candidate(row, policy, trailing) {
            continue;
        }
        if let Some(counter) = shifted_counter(row, policy, trailing) {
            row.next_planned_counter = counter;
        }
        row.call_counter = row.next_planned_counter - row.units_prior_for_call;
    }
}

/// With completion-gated sequencing only the next expected row is replanned,
/// and only while no work order is outstanding.
fn is_candidate(row: &PlanRow, policy: &PlanPolicy, trailing: &TrailingState) -> bool {
    !policy.completion_requirement
        || (!trailing.open_work_orders && row.call_number == trailing.next_call_number)
}

/// Planned counter of `row` re-anchored on the last completion, or `None` when
/// the row lies before `next_call_number` and keeps its current target.
pub fn shifted_counter(row: &PlanRow, policy: &PlanPolicy, trailing: &TrailingState) -> Option<f64> {
    if row.call_number < trailing.next_call_number {
        return None;
    }

    let last = if policy.suppressed {
        trailing.last_completion_counter
    } else {
        trailing.item_counter(&row.item)
    };
    // Never completed: anchor one package cycle before the row's nominal target.
    let anchor = if last == 0.0 {
        row.nominal_counter - policy.package_cycle
    } else {
        last
    };

    let diff = f64::from(row.call_number) - f64::from(trailing.last_completed_call_number);
    let var = trailing.last_completion_counter_var;
    let mut shifted = anchor + policy.package_cycle * diff;

    if var > 0.0 {
        if let Some(factor) = policy.late_shift.damping() {
            shifted -= factor * var;
        }
    } else if var < 0.0 {
        if let Some(factor) = policy.early_shift.damping() {
            shifted += factor * var.abs();
        }
    }

    Some(shifted)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::build_base_plan;
    use mpsim_types::{CallRecord, MaintenanceItem, RowStatus, ShiftFactor};

    fn plan(suppressed: bool, completion_requirement: bool, early: f64, late: f64) -> PlanState {
        build_base_plan(Arc::new(PlanPolicy {
            items: vec![
                MaintenanceItem {
                    name: "couplings".into(),
                    cycle: 100.0,
                },
                MaintenanceItem {
                    name: "overhaul".into(),
                    cycle: 400.0,
                },
            ],
            package_cycle: 100.0,
            annual_estimate: 3650.0,
            recalc_interval_days: 100,
            suppressed,
            completion_requirement,
            early_shift: ShiftFactor::new(early).unwrap(),
            late_shift: ShiftFactor::new(late).unwrap(),
            call_horizon_days: 2,
        }))
    }

    fn counters(state: &PlanState) -> Vec<(f64, f64)> {
        state
            .rows
            .iter()
            .map(|r| (r.next_planned_counter, r.call_counter))
            .collect()
    }

    #[test]
    fn first_row_keeps_nominal_target_before_any_completion() {
        let mut state = plan(true, false, 0.0, 0.0);
        recalculate(&mut state);
        let first = &state.rows[0];
        assert_eq!(first.next_planned_counter, 100.0);
        assert_eq!(first.call_counter, 100.0 - 20.0);
    }

    #[test]
    fn second_pass_is_a_fixed_point() {
        for (suppressed, gated) in [(true, false), (false, false), (true, true), (false, true)] {
            let mut state = plan(suppressed, gated, 0.5, 0.5);
            state.trailing.last_completion_counter = 130.0;
            state.trailing.last_completion_counter_item.insert("couplings".into(), 130.0);
            state.trailing.last_completion_counter_var = -30.0;
            state.trailing.last_completed_call_number = 1;
            state.trailing.next_call_number = 2;
            recalculate(&mut state);
            let once = counters(&state);
            recalculate(&mut state);
            assert_eq!(once, counters(&state));
        }
    }

    #[test]
    fn called_rows_are_untouched() {
        let mut state = plan(true, false, 0.0, 0.0);
        state.rows[0].status = RowStatus::Called(CallRecord {
            call_day: 1,
            planned_day: 3,
            work_order_number: 1,
        });
        state.rows[0].next_planned_counter = 12345.0;
        state.rows[0].call_counter = 12000.0;
        state.trailing.last_completion_counter = 500.0;
        recalculate(&mut state);
        assert_eq!(state.rows[0].next_planned_counter, 12345.0);
        assert_eq!(state.rows[0].call_counter, 12000.0);
        assert!(state.trailing.open_work_orders);
    }

    #[test]
    fn late_completion_is_partially_absorbed() {
        let mut state = plan(true, false, 0.5, 0.0);
        state.trailing.last_completion_counter = 130.0;
        state.trailing.last_completion_counter_var = -30.0;
        state.trailing.last_completed_call_number = 1;
        state.trailing.next_call_number = 2;
        let row = state.row(2).unwrap().clone();
        // 130 + 100 * 1 + 0.5 * 30
        assert_eq!(shifted_counter(&row, &state.policy, &state.trailing), Some(245.0));
    }

    #[test]
    fn early_completion_is_partially_absorbed() {
        let mut state = plan(true, false, 0.0, 0.25);
        state.trailing.last_completion_counter = 80.0;
        state.trailing.last_completion_counter_var = 20.0;
        state.trailing.last_completed_call_number = 1;
        state.trailing.next_call_number = 2;
        let row = state.row(3).unwrap().clone();
        // 80 + 100 * 2 - 0.25 * 20
        assert_eq!(shifted_counter(&row, &state.policy, &state.trailing), Some(275.0));
    }

    #[test]
    fn full_shift_factor_applies_no_damping() {
        let mut state = plan(true, false, 1.0, 1.0);
        state.trailing.last_completion_counter = 130.0;
        state.trailing.last_completion_counter_var = -30.0;
        state.trailing.last_completed_call_number = 1;
        state.trailing.next_call_number = 2;
        let row = state.row(2).unwrap().clone();
        assert_eq!(shifted_counter(&row, &state.policy, &state.trailing), Some(230.0));
    }

    #[test]
    fn rows_before_next_call_number_keep_target() {
        let mut state = plan(true, false, 0.0, 0.0);
        state.trailing.next_call_number = 3;
        state.rows[0].units_prior_for_call = 7.0;
        let before = state.rows[0].next_planned_counter;
        recalculate(&mut state);
        assert_eq!(state.rows[0].next_planned_counter, before);
        assert_eq!(state.rows[0].call_counter, before - 7.0);
    }

    #[test]
    fn gated_plan_only_replans_next_expected_row() {
        let mut state = plan(true, true, 0.0, 0.0);
        state.trailing.last_completion_counter = 150.0;
        state.trailing.last_completed_call_number = 1;
        state.trailing.next_call_number = 2;
        let third_before = state.rows[2].next_planned_counter;
        recalculate(&mut state);
        assert_eq!(state.rows[1].next_planned_counter, 250.0);
        assert_eq!(state.rows[2].next_planned_counter, third_before);
    }

    #[test]
    fn non_suppressed_rows_anchor_on_their_own_item() {
        let mut state = plan(false, false, 0.0, 0.0);
        state.trailing.last_completion_counter = 900.0;
        state.trailing.last_completion_counter_item.insert("couplings".into(), 110.0);
        state.trailing.last_completed_call_number = 1;
        state.trailing.next_call_number = 2;
        let row = state.row(2).unwrap().clone();
        assert_eq!(row.item, "couplings");
        assert_eq!(shifted_counter(&row, &state.policy, &state.trailing), Some(210.0));
    }
}
