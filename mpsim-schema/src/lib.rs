#![forbid(unsafe_code)]

pub mod macros;

use std::sync::Arc;

use arrow::array::{ArrayRef, BooleanArray, Float64Array, StringArray, UInt32Array};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use mpsim_types::{PlanRow, PlanState, TrialId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("table {table}: expected {expected} columns, got {actual}")]
    ColumnCount {
        table: String,
        expected: usize,
        actual: usize,
    },
    #[error("table {table}: expected column {expected}, got {actual}")]
    Column {
        table: String,
        expected: String,
        actual: String,
    },
    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

/// Generated table wrappers and schemas for exported plan tables.
pub mod generated {
    use crate::define_tables;

    define_tables! {
        // One row per planned work order of one trial, with the plan policy
        // and trailing scalars repeated on every row.
        table PlanTable {
            kind: "work_order",
            fields: {
                simulation: UInt32 required,
                item: Utf8 required,
                cycle: Float64 required,
                package_cycle: Float64 required,
                call_number: UInt32 required,
                next_planned_counter: Float64 required,
                call_counter: Float64 required,
                units_prior_for_call: Float64 required,
                called: Boolean required,
                completion: Boolean required,
                call_day: UInt32 nullable,
                planned_day: UInt32 nullable,
                work_order_number: UInt32 nullable,
                completion_day: UInt32 nullable,
                completion_counter: Float64 nullable,
                annual_estimate: Float64 required,
                annual_estimate_recalculate_after_days: UInt32 required,
                suppressed: Boolean required,
                completion_requirement: Boolean required,
                early_shift: Float64 required,
                late_shift: Float64 required,
                call_horizon_days: UInt32 required,
                last_completion_counter: Float64 required,
                last_completion_counter_item: Float64 required,
                last_completion_counter_var: Float64 required,
                last_completed_call_number: UInt32 required,
                next_call_number: UInt32 required,
                open_work_orders: Boolean required
            }
        }
    }
}

pub use generated::*;

/// Name under which one trial's table of one parameter set is stored.
pub fn plan_table_name(set_index: usize, simulation: TrialId) -> String {
    format!("set_{set_index:03}/work_order_sim_{simulation}")
}

/// Flatten a finished trial into a [`PlanTable`] batch.
pub fn plan_state_to_batch(state: &PlanState, simulation: TrialId) -> Result<PlanTable, SchemaError> {
    let policy = &state.policy;
    let trailing = &state.trailing;
    let rows = &state.rows;
    let n = rows.len();

    let const_f64 = |v: f64| -> ArrayRef { Arc::new(Float64Array::from(vec![v; n])) };
    let const_u32 = |v: u32| -> ArrayRef { Arc::new(UInt32Array::from(vec![v; n])) };
    let const_bool = |v: bool| -> ArrayRef { Arc::new(BooleanArray::from(vec![v; n])) };

    let columns: Vec<ArrayRef> = vec![
        const_u32(simulation),
        Arc::new(StringArray::from_iter_values(rows.iter().map(|r| r.item.as_str()))),
        f64_column(rows, |r| r.cycle),
        const_f64(policy.package_cycle),
        Arc::new(UInt32Array::from_iter_values(rows.iter().map(|r| r.call_number))),
        f64_column(rows, |r| r.next_planned_counter),
        f64_column(rows, |r| r.call_counter),
        f64_column(rows, |r| r.units_prior_for_call),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.called()).collect::<Vec<_>>())),
        Arc::new(BooleanArray::from(rows.iter().map(|r| r.completed()).collect::<Vec<_>>())),
        opt_u32_column(rows, |r| r.status.call().map(|c| c.call_day)),
        opt_u32_column(rows, |r| r.status.call().map(|c| c.planned_day)),
        opt_u32_column(rows, |r| r.status.call().map(|c| c.work_order_number)),
        opt_u32_column(rows, |r| r.status.completion().map(|c| c.completion_day)),
        Arc::new(
            rows.iter()
                .map(|r| r.status.completion().map(|c| c.completion_counter))
                .collect::<Float64Array>(),
        ),
        f64_column(rows, |r| r.annual_estimate),
        const_u32(policy.recalc_interval_days),
        const_bool(policy.suppressed),
        const_bool(policy.completion_requirement),
        const_f64(policy.early_shift.value()),
        const_f64(policy.late_shift.value()),
        const_u32(policy.call_horizon_days),
        const_f64(trailing.last_completion_counter),
        f64_column(rows, |r| trailing.item_counter(&r.item)),
        const_f64(trailing.last_completion_counter_var),
        const_u32(trailing.last_completed_call_number),
        const_u32(trailing.next_call_number),
        const_bool(trailing.open_work_orders),
    ];

    let batch = RecordBatch::try_new(Arc::new(PlanTable::schema()), columns)?;
    PlanTable::new(Arc::new(batch))
}

fn f64_column(rows: &[PlanRow], f: impl Fn(&PlanRow) -> f64) -> ArrayRef {
    Arc::new(Float64Array::from_iter_values(rows.iter().map(f)))
}

fn opt_u32_column(rows: &[PlanRow], f: impl Fn(&PlanRow) -> Option<u32>) -> ArrayRef {
    Arc::new(rows.iter().map(f).collect::<UInt32Array>())
}
