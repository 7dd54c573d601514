//! Summary statistics over finished plan tables.

use std::collections::BTreeMap;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{Array, BooleanArray, Float64Array, StringArray, UInt32Array};
use arrow::csv::ReaderBuilder;
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use mpsim_schema::PlanTable;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("missing column: {0}")]
    MissingColumn(String),
    #[error("invalid column type for {0}")]
    InvalidColumnType(String),
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Arrow(#[from] ArrowError),
}

/// Counts for one maintenance item.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ItemSummary {
    pub rows: usize,
    pub called: usize,
    pub completed: usize,
}

impl ItemSummary {
    pub fn completion_rate(&self) -> f64 {
        percentage(self.completed, self.rows)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PlanSummary {
    pub tables: usize,
    pub total_rows: usize,
    pub called: usize,
    pub completed: usize,
    /// Completed rows as a percentage of all rows.
    pub completion_rate: f64,
    pub first_call_day: Option<u32>,
    pub last_call_day: Option<u32>,
    pub first_completion_day: Option<u32>,
    pub last_completion_day: Option<u32>,
    /// Mean of `completion_day - call_day` over completed rows.
    pub avg_lead_days: Option<f64>,
    pub avg_completion_counter: Option<f64>,
    pub avg_planned_counter: Option<f64>,
    /// Mean of `completion_counter - next_planned_counter` over completed rows.
    pub avg_counter_variance: Option<f64>,
    pub per_item: BTreeMap<String, ItemSummary>,
}

#[derive(Default)]
struct Totals {
    lead_days: f64,
    completion_counter: f64,
    planned_counter: f64,
}

impl PlanSummary {
    /// Summarise any number of [`PlanTable`] batches together.
    pub fn from_batches<'a>(
        batches: impl IntoIterator<Item = &'a RecordBatch>,
    ) -> Result<Self, ReportError> {
        let mut summary = PlanSummary::default();
        let mut totals = Totals::default();

        for batch in batches {
            summary.tables += 1;
            summary.accumulate(batch, &mut totals)?;
        }

        summary.completion_rate = percentage(summary.completed, summary.total_rows);
        if summary.completed > 0 {
            let n = summary.completed as f64;
            summary.avg_lead_days = Some(totals.lead_days / n);
            summary.avg_completion_counter = Some(totals.completion_counter / n);
            summary.avg_planned_counter = Some(totals.planned_counter / n);
            summary.avg_counter_variance =
                Some((totals.completion_counter - totals.planned_counter) / n);
        }
        Ok(summary)
    }

    fn accumulate(&mut self, batch: &RecordBatch, totals: &mut Totals) -> Result<(), ReportError> {
        let item = column::<StringArray>(batch, "item")?;
        let called = column::<BooleanArray>(batch, "called")?;
        let completion = column::<BooleanArray>(batch, "completion")?;
        let call_day = column::<UInt32Array>(batch, "call_day")?;
        let completion_day = column::<UInt32Array>(batch, "completion_day")?;
        let completion_counter = column::<Float64Array>(batch, "completion_counter")?;
        let planned_counter = column::<Float64Array>(batch, "next_planned_counter")?;

        for row in 0..batch.num_rows() {
            self.total_rows += 1;
            let per_item = self
                .per_item
                .entry(item.value(row).to_string())
                .or_default();
            per_item.rows += 1;

            let was_called = !called.is_null(row) && called.value(row);
            let was_completed = !completion.is_null(row) && completion.value(row);

            if was_called {
                self.called += 1;
                per_item.called += 1;
            }
            if let Some(day) = value(call_day, row) {
                self.first_call_day = Some(self.first_call_day.map_or(day, |d| d.min(day)));
                self.last_call_day = Some(self.last_call_day.map_or(day, |d| d.max(day)));
            }
            if !was_completed {
                continue;
            }

            self.completed += 1;
            per_item.completed += 1;
            if let Some(day) = value(completion_day, row) {
                self.first_completion_day =
                    Some(self.first_completion_day.map_or(day, |d| d.min(day)));
                self.last_completion_day =
                    Some(self.last_completion_day.map_or(day, |d| d.max(day)));
                if let Some(start) = value(call_day, row) {
                    totals.lead_days += f64::from(day) - f64::from(start);
                }
            }
            totals.completion_counter += value(completion_counter, row).unwrap_or(0.0);
            totals.planned_counter += planned_counter.value(row);
        }
        Ok(())
    }
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "tables:                {}", self.tables)?;
        writeln!(f, "rows:                  {}", self.total_rows)?;
        writeln!(f, "called:                {}", self.called)?;
        writeln!(
            f,
            "completed:             {} ({:.2}%)",
            self.completed, self.completion_rate
        )?;
        writeln!(
            f,
            "call days:             {} .. {}",
            opt(self.first_call_day),
            opt(self.last_call_day)
        )?;
        writeln!(
            f,
            "completion days:       {} .. {}",
            opt(self.first_completion_day),
            opt(self.last_completion_day)
        )?;
        writeln!(f, "avg lead days:         {}", opt_f64(self.avg_lead_days))?;
        writeln!(f, "avg completion ctr:    {}", opt_f64(self.avg_completion_counter))?;
        writeln!(f, "avg planned ctr:       {}", opt_f64(self.avg_planned_counter))?;
        writeln!(f, "avg counter variance:  {}", opt_f64(self.avg_counter_variance))?;
        for (name, item) in &self.per_item {
            writeln!(
                f,
                "  {name}: {} rows, {} called, {} completed ({:.2}%)",
                item.rows,
                item.called,
                item.completed,
                item.completion_rate()
            )?;
        }
        Ok(())
    }
}

/// Read an exported plan table back with the [`PlanTable`] schema.
pub fn read_plan_csv(path: impl AsRef<Path>) -> Result<Vec<RecordBatch>, ReportError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| ReportError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = ReaderBuilder::new(Arc::new(PlanTable::schema()))
        .with_header(true)
        .build(file)?;
    Ok(reader.collect::<Result<Vec<_>, _>>()?)
}

fn column<'a, A: Array + 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a A, ReportError> {
    let idx = batch
        .schema()
        .index_of(name)
        .map_err(|_| ReportError::MissingColumn(name.to_string()))?;
    batch
        .column(idx)
        .as_any()
        .downcast_ref::<A>()
        .ok_or_else(|| ReportError::InvalidColumnType(name.to_string()))
}

fn value<T>(array: &arrow::array::PrimitiveArray<T>, row: usize) -> Option<T::Native>
where
    T: arrow::datatypes::ArrowPrimitiveType,
{
    (!array.is_null(row)).then(|| array.value(row))
}

fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn opt(v: Option<u32>) -> String {
    v.map_or_else(|| "-".to_string(), |d| d.to_string())
}

fn opt_f64(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |x| format!("{x:.2}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{DataType, Field, Schema};

    #[test]
    fn empty_input_has_no_averages() {
        let summary = PlanSummary::from_batches(std::iter::empty()).unwrap();
        assert_eq!(summary.total_rows, 0);
        assert_eq!(summary.completion_rate, 0.0);
        assert_eq!(summary.avg_lead_days, None);
        assert!(summary.to_string().contains("avg lead days:         -"));
    }

    #[test]
    fn foreign_batch_reports_the_missing_column() {
        let schema = Schema::new(vec![Field::new("x", DataType::UInt32, false)]);
        let batch = RecordBatch::try_new(
            Arc::new(schema),
            vec![Arc::new(UInt32Array::from(vec![1u32]))],
        )
        .unwrap();
        let err = PlanSummary::from_batches([&batch]).unwrap_err();
        assert!(matches!(err, ReportError::MissingColumn(name) if name == "item"));
    }

    #[test]
    fn percentages() {
        assert_eq!(percentage(1, 4), 25.0);
        assert_eq!(percentage(3, 0), 0.0);
    }
}
