use std::sync::Arc;

use anyhow::Context;
use mpsim_config::SimulationConfig;
use mpsim_report::PlanSummary;
use mpsim_sched::{build_base_plan, run_trial, SchedError};
use mpsim_schema::{plan_state_to_batch, plan_table_name, PlanTable};
use mpsim_store::ResultSink;
use mpsim_trace::{SampledTraceProvider, UsageTraceProvider};
use mpsim_types::{PlanPolicy, PlanState, TrialId};
use tokio::task::JoinSet;
use tracing::{debug, info};

/// Finished trials of one parameter set.
#[derive(Clone, Debug)]
pub struct ParameterSetRun {
    pub index: usize,
    pub policy: Arc<PlanPolicy>,
    /// One table per trial, ordered by simulation id.
    pub tables: Vec<PlanTable>,
    pub summary: PlanSummary,
}

/// Runs independent trials of a plan and hands every finished table to the sink.
pub struct MonteCarloRunner {
    pub trace_provider: Arc<dyn UsageTraceProvider>,
    pub sink: Arc<dyn ResultSink>,
}

impl MonteCarloRunner {
    pub fn new(trace_provider: Arc<dyn UsageTraceProvider>, sink: Arc<dyn ResultSink>) -> Self {
        Self {
            trace_provider,
            sink,
        }
    }

    /// Build the base plan once, then run `num_simulations` trials on the
    /// blocking pool. Each trial works on its own copy of the plan.
    pub async fn run_parameter_set(
        &self,
        index: usize,
        policy: PlanPolicy,
        num_simulations: u32,
        num_days: u32,
    ) -> anyhow::Result<ParameterSetRun> {
        let policy = Arc::new(policy);
        let base = Arc::new(build_base_plan(Arc::clone(&policy)));
        if base.is_empty() {
            return Err(SchedError::EmptyPlan).with_context(|| format!("parameter set {index}"));
        }
        info!(index, rows = base.len(), num_simulations, num_days, "running parameter set");

        let mut trials = JoinSet::new();
        for simulation in 0..num_simulations {
            let base = Arc::clone(&base);
            let provider = Arc::clone(&self.trace_provider);
            trials.spawn_blocking(move || run_one(&base, provider.as_ref(), simulation, num_days));
        }

        let mut finished = Vec::with_capacity(num_simulations as usize);
        while let Some(joined) = trials.join_next().await {
            finished.push(joined.context("trial task panicked")??);
        }
        finished.sort_by_key(|(simulation, _)| *simulation);

        let mut tables = Vec::with_capacity(finished.len());
        for (simulation, table) in finished {
            let name = plan_table_name(index, simulation);
            self.sink
                .append_table(&name, Arc::clone(table.inner()))
                .await
                .with_context(|| format!("writing {name}"))?;
            tables.push(table);
        }

        let summary = PlanSummary::from_batches(tables.iter().map(|t| t.inner().as_ref()))?;
        info!(
            index,
            called = summary.called,
            completed = summary.completed,
            "parameter set finished"
        );
        Ok(ParameterSetRun {
            index,
            policy,
            tables,
            summary,
        })
    }
}

fn run_one(
    base: &PlanState,
    provider: &dyn UsageTraceProvider,
    simulation: TrialId,
    num_days: u32,
) -> anyhow::Result<(TrialId, PlanTable)> {
    let trace = provider
        .trace(simulation, num_days)
        .with_context(|| format!("usage trace for simulation {simulation}"))?;
    let outcome = run_trial(base, &trace, simulation)?;
    debug!(
        simulation,
        calls = outcome.calls,
        completions = outcome.completions,
        "trial done"
    );
    Ok((simulation, plan_state_to_batch(&outcome.state, simulation)?))
}

/// Run every parameter set of `config` (at most `max_sets`) against traces
/// sampled from its utilisation phases.
pub async fn run_config(
    config: &SimulationConfig,
    sink: Arc<dyn ResultSink>,
    max_sets: Option<usize>,
) -> anyhow::Result<Vec<ParameterSetRun>> {
    let seed = config.resolve_seed();
    let provider = SampledTraceProvider::new(&config.daily_utilisations, seed)?;
    let runner = MonteCarloRunner::new(Arc::new(provider), sink);

    let sets = config.parameter_sets()?;
    let limit = max_sets.unwrap_or(sets.len()).min(sets.len());
    info!(seed, sets = sets.len(), running = limit, "starting run");

    let mut runs = Vec::with_capacity(limit);
    for (index, set) in sets.iter().take(limit).enumerate() {
        let policy = set
            .to_policy()
            .with_context(|| format!("parameter set {index}"))?;
        runs.push(
            runner
                .run_parameter_set(index, policy, config.num_simulations, config.num_days)
                .await?,
        );
    }
    Ok(runs)
}
