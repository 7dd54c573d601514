//! Daily usage traces fed to the plan driver.
//!
//! A trace is drawn phase by phase: each phase starts after a configured day
//! and samples from its own distribution until the next phase begins.

use std::collections::BTreeMap;

use mpsim_types::{TraceShapeError, TrialId, UsageTrace};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal, Poisson, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("unsupported distribution '{0}'")]
    UnsupportedDistribution(String),
    #[error("phase '{phase}' is missing parameter '{parameter}'")]
    MissingParameter { phase: String, parameter: &'static str },
    #[error("phase '{phase}' has invalid parameters: {reason}")]
    InvalidParameter { phase: String, reason: String },
    #[error(transparent)]
    Shape(#[from] TraceShapeError),
}

/// Produces one usage trace per trial.
pub trait UsageTraceProvider: Send + Sync {
    fn trace(&self, simulation: TrialId, num_days: u32) -> Result<UsageTrace, TraceError>;
}

/// One entry of `daily_utilisations` as written in the config file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    #[serde(default)]
    pub after_day: u32,
    pub distribution: String,
    #[serde(default)]
    pub mean: Option<f64>,
    #[serde(default)]
    pub std: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub lambda: Option<f64>,
}

#[derive(Clone, Debug)]
enum Sampler {
    Normal(Normal<f64>),
    Uniform(Uniform<f64>),
    Poisson(Poisson<f64>),
}

#[derive(Clone, Debug)]
struct Phase {
    after_day: u32,
    sampler: Sampler,
    min: Option<f64>,
    max: Option<f64>,
}

impl Phase {
    fn from_config(name: &str, cfg: &PhaseConfig) -> Result<Self, TraceError> {
        let require = |value: Option<f64>, parameter: &'static str| {
            value.ok_or_else(|| TraceError::MissingParameter {
                phase: name.to_string(),
                parameter,
            })
        };
        let invalid = |reason: String| TraceError::InvalidParameter {
            phase: name.to_string(),
            reason,
        };

        let sampler = match cfg.distribution.as_str() {
            "normal" => {
                let mean = require(cfg.mean, "mean")?;
                let std = require(cfg.std, "std")?;
                Sampler::Normal(Normal::new(mean, std).map_err(|e| invalid(e.to_string()))?)
            }
            "uniform" => {
                let min = require(cfg.min, "min")?;
                let max = require(cfg.max, "max")?;
                if !(min.is_finite() && max.is_finite() && min <= max) {
                    return Err(invalid(format!("uniform bounds {min}..={max}")));
                }
                Sampler::Uniform(Uniform::new_inclusive(min, max))
            }
            "poisson" => {
                let lambda = require(cfg.lambda, "lambda")?;
                Sampler::Poisson(Poisson::new(lambda).map_err(|e| invalid(e.to_string()))?)
            }
            other => return Err(TraceError::UnsupportedDistribution(other.to_string())),
        };

        Ok(Self {
            after_day: cfg.after_day,
            sampler,
            min: cfg.min,
            max: cfg.max,
        })
    }

    /// Clipped, non-negative sample rounded to 2 decimals.
    fn draw(&self, rng: &mut ChaCha8Rng) -> f64 {
        let mut value = match &self.sampler {
            Sampler::Normal(d) => d.sample(rng),
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Poisson(d) => d.sample(rng),
        };
        if let Some(min) = self.min {
            value = value.max(min);
        }
        if let Some(max) = self.max {
            value = value.min(max);
        }
        (value.max(0.0) * 100.0).round_ties_even() / 100.0
    }
}

/// Samples each trial from the configured phases with its own RNG stream.
#[derive(Clone, Debug)]
pub struct SampledTraceProvider {
    phases: Vec<Phase>,
    seed: u64,
}

impl SampledTraceProvider {
    /// Validate every phase up front; an unknown distribution is fatal.
    pub fn new(phases: &BTreeMap<String, PhaseConfig>, seed: u64) -> Result<Self, TraceError> {
        let mut phases = phases
            .iter()
            .map(|(name, cfg)| Phase::from_config(name, cfg))
            .collect::<Result<Vec<_>, _>>()?;
        phases.sort_by_key(|p| p.after_day);
        Ok(Self { phases, seed })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl UsageTraceProvider for SampledTraceProvider {
    fn trace(&self, simulation: TrialId, num_days: u32) -> Result<UsageTrace, TraceError> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(u64::from(simulation));

        let mut increments = vec![0.0; num_days as usize];
        for (idx, phase) in self.phases.iter().enumerate() {
            let start = phase.after_day.min(num_days) as usize;
            let end = self
                .phases
                .get(idx + 1)
                .map_or(num_days, |next| next.after_day.min(num_days)) as usize;
            for slot in &mut increments[start..end] {
                *slot = phase.draw(&mut rng);
            }
        }

        debug!(simulation, num_days, "usage trace sampled");
        Ok(UsageTrace::from_increments(increments)?)
    }
}

/// Replays the same increments for every trial, zero-padded to `num_days`.
#[derive(Clone, Debug, Default)]
pub struct FixedTraceProvider {
    increments: Vec<f64>,
}

impl FixedTraceProvider {
    pub fn new(increments: Vec<f64>) -> Self {
        Self { increments }
    }
}

impl UsageTraceProvider for FixedTraceProvider {
    fn trace(&self, _simulation: TrialId, num_days: u32) -> Result<UsageTrace, TraceError> {
        let mut increments: Vec<f64> = self
            .increments
            .iter()
            .copied()
            .take(num_days as usize)
            .collect();
        increments.resize(num_days as usize, 0.0);
        Ok(UsageTrace::from_increments(increments)?)
    }
}
