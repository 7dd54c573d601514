//! Simulation config loading and parameter-set expansion.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use mpsim_trace::PhaseConfig;
use mpsim_types::{MaintenanceItem, PlanPolicy, ShiftFactor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

/// Recalculation interval used when the configured one is unusable.
pub const DEFAULT_RECALC_INTERVAL_DAYS: u32 = 100;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("parameter '{key}' {reason}")]
    InvalidParameter { key: &'static str, reason: String },
}

/// Top-level run configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub num_simulations: u32,
    pub num_days: u32,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub daily_utilisations: BTreeMap<String, PhaseConfig>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
}

impl SimulationConfig {
    /// Load from JSON, or YAML when the extension is `.yaml`/`.yml`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml" | "yml")
        );
        if yaml {
            Ok(serde_yaml::from_str(&text)?)
        } else {
            Ok(serde_json::from_str(&text)?)
        }
    }

    /// Configured seed, or a fresh random one which is logged for replay.
    pub fn resolve_seed(&self) -> u64 {
        match self.seed {
            Some(seed) => seed,
            None => {
                let seed = rand::random::<u64>();
                info!(seed, "no seed configured; drew a random one");
                seed
            }
        }
    }

    /// Every parameter combination, validated and numbered from 0.
    pub fn parameter_sets(&self) -> Result<Vec<ParameterSet>, ConfigError> {
        generate_parameter_combinations(&self.parameters)
            .iter()
            .map(ParameterSet::from_combination)
            .collect()
    }
}

/// Cartesian product over `parameters`: array values are option lists, any
/// other value is a single option. Keys are visited in sorted order.
pub fn generate_parameter_combinations(
    parameters: &BTreeMap<String, Value>,
) -> Vec<BTreeMap<String, Value>> {
    let mut combinations = vec![BTreeMap::new()];
    for (key, value) in parameters {
        let options: &[Value] = match value {
            Value::Array(options) => options,
            single => std::slice::from_ref(single),
        };
        combinations = combinations
            .into_iter()
            .flat_map(|partial| {
                options.iter().map(move |option| {
                    let mut next = partial.clone();
                    next.insert(key.clone(), option.clone());
                    next
                })
            })
            .collect();
    }
    combinations
}

/// Positive integer from a loosely typed value: the first element of a list,
/// a number, or a numeric string. Falls back to `default`; never below 1.
pub fn resolve_positive_int(value: &Value, default: u32) -> u32 {
    let resolved = parse_int(value)
        .unwrap_or(i64::from(default))
        .clamp(1, i64::from(u32::MAX));
    resolved as u32
}

fn parse_int(value: &Value) -> Option<i64> {
    let candidate = match value {
        Value::Array(values) => values.first()?,
        other => other,
    };
    match candidate {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn default_interval() -> Value {
    Value::from(DEFAULT_RECALC_INTERVAL_DAYS)
}

fn default_true() -> bool {
    true
}

/// One parameter combination with defaults filled in.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(default)]
    pub items: BTreeMap<String, f64>,
    #[serde(default)]
    pub package_cycle: f64,
    #[serde(default)]
    pub annual_estimate: f64,
    #[serde(default = "default_interval")]
    pub annual_estimate_recalculate_after_days: Value,
    #[serde(default)]
    pub suppressed: bool,
    #[serde(default = "default_true")]
    pub completion_requirement: bool,
    #[serde(default)]
    pub early_shift_factors: f64,
    #[serde(default)]
    pub late_shift_factors: f64,
    #[serde(default)]
    pub call_horizon_days: u32,
}

impl ParameterSet {
    pub fn from_combination(combination: &BTreeMap<String, Value>) -> Result<Self, ConfigError> {
        let object = combination
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        Ok(serde_json::from_value(Value::Object(object))?)
    }

    pub fn recalc_interval_days(&self) -> u32 {
        resolve_positive_int(
            &self.annual_estimate_recalculate_after_days,
            DEFAULT_RECALC_INTERVAL_DAYS,
        )
    }

    /// Validate and convert into the policy the scheduler runs on.
    pub fn to_policy(&self) -> Result<PlanPolicy, ConfigError> {
        let items = self
            .items
            .iter()
            .map(|(name, &cycle)| {
                if cycle.is_finite() && cycle > 0.0 {
                    Ok(MaintenanceItem {
                        name: name.clone(),
                        cycle,
                    })
                } else {
                    Err(ConfigError::InvalidParameter {
                        key: "items",
                        reason: format!("cycle of '{name}' must be positive, got {cycle}"),
                    })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        let interval = &self.annual_estimate_recalculate_after_days;
        if parse_int(interval).is_none() {
            warn!(
                value = %interval,
                default = DEFAULT_RECALC_INTERVAL_DAYS,
                "unusable recalculation interval; using default"
            );
        }

        non_negative("package_cycle", self.package_cycle)?;
        non_negative("annual_estimate", self.annual_estimate)?;

        Ok(PlanPolicy {
            items,
            package_cycle: self.package_cycle,
            annual_estimate: self.annual_estimate,
            recalc_interval_days: self.recalc_interval_days(),
            suppressed: self.suppressed,
            completion_requirement: self.completion_requirement,
            early_shift: shift("early_shift_factors", self.early_shift_factors)?,
            late_shift: shift("late_shift_factors", self.late_shift_factors)?,
            call_horizon_days: self.call_horizon_days,
        })
    }
}

fn non_negative(key: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidParameter {
            key,
            reason: format!("must be a non-negative number, got {value}"),
        })
    }
}

fn shift(key: &'static str, value: f64) -> Result<ShiftFactor, ConfigError> {
    ShiftFactor::new(value).ok_or_else(|| ConfigError::InvalidParameter {
        key,
        reason: format!("must lie in [0, 1], got {value}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: Value) -> BTreeMap<String, Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn scalars_are_single_options() {
        let combos = generate_parameter_combinations(&params(json!({"a": [1, 2], "b": ["x", "y"], "c": 10})));
        assert_eq!(combos.len(), 4);
        assert_eq!(combos[0], params(json!({"a": 1, "b": "x", "c": 10})));
        assert_eq!(combos[3], params(json!({"a": 2, "b": "y", "c": 10})));
    }

    #[test]
    fn empty_option_list_yields_nothing() {
        assert!(generate_parameter_combinations(&params(json!({"a": [], "b": 1}))).is_empty());
        assert_eq!(generate_parameter_combinations(&BTreeMap::new()).len(), 1);
    }

    #[test]
    fn positive_int_resolution() {
        assert_eq!(resolve_positive_int(&json!([30, 100]), 100), 30);
        assert_eq!(resolve_positive_int(&json!("45"), 100), 45);
        assert_eq!(resolve_positive_int(&json!(12.7), 100), 12);
        assert_eq!(resolve_positive_int(&json!("soon"), 100), 100);
        assert_eq!(resolve_positive_int(&json!([]), 100), 100);
        assert_eq!(resolve_positive_int(&json!(0), 100), 1);
        assert_eq!(resolve_positive_int(&json!(-5), 100), 1);
    }

    #[test]
    fn defaults_fill_missing_keys() {
        let set = ParameterSet::from_combination(&BTreeMap::new()).unwrap();
        let policy = set.to_policy().unwrap();
        assert!(policy.items.is_empty());
        assert_eq!(policy.recalc_interval_days, 100);
        assert!(!policy.suppressed);
        assert!(policy.completion_requirement);
        assert_eq!(policy.early_shift, ShiftFactor::NONE);
        assert_eq!(policy.call_horizon_days, 0);
    }

    #[test]
    fn items_keep_name_order() {
        let set = ParameterSet::from_combination(&params(json!({
            "items": {"replace couplings": 2000, "overhaul": 8000},
            "package_cycle": 2000,
        })))
        .unwrap();
        let names: Vec<_> = set.to_policy().unwrap().items.into_iter().map(|i| i.name).collect();
        assert_eq!(names, ["overhaul", "replace couplings"]);
    }

    #[test]
    fn out_of_range_shift_is_rejected() {
        let set = ParameterSet::from_combination(&params(json!({"late_shift_factors": 1.5}))).unwrap();
        let err = set.to_policy().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidParameter { key: "late_shift_factors", .. }));
    }

    #[test]
    fn non_positive_cycle_is_rejected() {
        let set = ParameterSet::from_combination(&params(json!({"items": {"couplings": 0}}))).unwrap();
        assert!(set.to_policy().is_err());
    }

    #[test]
    fn configured_seed_wins() {
        let cfg = SimulationConfig {
            num_simulations: 1,
            num_days: 10,
            seed: Some(9),
            daily_utilisations: BTreeMap::new(),
            parameters: BTreeMap::new(),
        };
        assert_eq!(cfg.resolve_seed(), 9);
    }
}
