use std::io::Write;

use mpsim_config::{ConfigError, SimulationConfig};

const JSON: &str = r#"{
  "num_simulations": 2,
  "num_days": 365,
  "seed": 42,
  "daily_utilisations": {
    "base":  { "after_day": 0,   "distribution": "normal",  "mean": 14, "std": 3, "min": 0 },
    "surge": { "after_day": 180, "distribution": "uniform", "min": 18, "max": 22 }
  },
  "parameters": {
    "package_cycle": 2000,
    "items": { "replace couplings": 2000, "overhaul": 8000 },
    "annual_estimate": 5000,
    "annual_estimate_recalculate_after_days": [30, 100],
    "suppressed": [true, false],
    "completion_requirement": true,
    "early_shift_factors": [0, 0.5, 1],
    "late_shift_factors": 0,
    "call_horizon_days": 30
  }
}"#;

fn write_temp(suffix: &str, body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn json_config_expands_to_every_combination() {
    let file = write_temp(".json", JSON);
    let cfg = SimulationConfig::from_path(file.path()).unwrap();
    assert_eq!(cfg.num_simulations, 2);
    assert_eq!(cfg.resolve_seed(), 42);
    assert_eq!(cfg.daily_utilisations["surge"].after_day, 180);

    let sets = cfg.parameter_sets().unwrap();
    assert_eq!(sets.len(), 2 * 2 * 3);
    let intervals: Vec<u32> = sets.iter().map(|s| s.recalc_interval_days()).collect();
    assert!(intervals.contains(&30) && intervals.contains(&100));

    let policy = sets[0].to_policy().unwrap();
    assert_eq!(policy.items.len(), 2);
    assert_eq!(policy.call_horizon_days, 30);
    assert_eq!(policy.package_cycle, 2000.0);
}

#[test]
fn yaml_config_is_read_by_extension() {
    let yaml = r#"
num_simulations: 1
num_days: 30
daily_utilisations:
  base: { after_day: 0, distribution: poisson, lambda: 4 }
parameters:
  items: { couplings: 20 }
  package_cycle: 20
"#;
    let file = write_temp(".yml", yaml);
    let cfg = SimulationConfig::from_path(file.path()).unwrap();
    assert_eq!(cfg.seed, None);
    let sets = cfg.parameter_sets().unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].to_policy().unwrap().recalc_interval_days, 100);
}

#[test]
fn missing_file_reports_the_path() {
    let err = SimulationConfig::from_path("/nonexistent/mpsim.json").unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("/nonexistent/mpsim.json"));
}
