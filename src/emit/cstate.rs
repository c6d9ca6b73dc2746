//! Sleep-state residency metrics.

use super::ResolvedMetric;
use crate::family::SleepStates;

const POWER_GROUP: &str = "Power";

fn residency(level: u8, scope: &str, pmu: &str, suffix: &str) -> ResolvedMetric {
    ResolvedMetric {
        brief_description: format!("C{} residency percent per {}", level, scope),
        metric_constraint: None,
        metric_expr: format!(r"({}@c{}\-residency@ / msr@tsc@) * 100", pmu, level),
        metric_group: Some(POWER_GROUP.to_string()),
        metric_name: format!("C{}_{}_Residency", level, suffix),
        public_description: None,
        unit: None,
    }
}

/// One metric per core level, then one per package level.
pub fn sleep_state_metrics(states: &SleepStates) -> Vec<ResolvedMetric> {
    let core = states
        .core
        .iter()
        .map(|&level| residency(level, "core", "cstate_core", "Core"));
    let package = states
        .package
        .iter()
        .map(|&level| residency(level, "package", "cstate_pkg", "Pkg"));
    core.chain(package).collect()
}
