//! Turns resolved formulas into perf metric descriptors.
//!
//! The emitter owns everything that happens after resolution: naming of SMT
//! variants, group and description cleanup, fixed per-metric tables and the
//! optional distinct-event threshold. Supplementary descriptors and
//! sleep-state metrics are appended after the sheet's own metrics.

pub mod cstate;
pub mod describe;
pub mod overrides;

pub use cstate::sleep_state_metrics;

use crate::error::EngineError;
use crate::family::FamilyProfile;
use crate::graph::RefGraph;
use crate::resolve::{ResolveOptions, evaluate};
use crate::sheet::MetricRecord;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::LazyLock;

const LOG_TARGET: &str = "emit";

const SMT_PREFIX: &str = "SMT";
const SMT_SUFFIX: &str = "_SMT";

/// Formula text marking a row that has no value for the family.
const NOT_AVAILABLE: &[&str] = &["#NA", "N/A"];

/// Counter terms: `pmu@...@` blocks and bare event names with any `:mod`
/// suffixes.
static COUNTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-z_][a-z0-9_]*@[^@]*@|[A-Za-z_][A-Za-z0-9_.]*(?::[A-Za-z0-9]+)*")
        .expect("valid counter pattern")
});

/// Identifiers in a final expression that are not counters.
const KEYWORDS: &[&str] = &["if", "else", "in", "not", "and", "or", "max", "min", "duration_time"];

/// One output metric, serialized with perf's field names in alphabetical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedMetric {
    pub brief_description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_constraint: Option<String>,
    pub metric_expr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_group: Option<String>,
    pub metric_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// An entry of the output array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Descriptor {
    Resolved(ResolvedMetric),
    /// Caller-supplied, passed through untouched.
    Supplied(serde_json::Value),
}

#[derive(Debug, Clone, Default)]
pub struct EmitOptions {
    /// Copied to every resolved metric's `Unit`.
    pub unit: Option<String>,
    /// Drop metrics referencing fewer distinct counters than this.
    pub min_events: Option<usize>,
    /// Append sleep-state residency metrics.
    pub cstates: bool,
}

pub struct Emitter<'a> {
    graph: &'a RefGraph,
    profile: &'a FamilyProfile,
    resolve: &'a ResolveOptions,
    options: &'a EmitOptions,
}

impl<'a> Emitter<'a> {
    pub fn new(
        graph: &'a RefGraph,
        profile: &'a FamilyProfile,
        resolve: &'a ResolveOptions,
        options: &'a EmitOptions,
    ) -> Self {
        Self {
            graph,
            profile,
            resolve,
            options,
        }
    }

    /// Full output: sheet metrics, then `supplementary`, then sleep states.
    pub fn emit(&self, supplementary: Vec<serde_json::Value>) -> Result<Vec<Descriptor>, EngineError> {
        self.assemble(self.resolve_all()?, supplementary)
    }

    /// Append `supplementary` and, when requested, sleep-state metrics to
    /// already resolved metrics.
    pub fn assemble(
        &self,
        resolved: Vec<ResolvedMetric>,
        supplementary: Vec<serde_json::Value>,
    ) -> Result<Vec<Descriptor>, EngineError> {
        let mut out: Vec<Descriptor> = resolved.into_iter().map(Descriptor::Resolved).collect();
        out.extend(supplementary.into_iter().map(Descriptor::Supplied));
        if self.options.cstates {
            let states = self.profile.sleep_states()?;
            out.extend(
                sleep_state_metrics(states)
                    .into_iter()
                    .map(Descriptor::Resolved),
            );
        }
        Ok(out)
    }

    /// Resolve every metric row in sheet order. Dropped metrics are logged
    /// and left out; only fatal errors stop the run.
    pub fn resolve_all(&self) -> Result<Vec<ResolvedMetric>, EngineError> {
        let mut out = Vec::new();
        for record in self.graph.metrics() {
            let Some(formula) = self.formula(record) else {
                continue;
            };
            for variant in evaluate(self.graph, self.profile, self.resolve, formula)? {
                let name = if variant.smt {
                    smt_name(&record.name)
                } else {
                    record.name.clone()
                };
                match variant.outcome {
                    Ok(expr) => out.extend(self.finish(record, name, variant.smt, expr)),
                    Err(reason) => {
                        log::warn!(target: LOG_TARGET, "Skipping {} due to {}", name, reason)
                    }
                }
            }
        }
        Ok(out)
    }

    fn formula<'r>(&self, record: &'r MetricRecord) -> Option<&'r str> {
        if overrides::IGNORED.contains(&record.name.as_str()) {
            log::debug!(target: LOG_TARGET, "Ignoring {}", record.name);
            return None;
        }
        match record.formula.as_deref() {
            Some(form) if !NOT_AVAILABLE.contains(&form) => Some(form),
            _ => {
                log::debug!(target: LOG_TARGET, "No formula for {}", record.name);
                None
            }
        }
    }

    fn finish(
        &self,
        record: &MetricRecord,
        name: String,
        smt: bool,
        expr: String,
    ) -> Option<ResolvedMetric> {
        let expr = overrides::apply_overrides(&self.profile.family, &name, &expr);

        if let Some(min) = self.options.min_events {
            let events = count_events(&expr);
            if events < min {
                log::debug!(
                    target: LOG_TARGET,
                    "Dropping {}: {} distinct events, need {}",
                    name,
                    events,
                    min
                );
                return None;
            }
        }

        let group = normalize_group(&record.name, &record.group);
        let group = match (group.is_empty(), smt) {
            (true, _) => None,
            (false, true) => Some(smt_name(&group)),
            (false, false) => Some(group),
        };
        let extra = smt.then_some(describe::SMT_SENTENCE);
        let (brief, public) = describe::describe(&record.description, &record.locate_with, extra);

        Some(ResolvedMetric {
            brief_description: brief,
            metric_constraint: overrides::lookup(overrides::CONSTRAINTS, &name)
                .map(str::to_string),
            metric_expr: expr,
            metric_group: group,
            metric_name: name,
            public_description: public,
            unit: self.options.unit.clone(),
        })
    }
}

/// `_SMT` suffix unless the label already starts with `SMT`.
pub fn smt_name(label: &str) -> String {
    if label.starts_with(SMT_PREFIX) {
        label.to_string()
    } else {
        format!("{}{}", label, SMT_SUFFIX)
    }
}

/// Default group for ungrouped metrics, trimmed of `;` separators and renamed.
pub fn normalize_group(name: &str, group: &str) -> String {
    let group = match group.trim() {
        "" => overrides::lookup(overrides::DEFAULT_GROUPS, name).unwrap_or(""),
        g => g,
    };
    let group = group.trim_matches(';').trim();
    overrides::lookup(overrides::GROUP_RENAMES, group)
        .unwrap_or(group)
        .to_string()
}

/// Distinct counter terms referenced by a final expression.
pub fn count_events(expr: &str) -> usize {
    COUNTER_RE
        .find_iter(expr)
        .map(|m| m.as_str())
        .filter(|t| !KEYWORDS.contains(t))
        .collect::<BTreeSet<_>>()
        .len()
}
