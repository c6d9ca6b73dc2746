//! Formula resolution: rewrite a symbolic per-family formula into a fully
//! literal counter expression.
//!
//! References (`#Macro`, bare metric/node names, `##Node`, `##?Node`) are
//! resolved depth-first over the [`RefGraph`]. Every referenced formula is
//! expanded, fixed up and bracketed once per resolver and memoized; a
//! reference reached again while still in progress is a cycle and drops the
//! metric.

pub mod conditional;
pub mod fixup;

pub use conditional::{SamplingMode, evaluate};
pub use fixup::bracket;

use crate::error::{DropReason, EngineError, check_expr};
use crate::family::{ExecutionUnit, FamilyProfile};
use crate::graph::RefGraph;
use conditional::{Conditions, ModeDependent};
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

const LOG_TARGET: &str = "resolve";

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"##\?[A-Za-z0-9_.]+|##[A-Za-z0-9_.]+|#[A-Za-z0-9_.]+|[A-Za-z0-9_.]+")
        .expect("valid token pattern")
});

static MEMORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#Memory\s*==\s*1\b").expect("valid memory pattern"));

/// Substrings marking signals that cannot be counted.
struct Denied {
    pattern: &'static str,
    fold_case: bool,
}

const DENY_LIST: &[Denied] = &[
    Denied {
        pattern: "UNC_CLOCK.SOCKET",
        fold_case: true,
    },
    Denied {
        pattern: "BASE_FREQUENCY",
        fold_case: true,
    },
    Denied {
        pattern: "/Match=",
        fold_case: false,
    },
    Denied {
        pattern: "PERF_METRICS",
        fold_case: false,
    },
    Denied {
        pattern: "Mispredicts_Resteers",
        fold_case: false,
    },
];

fn check_denied(form: &str) -> Result<(), DropReason> {
    let upper = form.to_uppercase();
    for denied in DENY_LIST {
        let hit = if denied.fold_case {
            upper.contains(&denied.pattern.to_uppercase())
        } else {
            form.contains(denied.pattern)
        };
        if hit {
            return Err(DropReason::Unsupported(denied.pattern.to_string()));
        }
    }
    Ok(())
}

/// Caller switches that affect resolution.
#[derive(Debug, Clone)]
pub struct ResolveOptions {
    /// Value of `#Memory == 1`.
    pub memory: bool,
    /// Model tested by `#Model in [...]` clauses.
    pub model: Option<String>,
    pub pmm_app_direct: bool,
    pub unit: ExecutionUnit,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            memory: false,
            model: None,
            pmm_app_direct: true,
            unit: ExecutionUnit::Generic,
        }
    }
}

/// Result of resolving one formula in one sampling mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Resolved(String),
    Dropped(DropReason),
    /// The formula reached this `#EBS_Mode`/`#SMT_on` token while the mode
    /// was unknown.
    ModeDependent(String),
}

/// Why a resolution step stopped early.
#[derive(Debug)]
enum Stop {
    Fatal(EngineError),
    Drop(DropReason),
    ModeDependent(String),
}

impl From<EngineError> for Stop {
    fn from(err: EngineError) -> Self {
        Self::Fatal(err)
    }
}

impl From<DropReason> for Stop {
    fn from(reason: DropReason) -> Self {
        Self::Drop(reason)
    }
}

impl From<ModeDependent> for Stop {
    fn from(ModeDependent(token): ModeDependent) -> Self {
        Self::ModeDependent(token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum RefKey {
    Macro(String),
    Name(String),
}

impl RefKey {
    fn label(&self) -> String {
        match self {
            Self::Macro(name) => format!("#{}", name),
            Self::Name(name) => name.clone(),
        }
    }
}

/// Resolver for a single metric in a single sampling mode.
///
/// The memo lives as long as the resolver; nothing carries over between
/// metrics.
pub struct Resolver<'a> {
    graph: &'a RefGraph,
    profile: &'a FamilyProfile,
    options: &'a ResolveOptions,
    mode: SamplingMode,
    done: HashMap<RefKey, Result<String, DropReason>>,
    active: Vec<RefKey>,
}

impl<'a> Resolver<'a> {
    pub fn new(
        graph: &'a RefGraph,
        profile: &'a FamilyProfile,
        options: &'a ResolveOptions,
        mode: SamplingMode,
    ) -> Self {
        Self {
            graph,
            profile,
            options,
            mode,
            done: HashMap::new(),
            active: Vec::new(),
        }
    }

    /// Resolve a raw formula into a literal expression.
    ///
    /// Only malformed expressions are errors; everything else is an
    /// [`Outcome`].
    pub fn resolve(&mut self, formula: &str) -> Result<Outcome, EngineError> {
        match self.resolve_top(formula) {
            Ok(expr) => Ok(Outcome::Resolved(expr)),
            Err(Stop::Drop(reason)) => Ok(Outcome::Dropped(reason)),
            Err(Stop::ModeDependent(token)) => Ok(Outcome::ModeDependent(token)),
            Err(Stop::Fatal(err)) => Err(err),
        }
    }

    fn resolve_top(&mut self, formula: &str) -> Result<String, Stop> {
        let expanded = self.expand(formula)?;
        let form = self.fixup(&expanded)?;
        check_denied(&form)?;
        self.check_leftovers(&form)?;
        log::trace!(target: LOG_TARGET, "{} => {}", formula, form);
        Ok(form)
    }

    fn conditions(&self) -> Conditions<'_> {
        Conditions {
            model: self.options.model.as_deref(),
            pmm_app_direct: self.options.pmm_app_direct,
            mode: self.mode,
        }
    }

    /// Replace every reference token in `formula` with its resolved text.
    fn expand(&mut self, formula: &str) -> Result<String, Stop> {
        check_expr(formula)?;
        let form = conditional::collapse(formula, &self.conditions())?;
        check_denied(&form)?;

        let form = form.replace("##?(", "(").replace("##(", "(");
        let memory = if self.options.memory { "1" } else { "0" };
        let form = MEMORY_RE.replace_all(&form, memory).into_owned();

        let mut out = String::with_capacity(form.len());
        let mut last = 0;
        for m in TOKEN_RE.find_iter(&form) {
            out.push_str(&form[last..m.start()]);
            let token = m.as_str();
            let text = if let Some(name) = token.strip_prefix("##?") {
                self.expand_hierarchy(name, true)?
            } else if let Some(name) = token.strip_prefix("##") {
                self.expand_hierarchy(name, false)?
            } else if let Some(name) = token.strip_prefix('#') {
                self.expand_macro(name)?
            } else if self.graph.is_name(token) {
                self.reference(RefKey::Name(token.to_string()))?
            } else {
                token.to_string()
            };
            out.push_str(&text);
            last = m.end();
        }
        out.push_str(&form[last..]);

        check_expr(&out)?;
        Ok(out)
    }

    fn expand_hierarchy(&mut self, name: &str, bounded: bool) -> Result<String, Stop> {
        let text = self
            .graph
            .hierarchy_expansion(name, bounded)
            .ok_or_else(|| DropReason::UnknownReference(format!("##{}", name)))?;
        self.expand(&text)
    }

    fn flag(value: bool) -> String {
        (if value { "1" } else { "0" }).to_string()
    }

    /// Pseudo-variables first, then tree nodes and aux macros.
    fn expand_macro(&mut self, name: &str) -> Result<String, Stop> {
        match name {
            "DurationTimeInSeconds" => Ok("duration_time".to_string()),
            "NA" => Ok("0".to_string()),
            "Memory" => Ok(Self::flag(self.options.memory)),
            "PMM_App_Direct" => Ok(Self::flag(self.options.pmm_app_direct)),
            "SMT_on" | "EBS_Mode" => match self.mode {
                SamplingMode::Unknown => Err(Stop::ModeDependent(format!("#{}", name))),
                SamplingMode::Off => Ok(Self::flag(false)),
                SamplingMode::On => Ok(Self::flag(true)),
            },
            "Base_Frequency" => Err(DropReason::Unsupported("Base_Frequency".into()).into()),
            "PERF_METRICS_MSR" => Err(DropReason::Unsupported("PERF_METRICS".into()).into()),
            "Retired_Slots" => {
                if let Some(missing) = self
                    .profile
                    .retired_slots_metrics()
                    .iter()
                    .find(|m| !self.graph.is_name(m))
                {
                    return Err(DropReason::UnknownReference(missing.to_string()).into());
                }
                let text = self.expand(self.profile.retired_slots())?;
                Ok(bracket(&self.fixup(&text)?))
            }
            _ if self.graph.is_macro(name) => self.reference(RefKey::Macro(name.to_string())),
            _ => Err(DropReason::UnknownReference(format!("#{}", name)).into()),
        }
    }

    fn reference(&mut self, key: RefKey) -> Result<String, Stop> {
        if let Some(done) = self.done.get(&key) {
            return done.clone().map_err(Stop::Drop);
        }
        if let Some(pos) = self.active.iter().position(|k| *k == key) {
            let mut chain: Vec<String> = self.active[pos..].iter().map(RefKey::label).collect();
            chain.push(key.label());
            return Err(DropReason::Cycle(chain).into());
        }

        let raw = match &key {
            RefKey::Macro(name) => self.graph.macro_formula(name),
            RefKey::Name(name) => self.graph.name_formula(name),
        }
        .map(str::to_string)
        .ok_or_else(|| DropReason::UnknownReference(key.label()))?;

        self.active.push(key.clone());
        let result = self
            .expand(&raw)
            .and_then(|text| self.fixup(&text))
            .map(|text| bracket(&text));
        self.active.pop();

        match result {
            Ok(text) => {
                self.done.insert(key, Ok(text.clone()));
                Ok(text)
            }
            Err(Stop::Drop(reason)) => {
                self.done.insert(key, Err(reason.clone()));
                Err(Stop::Drop(reason))
            }
            Err(other) => Err(other),
        }
    }

    /// Family substitutions, generic rewrites, number normalization and
    /// conditional collapse.
    fn fixup(&self, form: &str) -> Result<String, Stop> {
        check_expr(form)?;
        let form = fixup::apply_substitutions(form, self.profile);
        let form = fixup::rewrite_generic(&form, self.options.unit);
        let form = fixup::rewrite_modifiers(&form, self.options.unit);
        let form = fixup::normalize_numbers(&form);
        check_expr(&form)?;
        let form = conditional::collapse(&form, &self.conditions())?;
        check_expr(&form)?;
        Ok(form)
    }

    fn check_leftovers(&self, form: &str) -> Result<(), DropReason> {
        match TOKEN_RE
            .find_iter(form)
            .map(|m| m.as_str())
            .find(|t| t.starts_with('#') || self.graph.is_name(t))
        {
            Some(token) => Err(DropReason::Leftover(token.to_string())),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::family::Substitution;
    use crate::sheet::{AuxMacro, MetricRecord, TopdownNode};
    use pretty_assertions::assert_eq;

    fn metric(name: &str, formula: &str) -> MetricRecord {
        MetricRecord {
            name: name.into(),
            formula: Some(formula.into()),
            description: String::new(),
            group: String::new(),
            locate_with: String::new(),
        }
    }

    fn aux(name: &str, formula: &str) -> AuxMacro {
        AuxMacro {
            name: name.into(),
            formula: formula.into(),
        }
    }

    fn node(name: &str, formula: &str, level: u8, parent: Option<&str>) -> TopdownNode {
        TopdownNode {
            name: name.into(),
            formula: Some(formula.into()),
            level,
            parent: parent.map(str::to_string),
        }
    }

    fn resolve_with(graph: &RefGraph, options: &ResolveOptions, mode: SamplingMode, formula: &str) -> Outcome {
        let profile = FamilyProfile::new("F1");
        Resolver::new(graph, &profile, options, mode)
            .resolve(formula)
            .unwrap()
    }

    fn resolve(graph: &RefGraph, formula: &str) -> Outcome {
        resolve_with(graph, &ResolveOptions::default(), SamplingMode::Unknown, formula)
    }

    fn resolved(expr: &str) -> Outcome {
        Outcome::Resolved(expr.to_string())
    }

    #[test]
    fn aux_macro_is_bracketed_in_place() {
        let mut g = RefGraph::new();
        g.add_macro(aux("#X", "EVT_A + EVT_B"));
        assert_eq!(resolve(&g, "#X / EVT_C"), resolved("(EVT_A + EVT_B) / EVT_C"));
    }

    #[test]
    fn bare_names_resolve_recursively() {
        let mut g = RefGraph::new();
        g.add_metric(metric("CLKS", "CPU_CLK_UNHALTED.THREAD"));
        g.add_metric(metric("IPC", "INST_RETIRED.ANY / CLKS"));
        g.add_metric(metric("CPI", "1 / IPC"));
        assert_eq!(
            resolve(&g, "CPI"),
            resolved("(1 / (INST_RETIRED.ANY / CPU_CLK_UNHALTED.THREAD))")
        );
    }

    #[test]
    fn hierarchy_tokens_sum_children() {
        let mut g = RefGraph::new();
        g.add_node(node("Bound", "A/B", 1, None)).unwrap();
        g.add_node(node("Bound.X", "A", 2, Some("Bound"))).unwrap();
        g.add_node(node("Bound.Y", "B", 2, Some("Bound"))).unwrap();
        assert_eq!(resolve(&g, "##Bound"), resolved("(A + B)"));
        assert_eq!(
            resolve(&g, "Z / ##?Bound"),
            resolved("Z / max((A/B), (A + B))")
        );
        assert_eq!(
            resolve(&g, "##Bound.X"),
            Outcome::Dropped(DropReason::UnknownReference("##Bound.X".into()))
        );
    }

    #[test]
    fn denied_reference_drops() {
        let mut g = RefGraph::new();
        g.add_macro(aux("#Sock", "UNC_CLOCK.SOCKET"));
        assert_eq!(
            resolve(&g, "X / #Sock"),
            Outcome::Dropped(DropReason::Unsupported("UNC_CLOCK.SOCKET".into()))
        );
        assert_eq!(
            resolve(&g, "X * #Base_Frequency"),
            Outcome::Dropped(DropReason::Unsupported("BASE_FREQUENCY".into()))
        );
        assert_eq!(
            resolve(&g, "A:perf_metrics / B"),
            resolved("A / B")
        );
    }

    #[test]
    fn cycles_drop_with_chain() {
        let mut g = RefGraph::new();
        g.add_metric(metric("A", "B + 1"));
        g.add_metric(metric("B", "A * 2"));
        assert_eq!(
            resolve(&g, "A"),
            Outcome::Dropped(DropReason::Cycle(vec!["A".into(), "B".into(), "A".into()]))
        );
    }

    #[test]
    fn unknown_macro_drops() {
        let g = RefGraph::new();
        assert_eq!(
            resolve(&g, "#Nope + 1"),
            Outcome::Dropped(DropReason::UnknownReference("#Nope".into()))
        );
    }

    #[test]
    fn malformed_formula_is_fatal() {
        let mut g = RefGraph::new();
        g.add_macro(aux("#Bad", "(A + B"));
        let profile = FamilyProfile::new("F1");
        let options = ResolveOptions::default();
        let err = Resolver::new(&g, &profile, &options, SamplingMode::Unknown)
            .resolve("#Bad / C")
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedExpression(_)));
    }

    #[test]
    fn sampling_mode_token_requests_split() {
        let mut g = RefGraph::new();
        g.add_macro(aux("#Cores", "(A / 2) if #SMT_on else A"));
        let options = ResolveOptions::default();
        assert_eq!(
            resolve(&g, "X / #Cores"),
            Outcome::ModeDependent("#SMT_on".into())
        );
        assert_eq!(
            resolve_with(&g, &options, SamplingMode::Off, "X / #Cores"),
            resolved("X / A")
        );
        assert_eq!(
            resolve_with(&g, &options, SamplingMode::On, "X / #Cores"),
            resolved("X / (A / 2)")
        );
    }

    #[test]
    fn pseudo_variables() {
        let g = RefGraph::new();
        let options = ResolveOptions {
            memory: true,
            ..ResolveOptions::default()
        };
        assert_eq!(
            resolve_with(&g, &options, SamplingMode::Unknown, "X / #DurationTimeInSeconds"),
            resolved("X / duration_time")
        );
        assert_eq!(
            resolve_with(&g, &options, SamplingMode::Unknown, "A if #Memory == 1 else B"),
            resolved("A")
        );
        assert_eq!(resolve(&g, "A if #Memory == 1 else B"), resolved("B"));
        assert_eq!(resolve(&g, "X + #NA"), resolved("X + 0"));
    }

    #[test]
    fn retired_slots_uses_topdown_metrics_on_newer_families() {
        let mut g = RefGraph::new();
        g.add_metric(metric("Retiring", "TOPDOWN.RETIRING"));
        g.add_metric(metric("SLOTS", "TOPDOWN.SLOTS"));
        let options = ResolveOptions::default();

        let mut icl = FamilyProfile::new("ICL");
        icl.lineage = vec!["ICL".into()];
        let outcome = Resolver::new(&g, &icl, &options, SamplingMode::Unknown)
            .resolve("#Retired_Slots / X")
            .unwrap();
        assert_eq!(outcome, resolved("(TOPDOWN.RETIRING * TOPDOWN.SLOTS) / X"));

        assert_eq!(
            resolve(&g, "#Retired_Slots / X"),
            resolved("UOPS_RETIRED.RETIRE_SLOTS / X")
        );
    }

    #[test]
    fn retired_slots_needs_topdown_metrics_in_the_sheet() {
        let mut g = RefGraph::new();
        g.add_metric(metric("SLOTS", "TOPDOWN.SLOTS"));
        let options = ResolveOptions::default();
        let mut icl = FamilyProfile::new("ICL");
        icl.lineage = vec!["ICL".into()];
        let outcome = Resolver::new(&g, &icl, &options, SamplingMode::Unknown)
            .resolve("#Retired_Slots / X")
            .unwrap();
        assert_eq!(
            outcome,
            Outcome::Dropped(DropReason::UnknownReference("Retiring".into()))
        );
    }

    #[test]
    fn grouped_clauses_collapse_in_place() {
        let mut g = RefGraph::new();
        g.add_macro(aux("#C", "(A / 2 if #SMT_on else A)"));
        let options = ResolveOptions::default();
        assert_eq!(
            resolve_with(&g, &options, SamplingMode::On, "X / #C"),
            resolved("X / (A / 2)")
        );
        assert_eq!(
            resolve(&g, "INST / (4 if #Model in ['ICL'] else 5)"),
            resolved("INST / (5)")
        );
    }

    #[test]
    fn family_substitutions_and_modifiers_apply() {
        let g = RefGraph::new();
        let mut profile = FamilyProfile::new("F1");
        profile.substitutions = vec![Substitution::new("UNC_M_CAS_COUNT.RD", "uncore_imc@cas_count_read@")];
        let options = ResolveOptions::default();
        let outcome = Resolver::new(&g, &profile, &options, SamplingMode::Unknown)
            .resolve("64 * UNC_M_CAS_COUNT.RD / 1e9 + L1D_PEND_MISS.PENDING:c1")
            .unwrap();
        assert_eq!(
            outcome,
            resolved(r"64 * uncore_imc@cas_count_read@ / 1000000000 + cpu@L1D_PEND_MISS.PENDING\,cmask\=1@")
        );
    }

    #[test]
    fn model_clause_uses_caller_model() {
        let g = RefGraph::new();
        let options = ResolveOptions {
            model: Some("CLX".into()),
            ..ResolveOptions::default()
        };
        let formula = "A if #Model in ['KBLR' 'CLX'] else B";
        assert_eq!(
            resolve_with(&g, &options, SamplingMode::Unknown, formula),
            resolved("A")
        );
        assert_eq!(resolve(&g, formula), resolved("B"));
    }

    #[test]
    fn resolved_expressions_are_balanced_and_literal() {
        let mut g = RefGraph::new();
        g.add_macro(aux("#X", "EVT_A + EVT_B"));
        g.add_metric(metric("M", "#X / CLKS"));
        g.add_metric(metric("CLKS", "CPU_CLK_UNHALTED.THREAD"));
        g.add_node(node("Top", "M * 2", 1, None)).unwrap();
        for formula in ["M", "Top - #X", "(Top) / (M)"] {
            let Outcome::Resolved(expr) = resolve(&g, formula) else {
                panic!("{formula} did not resolve");
            };
            assert_eq!(expr.matches('(').count(), expr.matches(')').count());
            assert!(!expr.contains('#'), "{expr}");
            for name in ["M", "Top", "CLKS"] {
                assert!(
                    !TOKEN_RE.find_iter(&expr).any(|t| t.as_str() == name),
                    "{name} left in {expr}"
                );
            }
        }
    }
}
