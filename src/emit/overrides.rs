//! Fixed per-metric data: names to skip, default groups, constraint tags and
//! hand-maintained expression overrides (erratum workarounds).

use regex::{NoExpand, Regex};
use std::sync::LazyLock;

/// Rows that duplicate perf built-ins or cannot be expressed.
pub const IGNORED: &[&str] = &["MUX", "Power", "Time"];

/// Groups for metrics the sheet leaves ungrouped.
pub const DEFAULT_GROUPS: &[(&str, &str)] = &[
    ("IFetch_Line_Utilization", "Frontend"),
    ("Kernel_Utilization", "Summary"),
    ("Turbo_Utilization", "Power"),
];

/// Group labels renamed on output.
pub const GROUP_RENAMES: &[(&str, &str)] = &[("Topdown", "TopDown")];

/// Metrics that only read correctly with the NMI watchdog disabled.
pub const CONSTRAINTS: &[(&str, &str)] = &[
    ("Page_Walks_Utilization", "NO_NMI_WATCHDOG"),
    ("Backend_Bound", "NO_NMI_WATCHDOG"),
];

/// Compiled regex rewrites, applied in order.
pub type Rewrites = LazyLock<Vec<(Regex, &'static str)>>;

#[derive(Debug, Clone, Copy)]
pub enum OverrideAction {
    /// Use this expression verbatim.
    Replace(&'static str),
    /// Regex rewrites applied to the resolved expression.
    Rewrite(&'static Rewrites),
}

#[derive(Debug, Clone, Copy)]
pub struct ExprOverride {
    /// None applies to every family.
    pub family: Option<&'static str>,
    pub metric: &'static str,
    pub action: OverrideAction,
}

static KERNEL_REWRITES: Rewrites = LazyLock::new(|| {
    [
        (r":u\b", ":k"),
        (r":SUP\b", ":k"),
        (r"CPU_CLK_UNHALTED\.REF_TSC\b", "CPU_CLK_UNHALTED.THREAD"),
    ]
    .into_iter()
    .map(|(pattern, rep)| (Regex::new(pattern).expect("valid override pattern"), rep))
    .collect()
});

const BDW_DE_PAGE_WALKS: &str = r"( cpu@ITLB_MISSES.WALK_DURATION\,cmask\=1@ + cpu@DTLB_LOAD_MISSES.WALK_DURATION\,cmask\=1@ + cpu@DTLB_STORE_MISSES.WALK_DURATION\,cmask\=1@ + 7 * ( DTLB_STORE_MISSES.WALK_COMPLETED + DTLB_LOAD_MISSES.WALK_COMPLETED + ITLB_MISSES.WALK_COMPLETED ) ) / CPU_CLK_UNHALTED.THREAD";

const BDW_DE_PAGE_WALKS_SMT: &str = r"( cpu@ITLB_MISSES.WALK_DURATION\,cmask\=1@ + cpu@DTLB_LOAD_MISSES.WALK_DURATION\,cmask\=1@ + cpu@DTLB_STORE_MISSES.WALK_DURATION\,cmask\=1@ + 7 * ( DTLB_STORE_MISSES.WALK_COMPLETED + DTLB_LOAD_MISSES.WALK_COMPLETED + ITLB_MISSES.WALK_COMPLETED ) ) / ( ( CPU_CLK_UNHALTED.THREAD / 2 ) * ( 1 + CPU_CLK_UNHALTED.ONE_THREAD_ACTIVE / CPU_CLK_UNHALTED.REF_XCLK ) )";

pub static EXPR_OVERRIDES: &[ExprOverride] = &[
    ExprOverride {
        family: None,
        metric: "Kernel_Utilization",
        action: OverrideAction::Rewrite(&KERNEL_REWRITES),
    },
    ExprOverride {
        family: None,
        metric: "Kernel_CPI",
        action: OverrideAction::Rewrite(&KERNEL_REWRITES),
    },
    ExprOverride {
        family: Some("BDW-DE"),
        metric: "Page_Walks_Utilization",
        action: OverrideAction::Replace(BDW_DE_PAGE_WALKS),
    },
    ExprOverride {
        family: Some("BDW-DE"),
        metric: "Page_Walks_Utilization_SMT",
        action: OverrideAction::Replace(BDW_DE_PAGE_WALKS_SMT),
    },
];

pub fn lookup<'t>(table: &'t [(&'static str, &'static str)], key: &str) -> Option<&'t str> {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

/// Apply every override matching this family and metric, in table order.
pub fn apply_overrides(family: &str, metric: &str, expr: &str) -> String {
    EXPR_OVERRIDES
        .iter()
        .filter(|o| o.metric == metric && o.family.is_none_or(|f| f == family))
        .fold(expr.to_string(), |acc, o| match o.action {
            OverrideAction::Replace(text) => text.to_string(),
            OverrideAction::Rewrite(rules) => rules.iter().fold(acc, |acc, (re, rep)| {
                re.replace_all(&acc, NoExpand(rep)).into_owned()
            }),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn kernel_metrics_count_kernel_mode() {
        assert_eq!(
            apply_overrides("SKX", "Kernel_CPI", "CPU_CLK_UNHALTED.REF_TSC:u / INST_RETIRED.ANY_P:u"),
            "CPU_CLK_UNHALTED.THREAD:k / INST_RETIRED.ANY_P:k"
        );
    }

    #[test]
    fn erratum_override_is_family_specific() {
        assert_eq!(
            apply_overrides("BDW-DE", "Page_Walks_Utilization", "X"),
            BDW_DE_PAGE_WALKS
        );
        assert_eq!(apply_overrides("BDX", "Page_Walks_Utilization", "X"), "X");
        assert_eq!(apply_overrides("BDW-DE", "IPC", "X"), "X");
    }

    #[test]
    fn table_lookup() {
        assert_eq!(lookup(DEFAULT_GROUPS, "Turbo_Utilization"), Some("Power"));
        assert_eq!(lookup(CONSTRAINTS, "IPC"), None);
    }
}
