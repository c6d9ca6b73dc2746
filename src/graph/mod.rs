//! Reference graph: every named formula in the sheet plus the topdown
//! parent/child adjacency.
//!
//! Nothing here is substituted. The resolver walks these maps on demand and
//! does its own cycle detection.

use crate::error::EngineError;
use crate::sheet::{AuxMacro, MetricRecord, TopdownNode};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default)]
pub struct RefGraph {
    /// Emission order follows row order.
    metrics: Vec<MetricRecord>,
    metric_forms: BTreeMap<String, Option<String>>,
    macros: BTreeMap<String, String>,
    nodes: BTreeMap<String, TopdownNode>,
    children: BTreeMap<String, BTreeSet<String>>,
}

impl RefGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_metric(&mut self, record: MetricRecord) {
        self.metric_forms
            .insert(record.name.clone(), record.formula.clone());
        self.metrics.push(record);
    }

    /// Register an aux macro. A leading `#` on the name is dropped.
    pub fn add_macro(&mut self, aux: AuxMacro) {
        let name = aux.name.trim_start_matches('#').to_string();
        self.macros.insert(name, aux.formula);
    }

    /// Add a topdown node; its parent must already be present.
    pub fn add_node(&mut self, node: TopdownNode) -> Result<(), EngineError> {
        if node.level > 1 {
            let parent = node
                .parent
                .as_ref()
                .filter(|p| self.nodes.contains_key(*p))
                .ok_or_else(|| EngineError::OrphanNode {
                    node: node.name.clone(),
                    level: node.level,
                })?;
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(node.name.clone());
        }
        self.nodes.insert(node.name.clone(), node);
        Ok(())
    }

    pub fn metrics(&self) -> &[MetricRecord] {
        &self.metrics
    }

    /// Whether a bare identifier names a metric or tree node.
    pub fn is_name(&self, token: &str) -> bool {
        self.metric_forms.contains_key(token) || self.nodes.contains_key(token)
    }

    /// Formula behind a bare identifier. Metrics shadow tree nodes.
    pub fn name_formula(&self, token: &str) -> Option<&str> {
        match self.metric_forms.get(token) {
            Some(form) => form.as_deref(),
            None => self.nodes.get(token).and_then(|n| n.formula.as_deref()),
        }
    }

    /// Whether `#name` refers to anything.
    pub fn is_macro(&self, name: &str) -> bool {
        self.nodes.contains_key(name) || self.macros.contains_key(name)
    }

    /// Formula behind `#name`. Tree nodes shadow aux macros.
    pub fn macro_formula(&self, name: &str) -> Option<&str> {
        match self.nodes.get(name) {
            Some(node) => node.formula.as_deref(),
            None => self.macros.get(name).map(String::as_str),
        }
    }

    /// Direct children of a tree node, alphabetical.
    pub fn children(&self, name: &str) -> impl Iterator<Item = &str> {
        self.children
            .get(name)
            .into_iter()
            .flat_map(|kids| kids.iter().map(String::as_str))
    }

    /// Unresolved text for `##name` (sum of children) or `##?name`
    /// (`max(name, sum)`). None when the node has no children.
    pub fn hierarchy_expansion(&self, name: &str, bounded: bool) -> Option<String> {
        let kids: Vec<&str> = self.children(name).collect();
        if kids.is_empty() {
            return None;
        }
        let sum = format!("({})", kids.join(" + "));
        Some(if bounded {
            format!("max({}, {})", name, sum)
        } else {
            sum
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn node(name: &str, formula: &str, level: u8, parent: Option<&str>) -> TopdownNode {
        TopdownNode {
            name: name.into(),
            formula: Some(formula.into()),
            level,
            parent: parent.map(str::to_string),
        }
    }

    fn bound_tree() -> RefGraph {
        let mut g = RefGraph::new();
        g.add_node(node("Bound", "A/B", 1, None)).unwrap();
        g.add_node(node("Bound.Y", "B", 2, Some("Bound"))).unwrap();
        g.add_node(node("Bound.X", "A", 2, Some("Bound"))).unwrap();
        g
    }

    #[test]
    fn hierarchy_sum_is_alphabetical() {
        let g = bound_tree();
        assert_eq!(
            g.hierarchy_expansion("Bound", false).as_deref(),
            Some("(Bound.X + Bound.Y)")
        );
        assert_eq!(
            g.hierarchy_expansion("Bound", true).as_deref(),
            Some("max(Bound, (Bound.X + Bound.Y))")
        );
        assert_eq!(g.hierarchy_expansion("Bound.X", false), None);
    }

    #[test]
    fn orphan_node_is_rejected() {
        let mut g = RefGraph::new();
        let err = g.add_node(node("Lost", "A", 2, Some("Nowhere"))).unwrap_err();
        assert!(matches!(err, EngineError::OrphanNode { level: 2, .. }));
    }

    #[test]
    fn metrics_shadow_nodes() {
        let mut g = bound_tree();
        g.add_metric(MetricRecord {
            name: "Bound".into(),
            formula: Some("C".into()),
            description: String::new(),
            group: String::new(),
            locate_with: String::new(),
        });
        assert_eq!(g.name_formula("Bound"), Some("C"));
        assert_eq!(g.macro_formula("Bound"), Some("A/B"));
        assert!(g.is_name("Bound.X"));
        assert!(!g.is_name("A"));
    }

    #[test]
    fn macro_names_lose_hash() {
        let mut g = RefGraph::new();
        g.add_macro(AuxMacro {
            name: "#X".into(),
            formula: "EVT_A + EVT_B".into(),
        });
        assert!(g.is_macro("X"));
        assert_eq!(g.macro_formula("X"), Some("EVT_A + EVT_B"));
        assert!(!g.is_macro("#X"));
    }
}
