/// One `Info` row, or a Level1 topdown node promoted to a metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRecord {
    pub name: String,
    /// None when neither the family nor any ancestor has a formula.
    pub formula: Option<String>,
    pub description: String,
    pub group: String,
    pub locate_with: String,
}

/// `#Name` fragment, only ever referenced from other formulas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuxMacro {
    pub name: String,
    pub formula: String,
}

/// A node of the 4-level topdown tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopdownNode {
    pub name: String,
    pub formula: Option<String>,
    /// Always within 1..=4.
    pub level: u8,
    /// Set for every level above 1.
    pub parent: Option<String>,
}
