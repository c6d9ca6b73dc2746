use crate::error::{EngineError, check_expr};
use crate::family::FamilyProfile;
use crate::graph::RefGraph;
use crate::sheet::row::{AuxMacro, MetricRecord, TopdownNode};
use anyhow::Context;
use std::collections::HashMap;
use std::io::Read;

const LOG_TARGET: &str = "sheet";

const HEADER_KEY: &str = "Key";
const LEVELS: [&str; 4] = ["Level1", "Level2", "Level3", "Level4"];
const DESCRIPTION: &str = "Metric Description";
const GROUP: &str = "Metric Group";
const LOCATE: &str = "Locate-with";

const TOPDOWN_TAGS: [&str; 4] = ["BE", "BAD", "RET", "FE"];
const INFO_TAG: &str = "Info";
const AUX_TAG: &str = "Aux";
const NOT_APPLICABLE: &str = "#NA";

/// Group label given to Level1 topdown nodes.
pub const TOPDOWN_L1_GROUP: &str = "TopdownL1";

/// Read a CSV spreadsheet into rows of cells.
///
/// Rows may differ in length; no header handling happens here.
pub fn read_rows(input: impl Read) -> anyhow::Result<Vec<Vec<String>>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);

    let mut rows = Vec::new();
    for (lineno, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read spreadsheet row {}", lineno + 1))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(rows)
}

/// Column labels from the `Key` row.
#[derive(Debug, Clone)]
pub struct Header {
    columns: HashMap<String, usize>,
}

impl Header {
    /// Build from the header row, failing if a column the loader reads is absent.
    pub fn from_row(row: &[String], family: &str) -> Result<Self, EngineError> {
        let mut columns = HashMap::new();
        for (idx, label) in row.iter().enumerate() {
            columns.entry(label.trim().to_string()).or_insert(idx);
        }

        let mut required: Vec<&str> = LEVELS.to_vec();
        required.extend([DESCRIPTION, GROUP, LOCATE, family]);

        let missing: Vec<String> = required
            .into_iter()
            .filter(|label| !columns.contains_key(*label))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(EngineError::MissingColumns(missing));
        }

        Ok(Self { columns })
    }

    pub fn has(&self, label: &str) -> bool {
        self.columns.contains_key(label)
    }

    /// Cell under `label`; empty for unknown labels and short rows.
    pub fn cell<'r>(&self, row: &'r [String], label: &str) -> &'r str {
        self.columns
            .get(label)
            .and_then(|&idx| row.get(idx))
            .map(|s| s.trim())
            .unwrap_or("")
    }

    /// The family's own formula, else the first non-empty ancestor cell.
    pub fn find_form(
        &self,
        row: &[String],
        profile: &FamilyProfile,
    ) -> Result<Option<String>, EngineError> {
        let found = std::iter::once(profile.family.as_str())
            .chain(profile.lineage.iter().map(String::as_str))
            .filter(|col| self.has(col))
            .map(|col| self.cell(row, col))
            .find(|cell| !cell.is_empty());

        match found {
            Some(form) => Ok(Some(check_expr(form)?.to_string())),
            None => Ok(None),
        }
    }
}

fn first_cell(row: &[String]) -> &str {
    row.first()
        .map(|s| s.trim_start_matches('\u{feff}').trim())
        .unwrap_or("")
}

/// Load spreadsheet rows into a reference graph for one family.
///
/// Rows before the `Key` header are ignored. Topdown rows record a tree node
/// per filled level column; Level1 nodes are also emitted as metrics.
pub fn load_sheet(rows: &[Vec<String>], profile: &FamilyProfile) -> Result<RefGraph, EngineError> {
    let mut graph = RefGraph::new();
    let mut header: Option<Header> = None;
    // (level, name) of the open ancestors of the next node.
    let mut stack: Vec<(u8, String)> = Vec::new();

    for row in rows {
        let tag = first_cell(row);
        if tag == HEADER_KEY {
            header = Some(Header::from_row(row, &profile.family)?);
            continue;
        }
        let Some(h) = header.as_ref() else {
            continue;
        };

        if TOPDOWN_TAGS.iter().any(|t| tag.starts_with(t)) {
            for (idx, col) in LEVELS.iter().enumerate() {
                let name = h.cell(row, col);
                if name.is_empty() {
                    continue;
                }
                let level = idx as u8 + 1;
                let formula = h.find_form(row, profile)?;

                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                let parent = if level > 1 {
                    stack.last().map(|(_, p)| p.clone())
                } else {
                    None
                };

                graph.add_node(TopdownNode {
                    name: name.to_string(),
                    formula: formula.clone(),
                    level,
                    parent,
                })?;
                stack.push((level, name.to_string()));

                if level == 1 {
                    graph.add_metric(MetricRecord {
                        name: name.to_string(),
                        formula,
                        description: h.cell(row, DESCRIPTION).to_string(),
                        group: TOPDOWN_L1_GROUP.to_string(),
                        locate_with: String::new(),
                    });
                }
            }
        } else if tag.starts_with(INFO_TAG) {
            graph.add_metric(MetricRecord {
                name: h.cell(row, LEVELS[0]).to_string(),
                formula: h.find_form(row, profile)?,
                description: h.cell(row, DESCRIPTION).to_string(),
                group: h.cell(row, GROUP).to_string(),
                locate_with: h.cell(row, LOCATE).to_string(),
            });
        } else if tag.starts_with(AUX_TAG) {
            let Some(formula) = h.find_form(row, profile)? else {
                continue;
            };
            if formula == NOT_APPLICABLE {
                continue;
            }
            let name = h.cell(row, LEVELS[0]);
            log::debug!(target: LOG_TARGET, "Adding aux {} {}", name, formula);
            graph.add_macro(AuxMacro {
                name: name.to_string(),
                formula,
            });
        }
    }

    if header.is_none() {
        return Err(EngineError::MissingHeader);
    }
    Ok(graph)
}
