//! Hardware-family profiles.
//!
//! A profile is configuration, not logic: the formula lineage used when a
//! family's own spreadsheet cell is empty, the literal event substitutions
//! applied during fixup, and the C-state levels used for residency metrics.
//! Built-in profiles come from the tables in [`builtin`]; callers may load a
//! replacement from JSON.

pub mod builtin;

use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// One literal rewrite applied to every formula during fixup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Substitution {
    pub pattern: String,
    pub replacement: String,
}

impl Substitution {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
        }
    }

    /// Replacement text with `,` and `=` escaped for perf's event syntax.
    pub fn escaped_replacement(&self) -> String {
        self.replacement.replace(',', r"\,").replace('=', r"\=")
    }
}

/// Core and package C-state levels for residency metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SleepStates {
    #[serde(default)]
    pub core: Vec<u8>,
    #[serde(default)]
    pub package: Vec<u8>,
}

/// Execution unit a hybrid part is being described for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExecutionUnit {
    #[default]
    Generic,
    Core,
    Atom,
}

impl ExecutionUnit {
    /// Interpret a perf PMU name (`cpu_core`, `cpu_atom`); anything else is generic.
    pub fn from_pmu(pmu: Option<&str>) -> Self {
        match pmu {
            Some("cpu_core") => Self::Core,
            Some("cpu_atom") => Self::Atom,
            _ => Self::Generic,
        }
    }

    /// Namespace prefix for rewritten counter references.
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Generic => "cpu",
            Self::Core => "cpu_core",
            Self::Atom => "cpu_atom",
        }
    }

    /// Literal used for the `CLKS` shorthand.
    pub fn clocks_event(self) -> &'static str {
        match self {
            Self::Atom => "CPU_CLK_UNHALTED.CORE",
            Self::Generic | Self::Core => "CPU_CLK_UNHALTED.THREAD",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyProfile {
    /// Spreadsheet column of the target family.
    pub family: String,

    /// Fallback columns, most specific first.
    #[serde(default)]
    pub lineage: Vec<String>,

    #[serde(default)]
    pub substitutions: Vec<Substitution>,

    #[serde(default)]
    pub sleep_states: Option<SleepStates>,
}

impl FamilyProfile {
    /// A bare profile: no fallback columns, no substitutions, no C-states.
    pub fn new(family: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            lineage: Vec::new(),
            substitutions: Vec::new(),
            sleep_states: None,
        }
    }

    /// Look up the built-in profile for a spreadsheet family column.
    pub fn builtin(family: &str) -> Result<Self, EngineError> {
        let lineage = builtin::LINEAGE
            .iter()
            .find(|(name, _)| *name == family)
            .map(|(_, chain)| chain.iter().map(|c| c.to_string()).collect())
            .ok_or_else(|| EngineError::UnknownFamily(family.to_string()))?;

        let table = builtin::EVENT_FIXES
            .iter()
            .find(|(name, _)| *name == family)
            .map(|(_, table)| *table)
            .unwrap_or(builtin::DEFAULT_EVENT_FIXES);

        let mut profile = Self::new(family);
        profile.lineage = lineage;
        profile.substitutions = table
            .iter()
            .map(|(p, r)| Substitution::new(*p, *r))
            .collect();
        profile.sleep_states = builtin_sleep_states(family);
        Ok(profile)
    }

    /// C-state levels for residency metrics; a missing entry is a
    /// configuration gap.
    pub fn sleep_states(&self) -> Result<&SleepStates, EngineError> {
        self.sleep_states
            .as_ref()
            .ok_or_else(|| EngineError::UnknownFamily(self.family.clone()))
    }

    /// Whether `family` is this family or one of its ancestors.
    pub fn descends_from(&self, family: &str) -> bool {
        self.family == family || self.lineage.iter().any(|f| f == family)
    }

    /// Expansion of `#Retired_Slots`: families with the topdown slot
    /// counters (ICL onwards) derive it from `Retiring * SLOTS`.
    pub fn retired_slots(&self) -> &'static str {
        if self.descends_from("ICL") {
            "Retiring * SLOTS"
        } else {
            "UOPS_RETIRED.RETIRE_SLOTS"
        }
    }

    /// Sheet metrics that [`Self::retired_slots`] refers to by name.
    pub fn retired_slots_metrics(&self) -> &'static [&'static str] {
        if self.descends_from("ICL") {
            &["Retiring", "SLOTS"]
        } else {
            &[]
        }
    }
}

/// First C-state entry whose family prefix matches.
pub fn builtin_sleep_states(family: &str) -> Option<SleepStates> {
    builtin::CSTATES
        .iter()
        .find(|(prefixes, _, _)| prefixes.iter().any(|p| family.starts_with(p)))
        .map(|(_, core, package)| SleepStates {
            core: core.to_vec(),
            package: package.to_vec(),
        })
}
