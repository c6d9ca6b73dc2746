//! Conditional clauses (`A if <cond> else B`) and the sampling-mode split.
//!
//! `#EBS_Mode` and `#SMT_on` have no value until a sampling context is
//! chosen. A formula that reaches either is resolved twice: once with the
//! mode off (the primary metric) and once with it on (the SMT variant).

use crate::error::{DropReason, EngineError};
use crate::family::FamilyProfile;
use crate::graph::RefGraph;
use crate::resolve::{Outcome, ResolveOptions, Resolver};
use regex::Regex;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplingMode {
    /// Not chosen yet; reaching a mode token asks for a split.
    Unknown,
    Off,
    On,
}

/// Returned by [`collapse`] when the formula depends on an unset mode.
/// Carries the mode token that was reached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeDependent(pub String);

#[derive(Debug, Clone, Copy)]
pub struct Conditions<'a> {
    pub model: Option<&'a str>,
    pub pmm_app_direct: bool,
    pub mode: SamplingMode,
}

static MODE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#(?:EBS_Mode|SMT_on)\b").expect("valid mode pattern"));

const IF: &str = " if ";
const ELSE: &str = " else ";

/// Collapse every recognised clause to one branch.
pub fn collapse(form: &str, cond: &Conditions<'_>) -> Result<String, ModeDependent> {
    if cond.mode == SamplingMode::Unknown {
        if let Some(token) = MODE_TOKEN_RE.find(form) {
            return Err(ModeDependent(token.as_str().to_string()));
        }
    }
    let mut form = form.to_string();
    // Each step removes a clause, so the loop ends.
    while let Some(next) = collapse_once(&form, cond) {
        form = next;
    }
    Ok(form)
}

/// Net nesting of `text`: parentheses and the brackets of model lists.
fn depth(text: &str) -> i32 {
    text.chars()
        .map(|c| match c {
            '(' | '[' => 1,
            ')' | ']' => -1,
            _ => 0,
        })
        .sum()
}

/// Byte range a clause whose ` if ` sits at `pos` can span: the innermost
/// enclosing group or call argument, starting after any earlier `else` of
/// the same chain.
fn clause_bounds(form: &str, pos: usize) -> (usize, usize) {
    let bytes = form.as_bytes();
    // `\,` inside counter terms is not an argument separator.
    let separator = |i: usize| bytes[i] == b',' && (i == 0 || bytes[i - 1] != b'\\');

    let mut start = 0;
    let mut level = 0i32;
    for i in (0..pos).rev() {
        match bytes[i] {
            b')' | b']' => level += 1,
            b'(' | b'[' if level == 0 => {
                start = i + 1;
                break;
            }
            b'(' | b'[' => level -= 1,
            _ if level == 0 && separator(i) => {
                start = i + 1;
                break;
            }
            _ => {}
        }
    }

    let mut end = form.len();
    level = 0;
    for i in pos..form.len() {
        match bytes[i] {
            b'(' | b'[' => level += 1,
            b')' | b']' if level == 0 => {
                end = i;
                break;
            }
            b')' | b']' => level -= 1,
            _ if level == 0 && separator(i) => {
                end = i;
                break;
            }
            _ => {}
        }
    }

    if let Some(idx) = form[start..pos]
        .rmatch_indices(ELSE)
        .map(|(idx, _)| start + idx)
        .find(|&idx| depth(&form[idx..pos]) == 0)
    {
        start = idx + ELSE.len();
    }
    (start, end)
}

fn condition_value(text: &str, cond: &Conditions<'_>) -> Option<bool> {
    if let Some(list) = text.strip_prefix("#Model in") {
        let list = list.trim().strip_prefix('[')?.strip_suffix(']')?;
        return Some(cond.model.is_some_and(|model| {
            list.replace(['\'', '"', ','], " ")
                .split_whitespace()
                .any(|m| m == model)
        }));
    }
    match text {
        "#SMT_on" | "#EBS_Mode" => match cond.mode {
            SamplingMode::On => Some(true),
            SamplingMode::Off => Some(false),
            SamplingMode::Unknown => None,
        },
        "#PMM_App_Direct" => Some(cond.pmm_app_direct),
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

/// Replace the first clause with a known condition by its chosen branch,
/// leaving the text around its group untouched.
fn collapse_once(form: &str, cond: &Conditions<'_>) -> Option<String> {
    for (pos, _) in form.match_indices(IF) {
        let (start, end) = clause_bounds(form, pos);
        let test_start = pos + IF.len();
        let Some(else_pos) = form[test_start..end]
            .match_indices(ELSE)
            .map(|(idx, _)| test_start + idx)
            .find(|&idx| depth(&form[test_start..idx]) == 0)
        else {
            continue;
        };
        let Some(value) = condition_value(form[test_start..else_pos].trim(), cond) else {
            continue;
        };

        let branch = if value {
            &form[start..pos]
        } else {
            &form[else_pos + ELSE.len()..end]
        };
        let segment = &form[start..end];
        let lead = &segment[..segment.len() - segment.trim_start().len()];
        let trail = &segment[segment.trim_end().len()..];
        return Some(format!(
            "{}{}{}{}{}",
            &form[..start],
            lead,
            branch.trim(),
            trail,
            &form[end..]
        ));
    }
    None
}

/// One concrete result of evaluating a metric formula.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Set for the sampling-mode-on result.
    pub smt: bool,
    pub outcome: Result<String, DropReason>,
}

/// Resolve a metric formula, splitting it into primary and SMT variants
/// when it depends on the sampling mode.
pub fn evaluate(
    graph: &RefGraph,
    profile: &FamilyProfile,
    options: &ResolveOptions,
    formula: &str,
) -> Result<Vec<Variant>, EngineError> {
    let first = Resolver::new(graph, profile, options, SamplingMode::Unknown).resolve(formula)?;
    let outcome = match first {
        Outcome::Resolved(expr) => Ok(expr),
        Outcome::Dropped(reason) => Err(reason),
        Outcome::ModeDependent(_) => {
            let mut variants = Vec::with_capacity(2);
            for (smt, mode) in [(false, SamplingMode::Off), (true, SamplingMode::On)] {
                let outcome = match Resolver::new(graph, profile, options, mode).resolve(formula)? {
                    Outcome::Resolved(expr) => Ok(expr),
                    Outcome::Dropped(reason) => Err(reason),
                    Outcome::ModeDependent(token) => Err(DropReason::Leftover(token)),
                };
                variants.push(Variant { smt, outcome });
            }
            return Ok(variants);
        }
    };
    Ok(vec![Variant {
        smt: false,
        outcome,
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn cond(mode: SamplingMode) -> Conditions<'static> {
        Conditions {
            model: Some("CLX"),
            pmm_app_direct: true,
            mode,
        }
    }

    #[test]
    fn model_membership_picks_branch() {
        let c = cond(SamplingMode::Off);
        assert_eq!(
            collapse("A if #Model in ['KBLR' 'CFL' 'CLX'] else B", &c).unwrap(),
            "A"
        );
        assert_eq!(
            collapse("A if #Model in ['KBLR' 'CFL'] else B", &c).unwrap(),
            "B"
        );
    }

    #[test]
    fn literal_conditions_collapse() {
        let c = cond(SamplingMode::Off);
        assert_eq!(collapse("A if 1 else B", &c).unwrap(), "A");
        assert_eq!(collapse("A if 0 else B", &c).unwrap(), "B");
        assert_eq!(collapse("A if #PMM_App_Direct else B", &c).unwrap(), "A");
        assert_eq!(collapse("A + B", &c).unwrap(), "A + B");
    }

    #[test]
    fn nested_clauses_collapse_fully() {
        let c = cond(SamplingMode::On);
        assert_eq!(
            collapse("A if #SMT_on else B if 0 else C", &c).unwrap(),
            "A"
        );
        let c = cond(SamplingMode::Off);
        assert_eq!(
            collapse("A if #SMT_on else B if 0 else C", &c).unwrap(),
            "C"
        );
    }

    #[test]
    fn sampling_tokens_need_a_mode() {
        let c = cond(SamplingMode::Unknown);
        assert_eq!(
            collapse("A if #EBS_Mode else B", &c),
            Err(ModeDependent("#EBS_Mode".into()))
        );
        assert_eq!(
            collapse("A if #SMT_on else B", &c),
            Err(ModeDependent("#SMT_on".into()))
        );
        assert_eq!(
            collapse("A if #EBS_Mode else B", &cond(SamplingMode::On)).unwrap(),
            "A"
        );
        assert_eq!(
            collapse("A if #EBS_Mode else B", &cond(SamplingMode::Off)).unwrap(),
            "B"
        );
    }

    #[test]
    fn clause_inside_group_keeps_surrounding_text() {
        let c = cond(SamplingMode::On);
        assert_eq!(collapse("X / (A if #SMT_on else B)", &c).unwrap(), "X / (A)");
        let c = cond(SamplingMode::Off);
        assert_eq!(collapse("X / (A if #SMT_on else B)", &c).unwrap(), "X / (B)");
        assert_eq!(
            collapse("INST / (4 if #Model in ['ICL'] else 5)", &c).unwrap(),
            "INST / (5)"
        );
        assert_eq!(
            collapse("INST / (4 if #Model in ['ICL', 'CLX'] else 5)", &c).unwrap(),
            "INST / (4)"
        );
    }

    #[test]
    fn clause_in_call_argument_stays_in_argument() {
        let c = cond(SamplingMode::Off);
        assert_eq!(
            collapse("max(Y, A if #SMT_on else B) * 2", &c).unwrap(),
            "max(Y, B) * 2"
        );
        assert_eq!(
            collapse(r"(cpu@EV\,cmask\=1@ if 1 else C) + D", &c).unwrap(),
            r"(cpu@EV\,cmask\=1@) + D"
        );
    }

    #[test]
    fn unknown_condition_is_left_alone() {
        let c = cond(SamplingMode::Off);
        assert_eq!(
            collapse("A if #Other else (B if 0 else C)", &c).unwrap(),
            "A if #Other else (C)"
        );
    }
}
