//! Literal rewrites applied to every formula after reference expansion.

use crate::family::{ExecutionUnit, FamilyProfile};
use regex::{Captures, NoExpand, Regex};
use std::sync::LazyLock;

static GENERIC_REWRITES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r":sup\b", ":k"),
        (r":SUP\b", ":k"),
        (r":USER\b", ":u"),
        (r":percore\b", ""),
        (r":perf_metrics\b", ""),
        (r"\bTSC\b", "msr@tsc@"),
        (r"_PS\b", ""),
        (r"\b1\s*==\s*1\b", "1"),
    ]
    .into_iter()
    .map(|(pattern, rep)| (Regex::new(pattern).expect("valid rewrite pattern"), rep))
    .collect()
});

static CLKS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bCLKS\b").expect("valid CLKS pattern"));

// EVENT:c1:e1:i1:u0x3 and any subset, in any order.
static MODIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([A-Z0-9_.]+)((?::(?:c\d+|e\d+|i\d+|u0x[0-9a-fA-F]+))+)\b")
        .expect("valid modifier pattern")
});

static SCIENTIFIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)(?:\.(\d+))?[eE]\+?(\d+)\b").expect("valid number pattern")
});

/// Family substitution table, in table order.
pub fn apply_substitutions(form: &str, profile: &FamilyProfile) -> String {
    profile
        .substitutions
        .iter()
        .fold(form.to_string(), |acc, sub| {
            acc.replace(&sub.pattern, &sub.escaped_replacement())
        })
}

/// Privilege suffixes, dropped qualifiers, TSC/CLKS shorthands, `_PS`
/// sampling suffixes and trivial `1==1` comparisons.
pub fn rewrite_generic(form: &str, unit: ExecutionUnit) -> String {
    let mut form = GENERIC_REWRITES
        .iter()
        .fold(form.to_string(), |acc, (re, rep)| {
            re.replace_all(&acc, NoExpand(rep)).into_owned()
        });
    form = CLKS_RE
        .replace_all(&form, NoExpand(unit.clocks_event()))
        .into_owned();
    form
}

/// `EVENT:c1:e1` → `cpu@EVENT\,cmask\=1\,edge\=1@` (prefix per unit).
pub fn rewrite_modifiers(form: &str, unit: ExecutionUnit) -> String {
    MODIFIER_RE
        .replace_all(form, |caps: &Captures| {
            let mut out = format!("{}@{}", unit.prefix(), &caps[1]);
            for modifier in caps[2].split(':').filter(|m| !m.is_empty()) {
                let (key, value) = modifier.split_at(1);
                let key = match key {
                    "c" => "cmask",
                    "e" => "edge",
                    "i" => "inv",
                    _ => "umask",
                };
                out.push_str(&format!(r"\,{}\={}", key, value));
            }
            out.push('@');
            out
        })
        .into_owned()
}

/// Larger exponents are left in scientific form.
const MAX_EXPANDED_EXPONENT: usize = 64;

/// Expand scientific literals (`1e12`) into plain digits.
pub fn normalize_numbers(form: &str) -> String {
    SCIENTIFIC_RE
        .replace_all(form, |caps: &Captures| {
            let int = &caps[1];
            let frac = caps.get(2).map_or("", |m| m.as_str());
            match caps[3].parse::<usize>() {
                Ok(exp) if exp <= MAX_EXPANDED_EXPONENT => expand_scientific(int, frac, exp),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn expand_scientific(int: &str, frac: &str, exp: usize) -> String {
    let digits = format!("{}{}", int, frac);
    if exp >= frac.len() {
        let padded = format!("{}{}", digits, "0".repeat(exp - frac.len()));
        let trimmed = padded.trim_start_matches('0');
        if trimmed.is_empty() {
            "0".to_string()
        } else {
            trimmed.to_string()
        }
    } else {
        let point = int.len() + exp;
        let whole = digits[..point].trim_start_matches('0');
        let whole = if whole.is_empty() { "0" } else { whole };
        format!("{}.{}", whole, &digits[point..])
    }
}

/// Wrap in parentheses when the expression has an arithmetic operator and is
/// not already one parenthesized group. Idempotent.
pub fn bracket(expr: &str) -> String {
    let has_operator = expr.contains(['/', '*', '+', '-']);
    if !has_operator || is_single_group(expr) {
        expr.to_string()
    } else {
        format!("({})", expr)
    }
}

fn is_single_group(expr: &str) -> bool {
    if !expr.starts_with('(') || !expr.ends_with(')') {
        return false;
    }
    let mut depth = 0i32;
    for (idx, c) in expr.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return idx == expr.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}
