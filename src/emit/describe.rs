//! Brief/public description handling.

/// Sentence appended to SMT variants.
pub const SMT_SENTENCE: &str = "SMT version; use when SMT is enabled and measuring per logical CPU.";

/// Append a sentence, terminating the existing text first.
pub fn add_sentence(text: &str, sentence: &str) -> String {
    let text = text.trim();
    if text.ends_with('.') {
        format!("{} {}", text, sentence)
    } else {
        format!("{}. {}", text, sentence)
    }
}

/// Text up to the first sentence break that is not part of `i.e.`.
fn first_sentence(text: &str) -> &str {
    text.match_indices(". ")
        .map(|(idx, _)| idx)
        .find(|&idx| !text[..idx].ends_with("i.e"))
        .map_or(text, |idx| &text[..idx])
}

/// Split a description into (brief, public).
///
/// Multi-sentence text is shortened to its first sentence; the full text is
/// kept as the public description when it differs.
pub fn describe(
    description: &str,
    locate_with: &str,
    extra: Option<&str>,
) -> (String, Option<String>) {
    let mut full = description.to_string();
    if !locate_with.is_empty() {
        full = format!("{}, Sample with: {}", full, locate_with);
    }

    if full.matches('.').count() <= 1 {
        let brief = match extra {
            Some(sentence) => add_sentence(&full, sentence),
            None => full,
        };
        return (brief, None);
    }

    let mut brief = first_sentence(&full).to_string();
    if let Some(sentence) = extra {
        brief = add_sentence(&brief, sentence);
        full = add_sentence(&full, sentence);
    }
    let public = (full != brief).then_some(full);
    (brief, public)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn single_sentence_is_kept_whole() {
        assert_eq!(
            describe("Instructions per cycle.", "", None),
            ("Instructions per cycle.".to_string(), None)
        );
    }

    #[test]
    fn long_description_is_split() {
        let (brief, public) = describe(
            "Fraction of slots wasted. Covers stalls, i.e. cycles with no uops. More text.",
            "",
            None,
        );
        assert_eq!(brief, "Fraction of slots wasted");
        assert_eq!(
            public.as_deref(),
            Some("Fraction of slots wasted. Covers stalls, i.e. cycles with no uops. More text.")
        );
    }

    #[test]
    fn abbreviation_is_not_a_sentence_break() {
        let (brief, _) = describe("Bound by memory, i.e. loads. Second.", "", None);
        assert_eq!(brief, "Bound by memory, i.e. loads");
    }

    #[test]
    fn locate_hint_is_appended() {
        let (brief, public) = describe("Cycles stalled", "MEM_LOAD_RETIRED.L3_MISS", None);
        assert_eq!(
            brief,
            "Cycles stalled, Sample with: MEM_LOAD_RETIRED.L3_MISS"
        );
        assert_eq!(public, None);
    }

    #[test]
    fn smt_sentence_is_added_in_both_forms() {
        let (brief, public) = describe("Core utilization. Second sentence.", "", Some(SMT_SENTENCE));
        assert_eq!(brief, format!("Core utilization. {}", SMT_SENTENCE));
        assert_eq!(
            public,
            Some(format!("Core utilization. Second sentence. {}", SMT_SENTENCE))
        );

        let (brief, public) = describe("Core utilization", "", Some(SMT_SENTENCE));
        assert!(brief.ends_with(SMT_SENTENCE));
        assert_eq!(public, None);
    }
}
