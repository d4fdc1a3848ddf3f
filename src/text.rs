//! Review text post-processing: whitespace normalization, word counting,
//! word-window enforcement and the structural conformance gate.
//!
//! Nothing in this module returns an error. Malformed model output degrades
//! to "unchanged" or to a hard token trim.

use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_REVIEW_WORDS: usize = 600;
pub const MAX_REVIEW_WORDS: usize = 800;

/// Section markers every generated review must contain, in canonical order.
pub const REQUIRED_SECTIONS: [&str; 6] = [
    "Summary",
    "Strengths",
    "Weaknesses",
    "Questions",
    "Overall",
    "Confidence",
];

static CODE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[\s\S]*?```").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[.!?]\s+").unwrap());
static OVERALL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Overall\s*\[?\s*(\d{1,2})\s*\]?").unwrap());
static CONFIDENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Confidence\s*\[?\s*(\d{1,2})\s*\]?").unwrap());

/// Drops fenced code blocks, collapses whitespace runs to a single space and trims.
pub fn normalize_whitespace(text: &str) -> String {
    let without_code = CODE_BLOCK_RE.replace_all(text, " ");
    WHITESPACE_RE
        .replace_all(&without_code, " ")
        .trim()
        .to_string()
}

pub fn word_count(text: &str) -> usize {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return 0;
    }
    normalized.split(' ').count()
}

/// Brings `text` inside `[min_words, max_words]` where that can be done by cutting.
///
/// Text that is empty, too short, or already inside the window comes back
/// unchanged; lengthening a short draft is the caller's job (usually another
/// model turn). Text that is too long is cut at the last sentence boundary that
/// keeps the normalized count within `max_words`. When not even the first
/// sentence fits, the normalized text is trimmed to exactly `max_words` tokens.
pub fn enforce_window(text: &str, min_words: usize, max_words: usize) -> String {
    let wc = word_count(text);
    if wc == 0 || wc < min_words || wc <= max_words {
        return text.to_string();
    }

    let mut kept = String::new();
    for sentence in split_sentences(text) {
        let candidate = if kept.is_empty() {
            sentence.to_string()
        } else {
            format!("{} {}", kept, sentence)
        };
        if word_count(candidate.trim()) > max_words {
            break;
        }
        kept = candidate;
    }

    let truncated = kept.trim();
    if !truncated.is_empty() {
        return truncated.to_string();
    }

    normalize_whitespace(text)
        .split(' ')
        .take(max_words)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits after `.`, `!` or `?` when followed by whitespace; the whitespace
/// itself is dropped and the punctuation stays with its sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    for m in SENTENCE_END_RE.find_iter(text) {
        // punctuation is a single ASCII byte
        let end = m.start() + 1;
        sentences.push(&text[start..end]);
        start = m.end();
    }
    sentences.push(&text[start..]);
    sentences
}

/// True only when every one of [`REQUIRED_SECTIONS`] appears verbatim
/// (case-sensitive) somewhere in the text. Order and surrounding prose are
/// ignored: this is a cheap conformance gate, not a parser.
pub fn validate_structure(text: &str) -> bool {
    REQUIRED_SECTIONS.iter().all(|section| text.contains(section))
}

pub fn missing_sections(text: &str) -> Vec<&'static str> {
    REQUIRED_SECTIONS
        .iter()
        .copied()
        .filter(|section| !text.contains(section))
        .collect()
}

/// Best-effort read of the reviewer's own `Overall [N]` and `Confidence [N]`
/// ratings. Only used for audit notes; absent or odd formatting yields `None`.
pub fn parse_overall_confidence(text: &str) -> (Option<u8>, Option<u8>) {
    let grab = |re: &Regex| {
        re.captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
    };
    (grab(&OVERALL_RE), grab(&CONFIDENCE_RE))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(n: usize) -> String {
        vec!["word"; n].join(" ")
    }

    #[test]
    fn test_normalize_strips_code_and_whitespace() {
        let text = "  Intro\n\n```rust\nfn main() {}\n```\tafter   it  ";
        assert_eq!(normalize_whitespace(text), "Intro after it");
        assert_eq!(word_count(text), 3);
    }

    #[test]
    fn test_word_count_empty() {
        assert_eq!(word_count(""), 0);
        assert_eq!(word_count(" \n\t "), 0);
        assert_eq!(word_count("```only code```"), 0);
    }

    #[test]
    fn test_enforce_window_leaves_short_and_in_range_text() {
        let short = words(10);
        assert_eq!(enforce_window(&short, 600, 800), short);

        let in_range = format!("{}.", words(700));
        assert_eq!(enforce_window(&in_range, 600, 800), in_range);

        assert_eq!(enforce_window("", 600, 800), "");
        assert_eq!(enforce_window("   ", 600, 800), "   ");
    }

    #[test]
    fn test_enforce_window_cuts_at_sentence_boundary() {
        // five sentences of ten words each
        let sentence = format!("{}.", words(10));
        let text = vec![sentence.as_str(); 5].join(" ");
        let out = enforce_window(&text, 10, 35);
        assert_eq!(word_count(&out), 30);
        assert!(out.ends_with('.'));
    }

    #[test]
    fn test_enforce_window_mixed_punctuation() {
        let text = "One two three! Four five six? Seven eight nine. Ten eleven twelve.";
        let out = enforce_window(text, 1, 7);
        assert_eq!(out, "One two three! Four five six?");
    }

    #[test]
    fn test_enforce_window_hard_trim_without_punctuation() {
        let text = words(900);
        let out = enforce_window(&text, 600, 800);
        assert_eq!(word_count(&out), 800);
    }

    #[test]
    fn test_enforce_window_hard_trim_when_first_sentence_too_long() {
        let text = format!("{}. Short tail.", words(850));
        let out = enforce_window(&text, 600, 800);
        assert_eq!(word_count(&out), 800);
        assert!(!out.contains("tail"));
    }

    #[test]
    fn test_enforce_window_is_idempotent() {
        let sentence = format!("{}.", words(50));
        let text = vec![sentence.as_str(); 20].join("\n");
        let once = enforce_window(&text, 600, 800);
        let twice = enforce_window(&once, 600, 800);
        assert_eq!(once, twice);
        assert!(word_count(&once) <= 800);
        assert!(word_count(&once) >= 600);
    }

    #[test]
    fn test_enforce_window_never_panics_on_odd_input() {
        for text in ["...", "!!! ???", "é. ü! 漢字? ", "```", "a.\u{00a0}b", "\n.\n"] {
            let out = enforce_window(text, 0, 1);
            assert!(word_count(&out) <= 1, "input {:?} gave {:?}", text, out);
        }
    }

    #[test]
    fn test_validate_structure() {
        let full = "Summary: x\nStrengths: y\nWeaknesses: z\nQuestions: q\nOverall [6]\nConfidence [4]";
        assert!(validate_structure(full));

        let shuffled = "Confidence 3. Overall 5. Questions? Weaknesses. Strengths. Summary.";
        assert!(validate_structure(shuffled));

        for section in REQUIRED_SECTIONS {
            let without = full.replace(section, "");
            assert!(!validate_structure(&without), "missing {} accepted", section);
            assert_eq!(missing_sections(&without), vec![section]);
        }

        assert!(!validate_structure(&full.to_lowercase()));
    }

    #[test]
    fn test_parse_overall_confidence() {
        assert_eq!(
            parse_overall_confidence("Overall [7]\nConfidence: [4]"),
            (Some(7), None)
        );
        assert_eq!(
            parse_overall_confidence("Overall 8 ... Confidence 3"),
            (Some(8), Some(3))
        );
        assert_eq!(parse_overall_confidence("nothing here"), (None, None));
    }
}
