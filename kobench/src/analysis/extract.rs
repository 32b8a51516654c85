//! Answer extraction: free-form model output to a canonical option token
//!
//! The cascade below was tuned against real model outputs and historical
//! scores depend on it. Keep the rule order as is.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// `정답: **2**`, `Answer: [B]`, `답 3`
static LABEL_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:정답|Answer|답)[:\s]*(?:\*\*|\[)?([1-5A-E])(?:\*\*|\])?")
        .expect("label marker pattern")
});

/// `2번`, `3 번`
static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([1-5])\s*번").expect("ordinal suffix pattern"));

/// `B.`, `3)`, `A:` or a lone option character
static LEADING_OPTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^([1-5A-E])(?:\.|\)|:|$)").expect("leading option pattern")
});

const AFFIRMATIVE_PREFIXES: &[&str] = &["yes", "true"];
const AFFIRMATIVE_MARKERS: &[&str] = &["정답: 예", "정답: 참"];
const NEGATIVE_PREFIXES: &[&str] = &["no", "false"];
const NEGATIVE_MARKERS: &[&str] = &["정답: 아니오", "정답: 거짓"];

/// Which rule of the cascade produced a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionRule {
    /// Blank output
    Empty,
    LabelMarker,
    OrdinalSuffix,
    LeadingOption,
    Polarity,
    /// Nothing matched; the trimmed text is returned as is
    Fallback,
}

impl ExtractionRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionRule::Empty => "empty",
            ExtractionRule::LabelMarker => "label_marker",
            ExtractionRule::OrdinalSuffix => "ordinal_suffix",
            ExtractionRule::LeadingOption => "leading_option",
            ExtractionRule::Polarity => "polarity",
            ExtractionRule::Fallback => "fallback",
        }
    }
}

/// Result of running the cascade on one prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub token: String,
    pub rule: ExtractionRule,
}

impl Extraction {
    fn new(token: impl Into<String>, rule: ExtractionRule) -> Self {
        Self {
            token: token.into(),
            rule,
        }
    }

    /// Whether a canonical option token was found
    pub fn is_option(&self) -> bool {
        !matches!(self.rule, ExtractionRule::Empty | ExtractionRule::Fallback)
    }
}

/// Map raw prediction text to a canonical answer token
///
/// Rules, first match wins:
/// 1. an answer marker (`정답`, `Answer`, `답`) followed by an option
/// 2. a digit followed by the counter `번`
/// 3. the text starts with an option and a terminator
/// 4. yes/true or no/false polarity, English prefix or Korean marker
/// 5. the trimmed text itself
pub fn extract(text: &str) -> Extraction {
    let text = text.trim();
    if text.is_empty() {
        return Extraction::new("", ExtractionRule::Empty);
    }

    if let Some(caps) = LABEL_MARKER.captures(text) {
        return Extraction::new(caps[1].to_uppercase(), ExtractionRule::LabelMarker);
    }

    if let Some(caps) = ORDINAL_SUFFIX.captures(text) {
        return Extraction::new(&caps[1], ExtractionRule::OrdinalSuffix);
    }

    if let Some(caps) = LEADING_OPTION.captures(text) {
        return Extraction::new(caps[1].to_uppercase(), ExtractionRule::LeadingOption);
    }

    let lower = text.to_lowercase();
    if AFFIRMATIVE_PREFIXES.iter().any(|p| lower.starts_with(p))
        || AFFIRMATIVE_MARKERS.iter().any(|m| text.contains(m))
    {
        return Extraction::new("1", ExtractionRule::Polarity);
    }
    if NEGATIVE_PREFIXES.iter().any(|p| lower.starts_with(p))
        || NEGATIVE_MARKERS.iter().any(|m| text.contains(m))
    {
        return Extraction::new("0", ExtractionRule::Polarity);
    }

    Extraction::new(text, ExtractionRule::Fallback)
}

/// Canonical token only
pub fn extract_answer(text: &str) -> String {
    extract(text).token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_ordinal_and_bare_digit_agree() {
        assert_eq!(extract_answer("정답: **2**"), "2");
        assert_eq!(extract_answer("정답은 2번"), "2");
        assert_eq!(extract_answer("2"), "2");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(extract(""), Extraction::new("", ExtractionRule::Empty));
        assert_eq!(extract("  \n\t "), Extraction::new("", ExtractionRule::Empty));
    }

    #[test]
    fn test_label_marker_variants() {
        assert_eq!(extract("Answer: b").token, "B");
        assert_eq!(extract("answer [C]").token, "C");
        assert_eq!(extract("따라서 정답:3").token, "3");
        assert_eq!(extract("정답: **2**").rule, ExtractionRule::LabelMarker);
    }

    #[test]
    fn test_marker_beats_ordinal() {
        // rule 1 fires before rule 2 even when both are present
        assert_eq!(extract("1번은 틀렸고 정답: 4").token, "4");
    }

    #[test]
    fn test_ordinal_suffix() {
        let e = extract("가장 적절한 것은 3 번입니다.");
        assert_eq!(e, Extraction::new("3", ExtractionRule::OrdinalSuffix));
    }

    #[test]
    fn test_leading_option() {
        assert_eq!(extract("b. 두 번째 보기").token, "B");
        assert_eq!(extract("4) 마지막").token, "4");
        assert_eq!(extract("A: 설명").token, "A");
        assert_eq!(extract("D").rule, ExtractionRule::LeadingOption);
        // no terminator after the option
        assert_eq!(extract("Apple").rule, ExtractionRule::Fallback);
    }

    #[test]
    fn test_polarity() {
        assert_eq!(extract("Yes, they match.").token, "1");
        assert_eq!(extract("TRUE").token, "1");
        assert_eq!(extract("no").token, "0");
        assert_eq!(extract("False.").token, "0");
        assert_eq!(extract("검토 결과 정답: 거짓").token, "0");
    }

    #[test]
    fn test_korean_yes_marker_is_polarity() {
        let e = extract("판단하면 정답: 참");
        assert_eq!(e, Extraction::new("1", ExtractionRule::Polarity));
    }

    #[test]
    fn test_fallback_returns_trimmed_text() {
        let e = extract("  잘 모르겠습니다  ");
        assert_eq!(e, Extraction::new("잘 모르겠습니다", ExtractionRule::Fallback));
        assert!(!e.is_option());
    }

    #[test]
    fn test_digit_out_of_range_falls_through() {
        assert_eq!(extract("7").rule, ExtractionRule::Fallback);
        assert_eq!(extract("0").rule, ExtractionRule::Fallback);
    }
}
