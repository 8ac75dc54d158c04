//! Keyword-frequency builder/destroyer scoring over free text.
//!
//! Each keyword counts at most once per sample regardless of how many times
//! it occurs; the keyword set is scanned once per call.

use core::fmt;

use serde::Serialize;

pub const BUILDER_KEYWORDS: [&str; 13] = [
    "help",
    "build",
    "create",
    "contribute",
    "offer",
    "share",
    "support",
    "collaborate",
    "team",
    "together",
    "improve",
    "solution",
    "fix",
];

pub const DESTROYER_KEYWORDS: [&str; 13] = [
    "fake",
    "scam",
    "stupid",
    "dumb",
    "hate",
    "attack",
    "destroy",
    "waste",
    "useless",
    "never",
    "impossible",
    "can't",
    "won't",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Builder,
    Destroyer,
    Neutral,
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Builder => write!(f, "BUILDER"),
            Label::Destroyer => write!(f, "DESTROYER"),
            Label::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub builder_count: usize,
    pub destroyer_count: usize,
    pub score: f64,
    pub label: Label,
}

pub fn classify(text: &str) -> Classification {
    let lowered = text.to_lowercase();

    let builder_count = BUILDER_KEYWORDS
        .iter()
        .filter(|kw| lowered.contains(*kw))
        .count();
    let destroyer_count = DESTROYER_KEYWORDS
        .iter()
        .filter(|kw| lowered.contains(*kw))
        .count();

    let total = builder_count + destroyer_count;
    let score = if total == 0 {
        // neutral; also sidesteps the division by zero
        0.5
    } else {
        builder_count as f64 / total as f64
    };

    let label = if score > 0.6 {
        Label::Builder
    } else if score < 0.4 {
        Label::Destroyer
    } else {
        Label::Neutral
    };

    Classification {
        builder_count,
        destroyer_count,
        score,
        label,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_empty_text_is_neutral() {
        let result = classify("");

        assert_eq!(result.builder_count, 0);
        assert_eq!(result.destroyer_count, 0);
        assert_eq!(result.score, 0.5);
        assert_eq!(result.label, Label::Neutral);
    }

    #[test]
    fn test_builder_text() {
        let result = classify("let's help and build together");

        assert!(result.builder_count >= 2);
        assert_eq!(result.destroyer_count, 0);
        assert_eq!(result.score, 1.0);
        assert_eq!(result.label, Label::Builder);
    }

    #[test]
    fn test_destroyer_text() {
        let result = classify("this is stupid and a scam");

        assert!(result.destroyer_count >= 2);
        assert_eq!(result.builder_count, 0);
        assert_eq!(result.score, 0.0);
        assert_eq!(result.label, Label::Destroyer);
    }

    #[test]
    fn test_mixed_text_is_neutral() {
        let result = classify("i hate this bug but lets fix it");

        assert_eq!(result.builder_count, 1);
        assert_eq!(result.destroyer_count, 1);
        assert_eq!(result.score, 0.5);
        assert_eq!(result.label, Label::Neutral);
    }

    #[test]
    fn test_keyword_counted_once_per_sample() {
        let result = classify("build build build build");

        assert_eq!(result.builder_count, 1);
        assert_eq!(result.score, 1.0);
    }

    #[test]
    fn test_case_insensitive() {
        let result = classify("HELP me BUILD this");

        assert_eq!(result.builder_count, 2);
        assert_eq!(result.label, Label::Builder);
    }

    #[test]
    fn test_score_bounds() {
        for text in [
            "",
            "hello world",
            "help help help",
            "scam scam scam",
            "build a fake solution to waste everyone",
        ] {
            let result = classify(text);
            assert!((0.0..=1.0).contains(&result.score), "score out of bounds for {text:?}");
        }
    }
}
