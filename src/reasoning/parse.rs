//! Parsing of free-form model output into a structured eligibility verdict.

use std::sync::LazyLock;

use regex::Regex;

use crate::entities::match_result::MatchStatus;
use crate::reasoning::LlmReasoningStep;

const POSITIVE_SIGNALS: [&str; 3] = ["eligible", "qualifies", "meets criteria"];
const NEGATIVE_SIGNALS: [&str; 3] = ["not eligible", "ineligible", "does not qualify"];

const REASONING_SECTIONS: [&str; 3] = ["assessment", "analysis", "conclusion"];

const CONTRAINDICATION_KEYWORDS: [&str; 7] = [
    "contraindication",
    "contraindicated",
    "not recommended",
    "risk",
    "interaction",
    "allergy",
    "adverse",
];

const RECOMMENDATION_KEYWORDS: [&str; 5] =
    ["recommend", "suggest", "advise", "should", "consider"];

static CONFIDENCE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"confidence[:\s]+(\d{1,3})\s*%",
        r"confident[:\s]+(\d{1,3})\s*%",
        r"certainty[:\s]+(\d{1,3})\s*%",
        r"(\d{1,3})\s*%\s*confidence",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

/// Verdict extraction: positive and negative phrases together (or neither)
/// mean the model's answer needs human review. Negative phrases are scrubbed
/// before the positive scan so "ineligible" never reads as "eligible".
pub(crate) fn extract_eligibility_status(content: &str) -> MatchStatus {
    let lower = content.to_lowercase();

    let negative = NEGATIVE_SIGNALS.iter().any(|s| lower.contains(s));
    let mut scrubbed = lower.clone();
    for signal in NEGATIVE_SIGNALS {
        scrubbed = scrubbed.replace(signal, " ");
    }
    let positive = POSITIVE_SIGNALS.iter().any(|s| scrubbed.contains(s));

    match (positive, negative) {
        (true, false) => MatchStatus::Eligible,
        (false, true) => MatchStatus::Ineligible,
        _ => MatchStatus::RequiresReview,
    }
}

/// Confidence percent from the response text; absent markers fall back on
/// the verdict (0.8 positive, 0.7 negative, 0.5 otherwise).
pub(crate) fn extract_confidence_score(content: &str, status: MatchStatus) -> f64 {
    let lower = content.to_lowercase();
    for pattern in CONFIDENCE_PATTERNS.iter() {
        if let Some(value) = pattern
            .captures(&lower)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
        {
            return (value / 100.0).clamp(0.0, 1.0);
        }
    }

    match status {
        MatchStatus::Eligible => 0.8,
        MatchStatus::Ineligible => 0.7,
        _ => 0.5,
    }
}

fn char_bounded_excerpt(content: &str, start: usize, max_chars: usize) -> String {
    let mut start = start.min(content.len());
    while start > 0 && !content.is_char_boundary(start) {
        start -= 1;
    }
    content[start..].chars().take(max_chars).collect()
}

/// One step per section heading present, numbered contiguously from 1 in
/// section order, each carrying a 200-character excerpt.
pub(crate) fn extract_reasoning_steps(content: &str) -> Vec<LlmReasoningStep> {
    let lower = content.to_lowercase();
    let mut steps = Vec::new();

    for section in REASONING_SECTIONS {
        let Some(start) = lower.find(section) else {
            continue;
        };
        steps.push(LlmReasoningStep {
            step_number: steps.len() as u32 + 1,
            category: section.to_string(),
            description: char_bounded_excerpt(content, start, 200),
            confidence: 0.7,
        });
    }

    steps
}

fn lines_containing<'a>(content: &'a str, keywords: &[&str], max: usize) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| {
            let lower = line.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
        .take(max)
        .map(str::to_string)
        .collect()
}

pub(crate) fn extract_contraindications(content: &str) -> Vec<String> {
    lines_containing(content, &CONTRAINDICATION_KEYWORDS, 5)
}

pub(crate) fn extract_recommendations(content: &str) -> Vec<String> {
    lines_containing(content, &RECOMMENDATION_KEYWORDS, 3)
}

/// Content after a `conclusion` heading, or the first sentence.
pub(crate) fn extract_conclusion(content: &str) -> String {
    let lower = content.to_lowercase();
    if let Some(start) = lower.find("conclusion") {
        return char_bounded_excerpt(content, start, 300).trim().to_string();
    }

    content
        .split('.')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Assessment completed")
        .to_string()
}
