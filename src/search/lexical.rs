//! Keyword extraction and lexical scoring with medical-synonym expansion.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

const SYNONYM_WEIGHT: f64 = 0.8;

/// Static medical synonym groups. The key term is what queries carry; any
/// group member appearing in a target counts as a synonym match.
pub(crate) const SYNONYMS: &[(&str, &[&str])] = &[
    ("diabetes", &["diabetes mellitus", "dm", "diabetic", "hyperglycemia"]),
    (
        "cancer",
        &["carcinoma", "tumor", "neoplasm", "malignancy", "oncology"],
    ),
    (
        "heart disease",
        &["cardiovascular disease", "cvd", "cardiac", "coronary"],
    ),
    ("hypertension", &["high blood pressure", "htn", "elevated bp"]),
    ("kidney disease", &["renal disease", "nephropathy", "ckd"]),
    ("liver disease", &["hepatic disease", "hepatitis", "cirrhosis"]),
    (
        "lung disease",
        &["pulmonary disease", "respiratory disease", "copd"],
    ),
    ("medication", &["drug", "medicine", "pharmaceutical", "therapy"]),
    ("treatment", &["therapy", "intervention", "procedure", "protocol"]),
];

static KEYWORD_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b\w*diabetes\w*\b",
        r"\b\w*cancer\w*\b",
        r"\b\w*cardio\w*\b",
        r"\b\w*therapy\w*\b",
        r"\b\w*treatment\w*\b",
        r"\bnct\d+\b",
        r"\btype\s*[12]\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static PROPER_NOUNS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b[A-Z][a-z]+(?:\s+[A-Z][a-z]+)*\b").expect("static pattern")
});

fn synonym_group(term: &str) -> Option<&'static [&'static str]> {
    SYNONYMS
        .iter()
        .find(|(key, _)| *key == term)
        .map(|(_, synonyms)| *synonyms)
}

/// Extracts search keywords: synonym keys present in the text, medical
/// word-shape patterns, and capitalized proper nouns, deduplicated in
/// first-seen order.
pub(crate) fn extract_keywords(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let text_lower = text.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();

    for (term, _) in SYNONYMS {
        if text_lower.contains(term) {
            keywords.push((*term).to_string());
        }
    }

    for pattern in KEYWORD_PATTERNS.iter() {
        for m in pattern.find_iter(&text_lower) {
            keywords.push(m.as_str().to_string());
        }
    }

    for m in PROPER_NOUNS.find_iter(text) {
        keywords.push(m.as_str().to_lowercase());
    }

    let mut seen = HashSet::new();
    keywords.retain(|k| seen.insert(k.clone()));
    keywords
}

/// Fraction of query weight matched in the target. Exact substring matches
/// contribute full weight; a synonym-group match contributes 0.8.
pub(crate) fn keyword_score(query_keywords: &[String], target_text: &str) -> f64 {
    if query_keywords.is_empty() || target_text.trim().is_empty() {
        return 0.0;
    }

    let target_lower = target_text.to_lowercase();
    let mut matches = 0.0;
    let mut total_weight = 0.0;

    for keyword in query_keywords {
        let keyword_lower = keyword.to_lowercase();
        let weight = 1.0;

        if target_lower.contains(&keyword_lower) {
            matches += weight;
        } else if let Some(synonyms) = synonym_group(&keyword_lower)
            && synonyms.iter().any(|s| target_lower.contains(s))
        {
            matches += weight * SYNONYM_WEIGHT;
        }

        total_weight += weight;
    }

    if total_weight == 0.0 {
        0.0
    } else {
        matches / total_weight
    }
}

pub(crate) fn matched_keywords(query_keywords: &[String], target_text: &str) -> Vec<String> {
    let target_lower = target_text.to_lowercase();
    query_keywords
        .iter()
        .filter(|k| target_lower.contains(&k.to_lowercase()))
        .cloned()
        .collect()
}

fn are_related_concepts(a: &str, b: &str) -> bool {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    if a == b {
        return true;
    }

    for (term, synonyms) in SYNONYMS {
        let in_group = |value: &str| *term == value || synonyms.contains(&value);
        if in_group(&a) && in_group(&b) {
            return true;
        }
    }

    a.len() > 4 && b.len() > 4 && (a.contains(&b) || b.contains(&a))
}

/// Terms among the target's indexed keywords that the synonym expansion
/// flags as related to the query's keywords.
pub(crate) fn matched_concepts(query_text: &str, target_keywords: &[String]) -> Vec<String> {
    let query_keywords = extract_keywords(query_text);

    let mut matched: Vec<String> = Vec::new();
    let mut seen = HashSet::new();
    for query_keyword in &query_keywords {
        for target_keyword in target_keywords {
            if are_related_concepts(query_keyword, target_keyword)
                && seen.insert(target_keyword.clone())
            {
                matched.push(target_keyword.clone());
            }
        }
    }
    matched
}
