//! Medical entity extraction from clinical free text.
//!
//! Pure functions over the text; no I/O. Compound multi-word terms are
//! matched first and preserved atomically; shorter matches that fall inside
//! a recorded compound are discarded.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::entities::extraction::{ExtractedDemographics, ExtractedEntities};
use crate::entities::patient::Sex;
use crate::entities::trial::{AgeRange, GenderRequirement};

mod vocabulary;

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern")
}

/// Word-boundary pattern per vocabulary term, paired with the term itself.
fn term_patterns(table: &[(&'static str, &[&'static str])]) -> Vec<(&'static str, Regex)> {
    let mut patterns = Vec::new();
    for (_, terms) in table {
        for term in *terms {
            patterns.push((*term, compile(&format!(r"\b{}\b", regex::escape(term)))));
        }
    }
    patterns
}

/// Compound patterns tolerate hyphen-or-space between tokens and flexible
/// internal whitespace.
fn compound_pattern(compound: &str) -> Regex {
    let mut pattern = String::from(r"\b");
    for c in compound.chars() {
        match c {
            '-' => pattern.push_str(r"[-\s]*"),
            ' ' => pattern.push_str(r"\s+"),
            c if c.is_ascii_alphanumeric() => pattern.push(c),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push_str(r"\b");
    compile(&pattern)
}

static CONDITION_TERMS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| term_patterns(vocabulary::CONDITIONS));
static MEDICATION_TERMS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| term_patterns(vocabulary::MEDICATIONS));
static PROCEDURE_TERMS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| term_patterns(vocabulary::PROCEDURES));
static LAB_TERMS: LazyLock<Vec<(&'static str, Regex)>> =
    LazyLock::new(|| term_patterns(vocabulary::LAB_VALUES));
static COMPOUND_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    vocabulary::COMPOUND_CONDITIONS
        .iter()
        .map(|c| (*c, compound_pattern(c)))
        .collect()
});
static ABBREVIATION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vocabulary::ABBREVIATIONS
        .iter()
        .map(|(pattern, replacement)| (compile(pattern), *replacement))
        .collect()
});

static EXCLUSION_SPANS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"exclusion[^:\n]*:([^\n]+)",
        r"exclude[^:\n]*:([^\n]+)",
        r"not\s+(?:eligible|allowed|permitted)[^:\n]*:([^\n]+)",
        r"contraindication[^:\n]*:([^\n]+)",
    ]
    .iter()
    .map(|p| compile(p))
    .collect()
});

static AGE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bage\s+(\d+)\b",
        r"\b(\d+)\s*year\s*old\b",
        r"\b(\d+)\s*yo\b",
    ]
    .iter()
    .map(|p| compile(p))
    .collect()
});

static FEMALE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?:female|woman|girl)\b"));
static MALE: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?:male|man|boy)\b"));

enum AgeBound {
    Range,
    Min,
    Max,
}

static AGE_REQUIREMENT_PATTERNS: LazyLock<Vec<(AgeBound, Regex)>> = LazyLock::new(|| {
    vec![
        (
            AgeBound::Range,
            compile(r"\b(\d+)\s*(?:to|-)\s*(\d+)\s*years?\b"),
        ),
        (
            AgeBound::Range,
            compile(r"\baged?\s+(\d+)\s*(?:to|-)\s*(\d+)\b"),
        ),
        (
            AgeBound::Range,
            compile(r"\b(?:between|from)\s+(\d+)\s+(?:and|to)\s+(\d+)(?:\s*years?)?\b"),
        ),
        (
            AgeBound::Min,
            compile(r"\b(?:minimum|min)\s*age\s*(?:of\s*)?(\d+)\b"),
        ),
        (AgeBound::Min, compile(r"\b(?:over|above)\s+(\d+)\s*years?\b")),
        (
            AgeBound::Max,
            compile(r"\b(?:maximum|max)\s*age\s*(?:of\s*)?(\d+)\b"),
        ),
        (AgeBound::Max, compile(r"\b(?:under|below)\s+(\d+)\s*years?\b")),
    ]
});

static ALL_GENDERS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"\b(?:all|both)\s*(?:genders?|sexes?)\b"));
static MALE_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?:males?|men)(?:\s+(?:patients?|participants?|subjects?))?\s+only\b|\bonly\s+(?:males?|men)\b")
});
static FEMALE_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\b(?:females?|women)(?:\s+(?:patients?|participants?|subjects?))?\s+only\b|\bonly\s+(?:females?|women)\b")
});

static DEMOGRAPHIC_MARKER_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vocabulary::DEMOGRAPHIC_MARKERS
        .iter()
        .map(|p| compile(p))
        .collect()
});

static BULLET_LINES: LazyLock<Regex> = LazyLock::new(|| compile(r"[\n\r]\s*[\d\-\*]"));
static LOGICAL_OPERATORS: LazyLock<Regex> =
    LazyLock::new(|| compile(r"(?i)\b(?:and|or|not|except|unless)\b"));

/// Lowercases, expands common clinical abbreviations, and collapses
/// whitespace runs within each line. Line structure is preserved so that
/// line-bounded passes (exclusion spans) behave the same before and after
/// preprocessing. Idempotent.
pub fn preprocess(text: &str) -> String {
    let mut processed = text.to_lowercase();
    for (pattern, replacement) in ABBREVIATION_PATTERNS.iter() {
        processed = pattern.replace_all(&processed, *replacement).into_owned();
    }
    processed
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn dedup_preserve_order(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn match_compounds(text: &str) -> Vec<String> {
    COMPOUND_PATTERNS
        .iter()
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(compound, _)| compound.to_string())
        .collect()
}

/// Hyphen-insensitive form used for the compound-substring check.
fn flatten(term: &str) -> String {
    term.replace('-', " ")
}

fn match_terms(
    text: &str,
    patterns: &[(&'static str, Regex)],
    compounds: &[String],
) -> Vec<String> {
    let flattened: Vec<String> = compounds.iter().map(|c| flatten(c)).collect();
    patterns
        .iter()
        .filter(|(_, pattern)| pattern.is_match(text))
        .map(|(term, _)| term.to_string())
        .filter(|term| {
            let flat = flatten(term);
            !flattened.iter().any(|c| c.contains(&flat) && *c != flat)
        })
        .collect()
}

fn extract_excluded(text: &str) -> Vec<String> {
    let mut excluded = Vec::new();
    for pattern in EXCLUSION_SPANS.iter() {
        for captures in pattern.captures_iter(text) {
            if let Some(span) = captures.get(1) {
                let span_text = span.as_str();
                let compounds = match_compounds(span_text);
                let singles = match_terms(span_text, &CONDITION_TERMS, &compounds);
                excluded.extend(compounds);
                excluded.extend(singles);
            }
        }
    }
    dedup_preserve_order(excluded)
}

fn extract_demographics(text: &str) -> ExtractedDemographics {
    let age = AGE_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok())
    });

    // Female patterns first: word boundaries keep "woman"/"female" from
    // triggering the male alternatives.
    let sex = if FEMALE.is_match(text) {
        Some(Sex::Female)
    } else if MALE.is_match(text) {
        Some(Sex::Male)
    } else {
        None
    };

    let mut markers = Vec::new();
    for pattern in DEMOGRAPHIC_MARKER_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            markers.push(m.as_str().to_string());
        }
    }

    ExtractedDemographics {
        age,
        sex,
        other_markers: dedup_preserve_order(markers),
    }
}

fn extract_age_requirements(text: &str) -> AgeRange {
    let mut range = AgeRange::default();
    for (bound, pattern) in AGE_REQUIREMENT_PATTERNS.iter() {
        for captures in pattern.captures_iter(text) {
            match bound {
                AgeBound::Range => {
                    let min = captures.get(1).and_then(|m| m.as_str().parse().ok());
                    let max = captures.get(2).and_then(|m| m.as_str().parse().ok());
                    if min.is_some() && max.is_some() {
                        range.min = min;
                        range.max = max;
                    }
                }
                AgeBound::Min => {
                    range.min = captures.get(1).and_then(|m| m.as_str().parse().ok());
                }
                AgeBound::Max => {
                    range.max = captures.get(1).and_then(|m| m.as_str().parse().ok());
                }
            }
        }
    }
    range
}

/// Only explicit "only" phrasings constrain sex; mentions of pregnancy or
/// nursing never do.
fn extract_gender_requirements(text: &str) -> GenderRequirement {
    if ALL_GENDERS.is_match(text) {
        return GenderRequirement::All;
    }
    if MALE_ONLY.is_match(text) {
        return GenderRequirement::Male;
    }
    if FEMALE_ONLY.is_match(text) {
        return GenderRequirement::Female;
    }
    GenderRequirement::All
}

/// Extracts medical entities from clinical text.
pub fn extract(text: &str) -> ExtractedEntities {
    if text.trim().is_empty() {
        return ExtractedEntities::default();
    }

    let processed = preprocess(text);
    // Compounds are matched on the raw lowercased text so that hyphen and
    // spacing variants survive preprocessing untouched.
    let original_lower = text.to_lowercase();

    let mut compounds = match_compounds(&original_lower);
    compounds.extend(match_compounds(&processed));
    let compounds = dedup_preserve_order(compounds);

    let mut conditions = compounds.clone();
    conditions.extend(match_terms(&processed, &CONDITION_TERMS, &compounds));

    ExtractedEntities {
        conditions: dedup_preserve_order(conditions),
        excluded_conditions: extract_excluded(&processed),
        medications: dedup_preserve_order(match_terms(&processed, &MEDICATION_TERMS, &compounds)),
        procedures: dedup_preserve_order(match_terms(&processed, &PROCEDURE_TERMS, &compounds)),
        lab_values: dedup_preserve_order(match_terms(&processed, &LAB_TERMS, &compounds)),
        demographics: extract_demographics(&processed),
        age_requirements: extract_age_requirements(&processed),
        gender_requirements: extract_gender_requirements(&processed),
    }
}

/// Complexity estimate in [0, 1] combining length, entity density,
/// criteria bullet count, and logical-operator density.
pub fn text_complexity(text: &str) -> f64 {
    if text.trim().is_empty() {
        return 0.0;
    }

    let entities = extract(text);
    let entity_count = entities.conditions.len()
        + entities.excluded_conditions.len()
        + entities.medications.len()
        + entities.procedures.len()
        + entities.lab_values.len();

    let length_factor = (text.chars().count() as f64 / 1000.0).min(1.0) * 0.2;
    let entity_factor = (entity_count as f64 / 20.0).min(1.0) * 0.3;
    let bullet_factor = (BULLET_LINES.find_iter(text).count() as f64 / 10.0).min(1.0) * 0.3;
    let operator_factor =
        (LOGICAL_OPERATORS.find_iter(text).count() as f64 / 5.0).min(1.0) * 0.2;

    length_factor + entity_factor + bullet_factor + operator_factor
}

/// Maps shorthand entity text to its canonical form, when one is known.
pub fn normalize_entity(entity: &str, entity_type: &str) -> String {
    let entity = entity.trim().to_lowercase();
    for (kind, mappings) in vocabulary::NORMALIZATIONS {
        if *kind == entity_type
            && let Some((_, canonical)) = mappings.iter().find(|(raw, _)| *raw == entity)
        {
            return (*canonical).to_string();
        }
    }
    entity
}
