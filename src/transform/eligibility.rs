//! Eligibility text parsing: section splitting and age normalization.

use crate::entities::trial::AgeRange;

/// Converts a registry age string (`"18 Years"`, `"6 Months"`, `"90 Days"`)
/// to integer years, rounding down, with a floor of 0.
pub(crate) fn parse_age_years(raw: &str) -> Option<u32> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("n/a") {
        return None;
    }

    let mut parts = raw.split_whitespace();
    let number: f64 = parts.next()?.parse().ok()?;
    if number < 0.0 {
        return Some(0);
    }

    let years = match parts.next().map(str::to_ascii_lowercase) {
        Some(unit) if unit.starts_with("year") => number,
        Some(unit) if unit.starts_with("month") => number / 12.0,
        Some(unit) if unit.starts_with("day") => number / 365.0,
        Some(_) => number,
        None => number,
    };

    Some(years.floor() as u32)
}

pub(crate) fn parse_age_range(min_age: Option<&str>, max_age: Option<&str>) -> AgeRange {
    AgeRange::new(
        min_age.and_then(parse_age_years),
        max_age.and_then(parse_age_years),
    )
}

#[derive(Clone, Copy, PartialEq)]
enum Section {
    None,
    Inclusion,
    Exclusion,
}

/// Strips a leading bullet marker (`-`, `*`, `•`, or a numeric/letter
/// enumerator) and returns the criterion text, or `None` when the line is
/// not a bullet.
fn strip_bullet(line: &str) -> Option<String> {
    let trimmed = line.trim_start();

    if let Some(rest) = trimmed
        .strip_prefix('-')
        .or_else(|| trimmed.strip_prefix('*'))
        .or_else(|| trimmed.strip_prefix('•'))
    {
        let criterion = rest
            .trim_start_matches(['-', '*', '•', '.', ')', ' '])
            .trim();
        return (!criterion.is_empty()).then(|| criterion.to_string());
    }

    let mut chars = trimmed.chars();
    let first = chars.next()?;

    // Numeric enumerator: "1. criterion" / "12) criterion".
    if first.is_ascii_digit() {
        let head: String = trimmed.chars().take(5).collect();
        if head.contains('.') || head.contains(')') {
            let criterion = trimmed
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')' || c == ' ')
                .trim();
            return (!criterion.is_empty()).then(|| criterion.to_string());
        }
        return None;
    }

    // Letter enumerator: "a. criterion" / "b) criterion".
    if first.is_ascii_alphabetic()
        && matches!(chars.next(), Some('.') | Some(')'))
    {
        let criterion = trimmed[2..].trim();
        return (!criterion.is_empty()).then(|| criterion.to_string());
    }

    None
}

/// Parses raw eligibility text into inclusion and exclusion criterion lists.
///
/// Section headings (`Inclusion …`, `Exclusion …`) switch the active list;
/// bullet lines start a criterion; non-bullet lines inside a section are
/// joined onto the previous criterion. Bullets seen before any heading
/// default to inclusion.
pub(crate) fn parse_criteria_text(text: &str) -> (Vec<String>, Vec<String>) {
    let mut inclusion: Vec<String> = Vec::new();
    let mut exclusion: Vec<String> = Vec::new();
    let mut section = Section::None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let lower = line.to_lowercase();
        if lower.contains("inclusion") {
            section = Section::Inclusion;
            continue;
        }
        if lower.contains("exclusion") {
            section = Section::Exclusion;
            continue;
        }
        if lower.starts_with("criteria:") {
            continue;
        }

        if let Some(criterion) = strip_bullet(line) {
            match section {
                Section::Exclusion => exclusion.push(criterion),
                _ => inclusion.push(criterion),
            }
            continue;
        }

        // Continuation of the previous criterion within the active section.
        let target = match section {
            Section::Inclusion => Some(&mut inclusion),
            Section::Exclusion => Some(&mut exclusion),
            Section::None => None,
        };
        if let Some(list) = target
            && let Some(last) = list.last_mut()
        {
            last.push(' ');
            last.push_str(line);
        }
    }

    (inclusion, exclusion)
}
