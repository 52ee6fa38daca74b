use serde::{Deserialize, Serialize};

use crate::entities::extraction::ExtractedEntities;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Recruiting,
    NotYetRecruiting,
    ActiveNotRecruiting,
    Completed,
    Suspended,
    Terminated,
    Withdrawn,
    EnrollingByInvitation,
    Available,
    NoLongerAvailable,
    Unknown,
}

impl TrialStatus {
    /// Parses registry status values (`RECRUITING`, `Active, not recruiting`,
    /// `not_yet_recruiting`, …) into the canonical enum.
    pub fn from_registry(raw: &str) -> Self {
        let norm: String = raw
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_lowercase()
                } else {
                    '_'
                }
            })
            .collect();
        let norm = norm.trim_matches('_');
        match norm {
            "recruiting" => Self::Recruiting,
            "not_yet_recruiting" => Self::NotYetRecruiting,
            "active_not_recruiting" | "active__not_recruiting" => Self::ActiveNotRecruiting,
            "completed" => Self::Completed,
            "suspended" => Self::Suspended,
            "terminated" => Self::Terminated,
            "withdrawn" => Self::Withdrawn,
            "enrolling_by_invitation" => Self::EnrollingByInvitation,
            "available" => Self::Available,
            "no_longer_available" => Self::NoLongerAvailable,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recruiting => "recruiting",
            Self::NotYetRecruiting => "not_yet_recruiting",
            Self::ActiveNotRecruiting => "active_not_recruiting",
            Self::Completed => "completed",
            Self::Suspended => "suspended",
            Self::Terminated => "terminated",
            Self::Withdrawn => "withdrawn",
            Self::EnrollingByInvitation => "enrolling_by_invitation",
            Self::Available => "available",
            Self::NoLongerAvailable => "no_longer_available",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(
            self,
            Self::Recruiting | Self::NotYetRecruiting | Self::ActiveNotRecruiting
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StudyType {
    Interventional,
    Observational,
    ExpandedAccess,
}

impl StudyType {
    pub fn from_registry(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "interventional" => Some(Self::Interventional),
            "observational" => Some(Self::Observational),
            "expanded_access" | "expanded access" => Some(Self::ExpandedAccess),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Phase1,
    Phase2,
    Phase3,
    Phase4,
    NotApplicable,
}

impl Phase {
    pub fn from_registry(raw: &str) -> Option<Self> {
        let norm = raw
            .trim()
            .to_ascii_lowercase()
            .replace([' ', '-', '_'], "");
        match norm.as_str() {
            "phase1" | "earlyphase1" => Some(Self::Phase1),
            "phase2" | "phase1phase2" => Some(Self::Phase2),
            "phase3" | "phase2phase3" => Some(Self::Phase3),
            "phase4" => Some(Self::Phase4),
            "na" | "notapplicable" => Some(Self::NotApplicable),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Phase1 => "phase-1",
            Self::Phase2 => "phase-2",
            Self::Phase3 => "phase-3",
            Self::Phase4 => "phase-4",
            Self::NotApplicable => "not_applicable",
        }
    }

    pub fn display_label(&self) -> &'static str {
        match self {
            Self::Phase1 => "Phase 1",
            Self::Phase2 => "Phase 2",
            Self::Phase3 => "Phase 3",
            Self::Phase4 => "Phase 4",
            Self::NotApplicable => "N/A",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenderRequirement {
    #[default]
    All,
    Male,
    Female,
    Other,
    PreferNotToSay,
}

impl GenderRequirement {
    pub fn from_registry(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" => Self::Male,
            "female" => Self::Female,
            "other" => Self::Other,
            "prefer_not_to_say" => Self::PreferNotToSay,
            _ => Self::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::PreferNotToSay => "prefer_not_to_say",
        }
    }
}

/// Inclusive age bounds in integer years; an absent bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<u32>,
}

impl AgeRange {
    pub fn new(min: Option<u32>, max: Option<u32>) -> Self {
        Self { min, max }
    }

    pub fn is_open(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }

    /// Overlap rule with open bounds: a requested range retains this range
    /// iff `(min == None ∨ min ≤ requested.max) ∧ (max == None ∨ max ≥
    /// requested.min)`.
    pub fn overlaps(&self, requested: &AgeRange) -> bool {
        let min_ok = match (self.min, requested.max) {
            (Some(trial_min), Some(patient_max)) => trial_min <= patient_max,
            _ => true,
        };
        let max_ok = match (self.max, requested.min) {
            (Some(trial_max), Some(patient_min)) => trial_max >= patient_min,
            _ => true,
        };
        min_ok && max_ok
    }

    pub fn contains(&self, age: u32) -> bool {
        self.overlaps(&AgeRange::new(Some(age), Some(age)))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrialContact {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialLocation {
    pub facility: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<TrialContact>,
}

/// Structured eligibility rules attached to a trial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EligibilityCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inclusion: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclusion: Vec<String>,
    #[serde(default)]
    pub age_requirements: AgeRange,
    #[serde(default)]
    pub gender_requirements: GenderRequirement,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_entities: Option<ExtractedEntities>,
    /// Parser difficulty estimate in [0, 1], derived from the raw text.
    #[serde(default)]
    pub complexity_score: f64,
}

impl EligibilityCriteria {
    /// Both bounds, when present, must be consistently ordered.
    pub fn is_consistent(&self) -> bool {
        match (self.age_requirements.min, self.age_requirements.max) {
            (Some(min), Some(max)) => min <= max,
            _ => true,
        }
    }
}

/// Normalized clinical trial record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trial {
    pub nct_id: String,
    pub title: String,
    #[serde(default)]
    pub brief_summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detailed_description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_purpose: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<Phase>,
    pub status: TrialStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enrollment: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub study_type: Option<StudyType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interventions: Vec<String>,
    #[serde(default)]
    pub eligibility_criteria: EligibilityCriteria,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<TrialLocation>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_outcomes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sponsor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_date: Option<String>,
}

impl Trial {
    /// Flat text rendition of the fields relevant for retrieval scoring.
    pub fn search_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        parts.push(self.title.as_str());
        parts.push(self.brief_summary.as_str());
        for condition in &self.conditions {
            parts.push(condition.as_str());
        }
        for intervention in &self.interventions {
            parts.push(intervention.as_str());
        }
        if let Some(purpose) = self.primary_purpose.as_deref() {
            parts.push(purpose);
        }
        if let Some(phase) = self.phase {
            parts.push(phase.display_label());
        }
        for line in &self.eligibility_criteria.inclusion {
            parts.push(line.as_str());
        }
        for line in &self.eligibility_criteria.exclusion {
            parts.push(line.as_str());
        }
        parts
            .into_iter()
            .filter(|p| !p.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn registry_url(&self) -> String {
        format!("https://clinicaltrials.gov/study/{}", self.nct_id)
    }
}
