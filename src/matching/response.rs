//! Response payloads handed to the consuming HTTP layer.

use serde::Serialize;

use crate::entities::extraction::ExtractedEntities;
use crate::entities::match_result::{MatchResult, StepResult};
use crate::entities::patient::PatientProfile;
use crate::entities::trial::Trial;
use crate::reasoning::MedicalReasoningResult;

pub const NO_MATCHES_MESSAGE: &str = "No matching clinical trials found for the given criteria.";

#[derive(Debug, Clone, Serialize)]
pub struct MatchLocation {
    pub facility: String,
    pub city: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactInfo {
    pub name: String,
    pub phone: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReasoningPayload {
    pub chain_of_thought: Vec<String>,
    pub medical_analysis: String,
    pub eligibility_assessment: String,
    pub contraindication_check: String,
    pub confidence_factors: Vec<String>,
    pub excluded_factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialMatch {
    pub id: String,
    #[serde(rename = "nctId")]
    pub nct_id: String,
    pub title: String,
    /// Rounded percentage of the confidence score, in [0, 100].
    #[serde(rename = "matchScore")]
    pub match_score: u32,
    pub confidence_score: f64,
    pub location: MatchLocation,
    pub explanation: String,
    pub contact: ContactInfo,
    pub eligibility: Vec<String>,
    pub phase: String,
    pub status: String,
    pub conditions: Vec<String>,
    pub reasoning: ReasoningPayload,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct EntitySummary {
    pub conditions: Vec<String>,
    pub stage: String,
    pub biomarkers: Vec<String>,
    pub location: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessingMetadata {
    pub data_source: String,
    pub reasoning_enabled: bool,
    pub model_used: String,
    pub inference_time_ms: u64,
    pub real_trials: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates_evaluated: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_failures: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LlmFeatures {
    pub model_version: String,
    pub reasoning_depth: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchResponse {
    pub request_id: String,
    pub patient_id: String,
    pub matches: Vec<TrialMatch>,
    pub total: usize,
    pub processing_time_ms: u64,
    /// RFC 3339 UTC with a `Z` suffix.
    pub timestamp: String,
    pub extracted_entities: EntitySummary,
    pub processing_metadata: ProcessingMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_features: Option<LlmFeatures>,
    /// Present only when `matches` is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

const STAGE_MARKERS: [&str; 7] = [
    "stage 4",
    "stage iv",
    "stage 3",
    "stage iii",
    "stage 2",
    "stage 1",
    "metastatic",
];

pub(crate) const BIOMARKER_TERMS: [&str; 7] =
    ["pd-l1", "pd-1", "brca1", "brca2", "her2", "egfr", "kras"];

/// Condenses extracted entities into the response's summary block.
pub(crate) fn entity_summary(
    entities: &ExtractedEntities,
    profile: &PatientProfile,
) -> EntitySummary {
    // Stage markers can live in the condition list or only in the original
    // narrative, so both are scanned.
    let stage_text = format!(
        "{} {}",
        profile.condition_text(),
        profile.raw.narrative().unwrap_or_default().to_lowercase()
    );
    let stage = STAGE_MARKERS
        .iter()
        .find(|marker| stage_text.contains(*marker))
        .map(|marker| (*marker).to_string())
        .unwrap_or_default();

    let mut biomarkers: Vec<String> = entities
        .lab_values
        .iter()
        .filter(|value| BIOMARKER_TERMS.contains(&value.to_lowercase().as_str()))
        .cloned()
        .collect();
    for name in &profile.biomarkers {
        if !biomarkers.iter().any(|b| b.eq_ignore_ascii_case(name)) {
            biomarkers.push(name.clone());
        }
    }

    let location = profile
        .raw
        .location
        .as_ref()
        .map(|loc| {
            [loc.city.as_deref(), loc.state.as_deref(), loc.country.as_deref()]
                .into_iter()
                .flatten()
                .collect::<Vec<_>>()
                .join(", ")
        })
        .unwrap_or_default();

    EntitySummary {
        conditions: entities.conditions.clone(),
        stage,
        biomarkers,
        location,
    }
}

/// Readable eligibility bullet list for one outbound match.
pub(crate) fn format_eligibility_lines(trial: &Trial) -> Vec<String> {
    let mut lines = Vec::new();
    let criteria = &trial.eligibility_criteria;

    match (criteria.age_requirements.min, criteria.age_requirements.max) {
        (Some(min), Some(max)) => lines.push(format!("Age {min}-{max} years")),
        (Some(min), None) => lines.push(format!("Age {min} years and older")),
        (None, Some(max)) => lines.push(format!("Age up to {max} years")),
        (None, None) => {}
    }

    if criteria.gender_requirements != crate::entities::trial::GenderRequirement::All {
        lines.push(format!("Gender: {}", criteria.gender_requirements.as_str()));
    }

    if let Some(condition) = trial.conditions.first() {
        lines.push(format!("Diagnosis: {condition}"));
    }

    match trial.status {
        crate::entities::trial::TrialStatus::Recruiting => {
            lines.push("Currently recruiting participants".to_string());
        }
        crate::entities::trial::TrialStatus::Terminated => {
            lines.push("Study terminated".to_string());
        }
        crate::entities::trial::TrialStatus::Completed => {
            lines.push("Study completed".to_string());
        }
        _ => {}
    }

    lines.push("Informed consent required".to_string());
    lines
}

fn primary_location(trial: &Trial) -> MatchLocation {
    match trial.locations.first() {
        Some(location) => MatchLocation {
            facility: location.facility.clone(),
            city: location.city.clone(),
            state: location
                .state
                .clone()
                .unwrap_or_else(|| "See ClinicalTrials.gov".to_string()),
            country: Some(location.country.clone()),
            distance: None,
        },
        None => MatchLocation {
            facility: "Study Location".to_string(),
            city: "Not specified".to_string(),
            state: "See ClinicalTrials.gov".to_string(),
            country: None,
            distance: None,
        },
    }
}

fn contact_info(trial: &Trial) -> ContactInfo {
    let contact = trial.locations.iter().find_map(|loc| loc.contact.as_ref());
    ContactInfo {
        name: contact
            .and_then(|c| c.name.clone())
            .unwrap_or_else(|| "See study details".to_string()),
        phone: contact
            .and_then(|c| c.phone.clone())
            .unwrap_or_else(|| "Contact via ClinicalTrials.gov".to_string()),
        email: contact
            .and_then(|c| c.email.clone())
            .unwrap_or_else(|| trial.registry_url()),
    }
}

/// Shapes one scored candidate into the outbound match payload.
pub(crate) fn trial_match(
    result: &MatchResult,
    reasoning: &MedicalReasoningResult,
    trial: &Trial,
) -> TrialMatch {
    let chain_of_thought: Vec<String> = result
        .reasoning_chain
        .iter()
        .map(|step| step.details.clone())
        .collect();
    let section = |category: &str| {
        reasoning
            .reasoning_chain
            .iter()
            .find(|step| step.category == category)
            .map(|step| step.description.clone())
            .unwrap_or_default()
    };
    let confidence_factors: Vec<String> = result
        .confidence_factors
        .iter()
        .map(|(factor, value)| format!("{factor}: {value:.2}"))
        .collect();
    let excluded_factors: Vec<String> = result
        .reasoning_chain
        .iter()
        .filter(|step| step.result == StepResult::Fail)
        .map(|step| step.details.clone())
        .collect();

    TrialMatch {
        id: result.match_id.clone(),
        nct_id: trial.nct_id.clone(),
        title: trial.title.clone(),
        match_score: (result.confidence_score * 100.0).round().clamp(0.0, 100.0) as u32,
        confidence_score: result.confidence_score,
        location: primary_location(trial),
        explanation: result
            .explanation
            .clone()
            .unwrap_or_else(|| reasoning.conclusion.clone()),
        contact: contact_info(trial),
        eligibility: format_eligibility_lines(trial),
        phase: trial
            .phase
            .map(|p| p.display_label().to_string())
            .unwrap_or_else(|| "Not specified".to_string()),
        status: trial.status.as_str().to_string(),
        conditions: trial.conditions.clone(),
        reasoning: ReasoningPayload {
            chain_of_thought,
            medical_analysis: section("analysis"),
            eligibility_assessment: section("assessment"),
            contraindication_check: reasoning.contraindications.join("; "),
            confidence_factors,
            excluded_factors,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::match_result::{MatchStatus, StepCategory};
    use crate::entities::patient::{PatientInput, PatientLocation};
    use crate::entities::trial::{
        AgeRange, EligibilityCriteria, GenderRequirement, Phase, TrialContact, TrialLocation,
        TrialStatus,
    };
    use std::collections::BTreeMap;

    fn trial() -> Trial {
        Trial {
            nct_id: "NCT01234567".into(),
            title: "Targeted Therapy Study".into(),
            brief_summary: "Summary".into(),
            detailed_description: None,
            primary_purpose: None,
            phase: Some(Phase::Phase2),
            status: TrialStatus::Recruiting,
            enrollment: None,
            study_type: None,
            conditions: vec!["Breast Cancer".into()],
            interventions: Vec::new(),
            eligibility_criteria: EligibilityCriteria {
                age_requirements: AgeRange::new(Some(18), Some(75)),
                gender_requirements: GenderRequirement::Female,
                ..Default::default()
            },
            locations: vec![TrialLocation {
                facility: "Dana-Farber Cancer Institute".into(),
                city: "Boston".into(),
                state: Some("Massachusetts".into()),
                country: "United States".into(),
                status: Some("RECRUITING".into()),
                contact: Some(TrialContact {
                    name: Some("Study Team".into()),
                    phone: Some("617-555-0100".into()),
                    email: None,
                }),
            }],
            primary_outcomes: Vec::new(),
            sponsor: None,
            start_date: None,
            completion_date: None,
        }
    }

    fn reasoning_result() -> MedicalReasoningResult {
        MedicalReasoningResult {
            conclusion: "CONCLUSION: eligible".into(),
            confidence_score: 0.87,
            reasoning_chain: vec![
                crate::reasoning::LlmReasoningStep {
                    step_number: 1,
                    category: "assessment".into(),
                    description: "assessment text".into(),
                    confidence: 0.7,
                },
                crate::reasoning::LlmReasoningStep {
                    step_number: 2,
                    category: "analysis".into(),
                    description: "analysis text".into(),
                    confidence: 0.7,
                },
            ],
            patient_summary: "58-year-old female".into(),
            trial_summary: "Targeted Therapy Study".into(),
            eligibility_status: MatchStatus::Eligible,
            contraindications: vec!["Possible drug interaction risk".into()],
            recommendations: Vec::new(),
            processing_time_ms: 42,
            metadata: BTreeMap::new(),
        }
    }

    fn match_result() -> MatchResult {
        let mut result = MatchResult::new(
            "match_NCT01234567_1".into(),
            "anonymous".into(),
            "NCT01234567".into(),
        );
        result.confidence_score = 0.87;
        result.overall_score = 0.87;
        result.match_status = MatchStatus::Eligible;
        result.push_step(
            StepCategory::InclusionCheck,
            StepResult::Pass,
            "meets inclusion".into(),
            Some(0.9),
            None,
        );
        result.push_step(
            StepCategory::ExclusionCheck,
            StepResult::Fail,
            "prior therapy conflict".into(),
            Some(0.0),
            None,
        );
        result
    }

    #[test]
    fn trial_match_shapes_frontend_payload() {
        let shaped = trial_match(&match_result(), &reasoning_result(), &trial());

        assert_eq!(shaped.nct_id, "NCT01234567");
        assert_eq!(shaped.match_score, 87);
        assert_eq!(shaped.location.facility, "Dana-Farber Cancer Institute");
        assert_eq!(shaped.contact.name, "Study Team");
        assert_eq!(shaped.phase, "Phase 2");
        assert_eq!(shaped.status, "recruiting");
        assert_eq!(shaped.reasoning.chain_of_thought.len(), 2);
        assert_eq!(shaped.reasoning.medical_analysis, "analysis text");
        assert_eq!(shaped.reasoning.eligibility_assessment, "assessment text");
        assert_eq!(
            shaped.reasoning.excluded_factors,
            vec!["prior therapy conflict"]
        );
        assert!(shaped.eligibility.iter().any(|l| l == "Age 18-75 years"));
        assert!(shaped.eligibility.iter().any(|l| l == "Gender: female"));
        assert!(
            shaped
                .eligibility
                .iter()
                .any(|l| l == "Currently recruiting participants")
        );
        assert!(shaped.eligibility.iter().any(|l| l == "Informed consent required"));
    }

    #[test]
    fn trial_match_serializes_camel_case_keys() {
        let shaped = trial_match(&match_result(), &reasoning_result(), &trial());
        let json = serde_json::to_value(&shaped).expect("serializable");
        assert!(json.get("nctId").is_some());
        assert!(json.get("matchScore").is_some());
        assert!(json.get("nct_id").is_none());
        assert_eq!(json["matchScore"], 87);
    }

    #[test]
    fn match_score_spans_full_range_without_clamp_at_99() {
        let mut result = match_result();
        result.confidence_score = 1.0;
        let shaped = trial_match(&result, &reasoning_result(), &trial());
        assert_eq!(shaped.match_score, 100);

        result.confidence_score = 0.0;
        let shaped = trial_match(&result, &reasoning_result(), &trial());
        assert_eq!(shaped.match_score, 0);
    }

    #[test]
    fn entity_summary_collects_stage_biomarkers_and_location() {
        let entities = ExtractedEntities {
            conditions: vec!["stage 4 breast cancer".into()],
            lab_values: vec!["her2".into(), "glucose".into()],
            ..Default::default()
        };
        let profile = PatientProfile {
            raw: PatientInput {
                location: Some(PatientLocation {
                    city: Some("Boston".into()),
                    state: Some("MA".into()),
                    country: None,
                }),
                ..Default::default()
            },
            primary_conditions: vec!["stage 4 breast cancer".into()],
            biomarkers: vec!["PD-L1".into()],
            ..Default::default()
        };

        let summary = entity_summary(&entities, &profile);
        assert_eq!(summary.stage, "stage 4");
        assert!(summary.biomarkers.iter().any(|b| b == "her2"));
        assert!(summary.biomarkers.iter().any(|b| b == "PD-L1"));
        assert!(!summary.biomarkers.iter().any(|b| b == "glucose"));
        assert_eq!(summary.location, "Boston, MA");
    }

    #[test]
    fn missing_location_and_contact_fall_back_to_registry_pointers() {
        let mut bare = trial();
        bare.locations.clear();
        let shaped = trial_match(&match_result(), &reasoning_result(), &bare);
        assert_eq!(shaped.location.facility, "Study Location");
        assert_eq!(shaped.contact.phone, "Contact via ClinicalTrials.gov");
        assert!(shaped.contact.email.contains("clinicaltrials.gov/study/NCT01234567"));
    }
}
