//! Prompt templates for the eligibility reasoner.
//!
//! Every template that carries patient data takes a `SanitizedPatient`, so
//! the only way to put patient fields into an outbound message body is
//! through the sanitization choke point in `sources::cerebras`.

use crate::entities::trial::Trial;
use crate::reasoning::{Audience, MedicalReasoningResult};
use crate::sources::cerebras::SanitizedPatient;

pub(crate) const SYSTEM_PROMPT: &str = "\
You are a medical AI assistant specializing in clinical trial eligibility assessment. You provide evidence-based reasoning following these principles:

1. Patient Safety: Always prioritize patient safety in your assessments
2. Evidence-Based: Base decisions on medical evidence and established criteria
3. Clear Reasoning: Provide step-by-step reasoning with medical justification
4. Compliance: Maintain HIPAA compliance - never store or repeat patient identifiers
5. Accuracy: Be precise about medical contraindications and eligibility factors

Your responses should follow this structure:
1. ASSESSMENT: Review patient characteristics against trial criteria
2. ANALYSIS: Identify eligibility factors, contraindications, and risks
3. CONCLUSION: Provide clear eligibility determination with confidence level

Always explain your medical reasoning and cite relevant eligibility criteria.";

fn join_or_default(values: &[String], default: &str) -> String {
    if values.is_empty() {
        default.to_string()
    } else {
        values.join(", ")
    }
}

fn format_bullets(items: &[String]) -> String {
    if items.is_empty() {
        return "- Not specified".to_string();
    }
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Identifier-free one-line patient description: age, sex, conditions.
pub(crate) fn patient_summary(patient: &SanitizedPatient) -> String {
    let mut parts: Vec<String> = Vec::new();
    if let Some(age) = patient.age {
        parts.push(format!("{age}-year-old"));
    }
    if let Some(sex) = patient.sex.as_deref() {
        parts.push(sex.to_string());
    }
    if !patient.conditions.is_empty() {
        parts.push(format!("with {}", patient.conditions.join(", ")));
    }

    if parts.is_empty() {
        "Patient profile".to_string()
    } else {
        parts.join(" ")
    }
}

pub(crate) fn eligibility_prompt(patient: &SanitizedPatient, trial: &Trial) -> String {
    let criteria = &trial.eligibility_criteria;
    let age_requirements = match (criteria.age_requirements.min, criteria.age_requirements.max) {
        (Some(min), Some(max)) => format!("{min} to {max} years"),
        (Some(min), None) => format!("{min} years and older"),
        (None, Some(max)) => format!("up to {max} years"),
        (None, None) => "Not specified".to_string(),
    };

    let age = patient
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "Not specified".to_string());
    let sex = patient
        .sex
        .clone()
        .unwrap_or_else(|| "Not specified".to_string());
    let history = patient
        .medical_history
        .as_deref()
        .unwrap_or("None specified");

    format!(
        "PATIENT PROFILE (anonymized):\n\
         Age: {age}\n\
         Gender: {sex}\n\
         Primary Conditions: {conditions}\n\
         Current Medications: {medications}\n\
         Relevant Medical History: {history}\n\
         Allergies: {allergies}\n\n\
         CLINICAL TRIAL CRITERIA:\n\
         Trial ID: {trial_id}\n\
         Title: {trial_title}\n\
         Conditions: {trial_conditions}\n\
         Inclusion Criteria:\n{inclusion}\n\n\
         Exclusion Criteria:\n{exclusion}\n\n\
         Age Requirements: {age_requirements}\n\
         Gender Requirements: {gender_requirements}\n\n\
         TASK:\n\
         Assess patient eligibility for this clinical trial. Provide step-by-step medical reasoning including:\n\n\
         1. ASSESSMENT: Review each inclusion/exclusion criterion\n\
         2. ANALYSIS: Identify any contraindications or safety concerns\n\
         3. CONCLUSION: Final eligibility determination (Eligible/Ineligible/Requires Review) with confidence level\n\n\
         Format your response as structured reasoning with clear medical justification for each step.\n",
        conditions = join_or_default(&patient.conditions, "None specified"),
        medications = join_or_default(&patient.medications, "None specified"),
        allergies = join_or_default(&patient.allergies, "None specified"),
        trial_id = trial.nct_id,
        trial_title = trial.title,
        trial_conditions = join_or_default(&trial.conditions, "Not specified"),
        inclusion = format_bullets(&criteria.inclusion),
        exclusion = format_bullets(&criteria.exclusion),
        gender_requirements = criteria.gender_requirements.as_str(),
    )
}

pub(crate) fn contraindication_prompt(patient: &SanitizedPatient, trial: &Trial) -> String {
    format!(
        "PATIENT MEDICATIONS: {medications}\n\
         PATIENT CONDITIONS: {conditions}\n\
         PATIENT ALLERGIES: {allergies}\n\n\
         TRIAL INTERVENTION: {intervention}\n\
         TRIAL MEDICATIONS: {trial_medications}\n\n\
         TASK:\n\
         Analyze potential contraindications between the patient's current medical profile and the trial intervention. Consider:\n\n\
         1. Drug-Drug Interactions\n\
         2. Drug-Condition Interactions\n\
         3. Allergy Conflicts\n\
         4. Dosage Considerations\n\
         5. Monitoring Requirements\n\n\
         Provide evidence-based assessment with risk levels and recommendations.\n",
        medications = join_or_default(&patient.medications, "None"),
        conditions = join_or_default(&patient.conditions, "None"),
        allergies = join_or_default(&patient.allergies, "None"),
        intervention = trial.title,
        trial_medications = join_or_default(&trial.interventions, "None"),
    )
}

pub(crate) fn trial_matching_prompt(patient: &SanitizedPatient, trials: &[Trial]) -> String {
    let summaries: Vec<String> = trials
        .iter()
        .take(10)
        .enumerate()
        .map(|(i, trial)| {
            format!(
                "{n}. {nct}: {title}\n   Conditions: {conditions}\n   Phase: {phase}\n",
                n = i + 1,
                nct = trial.nct_id,
                title = trial.title,
                conditions = join_or_default(&trial.conditions, "Not specified"),
                phase = trial
                    .phase
                    .map(|p| p.display_label().to_string())
                    .unwrap_or_else(|| "Unknown".to_string()),
            )
        })
        .collect();

    format!(
        "PATIENT PROFILE (anonymized):\n\
         Age: {age}, Gender: {sex}\n\
         Conditions: {conditions}\n\n\
         AVAILABLE TRIALS (summary):\n{summaries}\n\
         TASK:\n\
         Rank and analyze trial compatibility for this patient. For each trial, provide:\n\n\
         1. Compatibility Score (0-100)\n\
         2. Key Matching Factors\n\
         3. Potential Concerns\n\
         4. Recommendation Priority\n\n\
         Focus on medical suitability and therapeutic alignment.\n",
        age = patient
            .age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "Not specified".to_string()),
        sex = patient
            .sex
            .clone()
            .unwrap_or_else(|| "Not specified".to_string()),
        conditions = join_or_default(&patient.conditions, "None specified"),
        summaries = summaries.join("\n"),
    )
}

pub(crate) fn explanation_prompt(result: &MedicalReasoningResult, audience: Audience) -> String {
    let style = match audience {
        Audience::Patient => "Use simple, non-technical language that a patient can understand",
        Audience::Physician => {
            "Use medical terminology appropriate for healthcare professionals"
        }
        Audience::Researcher => "Use scientific language appropriate for clinical researchers",
    };

    let steps = if result.reasoning_chain.is_empty() {
        "No detailed reasoning available".to_string()
    } else {
        result
            .reasoning_chain
            .iter()
            .map(|step| {
                format!(
                    "{}. {}: {}",
                    step.step_number, step.category, step.description
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Based on this medical reasoning analysis, provide a clear explanation for a {audience}:\n\n\
         Eligibility Status: {status}\n\
         Confidence: {confidence:.0}%\n\
         Conclusion: {conclusion}\n\n\
         Reasoning Steps:\n{steps}\n\n\
         Contraindications: {contraindications}\n\n\
         Instructions: {style}. Focus on the key factors that led to this determination.\n",
        audience = audience.as_str(),
        status = result.eligibility_status.as_str(),
        confidence = result.confidence_score * 100.0,
        conclusion = result.conclusion,
        contraindications = if result.contraindications.is_empty() {
            "None identified".to_string()
        } else {
            result.contraindications.join(", ")
        },
    )
}
