use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::MedMatchError;

pub use crate::utils::serde::TextOrStructured;

pub const MAX_NARRATIVE_CHARS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
    Other,
    Unknown,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
            Self::Other => "other",
            Self::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientLocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Demographics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<Sex>,
}

impl Demographics {
    fn is_empty(&self) -> bool {
        self.age.is_none() && self.sex.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredHistory {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary_diagnoses: Vec<String>,
}

/// Patient submission: either structured fields, a free-text clinical
/// narrative, or both. Request-scoped; never persisted by the core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatientInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<Sex>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    #[serde(
        default,
        alias = "medications",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub current_medications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allergies: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub biomarkers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lab_results: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_history: Option<TextOrStructured<StructuredHistory>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub demographics: Option<Demographics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<PatientLocation>,
    /// Natural-language search query from patient-facing tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub medical_query: Option<String>,
    /// Free-text clinical narrative from professional tools.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clinical_notes: Option<String>,
}

impl PatientInput {
    /// Resolved age: top-level field wins over the demographics block.
    pub fn resolved_age(&self) -> Option<u32> {
        self.age
            .or_else(|| self.demographics.as_ref().and_then(|d| d.age))
    }

    pub fn resolved_sex(&self) -> Option<Sex> {
        self.sex
            .or_else(|| self.demographics.as_ref().and_then(|d| d.sex))
    }

    /// At least one of medical_query, clinical_notes, medical_history,
    /// demographics, or current_medications must be present; narrative
    /// fields are bounded; age must be plausible.
    pub fn validate(&self) -> Result<(), MedMatchError> {
        let has_query = self
            .medical_query
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty());
        let has_notes = self
            .clinical_notes
            .as_deref()
            .is_some_and(|v| !v.trim().is_empty());
        let has_history = match &self.medical_history {
            Some(TextOrStructured::Text(text)) => !text.trim().is_empty(),
            Some(TextOrStructured::Structured(history)) => {
                history.primary_diagnosis.is_some() || !history.secondary_diagnoses.is_empty()
            }
            None => false,
        };
        let has_demographics = self.demographics.as_ref().is_some_and(|d| !d.is_empty());
        let has_medications = !self.current_medications.is_empty();

        if !(has_query || has_notes || has_history || has_demographics || has_medications) {
            return Err(MedMatchError::InvalidArgument(
                "Patient data must contain at least one of: medical_query, clinical_notes, \
                 medical_history, demographics, current_medications"
                    .into(),
            ));
        }

        for (field, value) in [
            ("medical_query", self.medical_query.as_deref()),
            ("clinical_notes", self.clinical_notes.as_deref()),
            (
                "medical_history",
                self.medical_history.as_ref().and_then(|h| h.as_text()),
            ),
        ] {
            if let Some(text) = value
                && text.chars().count() > MAX_NARRATIVE_CHARS
            {
                return Err(MedMatchError::InvalidArgument(format!(
                    "{field} exceeds the {MAX_NARRATIVE_CHARS}-character limit"
                )));
            }
        }

        if let Some(age) = self.resolved_age()
            && age > 120
        {
            return Err(MedMatchError::InvalidArgument(
                "Age must be between 0 and 120".into(),
            ));
        }

        Ok(())
    }

    /// The free-text narrative to run entity extraction on, if any.
    /// `medical_query` wins over `clinical_notes`.
    pub fn narrative(&self) -> Option<&str> {
        self.medical_query
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                self.clinical_notes
                    .as_deref()
                    .filter(|v| !v.trim().is_empty())
            })
    }
}

/// Request-scoped view of a patient after normalization and entity
/// extraction, handed from the orchestrator to the reasoning service.
#[derive(Debug, Clone, Default)]
pub struct PatientProfile {
    pub raw: PatientInput,
    pub entities: crate::entities::extraction::ExtractedEntities,
    pub primary_conditions: Vec<String>,
    pub biomarkers: Vec<String>,
    pub medications: Vec<String>,
    pub age: Option<u32>,
    pub sex: Option<Sex>,
}

impl PatientProfile {
    /// Indicates advanced-stage disease anywhere in the patient's condition
    /// text.
    pub fn has_advanced_stage(&self) -> bool {
        let text = self.condition_text();
        ["stage 4", "stage iv", "metastatic", "advanced"]
            .iter()
            .any(|marker| text.contains(marker))
    }

    pub fn condition_text(&self) -> String {
        self.primary_conditions.join(" ").to_lowercase()
    }
}
