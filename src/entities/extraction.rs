use serde::{Deserialize, Serialize};

use crate::entities::patient::Sex;
use crate::entities::trial::{AgeRange, GenderRequirement};

/// Demographics picked out of free text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedDemographics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<Sex>,
    /// Population markers such as pregnancy, postmenopausal, pediatric.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other_markers: Vec<String>,
}

/// Output of the medical entity extractor.
///
/// Condition lists preserve compound multi-word terms atomically; a
/// single-word term that is a substring of a recorded compound is never
/// duplicated alongside it. All lists are deduplicated in first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded_conditions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub medications: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub procedures: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lab_values: Vec<String>,
    #[serde(default)]
    pub demographics: ExtractedDemographics,
    #[serde(default)]
    pub age_requirements: AgeRange,
    #[serde(default)]
    pub gender_requirements: GenderRequirement,
}

impl ExtractedEntities {
    pub fn total_entities(&self) -> usize {
        self.conditions.len()
            + self.excluded_conditions.len()
            + self.medications.len()
            + self.procedures.len()
            + self.lab_values.len()
            + self.demographics.other_markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_entities() == 0
            && self.demographics.age.is_none()
            && self.demographics.sex.is_none()
            && self.age_requirements.is_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_entities_counts_every_list() {
        let entities = ExtractedEntities {
            conditions: vec!["breast cancer".into()],
            excluded_conditions: vec!["pregnancy".into()],
            medications: vec!["metformin".into(), "insulin".into()],
            lab_values: vec!["hba1c".into()],
            ..Default::default()
        };
        assert_eq!(entities.total_entities(), 5);
        assert!(!entities.is_empty());
    }

    #[test]
    fn default_extraction_is_empty() {
        assert!(ExtractedEntities::default().is_empty());
    }
}
