use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Eligible,
    Ineligible,
    PotentiallyEligible,
    RequiresReview,
    InsufficientData,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eligible => "eligible",
            Self::Ineligible => "ineligible",
            Self::PotentiallyEligible => "potentially_eligible",
            Self::RequiresReview => "requires_review",
            Self::InsufficientData => "insufficient_data",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepCategory {
    AgeCheck,
    GenderCheck,
    ConditionMatch,
    MedicationCompatibility,
    AllergyCheck,
    ExclusionCheck,
    InclusionCheck,
    LocationProximity,
    TrialStatusCheck,
    LabValuesCheck,
    SpecialPopulationsCheck,
}

impl StepCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AgeCheck => "age_check",
            Self::GenderCheck => "gender_check",
            Self::ConditionMatch => "condition_match",
            Self::MedicationCompatibility => "medication_compatibility",
            Self::AllergyCheck => "allergy_check",
            Self::ExclusionCheck => "exclusion_check",
            Self::InclusionCheck => "inclusion_check",
            Self::LocationProximity => "location_proximity",
            Self::TrialStatusCheck => "trial_status_check",
            Self::LabValuesCheck => "lab_values_check",
            Self::SpecialPopulationsCheck => "special_populations_check",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepResult {
    Pass,
    Fail,
    Partial,
    Unknown,
    RequiresReview,
}

/// One labeled step in a match's reasoning chain. Step numbers are 1-based
/// and contiguous within a chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningStep {
    pub step: u32,
    pub category: StepCategory,
    pub result: StepResult,
    pub details: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Patient-trial matching verdict with its full decision trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchResult {
    pub match_id: String,
    pub patient_id: String,
    pub trial_nct_id: String,
    pub overall_score: f64,
    pub confidence_score: f64,
    pub match_status: MatchStatus,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning_chain: Vec<ReasoningStep>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub next_steps: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub confidence_factors: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub audit_metadata: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub processing_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_model_version: Option<String>,
}

impl MatchResult {
    pub fn new(match_id: String, patient_id: String, trial_nct_id: String) -> Self {
        Self {
            match_id,
            patient_id,
            trial_nct_id,
            overall_score: 0.0,
            confidence_score: 0.0,
            match_status: MatchStatus::InsufficientData,
            reasoning_chain: Vec::new(),
            explanation: None,
            next_steps: Vec::new(),
            confidence_factors: BTreeMap::new(),
            audit_metadata: BTreeMap::new(),
            processing_time_ms: 0,
            ai_model_version: None,
        }
    }

    /// Appends a step with the next contiguous 1-based number.
    pub fn push_step(
        &mut self,
        category: StepCategory,
        result: StepResult,
        details: String,
        score: Option<f64>,
        weight: Option<f64>,
    ) {
        let step = self.reasoning_chain.len() as u32 + 1;
        self.reasoning_chain.push(ReasoningStep {
            step,
            category,
            result,
            details,
            score,
            weight,
        });
    }

    /// Weighted mean of step scores. Failed steps contribute 0 regardless of
    /// their declared score; an empty chain yields the neutral 0.5.
    pub fn overall_score_from_chain(&self) -> f64 {
        if self.reasoning_chain.is_empty() {
            return 0.5;
        }

        let mut weighted_total = 0.0;
        let mut total_weight = 0.0;
        for step in &self.reasoning_chain {
            let weight = step.weight.unwrap_or(1.0);
            let score = if step.result == StepResult::Fail {
                0.0
            } else {
                step.score.unwrap_or(0.5)
            };
            weighted_total += score * weight;
            total_weight += weight;
        }

        if total_weight == 0.0 {
            0.5
        } else {
            weighted_total / total_weight
        }
    }

    /// A failed exclusion or allergy check blocks eligibility.
    pub fn has_blocking_failure(&self) -> bool {
        self.reasoning_chain.iter().any(|step| {
            step.result == StepResult::Fail
                && matches!(
                    step.category,
                    StepCategory::ExclusionCheck | StepCategory::AllergyCheck
                )
        })
    }

    /// Applies the eligibility invariant: an `eligible` verdict whose chain
    /// carries a blocking failure is downgraded to `requires_review`.
    pub fn enforce_eligibility_invariant(&mut self) {
        if self.match_status == MatchStatus::Eligible && self.has_blocking_failure() {
            self.match_status = MatchStatus::RequiresReview;
        }
    }

    pub fn set_next_steps(&mut self, steps: Vec<String>) {
        self.next_steps = steps.into_iter().take(5).collect();
    }

    pub fn failed_steps(&self) -> impl Iterator<Item = &ReasoningStep> {
        self.reasoning_chain
            .iter()
            .filter(|s| s.result == StepResult::Fail)
    }
}
