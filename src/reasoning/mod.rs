//! LLM-backed eligibility reasoning over patient/trial pairs.
//!
//! Wraps the chat-completion client with prompt construction, response
//! parsing into a structured verdict, and a safe fallback: no failure in
//! this module ever escapes as an error, it degrades to a
//! requires-review result instead. Patient data enters prompt text only as
//! a `SanitizedPatient`, the allow-listed view produced by the
//! sanitization choke point in `sources::cerebras`.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::entities::match_result::MatchStatus;
use crate::entities::patient::PatientProfile;
use crate::entities::trial::Trial;
use crate::error::MedMatchError;
use crate::sources::cerebras::{CerebrasClient, ChatMessage, SanitizedPatient};

mod parse;
mod prompts;

const ASSESSMENT_TEMPERATURE: f64 = 0.1;
const EXPLANATION_TEMPERATURE: f64 = 0.2;
const ASSESSMENT_MAX_TOKENS: u32 = 1500;

pub(crate) const FALLBACK_CONTRAINDICATION: &str = "Assessment error - manual review needed";
pub(crate) const FALLBACK_RECOMMENDATION: &str =
    "Consult with medical professional for eligibility determination";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Patient,
    Physician,
    Researcher,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patient => "patient",
            Self::Physician => "physician",
            Self::Researcher => "researcher",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

#[derive(Debug, Clone, Serialize)]
pub struct Contraindication {
    pub kind: String,
    pub description: String,
    pub risk_level: RiskLevel,
    pub recommendation: String,
}

#[derive(Debug, Clone)]
pub struct TrialRanking {
    pub nct_id: String,
    pub compatibility_score: u32,
    pub reasoning: String,
    pub key_factors: Vec<String>,
    pub concerns: Vec<String>,
}

/// One labeled step of the model's reasoning, before mapping onto the
/// closed match-result category set.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmReasoningStep {
    pub step_number: u32,
    pub category: String,
    pub description: String,
    pub confidence: f64,
}

/// Structured outcome of one eligibility assessment.
#[derive(Debug, Clone)]
pub struct MedicalReasoningResult {
    pub conclusion: String,
    pub confidence_score: f64,
    pub reasoning_chain: Vec<LlmReasoningStep>,
    pub patient_summary: String,
    pub trial_summary: String,
    pub eligibility_status: MatchStatus,
    pub contraindications: Vec<String>,
    pub recommendations: Vec<String>,
    pub processing_time_ms: u64,
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl MedicalReasoningResult {
    /// True when this result is the error fallback rather than a parsed
    /// model verdict.
    pub fn is_fallback(&self) -> bool {
        self.metadata.contains_key("error")
    }
}

/// Bounded insertion-order cache for repeated patient/trial assessments.
struct AssessmentCache {
    capacity: usize,
    entries: HashMap<String, MedicalReasoningResult>,
    order: VecDeque<String>,
}

impl AssessmentCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, key: &str) -> Option<MedicalReasoningResult> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: String, value: MedicalReasoningResult) {
        if !self.entries.contains_key(&key) {
            self.order.push_back(key.clone());
        }
        self.entries.insert(key, value);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.entries.remove(&evicted);
            }
        }
    }
}

pub struct LlmReasoningService {
    client: CerebrasClient,
    cache: Option<Mutex<AssessmentCache>>,
}

impl LlmReasoningService {
    /// Caching is off by default to keep assessments fresh.
    pub fn new(client: CerebrasClient) -> Self {
        Self {
            client,
            cache: None,
        }
    }

    pub fn with_cache(client: CerebrasClient, capacity: usize) -> Self {
        Self {
            client,
            cache: Some(Mutex::new(AssessmentCache::new(capacity))),
        }
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    fn cache_key(&self, patient_summary: &str, nct_id: &str) -> String {
        let digest = md5::compute(
            format!("{patient_summary}|{nct_id}|{}", self.client.model()).as_bytes(),
        );
        format!("{digest:x}")
    }

    /// Assesses a patient's eligibility for one trial.
    ///
    /// The profile is reduced to its allow-listed, identifier-scrubbed view
    /// before any prompt text is built, so nothing outside the sanitization
    /// choke point reaches the wire.
    ///
    /// Never fails: any client or parse error yields the safe fallback
    /// (requires review, zero confidence, error carried in metadata).
    pub async fn assess_eligibility(
        &self,
        profile: &PatientProfile,
        trial: &Trial,
        include_detailed_reasoning: bool,
    ) -> MedicalReasoningResult {
        let started = Instant::now();
        let patient = SanitizedPatient::from_profile(profile);
        let patient_summary = prompts::patient_summary(&patient);

        let cache_key = self.cache_key(&patient_summary, &trial.nct_id);
        if let Some(cache) = &self.cache
            && let Some(hit) = cache.lock().await.get(&cache_key)
        {
            debug!(trial_id = %trial.nct_id, "assessment cache hit");
            return hit;
        }

        let result = match self
            .request_assessment(&patient, trial, include_detailed_reasoning, &patient_summary)
            .await
        {
            Ok(result) => result,
            Err(err) => {
                warn!(trial_id = %trial.nct_id, error = %err, "eligibility assessment failed");
                self.fallback_result(&patient_summary, trial, started, &err)
            }
        };

        if let Some(cache) = &self.cache {
            cache
                .lock()
                .await
                .insert(cache_key, result.clone());
        }
        result
    }

    async fn request_assessment(
        &self,
        patient: &SanitizedPatient,
        trial: &Trial,
        include_detailed_reasoning: bool,
        patient_summary: &str,
    ) -> Result<MedicalReasoningResult, MedMatchError> {
        let started = Instant::now();
        let messages = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::eligibility_prompt(patient, trial)),
        ];

        let completion = self
            .client
            .chat_completion(
                &messages,
                Some(ASSESSMENT_MAX_TOKENS),
                ASSESSMENT_TEMPERATURE,
                false,
            )
            .await?;

        let content = completion.content;
        let eligibility_status = parse::extract_eligibility_status(&content);
        let confidence_score = parse::extract_confidence_score(&content, eligibility_status);
        let reasoning_chain = if include_detailed_reasoning {
            parse::extract_reasoning_steps(&content)
        } else {
            Vec::new()
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "model".into(),
            serde_json::Value::String(completion.model.clone()),
        );
        metadata.insert(
            "response_length".into(),
            serde_json::Value::from(content.chars().count()),
        );
        metadata.insert(
            "total_tokens".into(),
            serde_json::Value::from(completion.usage.total_tokens),
        );
        if let Some(request_id) = completion.request_id {
            metadata.insert("request_id".into(), serde_json::Value::String(request_id));
        }

        Ok(MedicalReasoningResult {
            conclusion: parse::extract_conclusion(&content),
            confidence_score,
            reasoning_chain,
            patient_summary: patient_summary.to_string(),
            trial_summary: trial.title.clone(),
            eligibility_status,
            contraindications: parse::extract_contraindications(&content),
            recommendations: parse::extract_recommendations(&content),
            processing_time_ms: started.elapsed().as_millis() as u64,
            metadata,
        })
    }

    fn fallback_result(
        &self,
        patient_summary: &str,
        trial: &Trial,
        started: Instant,
        err: &MedMatchError,
    ) -> MedicalReasoningResult {
        let mut metadata = BTreeMap::new();
        metadata.insert(
            "error".into(),
            serde_json::Value::String(err.to_string()),
        );

        MedicalReasoningResult {
            conclusion: "Unable to complete automated assessment - requires manual review"
                .to_string(),
            confidence_score: 0.0,
            reasoning_chain: Vec::new(),
            patient_summary: patient_summary.to_string(),
            trial_summary: trial.title.clone(),
            eligibility_status: MatchStatus::RequiresReview,
            contraindications: vec![FALLBACK_CONTRAINDICATION.to_string()],
            recommendations: vec![FALLBACK_RECOMMENDATION.to_string()],
            processing_time_ms: started.elapsed().as_millis() as u64,
            metadata,
        }
    }

    /// Checks drug/condition/allergy conflicts between the patient and a
    /// trial's intervention.
    pub async fn check_contraindications(
        &self,
        profile: &PatientProfile,
        trial: &Trial,
    ) -> Vec<Contraindication> {
        let patient = SanitizedPatient::from_profile(profile);
        let messages = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::contraindication_prompt(&patient, trial)),
        ];

        match self
            .client
            .chat_completion(&messages, None, ASSESSMENT_TEMPERATURE, false)
            .await
        {
            Ok(completion) => completion
                .content
                .lines()
                .map(str::trim)
                .filter(|line| {
                    let lower = line.to_lowercase();
                    ["risk", "interaction", "contraindication"]
                        .iter()
                        .any(|k| lower.contains(k))
                })
                .map(|line| Contraindication {
                    kind: "potential_interaction".into(),
                    description: line.to_string(),
                    risk_level: RiskLevel::Medium,
                    recommendation: "Requires medical review".into(),
                })
                .collect(),
            Err(err) => {
                warn!(error = %err, "contraindication check failed");
                vec![Contraindication {
                    kind: "assessment_error".into(),
                    description: "Unable to complete contraindication check".into(),
                    risk_level: RiskLevel::Unknown,
                    recommendation: "Requires manual medical review".into(),
                }]
            }
        }
    }

    /// Ranks candidate trials by compatibility. Scores come from per-trial
    /// percent markers in the response when present, else fall back to
    /// input-order decay.
    pub async fn rank_trial_matches(
        &self,
        profile: &PatientProfile,
        trials: &[Trial],
        limit: usize,
    ) -> Vec<TrialRanking> {
        if trials.is_empty() || limit == 0 {
            return Vec::new();
        }

        let patient = SanitizedPatient::from_profile(profile);
        let messages = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::trial_matching_prompt(&patient, trials)),
        ];
        let content = match self
            .client
            .chat_completion(&messages, None, ASSESSMENT_TEMPERATURE, false)
            .await
        {
            Ok(completion) => completion.content,
            Err(err) => {
                warn!(error = %err, "trial ranking failed");
                return Vec::new();
            }
        };

        trials
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, trial)| {
                let scored_line = content
                    .lines()
                    .find(|line| line.contains(&trial.nct_id))
                    .map(str::to_string);
                let compatibility_score = scored_line
                    .as_deref()
                    .and_then(extract_percent)
                    .unwrap_or_else(|| 75u32.saturating_sub(i as u32 * 5));

                TrialRanking {
                    nct_id: trial.nct_id.clone(),
                    compatibility_score: compatibility_score.min(100),
                    reasoning: scored_line
                        .unwrap_or_else(|| format!("Based on medical analysis (rank {})", i + 1)),
                    key_factors: vec!["Medical suitability".into(), "Safety profile".into()],
                    concerns: if i < 3 {
                        Vec::new()
                    } else {
                        vec!["Lower compatibility".into()]
                    },
                }
            })
            .collect()
    }

    /// Renders the verdict for a target audience; a deterministic fallback
    /// string is returned when the model call fails.
    pub async fn generate_explanation(
        &self,
        result: &MedicalReasoningResult,
        audience: Audience,
    ) -> String {
        let messages = vec![
            ChatMessage::system(prompts::SYSTEM_PROMPT),
            ChatMessage::user(prompts::explanation_prompt(result, audience)),
        ];

        match self
            .client
            .chat_completion(&messages, None, EXPLANATION_TEMPERATURE, false)
            .await
        {
            Ok(completion) => completion.content.trim().to_string(),
            Err(err) => {
                warn!(error = %err, "explanation generation failed");
                fallback_explanation(result, audience)
            }
        }
    }
}

fn extract_percent(line: &str) -> Option<u32> {
    static PERCENT: std::sync::LazyLock<regex::Regex> = std::sync::LazyLock::new(|| {
        regex::Regex::new(r"(\d{1,3})\s*(?:%|/\s*100)").expect("static pattern")
    });
    PERCENT
        .captures(line)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub(crate) fn fallback_explanation(
    result: &MedicalReasoningResult,
    audience: Audience,
) -> String {
    let status_text = match result.eligibility_status {
        MatchStatus::Eligible => "appears to meet the trial criteria",
        MatchStatus::Ineligible => "does not meet some key trial criteria",
        _ => "requires further medical review",
    };

    match audience {
        Audience::Patient => format!(
            "Based on the medical analysis, your profile {status_text}. Please consult with \
             your healthcare provider to discuss this clinical trial opportunity in detail."
        ),
        _ => format!(
            "Patient {status_text} based on automated eligibility assessment. Manual review \
             recommended for final determination."
        ),
    }
}
