//! Matching orchestrator: normalize → extract → retrieve → filter →
//! score → rank → shape.
//!
//! Downstream failures never escape to the caller: retrieval falls through
//! to the alternate source, failed candidate assessments are skipped and
//! counted, and an empty candidate set produces an explanatory response
//! rather than an error.

use std::sync::Arc;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::entities::match_result::{MatchResult, StepCategory, StepResult};
use crate::entities::patient::{PatientInput, PatientProfile};
use crate::entities::trial::Trial;
use crate::error::MedMatchError;
use crate::reasoning::{LlmReasoningService, LlmReasoningStep, MedicalReasoningResult};
use crate::search::{SearchEngine, SearchQuery};
use crate::sources::cerebras::CerebrasClient;
use crate::sources::registry::{RegistryClient, RegistrySearchParams};
use crate::utils::time::{unix_millis, utc_timestamp};

mod relevance;
pub mod response;

pub use response::{MatchResponse, TrialMatch};

const SCORING_CONCURRENCY: usize = 5;
const CANDIDATE_MULTIPLIER: usize = 3;

/// Where candidate trials come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalStrategy {
    /// The in-memory hybrid index, with the live registry as fallback.
    IndexedCorpus,
    /// The live registry, with the in-memory index as fallback.
    LiveRegistry,
}

#[derive(Debug, Clone)]
pub struct MatchRequest {
    pub patient: PatientInput,
    pub max_results: usize,
    pub min_confidence: f64,
    pub enable_advanced_reasoning: bool,
}

impl MatchRequest {
    pub fn new(patient: PatientInput) -> Self {
        Self {
            patient,
            max_results: 3,
            min_confidence: 0.5,
            enable_advanced_reasoning: true,
        }
    }
}

struct Retrieved {
    trials: Vec<Trial>,
    data_source: &'static str,
    fallback_reason: Option<String>,
}

pub struct MatchingService {
    search: Arc<SearchEngine>,
    llm: LlmReasoningService,
    registry: RegistryClient,
    strategy: RetrievalStrategy,
    hipaa_safe_logging: bool,
}

impl MatchingService {
    pub fn new(
        settings: &Settings,
        search: Arc<SearchEngine>,
        strategy: RetrievalStrategy,
    ) -> Result<Self, MedMatchError> {
        Ok(Self {
            search,
            llm: LlmReasoningService::new(CerebrasClient::new(settings)?),
            registry: RegistryClient::new()?,
            strategy,
            hipaa_safe_logging: settings.hipaa_safe_logging,
        })
    }

    pub fn from_parts(
        search: Arc<SearchEngine>,
        llm: LlmReasoningService,
        registry: RegistryClient,
        strategy: RetrievalStrategy,
    ) -> Self {
        Self {
            search,
            llm,
            registry,
            strategy,
            hipaa_safe_logging: true,
        }
    }

    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    /// Runs the full matching pipeline for one patient.
    ///
    /// Fails only on invalid input; every downstream problem degrades into
    /// the response's metadata.
    pub async fn match_trials(
        &self,
        request: &MatchRequest,
    ) -> Result<MatchResponse, MedMatchError> {
        let started = std::time::Instant::now();
        request.patient.validate()?;

        let max_results = request.max_results.clamp(1, 10);
        let min_confidence = request.min_confidence.clamp(0.0, 1.0);
        let request_id = format!("match_{}", unix_millis());
        let patient_id = request
            .patient
            .patient_id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| "anonymous".to_string());

        info!(request_id = %request_id, "starting trial matching");

        let profile = build_profile(&request.patient);
        let query = build_candidate_query(&profile);
        let loggable_query = if self.hipaa_safe_logging {
            crate::utils::validation::redact_identifiers(&query)
        } else {
            query.clone()
        };
        debug!(request_id = %request_id, query = %loggable_query, "candidate query built");

        let retrieved = self
            .retrieve_candidates(&profile, &query, max_results * CANDIDATE_MULTIPLIER)
            .await;

        let candidates = relevance::filter_relevant(retrieved.trials, &profile, max_results);
        if candidates.is_empty() {
            info!(request_id = %request_id, "no candidate trials after retrieval and relevance filtering");
            return Ok(self.empty_response(
                request_id,
                patient_id,
                &profile,
                started,
                "none",
                retrieved
                    .fallback_reason
                    .or_else(|| Some("no candidate trials found".to_string())),
                request.enable_advanced_reasoning,
            ));
        }

        // Bounded, order-preserving fan-out over the remaining candidates.
        let assessments: Vec<MedicalReasoningResult> = futures::stream::iter(
            candidates.iter().map(|trial| {
                self.llm
                    .assess_eligibility(&profile, trial, request.enable_advanced_reasoning)
            }),
        )
        .buffered(SCORING_CONCURRENCY)
        .collect()
        .await;

        let llm_failures = assessments.iter().filter(|a| a.is_fallback()).count();
        if llm_failures > 0 {
            warn!(request_id = %request_id, llm_failures, "candidates skipped after assessment failures");
        }

        let mut scored: Vec<(MatchResult, MedicalReasoningResult, Trial)> = candidates
            .into_iter()
            .zip(assessments)
            .filter(|(_, assessment)| !assessment.is_fallback())
            .map(|(trial, assessment)| {
                let result = self.build_match_result(&patient_id, &trial, &assessment);
                (result, assessment, trial)
            })
            .collect();

        // Stable sort keeps candidate order for equal confidence.
        scored.sort_by(|a, b| b.0.confidence_score.total_cmp(&a.0.confidence_score));
        let candidates_evaluated = scored.len() + llm_failures;
        scored.retain(|(result, _, _)| result.confidence_score >= min_confidence);
        scored.truncate(max_results);

        let matches: Vec<TrialMatch> = scored
            .iter()
            .map(|(result, assessment, trial)| response::trial_match(result, assessment, trial))
            .collect();

        let processing_time_ms = started.elapsed().as_millis().max(1) as u64;
        info!(
            request_id = %request_id,
            matches = matches.len(),
            processing_time_ms,
            "matching completed"
        );

        let message = matches
            .is_empty()
            .then(|| response::NO_MATCHES_MESSAGE.to_string());
        let total = matches.len();
        Ok(MatchResponse {
            request_id,
            patient_id,
            matches,
            total,
            processing_time_ms,
            timestamp: utc_timestamp(),
            extracted_entities: response::entity_summary(&profile.entities, &profile),
            processing_metadata: response::ProcessingMetadata {
                data_source: retrieved.data_source.to_string(),
                reasoning_enabled: request.enable_advanced_reasoning,
                model_used: self.llm.model().to_string(),
                inference_time_ms: processing_time_ms,
                real_trials: true,
                fallback_reason: retrieved.fallback_reason,
                candidates_evaluated: Some(candidates_evaluated),
                llm_failures: Some(llm_failures),
            },
            llm_features: Some(response::LlmFeatures {
                model_version: self.llm.model().to_string(),
                reasoning_depth: if request.enable_advanced_reasoning {
                    "advanced".to_string()
                } else {
                    "standard".to_string()
                },
            }),
            message,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn empty_response(
        &self,
        request_id: String,
        patient_id: String,
        profile: &PatientProfile,
        started: std::time::Instant,
        data_source: &str,
        fallback_reason: Option<String>,
        reasoning_enabled: bool,
    ) -> MatchResponse {
        MatchResponse {
            request_id,
            patient_id,
            matches: Vec::new(),
            total: 0,
            processing_time_ms: started.elapsed().as_millis().max(1) as u64,
            timestamp: utc_timestamp(),
            extracted_entities: response::entity_summary(&profile.entities, profile),
            processing_metadata: response::ProcessingMetadata {
                data_source: data_source.to_string(),
                reasoning_enabled,
                model_used: self.llm.model().to_string(),
                inference_time_ms: 0,
                real_trials: true,
                fallback_reason,
                candidates_evaluated: Some(0),
                llm_failures: Some(0),
            },
            llm_features: None,
            message: Some(response::NO_MATCHES_MESSAGE.to_string()),
        }
    }

    async fn retrieve_candidates(
        &self,
        profile: &PatientProfile,
        query: &str,
        max_candidates: usize,
    ) -> Retrieved {
        match self.strategy {
            RetrievalStrategy::IndexedCorpus => {
                let from_index = self.search_index(query, max_candidates);
                if !from_index.is_empty() {
                    return Retrieved {
                        trials: from_index,
                        data_source: "hybrid_search",
                        fallback_reason: None,
                    };
                }
                match self.search_registry(profile, query, max_candidates).await {
                    Ok(trials) if !trials.is_empty() => Retrieved {
                        trials,
                        data_source: "clinicaltrials_api",
                        fallback_reason: Some("index returned no candidates".to_string()),
                    },
                    Ok(_) => Retrieved {
                        trials: Vec::new(),
                        data_source: "none",
                        fallback_reason: Some("index and registry returned no candidates".into()),
                    },
                    Err(err) => Retrieved {
                        trials: Vec::new(),
                        data_source: "none",
                        fallback_reason: Some(format!("registry fallback failed: {err}")),
                    },
                }
            }
            RetrievalStrategy::LiveRegistry => {
                match self.search_registry(profile, query, max_candidates).await {
                    Ok(trials) if !trials.is_empty() => Retrieved {
                        trials,
                        data_source: "clinicaltrials_api",
                        fallback_reason: None,
                    },
                    Ok(_) => {
                        let from_index = self.search_index(query, max_candidates);
                        if from_index.is_empty() {
                            Retrieved {
                                trials: Vec::new(),
                                data_source: "none",
                                fallback_reason: Some(
                                    "registry and index returned no candidates".into(),
                                ),
                            }
                        } else {
                            Retrieved {
                                trials: from_index,
                                data_source: "hybrid_search",
                                fallback_reason: Some("registry returned no candidates".into()),
                            }
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "registry retrieval failed, trying index");
                        let from_index = self.search_index(query, max_candidates);
                        if from_index.is_empty() {
                            Retrieved {
                                trials: Vec::new(),
                                data_source: "none",
                                fallback_reason: Some(format!("registry retrieval failed: {err}")),
                            }
                        } else {
                            Retrieved {
                                trials: from_index,
                                data_source: "hybrid_search",
                                fallback_reason: Some(format!("registry retrieval failed: {err}")),
                            }
                        }
                    }
                }
            }
        }
    }

    fn search_index(&self, query: &str, max_candidates: usize) -> Vec<Trial> {
        let results = self
            .search
            .search(&SearchQuery::hybrid(query, max_candidates));
        results
            .results
            .iter()
            .filter_map(|hit| self.search.get(&hit.trial_id))
            .collect()
    }

    async fn search_registry(
        &self,
        profile: &PatientProfile,
        query: &str,
        max_candidates: usize,
    ) -> Result<Vec<Trial>, MedMatchError> {
        let keywords = registry_keywords(profile, query);
        debug!(keywords = ?keywords, "registry candidate search");

        let page = self
            .registry
            .search(&RegistrySearchParams {
                keywords: keywords.clone(),
                page_size: max_candidates,
                ..Default::default()
            })
            .await?;
        if !page.results.is_empty() {
            return Ok(page.results);
        }

        // Widen to the bare cancer type when the precise keyword set found
        // nothing.
        let broader = broader_keywords(query);
        debug!(keywords = ?broader, "registry widening search");
        let page = self
            .registry
            .search(&RegistrySearchParams {
                keywords: broader,
                page_size: max_candidates,
                ..Default::default()
            })
            .await?;
        Ok(page.results)
    }

    fn build_match_result(
        &self,
        patient_id: &str,
        trial: &Trial,
        assessment: &MedicalReasoningResult,
    ) -> MatchResult {
        let mut result = MatchResult::new(
            format!("match_{}_{}", trial.nct_id, unix_millis()),
            patient_id.to_string(),
            trial.nct_id.clone(),
        );

        let step_count = assessment.reasoning_chain.len();
        for step in &assessment.reasoning_chain {
            let step_result = if step.confidence > 0.7 {
                StepResult::Pass
            } else {
                StepResult::Partial
            };
            result.push_step(
                map_reasoning_category(step),
                step_result,
                step.description.clone(),
                Some(step.confidence),
                (step_count > 0).then(|| 1.0 / step_count as f64),
            );
        }

        result.overall_score = assessment.confidence_score;
        result.confidence_score = assessment.confidence_score;
        result.match_status = assessment.eligibility_status;
        result.enforce_eligibility_invariant();
        result.explanation = Some(assessment.conclusion.clone());
        result.set_next_steps(assessment.recommendations.clone());
        result.processing_time_ms = assessment.processing_time_ms;
        result.ai_model_version = Some(self.llm.model().to_string());
        result.audit_metadata.insert(
            "patient_summary".into(),
            serde_json::Value::String(assessment.patient_summary.clone()),
        );

        result
    }
}

/// Maps a model reasoning step onto the closed category set via a keyword
/// rubric over its label and text.
fn map_reasoning_category(step: &LlmReasoningStep) -> StepCategory {
    let text = format!("{} {}", step.category, step.description).to_lowercase();
    let has = |keywords: &[&str]| keywords.iter().any(|k| text.contains(k));

    if has(&["demographic", "age"]) {
        StepCategory::AgeCheck
    } else if has(&["inclusion", "criteria", "eligibility"]) {
        StepCategory::InclusionCheck
    } else if has(&["risk", "exclusion", "contraindication"]) {
        StepCategory::ExclusionCheck
    } else if has(&["condition", "diagnosis", "disease"]) {
        StepCategory::ConditionMatch
    } else if has(&["medication", "drug", "treatment"]) {
        StepCategory::MedicationCompatibility
    } else if has(&["allergy", "allergic"]) {
        StepCategory::AllergyCheck
    } else if has(&["gender", "sex"]) {
        StepCategory::GenderCheck
    } else if has(&["location", "geographic", "proximity"]) {
        StepCategory::LocationProximity
    } else if has(&["status", "recruiting", "enrollment"]) {
        StepCategory::TrialStatusCheck
    } else if has(&["lab", "laboratory"]) {
        StepCategory::LabValuesCheck
    } else {
        StepCategory::InclusionCheck
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.to_lowercase()))
        .collect()
}

/// Normalizes the request into a working profile, running entity
/// extraction over whichever free text is available.
fn build_profile(patient: &PatientInput) -> PatientProfile {
    let biomarker_names: Vec<String> = patient.biomarkers.keys().cloned().collect();

    if let Some(narrative) = patient.narrative() {
        let entities = crate::nlp::extract(narrative);
        let mut biomarkers = biomarker_names;
        for value in &entities.lab_values {
            if response::BIOMARKER_TERMS.contains(&value.to_lowercase().as_str()) {
                biomarkers.push(value.clone());
            }
        }
        let mut medications = entities.medications.clone();
        medications.extend(patient.current_medications.iter().cloned());

        return PatientProfile {
            primary_conditions: entities.conditions.clone(),
            biomarkers: dedup(biomarkers),
            medications: dedup(medications),
            age: entities.demographics.age.or_else(|| patient.resolved_age()),
            sex: entities.demographics.sex.or_else(|| patient.resolved_sex()),
            entities,
            raw: patient.clone(),
        };
    }

    // Structured input; a free-text medical history still goes through the
    // extractor for standardization.
    let history_text = patient
        .medical_history
        .as_ref()
        .and_then(|h| h.as_text())
        .map(str::to_string);
    let entities = history_text
        .as_deref()
        .map(crate::nlp::extract)
        .unwrap_or_default();

    let mut conditions: Vec<String> = patient.conditions.clone();
    if let Some(history) = patient.medical_history.as_ref().and_then(|h| h.as_structured()) {
        conditions.extend(history.primary_diagnosis.iter().cloned());
        conditions.extend(history.secondary_diagnoses.iter().cloned());
    }
    conditions.extend(entities.conditions.iter().cloned());

    PatientProfile {
        primary_conditions: dedup(conditions),
        biomarkers: dedup(biomarker_names),
        medications: dedup(patient.current_medications.clone()),
        age: patient.resolved_age().or(entities.demographics.age),
        sex: patient.resolved_sex().or(entities.demographics.sex),
        entities,
        raw: patient.clone(),
    }
}

/// Joins conditions and biomarkers into the retrieval query; empty profiles
/// fall back to key terms from the narrative, then to `cancer`.
fn build_candidate_query(profile: &PatientProfile) -> String {
    let mut terms: Vec<String> = profile.primary_conditions.clone();
    terms.extend(profile.biomarkers.iter().cloned());

    let query = terms.join(" ").trim().to_string();
    if !query.is_empty() {
        return query;
    }

    if let Some(narrative) = profile.raw.narrative() {
        let key_terms = extract_key_terms(narrative);
        if !key_terms.is_empty() {
            return key_terms.join(" ");
        }
    }

    "cancer".to_string()
}

const KEY_TERM_CANCER_TYPES: [(&str, &[&str]); 10] = [
    ("breast cancer", &["breast cancer", "breast"]),
    ("lung cancer", &["lung cancer", "lung", "nsclc"]),
    ("colon cancer", &["colon cancer", "colorectal"]),
    ("prostate cancer", &["prostate cancer", "prostate"]),
    ("pancreatic cancer", &["pancreatic cancer", "pancreas"]),
    ("ovarian cancer", &["ovarian cancer", "ovary"]),
    ("liver cancer", &["liver cancer", "hepatocellular"]),
    ("kidney cancer", &["kidney cancer", "renal cell"]),
    ("skin cancer", &["skin cancer", "melanoma"]),
    ("brain cancer", &["brain cancer", "glioma"]),
];

const KEY_TERM_CONDITIONS: [&str; 8] = [
    "diabetes",
    "hypertension",
    "heart disease",
    "asthma",
    "arthritis",
    "depression",
    "anxiety",
    "copd",
];

const KEY_TERM_MEDICAL: [&str; 9] = [
    "metastatic",
    "stage",
    "mutation",
    "egfr",
    "her2",
    "chemotherapy",
    "radiation",
    "immunotherapy",
    "surgery",
];

/// Narrow fallback extractor used only when the full extractor produced no
/// query terms.
fn extract_key_terms(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let mut terms: Vec<String> = Vec::new();

    if let Some(age) = crate::nlp::extract(&lower).demographics.age {
        terms.push(format!("age {age}"));
    }

    if ["woman", "female", "girl"].iter().any(|g| lower.contains(g)) {
        terms.push("female".into());
    } else if ["man", "male", "boy"].iter().any(|g| lower.contains(g)) {
        terms.push("male".into());
    }

    for (cancer_type, keywords) in KEY_TERM_CANCER_TYPES {
        if lower.contains(cancer_type) {
            terms.extend(keywords.iter().map(|k| k.to_string()));
            break;
        }
    }
    if !terms.iter().any(|t| t.contains("cancer")) && lower.contains("cancer") {
        terms.push("cancer".into());
    }

    for condition in KEY_TERM_CONDITIONS {
        if lower.contains(condition) {
            terms.push(condition.to_string());
        }
    }
    for term in KEY_TERM_MEDICAL {
        if lower.contains(term) {
            terms.push(term.to_string());
        }
    }

    dedup(terms)
}

/// Keyword derivation for live registry queries: cancer-type expansion with
/// an EGFR+lung special case, then general conditions, then demographic
/// fallbacks.
fn registry_keywords(profile: &PatientProfile, query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    let mut keywords: Vec<String> = Vec::new();

    if lower.contains("egfr") && lower.contains("lung") {
        keywords.extend(
            [
                "EGFR",
                "non-small cell lung cancer",
                "lung adenocarcinoma",
                "targeted therapy",
            ]
            .map(String::from),
        );
    } else {
        for (cancer_type, expansions) in [
            ("breast cancer", vec!["breast cancer", "breast"]),
            (
                "lung cancer",
                vec!["non-small cell lung cancer", "nsclc", "lung adenocarcinoma"],
            ),
            ("colon cancer", vec!["colon cancer", "colorectal"]),
            ("colorectal cancer", vec!["colorectal cancer", "colorectal"]),
            ("prostate cancer", vec!["prostate cancer", "prostate"]),
            ("pancreatic cancer", vec!["pancreatic cancer", "pancreas"]),
            ("ovarian cancer", vec!["ovarian cancer", "ovary"]),
            ("liver cancer", vec!["liver cancer", "hepatocellular"]),
            ("kidney cancer", vec!["kidney cancer", "renal cell"]),
            ("skin cancer", vec!["skin cancer", "melanoma"]),
            ("brain cancer", vec!["brain cancer", "glioma"]),
        ] {
            if lower.contains(cancer_type) {
                keywords.extend(expansions.into_iter().map(String::from));
                break;
            }
        }
        if keywords.is_empty() && lower.contains("cancer") {
            keywords.push("cancer".into());
        }
    }

    for (condition, expansions) in [
        ("diabetes", vec!["diabetes", "type 2 diabetes"]),
        ("heart", vec!["heart disease", "cardiovascular"]),
        ("stroke", vec!["stroke", "cerebrovascular"]),
        ("hypertension", vec!["hypertension", "high blood pressure"]),
        ("asthma", vec!["asthma", "respiratory"]),
        ("copd", vec!["copd", "chronic obstructive pulmonary"]),
        ("alzheimer", vec!["alzheimer", "dementia"]),
        ("parkinson", vec!["parkinson", "movement disorder"]),
    ] {
        if lower.contains(condition) {
            keywords.extend(expansions.into_iter().map(String::from));
        }
    }

    if keywords.is_empty() {
        match profile.sex {
            Some(crate::entities::patient::Sex::Female) => keywords.push("female".into()),
            Some(crate::entities::patient::Sex::Male) => keywords.push("male".into()),
            _ => {}
        }
    }

    if keywords.is_empty() {
        keywords.push(query.chars().take(50).collect());
    }

    dedup(keywords)
}

fn broader_keywords(query: &str) -> Vec<String> {
    let lower = query.to_lowercase();
    for cancer_type in ["breast", "lung", "colorectal", "prostate"] {
        if lower.contains(cancer_type) {
            return vec![format!("{cancer_type} cancer"), "cancer".to_string()];
        }
    }
    vec!["cancer".to_string()]
}
