//! In-memory hybrid search over indexed trials.
//!
//! Combines deterministic vector similarity with keyword scoring through
//! reciprocal-rank fusion. The index is process-wide, read-mostly state
//! behind a reader-preferring lock; identical queries over identical index
//! state always rank identically.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Instant;

use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::entities::patient::PatientLocation;
use crate::entities::trial::{AgeRange, GenderRequirement, Trial, TrialStatus};

pub(crate) mod embedding;
pub(crate) mod lexical;

const MIN_SIMILARITY: f64 = 0.1;
const MIN_KEYWORD_SCORE: f64 = 0.1;
const RRF_K: f64 = 60.0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SearchMode {
    Semantic,
    Lexical,
    #[default]
    Hybrid,
}

#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    pub text: String,
    pub conditions: Option<Vec<String>>,
    pub keywords: Option<Vec<String>>,
    pub age_range: Option<AgeRange>,
    pub gender: Option<GenderRequirement>,
    pub status_filter: Option<Vec<TrialStatus>>,
    /// Accepted and echoed for callers; the engine does not geocode.
    pub location: Option<PatientLocation>,
    pub mode: SearchMode,
    pub limit: usize,
    pub offset: usize,
}

impl SearchQuery {
    pub fn hybrid(text: impl Into<String>, limit: usize) -> Self {
        Self {
            text: text.into(),
            limit,
            ..Default::default()
        }
    }
}

/// One scored search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub trial_id: String,
    pub nct_id: String,
    pub title: String,
    pub brief_summary: String,
    pub conditions: Vec<String>,
    pub relevance_score: f64,
    pub similarity_score: f64,
    pub keyword_score: f64,
    pub explanation: String,
    pub matched_keywords: Vec<String>,
    pub matched_concepts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
    pub total_count: usize,
    pub search_time_ms: u64,
}

struct IndexedTrial {
    trial: Trial,
    search_text: String,
    embedding: Vec<f32>,
    keywords: Vec<String>,
    indexed_at: OffsetDateTime,
}

/// Snapshot of the index for diagnostics.
#[derive(Debug, Clone)]
pub struct IndexStats {
    pub total_trials: usize,
    pub embedding_dimension: usize,
    pub last_indexed_at: Option<OffsetDateTime>,
}

/// Intermediate score row before filtering and pagination.
struct Scored {
    trial_id: String,
    relevance: f64,
    similarity: f64,
    keyword: f64,
    matched_keywords: Vec<String>,
    matched_concepts: Vec<String>,
}

/// Reciprocal-rank fusion over two 1-based rankings. An id missing from a
/// list contributes nothing from that list; every fused id has at least one
/// finite rank by construction.
fn rrf_fuse(semantic_ids: &[String], lexical_ids: &[String], k: f64) -> Vec<(String, f64)> {
    let semantic_ranks: HashMap<&str, usize> = semantic_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i + 1))
        .collect();
    let lexical_ranks: HashMap<&str, usize> = lexical_ids
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i + 1))
        .collect();

    let mut ids: Vec<&str> = semantic_ranks
        .keys()
        .chain(lexical_ranks.keys())
        .copied()
        .collect();
    ids.sort_unstable();
    ids.dedup();

    let mut fused: Vec<(String, f64)> = ids
        .into_iter()
        .map(|id| {
            let mut score = 0.0;
            if let Some(rank) = semantic_ranks.get(id) {
                score += 1.0 / (k + *rank as f64);
            }
            if let Some(rank) = lexical_ranks.get(id) {
                score += 1.0 / (k + *rank as f64);
            }
            (id.to_string(), score)
        })
        .collect();

    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    fused
}

pub struct SearchEngine {
    dimension: usize,
    index: RwLock<HashMap<String, IndexedTrial>>,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(embedding::DEFAULT_DIMENSION)
    }
}

impl SearchEngine {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            index: RwLock::new(HashMap::new()),
        }
    }

    /// Indexes one trial, replacing any previous entry with the same id.
    pub fn index(&self, trial: Trial) -> bool {
        if trial.nct_id.trim().is_empty() {
            warn!("trial missing id, skipping indexing");
            return false;
        }

        let search_text = trial.search_text();
        let entry = IndexedTrial {
            embedding: embedding::generate_embedding(&search_text, self.dimension),
            keywords: lexical::extract_keywords(&search_text),
            trial,
            search_text,
            indexed_at: OffsetDateTime::now_utc(),
        };

        let id = entry.trial.nct_id.clone();
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        index.insert(id.clone(), entry);
        debug!(trial_id = %id, "indexed trial");
        true
    }

    /// Indexes a batch, returning the number of successes.
    pub fn bulk_index(&self, trials: Vec<Trial>) -> usize {
        let total = trials.len();
        let indexed = trials
            .into_iter()
            .map(|t| self.index(t))
            .filter(|indexed| *indexed)
            .count();
        debug!(indexed, total, "bulk indexing complete");
        indexed
    }

    pub fn remove(&self, trial_id: &str) -> bool {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        index.remove(trial_id).is_some()
    }

    pub fn clear(&self) {
        let mut index = self.index.write().unwrap_or_else(|e| e.into_inner());
        index.clear();
    }

    pub fn len(&self) -> usize {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, trial_id: &str) -> Option<Trial> {
        self.index
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(trial_id)
            .map(|entry| entry.trial.clone())
    }

    pub fn stats(&self) -> IndexStats {
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());
        IndexStats {
            total_trials: index.len(),
            embedding_dimension: self.dimension,
            last_indexed_at: index.values().map(|entry| entry.indexed_at).max(),
        }
    }

    fn semantic_scores(
        &self,
        index: &HashMap<String, IndexedTrial>,
        query_text: &str,
    ) -> Vec<Scored> {
        if query_text.trim().is_empty() {
            return Vec::new();
        }

        let query_embedding = embedding::generate_embedding(query_text, self.dimension);
        let mut scored: Vec<Scored> = index
            .values()
            .filter_map(|entry| {
                let similarity =
                    embedding::cosine_similarity(&query_embedding, &entry.embedding);
                (similarity > MIN_SIMILARITY).then(|| Scored {
                    trial_id: entry.trial.nct_id.clone(),
                    relevance: similarity,
                    similarity,
                    keyword: 0.0,
                    matched_keywords: Vec::new(),
                    matched_concepts: lexical::matched_concepts(query_text, &entry.keywords),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.trial_id.cmp(&b.trial_id))
        });
        scored
    }

    fn lexical_scores(
        &self,
        index: &HashMap<String, IndexedTrial>,
        query: &SearchQuery,
    ) -> Vec<Scored> {
        let mut query_keywords = lexical::extract_keywords(&query.text);
        if let Some(extra) = &query.keywords {
            query_keywords.extend(extra.iter().map(|k| k.to_lowercase()));
        }
        if query_keywords.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<Scored> = index
            .values()
            .filter_map(|entry| {
                let score = lexical::keyword_score(&query_keywords, &entry.search_text);
                (score > MIN_KEYWORD_SCORE).then(|| Scored {
                    trial_id: entry.trial.nct_id.clone(),
                    relevance: score,
                    similarity: 0.0,
                    keyword: score,
                    matched_keywords: lexical::matched_keywords(
                        &query_keywords,
                        &entry.search_text,
                    ),
                    matched_concepts: Vec::new(),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            b.keyword
                .total_cmp(&a.keyword)
                .then_with(|| a.trial_id.cmp(&b.trial_id))
        });
        scored
    }

    fn hybrid_scores(
        &self,
        index: &HashMap<String, IndexedTrial>,
        query: &SearchQuery,
    ) -> Vec<Scored> {
        let semantic = self.semantic_scores(index, &query.text);
        let lexical_rows = self.lexical_scores(index, query);

        let semantic_ids: Vec<String> = semantic.iter().map(|s| s.trial_id.clone()).collect();
        let lexical_ids: Vec<String> = lexical_rows.iter().map(|s| s.trial_id.clone()).collect();

        let semantic_by_id: HashMap<String, Scored> = semantic
            .into_iter()
            .map(|s| (s.trial_id.clone(), s))
            .collect();
        let lexical_by_id: HashMap<String, Scored> = lexical_rows
            .into_iter()
            .map(|s| (s.trial_id.clone(), s))
            .collect();

        rrf_fuse(&semantic_ids, &lexical_ids, RRF_K)
            .into_iter()
            .map(|(trial_id, rrf)| {
                let semantic_row = semantic_by_id.get(&trial_id);
                let lexical_row = lexical_by_id.get(&trial_id);
                Scored {
                    similarity: semantic_row.map_or(0.0, |s| s.similarity),
                    keyword: lexical_row.map_or(0.0, |s| s.keyword),
                    matched_keywords: lexical_row
                        .map(|s| s.matched_keywords.clone())
                        .unwrap_or_default(),
                    matched_concepts: semantic_row
                        .map(|s| s.matched_concepts.clone())
                        .unwrap_or_default(),
                    relevance: rrf,
                    trial_id,
                }
            })
            .collect()
    }

    fn passes_filters(
        entry: &IndexedTrial,
        query: &SearchQuery,
    ) -> bool {
        if let Some(conditions) = &query.conditions {
            let requested: Vec<String> = conditions.iter().map(|c| c.to_lowercase()).collect();
            let any_match = entry
                .trial
                .conditions
                .iter()
                .any(|c| requested.contains(&c.to_lowercase()));
            if !any_match {
                return false;
            }
        }

        if let Some(statuses) = &query.status_filter
            && !statuses.contains(&entry.trial.status)
        {
            return false;
        }

        if let Some(requested) = query.age_range
            && !entry
                .trial
                .eligibility_criteria
                .age_requirements
                .overlaps(&requested)
        {
            return false;
        }

        if let Some(gender) = query.gender
            && gender != GenderRequirement::All
        {
            let trial_gender = entry.trial.eligibility_criteria.gender_requirements;
            if trial_gender != GenderRequirement::All && trial_gender != gender {
                return false;
            }
        }

        true
    }

    fn explanation(mode: SearchMode, row: &Scored) -> String {
        match mode {
            SearchMode::Semantic => format!("Semantic similarity: {:.3}", row.similarity),
            SearchMode::Lexical => format!("Keyword match: {:.3}", row.keyword),
            SearchMode::Hybrid => format!(
                "Hybrid score: {:.4} (semantic: {:.3}, lexical: {:.3})",
                row.relevance, row.similarity, row.keyword
            ),
        }
    }

    /// Runs a query over the index: score per mode, filter, paginate.
    pub fn search(&self, query: &SearchQuery) -> SearchResults {
        let started = Instant::now();
        let index = self.index.read().unwrap_or_else(|e| e.into_inner());

        let scored = match query.mode {
            SearchMode::Semantic => self.semantic_scores(&index, &query.text),
            SearchMode::Lexical => self.lexical_scores(&index, query),
            SearchMode::Hybrid => self.hybrid_scores(&index, query),
        };

        let filtered: Vec<Scored> = scored
            .into_iter()
            .filter(|row| {
                index
                    .get(&row.trial_id)
                    .is_some_and(|entry| Self::passes_filters(entry, query))
            })
            .collect();

        let total_count = filtered.len();
        let limit = if query.limit == 0 { 20 } else { query.limit };
        let results: Vec<SearchHit> = filtered
            .into_iter()
            .skip(query.offset)
            .take(limit)
            .filter_map(|row| {
                let entry = index.get(&row.trial_id)?;
                Some(SearchHit {
                    trial_id: row.trial_id.clone(),
                    nct_id: entry.trial.nct_id.clone(),
                    title: entry.trial.title.clone(),
                    brief_summary: entry.trial.brief_summary.clone(),
                    conditions: entry.trial.conditions.clone(),
                    explanation: Self::explanation(query.mode, &row),
                    relevance_score: row.relevance,
                    similarity_score: row.similarity,
                    keyword_score: row.keyword,
                    matched_keywords: row.matched_keywords,
                    matched_concepts: row.matched_concepts,
                })
            })
            .collect();

        SearchResults {
            results,
            total_count,
            search_time_ms: started.elapsed().as_millis() as u64,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::trial::{EligibilityCriteria, Phase, StudyType, Trial};

    fn trial(nct_id: &str, title: &str, summary: &str, conditions: &[&str]) -> Trial {
        Trial {
            nct_id: nct_id.into(),
            title: title.into(),
            brief_summary: summary.into(),
            detailed_description: None,
            primary_purpose: Some("treatment".into()),
            phase: Some(Phase::Phase2),
            status: TrialStatus::Recruiting,
            enrollment: Some(100),
            study_type: Some(StudyType::Interventional),
            conditions: conditions.iter().map(|c| c.to_string()).collect(),
            interventions: Vec::new(),
            eligibility_criteria: EligibilityCriteria {
                age_requirements: AgeRange::new(Some(18), Some(75)),
                ..Default::default()
            },
            locations: Vec::new(),
            primary_outcomes: Vec::new(),
            sponsor: None,
            start_date: None,
            completion_date: None,
        }
    }

    fn engine_with_corpus() -> SearchEngine {
        let engine = SearchEngine::default();
        engine.index(trial(
            "NCT00000001",
            "Immunotherapy for Metastatic Breast Cancer",
            "Phase 2 study of pembrolizumab in metastatic breast cancer patients.",
            &["Breast Cancer"],
        ));
        engine.index(trial(
            "NCT00000002",
            "Insulin Strategies in Type 2 Diabetes",
            "Comparing insulin dosing strategies for type 2 diabetes management.",
            &["Type 2 Diabetes"],
        ));
        engine.index(trial(
            "NCT00000003",
            "Chemotherapy in Advanced Lung Cancer",
            "Carboplatin-based chemotherapy in advanced non-small cell lung cancer.",
            &["Lung Cancer"],
        ));
        engine
    }

    #[test]
    fn index_replaces_entries_with_same_id() {
        let engine = SearchEngine::default();
        assert!(engine.index(trial("NCT00000009", "Old Title", "s", &["X"])));
        assert!(engine.index(trial("NCT00000009", "New Title", "s", &["X"])));
        assert_eq!(engine.len(), 1);
        assert_eq!(engine.get("NCT00000009").unwrap().title, "New Title");
    }

    #[test]
    fn index_rejects_blank_ids_and_bulk_counts_successes() {
        let engine = SearchEngine::default();
        let indexed = engine.bulk_index(vec![
            trial("NCT00000001", "A", "s", &["X"]),
            trial("", "No id", "s", &["X"]),
            trial("NCT00000002", "B", "s", &["X"]),
        ]);
        assert_eq!(indexed, 2);
        assert_eq!(engine.len(), 2);
    }

    #[test]
    fn remove_and_clear_shrink_the_index() {
        let engine = engine_with_corpus();
        assert!(engine.remove("NCT00000001"));
        assert!(!engine.remove("NCT00000001"));
        assert_eq!(engine.len(), 2);
        engine.clear();
        assert!(engine.is_empty());
    }

    #[test]
    fn stats_report_size_dimension_and_recency() {
        let engine = engine_with_corpus();
        let stats = engine.stats();
        assert_eq!(stats.total_trials, 3);
        assert_eq!(stats.embedding_dimension, 384);
        assert!(stats.last_indexed_at.is_some());

        engine.clear();
        assert!(engine.stats().last_indexed_at.is_none());
    }

    #[test]
    fn lexical_search_finds_keyword_matches() {
        let engine = engine_with_corpus();
        let results = engine.search(&SearchQuery {
            text: "diabetes insulin".into(),
            mode: SearchMode::Lexical,
            limit: 10,
            ..Default::default()
        });

        assert!(!results.results.is_empty());
        assert_eq!(results.results[0].nct_id, "NCT00000002");
        assert!(results.results[0].keyword_score > 0.1);
        assert!(
            results.results[0]
                .matched_keywords
                .iter()
                .any(|k| k == "diabetes")
        );
    }

    #[test]
    fn semantic_search_ranks_shared_vocabulary_higher() {
        let engine = engine_with_corpus();
        let results = engine.search(&SearchQuery {
            text: "metastatic breast cancer immunotherapy".into(),
            mode: SearchMode::Semantic,
            limit: 10,
            ..Default::default()
        });

        assert!(!results.results.is_empty());
        assert!(results.results[0].similarity_score > MIN_SIMILARITY);

        // The breast-cancer immunotherapy trial shares three weighted
        // vocabulary terms with the query; the diabetes trial shares none
        // and must rank below it.
        let score_of = |nct: &str| {
            results
                .results
                .iter()
                .find(|hit| hit.nct_id == nct)
                .map(|hit| hit.similarity_score)
        };
        let breast = score_of("NCT00000001").expect("breast cancer trial scored");
        if let Some(diabetes) = score_of("NCT00000002") {
            assert!(breast > diabetes);
        }
        assert_ne!(results.results[0].nct_id, "NCT00000002");
    }

    #[test]
    fn search_is_deterministic_for_identical_inputs() {
        let engine = engine_with_corpus();
        let query = SearchQuery::hybrid("breast cancer treatment", 10);

        let first = engine.search(&query);
        let second = engine.search(&query);

        let ids_first: Vec<&str> = first.results.iter().map(|r| r.nct_id.as_str()).collect();
        let ids_second: Vec<&str> = second.results.iter().map(|r| r.nct_id.as_str()).collect();
        assert_eq!(ids_first, ids_second);
        for (a, b) in first.results.iter().zip(second.results.iter()) {
            assert_eq!(a.relevance_score, b.relevance_score);
            assert_eq!(a.similarity_score, b.similarity_score);
            assert_eq!(a.keyword_score, b.keyword_score);
        }
    }

    #[test]
    fn rrf_fusion_matches_hand_computed_ranks() {
        // A: semantic rank 1, lexical rank 5 -> 1/61 + 1/65 ≈ 0.03178
        // B: semantic rank 10, lexical rank 1 -> 1/70 + 1/61 ≈ 0.03068
        let semantic: Vec<String> = (0..10)
            .map(|i| {
                if i == 0 {
                    "A".to_string()
                } else if i == 9 {
                    "B".to_string()
                } else {
                    format!("S{i}")
                }
            })
            .collect();
        let lexical: Vec<String> = (0..5)
            .map(|i| {
                if i == 0 {
                    "B".to_string()
                } else if i == 4 {
                    "A".to_string()
                } else {
                    format!("L{i}")
                }
            })
            .collect();

        let fused = rrf_fuse(&semantic, &lexical, RRF_K);
        let pos_a = fused.iter().position(|(id, _)| id == "A").unwrap();
        let pos_b = fused.iter().position(|(id, _)| id == "B").unwrap();
        assert!(pos_a < pos_b, "A must precede B");

        let score_a = fused[pos_a].1;
        let score_b = fused[pos_b].1;
        assert!((score_a - (1.0 / 61.0 + 1.0 / 65.0)).abs() < 1e-9);
        assert!((score_b - (1.0 / 70.0 + 1.0 / 61.0)).abs() < 1e-9);
    }

    #[test]
    fn every_fused_id_has_at_least_one_finite_rank() {
        let fused = rrf_fuse(
            &["A".to_string(), "B".to_string()],
            &["C".to_string()],
            RRF_K,
        );
        assert_eq!(fused.len(), 3);
        for (_, score) in fused {
            assert!(score > 0.0, "fused ids must come from at least one list");
        }
    }

    #[test]
    fn condition_filter_keeps_matching_trials_only() {
        let engine = engine_with_corpus();
        let results = engine.search(&SearchQuery {
            text: "cancer".into(),
            conditions: Some(vec!["breast cancer".into()]),
            mode: SearchMode::Hybrid,
            limit: 10,
            ..Default::default()
        });

        assert!(!results.results.is_empty());
        for hit in &results.results {
            assert_eq!(hit.nct_id, "NCT00000001");
        }
    }

    #[test]
    fn age_filter_applies_overlap_rule() {
        let engine = SearchEngine::default();
        let mut pediatric = trial("NCT00000004", "Pediatric Cancer Study", "cancer", &["Cancer"]);
        pediatric.eligibility_criteria.age_requirements = AgeRange::new(Some(2), Some(12));
        engine.index(pediatric);
        engine.index(trial("NCT00000005", "Adult Cancer Study", "cancer", &["Cancer"]));

        let results = engine.search(&SearchQuery {
            text: "cancer".into(),
            age_range: Some(AgeRange::new(Some(40), Some(50))),
            mode: SearchMode::Lexical,
            limit: 10,
            ..Default::default()
        });

        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].nct_id, "NCT00000005");
    }

    #[test]
    fn gender_filter_admits_all_gender_trials() {
        let engine = SearchEngine::default();
        let mut female_only = trial("NCT00000006", "Cancer Study F", "cancer", &["Cancer"]);
        female_only.eligibility_criteria.gender_requirements = GenderRequirement::Female;
        let mut male_only = trial("NCT00000007", "Cancer Study M", "cancer", &["Cancer"]);
        male_only.eligibility_criteria.gender_requirements = GenderRequirement::Male;
        engine.index(female_only);
        engine.index(male_only);
        engine.index(trial("NCT00000008", "Cancer Study All", "cancer", &["Cancer"]));

        let results = engine.search(&SearchQuery {
            text: "cancer".into(),
            gender: Some(GenderRequirement::Female),
            mode: SearchMode::Lexical,
            limit: 10,
            ..Default::default()
        });

        let ids: Vec<&str> = results.results.iter().map(|r| r.nct_id.as_str()).collect();
        assert!(ids.contains(&"NCT00000006"));
        assert!(ids.contains(&"NCT00000008"));
        assert!(!ids.contains(&"NCT00000007"));
    }

    #[test]
    fn status_filter_prunes_closed_trials() {
        let engine = SearchEngine::default();
        let mut closed = trial("NCT00000010", "Closed Cancer Study", "cancer", &["Cancer"]);
        closed.status = TrialStatus::Completed;
        engine.index(closed);
        engine.index(trial("NCT00000011", "Open Cancer Study", "cancer", &["Cancer"]));

        let results = engine.search(&SearchQuery {
            text: "cancer".into(),
            status_filter: Some(vec![TrialStatus::Recruiting]),
            mode: SearchMode::Lexical,
            limit: 10,
            ..Default::default()
        });

        assert_eq!(results.results.len(), 1);
        assert_eq!(results.results[0].nct_id, "NCT00000011");
    }

    #[test]
    fn pagination_slices_after_filtering() {
        let engine = SearchEngine::default();
        for i in 0..5 {
            engine.index(trial(
                &format!("NCT0000010{i}"),
                &format!("Cancer Study {i}"),
                "cancer treatment",
                &["Cancer"],
            ));
        }

        let page_one = engine.search(&SearchQuery {
            text: "cancer".into(),
            mode: SearchMode::Lexical,
            limit: 2,
            offset: 0,
            ..Default::default()
        });
        let page_two = engine.search(&SearchQuery {
            text: "cancer".into(),
            mode: SearchMode::Lexical,
            limit: 2,
            offset: 2,
            ..Default::default()
        });

        assert_eq!(page_one.total_count, 5);
        assert_eq!(page_one.results.len(), 2);
        assert_eq!(page_two.results.len(), 2);
        let first_ids: Vec<&str> = page_one.results.iter().map(|r| r.nct_id.as_str()).collect();
        for hit in &page_two.results {
            assert!(!first_ids.contains(&hit.nct_id.as_str()));
        }
    }

    #[test]
    fn empty_query_yields_no_hybrid_results() {
        let engine = engine_with_corpus();
        let results = engine.search(&SearchQuery::hybrid("", 10));
        assert!(results.results.is_empty());
        assert_eq!(results.total_count, 0);
    }
}
