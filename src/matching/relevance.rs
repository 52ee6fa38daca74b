//! Rule-based relevance scoring applied to candidate trials before any
//! model call. Removes clinically irrelevant studies and auto-disqualifies
//! known anti-patterns (prevention or surgical studies for advanced cancer,
//! healthy-volunteer studies).

use crate::entities::patient::PatientProfile;
use crate::entities::trial::{Trial, TrialStatus};

pub(crate) const RELEVANCE_THRESHOLD: f64 = 0.5;

const CANCER_MARKERS: [&str; 3] = ["cancer", "tumor", "carcinoma"];

const PREVENTION_PHRASES: [&str; 6] = [
    "prevention",
    "prophylaxis",
    "risk reduction",
    "preventive",
    "high-risk",
    "postmenopausal women",
];

const SURGICAL_PHRASES: [&str; 8] = [
    "reconstruction",
    "surgery",
    "surgical",
    "cosmetic",
    "aesthetic",
    "mastectomy",
    "lumpectomy",
    "breast reconstruction",
];

const HEALTHY_SUBJECT_PHRASES: [&str; 5] = [
    "healthy subjects",
    "healthy volunteers",
    "healthy participants",
    "in healthy",
    "pharmacokinetics in healthy",
];

const OBSERVATIONAL_ONLY_PHRASES: [&str; 6] = [
    "quantitative ultrasound",
    "imaging study",
    "diagnostic study",
    "biomarker study",
    "blood samples",
    "registry",
];

const PEDIATRIC_PHRASES: [&str; 4] = ["pediatric", "children", "adolescent", "child"];

const TREATMENT_PHRASES: [&str; 9] = [
    "treatment",
    "therapy",
    "therapeutic",
    "drug trial",
    "medication",
    "chemotherapy",
    "immunotherapy",
    "targeted therapy",
    "clinical trial",
];

const PHASE_PHRASES: [&str; 6] = [
    "phase 1", "phase 2", "phase 3", "phase i", "phase ii", "phase iii",
];

const CANCER_TYPE_KEYWORDS: [(&str, &[&str]); 5] = [
    ("breast cancer", &["breast"]),
    ("lung cancer", &["lung", "nsclc", "non-small cell"]),
    ("colorectal cancer", &["colorectal", "colon", "rectal"]),
    ("prostate cancer", &["prostate"]),
    ("pancreatic cancer", &["pancreatic", "pancreas"]),
];

fn contains_any(text: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|p| text.contains(p))
}

/// Scores a candidate trial's clinical relevance to the patient, in [0, 1].
/// A zero means auto-disqualification; scores below the threshold drop the
/// trial before it reaches the model.
pub(crate) fn relevance_score(trial: &Trial, profile: &PatientProfile) -> f64 {
    let mut score: f64 = 0.0;

    let trial_text = format!("{} {}", trial.title, trial.brief_summary).to_lowercase();
    let patient_conditions: Vec<String> = profile
        .primary_conditions
        .iter()
        .map(|c| c.to_lowercase())
        .collect();

    // Condition word overlap with the trial's title and summary.
    let condition_match = patient_conditions.iter().any(|condition| {
        condition
            .split_whitespace()
            .any(|word| !word.is_empty() && trial_text.contains(word))
    });
    if condition_match {
        score += 0.4;
    }

    let is_cancer_patient = patient_conditions
        .iter()
        .any(|c| CANCER_MARKERS.iter().any(|marker| c.contains(marker)));
    if is_cancer_patient {
        let advanced = profile.has_advanced_stage();

        if advanced && contains_any(&trial_text, &PREVENTION_PHRASES) {
            return 0.0;
        }
        if advanced && contains_any(&trial_text, &SURGICAL_PHRASES) {
            return 0.0;
        }
        if contains_any(&trial_text, &HEALTHY_SUBJECT_PHRASES) {
            return 0.0;
        }
        if contains_any(&trial_text, &OBSERVATIONAL_ONLY_PHRASES) {
            score -= 0.4;
        }
    }

    if let Some(age) = profile.age {
        let pediatric_trial = contains_any(&trial_text, &PEDIATRIC_PHRASES);
        let adult_trial = trial_text.contains("adult") && !trial_text.contains("pediatric");
        if age >= 18 && pediatric_trial {
            score -= 0.6;
        } else if age < 18 && adult_trial {
            score -= 0.6;
        }
    }

    // Study-type preference, strongest signal wins.
    if contains_any(&trial_text, &TREATMENT_PHRASES) {
        score += 0.3;
    } else if contains_any(&trial_text, &PHASE_PHRASES) {
        score += 0.2;
    } else if trial_text.contains("observational") {
        score -= 0.1;
    }

    match trial.status {
        TrialStatus::Recruiting | TrialStatus::ActiveNotRecruiting => score += 0.1,
        TrialStatus::Completed | TrialStatus::Terminated => score -= 0.2,
        _ => {}
    }

    // Exact cancer-type bonus, only on top of a condition match.
    if condition_match {
        'outer: for condition in &patient_conditions {
            for (cancer_type, keywords) in CANCER_TYPE_KEYWORDS {
                if condition.contains(cancer_type) && contains_any(&trial_text, keywords) {
                    score += 0.3;
                    break 'outer;
                }
            }
        }
    }

    score.clamp(0.0, 1.0)
}

/// Keeps trials scoring at or above the threshold, ordered by descending
/// relevance with ties preserving candidate order, truncated to
/// `max_results`.
pub(crate) fn filter_relevant(
    trials: Vec<Trial>,
    profile: &PatientProfile,
    max_results: usize,
) -> Vec<Trial> {
    let mut scored: Vec<(f64, Trial)> = trials
        .into_iter()
        .map(|trial| (relevance_score(&trial, profile), trial))
        .filter(|(score, _)| *score >= RELEVANCE_THRESHOLD)
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored
        .into_iter()
        .take(max_results)
        .map(|(_, trial)| trial)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::trial::{EligibilityCriteria, Phase, StudyType};

    fn trial(title: &str, summary: &str) -> Trial {
        Trial {
            nct_id: "NCT01234567".into(),
            title: title.into(),
            brief_summary: summary.into(),
            detailed_description: None,
            primary_purpose: None,
            phase: Some(Phase::Phase2),
            status: TrialStatus::Recruiting,
            enrollment: None,
            study_type: Some(StudyType::Interventional),
            conditions: vec!["Breast Cancer".into()],
            interventions: Vec::new(),
            eligibility_criteria: EligibilityCriteria::default(),
            locations: Vec::new(),
            primary_outcomes: Vec::new(),
            sponsor: None,
            start_date: None,
            completion_date: None,
        }
    }

    fn advanced_cancer_profile() -> PatientProfile {
        PatientProfile {
            primary_conditions: vec!["stage 4 breast cancer".into(), "metastatic breast cancer".into()],
            age: Some(58),
            ..Default::default()
        }
    }

    #[test]
    fn prevention_study_auto_disqualified_for_advanced_cancer() {
        let trial = trial(
            "Prevention of breast cancer in high-risk postmenopausal women",
            "A prevention study of risk reduction strategies.",
        );
        let score = relevance_score(&trial, &advanced_cancer_profile());
        assert_eq!(score, 0.0, "prevention study must auto-disqualify");
    }

    #[test]
    fn surgical_study_auto_disqualified_for_advanced_cancer() {
        let trial = trial(
            "Breast reconstruction outcomes after mastectomy",
            "Surgical technique comparison.",
        );
        assert_eq!(relevance_score(&trial, &advanced_cancer_profile()), 0.0);
    }

    #[test]
    fn healthy_volunteer_study_auto_disqualified_for_cancer_patients() {
        let trial = trial(
            "Pharmacokinetics in healthy volunteers",
            "Single-dose pharmacokinetics in healthy subjects.",
        );
        assert_eq!(relevance_score(&trial, &advanced_cancer_profile()), 0.0);
    }

    #[test]
    fn treatment_trial_for_matching_condition_scores_high() {
        let trial = trial(
            "Targeted therapy for metastatic breast cancer",
            "Phase 2 treatment study of CDK4/6 inhibition in breast cancer.",
        );
        let score = relevance_score(&trial, &advanced_cancer_profile());
        // condition match 0.4 + treatment 0.3 + recruiting 0.1 + breast bonus 0.3, clamped.
        assert_eq!(score, 1.0);
    }

    #[test]
    fn imaging_study_penalized_but_not_disqualified() {
        let with_imaging = trial(
            "Quantitative ultrasound imaging study in breast cancer",
            "An imaging study collecting blood samples.",
        );
        let score = relevance_score(&with_imaging, &advanced_cancer_profile());
        assert!(score < RELEVANCE_THRESHOLD);
        assert!(score >= 0.0);
    }

    #[test]
    fn pediatric_trial_penalized_for_adult_patient() {
        let pediatric = trial(
            "Pediatric leukemia treatment study",
            "Treatment trial for children with leukemia.",
        );
        let adult_version = trial(
            "Leukemia treatment study",
            "Treatment trial for patients with leukemia.",
        );
        let profile = PatientProfile {
            primary_conditions: vec!["leukemia cancer".into()],
            age: Some(45),
            ..Default::default()
        };

        assert!(
            relevance_score(&pediatric, &profile) < relevance_score(&adult_version, &profile)
        );
    }

    #[test]
    fn completed_trials_lose_status_points() {
        let mut completed = trial(
            "Treatment of breast cancer",
            "Therapy study in breast cancer.",
        );
        completed.status = TrialStatus::Completed;
        let recruiting = trial(
            "Treatment of breast cancer",
            "Therapy study in breast cancer.",
        );

        let profile = advanced_cancer_profile();
        assert!(relevance_score(&completed, &profile) < relevance_score(&recruiting, &profile));
    }

    #[test]
    fn relevance_error_free_on_empty_profile() {
        let empty = PatientProfile::default();
        let score = relevance_score(&trial("Some study", "Some summary"), &empty);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn filter_keeps_threshold_sorts_and_truncates() {
        let profile = advanced_cancer_profile();
        let strong = trial(
            "Targeted therapy for metastatic breast cancer",
            "Phase 2 treatment study in breast cancer.",
        );
        let mut strong_b = strong.clone();
        strong_b.nct_id = "NCT02222222".into();
        let disqualified = trial(
            "Prevention of breast cancer in high-risk postmenopausal women",
            "Prevention study.",
        );

        let kept = filter_relevant(
            vec![disqualified, strong.clone(), strong_b],
            &profile,
            1,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].nct_id, strong.nct_id, "ties preserve candidate order");
    }
}
