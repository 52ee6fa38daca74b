//! ClinicalTrials.gov study payload → `Trial` normalization.

use crate::entities::trial::{
    EligibilityCriteria, GenderRequirement, Phase, StudyType, Trial, TrialContact, TrialLocation,
    TrialStatus,
};
use crate::error::MedMatchError;
use crate::sources::registry::CtGovStudy;
use crate::transform::eligibility::{parse_age_range, parse_criteria_text};
use crate::utils::validation::validate_nct_id;

fn clean_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn clean_list<'a, I: IntoIterator<Item = &'a String>>(values: I, max: usize) -> Vec<String> {
    values
        .into_iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .take(max)
        .map(|s| s.to_string())
        .collect()
}

fn extract_locations(study: &CtGovStudy) -> Vec<TrialLocation> {
    let Some(module) = study
        .protocol_section
        .as_ref()
        .and_then(|p| p.contacts_locations_module.as_ref())
    else {
        return Vec::new();
    };

    let mut out: Vec<TrialLocation> = module
        .locations
        .iter()
        .filter_map(|loc| {
            let facility = clean_opt(loc.facility.as_deref())?;
            let city = clean_opt(loc.city.as_deref())?;
            let country = clean_opt(loc.country.as_deref())?;
            let contact = loc.contacts.first().or_else(|| module.central_contacts.first());
            Some(TrialLocation {
                facility,
                city,
                state: clean_opt(loc.state.as_deref()),
                country,
                status: clean_opt(loc.status.as_deref()),
                contact: contact.map(|c| TrialContact {
                    name: clean_opt(c.name.as_deref()),
                    phone: clean_opt(c.phone.as_deref()),
                    email: clean_opt(c.email.as_deref()),
                }),
            })
        })
        .collect();

    // Recruiting sites first.
    out.sort_by(|a, b| {
        let a_recruiting = a
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("RECRUITING"));
        let b_recruiting = b
            .status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("RECRUITING"));
        b_recruiting.cmp(&a_recruiting)
    });

    out
}

fn extract_eligibility(study: &CtGovStudy) -> EligibilityCriteria {
    let module = study
        .protocol_section
        .as_ref()
        .and_then(|p| p.eligibility_module.as_ref());

    let raw_text = module.and_then(|m| clean_opt(m.eligibility_criteria.as_deref()));
    let (inclusion, exclusion) = raw_text
        .as_deref()
        .map(parse_criteria_text)
        .unwrap_or_default();

    let age_requirements = parse_age_range(
        module.and_then(|m| m.minimum_age.as_deref()),
        module.and_then(|m| m.maximum_age.as_deref()),
    );
    let gender_requirements = module
        .and_then(|m| m.sex.as_deref())
        .map(GenderRequirement::from_registry)
        .unwrap_or_default();

    let complexity_score = raw_text
        .as_deref()
        .map(crate::nlp::text_complexity)
        .unwrap_or(0.0);
    let extracted_entities = raw_text.as_deref().map(crate::nlp::extract);

    EligibilityCriteria {
        raw_text,
        inclusion,
        exclusion,
        age_requirements,
        gender_requirements,
        extracted_entities,
        complexity_score,
    }
}

/// Normalizes a raw registry study into the internal `Trial` record.
///
/// Fails when the payload has no well-formed NCT id; every other field
/// degrades to an empty or absent value.
pub(crate) fn from_ctgov_study(study: &CtGovStudy) -> Result<Trial, MedMatchError> {
    let p = study.protocol_section.as_ref();

    let nct_id = p
        .and_then(|p| p.identification_module.as_ref())
        .and_then(|m| clean_opt(m.nct_id.as_deref()))
        .unwrap_or_default();
    validate_nct_id(&nct_id)?;

    let title = p
        .and_then(|p| p.identification_module.as_ref())
        .and_then(|m| {
            clean_opt(m.official_title.as_deref()).or_else(|| clean_opt(m.brief_title.as_deref()))
        })
        .unwrap_or_default();
    let status = p
        .and_then(|p| p.status_module.as_ref())
        .and_then(|m| m.overall_status.as_deref())
        .map(TrialStatus::from_registry)
        .unwrap_or(TrialStatus::Unknown);
    let phase = p
        .and_then(|p| p.design_module.as_ref())
        .and_then(|m| m.phases.first())
        .and_then(|raw| Phase::from_registry(raw));
    let study_type = p
        .and_then(|p| p.design_module.as_ref())
        .and_then(|m| m.study_type.as_deref())
        .and_then(StudyType::from_registry);
    let primary_purpose = p
        .and_then(|p| p.design_module.as_ref())
        .and_then(|m| m.design_info.as_ref())
        .and_then(|d| clean_opt(d.primary_purpose.as_deref()))
        .map(|s| s.to_lowercase());
    let enrollment = p
        .and_then(|p| p.design_module.as_ref())
        .and_then(|m| m.enrollment_info.as_ref())
        .and_then(|e| e.count);
    let brief_summary = p
        .and_then(|p| p.description_module.as_ref())
        .and_then(|m| clean_opt(m.brief_summary.as_deref()))
        .unwrap_or_default();
    let detailed_description = p
        .and_then(|p| p.description_module.as_ref())
        .and_then(|m| clean_opt(m.detailed_description.as_deref()));
    let conditions = p
        .and_then(|p| p.conditions_module.as_ref())
        .map(|m| clean_list(&m.conditions, 25))
        .unwrap_or_default();
    let interventions = p
        .and_then(|p| p.arms_interventions_module.as_ref())
        .map(|m| {
            m.interventions
                .iter()
                .filter_map(|i| clean_opt(i.name.as_deref()))
                .take(25)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let primary_outcomes = p
        .and_then(|p| p.outcomes_module.as_ref())
        .map(|m| {
            m.primary_outcomes
                .iter()
                .filter_map(|o| clean_opt(o.measure.as_deref()))
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let sponsor = p
        .and_then(|p| p.sponsor_collaborators_module.as_ref())
        .and_then(|m| m.lead_sponsor.as_ref())
        .and_then(|s| clean_opt(s.name.as_deref()));
    let start_date = p
        .and_then(|p| p.status_module.as_ref())
        .and_then(|m| m.start_date_struct.as_ref())
        .and_then(|d| clean_opt(d.date.as_deref()));
    let completion_date = p
        .and_then(|p| p.status_module.as_ref())
        .and_then(|m| m.completion_date_struct.as_ref())
        .and_then(|d| clean_opt(d.date.as_deref()));

    Ok(Trial {
        nct_id,
        title,
        brief_summary,
        detailed_description,
        primary_purpose,
        phase,
        status,
        enrollment,
        study_type,
        conditions,
        interventions,
        eligibility_criteria: extract_eligibility(study),
        locations: extract_locations(study),
        primary_outcomes,
        sponsor,
        start_date,
        completion_date,
    })
}
