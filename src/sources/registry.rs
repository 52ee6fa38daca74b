//! ClinicalTrials.gov API v2 client.

use std::borrow::Cow;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::config;
use crate::entities::SearchPage;
use crate::entities::patient::PatientInput;
use crate::entities::trial::{AgeRange, Trial, TrialStatus};
use crate::error::MedMatchError;
use crate::utils::validation::validate_nct_id;

const REGISTRY_API: &str = "clinicaltrials";
const MAX_PAGE_SIZE: usize = 1000;
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Raw study payload from the registry's `studies` endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovStudy {
    pub protocol_section: Option<CtGovProtocolSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovProtocolSection {
    pub identification_module: Option<CtGovIdentificationModule>,
    pub status_module: Option<CtGovStatusModule>,
    pub design_module: Option<CtGovDesignModule>,
    pub conditions_module: Option<CtGovConditionsModule>,
    pub description_module: Option<CtGovDescriptionModule>,
    pub eligibility_module: Option<CtGovEligibilityModule>,
    pub contacts_locations_module: Option<CtGovContactsLocationsModule>,
    pub sponsor_collaborators_module: Option<CtGovSponsorModule>,
    pub arms_interventions_module: Option<CtGovArmsInterventionsModule>,
    pub outcomes_module: Option<CtGovOutcomesModule>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovIdentificationModule {
    pub nct_id: Option<String>,
    pub brief_title: Option<String>,
    pub official_title: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovStatusModule {
    pub overall_status: Option<String>,
    pub start_date_struct: Option<CtGovDateStruct>,
    pub completion_date_struct: Option<CtGovDateStruct>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovDateStruct {
    pub date: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovDesignModule {
    pub study_type: Option<String>,
    pub phases: Vec<String>,
    pub design_info: Option<CtGovDesignInfo>,
    pub enrollment_info: Option<CtGovEnrollmentInfo>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovDesignInfo {
    pub primary_purpose: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovEnrollmentInfo {
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovConditionsModule {
    pub conditions: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovDescriptionModule {
    pub brief_summary: Option<String>,
    pub detailed_description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovEligibilityModule {
    pub eligibility_criteria: Option<String>,
    pub minimum_age: Option<String>,
    pub maximum_age: Option<String>,
    pub sex: Option<String>,
    pub healthy_volunteers: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovContactsLocationsModule {
    pub locations: Vec<CtGovLocation>,
    pub central_contacts: Vec<CtGovContact>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovLocation {
    pub facility: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub status: Option<String>,
    pub contacts: Vec<CtGovContact>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovContact {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovArmsInterventionsModule {
    pub interventions: Vec<CtGovIntervention>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovIntervention {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovOutcomesModule {
    pub primary_outcomes: Vec<CtGovOutcome>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovOutcome {
    pub measure: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct CtGovSearchResponse {
    studies: Vec<CtGovStudy>,
    total_count: Option<usize>,
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovSponsorModule {
    pub lead_sponsor: Option<CtGovSponsor>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CtGovSponsor {
    pub name: Option<String>,
}

/// Geographic filter forwarded to the registry's `filter.geo` parameter.
#[derive(Debug, Clone, Copy)]
pub struct GeoFilter {
    pub latitude: f64,
    pub longitude: f64,
    pub radius_miles: u32,
}

#[derive(Debug, Clone, Default)]
pub struct RegistrySearchParams {
    pub conditions: Vec<String>,
    pub keywords: Vec<String>,
    /// `None` applies the default open-status filter (recruiting,
    /// not-yet-recruiting, active-not-recruiting).
    pub status_filter: Option<Vec<TrialStatus>>,
    pub location: Option<GeoFilter>,
    /// Applied client-side: the registry cannot filter on age directly.
    pub age_range: Option<AgeRange>,
    pub page_size: usize,
    pub page_token: Option<String>,
}

fn registry_status_value(status: TrialStatus) -> &'static str {
    match status {
        TrialStatus::Recruiting => "RECRUITING",
        TrialStatus::NotYetRecruiting => "NOT_YET_RECRUITING",
        TrialStatus::ActiveNotRecruiting => "ACTIVE_NOT_RECRUITING",
        TrialStatus::Completed => "COMPLETED",
        TrialStatus::Suspended => "SUSPENDED",
        TrialStatus::Terminated => "TERMINATED",
        TrialStatus::Withdrawn => "WITHDRAWN",
        TrialStatus::EnrollingByInvitation => "ENROLLING_BY_INVITATION",
        TrialStatus::Available => "AVAILABLE",
        TrialStatus::NoLongerAvailable => "NO_LONGER_AVAILABLE",
        TrialStatus::Unknown => "UNKNOWN",
    }
}

const DEFAULT_STATUS_FILTER: [TrialStatus; 3] = [
    TrialStatus::Recruiting,
    TrialStatus::NotYetRecruiting,
    TrialStatus::ActiveNotRecruiting,
];

#[derive(Clone)]
pub struct RegistryClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    max_retries: u32,
}

impl RegistryClient {
    pub fn new() -> Result<Self, MedMatchError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: config::env_base(
                config::CLINICALTRIALS_BASE_DEFAULT,
                config::CLINICALTRIALS_BASE_ENV,
            ),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_base(base: String) -> Result<Self, MedMatchError> {
        Ok(Self {
            client: crate::sources::shared_client()?,
            base: Cow::Owned(base),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.as_ref().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn search_query_pairs(params: &RegistrySearchParams) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = vec![("format".into(), "json".into())];

        let terms: Vec<String> = params
            .conditions
            .iter()
            .chain(params.keywords.iter())
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(|t| format!("\"{t}\""))
            .collect();
        if !terms.is_empty() {
            pairs.push(("query.term".into(), terms.join(" AND ")));
        }

        let statuses: Vec<&'static str> = params
            .status_filter
            .as_deref()
            .unwrap_or(&DEFAULT_STATUS_FILTER)
            .iter()
            .map(|s| registry_status_value(*s))
            .collect();
        if !statuses.is_empty() {
            pairs.push(("filter.overallStatus".into(), statuses.join(",")));
        }

        if let Some(geo) = params.location {
            pairs.push((
                "filter.geo".into(),
                format!(
                    "distance({},{},{}mi)",
                    geo.latitude, geo.longitude, geo.radius_miles
                ),
            ));
        }

        let page_size = params.page_size.clamp(1, MAX_PAGE_SIZE);
        pairs.push(("pageSize".into(), page_size.to_string()));

        if let Some(token) = params
            .page_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            pairs.push(("pageToken".into(), token.to_string()));
        }

        pairs
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        pairs: Vec<(String, String)>,
    ) -> Result<T, MedMatchError> {
        let resp = crate::sources::retry_send(REGISTRY_API, self.max_retries, || {
            self.client.get(&url).query(&pairs).send()
        })
        .await?;

        let status = resp.status();
        let bytes = crate::sources::read_limited_body(resp, REGISTRY_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(MedMatchError::Api {
                api: REGISTRY_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }
        serde_json::from_slice(&bytes).map_err(|source| MedMatchError::ApiJson {
            api: REGISTRY_API.to_string(),
            source,
        })
    }

    /// Searches the registry, normalizing each study into a `Trial`.
    ///
    /// Studies that fail normalization are skipped with a warning. When
    /// `age_range` is set, trials whose declared bounds do not overlap it
    /// are dropped client-side.
    pub async fn search(
        &self,
        params: &RegistrySearchParams,
    ) -> Result<SearchPage<Trial>, MedMatchError> {
        let pairs = Self::search_query_pairs(params);
        debug!(params = ?pairs, "registry search");

        let payload: CtGovSearchResponse = self.get_json(self.endpoint("studies"), pairs).await?;

        let mut trials = Vec::with_capacity(payload.studies.len());
        for study in &payload.studies {
            match crate::transform::trial::from_ctgov_study(study) {
                Ok(trial) => {
                    if let Some(requested) = params.age_range
                        && !trial
                            .eligibility_criteria
                            .age_requirements
                            .overlaps(&requested)
                    {
                        continue;
                    }
                    trials.push(trial);
                }
                Err(err) => {
                    warn!(error = %err, "skipping study that failed normalization");
                }
            }
        }

        debug!(
            results = trials.len(),
            total = ?payload.total_count,
            has_next_page = payload.next_page_token.is_some(),
            "registry search completed"
        );

        Ok(SearchPage::cursor(
            trials,
            payload.total_count,
            payload.next_page_token,
        ))
    }

    /// Fetches and normalizes a single study by NCT id.
    pub async fn get_by_nct_id(&self, nct_id: &str) -> Result<Trial, MedMatchError> {
        validate_nct_id(nct_id)?;

        let url = self.endpoint(&format!("studies/{nct_id}"));
        let resp = crate::sources::retry_send(REGISTRY_API, self.max_retries, || {
            self.client
                .get(&url)
                .query(&[("format", "json")])
                .send()
        })
        .await?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(self.not_found(nct_id));
        }
        let bytes = crate::sources::read_limited_body(resp, REGISTRY_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(MedMatchError::Api {
                api: REGISTRY_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }

        // The detail endpoint returns a bare study; older deployments wrap it
        // in a single-element `studies` envelope.
        let value: serde_json::Value =
            serde_json::from_slice(&bytes).map_err(|source| MedMatchError::ApiJson {
                api: REGISTRY_API.to_string(),
                source,
            })?;
        let study_value = match value.get("studies").and_then(|s| s.as_array()) {
            Some(studies) => studies.first().cloned().ok_or_else(|| self.not_found(nct_id))?,
            None => value,
        };
        let study: CtGovStudy =
            serde_json::from_value(study_value).map_err(|source| MedMatchError::ApiJson {
                api: REGISTRY_API.to_string(),
                source,
            })?;

        crate::transform::trial::from_ctgov_study(&study)
    }

    fn not_found(&self, nct_id: &str) -> MedMatchError {
        MedMatchError::NotFound {
            entity: "trial".to_string(),
            id: nct_id.to_string(),
            suggestion: "Try searching: medmatch search -q \"<condition>\"".to_string(),
        }
    }

    /// Convenience search that builds filters from a patient excerpt and
    /// follows pagination until `max_results` trials are collected.
    pub async fn search_for_patient(
        &self,
        patient: &PatientInput,
        _max_distance_miles: u32,
        max_results: usize,
    ) -> Result<Vec<Trial>, MedMatchError> {
        let conditions: Vec<String> = patient
            .conditions
            .iter()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect();

        // ±5 years of flexibility around the reported age.
        let age_range = patient
            .resolved_age()
            .map(|age| AgeRange::new(Some(age.saturating_sub(5)), Some(age + 5)));

        let mut all_trials: Vec<Trial> = Vec::new();
        let mut page_token: Option<String> = None;

        while all_trials.len() < max_results {
            let page = self
                .search(&RegistrySearchParams {
                    conditions: conditions.clone(),
                    age_range,
                    page_size: (max_results - all_trials.len()).min(100),
                    page_token: page_token.clone(),
                    ..Default::default()
                })
                .await?;

            all_trials.extend(page.results);

            match page.next_page_token {
                Some(token) if all_trials.len() < max_results => page_token = Some(token),
                _ => break,
            }
        }

        all_trials.truncate(max_results);
        Ok(all_trials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn study_payload(nct_id: &str, title: &str) -> serde_json::Value {
        json!({
            "protocolSection": {
                "identificationModule": {"nctId": nct_id, "briefTitle": title},
                "statusModule": {"overallStatus": "RECRUITING"},
                "designModule": {"studyType": "INTERVENTIONAL", "phases": ["PHASE2"]},
                "conditionsModule": {"conditions": ["Breast Cancer"]},
                "eligibilityModule": {
                    "eligibilityCriteria": "Inclusion Criteria:\n- Adults\nExclusion Criteria:\n- Pregnancy",
                    "minimumAge": "18 Years",
                    "maximumAge": "75 Years",
                    "sex": "ALL"
                }
            }
        })
    }

    #[tokio::test]
    async fn search_maps_query_parameters() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies"))
            .and(query_param("format", "json"))
            .and(query_param(
                "query.term",
                "\"breast cancer\" AND \"pembrolizumab\"",
            ))
            .and(query_param(
                "filter.overallStatus",
                "RECRUITING,NOT_YET_RECRUITING,ACTIVE_NOT_RECRUITING",
            ))
            .and(query_param("pageSize", "25"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "studies": [study_payload("NCT01234567", "Trial A")],
                "totalCount": 1
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::with_base(server.uri()).unwrap();
        let page = client
            .search(&RegistrySearchParams {
                conditions: vec!["breast cancer".into()],
                keywords: vec!["pembrolizumab".into()],
                page_size: 25,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].nct_id, "NCT01234567");
        assert_eq!(page.results[0].status, TrialStatus::Recruiting);
        assert_eq!(page.results[0].conditions, vec!["Breast Cancer"]);
        assert_eq!(page.total, Some(1));
    }

    #[tokio::test]
    async fn search_maps_geo_filter_parameter() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies"))
            .and(query_param("filter.geo", "distance(42.36,-71.06,100mi)"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "studies": [],
                "totalCount": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::with_base(server.uri()).unwrap();
        let page = client
            .search(&RegistrySearchParams {
                conditions: vec!["cancer".into()],
                location: Some(GeoFilter {
                    latitude: 42.36,
                    longitude: -71.06,
                    radius_miles: 100,
                }),
                page_size: 5,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn search_applies_client_side_age_filter() {
        let server = MockServer::start().await;

        let mut pediatric = study_payload("NCT00000002", "Pediatric Trial");
        pediatric["protocolSection"]["eligibilityModule"]["minimumAge"] =
            json!("1 Year");
        pediatric["protocolSection"]["eligibilityModule"]["maximumAge"] =
            json!("12 Years");

        Mock::given(method("GET"))
            .and(path("/studies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "studies": [study_payload("NCT00000001", "Adult Trial"), pediatric],
                "totalCount": 2
            })))
            .mount(&server)
            .await;

        let client = RegistryClient::with_base(server.uri()).unwrap();
        let page = client
            .search(&RegistrySearchParams {
                conditions: vec!["cancer".into()],
                age_range: Some(AgeRange::new(Some(50), Some(60))),
                page_size: 10,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].nct_id, "NCT00000001");
    }

    #[tokio::test]
    async fn search_retries_on_server_error_then_succeeds() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/studies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "studies": [],
                "totalCount": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::with_base(server.uri()).unwrap();
        let page = client
            .search(&RegistrySearchParams {
                conditions: vec!["melanoma".into()],
                page_size: 5,
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(page.results.is_empty());
    }

    #[tokio::test]
    async fn get_by_nct_id_rejects_malformed_ids_without_a_request() {
        let client = RegistryClient::with_base("http://127.0.0.1:9".into()).unwrap();

        for bad in ["NCT1234567", "nct12345678", "NCT123456789", "12345678"] {
            let err = client.get_by_nct_id(bad).await.expect_err("must fail");
            assert!(
                matches!(err, MedMatchError::InvalidArgument(_)),
                "expected validation error for {bad}, got {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn get_by_nct_id_maps_404_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studies/NCT00000404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = RegistryClient::with_base(server.uri()).unwrap();
        let err = client.get_by_nct_id("NCT00000404").await.unwrap_err();
        assert!(matches!(err, MedMatchError::NotFound { .. }));
    }

    #[tokio::test]
    async fn get_by_nct_id_accepts_bare_study_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studies/NCT01234567"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(study_payload("NCT01234567", "Trial A")),
            )
            .mount(&server)
            .await;

        let client = RegistryClient::with_base(server.uri()).unwrap();
        let trial = client.get_by_nct_id("NCT01234567").await.unwrap();
        assert_eq!(trial.nct_id, "NCT01234567");
        assert_eq!(
            trial.eligibility_criteria.age_requirements,
            AgeRange::new(Some(18), Some(75))
        );
        assert_eq!(trial.eligibility_criteria.inclusion, vec!["Adults"]);
        assert_eq!(trial.eligibility_criteria.exclusion, vec!["Pregnancy"]);
    }

    #[tokio::test]
    async fn search_for_patient_follows_pagination() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/studies"))
            .and(query_param("pageToken", "page-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "studies": [study_payload("NCT00000002", "Second")],
                "totalCount": 2
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/studies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "studies": [study_payload("NCT00000001", "First")],
                "totalCount": 2,
                "nextPageToken": "page-2"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = RegistryClient::with_base(server.uri()).unwrap();
        let patient = PatientInput {
            conditions: vec!["breast cancer".into()],
            age: Some(52),
            ..Default::default()
        };
        let trials = client.search_for_patient(&patient, 100, 2).await.unwrap();

        assert_eq!(trials.len(), 2);
        assert_eq!(trials[0].nct_id, "NCT00000001");
        assert_eq!(trials[1].nct_id, "NCT00000002");
    }
}
