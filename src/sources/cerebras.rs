//! Cerebras chat-completion client for eligibility reasoning.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::config::Settings;
use crate::entities::patient::PatientProfile;
use crate::error::MedMatchError;
use crate::utils::validation::redact_identifiers;

const CEREBRAS_API: &str = "cerebras";
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Fields a patient payload may carry over the LLM channel.
const SAFE_FIELDS: [&str; 11] = [
    "age",
    "sex",
    "gender",
    "conditions",
    "medications",
    "medical_history",
    "lab_values",
    "allergies",
    "smoking_status",
    "alcohol_use",
    "performance_status",
];

/// Identifier fields stripped unconditionally.
const PII_FIELDS: [&str; 11] = [
    "name",
    "first_name",
    "last_name",
    "ssn",
    "mrn",
    "email",
    "phone",
    "address",
    "date_of_birth",
    "insurance",
    "emergency_contact",
];

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are a medical AI assistant specializing in clinical trial matching.

Your task is to analyze patient eligibility for clinical trials using step-by-step reasoning.

INSTRUCTIONS:
1. Compare patient data against trial criteria systematically
2. Provide clear PASS/FAIL assessment for each criterion
3. Calculate overall compatibility percentage (0-100%)
4. Explain your reasoning step-by-step
5. Highlight any areas requiring human verification
6. Maintain HIPAA compliance - never include PII in responses

FORMAT YOUR RESPONSE AS:
COMPATIBILITY ASSESSMENT: [X]% Match

STEP-BY-STEP REASONING:
[Detailed analysis of each criterion]

RECOMMENDATION: [Clear recommendation]
NEXT STEPS: [Any required follow-up]";

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One completed chat exchange with the inference service.
#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: Usage,
    pub model: String,
    pub finish_reason: String,
    pub response_time_ms: u64,
    pub request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Usage,
    #[serde(default)]
    model: Option<String>,
}

/// Scrubs identifier patterns (SSNs, phone numbers, email addresses) from
/// every string reachable in a retained value. Allow-listed fields such as
/// `medical_history` are caller-controlled free text and can still carry
/// identifiers inline.
fn redact_value(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(text) => {
            serde_json::Value::String(redact_identifiers(text))
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(redact_value).collect())
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), redact_value(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Removes everything but allow-listed clinical fields from a patient
/// payload before transmission, and scrubs identifier patterns from any
/// retained free text. The single choke point for patient data leaving the
/// process over the LLM channel: both the compatibility prompt here and
/// the reasoning service's eligibility prompts build on its output.
pub fn sanitize_patient_data(patient: &serde_json::Value) -> serde_json::Value {
    let Some(object) = patient.as_object() else {
        return serde_json::Value::Object(serde_json::Map::new());
    };

    let mut sanitized = serde_json::Map::new();
    for (key, value) in object {
        let key_lower = key.to_lowercase();
        if PII_FIELDS.contains(&key_lower.as_str()) {
            continue;
        }
        if key_lower == "location" {
            if let Some(location) = value.as_object() {
                let reduced: serde_json::Map<String, serde_json::Value> = location
                    .iter()
                    .filter(|(k, _)| {
                        matches!(k.to_lowercase().as_str(), "city" | "state" | "country")
                    })
                    .map(|(k, v)| (k.clone(), redact_value(v)))
                    .collect();
                sanitized.insert("location".into(), serde_json::Value::Object(reduced));
            }
            continue;
        }
        if SAFE_FIELDS.contains(&key_lower.as_str()) {
            sanitized.insert(key.clone(), redact_value(value));
        }
    }

    serde_json::Value::Object(sanitized)
}

/// Allow-listed, identifier-scrubbed view of a patient, obtainable only
/// through `sanitize_patient_data`. Prompt builders that carry patient
/// data accept this type rather than raw input, so no code path can
/// assemble an outbound message body around the choke point.
#[derive(Debug, Clone, Default)]
pub struct SanitizedPatient {
    pub age: Option<u32>,
    pub sex: Option<String>,
    pub conditions: Vec<String>,
    pub medications: Vec<String>,
    pub medical_history: Option<String>,
    pub allergies: Vec<String>,
}

impl SanitizedPatient {
    /// Serializes the full caller-supplied input, overlays the profile's
    /// normalized fields, and filters the result through the choke point.
    pub fn from_profile(profile: &PatientProfile) -> Self {
        let mut payload = serde_json::to_value(&profile.raw).unwrap_or_default();
        if let Some(object) = payload.as_object_mut() {
            object.insert("age".into(), serde_json::json!(profile.age));
            object.insert(
                "sex".into(),
                serde_json::json!(profile.sex.map(|s| s.as_str())),
            );
            object.insert(
                "conditions".into(),
                serde_json::json!(profile.primary_conditions),
            );
            object.insert(
                "medications".into(),
                serde_json::json!(profile.medications),
            );
        }
        Self::from_value(&payload)
    }

    pub fn from_value(patient: &serde_json::Value) -> Self {
        let safe = sanitize_patient_data(patient);
        let string_list = |key: &str| -> Vec<String> {
            safe.get(key)
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            age: safe
                .get("age")
                .and_then(|v| v.as_u64())
                .and_then(|v| u32::try_from(v).ok()),
            sex: safe
                .get("sex")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            conditions: string_list("conditions"),
            medications: string_list("medications"),
            medical_history: safe
                .get("medical_history")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            allergies: string_list("allergies"),
        }
    }
}

/// Builds the chain-of-thought compatibility prompt around sanitized
/// patient data.
fn build_compatibility_messages(
    patient: &serde_json::Value,
    trial_criteria: &serde_json::Value,
    system_prompt: Option<&str>,
) -> Vec<ChatMessage> {
    let safe_patient = sanitize_patient_data(patient);
    let patient_text =
        serde_json::to_string_pretty(&safe_patient).unwrap_or_else(|_| "{}".to_string());
    let criteria_text =
        serde_json::to_string_pretty(trial_criteria).unwrap_or_else(|_| "{}".to_string());

    let user_prompt = format!(
        "PATIENT PROFILE:\n{patient_text}\n\nTRIAL ELIGIBILITY CRITERIA:\n{criteria_text}\n\n\
         Please analyze the compatibility between this patient and trial criteria.\n"
    );

    vec![
        ChatMessage::system(system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT)),
        ChatMessage::user(user_prompt),
    ]
}

#[derive(Clone, Debug)]
pub struct CerebrasClient {
    client: reqwest_middleware::ClientWithMiddleware,
    base: Cow<'static, str>,
    api_key: String,
    model: String,
    default_max_tokens: u32,
    request_timeout: Duration,
    max_retries: u32,
}

impl CerebrasClient {
    pub fn new(settings: &Settings) -> Result<Self, MedMatchError> {
        if settings.cerebras_api_key.trim().is_empty() {
            return Err(MedMatchError::ApiKeyRequired {
                api: CEREBRAS_API.to_string(),
                env_var: crate::config::CEREBRAS_API_KEY_ENV.to_string(),
                docs_url: "https://cloud.cerebras.ai/".to_string(),
            });
        }

        Ok(Self {
            client: crate::sources::shared_client()?,
            base: settings.cerebras_base_url.clone(),
            api_key: settings.cerebras_api_key.clone(),
            model: settings.cerebras_model.clone(),
            default_max_tokens: settings.cerebras_max_tokens,
            request_timeout: Duration::from_secs(settings.cerebras_timeout_secs),
            max_retries: DEFAULT_MAX_RETRIES,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base.as_ref().trim_end_matches('/')
        )
    }

    /// Sends one chat completion, classifying authentication, rate-limit,
    /// and transport failures into typed errors.
    pub async fn chat_completion(
        &self,
        messages: &[ChatMessage],
        max_tokens: Option<u32>,
        temperature: f64,
        stream: bool,
    ) -> Result<ChatCompletion, MedMatchError> {
        if messages.is_empty() {
            return Err(MedMatchError::InvalidArgument(
                "chat_completion requires at least one message".into(),
            ));
        }

        let payload = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": max_tokens.unwrap_or(self.default_max_tokens),
            "temperature": temperature,
            "stream": stream,
        });

        let url = self.endpoint();
        let started = Instant::now();
        let resp = crate::sources::retry_send(CEREBRAS_API, self.max_retries, || {
            self.client
                .post(&url)
                .bearer_auth(&self.api_key)
                .timeout(self.request_timeout)
                .json(&payload)
                .send()
        })
        .await?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let status = resp.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(MedMatchError::Authentication {
                api: CEREBRAS_API.to_string(),
            });
        }
        let request_id = resp
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = crate::sources::read_limited_body(resp, CEREBRAS_API).await?;
        if !status.is_success() {
            let excerpt = crate::sources::body_excerpt(&bytes);
            return Err(MedMatchError::Api {
                api: CEREBRAS_API.to_string(),
                message: format!("HTTP {status}: {excerpt}"),
            });
        }

        let parsed: ApiResponse =
            serde_json::from_slice(&bytes).map_err(|source| MedMatchError::ApiJson {
                api: CEREBRAS_API.to_string(),
                source,
            })?;
        let choice = parsed.choices.into_iter().next().ok_or_else(|| {
            MedMatchError::Api {
                api: CEREBRAS_API.to_string(),
                message: "Response contained no choices".to_string(),
            }
        })?;

        debug!(
            response_time_ms,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            "chat completion succeeded"
        );

        Ok(ChatCompletion {
            content: choice.message.content,
            usage: parsed.usage,
            model: parsed.model.unwrap_or_else(|| self.model.clone()),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "unknown".into()),
            response_time_ms,
            request_id,
        })
    }

    /// Analyzes one patient/trial pairing with the compatibility prompt.
    /// Patient data passes through `sanitize_patient_data` before leaving
    /// the process.
    pub async fn analyze_patient_trial_compatibility(
        &self,
        patient: &serde_json::Value,
        trial_criteria: &serde_json::Value,
        system_prompt: Option<&str>,
    ) -> Result<ChatCompletion, MedMatchError> {
        let messages = build_compatibility_messages(patient, trial_criteria, system_prompt);
        self.chat_completion(&messages, None, 0.1, false).await
    }

    /// Analyzes one patient against many trials with bounded concurrency.
    ///
    /// Results come back in input order; a per-trial failure surfaces as an
    /// `Err` value in its slot rather than aborting the batch.
    pub async fn batch_analyze(
        &self,
        patient: &serde_json::Value,
        trials: &[serde_json::Value],
        max_concurrent: usize,
    ) -> Vec<Result<ChatCompletion, MedMatchError>> {
        let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let tasks = trials.iter().map(|criteria| {
            let semaphore = semaphore.clone();
            async move {
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return Err(MedMatchError::Api {
                            api: CEREBRAS_API.to_string(),
                            message: "Batch semaphore closed".to_string(),
                        });
                    }
                };
                self.analyze_patient_trial_compatibility(patient, criteria, None)
                    .await
            }
        });

        futures::future::join_all(tasks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base: String) -> CerebrasClient {
        let mut settings = Settings::with_api_key("test-key".into());
        settings.cerebras_base_url = Cow::Owned(base);
        settings.cerebras_model = "llama3.3-70b".into();
        CerebrasClient::new(&settings).expect("client")
    }

    fn completion_body(content: &str) -> serde_json::Value {
        json!({
            "choices": [{"message": {"content": content}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 100, "completion_tokens": 50, "total_tokens": 150},
            "model": "llama3.3-70b"
        })
    }

    #[test]
    fn client_requires_api_key() {
        let settings = Settings::with_api_key(String::new());
        let err = CerebrasClient::new(&settings).expect_err("empty key must fail");
        assert!(matches!(err, MedMatchError::ApiKeyRequired { .. }));
    }

    #[test]
    fn sanitize_strips_prohibited_fields_case_insensitively() {
        let patient = json!({
            "age": 52,
            "gender": "female",
            "conditions": ["breast cancer"],
            "medications": ["pembrolizumab"],
            "Name": "Jane Doe",
            "SSN": "123-45-6789",
            "email": "jane@example.org",
            "Date_Of_Birth": "1973-01-01",
            "insurance": "ACME",
            "favorite_color": "blue",
            "location": {
                "city": "Boston",
                "state": "MA",
                "country": "USA",
                "street": "1 Main St",
                "zip": "02110"
            }
        });

        let sanitized = sanitize_patient_data(&patient);
        let object = sanitized.as_object().expect("object");

        for prohibited in PII_FIELDS {
            assert!(
                !object.keys().any(|k| k.to_lowercase() == prohibited),
                "prohibited key {prohibited} leaked"
            );
        }
        assert!(!object.contains_key("favorite_color"), "unknown keys must drop");
        assert_eq!(object["age"], json!(52));
        assert_eq!(object["conditions"], json!(["breast cancer"]));

        let location = object["location"].as_object().expect("location");
        assert_eq!(location.len(), 3);
        assert!(location.contains_key("city"));
        assert!(!location.contains_key("street"));
        assert!(!location.contains_key("zip"));
    }

    #[test]
    fn sanitize_scrubs_identifiers_inside_allowed_free_text() {
        let patient = json!({
            "age": 52,
            "medical_history": "Seen on referral (SSN 123-45-6789, call 555-123-4567). \
                                History of stage 4 breast cancer.",
            "allergies": ["penicillin (noted by jane.doe@example.org)"]
        });

        let sanitized = sanitize_patient_data(&patient);
        let history = sanitized["medical_history"].as_str().expect("history kept");
        assert!(!history.contains("123-45-6789"));
        assert!(!history.contains("555-123-4567"));
        assert!(history.contains("[SSN-REDACTED]"));
        assert!(history.contains("stage 4 breast cancer"));

        let allergy = sanitized["allergies"][0].as_str().expect("allergy kept");
        assert!(!allergy.contains("example.org"));
        assert!(allergy.contains("penicillin"));
    }

    #[test]
    fn sanitized_patient_view_drops_identifiers_and_keeps_clinical_fields() {
        let profile = crate::entities::patient::PatientProfile {
            raw: crate::entities::patient::PatientInput {
                patient_id: Some("PAT-2025-778".into()),
                allergies: vec!["penicillin".into()],
                medical_history: Some(crate::entities::patient::TextOrStructured::Text(
                    "Prior chemotherapy. Contact 555-867-5309 for records.".into(),
                )),
                ..Default::default()
            },
            primary_conditions: vec!["metastatic breast cancer".into()],
            medications: vec!["pembrolizumab".into()],
            age: Some(58),
            sex: Some(crate::entities::patient::Sex::Female),
            ..Default::default()
        };

        let patient = SanitizedPatient::from_profile(&profile);
        assert_eq!(patient.age, Some(58));
        assert_eq!(patient.sex.as_deref(), Some("female"));
        assert_eq!(patient.conditions, vec!["metastatic breast cancer"]);
        assert_eq!(patient.medications, vec!["pembrolizumab"]);
        assert_eq!(patient.allergies, vec!["penicillin"]);

        let dump = format!("{patient:?}");
        assert!(!dump.contains("PAT-2025-778"));

        let history = patient.medical_history.expect("history kept");
        assert!(history.contains("Prior chemotherapy"));
        assert!(!history.contains("555-867-5309"));
    }

    #[test]
    fn compatibility_messages_never_carry_identifiers() {
        let patient = json!({
            "age": 61,
            "conditions": ["NSCLC"],
            "name": "John Q Patient",
            "phone": "555-867-5309",
            "mrn": "MRN-99181"
        });
        let criteria = json!({"inclusion_criteria": ["Stage IV NSCLC"]});

        let messages = build_compatibility_messages(&patient, &criteria, None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[1].role, "user");

        let user_body = &messages[1].content;
        assert!(user_body.contains("NSCLC"));
        assert!(!user_body.contains("John Q Patient"));
        assert!(!user_body.contains("555-867-5309"));
        assert!(!user_body.contains("MRN-99181"));
    }

    #[tokio::test]
    async fn chat_completion_sends_bearer_auth_and_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("\"temperature\":0.1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("x-request-id", "req-123")
                    .set_body_json(completion_body("ELIGIBLE with 85% confidence")),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let completion = client
            .chat_completion(
                &[ChatMessage::user("Assess this patient")],
                Some(512),
                0.1,
                false,
            )
            .await
            .unwrap();

        assert_eq!(completion.content, "ELIGIBLE with 85% confidence");
        assert_eq!(completion.usage.total_tokens, 150);
        assert_eq!(completion.finish_reason, "stop");
        assert_eq!(completion.request_id.as_deref(), Some("req-123"));
    }

    #[tokio::test]
    async fn chat_completion_retries_429_honouring_retry_after() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "1"))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("recovered")))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let started = Instant::now();
        let completion = client
            .chat_completion(&[ChatMessage::user("retry me")], None, 0.1, false)
            .await
            .unwrap();

        assert_eq!(completion.content, "recovered");
        assert!(
            started.elapsed() >= Duration::from_secs(1),
            "Retry-After must be honoured before the second attempt"
        );
    }

    #[tokio::test]
    async fn chat_completion_does_not_retry_401() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let err = client
            .chat_completion(&[ChatMessage::user("who am i")], None, 0.1, false)
            .await
            .unwrap_err();

        assert!(matches!(err, MedMatchError::Authentication { .. }));
    }

    #[tokio::test]
    async fn batch_analyze_preserves_input_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("TRIAL-ALPHA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("alpha")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("TRIAL-BETA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("beta")))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let patient = json!({"age": 50, "conditions": ["cancer"]});
        let trials = vec![
            json!({"trial_id": "TRIAL-BETA"}),
            json!({"trial_id": "TRIAL-ALPHA"}),
        ];

        let results = client.batch_analyze(&patient, &trials, 5).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().content, "beta");
        assert_eq!(results[1].as_ref().unwrap().content, "alpha");
    }

    #[tokio::test]
    async fn batch_analyze_surfaces_per_item_errors_in_place() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("TRIAL-GOOD"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("good")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(body_string_contains("TRIAL-BAD"))
            .respond_with(ResponseTemplate::new(400).set_body_string("malformed"))
            .mount(&server)
            .await;

        let client = test_client(server.uri());
        let patient = json!({"age": 50});
        let trials = vec![json!({"trial_id": "TRIAL-GOOD"}), json!({"trial_id": "TRIAL-BAD"})];

        let results = client.batch_analyze(&patient, &trials, 2).await;
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

}
