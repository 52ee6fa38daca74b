//! Environment-driven configuration for the matching pipeline.

use std::borrow::Cow;

use crate::error::MedMatchError;

pub const CEREBRAS_BASE_DEFAULT: &str = "https://api.cerebras.ai/v1";
pub const CEREBRAS_MODEL_DEFAULT: &str = "llama3.3-70b";
pub const CLINICALTRIALS_BASE_DEFAULT: &str = "https://clinicaltrials.gov/api/v2";

pub const CEREBRAS_API_KEY_ENV: &str = "CEREBRAS_API_KEY";
pub const CEREBRAS_BASE_ENV: &str = "CEREBRAS_BASE_URL";
pub const CEREBRAS_MODEL_ENV: &str = "CEREBRAS_MODEL";
pub const CEREBRAS_MAX_TOKENS_ENV: &str = "CEREBRAS_MAX_TOKENS";
pub const CEREBRAS_TIMEOUT_ENV: &str = "CEREBRAS_TIMEOUT";
pub const CLINICALTRIALS_BASE_ENV: &str = "CLINICALTRIALS_BASE_URL";
pub const CLINICALTRIALS_RATE_LIMIT_ENV: &str = "CLINICALTRIALS_RATE_LIMIT";
pub const SIMILARITY_THRESHOLD_ENV: &str = "SIMILARITY_THRESHOLD";
pub const VECTOR_DIMENSION_ENV: &str = "VECTOR_DIMENSION";
pub const HIPAA_SAFE_LOGGING_ENV: &str = "HIPAA_SAFE_LOGGING";

pub(crate) fn env_base(default: &'static str, env_var: &str) -> Cow<'static, str> {
    std::env::var(env_var)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(Cow::Owned)
        .unwrap_or_else(|| Cow::Borrowed(default))
}

fn env_parsed<T: std::str::FromStr>(env_var: &str, default: T) -> T {
    std::env::var(env_var)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(env_var: &str, default: bool) -> bool {
    match std::env::var(env_var) {
        Ok(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Pipeline settings resolved from the environment.
///
/// The Cerebras API key is the only required value; everything else has a
/// deployment default.
#[derive(Debug, Clone)]
pub struct Settings {
    pub cerebras_api_key: String,
    pub cerebras_base_url: Cow<'static, str>,
    pub cerebras_model: String,
    pub cerebras_max_tokens: u32,
    pub cerebras_timeout_secs: u64,
    pub clinicaltrials_base_url: Cow<'static, str>,
    pub clinicaltrials_rate_limit: usize,
    pub similarity_threshold: f64,
    pub vector_dimension: usize,
    pub hipaa_safe_logging: bool,
}

impl Settings {
    pub fn from_env() -> Result<Self, MedMatchError> {
        let api_key = std::env::var(CEREBRAS_API_KEY_ENV)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| MedMatchError::ApiKeyRequired {
                api: "cerebras".to_string(),
                env_var: CEREBRAS_API_KEY_ENV.to_string(),
                docs_url: "https://cloud.cerebras.ai/".to_string(),
            })?;

        Ok(Self {
            cerebras_api_key: api_key,
            ..Self::with_api_key(String::new())
        })
    }

    /// Builds settings with an explicit key, reading everything else from the
    /// environment. Used by tests and by callers that manage credentials
    /// themselves.
    pub fn with_api_key(api_key: String) -> Self {
        Self {
            cerebras_api_key: api_key,
            cerebras_base_url: env_base(CEREBRAS_BASE_DEFAULT, CEREBRAS_BASE_ENV),
            cerebras_model: env_base(CEREBRAS_MODEL_DEFAULT, CEREBRAS_MODEL_ENV).into_owned(),
            cerebras_max_tokens: env_parsed(CEREBRAS_MAX_TOKENS_ENV, 1500),
            cerebras_timeout_secs: env_parsed(CEREBRAS_TIMEOUT_ENV, 30),
            clinicaltrials_base_url: env_base(CLINICALTRIALS_BASE_DEFAULT, CLINICALTRIALS_BASE_ENV),
            clinicaltrials_rate_limit: env_parsed(CLINICALTRIALS_RATE_LIMIT_ENV, 100),
            similarity_threshold: env_parsed(SIMILARITY_THRESHOLD_ENV, 0.7),
            vector_dimension: env_parsed(VECTOR_DIMENSION_ENV, 384),
            hipaa_safe_logging: env_bool(HIPAA_SAFE_LOGGING_ENV, true),
        }
    }
}
