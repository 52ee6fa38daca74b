#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum MedMatchError {
    #[error("HTTP client initialization failed: {0}")]
    HttpClientInit(reqwest::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP middleware error: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    #[error("API error from {api}: {message}")]
    Api { api: String, message: String },

    #[error("API JSON error from {api}: {source}")]
    ApiJson {
        api: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Authentication failed for {api}: check the configured API key")]
    Authentication { api: String },

    #[error("Rate limit exceeded for {api} (retry after {retry_after:?} seconds)")]
    RateLimit {
        api: String,
        retry_after: Option<u64>,
    },

    #[error("Request to {api} timed out after {attempts} attempts")]
    Timeout { api: String, attempts: u32 },

    #[error("{entity} '{id}' not found.\n\n{suggestion}")]
    NotFound {
        entity: String,
        id: String,
        suggestion: String,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(
        "API key required: {api} requires {env_var} environment variable.\n\nTo set:\n  export {env_var}=your-key\n\nMore info: {docs_url}"
    )]
    ApiKeyRequired {
        api: String,
        env_var: String,
        docs_url: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::MedMatchError;

    #[test]
    fn not_found_display_includes_suggestion() {
        let err = MedMatchError::NotFound {
            entity: "trial".to_string(),
            id: "NCT00000001".to_string(),
            suggestion: "Try searching: medmatch search -q \"breast cancer\"".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("trial 'NCT00000001' not found"));
        assert!(msg.contains("Try searching"));
    }

    #[test]
    fn api_key_required_display_includes_env_var_and_docs() {
        let err = MedMatchError::ApiKeyRequired {
            api: "cerebras".to_string(),
            env_var: "CEREBRAS_API_KEY".to_string(),
            docs_url: "https://cloud.cerebras.ai/".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("CEREBRAS_API_KEY"));
        assert!(msg.contains("https://cloud.cerebras.ai/"));
    }

    #[test]
    fn rate_limit_display_includes_retry_after() {
        let err = MedMatchError::RateLimit {
            api: "cerebras".to_string(),
            retry_after: Some(30),
        };

        let msg = err.to_string();
        assert!(msg.contains("cerebras"));
        assert!(msg.contains("30"));
    }

    #[test]
    fn api_error_display_includes_api_name() {
        let err = MedMatchError::Api {
            api: "clinicaltrials".to_string(),
            message: "HTTP 500".to_string(),
        };

        let msg = err.to_string();
        assert!(msg.contains("clinicaltrials"));
        assert!(msg.contains("HTTP 500"));
    }
}
