use serde::{Deserialize, Serialize};

/// Payload field that arrives either as free text or as a structured record.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TextOrStructured<T> {
    Text(String),
    Structured(T),
}

impl<T> TextOrStructured<T> {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value.as_str()),
            Self::Structured(_) => None,
        }
    }

    pub fn as_structured(&self) -> Option<&T> {
        match self {
            Self::Text(_) => None,
            Self::Structured(value) => Some(value),
        }
    }
}
