//! Deterministic pseudo-embeddings for semantic ranking.
//!
//! Vectors are derived from the MD5 of the text plus additive contributions
//! from weighted medical-vocabulary terms, then L2-normalized. The same
//! text always embeds to the same unit vector, which keeps ranking
//! reproducible without an external model; a real embedder can replace this
//! without touching the engine contract.

pub(crate) const DEFAULT_DIMENSION: usize = 384;

const VOCAB_CONDITIONS: &[&str] = &[
    "diabetes",
    "cancer",
    "hypertension",
    "cardiovascular",
    "oncology",
    "tumor",
    "malignancy",
    "carcinoma",
    "lymphoma",
    "leukemia",
    "heart disease",
    "stroke",
    "alzheimer",
    "parkinson",
    "copd",
    "asthma",
    "kidney disease",
    "liver disease",
    "autoimmune",
];

const VOCAB_TREATMENTS: &[&str] = &[
    "chemotherapy",
    "immunotherapy",
    "radiation",
    "surgery",
    "medication",
    "insulin",
    "metformin",
    "statins",
    "ace inhibitors",
    "beta blockers",
    "antibiotics",
    "vaccines",
    "biologics",
    "car-t",
    "gene therapy",
];

const VOCAB_PROCEDURES: &[&str] = &[
    "clinical trial",
    "biopsy",
    "screening",
    "diagnosis",
    "treatment",
    "intervention",
    "therapy",
    "procedure",
    "transplant",
];

fn vocabulary() -> impl Iterator<Item = (&'static str, f32)> {
    VOCAB_CONDITIONS
        .iter()
        .map(|t| (*t, 1.0))
        .chain(VOCAB_TREATMENTS.iter().map(|t| (*t, 0.9)))
        .chain(VOCAB_PROCEDURES.iter().map(|t| (*t, 0.8)))
}

fn hex_value(byte: u8) -> f32 {
    let value = match byte {
        b'0'..=b'9' => byte - b'0',
        b'a'..=b'f' => byte - b'a' + 10,
        _ => 0,
    };
    f32::from(value) / 15.0
}

/// Embeds `text` into a `dimension`-length unit vector.
pub(crate) fn generate_embedding(text: &str, dimension: usize) -> Vec<f32> {
    if text.trim().is_empty() || dimension == 0 {
        return vec![0.0; dimension];
    }

    let text_lower = text.to_lowercase();
    let text_hash = format!("{:x}", md5::compute(text.as_bytes()));
    let hash_bytes = text_hash.as_bytes();

    let mut embedding = vec![0.0f32; dimension];
    for (i, value) in embedding.iter_mut().enumerate() {
        *value = hex_value(hash_bytes[i % hash_bytes.len()]) * 0.1;
    }

    for (term, weight) in vocabulary() {
        if !text_lower.contains(term) {
            continue;
        }
        let term_hash = format!("{:x}", md5::compute(term.as_bytes()));
        for (i, byte) in term_hash.bytes().take(dimension).enumerate() {
            embedding[i] += hex_value(byte) * weight * 0.1;
        }
    }

    let magnitude = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in &mut embedding {
            *value /= magnitude;
        }
    }

    embedding
}

pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
