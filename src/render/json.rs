use serde::Serialize;

use crate::error::MedMatchError;

pub(crate) fn to_pretty<T: Serialize>(value: &T) -> Result<String, MedMatchError> {
    Ok(serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::to_pretty;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Demo<'a> {
        nct_id: &'a str,
        score: f64,
    }

    #[test]
    fn to_pretty_serializes_with_indentation() {
        let payload = Demo {
            nct_id: "NCT01234567",
            score: 0.87,
        };
        let json = to_pretty(&payload).expect("json");
        assert!(json.contains('\n'));
        assert!(json.contains("\"nct_id\": \"NCT01234567\""));
        assert!(json.contains("\"score\": 0.87"));
    }
}
