//! Domain records for patients, trials, extracted entities, and match results.

pub mod extraction;
pub mod match_result;
pub mod patient;
pub mod trial;

/// One page of results from a paginated upstream search.
#[derive(Debug, Clone)]
pub struct SearchPage<T> {
    pub results: Vec<T>,
    pub total: Option<usize>,
    pub next_page_token: Option<String>,
}

impl<T> SearchPage<T> {
    pub(crate) fn cursor(
        results: Vec<T>,
        total: Option<usize>,
        next_page_token: Option<String>,
    ) -> Self {
        Self {
            results,
            total,
            next_page_token,
        }
    }
}
