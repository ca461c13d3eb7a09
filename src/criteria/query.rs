use crate::core::{Params, Value};

/// A rendered, frozen query: text plus everything the session binds to it.
#[derive(Debug, Clone, PartialEq)]
pub struct QuerySpec {
    pub text: String,
    pub params: Params,
    pub first_result: Option<usize>,
    pub max_results: Option<usize>,
}

impl QuerySpec {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            params: Params::new(),
            first_result: None,
            max_results: None,
        }
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Applies `first_result` / `max_results` to an already ordered result.
    pub fn paginate<T>(&self, rows: Vec<T>) -> Vec<T> {
        let skip = self.first_result.unwrap_or(0);
        let rows = rows.into_iter().skip(skip);
        match self.max_results {
            Some(max) => rows.take(max).collect(),
            None => rows.collect(),
        }
    }
}
