//! Named query parameters

use rusqlite::types::{ToSql, Value};

/// Named parameters for managed and native queries
///
/// Names may be given with or without the leading `:`; they are bound as
/// `:name`.
///
/// # Example
///
/// ```
/// use lookupdao_store::QueryParams;
///
/// let params = QueryParams::new()
///     .with("text", "updated".to_string())
///     .with(":id", 7i64);
/// assert_eq!(params.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    entries: Vec<(String, Value)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a parameter
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn insert(&mut self, name: &str, value: impl Into<Value>) {
        let name = format!(":{}", name.trim_start_matches(':'));
        let value = value.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value bound to `name`
    pub fn get(&self, name: &str) -> Option<&Value> {
        let name = name.trim_start_matches(':');
        self.entries
            .iter()
            .find(|(n, _)| &n[1..] == name)
            .map(|(_, v)| v)
    }

    /// Borrow the entries in the shape rusqlite binds by name
    pub(crate) fn bind(&self) -> Vec<(&str, &dyn ToSql)> {
        self.entries
            .iter()
            .map(|(name, value)| (name.as_str(), value as &dyn ToSql))
            .collect()
    }
}

impl<K: AsRef<str>, V: Into<Value>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (name, value) in iter {
            params.insert(name.as_ref(), value);
        }
        params
    }
}
