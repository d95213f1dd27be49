//! Search query events

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single search performed at a point in time.
///
/// The timestamp is kept as the raw string found in the log: the index
/// is keyed on its characters, so `"2015-08-01 00:03:49"` is reachable
/// through `"2015"`, `"2015-08"`, `"2015-08-01 00"` and so on. Queries
/// are compared byte for byte; `"Cats"` and `"cats"` are different
/// queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryEvent {
    /// Timestamp the query was issued at
    timestamp: String,
    /// Search query text
    query: String,
}

impl QueryEvent {
    /// Create a new event
    pub fn new(timestamp: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            query: query.into(),
        }
    }

    /// Get timestamp
    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    /// Get query text
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Split the event into `(timestamp, query)`
    pub fn into_parts(self) -> (String, String) {
        (self.timestamp, self.query)
    }
}

impl<T, Q> From<(T, Q)> for QueryEvent
where
    T: Into<String>,
    Q: Into<String>,
{
    fn from((timestamp, query): (T, Q)) -> Self {
        Self::new(timestamp, query)
    }
}

impl fmt::Display for QueryEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}", self.timestamp, self.query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = QueryEvent::new("2015-08-01 00:03:49", "rust");

        assert_eq!(event.timestamp(), "2015-08-01 00:03:49");
        assert_eq!(event.query(), "rust");
    }

    #[test]
    fn test_event_from_tuple() {
        let event: QueryEvent = ("2021-01-01T10", String::from("cats")).into();
        assert_eq!(event, QueryEvent::new("2021-01-01T10", "cats"));

        let (timestamp, query) = event.into_parts();
        assert_eq!(timestamp, "2021-01-01T10");
        assert_eq!(query, "cats");
    }

    #[test]
    fn test_event_display_is_tsv() {
        let event = QueryEvent::new("2015", "hello world");
        assert_eq!(event.to_string(), "2015\thello world");
    }
}
