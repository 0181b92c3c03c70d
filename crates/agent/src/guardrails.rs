use thiserror::Error;

/// A candidate query that passed the gate, normalized and ready to execute.
/// The wrapped text is exactly what the data store receives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SafeQuery(String);

impl SafeQuery {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for SafeQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum QueryRejection {
    #[error("candidate query is empty")]
    Empty,
    #[error("only SELECT queries are allowed")]
    NotReadOnly,
}

/// Validates candidate queries proposed by the completion provider before
/// they reach the data store.
///
/// The check is a syntactic prefix test: after trimming whitespace and
/// stripping a single trailing `;`, the text must begin case-insensitively
/// with `select`. The gate does not parse the query body, so a read-only
/// query can still select more than intended through crafted WHERE or JOIN
/// clauses; the prefix test exists to block mutation and multi-statement
/// injection through the one channel a confused model reply could use.
#[derive(Clone, Copy, Debug, Default)]
pub struct QueryGate;

impl QueryGate {
    pub fn new() -> Self {
        Self
    }

    pub fn validate(&self, candidate: &str) -> Result<SafeQuery, QueryRejection> {
        let trimmed = candidate.trim();
        let normalized = trimmed.strip_suffix(';').unwrap_or(trimmed).trim();

        if normalized.is_empty() {
            return Err(QueryRejection::Empty);
        }

        let mut leading = normalized.chars().take(6).collect::<String>();
        leading.make_ascii_lowercase();
        if !leading.starts_with("select") {
            return Err(QueryRejection::NotReadOnly);
        }

        Ok(SafeQuery(normalized.to_string()))
    }
}
