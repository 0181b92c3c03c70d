use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::guardrails::SafeQuery;

/// Ordered row mappings as returned by the data store.
pub type QueryRows = Vec<Map<String, Value>>;

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("data store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("data store rejected the query with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("data store response was malformed: {0}")]
    MalformedResponse(String),
}

/// Executes a gate-approved query against the data store and returns rows.
/// The validated text is passed verbatim; any remote failure is wrapped and
/// returned, never retried.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &SafeQuery) -> Result<QueryRows, ExecutionError>;
}

/// Query executor backed by the data store's remote procedure endpoint
/// (`/rest/v1/rpc/{function}` with a single `query` argument).
pub struct RpcQueryExecutor {
    http: reqwest::Client,
    base_url: String,
    service_key: SecretString,
    rpc_function: String,
}

impl RpcQueryExecutor {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        service_key: SecretString,
        rpc_function: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            service_key,
            rpc_function: rpc_function.into(),
        }
    }

    fn rpc_url(&self) -> String {
        format!("{}/rest/v1/rpc/{}", self.base_url.trim_end_matches('/'), self.rpc_function)
    }
}

fn rows_from_value(value: Value) -> Result<QueryRows, ExecutionError> {
    match value {
        // The store returns null for queries with no rows.
        Value::Null => Ok(Vec::new()),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(row) => Ok(row),
                other => Err(ExecutionError::MalformedResponse(format!(
                    "expected a row object, got {other}"
                ))),
            })
            .collect(),
        other => {
            Err(ExecutionError::MalformedResponse(format!("expected a row array, got {other}")))
        }
    }
}

#[async_trait]
impl QueryExecutor for RpcQueryExecutor {
    async fn execute(&self, query: &SafeQuery) -> Result<QueryRows, ExecutionError> {
        debug!(
            event_name = "datastore.rpc.request",
            rpc_function = %self.rpc_function,
            "executing validated query"
        );

        let response = self
            .http
            .post(self.rpc_url())
            .header("apikey", self.service_key.expose_secret())
            .bearer_auth(self.service_key.expose_secret())
            .json(&json!({ "query": query.as_str() }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Rejected { status: status.as_u16(), body });
        }

        let value = response.json::<Value>().await?;
        rows_from_value(value)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::json;

    use super::{rows_from_value, ExecutionError, RpcQueryExecutor};

    #[test]
    fn row_array_decodes_in_order() {
        let rows = rows_from_value(json!([
            { "sku": "123", "quantity_in_wh": 5 },
            { "sku": "456", "quantity_in_wh": 0 },
        ]))
        .expect("rows should decode");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["sku"], "123");
        assert_eq!(rows[1]["quantity_in_wh"], 0);
    }

    #[test]
    fn null_body_means_no_rows() {
        let rows = rows_from_value(json!(null)).expect("null should decode");
        assert!(rows.is_empty());
    }

    #[test]
    fn empty_array_decodes_to_no_rows() {
        let rows = rows_from_value(json!([])).expect("empty array should decode");
        assert!(rows.is_empty());
    }

    #[test]
    fn non_object_rows_are_malformed() {
        assert!(matches!(
            rows_from_value(json!([1, 2, 3])),
            Err(ExecutionError::MalformedResponse(_))
        ));
        assert!(matches!(
            rows_from_value(json!("oops")),
            Err(ExecutionError::MalformedResponse(_))
        ));
    }

    #[test]
    fn rpc_url_joins_cleanly() {
        let executor = RpcQueryExecutor::new(
            reqwest::Client::new(),
            "https://example.supabase.co/",
            SecretString::from("service-test".to_string()),
            "execute_raw_sql",
        );
        assert_eq!(executor.rpc_url(), "https://example.supabase.co/rest/v1/rpc/execute_raw_sql");
    }
}
