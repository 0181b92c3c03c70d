//! The `/query` endpoint: the request-handling state machine that bridges
//! free-text input to a validated read-only query and back to a
//! natural-language answer.
//!
//! Control flow per request: load the caller's history, run a phase-1
//! completion with function calling enabled, and either return the
//! provider's direct reply or validate + execute the requested query and run
//! a phase-2 completion over the results. Every failure is translated here,
//! and only here, into a transport-level error response.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::post,
    Router,
};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use stocky_agent::{
    CompletionClient, CompletionError, CompletionOutcome, ConversationStore, ExecutionError,
    QueryExecutor, QueryGate, QueryRejection, QueryRows,
};
use stocky_core::dialogue::Turn;
use stocky_core::errors::ErrorCategory;

#[derive(Clone)]
pub struct GatewayState {
    store: Arc<ConversationStore>,
    completion: Arc<dyn CompletionClient>,
    executor: Arc<dyn QueryExecutor>,
    gate: QueryGate,
}

impl GatewayState {
    pub fn new(
        store: Arc<ConversationStore>,
        completion: Arc<dyn CompletionClient>,
        executor: Arc<dyn QueryExecutor>,
    ) -> Self {
        Self { store, completion, executor, gate: QueryGate::new() }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new().route("/query", post(handle_query)).with_state(state)
}

#[derive(Debug, Serialize)]
pub struct QueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<QueryRows>,
    pub gpt_response: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    category: ErrorCategory,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{0}")]
    BadRequest(String),
    #[error("completion request failed: {0}")]
    Completion(#[source] CompletionError),
    #[error("function-call arguments were malformed: {0}")]
    BadFunctionArgs(String),
    #[error(transparent)]
    UnsafeQuery(#[from] QueryRejection),
    #[error("query execution failed: {0}")]
    Execution(#[from] ExecutionError),
    #[error("result summarization failed: {0}")]
    Summarization(#[source] CompletionError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::BadRequest(_) => ErrorCategory::BadRequest,
            Self::Completion(_) => ErrorCategory::CompletionFailure,
            Self::BadFunctionArgs(_) => ErrorCategory::BadFunctionArgs,
            Self::UnsafeQuery(_) => ErrorCategory::UnsafeQuery,
            Self::Execution(_) => ErrorCategory::ExecutionFailure,
            Self::Summarization(_) => ErrorCategory::SummarizationFailure,
            Self::Internal(_) => ErrorCategory::Internal,
        }
    }

    fn status_code(&self) -> StatusCode {
        if self.category().is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let body = ErrorBody { error: self.to_string(), category: self.category() };
        (self.status_code(), Json(body)).into_response()
    }
}

async fn handle_query(
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Response {
    let correlation_id = Uuid::new_v4().to_string();
    let identity = addr.ip().to_string();

    info!(
        event_name = "gateway.request.received",
        correlation_id = %correlation_id,
        caller = %identity,
        "query request received"
    );

    match process_query(&state, &identity, &correlation_id, payload).await {
        Ok(response) => {
            info!(
                event_name = "gateway.request.completed",
                correlation_id = %correlation_id,
                caller = %identity,
                query_executed = response.sql_query.is_some(),
                "query request completed"
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(failure) => {
            if failure.category().is_client_error() {
                warn!(
                    event_name = "gateway.request.rejected",
                    correlation_id = %correlation_id,
                    caller = %identity,
                    category = %failure.category(),
                    error = %failure,
                    "query request rejected"
                );
            } else {
                error!(
                    event_name = "gateway.request.failed",
                    correlation_id = %correlation_id,
                    caller = %identity,
                    category = %failure.category(),
                    error = %failure,
                    "query request failed"
                );
            }
            failure.into_response()
        }
    }
}

async fn process_query(
    state: &GatewayState,
    identity: &str,
    correlation_id: &str,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<QueryResponse, GatewayError> {
    let Json(body) = payload.map_err(|rejection| {
        GatewayError::BadRequest(format!("request body is not valid JSON: {rejection}"))
    })?;
    let user_input = body
        .get("user_input")
        .ok_or_else(|| GatewayError::BadRequest("missing `user_input` field".to_string()))?
        .as_str()
        .ok_or_else(|| GatewayError::BadRequest("`user_input` must be a string".to_string()))?
        .to_string();

    // History is read before the provider call and appended after it; no
    // lock is held while a request is in flight.
    let user_turn = Turn::user(user_input);
    let mut dialogue = state.store.get(identity);
    dialogue.push(user_turn.clone());

    let outcome =
        state.completion.complete(&dialogue, true).await.map_err(GatewayError::Completion)?;

    match outcome {
        CompletionOutcome::DirectReply(text) => {
            state.store.append(identity, [user_turn, Turn::assistant(text.clone())]);
            Ok(QueryResponse { sql_query: None, results: None, gpt_response: text })
        }
        CompletionOutcome::FunctionInvocation { name, arguments } => {
            // The raw invocation is persisted before validation so follow-up
            // turns keep the context even when the query is rejected.
            let invocation = Turn::function_invocation(name.clone(), arguments.clone());
            state.store.append(identity, [user_turn, invocation.clone()]);

            let candidate = candidate_query(&arguments)?;
            let query = state.gate.validate(&candidate)?;
            info!(
                event_name = "gateway.query.validated",
                correlation_id = %correlation_id,
                caller = %identity,
                sql = %query,
                "generated query passed the safety gate"
            );

            let rows = state.executor.execute(&query).await?;

            let serialized = serde_json::to_string(&rows).map_err(|err| {
                GatewayError::Internal(format!("could not serialize query results: {err}"))
            })?;
            dialogue.push(invocation);
            dialogue.push(Turn::function_result(&name, serialized));

            let summary = match state.completion.complete(&dialogue, false).await {
                Ok(CompletionOutcome::DirectReply(text)) => text,
                Ok(CompletionOutcome::FunctionInvocation { .. }) => {
                    return Err(GatewayError::Summarization(CompletionError::MalformedReply(
                        "provider requested a function call during summarization".to_string(),
                    )))
                }
                Err(err) => return Err(GatewayError::Summarization(err)),
            };

            state.store.append(identity, [Turn::assistant(summary.clone())]);
            Ok(QueryResponse {
                sql_query: Some(query.into_inner()),
                results: Some(rows),
                gpt_response: summary,
            })
        }
    }
}

fn candidate_query(arguments: &str) -> Result<String, GatewayError> {
    let value: Value = serde_json::from_str(arguments).map_err(|err| {
        GatewayError::BadFunctionArgs(format!("arguments are not valid JSON: {err}"))
    })?;
    value
        .get("query")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::BadFunctionArgs("missing string field `query`".to_string()))
}
