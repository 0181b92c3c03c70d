//! Conversation-and-query orchestration building blocks.
//!
//! This crate provides the four leaf components the gateway server wires
//! together:
//! - **Conversation store** (`conversation`) - bounded per-caller dialogue
//!   history
//! - **Query safety gate** (`guardrails`) - the read-only-query invariant
//! - **Completion client** (`llm`) - dialogue in, direct reply or function
//!   invocation out
//! - **Query executor** (`datastore`) - validated SQL in, rows out
//!
//! # Safety Principle
//!
//! The completion provider is strictly a translator. Whatever it proposes as
//! SQL is untrusted until the guardrails accept it, and only accepted text
//! ever reaches the data store. Failures from either remote collaborator are
//! surfaced as typed errors and never retried here.

pub mod conversation;
pub mod datastore;
pub mod guardrails;
pub mod llm;

pub use conversation::ConversationStore;
pub use datastore::{ExecutionError, QueryExecutor, QueryRows, RpcQueryExecutor};
pub use guardrails::{QueryGate, QueryRejection, SafeQuery};
pub use llm::{CompletionClient, CompletionError, CompletionOutcome, OpenAiCompletionClient};
