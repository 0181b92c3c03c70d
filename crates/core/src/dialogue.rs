//! Dialogue data model shared by the conversation store and the completion
//! provider wire format.
//!
//! A [`Turn`] serializes directly to the provider's chat-message shape:
//! lowercase role tags, optional `content`, `name` on function-result turns
//! and `function_call` on assistant invocation turns. Turns are immutable
//! once appended to a conversation.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

/// A function invocation requested by the provider. `arguments` is the raw
/// JSON-encoded string exactly as the provider returned it; decoding is the
/// orchestrator's job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(content.into()), name: None, function_call: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(content.into()), name: None, function_call: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
            name: None,
            function_call: None,
        }
    }

    /// The raw assistant turn carrying a function invocation. Stored in the
    /// conversation so later turns keep the invocation context, even though
    /// it is never shown to the end user.
    pub fn function_invocation(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: None,
            name: None,
            function_call: Some(FunctionCall { name: name.into(), arguments: arguments.into() }),
        }
    }

    /// A function-result turn: `name` identifies which function produced the
    /// serialized result in `content`.
    pub fn function_result(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Function,
            content: Some(content.into()),
            name: Some(name.into()),
            function_call: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Role, Turn};

    #[test]
    fn roles_serialize_lowercase() {
        let value = serde_json::to_value(Turn::user("hi")).expect("turn serializes");
        assert_eq!(value["role"], "user");
        assert_eq!(value["content"], "hi");
        assert!(value.get("name").is_none());
        assert!(value.get("function_call").is_none());
    }

    #[test]
    fn invocation_turn_omits_content_and_carries_call() {
        let turn = Turn::function_invocation("run_sql_query", r#"{"query":"SELECT 1"}"#);
        assert_eq!(turn.role, Role::Assistant);

        let value = serde_json::to_value(&turn).expect("turn serializes");
        assert!(value.get("content").is_none());
        assert_eq!(value["function_call"]["name"], "run_sql_query");
        assert_eq!(value["function_call"]["arguments"], r#"{"query":"SELECT 1"}"#);
    }

    #[test]
    fn function_result_turn_carries_function_name() {
        let value = serde_json::to_value(Turn::function_result("run_sql_query", "[]"))
            .expect("turn serializes");
        assert_eq!(value["role"], "function");
        assert_eq!(value["name"], "run_sql_query");
        assert_eq!(value["content"], "[]");
    }

    #[test]
    fn wire_assistant_message_round_trips() {
        let raw = r#"{"role":"assistant","content":null,"function_call":{"name":"run_sql_query","arguments":"{}"}}"#;
        let turn: Turn = serde_json::from_str(raw).expect("wire message parses");
        assert_eq!(turn.role, Role::Assistant);
        assert!(turn.content.is_none());
        assert_eq!(turn.function_call.as_ref().map(|call| call.name.as_str()), Some("run_sql_query"));
    }
}
