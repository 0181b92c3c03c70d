use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::debug;

use stocky_core::dialogue::Turn;

/// The one function the provider may call. Advertised on phase-1 requests
/// only; phase-2 summarization calls do not offer it, so a second
/// invocation in the same request is simply not possible.
pub const QUERY_FUNCTION_NAME: &str = "run_sql_query";

const DEFAULT_SYSTEM_PROMPT: &str = "\
You help the user retrieve information from a SQL table named inventory. \
The table has the following columns:\n\
- id (identifier)\n\
- created_at (creation timestamp)\n\
- site_code (site code)\n\
- site_name (site name)\n\
- wh_code (warehouse code)\n\
- wh_description (warehouse description)\n\
- sku (stock keeping unit)\n\
- item_description (item description)\n\
- supplier_sku (supplier SKU)\n\
- quantity_in_wh (quantity in warehouse)\n\
- quantity_in_trucks_distribution (quantity in distribution trucks)\n\
- quantity_in_trucks_between_sites (quantity in trucks between sites)\n\
- location_in_wh (location in warehouse)\n\n\
When the user requests information from the table (e.g., quantity, location, \
or warehouse details), use the run_sql_query function to create an exact SQL \
query (SELECT only) based on the request. Write the query with the exact \
table and column names, and do not add a semicolon (;) at the end. After \
receiving the results from the function, respond in the user's language in a \
friendly and clear manner, explaining the results (e.g., 'You have X units \
of SKU Y in warehouse Z'). If the user is continuing a previous \
conversation, use the context of the previous messages to understand the \
request (e.g., referring to a specific SKU or warehouse). If the request is \
an idle conversation (such as 'hi', 'thank you', or a general question), \
respond in a friendly manner without creating an SQL query, unless the \
request explicitly requires it. Never return the SQL query itself as a \
response to the user.";

/// What the provider did with the dialogue: answered directly, or asked for
/// the advertised function to be run. Downstream code must handle both.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CompletionOutcome {
    DirectReply(String),
    FunctionInvocation { name: String, arguments: String },
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("completion provider returned status {status}: {body}")]
    Api { status: u16, body: String },
    #[error("completion provider reply was malformed: {0}")]
    MalformedReply(String),
}

/// Sends a dialogue to the completion provider and returns its outcome.
///
/// Implementations always prepend the fixed system instruction turn; callers
/// pass history and request turns only. A failed call is terminal for the
/// current request; retries are nobody's job in this layer.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        dialogue: &[Turn],
        allow_function_call: bool,
    ) -> Result<CompletionOutcome, CompletionError>;
}

/// Chat-completions client using the provider's function-call protocol.
pub struct OpenAiCompletionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: SecretString,
    model: String,
    system_prompt: String,
}

impl OpenAiCompletionClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        api_key: SecretString,
        model: impl Into<String>,
        system_prompt: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key,
            model: model.into(),
            system_prompt: system_prompt.unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }

    fn request_body(&self, dialogue: &[Turn], allow_function_call: bool) -> Value {
        let mut messages = Vec::with_capacity(dialogue.len() + 1);
        messages.push(json!({ "role": "system", "content": self.system_prompt }));
        for turn in dialogue {
            messages.push(json!(turn));
        }

        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if allow_function_call {
            body["functions"] = json!([query_function_descriptor()]);
            body["function_call"] = json!("auto");
        }
        body
    }
}

fn query_function_descriptor() -> Value {
    json!({
        "name": QUERY_FUNCTION_NAME,
        "description": "Run a read-only SQL query against the inventory data",
        "parameters": {
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "SQL query (SELECT only)"
                }
            },
            "required": ["query"]
        }
    })
}

#[derive(Debug, Deserialize)]
struct ChatCompletionReply {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    function_call: Option<WireFunctionCall>,
}

#[derive(Debug, Deserialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

fn outcome_from_reply(reply: ChatCompletionReply) -> Result<CompletionOutcome, CompletionError> {
    let choice = reply
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| CompletionError::MalformedReply("reply contained no choices".to_string()))?;

    if let Some(call) = choice.message.function_call {
        return Ok(CompletionOutcome::FunctionInvocation {
            name: call.name,
            arguments: call.arguments,
        });
    }

    match choice.message.content {
        Some(content) => Ok(CompletionOutcome::DirectReply(content)),
        None => Err(CompletionError::MalformedReply(
            "assistant message had neither content nor a function call".to_string(),
        )),
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompletionClient {
    async fn complete(
        &self,
        dialogue: &[Turn],
        allow_function_call: bool,
    ) -> Result<CompletionOutcome, CompletionError> {
        let body = self.request_body(dialogue, allow_function_call);
        debug!(
            event_name = "llm.completion.request",
            model = %self.model,
            turns = dialogue.len(),
            function_calling = allow_function_call,
            "sending completion request"
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url.trim_end_matches('/')))
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status: status.as_u16(), body });
        }

        let reply = response.json::<ChatCompletionReply>().await?;
        outcome_from_reply(reply)
    }
}
