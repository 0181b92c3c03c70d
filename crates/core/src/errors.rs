use serde::Serialize;

/// Failure taxonomy for the query gateway. Every request-level failure is
/// classified into exactly one category; the server performs the single
/// translation from category to HTTP status and response body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    #[serde(rename = "bad-request")]
    BadRequest,
    #[serde(rename = "completion-error")]
    CompletionFailure,
    #[serde(rename = "bad-function-args")]
    BadFunctionArgs,
    #[serde(rename = "unsafe-query")]
    UnsafeQuery,
    #[serde(rename = "execution-error")]
    ExecutionFailure,
    #[serde(rename = "summarization-error")]
    SummarizationFailure,
    #[serde(rename = "internal-error")]
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad-request",
            Self::CompletionFailure => "completion-error",
            Self::BadFunctionArgs => "bad-function-args",
            Self::UnsafeQuery => "unsafe-query",
            Self::ExecutionFailure => "execution-error",
            Self::SummarizationFailure => "summarization-error",
            Self::Internal => "internal-error",
        }
    }

    /// Whether the failure is attributable to the caller's request rather
    /// than the gateway or its collaborators. A malformed function-call
    /// payload counts as a provider-side failure: the caller's request was
    /// well-formed, the provider's reply was not.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::BadRequest | Self::UnsafeQuery)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
