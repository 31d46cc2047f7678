use serde::Serialize;
use serde_json::Value;
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    MissingParameter,
    UnresolvedPlaceholder,
    UpstreamUnavailable,
    UpstreamTimeout,
    UpstreamError,
    Internal,
}

impl ToolErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ToolErrorKind::UnknownTool => "unknown_tool",
            ToolErrorKind::MissingParameter => "missing_parameter",
            ToolErrorKind::UnresolvedPlaceholder => "unresolved_placeholder",
            ToolErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ToolErrorKind::UpstreamTimeout => "upstream_timeout",
            ToolErrorKind::UpstreamError => "upstream_error",
            ToolErrorKind::Internal => "internal",
        }
    }

    /// Client errors are caused by the invocation itself; retrying the same
    /// call cannot succeed.
    pub fn is_client_error(self) -> bool {
        matches!(
            self,
            ToolErrorKind::UnknownTool
                | ToolErrorKind::MissingParameter
                | ToolErrorKind::UnresolvedPlaceholder
        )
    }
}

/// Per-invocation failure reported back to the calling agent.
#[derive(Debug, Clone, Serialize)]
pub struct ToolError {
    pub kind: ToolErrorKind,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    pub retryable: bool,
}

impl ToolError {
    pub fn new(kind: ToolErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
            status: None,
            hint: None,
            details: None,
            retryable: matches!(
                kind,
                ToolErrorKind::UpstreamUnavailable | ToolErrorKind::UpstreamTimeout
            ),
        }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Adds one key to the details object, creating it when needed.
    pub fn with_detail(mut self, key: &str, value: Value) -> Self {
        match self.details.as_mut() {
            Some(Value::Object(map)) => {
                map.insert(key.to_string(), value);
            }
            _ => {
                let mut map = serde_json::Map::new();
                map.insert(key.to_string(), value);
                self.details = Some(Value::Object(map));
            }
        }
        self
    }

    pub fn unknown_tool(name: &str) -> Self {
        Self::new(
            ToolErrorKind::UnknownTool,
            "UNKNOWN_TOOL",
            format!("Unknown tool: {}", name),
        )
        .with_detail("tool", Value::String(name.to_string()))
    }

    pub fn missing_parameter(name: &str) -> Self {
        Self::new(
            ToolErrorKind::MissingParameter,
            "MISSING_PARAMETER",
            format!("Missing required parameter: {}", name),
        )
        .with_detail("parameter", Value::String(name.to_string()))
    }

    pub fn unresolved_placeholder(name: &str) -> Self {
        Self::new(
            ToolErrorKind::UnresolvedPlaceholder,
            "UNRESOLVED_PLACEHOLDER",
            format!("No value for endpoint placeholder {{{}}}", name),
        )
        .with_detail("placeholder", Value::String(name.to_string()))
    }

    pub fn upstream_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            ToolErrorKind::UpstreamUnavailable,
            "UPSTREAM_UNAVAILABLE",
            message,
        )
    }

    pub fn upstream_timeout(timeout_ms: u128) -> Self {
        Self::new(
            ToolErrorKind::UpstreamTimeout,
            "UPSTREAM_TIMEOUT",
            format!("Downstream service did not answer within {} ms", timeout_ms),
        )
        .with_detail("timeout_ms", Value::from(timeout_ms as u64))
    }

    pub fn upstream_error(status: u16, body: Option<Value>) -> Self {
        let mut err = Self::new(
            ToolErrorKind::UpstreamError,
            "UPSTREAM_ERROR",
            format!("Downstream service returned HTTP {}", status),
        )
        .with_detail("status", Value::from(status));
        err.status = Some(status);
        err.retryable = status >= 500 || status == 429 || status == 408;
        if let Some(body) = body {
            err = err.with_detail("body", body);
        }
        err
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ToolErrorKind::Internal, "INTERNAL", message)
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ToolError {}
