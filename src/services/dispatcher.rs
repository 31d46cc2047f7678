use crate::constants::limits::{LOG_BODY_PREVIEW_BYTES, MAX_TOOL_SUGGESTIONS};
use crate::errors::ToolError;
use crate::services::endpoint::resolve;
use crate::services::mapping::MappingSet;
use crate::services::shaper::shape;
use crate::services::transport::{HttpTransport, TransportError, UpstreamResponse};
use crate::services::validation::Validation;
use crate::utils::suggest::closest_names;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn, Instrument};

/// Lifecycle of one invocation; `Failed` is reachable from every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Received,
    Validated,
    Resolved,
    Called,
    Shaped,
    Done,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Validated => "validated",
            Stage::Resolved => "resolved",
            Stage::Called => "called",
            Stage::Shaped => "shaped",
            Stage::Done => "done",
            Stage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What the protocol host needs to advertise a tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    pub param_types: BTreeMap<String, String>,
}

/// Runs tool invocations against the downstream service.
///
/// Holds only shared immutable state, so clones are cheap and any number of
/// invocations may run concurrently.
#[derive(Clone)]
pub struct ToolDispatcher {
    mappings: Arc<MappingSet>,
    transport: Arc<dyn HttpTransport>,
    validation: Validation,
    timeout: Duration,
}

impl ToolDispatcher {
    pub fn new(
        mappings: Arc<MappingSet>,
        transport: Arc<dyn HttpTransport>,
        timeout: Duration,
    ) -> Self {
        Self {
            mappings,
            transport,
            validation: Validation::new(),
            timeout,
        }
    }

    pub fn mappings(&self) -> &MappingSet {
        &self.mappings
    }

    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.mappings
            .tools()
            .map(|(name, mapping)| {
                let param_types = mapping
                    .required_params
                    .iter()
                    .chain(mapping.optional_params.iter())
                    .map(|param| (param.clone(), mapping.type_of(param).to_string()))
                    .collect();
                ToolDescriptor {
                    name: name.clone(),
                    description: mapping.description.clone(),
                    required_params: mapping.required_params.clone(),
                    optional_params: mapping.optional_params.clone(),
                    param_types,
                }
            })
            .collect()
    }

    pub async fn invoke(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("invoke", tool = %tool_name, request_id = %request_id);
        let started = Instant::now();
        let result = self.run(tool_name, arguments).instrument(span.clone()).await;
        let _entered = span.enter();
        match &result {
            Ok(_) => info!(
                stage = %Stage::Done,
                duration_ms = started.elapsed().as_millis() as u64,
                "tool call completed"
            ),
            Err(err) if err.kind.is_client_error() => info!(
                stage = %Stage::Failed,
                kind = err.kind.as_str(),
                error = %err,
                "tool call rejected"
            ),
            Err(err) => warn!(
                stage = %Stage::Failed,
                kind = err.kind.as_str(),
                duration_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "tool call failed"
            ),
        }
        result
    }

    async fn run(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, ToolError> {
        debug!(stage = %Stage::Received, "looking up tool");
        let Some(mapping) = self.mappings.tool(tool_name) else {
            return Err(self.unknown_tool(tool_name));
        };

        let validated = self
            .validation
            .validate(mapping, arguments)
            .map_err(|err| at_stage(err, Stage::Validated))?;
        let ignored = self.validation.undeclared(mapping, arguments);
        if !ignored.is_empty() {
            debug!(ignored = ?ignored, "dropping undeclared arguments");
        }
        debug!(stage = %Stage::Validated, params = validated.len(), "arguments validated");

        let request = resolve(mapping, &validated).map_err(|err| at_stage(err, Stage::Resolved))?;
        debug!(
            stage = %Stage::Resolved,
            method = %request.method,
            path = %request.path,
            "endpoint resolved"
        );

        let response = self
            .call(&request)
            .await
            .map_err(|err| at_stage(err, Stage::Called))?;
        debug!(stage = %Stage::Called, status = response.status, "downstream answered");

        let body = response.body.unwrap_or(Value::Null);
        let parser = self.mappings.parser_for(mapping);
        if parser.is_none() {
            if let Some(name) = &mapping.response_parser {
                debug!(parser = %name, "parser not defined, passing body through");
            }
        }
        let shaped = shape(parser, &body);
        debug!(stage = %Stage::Shaped, "response shaped");
        Ok(shaped)
    }

    /// Exactly one downstream call, bounded by the dispatcher timeout.
    /// Dropping this future drops the transport future, which aborts the
    /// in-flight request.
    async fn call(
        &self,
        request: &crate::services::endpoint::ResolvedRequest,
    ) -> Result<UpstreamResponse, ToolError> {
        let sent = tokio::time::timeout(self.timeout, self.transport.send(request, self.timeout));
        let response = match sent.await {
            Err(_elapsed) => return Err(ToolError::upstream_timeout(self.timeout.as_millis())),
            Ok(Err(err)) => return Err(map_transport_error(err, self.timeout)),
            Ok(Ok(response)) => response,
        };
        if !response.is_success() {
            let body = response.body.clone().or_else(|| {
                let text = response.text.trim();
                (!text.is_empty()).then(|| Value::String(preview(text)))
            });
            return Err(ToolError::upstream_error(response.status, body));
        }
        Ok(response)
    }

    fn unknown_tool(&self, tool_name: &str) -> ToolError {
        let names = self.mappings.tool_names();
        let suggestions = closest_names(
            tool_name,
            names.iter().map(String::as_str),
            MAX_TOOL_SUGGESTIONS,
        );
        let hint = if suggestions.is_empty() {
            format!("Available tools: {}", names.join(", "))
        } else {
            format!("Did you mean: {}?", suggestions.join(", "))
        };
        ToolError::unknown_tool(tool_name)
            .with_hint(hint)
            .with_detail("did_you_mean", Value::from(suggestions))
            .with_detail("stage", Value::String(Stage::Received.to_string()))
    }
}

/// Records the stage that failed.
fn at_stage(err: ToolError, stage: Stage) -> ToolError {
    err.with_detail("stage", Value::String(stage.to_string()))
}

fn map_transport_error(err: TransportError, timeout: Duration) -> ToolError {
    match err {
        TransportError::Timeout => ToolError::upstream_timeout(timeout.as_millis()),
        TransportError::Unavailable(message) => ToolError::upstream_unavailable(message),
        TransportError::MalformedBody(message) => ToolError::upstream_unavailable(format!(
            "Downstream returned a malformed body: {}",
            message
        )),
        TransportError::InvalidUrl(message) => ToolError::internal(message),
    }
}

fn preview(text: &str) -> String {
    if text.len() <= LOG_BODY_PREVIEW_BYTES {
        return text.to_string();
    }
    let mut end = LOG_BODY_PREVIEW_BYTES;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}
