use crate::app::App;
use crate::constants::server::PROTOCOL_VERSION;
use crate::errors::{ErrorCode, McpError, ToolError};
use crate::mcp::catalog::list_tools_result;
use crate::mcp::protocol::{JsonRpcRequest, JsonRpcResponse, ToolCallParams};
use crate::services::dispatcher::ToolDispatcher;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

fn render_tool_error(tool: &str, error: &ToolError) -> String {
    let mut lines = vec![
        "ToolError".to_string(),
        format!("tool: {}", tool),
        format!("kind: {}", error.kind.as_str()),
        format!("code: {}", error.code),
        format!("retryable: {}", error.retryable),
        format!("message: {}", error.message),
    ];
    if let Some(hint) = &error.hint {
        lines.push(format!("hint: {}", hint));
    }
    if let Some(details) = &error.details {
        lines.push(format!("details: {}", details));
    }
    lines.join("\n")
}

fn text_result(text: String, is_error: bool) -> Value {
    json!({
        "content": [ { "type": "text", "text": text } ],
        "isError": is_error,
    })
}

fn encode(response: &JsonRpcResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|err| {
        format!(
            r#"{{"jsonrpc":"2.0","id":null,"error":{{"code":{},"message":"failed to encode response: {}"}}}}"#,
            ErrorCode::InternalError.as_i32(),
            err
        )
    })
}

/// Running `tools/call` tasks keyed by their JSON-encoded request id.
///
/// The sequence number keeps a finished task from evicting a newer call that
/// reused its id.
#[derive(Default)]
struct InFlight {
    next_seq: u64,
    tasks: HashMap<String, (u64, AbortHandle)>,
}

type SharedInFlight = Arc<Mutex<InFlight>>;

fn lock(in_flight: &SharedInFlight) -> MutexGuard<'_, InFlight> {
    in_flight.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InFlight {
    fn finish(&mut self, key: &str, seq: u64) {
        if self.tasks.get(key).map(|(current, _)| *current) == Some(seq) {
            self.tasks.remove(key);
        }
    }

    fn cancel(&mut self, key: &str) -> bool {
        match self.tasks.remove(key) {
            Some((_, handle)) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    fn abort_all(&mut self) -> usize {
        let count = self.tasks.len();
        for (_, (_, handle)) in self.tasks.drain() {
            handle.abort();
        }
        count
    }
}

pub struct McpServer {
    dispatcher: ToolDispatcher,
    server_name: String,
    server_version: String,
}

impl McpServer {
    pub fn new(
        dispatcher: ToolDispatcher,
        server_name: impl Into<String>,
        server_version: impl Into<String>,
    ) -> Self {
        Self {
            dispatcher,
            server_name: server_name.into(),
            server_version: server_version.into(),
        }
    }

    pub fn from_app(app: &App) -> Self {
        Self::new(
            app.dispatcher.clone(),
            app.config.server_name.clone(),
            app.config.server_version.clone(),
        )
    }

    pub fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": self.server_name, "version": self.server_version },
        })
    }

    pub fn handle_tools_list(&self) -> Value {
        list_tools_result(&self.dispatcher.list_tools())
    }

    /// Tool failures become `isError` results; only malformed params are
    /// protocol errors.
    pub async fn handle_tools_call(&self, params: &Value) -> Result<Value, McpError> {
        let call = ToolCallParams::from_params(params)?;
        let arguments = call.arguments()?;
        let result = match self.dispatcher.invoke(&call.name, &arguments).await {
            Ok(value) => {
                let text = serde_json::to_string_pretty(&value)
                    .map_err(|err| McpError::new(ErrorCode::InternalError, err.to_string()))?;
                text_result(text, false)
            }
            Err(err) => text_result(render_tool_error(&call.name, &err), true),
        };
        Ok(result)
    }

    /// Parses one input line. `Err` carries the response for lines that are
    /// not a usable request.
    fn parse_line(line: &str) -> Result<JsonRpcRequest, JsonRpcResponse> {
        let parsed: Value = serde_json::from_str(line).map_err(|_| {
            JsonRpcResponse::failure(
                Value::Null,
                ErrorCode::ParseError.as_i32(),
                "Parse error".to_string(),
            )
        })?;
        let id = parsed.get("id").cloned().unwrap_or(Value::Null);
        let invalid = |id: Value| {
            JsonRpcResponse::failure(
                id,
                ErrorCode::InvalidRequest.as_i32(),
                "Invalid request".to_string(),
            )
        };
        let request: JsonRpcRequest =
            serde_json::from_value(parsed).map_err(|_| invalid(id.clone()))?;
        if request.jsonrpc != "2.0" {
            return Err(invalid(id));
        }
        Ok(request)
    }

    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        debug!(method = %request.method, "request received");
        let Some(id) = request.id.clone() else {
            // Notifications never get a response.
            return None;
        };
        let response = match request.method.as_str() {
            "initialize" => JsonRpcResponse::success(id, self.handle_initialize()),
            "ping" => JsonRpcResponse::success(id, json!({})),
            "notifications/initialized" => JsonRpcResponse::success(id, json!({})),
            "tools/list" => JsonRpcResponse::success(id, self.handle_tools_list()),
            "tools/call" => match self.handle_tools_call(&request.params).await {
                Ok(result) => JsonRpcResponse::success(id, result),
                Err(err) => JsonRpcResponse::from_error(id, err),
            },
            other => JsonRpcResponse::from_error(id, McpError::method_not_found(other)),
        };
        Some(response)
    }

    /// Spawns a `tools/call` and registers it for cancellation. Calls sent as
    /// notifications have no id and are not tracked.
    fn spawn_call(
        self: &Arc<Self>,
        request: JsonRpcRequest,
        tx: &UnboundedSender<String>,
        in_flight: &SharedInFlight,
    ) {
        let key = request.id.as_ref().map(Value::to_string);
        let server = Arc::clone(self);
        let tx = tx.clone();
        let registry = Arc::clone(in_flight);
        let task_key = key.clone();

        let mut calls = lock(in_flight);
        calls.next_seq += 1;
        let seq = calls.next_seq;
        let handle = tokio::spawn(async move {
            if let Some(response) = server.handle_request(request).await {
                let _ = tx.send(encode(&response));
            }
            if let Some(key) = task_key {
                lock(&registry).finish(&key, seq);
            }
        });
        if let Some(key) = key {
            calls.tasks.insert(key, (seq, handle.abort_handle()));
        }
    }

    fn cancel_call(params: &Value, in_flight: &SharedInFlight) {
        let Some(request_id) = params.get("requestId") else {
            warn!("cancellation without requestId ignored");
            return;
        };
        let key = request_id.to_string();
        if lock(in_flight).cancel(&key) {
            info!(request_id = %key, "tool call cancelled");
        } else {
            debug!(request_id = %key, "cancellation for unknown or finished call");
        }
    }

    /// Serves newline-delimited JSON-RPC until `reader` hits EOF.
    ///
    /// Each `tools/call` runs in its own task so slow downstream calls do not
    /// block the loop. `notifications/cancelled` aborts the named call, and EOF
    /// aborts every call still running. Responses go through a single writer
    /// task that finishes once all senders are gone.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(async move {
            let mut writer = BufWriter::new(writer);
            while let Some(payload) = rx.recv().await {
                writer.write_all(payload.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
            Ok::<(), io::Error>(())
        });
        let in_flight = SharedInFlight::default();

        let mut lines = BufReader::new(reader).lines();
        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let request = match Self::parse_line(trimmed) {
                Ok(request) => request,
                Err(response) => {
                    warn!("rejecting malformed message");
                    let _ = tx.send(encode(&response));
                    continue;
                }
            };

            if request.method == "notifications/cancelled" {
                Self::cancel_call(&request.params, &in_flight);
            } else if request.method == "tools/call" {
                self.spawn_call(request, &tx, &in_flight);
            } else if let Some(response) = self.handle_request(request).await {
                let _ = tx.send(encode(&response));
            }
        }

        let aborted = lock(&in_flight).abort_all();
        debug!(aborted, "input closed, in-flight calls aborted");
        drop(tx);
        writer_task
            .await
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?
    }

    pub async fn run_stdio(self: Arc<Self>) -> io::Result<()> {
        info!(
            server = %self.server_name,
            version = %self.server_version,
            tools = self.dispatcher.mappings().tool_count(),
            "serving MCP over stdio"
        );
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }
}
