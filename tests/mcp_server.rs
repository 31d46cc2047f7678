mod common;
use common::{wait_until, RecordingTransport, Reply};

use restbridge::mcp::server::McpServer;
use restbridge::services::default_mappings::default_mapping_set;
use restbridge::services::dispatcher::ToolDispatcher;
use serde_json::{json, Value};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines};
use tokio::task::JoinHandle;

fn server_with(transport: Arc<RecordingTransport>, timeout: Duration) -> Arc<McpServer> {
    let dispatcher = ToolDispatcher::new(Arc::new(default_mapping_set()), transport, timeout);
    Arc::new(McpServer::new(dispatcher, "product-info-server", "9.9.9"))
}

fn server(reply: Reply) -> Arc<McpServer> {
    server_with(RecordingTransport::new(reply), Duration::from_secs(5))
}

/// A client attached to a running stdio loop.
struct Session {
    input: Option<DuplexStream>,
    output: Lines<BufReader<DuplexStream>>,
    serving: JoinHandle<io::Result<()>>,
}

impl Session {
    fn start(server: Arc<McpServer>) -> Self {
        let (input, server_input) = tokio::io::duplex(1 << 20);
        let (server_output, output) = tokio::io::duplex(1 << 20);
        let serving = tokio::spawn(server.serve(server_input, server_output));
        Self {
            input: Some(input),
            output: BufReader::new(output).lines(),
            serving,
        }
    }

    async fn send(&mut self, line: &str) {
        let input = self.input.as_mut().expect("input open");
        input.write_all(line.as_bytes()).await.expect("write");
        input.write_all(b"\n").await.expect("write");
    }

    async fn recv(&mut self) -> Value {
        let line = tokio::time::timeout(Duration::from_secs(5), self.output.next_line())
            .await
            .expect("response in time")
            .expect("read")
            .expect("output open");
        serde_json::from_str(&line).expect("response is JSON")
    }

    /// Closes input, waits for the loop to exit and returns anything written
    /// after the last `recv`.
    async fn close(mut self, within: Duration) -> Vec<Value> {
        drop(self.input.take());
        tokio::time::timeout(within, &mut self.serving)
            .await
            .expect("serve returns after EOF")
            .expect("join")
            .expect("serve");
        let mut rest = Vec::new();
        while let Some(line) = self.output.next_line().await.expect("read") {
            rest.push(serde_json::from_str(&line).expect("response is JSON"));
        }
        rest
    }
}

/// Sends `lines`, collects `expected` responses, then closes the session.
async fn exchange(server: Arc<McpServer>, lines: &[&str], expected: usize) -> Vec<Value> {
    let mut session = Session::start(server);
    for line in lines {
        session.send(line).await;
    }
    let mut responses = Vec::new();
    for _ in 0..expected {
        responses.push(session.recv().await);
    }
    let rest = session.close(Duration::from_secs(5)).await;
    assert!(rest.is_empty(), "unexpected responses: {:?}", rest);
    responses
}

fn by_id(responses: &[Value], id: i64) -> &Value {
    responses
        .iter()
        .find(|r| r["id"] == json!(id))
        .unwrap_or_else(|| panic!("no response for id {}", id))
}

#[tokio::test]
async fn initialize_reports_server_info() {
    let responses = exchange(
        server(Reply::Json(200, json!({}))),
        &[r#"{"jsonrpc":"2.0","id":1,"method":"initialize","params":{}}"#],
        1,
    )
    .await;
    let result = &by_id(&responses, 1)["result"];
    assert_eq!(result["serverInfo"]["name"], "product-info-server");
    assert_eq!(result["serverInfo"]["version"], "9.9.9");
    assert!(result["capabilities"]["tools"].is_object());
}

#[tokio::test]
async fn tools_list_exposes_input_schemas() {
    let responses = exchange(
        server(Reply::Json(200, json!({}))),
        &[r#"{"jsonrpc":"2.0","id":2,"method":"tools/list"}"#],
        1,
    )
    .await;
    let tools = by_id(&responses, 2)["result"]["tools"]
        .as_array()
        .cloned()
        .expect("tools array");
    assert_eq!(tools.len(), 4);
    let product = tools
        .iter()
        .find(|t| t["name"] == "get_product")
        .expect("get_product");
    assert_eq!(product["inputSchema"]["required"], json!(["product_id"]));
    assert_eq!(
        product["inputSchema"]["properties"]["product_id"]["type"],
        "string"
    );
}

#[tokio::test]
async fn tools_call_returns_shaped_text_content() {
    let responses = exchange(
        server(Reply::Json(
            200,
            json!({"categories": [{"id": "c1", "name": "Books", "count": 3}]}),
        )),
        &[r#"{"jsonrpc":"2.0","id":3,"method":"tools/call","params":{"name":"get_categories","arguments":{}}}"#],
        1,
    )
    .await;
    let result = &by_id(&responses, 3)["result"];
    assert_eq!(result["isError"], false);
    let text = result["content"][0]["text"].as_str().expect("text");
    let payload: Value = serde_json::from_str(text).expect("payload");
    assert_eq!(payload, json!([{"id": "c1", "name": "Books"}]));
}

#[tokio::test]
async fn tool_failures_are_results_and_the_server_keeps_going() {
    let input = [
        r#"{"jsonrpc":"2.0","id":4,"method":"tools/call","params":{"name":"weather","arguments":{}}}"#,
        r#"{"jsonrpc":"2.0","id":5,"method":"tools/call","params":{"name":"get_product","arguments":{}}}"#,
        r#"{"jsonrpc":"2.0","id":6,"method":"ping"}"#,
    ];
    let responses = exchange(server(Reply::Json(200, json!({}))), &input, 3).await;

    let unknown = &by_id(&responses, 4)["result"];
    assert_eq!(unknown["isError"], true);
    assert!(unknown["content"][0]["text"]
        .as_str()
        .expect("text")
        .contains("UNKNOWN_TOOL"));

    let missing = &by_id(&responses, 5)["result"];
    assert_eq!(missing["isError"], true);
    assert!(missing["content"][0]["text"]
        .as_str()
        .expect("text")
        .contains("MISSING_PARAMETER"));

    assert_eq!(by_id(&responses, 6)["result"], json!({}));
}

#[tokio::test]
async fn protocol_errors_use_json_rpc_codes() {
    let input = [
        "{broken",
        r#"{"jsonrpc":"2.0","id":7,"method":"resources/list"}"#,
        r#"{"jsonrpc":"2.0","id":8,"method":"tools/call","params":{"arguments":{}}}"#,
        r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#,
    ];
    // `exchange` fails on any fourth response, so the notification got none.
    let responses = exchange(server(Reply::Json(200, json!({}))), &input, 3).await;

    let parse_error = responses
        .iter()
        .find(|r| r["id"].is_null())
        .expect("parse error response");
    assert_eq!(parse_error["error"]["code"], -32700);
    assert_eq!(by_id(&responses, 7)["error"]["code"], -32601);
    assert_eq!(by_id(&responses, 8)["error"]["code"], -32602);
}

fn call_line(id: i64, product_id: &str) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","id":{},"method":"tools/call","params":{{"name":"get_product","arguments":{{"product_id":"{}"}}}}}}"#,
        id, product_id
    )
}

#[tokio::test]
async fn concurrent_calls_all_answer() {
    let mut session = Session::start(server(Reply::Json(200, json!({"id": "p", "name": "Pen"}))));
    for id in 10..15 {
        session.send(&call_line(id, &id.to_string())).await;
    }
    let mut responses = Vec::new();
    for _ in 10..15 {
        responses.push(session.recv().await);
    }
    for id in 10..15 {
        assert_eq!(by_id(&responses, id)["result"]["isError"], false);
    }
    assert!(session.close(Duration::from_secs(5)).await.is_empty());
}

#[tokio::test]
async fn input_eof_aborts_in_flight_calls() {
    let transport = RecordingTransport::new(Reply::Hang);
    let mut session = Session::start(server_with(transport.clone(), Duration::from_secs(60)));
    session.send(&call_line(1, "slow")).await;
    session.send(&call_line(2, "slower")).await;
    assert!(wait_until(Duration::from_secs(2), || transport.calls().len() == 2).await);

    let rest = session.close(Duration::from_secs(2)).await;
    assert!(rest.is_empty(), "aborted calls must not answer: {:?}", rest);
    assert_eq!(transport.abandoned(), 2);
}

#[tokio::test]
async fn cancelled_notification_aborts_the_named_call() {
    let transport = RecordingTransport::new(Reply::Hang);
    let mut session = Session::start(server_with(transport.clone(), Duration::from_secs(60)));
    session.send(&call_line(1, "slow")).await;
    assert!(wait_until(Duration::from_secs(2), || transport.calls().len() == 1).await);

    session
        .send(r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":1,"reason":"user"}}"#)
        .await;
    assert!(wait_until(Duration::from_secs(2), || transport.abandoned() == 1).await);

    session.send(r#"{"jsonrpc":"2.0","id":2,"method":"ping"}"#).await;
    let pong = session.recv().await;
    assert_eq!(pong["id"], 2);
    assert_eq!(pong["result"], json!({}));

    let rest = session.close(Duration::from_secs(2)).await;
    assert!(rest.is_empty(), "cancelled call must not answer: {:?}", rest);
}

#[tokio::test]
async fn cancelling_an_unknown_id_is_ignored() {
    let responses = exchange(
        server(Reply::Json(200, json!({}))),
        &[
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{"requestId":"nope"}}"#,
            r#"{"jsonrpc":"2.0","method":"notifications/cancelled","params":{}}"#,
            r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#,
        ],
        1,
    )
    .await;
    assert_eq!(responses[0]["id"], 3);
}
