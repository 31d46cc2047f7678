use crate::errors::ToolError;
use crate::services::mapping::{parse_template, HttpMethod, TemplatePart, ToolMapping};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::Serialize;
use serde_json::{Map, Value};

/// Characters escaped inside one path segment (RFC 3986 `pchar` complement,
/// plus `/` so a value can never introduce extra segments).
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// Characters escaped in a value spliced into a literal query string.
const QUERY_COMPONENT: &AsciiSet = &PATH_SEGMENT.add(b'&').add(b'=').add(b'+');

/// A concrete downstream request, ready for the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedRequest {
    pub method: HttpMethod,
    pub path: String,
    pub query: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Map<String, Value>>,
}

/// String form of an argument as it appears in a URL.
pub fn render_scalar(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        Value::Number(num) => num.to_string(),
        Value::Bool(flag) => flag.to_string(),
        other => other.to_string(),
    }
}

/// Fills the endpoint template and splits the leftover arguments into a
/// query string or a JSON body depending on the method.
pub fn resolve(
    mapping: &ToolMapping,
    validated: &Map<String, Value>,
) -> Result<ResolvedRequest, ToolError> {
    let parts = parse_template(&mapping.endpoint).map_err(|reason| {
        ToolError::internal(format!("Malformed endpoint template: {}", reason))
    })?;

    let mut remaining = validated.clone();
    let mut path = String::with_capacity(mapping.endpoint.len());
    // Everything after the first literal `?` is a fixed query string.
    let mut literal_query: Option<String> = None;
    for part in parts {
        match part {
            TemplatePart::Literal(text) => {
                if let Some(query) = literal_query.as_mut() {
                    query.push_str(text);
                } else if let Some((before, after)) = text.split_once('?') {
                    path.push_str(before);
                    literal_query = Some(after.to_string());
                } else {
                    path.push_str(text);
                }
            }
            TemplatePart::Placeholder(name) => {
                let value = remaining
                    .remove(name)
                    .filter(|v| !v.is_null())
                    .ok_or_else(|| ToolError::unresolved_placeholder(name))?;
                let rendered = render_scalar(&value);
                match literal_query.as_mut() {
                    Some(query) => query.extend(utf8_percent_encode(&rendered, QUERY_COMPONENT)),
                    None => path.extend(utf8_percent_encode(&rendered, PATH_SEGMENT)),
                }
            }
        }
    }

    let mut query = Map::new();
    if let Some(raw) = literal_query {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(&raw).map_err(|err| {
            ToolError::internal(format!("Malformed query in endpoint template: {}", err))
        })?;
        for (key, value) in pairs {
            query.insert(key, Value::String(value));
        }
    }

    let body = if mapping.method.sends_body() {
        (!remaining.is_empty()).then_some(remaining)
    } else {
        // Call arguments override fixed pairs with the same name.
        query.extend(remaining);
        None
    };

    Ok(ResolvedRequest {
        method: mapping.method,
        path,
        query,
        body,
    })
}
