use crate::services::dispatcher::ToolDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl From<&ToolDescriptor> for ToolDef {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            name: tool.name.clone(),
            description: tool.description.clone(),
            input_schema: input_schema(tool),
        }
    }
}

/// JSON Schema object describing a tool's arguments.
pub fn input_schema(tool: &ToolDescriptor) -> Value {
    let mut properties = Map::new();
    for name in tool.required_params.iter().chain(tool.optional_params.iter()) {
        let ty = tool
            .param_types
            .get(name)
            .map(String::as_str)
            .unwrap_or("string");
        properties.insert(name.clone(), json!({ "type": ty }));
    }
    json!({
        "type": "object",
        "properties": properties,
        "required": tool.required_params,
    })
}

pub fn tool_catalog(tools: &[ToolDescriptor]) -> Vec<ToolDef> {
    tools.iter().map(ToolDef::from).collect()
}

pub fn list_tools_result(tools: &[ToolDescriptor]) -> Value {
    json!({ "tools": tool_catalog(tools) })
}
