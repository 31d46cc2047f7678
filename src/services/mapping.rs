use crate::errors::MappingError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

static PARAM_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("parameter name pattern must compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// POST and PUT carry leftover arguments as a JSON body; GET and DELETE
    /// carry them in the query string.
    pub fn sends_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put)
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "DELETE" => Ok(HttpMethod::Delete),
            other => Err(format!(
                "unsupported HTTP method '{}', expected one of GET, POST, PUT, DELETE",
                other
            )),
        }
    }
}

/// One piece of an endpoint template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplatePart<'a> {
    Literal(&'a str),
    Placeholder(&'a str),
}

/// Splits an endpoint template into literal text and `{name}` placeholders.
pub fn parse_template(endpoint: &str) -> Result<Vec<TemplatePart<'_>>, String> {
    let mut parts = Vec::new();
    let mut rest = endpoint;
    while !rest.is_empty() {
        let open = rest.find('{');
        let close = rest.find('}');
        match (open, close) {
            (None, None) => {
                parts.push(TemplatePart::Literal(rest));
                break;
            }
            (None, Some(_)) => return Err("unmatched '}' in endpoint".to_string()),
            (Some(start), close) => {
                if close.map(|idx| idx < start).unwrap_or(false) {
                    return Err("unmatched '}' in endpoint".to_string());
                }
                if start > 0 {
                    parts.push(TemplatePart::Literal(&rest[..start]));
                }
                let tail = &rest[start + 1..];
                let end = tail
                    .find('}')
                    .ok_or_else(|| "unclosed '{' in endpoint".to_string())?;
                let name = &tail[..end];
                if name.contains('{') {
                    return Err("nested '{' in endpoint".to_string());
                }
                let name = name.trim();
                if name.is_empty() {
                    return Err("empty placeholder '{}' in endpoint".to_string());
                }
                parts.push(TemplatePart::Placeholder(name));
                rest = &tail[end + 1..];
            }
        }
    }
    Ok(parts)
}

/// Placeholder names of an endpoint template, in order of appearance.
pub fn endpoint_placeholders(endpoint: &str) -> Result<Vec<String>, String> {
    Ok(parse_template(endpoint)?
        .into_iter()
        .filter_map(|part| match part {
            TemplatePart::Placeholder(name) => Some(name.to_string()),
            TemplatePart::Literal(_) => None,
        })
        .collect())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolMapping {
    pub endpoint: String,
    pub method: HttpMethod,
    pub description: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_parser: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub param_types: BTreeMap<String, String>,
}

impl ToolMapping {
    pub fn new(endpoint: impl Into<String>, method: HttpMethod) -> Self {
        Self {
            endpoint: endpoint.into(),
            method,
            description: String::new(),
            required_params: Vec::new(),
            optional_params: Vec::new(),
            response_parser: None,
            param_types: BTreeMap::new(),
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn required(mut self, names: &[&str]) -> Self {
        self.required_params = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn optional(mut self, names: &[&str]) -> Self {
        self.optional_params = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn parser(mut self, name: impl Into<String>) -> Self {
        self.response_parser = Some(name.into());
        self
    }

    pub fn param_type(mut self, name: &str, json_type: &str) -> Self {
        self.param_types
            .insert(name.to_string(), json_type.to_string());
        self
    }

    pub fn declares(&self, name: &str) -> bool {
        self.required_params.iter().any(|p| p == name)
            || self.optional_params.iter().any(|p| p == name)
    }

    /// JSON Schema type used when describing a parameter to the agent.
    pub fn type_of(&self, name: &str) -> &str {
        self.param_types
            .get(name)
            .map(|s| s.as_str())
            .unwrap_or("string")
    }

    /// Load-time invariants: well-formed template, every placeholder is a
    /// required parameter, required and optional sets are disjoint.
    pub fn check(&self, tool: &str) -> Result<(), MappingError> {
        let invalid = |reason: String| MappingError::InvalidMapping {
            tool: tool.to_string(),
            reason,
        };
        if self.endpoint.trim().is_empty() {
            return Err(invalid("endpoint is empty".to_string()));
        }
        if self.endpoint.contains('#') {
            return Err(invalid("endpoint must not contain a fragment".to_string()));
        }
        let placeholders = endpoint_placeholders(&self.endpoint).map_err(invalid)?;

        let mut seen = BTreeSet::new();
        for name in self.required_params.iter().chain(self.optional_params.iter()) {
            if !PARAM_NAME.is_match(name) {
                return Err(invalid(format!("'{}' is not a valid parameter name", name)));
            }
            if !seen.insert(name.as_str()) {
                return Err(invalid(format!(
                    "parameter '{}' is declared more than once",
                    name
                )));
            }
        }

        for placeholder in placeholders {
            if self.required_params.iter().any(|p| *p == placeholder) {
                continue;
            }
            let reason = if self.optional_params.iter().any(|p| *p == placeholder) {
                format!(
                    "placeholder {{{}}} refers to an optional parameter; path parameters must be required",
                    placeholder
                )
            } else {
                format!(
                    "placeholder {{{}}} is not a declared parameter",
                    placeholder
                )
            };
            return Err(invalid(reason));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseParser {
    SingleItem {
        id_field: String,
        data_fields: Vec<String>,
    },
    List {
        list_field: String,
        item_fields: Vec<String>,
    },
}

impl ResponseParser {
    pub fn single_item(id_field: &str, data_fields: &[&str]) -> Self {
        ResponseParser::SingleItem {
            id_field: id_field.to_string(),
            data_fields: data_fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn list(list_field: &str, item_fields: &[&str]) -> Self {
        ResponseParser::List {
            list_field: list_field.to_string(),
            item_fields: item_fields.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn check(&self, name: &str) -> Result<(), MappingError> {
        let (key_label, key, fields) = match self {
            ResponseParser::SingleItem {
                id_field,
                data_fields,
            } => ("id_field", id_field, data_fields),
            ResponseParser::List {
                list_field,
                item_fields,
            } => ("list_field", list_field, item_fields),
        };
        if key.trim().is_empty() {
            return Err(MappingError::InvalidParser {
                parser: name.to_string(),
                reason: format!("{} is empty", key_label),
            });
        }
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(MappingError::InvalidParser {
                parser: name.to_string(),
                reason: "field names must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// The active, immutable tool configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MappingSet {
    tools: BTreeMap<String, ToolMapping>,
    parsers: BTreeMap<String, ResponseParser>,
}

impl MappingSet {
    pub fn new(
        tools: BTreeMap<String, ToolMapping>,
        parsers: BTreeMap<String, ResponseParser>,
    ) -> Result<Self, MappingError> {
        let set = Self { tools, parsers };
        set.validate()?;
        Ok(set)
    }

    /// Skips validation; only for sets that are well-formed by construction.
    pub(crate) fn trusted(
        tools: BTreeMap<String, ToolMapping>,
        parsers: BTreeMap<String, ResponseParser>,
    ) -> Self {
        Self { tools, parsers }
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        for (name, mapping) in &self.tools {
            mapping.check(name)?;
        }
        for (name, parser) in &self.parsers {
            parser.check(name)?;
        }
        Ok(())
    }

    pub fn tool(&self, name: &str) -> Option<&ToolMapping> {
        self.tools.get(name)
    }

    pub fn parser(&self, name: &str) -> Option<&ResponseParser> {
        self.parsers.get(name)
    }

    /// The parser a mapping names, when that name resolves.
    pub fn parser_for(&self, mapping: &ToolMapping) -> Option<&ResponseParser> {
        mapping
            .response_parser
            .as_deref()
            .and_then(|name| self.parsers.get(name))
    }

    pub fn tools(&self) -> impl Iterator<Item = (&String, &ToolMapping)> {
        self.tools.iter()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Parser names referenced by a tool but not defined in the set.
    pub fn dangling_parsers(&self) -> Vec<(String, String)> {
        self.tools
            .iter()
            .filter_map(|(tool, mapping)| {
                let parser = mapping.response_parser.as_ref()?;
                if self.parsers.contains_key(parser) {
                    None
                } else {
                    Some((tool.clone(), parser.clone()))
                }
            })
            .collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    pub fn parser_count(&self) -> usize {
        self.parsers.len()
    }
}
