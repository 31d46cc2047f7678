use crate::constants::mappings::{FILE_NAMES, PARSERS_PREFIX};
use crate::errors::MappingError;
use crate::services::default_mappings::default_mapping_set;
use crate::services::mapping::{HttpMethod, MappingSet, ResponseParser, ToolMapping};
use crate::utils::properties::{parse_properties, split_list};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingFormat {
    Yaml,
    Json,
    Properties,
}

impl MappingFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "yaml" | "yml" => Some(MappingFormat::Yaml),
            "json" => Some(MappingFormat::Json),
            "properties" => Some(MappingFormat::Properties),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MappingFormat::Yaml => "yaml",
            MappingFormat::Json => "json",
            MappingFormat::Properties => "properties",
        }
    }
}

/// Where the active mapping set came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingSource {
    Explicit { path: PathBuf, format: MappingFormat },
    Discovered { path: PathBuf, format: MappingFormat },
    Defaults,
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MappingSource::Explicit { path, format } => {
                write!(f, "{} ({}, explicit)", path.display(), format.as_str())
            }
            MappingSource::Discovered { path, format } => {
                write!(f, "{} ({})", path.display(), format.as_str())
            }
            MappingSource::Defaults => f.write_str("built-in defaults"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadedMappings {
    pub set: MappingSet,
    pub source: MappingSource,
}

/// Shared shape of every mapping encoding before normalization.
#[derive(Debug, Default, Deserialize)]
pub struct RawMappingDocument {
    #[serde(default)]
    pub mappings: BTreeMap<String, RawToolMapping>,
    #[serde(default)]
    pub response_parsers: BTreeMap<String, RawResponseParser>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RawToolMapping {
    pub endpoint: Option<String>,
    pub method: Option<String>,
    pub description: Option<String>,
    pub required_params: Option<Vec<String>>,
    pub optional_params: Option<Vec<String>>,
    pub response_parser: Option<String>,
    pub param_types: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawResponseParser {
    SingleItem {
        id_field: String,
        #[serde(default)]
        data_fields: Vec<String>,
    },
    List {
        list_field: String,
        #[serde(default)]
        item_fields: Vec<String>,
    },
}

impl From<RawResponseParser> for ResponseParser {
    fn from(raw: RawResponseParser) -> Self {
        match raw {
            RawResponseParser::SingleItem {
                id_field,
                data_fields,
            } => ResponseParser::SingleItem {
                id_field,
                data_fields,
            },
            RawResponseParser::List {
                list_field,
                item_fields,
            } => ResponseParser::List {
                list_field,
                item_fields,
            },
        }
    }
}

impl RawMappingDocument {
    pub fn parse(path: &Path, format: MappingFormat, text: &str) -> Result<Self, MappingError> {
        match format {
            MappingFormat::Yaml => serde_yaml::from_str(text).map_err(|source| MappingError::Yaml {
                path: path.to_path_buf(),
                source,
            }),
            MappingFormat::Json => serde_json::from_str(text).map_err(|source| MappingError::Json {
                path: path.to_path_buf(),
                source,
            }),
            MappingFormat::Properties => Self::from_properties(path, text),
        }
    }

    /// Builds the document from `<tool>.<field>=value` and
    /// `response_parsers.<name>.<field>=value` lines.
    pub fn from_properties(path: &Path, text: &str) -> Result<Self, MappingError> {
        let syntax = |line: usize, message: String| MappingError::Properties {
            path: path.to_path_buf(),
            line,
            message,
        };
        let lines = parse_properties(text).map_err(|err| syntax(err.line, err.message))?;

        let mut doc = RawMappingDocument::default();
        let mut parser_fields: BTreeMap<String, Map<String, Value>> = BTreeMap::new();

        for entry in lines {
            let Some((head, field)) = entry.key.split_once('.') else {
                return Err(syntax(
                    entry.line,
                    format!("key '{}' must look like '<tool>.<field>'", entry.key),
                ));
            };

            if head == PARSERS_PREFIX {
                let Some((parser, parser_field)) = field.split_once('.') else {
                    return Err(syntax(
                        entry.line,
                        format!("key '{}' must look like '{}.<name>.<field>'", entry.key, PARSERS_PREFIX),
                    ));
                };
                let value = match parser_field {
                    "data_fields" | "item_fields" => Value::from(split_list(&entry.value)),
                    _ => Value::String(entry.value.clone()),
                };
                parser_fields
                    .entry(parser.to_string())
                    .or_default()
                    .insert(parser_field.to_string(), value);
                continue;
            }

            let tool = doc.mappings.entry(head.to_string()).or_default();
            match field {
                "endpoint" => tool.endpoint = Some(entry.value),
                "method" => tool.method = Some(entry.value),
                "description" => tool.description = Some(entry.value),
                "required_params" => tool.required_params = Some(split_list(&entry.value)),
                "optional_params" => tool.optional_params = Some(split_list(&entry.value)),
                "response_parser" => tool.response_parser = Some(entry.value),
                other => match other.strip_prefix("param_types.") {
                    Some(param) if !param.is_empty() => {
                        tool.param_types
                            .get_or_insert_with(BTreeMap::new)
                            .insert(param.to_string(), entry.value);
                    }
                    _ => {
                        return Err(syntax(
                            entry.line,
                            format!("unknown field '{}' for tool '{}'", other, head),
                        ))
                    }
                },
            }
        }

        for (name, fields) in parser_fields {
            let parser = serde_json::from_value::<RawResponseParser>(Value::Object(fields))
                .map_err(|err| MappingError::InvalidParser {
                    parser: name.clone(),
                    reason: err.to_string(),
                })?;
            doc.response_parsers.insert(name, parser);
        }
        Ok(doc)
    }

    /// Applies defaults and checks every invariant. Any failure rejects the
    /// whole document.
    pub fn into_mapping_set(self, path: &Path) -> Result<MappingSet, MappingError> {
        if self.mappings.is_empty() {
            return Err(MappingError::Empty {
                path: path.to_path_buf(),
            });
        }

        let mut tools = BTreeMap::new();
        for (name, raw) in self.mappings {
            let invalid = |reason: String| MappingError::InvalidMapping {
                tool: name.clone(),
                reason,
            };
            let endpoint = raw
                .endpoint
                .filter(|e| !e.trim().is_empty())
                .ok_or_else(|| invalid("endpoint is missing".to_string()))?;
            let method = match raw.method.as_deref() {
                None => HttpMethod::Get,
                Some(method) => method.parse::<HttpMethod>().map_err(invalid)?,
            };
            let description = raw
                .description
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| format!("Tool: {}", name));

            let mapping = ToolMapping {
                endpoint: endpoint.trim().to_string(),
                method,
                description,
                required_params: dedup(raw.required_params.unwrap_or_default()),
                optional_params: dedup(raw.optional_params.unwrap_or_default()),
                response_parser: raw.response_parser.filter(|p| !p.trim().is_empty()),
                param_types: raw.param_types.unwrap_or_default(),
            };
            tools.insert(name, mapping);
        }

        let parsers = self
            .response_parsers
            .into_iter()
            .map(|(name, raw)| (name, ResponseParser::from(raw)))
            .collect();
        MappingSet::new(tools, parsers)
    }
}

/// Trims names and drops repeats, keeping the first occurrence.
fn dedup(names: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    names
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

/// Picks the active mapping set from the first usable source.
#[derive(Debug, Clone)]
pub struct MappingLoader {
    config_dir: PathBuf,
}

impl MappingLoader {
    pub fn new(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    /// Mapping files present in the config directory, in discovery order.
    pub fn candidates(&self) -> Vec<PathBuf> {
        FILE_NAMES
            .iter()
            .map(|name| self.config_dir.join(name))
            .filter(|path| path.is_file())
            .collect()
    }

    /// Never fails: unusable sources are logged and skipped, and the
    /// built-in defaults are the last resort.
    pub fn load(&self, explicit: Option<&Path>) -> LoadedMappings {
        if let Some(path) = explicit {
            if path.is_file() {
                match Self::load_file(path) {
                    Ok((set, format)) => {
                        return self.selected(set, MappingSource::Explicit {
                            path: path.to_path_buf(),
                            format,
                        })
                    }
                    Err(err) => warn!(error = %err, "skipping mapping source"),
                }
            } else {
                warn!(path = %path.display(), "explicit mapping file not found");
            }
        }

        for name in FILE_NAMES {
            let path = self.config_dir.join(name);
            if !path.is_file() {
                debug!(path = %path.display(), "mapping file not present");
                continue;
            }
            match Self::load_file(&path) {
                Ok((set, format)) => {
                    return self.selected(set, MappingSource::Discovered { path, format })
                }
                Err(err) => warn!(error = %err, "skipping mapping source"),
            }
        }

        self.selected(default_mapping_set(), MappingSource::Defaults)
    }

    pub fn load_file(path: &Path) -> Result<(MappingSet, MappingFormat), MappingError> {
        let format = MappingFormat::from_path(path).ok_or_else(|| MappingError::UnsupportedFormat {
            path: path.to_path_buf(),
        })?;
        let text = fs::read_to_string(path).map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let set = RawMappingDocument::parse(path, format, &text)?.into_mapping_set(path)?;
        Ok((set, format))
    }

    fn selected(&self, set: MappingSet, source: MappingSource) -> LoadedMappings {
        for (tool, parser) in set.dangling_parsers() {
            warn!(tool = %tool, parser = %parser, "response parser not defined; raw bodies will pass through");
        }
        info!(
            source = %source,
            tools = set.tool_count(),
            parsers = set.parser_count(),
            "tool mappings loaded"
        );
        LoadedMappings { set, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> PathBuf {
        PathBuf::from("tool_mappings.properties")
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            MappingFormat::from_path(Path::new("a/tool_mappings.YML")),
            Some(MappingFormat::Yaml)
        );
        assert_eq!(
            MappingFormat::from_path(Path::new("m.properties")),
            Some(MappingFormat::Properties)
        );
        assert_eq!(MappingFormat::from_path(Path::new("m.toml")), None);
        assert_eq!(MappingFormat::from_path(Path::new("mappings")), None);
    }

    #[test]
    fn properties_fill_defaults() {
        let doc = RawMappingDocument::from_properties(
            &path(),
            "ping.endpoint=/api/ping\nping.required_params=a, b, a\n",
        )
        .expect("parse");
        let set = doc.into_mapping_set(&path()).expect("valid");
        let ping = set.tool("ping").expect("tool");
        assert_eq!(ping.method, HttpMethod::Get);
        assert_eq!(ping.description, "Tool: ping");
        assert_eq!(ping.required_params, vec!["a", "b"]);
    }

    #[test]
    fn properties_read_param_types_and_parsers() {
        let text = "\
list.endpoint=/api/items
list.optional_params=limit
list.param_types.limit=integer
list.response_parser=items
response_parsers.items.type=list
response_parsers.items.list_field=items
response_parsers.items.item_fields=id,name
";
        let set = RawMappingDocument::from_properties(&path(), text)
            .and_then(|doc| doc.into_mapping_set(&path()))
            .expect("valid");
        let list = set.tool("list").expect("tool");
        assert_eq!(list.type_of("limit"), "integer");
        assert_eq!(
            set.parser("items"),
            Some(&ResponseParser::list("items", &["id", "name"]))
        );
    }

    #[test]
    fn properties_reject_unknown_fields_and_bad_parsers() {
        assert!(matches!(
            RawMappingDocument::from_properties(&path(), "tool.colour=red"),
            Err(MappingError::Properties { line: 1, .. })
        ));
        assert!(matches!(
            RawMappingDocument::from_properties(&path(), "response_parsers.p.type=tree"),
            Err(MappingError::InvalidParser { .. })
        ));
    }

    #[test]
    fn document_without_tools_is_rejected() {
        let doc = RawMappingDocument::default();
        assert!(matches!(
            doc.into_mapping_set(&path()),
            Err(MappingError::Empty { .. })
        ));
    }

    #[test]
    fn unsupported_method_rejects_document() {
        let doc: RawMappingDocument = serde_json::from_str(
            r#"{"mappings": {"x": {"endpoint": "/x", "method": "PATCH"}}}"#,
        )
        .expect("json");
        assert!(matches!(
            doc.into_mapping_set(&path()),
            Err(MappingError::InvalidMapping { .. })
        ));
    }
}
