use crate::errors::ToolError;
use crate::services::mapping::ToolMapping;
use serde_json::{Map, Value};

/// Checks caller arguments against a tool's declared parameters.
#[derive(Clone, Debug, Default)]
pub struct Validation;

impl Validation {
    pub fn new() -> Self {
        Self
    }

    /// Returns the arguments restricted to declared parameters.
    ///
    /// Required parameters are checked in declaration order and the first
    /// missing (or `null`) one is reported. Undeclared arguments are dropped,
    /// as are optional arguments whose value is `null`.
    pub fn validate(
        &self,
        mapping: &ToolMapping,
        arguments: &Map<String, Value>,
    ) -> Result<Map<String, Value>, ToolError> {
        let mut validated = Map::new();
        for name in &mapping.required_params {
            match arguments.get(name) {
                Some(value) if !value.is_null() => {
                    validated.insert(name.clone(), value.clone());
                }
                _ => return Err(ToolError::missing_parameter(name)),
            }
        }
        for name in &mapping.optional_params {
            if let Some(value) = arguments.get(name).filter(|v| !v.is_null()) {
                validated.insert(name.clone(), value.clone());
            }
        }
        Ok(validated)
    }

    /// Names in `arguments` that the mapping does not declare.
    pub fn undeclared<'a>(
        &self,
        mapping: &ToolMapping,
        arguments: &'a Map<String, Value>,
    ) -> Vec<&'a str> {
        arguments
            .keys()
            .filter(|key| !mapping.declares(key))
            .map(|key| key.as_str())
            .collect()
    }
}
