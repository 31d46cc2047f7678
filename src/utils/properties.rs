//! Minimal reader for flat `key=value` documents.
//!
//! Lines starting with `#` or `!` are comments. Keys and values are trimmed.
//! Only the first `=` separates key from value, so values may contain `=`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyLine {
    pub line: usize,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesError {
    pub line: usize,
    pub message: String,
}

pub fn parse_properties(input: &str) -> Result<Vec<PropertyLine>, PropertiesError> {
    let mut out = Vec::new();
    for (idx, raw) in input.lines().enumerate() {
        let line = idx + 1;
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            return Err(PropertiesError {
                line,
                message: format!("expected 'key=value', got '{}'", trimmed),
            });
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(PropertiesError {
                line,
                message: "empty key".to_string(),
            });
        }
        out.push(PropertyLine {
            line,
            key: key.to_string(),
            value: value.trim().to_string(),
        });
    }
    Ok(out)
}

/// Comma-separated list with blanks removed.
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}
