//! Reshapes downstream JSON into the tool's output contract.
//!
//! Shaping is total: a missing or mistyped field degrades the output, it
//! never fails the call. Every field access is an explicit presence check.

use crate::services::mapping::ResponseParser;
use serde_json::{Map, Value};

pub const ID_KEY: &str = "id";

pub fn shape(parser: Option<&ResponseParser>, raw: &Value) -> Value {
    match parser {
        None => raw.clone(),
        Some(ResponseParser::SingleItem {
            id_field,
            data_fields,
        }) => shape_single_item(id_field, data_fields, raw),
        Some(ResponseParser::List {
            list_field,
            item_fields,
        }) => shape_list(list_field, item_fields, raw),
    }
}

fn shape_single_item(id_field: &str, data_fields: &[String], raw: &Value) -> Value {
    let identifier = raw
        .as_object()
        .and_then(|obj| obj.get(id_field))
        .filter(|value| !value.is_null());

    let Some(identifier) = identifier else {
        let mut degraded = Map::new();
        degraded.insert(ID_KEY.to_string(), Value::String(String::new()));
        for field in data_fields {
            if field != ID_KEY {
                degraded.insert(field.clone(), Value::Null);
            }
        }
        return Value::Object(degraded);
    };

    let mut item = Map::new();
    if let Some(obj) = raw.as_object() {
        for field in data_fields {
            if let Some(value) = obj.get(field) {
                item.insert(field.clone(), value.clone());
            }
        }
    }
    item.insert(ID_KEY.to_string(), identifier.clone());
    Value::Object(item)
}

fn shape_list(list_field: &str, item_fields: &[String], raw: &Value) -> Value {
    let Some(elements) = raw
        .as_object()
        .and_then(|obj| obj.get(list_field))
        .and_then(Value::as_array)
    else {
        return Value::Array(Vec::new());
    };

    let items = elements
        .iter()
        .filter_map(Value::as_object)
        .map(|element| pick_fields(element, item_fields))
        .collect();
    Value::Array(items)
}

fn pick_fields(source: &Map<String, Value>, fields: &[String]) -> Value {
    let mut out = Map::new();
    for field in fields {
        if let Some(value) = source.get(field) {
            out.insert(field.clone(), value.clone());
        }
    }
    Value::Object(out)
}
