use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{json, Value};

use super::{arg, string_arg, CustomFunction, FunctionError, FunctionRegistry, FunctionResult};

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"-?\d+(?:\.\d+)?").expect("number pattern is valid");
}

pub(super) fn register(registry: &mut FunctionRegistry) {
    registry.register(
        "lowerCase",
        CustomFunction::new("Lower-cases a string", vec![json!("Hello")], |args| {
            Ok(Value::String(string_arg("lowerCase", args, 0)?.to_lowercase()))
        }),
    );
    registry.register(
        "upperCase",
        CustomFunction::new("Upper-cases a string", vec![json!("Hello")], |args| {
            Ok(Value::String(string_arg("upperCase", args, 0)?.to_uppercase()))
        }),
    );
    registry.register(
        "filterArray",
        CustomFunction::new(
            "Keeps the array items whose text matches a regular expression",
            vec![json!(["apple", "banana", "avocado"]), json!("^a")],
            filter_array,
        ),
    );
    registry.register(
        "joinStrings",
        CustomFunction::new(
            "Joins the non-empty items of an array with a separator (default \", \")",
            vec![json!(["one", "", "two"])],
            join_strings,
        ),
    );
    registry.register(
        "extractNumber",
        CustomFunction::new(
            "First number found in a string, or null",
            vec![json!("Total: 42.5 NZD")],
            extract_number,
        ),
    );
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn array_arg<'a>(function: &str, args: &'a [Value]) -> FunctionResult<&'a Vec<Value>> {
    match arg(args, 0) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(FunctionError::invalid_argument(function, "expected an array")),
    }
}

fn filter_array(args: &[Value]) -> FunctionResult<Value> {
    let items = array_arg("filterArray", args)?;
    let pattern = string_arg("filterArray", args, 1)?;
    let regex = Regex::new(&pattern)
        .map_err(|e| FunctionError::invalid_argument("filterArray", e.to_string()))?;
    Ok(Value::Array(
        items
            .iter()
            .filter(|item| regex.is_match(&text_of(item)))
            .cloned()
            .collect(),
    ))
}

fn join_strings(args: &[Value]) -> FunctionResult<Value> {
    let items = array_arg("joinStrings", args)?;
    let separator = match arg(args, 1) {
        Some(_) => string_arg("joinStrings", args, 1)?,
        None => ", ".to_string(),
    };
    let parts: Vec<String> = items
        .iter()
        .map(text_of)
        .filter(|s| !s.is_empty())
        .collect();
    Ok(Value::String(parts.join(&separator)))
}

fn extract_number(args: &[Value]) -> FunctionResult<Value> {
    let input = match arg(args, 0) {
        Some(value) => text_of(value),
        None => return Ok(Value::Null),
    };
    Ok(NUMBER
        .find(&input)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map(|n| json!(n))
        .unwrap_or(Value::Null))
}
