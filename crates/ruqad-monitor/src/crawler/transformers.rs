//! Value transformers applied while extracting metadata

use serde_json::{Number, Value};
use std::collections::BTreeMap;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("Parameter `{0}` missing.")]
    MissingParameter(&'static str),

    #[error("Parameter `out_type` can only be one of float, int, bool or str (got '{0}').")]
    UnknownOutType(String),

    #[error("Cannot cast {value} to {out_type}")]
    Cast { value: String, out_type: &'static str },
}

/// Target type of [`cast_metadata_type`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutType {
    Float,
    Int,
    Bool,
    Str,
}

impl OutType {
    pub fn as_str(self) -> &'static str {
        match self {
            OutType::Float => "float",
            OutType::Int => "int",
            OutType::Bool => "bool",
            OutType::Str => "str",
        }
    }
}

impl FromStr for OutType {
    type Err = TransformError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "float" => Ok(OutType::Float),
            "int" => Ok(OutType::Int),
            "bool" => Ok(OutType::Bool),
            "str" => Ok(OutType::Str),
            other => Err(TransformError::UnknownOutType(other.to_string())),
        }
    }
}

/// Cast `value` to `out_type` when `var_name` equals `var_value`
///
/// `parameters` must contain `out_type`, `var_name` and `var_value`.
/// If the two variables differ the value is returned unchanged. Casting
/// follows the usual scripting conventions: strings are parsed, floats are
/// truncated to integers, and `bool` is truthiness.
pub fn cast_metadata_type(
    value: &Value,
    parameters: &BTreeMap<String, String>,
) -> Result<Value, TransformError> {
    let param = |key: &'static str| {
        parameters
            .get(key)
            .ok_or(TransformError::MissingParameter(key))
    };

    let out_type: OutType = param("out_type")?.parse()?;
    let var_name = param("var_name")?;
    let var_value = param("var_value")?;

    if var_name != var_value {
        return Ok(value.clone());
    }

    cast(value, out_type)
}

fn cast(value: &Value, out_type: OutType) -> Result<Value, TransformError> {
    let fail = || TransformError::Cast {
        value: value.to_string(),
        out_type: out_type.as_str(),
    };

    match out_type {
        OutType::Int => {
            let int = match value {
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
                Value::String(s) => s.trim().parse::<i64>().ok(),
                Value::Bool(b) => Some(i64::from(*b)),
                _ => None,
            };
            int.map(Value::from).ok_or_else(fail)
        },
        OutType::Float => {
            let float = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                _ => None,
            };
            float
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(fail)
        },
        OutType::Bool => {
            let truthy = match value {
                Value::Null => false,
                Value::Bool(b) => *b,
                Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
                Value::String(s) => !s.is_empty(),
                Value::Array(items) => !items.is_empty(),
                Value::Object(map) => !map.is_empty(),
            };
            Ok(Value::Bool(truthy))
        },
        OutType::Str => {
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Bool(true) => "True".to_string(),
                Value::Bool(false) => "False".to_string(),
                Value::Null => "None".to_string(),
                other => other.to_string(),
            };
            Ok(Value::String(text))
        },
    }
}
