//! Conversion of loosely-typed JSON arguments into native parameter values.
//!
//! [`bind`] walks a tool's declared parameters in order and produces one
//! [`ArgValue`] per parameter. Missing primitives fall back to their zero
//! value; missing reference kinds become [`ArgValue::Absent`].

use serde_json::{Map, Value as JsonValue};

use crate::error::{McpError, Result};
use crate::tools::{ParamDef, ParamType, ToolDef};

/// A native argument value.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgValue {
    /// Text
    String(String),
    /// 32-bit integer
    Integer(i32),
    /// 64-bit integer
    Long(i64),
    /// Float
    Double(f64),
    /// Boolean
    Boolean(bool),
    /// Array passed through unconverted
    Array(Vec<JsonValue>),
    /// Object passed through unconverted
    Object(Map<String, JsonValue>),
    /// Not supplied and no zero value exists for the type
    Absent,
}

/// Arguments bound to a tool's parameters, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoundArgs {
    names: Vec<String>,
    values: Vec<ArgValue>,
}

impl BoundArgs {
    /// Number of bound values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the tool takes no arguments.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// All values in parameter order.
    pub fn values(&self) -> &[ArgValue] {
        &self.values
    }

    /// Value at position `i`, if any.
    pub fn get(&self, i: usize) -> Option<&ArgValue> {
        self.values.get(i)
    }

    fn slot(&self, i: usize) -> Result<(&str, &ArgValue)> {
        match (self.names.get(i), self.values.get(i)) {
            (Some(name), Some(value)) => Ok((name.as_str(), value)),
            _ => Err(McpError::Internal(format!(
                "argument index {} out of range ({} bound)",
                i,
                self.values.len()
            ))),
        }
    }

    fn mismatch(name: &str, expected: &str) -> McpError {
        McpError::Internal(format!("argument '{}' is not bound as {}", name, expected))
    }

    /// Required string at position `i`.
    pub fn string(&self, i: usize) -> Result<String> {
        match self.slot(i)? {
            (_, ArgValue::String(s)) => Ok(s.clone()),
            (name, ArgValue::Absent) => Err(McpError::MissingArg(name.to_string())),
            (name, _) => Err(Self::mismatch(name, "string")),
        }
    }

    /// Optional string at position `i`.
    pub fn opt_string(&self, i: usize) -> Result<Option<String>> {
        match self.slot(i)? {
            (_, ArgValue::String(s)) => Ok(Some(s.clone())),
            (_, ArgValue::Absent) => Ok(None),
            (name, _) => Err(Self::mismatch(name, "string")),
        }
    }

    /// Integer at position `i`.
    pub fn integer(&self, i: usize) -> Result<i32> {
        match self.slot(i)? {
            (_, ArgValue::Integer(n)) => Ok(*n),
            (name, _) => Err(Self::mismatch(name, "integer")),
        }
    }

    /// Long at position `i`.
    pub fn long(&self, i: usize) -> Result<i64> {
        match self.slot(i)? {
            (_, ArgValue::Long(n)) => Ok(*n),
            (name, _) => Err(Self::mismatch(name, "long")),
        }
    }

    /// Double at position `i`.
    pub fn double(&self, i: usize) -> Result<f64> {
        match self.slot(i)? {
            (_, ArgValue::Double(n)) => Ok(*n),
            (name, _) => Err(Self::mismatch(name, "double")),
        }
    }

    /// Boolean at position `i`.
    pub fn boolean(&self, i: usize) -> Result<bool> {
        match self.slot(i)? {
            (_, ArgValue::Boolean(b)) => Ok(*b),
            (name, _) => Err(Self::mismatch(name, "boolean")),
        }
    }

    /// Optional array at position `i`.
    pub fn array(&self, i: usize) -> Result<Option<&[JsonValue]>> {
        match self.slot(i)? {
            (_, ArgValue::Array(items)) => Ok(Some(items.as_slice())),
            (_, ArgValue::Absent) => Ok(None),
            (name, _) => Err(Self::mismatch(name, "array")),
        }
    }

    /// Optional object at position `i`.
    pub fn object(&self, i: usize) -> Result<Option<&Map<String, JsonValue>>> {
        match self.slot(i)? {
            (_, ArgValue::Object(map)) => Ok(Some(map)),
            (_, ArgValue::Absent) => Ok(None),
            (name, _) => Err(Self::mismatch(name, "object")),
        }
    }
}

/// Bind a JSON argument object to a tool's declared parameters.
pub fn bind(tool: &ToolDef, args: &Map<String, JsonValue>) -> Result<BoundArgs> {
    let mut bound = BoundArgs {
        names: Vec::with_capacity(tool.params.len()),
        values: Vec::with_capacity(tool.params.len()),
    };

    for param in &tool.params {
        bound.values.push(convert_arg(param, args.get(&param.name))?);
        bound.names.push(param.name.clone());
    }

    Ok(bound)
}

/// Convert a single argument. `None` and JSON `null` both count as absent.
pub fn convert_arg(param: &ParamDef, value: Option<&JsonValue>) -> Result<ArgValue> {
    let value = match value {
        None | Some(JsonValue::Null) => return Ok(default_for(param.ty)),
        Some(v) => v,
    };

    match param.ty {
        ParamType::String => Ok(ArgValue::String(match value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })),
        ParamType::Integer => {
            let n = to_i64(param, value)?;
            i32::try_from(n)
                .map(ArgValue::Integer)
                .map_err(|_| conversion(param, format!("{} is out of range", n)))
        }
        ParamType::Long => to_i64(param, value).map(ArgValue::Long),
        ParamType::Double => to_f64(param, value).map(ArgValue::Double),
        ParamType::Boolean => to_bool(param, value).map(ArgValue::Boolean),
        ParamType::Array => match value {
            JsonValue::Array(items) => Ok(ArgValue::Array(items.clone())),
            other => Err(conversion(param, format!("expected an array, got {}", kind(other)))),
        },
        ParamType::Object => match value {
            JsonValue::Object(map) => Ok(ArgValue::Object(map.clone())),
            other => Err(conversion(param, format!("expected an object, got {}", kind(other)))),
        },
    }
}

/// Value used when an argument is not supplied.
pub fn default_for(ty: ParamType) -> ArgValue {
    match ty {
        ParamType::Integer => ArgValue::Integer(0),
        ParamType::Long => ArgValue::Long(0),
        ParamType::Double => ArgValue::Double(0.0),
        ParamType::Boolean => ArgValue::Boolean(false),
        ParamType::String | ParamType::Array | ParamType::Object => ArgValue::Absent,
    }
}

fn conversion(param: &ParamDef, reason: String) -> McpError {
    McpError::Conversion {
        name: param.name.clone(),
        expected: param.ty.to_string(),
        reason,
    }
}

fn kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn to_i64(param: &ParamDef, value: &JsonValue) -> Result<i64> {
    match value {
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                // Fractions truncate toward zero; u64 values above i64::MAX land here too.
                if f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                    Ok(f.trunc() as i64)
                } else {
                    Err(conversion(param, format!("{} is out of range", n)))
                }
            } else {
                Err(conversion(param, format!("{} is out of range", n)))
            }
        }
        JsonValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| conversion(param, format!("'{}': {}", s, e))),
        other => Err(conversion(param, format!("expected a number, got {}", kind(other)))),
    }
}

fn to_f64(param: &ParamDef, value: &JsonValue) -> Result<f64> {
    match value {
        JsonValue::Number(n) => n
            .as_f64()
            .ok_or_else(|| conversion(param, format!("{} is not representable", n))),
        JsonValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| conversion(param, format!("'{}': {}", s, e))),
        other => Err(conversion(param, format!("expected a number, got {}", kind(other)))),
    }
}

fn to_bool(param: &ParamDef, value: &JsonValue) -> Result<bool> {
    match value {
        JsonValue::Bool(b) => Ok(*b),
        JsonValue::String(s) if s.eq_ignore_ascii_case("true") => Ok(true),
        JsonValue::String(s) if s.eq_ignore_ascii_case("false") => Ok(false),
        JsonValue::String(s) => Err(conversion(param, format!("'{}' is not true or false", s))),
        other => Err(conversion(param, format!("expected a boolean, got {}", kind(other)))),
    }
}
