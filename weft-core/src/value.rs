//! Dynamic value type for field access and predicate evaluation.
//!
//! Flow-shape components (router, group-by) and the KV store's query port
//! work on arbitrary JSON payloads. [`Value`] wraps `serde_json::Value`
//! with path-based field extraction, loose type coercions, and a small
//! comparison-predicate evaluator for expressions such as
//! `$.status == 'DOWN'`.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Dynamic value for field access and condition evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(pub JsonValue);

impl Value {
    /// Create a null value.
    pub fn null() -> Self {
        Self(JsonValue::Null)
    }

    /// Check if the value is null.
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Get a field by path.
    ///
    /// Supports:
    /// - Simple field access: `"field"`
    /// - Dot notation: `"parent.child.value"`
    /// - JSONPath prefix: `"$.parent.child"`
    /// - Array index notation: `"items[0].name"`
    ///
    /// Object keys match exactly first, then case-insensitively, so paths
    /// written as `labels.app` also resolve documents keyed `Labels.App`.
    /// Returns `None` if the path does not resolve.
    pub fn get_field(&self, path: &str) -> Option<Value> {
        let path = path.strip_prefix("$.").unwrap_or(path);

        let mut current = &self.0;
        for part in path.split('.') {
            if let Some((field, idx_str)) = part.split_once('[') {
                current = lookup_key(current, field)?;
                let idx: usize = idx_str.strip_suffix(']')?.parse().ok()?;
                current = current.get(idx)?;
            } else {
                current = lookup_key(current, part)?;
            }
        }
        Some(Value(current.clone()))
    }

    /// Get a field as a string.
    pub fn get_string(&self, path: &str) -> Option<String> {
        self.get_field(path).and_then(|v| v.as_string())
    }

    /// Get a field as an f64.
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get_field(path).and_then(|v| v.as_f64())
    }

    /// Get a field as a bool.
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get_field(path).and_then(|v| v.as_bool())
    }

    /// Convert to string if possible.
    pub fn as_string(&self) -> Option<String> {
        match &self.0 {
            JsonValue::String(s) => Some(s.clone()),
            JsonValue::Number(n) => Some(n.to_string()),
            JsonValue::Bool(b) => Some(b.to_string()),
            JsonValue::Null => None,
            _ => Some(self.0.to_string()),
        }
    }

    /// Convert to f64 if possible.
    pub fn as_f64(&self) -> Option<f64> {
        match &self.0 {
            JsonValue::Number(n) => n.as_f64(),
            JsonValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// Convert to bool if possible.
    pub fn as_bool(&self) -> Option<bool> {
        match &self.0 {
            JsonValue::Bool(b) => Some(*b),
            JsonValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "1" | "yes" => Some(true),
                "false" | "0" | "no" => Some(false),
                _ => None,
            },
            JsonValue::Number(n) => Some(n.as_f64().is_some_and(|v| v != 0.0)),
            JsonValue::Null => Some(false),
            _ => None,
        }
    }

    /// Check equality with a string value (loose, via coercion).
    pub fn equals_str(&self, other: &str) -> bool {
        self.as_string().is_some_and(|s| s == other)
    }

    /// Check if a field equals a value (string comparison).
    pub fn field_equals(&self, path: &str, value: &str) -> bool {
        self.get_field(path).is_some_and(|v| v.equals_str(value))
    }

    /// Check if a boolean field is true.
    pub fn field_is_true(&self, path: &str) -> bool {
        self.get_bool(path).unwrap_or(false)
    }

    /// Evaluate a comparison predicate against this value.
    ///
    /// Supported forms:
    /// - `$.field == 'literal'` / `$.field != "literal"` (string equality
    ///   via coercion)
    /// - `$.field > n`, `<`, `>=`, `<=` (numeric)
    /// - `$.field` / `${field}` (boolean truthiness)
    ///
    /// Returns `None` when the expression cannot be parsed; callers treat
    /// that as "skip this record".
    pub fn eval_predicate(&self, expr: &str) -> Option<bool> {
        let expr = expr.trim();

        if let Some((field, op, rhs)) = parse_comparison(expr) {
            let result = match op {
                "==" => self.field_equals(&field, strip_quotes(rhs)),
                "!=" => !self.field_equals(&field, strip_quotes(rhs)),
                ">" => {
                    let threshold: f64 = rhs.parse().ok()?;
                    self.get_f64(&field).is_some_and(|v| v > threshold)
                }
                "<" => {
                    let threshold: f64 = rhs.parse().ok()?;
                    self.get_f64(&field).is_some_and(|v| v < threshold)
                }
                ">=" => {
                    let threshold: f64 = rhs.parse().ok()?;
                    self.get_f64(&field).is_some_and(|v| v >= threshold)
                }
                "<=" => {
                    let threshold: f64 = rhs.parse().ok()?;
                    self.get_f64(&field).is_some_and(|v| v <= threshold)
                }
                _ => return None,
            };
            return Some(result);
        }

        parse_field_ref(expr).map(|field| self.field_is_true(&field))
    }

    /// Access the inner `serde_json::Value`.
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert into the inner `serde_json::Value`.
    pub fn into_inner(self) -> JsonValue {
        self.0
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::null()
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Self(v)
    }
}

impl From<Value> for JsonValue {
    fn from(v: Value) -> Self {
        v.0
    }
}

/// Look up an object key, exact match first, case-insensitive fallback.
fn lookup_key<'a>(value: &'a JsonValue, key: &str) -> Option<&'a JsonValue> {
    let object = value.as_object()?;
    if let Some(found) = object.get(key) {
        return Some(found);
    }
    object
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}

/// Parse a comparison expression like `$.field > 0.5`.
///
/// Operators are tried in order of specificity (`>=` before `>`).
fn parse_comparison(expr: &str) -> Option<(String, &'static str, &str)> {
    const OPERATORS: [&str; 6] = [">=", "<=", "==", "!=", ">", "<"];

    for op in OPERATORS {
        if let Some(pos) = expr.find(op) {
            let lhs = expr[..pos].trim();
            let rhs = expr[pos + op.len()..].trim();
            if let Some(field) = parse_field_ref(lhs) {
                return Some((field, op, rhs));
            }
        }
    }
    None
}

/// Parse a field reference like `${field}`, `$.field`, or a bare path.
fn parse_field_ref(s: &str) -> Option<String> {
    let s = s.trim();

    if let Some(inner) = s.strip_prefix("${").and_then(|s| s.strip_suffix('}')) {
        return Some(inner.to_string());
    }

    if let Some(stripped) = s.strip_prefix("$.") {
        return Some(stripped.to_string());
    }

    if !s.is_empty()
        && s.chars()
            .all(|c| c.is_alphanumeric() || c == '_' || c == '.')
    {
        return Some(s.to_string());
    }

    None
}

fn strip_quotes(s: &str) -> &str {
    s.trim_matches('"').trim_matches('\'')
}
