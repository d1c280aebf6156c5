use std::collections::BTreeMap;

/// A value a provider hands to the CEL subsystem, or gets back from it.
///
/// This mirrors the shape CEL itself works with (scalars, sequences,
/// mappings) rather than tying the public API of this crate to
/// `cel_interpreter`'s internal `Value` type, so providers in other crates
/// don't need a direct dependency on the CEL crate.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<CheckValue>),
    /// Keys are always strings here: §3 "CheckContext" requires any nested
    /// mapping with non-string keys to be coerced to string keys so the
    /// context stays serializable. Non-string CEL map keys are normalized at
    /// the CEL boundary (see `cel::normalize`), never constructed directly.
    Map(BTreeMap<String, CheckValue>),
}

impl CheckValue {
    pub fn map(entries: impl IntoIterator<Item = (String, CheckValue)>) -> Self {
        CheckValue::Map(entries.into_iter().collect())
    }

    pub fn list(items: impl IntoIterator<Item = CheckValue>) -> Self {
        CheckValue::List(items.into_iter().collect())
    }

    pub fn as_list(&self) -> Option<&[CheckValue]> {
        match self {
            CheckValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, CheckValue>> {
        match self {
            CheckValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CheckValue::String(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for CheckValue {
    fn from(v: bool) -> Self {
        CheckValue::Bool(v)
    }
}

impl From<i64> for CheckValue {
    fn from(v: i64) -> Self {
        CheckValue::Int(v)
    }
}

impl From<f64> for CheckValue {
    fn from(v: f64) -> Self {
        CheckValue::Float(v)
    }
}

impl From<&str> for CheckValue {
    fn from(v: &str) -> Self {
        CheckValue::String(v.to_string())
    }
}

impl From<String> for CheckValue {
    fn from(v: String) -> Self {
        CheckValue::String(v)
    }
}

impl From<serde_json::Value> for CheckValue {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => CheckValue::Null,
            serde_json::Value::Bool(b) => CheckValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    CheckValue::Int(i)
                } else {
                    CheckValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => CheckValue::String(s),
            serde_json::Value::Array(items) => {
                CheckValue::List(items.into_iter().map(CheckValue::from).collect())
            }
            serde_json::Value::Object(map) => CheckValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, CheckValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<CheckValue> for serde_json::Value {
    fn from(v: CheckValue) -> Self {
        match v {
            CheckValue::Null => serde_json::Value::Null,
            CheckValue::Bool(b) => serde_json::Value::Bool(b),
            CheckValue::Int(i) => serde_json::Value::Number(i.into()),
            CheckValue::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            CheckValue::String(s) => serde_json::Value::String(s),
            CheckValue::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            CheckValue::Map(map) => serde_json::Value::Object(
                map.into_iter().map(|(k, v)| (k, v.into())).collect(),
            ),
        }
    }
}

/// A transient, per-evaluation mapping a provider builds and hands to the
/// CEL subsystem (§3 "CheckContext").
pub type CheckContext = BTreeMap<String, CheckValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_round_trip_preserves_shape() {
        let original = serde_json::json!({
            "a": 1,
            "b": [1, 2, 3],
            "c": {"nested": true},
        });
        let value = CheckValue::from(original.clone());
        let back: serde_json::Value = value.into();
        assert_eq!(original, back);
    }
}
