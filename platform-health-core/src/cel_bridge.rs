//! Isolates every direct dependency on `cel_interpreter`'s value/context
//! types behind conversions to and from this crate's own [`CheckValue`].
//! Nothing outside this module touches `cel_interpreter::Value` directly.

use std::collections::HashMap;
use std::sync::Arc;

use cel_interpreter::{Context, Value as CelValue};

use crate::value::CheckValue;

pub fn check_value_to_cel(value: &CheckValue) -> CelValue {
    match value {
        CheckValue::Null => CelValue::Null,
        CheckValue::Bool(b) => CelValue::Bool(*b),
        CheckValue::Int(i) => CelValue::Int(*i),
        CheckValue::Float(f) => CelValue::Float(*f),
        CheckValue::String(s) => CelValue::String(Arc::new(s.clone())),
        CheckValue::List(items) => {
            CelValue::List(Arc::new(items.iter().map(check_value_to_cel).collect()))
        }
        CheckValue::Map(map) => {
            let entries: HashMap<String, CelValue> = map
                .iter()
                .map(|(k, v)| (k.clone(), check_value_to_cel(v)))
                .collect();
            CelValue::from(entries)
        }
    }
}

/// Converts a value coming back out of CEL into our own [`CheckValue`],
/// recursively coercing any non-string map keys to strings so the result is
/// always serializable (§3 "CheckContext" invariant, §4.3 "evaluate_any"
/// normalization, §8 "CEL round-trip").
pub fn cel_to_check_value(value: CelValue) -> CheckValue {
    match value {
        CelValue::Null => CheckValue::Null,
        CelValue::Bool(b) => CheckValue::Bool(b),
        CelValue::Int(i) => CheckValue::Int(i),
        CelValue::UInt(u) => CheckValue::Int(u as i64),
        CelValue::Float(f) => CheckValue::Float(f),
        CelValue::String(s) => CheckValue::String((*s).clone()),
        CelValue::Bytes(b) => CheckValue::String(String::from_utf8_lossy(&b).into_owned()),
        CelValue::List(items) => {
            CheckValue::List(items.iter().cloned().map(cel_to_check_value).collect())
        }
        CelValue::Map(map) => {
            let mut out = std::collections::BTreeMap::new();
            for (key, val) in map.map.iter() {
                out.insert(key_to_string(key), cel_to_check_value(val.clone()));
            }
            CheckValue::Map(out)
        }
        CelValue::Duration(d) => CheckValue::String(format!("{d}")),
        CelValue::Timestamp(t) => CheckValue::String(t.to_rfc3339()),
        CelValue::Function(name, _) => CheckValue::String(format!("<function:{name}>")),
    }
}

fn key_to_string(key: &cel_interpreter::objects::Key) -> String {
    use cel_interpreter::objects::Key;
    match key {
        Key::Int(i) => i.to_string(),
        Key::Uint(u) => u.to_string(),
        Key::Bool(b) => b.to_string(),
        Key::String(s) => (**s).clone(),
    }
}

/// Builds a `cel_interpreter::Context` bound with every entry of a
/// [`crate::value::CheckContext`] and the extension functions (§4.3).
pub fn build_context<'a>(
    vars: impl IntoIterator<Item = (&'a str, &'a CheckValue)>,
) -> Context<'static> {
    let mut ctx = Context::default();
    register_extensions(&mut ctx);
    for (name, value) in vars {
        let _ = ctx.add_variable(name.to_string(), check_value_to_cel(value));
    }
    ctx
}

/// Registers the extension modules named in §4.3: an encoder (base64) and
/// the custom time library. CEL's own grammar models `pkg.fn()` either as a
/// member call on a variable bound to a struct of function values, or as a
/// single identifier token - `cel_interpreter` instead exposes a flat
/// function-registration API, so the dotted names in spec.md's CEL library
/// (`time.Now()`, `time.Since(ts)`, `time.Until(ts)`) are registered here as
/// flat global functions (`time_now()`, `time_since(ts)`, `time_until(ts)`).
/// String, list, math and set operations are CEL built-ins and need no
/// registration.
pub fn register_extensions(ctx: &mut Context<'_>) {
    let _ = ctx.add_function("time_now", || -> i64 { chrono::Utc::now().timestamp() });
    let _ = ctx.add_function("time_since", |ts: i64| -> i64 {
        chrono::Utc::now().timestamp() - ts
    });
    let _ = ctx.add_function("time_until", |ts: i64| -> i64 {
        ts - chrono::Utc::now().timestamp()
    });
    let _ = ctx.add_function("base64_encode", |s: Arc<String>| -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(s.as_bytes())
    });
    let _ = ctx.add_function("base64_decode", |s: Arc<String>| -> String {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD
            .decode(s.as_bytes())
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::CheckValue;

    #[test]
    fn round_trips_scalars_and_nested_maps() {
        let original = CheckValue::map([
            ("a".to_string(), CheckValue::Int(1)),
            (
                "b".to_string(),
                CheckValue::list([CheckValue::Int(1), CheckValue::Int(2)]),
            ),
        ]);
        let cel = check_value_to_cel(&original);
        let back = cel_to_check_value(cel);
        assert_eq!(original, back);
    }
}
