//! JSON <-> JavaScript Value Conversions
//!
//! Invocation events enter the engine as `serde_json::Value` and handler
//! results leave it the same way. Conversion follows `JSON.stringify` closely
//! enough for response validation:
//!
//! | JavaScript | JSON |
//! |------------|------|
//! | `undefined`, `null`, symbols, functions | `null` |
//! | Boolean, Number, String | same |
//! | Array | array |
//! | other objects | object (string and index keys only) |
//!
//! Non-finite numbers become `null`. Nesting deeper than [`MAX_DEPTH`] is
//! rejected, which also catches cyclic results.

use boa_engine::{
    object::{builtins::JsArray, JsObject},
    property::PropertyKey,
    value::JsValue,
    Context, JsString,
};
use fliteral_common::{FliteralError, Result};
use serde_json::Value as JsonValue;

pub const MAX_DEPTH: usize = 64;

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

/// Convert serde_json::Value to Boa JsValue.
pub fn json_to_js_value(json: &JsonValue, ctx: &mut Context) -> Result<JsValue> {
    match json {
        JsonValue::Null => Ok(JsValue::null()),
        JsonValue::Bool(b) => Ok(JsValue::new(*b)),
        JsonValue::Number(n) => match n.as_i64().and_then(|i| i32::try_from(i).ok()) {
            Some(i) => Ok(JsValue::new(i)),
            None => n
                .as_f64()
                .map(JsValue::new)
                .ok_or_else(|| FliteralError::JavaScriptExecution(format!("number {} out of range", n))),
        },
        JsonValue::String(s) => Ok(JsValue::new(JsString::from(s.as_str()))),
        JsonValue::Array(items) => {
            let array = JsArray::new(ctx);
            for (i, item) in items.iter().enumerate() {
                let value = json_to_js_value(item, ctx)?;
                array.push(value, ctx).map_err(|e| {
                    FliteralError::JavaScriptExecution(format!("failed to push array element {}: {}", i, e))
                })?;
            }
            Ok(array.into())
        }
        JsonValue::Object(map) => {
            let object = JsObject::with_object_proto(ctx.intrinsics());
            for (key, value) in map {
                let value = json_to_js_value(value, ctx)?;
                object
                    .create_data_property_or_throw(JsString::from(key.as_str()), value, ctx)
                    .map_err(|e| {
                        FliteralError::JavaScriptExecution(format!("failed to set property '{}': {}", key, e))
                    })?;
            }
            Ok(object.into())
        }
    }
}

/// Convert Boa JsValue to serde_json::Value.
pub fn js_value_to_json(value: &JsValue, ctx: &mut Context) -> Result<JsonValue> {
    to_json(value, ctx, 0)
}

fn to_json(value: &JsValue, ctx: &mut Context, depth: usize) -> Result<JsonValue> {
    if depth > MAX_DEPTH {
        return Err(FliteralError::JavaScriptExecution(format!(
            "value nested deeper than {} levels (cyclic?)",
            MAX_DEPTH
        )));
    }

    if value.is_undefined() || value.is_null() || value.is_symbol() {
        return Ok(JsonValue::Null);
    }

    if let Some(b) = value.as_boolean() {
        return Ok(JsonValue::Bool(b));
    }

    if let Some(i) = value.as_i32() {
        return Ok(JsonValue::Number(i.into()));
    }

    if let Some(n) = value.as_number() {
        // Integral doubles serialise as integers, like JSON.stringify
        if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
            return Ok(JsonValue::Number((n as i64).into()));
        }
        return Ok(serde_json::Number::from_f64(n)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null));
    }

    if let Some(s) = value.as_string() {
        return Ok(JsonValue::String(s.to_std_string_escaped()));
    }

    let Some(object) = value.as_object() else {
        // BigInt has no JSON form
        return Err(FliteralError::JavaScriptExecution(format!(
            "cannot convert {} to JSON",
            value.type_of()
        )));
    };

    if object.is_callable() {
        return Ok(JsonValue::Null);
    }

    if object.is_array() {
        let array = JsArray::from_object(object.clone())
            .map_err(|e| FliteralError::JavaScriptExecution(format!("invalid array: {}", e)))?;
        let length = array
            .length(ctx)
            .map_err(|e| FliteralError::JavaScriptExecution(format!("failed to read array length: {}", e)))?;

        let mut items = Vec::new();
        for i in 0..length {
            let item = array.get(i, ctx).map_err(|e| {
                FliteralError::JavaScriptExecution(format!("failed to read array element {}: {}", i, e))
            })?;
            items.push(to_json(&item, ctx, depth + 1)?);
        }
        return Ok(JsonValue::Array(items));
    }

    let keys = object
        .own_property_keys(ctx)
        .map_err(|e| FliteralError::JavaScriptExecution(format!("failed to list object keys: {}", e)))?;

    let mut map = serde_json::Map::new();
    for key in keys {
        let name = match &key {
            PropertyKey::String(s) => s.to_std_string_escaped(),
            PropertyKey::Index(i) => i.get().to_string(),
            PropertyKey::Symbol(_) => continue,
        };
        let property = object.get(key.clone(), ctx).map_err(|e| {
            FliteralError::JavaScriptExecution(format!("failed to read property '{}': {}", name, e))
        })?;
        map.insert(name, to_json(&property, ctx, depth + 1)?);
    }
    Ok(JsonValue::Object(map))
}

#[cfg(test)]
mod tests {
    use super::*;
    use boa_engine::Source;
    use serde_json::json;

    fn eval_to_json(src: &str) -> Result<JsonValue> {
        let mut ctx = Context::default();
        let value = ctx.eval(Source::from_bytes(src)).unwrap();
        js_value_to_json(&value, &mut ctx)
    }

    #[test]
    fn test_json_to_js_and_back() {
        let mut ctx = Context::default();
        let input = json!({
            "statusCode": 200,
            "headers": {"x-a": "1"},
            "list": [1, "two", null, true],
            "nested": {"deep": {"value": 1.5}},
        });
        let js = json_to_js_value(&input, &mut ctx).unwrap();
        let output = js_value_to_json(&js, &mut ctx).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn test_js_primitives() {
        assert_eq!(eval_to_json("undefined").unwrap(), JsonValue::Null);
        assert_eq!(eval_to_json("null").unwrap(), JsonValue::Null);
        assert_eq!(eval_to_json("42").unwrap(), json!(42));
        assert_eq!(eval_to_json("0.5").unwrap(), json!(0.5));
        assert_eq!(eval_to_json("'hi'").unwrap(), json!("hi"));
        assert_eq!(eval_to_json("NaN").unwrap(), JsonValue::Null);
        assert_eq!(eval_to_json("Symbol('s')").unwrap(), JsonValue::Null);
    }

    #[test]
    fn test_js_object_skips_symbol_keys() {
        let value = eval_to_json("var o = {a: 1}; o[Symbol('x')] = 2; o").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_js_function_becomes_null() {
        assert_eq!(eval_to_json("({f: function() {}})").unwrap(), json!({"f": null}));
    }

    #[test]
    fn test_cyclic_value_rejected() {
        let err = eval_to_json("var o = {}; o.self = o; o").unwrap_err();
        assert!(err.to_string().contains("nested deeper"));
    }
}
