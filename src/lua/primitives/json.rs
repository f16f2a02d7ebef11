//! JSON encode/decode primitives.
//!
//! Results cross the wire as text only, so code that wants to hand back a
//! structured value encodes it itself:
//!
//! ```lua
//! return json.encode({ name = "execlua", ports = { 1, 2 } })
//! ```
//!
//! # Error Handling
//!
//! Both functions follow Lua convention and return `value, nil` on success
//! or `nil, error_message` on failure.

use anyhow::{anyhow, Result};
use mlua::{Lua, LuaSerdeExt, Value};

/// Convert a `serde_json::Value` to a Lua value.
///
/// JSON `null` becomes a real `nil` (and object members holding `null`
/// become absent keys) instead of mlua's truthy null sentinel.
pub fn json_to_lua(lua: &Lua, json: &serde_json::Value) -> mlua::Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Boolean(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Integer(i),
            None => n.as_f64().map_or(Value::Nil, Value::Number),
        },
        serde_json::Value::String(s) => Value::String(lua.create_string(s)?),
        serde_json::Value::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for item in items {
                table.raw_push(json_to_lua(lua, item)?)?;
            }
            Value::Table(table)
        }
        serde_json::Value::Object(members) => {
            let table = lua.create_table_with_capacity(0, members.len())?;
            for (key, member) in members.iter().filter(|(_, m)| !m.is_null()) {
                table.raw_set(key.as_str(), json_to_lua(lua, member)?)?;
            }
            Value::Table(table)
        }
    })
}

/// Register the global `json` table.
///
/// - `json.encode(value)` - Serialize a Lua value to a compact JSON string
/// - `json.decode(string)` - Parse a JSON string into a Lua value
///
/// # Errors
///
/// Returns an error if Lua table or function creation fails.
pub fn register(lua: &Lua) -> Result<()> {
    let json_table = lua
        .create_table()
        .map_err(|e| anyhow!("Failed to create json table: {e}"))?;

    let encode_fn = lua
        .create_function(|lua, value: Value| {
            let encoded = lua
                .from_value::<serde_json::Value>(value)
                .map_err(|e| format!("Failed to convert Lua value: {e}"))
                .and_then(|json| {
                    serde_json::to_string(&json).map_err(|e| format!("Failed to encode JSON: {e}"))
                });

            Ok(match encoded {
                Ok(s) => (Some(s), None),
                Err(e) => (None, Some(e)),
            })
        })
        .map_err(|e| anyhow!("Failed to create json.encode function: {e}"))?;

    json_table
        .set("encode", encode_fn)
        .map_err(|e| anyhow!("Failed to set json.encode: {e}"))?;

    let decode_fn = lua
        .create_function(|lua, text: String| {
            match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(json) => Ok((json_to_lua(lua, &json)?, None)),
                Err(e) => Ok((Value::Nil, Some(format!("Failed to decode JSON: {e}")))),
            }
        })
        .map_err(|e| anyhow!("Failed to create json.decode function: {e}"))?;

    json_table
        .set("decode", decode_fn)
        .map_err(|e| anyhow!("Failed to set json.decode: {e}"))?;

    lua.globals()
        .set("json", json_table)
        .map_err(|e| anyhow!("Failed to register json table globally: {e}"))?;

    Ok(())
}
