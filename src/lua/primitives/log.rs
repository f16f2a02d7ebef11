//! Logging primitive for evaluated code.
//!
//! Exposes the `log` crate to Lua via a `log` table with one function per
//! level. Arguments are joined with spaces.
//!
//! ```lua
//! log.info("request from", client_name)
//! log.debug("counter is now", counter)
//! ```
//!
//! Messages use the `lua` target, so `RUST_LOG=lua=debug` shows them
//! without the server's own debug output.

use anyhow::{anyhow, Result};
use mlua::{Lua, Variadic};

const LEVELS: [(&str, ::log::Level); 5] = [
    ("error", ::log::Level::Error),
    ("warn", ::log::Level::Warn),
    ("info", ::log::Level::Info),
    ("debug", ::log::Level::Debug),
    ("trace", ::log::Level::Trace),
];

/// Register the global `log` table.
///
/// # Errors
///
/// Returns an error if Lua table or function creation fails.
pub fn register(lua: &Lua) -> Result<()> {
    let log_table = lua
        .create_table()
        .map_err(|e| anyhow!("Failed to create log table: {e}"))?;

    for (name, level) in LEVELS {
        let log_fn = lua
            .create_function(move |_, parts: Variadic<String>| {
                ::log::log!(target: "lua", level, "{}", parts.join(" "));
                Ok(())
            })
            .map_err(|e| anyhow!("Failed to create log.{name} function: {e}"))?;

        log_table
            .set(name, log_fn)
            .map_err(|e| anyhow!("Failed to set log.{name}: {e}"))?;
    }

    lua.globals()
        .set("log", log_table)
        .map_err(|e| anyhow!("Failed to register log table globally: {e}"))?;

    Ok(())
}
