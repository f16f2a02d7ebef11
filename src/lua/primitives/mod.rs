//! Lua primitive functions exposed to evaluated code.
//!
//! Primitives are registered as globals when the runtime is created. Scopes
//! see them through their `__index` fallback, so a client can shadow one by
//! assigning the same name in its own scope without affecting others.
//!
//! # Available Primitives
//!
//! - `log` - Route messages through the server's logger
//! - `json` - JSON encode/decode, for returning structured values as text
//! - `time` - `sleep` (suspends the evaluation, not the server) and `now`
//!
//! # Adding New Primitives
//!
//! 1. Create a new module (e.g., `foo.rs`)
//! 2. Implement a `register(lua: &Lua) -> Result<()>` function
//! 3. Add `pub mod foo;` here
//! 4. Call `foo::register(lua)?;` in `register_all`

pub mod json;
pub mod log;
pub mod time;

use anyhow::Result;
use mlua::Lua;

/// Register every primitive table on `lua`'s globals.
///
/// # Errors
///
/// Returns an error if any primitive fails to register.
pub fn register_all(lua: &Lua) -> Result<()> {
    log::register(lua)?;
    json::register(lua)?;
    time::register(lua)?;
    Ok(())
}
