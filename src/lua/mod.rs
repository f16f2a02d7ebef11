//! Embedded Lua evaluator.
//!
//! One Lua state serves every connection. Each request is compiled as its own
//! chunk whose `_ENV` is the connection's scope table, so global assignments
//! land in the scope and persist across requests, while reads of unknown
//! names fall through to the interpreter globals (standard library plus the
//! primitives below).
//!
//! # Architecture
//!
//! ```text
//! Server
//!  └── LuaRuntime (Evaluator)
//!       ├── Lua state (mlua, !Send, lives on the service thread)
//!       ├── package.path += lua_path (scope modules)
//!       └── Primitives
//!            ├── log  (info, warn, error, debug, trace)
//!            ├── json (encode, decode)
//!            └── time (sleep [suspends], now)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let runtime = LuaRuntime::new(config.lua_path.clone())?;
//! let scope = runtime.new_scope()?;
//! runtime.evaluate("x = 1", &scope).await;          // Ok("")
//! runtime.evaluate("x + 1", &scope).await;          // Ok("2")
//! runtime.evaluate("error('boom')", &scope).await;  // Err("An exception occurred: request:1: boom")
//! ```

pub mod primitives;
pub mod runtime;

pub use runtime::LuaRuntime;
