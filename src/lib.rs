//! execlua - Lua interpreter server and client.
//!
//! A server accepts TCP connections, reads length-prefixed Lua source
//! payloads, evaluates each against the connection's scope, and answers with
//! the stringified result (or `An exception occurred: ...`). The client sends
//! code from the command line or interactively and prints the responses.
//!
//! # Modules
//!
//! - [`socket`] - Wire framing, server accept loop, per-connection handler
//! - [`session`] - `Evaluator` trait, evaluation outcomes, scope provisioning
//! - [`lua`] - The embedded Lua evaluator and its primitives
//! - [`client`] - Connection wrapper and command-line driver
//! - [`config`] - Server and client settings
//! - [`constants`] - Protocol and service constants

pub mod client;
pub mod config;
pub mod constants;
pub mod lua;
pub mod session;
pub mod socket;

pub use client::{run_client, EvalClient};
pub use config::{ClientConfig, ScopeMode, ServerConfig};
pub use lua::LuaRuntime;
pub use session::{EvalOutcome, Evaluator, ScopeProvisioner};
pub use socket::server::{run_server, Server, StopSignal};
