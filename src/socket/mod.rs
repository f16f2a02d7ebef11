//! TCP evaluation service.
//!
//! A [`server::Server`] accepts connections and runs one
//! [`client_conn::serve`] task per connection. Each task reads framed code,
//! evaluates it against the connection's scope, and writes back one framed
//! result per request.
//!
//! # Architecture
//!
//! ```text
//! Client Process                        Server Process (execlua -s)
//! ┌──────────────────┐                 ┌────────────────────────────┐
//! │ EvalClient       │                 │ Server                     │
//! │  TcpStream       │◄───────────────►│  TcpListener + stop flag   │
//! │  send() / quit() │  frames over    │  client_conn::serve        │
//! └──────────────────┘  TCP            │   per connection (LocalSet)│
//!                                      └─────────────┬──────────────┘
//!                                                    │ evaluate(code, scope)
//!                                                    ▼
//!                                          Evaluator (LuaRuntime)
//! ```
//!
//! # Wire Protocol
//!
//! Length-prefixed frames: `[u64 BE length][UTF-8 payload]`
//!
//! See [`framing`] for the codec.

pub mod framing;
pub mod server;
pub mod client_conn;
