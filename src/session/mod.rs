//! Evaluation sessions.
//!
//! A session is an [`Evaluator`] bound to a scope. The evaluator is a
//! pluggable capability: the protocol and connection handling only need
//! something that turns source text plus a mutable environment into an
//! [`EvalOutcome`]. The shipped implementation is the embedded Lua runtime
//! ([`crate::lua::LuaRuntime`]).
//!
//! # Scope persistence
//!
//! Scopes are handles. Cloning a scope shares the underlying environment, so
//! every assignment made by one evaluation is visible to the next evaluation
//! on the same scope, and to every connection holding a clone of it.

pub mod provisioner;

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use crate::constants::EXCEPTION_PREFIX;

pub use provisioner::{ScopeFactory, ScopeProvisioner};

/// Result of evaluating one payload. Only text crosses the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvalOutcome {
    /// Stringified value of the evaluated code (empty when it produced none).
    Ok(String),
    /// Description of the failure, already prefixed for the client.
    Err(String),
}

impl EvalOutcome {
    /// Build an error outcome from any failure description.
    pub fn exception(description: impl fmt::Display) -> Self {
        Self::Err(format!("{EXCEPTION_PREFIX}{description}"))
    }

    /// The text sent back to the client.
    pub fn text(&self) -> &str {
        match self {
            Self::Ok(text) | Self::Err(text) => text,
        }
    }

    /// Returns true for a successful evaluation.
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }
}

/// Executes submitted code against a mutable variable scope.
///
/// Implementations run on the service's single thread, so neither the
/// evaluator nor its futures need to be `Send`.
#[async_trait(?Send)]
pub trait Evaluator {
    /// Handle to a variable environment. Clones share the same environment.
    type Scope: Clone;

    /// Create a fresh, empty scope.
    fn new_scope(&self) -> Result<Self::Scope>;

    /// Load a named extension module and return its scope factory.
    ///
    /// Fails when the module cannot be loaded or does not expose the
    /// required `get_scope` entry point.
    fn load_scope_factory(&self, module: &str) -> Result<ScopeFactory<Self::Scope>>;

    /// Evaluate `code` against `scope`.
    ///
    /// Never fails: every error raised while compiling or running the code
    /// is converted into [`EvalOutcome::Err`].
    async fn evaluate(&self, code: &str, scope: &Self::Scope) -> EvalOutcome;
}
