//! Scope provisioning strategies.
//!
//! Decides which scope each accepted connection evaluates against:
//!
//! - **Per-connection**: a fresh empty scope per connection, isolated.
//! - **Shared**: one scope created at startup and handed to every
//!   connection. No lock is taken; interleaved evaluations from different
//!   connections see each other's writes, last write wins.
//! - **Factory**: a scope produced by an extension module's `get_scope()`,
//!   called once per connection. (A factory used in shared mode is called
//!   once at startup and becomes a `Shared` provisioner.)

use std::fmt;

use anyhow::Result;

use super::Evaluator;
use crate::config::ScopeMode;

/// Zero-argument scope constructor loaded from an extension module.
pub type ScopeFactory<S> = Box<dyn Fn() -> Result<S>>;

/// Strategy yielding the scope for each connection.
pub enum ScopeProvisioner<S> {
    /// Fresh empty scope per connection.
    PerConnection,
    /// One process-wide scope shared by all connections.
    Shared(S),
    /// Module-provided factory invoked per connection.
    Factory(ScopeFactory<S>),
}

impl<S> fmt::Debug for ScopeProvisioner<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerConnection => f.write_str("PerConnection"),
            Self::Shared(_) => f.write_str("Shared"),
            Self::Factory(_) => f.write_str("Factory"),
        }
    }
}

impl<S: Clone> ScopeProvisioner<S> {
    /// Build the provisioner selected at startup.
    ///
    /// Module loading happens here, so a module without `get_scope()` (or a
    /// shared-mode `get_scope()` that fails) aborts startup instead of
    /// surfacing later as a per-connection failure.
    ///
    /// # Errors
    ///
    /// Returns an error if the module cannot be loaded or validated, or the
    /// initial shared scope cannot be created.
    pub fn from_config<E>(evaluator: &E, module: Option<&str>, mode: ScopeMode) -> Result<Self>
    where
        E: Evaluator<Scope = S>,
    {
        let provisioner = match (module, mode) {
            (None, ScopeMode::PerConnection) => Self::PerConnection,
            (None, ScopeMode::Shared) => Self::Shared(evaluator.new_scope()?),
            (Some(module), ScopeMode::Shared) => {
                let factory = evaluator.load_scope_factory(module)?;
                Self::Shared(factory()?)
            }
            (Some(module), ScopeMode::PerConnection) => {
                Self::Factory(evaluator.load_scope_factory(module)?)
            }
        };

        log::debug!("Scope provisioner: {provisioner:?} (module={module:?})");
        Ok(provisioner)
    }

    /// Scope for a newly accepted connection.
    ///
    /// # Errors
    ///
    /// Returns an error if a fresh scope cannot be created or the module's
    /// factory fails for this connection.
    pub fn provision<E>(&self, evaluator: &E) -> Result<S>
    where
        E: Evaluator<Scope = S>,
    {
        match self {
            Self::PerConnection => evaluator.new_scope(),
            Self::Shared(scope) => Ok(scope.clone()),
            Self::Factory(factory) => factory(),
        }
    }
}
