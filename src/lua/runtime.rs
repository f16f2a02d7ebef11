//! Lua runtime management.
//!
//! Provides the `LuaRuntime` struct which owns the Lua interpreter state and
//! implements [`Evaluator`] on top of it: compiling submitted code against a
//! scope table, running it as a coroutine so primitives can suspend, and
//! turning values and errors into text.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use mlua::{Function, Lua, Table, Value, Variadic};

use super::primitives;
use crate::constants::REQUEST_CHUNK_NAME;
use crate::session::{EvalOutcome, Evaluator, ScopeFactory};

/// Makes unknown names in a scope resolve against the interpreter globals.
///
/// Scopes that already carry a metatable (e.g. from a module's
/// `get_scope()`) are left as they are.
const ATTACH_GLOBALS: &str = r"
local scope, globals = ...
if getmetatable(scope) == nil then
    setmetatable(scope, { __index = globals })
end
";

/// Lua scripting runtime used as the service evaluator.
///
/// The Lua state is not `Send`; the runtime must stay on the thread that
/// drives the service's `LocalSet`.
pub struct LuaRuntime {
    /// The Lua interpreter state.
    lua: Lua,
    /// Directory searched for scope modules.
    base_path: PathBuf,
}

impl std::fmt::Debug for LuaRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LuaRuntime")
            .field("base_path", &self.base_path)
            .field("used_memory", &self.lua.used_memory())
            .finish_non_exhaustive()
    }
}

impl LuaRuntime {
    /// Create a runtime searching `base_path` for scope modules.
    ///
    /// Registers the `log`, `json` and `time` primitives and prepends the
    /// base path to `package.path` so `require` finds scope modules there.
    ///
    /// # Errors
    ///
    /// Returns an error if primitive registration or package setup fails.
    pub fn new(base_path: PathBuf) -> Result<Self> {
        let lua = Lua::new();

        primitives::register_all(&lua).context("Failed to register Lua primitives")?;
        Self::setup_package_path(&lua, &base_path)?;

        log::debug!("Lua runtime created (base_path={})", base_path.display());

        Ok(Self { lua, base_path })
    }

    /// Prepend `{base}/?.lua` and `{base}/?/init.lua` to `package.path`.
    fn setup_package_path(lua: &Lua, base_path: &Path) -> Result<()> {
        let package: Table = lua
            .globals()
            .get("package")
            .map_err(|e| anyhow!("Failed to get package table: {e}"))?;

        let current_path: String = package
            .get("path")
            .map_err(|e| anyhow!("Failed to get package.path: {e}"))?;

        let new_path = format!(
            "{path}/?.lua;{path}/?/init.lua;{current}",
            path = base_path.display(),
            current = current_path
        );

        package
            .set("path", new_path)
            .map_err(|e| anyhow!("Failed to set package.path: {e}"))?;

        Ok(())
    }

    /// Directory searched for scope modules.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Get a reference to the underlying Lua state.
    #[must_use]
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Compile `code` with `scope` as its environment.
    ///
    /// Tries `return <code>` first so bare expressions produce a value, and
    /// falls back to compiling the code as a statement block.
    fn compile(&self, code: &str, scope: &Table) -> mlua::Result<Function> {
        let expression = format!("return {code}");
        let as_expression = self
            .lua
            .load(expression.as_str())
            .set_name(REQUEST_CHUNK_NAME)
            .set_environment(scope.clone())
            .into_function();

        match as_expression {
            Ok(function) => Ok(function),
            Err(_) => self
                .lua
                .load(code)
                .set_name(REQUEST_CHUNK_NAME)
                .set_environment(scope.clone())
                .into_function(),
        }
    }

    /// Run `code` to completion and stringify what it returned.
    async fn run(&self, code: &str, scope: &Table) -> mlua::Result<String> {
        let function = self.compile(code, scope)?;
        let values: Variadic<Value> = function.call_async(()).await?;

        if values.iter().all(Value::is_nil) {
            return Ok(String::new());
        }

        let tostring: Function = self.lua.globals().get("tostring")?;
        let parts = values
            .iter()
            .map(|value| tostring.call::<String>(value.clone()))
            .collect::<mlua::Result<Vec<_>>>()?;

        Ok(parts.join("\t"))
    }
}

/// Point unknown names in `scope` at the interpreter globals.
fn attach_globals(lua: &Lua, scope: &Table) -> Result<()> {
    lua.load(ATTACH_GLOBALS)
        .set_name("=attach_globals")
        .call::<()>((scope.clone(), lua.globals()))
        .map_err(|e| anyhow!("Failed to attach globals to scope: {e}"))
}

/// Human-readable description of a Lua error, without the traceback.
fn describe_error(error: &mlua::Error) -> String {
    match error {
        mlua::Error::RuntimeError(message) => strip_traceback(message),
        mlua::Error::SyntaxError { message, .. } => strip_traceback(message),
        mlua::Error::CallbackError { cause, .. } => describe_error(cause),
        other => strip_traceback(&other.to_string()),
    }
}

fn strip_traceback(message: &str) -> String {
    message
        .split("\nstack traceback:")
        .next()
        .unwrap_or(message)
        .trim_end()
        .to_string()
}

#[async_trait(?Send)]
impl Evaluator for LuaRuntime {
    type Scope = Table;

    fn new_scope(&self) -> Result<Table> {
        let scope = self
            .lua
            .create_table()
            .map_err(|e| anyhow!("Failed to create scope table: {e}"))?;
        attach_globals(&self.lua, &scope)?;
        Ok(scope)
    }

    /// `require` the module and validate its `get_scope` export.
    fn load_scope_factory(&self, module: &str) -> Result<ScopeFactory<Table>> {
        let require: Function = self
            .lua
            .globals()
            .get("require")
            .map_err(|e| anyhow!("Failed to get require function: {e}"))?;

        let exports: Value = require
            .call(module)
            .map_err(|e| anyhow!("Failed to load Lua module '{module}': {e}"))?;

        let exports = match exports {
            Value::Table(table) => table,
            other => bail!(
                "Lua module '{module}' must return a table, got {}",
                other.type_name()
            ),
        };

        let get_scope = match exports.get::<Value>("get_scope") {
            Ok(Value::Function(function)) => function,
            _ => bail!("Lua module '{module}' does not define get_scope()"),
        };

        log::info!("Loaded scope module '{module}'");

        let lua = self.lua.clone();
        let module = module.to_string();
        Ok(Box::new(move || -> Result<Table> {
            let value: Value = get_scope
                .call(())
                .map_err(|e| anyhow!("{module}.get_scope() failed: {e}"))?;

            let scope = match value {
                Value::Table(table) => table,
                other => bail!(
                    "{module}.get_scope() must return a table, got {}",
                    other.type_name()
                ),
            };

            attach_globals(&lua, &scope)?;
            Ok(scope)
        }))
    }

    async fn evaluate(&self, code: &str, scope: &Table) -> EvalOutcome {
        match self.run(code, scope).await {
            Ok(text) => EvalOutcome::Ok(text),
            Err(e) => {
                log::debug!("Evaluation failed: {e}");
                EvalOutcome::exception(describe_error(&e))
            }
        }
    }
}
