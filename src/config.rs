//! Runtime configuration for the server and the client.
//!
//! There is no configuration file. Values are layered as defaults, then
//! environment variable overrides, then command-line flags (applied by the
//! binary on top of [`ServerConfig::load`] / [`ClientConfig::load`]).
//!
//! # Environment Variables
//!
//! - `EXECLUA_HOST` - Host to bind or connect to
//! - `EXECLUA_PORT` - Port to bind or connect to
//! - `EXECLUA_LUA_PATH` - Directory searched for scope modules (`--module`)

use std::path::PathBuf;

use clap::ValueEnum;

use crate::constants::{DEFAULT_HOST, DEFAULT_PORT};

/// How connections obtain their evaluation scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ScopeMode {
    /// One process-wide scope shared by every connection.
    #[default]
    Shared,
    /// A fresh scope for each accepted connection.
    PerConnection,
}

/// Server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to bind (0 picks an ephemeral port).
    pub port: u16,
    /// Lua module exporting `get_scope()`, if any.
    pub module: Option<String>,
    /// Scope sharing strategy.
    pub scope_mode: ScopeMode,
    /// Directory added to the Lua module search path.
    pub lua_path: PathBuf,
    /// Whether a client may stop the server with the quit sentinel.
    pub allow_remote_shutdown: bool,
    /// Suppress informational output.
    pub quiet: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            module: None,
            scope_mode: ScopeMode::default(),
            lua_path: default_lua_path(),
            allow_remote_shutdown: false,
            quiet: false,
        }
    }
}

impl ServerConfig {
    /// Defaults with environment overrides applied.
    pub fn load() -> Self {
        let mut config = Self::default();
        apply_address_overrides(&mut config.host, &mut config.port);
        if let Ok(path) = std::env::var("EXECLUA_LUA_PATH") {
            config.lua_path = PathBuf::from(path);
        }
        config
    }

    /// `host:port` string for binding.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Client settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Host to connect to.
    pub host: String,
    /// Port to connect to.
    pub port: u16,
    /// Lines of code, joined with `\n` into a single payload.
    pub lines: Vec<String>,
    /// Read further payloads from stdin after sending `lines`.
    pub interactive: bool,
    /// Each entry of `lines` is base64 encoded.
    pub base64: bool,
    /// Send the quit sentinel before closing.
    pub send_quit: bool,
    /// Suppress informational output.
    pub quiet: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            lines: Vec::new(),
            interactive: false,
            base64: false,
            send_quit: false,
            quiet: false,
        }
    }
}

impl ClientConfig {
    /// Defaults with environment overrides applied.
    pub fn load() -> Self {
        let mut config = Self::default();
        apply_address_overrides(&mut config.host, &mut config.port);
        config
    }
}

fn apply_address_overrides(host: &mut String, port: &mut u16) {
    apply_address_overrides_from(host, port, |key| std::env::var(key).ok());
}

fn apply_address_overrides_from(
    host: &mut String,
    port: &mut u16,
    lookup: impl Fn(&str) -> Option<String>,
) {
    if let Some(env_host) = lookup("EXECLUA_HOST") {
        *host = env_host;
    }

    if let Some(env_port) = lookup("EXECLUA_PORT") {
        match env_port.parse::<u16>() {
            Ok(parsed) => *port = parsed,
            Err(e) => log::warn!("Ignoring EXECLUA_PORT={env_port}: {e}"),
        }
    }
}

/// Default module directory: `~/.execlua/lua`.
fn default_lua_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".execlua").join("lua"))
        .unwrap_or_else(|| PathBuf::from(".execlua/lua"))
}
