//! execlua CLI - serve or query a Lua evaluation server.
//!
//! This is the main binary entry point. See the `execlua` library for the
//! core functionality.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use execlua::{run_client, run_server, ClientConfig, ScopeMode, ServerConfig};
use mimalloc::MiMalloc;

/// Global allocator configured per M-MIMALLOC-APPS guideline.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

// CLI
#[derive(Parser, Debug)]
#[command(name = "execlua")]
#[command(version)]
#[command(about = "Lua interpreter server and client")]
#[command(disable_help_flag = true)]
struct Cli {
    /// Print help
    #[arg(long, action = clap::ArgAction::Help)]
    help: Option<bool>,

    /// Run in server mode
    #[arg(short, long, conflicts_with = "client")]
    server: bool,

    /// Run in client mode (the default)
    #[arg(short, long)]
    client: bool,

    /// Host to bind or connect to [default: 127.0.0.1]
    #[arg(short = 'H', long)]
    host: Option<String>,

    /// Port to listen on or connect to [default: 0]
    #[arg(short, long)]
    port: Option<u16>,

    /// Run the client in interactive mode
    #[arg(short, long)]
    interactive: bool,

    /// Lua module defining get_scope(), used to construct each scope
    #[arg(short, long)]
    module: Option<String>,

    /// Scope sharing between connections
    #[arg(long, value_enum)]
    scope: Option<ScopeMode>,

    /// Directory searched for Lua modules [default: ~/.execlua/lua]
    #[arg(long)]
    lua_path: Option<PathBuf>,

    /// Client: each line is base64 encoded
    #[arg(short, long)]
    base64: bool,

    /// Suppress informational output
    #[arg(short, long)]
    quiet: bool,

    /// Server: let clients stop it with \q. Client: send \q before closing
    #[arg(short, long)]
    exit: bool,

    /// Lines of Lua code to execute, joined with newlines
    lines: Vec<String>,
}

impl Cli {
    fn server_config(self) -> ServerConfig {
        let mut config = ServerConfig::load();
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(scope) = self.scope {
            config.scope_mode = scope;
        }
        if let Some(lua_path) = self.lua_path {
            config.lua_path = lua_path;
        }
        config.module = self.module;
        config.allow_remote_shutdown = self.exit;
        config.quiet = self.quiet;
        config
    }

    fn client_config(self) -> ClientConfig {
        let mut config = ClientConfig::load();
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        config.lines = self.lines;
        config.interactive = self.interactive;
        config.base64 = self.base64;
        config.send_quit = self.exit;
        config.quiet = self.quiet;
        config
    }
}

/// Log to `EXECLUA_LOG_FILE` when set, otherwise stderr.
fn init_logging() -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    builder.format_timestamp_secs();

    if let Ok(path) = std::env::var("EXECLUA_LOG_FILE") {
        let log_file = std::fs::File::create(&path)
            .with_context(|| format!("Failed to create log file at {path}"))?;
        builder.target(env_logger::Target::Pipe(Box::new(log_file)));
    }

    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    init_logging()?;

    let cli = Cli::parse();

    // Single thread: the Lua state is !Send and every connection shares it
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;
    let local = tokio::task::LocalSet::new();

    if cli.server && !cli.client {
        let config = cli.server_config();
        log::info!("Starting execlua server v{}", env!("CARGO_PKG_VERSION"));
        local.block_on(&rt, run_server(&config))
    } else {
        let config = cli.client_config();
        local.block_on(&rt, run_client(&config))
    }
}
