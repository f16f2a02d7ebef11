//! TCP server for the evaluation service.
//!
//! Binds a `TcpListener` and spawns a [`client_conn::serve`] task for each
//! accepted connection. All tasks run on the current thread's `LocalSet`
//! because the evaluator is not `Send`.

use std::net::SocketAddr;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use super::client_conn;
use crate::config::ServerConfig;
use crate::constants::{ACCEPT_RETRY_DELAY, STOP_POLL_INTERVAL};
use crate::lua::LuaRuntime;
use crate::session::{Evaluator, ScopeProvisioner};

/// Process-wide "stop requested" flag.
///
/// Write-once-true: once requested, the server stops accepting and never
/// resumes. Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the server to stop accepting connections.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns true once a stop has been requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// The underlying flag, for registration with signal handlers.
    pub fn flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.0)
    }
}

/// State shared by every connection task of one server.
pub struct ServiceContext<E: Evaluator> {
    /// The evaluator all connections run code on.
    pub evaluator: E,
    /// Where each connection's scope comes from.
    pub provisioner: ScopeProvisioner<E::Scope>,
    /// Stop flag polled by the accept loop.
    pub stop: StopSignal,
    /// Whether the quit sentinel stops the server.
    pub allow_remote_shutdown: bool,
    /// Suppress informational stdout output.
    pub quiet: bool,
}

impl<E: Evaluator> std::fmt::Debug for ServiceContext<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContext")
            .field("provisioner", &self.provisioner)
            .field("stop", &self.stop)
            .field("allow_remote_shutdown", &self.allow_remote_shutdown)
            .field("quiet", &self.quiet)
            .finish_non_exhaustive()
    }
}

/// Evaluation server bound to a TCP address.
#[derive(Debug)]
pub struct Server<E: Evaluator> {
    listener: TcpListener,
    local_addr: SocketAddr,
    context: Rc<ServiceContext<E>>,
}

impl<E> Server<E>
where
    E: Evaluator + 'static,
    E::Scope: 'static,
{
    /// Bind the configured address.
    ///
    /// Port 0 binds an ephemeral port; [`Server::local_addr`] reports it.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub async fn bind(
        config: &ServerConfig,
        evaluator: E,
        provisioner: ScopeProvisioner<E::Scope>,
    ) -> Result<Self> {
        let address = config.address();
        let listener = TcpListener::bind(address.as_str())
            .await
            .with_context(|| format!("Failed to bind {address}"))?;
        let local_addr = listener
            .local_addr()
            .context("Failed to read bound address")?;

        log::info!("[Server] Listening on {local_addr} ({provisioner:?} scope)");

        Ok(Self {
            listener,
            local_addr,
            context: Rc::new(ServiceContext {
                evaluator,
                provisioner,
                stop: StopSignal::new(),
                allow_remote_shutdown: config.allow_remote_shutdown,
                quiet: config.quiet,
            }),
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle to this server's stop flag.
    pub fn stop_handle(&self) -> StopSignal {
        self.context.stop.clone()
    }

    /// Accept loop. Must run inside a `LocalSet`.
    ///
    /// Returns once a stop is requested and every in-flight connection has
    /// finished on its own. Connections are never forcibly closed.
    pub async fn run(self) -> Result<()> {
        let Self {
            listener,
            local_addr,
            context,
        } = self;

        let mut connections = JoinSet::new();
        let mut poll = tokio::time::interval(STOP_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !context.stop.is_requested() {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let conn_id = generate_conn_id();
                        log::info!("[Server] Client connected: {conn_id} ({peer})");
                        connections.spawn_local(client_conn::serve(
                            Rc::clone(&context),
                            conn_id,
                            stream,
                            peer,
                        ));
                    }
                    Err(e) => {
                        log::error!("[Server] Accept error: {e}");
                        tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
                    }
                },
                Some(joined) = connections.join_next(), if !connections.is_empty() => {
                    log_join_result(joined);
                }
                _ = poll.tick() => {}
            }
        }

        drop(listener);
        log::info!(
            "[Server] Stop requested, closed {local_addr}; waiting for {} connection(s)",
            connections.len()
        );

        while let Some(joined) = connections.join_next().await {
            log_join_result(joined);
        }

        log::info!("[Server] Stopped");
        Ok(())
    }
}

fn log_join_result(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        log::error!("[Server] Connection task failed: {e}");
    }
}

/// Generate a unique connection ID using a monotonic counter + random suffix.
fn generate_conn_id() -> String {
    use std::sync::atomic::AtomicU64;
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let rand: u16 = rand::random();
    format!("conn:{seq:x}{rand:04x}")
}

/// Run the Lua evaluation server described by `config` until it stops.
///
/// Loads the scope module (if any) before binding, so a bad module fails
/// startup. SIGINT, SIGTERM and SIGHUP request a stop; a second SIGINT
/// after that exits immediately.
///
/// Must run inside a `LocalSet`.
///
/// # Errors
///
/// Returns an error if the runtime, the scope module, the bind or the
/// signal registration fails.
pub async fn run_server(config: &ServerConfig) -> Result<()> {
    use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGTERM};
    use signal_hook::flag;

    let runtime = LuaRuntime::new(config.lua_path.clone())?;
    let provisioner =
        ScopeProvisioner::from_config(&runtime, config.module.as_deref(), config.scope_mode)?;

    let server = Server::bind(config, runtime, provisioner).await?;
    let stop = server.stop_handle();

    flag::register_conditional_shutdown(SIGINT, 1, stop.flag())?;
    flag::register(SIGINT, stop.flag())?;
    flag::register(SIGTERM, stop.flag())?;
    flag::register(SIGHUP, stop.flag())?;

    if !config.quiet {
        println!("Serving on {}", server.local_addr());
    }

    server.run().await
}
