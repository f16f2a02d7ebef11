//! Per-connection request loop (server side).
//!
//! Each accepted connection runs [`serve`], which alternates strictly
//! between reading one request frame and writing one response frame:
//!
//! ```text
//! AwaitFrame ──code──▶ Evaluating ──outcome──▶ Responding ──written──┐
//!     ▲                                                              │
//!     └──────────────────────────────────────────────────────────────┘
//!     │ EOF / empty payload / protocol error / quit sentinel
//!     ▼
//!   Closed
//! ```

use std::net::SocketAddr;
use std::rc::Rc;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use super::framing::{write_message, FrameReader};
use super::server::ServiceContext;
use crate::constants::{MAX_FRAME_SIZE, QUIT_SENTINEL};
use crate::session::{EvalOutcome, Evaluator};

/// Where a connection is in its request/response cycle.
#[derive(Debug, PartialEq, Eq)]
enum ConnState {
    /// Waiting for the next request frame.
    AwaitFrame,
    /// A request arrived and is about to be evaluated.
    Evaluating(String),
    /// The outcome is ready to be written back.
    Responding(EvalOutcome),
    /// Terminal; the socket is released.
    Closed,
}

/// Serve one connection until the peer leaves or asks the server to stop.
///
/// The connection's scope is provisioned here; if that fails the connection
/// is dropped without a response and the server keeps running.
pub async fn serve<E: Evaluator>(
    context: Rc<ServiceContext<E>>,
    conn_id: String,
    stream: TcpStream,
    peer: SocketAddr,
) {
    let scope = match context.provisioner.provision(&context.evaluator) {
        Ok(scope) => scope,
        Err(e) => {
            log::error!("[Conn] Failed to provision scope for {conn_id}: {e:#}");
            return;
        }
    };

    let (read_half, mut writer) = stream.into_split();
    let mut reader = FrameReader::new(read_half);
    let mut state = ConnState::AwaitFrame;

    loop {
        state = match state {
            ConnState::AwaitFrame => match reader.next_message().await {
                Ok(Some(message)) => on_message(&context, &conn_id, peer, message),
                Ok(None) => {
                    log::info!("[Conn] Client disconnected: {conn_id}");
                    ConnState::Closed
                }
                Err(e) => {
                    log::error!("[Conn] Frame decode error for {conn_id}: {e}");
                    ConnState::Closed
                }
            },
            ConnState::Evaluating(code) => {
                let outcome = context.evaluator.evaluate(&code, &scope).await;
                ConnState::Responding(fit_frame(outcome))
            }
            ConnState::Responding(outcome) => {
                match write_message(&mut writer, outcome.text()).await {
                    Ok(()) => ConnState::AwaitFrame,
                    Err(e) => {
                        log::error!("[Conn] Write error for {conn_id}: {e}");
                        ConnState::Closed
                    }
                }
            }
            ConnState::Closed => break,
        };
    }

    if let Err(e) = writer.shutdown().await {
        log::debug!("[Conn] Shutdown of {conn_id} failed: {e}");
    }

    if !context.quiet {
        println!("Close the connection");
    }
    log::info!("[Conn] Closed {conn_id}");
}

/// Replace a result the peer could not read back with an exception.
///
/// Readers reject frames over [`MAX_FRAME_SIZE`], so sending one would leave
/// the connection unusable.
fn fit_frame(outcome: EvalOutcome) -> EvalOutcome {
    let size = outcome.text().len() as u64;
    if size > MAX_FRAME_SIZE {
        log::warn!("[Conn] Dropping {size} byte result (max {MAX_FRAME_SIZE})");
        return EvalOutcome::exception(format!(
            "result too large: {size} bytes (max {MAX_FRAME_SIZE})"
        ));
    }
    outcome
}

/// Decide what a freshly read payload means for the connection.
fn on_message<E: Evaluator>(
    context: &ServiceContext<E>,
    conn_id: &str,
    peer: SocketAddr,
    message: String,
) -> ConnState {
    if message.is_empty() {
        log::info!("[Conn] Empty payload from {conn_id}, closing");
        return ConnState::Closed;
    }

    if !context.quiet {
        println!("Received from {peer}:\n {message}");
    }

    if message == QUIT_SENTINEL && context.allow_remote_shutdown {
        log::info!("[Conn] Stop requested by {conn_id}");
        context.stop.request();
        return ConnState::Closed;
    }

    log::debug!("[Conn] {conn_id} sent {} bytes", message.len());
    ConnState::Evaluating(message)
}
