//! Client side of the evaluation service.
//!
//! [`EvalClient`] holds one connection and sends payloads strictly one at a
//! time, waiting for each response before the next request.
//! [`run_client`] is the command-line driver built on top of it.

pub mod input;

use std::net::SocketAddr;

use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;

use crate::config::ClientConfig;
use crate::constants::QUIT_SENTINEL;
use crate::socket::framing::{write_message, FrameReader};
use input::InteractiveInput;

/// One connection to an evaluation server.
#[derive(Debug)]
pub struct EvalClient {
    reader: FrameReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
}

impl EvalClient {
    /// Connect to `host:port`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .await
            .with_context(|| format!("Failed to connect to {host}:{port}"))?;
        let peer = stream.peer_addr().context("Failed to read peer address")?;
        let (read_half, writer) = stream.into_split();

        log::info!("[Client] Connected to {peer}");

        Ok(Self {
            reader: FrameReader::new(read_half),
            writer,
            peer,
        })
    }

    /// Address of the server.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Send one payload and wait for its response.
    ///
    /// Evaluation errors are ordinary responses (prefixed with
    /// `An exception occurred: `), not `Err`.
    ///
    /// # Errors
    ///
    /// Returns an error if `code` is empty (the server would treat it as
    /// end-of-input), on I/O failure, or if the server closes the
    /// connection instead of responding.
    pub async fn send(&mut self, code: &str) -> Result<String> {
        if code.is_empty() {
            bail!("Refusing to send an empty payload; it would end the session");
        }

        write_message(&mut self.writer, code)
            .await
            .with_context(|| format!("Failed to send request to {}", self.peer))?;

        self.reader
            .next_message()
            .await?
            .ok_or_else(|| anyhow!("Connection closed by server"))
    }

    /// Send the quit sentinel. The server sends no response to it.
    ///
    /// Only stops the server when it was started with client shutdown
    /// enabled; otherwise the sentinel is evaluated like any other code.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn quit(&mut self) -> Result<()> {
        write_message(&mut self.writer, QUIT_SENTINEL)
            .await
            .context("Failed to send quit sentinel")
    }

    /// Close the connection.
    ///
    /// # Errors
    ///
    /// Returns an error if shutting down the write half fails.
    pub async fn close(mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .context("Failed to close connection")?;
        log::info!("[Client] Closed connection to {}", self.peer);
        Ok(())
    }
}

/// Join command-line lines into one payload, decoding base64 if asked.
///
/// Returns `None` when there is nothing to send.
///
/// # Errors
///
/// Returns an error if a line is not valid base64 or does not decode to
/// UTF-8.
pub fn assemble_payload(lines: &[String], base64: bool) -> Result<Option<String>> {
    let lines = if base64 {
        lines
            .iter()
            .map(|line| {
                let bytes = STANDARD
                    .decode(line.trim())
                    .with_context(|| format!("Invalid base64 line: {line}"))?;
                String::from_utf8(bytes).context("Base64 line is not valid UTF-8")
            })
            .collect::<Result<Vec<_>>>()?
    } else {
        lines.to_vec()
    };

    let payload = lines.join("\n");
    Ok((!payload.is_empty()).then_some(payload))
}

fn print_response(config: &ClientConfig, response: &str) {
    if config.quiet {
        println!("{response}");
    } else {
        println!("Received:\n {response}");
    }
}

/// Run the command-line client described by `config`.
///
/// Sends the joined `lines` (if any), then interactive input (if enabled),
/// then the quit sentinel (if enabled), and closes.
///
/// # Errors
///
/// Returns an error on connection failure, bad base64 input, or if the
/// server closes the connection mid-session.
pub async fn run_client(config: &ClientConfig) -> Result<()> {
    let payload = assemble_payload(&config.lines, config.base64)?;
    let mut client = EvalClient::connect(&config.host, config.port).await?;

    if let Some(payload) = payload {
        let response = client.send(&payload).await?;
        print_response(config, &response);
    }

    if config.interactive {
        let mut input = InteractiveInput::stdin();
        while let Some(message) = input.next_message().await? {
            let response = client.send(&message).await?;
            print_response(config, &response);
        }
    }

    if config.send_quit {
        client.quit().await?;
    }

    client.close().await?;

    if !config.quiet {
        println!("Close the connection");
    }

    Ok(())
}
