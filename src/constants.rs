//! Application-wide constants for execlua.
//!
//! Protocol constants, sentinels, and service timings live here so the
//! server, the client, and the tests agree on them.

use std::time::Duration;

// ============================================================================
// Wire Protocol
// ============================================================================

/// Size of the big-endian length prefix that starts every frame.
pub const LENGTH_PREFIX_SIZE: usize = 8;

/// Maximum frame payload size (16 MB).
///
/// A frame announcing a larger payload is a protocol error and closes the
/// connection before any payload memory is allocated.
pub const MAX_FRAME_SIZE: u64 = 16 * 1024 * 1024;

/// Read buffer size for socket reads (64 KB).
pub const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Payload that asks the server to stop, when client shutdown is enabled.
pub const QUIT_SENTINEL: &str = r"\q";

// ============================================================================
// Evaluation
// ============================================================================

/// Prefix of every evaluation error sent back to a client.
pub const EXCEPTION_PREFIX: &str = "An exception occurred: ";

/// Chunk name used in Lua error messages for submitted code.
pub const REQUEST_CHUNK_NAME: &str = "=request";

// ============================================================================
// Service
// ============================================================================

/// Interval at which the accept loop checks the stop-requested flag.
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Default bind/connect host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default port (0 lets the OS pick an ephemeral port when serving).
pub const DEFAULT_PORT: u16 = 0;

// ============================================================================
// Interactive Input
// ============================================================================

/// Input line that aborts interactive input.
pub const INPUT_QUIT: &str = r"\q";

/// Input line that clears the in-progress multi-line buffer.
pub const INPUT_CLEAR: &str = r"\c";
