//! Error taxonomy for the wire protocol and the operational plumbing around it.
// (c) 2026 nuke-ms contributors

use thiserror::Error;

/// Errors that can arise while parsing a layer from a [`SerializedData`](crate::wire::SerializedData)
/// view, or while validating a value about to be serialized.
///
/// These never cross a thread boundary as a panic or an exception: every site that can produce one
/// converts it to report data on the relevant signal (see the crate-level docs for the reporting
/// contract).
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    /// A fixed header byte did not match its required value (tag, pad, or similar).
    #[error("Invalid header: {detail}")]
    InvalidHeader {
        /// Human-readable detail of which byte/field was wrong.
        detail: &'static str,
    },

    /// The input was shorter than the minimum size this layer requires.
    #[error("Undersized packet: needed at least {needed} bytes, got {got}")]
    UndersizedPacket {
        /// Minimum number of bytes required.
        needed: usize,
        /// Number of bytes actually supplied.
        got: usize,
    },

    /// The declared size exceeded the protocol maximum.
    #[error("Oversized packet.")]
    OversizedPacket {
        /// The declared size.
        size: usize,
        /// The protocol maximum ([`MAX_PACKET_SIZE`](crate::wire::MAX_PACKET_SIZE)).
        max: usize,
    },

    /// A `StringwrapLayer` payload had an odd number of bytes, so it cannot be a whole number
    /// of 16-bit code units.
    #[error("Unaligned payload: {len} bytes is not a multiple of 2")]
    UnalignedPayload {
        /// The offending payload length.
        len: usize,
    },
}

/// Errors arising from the operational (I/O, resolve, connect) side of the core, as distinct from
/// wire-format parsing. These are the errors that get folded into `ConnectReport`/`Disconnected`
/// events; nothing here is ever allowed to unwind across a reactor callback boundary.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Parsing a layer off the wire failed.
    #[error(transparent)]
    Framing(#[from] FramingError),

    /// The textual `host:service` location could not be parsed.
    #[error("Invalid remote site identifier")]
    InvalidLocation,

    /// DNS resolution found no usable endpoints.
    #[error("no hosts found")]
    NoHostsFound,

    /// Every resolved endpoint refused the connection attempt.
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The underlying socket reported an I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was deliberately torn down; operations in flight observed cancellation.
    /// This variant is never surfaced to application callbacks — it is absorbed internally.
    #[error("operation aborted")]
    Aborted,
}

impl CoreError {
    /// Renders the error the way it should appear in a report/disconnect reason string.
    pub fn report_text(&self) -> String {
        self.to_string()
    }
}
