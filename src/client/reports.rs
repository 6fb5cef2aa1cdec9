//! Payload types carried by the client's three signals.
// (c) 2026 nuke-ms contributors

use crate::wire::UniqueUserID;

/// Coarse connection status, as reported by [`ConnectionStatusReport`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connect attempt is in flight.
    Connecting,
    /// The duplex connection is up.
    Connected,
    /// There is presently no connection.
    Disconnected,
}

/// Why a [`ConnectionStatusReport`] was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReason {
    /// No further qualification; the status speaks for itself.
    None,
    /// A connect attempt failed (resolve or connect I/O error).
    ConnectFailed,
    /// The application asked to disconnect.
    UserRequested,
    /// The socket was closed by the peer or by a read/write error.
    SocketClosed,
    /// The call was a no-op because of the current state (e.g. connecting while already
    /// connected).
    Busy,
}

/// Emitted on the `connectionStatusReport` signal. Every connect attempt yields exactly one
/// terminal report; every connection yields at most one disconnect report after a successful
/// connect.
#[derive(Debug, Clone)]
pub struct ConnectionStatusReport {
    /// Coarse status.
    pub status: ConnectionStatus,
    /// Why.
    pub reason: StatusReason,
    /// Human-readable detail, e.g. an I/O error string or "Invalid remote site identifier".
    pub message: String,
}

impl ConnectionStatusReport {
    pub(crate) fn new(status: ConnectionStatus, reason: StatusReason, message: impl Into<String>) -> Self {
        Self {
            status,
            reason,
            message: message.into(),
        }
    }
}

/// Why a [`SendReport`] reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailReason {
    /// There was no connection to send on.
    NotConnected,
    /// The write failed at the transport level.
    ConnectionError,
}

/// Emitted on the `sendReport` signal. Every `send_user_message` call yields exactly one
/// terminal report.
#[derive(Debug, Clone)]
pub struct SendReport {
    /// The message identifier this report concerns.
    pub msg_id: u32,
    /// Whether the send succeeded.
    pub ok: bool,
    /// Populated when `ok` is `false`.
    pub reason: Option<SendFailReason>,
    /// Human-readable detail.
    pub message: String,
}

impl SendReport {
    pub(crate) fn ok(msg_id: u32) -> Self {
        Self {
            msg_id,
            ok: true,
            reason: None,
            message: String::new(),
        }
    }

    pub(crate) fn fail(msg_id: u32, reason: SendFailReason, message: impl Into<String>) -> Self {
        Self {
            msg_id,
            ok: false,
            reason: Some(reason),
            message: message.into(),
        }
    }
}

/// Emitted on the `rcvMessage` signal: a fully parsed, application-visible inbound message.
#[derive(Debug, Clone)]
pub struct ReceivedUserMessage {
    /// The sender-assigned (or server-stamped) message id.
    pub msg_id: u32,
    /// The message's sender, as stamped by the server.
    pub sender: UniqueUserID,
    /// The intended recipient ([`UniqueUserID::NONE`] for a broadcast the caller was a recipient
    /// of).
    pub recipient: UniqueUserID,
    /// The message text.
    pub text: String,
}
