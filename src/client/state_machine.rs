//! The event-driven client state machine: `Waiting` / `Negotiating` / `Connected`.
//!
//! Transitions are dispatched by [`dispatch`], which locks the machine's mutex, applies the
//! transition table from the spec, and (for transitions that kick off I/O) spawns a task onto the
//! facade's dedicated reactor runtime. The machine's mutable data — state tag, and the write-queue
//! handle while `Connected` — lives in [`StateMachine`], held by the outer [`ClientShared`].
// (c) 2026 nuke-ms contributors

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::client::reports::{
    ConnectionStatus, ConnectionStatusReport, SendFailReason, SendReport, StatusReason,
};
use crate::client::ClientShared;
use crate::util::framing_io::{read_frame, write_frame};
use crate::wire::{Layer, NearUserMessage, SegmentationLayer, SerializedData, UniqueUserID};

/// The three client states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum State {
    /// No I/O is in flight.
    Waiting,
    /// Resolving and/or connecting.
    Negotiating,
    /// Duplex connection established.
    Connected,
}

/// One outbound message queued for the writer task.
pub(crate) struct WriteJob {
    pub(crate) msg_id: u32,
    pub(crate) bytes: Vec<u8>,
}

/// Events accepted by the machine. Payloads are moved, never shared.
pub(crate) enum Event {
    /// Application asked to connect to `host:service`.
    ConnectRequest { host: String, service: String },
    /// The resolve/connect task completed, with either a connected socket or a failure message.
    ConnectReport { result: Result<TcpStream, String> },
    /// Application asked to disconnect.
    DisconnectRequest,
    /// The receive loop or writer task observed the connection go away.
    Disconnected { reason: String },
    /// Application asked to send a message.
    SendMessage {
        msg_id: u32,
        recipient: UniqueUserID,
        text: String,
    },
    /// The receive loop delivered one frame body.
    ReceivedMessage { data: SerializedData },
}

/// The machine's own mutable data, held behind the facade's mutex.
pub(crate) struct StateMachine {
    pub(crate) state: State,
    writer_tx: Option<mpsc::UnboundedSender<WriteJob>>,
}

impl StateMachine {
    pub(crate) fn new() -> Self {
        Self {
            state: State::Waiting,
            writer_tx: None,
        }
    }
}

/// Applies one event to the machine, under the caller's lock on `shared.state`.
///
/// This is the only place transition logic lives; it both updates `sm.state` and triggers the
/// side effects (spawning reactor tasks, emitting signals) the transition table calls for.
pub(crate) fn apply_event(sm: &mut StateMachine, shared: &Arc<ClientShared>, event: Event) {
    match (sm.state, event) {
        // --- Waiting ---
        (State::Waiting, Event::ConnectRequest { host, service }) => {
            sm.state = State::Negotiating;
            // A fresh connection attempt: any shutdown flagged by a previous connection's
            // teardown no longer applies.
            shared.shutting_down.store(false, Ordering::SeqCst);
            let _ = shared
                .runtime_handle()
                .spawn(resolve_and_connect(Arc::downgrade(shared), host, service));
        }
        (State::Waiting, Event::SendMessage { msg_id, .. }) => {
            shared.signals.send_report.emit(SendReport::fail(
                msg_id,
                SendFailReason::NotConnected,
                "Not Connected.",
            ));
        }
        (State::Waiting, _) => { /* discard */ }

        // --- Negotiating ---
        (State::Negotiating, Event::ConnectReport { result: Ok(stream) }) => {
            sm.state = State::Connected;
            shared.signals.connection_status_report.emit(ConnectionStatusReport::new(
                ConnectionStatus::Connected,
                StatusReason::None,
                "Connected.",
            ));
            let (read_half, write_half) = stream.into_split();
            let (tx, rx) = mpsc::unbounded_channel();
            sm.writer_tx = Some(tx);
            let _ = shared
                .runtime_handle()
                .spawn(writer_task(Arc::downgrade(shared), write_half, rx));
            let _ = shared
                .runtime_handle()
                .spawn(receive_loop(Arc::downgrade(shared), read_half));
        }
        (State::Negotiating, Event::ConnectReport { result: Err(reason) }) => {
            sm.state = State::Waiting;
            shared.signals.connection_status_report.emit(ConnectionStatusReport::new(
                ConnectionStatus::Disconnected,
                StatusReason::ConnectFailed,
                reason,
            ));
        }
        (State::Negotiating, Event::DisconnectRequest) => {
            sm.state = State::Waiting;
            shared.shutting_down.store(true, Ordering::SeqCst);
            shared.shutdown.notify_waiters();
            shared.signals.connection_status_report.emit(ConnectionStatusReport::new(
                ConnectionStatus::Disconnected,
                StatusReason::UserRequested,
                "Disconnected by user request.",
            ));
        }
        (State::Negotiating, Event::SendMessage { msg_id, .. }) => {
            shared.signals.send_report.emit(SendReport::fail(
                msg_id,
                SendFailReason::NotConnected,
                "Not Connected.",
            ));
        }
        (State::Negotiating, Event::ConnectRequest { .. }) => {
            shared.signals.connection_status_report.emit(ConnectionStatusReport::new(
                ConnectionStatus::Connecting,
                StatusReason::Busy,
                "A connection attempt is already in progress.",
            ));
        }
        (State::Negotiating, _) => { /* discard */ }

        // --- Connected ---
        (State::Connected, Event::SendMessage { msg_id, recipient, text }) => {
            let msg = NearUserMessage::new(msg_id, recipient, UniqueUserID::NONE, &text);
            let frame = SegmentationLayer::new(msg);
            match frame.try_to_bytes() {
                Ok(bytes) => {
                    if let Some(tx) = &sm.writer_tx {
                        if tx.send(WriteJob { msg_id, bytes }).is_err() {
                            shared.signals.send_report.emit(SendReport::fail(
                                msg_id,
                                SendFailReason::ConnectionError,
                                "Writer task is gone.",
                            ));
                        }
                    }
                }
                Err(e) => {
                    shared.signals.send_report.emit(SendReport::fail(
                        msg_id,
                        SendFailReason::ConnectionError,
                        e.to_string(),
                    ));
                }
            }
        }
        (State::Connected, Event::ReceivedMessage { data }) => {
            if data.is_empty() {
                warn!("received an empty inner layer; dropping");
                return;
            }
            if data.as_slice()[0] == crate::wire::NEAR_USER_MESSAGE_TAG {
                match NearUserMessage::from_serialized(data) {
                    Ok(msg) => shared.signals.rcv_message.emit(crate::client::reports::ReceivedUserMessage {
                        msg_id: msg.msg_id,
                        sender: msg.sender,
                        recipient: msg.recipient,
                        text: msg.text.to_text(),
                    }),
                    Err(e) => warn!("dropping malformed NearUserMessage: {e}"),
                }
            } else {
                debug!(tag = data.as_slice()[0], "dropping reserved layer tag");
            }
        }
        (State::Connected, Event::Disconnected { reason }) => {
            sm.state = State::Waiting;
            sm.writer_tx = None;
            shared.signals.connection_status_report.emit(ConnectionStatusReport::new(
                ConnectionStatus::Disconnected,
                StatusReason::SocketClosed,
                reason,
            ));
        }
        (State::Connected, Event::DisconnectRequest) => {
            sm.state = State::Waiting;
            sm.writer_tx = None;
            shared.shutting_down.store(true, Ordering::SeqCst);
            shared.shutdown.notify_waiters();
            shared.signals.connection_status_report.emit(ConnectionStatusReport::new(
                ConnectionStatus::Disconnected,
                StatusReason::UserRequested,
                "Disconnected by user request.",
            ));
        }
        (State::Connected, Event::ConnectRequest { .. }) => {
            shared.signals.connection_status_report.emit(ConnectionStatusReport::new(
                ConnectionStatus::Connected,
                StatusReason::Busy,
                "already connected",
            ));
        }
        (State::Connected, Event::ConnectReport { .. }) => { /* discard: stray completion */ }
    }
}

/// Resolves and connects to `host:service`, reporting the outcome via `ConnectReport`.
///
/// Takes a `Weak` handle so a `ClientNode` dropped mid-resolve (or mid-connect) doesn't keep this
/// task's `Arc<ClientShared>` alive: the upgrade at the top fails once the node is gone, and the
/// `select!` below cancels the in-flight resolve/connect the instant a teardown is requested.
async fn resolve_and_connect(shared: Weak<ClientShared>, host: String, service: String) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    let target = format!("{host}:{service}");
    trace!(target = %target, "resolving");

    let addrs: Vec<_> = tokio::select! {
        () = shared.shutdown.notified() => return,
        result = tokio::net::lookup_host(&target) => match result {
            Ok(iter) => iter.collect(),
            Err(e) => {
                crate::client::dispatch(&shared, Event::ConnectReport { result: Err(e.to_string()) });
                return;
            }
        },
    };
    if addrs.is_empty() {
        crate::client::dispatch(
            &shared,
            Event::ConnectReport { result: Err("no hosts found".to_string()) },
        );
        return;
    }
    let mut last_error = String::new();
    for addr in addrs {
        tokio::select! {
            () = shared.shutdown.notified() => return,
            result = TcpStream::connect(addr) => match result {
                Ok(stream) => {
                    crate::client::dispatch(&shared, Event::ConnectReport { result: Ok(stream) });
                    return;
                }
                Err(e) => last_error = e.to_string(),
            },
        }
    }
    crate::client::dispatch(&shared, Event::ConnectReport { result: Err(last_error) });
}

async fn receive_loop(shared: Weak<ClientShared>, mut read_half: tokio::net::tcp::OwnedReadHalf) {
    loop {
        let Some(strong) = shared.upgrade() else {
            return;
        };
        tokio::select! {
            () = strong.shutdown.notified() => {
                trace!("receive loop stopping: shutdown requested");
                return;
            }
            result = read_frame(&mut read_half) => {
                match result {
                    Ok(data) => {
                        crate::client::dispatch(&strong, Event::ReceivedMessage { data });
                    }
                    Err(e) => {
                        if !strong.shutting_down.load(Ordering::SeqCst) {
                            crate::client::dispatch(&strong, Event::Disconnected { reason: e.report_text() });
                        }
                        return;
                    }
                }
            }
        }
    }
}

async fn writer_task(
    shared: Weak<ClientShared>,
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WriteJob>,
) {
    loop {
        let Some(strong) = shared.upgrade() else {
            let _ = write_half.shutdown().await;
            return;
        };
        tokio::select! {
            () = strong.shutdown.notified() => {
                break;
            }
            job = rx.recv() => {
                match job {
                    Some(job) => match write_frame(&mut write_half, &job.bytes).await {
                        Ok(()) => strong.signals.send_report.emit(SendReport::ok(job.msg_id)),
                        Err(e) => {
                            strong.signals.send_report.emit(SendReport::fail(
                                job.msg_id,
                                SendFailReason::ConnectionError,
                                e.report_text(),
                            ));
                            if !strong.shutting_down.load(Ordering::SeqCst) {
                                crate::client::dispatch(&strong, Event::Disconnected { reason: e.report_text() });
                            }
                            break;
                        }
                    },
                    None => break,
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
}
