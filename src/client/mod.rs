//! The client-side facade: `connect_to`, `send_user_message`, `disconnect`, and the three
//! signals (`rcvMessage`, `connectionStatusReport`, `sendReport`).
//!
//! Internally this guards the [state machine](state_machine) with a mutex and owns a dedicated
//! reactor thread: a single-threaded `tokio` runtime driven by one `std::thread`, matching the
//! "one background worker thread per client-side state machine" requirement. Every public call
//! here posts an event into the machine under that mutex, so the machine sees a serialized event
//! stream even when called from multiple application threads.
// (c) 2026 nuke-ms contributors

mod reports;
mod signals;
mod state_machine;

pub use reports::{
    ConnectionStatus, ConnectionStatusReport, ReceivedUserMessage, SendFailReason, SendReport,
    StatusReason,
};

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::Notify;
use tracing::warn;

use crate::error::CoreError;
use crate::wire::UniqueUserID;
use signals::SignalHub;
use state_machine::{apply_event, Event, StateMachine};

/// How long [`ClientNode::drop`] waits for the reactor thread to shut down before giving up and
/// detaching it. Mirrors the source's bounded-wait-then-detach teardown pattern.
const WORKER_JOIN_TIMEOUT: Duration = Duration::from_millis(3000);

#[derive(Default)]
pub(crate) struct Signals {
    pub(crate) rcv_message: SignalHub<ReceivedUserMessage>,
    pub(crate) connection_status_report: SignalHub<ConnectionStatusReport>,
    pub(crate) send_report: SignalHub<SendReport>,
}

/// Everything the machine and its reactor tasks share: the mutex-guarded machine state, the
/// signal hubs, a teardown flag consulted by in-flight handlers, a cancellation signal that wakes
/// them out of whatever I/O they're blocked in, and the dedicated runtime.
///
/// Reactor tasks (`resolve_and_connect`/`receive_loop`/`writer_task`) hold only a `Weak` reference
/// to this struct, never a strong one: a strong reference held across an `.await` point would
/// keep `ClientShared` (and the `Runtime` it owns) alive forever once nothing is left polling
/// those tasks, the same reference cycle `server::connected_client::ConnectedClient` avoids with
/// its own `Weak`-held tasks.
pub(crate) struct ClientShared {
    state: Mutex<StateMachine>,
    pub(crate) signals: Signals,
    pub(crate) shutting_down: AtomicBool,
    pub(crate) shutdown: Notify,
    runtime: Runtime,
}

impl ClientShared {
    pub(crate) fn runtime_handle(&self) -> &Handle {
        self.runtime.handle()
    }
}

/// Posts `event` into the machine under its mutex. Callable from the application (public API
/// methods) or from a reactor task reporting a completion.
pub(crate) fn dispatch(shared: &Arc<ClientShared>, event: Event) {
    let mut guard = shared
        .state
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    apply_event(&mut guard, shared, event);
}

/// The public client API: one TCP connection's worth of connect/send/receive/disconnect,
/// reported through three subscribable signals.
pub struct ClientNode {
    shared: Arc<ClientShared>,
    next_msg_id: AtomicU32,
    worker: Option<std::thread::JoinHandle<()>>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl Default for ClientNode {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientNode {
    /// Builds a new client, in state `Waiting`, with its reactor thread already running.
    #[must_use]
    pub fn new() -> Self {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("failed to build client reactor runtime");
        let shared = Arc::new(ClientShared {
            state: Mutex::new(StateMachine::new()),
            signals: Signals::default(),
            shutting_down: AtomicBool::new(false),
            shutdown: Notify::new(),
            runtime,
        });

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let reactor_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("nuke-ms-client-reactor".to_string())
            .spawn(move || {
                reactor_shared.runtime.block_on(async move {
                    let _ = shutdown_rx.await;
                });
            })
            .expect("failed to spawn client reactor thread");

        Self {
            shared,
            next_msg_id: AtomicU32::new(1),
            worker: Some(worker),
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Begins connecting to `location`, of the form `host:service`. Exactly one colon is
    /// required; an empty host or service is rejected.
    ///
    /// On a malformed location this synchronously emits a terminal
    /// `ConnectionStatusReport{Disconnected, ConnectFailed, "Invalid remote site identifier"}`
    /// without touching machine state. Otherwise it posts `ConnectRequest` into the machine.
    pub fn connect_to(&self, location: &str) {
        match parse_location(location) {
            Ok((host, service)) => {
                dispatch(&self.shared, Event::ConnectRequest { host, service });
            }
            Err(_) => {
                self.shared.signals.connection_status_report.emit(ConnectionStatusReport::new(
                    ConnectionStatus::Disconnected,
                    StatusReason::ConnectFailed,
                    "Invalid remote site identifier",
                ));
            }
        }
    }

    /// Queues a text message for sending to `recipient` (use [`UniqueUserID::NONE`] to
    /// broadcast). Returns the allocated message id; exactly one terminal [`SendReport`] will
    /// follow, correlated by this id.
    pub fn send_user_message(&self, text: impl Into<String>, recipient: UniqueUserID) -> u32 {
        let msg_id = self.next_msg_id.fetch_add(1, Ordering::SeqCst);
        dispatch(
            &self.shared,
            Event::SendMessage {
                msg_id,
                recipient,
                text: text.into(),
            },
        );
        msg_id
    }

    /// Requests a disconnect. A no-op (state `Waiting`) if there is nothing to disconnect from.
    pub fn disconnect(&self) {
        dispatch(&self.shared, Event::DisconnectRequest);
    }

    /// Subscribes to inbound application messages.
    pub fn on_received_message(&self, callback: impl Fn(ReceivedUserMessage) + Send + Sync + 'static) {
        self.shared.signals.rcv_message.subscribe(callback);
    }

    /// Subscribes to connection status changes.
    pub fn on_connection_status(
        &self,
        callback: impl Fn(ConnectionStatusReport) + Send + Sync + 'static,
    ) {
        self.shared.signals.connection_status_report.subscribe(callback);
    }

    /// Subscribes to per-send outcome reports.
    pub fn on_send_report(&self, callback: impl Fn(SendReport) + Send + Sync + 'static) {
        self.shared.signals.send_report.subscribe(callback);
    }
}

impl Drop for ClientNode {
    fn drop(&mut self) {
        self.shared.shutting_down.store(true, Ordering::SeqCst);
        // Wakes any reactor task (resolve/connect, receive loop, writer) currently parked in
        // `select!` on this signal, so it drops its socket half and its `Weak` upgrade right
        // away instead of leaning on the worker thread's exit to reclaim it.
        self.shared.shutdown.notify_waiters();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            join_with_timeout(worker, WORKER_JOIN_TIMEOUT);
        }
    }
}

/// Joins `handle`, giving up (and leaving the thread to finish on its own) after `timeout`.
fn join_with_timeout(handle: std::thread::JoinHandle<()>, timeout: Duration) {
    let (done_tx, done_rx) = std::sync::mpsc::channel();
    let _ = std::thread::spawn(move || {
        let _ = handle.join();
        let _ = done_tx.send(());
    });
    if done_rx.recv_timeout(timeout).is_err() {
        warn!(?timeout, "client reactor thread did not shut down in time; detaching");
    }
}

/// Parses `host:service`. Exactly one colon required; neither half may be empty.
fn parse_location(location: &str) -> Result<(String, String), CoreError> {
    if location.matches(':').count() != 1 {
        return Err(CoreError::InvalidLocation);
    }
    let (host, service) = location.split_once(':').ok_or(CoreError::InvalidLocation)?;
    if host.is_empty() || service.is_empty() {
        return Err(CoreError::InvalidLocation);
    }
    Ok((host.to_string(), service.to_string()))
}
