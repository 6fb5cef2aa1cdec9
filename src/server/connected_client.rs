//! One per accepted TCP connection: a header-then-body receive loop, a single-task write queue,
//! and idempotent shutdown.
// (c) 2026 nuke-ms contributors

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, trace, warn};

use crate::util::framing_io::{read_frame, write_frame};
use crate::wire::SerializedData;

/// A per-peer connection handle. Held strongly by the server's registry; every spawned task
/// holds only a [`Weak`] reference, so a handler whose `ConnectedClient` has already been dropped
/// from the registry returns immediately instead of acting on a half-torn-down connection.
pub(crate) struct ConnectedClient {
    /// The registry key this connection was accepted under.
    pub(crate) id: u64,
    write_tx: mpsc::UnboundedSender<Vec<u8>>,
    shutdown: Notify,
    shutting_down: AtomicBool,
    disconnected_fired: AtomicBool,
    on_received: Box<dyn Fn(u64, SerializedData) + Send + Sync>,
    on_disconnected: Box<dyn Fn(u64) + Send + Sync>,
}

impl ConnectedClient {
    /// Splits `stream`, spawns its receive loop and writer task, and returns a strong handle.
    /// `on_received` and `on_disconnected` are the server's `fan_out`/`deregister` callbacks.
    pub(crate) fn spawn(
        id: u64,
        stream: TcpStream,
        on_received: impl Fn(u64, SerializedData) + Send + Sync + 'static,
        on_disconnected: impl Fn(u64) + Send + Sync + 'static,
    ) -> Arc<Self> {
        let (read_half, write_half) = stream.into_split();
        let (write_tx, write_rx) = mpsc::unbounded_channel();

        let client = Arc::new(Self {
            id,
            write_tx,
            shutdown: Notify::new(),
            shutting_down: AtomicBool::new(false),
            disconnected_fired: AtomicBool::new(false),
            on_received: Box::new(on_received),
            on_disconnected: Box::new(on_disconnected),
        });

        let _ = tokio::spawn(receive_loop(Arc::downgrade(&client), read_half));
        let _ = tokio::spawn(writer_task(Arc::downgrade(&client), write_half, write_rx));

        client
    }

    /// Serializes `bytes` onto the write queue. A failure to enqueue (writer task already gone)
    /// triggers shutdown and the one-shot `disconnected` callback.
    pub(crate) fn send_packet(&self, bytes: Vec<u8>) {
        if self.write_tx.send(bytes).is_err() {
            self.shutdown();
            self.fire_disconnected_once();
        }
    }

    /// Idempotent. Marks the connection as tearing down and wakes any in-flight read/write so it
    /// completes as an absorbed cancellation rather than a reported error.
    pub(crate) fn shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            self.shutdown.notify_waiters();
        }
    }

    fn fire_disconnected_once(&self) {
        if !self.disconnected_fired.swap(true, Ordering::SeqCst) {
            (self.on_disconnected)(self.id);
        }
    }
}

async fn receive_loop(client: Weak<ConnectedClient>, mut read_half: OwnedReadHalf) {
    loop {
        let Some(strong) = client.upgrade() else {
            return;
        };
        tokio::select! {
            () = strong.shutdown.notified() => {
                trace!(id = strong.id, "receive loop stopping: shutdown requested");
                return;
            }
            result = read_frame(&mut read_half) => {
                match result {
                    Ok(data) => {
                        (strong.on_received)(strong.id, data);
                    }
                    Err(e) => {
                        if !strong.shutting_down.load(Ordering::SeqCst) {
                            debug!(id = strong.id, reason = %e, "connection lost");
                            strong.fire_disconnected_once();
                        }
                        return;
                    }
                }
            }
        }
    }
}

async fn writer_task(
    client: Weak<ConnectedClient>,
    mut write_half: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    loop {
        let Some(strong) = client.upgrade() else {
            let _ = write_half.shutdown().await;
            return;
        };
        tokio::select! {
            () = strong.shutdown.notified() => {
                break;
            }
            job = rx.recv() => {
                match job {
                    Some(bytes) => {
                        if let Err(e) = write_frame(&mut write_half, &bytes).await {
                            if !strong.shutting_down.load(Ordering::SeqCst) {
                                warn!(id = strong.id, reason = %e, "write failed");
                                strong.fire_disconnected_once();
                            }
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
    let _ = write_half.shutdown().await;
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::{Layer, NearUserMessage, SegmentationLayer, UniqueUserID};
    use std::sync::Mutex;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::{TcpListener, TcpStream};

    async fn loopback_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept, connect) = tokio::join!(listener.accept(), connect);
        (accept.unwrap().0, connect.unwrap())
    }

    #[tokio::test]
    async fn delivers_received_frame_body() {
        let (server_side, mut peer) = loopback_pair().await;
        let received: Arc<Mutex<Vec<SerializedData>>> = Arc::new(Mutex::new(Vec::new()));
        let received2 = Arc::clone(&received);

        let client = ConnectedClient::spawn(
            1,
            server_side,
            move |_id, data| received2.lock().unwrap().push(data),
            |_id| {},
        );

        let msg = NearUserMessage::new(1, UniqueUserID::NONE, UniqueUserID::from(9), "hi");
        let frame = SegmentationLayer::new(msg.clone()).to_bytes();
        peer.write_all(&frame).await.unwrap();

        for _ in 0..50 {
            if !received.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        let seen = received.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(NearUserMessage::from_serialized(seen[0].clone()).unwrap(), msg);
        drop(client);
    }

    #[tokio::test]
    async fn disconnect_fires_at_most_once() {
        let (server_side, peer) = loopback_pair().await;
        let count = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let count2 = Arc::clone(&count);
        let client = ConnectedClient::spawn(7, server_side, |_, _| {}, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
        });

        drop(peer);
        for _ in 0..50 {
            if count.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
        drop(client);
    }
}
