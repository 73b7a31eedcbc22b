// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! UDP broadcast transport: owns the sockets, fans every outbound datagram
//! out to the host's IPv4 broadcast addresses, and runs the background
//! receive loop that feeds registered listeners.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::codec;
use crate::geomessage::Geomessage;
use crate::suppression::SuppressionPolicy;
use crate::{SendError, MAX_MESSAGE_LENGTH};

/// Receives transport events. Implementations must be safe to call from any
/// task; a listener that blocks delays only its own deliveries.
pub trait GeomessageListener: Send + Sync {
    /// Called once per received datagram with the raw text, whether or not
    /// the datagram decodes into Geomessages.
    fn on_raw(&self, contents: &str) {
        let _ = contents;
    }

    /// Called once per decoded record that passes the self-suppression
    /// policy, in document order, after `on_raw` for the same datagram.
    fn on_geomessage(&self, message: &Geomessage) {
        let _ = message;
    }
}

/// One received datagram, queued per listener so that a stalled listener
/// cannot delay the others while per-listener ordering is preserved.
#[derive(Clone)]
struct Delivery {
    raw: Arc<str>,
    messages: Arc<[Geomessage]>,
}

struct Deliverer {
    listener: Arc<dyn GeomessageListener>,
    sender: mpsc::UnboundedSender<Delivery>,
    worker: JoinHandle<()>,
}

struct ReceiveHandle {
    shutdown: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

struct ControllerInner {
    send_socket: UdpSocket,
    send_lock: tokio::sync::Mutex<()>,
    port: AtomicU16,
    policy: Mutex<SuppressionPolicy>,
    deliverers: Mutex<Vec<Deliverer>>,
    receiver: Mutex<Option<ReceiveHandle>>,
    decode_errors: AtomicU64,
}

/// Sends and receives Geomessage envelopes as UDP broadcasts on one port.
///
/// Cloning yields another handle to the same controller. Methods that spawn
/// background work (`start_receiving`, `add_listener`) must be called from
/// within a tokio runtime; the `blocking` feature provides a facade that
/// wraps this for synchronous hosts.
///
/// At most one receiver should bind a given port per host; the receive
/// socket is opened with reuse-address semantics so a restarting process can
/// rebind immediately.
#[derive(Clone)]
pub struct MessageController {
    inner: Arc<ControllerInner>,
}

impl MessageController {
    /// Creates a controller for the given UDP port. Usually you should use a
    /// port number between 1024 and 65535.
    ///
    /// The outbound socket is bound to an ephemeral port with broadcast
    /// enabled; receiving does not begin until
    /// [`start_receiving`](Self::start_receiving).
    pub async fn bind(port: u16) -> std::io::Result<Self> {
        let send_socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        send_socket.set_broadcast(true)?;
        Ok(Self {
            inner: Arc::new(ControllerInner {
                send_socket,
                send_lock: tokio::sync::Mutex::new(()),
                port: AtomicU16::new(port),
                policy: Mutex::new(SuppressionPolicy::new()),
                deliverers: Mutex::new(Vec::new()),
                receiver: Mutex::new(None),
                decode_errors: AtomicU64::new(0),
            }),
        })
    }

    /// Returns the UDP port in use.
    pub fn port(&self) -> u16 {
        self.inner.port.load(Ordering::SeqCst)
    }

    /// Changes the UDP port. If currently receiving, the receive socket is
    /// rebound to the new port; otherwise the port takes effect on the next
    /// `start_receiving`.
    pub fn set_port(&self, port: u16) -> std::io::Result<()> {
        self.inner.port.store(port, Ordering::SeqCst);
        if self.is_receiving() {
            self.stop_receiving();
            self.start_receiving()?;
        }
        Ok(())
    }

    /// Returns the configured sender identity.
    pub fn sender_identity(&self) -> Option<String> {
        self.inner
            .policy
            .lock()
            .expect("suppression policy poisoned")
            .sender_identity()
            .map(str::to_string)
    }

    /// Sets or clears the identity used to recognize this process's own
    /// records in inbound traffic (see [`SuppressionPolicy`]).
    pub fn set_sender_identity(&self, identity: Option<String>) {
        self.inner
            .policy
            .lock()
            .expect("suppression policy poisoned")
            .set_sender_identity(identity);
    }

    /// Replaces the set of record types whose local echoes are suppressed.
    pub fn set_self_ignore_types<I, S>(&self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner
            .policy
            .lock()
            .expect("suppression policy poisoned")
            .set_self_ignore_types(types);
    }

    /// Adds a listener and spawns its delivery worker. Adding a listener
    /// that is already registered has no effect.
    pub fn add_listener(&self, listener: Arc<dyn GeomessageListener>) -> bool {
        let mut deliverers = self.inner.deliverers.lock().expect("listener registry poisoned");
        if deliverers.iter().any(|d| Arc::ptr_eq(&d.listener, &listener)) {
            return false;
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        let worker = tokio::spawn(delivery_worker(listener.clone(), receiver));
        deliverers.push(Deliverer {
            listener,
            sender,
            worker,
        });
        true
    }

    /// Removes a listener. Its worker drains any queued deliveries and
    /// exits. Removing an unregistered listener has no effect.
    pub fn remove_listener(&self, listener: &Arc<dyn GeomessageListener>) -> bool {
        let mut deliverers = self.inner.deliverers.lock().expect("listener registry poisoned");
        let before = deliverers.len();
        deliverers.retain(|d| !Arc::ptr_eq(&d.listener, listener));
        deliverers.len() != before
    }

    /// Sends a raw payload as a UDP broadcast. The payload must not exceed
    /// [`MAX_MESSAGE_LENGTH`] bytes.
    pub async fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        if payload.len() > MAX_MESSAGE_LENGTH {
            return Err(SendError::PayloadTooLarge(payload.len()));
        }
        self.broadcast(payload).await
    }

    /// Encodes one Geomessage into an envelope and broadcasts it.
    ///
    /// If the record's type is outside the self-ignore set it is also
    /// delivered to local `on_geomessage` listeners, synchronously, before
    /// this method returns; `on_raw` is not synthesized for local sends.
    pub async fn send_geomessage(&self, message: &Geomessage) -> Result<(), SendError> {
        self.send_geomessages(std::slice::from_ref(message)).await
    }

    /// Encodes a set of Geomessages into one envelope and broadcasts it,
    /// with the same local loopback as [`send_geomessage`](Self::send_geomessage).
    pub async fn send_geomessages(&self, messages: &[Geomessage]) -> Result<(), SendError> {
        let payload = codec::encode(messages).map_err(|e| SendError::Encode(e.to_string()))?;
        if payload.len() > MAX_MESSAGE_LENGTH {
            return Err(SendError::PayloadTooLarge(payload.len()));
        }
        self.loopback(messages);
        self.broadcast(&payload).await
    }

    fn loopback(&self, messages: &[Geomessage]) {
        let deliverable: Vec<&Geomessage> = {
            let policy = self.inner.policy.lock().expect("suppression policy poisoned");
            messages.iter().filter(|m| policy.deliver_sent(m)).collect()
        };
        if deliverable.is_empty() {
            return;
        }
        let listeners: Vec<Arc<dyn GeomessageListener>> = {
            let deliverers = self.inner.deliverers.lock().expect("listener registry poisoned");
            deliverers.iter().map(|d| d.listener.clone()).collect()
        };
        for listener in listeners {
            for message in &deliverable {
                listener.on_geomessage(message);
            }
        }
    }

    async fn broadcast(&self, payload: &[u8]) -> Result<(), SendError> {
        let port = self.port();
        let targets = broadcast_addresses();
        let _send_guard = self.inner.send_lock.lock().await;
        let mut delivered = false;
        let mut last_error: Option<std::io::Error> = None;
        for address in targets {
            match self
                .inner
                .send_socket
                .send_to(payload, SocketAddr::from((address, port)))
                .await
            {
                Ok(_) => delivered = true,
                Err(e) => {
                    log::warn!("broadcast to {address}:{port} failed: {e}");
                    last_error = Some(e);
                }
            }
        }
        if delivered {
            Ok(())
        } else {
            Err(SendError::Io(last_error.map(|e| e.to_string()).unwrap_or_else(
                || "no broadcast address accepted the datagram".to_string(),
            )))
        }
    }

    /// Binds the receive socket and launches the receive loop. Idempotent.
    pub fn start_receiving(&self) -> std::io::Result<()> {
        let mut receiver = self.inner.receiver.lock().expect("receiver slot poisoned");
        if receiver.is_some() {
            return Ok(());
        }
        let socket = bind_receive_socket(self.port())?;
        let (shutdown, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(receive_loop(
            Arc::downgrade(&self.inner),
            socket,
            shutdown_rx,
        ));
        *receiver = Some(ReceiveHandle { shutdown, task });
        Ok(())
    }

    /// Stops the receive loop and closes the receive socket. Idempotent.
    pub fn stop_receiving(&self) {
        let handle = self.inner.receiver.lock().expect("receiver slot poisoned").take();
        if let Some(handle) = handle {
            if handle.shutdown.try_send(()).is_err() {
                handle.task.abort();
            }
        }
    }

    /// Returns true while the receive loop is running.
    pub fn is_receiving(&self) -> bool {
        self.inner
            .receiver
            .lock()
            .expect("receiver slot poisoned")
            .is_some()
    }

    /// Number of received datagrams that were not well-formed XML.
    pub fn decode_error_count(&self) -> u64 {
        self.inner.decode_errors.load(Ordering::Relaxed)
    }
}

impl Drop for ControllerInner {
    fn drop(&mut self) {
        if let Ok(mut receiver) = self.receiver.lock() {
            if let Some(handle) = receiver.take() {
                handle.task.abort();
            }
        }
        if let Ok(mut deliverers) = self.deliverers.lock() {
            for deliverer in deliverers.drain(..) {
                deliverer.worker.abort();
            }
        }
    }
}

impl ControllerInner {
    fn dispatch_datagram(&self, datagram: &[u8]) {
        let raw: Arc<str> = Arc::from(String::from_utf8_lossy(datagram).into_owned());
        let decoded = match codec::try_decode(&raw) {
            Ok(messages) => messages,
            Err(err) => {
                self.decode_errors.fetch_add(1, Ordering::Relaxed);
                log::debug!("undecodable datagram ({err}): '{raw}'");
                Vec::new()
            }
        };
        let deliverable: Arc<[Geomessage]> = {
            let policy = self.policy.lock().expect("suppression policy poisoned");
            decoded
                .into_iter()
                .filter(|m| policy.deliver_received(m))
                .collect::<Vec<_>>()
                .into()
        };
        let deliverers = self.deliverers.lock().expect("listener registry poisoned");
        for deliverer in deliverers.iter() {
            let _ = deliverer.sender.send(Delivery {
                raw: raw.clone(),
                messages: deliverable.clone(),
            });
        }
    }
}

async fn receive_loop(
    inner: Weak<ControllerInner>,
    socket: UdpSocket,
    mut shutdown: mpsc::Receiver<()>,
) {
    let mut buffer = vec![0u8; MAX_MESSAGE_LENGTH];
    loop {
        tokio::select! {
            received = socket.recv_from(&mut buffer) => match received {
                Ok((length, _peer)) => {
                    let Some(inner) = inner.upgrade() else { return };
                    inner.dispatch_datagram(&buffer[..length]);
                }
                Err(e) => {
                    log::error!("receive loop terminated by socket error: {e}");
                    return;
                }
            },
            _ = shutdown.recv() => {
                log::debug!("receive loop shutting down");
                return;
            }
        }
    }
}

async fn delivery_worker(
    listener: Arc<dyn GeomessageListener>,
    mut deliveries: mpsc::UnboundedReceiver<Delivery>,
) {
    while let Some(delivery) = deliveries.recv().await {
        listener.on_raw(&delivery.raw);
        for message in delivery.messages.iter() {
            listener.on_geomessage(message);
        }
    }
}

fn bind_receive_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_broadcast(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)).into())?;
    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

/// Every IPv4 broadcast address on the host: each non-loopback interface's
/// directed broadcast, plus the limited broadcast address.
fn broadcast_addresses() -> Vec<Ipv4Addr> {
    let mut targets = vec![Ipv4Addr::BROADCAST];
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => {
            for interface in interfaces {
                if interface.is_loopback() {
                    continue;
                }
                if let if_addrs::IfAddr::V4(v4) = interface.addr {
                    if let Some(broadcast) = v4.broadcast {
                        if !targets.contains(&broadcast) {
                            targets.push(broadcast);
                        }
                    }
                }
            }
        }
        Err(e) => {
            log::warn!("could not enumerate interfaces ({e}); using limited broadcast only");
        }
    }
    targets
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_targets_always_include_limited_broadcast() {
        let targets = broadcast_addresses();
        assert!(targets.contains(&Ipv4Addr::BROADCAST));
        let unique: std::collections::HashSet<_> = targets.iter().collect();
        assert_eq!(unique.len(), targets.len());
    }

    #[tokio::test]
    async fn reuse_address_allows_rebinding() {
        let first = bind_receive_socket(0).unwrap();
        let port = first.local_addr().unwrap().port();
        drop(first);
        let second = bind_receive_socket(port).unwrap();
        assert_eq!(second.local_addr().unwrap().port(), port);
    }

    #[tokio::test]
    async fn start_receiving_is_idempotent() {
        let controller = MessageController::bind(0).await.unwrap();
        // port 0 binds an ephemeral receive port; fetch it back for the check
        controller.start_receiving().unwrap();
        assert!(controller.is_receiving());
        controller.start_receiving().unwrap();
        assert!(controller.is_receiving());
        controller.stop_receiving();
        assert!(!controller.is_receiving());
        controller.stop_receiving();
        assert!(!controller.is_receiving());
    }
}
