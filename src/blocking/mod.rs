// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Blocking Geomessage controller implementation
//!
//! Wraps the async [`MessageController`](crate::MessageController) with an
//! internally-owned Tokio runtime so hosts without an async runtime can
//! send and receive Geomessages with plain blocking calls. Listener
//! callbacks still run on the runtime's worker threads.

use tokio::runtime::Runtime;

use std::sync::Arc;

use crate::render::MapGeometry;
use crate::spot_report::SpotReport;
use crate::transport::GeomessageListener;
use crate::{Geomessage, SendError};

/// Blocking version of MessageController that runs a Tokio runtime internally
pub struct MessageController {
    runtime: Runtime,
    inner: crate::MessageController,
}

impl MessageController {
    /// Creates a blocking controller for the given UDP port.
    ///
    /// # Arguments
    ///
    /// * `port` - UDP port through which messages will be sent and received
    ///
    pub fn bind(port: u16) -> std::io::Result<Self> {
        let runtime = Runtime::new()?;
        let inner = runtime.block_on(crate::MessageController::bind(port))?;
        Ok(Self { runtime, inner })
    }

    /// Sends a raw payload as a UDP broadcast.
    pub fn send(&self, payload: &[u8]) -> Result<(), SendError> {
        self.runtime.block_on(self.inner.send(payload))
    }

    /// Encodes one Geomessage into an envelope and broadcasts it, with the
    /// same local loopback semantics as the async controller.
    pub fn send_geomessage(&self, message: &Geomessage) -> Result<(), SendError> {
        self.runtime.block_on(self.inner.send_geomessage(message))
    }

    /// Broadcasts a chem light at the given coordinates.
    pub fn send_chem_light(
        &self,
        x: f64,
        y: f64,
        wkid: i32,
        argb_color: u32,
    ) -> Result<Geomessage, SendError> {
        self.runtime
            .block_on(self.inner.send_chem_light(x, y, wkid, argb_color))
    }

    /// Broadcasts a spot report.
    pub fn send_spot_report(
        &self,
        report: &mut SpotReport,
        map: &dyn MapGeometry,
        is_update: bool,
    ) -> Result<Geomessage, SendError> {
        self.runtime
            .block_on(self.inner.send_spot_report(report, map, is_update))
    }

    /// Broadcasts a removal notice for the record with the given type and id.
    pub fn send_removal(&self, message_type: &str, message_id: &str) -> Result<(), SendError> {
        self.runtime
            .block_on(self.inner.send_removal(message_type, message_id))
    }

    /// Binds the receive socket and launches the receive loop. Idempotent.
    pub fn start_receiving(&self) -> std::io::Result<()> {
        let _guard = self.runtime.enter();
        self.inner.start_receiving()
    }

    /// Stops the receive loop. Idempotent.
    pub fn stop_receiving(&self) {
        self.inner.stop_receiving()
    }

    /// Changes the UDP port, rebinding the receive socket if receiving.
    pub fn set_port(&self, port: u16) -> std::io::Result<()> {
        let _guard = self.runtime.enter();
        self.inner.set_port(port)
    }

    /// Adds a listener. Callbacks run on the internal runtime's threads.
    pub fn add_listener(&self, listener: Arc<dyn GeomessageListener>) -> bool {
        let _guard = self.runtime.enter();
        self.inner.add_listener(listener)
    }

    /// Removes a listener.
    pub fn remove_listener(&self, listener: &Arc<dyn GeomessageListener>) -> bool {
        self.inner.remove_listener(listener)
    }

    /// Sets or clears the identity used to recognize this process's own
    /// records in inbound traffic.
    pub fn set_sender_identity(&self, identity: Option<String>) {
        self.inner.set_sender_identity(identity)
    }

    /// Replaces the set of record types whose local echoes are suppressed.
    pub fn set_self_ignore_types<I, S>(&self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.inner.set_self_ignore_types(types)
    }

    /// Returns the async controller, for hosts that mix blocking and async
    /// call sites.
    pub fn async_controller(&self) -> &crate::MessageController {
        &self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct IdLog(Mutex<Vec<String>>);

    impl GeomessageListener for IdLog {
        fn on_geomessage(&self, message: &Geomessage) {
            self.0.lock().unwrap().push(message.id().to_string());
        }
    }

    #[test]
    fn blocking_chem_light_loops_back() {
        let controller = MessageController::bind(0).unwrap();
        let log = Arc::new(IdLog::default());
        controller.add_listener(log.clone());

        // loopback happens whether or not any interface accepted the send
        let sent = controller.send_chem_light(1.0, 2.0, 4326, 0xFF00FF00);
        let ids = log.0.lock().unwrap();
        assert_eq!(ids.len(), 1);
        if let Ok(message) = sent {
            assert_eq!(ids[0], message.id());
        }
    }
}
