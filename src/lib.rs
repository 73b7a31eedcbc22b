// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! This crate provides peer-to-peer Geomessage exchange for tactical mapping
//! clients: small structured XML records (position reports, spot reports,
//! chem lights, removal notices) broadcast over UDP to cooperating clients
//! on the local network, plus the periodic position-report pump driven by a
//! stream of location fixes.
//!
//! The pieces compose around [`MessageController`]:
//!
//! * [`Geomessage`] records travel in a `<geomessages>` XML envelope, one
//!   envelope per datagram ([`codec`]).
//! * The controller broadcasts each envelope on every IPv4 broadcast address
//!   of the host and runs a background receive loop that fans incoming
//!   datagrams out to [`GeomessageListener`] subscribers.
//! * A process sees its own spot reports and chem lights immediately via
//!   local loopback, while echoes of its own periodic position reports are
//!   suppressed ([`SuppressionPolicy`]).
//! * [`PositionReporter`] periodically broadcasts the most recent fix from a
//!   [`LocationProvider`] — live ([`PushProvider`]) or replayed from a GPX
//!   track ([`LocationSimulator`]).
//! * [`SymbolRouter`] feeds received records to a host rendering runtime
//!   through the [`SymbolRenderer`] and [`MapGeometry`] capability traits.
//!
//! The `blocking` feature provides a synchronous facade that runs a tokio
//! runtime internally for hosts without one.
//!
//! # Examples
//!
//! ## Listen for geomessages
//!
//! ```
//! use std::sync::Arc;
//! use geomessage_broadcast::{Geomessage, GeomessageListener, MessageController};
//!
//! struct MapFeed;
//!
//! impl GeomessageListener for MapFeed {
//!     fn on_geomessage(&self, message: &Geomessage) {
//!         println!("record {} of type {:?}", message.id(), message.message_type());
//!     }
//! }
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = MessageController::bind(45678).await?;
//!     controller.set_sender_identity(Some("3A1-001".into()));
//!     controller.add_listener(Arc::new(MapFeed));
//!     controller.start_receiving()?;
//!     Ok(())
//! }
//! ```
//!
//! ## Drop a chem light
//!
//! ```
//! use geomessage_broadcast::MessageController;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = MessageController::bind(45678).await?;
//!     // red chem light at lon/lat, WGS84
//!     controller.send_chem_light(70.45, 34.42, 4326, 0xFFFF0000).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Report own position from a replayed track
//!
//! ```
//! use geomessage_broadcast::{
//!     LocationProvider, LocationSimulator, MessageController, PositionReporter, ReportIdentity,
//! };
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = MessageController::bind(45678).await?;
//!     let reporter = PositionReporter::new(
//!         controller,
//!         ReportIdentity {
//!             callsign: "Honey Badgers 42G".into(),
//!             vehicle_type: "HMMWV".into(),
//!             unique_id: "f9e0a2f4-ef34-4ac6-8b4c-2f0a3d2a8840".into(),
//!             symbol_code: "SFGPEVCAH------".into(),
//!         },
//!     );
//!     let simulator = LocationSimulator::new();
//!     simulator.add_listener(reporter.clone());
//!     simulator.start();
//!     reporter.set_enabled(true)?;
//!     Ok(())
//! }
//! ```

#[cfg(feature = "blocking")]
pub mod blocking;
pub mod codec;
mod geomessage;
mod listeners;
mod location;
mod position_report;
mod render;
mod reports;
mod simulator;
mod spot_report;
mod suppression;
mod symbol_router;
mod transport;
pub mod util;

// Re-export modules for library users
pub use geomessage::*;
pub use listeners::ListenerSet;
pub use location::*;
pub use position_report::*;
pub use render::*;
pub use reports::*;
pub use simulator::{GpxError, LocationSimulator};
pub use spot_report::*;
pub use suppression::{SuppressionPolicy, DEFAULT_SELF_IGNORE_TYPES};
pub use symbol_router::SymbolRouter;
pub use transport::{GeomessageListener, MessageController};

/// Maximum datagram payload length in bytes. Senders must not produce
/// larger envelopes; the receive buffer is sized to match.
pub const MAX_MESSAGE_LENGTH: usize = 6000;

/// Errors surfaced from a send attempt.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SendError {
    #[error("message payload is {0} bytes; datagrams are limited to {MAX_MESSAGE_LENGTH} bytes")]
    PayloadTooLarge(usize),
    #[error("error encoding geomessage envelope: {0}")]
    Encode(String),
    #[error("error sending broadcast: {0}")]
    Io(String),
}
