// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Location fixes, the listener contract, and the provider state machine.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::listeners::ListenerSet;
use crate::util::derived_heading_degrees;

/// A single location fix: coordinates, UTC timestamp, speed, and compass
/// heading in degrees. Within one stream, timestamps are monotonically
/// non-decreasing.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocationFix {
    pub longitude: f64,
    pub latitude: f64,
    pub timestamp: DateTime<Utc>,
    pub speed: f64,
    pub heading: f64,
}

impl LocationFix {
    pub fn new(
        longitude: f64,
        latitude: f64,
        timestamp: DateTime<Utc>,
        speed: f64,
        heading: f64,
    ) -> Self {
        Self {
            longitude,
            latitude,
            timestamp,
            speed,
            heading,
        }
    }

    /// Creates a fix whose heading is derived from the track direction since
    /// `previous`. With no previous fix the heading is 0.
    pub fn with_derived_heading(
        longitude: f64,
        latitude: f64,
        timestamp: DateTime<Utc>,
        speed: f64,
        previous: Option<&LocationFix>,
    ) -> Self {
        let heading = previous
            .map(|p| derived_heading_degrees(p.longitude, p.latitude, longitude, latitude))
            .unwrap_or(0.0);
        Self::new(longitude, latitude, timestamp, speed, heading)
    }
}

/// Receives location fixes from a provider. Implementations must be safe to
/// call from any task.
pub trait LocationListener: Send + Sync {
    fn on_location_changed(&self, fix: &LocationFix);
}

/// Lifecycle states of a location provider.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProviderState {
    Stopped,
    Started,
    Paused,
}

/// A source of location fixes.
///
/// State transitions:
/// - `start` from `Stopped`: produce from the beginning of the source.
/// - `start` from `Paused`: resume from the pause point.
/// - `start` from `Started`: no-op.
/// - `pause` from `Started`: stop producing but retain position.
/// - `pause` from any other state: no-op.
/// - `stop` from anywhere: cease producing; the next `start` begins fresh.
///
/// Each fix is delivered to every registered listener exactly once;
/// listeners added after `start` begin receiving from the next emission.
pub trait LocationProvider: Send + Sync {
    fn start(&self);
    fn pause(&self);
    fn stop(&self);
    fn state(&self) -> ProviderState;
    fn add_listener(&self, listener: Arc<dyn LocationListener>) -> bool;
    fn remove_listener(&self, listener: &Arc<dyn LocationListener>) -> bool;
}

/// Live-source adapter: the host platform pushes fixes in as they arrive.
///
/// Fixes pushed while the provider is not started are discarded.
pub struct PushProvider {
    listeners: ListenerSet<dyn LocationListener>,
    state: Mutex<ProviderState>,
}

impl Default for PushProvider {
    fn default() -> Self {
        Self {
            listeners: ListenerSet::new(),
            state: Mutex::new(ProviderState::Stopped),
        }
    }
}

impl PushProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers a fix to all listeners, if the provider is started.
    pub fn push(&self, fix: LocationFix) {
        if *self.state.lock().expect("provider state poisoned") != ProviderState::Started {
            return;
        }
        for listener in self.listeners.snapshot() {
            listener.on_location_changed(&fix);
        }
    }
}

impl LocationProvider for PushProvider {
    fn start(&self) {
        *self.state.lock().expect("provider state poisoned") = ProviderState::Started;
    }

    fn pause(&self) {
        let mut state = self.state.lock().expect("provider state poisoned");
        if *state == ProviderState::Started {
            *state = ProviderState::Paused;
        }
    }

    fn stop(&self) {
        *self.state.lock().expect("provider state poisoned") = ProviderState::Stopped;
    }

    fn state(&self) -> ProviderState {
        *self.state.lock().expect("provider state poisoned")
    }

    fn add_listener(&self, listener: Arc<dyn LocationListener>) -> bool {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, listener: &Arc<dyn LocationListener>) -> bool {
        self.listeners.remove(listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counter(AtomicUsize);
    impl LocationListener for Counter {
        fn on_location_changed(&self, _fix: &LocationFix) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fix() -> LocationFix {
        LocationFix::new(70.4, 34.4, Utc::now(), 0.0, 0.0)
    }

    #[test]
    fn push_provider_only_delivers_while_started() {
        let provider = PushProvider::new();
        let counter = Arc::new(Counter(AtomicUsize::new(0)));
        provider.add_listener(counter.clone());

        provider.push(fix());
        assert_eq!(counter.0.load(Ordering::SeqCst), 0);

        provider.start();
        provider.push(fix());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        provider.pause();
        provider.push(fix());
        assert_eq!(counter.0.load(Ordering::SeqCst), 1);

        provider.start();
        provider.push(fix());
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);

        provider.stop();
        provider.push(fix());
        assert_eq!(counter.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pause_from_stopped_is_a_noop() {
        let provider = PushProvider::new();
        provider.pause();
        assert_eq!(provider.state(), ProviderState::Stopped);
    }

    #[test]
    fn derived_heading_uses_previous_fix() {
        let first = LocationFix::with_derived_heading(70.0, 34.0, Utc::now(), 0.0, None);
        assert_eq!(first.heading, 0.0);
        let second =
            LocationFix::with_derived_heading(71.0, 34.0, Utc::now(), 0.0, Some(&first));
        assert!((second.heading - 90.0).abs() < 1e-9);
    }
}
