// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Periodic position-report pump.
//!
//! The pump subscribes to a location stream, remembers the most recent fix,
//! and while enabled broadcasts one position report per period built from
//! that fix. Send failures are logged and swallowed; the timer keeps
//! running.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::geomessage::{
    Geomessage, ACTION_FIELD, CONTROL_POINTS_FIELD, SIC_FIELD, TYPE_FIELD,
    UNIQUE_DESIGNATION_FIELD, WKID_FIELD,
};
use crate::location::{LocationFix, LocationListener};
use crate::transport::MessageController;
use crate::util::{format_coordinate, format_geomessage_datetime};

/// The default report period, in milliseconds.
pub const DEFAULT_REPORT_PERIOD_MS: u64 = 1000;

/// The type string for position-report Geomessages.
pub const POSITION_REPORT_TYPE: &str = "position_report";

const WKID_WGS84: &str = "4326";

/// The identity broadcast in position reports.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ReportIdentity {
    /// Human-readable, unique callsign (goes out as `uniquedesignation`).
    pub callsign: String,
    /// Vehicle type label, e.g. `HMMWV`.
    pub vehicle_type: String,
    /// Stable unique id for this vehicle, used as the record id so peers
    /// update rather than duplicate the track.
    pub unique_id: String,
    /// MIL-STD-2525C symbol ID code for the sender.
    pub symbol_code: String,
}

/// Error enabling the pump with incomplete identity.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PumpConfigError {
    #[error("position reporting requires a callsign before it can be enabled")]
    MissingCallsign,
    #[error("position reporting requires a unique id before it can be enabled")]
    MissingUniqueId,
}

struct ReporterState {
    enabled: bool,
    period: Duration,
    emergency: bool,
    identity: ReportIdentity,
    last_fix: Option<LocationFix>,
    timer: Option<JoinHandle<()>>,
}

struct ReporterInner {
    controller: MessageController,
    state: Mutex<ReporterState>,
}

/// Broadcasts position reports built from the most recent location fix.
///
/// Register the reporter as a listener on a [`LocationProvider`]
/// (it implements [`LocationListener`]), then call
/// [`set_enabled(true)`](Self::set_enabled). Reports start as soon as a fix
/// is available and stop when disabled. Changing the period or the
/// emergency flag while enabled restarts the timer.
///
/// [`LocationProvider`]: crate::LocationProvider
pub struct PositionReporter {
    inner: Arc<ReporterInner>,
}

impl PositionReporter {
    /// Creates a reporter that sends through the given controller.
    pub fn new(controller: MessageController, identity: ReportIdentity) -> Arc<Self> {
        Arc::new(Self {
            inner: Arc::new(ReporterInner {
                controller,
                state: Mutex::new(ReporterState {
                    enabled: false,
                    period: Duration::from_millis(DEFAULT_REPORT_PERIOD_MS),
                    emergency: false,
                    identity,
                    last_fix: None,
                    timer: None,
                }),
            }),
        })
    }

    /// Enables or disables reporting.
    ///
    /// Enabling requires a callsign and a unique id; reports begin
    /// immediately if a fix is already available, otherwise with the first
    /// fix. Disabling stops the timer with no further emissions after the
    /// currently-executing send.
    pub fn set_enabled(&self, enabled: bool) -> Result<(), PumpConfigError> {
        let mut state = self.lock_state();
        if enabled {
            if state.identity.callsign.is_empty() {
                return Err(PumpConfigError::MissingCallsign);
            }
            if state.identity.unique_id.is_empty() {
                return Err(PumpConfigError::MissingUniqueId);
            }
        }
        let changed = state.enabled != enabled;
        state.enabled = enabled;
        if enabled && changed {
            restart_timer(&self.inner, &mut state);
        } else if !enabled {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
        Ok(())
    }

    pub fn is_enabled(&self) -> bool {
        self.lock_state().enabled
    }

    /// Returns the report period in milliseconds.
    pub fn period_ms(&self) -> u64 {
        self.lock_state().period.as_millis() as u64
    }

    /// Sets the minimum number of milliseconds between reports. A
    /// non-positive value restores [`DEFAULT_REPORT_PERIOD_MS`]. Changing
    /// the period while enabled restarts the timer.
    pub fn set_period_ms(&self, period_ms: i64) {
        let period = if period_ms <= 0 {
            Duration::from_millis(DEFAULT_REPORT_PERIOD_MS)
        } else {
            Duration::from_millis(period_ms as u64)
        };
        let mut state = self.lock_state();
        let changed = state.period != period;
        state.period = period;
        if state.enabled && changed {
            restart_timer(&self.inner, &mut state);
        }
    }

    pub fn is_emergency(&self) -> bool {
        self.lock_state().emergency
    }

    /// Sets the 911 (emergency) status flag carried in each report.
    pub fn set_emergency(&self, emergency: bool) {
        let mut state = self.lock_state();
        let changed = state.emergency != emergency;
        state.emergency = emergency;
        if state.enabled && changed {
            restart_timer(&self.inner, &mut state);
        }
    }

    pub fn identity(&self) -> ReportIdentity {
        self.lock_state().identity.clone()
    }

    pub fn set_identity(&self, identity: ReportIdentity) {
        self.lock_state().identity = identity;
    }

    /// Returns the most recent fix, if any has arrived.
    pub fn last_fix(&self) -> Option<LocationFix> {
        self.lock_state().last_fix
    }

    /// Returns the controller this reporter sends through.
    pub fn controller(&self) -> MessageController {
        self.inner.controller.clone()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ReporterState> {
        self.inner.state.lock().expect("reporter state poisoned")
    }
}

impl LocationListener for PositionReporter {
    fn on_location_changed(&self, fix: &LocationFix) {
        let mut state = self.lock_state();
        let first_fix = state.last_fix.is_none();
        state.last_fix = Some(*fix);
        if first_fix && state.enabled {
            restart_timer(&self.inner, &mut state);
        }
    }
}

impl Drop for PositionReporter {
    fn drop(&mut self) {
        if let Ok(mut state) = self.inner.state.lock() {
            if let Some(timer) = state.timer.take() {
                timer.abort();
            }
        }
    }
}

fn restart_timer(inner: &Arc<ReporterInner>, state: &mut ReporterState) {
    if let Some(timer) = state.timer.take() {
        timer.abort();
    }
    let period = state.period;
    let weak = Arc::downgrade(inner);
    state.timer = Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = weak.upgrade() else { return };
            if !send_report(&inner).await {
                return;
            }
        }
    }));
}

/// One timer tick. Returns false when the pump has been disabled and the
/// timer task should exit.
async fn send_report(inner: &Arc<ReporterInner>) -> bool {
    let message = {
        let state = inner.state.lock().expect("reporter state poisoned");
        if !state.enabled {
            return false;
        }
        let Some(fix) = state.last_fix else {
            return true;
        };
        build_position_report(&state.identity, &fix, state.emergency)
    };
    if let Err(err) = inner.controller.send_geomessage(&message).await {
        log::error!("could not send position report: {err}");
    }
    true
}

/// Builds one position-report record from a fix.
pub fn build_position_report(
    identity: &ReportIdentity,
    fix: &LocationFix,
    emergency: bool,
) -> Geomessage {
    let mut message = Geomessage::with_id(&identity.unique_id);
    message.set_field(TYPE_FIELD, POSITION_REPORT_TYPE);
    message.set_field(SIC_FIELD, &identity.symbol_code);
    message.set_field("type", &identity.vehicle_type);
    message.set_field(WKID_FIELD, WKID_WGS84);
    message.set_field(
        CONTROL_POINTS_FIELD,
        &format!(
            "{},{}",
            format_coordinate(fix.longitude),
            format_coordinate(fix.latitude)
        ),
    );
    message.set_field(ACTION_FIELD, "UPDATE");
    message.set_field(UNIQUE_DESIGNATION_FIELD, &identity.callsign);
    message.set_field(
        "datetimesubmitted",
        &format_geomessage_datetime(&Utc::now()),
    );
    message.set_field("datetimevalid", &format_geomessage_datetime(&fix.timestamp));
    message.set_field("direction", &(fix.heading.round() as i64).to_string());
    message.set_field("status911", if emergency { "1" } else { "0" });
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn identity() -> ReportIdentity {
        ReportIdentity {
            callsign: "Honey Badgers 42G".into(),
            vehicle_type: "HMMWV".into(),
            unique_id: "uid-1".into(),
            symbol_code: "SFGPEVCAH------".into(),
        }
    }

    #[test]
    fn report_carries_the_full_field_set() {
        let fix = LocationFix::new(
            70.4,
            34.4,
            Utc.with_ymd_and_hms(2014, 3, 7, 15, 30, 0).unwrap(),
            5.0,
            89.6,
        );
        let message = build_position_report(&identity(), &fix, false);
        assert_eq!(message.id(), "uid-1");
        assert_eq!(message.field(TYPE_FIELD), Some(POSITION_REPORT_TYPE));
        assert_eq!(message.field(SIC_FIELD), Some("SFGPEVCAH------"));
        assert_eq!(message.field("type"), Some("HMMWV"));
        assert_eq!(message.field(WKID_FIELD), Some("4326"));
        assert_eq!(message.field(CONTROL_POINTS_FIELD), Some("70.4,34.4"));
        assert_eq!(message.field(ACTION_FIELD), Some("UPDATE"));
        assert_eq!(
            message.field(UNIQUE_DESIGNATION_FIELD),
            Some("Honey Badgers 42G")
        );
        assert_eq!(message.field("datetimevalid"), Some("2014-07-03 15:30:00"));
        assert_eq!(message.field("direction"), Some("90"));
        assert_eq!(message.field("status911"), Some("0"));
    }

    #[test]
    fn emergency_flag_sets_status911() {
        let fix = LocationFix::new(0.0, 0.0, Utc::now(), 0.0, 0.0);
        let message = build_position_report(&identity(), &fix, true);
        assert_eq!(message.field("status911"), Some("1"));
    }

    #[tokio::test]
    async fn enabling_requires_identity() {
        let controller = MessageController::bind(0).await.unwrap();
        let reporter = PositionReporter::new(
            controller,
            ReportIdentity {
                callsign: String::new(),
                ..identity()
            },
        );
        assert!(matches!(
            reporter.set_enabled(true),
            Err(PumpConfigError::MissingCallsign)
        ));
        assert!(!reporter.is_enabled());
        // disabling is always allowed
        reporter.set_enabled(false).unwrap();
    }

    #[tokio::test]
    async fn non_positive_period_restores_the_default() {
        let controller = MessageController::bind(0).await.unwrap();
        let reporter = PositionReporter::new(controller, identity());
        assert_eq!(reporter.period_ms(), DEFAULT_REPORT_PERIOD_MS);
        reporter.set_period_ms(3456);
        assert_eq!(reporter.period_ms(), 3456);
        reporter.set_period_ms(-42);
        assert_eq!(reporter.period_ms(), DEFAULT_REPORT_PERIOD_MS);
        reporter.set_period_ms(0);
        assert_eq!(reporter.period_ms(), DEFAULT_REPORT_PERIOD_MS);
    }
}
