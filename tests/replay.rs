// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Replay provider scheduling: looping, pause/resume, stop-resets.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use geomessage_broadcast::{
    LocationFix, LocationListener, LocationProvider, LocationSimulator, ProviderState,
};

const THREE_POINTS: &str = r#"<?xml version="1.0"?>
<gpx><trk><trkseg>
<trkpt lat="1.0" lon="10.0"><time>2014-01-15T10:00:00Z</time></trkpt>
<trkpt lat="2.0" lon="20.0"><time>2014-01-15T10:00:01Z</time></trkpt>
<trkpt lat="3.0" lon="30.0"><time>2014-01-15T10:00:02Z</time></trkpt>
</trkseg></trk></gpx>"#;

#[derive(Default)]
struct FixLog {
    fixes: Mutex<Vec<LocationFix>>,
}

impl FixLog {
    fn count(&self) -> usize {
        self.fixes.lock().unwrap().len()
    }

    fn fixes(&self) -> Vec<LocationFix> {
        self.fixes.lock().unwrap().clone()
    }
}

impl LocationListener for FixLog {
    fn on_location_changed(&self, fix: &LocationFix) {
        self.fixes.lock().unwrap().push(*fix);
    }
}

fn fast_simulator() -> (LocationSimulator, Arc<FixLog>) {
    let simulator = LocationSimulator::from_gpx_str(THREE_POINTS).unwrap();
    // 1 s track deltas replayed as 10 ms delays
    simulator.set_speed_multiplier(100.0);
    let log = Arc::new(FixLog::default());
    simulator.add_listener(log.clone());
    (simulator, log)
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    for _ in 0..300 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test(flavor = "multi_thread")]
async fn replay_loops_back_to_the_first_point() {
    let (simulator, log) = fast_simulator();
    simulator.start();
    assert_eq!(simulator.state(), ProviderState::Started);

    assert!(wait_until(|| log.count() >= 4).await);
    simulator.stop();

    let fixes = log.fixes();
    assert_eq!(fixes[0].latitude, 1.0);
    assert_eq!(fixes[1].latitude, 2.0);
    assert_eq!(fixes[2].latitude, 3.0);
    // fourth emission wraps to the first point again
    assert_eq!(fixes[3].latitude, 1.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn timestamps_are_monotonic_within_one_pass() {
    let (simulator, log) = fast_simulator();
    simulator.start();
    assert!(wait_until(|| log.count() >= 3).await);
    simulator.stop();

    let fixes = log.fixes();
    assert!(fixes[0].timestamp <= fixes[1].timestamp);
    assert!(fixes[1].timestamp <= fixes[2].timestamp);
}

#[tokio::test(flavor = "multi_thread")]
async fn pause_holds_position_and_start_resumes() {
    let (simulator, log) = fast_simulator();
    simulator.start();
    assert!(wait_until(|| log.count() >= 2).await);

    simulator.pause();
    assert_eq!(simulator.state(), ProviderState::Paused);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let paused_at = log.count();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(log.count(), paused_at);

    let next_latitude = {
        let fixes = log.fixes();
        let last = fixes.last().unwrap().latitude;
        // the track is 1.0, 2.0, 3.0 looping
        if last == 3.0 {
            1.0
        } else {
            last + 1.0
        }
    };
    simulator.start();
    assert!(wait_until(|| log.count() > paused_at).await);
    assert_eq!(log.fixes()[paused_at].latitude, next_latitude);
    simulator.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_resets_to_the_beginning() {
    let (simulator, log) = fast_simulator();
    simulator.start();
    assert!(wait_until(|| log.count() >= 2).await);

    simulator.stop();
    assert_eq!(simulator.state(), ProviderState::Stopped);
    tokio::time::sleep(Duration::from_millis(100)).await;
    let stopped_at = log.count();

    simulator.start();
    assert!(wait_until(|| log.count() > stopped_at).await);
    assert_eq!(log.fixes()[stopped_at].latitude, 1.0);
    simulator.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn start_while_started_is_a_noop() {
    let (simulator, log) = fast_simulator();
    simulator.start();
    simulator.start();
    assert!(wait_until(|| log.count() >= 3).await);
    simulator.stop();

    // a double start must not double-emit the track
    let fixes = log.fixes();
    assert_eq!(fixes[0].latitude, 1.0);
    assert_eq!(fixes[1].latitude, 2.0);
    assert_eq!(fixes[2].latitude, 3.0);
}

#[tokio::test(flavor = "multi_thread")]
async fn listeners_added_mid_replay_get_later_fixes_only() {
    let (simulator, log) = fast_simulator();
    simulator.start();
    assert!(wait_until(|| log.count() >= 2).await);

    let late = Arc::new(FixLog::default());
    simulator.add_listener(late.clone());
    assert!(wait_until(|| late.count() >= 1).await);
    simulator.stop();

    assert!(late.count() < log.count());
}
