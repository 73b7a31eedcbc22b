// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Replay location provider backed by a GPX track.
//!
//! The replay loops: after the last track point, production resumes at the
//! first. The delay between successive emissions is the track-point time
//! delta divided by the speed multiplier, clamped to at least 1 ms; missing
//! or non-positive deltas fall back to 1000 ms.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;
use tokio::task::JoinHandle;

use crate::listeners::ListenerSet;
use crate::location::{LocationFix, LocationListener, LocationProvider, ProviderState};

const FALLBACK_DELAY: Duration = Duration::from_millis(1000);

/// Error reading a GPX track.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GpxError {
    #[error("error reading GPX file: {0}")]
    Read(String),
    #[error("malformed GPX document: {0}")]
    Xml(String),
}

/// One replay track point. `timed` records whether the source supplied a
/// timestamp, which drives the emission-delay fallbacks.
#[derive(Clone, Copy, Debug)]
struct ReplayPoint {
    fix: LocationFix,
    timed: bool,
}

struct ReplayState {
    index: usize,
    state: ProviderState,
    speed_multiplier: f64,
}

/// A location provider that replays a GPX track in a loop.
///
/// Constructed without arguments it replays a small built-in route, the same
/// convenience the host applications rely on for demos and testing.
pub struct LocationSimulator {
    track: Arc<Vec<ReplayPoint>>,
    listeners: Arc<ListenerSet<dyn LocationListener>>,
    shared: Arc<Mutex<ReplayState>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Default for LocationSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationSimulator {
    /// Creates a simulator replaying the built-in route.
    pub fn new() -> Self {
        Self::from_gpx_str(include_str!("../resources/simulation_route.gpx"))
            .expect("built-in route is valid")
    }

    /// Creates a simulator replaying the given GPX document.
    pub fn from_gpx_str(gpx: &str) -> Result<Self, GpxError> {
        let track = parse_gpx(gpx)?;
        if track.is_empty() {
            log::warn!("GPX track has no points; simulator will produce no fixes");
        }
        Ok(Self {
            track: Arc::new(track),
            listeners: Arc::new(ListenerSet::new()),
            shared: Arc::new(Mutex::new(ReplayState {
                index: 0,
                state: ProviderState::Stopped,
                speed_multiplier: 1.0,
            })),
            task: Mutex::new(None),
        })
    }

    /// Creates a simulator replaying a GPX file.
    pub fn from_gpx_file<P: AsRef<Path>>(path: P) -> Result<Self, GpxError> {
        let text = std::fs::read_to_string(path).map_err(|e| GpxError::Read(e.to_string()))?;
        Self::from_gpx_str(&text)
    }

    /// Number of track points in the replay source.
    pub fn track_len(&self) -> usize {
        self.track.len()
    }

    /// Returns the speed multiplier.
    pub fn speed_multiplier(&self) -> f64 {
        self.shared.lock().expect("replay state poisoned").speed_multiplier
    }

    /// Sets the replay speed multiplier. Non-positive values are ignored.
    pub fn set_speed_multiplier(&self, multiplier: f64) {
        if multiplier > 0.0 {
            self.shared.lock().expect("replay state poisoned").speed_multiplier = multiplier;
        } else {
            log::warn!("ignoring non-positive speed multiplier {multiplier}");
        }
    }

    fn abort_task(&self) {
        if let Some(task) = self.task.lock().expect("replay task poisoned").take() {
            task.abort();
        }
    }
}

impl Drop for LocationSimulator {
    fn drop(&mut self) {
        self.abort_task();
    }
}

impl LocationProvider for LocationSimulator {
    fn start(&self) {
        {
            let mut shared = self.shared.lock().expect("replay state poisoned");
            match shared.state {
                ProviderState::Started => return,
                ProviderState::Stopped => shared.index = 0,
                ProviderState::Paused => {}
            }
            shared.state = ProviderState::Started;
        }
        self.abort_task();
        let task = tokio::spawn(replay_task(
            self.track.clone(),
            self.shared.clone(),
            self.listeners.clone(),
        ));
        *self.task.lock().expect("replay task poisoned") = Some(task);
    }

    fn pause(&self) {
        let mut shared = self.shared.lock().expect("replay state poisoned");
        if shared.state != ProviderState::Started {
            return;
        }
        shared.state = ProviderState::Paused;
        drop(shared);
        self.abort_task();
    }

    fn stop(&self) {
        {
            let mut shared = self.shared.lock().expect("replay state poisoned");
            shared.state = ProviderState::Stopped;
            shared.index = 0;
        }
        self.abort_task();
    }

    fn state(&self) -> ProviderState {
        self.shared.lock().expect("replay state poisoned").state
    }

    fn add_listener(&self, listener: Arc<dyn LocationListener>) -> bool {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, listener: &Arc<dyn LocationListener>) -> bool {
        self.listeners.remove(listener)
    }
}

async fn replay_task(
    track: Arc<Vec<ReplayPoint>>,
    shared: Arc<Mutex<ReplayState>>,
    listeners: Arc<ListenerSet<dyn LocationListener>>,
) {
    if track.is_empty() {
        return;
    }
    loop {
        let (fix, delay) = {
            let mut state = shared.lock().expect("replay state poisoned");
            if state.state != ProviderState::Started {
                return;
            }
            let index = state.index;
            let delay = next_delay(&track, index, state.speed_multiplier);
            state.index = (index + 1) % track.len();
            (track[index].fix, delay)
        };
        for listener in listeners.snapshot() {
            listener.on_location_changed(&fix);
        }
        tokio::time::sleep(delay).await;
    }
}

/// Delay between the emission of `track[emitted]` and the following point.
fn next_delay(track: &[ReplayPoint], emitted: usize, speed_multiplier: f64) -> Duration {
    if track.len() <= 1 {
        return FALLBACK_DELAY;
    }
    let next = (emitted + 1) % track.len();
    let (current, following) = (&track[emitted], &track[next]);
    if !current.timed || !following.timed {
        return FALLBACK_DELAY;
    }
    let delta_ms = (following.fix.timestamp - current.fix.timestamp).num_milliseconds();
    if delta_ms <= 0 {
        return FALLBACK_DELAY;
    }
    let scaled = (delta_ms as f64 / speed_multiplier).round() as i64;
    Duration::from_millis(scaled.max(1) as u64)
}

fn parse_gpx(text: &str) -> Result<Vec<ReplayPoint>, GpxError> {
    #[derive(Default)]
    struct PendingPoint {
        lat: Option<f64>,
        lon: Option<f64>,
        time: Option<DateTime<Utc>>,
        speed: f64,
    }

    enum TextTarget {
        Time,
        Speed,
    }

    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut raw: Vec<(f64, f64, Option<DateTime<Utc>>, f64)> = Vec::new();
    let mut pending: Option<PendingPoint> = None;
    let mut target: Option<(TextTarget, String)> = None;

    let commit = |point: PendingPoint, raw: &mut Vec<(f64, f64, Option<DateTime<Utc>>, f64)>| {
        if let (Some(lat), Some(lon)) = (point.lat, point.lon) {
            raw.push((lon, lat, point.time, point.speed));
        }
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name.eq_ignore_ascii_case("trkpt") {
                    let mut point = PendingPoint::default();
                    for attr in e.attributes().flatten() {
                        let value = attr.unescape_value().unwrap_or_default();
                        match attr.key.local_name().as_ref() {
                            b"lat" => point.lat = value.parse().ok(),
                            b"lon" => point.lon = value.parse().ok(),
                            _ => {}
                        }
                    }
                    pending = Some(point);
                } else if pending.is_some() && name.eq_ignore_ascii_case("time") {
                    target = Some((TextTarget::Time, String::new()));
                } else if pending.is_some() && name.eq_ignore_ascii_case("speed") {
                    target = Some((TextTarget::Speed, String::new()));
                }
            }
            Ok(Event::Empty(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name.eq_ignore_ascii_case("trkpt") {
                    let mut point = PendingPoint::default();
                    for attr in e.attributes().flatten() {
                        let value = attr.unescape_value().unwrap_or_default();
                        match attr.key.local_name().as_ref() {
                            b"lat" => point.lat = value.parse().ok(),
                            b"lon" => point.lon = value.parse().ok(),
                            _ => {}
                        }
                    }
                    commit(point, &mut raw);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some((_, buffer)) = target.as_mut() {
                    let text = t.unescape().map_err(|e| GpxError::Xml(e.to_string()))?;
                    buffer.push_str(&text);
                }
            }
            Ok(Event::End(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name.eq_ignore_ascii_case("trkpt") {
                    if let Some(point) = pending.take() {
                        commit(point, &mut raw);
                    }
                    target = None;
                } else if let Some((kind, buffer)) = target.take() {
                    if let Some(point) = pending.as_mut() {
                        match kind {
                            TextTarget::Time => match parse_gpx_time(&buffer) {
                                Some(time) => point.time = Some(time),
                                None => log::debug!("could not parse track time '{buffer}'"),
                            },
                            TextTarget::Speed => match buffer.parse() {
                                Ok(speed) => point.speed = speed,
                                Err(_) => log::debug!("could not parse track speed '{buffer}'"),
                            },
                        }
                    }
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(GpxError::Xml(e.to_string())),
            Ok(_) => {}
        }
    }

    // track points play back in timestamp order; untimed points keep their
    // document position at the front
    raw.sort_by_key(|(_, _, time, _)| *time);

    let mut track: Vec<ReplayPoint> = Vec::with_capacity(raw.len());
    for (lon, lat, time, speed) in raw {
        let previous = track.last().map(|p| &p.fix);
        let fix = LocationFix::with_derived_heading(
            lon,
            lat,
            time.unwrap_or(DateTime::UNIX_EPOCH),
            speed,
            previous,
        );
        track.push(ReplayPoint {
            fix,
            timed: time.is_some(),
        });
    }
    Ok(track)
}

/// Parses a GPX `<time>` value: RFC 3339, or a bare `yyyy-MM-ddTHH:mm:ss`
/// local form treated as UTC.
fn parse_gpx_time(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(time) = DateTime::parse_from_rfc3339(text) {
        return Some(time.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}
