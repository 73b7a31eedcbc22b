// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Wire date formats and heading math shared across the crate.

use chrono::{DateTime, Utc};

/// Format string for Geomessage wire timestamps.
///
/// Day-before-month, not ISO 8601. Deployed peers parse exactly this
/// pattern, so it is preserved bit-exact.
pub const GEOMESSAGE_DATE_FORMAT: &str = "%Y-%d-%m %H:%M:%S";

/// Formats a timestamp for the wire (`yyyy-dd-MM HH:mm:ss`, UTC).
pub fn format_geomessage_datetime(instant: &DateTime<Utc>) -> String {
    instant.format(GEOMESSAGE_DATE_FORMAT).to_string()
}

/// Formats a timestamp as a military date-time group in Zulu time,
/// e.g. `07143055Z Aug 26`.
pub fn format_military_zulu(instant: &DateTime<Utc>) -> String {
    instant.format("%d%H%M%SZ %b %y").to_string()
}

const TWO_PI: f64 = 2.0 * std::f64::consts::PI;
const FIVE_PI_OVER_TWO: f64 = 5.0 * std::f64::consts::PI / 2.0;

/// Converts a trigonometric angle to a compass heading, both in radians.
///
/// In trigonometry 0 is east and angles grow counterclockwise; on a compass
/// 0 is north and angles grow clockwise. The conversion is
/// `5π/2 − trig`, normalized to `[0, 2π)`.
pub fn to_compass_radians(trig_radians: f64) -> f64 {
    let mut compass = FIVE_PI_OVER_TWO - trig_radians;
    if compass >= TWO_PI {
        compass -= TWO_PI;
    } else if compass < 0.0 {
        compass += TWO_PI;
    }
    compass
}

/// Compass heading in degrees from one fix to the next, derived from the
/// planar slope between the two coordinates and normalized to `[0, 360)`.
///
/// Coincident points yield 0 rather than a NaN heading.
pub fn derived_heading_degrees(from_lon: f64, from_lat: f64, to_lon: f64, to_lat: f64) -> f64 {
    let rise = to_lat - from_lat;
    let run = to_lon - from_lon;
    if rise == 0.0 && run == 0.0 {
        return 0.0;
    }
    let mut trig = (rise / run).atan();
    if run < 0.0 {
        trig += std::f64::consts::PI;
    }
    to_compass_radians(trig).to_degrees()
}

/// Great-circle compass bearing in degrees from one point to another.
pub fn bearing_degrees(from_lon: f64, from_lat: f64, to_lon: f64, to_lat: f64) -> f64 {
    let from_lat_rad = from_lat.to_radians();
    let to_lat_rad = to_lat.to_radians();
    let delta_lon_rad = (to_lon - from_lon).to_radians();

    let y = delta_lon_rad.sin() * to_lat_rad.cos();
    let x = from_lat_rad.cos() * to_lat_rad.sin()
        - from_lat_rad.sin() * to_lat_rad.cos() * delta_lon_rad.cos();
    let bearing = y.atan2(x).to_degrees();

    (bearing + 360.0) % 360.0
}

/// Renders a coordinate for the wire. Whole numbers keep one decimal place
/// (`12.0`, not `12`), matching the rendering of the deployed peers.
pub fn format_coordinate(value: f64) -> String {
    if value == value.trunc() && value.is_finite() {
        format!("{value:.1}")
    } else {
        value.to_string()
    }
}

/// Normalizes an angle in degrees to fall between `min` and `max`.
pub fn fix_angle_degrees(mut angle: f64, min: f64, max: f64) -> f64 {
    while angle < min {
        angle += 360.0;
    }
    while angle > max {
        angle -= 360.0;
    }
    angle
}
