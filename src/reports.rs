// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Chem-light and removal record builders, and the chem-light color palette.

use chrono::Utc;
use uuid::Uuid;

use crate::geomessage::{
    Geomessage, ACTION_FIELD, CONTROL_POINTS_FIELD, TYPE_FIELD, UNIQUE_DESIGNATION_FIELD,
    WKID_FIELD,
};
use crate::transport::MessageController;
use crate::util::{format_coordinate, format_geomessage_datetime};
use crate::SendError;

/// The type string for chem-light Geomessages.
pub const CHEM_LIGHT_TYPE: &str = "chemlight";

/// Translates a 32-bit ARGB color to the wire palette token.
///
/// The protocol supports four colors: red is `"1"`, green is `"2"`, blue is
/// `"3"`, yellow is `"4"`. Any other color becomes a `#RRGGBB` hex literal
/// (alpha stripped) in case some client can use it.
pub fn encode_color(argb: u32) -> String {
    match argb {
        0xFFFF_0000 => "1".to_string(),
        0xFF00_FF00 => "2".to_string(),
        0xFF00_00FF => "3".to_string(),
        0xFFFF_FF00 => "4".to_string(),
        other => format!("#{:06x}", other & 0x00FF_FFFF),
    }
}

/// Builds a chem-light record at the given coordinates.
///
/// A fresh UUID is generated as both the record id and the
/// `uniquedesignation`, so every chem light is a new marker.
pub fn build_chem_light(x: f64, y: f64, wkid: i32, argb_color: u32) -> Geomessage {
    let now = format_geomessage_datetime(&Utc::now());
    let mut message = Geomessage::with_id(&Uuid::new_v4().to_string());
    message.set_field(TYPE_FIELD, CHEM_LIGHT_TYPE);
    message.set_field(WKID_FIELD, &wkid.to_string());
    message.set_field(
        CONTROL_POINTS_FIELD,
        &format!("{},{}", format_coordinate(x), format_coordinate(y)),
    );
    message.set_field(ACTION_FIELD, "UPDATE");
    let id = message.id().to_string();
    message.set_field(UNIQUE_DESIGNATION_FIELD, &id);
    message.set_field("color", &encode_color(argb_color));
    message.set_field("datetimesubmitted", &now);
    message.set_field("datetimemodified", &now);
    message
}

/// Builds a removal notice for the record with the given type and id.
/// Receivers take the `REMOVE` action and need nothing else.
pub fn build_removal(message_type: &str, message_id: &str) -> Geomessage {
    let mut message = Geomessage::with_id(message_id);
    message.set_field(TYPE_FIELD, message_type);
    message.set_field(ACTION_FIELD, "REMOVE");
    message
}

impl MessageController {
    /// Broadcasts a chem light, using longitude and latitude. Shorthand for
    /// [`send_chem_light`](Self::send_chem_light) with WKID 4326.
    pub async fn send_chem_light_lon_lat(
        &self,
        longitude: f64,
        latitude: f64,
        argb_color: u32,
    ) -> Result<Geomessage, SendError> {
        self.send_chem_light(longitude, latitude, 4326, argb_color).await
    }

    /// Broadcasts a chem light at the given coordinates. Returns the wire
    /// record that was sent; thanks to send loopback it also appears on
    /// local listeners before this method returns.
    pub async fn send_chem_light(
        &self,
        x: f64,
        y: f64,
        wkid: i32,
        argb_color: u32,
    ) -> Result<Geomessage, SendError> {
        let message = build_chem_light(x, y, wkid, argb_color);
        self.send_geomessage(&message).await?;
        Ok(message)
    }

    /// Broadcasts a removal notice for the record with the given type and
    /// id.
    pub async fn send_removal(
        &self,
        message_type: &str,
        message_id: &str,
    ) -> Result<(), SendError> {
        self.send_geomessage(&build_removal(message_type, message_id))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_tokens_for_the_four_protocol_colors() {
        assert_eq!(encode_color(0xFFFF0000), "1");
        assert_eq!(encode_color(0xFF00FF00), "2");
        assert_eq!(encode_color(0xFF0000FF), "3");
        assert_eq!(encode_color(0xFFFFFF00), "4");
    }

    #[test]
    fn other_colors_become_zero_padded_hex_without_alpha() {
        assert_eq!(encode_color(0xFF123456), "#123456");
        assert_eq!(encode_color(0x00000001), "#000001");
        assert_eq!(encode_color(0x80FF0000), "#ff0000");
    }

    #[test]
    fn chem_light_record_shape() {
        let message = build_chem_light(12.0, 34.0, 4326, 0xFFFF0000);
        assert!(!message.id().is_empty());
        assert_eq!(message.field(TYPE_FIELD), Some(CHEM_LIGHT_TYPE));
        assert_eq!(message.field(WKID_FIELD), Some("4326"));
        assert_eq!(message.field(CONTROL_POINTS_FIELD), Some("12.0,34.0"));
        assert_eq!(message.field(ACTION_FIELD), Some("UPDATE"));
        assert_eq!(message.field("color"), Some("1"));
        assert_eq!(
            message.field(UNIQUE_DESIGNATION_FIELD),
            Some(message.id())
        );
        assert_eq!(
            message.field("datetimesubmitted"),
            message.field("datetimemodified")
        );
    }

    #[test]
    fn each_chem_light_gets_a_fresh_id() {
        let first = build_chem_light(0.0, 0.0, 4326, 0xFF00FF00);
        let second = build_chem_light(0.0, 0.0, 4326, 0xFF00FF00);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn removal_carries_only_type_id_and_action() {
        let message = build_removal(CHEM_LIGHT_TYPE, "abc");
        assert_eq!(message.id(), "abc");
        assert_eq!(message.field(TYPE_FIELD), Some(CHEM_LIGHT_TYPE));
        assert_eq!(message.field(ACTION_FIELD), Some("REMOVE"));
        assert_eq!(message.fields().count(), 3);
    }
}
