// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! This module provides the Geomessage record type and related field constants.

use std::collections::BTreeMap;
use std::str::FromStr;

/// The Geomessage ID field name.
pub const ID_FIELD: &str = "_id";

/// The Geomessage type field name.
pub const TYPE_FIELD: &str = "_type";

/// The Geomessage WKID field name.
pub const WKID_FIELD: &str = "_wkid";

/// The Geomessage control points field name.
pub const CONTROL_POINTS_FIELD: &str = "_control_points";

/// The Geomessage action field name.
pub const ACTION_FIELD: &str = "_action";

/// The Geomessage symbol ID code (SIC or SIDC) field name.
pub const SIC_FIELD: &str = "sic";

/// The field carrying the sender's unique designation (callsign).
pub const UNIQUE_DESIGNATION_FIELD: &str = "uniquedesignation";

/// A single structured record exchanged in a broadcast envelope.
///
/// A Geomessage is a mapping from field names to text values plus a
/// distinguished identifier. The identifier is mirrored in the reserved
/// [`ID_FIELD`] field; writing either side keeps the two consistent.
///
/// Records are built up with [`set_field`](Self::set_field) and treated as
/// immutable once handed to the transport. Re-emitting an altered variant is
/// done on a clone (see [`without_labels`](Self::without_labels)).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Geomessage {
    id: String,
    fields: BTreeMap<String, String>,
}

impl Geomessage {
    /// Creates an empty Geomessage with no identifier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Geomessage with the given identifier.
    pub fn with_id<S: AsRef<str>>(id: S) -> Self {
        let mut message = Self::default();
        message.set_id(id.as_ref());
        message
    }

    /// Returns the record's unique identifier. Empty if the record carries
    /// no `_id` field.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sets the record's unique identifier, mirroring it into the reserved
    /// `_id` field.
    pub fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
        self.fields.insert(ID_FIELD.to_string(), id.to_string());
    }

    /// Returns a field value, or `None` if the field is absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    /// Sets a field. Setting the reserved `_id` field also updates the
    /// record's identifier.
    pub fn set_field(&mut self, name: &str, value: &str) {
        if name == ID_FIELD {
            self.id = value.to_string();
        }
        self.fields.insert(name.to_string(), value.to_string());
    }

    /// Removes a field. Removing the reserved `_id` field clears the
    /// identifier.
    pub fn remove_field(&mut self, name: &str) -> Option<String> {
        if name == ID_FIELD {
            self.id.clear();
        }
        self.fields.remove(name)
    }

    /// Iterates over all fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter()
    }

    /// Returns true if the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the record type (the `_type` field), if present.
    pub fn message_type(&self) -> Option<&str> {
        self.field(TYPE_FIELD)
    }

    /// Returns the parsed `_action` field, if present and recognized.
    pub fn action(&self) -> Option<GeomessageAction> {
        self.field(ACTION_FIELD).and_then(|a| a.parse().ok())
    }

    /// Returns a clone with the label-carrying fields blanked.
    ///
    /// Some rendering runtimes can only suppress symbol labels by processing
    /// a copy of the record with the labeling fields emptied.
    pub fn without_labels(&self) -> Geomessage {
        let mut clone = self.clone();
        for name in [
            "additionalinformation",
            UNIQUE_DESIGNATION_FIELD,
            "speed",
            "type",
            "x",
            "y",
            "z",
            "datetimevalid",
        ] {
            clone.fields.insert(name.to_string(), String::new());
        }
        clone
    }
}

/// Wire actions a Geomessage can request of its receivers.
///
/// Parsed case-insensitively; the wire carries `update`, `remove` and
/// `removeall` in either case.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GeomessageAction {
    Update,
    Remove,
    RemoveAll,
}

impl FromStr for GeomessageAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("update") {
            Ok(GeomessageAction::Update)
        } else if s.eq_ignore_ascii_case("remove") {
            Ok(GeomessageAction::Remove)
        } else if s.eq_ignore_ascii_case("removeall") {
            Ok(GeomessageAction::RemoveAll)
        } else {
            Err(())
        }
    }
}
