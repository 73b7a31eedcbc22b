// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Self-suppression policy: decides whether a record that was locally
//! produced is re-delivered to local listeners.
//!
//! A process receives its own broadcasts. For periodic high-frequency types
//! (position reports) the echo would duplicate rendering, so those are
//! suppressed; for infrequent edit-like types (spot reports, chem lights,
//! removals) the echo is desired.

use std::collections::HashSet;

use crate::codec::normalize_inbound_type;
use crate::geomessage::{Geomessage, TYPE_FIELD, UNIQUE_DESIGNATION_FIELD};

/// Record types suppressed by default.
pub const DEFAULT_SELF_IGNORE_TYPES: [&str; 2] = ["trackrep", "position_report"];

/// Policy configuration: the identity this process broadcasts with, and the
/// set of record types whose local echoes are unwanted.
#[derive(Clone, Debug)]
pub struct SuppressionPolicy {
    sender_identity: Option<String>,
    self_ignore_types: HashSet<String>,
}

impl Default for SuppressionPolicy {
    fn default() -> Self {
        Self {
            sender_identity: None,
            self_ignore_types: DEFAULT_SELF_IGNORE_TYPES
                .iter()
                .map(|t| normalize_inbound_type(t).to_string())
                .collect(),
        }
    }
}

impl SuppressionPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the configured sender identity.
    pub fn sender_identity(&self) -> Option<&str> {
        self.sender_identity.as_deref()
    }

    /// Sets or clears the identity used to recognize this process's own
    /// records in inbound traffic.
    pub fn set_sender_identity(&mut self, identity: Option<String>) {
        self.sender_identity = identity;
    }

    /// Replaces the ignore set. Type names are normalized, so external
    /// aliases (`trackrep`, `spotrep`) and canonical names are equivalent.
    pub fn set_self_ignore_types<I, S>(&mut self, types: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.self_ignore_types = types
            .into_iter()
            .map(|t| normalize_inbound_type(t.as_ref()).to_string())
            .collect();
    }

    fn is_ignored_type(&self, message: &Geomessage) -> bool {
        message
            .field(TYPE_FIELD)
            .map(|t| self.self_ignore_types.contains(normalize_inbound_type(t)))
            .unwrap_or(false)
    }

    fn is_own(&self, message: &Geomessage) -> bool {
        match (&self.sender_identity, message.field(UNIQUE_DESIGNATION_FIELD)) {
            (Some(identity), Some(designation)) => identity == designation,
            _ => false,
        }
    }

    /// Whether a record received from the network should reach local
    /// `on_geomessage` listeners. Suppressed only when the record is of an
    /// ignored type and carries this process's own designation.
    pub fn deliver_received(&self, message: &Geomessage) -> bool {
        !(self.is_ignored_type(message) && self.is_own(message))
    }

    /// Whether a locally-sent record should be looped back to local
    /// `on_geomessage` listeners. Suppressed for every ignored type,
    /// regardless of designation.
    pub fn deliver_sent(&self, message: &Geomessage) -> bool {
        !self.is_ignored_type(message)
    }
}
