// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Inbound router for advanced symbology: classifies received Geomessages,
//! tracks spot-report graphics and highlight state, and calls out to the
//! rendering collaborator.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::codec::normalize_inbound_type;
use crate::geomessage::{
    Geomessage, GeomessageAction, CONTROL_POINTS_FIELD, TYPE_FIELD, WKID_FIELD,
};
use crate::render::{GraphicId, MapGeometry, SymbolRenderer};
use crate::reports::CHEM_LIGHT_TYPE;
use crate::transport::GeomessageListener;

const SPOT_REPORT_TYPE: &str = "spot_report";

/// Routes received Geomessages to a rendering runtime.
///
/// Register the router as a listener on a
/// [`MessageController`](crate::MessageController); it implements
/// [`GeomessageListener`]. Spot reports are displayed through a dedicated
/// graphic per report id; everything else goes to the renderer's message
/// processor. Records with `status911` drive the highlight state machine.
pub struct SymbolRouter {
    renderer: Arc<dyn SymbolRenderer>,
    map: Arc<dyn MapGeometry>,
    highlighted: Mutex<HashSet<String>>,
    spot_graphics: Mutex<HashMap<String, GraphicId>>,
    show_labels: AtomicBool,
}

impl SymbolRouter {
    pub fn new(renderer: Arc<dyn SymbolRenderer>, map: Arc<dyn MapGeometry>) -> Self {
        Self {
            renderer,
            map,
            highlighted: Mutex::new(HashSet::new()),
            spot_graphics: Mutex::new(HashMap::new()),
            show_labels: AtomicBool::new(true),
        }
    }

    /// Returns true if labels display on advanced symbology.
    pub fn show_labels(&self) -> bool {
        self.show_labels.load(Ordering::SeqCst)
    }

    /// Sets whether labels should display on advanced symbology.
    pub fn set_show_labels(&self, show_labels: bool) {
        self.show_labels.store(show_labels, Ordering::SeqCst);
    }

    /// Forgets all highlight state without calling the renderer.
    pub fn clear_highlights(&self) {
        self.highlighted
            .lock()
            .expect("highlight set poisoned")
            .clear();
    }

    /// Handles one received Geomessage: display, update, remove, highlight
    /// or un-highlight an advanced symbol on the map.
    pub fn handle_geomessage(&self, message: &Geomessage) {
        let mut message = message.clone();
        if let Some(message_type) = message.message_type() {
            let normalized = normalize_inbound_type(message_type).to_string();
            message.set_field(TYPE_FIELD, &normalized);
        }
        let message_type = message.message_type().unwrap_or_default().to_string();

        if message_type == SPOT_REPORT_TYPE {
            if !self.handle_spot_report(&message) {
                return;
            }
        } else {
            self.handle_symbol(&mut message, &message_type);
        }
        self.update_highlight(&message, &message_type);
    }

    /// Spot reports use one dedicated graphic per report id. Returns false
    /// if the record was dropped.
    fn handle_spot_report(&self, message: &Geomessage) -> bool {
        if let Some(points) = message.field(CONTROL_POINTS_FIELD) {
            let Some((x, y, wkid)) = parse_spot_location(points, message.field(WKID_FIELD))
            else {
                log::warn!(
                    "dropping spot report {} with unparseable location",
                    message.id()
                );
                return false;
            };
            let existing = self
                .spot_graphics
                .lock()
                .expect("spot graphic map poisoned")
                .get(message.id())
                .copied();
            if let Some(graphic) = self.renderer.display_spot_report(x, y, wkid, existing, message)
            {
                self.spot_graphics
                    .lock()
                    .expect("spot graphic map poisoned")
                    .insert(message.id().to_string(), graphic);
            }
        }
        if message.action() == Some(GeomessageAction::Remove) {
            let graphic = self
                .spot_graphics
                .lock()
                .expect("spot graphic map poisoned")
                .remove(message.id());
            if let Some(graphic) = graphic {
                self.renderer.remove_spot_report_graphic(graphic);
            }
        }
        true
    }

    fn handle_symbol(&self, message: &mut Geomessage, message_type: &str) {
        if message_type == CHEM_LIGHT_TYPE {
            // peers may send the color in the legacy `chemlight` field
            let color = message
                .field("color")
                .or_else(|| message.field("chemlight"))
                .map(str::to_string);
            if let Some(color) = color {
                message.set_field("chemlight", &color);
            }
        }

        // Labeled records need explicit x/y/z fields in WGS84 for the
        // rendering runtime's label placement.
        if self.show_labels() && message.field("datetimevalid").is_some() {
            if message.field("z").is_none() {
                message.set_field("z", "0");
            }
            self.apply_label_position(message);
        }

        self.renderer.process_message(message);
    }

    fn apply_label_position(&self, message: &mut Geomessage) {
        let Some(points) = message.field(CONTROL_POINTS_FIELD) else {
            return;
        };
        let Some((mut x, mut y)) = parse_first_point(points) else {
            log::error!(
                "unparseable control points '{points}' on record {}",
                message.id()
            );
            return;
        };
        if let Some(wkid) = message.field(WKID_FIELD) {
            match wkid.trim().parse::<i32>() {
                Ok(wkid) => {
                    if let Some((lon, lat)) = self.map.project_point(x, y, wkid, 4326) {
                        x = lon;
                        y = lat;
                    }
                }
                Err(_) => {
                    log::error!("unparseable WKID '{wkid}' on record {}", message.id());
                    return;
                }
            }
        }
        message.set_field("x", &x.to_string());
        message.set_field("y", &y.to_string());
    }

    fn update_highlight(&self, message: &Geomessage, message_type: &str) {
        let id = message.id();
        if id.is_empty() {
            return;
        }
        let now_highlighted = message.field("status911") == Some("1");
        let was_highlighted = self
            .highlighted
            .lock()
            .expect("highlight set poisoned")
            .contains(id);
        if now_highlighted == was_highlighted {
            return;
        }
        self.renderer
            .process_highlight(id, message_type, now_highlighted);
        let mut highlighted = self.highlighted.lock().expect("highlight set poisoned");
        if now_highlighted {
            highlighted.insert(id.to_string());
        } else {
            highlighted.remove(id);
        }
    }
}

impl GeomessageListener for SymbolRouter {
    fn on_geomessage(&self, message: &Geomessage) {
        self.handle_geomessage(message);
    }
}

/// Spot-report location: exactly two comma-separated numbers plus an
/// integer WKID.
fn parse_spot_location(points: &str, wkid: Option<&str>) -> Option<(f64, f64, i32)> {
    let tokens: Vec<&str> = points.split(',').map(str::trim).collect();
    if tokens.len() != 2 {
        return None;
    }
    let x = tokens[0].parse().ok()?;
    let y = tokens[1].parse().ok()?;
    let wkid = wkid?.trim().parse().ok()?;
    Some((x, y, wkid))
}

/// First `x,y` pair of a control-point list; separators are `,`, `;` and
/// space. Any further points are ignored.
fn parse_first_point(points: &str) -> Option<(f64, f64)> {
    let mut tokens = points
        .split([',', ';', ' '])
        .filter(|token| !token.is_empty());
    let x = tokens.next()?.parse().ok()?;
    let y = tokens.next()?.parse().ok()?;
    Some((x, y))
}
