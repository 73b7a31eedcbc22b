// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Capability traits implemented by the hosting map application.
//!
//! The core never renders or projects anything itself; it calls out through
//! these interfaces. Implementations are assumed to tolerate calls from the
//! transport's delivery tasks.

use crate::geomessage::Geomessage;

/// Identifier of a graphic created by the rendering runtime.
pub type GraphicId = i32;

/// Coordinate services provided by the map runtime.
pub trait MapGeometry: Send + Sync {
    /// Projects a point between coordinate systems. `None` if the runtime
    /// cannot project between the two systems.
    fn project_point(&self, x: f64, y: f64, from_wkid: i32, to_wkid: i32) -> Option<(f64, f64)>;

    /// Formats a point as an MGRS string. `None` if the runtime cannot
    /// convert the point.
    fn point_to_mgrs(&self, x: f64, y: f64, wkid: i32) -> Option<String>;
}

/// Advanced-symbol rendering operations provided by the map runtime.
pub trait SymbolRenderer: Send + Sync {
    /// Displays or updates a spot-report graphic. `graphic_id` carries the
    /// existing graphic for this report id, or `None` for a new report.
    /// Returns the id of the created or updated graphic, or `None` if the
    /// graphic could not be displayed.
    fn display_spot_report(
        &self,
        x: f64,
        y: f64,
        wkid: i32,
        graphic_id: Option<GraphicId>,
        message: &Geomessage,
    ) -> Option<GraphicId>;

    /// Removes a graphic from the spot-report layer.
    fn remove_spot_report_graphic(&self, graphic_id: GraphicId);

    /// Processes a non-spot record, adding, modifying or removing a symbol
    /// on the map as appropriate. Returns true if successful.
    fn process_message(&self, message: &Geomessage) -> bool;

    /// Highlights or un-highlights the symbol with the given record id.
    /// Returns true if successful.
    fn process_highlight(&self, message_id: &str, message_type: &str, highlight: bool) -> bool;

    /// Removes the symbol with the given record id from the map.
    fn process_remove(&self, message_id: &str, message_type: &str);
}
