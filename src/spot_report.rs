// SPDX-License-Identifier: MIT
// Copyright (c) 2021-2025 Martyn P <martyn@datasync.dev>

//! Spot reports in the standard SALUTE format: Size, Activity, Location,
//! Unit, Time, Equipment.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::external_type_name;
use crate::geomessage::{
    Geomessage, ACTION_FIELD, CONTROL_POINTS_FIELD, TYPE_FIELD, UNIQUE_DESIGNATION_FIELD,
    WKID_FIELD,
};
use crate::render::MapGeometry;
use crate::transport::MessageController;
use crate::util::{format_coordinate, format_geomessage_datetime};
use crate::SendError;

/// Size of the observed unit. Each value carries the stable numeric code
/// that the external adapter expects in `size_cat`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Size {
    Team,
    Squad,
    Section,
    Platoon,
    Company,
    Battalion,
    Regiment,
    Brigade,
    Division,
    Corps,
    Army,
    ArmyGroup,
    Region,
    Command,
}

impl Size {
    pub fn code(&self) -> u32 {
        match self {
            Size::Team => 0,
            Size::Squad => 1,
            Size::Section => 11,
            Size::Platoon => 111,
            Size::Company => 2,
            Size::Battalion => 22,
            Size::Regiment => 222,
            Size::Brigade => 3,
            Size::Division => 33,
            Size::Corps => 333,
            Size::Army => 3333,
            Size::ArmyGroup => 33333,
            Size::Region => 333333,
            Size::Command => 44,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Size::Team => "Team",
            Size::Squad => "Squad",
            Size::Section => "Section",
            Size::Platoon => "Platoon/Detachment",
            Size::Company => "Company/Battery/Troop",
            Size::Battalion => "Battalion/Squadron",
            Size::Regiment => "Regiment/Group",
            Size::Brigade => "Brigade",
            Size::Division => "Division",
            Size::Corps => "Corps",
            Size::Army => "Army",
            Size::ArmyGroup => "Army Group/Front",
            Size::Region => "Region",
            Size::Command => "Command",
        }
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Activity of the observed unit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Activity {
    Attacking,
    Defending,
    Moving,
    Stationary,
    Cache,
    Civilian,
    PersonnelRecovery,
}

impl Activity {
    pub fn code(&self) -> &'static str {
        self.name()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activity::Attacking => "Attacking",
            Activity::Defending => "Defending",
            Activity::Moving => "Moving",
            Activity::Stationary => "Stationary",
            Activity::Cache => "Cache",
            Activity::Civilian => "Civilian",
            Activity::PersonnelRecovery => "Personnel Recovery",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Kind of unit observed.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Unit {
    Conventional,
    Irregular,
    Coalition,
    HostNation,
    Ngo,
    Civilian,
    Facility,
}

impl Unit {
    pub fn code(&self) -> &'static str {
        self.name()
    }

    pub fn name(&self) -> &'static str {
        match self {
            Unit::Conventional => "Conventional",
            Unit::Irregular => "Irregular",
            Unit::Coalition => "Coalition",
            Unit::HostNation => "Host Nation",
            Unit::Ngo => "NGO",
            Unit::Civilian => "Civilian",
            Unit::Facility => "Facility",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Equipment observed. The code is the symbol name the external adapter
/// maps to a hostile equipment symbol.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum Equipment {
    MissileLauncher,
    GrenadeLauncher,
    Howitzer,
    ArmoredPersonnelCarrier,
    GroundVehicle,
    ArmoredTank,
    Rifle,
    Ied,
}

impl Equipment {
    pub fn code(&self) -> &'static str {
        match self {
            Equipment::MissileLauncher => "Missile Launcher H",
            Equipment::GrenadeLauncher => "Grenade Launcher H",
            Equipment::Howitzer => "Howitzer H",
            Equipment::ArmoredPersonnelCarrier => "Armored Personnel Carrier H",
            Equipment::GroundVehicle => "Ground Vehicle H",
            Equipment::ArmoredTank => "Armored Tank H",
            Equipment::Rifle => "Rifle H",
            Equipment::Ied => "IED H",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Equipment::MissileLauncher => "Hostile Missile Launcher",
            Equipment::GrenadeLauncher => "Hostile Grenade Launcher",
            Equipment::Howitzer => "Hostile Howitzer",
            Equipment::ArmoredPersonnelCarrier => "Hostile Armored Personnel Carrier",
            Equipment::GroundVehicle => "Hostile Ground Vehicle",
            Equipment::ArmoredTank => "Hostile Armored Tank",
            Equipment::Rifle => "Hostile Rifle",
            Equipment::Ied => "Hostile IED",
        }
    }
}

impl fmt::Display for Equipment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A SALUTE spot report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SpotReport {
    pub size: Size,
    pub activity: Activity,
    pub location_x: f64,
    pub location_y: f64,
    pub location_wkid: i32,
    pub unit: Unit,
    /// Time of the observation. `None` means "now" at send time.
    pub time: Option<DateTime<Utc>>,
    pub equipment: Equipment,
    message_id: String,
}

impl SpotReport {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        size: Size,
        activity: Activity,
        location_x: f64,
        location_y: f64,
        location_wkid: i32,
        unit: Unit,
        time: Option<DateTime<Utc>>,
        equipment: Equipment,
    ) -> Self {
        Self {
            size,
            activity,
            location_x,
            location_y,
            location_wkid,
            unit,
            time,
            equipment,
            message_id: Uuid::new_v4().to_string(),
        }
    }

    /// Returns the message id that will identify this report on the wire.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Resets the message id to a fresh random UUID, making the next send a
    /// new report rather than an update.
    pub fn regenerate_message_id(&mut self) {
        self.message_id = Uuid::new_v4().to_string();
    }

    /// Converts the report to its wire record.
    ///
    /// The record uses the external dialect type name (`spotrep`) and
    /// carries the location twice: raw coordinates in `_control_points` and
    /// an MGRS string in `location`, obtained from the map collaborator.
    /// If `sender_designation` is `None` the `uniquedesignation` field is
    /// omitted.
    pub fn to_geomessage(
        &self,
        map: &dyn MapGeometry,
        sender_designation: Option<&str>,
    ) -> Geomessage {
        let observed = self.time.unwrap_or_else(Utc::now);
        let mut message = Geomessage::with_id(&self.message_id);
        message.set_field(TYPE_FIELD, external_type_name("spot_report"));
        message.set_field(WKID_FIELD, &self.location_wkid.to_string());
        message.set_field(
            CONTROL_POINTS_FIELD,
            &format!(
                "{},{}",
                format_coordinate(self.location_x),
                format_coordinate(self.location_y)
            ),
        );
        message.set_field(ACTION_FIELD, "update");
        if let Some(designation) = sender_designation {
            message.set_field(UNIQUE_DESIGNATION_FIELD, designation);
        }

        // SALUTE attributes, human-readable plus category codes
        message.set_field("size", self.size.name());
        message.set_field("activity", self.activity.name());
        match map.point_to_mgrs(self.location_x, self.location_y, self.location_wkid) {
            Some(mgrs) => message.set_field("location", &mgrs),
            None => log::debug!(
                "no MGRS conversion for spot report at {},{} (wkid {})",
                self.location_x,
                self.location_y,
                self.location_wkid
            ),
        }
        message.set_field("unit", self.unit.name());
        message.set_field("equipment", self.equipment.name());

        message.set_field("size_cat", &self.size.code().to_string());
        message.set_field("activity_cat", self.activity.code());
        message.set_field("unit_cat", self.unit.code());
        message.set_field("equip_cat", self.equipment.code());
        message.set_field("timeobserved", &format_geomessage_datetime(&observed));
        message.set_field(
            "datetimesubmitted",
            &format_geomessage_datetime(&Utc::now()),
        );
        message
    }
}

impl MessageController {
    /// Broadcasts a spot report.
    ///
    /// Unless `is_update` is true, the report's message id is regenerated so
    /// the send creates a new report instead of updating a previous one.
    /// Returns the wire record that was sent.
    pub async fn send_spot_report(
        &self,
        report: &mut SpotReport,
        map: &dyn MapGeometry,
        is_update: bool,
    ) -> Result<Geomessage, SendError> {
        if !is_update {
            report.regenerate_message_id();
        }
        let message = report.to_geomessage(map, self.sender_identity().as_deref());
        self.send_geomessage(&message).await?;
        Ok(message)
    }
}
