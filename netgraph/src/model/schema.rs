//! Domain entities of one schematic (including its expanded sheets).
//!
//! Every geometric primitive records the index of the sheet instance it was
//! placed on; coordinates only coincide within one sheet instance.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::category::Category;
use crate::geometry::Point;

/// Index into [`Schematic::sheets`].
pub type SheetIndex = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElectricalType {
    Input,
    Output,
    Bidirectional,
    TriState,
    Passive,
    Free,
    PowerIn,
    PowerOut,
    OpenCollector,
    OpenEmitter,
    NoConnect,
    Unspecified,
}

impl Default for ElectricalType {
    fn default() -> Self {
        ElectricalType::Unspecified
    }
}

impl ElectricalType {
    /// Map a KiCad pin type keyword. Unknown keywords are `Unspecified`.
    pub fn from_keyword(keyword: &str) -> Self {
        match keyword {
            "input" => ElectricalType::Input,
            "output" => ElectricalType::Output,
            "bidirectional" => ElectricalType::Bidirectional,
            "tri_state" => ElectricalType::TriState,
            "passive" => ElectricalType::Passive,
            "free" => ElectricalType::Free,
            "power_in" => ElectricalType::PowerIn,
            "power_out" => ElectricalType::PowerOut,
            "open_collector" => ElectricalType::OpenCollector,
            "open_emitter" => ElectricalType::OpenEmitter,
            "no_connect" => ElectricalType::NoConnect,
            _ => ElectricalType::Unspecified,
        }
    }

    pub fn is_power(&self) -> bool {
        matches!(self, ElectricalType::PowerIn | ElectricalType::PowerOut)
    }
}

impl std::fmt::Display for ElectricalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ElectricalType::Input => write!(f, "Input"),
            ElectricalType::Output => write!(f, "Output"),
            ElectricalType::Bidirectional => write!(f, "Bidirectional"),
            ElectricalType::TriState => write!(f, "Tri-State"),
            ElectricalType::Passive => write!(f, "Passive"),
            ElectricalType::Free => write!(f, "Free"),
            ElectricalType::PowerIn => write!(f, "Power Input"),
            ElectricalType::PowerOut => write!(f, "Power Output"),
            ElectricalType::OpenCollector => write!(f, "Open Collector"),
            ElectricalType::OpenEmitter => write!(f, "Open Emitter"),
            ElectricalType::NoConnect => write!(f, "No Connect"),
            ElectricalType::Unspecified => write!(f, "Unspecified"),
        }
    }
}

/// A pin of a placed component, at its absolute sheet position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pin {
    pub number: String,
    /// Pin name from the library; empty when the library leaves it as `~`.
    pub name: String,
    pub electrical_type: ElectricalType,
    pub position: Point,
    pub sheet: SheetIndex,
    pub unit: u32,
    pub hidden: bool,
    /// Further placements of the same pin number, e.g. shared pins drawn on
    /// every unit of a multi-unit part. All sites are one electrical pin.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_sites: Vec<PinSite>,
}

impl Pin {
    /// Every (sheet, position) this pin occupies, primary site first.
    pub fn sites(&self) -> impl Iterator<Item = PinSite> + '_ {
        std::iter::once(PinSite {
            sheet: self.sheet,
            position: self.position,
        })
        .chain(self.extra_sites.iter().copied())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinSite {
    pub sheet: SheetIndex,
    pub position: Point,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub reference: String,
    pub value: String,
    pub footprint: Option<String>,
    pub lib_id: String,
    pub category: Category,
    /// Sheet of the first placed unit.
    pub sheet: SheetIndex,
    /// Placed units, ascending.
    pub units: Vec<u32>,
    pub properties: BTreeMap<String, String>,
    pub pins: Vec<Pin>,
}

impl Component {
    pub fn pin(&self, number: &str) -> Option<&Pin> {
        self.pins.iter().find(|p| p.number == number)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wire {
    pub start: Point,
    pub end: Point,
    pub sheet: SheetIndex,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bus {
    pub points: Vec<Point>,
    pub sheet: SheetIndex,
}

/// Diagonal stub between a bus and a wire. Modelled, never a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusEntry {
    pub start: Point,
    pub end: Point,
    pub sheet: SheetIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Junction {
    pub position: Point,
    pub sheet: SheetIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoConnect {
    pub position: Point,
    pub sheet: SheetIndex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelScope {
    Local,
    Global,
    Hierarchical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub text: String,
    pub scope: LabelScope,
    pub position: Point,
    pub sheet: SheetIndex,
}

/// Connection point of a power symbol (or of a hidden power input pin),
/// carrying an implicit net name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerPort {
    pub name: String,
    /// `(power local)` symbols only join within their sheet instance.
    pub local: bool,
    pub position: Point,
    pub sheet: SheetIndex,
}

/// Pin on a sheet symbol, placed on the parent sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetPin {
    pub name: String,
    pub position: Point,
    /// Sheet the pin is drawn on.
    pub sheet: SheetIndex,
    /// Sheet instance the pin leads into.
    pub child: SheetIndex,
}

/// One instance of a sheet in the expanded hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetInstance {
    /// Sheet name; empty for the root.
    pub name: String,
    /// Human readable path: `/` for the root, `/Power/` for a child.
    pub path: String,
    /// KiCad instance path of sheet uuids, e.g. `/<root>/<sheet>`.
    pub uuid_path: String,
    pub file: Option<PathBuf>,
    pub parent: Option<SheetIndex>,
}

impl SheetInstance {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A fully built schematic, sheets expanded in depth-first order with the
/// root first. Primitive vectors follow that order, file order within a
/// sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schematic {
    pub root_uuid: Option<Uuid>,
    pub sheets: Vec<SheetInstance>,
    pub components: Vec<Component>,
    pub wires: Vec<Wire>,
    pub buses: Vec<Bus>,
    pub bus_entries: Vec<BusEntry>,
    pub junctions: Vec<Junction>,
    pub no_connects: Vec<NoConnect>,
    pub labels: Vec<Label>,
    pub power_ports: Vec<PowerPort>,
    pub sheet_pins: Vec<SheetPin>,
}

impl Schematic {
    pub fn component(&self, reference: &str) -> Option<&Component> {
        self.components.iter().find(|c| c.reference == reference)
    }

    pub fn pin_count(&self) -> usize {
        self.components.iter().map(|c| c.pins.len()).sum()
    }
}
