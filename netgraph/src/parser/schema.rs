//! Raw records decoded from a `.kicad_sch` file.
//!
//! These carry no connectivity semantics. Coordinates are already on the
//! integer grid (see [`crate::geometry`]) but pins are still library-local.

use crate::geometry::{Mirror, Point};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSchematic {
    pub version: Option<u64>,
    pub generator: Option<String>,
    pub uuid: Option<String>,
    pub lib_symbols: Vec<RawLibSymbol>,
    pub symbols: Vec<RawSymbol>,
    pub wires: Vec<RawWire>,
    pub buses: Vec<RawBus>,
    pub bus_entries: Vec<RawBusEntry>,
    pub junctions: Vec<RawJunction>,
    pub no_connects: Vec<RawNoConnect>,
    pub labels: Vec<RawLabel>,
    pub sheets: Vec<RawSheet>,
    /// KiCad 6 root-level `(symbol_instances ...)` table.
    pub symbol_instances: Vec<RawInstance>,
}

impl RawSchematic {
    pub fn lib_symbol(&self, name: &str) -> Option<&RawLibSymbol> {
        self.lib_symbols.iter().find(|s| s.name == name)
    }
}

/// Whether a library symbol is a power symbol and how far its name reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerKind {
    Global,
    Local,
}

/// Symbol definition embedded in the schematic's `lib_symbols` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLibSymbol {
    pub name: String,
    pub extends: Option<String>,
    pub power: Option<PowerKind>,
    pub properties: Vec<(String, String)>,
    pub pins: Vec<RawLibPin>,
    pub line: usize,
}

impl RawLibSymbol {
    pub fn property(&self, key: &str) -> Option<&str> {
        find_property(&self.properties, key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLibPin {
    pub number: String,
    pub name: String,
    /// Electrical type keyword as written (`input`, `power_in`, ...).
    pub electrical_type: String,
    /// Connection point, library coordinates (Y up).
    pub position: Point,
    /// Unit the pin belongs to; 0 means shared by all units.
    pub unit: u32,
    /// Body style (De Morgan); 0 means shared by all styles.
    pub body_style: u32,
    pub hidden: bool,
}

/// A placed symbol instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSymbol {
    pub lib_id: String,
    pub lib_name: Option<String>,
    pub position: Point,
    /// Rotation in grid units of degrees (`90°` is `900000`).
    pub angle: i64,
    pub mirror: Option<Mirror>,
    pub unit: u32,
    pub body_style: u32,
    pub uuid: Option<String>,
    pub properties: Vec<(String, String)>,
    pub instances: Vec<RawInstance>,
    pub line: usize,
}

impl RawSymbol {
    pub fn property(&self, key: &str) -> Option<&str> {
        find_property(&self.properties, key)
    }

    /// Name used to look the definition up in `lib_symbols`.
    pub fn library_key(&self) -> &str {
        self.lib_name.as_deref().unwrap_or(&self.lib_id)
    }
}

/// Reference assignment for one sheet path, from `(instances ...)` or
/// `(symbol_instances ...)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawInstance {
    pub path: String,
    pub reference: String,
    pub unit: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawWire {
    pub points: Vec<Point>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBus {
    pub points: Vec<Point>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawBusEntry {
    pub position: Point,
    pub size: Point,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawJunction {
    pub position: Point,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawNoConnect {
    pub position: Point,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawLabelKind {
    Local,
    Global,
    Hierarchical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLabel {
    pub kind: RawLabelKind,
    pub text: String,
    pub position: Point,
    pub line: usize,
}

/// A hierarchical sheet reference placed on the parent sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSheet {
    pub name: String,
    pub file: String,
    pub position: Point,
    pub size: Point,
    pub uuid: Option<String>,
    pub pins: Vec<RawSheetPin>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawSheetPin {
    pub name: String,
    pub position: Point,
}

fn find_property<'a>(properties: &'a [(String, String)], key: &str) -> Option<&'a str> {
    properties
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}
