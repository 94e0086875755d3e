//! Resolved boards.
//!
//! A [`Board`] is immutable once built: components, nets, diagnostics and an
//! adjacency index (pin -> net, component -> nets, net -> components). The
//! index is rebuilt on deserialization, so only the records are persisted.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{Component, Pin, SheetInstance};

/// A pin addressed by owning component reference and pin number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinRef {
    pub component: String,
    pub pin: String,
}

impl PinRef {
    pub fn new(component: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.pin)
    }
}

/// Where a net's name came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetScope {
    Global,
    Hierarchical,
    Local,
    Power,
    Synthesized,
}

impl NetScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetScope::Global => "global",
            NetScope::Hierarchical => "hierarchical",
            NetScope::Local => "local",
            NetScope::Power => "power",
            NetScope::Synthesized => "synthesized",
        }
    }
}

impl fmt::Display for NetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Net {
    pub name: String,
    pub scope: NetScope,
    /// Member pins in component order, then pin order.
    pub pins: Vec<PinRef>,
    /// Other names attached to the same net.
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub is_power: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Differently named labels ended up on one net, or two nets got the
    /// same name.
    NetNamingConflict,
    /// A pin is alone on its net and carries no no-connect marker.
    FloatingPin,
}

/// Non-fatal finding recorded while resolving a board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pin: Option<PinRef>,
}

/// Identity of a source file at the time it was read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    pub modified: Option<DateTime<Utc>>,
    pub len: u64,
}

impl FileSignature {
    pub fn of(metadata: &std::fs::Metadata) -> Self {
        Self {
            modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            len: metadata.len(),
        }
    }

    /// Signature of the file at `path` as it is now.
    pub fn read(path: &std::path::Path) -> std::io::Result<Self> {
        std::fs::metadata(path).map(|m| Self::of(&m))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub path: PathBuf,
    pub signature: FileSignature,
}

/// Persisted shape of a [`Board`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardRecord {
    name: String,
    path: Option<PathBuf>,
    #[serde(default)]
    sources: Vec<SourceFile>,
    root_uuid: Option<Uuid>,
    built_at: DateTime<Utc>,
    sheets: Vec<SheetInstance>,
    components: Vec<Component>,
    nets: Vec<Net>,
    #[serde(default)]
    diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    no_connects: Vec<PinRef>,
}

/// A resolved board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "BoardRecord")]
pub struct Board {
    pub name: String,
    pub path: Option<PathBuf>,
    /// Every file read to build the board: the root first, then sheets.
    pub sources: Vec<SourceFile>,
    pub root_uuid: Option<Uuid>,
    pub built_at: DateTime<Utc>,
    pub sheets: Vec<SheetInstance>,
    /// Components in natural reference order.
    pub components: Vec<Component>,
    /// Nets in lexical name order.
    pub nets: Vec<Net>,
    pub diagnostics: Vec<Diagnostic>,
    /// Pins explicitly marked as not connected.
    pub no_connects: Vec<PinRef>,
    #[serde(skip)]
    index: BoardIndex,
}

#[derive(Debug, Clone, Default)]
struct BoardIndex {
    component_by_ref: HashMap<String, usize>,
    net_by_name: HashMap<String, usize>,
    /// `pin_nets[component][pin]` is the net index of that pin.
    pin_nets: Vec<Vec<Option<usize>>>,
    /// Net indices touched by each component, ascending (= lexical).
    component_nets: Vec<BTreeSet<usize>>,
    /// Component indices on each net, ascending (= natural reference order).
    net_components: Vec<BTreeSet<usize>>,
}

impl From<BoardRecord> for Board {
    fn from(record: BoardRecord) -> Self {
        let mut board = Board {
            name: record.name,
            path: record.path,
            sources: record.sources,
            root_uuid: record.root_uuid,
            built_at: record.built_at,
            sheets: record.sheets,
            components: record.components,
            nets: record.nets,
            diagnostics: record.diagnostics,
            no_connects: record.no_connects,
            index: BoardIndex::default(),
        };
        board.reindex();
        board
    }
}

/// Parts a board is assembled from.
#[derive(Debug, Clone)]
pub struct BoardParts {
    pub name: String,
    pub path: Option<PathBuf>,
    pub sources: Vec<SourceFile>,
    pub root_uuid: Option<Uuid>,
    pub sheets: Vec<SheetInstance>,
    pub components: Vec<Component>,
    pub nets: Vec<Net>,
    pub diagnostics: Vec<Diagnostic>,
    pub no_connects: Vec<PinRef>,
}

impl Board {
    pub fn new(parts: BoardParts) -> Self {
        BoardRecord {
            name: parts.name,
            path: parts.path,
            sources: parts.sources,
            root_uuid: parts.root_uuid,
            built_at: Utc::now(),
            sheets: parts.sheets,
            components: parts.components,
            nets: parts.nets,
            diagnostics: parts.diagnostics,
            no_connects: parts.no_connects,
        }
        .into()
    }

    fn reindex(&mut self) {
        let component_by_ref: HashMap<String, usize> = self
            .components
            .iter()
            .enumerate()
            .map(|(i, c)| (c.reference.clone(), i))
            .collect();
        let net_by_name: HashMap<String, usize> = self
            .nets
            .iter()
            .enumerate()
            .map(|(i, n)| (n.name.clone(), i))
            .collect();

        let mut pin_nets: Vec<Vec<Option<usize>>> =
            self.components.iter().map(|c| vec![None; c.pins.len()]).collect();
        let mut component_nets = vec![BTreeSet::new(); self.components.len()];
        let mut net_components = vec![BTreeSet::new(); self.nets.len()];

        for (net_idx, net) in self.nets.iter().enumerate() {
            for pin_ref in &net.pins {
                let Some(&comp_idx) = component_by_ref.get(&pin_ref.component) else {
                    continue;
                };
                let component = &self.components[comp_idx];
                if let Some(pin_idx) = component.pins.iter().position(|p| p.number == pin_ref.pin) {
                    pin_nets[comp_idx][pin_idx] = Some(net_idx);
                }
                component_nets[comp_idx].insert(net_idx);
                net_components[net_idx].insert(comp_idx);
            }
        }

        self.index = BoardIndex {
            component_by_ref,
            net_by_name,
            pin_nets,
            component_nets,
            net_components,
        };
    }

    pub fn component(&self, reference: &str) -> Option<&Component> {
        self.component_index(reference).map(|i| &self.components[i])
    }

    pub fn component_index(&self, reference: &str) -> Option<usize> {
        self.index.component_by_ref.get(reference).copied()
    }

    pub fn net(&self, name: &str) -> Option<&Net> {
        self.net_index(name).map(|i| &self.nets[i])
    }

    pub fn net_index(&self, name: &str) -> Option<usize> {
        self.index.net_by_name.get(name).copied()
    }

    /// Net of a pin, by component and pin position within the component.
    pub fn pin_net(&self, component: usize, pin: usize) -> Option<&Net> {
        self.pin_net_index(component, pin).map(|n| &self.nets[n])
    }

    pub fn pin_net_index(&self, component: usize, pin: usize) -> Option<usize> {
        self.index
            .pin_nets
            .get(component)
            .and_then(|pins| pins.get(pin))
            .copied()
            .flatten()
    }

    /// Net of a pin addressed by reference and pin number.
    pub fn net_of(&self, reference: &str, pin_number: &str) -> Option<&Net> {
        let comp_idx = self.component_index(reference)?;
        let pin_idx = self.components[comp_idx]
            .pins
            .iter()
            .position(|p| p.number == pin_number)?;
        self.pin_net(comp_idx, pin_idx)
    }

    /// Nets touched by a component, in lexical order.
    pub fn component_nets(&self, component: usize) -> impl Iterator<Item = usize> + '_ {
        self.index
            .component_nets
            .get(component)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Components on a net, in natural reference order.
    pub fn net_components(&self, net: usize) -> impl Iterator<Item = usize> + '_ {
        self.index
            .net_components
            .get(net)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Every pin with its owning component, in board order.
    pub fn pins(&self) -> impl Iterator<Item = (&Component, &Pin)> {
        self.components
            .iter()
            .flat_map(|c| c.pins.iter().map(move |p| (c, p)))
    }

    pub fn is_no_connect(&self, reference: &str, pin_number: &str) -> bool {
        self.no_connects
            .iter()
            .any(|p| p.component == reference && p.pin == pin_number)
    }

    pub fn pin_count(&self) -> usize {
        self.components.iter().map(|c| c.pins.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::model::{Category, ElectricalType};

    fn component(reference: &str, pins: &[&str]) -> Component {
        Component {
            reference: reference.to_string(),
            value: String::new(),
            footprint: None,
            lib_id: "Test:Part".to_string(),
            category: Category::classify(reference, ""),
            sheet: 0,
            units: vec![1],
            properties: Default::default(),
            pins: pins
                .iter()
                .map(|n| Pin {
                    number: n.to_string(),
                    name: String::new(),
                    electrical_type: ElectricalType::Passive,
                    position: Point::default(),
                    sheet: 0,
                    unit: 1,
                    hidden: false,
                    extra_sites: Vec::new(),
                })
                .collect(),
        }
    }

    fn net(name: &str, pins: &[(&str, &str)]) -> Net {
        Net {
            name: name.to_string(),
            scope: NetScope::Local,
            pins: pins.iter().map(|(c, p)| PinRef::new(*c, *p)).collect(),
            aliases: vec![],
            warnings: vec![],
            is_power: false,
        }
    }

    fn sample() -> Board {
        Board::new(BoardParts {
            name: "demo".to_string(),
            path: None,
            sources: vec![],
            root_uuid: None,
            sheets: vec![],
            components: vec![component("R1", &["1", "2"]), component("U1", &["1", "2"])],
            nets: vec![
                net("A", &[("R1", "1"), ("U1", "2")]),
                net("B", &[("R1", "2")]),
                net("C", &[("U1", "1")]),
            ],
            diagnostics: vec![],
            no_connects: vec![],
        })
    }

    #[test]
    fn test_index_lookups() {
        let board = sample();
        assert_eq!(board.net_of("U1", "2").unwrap().name, "A");
        assert_eq!(board.net_of("R1", "2").unwrap().name, "B");
        assert!(board.net_of("R1", "9").is_none());
        assert!(board.net_of("Q1", "1").is_none());
        let r1 = board.component_index("R1").unwrap();
        assert_eq!(board.component_nets(r1).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(board.net_components(0).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(board.pin_count(), 4);
    }

    #[test]
    fn test_index_survives_serde() {
        let board = sample();
        let json = serde_json::to_string(&board).unwrap();
        let back: Board = serde_json::from_str(&json).unwrap();
        assert_eq!(back.net_of("U1", "1").unwrap().name, "C");
        assert_eq!(back.built_at, board.built_at);
    }

    #[test]
    fn test_pin_ref_display() {
        assert_eq!(PinRef::new("U1", "3").to_string(), "U1.3");
    }
}
