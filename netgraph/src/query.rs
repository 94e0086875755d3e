//! Query Engine
//!
//! Read-only questions over a resolved [`Board`]. A missing reference comes
//! back as [`NotFound`] and an unreachable target as
//! [`TraceOutcome::NoPathFound`]; neither is a failure of the board.
//!
//! Path search and neighbourhoods run over the implicit component adjacency
//! (two components are adjacent iff they share a net). Neighbours are
//! expanded net by net in lexical name order, then component by component in
//! natural reference order, so results never depend on hashing.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::board::{Board, Net, NetScope, PinRef};
use crate::graph::ConnectivityGraph;
use crate::model::{Category, Component, ElectricalType};
use crate::netlist::rail_voltage;

const LARGEST_NETS: usize = 10;

/// A referenced entity does not exist.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotFound {
    #[error("component '{name}' not found")]
    Component { name: String },
    #[error("net '{name}' not found")]
    Net { name: String },
    #[error("pin '{pin}' not found on component '{component}'")]
    Pin { component: String, pin: String },
    #[error("board '{name}' not found")]
    Board { name: String },
    #[error("system '{name}' not found")]
    System { name: String },
    #[error("signal '{name}' not found on any board")]
    Signal { name: String },
}

impl NotFound {
    pub fn component(name: impl Into<String>) -> Self {
        NotFound::Component { name: name.into() }
    }

    pub fn net(name: impl Into<String>) -> Self {
        NotFound::Net { name: name.into() }
    }

    pub fn board(name: impl Into<String>) -> Self {
        NotFound::Board { name: name.into() }
    }

    pub fn system(name: impl Into<String>) -> Self {
        NotFound::System { name: name.into() }
    }

    pub fn signal(name: impl Into<String>) -> Self {
        NotFound::Signal { name: name.into() }
    }
}

/// Result of a path search. An unreachable target is an ordinary outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TraceOutcome<T> {
    Found(T),
    NoPathFound { start: String, end: String },
}

impl<T> TraceOutcome<T> {
    pub fn path(&self) -> Option<&T> {
        match self {
            TraceOutcome::Found(path) => Some(path),
            TraceOutcome::NoPathFound { .. } => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, TraceOutcome::Found(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetSize {
    pub name: String,
    pub pins: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardOverview {
    pub name: String,
    pub path: Option<PathBuf>,
    pub sheet_count: usize,
    pub component_count: usize,
    pub net_count: usize,
    /// Total pins across all components.
    pub pin_connections: usize,
    /// Component count per category, categories with no members omitted.
    pub categories: BTreeMap<String, usize>,
    pub power_nets: Vec<String>,
    pub largest_nets: Vec<NetSize>,
    /// Components none of whose pins share a net with anything.
    pub floating_components: Vec<String>,
    /// Disconnected islands of the component/net graph.
    pub connected_groups: usize,
    pub diagnostic_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinDetail {
    pub number: String,
    pub name: String,
    pub electrical_type: ElectricalType,
    pub net: Option<String>,
    pub no_connect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentDetail {
    pub reference: String,
    pub value: String,
    pub footprint: Option<String>,
    pub lib_id: String,
    pub category: Category,
    /// Sheet path of the first placed unit.
    pub sheet: String,
    pub units: Vec<u32>,
    pub properties: BTreeMap<String, String>,
    pub pins: Vec<PinDetail>,
    /// Nets touched, in lexical order.
    pub nets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetPin {
    pub number: String,
    pub name: String,
    pub electrical_type: ElectricalType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetMember {
    pub reference: String,
    pub value: String,
    pub category: Category,
    pub pins: Vec<NetPin>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetDetail {
    pub name: String,
    pub scope: NetScope,
    pub is_power: bool,
    /// Rail voltage implied by the name, if any.
    pub voltage: Option<f64>,
    pub aliases: Vec<String>,
    pub warnings: Vec<String>,
    pub pin_count: usize,
    pub components: Vec<NetMember>,
    pub categories: Vec<Category>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinConnection {
    pub component: String,
    pub pin: String,
    pub pin_name: String,
    pub electrical_type: ElectricalType,
    pub net: String,
    pub no_connect: bool,
    /// Every other pin on the same net.
    pub connected: Vec<PinRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hop {
    pub from: String,
    pub to: String,
    pub net: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionPath {
    /// Components from start to end, inclusive.
    pub components: Vec<String>,
    pub hops: Vec<Hop>,
}

impl ConnectionPath {
    pub fn hop_count(&self) -> usize {
        self.hops.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Neighborhood {
    pub start: String,
    pub max_hops: usize,
    /// `levels[d]` holds the components exactly `d` hops away; `levels[0]`
    /// is the start. Trailing empty levels are omitted.
    pub levels: Vec<Vec<String>>,
}

impl Neighborhood {
    pub fn component_count(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.levels.iter().flatten().any(|r| r == reference)
    }
}

impl Board {
    pub fn overview(&self) -> BoardOverview {
        let mut categories = BTreeMap::new();
        for component in &self.components {
            *categories.entry(component.category.to_string()).or_insert(0) += 1;
        }

        let mut largest: Vec<NetSize> = self
            .nets
            .iter()
            .map(|n| NetSize {
                name: n.name.clone(),
                pins: n.pins.len(),
            })
            .collect();
        largest.sort_by(|a, b| b.pins.cmp(&a.pins).then_with(|| a.name.cmp(&b.name)));
        largest.truncate(LARGEST_NETS);

        let floating_components = self
            .components
            .iter()
            .enumerate()
            .filter(|(idx, component)| {
                (0..component.pins.len())
                    .all(|pin| self.pin_net(*idx, pin).map_or(true, |net| net.pins.len() == 1))
            })
            .map(|(_, c)| c.reference.clone())
            .collect();

        BoardOverview {
            name: self.name.clone(),
            path: self.path.clone(),
            sheet_count: self.sheets.len(),
            component_count: self.components.len(),
            net_count: self.nets.len(),
            pin_connections: self.pin_count(),
            categories,
            power_nets: self
                .nets
                .iter()
                .filter(|n| n.is_power)
                .map(|n| n.name.clone())
                .collect(),
            largest_nets: largest,
            floating_components,
            connected_groups: ConnectivityGraph::from_board(self).island_count(),
            diagnostic_count: self.diagnostics.len(),
        }
    }

    /// Components in natural reference order, optionally of one category.
    pub fn list_components(&self, category: Option<Category>) -> Vec<&Component> {
        self.components
            .iter()
            .filter(|c| category.map_or(true, |cat| c.category == cat))
            .collect()
    }

    /// Nets in lexical order, optionally only power nets.
    pub fn list_nets(&self, power_only: bool) -> Vec<&Net> {
        self.nets
            .iter()
            .filter(|n| !power_only || n.is_power)
            .collect()
    }

    pub fn examine_component(&self, reference: &str) -> Result<ComponentDetail, NotFound> {
        let idx = self
            .component_index(reference)
            .ok_or_else(|| NotFound::component(reference))?;
        let component = &self.components[idx];

        let pins = component
            .pins
            .iter()
            .enumerate()
            .map(|(pin_idx, pin)| PinDetail {
                number: pin.number.clone(),
                name: pin.name.clone(),
                electrical_type: pin.electrical_type,
                net: self.pin_net(idx, pin_idx).map(|n| n.name.clone()),
                no_connect: self.is_no_connect(reference, &pin.number),
            })
            .collect();

        Ok(ComponentDetail {
            reference: component.reference.clone(),
            value: component.value.clone(),
            footprint: component.footprint.clone(),
            lib_id: component.lib_id.clone(),
            category: component.category,
            sheet: self
                .sheets
                .get(component.sheet)
                .map(|s| s.path.clone())
                .unwrap_or_else(|| "/".to_string()),
            units: component.units.clone(),
            properties: component.properties.clone(),
            pins,
            nets: self
                .component_nets(idx)
                .map(|n| self.nets[n].name.clone())
                .collect(),
        })
    }

    pub fn examine_net(&self, name: &str) -> Result<NetDetail, NotFound> {
        let net = self.net(name).ok_or_else(|| NotFound::net(name))?;

        // Member pins are stored component by component.
        let mut members: Vec<NetMember> = Vec::new();
        for pin_ref in &net.pins {
            let Some(component) = self.component(&pin_ref.component) else {
                continue;
            };
            let pin = component.pin(&pin_ref.pin);
            let entry = NetPin {
                number: pin_ref.pin.clone(),
                name: pin.map(|p| p.name.clone()).unwrap_or_default(),
                electrical_type: pin.map(|p| p.electrical_type).unwrap_or_default(),
            };
            match members.last_mut() {
                Some(last) if last.reference == component.reference => last.pins.push(entry),
                _ => members.push(NetMember {
                    reference: component.reference.clone(),
                    value: component.value.clone(),
                    category: component.category,
                    pins: vec![entry],
                }),
            }
        }

        let categories: BTreeSet<Category> = members.iter().map(|m| m.category).collect();
        Ok(NetDetail {
            name: net.name.clone(),
            scope: net.scope,
            is_power: net.is_power,
            voltage: rail_voltage(&net.name),
            aliases: net.aliases.clone(),
            warnings: net.warnings.clone(),
            pin_count: net.pins.len(),
            components: members,
            categories: categories.into_iter().collect(),
        })
    }

    pub fn check_pin_connection(&self, reference: &str, pin: &str) -> Result<PinConnection, NotFound> {
        let comp_idx = self
            .component_index(reference)
            .ok_or_else(|| NotFound::component(reference))?;
        let component = &self.components[comp_idx];
        let not_found = || NotFound::Pin {
            component: reference.to_string(),
            pin: pin.to_string(),
        };
        let pin_idx = component
            .pins
            .iter()
            .position(|p| p.number == pin)
            .ok_or_else(not_found)?;
        let net = self.pin_net(comp_idx, pin_idx).ok_or_else(not_found)?;
        let this = PinRef::new(reference, pin);
        let found = &component.pins[pin_idx];

        Ok(PinConnection {
            component: reference.to_string(),
            pin: pin.to_string(),
            pin_name: found.name.clone(),
            electrical_type: found.electrical_type,
            net: net.name.clone(),
            no_connect: self.is_no_connect(reference, pin),
            connected: net.pins.iter().filter(|p| **p != this).cloned().collect(),
        })
    }

    /// Shortest hop path from `start` to `end` over shared nets.
    pub fn trace_connection(
        &self,
        start: &str,
        end: &str,
    ) -> Result<TraceOutcome<ConnectionPath>, NotFound> {
        let from = self
            .component_index(start)
            .ok_or_else(|| NotFound::component(start))?;
        let to = self
            .component_index(end)
            .ok_or_else(|| NotFound::component(end))?;

        // parent[c] = (previous component, net used to reach c)
        let mut parent: Vec<Option<(usize, usize)>> = vec![None; self.components.len()];
        let mut seen = vec![false; self.components.len()];
        seen[from] = true;
        let mut queue = VecDeque::from([from]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                break;
            }
            for net in self.component_nets(current) {
                for next in self.net_components(net) {
                    if !seen[next] {
                        seen[next] = true;
                        parent[next] = Some((current, net));
                        queue.push_back(next);
                    }
                }
            }
        }

        if !seen[to] {
            return Ok(TraceOutcome::NoPathFound {
                start: start.to_string(),
                end: end.to_string(),
            });
        }

        let mut hops = Vec::new();
        let mut current = to;
        while let Some((prev, net)) = parent[current] {
            hops.push(Hop {
                from: self.components[prev].reference.clone(),
                to: self.components[current].reference.clone(),
                net: self.nets[net].name.clone(),
            });
            current = prev;
        }
        hops.reverse();
        let mut components = vec![start.to_string()];
        components.extend(hops.iter().map(|h| h.to.clone()));

        Ok(TraceOutcome::Found(ConnectionPath { components, hops }))
    }

    /// Components within `max_hops` of `reference`, grouped by distance.
    pub fn find_connected_components(
        &self,
        reference: &str,
        max_hops: usize,
    ) -> Result<Neighborhood, NotFound> {
        let start = self
            .component_index(reference)
            .ok_or_else(|| NotFound::component(reference))?;

        let mut seen = vec![false; self.components.len()];
        seen[start] = true;
        let mut frontier = vec![start];
        let mut levels = vec![vec![self.components[start].reference.clone()]];

        for _ in 0..max_hops {
            let mut next: BTreeSet<usize> = BTreeSet::new();
            for &current in &frontier {
                for net in self.component_nets(current) {
                    next.extend(self.net_components(net).filter(|c| !seen[*c]));
                }
            }
            if next.is_empty() {
                break;
            }
            for &c in &next {
                seen[c] = true;
            }
            levels.push(next.iter().map(|&c| self.components[c].reference.clone()).collect());
            frontier = next.into_iter().collect();
        }

        Ok(Neighborhood {
            start: reference.to_string(),
            max_hops,
            levels,
        })
    }
}
