//! Connectivity Graph
//!
//! A bipartite component/net graph built on petgraph. One graph can hold
//! several boards; nets that carry the same correlation key on different
//! boards are tied together through a shared hub node.

use std::collections::{BTreeSet, HashMap};

use petgraph::algo::connected_components;
use petgraph::graph::{NodeIndex, UnGraph};
use serde::Serialize;

use crate::board::Board;
use crate::model::ElectricalType;

/// Node type in the connectivity graph. Boards are addressed by their
/// position in the graph, components and nets by their index on the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GraphNode {
    Component { board: usize, component: usize },
    Net { board: usize, net: usize },
    /// Shared name linking nets across boards.
    Hub { key: String },
}

impl GraphNode {
    pub fn is_component(&self) -> bool {
        matches!(self, GraphNode::Component { .. })
    }

    pub fn is_net(&self) -> bool {
        matches!(self, GraphNode::Net { .. })
    }

    pub fn is_hub(&self) -> bool {
        matches!(self, GraphNode::Hub { .. })
    }

    pub fn board(&self) -> Option<usize> {
        match self {
            GraphNode::Component { board, .. } | GraphNode::Net { board, .. } => Some(*board),
            GraphNode::Hub { .. } => None,
        }
    }
}

/// A pin connecting a component to a net.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PinEdge {
    pub pin_number: String,
    pub pin_name: Option<String>,
    pub electrical_type: ElectricalType,
}

impl PinEdge {
    pub fn new(pin_number: impl Into<String>) -> Self {
        Self {
            pin_number: pin_number.into(),
            pin_name: None,
            electrical_type: ElectricalType::Unspecified,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.pin_name = (!name.is_empty()).then_some(name);
        self
    }

    pub fn with_type(mut self, electrical_type: ElectricalType) -> Self {
        self.electrical_type = electrical_type;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GraphEdge {
    Pin(PinEdge),
    /// Net to hub.
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub components: usize,
    pub nets: usize,
    pub hubs: usize,
    pub edges: usize,
    pub islands: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectivityGraph {
    graph: UnGraph<GraphNode, GraphEdge>,
    component_indices: HashMap<(usize, usize), NodeIndex>,
    net_indices: HashMap<(usize, usize), NodeIndex>,
    hub_indices: HashMap<String, NodeIndex>,
}

impl ConnectivityGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Graph of a single board.
    pub fn from_board(board: &Board) -> Self {
        let mut graph = Self::new();
        graph.add_board(0, board, &BTreeSet::new());
        graph
    }

    /// Add a board's components, nets and pin edges under `board_id`.
    /// Components listed in `skip` are left out entirely.
    pub fn add_board(&mut self, board_id: usize, board: &Board, skip: &BTreeSet<String>) {
        // Components first, then nets: node indices follow board order.
        for (comp_idx, component) in board.components.iter().enumerate() {
            if skip.contains(&component.reference) {
                continue;
            }
            let node = self.graph.add_node(GraphNode::Component {
                board: board_id,
                component: comp_idx,
            });
            self.component_indices.insert((board_id, comp_idx), node);
        }
        for net_idx in 0..board.nets.len() {
            let node = self.graph.add_node(GraphNode::Net {
                board: board_id,
                net: net_idx,
            });
            self.net_indices.insert((board_id, net_idx), node);
        }

        for (comp_idx, component) in board.components.iter().enumerate() {
            let Some(&comp_node) = self.component_indices.get(&(board_id, comp_idx)) else {
                continue;
            };
            for (pin_idx, pin) in component.pins.iter().enumerate() {
                let Some(net_idx) = board.pin_net_index(comp_idx, pin_idx) else {
                    continue;
                };
                let net_node = self.net_indices[&(board_id, net_idx)];
                let edge = PinEdge::new(&pin.number)
                    .with_name(&pin.name)
                    .with_type(pin.electrical_type);
                self.graph.add_edge(comp_node, net_node, GraphEdge::Pin(edge));
            }
        }
    }

    /// Tie a net to the hub for `key`, creating the hub on first use.
    pub fn link(&mut self, key: &str, board_id: usize, net: usize) -> Option<NodeIndex> {
        let net_node = *self.net_indices.get(&(board_id, net))?;
        let hub = match self.hub_indices.get(key) {
            Some(&hub) => hub,
            None => {
                let hub = self.graph.add_node(GraphNode::Hub { key: key.to_string() });
                self.hub_indices.insert(key.to_string(), hub);
                hub
            }
        };
        self.graph.add_edge(net_node, hub, GraphEdge::Shared);
        Some(hub)
    }

    pub fn component_node(&self, board_id: usize, component: usize) -> Option<NodeIndex> {
        self.component_indices.get(&(board_id, component)).copied()
    }

    pub fn net_node(&self, board_id: usize, net: usize) -> Option<NodeIndex> {
        self.net_indices.get(&(board_id, net)).copied()
    }

    pub fn hub_node(&self, key: &str) -> Option<NodeIndex> {
        self.hub_indices.get(key).copied()
    }

    pub fn node(&self, index: NodeIndex) -> &GraphNode {
        &self.graph[index]
    }

    /// Distinct neighbours in insertion order (board order, then component
    /// or net order within a board).
    pub fn neighbors(&self, index: NodeIndex) -> Vec<NodeIndex> {
        let mut out: Vec<NodeIndex> = self.graph.neighbors(index).collect();
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Pins through which a component touches a net.
    pub fn pins_between(&self, component: NodeIndex, net: NodeIndex) -> Vec<&PinEdge> {
        let mut pins: Vec<&PinEdge> = self
            .graph
            .edges_connecting(component, net)
            .filter_map(|e| match e.weight() {
                GraphEdge::Pin(pin) => Some(pin),
                GraphEdge::Shared => None,
            })
            .collect();
        pins.sort_by(|a, b| crate::model::natural_cmp(&a.pin_number, &b.pin_number));
        pins
    }

    /// Number of disconnected islands in the graph.
    pub fn island_count(&self) -> usize {
        connected_components(&self.graph)
    }

    pub fn stats(&self) -> GraphStats {
        GraphStats {
            components: self.component_indices.len(),
            nets: self.net_indices.len(),
            hubs: self.hub_indices.len(),
            edges: self.graph.edge_count(),
            islands: self.island_count(),
        }
    }
}
