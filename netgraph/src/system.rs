//! Systems and the Multi-Board Correlator
//!
//! A [`System`] is an ordered set of independently resolved boards. Nothing
//! is merged or cached at the system level: the [`Correlator`] stitches the
//! boards together on demand, tying nets that share a correlation key on
//! different boards through hub nodes of a [`ConnectivityGraph`].

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

use petgraph::graph::NodeIndex;
use serde::Serialize;
use tracing::debug;

use crate::board::{Board, Net, NetScope};
use crate::graph::{ConnectivityGraph, GraphNode};
use crate::netlist::{is_power_name, leaf_name};
use crate::query::{NotFound, TraceOutcome};

/// A board taking part in a system.
#[derive(Debug, Clone)]
pub struct SystemBoard {
    pub name: String,
    pub board: Arc<Board>,
    /// Component references no trace may route through.
    pub ignore: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct System {
    pub name: String,
    pub description: Option<String>,
    pub boards: Vec<SystemBoard>,
}

impl System {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            boards: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_board<I>(&mut self, name: impl Into<String>, board: Arc<Board>, ignore: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.boards.push(SystemBoard {
            name: name.into(),
            board,
            ignore: ignore.into_iter().collect(),
        });
    }

    pub fn board(&self, name: &str) -> Option<&SystemBoard> {
        self.boards.iter().find(|b| b.name == name)
    }

    pub fn overview(&self) -> SystemOverview {
        Correlator::new(self).overview()
    }

    pub fn trace_cross_board_signal(
        &self,
        signal: &str,
        start: &str,
        end: &str,
    ) -> Result<TraceOutcome<CrossBoardPath>, NotFound> {
        Correlator::new(self).trace(signal, start, end)
    }
}

/// Key under which a net is matched across boards, or `None` for nets that
/// stay board-local: synthesized names and local labels that are not power
/// rails. Any sheet path is dropped, so `/MISO` and `/IO/MISO` share `MISO`.
pub fn correlation_key(net: &Net) -> Option<&str> {
    let scoped = matches!(
        net.scope,
        NetScope::Global | NetScope::Hierarchical | NetScope::Power
    );
    (scoped || is_power_name(&net.name)).then(|| leaf_name(&net.name))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BoardSummary {
    pub name: String,
    pub path: Option<PathBuf>,
    pub components: usize,
    pub nets: usize,
    pub pin_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SharedNet {
    pub key: String,
    /// Boards carrying the net, in system order.
    pub boards: Vec<String>,
    pub is_power: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemOverview {
    pub name: String,
    pub description: Option<String>,
    pub boards: Vec<BoardSummary>,
    pub shared_power_nets: Vec<SharedNet>,
    pub shared_signal_nets: Vec<SharedNet>,
    pub total_components: usize,
    pub unique_correlated_nets: usize,
    pub total_pin_connections: usize,
}

/// One component-to-component step of a cross-board path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossHop {
    /// `board:reference`
    pub from: String,
    pub to: String,
    /// Nets traversed as `board:net`; two entries when the hop crosses
    /// boards.
    pub via: Vec<String>,
}

impl CrossHop {
    pub fn crosses_boards(&self) -> bool {
        self.via.len() > 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossBoardPath {
    pub signal: String,
    /// `board:reference` from start to end.
    pub components: Vec<String>,
    pub hops: Vec<CrossHop>,
}

impl CrossBoardPath {
    pub fn board_crossings(&self) -> usize {
        self.hops.iter().filter(|h| h.crosses_boards()).count()
    }
}

/// Search state: where we are, whether the signal has been used yet, the
/// component a net was entered from, and for hub nodes the board we entered
/// from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct State {
    node: NodeIndex,
    used: bool,
    left: Option<NodeIndex>,
    from_board: Option<usize>,
}

/// Composite view over a system's boards.
pub struct Correlator<'s> {
    system: &'s System,
    graph: ConnectivityGraph,
    /// Correlation key -> (board, net) pairs, for keys seen on two or more
    /// boards.
    shared: BTreeMap<String, Vec<(usize, usize)>>,
}

impl<'s> Correlator<'s> {
    pub fn new(system: &'s System) -> Self {
        let mut graph = ConnectivityGraph::new();
        let mut keyed: BTreeMap<String, Vec<(usize, usize)>> = BTreeMap::new();

        for (board_id, member) in system.boards.iter().enumerate() {
            graph.add_board(board_id, &member.board, &member.ignore);
            for (net_idx, net) in member.board.nets.iter().enumerate() {
                if let Some(key) = correlation_key(net) {
                    keyed.entry(key.to_string()).or_default().push((board_id, net_idx));
                }
            }
        }

        keyed.retain(|_, nets| {
            let boards: BTreeSet<usize> = nets.iter().map(|(b, _)| *b).collect();
            boards.len() > 1
        });
        for (key, nets) in &keyed {
            for &(board_id, net_idx) in nets {
                graph.link(key, board_id, net_idx);
            }
        }
        debug!(system = %system.name, shared = keyed.len(), "correlated boards");

        Self {
            system,
            graph,
            shared: keyed,
        }
    }

    /// Shared keys with the boards carrying them.
    pub fn shared_nets(&self) -> Vec<SharedNet> {
        self.shared
            .iter()
            .map(|(key, nets)| {
                let mut boards: Vec<usize> = nets.iter().map(|(b, _)| *b).collect();
                boards.dedup();
                let is_power = is_power_name(key)
                    || nets
                        .iter()
                        .any(|&(b, n)| self.system.boards[b].board.nets[n].is_power);
                SharedNet {
                    key: key.clone(),
                    boards: boards
                        .into_iter()
                        .map(|b| self.system.boards[b].name.clone())
                        .collect(),
                    is_power,
                }
            })
            .collect()
    }

    pub fn overview(&self) -> SystemOverview {
        let boards: Vec<BoardSummary> = self
            .system
            .boards
            .iter()
            .map(|member| BoardSummary {
                name: member.name.clone(),
                path: member.board.path.clone(),
                components: member.board.components.len(),
                nets: member.board.nets.len(),
                pin_connections: member.board.pin_count(),
            })
            .collect();
        let (shared_power_nets, shared_signal_nets): (Vec<_>, Vec<_>) =
            self.shared_nets().into_iter().partition(|n| n.is_power);

        SystemOverview {
            name: self.system.name.clone(),
            description: self.system.description.clone(),
            total_components: boards.iter().map(|b| b.components).sum(),
            total_pin_connections: boards.iter().map(|b| b.pin_connections).sum(),
            unique_correlated_nets: self.shared.len(),
            boards,
            shared_power_nets,
            shared_signal_nets,
        }
    }

    /// Resolve `board:reference`, or a bare reference present on exactly
    /// one board.
    fn locate(&self, endpoint: &str) -> Result<NodeIndex, NotFound> {
        let candidates: Vec<(usize, &str)> = match endpoint.split_once(':') {
            Some((board, reference)) => {
                let board_id = self
                    .system
                    .boards
                    .iter()
                    .position(|b| b.name == board)
                    .ok_or_else(|| NotFound::board(board))?;
                vec![(board_id, reference)]
            }
            None => (0..self.system.boards.len()).map(|b| (b, endpoint)).collect(),
        };

        let found: Vec<NodeIndex> = candidates
            .into_iter()
            .filter_map(|(board_id, reference)| {
                let idx = self.system.boards[board_id].board.component_index(reference)?;
                self.graph.component_node(board_id, idx)
            })
            .collect();
        match found.as_slice() {
            [node] => Ok(*node),
            _ => Err(NotFound::component(endpoint)),
        }
    }

    fn net_name(&self, board_id: usize, net: usize) -> &str {
        &self.system.boards[board_id].board.nets[net].name
    }

    fn label(&self, node: NodeIndex) -> String {
        match self.graph.node(node) {
            GraphNode::Component { board, component } => {
                let member = &self.system.boards[*board];
                format!("{}:{}", member.name, member.board.components[*component].reference)
            }
            GraphNode::Net { board, net } => {
                format!("{}:{}", self.system.boards[*board].name, self.net_name(*board, *net))
            }
            GraphNode::Hub { key } => key.clone(),
        }
    }

    /// Whether a component sits on a net carrying `key`.
    fn touches(&self, component: NodeIndex, key: &str) -> bool {
        self.graph.neighbors(component).into_iter().any(|next| {
            matches!(self.graph.node(next),
                GraphNode::Net { board, net } if leaf_name(self.net_name(*board, *net)) == key)
        })
    }

    fn successors(&self, state: State, key: &str, out: &mut Vec<State>) {
        out.clear();
        let neighbors = self.graph.neighbors(state.node);
        match self.graph.node(state.node) {
            GraphNode::Component { .. } => {
                for next in neighbors {
                    let used = state.used
                        || matches!(self.graph.node(next),
                            GraphNode::Net { board, net } if leaf_name(self.net_name(*board, *net)) == key);
                    out.push(State {
                        node: next,
                        used,
                        left: Some(state.node),
                        from_board: None,
                    });
                }
            }
            GraphNode::Net { board, .. } => {
                for next in neighbors {
                    match self.graph.node(next) {
                        // No component-adjacency self-loops.
                        GraphNode::Component { .. } if state.left == Some(next) => {}
                        GraphNode::Component { .. } => out.push(State {
                            node: next,
                            used: state.used,
                            left: None,
                            from_board: None,
                        }),
                        GraphNode::Hub { key: hub } if hub == key => out.push(State {
                            node: next,
                            used: state.used,
                            left: None,
                            from_board: Some(*board),
                        }),
                        _ => {}
                    }
                }
            }
            GraphNode::Hub { .. } => {
                for next in neighbors {
                    if self.graph.node(next).board() != state.from_board {
                        out.push(State {
                            node: next,
                            used: true,
                            left: None,
                            from_board: None,
                        });
                    }
                }
            }
        }
    }

    /// Shortest path from `start` to `end` that uses `signal` at least once
    /// and crosses boards only through nets carrying that signal.
    pub fn trace(
        &self,
        signal: &str,
        start: &str,
        end: &str,
    ) -> Result<TraceOutcome<CrossBoardPath>, NotFound> {
        let from = self.locate(start)?;
        let to = self.locate(end)?;
        let key = leaf_name(signal);
        let present = self
            .system
            .boards
            .iter()
            .any(|b| b.board.nets.iter().any(|n| leaf_name(&n.name) == key));
        if !present {
            return Err(NotFound::signal(signal));
        }

        if from == to {
            return Ok(if self.touches(from, key) {
                TraceOutcome::Found(CrossBoardPath {
                    signal: signal.to_string(),
                    components: vec![self.label(from)],
                    hops: Vec::new(),
                })
            } else {
                TraceOutcome::NoPathFound {
                    start: start.to_string(),
                    end: end.to_string(),
                }
            });
        }

        let origin = State {
            node: from,
            used: false,
            left: None,
            from_board: None,
        };
        let mut parent: HashMap<State, State> = HashMap::new();
        let mut queue = VecDeque::from([origin]);
        let mut buffer = Vec::new();
        let mut goal = None;
        parent.insert(origin, origin);

        while let Some(state) = queue.pop_front() {
            if state.node == to && state.used {
                goal = Some(state);
                break;
            }
            self.successors(state, key, &mut buffer);
            for &next in &buffer {
                if !parent.contains_key(&next) {
                    parent.insert(next, state);
                    queue.push_back(next);
                }
            }
        }

        let Some(goal) = goal else {
            return Ok(TraceOutcome::NoPathFound {
                start: start.to_string(),
                end: end.to_string(),
            });
        };

        let mut states = vec![goal];
        let mut current = goal;
        while current != origin {
            current = parent[&current];
            states.push(current);
        }
        states.reverse();

        let mut components: Vec<String> = Vec::new();
        let mut hops = Vec::new();
        let mut via = Vec::new();
        for state in states {
            match self.graph.node(state.node) {
                GraphNode::Component { .. } => {
                    let label = self.label(state.node);
                    if let Some(prev) = components.last() {
                        hops.push(CrossHop {
                            from: prev.clone(),
                            to: label.clone(),
                            via: std::mem::take(&mut via),
                        });
                    }
                    components.push(label);
                }
                GraphNode::Net { .. } => via.push(self.label(state.node)),
                GraphNode::Hub { .. } => {}
            }
        }

        Ok(TraceOutcome::Found(CrossBoardPath {
            signal: signal.to_string(),
            components,
            hops,
        }))
    }
}
