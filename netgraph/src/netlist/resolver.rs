//! Net Resolution Engine
//!
//! Partitions every component pin into nets with a union-find over
//! connection events:
//!
//! 1. each pin, each distinct (sheet, point) and each wire segment is a node
//! 2. wire segments join their endpoints
//! 3. a connection point on a segment's interior joins that segment
//!    (T-connections, junctions on crossings); bare crossings do not connect
//! 4. labels, power ports and sheet pins join by name within their scope
//! 5. surviving sets with at least one pin become nets, named by precedence
//!
//! All coordinates are exact grid integers, so the partition and the names
//! are identical on every run.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use super::power::is_power_name;
use super::union_find::UnionFind;
use crate::board::{Diagnostic, DiagnosticKind, Net, NetScope, PinRef};
use crate::geometry::Point;
use crate::model::{ElectricalType, LabelScope, Schematic, SheetIndex};

/// Output of [`resolve`].
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// Nets in lexical name order.
    pub nets: Vec<Net>,
    pub diagnostics: Vec<Diagnostic>,
    /// Pins carrying a no-connect marker, in board order.
    pub no_connects: Vec<PinRef>,
}

type SiteKey = (SheetIndex, Point);

/// Name attached to a set by a label or power port.
#[derive(Debug, Clone)]
struct Candidate {
    rank: u8,
    order: usize,
    text: String,
    rendered: String,
    scope: NetScope,
}

/// Pins and names gathered for one surviving set.
#[derive(Debug, Default)]
struct PinSet {
    pins: Vec<(usize, usize)>,
    candidates: Vec<Candidate>,
    has_power_port: bool,
}

/// Segment lookup by sheet: axis-aligned buckets plus a list of diagonals.
#[derive(Default)]
struct SegmentIndex {
    horizontal: HashMap<(SheetIndex, i64), Vec<(i64, i64, usize)>>,
    vertical: HashMap<(SheetIndex, i64), Vec<(i64, i64, usize)>>,
    diagonal: HashMap<SheetIndex, Vec<(Point, Point, usize)>>,
}

impl SegmentIndex {
    fn insert(&mut self, sheet: SheetIndex, a: Point, b: Point, node: usize) {
        if a.y == b.y {
            self.horizontal
                .entry((sheet, a.y))
                .or_default()
                .push((a.x.min(b.x), a.x.max(b.x), node));
        } else if a.x == b.x {
            self.vertical
                .entry((sheet, a.x))
                .or_default()
                .push((a.y.min(b.y), a.y.max(b.y), node));
        } else {
            self.diagonal.entry(sheet).or_default().push((a, b, node));
        }
    }

    /// Wire nodes whose segment contains `p`.
    fn containing(&self, sheet: SheetIndex, p: Point, out: &mut Vec<usize>) {
        out.clear();
        if let Some(list) = self.horizontal.get(&(sheet, p.y)) {
            out.extend(list.iter().filter(|(lo, hi, _)| *lo <= p.x && p.x <= *hi).map(|e| e.2));
        }
        if let Some(list) = self.vertical.get(&(sheet, p.x)) {
            out.extend(list.iter().filter(|(lo, hi, _)| *lo <= p.y && p.y <= *hi).map(|e| e.2));
        }
        if let Some(list) = self.diagonal.get(&sheet) {
            out.extend(list.iter().filter(|(a, b, _)| p.on_segment(*a, *b)).map(|e| e.2));
        }
    }
}

struct Graph {
    uf: UnionFind,
    sites: HashMap<SiteKey, usize>,
}

impl Graph {
    fn site(&mut self, sheet: SheetIndex, position: Point) -> usize {
        if let Some(&node) = self.sites.get(&(sheet, position)) {
            return node;
        }
        let node = self.uf.push();
        self.sites.insert((sheet, position), node);
        node
    }
}

/// Resolve the pin partition of a built schematic.
pub fn resolve(schematic: &Schematic) -> Resolution {
    let mut graph = Graph {
        uf: UnionFind::new(0),
        sites: HashMap::new(),
    };

    let pin_nodes: Vec<Vec<usize>> = schematic
        .components
        .iter()
        .map(|component| {
            component
                .pins
                .iter()
                .map(|pin| {
                    let node = graph.uf.push();
                    for site in pin.sites() {
                        let point = graph.site(site.sheet, site.position);
                        graph.uf.union(node, point);
                    }
                    node
                })
                .collect()
        })
        .collect();

    let mut segments = SegmentIndex::default();
    for wire in &schematic.wires {
        let node = graph.uf.push();
        let start = graph.site(wire.sheet, wire.start);
        let end = graph.site(wire.sheet, wire.end);
        graph.uf.union(node, start);
        graph.uf.union(node, end);
        segments.insert(wire.sheet, wire.start, wire.end, node);
    }

    for junction in &schematic.junctions {
        graph.site(junction.sheet, junction.position);
    }
    let label_nodes: Vec<usize> = schematic
        .labels
        .iter()
        .map(|l| graph.site(l.sheet, l.position))
        .collect();
    let port_nodes: Vec<usize> = schematic
        .power_ports
        .iter()
        .map(|p| graph.site(p.sheet, p.position))
        .collect();
    let sheet_pin_nodes: Vec<usize> = schematic
        .sheet_pins
        .iter()
        .map(|p| graph.site(p.sheet, p.position))
        .collect();
    let no_connects: HashSet<SiteKey> = schematic
        .no_connects
        .iter()
        .map(|nc| (nc.sheet, nc.position))
        .collect();

    // Points on wire interiors.
    let mut hits = Vec::new();
    let sites: Vec<(SiteKey, usize)> = graph.sites.iter().map(|(k, v)| (*k, *v)).collect();
    for ((sheet, point), node) in sites {
        segments.containing(sheet, point, &mut hits);
        for &wire in &hits {
            graph.uf.union(node, wire);
        }
    }

    join_by_name(schematic, &mut graph.uf, &label_nodes, &port_nodes, &sheet_pin_nodes);

    let mut uf = graph.uf;
    let (mut sets, set_of_root) = collect_sets(schematic, &mut uf, &pin_nodes);

    for (idx, label) in schematic.labels.iter().enumerate() {
        let root = uf.find(label_nodes[idx]);
        if let Some(&set) = set_of_root.get(&root) {
            let (rank, scope) = match label.scope {
                LabelScope::Global => (0, NetScope::Global),
                LabelScope::Hierarchical => (1, NetScope::Hierarchical),
                LabelScope::Local => (2, NetScope::Local),
            };
            let sheet = &schematic.sheets[label.sheet];
            let rendered = match label.scope {
                LabelScope::Global => label.text.clone(),
                LabelScope::Hierarchical => format!("{}{}", sheet.path, label.text),
                LabelScope::Local => format!("{}{}", sheet.path.trim_start_matches('/'), label.text),
            };
            sets[set].candidates.push(Candidate {
                rank,
                order: idx,
                text: label.text.clone(),
                rendered,
                scope,
            });
        }
    }
    for (idx, port) in schematic.power_ports.iter().enumerate() {
        let root = uf.find(port_nodes[idx]);
        if let Some(&set) = set_of_root.get(&root) {
            sets[set].has_power_port = true;
            sets[set].candidates.push(Candidate {
                rank: 3,
                order: idx,
                text: port.name.clone(),
                rendered: port.name.clone(),
                scope: NetScope::Power,
            });
        }
    }

    let mut resolution = name_sets(schematic, sets, &no_connects);
    resolution.no_connects = schematic
        .components
        .iter()
        .flat_map(|c| {
            c.pins
                .iter()
                .filter(|p| p.sites().any(|s| no_connects.contains(&(s.sheet, s.position))))
                .map(move |p| PinRef::new(&c.reference, &p.number))
        })
        .collect();
    debug!(
        nets = resolution.nets.len(),
        diagnostics = resolution.diagnostics.len(),
        "resolved nets"
    );
    resolution
}

fn join(existing: Option<usize>, node: usize, uf: &mut UnionFind) {
    if let Some(existing) = existing {
        uf.union(existing, node);
    }
}

fn join_by_name(
    schematic: &Schematic,
    uf: &mut UnionFind,
    label_nodes: &[usize],
    port_nodes: &[usize],
    sheet_pin_nodes: &[usize],
) {
    let mut global: HashMap<&str, usize> = HashMap::new();
    let mut local: HashMap<(SheetIndex, &str), usize> = HashMap::new();
    let mut hierarchical: HashMap<(SheetIndex, &str), usize> = HashMap::new();

    for (label, &node) in schematic.labels.iter().zip(label_nodes) {
        let text = label.text.as_str();
        match label.scope {
            LabelScope::Global => join(global.get(text).copied(), node, uf),
            LabelScope::Local => join(local.get(&(label.sheet, text)).copied(), node, uf),
            LabelScope::Hierarchical => {
                join(hierarchical.get(&(label.sheet, text)).copied(), node, uf)
            }
        }
        match label.scope {
            LabelScope::Global => global.entry(text).or_insert(node),
            LabelScope::Local => local.entry((label.sheet, text)).or_insert(node),
            LabelScope::Hierarchical => hierarchical.entry((label.sheet, text)).or_insert(node),
        };
    }

    for (port, &node) in schematic.power_ports.iter().zip(port_nodes) {
        let text = port.name.as_str();
        if port.local {
            join(local.get(&(port.sheet, text)).copied(), node, uf);
            local.entry((port.sheet, text)).or_insert(node);
        } else {
            join(global.get(text).copied(), node, uf);
            global.entry(text).or_insert(node);
        }
    }

    for (pin, &node) in schematic.sheet_pins.iter().zip(sheet_pin_nodes) {
        join(hierarchical.get(&(pin.child, pin.name.as_str())).copied(), node, uf);
    }
}

/// Group pins by set root. Sets are numbered in order of their first pin.
fn collect_sets(
    schematic: &Schematic,
    uf: &mut UnionFind,
    pin_nodes: &[Vec<usize>],
) -> (Vec<PinSet>, HashMap<usize, usize>) {
    let mut sets: Vec<PinSet> = Vec::new();
    let mut set_of_root: HashMap<usize, usize> = HashMap::new();
    for (comp_idx, component) in schematic.components.iter().enumerate() {
        for pin_idx in 0..component.pins.len() {
            let root = uf.find(pin_nodes[comp_idx][pin_idx]);
            let set = *set_of_root.entry(root).or_insert_with(|| {
                sets.push(PinSet::default());
                sets.len() - 1
            });
            sets[set].pins.push((comp_idx, pin_idx));
        }
    }
    (sets, set_of_root)
}

fn name_sets(schematic: &Schematic, mut sets: Vec<PinSet>, no_connects: &HashSet<SiteKey>) -> Resolution {
    let mut diagnostics = Vec::new();
    let mut names: Vec<Option<(String, NetScope)>> = Vec::with_capacity(sets.len());
    let mut aliases: Vec<Vec<String>> = Vec::with_capacity(sets.len());
    let mut warnings: Vec<Vec<String>> = vec![Vec::new(); sets.len()];

    for (set_idx, set) in sets.iter_mut().enumerate() {
        set.candidates.sort_by_key(|c| (c.rank, c.order));
        let Some(winner) = set.candidates.first().cloned() else {
            names.push(None);
            aliases.push(Vec::new());
            continue;
        };

        let mut set_aliases: Vec<String> = Vec::new();
        let mut conflicting: Vec<String> = Vec::new();
        for other in &set.candidates[1..] {
            if other.rendered != winner.rendered && !set_aliases.contains(&other.rendered) {
                set_aliases.push(other.rendered.clone());
            }
            if other.text != winner.text && !conflicting.contains(&other.text) {
                conflicting.push(other.text.clone());
            }
        }
        if !conflicting.is_empty() {
            let message = format!(
                "net '{}' also carries the name(s) {}",
                winner.rendered,
                conflicting
                    .iter()
                    .map(|n| format!("'{n}'"))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            debug!(net = %winner.rendered, "{}", message);
            warnings[set_idx].push(message.clone());
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::NetNamingConflict,
                message,
                net: Some(winner.rendered.clone()),
                pin: None,
            });
        }
        names.push(Some((winner.rendered, winner.scope)));
        aliases.push(set_aliases);
    }

    // Unique names: the stronger claim keeps the plain name.
    let mut claim_order: Vec<usize> = (0..sets.len()).filter(|&i| names[i].is_some()).collect();
    claim_order.sort_by_key(|&i| (sets[i].candidates[0].rank, i));
    let mut used: HashSet<String> = HashSet::new();
    let mut final_names: Vec<Option<(String, NetScope)>> = vec![None; sets.len()];
    for set_idx in claim_order {
        let Some((name, scope)) = names[set_idx].clone() else { continue };
        let unique = if used.contains(&name) {
            let mut k = 2;
            while used.contains(&format!("{name}_{k}")) {
                k += 1;
            }
            let renamed = format!("{name}_{k}");
            let message = format!("net name '{name}' is used by another net; renamed to '{renamed}'");
            warnings[set_idx].push(message.clone());
            diagnostics.push(Diagnostic {
                kind: DiagnosticKind::NetNamingConflict,
                message,
                net: Some(renamed.clone()),
                pin: None,
            });
            renamed
        } else {
            name
        };
        used.insert(unique.clone());
        final_names[set_idx] = Some((unique, scope));
    }
    let mut counter = 1;
    for slot in final_names.iter_mut().filter(|n| n.is_none()) {
        while used.contains(&format!("NET_{counter}")) {
            counter += 1;
        }
        let name = format!("NET_{counter}");
        counter += 1;
        used.insert(name.clone());
        *slot = Some((name, NetScope::Synthesized));
    }

    let mut nets = Vec::with_capacity(sets.len());
    for (set_idx, set) in sets.iter().enumerate() {
        let Some((name, scope)) = final_names[set_idx].take() else { continue };

        if let &[(comp_idx, pin_idx)] = set.pins.as_slice() {
            let component = &schematic.components[comp_idx];
            let pin = &component.pins[pin_idx];
            let marked = pin.sites().any(|s| no_connects.contains(&(s.sheet, s.position)));
            if !marked && pin.electrical_type != ElectricalType::NoConnect {
                let pin_ref = PinRef::new(&component.reference, &pin.number);
                diagnostics.push(Diagnostic {
                    kind: DiagnosticKind::FloatingPin,
                    message: format!("pin {pin_ref} is not connected to anything"),
                    net: Some(name.clone()),
                    pin: Some(pin_ref),
                });
            }
        }

        let pins: Vec<PinRef> = set
            .pins
            .iter()
            .map(|&(c, p)| {
                let component = &schematic.components[c];
                PinRef::new(&component.reference, &component.pins[p].number)
            })
            .collect();
        let is_power = set.has_power_port
            || is_power_name(&name)
            || set
                .pins
                .iter()
                .any(|&(c, p)| schematic.components[c].pins[p].electrical_type.is_power());

        nets.push(Net {
            name,
            scope,
            pins,
            aliases: std::mem::take(&mut aliases[set_idx]),
            warnings: std::mem::take(&mut warnings[set_idx]),
            is_power,
        });
    }
    nets.sort_by(|a, b| a.name.cmp(&b.name));

    Resolution {
        nets,
        diagnostics,
        no_connects: Vec::new(),
    }
}
