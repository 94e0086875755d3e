//! netgraph - KiCad schematic connectivity engine
//!
//! Turns `.kicad_sch` files into a resolved netlist and answers
//! connectivity questions about single boards and multi-board systems.
//!
//! # Quick Start
//!
//! ```no_run
//! use netgraph::build_board;
//! use std::path::Path;
//!
//! let board = build_board(Path::new("design.kicad_sch")).unwrap();
//! let overview = board.overview();
//! println!("{} components, {} nets", overview.component_count, overview.net_count);
//!
//! if let Ok(outcome) = board.trace_connection("U1", "J1") {
//!     if let Some(path) = outcome.path() {
//!         println!("{}", path.components.join(" -> "));
//!     }
//! }
//! ```
//!
//! # Features
//!
//! - **Parsing**: s-expression reader with positioned errors
//! - **Model building**: library pins placed in world coordinates, sheet hierarchy expanded
//! - **Net resolution**: union-find over wires, labels, power symbols and sheet pins
//! - **Queries**: component/net details, pin checks, path tracing, neighborhoods
//! - **Systems**: boards correlated through shared global and power nets
//! - **Caching**: in-memory and on-disk boards invalidated by source signatures

pub mod board;
pub mod cache;
pub mod config;
pub mod core;
pub mod geometry;
pub mod graph;
pub mod model;
pub mod netlist;
pub mod parser;
pub mod query;
pub mod system;

// Re-export main types
pub use board::{Board, Diagnostic, DiagnosticKind, Net, NetScope, PinRef};
pub use cache::{BoardCache, CacheConfig, CacheStats};
pub use config::{ProjectConfig, Registry};
pub use core::{build_board, build_board_from_str, NetgraphCore, NetgraphError};
pub use graph::ConnectivityGraph;
pub use model::{Category, Component, ModelError};
pub use parser::{KicadParser, ParseError};
pub use query::{NotFound, TraceOutcome};
pub use system::System;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::{
        build_board, Board, Category, NetgraphCore, NetgraphError, NotFound, System, TraceOutcome,
    };
}
