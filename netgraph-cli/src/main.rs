//! netgraph CLI - connectivity queries over KiCad schematics from the command line.

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use netgraph::query::{BoardOverview, ComponentDetail, ConnectionPath, NetDetail, Neighborhood, PinConnection};
use netgraph::system::{CrossBoardPath, SystemOverview};
use netgraph::{Category, NetgraphCore, NetgraphError, NotFound, Registry, TraceOutcome};
use serde::Serialize;
use std::path::PathBuf;
use std::process;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "netgraph")]
#[command(about = "KiCad schematic connectivity queries", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: discovered .netgraph.yaml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Debug logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Board summary: counts, categories, power nets, largest nets
    Overview {
        /// Configured board name or schematic path
        src: String,
    },

    /// List components
    Components {
        src: String,
        /// Only this category (e.g. resistors, ics)
        #[arg(long)]
        category: Option<Category>,
    },

    /// List nets
    Nets {
        src: String,
        #[arg(long)]
        power_only: bool,
    },

    /// Pins, nets and properties of one component
    Component { src: String, reference: String },

    /// Members of one net
    Net { src: String, name: String },

    /// Net of one pin and everything else on it
    Pin {
        src: String,
        reference: String,
        pin: String,
    },

    /// Shortest path between two components
    Trace { src: String, from: String, to: String },

    /// Components within a number of hops
    Neighbors {
        src: String,
        reference: String,
        #[arg(long, default_value_t = 2)]
        max_hops: usize,
    },

    /// List configured boards
    Boards,

    /// List configured systems
    Systems,

    /// Shared nets and totals of a system
    SystemOverview { system: String },

    /// Follow a signal from one board to another
    TraceSignal {
        system: String,
        signal: String,
        /// Start as BOARD:REF
        #[arg(long)]
        from: String,
        /// End as BOARD:REF
        #[arg(long)]
        to: String,
    },

    /// Register a board
    AddBoard {
        name: String,
        path: PathBuf,
        #[arg(long)]
        description: Option<String>,
    },

    /// Unregister a board
    RemoveBoard { name: String },

    /// Register a system of configured boards
    AddSystem {
        name: String,
        #[arg(required = true)]
        boards: Vec<String>,
        #[arg(long)]
        description: Option<String>,
    },

    /// Unregister a system
    RemoveSystem { name: String },
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output for scripts
    Json,
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            exit_code_for(&e)
        }
    };
    process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "netgraph=debug" } else { "netgraph=warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Lookups that miss exit 1; build and I/O failures exit 2.
fn exit_code_for(error: &anyhow::Error) -> i32 {
    if error.downcast_ref::<NotFound>().is_some() {
        return 1;
    }
    match error.downcast_ref::<NetgraphError>() {
        Some(NetgraphError::NotFound(_)) => 1,
        _ => 2,
    }
}

fn open_core(config: Option<&PathBuf>) -> Result<NetgraphCore> {
    let registry = match config {
        Some(path) => Registry::open(path)?,
        None => Registry::discover()?,
    };
    Ok(NetgraphCore::new(registry))
}

fn run(cli: &Cli) -> Result<i32> {
    let core = open_core(cli.config.as_ref())?;
    debug!(config = ?core.registry().path(), "configuration opened");
    let format = cli.format;

    match &cli.command {
        Commands::Overview { src } => {
            let overview = core.load_board(src)?.overview();
            emit(format, &overview, print_overview);
        }
        Commands::Components { src, category } => {
            let board = core.load_board(src)?;
            let components = board.list_components(*category);
            emit(format, &components, |list| {
                for c in list {
                    println!("{:<8} {:<20} {}", c.reference, c.value, c.category);
                }
                println!("\n{} components", list.len());
            });
        }
        Commands::Nets { src, power_only } => {
            let board = core.load_board(src)?;
            let nets = board.list_nets(*power_only);
            emit(format, &nets, |list| {
                for n in list {
                    println!("{:<24} {:<13} {} pins", n.name, n.scope, n.pins.len());
                }
                println!("\n{} nets", list.len());
            });
        }
        Commands::Component { src, reference } => {
            let detail = core.load_board(src)?.examine_component(reference)?;
            emit(format, &detail, print_component);
        }
        Commands::Net { src, name } => {
            let detail = core.load_board(src)?.examine_net(name)?;
            emit(format, &detail, print_net);
        }
        Commands::Pin { src, reference, pin } => {
            let connection = core.load_board(src)?.check_pin_connection(reference, pin)?;
            emit(format, &connection, print_pin);
        }
        Commands::Trace { src, from, to } => {
            let outcome = core.load_board(src)?.trace_connection(from, to)?;
            emit(format, &outcome, |o| print_outcome(o, print_path));
        }
        Commands::Neighbors {
            src,
            reference,
            max_hops,
        } => {
            let hood = core.load_board(src)?.find_connected_components(reference, *max_hops)?;
            emit(format, &hood, print_neighborhood);
        }
        Commands::Boards => {
            let boards = core.boards();
            emit(format, &boards, |list| {
                if list.is_empty() {
                    println!("No boards configured");
                }
                for (name, board) in list {
                    println!("{:<16} {}", name, board.path.display());
                    if let Some(ref description) = board.description {
                        println!("{:<16} {}", "", description);
                    }
                }
            });
        }
        Commands::Systems => {
            let systems = core.systems();
            emit(format, &systems, |list| {
                if list.is_empty() {
                    println!("No systems configured");
                }
                for (name, system) in list {
                    println!("{:<16} {}", name, system.boards.join(", "));
                }
            });
        }
        Commands::SystemOverview { system } => {
            let overview = core.load_system(system)?.overview();
            emit(format, &overview, print_system_overview);
        }
        Commands::TraceSignal {
            system,
            signal,
            from,
            to,
        } => {
            let outcome = core
                .load_system(system)?
                .trace_cross_board_signal(signal, from, to)?;
            emit(format, &outcome, |o| print_outcome(o, print_cross_path));
        }
        Commands::AddBoard {
            name,
            path,
            description,
        } => {
            core.add_board(name, path.clone(), description.clone())?;
            println!("Added board '{}'", name);
        }
        Commands::RemoveBoard { name } => {
            core.remove_board(name)?;
            println!("Removed board '{}'", name);
        }
        Commands::AddSystem {
            name,
            boards,
            description,
        } => {
            core.add_system(name, boards.clone(), description.clone())?;
            println!("Added system '{}'", name);
        }
        Commands::RemoveSystem { name } => {
            core.remove_system(name)?;
            println!("Removed system '{}'", name);
        }
    }
    Ok(0)
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, human: impl FnOnce(&T)) {
    match format {
        OutputFormat::Human => human(value),
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(json) => println!("{}", json),
            Err(e) => eprintln!("Error: {}", e),
        },
    }
}

fn print_overview(o: &BoardOverview) {
    println!("\nBoard: {}", o.name);
    println!("{}", "─".repeat(60));
    if let Some(ref path) = o.path {
        println!("  Path:       {}", path.display());
    }
    println!("  Sheets:     {}", o.sheet_count);
    println!("  Components: {}", o.component_count);
    println!("  Nets:       {}", o.net_count);
    println!("  Pins:       {}", o.pin_connections);
    println!("  Groups:     {}", o.connected_groups);

    println!("\n  Categories:");
    for (category, count) in &o.categories {
        println!("    {:<14} {}", category, count);
    }
    if !o.power_nets.is_empty() {
        println!("\n  Power nets: {}", o.power_nets.join(", "));
    }
    println!("\n  Largest nets:");
    for net in &o.largest_nets {
        println!("    {:<24} {} pins", net.name, net.pins);
    }
    if !o.floating_components.is_empty() {
        println!("\n  Floating: {}", o.floating_components.join(", "));
    }
    if o.diagnostic_count > 0 {
        println!("\n  Diagnostics: {}", o.diagnostic_count);
    }
}

fn print_component(c: &ComponentDetail) {
    println!("\n{} ({})", c.reference, c.value);
    println!("{}", "─".repeat(60));
    println!("  Library:   {}", c.lib_id);
    println!("  Category:  {}", c.category);
    println!("  Sheet:     {}", c.sheet);
    if let Some(ref footprint) = c.footprint {
        println!("  Footprint: {}", footprint);
    }
    println!("\n  Pins:");
    for pin in &c.pins {
        let net = match (&pin.net, pin.no_connect) {
            (_, true) => "(no connect)".to_string(),
            (Some(net), false) => net.clone(),
            (None, false) => "-".to_string(),
        };
        println!("    {:<4} {:<12} {:<14} {}", pin.number, pin.name, pin.electrical_type, net);
    }
}

fn print_net(n: &NetDetail) {
    println!("\nNet: {} [{}]", n.name, n.scope);
    println!("{}", "─".repeat(60));
    if n.is_power {
        match n.voltage {
            Some(v) => println!("  Power rail ({} V)", v),
            None => println!("  Power rail"),
        }
    }
    if !n.aliases.is_empty() {
        println!("  Aliases: {}", n.aliases.join(", "));
    }
    for warning in &n.warnings {
        println!("  Warning: {}", warning);
    }
    println!("\n  Members ({} pins):", n.pin_count);
    for member in &n.components {
        let pins: Vec<String> = member
            .pins
            .iter()
            .map(|p| {
                if p.name.is_empty() {
                    p.number.clone()
                } else {
                    format!("{} ({})", p.number, p.name)
                }
            })
            .collect();
        println!("    {:<8} {:<16} {}", member.reference, member.value, pins.join(", "));
    }
}

fn print_pin(p: &PinConnection) {
    println!("\n{}.{} {} [{}]", p.component, p.pin, p.pin_name, p.electrical_type);
    println!("  Net: {}", p.net);
    if p.no_connect {
        println!("  Marked no-connect");
    }
    if p.connected.is_empty() {
        println!("  Not connected to any other pin");
    } else {
        let others: Vec<String> = p.connected.iter().map(|r| r.to_string()).collect();
        println!("  Connected: {}", others.join(", "));
    }
}

fn print_outcome<T>(outcome: &TraceOutcome<T>, found: impl FnOnce(&T)) {
    match outcome {
        TraceOutcome::Found(path) => found(path),
        TraceOutcome::NoPathFound { start, end } => {
            println!("No path found from {} to {}", start, end);
        }
    }
}

fn print_path(path: &ConnectionPath) {
    println!("{}", path.components.join(" -> "));
    for hop in &path.hops {
        println!("  {} -> {} via {}", hop.from, hop.to, hop.net);
    }
    println!("{} hops", path.hop_count());
}

fn print_neighborhood(n: &Neighborhood) {
    for (distance, level) in n.levels.iter().enumerate() {
        println!("  {}: {}", distance, level.join(", "));
    }
    println!("{} components within {} hops", n.component_count(), n.max_hops);
}

fn print_system_overview(o: &SystemOverview) {
    println!("\nSystem: {}", o.name);
    println!("{}", "─".repeat(60));
    if let Some(ref description) = o.description {
        println!("  {}", description);
    }
    for board in &o.boards {
        println!(
            "  {:<16} {} components, {} nets, {} pins",
            board.name, board.components, board.nets, board.pin_connections
        );
    }
    println!("\n  Shared power nets:");
    for net in &o.shared_power_nets {
        println!("    {:<16} {}", net.key, net.boards.join(", "));
    }
    println!("\n  Shared signal nets:");
    for net in &o.shared_signal_nets {
        println!("    {:<16} {}", net.key, net.boards.join(", "));
    }
    println!("\n  Components: {}", o.total_components);
    println!("  Correlated nets: {}", o.unique_correlated_nets);
    println!("  Pins: {}", o.total_pin_connections);
}

fn print_cross_path(path: &CrossBoardPath) {
    println!("{}", path.components.join(" -> "));
    for hop in &path.hops {
        println!("  {} -> {} via {}", hop.from, hop.to, hop.via.join(" = "));
    }
    println!("{} board crossings", path.board_crossings());
}
