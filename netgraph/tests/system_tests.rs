//! Configured boards and systems through `NetgraphCore`.

use netgraph::prelude::*;
use netgraph::Registry;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Project directory holding both SPI boards and a config that names them
/// with paths relative to the config file.
fn spi_project(dir: &Path) -> PathBuf {
    let boards = dir.join("boards");
    fs::create_dir_all(&boards).unwrap();
    for name in ["spi_main.kicad_sch", "spi_sensor.kicad_sch"] {
        fs::copy(fixture_path(name), boards.join(name)).unwrap();
    }
    let config = dir.join(".netgraph.yaml");
    fs::write(
        &config,
        r#"boards:
  main:
    path: boards/spi_main.kicad_sch
    description: MCU carrier
  sensor:
    path: boards/spi_sensor.kicad_sch
systems:
  rig:
    boards: [main, sensor]
    description: Bench rig
cache:
  enabled: false
"#,
    )
    .unwrap();
    config
}

#[test]
fn test_load_configured_system() {
    let dir = tempfile::tempdir().unwrap();
    let core = NetgraphCore::new(Registry::open(spi_project(dir.path())).unwrap());

    let system = core.load_system("rig").unwrap();
    assert_eq!(system.description.as_deref(), Some("Bench rig"));
    let names: Vec<&str> = system.boards.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, vec!["main", "sensor"]);

    let overview = system.overview();
    assert_eq!(overview.unique_correlated_nets, 2);
    assert_eq!(overview.shared_signal_nets[0].key, "MISO");

    let outcome = system
        .trace_cross_board_signal("MISO", "main:R1", "sensor:U2")
        .unwrap();
    assert_eq!(outcome.path().unwrap().board_crossings(), 1);
}

#[test]
fn test_boards_load_by_name_or_path() {
    let dir = tempfile::tempdir().unwrap();
    let core = NetgraphCore::new(Registry::open(spi_project(dir.path())).unwrap());

    let by_name = core.load_board("main").unwrap();
    let by_path = core
        .load_board(dir.path().join("boards/spi_main.kicad_sch").to_str().unwrap())
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&by_name, &by_path));
    assert_eq!(core.cache().stats().builds, 1);
}

#[test]
fn test_system_boards_come_from_the_cache() {
    let dir = tempfile::tempdir().unwrap();
    let core = NetgraphCore::new(Registry::open(spi_project(dir.path())).unwrap());

    core.load_system("rig").unwrap();
    core.load_system("rig").unwrap();
    let stats = core.cache().stats();
    assert_eq!(stats.builds, 2);
    assert_eq!(stats.hits, 2);
}

#[test]
fn test_registry_mutations_persist() {
    let dir = tempfile::tempdir().unwrap();
    let config = spi_project(dir.path());
    let core = NetgraphCore::new(Registry::open(&config).unwrap());

    core.add_board("clk", fixture_path("clk_board.kicad_sch"), Some("Clock tree".into()))
        .unwrap();
    core.add_system("all", vec!["main".into(), "clk".into()], None)
        .unwrap();
    assert!(matches!(
        core.add_system("bad", vec!["ghost".into()], None),
        Err(NetgraphError::NotFound(NotFound::Board { .. }))
    ));

    let reopened = NetgraphCore::new(Registry::open(&config).unwrap());
    let boards: Vec<String> = reopened.boards().into_iter().map(|(name, _)| name).collect();
    assert_eq!(boards, vec!["clk", "main", "sensor"]);
    let systems: Vec<String> = reopened.systems().into_iter().map(|(name, _)| name).collect();
    assert_eq!(systems, vec!["all", "rig"]);

    reopened.remove_system("all").unwrap();
    reopened.remove_board("clk").unwrap();
    assert!(matches!(
        reopened.remove_board("clk"),
        Err(NetgraphError::NotFound(NotFound::Board { .. }))
    ));
}

#[test]
fn test_reload_picks_up_external_edits() {
    let dir = tempfile::tempdir().unwrap();
    let config = spi_project(dir.path());
    let core = NetgraphCore::new(Registry::open(&config).unwrap());
    let before = core.config();

    let text = fs::read_to_string(&config).unwrap();
    fs::write(&config, text.replace("  rig:", "  bench:")).unwrap();
    core.reload().unwrap();

    assert!(before.systems.contains_key("rig"));
    assert!(core.load_system("bench").is_ok());
    assert!(matches!(
        core.load_system("rig"),
        Err(NetgraphError::NotFound(NotFound::System { .. }))
    ));
}

#[test]
fn test_missing_board_file_in_system() {
    let dir = tempfile::tempdir().unwrap();
    let config = spi_project(dir.path());
    fs::remove_file(dir.path().join("boards/spi_sensor.kicad_sch")).unwrap();
    let core = NetgraphCore::new(Registry::open(&config).unwrap());

    assert!(matches!(
        core.load_system("rig"),
        Err(NetgraphError::Io { .. })
    ));
}
