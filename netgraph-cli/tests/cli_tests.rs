//! CLI integration tests

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

/// Command for the netgraph binary with an isolated, initially empty config.
fn netgraph_cli(config_dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("netgraph");
    cmd.arg("--config").arg(config_dir.join("netgraph.yaml"));
    cmd.env_remove("RUST_LOG");
    cmd
}

/// Path to netgraph library test fixtures (relative to workspace).
fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("netgraph")
        .join("tests")
        .join("fixtures")
        .join(name)
}

#[test]
fn test_cli_help() {
    let dir = tempfile::tempdir().unwrap();
    netgraph_cli(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("KiCad"));
}

#[test]
fn test_cli_version() {
    let dir = tempfile::tempdir().unwrap();
    netgraph_cli(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_overview_by_path() {
    let dir = tempfile::tempdir().unwrap();
    netgraph_cli(dir.path())
        .arg("overview")
        .arg(fixture("clk_board.kicad_sch"))
        .assert()
        .success()
        .stdout(predicate::str::contains("Components: 5"))
        .stdout(predicate::str::contains("Floating: R3"));
}

#[test]
fn test_cli_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = netgraph_cli(dir.path())
        .args(["--format", "json", "net"])
        .arg(fixture("clk_board.kicad_sch"))
        .arg("CLK")
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["name"], "CLK");
    assert_eq!(value["pin_count"], 2);
}

#[test]
fn test_cli_trace_and_no_path() {
    let dir = tempfile::tempdir().unwrap();
    netgraph_cli(dir.path())
        .arg("trace")
        .arg(fixture("clk_board.kicad_sch"))
        .args(["U2", "R2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("U2 -> U1 -> R1 -> R2"));

    // Unreachable is an answer, not an error.
    netgraph_cli(dir.path())
        .arg("trace")
        .arg(fixture("clk_board.kicad_sch"))
        .args(["U1", "R3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No path found"));
}

#[test]
fn test_cli_unknown_component_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    netgraph_cli(dir.path())
        .arg("component")
        .arg(fixture("clk_board.kicad_sch"))
        .arg("U99")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("U99"));
}

#[test]
fn test_cli_unknown_board_exits_1() {
    let dir = tempfile::tempdir().unwrap();
    netgraph_cli(dir.path())
        .args(["overview", "nowhere"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn test_cli_broken_schematic_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let broken = dir.path().join("broken.kicad_sch");
    std::fs::write(&broken, "(kicad_sch (wire").unwrap();
    netgraph_cli(dir.path())
        .arg("overview")
        .arg(&broken)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("broken.kicad_sch"));
}

#[test]
fn test_cli_components_by_category() {
    let dir = tempfile::tempdir().unwrap();
    netgraph_cli(dir.path())
        .arg("components")
        .arg(fixture("clk_board.kicad_sch"))
        .args(["--category", "resistors"])
        .assert()
        .success()
        .stdout(predicate::str::contains("R1"))
        .stdout(predicate::str::contains("U1").not());
}

#[test]
fn test_cli_registry_and_system_trace() {
    let dir = tempfile::tempdir().unwrap();
    netgraph_cli(dir.path())
        .arg("add-board")
        .arg("main")
        .arg(fixture("spi_main.kicad_sch"))
        .assert()
        .success();
    netgraph_cli(dir.path())
        .arg("add-board")
        .arg("sensor")
        .arg(fixture("spi_sensor.kicad_sch"))
        .args(["--description", "Sensor module"])
        .assert()
        .success();
    netgraph_cli(dir.path())
        .args(["add-system", "rig", "main", "sensor"])
        .assert()
        .success();

    netgraph_cli(dir.path())
        .arg("boards")
        .assert()
        .success()
        .stdout(predicate::str::contains("Sensor module"));
    netgraph_cli(dir.path())
        .args(["system-overview", "rig"])
        .assert()
        .success()
        .stdout(predicate::str::contains("MISO"));
    netgraph_cli(dir.path())
        .args(["trace-signal", "rig", "MISO", "--from", "main:R1", "--to", "sensor:U2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("main:R1 -> sensor:U1 -> sensor:U2"))
        .stdout(predicate::str::contains("1 board crossings"));

    netgraph_cli(dir.path())
        .args(["add-system", "bad", "ghost"])
        .assert()
        .code(1);
    netgraph_cli(dir.path())
        .args(["remove-system", "rig"])
        .assert()
        .success();
    netgraph_cli(dir.path())
        .args(["system-overview", "rig"])
        .assert()
        .code(1);
}
