//! Schematic Model Builder
//!
//! Turns raw records into domain entities. Each library pin is moved through
//! the symbol's placement transform to its absolute sheet position, power
//! symbols become [`PowerPort`]s, multi-unit parts are merged by reference
//! and hierarchical sheets are expanded depth-first through a
//! [`SheetLoader`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use super::category::Category;
use super::natural_cmp;
use super::schema::*;
use crate::geometry::{format_fixed, Orientation};
use crate::parser::schema::*;
use crate::parser::ParseError;

/// Deepest sheet nesting accepted, root included.
pub const MAX_SHEET_DEPTH: usize = 32;

/// Limit on `extends` chains inside the embedded library.
const MAX_EXTENDS: usize = 8;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{reference}: library symbol '{lib_id}' is not defined in the schematic")]
    UnresolvedSymbol { reference: String, lib_id: String },
    #[error("{reference}: unit {unit} is placed more than once")]
    DuplicateReference { reference: String, unit: u32 },
    #[error("{reference}: rotation {angle} is not a multiple of 90 degrees")]
    UnsupportedRotation { reference: String, angle: String },
    #[error("sheet '{sheet}' includes '{}' recursively", file.display())]
    RecursiveSheet { sheet: String, file: PathBuf },
    #[error("sheet '{sheet}' is nested deeper than {depth} levels")]
    SheetTooDeep { sheet: String, depth: usize },
    #[error("sheet '{sheet}' references '{file}', but sheet files cannot be loaded for an in-memory schematic")]
    SheetUnavailable { sheet: String, file: String },
    #[error("sheet '{sheet}' could not be loaded from '{}': {source}", file.display())]
    SheetLoad {
        sheet: String,
        file: PathBuf,
        #[source]
        source: SheetLoadError,
    },
}

#[derive(Debug, Error)]
pub enum SheetLoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("sheet loading is not available")]
    Unavailable,
}

/// Supplies the records of child sheet files.
pub trait SheetLoader {
    /// Read and parse `path`. Returns the path the file was found under
    /// (canonicalized where possible) with its records.
    fn load(&mut self, path: &Path) -> Result<(PathBuf, RawSchematic), SheetLoadError>;
}

/// Loader for in-memory schematics: every sheet is unavailable.
pub struct NoSheets;

impl SheetLoader for NoSheets {
    fn load(&mut self, _path: &Path) -> Result<(PathBuf, RawSchematic), SheetLoadError> {
        Err(SheetLoadError::Unavailable)
    }
}

/// Builds a [`Schematic`] from the root sheet's records.
pub struct SchematicBuilder<'l> {
    loader: &'l mut dyn SheetLoader,
    schematic: Schematic,
    by_reference: HashMap<String, usize>,
    /// KiCad 6 `symbol_instances` of the root, by instance path.
    legacy_instances: HashMap<String, RawInstance>,
}

impl<'l> SchematicBuilder<'l> {
    pub fn new(loader: &'l mut dyn SheetLoader) -> Self {
        Self {
            loader,
            schematic: Schematic::default(),
            by_reference: HashMap::new(),
            legacy_instances: HashMap::new(),
        }
    }

    /// Build the full hierarchy rooted at `root`. `root_file` anchors relative
    /// sheet paths and recursion checks.
    pub fn build(mut self, root: &RawSchematic, root_file: Option<&Path>) -> Result<Schematic, ModelError> {
        self.schematic.root_uuid = root.uuid.as_deref().and_then(|u| Uuid::parse_str(u).ok());
        self.legacy_instances = root
            .symbol_instances
            .iter()
            .map(|inst| (inst.path.clone(), inst.clone()))
            .collect();

        let uuid_path = root.uuid.as_deref().map(|u| format!("/{u}")).unwrap_or_default();
        self.schematic.sheets.push(SheetInstance {
            name: String::new(),
            path: "/".to_string(),
            uuid_path,
            file: root_file.map(Path::to_path_buf),
            parent: None,
        });

        let mut ancestors: Vec<PathBuf> = root_file.map(Path::to_path_buf).into_iter().collect();
        self.expand(root, 0, root_file, &mut ancestors)?;

        let mut schematic = self.schematic;
        for component in &mut schematic.components {
            component.units.sort_unstable();
            component.pins.sort_by(|a, b| natural_cmp(&a.number, &b.number));
        }
        schematic
            .components
            .sort_by(|a, b| natural_cmp(&a.reference, &b.reference));
        Ok(schematic)
    }

    fn expand(
        &mut self,
        raw: &RawSchematic,
        sheet: SheetIndex,
        file: Option<&Path>,
        ancestors: &mut Vec<PathBuf>,
    ) -> Result<(), ModelError> {
        for symbol in &raw.symbols {
            self.place_symbol(raw, symbol, sheet)?;
        }
        for wire in &raw.wires {
            for pair in wire.points.windows(2) {
                self.schematic.wires.push(Wire {
                    start: pair[0],
                    end: pair[1],
                    sheet,
                });
            }
        }
        for bus in &raw.buses {
            self.schematic.buses.push(Bus {
                points: bus.points.clone(),
                sheet,
            });
        }
        for entry in &raw.bus_entries {
            self.schematic.bus_entries.push(BusEntry {
                start: entry.position,
                end: entry.position.offset(entry.size.x, entry.size.y),
                sheet,
            });
        }
        for junction in &raw.junctions {
            self.schematic.junctions.push(Junction {
                position: junction.position,
                sheet,
            });
        }
        for nc in &raw.no_connects {
            self.schematic.no_connects.push(NoConnect {
                position: nc.position,
                sheet,
            });
        }
        for label in &raw.labels {
            let scope = match label.kind {
                RawLabelKind::Local => LabelScope::Local,
                RawLabelKind::Global => LabelScope::Global,
                RawLabelKind::Hierarchical => LabelScope::Hierarchical,
            };
            self.schematic.labels.push(Label {
                text: label.text.clone(),
                scope,
                position: label.position,
                sheet,
            });
        }

        for child in &raw.sheets {
            self.expand_sheet(child, sheet, file, ancestors)?;
        }
        Ok(())
    }

    fn expand_sheet(
        &mut self,
        child: &RawSheet,
        parent: SheetIndex,
        parent_file: Option<&Path>,
        ancestors: &mut Vec<PathBuf>,
    ) -> Result<(), ModelError> {
        if ancestors.len() >= MAX_SHEET_DEPTH {
            return Err(ModelError::SheetTooDeep {
                sheet: child.name.clone(),
                depth: MAX_SHEET_DEPTH,
            });
        }

        let requested = match parent_file.and_then(Path::parent) {
            Some(dir) => dir.join(&child.file),
            None => PathBuf::from(&child.file),
        };
        let (resolved, raw) = match self.loader.load(&requested) {
            Ok(loaded) => loaded,
            Err(SheetLoadError::Unavailable) => {
                return Err(ModelError::SheetUnavailable {
                    sheet: child.name.clone(),
                    file: child.file.clone(),
                })
            }
            Err(source) => {
                return Err(ModelError::SheetLoad {
                    sheet: child.name.clone(),
                    file: requested,
                    source,
                })
            }
        };
        if ancestors.contains(&resolved) {
            return Err(ModelError::RecursiveSheet {
                sheet: child.name.clone(),
                file: resolved,
            });
        }

        let parent_sheet = &self.schematic.sheets[parent];
        let segment = child.uuid.clone().unwrap_or_else(|| child.name.clone());
        let instance = SheetInstance {
            name: child.name.clone(),
            path: format!("{}{}/", parent_sheet.path, child.name),
            uuid_path: format!("{}/{}", parent_sheet.uuid_path, segment),
            file: Some(resolved.clone()),
            parent: Some(parent),
        };
        debug!(sheet = %instance.path, file = %resolved.display(), "expanding sheet");

        let index = self.schematic.sheets.len();
        self.schematic.sheets.push(instance);
        for pin in &child.pins {
            self.schematic.sheet_pins.push(SheetPin {
                name: pin.name.clone(),
                position: pin.position,
                sheet: parent,
                child: index,
            });
        }

        ancestors.push(resolved.clone());
        let result = self.expand(&raw, index, Some(resolved.as_path()), ancestors);
        ancestors.pop();
        result
    }

    fn place_symbol(&mut self, raw: &RawSchematic, symbol: &RawSymbol, sheet: SheetIndex) -> Result<(), ModelError> {
        let (reference, unit) = self.instance_reference(symbol, sheet);
        let lib_key = symbol.library_key();
        let def = raw
            .lib_symbol(lib_key)
            .ok_or_else(|| ModelError::UnresolvedSymbol {
                reference: reference.clone(),
                lib_id: lib_key.to_string(),
            })?;
        let (pins, power) = resolve_definition(raw, def);

        let orientation =
            Orientation::from_fixed_degrees(symbol.angle, symbol.mirror).ok_or_else(|| {
                ModelError::UnsupportedRotation {
                    reference: reference.clone(),
                    angle: format_fixed(symbol.angle),
                }
            })?;
        let body_style = symbol.body_style;
        let placed = pins
            .iter()
            .filter(|p| (p.unit == 0 || p.unit == unit) && (p.body_style == 0 || p.body_style == body_style));

        if let Some(kind) = power {
            let value = symbol
                .property("Value")
                .filter(|v| !v.is_empty())
                .or_else(|| def.property("Value").filter(|v| !v.is_empty()));
            for pin in placed {
                if ElectricalType::from_keyword(&pin.electrical_type) != ElectricalType::PowerIn {
                    continue;
                }
                let name = value.unwrap_or_else(|| pin_name(&pin.name)).to_string();
                if name.is_empty() {
                    continue;
                }
                self.schematic.power_ports.push(PowerPort {
                    name,
                    local: kind == PowerKind::Local,
                    position: symbol.position + orientation.apply(pin.position),
                    sheet,
                });
            }
            return Ok(());
        }

        if reference.starts_with('#') {
            debug!(reference = %reference, "skipping virtual symbol");
            return Ok(());
        }

        let mut new_pins = Vec::new();
        for lib_pin in placed {
            let electrical_type = ElectricalType::from_keyword(&lib_pin.electrical_type);
            let position = symbol.position + orientation.apply(lib_pin.position);
            let name = pin_name(&lib_pin.name).to_string();
            if lib_pin.hidden && electrical_type == ElectricalType::PowerIn && !name.is_empty() {
                self.schematic.power_ports.push(PowerPort {
                    name: name.clone(),
                    local: false,
                    position,
                    sheet,
                });
            }
            new_pins.push(Pin {
                number: lib_pin.number.clone(),
                name,
                electrical_type,
                position,
                sheet,
                unit: lib_pin.unit,
                hidden: lib_pin.hidden,
                extra_sites: Vec::new(),
            });
        }

        match self.by_reference.get(&reference) {
            Some(&index) => {
                let component = &mut self.schematic.components[index];
                if component.units.contains(&unit) {
                    return Err(ModelError::DuplicateReference { reference, unit });
                }
                component.units.push(unit);
                merge_pins(&mut component.pins, new_pins);
            }
            None => {
                let properties: BTreeMap<String, String> = symbol.properties.iter().cloned().collect();
                let value = properties.get("Value").cloned().unwrap_or_default();
                let footprint = properties.get("Footprint").filter(|f| !f.is_empty()).cloned();
                let mut pins = Vec::new();
                merge_pins(&mut pins, new_pins);
                self.by_reference
                    .insert(reference.clone(), self.schematic.components.len());
                self.schematic.components.push(Component {
                    category: Category::classify(&reference, &symbol.lib_id),
                    reference,
                    value,
                    footprint,
                    lib_id: symbol.lib_id.clone(),
                    sheet,
                    units: vec![unit],
                    properties,
                    pins,
                });
            }
        }
        Ok(())
    }

    /// Reference and unit of `symbol` within sheet instance `sheet`.
    ///
    /// Looks at the symbol's own `(instances ...)` first, then the KiCad 6
    /// root table, then the `Reference` property.
    fn instance_reference(&self, symbol: &RawSymbol, sheet: SheetIndex) -> (String, u32) {
        let uuid_path = &self.schematic.sheets[sheet].uuid_path;
        let without_root = strip_root(uuid_path);

        let from_instances = symbol
            .instances
            .iter()
            .find(|i| i.path == *uuid_path)
            .or_else(|| {
                symbol
                    .instances
                    .iter()
                    .find(|i| !without_root.is_empty() && strip_root(&i.path) == without_root)
            })
            .or_else(|| match symbol.instances.as_slice() {
                [only] => Some(only),
                _ => None,
            });

        let from_legacy = || {
            let uuid = symbol.uuid.as_deref()?;
            self.legacy_instances.get(&format!("{without_root}/{uuid}"))
        };

        match from_instances.or_else(from_legacy) {
            Some(instance) => (instance.reference.clone(), instance.unit.unwrap_or(symbol.unit)),
            None => (
                symbol.property("Reference").unwrap_or("?").to_string(),
                symbol.unit,
            ),
        }
    }
}

/// Pins and power flag of a definition, following `extends` to the first
/// ancestor that carries pins.
fn resolve_definition<'r>(raw: &'r RawSchematic, def: &'r RawLibSymbol) -> (&'r [RawLibPin], Option<PowerKind>) {
    let mut current = def;
    let mut power = def.power;
    for _ in 0..MAX_EXTENDS {
        if !current.pins.is_empty() {
            break;
        }
        let Some(base) = current.extends.as_deref() else { break };
        let qualified = match current.name.split_once(':') {
            Some((lib, _)) => format!("{lib}:{base}"),
            None => base.to_string(),
        };
        match raw.lib_symbol(&qualified).or_else(|| raw.lib_symbol(base)) {
            Some(parent) => {
                power = power.or(parent.power);
                current = parent;
            }
            None => break,
        }
    }
    (&current.pins, power)
}

/// Add `incoming` to `pins`; a number already present becomes an extra site
/// of the existing pin.
fn merge_pins(pins: &mut Vec<Pin>, incoming: Vec<Pin>) {
    for pin in incoming {
        match pins.iter_mut().find(|p| p.number == pin.number) {
            Some(existing) => existing.extra_sites.push(PinSite {
                sheet: pin.sheet,
                position: pin.position,
            }),
            None => pins.push(pin),
        }
    }
}

fn pin_name(name: &str) -> &str {
    if name == "~" {
        ""
    } else {
        name
    }
}

/// Drop the leading root uuid segment: `/root/a/b` -> `/a/b`, `/root` -> ``.
fn strip_root(path: &str) -> &str {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    match trimmed.find('/') {
        Some(idx) => &trimmed[idx..],
        None => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;
    use crate::parser::KicadParser;

    fn build(text: &str) -> Result<Schematic, ModelError> {
        let raw = KicadParser::parse_str(text).unwrap();
        SchematicBuilder::new(&mut NoSheets).build(&raw, None)
    }

    const LIB: &str = r#"(lib_symbols
    (symbol "Device:R"
      (property "Reference" "R")
      (symbol "R_1_1"
        (pin passive line (at 0 3.81 270) (length 1.27) (name "~") (number "1"))
        (pin passive line (at 0 -3.81 90) (length 1.27) (name "~") (number "2"))))
    (symbol "Amp:Dual" (property "Reference" "U")
      (symbol "Dual_0_1" (pin power_in line (at 0 7.62 270) (length 2.54) (name "V+") (number "8")))
      (symbol "Dual_1_1" (pin input line (at -7.62 0 0) (length 2.54) (name "IN") (number "1")))
      (symbol "Dual_2_1" (pin input line (at -7.62 0 0) (length 2.54) (name "IN") (number "5"))))
    (symbol "MCU:Chip" (property "Reference" "U")
      (symbol "Chip_1_1"
        (pin power_in line (at 0 10.16 270) (length 2.54) hide (name "VDD") (number "1"))
        (pin bidirectional line (at 10.16 0 180) (length 2.54) (name "PA0") (number "2"))))
    (symbol "power:GND" (power) (property "Value" "GND")
      (symbol "GND_1_1" (pin power_in line (at 0 0 270) (length 0) hide (name "GND") (number "1"))))
    (symbol "power:PWR_FLAG" (power) (property "Value" "PWR_FLAG")
      (symbol "PWR_FLAG_0_1" (pin power_out line (at 0 0 90) (length 0) (name "pwr") (number "1"))))
    (symbol "power:VLOC" (power local) (property "Value" "VLOC")
      (symbol "VLOC_1_1" (pin power_in line (at 0 0 90) (length 0) (name "VLOC") (number "1")))))"#;

    fn sheet(body: &str) -> String {
        format!("(kicad_sch (version 20231120) (uuid \"0000-root\")\n  {LIB}\n{body}\n)")
    }

    #[test]
    fn test_pin_positions_follow_transform() {
        let text = sheet(
            r#"(symbol (lib_id "Device:R") (at 100 50 0) (unit 1) (property "Reference" "R1") (property "Value" "10k"))
               (symbol (lib_id "Device:R") (at 120 50 90) (unit 1) (property "Reference" "R2") (property "Value" "1k"))"#,
        );
        let sch = build(&text).unwrap();
        let r1 = sch.component("R1").unwrap();
        assert_eq!(r1.pin("1").unwrap().position, Point::new(1_000_000, 461_900));
        assert_eq!(r1.pin("2").unwrap().position, Point::new(1_000_000, 538_100));

        let r2 = sch.component("R2").unwrap();
        assert_eq!(r2.pin("1").unwrap().position, Point::new(1_161_900, 500_000));
        assert_eq!(r2.pin("2").unwrap().position, Point::new(1_238_100, 500_000));
        assert_eq!(r2.value, "1k");
        assert_eq!(r2.category, Category::Resistors);
    }

    #[test]
    fn test_multi_unit_parts_merge() {
        let text = sheet(
            r#"(symbol (lib_id "Amp:Dual") (at 50 50 0) (unit 1) (property "Reference" "U1"))
               (symbol (lib_id "Amp:Dual") (at 80 50 0) (unit 2) (property "Reference" "U1"))"#,
        );
        let sch = build(&text).unwrap();
        assert_eq!(sch.components.len(), 1);
        let u1 = &sch.components[0];
        assert_eq!(u1.units, vec![1, 2]);
        let numbers: Vec<_> = u1.pins.iter().map(|p| p.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "5", "8"]);
        // Shared pin 8 is drawn on both units.
        assert_eq!(u1.pin("8").unwrap().sites().count(), 2);
    }

    #[test]
    fn test_duplicate_unit_is_an_error() {
        let text = sheet(
            r#"(symbol (lib_id "Device:R") (at 100 50 0) (unit 1) (property "Reference" "R1"))
               (symbol (lib_id "Device:R") (at 120 50 0) (unit 1) (property "Reference" "R1"))"#,
        );
        match build(&text) {
            Err(ModelError::DuplicateReference { reference, unit }) => {
                assert_eq!(reference, "R1");
                assert_eq!(unit, 1);
            }
            other => panic!("expected DuplicateReference, got {:?}", other),
        }
    }

    #[test]
    fn test_unresolved_symbol_names_reference() {
        let text = sheet(r#"(symbol (lib_id "Device:Missing") (at 0 0 0) (property "Reference" "Q7"))"#);
        match build(&text) {
            Err(ModelError::UnresolvedSymbol { reference, lib_id }) => {
                assert_eq!(reference, "Q7");
                assert_eq!(lib_id, "Device:Missing");
            }
            other => panic!("expected UnresolvedSymbol, got {:?}", other),
        }
    }

    #[test]
    fn test_odd_rotation_rejected() {
        let text = sheet(r#"(symbol (lib_id "Device:R") (at 0 0 45) (property "Reference" "R1"))"#);
        assert!(matches!(
            build(&text),
            Err(ModelError::UnsupportedRotation { ref angle, .. }) if angle == "45"
        ));
    }

    #[test]
    fn test_power_symbols_become_ports() {
        let text = sheet(
            r##"(symbol (lib_id "power:GND") (at 10 20 0) (property "Reference" "#PWR01") (property "Value" "GND"))
               (symbol (lib_id "power:PWR_FLAG") (at 10 20 0) (property "Reference" "#FLG01") (property "Value" "PWR_FLAG"))
               (symbol (lib_id "power:VLOC") (at 30 20 0) (property "Reference" "#PWR02") (property "Value" "VLOC"))"##,
        );
        let sch = build(&text).unwrap();
        assert!(sch.components.is_empty());
        let ports: Vec<_> = sch
            .power_ports
            .iter()
            .map(|p| (p.name.as_str(), p.local, p.position))
            .collect();
        assert_eq!(
            ports,
            vec![
                ("GND", false, Point::new(100_000, 200_000)),
                ("VLOC", true, Point::new(300_000, 200_000)),
            ]
        );
    }

    #[test]
    fn test_hidden_power_pins_add_implicit_port() {
        let text = sheet(r#"(symbol (lib_id "MCU:Chip") (at 50 50 0) (property "Reference" "U3"))"#);
        let sch = build(&text).unwrap();
        assert_eq!(sch.power_ports.len(), 1);
        assert_eq!(sch.power_ports[0].name, "VDD");
        assert_eq!(sch.power_ports[0].position, Point::new(500_000, 398_400));
        assert_eq!(sch.component("U3").unwrap().pins.len(), 2);
    }

    #[test]
    fn test_reference_from_instances() {
        let text = sheet(
            r#"(symbol (lib_id "Device:R") (at 0 0 0) (uuid "s1") (property "Reference" "R?")
                 (instances (project "demo" (path "/0000-root" (reference "R5") (unit 1)))))"#,
        );
        let sch = build(&text).unwrap();
        assert_eq!(sch.components[0].reference, "R5");
    }

    #[test]
    fn test_components_sorted_naturally() {
        let text = sheet(
            r#"(symbol (lib_id "Device:R") (at 0 0 0) (property "Reference" "R10"))
               (symbol (lib_id "Device:R") (at 0 20 0) (property "Reference" "R2"))
               (symbol (lib_id "Device:R") (at 0 40 0) (property "Reference" "C1"))"#,
        );
        let sch = build(&text).unwrap();
        let refs: Vec<_> = sch.components.iter().map(|c| c.reference.as_str()).collect();
        assert_eq!(refs, vec!["C1", "R2", "R10"]);
    }

    #[test]
    fn test_sheet_without_loader_is_unavailable() {
        let text = sheet(
            r#"(sheet (at 10 10) (size 20 20) (uuid "sh1")
                 (property "Sheetname" "Power") (property "Sheetfile" "power.kicad_sch"))"#,
        );
        match build(&text) {
            Err(ModelError::SheetUnavailable { sheet, file }) => {
                assert_eq!(sheet, "Power");
                assert_eq!(file, "power.kicad_sch");
            }
            other => panic!("expected SheetUnavailable, got {:?}", other),
        }
    }

    struct MapLoader(HashMap<PathBuf, String>);

    impl SheetLoader for MapLoader {
        fn load(&mut self, path: &Path) -> Result<(PathBuf, RawSchematic), SheetLoadError> {
            let text = self.0.get(path).ok_or_else(|| {
                SheetLoadError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "missing"))
            })?;
            Ok((path.to_path_buf(), KicadParser::parse_str(text)?))
        }
    }

    #[test]
    fn test_hierarchy_expansion() {
        let root = sheet(
            r#"(sheet (at 10 10) (size 20 20) (uuid "sh1")
                 (property "Sheetname" "Power") (property "Sheetfile" "power.kicad_sch")
                 (pin "VOUT" output (at 30 15 0)))"#,
        );
        let child = sheet(
            r#"(symbol (lib_id "Device:R") (at 0 0 0) (uuid "c1") (property "Reference" "R?")
                 (instances (project "demo" (path "/0000-root/sh1" (reference "R9") (unit 1)))))
               (hierarchical_label "VOUT" (shape output) (at 0 -3.81 0))"#,
        );
        let mut loader = MapLoader(HashMap::from([(PathBuf::from("/p/power.kicad_sch"), child)]));
        let raw = KicadParser::parse_str(&root).unwrap();
        let sch = SchematicBuilder::new(&mut loader)
            .build(&raw, Some(Path::new("/p/root.kicad_sch")))
            .unwrap();

        assert_eq!(sch.sheets.len(), 2);
        assert_eq!(sch.sheets[1].path, "/Power/");
        assert_eq!(sch.sheets[1].uuid_path, "/0000-root/sh1");
        assert_eq!(sch.components[0].reference, "R9");
        assert_eq!(sch.components[0].sheet, 1);
        assert_eq!(sch.sheet_pins.len(), 1);
        assert_eq!(sch.sheet_pins[0].sheet, 0);
        assert_eq!(sch.sheet_pins[0].child, 1);
        assert_eq!(sch.labels[0].sheet, 1);
    }

    #[test]
    fn test_recursive_sheet_detected() {
        let looping = sheet(
            r#"(sheet (at 10 10) (size 20 20) (uuid "sh1")
                 (property "Sheetname" "Again") (property "Sheetfile" "root.kicad_sch"))"#,
        );
        let mut loader = MapLoader(HashMap::from([(PathBuf::from("/p/root.kicad_sch"), looping.clone())]));
        let raw = KicadParser::parse_str(&looping).unwrap();
        let err = SchematicBuilder::new(&mut loader)
            .build(&raw, Some(Path::new("/p/root.kicad_sch")))
            .unwrap_err();
        assert!(matches!(err, ModelError::RecursiveSheet { ref sheet, .. } if sheet == "Again"));
    }

    #[test]
    fn test_strip_root() {
        assert_eq!(strip_root("/root"), "");
        assert_eq!(strip_root("/root/a/b"), "/a/b");
        assert_eq!(strip_root(""), "");
    }
}
