//! KiCad schematic decoder
//!
//! Turns the `(kicad_sch ...)` tree produced by [`SExpParser`] into
//! [`RawSchematic`] records, following the S-expression file format:
//! https://dev-docs.kicad.org/en/file-formats/sexpr-schematic/
//!
//! Format details that matter here:
//! - All values are in millimetres with at most 4 decimal places, decoded
//!   exactly onto the 0.0001 mm grid
//! - Position: (at X Y [ANGLE]), points: (pts (xy X Y) ...)
//! - Properties: (property "KEY" "VALUE" ...)
//! - Library pins live in sub-symbols named `NAME_UNIT_BODYSTYLE`
//!
//! Record kinds this decoder does not know about are skipped.

use crate::geometry::{parse_fixed, Mirror, Point};
use crate::parser::schema::*;
use crate::parser::sexp::{truncate, ParseError, SExp, SExpParser};

/// Decoder for KiCad 6-9 `.kicad_sch` files.
pub struct KicadParser;

impl KicadParser {
    /// Parse schematic text into raw records.
    pub fn parse_str(content: &str) -> Result<RawSchematic, ParseError> {
        let root = SExpParser::new(content).parse()?;
        Self::decode(&root)
    }

    /// Decode an already parsed tree.
    pub fn decode(root: &SExp) -> Result<RawSchematic, ParseError> {
        match root.tag() {
            Some("kicad_sch") => {}
            Some(other) => {
                return Err(ParseError::InvalidRoot {
                    found: other.to_string(),
                    line: root.line(),
                })
            }
            None => {
                return Err(ParseError::InvalidRoot {
                    found: truncate(&root.to_string()),
                    line: root.line(),
                })
            }
        }

        let mut schematic = RawSchematic {
            version: root.child("version").map(|v| Self::integer(v, 0)).transpose()?,
            generator: root.value_of("generator").map(str::to_string),
            uuid: root.value_of("uuid").map(str::to_string),
            ..Default::default()
        };

        for item in root.args() {
            let Some(tag) = item.tag() else { continue };
            match tag {
                "lib_symbols" => {
                    for def in item.children("symbol") {
                        schematic.lib_symbols.push(Self::parse_lib_symbol(def)?);
                    }
                }
                "symbol" => schematic.symbols.push(Self::parse_symbol(item)?),
                "wire" => schematic.wires.push(RawWire {
                    points: Self::points(item, "wire")?,
                    line: item.line(),
                }),
                "bus" => schematic.buses.push(RawBus {
                    points: Self::points(item, "bus")?,
                    line: item.line(),
                }),
                "bus_entry" => schematic.bus_entries.push(RawBusEntry {
                    position: Self::position(item, "bus_entry")?.0,
                    size: Self::pair(Self::required(item, "size", "bus_entry")?)?,
                    line: item.line(),
                }),
                "junction" => schematic.junctions.push(RawJunction {
                    position: Self::position(item, "junction")?.0,
                    line: item.line(),
                }),
                "no_connect" => schematic.no_connects.push(RawNoConnect {
                    position: Self::position(item, "no_connect")?.0,
                    line: item.line(),
                }),
                "label" => schematic.labels.push(Self::parse_label(item, RawLabelKind::Local)?),
                "global_label" => schematic
                    .labels
                    .push(Self::parse_label(item, RawLabelKind::Global)?),
                "hierarchical_label" => schematic
                    .labels
                    .push(Self::parse_label(item, RawLabelKind::Hierarchical)?),
                "sheet" => schematic.sheets.push(Self::parse_sheet(item)?),
                "symbol_instances" => {
                    for path in item.children("path") {
                        schematic.symbol_instances.push(Self::parse_instance_path(path)?);
                    }
                }
                _ => {}
            }
        }

        Ok(schematic)
    }

    fn parse_lib_symbol(def: &SExp) -> Result<RawLibSymbol, ParseError> {
        let name = Self::name_arg(def, "lib symbol")?;
        let power = def.child("power").map(|p| match p.arg_atom(0) {
            Some("local") => PowerKind::Local,
            _ => PowerKind::Global,
        });

        let mut pins = Vec::new();
        for pin in def.children("pin") {
            pins.push(Self::parse_lib_pin(pin, 0, 0)?);
        }
        for unit_def in def.children("symbol") {
            let unit_name = Self::name_arg(unit_def, "lib symbol unit")?;
            let (unit, body_style) = split_unit_name(&unit_name).unwrap_or((0, 0));
            for pin in unit_def.children("pin") {
                pins.push(Self::parse_lib_pin(pin, unit, body_style)?);
            }
        }

        Ok(RawLibSymbol {
            name,
            extends: def.value_of("extends").map(str::to_string),
            power,
            properties: Self::properties(def)?,
            pins,
            line: def.line(),
        })
    }

    fn parse_lib_pin(pin: &SExp, unit: u32, body_style: u32) -> Result<RawLibPin, ParseError> {
        let electrical_type = pin.arg_atom(0).unwrap_or("unspecified").to_string();
        let hidden = match pin.child("hide") {
            Some(h) => h.arg_atom(0) != Some("no"),
            None => pin.has_flag("hide"),
        };
        Ok(RawLibPin {
            number: pin.value_of("number").unwrap_or("").to_string(),
            name: pin.value_of("name").unwrap_or("").to_string(),
            electrical_type,
            position: Self::position(pin, "pin")?.0,
            unit,
            body_style,
            hidden,
        })
    }

    fn parse_symbol(item: &SExp) -> Result<RawSymbol, ParseError> {
        let lib_id = item
            .value_of("lib_id")
            .ok_or_else(|| missing("symbol", "lib_id", item.line()))?
            .to_string();
        let (position, angle) = Self::position(item, "symbol")?;
        let mirror = match item.value_of("mirror") {
            Some("x") => Some(Mirror::X),
            Some("y") => Some(Mirror::Y),
            Some(other) => {
                return Err(ParseError::UnexpectedToken {
                    token: truncate(other),
                    line: item.child("mirror").map_or(item.line(), SExp::line),
                })
            }
            None => None,
        };
        let unit = item.child("unit").map(|u| Self::unit_number(u, 0)).transpose()?;
        let body_style = match item.child("body_style").or_else(|| item.child("convert")) {
            Some(b) => Some(Self::unit_number(b, 0)?),
            None => None,
        };

        let mut instances = Vec::new();
        if let Some(block) = item.child("instances") {
            for project in block.children("project") {
                for path in project.children("path") {
                    instances.push(Self::parse_instance_path(path)?);
                }
            }
        }

        Ok(RawSymbol {
            lib_id,
            lib_name: item.value_of("lib_name").map(str::to_string),
            position,
            angle,
            mirror,
            unit: unit.unwrap_or(1),
            body_style: body_style.unwrap_or(1),
            uuid: item.value_of("uuid").map(str::to_string),
            properties: Self::properties(item)?,
            instances,
            line: item.line(),
        })
    }

    fn parse_instance_path(path: &SExp) -> Result<RawInstance, ParseError> {
        let sheet_path = path
            .arg_atom(0)
            .ok_or_else(|| missing("instance path", "path", path.line()))?
            .to_string();
        let reference = path
            .value_of("reference")
            .ok_or_else(|| missing("instance path", "reference", path.line()))?
            .to_string();
        let unit = path.child("unit").map(|u| Self::unit_number(u, 0)).transpose()?;
        Ok(RawInstance {
            path: sheet_path,
            reference,
            unit,
        })
    }

    fn parse_label(item: &SExp, kind: RawLabelKind) -> Result<RawLabel, ParseError> {
        let record = item.tag().unwrap_or("label");
        let text = item
            .arg_atom(0)
            .ok_or_else(|| missing(record, "text", item.line()))?
            .to_string();
        Ok(RawLabel {
            kind,
            text,
            position: Self::position(item, record)?.0,
            line: item.line(),
        })
    }

    fn parse_sheet(item: &SExp) -> Result<RawSheet, ParseError> {
        let properties = Self::properties(item)?;
        let lookup = |keys: &[&str]| {
            properties
                .iter()
                .find(|(k, _)| keys.contains(&k.as_str()))
                .map(|(_, v)| v.clone())
        };
        let name = lookup(&["Sheetname", "Sheet name"])
            .ok_or_else(|| missing("sheet", "Sheetname", item.line()))?;
        let file = lookup(&["Sheetfile", "Sheet file"])
            .ok_or_else(|| missing("sheet", "Sheetfile", item.line()))?;

        let mut pins = Vec::new();
        for pin in item.children("pin") {
            pins.push(RawSheetPin {
                name: pin
                    .arg_atom(0)
                    .ok_or_else(|| missing("sheet pin", "name", pin.line()))?
                    .to_string(),
                position: Self::position(pin, "sheet pin")?.0,
            });
        }

        Ok(RawSheet {
            name,
            file,
            position: Self::position(item, "sheet")?.0,
            size: match item.child("size") {
                Some(size) => Self::pair(size)?,
                None => Point::default(),
            },
            uuid: item.value_of("uuid").map(str::to_string),
            pins,
            line: item.line(),
        })
    }

    /// `(at X Y [ANGLE])` of a record; the angle defaults to 0.
    fn position(item: &SExp, record: &str) -> Result<(Point, i64), ParseError> {
        let at = Self::required(item, "at", record)?;
        let point = Self::pair(at)?;
        let angle = match at.args().get(2) {
            Some(_) => Self::fixed(at, 2)?,
            None => 0,
        };
        Ok((point, angle))
    }

    fn points(item: &SExp, record: &str) -> Result<Vec<Point>, ParseError> {
        let pts = Self::required(item, "pts", record)?;
        let points = pts
            .children("xy")
            .map(Self::pair)
            .collect::<Result<Vec<_>, _>>()?;
        if points.len() < 2 {
            return Err(missing(record, "second point", pts.line()));
        }
        Ok(points)
    }

    fn pair(node: &SExp) -> Result<Point, ParseError> {
        Ok(Point::new(Self::fixed(node, 0)?, Self::fixed(node, 1)?))
    }

    fn fixed(node: &SExp, index: usize) -> Result<i64, ParseError> {
        match node.args().get(index) {
            Some(SExp::Atom(token, span)) => parse_fixed(token).ok_or_else(|| ParseError::InvalidNumber {
                token: truncate(token),
                line: span.line,
            }),
            Some(other) => Err(ParseError::UnexpectedToken {
                token: truncate(&other.to_string()),
                line: other.line(),
            }),
            None => Err(missing(
                node.tag().unwrap_or("list"),
                &format!("value {}", index + 1),
                node.line(),
            )),
        }
    }

    fn integer(node: &SExp, index: usize) -> Result<u64, ParseError> {
        let token = node.arg_atom(index).ok_or_else(|| {
            missing(node.tag().unwrap_or("list"), "integer", node.line())
        })?;
        token.parse::<u64>().map_err(|_| ParseError::InvalidNumber {
            token: truncate(token),
            line: node.line(),
        })
    }

    fn unit_number(node: &SExp, index: usize) -> Result<u32, ParseError> {
        let value = Self::integer(node, index)?;
        u32::try_from(value).map_err(|_| ParseError::InvalidNumber {
            token: value.to_string(),
            line: node.line(),
        })
    }

    fn required<'a>(item: &'a SExp, key: &str, record: &str) -> Result<&'a SExp, ParseError> {
        item.child(key).ok_or_else(|| missing(record, key, item.line()))
    }

    fn name_arg(item: &SExp, record: &str) -> Result<String, ParseError> {
        item.arg_atom(0)
            .map(str::to_string)
            .ok_or_else(|| missing(record, "name", item.line()))
    }

    fn properties(item: &SExp) -> Result<Vec<(String, String)>, ParseError> {
        item.children("property")
            .map(|prop| {
                let key = prop
                    .arg_atom(0)
                    .ok_or_else(|| missing("property", "key", prop.line()))?;
                let value = prop.arg_atom(1).unwrap_or("");
                Ok((key.to_string(), value.to_string()))
            })
            .collect()
    }
}

/// Split a sub-symbol name such as `R_1_1` into (unit, body style).
fn split_unit_name(name: &str) -> Option<(u32, u32)> {
    let mut parts = name.rsplitn(3, '_');
    let body_style = parts.next()?.parse().ok()?;
    let unit = parts.next()?.parse().ok()?;
    parts.next()?;
    Some((unit, body_style))
}

fn missing(record: &str, field: &str, line: usize) -> ParseError {
    ParseError::MissingField {
        record: record.to_string(),
        field: field.to_string(),
        line,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"(kicad_sch (version 20231120) (generator "eeschema")
  (uuid "6f1c1e0e-8a43-4c55-9a0e-0d5c0e6d6a01")
  (paper "A4")
  (lib_symbols
    (symbol "Device:R" (pin_numbers hide) (in_bom yes) (on_board yes)
      (property "Reference" "R" (at 2.032 0 90))
      (symbol "R_0_1" (rectangle (start -1.016 -2.54) (end 1.016 2.54)))
      (symbol "R_1_1"
        (pin passive line (at 0 3.81 270) (length 1.27) (name "~" (effects (font (size 1.27 1.27)))) (number "1" (effects (font (size 1.27 1.27)))))
        (pin passive line (at 0 -3.81 90) (length 1.27) (name "~") (number "2"))))
    (symbol "power:GND" (power) (pin_names (offset 0)) (in_bom yes) (on_board yes)
      (property "Value" "GND" (at 0 -3.81 0))
      (symbol "GND_0_1" (polyline (pts (xy 0 0) (xy 0 -1.27))))
      (symbol "GND_1_1" (pin power_in line (at 0 0 270) (length 0) hide (name "GND") (number "1")))))
  (junction (at 120.65 80.01) (diameter 0) (color 0 0 0 0) (uuid "j1"))
  (no_connect (at 95.25 60.96) (uuid "nc1"))
  (bus_entry (at 130 70) (size 2.54 2.54) (uuid "be1"))
  (wire (pts (xy 100 80.01) (xy 120.65 80.01)) (stroke (width 0) (type default)) (uuid "w1"))
  (bus (pts (xy 130 70) (xy 130 50)) (uuid "b1"))
  (text "ignored note" (at 10 10 0))
  (future_record (whatever 1 2 3))
  (label "CLK" (at 100 80.01 0) (effects (font (size 1.27 1.27))) (uuid "l1"))
  (global_label "SDA" (shape bidirectional) (at 140 90 180) (uuid "g1"))
  (hierarchical_label "MISO" (shape input) (at 150 90 0) (uuid "h1"))
  (symbol (lib_id "Device:R") (at 100 76.2 90) (mirror x) (unit 1)
    (in_bom yes) (on_board yes) (dnp no) (uuid "s1")
    (property "Reference" "R1" (at 0 0 0))
    (property "Value" "10k" (at 0 0 0))
    (property "Footprint" "Resistor_SMD:R_0603" (at 0 0 0))
    (pin "1" (uuid "p1")) (pin "2" (uuid "p2"))
    (instances (project "demo" (path "/6f1c1e0e-8a43-4c55-9a0e-0d5c0e6d6a01" (reference "R1") (unit 1)))))
  (sheet (at 160 40) (size 25.4 12.7) (uuid "sh1")
    (property "Sheetname" "Power" (at 160 39 0))
    (property "Sheetfile" "power.kicad_sch" (at 160 53 0))
    (pin "VOUT" output (at 185.4 45.72 0) (uuid "sp1")))
)"#;

    #[test]
    fn test_decode_sample() {
        let sch = KicadParser::parse_str(SAMPLE).unwrap();
        assert_eq!(sch.version, Some(20231120));
        assert_eq!(sch.generator.as_deref(), Some("eeschema"));
        assert_eq!(sch.lib_symbols.len(), 2);
        assert_eq!(sch.symbols.len(), 1);
        assert_eq!(sch.wires.len(), 1);
        assert_eq!(sch.buses.len(), 1);
        assert_eq!(sch.bus_entries.len(), 1);
        assert_eq!(sch.junctions.len(), 1);
        assert_eq!(sch.no_connects.len(), 1);
        assert_eq!(sch.labels.len(), 3);
        assert_eq!(sch.sheets.len(), 1);
    }

    #[test]
    fn test_lib_symbol_pins_carry_unit() {
        let sch = KicadParser::parse_str(SAMPLE).unwrap();
        let r = sch.lib_symbol("Device:R").unwrap();
        assert_eq!(r.power, None);
        assert_eq!(r.pins.len(), 2);
        assert_eq!(r.pins[0].number, "1");
        assert_eq!(r.pins[0].unit, 1);
        assert_eq!(r.pins[0].body_style, 1);
        assert_eq!(r.pins[0].position, Point::new(0, 38_100));
        assert!(!r.pins[0].hidden);

        let gnd = sch.lib_symbol("power:GND").unwrap();
        assert_eq!(gnd.power, Some(PowerKind::Global));
        assert_eq!(gnd.pins[0].electrical_type, "power_in");
        assert!(gnd.pins[0].hidden);
        assert_eq!(gnd.property("Value"), Some("GND"));
    }

    #[test]
    fn test_placed_symbol() {
        let sch = KicadParser::parse_str(SAMPLE).unwrap();
        let r1 = &sch.symbols[0];
        assert_eq!(r1.lib_id, "Device:R");
        assert_eq!(r1.position, Point::new(1_000_000, 762_000));
        assert_eq!(r1.angle, 900_000);
        assert_eq!(r1.mirror, Some(Mirror::X));
        assert_eq!(r1.unit, 1);
        assert_eq!(r1.body_style, 1);
        assert_eq!(r1.property("Reference"), Some("R1"));
        assert_eq!(r1.property("Footprint"), Some("Resistor_SMD:R_0603"));
        assert_eq!(r1.instances.len(), 1);
        assert_eq!(r1.instances[0].reference, "R1");
        assert_eq!(r1.instances[0].unit, Some(1));
    }

    #[test]
    fn test_labels_and_sheet() {
        let sch = KicadParser::parse_str(SAMPLE).unwrap();
        let kinds: Vec<_> = sch.labels.iter().map(|l| (l.kind, l.text.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (RawLabelKind::Local, "CLK"),
                (RawLabelKind::Global, "SDA"),
                (RawLabelKind::Hierarchical, "MISO"),
            ]
        );
        let sheet = &sch.sheets[0];
        assert_eq!(sheet.name, "Power");
        assert_eq!(sheet.file, "power.kicad_sch");
        assert_eq!(sheet.pins[0].name, "VOUT");
        assert_eq!(sheet.pins[0].position, Point::new(1_854_000, 457_200));
    }

    #[test]
    fn test_kicad6_symbol_instances() {
        let text = r#"(kicad_sch (version 20211123)
  (symbol_instances
    (path "/a1" (reference "R1") (unit 1) (value "10k") (footprint ""))
    (path "/s1/a2" (reference "R7") (unit 1))))"#;
        let sch = KicadParser::parse_str(text).unwrap();
        assert_eq!(sch.symbol_instances.len(), 2);
        assert_eq!(sch.symbol_instances[1].path, "/s1/a2");
        assert_eq!(sch.symbol_instances[1].reference, "R7");
    }

    #[test]
    fn test_rejects_wrong_root() {
        let err = KicadParser::parse_str("(kicad_pcb (version 1))").unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidRoot {
                found: "kicad_pcb".to_string(),
                line: 1
            }
        );
    }

    #[test]
    fn test_invalid_number_reports_line() {
        let text = "(kicad_sch\n  (junction (at 1e3 5)))";
        let err = KicadParser::parse_str(text).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidNumber {
                token: "1e3".to_string(),
                line: 2
            }
        );
    }

    #[test]
    fn test_oversized_unit_is_rejected() {
        let text = "(kicad_sch\n  (symbol (lib_id \"Device:R\") (at 0 0 0) (unit 4294967297)))";
        let err = KicadParser::parse_str(text).unwrap_err();
        assert_eq!(
            err,
            ParseError::InvalidNumber {
                token: "4294967297".to_string(),
                line: 2
            }
        );
    }

    #[test]
    fn test_missing_lib_id() {
        let text = "(kicad_sch\n\n  (symbol (at 0 0 0)))";
        let err = KicadParser::parse_str(text).unwrap_err();
        assert!(matches!(err, ParseError::MissingField { line: 3, .. }));
    }

    #[test]
    fn test_unbalanced_fails_hard() {
        let err = KicadParser::parse_str("(kicad_sch (wire (pts (xy 0 0) (xy 1 0)))").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_split_unit_name() {
        assert_eq!(split_unit_name("R_1_1"), Some((1, 1)));
        assert_eq!(split_unit_name("LM358_2_1"), Some((2, 1)));
        assert_eq!(split_unit_name("My_Part_0_2"), Some((0, 2)));
        assert_eq!(split_unit_name("R"), None);
    }
}
