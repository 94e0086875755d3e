use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Component category derived from the reference designator prefix, with the
/// library id as a fallback. Every component gets one; unknown ones are
/// [`Category::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "ICs")]
    Ics,
    Resistors,
    Capacitors,
    Inductors,
    Diodes,
    Transistors,
    Connectors,
    Crystals,
    Switches,
    #[serde(rename = "Test Points")]
    TestPoints,
    #[serde(rename = "LEDs")]
    Leds,
    #[serde(rename = "Ferrite Beads")]
    FerriteBeads,
    Fuses,
    Transformers,
    Batteries,
    Power,
    Other,
}

const PREFIXES: &[(&str, Category)] = &[
    ("R", Category::Resistors),
    ("RN", Category::Resistors),
    ("C", Category::Capacitors),
    ("L", Category::Inductors),
    ("D", Category::Diodes),
    ("Q", Category::Transistors),
    ("U", Category::Ics),
    ("IC", Category::Ics),
    ("J", Category::Connectors),
    ("P", Category::Connectors),
    ("CN", Category::Connectors),
    ("Y", Category::Crystals),
    ("X", Category::Crystals),
    ("SW", Category::Switches),
    ("TP", Category::TestPoints),
    ("LED", Category::Leds),
    ("FB", Category::FerriteBeads),
    ("F", Category::Fuses),
    ("T", Category::Transformers),
    ("BT", Category::Batteries),
];

const LIBRARY_HINTS: &[(&str, Category)] = &[
    ("connector", Category::Connectors),
    ("switch", Category::Switches),
    ("led", Category::Leds),
    ("diode", Category::Diodes),
    ("transistor", Category::Transistors),
    ("crystal", Category::Crystals),
    ("oscillator", Category::Crystals),
    ("battery", Category::Batteries),
    ("fuse", Category::Fuses),
    ("inductor", Category::Inductors),
    ("transformer", Category::Transformers),
    ("power", Category::Power),
];

impl Category {
    pub const ALL: [Category; 17] = [
        Category::Ics,
        Category::Resistors,
        Category::Capacitors,
        Category::Inductors,
        Category::Diodes,
        Category::Transistors,
        Category::Connectors,
        Category::Crystals,
        Category::Switches,
        Category::TestPoints,
        Category::Leds,
        Category::FerriteBeads,
        Category::Fuses,
        Category::Transformers,
        Category::Batteries,
        Category::Power,
        Category::Other,
    ];

    /// Classify a component. Total: always returns a category.
    pub fn classify(reference: &str, lib_id: &str) -> Category {
        if reference.starts_with('#') {
            return Category::Power;
        }
        let from_reference = Self::from_prefix(reference);
        if from_reference != Category::Other {
            return from_reference;
        }

        let (library, symbol) = lib_id.split_once(':').unwrap_or(("", lib_id));
        let from_symbol = Self::from_prefix(symbol);
        if from_symbol != Category::Other {
            return from_symbol;
        }
        let library = library.to_ascii_lowercase();
        LIBRARY_HINTS
            .iter()
            .find(|(hint, _)| library.contains(hint))
            .map_or(Category::Other, |(_, category)| *category)
    }

    /// Category for the alphabetic prefix of `designator` (`R12` -> `R`).
    fn from_prefix(designator: &str) -> Category {
        let prefix: String = designator
            .chars()
            .take_while(|c| c.is_ascii_alphabetic())
            .map(|c| c.to_ascii_uppercase())
            .collect();
        PREFIXES
            .iter()
            .find(|(p, _)| *p == prefix)
            .map_or(Category::Other, |(_, category)| *category)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Ics => "ICs",
            Category::Resistors => "Resistors",
            Category::Capacitors => "Capacitors",
            Category::Inductors => "Inductors",
            Category::Diodes => "Diodes",
            Category::Transistors => "Transistors",
            Category::Connectors => "Connectors",
            Category::Crystals => "Crystals",
            Category::Switches => "Switches",
            Category::TestPoints => "Test Points",
            Category::Leds => "LEDs",
            Category::FerriteBeads => "Ferrite Beads",
            Category::Fuses => "Fuses",
            Category::Transformers => "Transformers",
            Category::Batteries => "Batteries",
            Category::Power => "Power",
            Category::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    /// Case-insensitive; spaces, dashes and underscores are ignored, so
    /// `test-points`, `Test Points` and `testpoints` all match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = normalize(s);
        Category::ALL
            .iter()
            .find(|c| normalize(c.as_str()) == wanted)
            .copied()
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_prefixes() {
        assert_eq!(Category::classify("U1", "MCU:STM32"), Category::Ics);
        assert_eq!(Category::classify("IC3", ""), Category::Ics);
        assert_eq!(Category::classify("R10", "Device:R"), Category::Resistors);
        assert_eq!(Category::classify("C2", "Device:C"), Category::Capacitors);
        assert_eq!(Category::classify("SW1", ""), Category::Switches);
        assert_eq!(Category::classify("LED4", ""), Category::Leds);
        assert_eq!(Category::classify("TP7", ""), Category::TestPoints);
        assert_eq!(Category::classify("BT1", ""), Category::Batteries);
        assert_eq!(Category::classify("#PWR01", "power:GND"), Category::Power);
    }

    #[test]
    fn test_library_fallback() {
        assert_eq!(Category::classify("M1", "Device:LED"), Category::Leds);
        assert_eq!(
            Category::classify("H1", "Connector_Generic:Conn_01x02"),
            Category::Connectors
        );
        assert_eq!(Category::classify("MH1", "Mechanical:MountingHole"), Category::Other);
        assert_eq!(Category::classify("", ""), Category::Other);
    }

    #[test]
    fn test_parse_category() {
        assert_eq!("ics".parse::<Category>(), Ok(Category::Ics));
        assert_eq!("test-points".parse::<Category>(), Ok(Category::TestPoints));
        assert_eq!("Ferrite Beads".parse::<Category>(), Ok(Category::FerriteBeads));
        assert!("gizmos".parse::<Category>().is_err());
    }

    #[test]
    fn test_serde_uses_display_names() {
        assert_eq!(serde_json::to_string(&Category::Ics).unwrap(), "\"ICs\"");
        assert_eq!(serde_json::to_string(&Category::TestPoints).unwrap(), "\"Test Points\"");
    }
}
