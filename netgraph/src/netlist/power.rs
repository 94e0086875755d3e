//! Power rail naming conventions.

const KEYWORDS: &[&str] = &[
    "VCC", "VDD", "VSS", "VEE", "GND", "DGND", "AGND", "PGND", "VBAT", "VBUS", "VIN", "VOUT", "AVDD",
    "AVSS", "AVCC", "DVDD", "DVCC", "PVDD", "VDDIO", "VCCIO", "VCORE", "VREF", "VDDA", "VSSA",
];

/// True if `name` follows a recognised power rail convention: a rail keyword
/// (`VCC`, `GND`, `VBUS`, ...) or a voltage such as `+5V`, `3V3`, `-12V`.
///
/// Any hierarchical sheet path is ignored, so `/Power/+3V3` qualifies.
pub fn is_power_name(name: &str) -> bool {
    let leaf = leaf_name(name).to_ascii_uppercase();
    if leaf.is_empty() {
        return false;
    }
    KEYWORDS.iter().any(|k| leaf.contains(k)) || rail_voltage(&leaf).is_some()
}

/// Voltage encoded in a rail name: `+5V` -> 5.0, `3V3` -> 3.3, `-12V` ->
/// -12.0, `1.8V` -> 1.8. Names without a voltage give `None`.
pub fn rail_voltage(name: &str) -> Option<f64> {
    let leaf = leaf_name(name).to_ascii_uppercase();
    let bytes = leaf.as_bytes();

    for (v_pos, _) in leaf.match_indices('V') {
        let mut start = v_pos;
        while start > 0 && (bytes[start - 1].is_ascii_digit() || bytes[start - 1] == b'.') {
            start -= 1;
        }
        if start == v_pos {
            continue;
        }
        // Reject things like `NET5V` where the number is part of a word.
        let sign = match start.checked_sub(1).map(|i| bytes[i]) {
            None => 1.0,
            Some(b'+') => 1.0,
            Some(b'-') => -1.0,
            Some(b'_') | Some(b'/') => 1.0,
            Some(_) => continue,
        };

        let mut end = v_pos + 1;
        while end < bytes.len() && bytes[end].is_ascii_digit() {
            end += 1;
        }
        let whole = &leaf[start..v_pos];
        let fraction = &leaf[v_pos + 1..end];
        // Trailing letters after `3V3x` mean this is not a rail name.
        if end < bytes.len() && bytes[end].is_ascii_alphanumeric() {
            continue;
        }
        let text = if fraction.is_empty() {
            whole.to_string()
        } else if whole.contains('.') {
            continue;
        } else {
            format!("{whole}.{fraction}")
        };
        let Ok(value) = text.parse::<f64>() else {
            continue;
        };
        if value > 0.0 && value <= 60.0 {
            return Some(sign * value);
        }
    }
    None
}

/// Last segment of a hierarchical net name: `/Sub/CLK` -> `CLK`.
pub fn leaf_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}
