//! Exact schematic geometry.
//!
//! KiCad stores schematic coordinates in millimetres with at most four
//! decimal places, i.e. on a 0.0001 mm grid. Every coordinate is decoded
//! straight into that grid as an `i64` so that coincidence tests are plain
//! integer equality and never depend on floating-point rounding.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Grid units per millimetre.
pub const UNITS_PER_MM: i64 = 10_000;

const FRACTION_DIGITS: usize = 4;

/// Decode a decimal token such as `-12.7` or `101.6000` into grid units.
///
/// Digits beyond the fourth decimal place round half away from zero on the
/// fifth digit. Exponents, empty tokens and stray characters are rejected.
pub fn parse_fixed(token: &str) -> Option<i64> {
    let (negative, body) = match token.as_bytes().first()? {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };
    let (int_part, frac_part) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.bytes().all(|b| b.is_ascii_digit()) || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut value: i64 = 0;
    for b in int_part.bytes() {
        value = value.checked_mul(10)?.checked_add(i64::from(b - b'0'))?;
    }
    let frac = frac_part.as_bytes();
    for i in 0..FRACTION_DIGITS {
        let digit = frac.get(i).map(|b| i64::from(b - b'0')).unwrap_or(0);
        value = value.checked_mul(10)?.checked_add(digit)?;
    }
    if frac.get(FRACTION_DIGITS).is_some_and(|b| *b >= b'5') {
        value = value.checked_add(1)?;
    }

    Some(if negative { -value } else { value })
}

/// Render grid units back as millimetres without trailing zeros.
pub fn format_fixed(value: i64) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let abs = value.unsigned_abs();
    let int = abs / UNITS_PER_MM as u64;
    let frac = abs % UNITS_PER_MM as u64;
    if frac == 0 {
        format!("{sign}{int}")
    } else {
        let digits = format!("{:04}", frac);
        format!("{sign}{int}.{}", digits.trim_end_matches('0'))
    }
}

/// A point on the schematic grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Build a point from millimetre tokens, e.g. `Point::parse("10.16", "-2.54")`.
    pub fn parse(x: &str, y: &str) -> Option<Self> {
        Some(Self {
            x: parse_fixed(x)?,
            y: parse_fixed(y)?,
        })
    }

    pub fn offset(self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// True if `self` lies on the closed segment `a`–`b`.
    ///
    /// Exact: uses the integer cross product for collinearity and a bounding
    /// box test for extent. A degenerate segment contains only its endpoint.
    pub fn on_segment(self, a: Point, b: Point) -> bool {
        let cross = (i128::from(b.x) - i128::from(a.x)) * (i128::from(self.y) - i128::from(a.y))
            - (i128::from(b.y) - i128::from(a.y)) * (i128::from(self.x) - i128::from(a.x));
        cross == 0
            && self.x >= a.x.min(b.x)
            && self.x <= a.x.max(b.x)
            && self.y >= a.y.min(b.y)
            && self.y <= a.y.max(b.y)
    }
}

impl std::ops::Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", format_fixed(self.x), format_fixed(self.y))
    }
}

/// Mirror applied to a placed symbol, as written in `(mirror x|y)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mirror {
    /// Mirror about the X axis (flips vertically).
    X,
    /// Mirror about the Y axis (flips horizontally).
    Y,
}

/// Placement transform of a symbol instance: quarter turns plus an optional
/// mirror.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Orientation {
    /// Counter-clockwise quarter turns, 0..=3.
    pub quarter_turns: u8,
    pub mirror: Option<Mirror>,
}

impl Orientation {
    /// Build from an angle in grid units of degrees (`90` is `900000`).
    /// Returns `None` for angles that are not a multiple of 90°.
    pub fn from_fixed_degrees(angle: i64, mirror: Option<Mirror>) -> Option<Self> {
        let quarter = 90 * UNITS_PER_MM;
        if angle % quarter != 0 {
            return None;
        }
        let turns = (angle / quarter).rem_euclid(4) as u8;
        Some(Self {
            quarter_turns: turns,
            mirror,
        })
    }

    /// Map a library-local pin offset (Y up) to a schematic offset (Y down).
    ///
    /// The Y flip comes first, then the rotation, then the mirror.
    pub fn apply(&self, local: Point) -> Point {
        let mut x = local.x;
        let mut y = -local.y;
        for _ in 0..self.quarter_turns {
            let (nx, ny) = (y, -x);
            x = nx;
            y = ny;
        }
        match self.mirror {
            Some(Mirror::X) => y = -y,
            Some(Mirror::Y) => x = -x,
            None => {}
        }
        Point { x, y }
    }
}
