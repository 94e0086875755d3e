pub mod builder;
pub mod category;
pub mod schema;

pub use builder::{ModelError, NoSheets, SchematicBuilder, SheetLoadError, SheetLoader, MAX_SHEET_DEPTH};
pub use category::Category;
pub use schema::*;

use std::cmp::Ordering;

/// Natural ordering for designators and pin numbers: digit runs compare by
/// value, so `R2 < R10` and `A9 < A10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks(a);
    let mut right = Chunks(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) => {
                let ord = match (is_digits(x), is_digits(y)) {
                    (true, true) => {
                        let xs = x.trim_start_matches('0');
                        let ys = y.trim_start_matches('0');
                        xs.len().cmp(&ys.len()).then_with(|| xs.cmp(ys))
                    }
                    _ => x.cmp(y),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    s.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

/// Alternating runs of digits and non-digits.
struct Chunks<'a>(&'a str);

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.0.as_bytes().first()?;
        let digit = first.is_ascii_digit();
        let end = self
            .0
            .bytes()
            .position(|b| b.is_ascii_digit() != digit)
            .unwrap_or(self.0.len());
        let (chunk, rest) = self.0.split_at(end);
        self.0 = rest;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_natural_cmp() {
        let mut refs = vec!["R10", "U1", "R2", "C1", "R1", "R02"];
        refs.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(refs, vec!["C1", "R1", "R02", "R2", "R10", "U1"]);
    }

    #[test]
    fn test_natural_cmp_pin_numbers() {
        let mut pins = vec!["10", "2", "A1", "1", "B2", "A10"];
        pins.sort_by(|a, b| natural_cmp(a, b));
        assert_eq!(pins, vec!["1", "2", "10", "A1", "A10", "B2"]);
    }
}
