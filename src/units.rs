//! Plain value types for physical quantities and sky positions.
//!
//! Only parsing and formatting live here. Unit conversion and frame
//! transformations are left to whoever consumes the values.

use std::fmt;

/// Tolerance used when comparing angles, in degrees (~36 micro-arcseconds).
const ANGLE_TOLERANCE_DEG: f64 = 1e-8;

/// Default reference frame when a configuration does not name one.
pub const DEFAULT_FRAME: &str = "icrs";

// ---------------------------------------------------------------------------
// Quantity
// ---------------------------------------------------------------------------

/// A number paired with its unit text, e.g. `"140 pc"`.
#[derive(Debug, Clone, PartialEq)]
pub struct Quantity {
    pub value: f64,
    /// Unit as written; empty for dimensionless values.
    pub unit: String,
}

impl Quantity {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: unit.into(),
        }
    }

    /// Parse `"<number> <unit>"` or `"<number><unit>"`. The longest leading
    /// number wins (`"1e5pc"` is `1e5 pc`). A bare number is dimensionless.
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let numeric = text
            .find(|c: char| !(c.is_ascii_digit() || "+-.eE".contains(c)))
            .unwrap_or(text.len());
        let (value, split) = (1..=numeric)
            .rev()
            .find_map(|i| text[..i].parse::<f64>().ok().map(|v| (v, i)))?;
        Some(Self::new(value, text[split..].trim()))
    }

    pub fn is_dimensionless(&self) -> bool {
        self.unit.is_empty()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{}", self.value)
        } else {
            write!(f, "{} {}", self.value, self.unit)
        }
    }
}

// ---------------------------------------------------------------------------
// Angle
// ---------------------------------------------------------------------------

/// An angle stored in degrees.
///
/// Equality is approximate: two angles are equal when they differ by less
/// than `1e-8` degree, so values survive a trip through sexagesimal text.
#[derive(Debug, Clone, Copy)]
pub struct Angle {
    degrees: f64,
}

impl PartialEq for Angle {
    fn eq(&self, other: &Self) -> bool {
        (self.degrees - other.degrees).abs() < ANGLE_TOLERANCE_DEG
    }
}

impl Angle {
    pub fn from_degrees(degrees: f64) -> Self {
        Self { degrees }
    }

    pub fn from_hours(hours: f64) -> Self {
        Self {
            degrees: hours * 15.0,
        }
    }

    pub fn degrees(&self) -> f64 {
        self.degrees
    }

    pub fn hours(&self) -> f64 {
        self.degrees / 15.0
    }

    /// Parse a right ascension.
    ///
    /// Accepts `05h34m31.9s`, `05:34:31.9` (hours), `83.63deg` and a bare
    /// number of degrees.
    pub fn parse_ra(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.contains('h') {
            sexagesimal(text, &['h', 'm', 's']).map(Self::from_hours)
        } else if text.contains(':') {
            sexagesimal(text, &[':', ':']).map(Self::from_hours)
        } else {
            decimal_degrees(text).map(Self::from_degrees)
        }
    }

    /// Parse a declination.
    ///
    /// Accepts `+22d00m52s`, `22:00:52`, `22.01deg` and a bare number of
    /// degrees.
    pub fn parse_dec(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.contains('d') && !text.ends_with("deg") {
            sexagesimal(text, &['d', 'm', 's']).map(Self::from_degrees)
        } else if text.contains(':') {
            sexagesimal(text, &[':', ':']).map(Self::from_degrees)
        } else {
            decimal_degrees(text).map(Self::from_degrees)
        }
    }

    /// Format as `HHhMMmSS.ssssss`.
    pub fn to_hms(&self) -> String {
        let (sign, h, m, s) = split_sexagesimal(self.hours());
        format!("{sign}{h:02}h{m:02}m{s:09.6}s")
    }

    /// Format as `+DDdMMmSS.ssssss`.
    pub fn to_dms(&self) -> String {
        let (sign, d, m, s) = split_sexagesimal(self.degrees);
        let sign = if sign.is_empty() { "+" } else { sign };
        format!("{sign}{d:02}d{m:02}m{s:09.6}s")
    }
}

fn decimal_degrees(text: &str) -> Option<f64> {
    text.strip_suffix("deg")
        .unwrap_or(text)
        .trim()
        .parse::<f64>()
        .ok()
}

/// Parse `[+-]A<sep>B<sep>C[<sep>]` into `A + B/60 + C/3600`, keeping the
/// sign of the leading field.
fn sexagesimal(text: &str, separators: &[char]) -> Option<f64> {
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let mut fields = Vec::with_capacity(3);
    let mut rest = body;
    for sep in separators {
        match rest.split_once(*sep) {
            Some((field, tail)) => {
                fields.push(field);
                rest = tail;
            }
            None => break,
        }
    }
    if !rest.is_empty() {
        fields.push(rest);
    }
    if fields.is_empty() || fields.len() > 3 {
        return None;
    }

    let mut total = 0.0;
    for (field, scale) in fields.iter().zip([1.0, 60.0, 3600.0]) {
        let value = field.trim().parse::<f64>().ok()?;
        if value < 0.0 {
            return None;
        }
        total += value / scale;
    }
    Some(if negative { -total } else { total })
}

/// Split a decimal value into sign, whole units, minutes and seconds with
/// the seconds rounded to microsecond precision (carries propagated).
fn split_sexagesimal(value: f64) -> (&'static str, u64, u64, f64) {
    let sign = if value < 0.0 { "-" } else { "" };
    let micros = (value.abs() * 3_600_000_000.0).round() as u64;
    let units = micros / 3_600_000_000;
    let minutes = (micros / 60_000_000) % 60;
    let seconds = (micros % 60_000_000) as f64 / 1_000_000.0;
    (sign, units, minutes, seconds)
}

// ---------------------------------------------------------------------------
// SkyPosition
// ---------------------------------------------------------------------------

/// A longitude/latitude pair in a named reference frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyPosition {
    pub ra: Angle,
    pub dec: Angle,
    /// Frame name, lower-cased (`icrs`, `fk5`, `galactic`, ...).
    pub frame: String,
}

impl SkyPosition {
    pub fn new(ra: Angle, dec: Angle, frame: impl Into<String>) -> Self {
        Self {
            ra,
            dec,
            frame: frame.into().to_ascii_lowercase(),
        }
    }

    /// Parse the textual right ascension and declination of a position.
    pub fn parse(ra: &str, dec: &str, frame: Option<&str>) -> Option<Self> {
        Some(Self::new(
            Angle::parse_ra(ra)?,
            Angle::parse_dec(dec)?,
            frame.unwrap_or(DEFAULT_FRAME).trim(),
        ))
    }
}

impl fmt::Display for SkyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.ra.to_hms(), self.dec.to_dms(), self.frame)
    }
}
