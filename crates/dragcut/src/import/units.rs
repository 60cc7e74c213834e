use serde::{Deserialize, Serialize};

/// Physical length units a drawing may be expressed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthUnit {
    Millimeter,
    Centimeter,
    Meter,
    Inch,
    Foot,
    Point,
    Pica,
    /// CSS pixel, 96 per inch.
    Pixel,
}

impl LengthUnit {
    pub fn to_mm(self) -> f64 {
        match self {
            LengthUnit::Millimeter => 1.0,
            LengthUnit::Centimeter => 10.0,
            LengthUnit::Meter => 1000.0,
            LengthUnit::Inch => 25.4,
            LengthUnit::Foot => 304.8,
            LengthUnit::Point => 25.4 / 72.0,
            LengthUnit::Pica => 25.4 / 6.0,
            LengthUnit::Pixel => 25.4 / 96.0,
        }
    }

    /// Unit for a CSS/SVG length suffix.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "mm" => Some(LengthUnit::Millimeter),
            "cm" => Some(LengthUnit::Centimeter),
            "in" => Some(LengthUnit::Inch),
            "pt" => Some(LengthUnit::Point),
            "pc" => Some(LengthUnit::Pica),
            "px" => Some(LengthUnit::Pixel),
            _ => None,
        }
    }
}

/// A length attribute split into its number and unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Length {
    /// Bare number, i.e. user units.
    User(f64),
    Absolute(f64, LengthUnit),
    Percent(f64),
}

/// Parse an SVG length such as `210mm`, `8.5in`, `100` or `50%`.
pub fn parse_length(text: &str) -> Option<Length> {
    let text = text.trim();
    let split = text
        .find(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E' || c == '%')
        .unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);
    let value: f64 = number.trim().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    match suffix.trim() {
        "" => Some(Length::User(value)),
        "%" => Some(Length::Percent(value)),
        other => LengthUnit::from_suffix(other).map(|unit| Length::Absolute(value, unit)),
    }
}
