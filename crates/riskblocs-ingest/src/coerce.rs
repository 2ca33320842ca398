//! Cell coercion: spreadsheet cells → typed loan attributes.
//!
//! Every parser returns a [`Coerced`] so callers can tell "blank" from
//! "present but garbage". Garbage is never turned into zero.

use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};

/// A raw cell as read from a worksheet or CSV file.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
}

impl CellValue {
    /// Blank, whitespace-only, or an explicit no-data marker.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Empty => true,
            Self::Text(s) => is_no_data(s),
            Self::Number(_) | Self::Bool(_) => false,
        }
    }

    /// Text rendering used for headers and text attributes.
    ///
    /// Integral numbers print without a fractional part so that numeric
    /// loan ids read back as `12345`, not `12345.0`.
    #[must_use]
    pub fn as_text(&self) -> Option<String> {
        match self {
            Self::Empty => None,
            Self::Text(s) => {
                let t = s.trim();
                (!t.is_empty()).then(|| t.to_string())
            }
            Self::Number(n) => Some(format_number(*n)),
            Self::Bool(b) => Some(b.to_string()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        if s.is_empty() {
            Self::Empty
        } else {
            Self::Text(s.to_string())
        }
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

/// Outcome of coercing one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced<T> {
    Value(T),
    Empty,
    /// Present but unparseable; carries the offending text.
    Invalid(String),
}

impl<T> Coerced<T> {
    #[must_use]
    pub fn value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::Empty | Self::Invalid(_) => None,
        }
    }

    fn map<U>(self, f: impl FnOnce(T) -> Coerced<U>) -> Coerced<U> {
        match self {
            Self::Value(v) => f(v),
            Self::Empty => Coerced::Empty,
            Self::Invalid(s) => Coerced::Invalid(s),
        }
    }
}

const NO_DATA_MARKERS: [&str; 9] = ["-", "--", "n/a", "na", "null", "none", "#n/a", "nd", "—"];

fn is_no_data(s: &str) -> bool {
    let t = s.trim();
    t.is_empty() || NO_DATA_MARKERS.iter().any(|m| t.eq_ignore_ascii_case(m))
}

#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

static THOUSANDS_COMMA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{1,3}(,\d{3})+(\.\d+)?$").expect("valid thousands regex"));
static CURRENCY_CODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(eur|usd|gbp|chf)\b").expect("valid currency code regex"));

/// Parsed numeric text plus whether it carried a `%` sign.
fn parse_numeric_text(raw: &str) -> Option<(Decimal, bool)> {
    let mut s = raw.trim().to_string();
    let mut negative = false;
    if s.starts_with('(') && s.ends_with(')') && s.len() > 2 {
        negative = true;
        s = s[1..s.len() - 1].to_string();
    }
    s = CURRENCY_CODE_RE.replace_all(&s, "").into_owned();
    let percent = s.trim_end().ends_with('%');
    s.retain(|c| !matches!(c, '%' | '€' | '$' | '£' | ' ' | '\u{a0}' | '\'' | '_'));
    if let Some(rest) = s.strip_prefix('-') {
        negative = !negative;
        s = rest.to_string();
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest.to_string();
    }
    if s.is_empty() {
        return None;
    }

    let normalised = match (s.rfind(','), s.rfind('.')) {
        // 1.234,56 → European grouping with decimal comma
        (Some(c), Some(d)) if c > d => s.replace('.', "").replace(',', "."),
        // 1,234.56
        (Some(_), Some(_)) => s.replace(',', ""),
        (Some(_), None) if THOUSANDS_COMMA_RE.is_match(&s) => s.replace(',', ""),
        // 5,25 → decimal comma
        (Some(_), None) => s.replace(',', "."),
        _ => s,
    };

    let value = if normalised.contains(['e', 'E']) {
        Decimal::from_scientific(&normalised).ok()?
    } else {
        Decimal::from_str(&normalised).ok()?
    };
    Some((if negative { -value } else { value }, percent))
}

fn number_to_decimal(n: f64) -> Option<Decimal> {
    if n.is_finite() {
        Decimal::from_f64(n).map(|d| d.normalize())
    } else {
        None
    }
}

/// Parse a money or plain numeric cell.
#[must_use]
pub fn parse_decimal(cell: &CellValue) -> Coerced<Decimal> {
    if cell.is_blank() {
        return Coerced::Empty;
    }
    match cell {
        CellValue::Number(n) => number_to_decimal(*n)
            .map_or_else(|| Coerced::Invalid(n.to_string()), Coerced::Value),
        CellValue::Text(s) => parse_numeric_text(s)
            .map_or_else(|| Coerced::Invalid(s.trim().to_string()), |(d, _)| Coerced::Value(d)),
        CellValue::Bool(b) => Coerced::Invalid(b.to_string()),
        CellValue::Empty => Coerced::Empty,
    }
}

/// Parse a rate or ratio into percent.
///
/// A value written with `%` is taken as-is. Otherwise a magnitude below 1
/// is read as a fraction (`0.0525` → `5.25`), which is how spreadsheet
/// percentage formats arrive. `1` and above are already percent.
#[must_use]
pub fn parse_percent(cell: &CellValue) -> Coerced<Decimal> {
    if cell.is_blank() {
        return Coerced::Empty;
    }
    let (value, marked) = match cell {
        CellValue::Number(n) => match number_to_decimal(*n) {
            Some(d) => (d, false),
            None => return Coerced::Invalid(n.to_string()),
        },
        CellValue::Text(s) => match parse_numeric_text(s) {
            Some(parsed) => parsed,
            None => return Coerced::Invalid(s.trim().to_string()),
        },
        CellValue::Bool(b) => return Coerced::Invalid(b.to_string()),
        CellValue::Empty => return Coerced::Empty,
    };
    if !marked && value.abs() < Decimal::ONE {
        Coerced::Value((value * Decimal::ONE_HUNDRED).normalize())
    } else {
        Coerced::Value(value)
    }
}

/// Parse a non-negative whole number (terms, scores, days).
#[must_use]
pub fn parse_integer(cell: &CellValue) -> Coerced<u32> {
    parse_decimal(cell).map(|d| {
        if !d.fract().is_zero() || d.is_sign_negative() && !d.is_zero() {
            return Coerced::Invalid(d.to_string());
        }
        d.to_u32()
            .map_or_else(|| Coerced::Invalid(d.to_string()), Coerced::Value)
    })
}

/// Parse a text attribute.
#[must_use]
pub fn parse_text(cell: &CellValue) -> Coerced<String> {
    if cell.is_blank() {
        return Coerced::Empty;
    }
    cell.as_text().map_or(Coerced::Empty, Coerced::Value)
}

const DATE_FORMATS: [&str; 8] = [
    "%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d", "%d-%m-%Y", "%d %B %Y", "%d %b %Y", "%B %d, %Y",
];

/// Largest serial Excel can display (9999-12-31).
const EXCEL_MAX_SERIAL: f64 = 2_958_465.0;

/// Convert an Excel 1900-system serial to a date.
///
/// The base is 1899-12-30, which absorbs Excel's phantom 1900-02-29.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !(1.0..=EXCEL_MAX_SERIAL).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(Duration::days(serial.floor() as i64))
}

/// Parse a date from common tape spellings or an Excel serial.
#[must_use]
pub fn parse_date(cell: &CellValue) -> Coerced<NaiveDate> {
    if cell.is_blank() {
        return Coerced::Empty;
    }
    match cell {
        CellValue::Number(n) => excel_serial_to_date(*n)
            .map_or_else(|| Coerced::Invalid(n.to_string()), Coerced::Value),
        CellValue::Text(s) => parse_date_text(s)
            .map_or_else(|| Coerced::Invalid(s.trim().to_string()), Coerced::Value),
        CellValue::Bool(b) => Coerced::Invalid(b.to_string()),
        CellValue::Empty => Coerced::Empty,
    }
}

/// Date text parser shared with the PDF scraper.
#[must_use]
pub fn parse_date_text(raw: &str) -> Option<NaiveDate> {
    let s = raw.trim();
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    // "2024-03-31T00:00:00" / "2024-03-31 00:00:00"
    if s.len() > 10 && s.is_char_boundary(10) {
        if let Ok(d) = NaiveDate::parse_from_str(&s[..10], "%Y-%m-%d") {
            return Some(d);
        }
    }
    if s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return s.parse::<f64>().ok().and_then(excel_serial_to_date);
    }
    None
}
