//! Best-effort PDF text scraper for offering circulars and investor reports.
//!
//! This is not a PDF parser. It walks the raw file for `stream … endstream`
//! bodies, inflates `/FlateDecode` ones, and replays the text-showing
//! operators (`Tj`, `'`, `"`, `TJ`) into lines. Pool-level figures are then
//! pulled out of those lines with keyword regexes.
//!
//! Anything that cannot be read is skipped and noted in
//! [`PdfExtraction::warnings`]; a figure that cannot be parsed is left
//! empty, never zero.

use std::io::Read;

use chrono::NaiveDate;
use flate2::read::ZlibDecoder;
use once_cell::sync::Lazy;
use regex::Regex;
use riskblocs_types::constants::PDF_TJ_SPACE_THRESHOLD;
use riskblocs_types::{Result, RiskblocsError};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::coerce::{CellValue, Coerced, parse_date_text, parse_decimal};

/// Bytes searched for the `%PDF-` signature.
const HEADER_WINDOW: usize = 1024;

/// One `Class …` line from a capital-structure table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedTranche {
    pub name: String,
    pub size: Option<Decimal>,
    pub coupon_pct: Option<Decimal>,
}

/// Figures scraped from one PDF.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PdfExtraction {
    pub issuer: Option<String>,
    pub currency: Option<String>,
    pub cut_off_date: Option<NaiveDate>,
    pub pool_balance: Option<Decimal>,
    pub loan_count: Option<u32>,
    /// Percent.
    pub wa_interest_rate: Option<Decimal>,
    /// Months.
    pub wa_remaining_term: Option<Decimal>,
    pub tranches: Vec<ExtractedTranche>,
    /// Reconstructed text lines.
    #[serde(skip_serializing)]
    pub lines: Vec<String>,
    pub warnings: Vec<String>,
}

impl PdfExtraction {
    /// Names of the populated figures.
    #[must_use]
    pub fn found_fields(&self) -> Vec<&'static str> {
        let mut found = Vec::new();
        if self.issuer.is_some() {
            found.push("issuer");
        }
        if self.currency.is_some() {
            found.push("currency");
        }
        if self.cut_off_date.is_some() {
            found.push("cut_off_date");
        }
        if self.pool_balance.is_some() {
            found.push("pool_balance");
        }
        if self.loan_count.is_some() {
            found.push("loan_count");
        }
        if self.wa_interest_rate.is_some() {
            found.push("wa_interest_rate");
        }
        if self.wa_remaining_term.is_some() {
            found.push("wa_remaining_term");
        }
        if !self.tranches.is_empty() {
            found.push("tranches");
        }
        found
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.found_fields().is_empty()
    }
}

/// Stateless scraper. See the module docs for what it can read.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfScraper;

impl PdfScraper {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Scrape text and pool figures from raw PDF bytes.
    ///
    /// # Errors
    /// - `InvalidPdf` if the `%PDF-` signature is absent
    /// - `PdfNoText` if no text could be reconstructed
    pub fn extract(&self, bytes: &[u8]) -> Result<PdfExtraction> {
        let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
        if find(window, b"%PDF-", 0).is_none() {
            return Err(RiskblocsError::InvalidPdf {
                reason: "missing %PDF- signature".into(),
            });
        }

        let mut out = PdfExtraction::default();
        let streams = collect_streams(bytes, &mut out.warnings);

        let mut text = TextBuilder::default();
        if streams.is_empty() {
            text.run(bytes);
        } else {
            for content in &streams {
                text.run(content);
                text.break_line();
            }
        }
        out.lines = text.finish();

        if out.lines.is_empty() {
            return Err(RiskblocsError::PdfNoText);
        }

        extract_fields(&mut out);
        tracing::info!(
            streams = streams.len(),
            lines = out.lines.len(),
            found = ?out.found_fields(),
            warnings = out.warnings.len(),
            "Scraped PDF"
        );
        Ok(out)
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}

fn rfind(haystack: &[u8], needle: &[u8], before: usize) -> Option<usize> {
    haystack[..before.min(haystack.len())]
        .windows(needle.len())
        .rposition(|w| w == needle)
}

fn contains(haystack: &[u8], needle: &str) -> bool {
    find(haystack, needle.as_bytes(), 0).is_some()
}

// ---------------------------------------------------------------------------
// Streams
// ---------------------------------------------------------------------------

/// Decoded bodies of every stream that may carry page content.
fn collect_streams(bytes: &[u8], warnings: &mut Vec<String>) -> Vec<Vec<u8>> {
    let mut streams = Vec::new();
    let mut pos = 0;

    while let Some(kw) = find(bytes, b"stream", pos) {
        // "endstream" also contains "stream".
        if kw >= 3 && &bytes[kw - 3..kw] == b"end" {
            pos = kw + 6;
            continue;
        }
        let mut start = kw + 6;
        if bytes.get(start) == Some(&b'\r') {
            start += 1;
        }
        if bytes.get(start) == Some(&b'\n') {
            start += 1;
        }
        let Some(end) = find(bytes, b"endstream", start) else {
            warnings.push(format!("unterminated stream at byte {kw}"));
            break;
        };
        pos = end + 9;

        let dict_start = rfind(bytes, b"obj", kw).unwrap_or(0);
        let dict = &bytes[dict_start..kw];
        let body = &bytes[start..end];

        if contains(dict, "/Image") || contains(dict, "/DCTDecode") || contains(dict, "/JPXDecode") {
            continue;
        }
        if contains(dict, "/FlateDecode") {
            let mut decoded = Vec::new();
            match ZlibDecoder::new(body).read_to_end(&mut decoded) {
                Ok(_) => streams.push(decoded),
                Err(e) => warnings.push(format!("skipped stream at byte {kw}: inflate failed: {e}")),
            }
        } else if contains(dict, "/Filter") {
            warnings.push(format!("skipped stream at byte {kw}: unsupported filter"));
        } else {
            streams.push(trim_eol(body).to_vec());
        }
    }
    streams
}

fn trim_eol(body: &[u8]) -> &[u8] {
    let body = body.strip_suffix(b"\n").unwrap_or(body);
    body.strip_suffix(b"\r").unwrap_or(body)
}

// ---------------------------------------------------------------------------
// Content lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Text(String),
    Number(f64),
    Array(Vec<Operand>),
    Other,
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%')
}

fn is_regular(b: u8) -> bool {
    !b.is_ascii_whitespace() && b != 0 && !is_delimiter(b)
}

struct Lexer<'a> {
    src: &'a [u8],
    pos: usize,
}

enum Token {
    Operand(Operand),
    Operator(String),
    ArrayEnd,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a [u8]) -> Self {
        Self { src, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn skip_space(&mut self) {
        while let Some(b) = self.peek() {
            if b.is_ascii_whitespace() || b == 0 {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(c) = self.peek() {
                    if c == b'\n' || c == b'\r' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn next_token(&mut self) -> Option<Token> {
        self.skip_space();
        let b = self.peek()?;
        let token = match b {
            b'(' => {
                self.pos += 1;
                Token::Operand(Operand::Text(decode_text(&self.literal())))
            }
            b'<' if self.src.get(self.pos + 1) == Some(&b'<') => {
                self.pos += 2;
                Token::Operand(Operand::Other)
            }
            b'<' => {
                self.pos += 1;
                Token::Operand(Operand::Text(decode_text(&self.hex())))
            }
            b'[' => {
                self.pos += 1;
                Token::Operand(Operand::Array(self.array()))
            }
            b']' => {
                self.pos += 1;
                Token::ArrayEnd
            }
            b'/' => {
                self.pos += 1;
                self.word();
                Token::Operand(Operand::Other)
            }
            b'>' | b')' | b'{' | b'}' => {
                self.pos += 1;
                Token::Operand(Operand::Other)
            }
            _ => {
                let word = self.word();
                if word.is_empty() {
                    self.pos += 1;
                    Token::Operand(Operand::Other)
                } else if let Some(n) = parse_number(&word) {
                    Token::Operand(Operand::Number(n))
                } else {
                    Token::Operator(String::from_utf8_lossy(&word).into_owned())
                }
            }
        };
        Some(token)
    }

    fn word(&mut self) -> Vec<u8> {
        let start = self.pos;
        while self.peek().is_some_and(is_regular) {
            self.pos += 1;
        }
        self.src[start..self.pos].to_vec()
    }

    fn array(&mut self) -> Vec<Operand> {
        let mut items = Vec::new();
        while let Some(token) = self.next_token() {
            match token {
                Token::ArrayEnd => break,
                Token::Operand(op) => items.push(op),
                Token::Operator(_) => items.push(Operand::Other),
            }
        }
        items
    }

    /// Body of a literal string; the opening `(` is already consumed.
    fn literal(&mut self) -> Vec<u8> {
        let mut out = Vec::new();
        let mut depth = 1usize;
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'\\' => self.escape(&mut out),
                b'(' => {
                    depth += 1;
                    out.push(b);
                }
                b')' => {
                    depth -= 1;
                    if depth == 0 {
                        break;
                    }
                    out.push(b);
                }
                _ => out.push(b),
            }
        }
        out
    }

    fn escape(&mut self, out: &mut Vec<u8>) {
        let Some(b) = self.peek() else { return };
        self.pos += 1;
        match b {
            b'n' => out.push(b'\n'),
            b'r' => out.push(b'\r'),
            b't' => out.push(b'\t'),
            b'b' => out.push(0x08),
            b'f' => out.push(0x0c),
            b'0'..=b'7' => {
                let mut value = u32::from(b - b'0');
                for _ in 0..2 {
                    match self.peek() {
                        Some(d @ b'0'..=b'7') => {
                            value = value * 8 + u32::from(d - b'0');
                            self.pos += 1;
                        }
                        _ => break,
                    }
                }
                out.push(u8::try_from(value & 0xff).unwrap_or(b'?'));
            }
            // Line continuation.
            b'\r' => {
                if self.peek() == Some(b'\n') {
                    self.pos += 1;
                }
            }
            b'\n' => {}
            other => out.push(other),
        }
    }

    /// Body of a hex string; the opening `<` is already consumed.
    fn hex(&mut self) -> Vec<u8> {
        let mut digits = Vec::new();
        while let Some(b) = self.peek() {
            self.pos += 1;
            if b == b'>' {
                break;
            }
            if b.is_ascii_hexdigit() {
                digits.push(b);
            }
        }
        if digits.len() % 2 == 1 {
            digits.push(b'0');
        }
        digits
            .chunks(2)
            .filter_map(|pair| {
                let s = std::str::from_utf8(pair).ok()?;
                u8::from_str_radix(s, 16).ok()
            })
            .collect()
    }
}

fn parse_number(word: &[u8]) -> Option<f64> {
    if !word
        .iter()
        .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.'))
    {
        return None;
    }
    std::str::from_utf8(word).ok()?.parse().ok()
}

/// UTF-16BE when BOM-prefixed, otherwise single-byte Latin-1 with the
/// Windows euro sign.
fn decode_text(raw: &[u8]) -> String {
    if let Some(body) = raw.strip_prefix(&[0xfe, 0xff]) {
        let units: Vec<u16> = body
            .chunks(2)
            .map(|c| u16::from_be_bytes([c[0], c.get(1).copied().unwrap_or(0)]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    raw.iter()
        .map(|&b| match b {
            0x80 => '€',
            b'\t' | b'\n' | b'\r' => ' ',
            _ => char::from(b),
        })
        .collect()
}

/// Replays text operators into lines.
#[derive(Default)]
struct TextBuilder {
    lines: Vec<String>,
    current: String,
    last_tm_y: Option<f64>,
}

impl TextBuilder {
    fn run(&mut self, content: &[u8]) {
        let mut lexer = Lexer::new(content);
        let mut operands: Vec<Operand> = Vec::new();

        while let Some(token) = lexer.next_token() {
            match token {
                Token::Operand(op) => operands.push(op),
                Token::ArrayEnd => {}
                Token::Operator(op) => {
                    self.operator(&op, &operands);
                    operands.clear();
                }
            }
        }
    }

    fn operator(&mut self, op: &str, operands: &[Operand]) {
        match op {
            "Tj" => self.show_last(operands),
            "'" | "\"" => {
                self.break_line();
                self.show_last(operands);
            }
            "TJ" => {
                if let Some(Operand::Array(items)) = operands.last() {
                    for item in items {
                        match item {
                            Operand::Text(s) => self.current.push_str(s),
                            #[allow(clippy::cast_precision_loss)]
                            Operand::Number(n) if *n < PDF_TJ_SPACE_THRESHOLD as f64 => {
                                self.current.push(' ');
                            }
                            _ => {}
                        }
                    }
                }
            }
            "T*" | "ET" => self.break_line(),
            "Td" | "TD" => {
                if let Some(Operand::Number(ty)) = operands.last() {
                    if *ty != 0.0 {
                        self.break_line();
                    }
                }
            }
            "Tm" => {
                if let Some(Operand::Number(y)) = operands.last() {
                    if self.last_tm_y.is_some_and(|prev| (prev - y).abs() > f64::EPSILON) {
                        self.break_line();
                    }
                    self.last_tm_y = Some(*y);
                }
            }
            _ => {}
        }
    }

    fn show_last(&mut self, operands: &[Operand]) {
        if let Some(Operand::Text(s)) = operands.last() {
            self.current.push_str(s);
        }
    }

    fn break_line(&mut self) {
        let line = self.current.split_whitespace().collect::<Vec<_>>().join(" ");
        if line.chars().any(char::is_alphanumeric) {
            self.lines.push(line);
        }
        self.current.clear();
    }

    fn finish(mut self) -> Vec<String> {
        self.break_line();
        self.lines
    }
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// A number whose thousands separator (space, apostrophe, comma or dot)
/// is always followed by exactly three digits, so adjacent figures in a
/// table row are not run together.
const GROUPED_NUMBER: &str = r"[0-9]{1,3}(?:[ ',.][0-9]{3})+(?:[.,][0-9]+)?\b|[0-9]+(?:[.,][0-9]+)?";
const CURRENCY_PREFIX: &str = r"((?:EUR|USD|GBP|CHF|€|\$|£)\s*)?";
const SCALE_SUFFIX: &str = r"\s*(billion|million|thousand|bn|mln|mn|mm|m|k)?\b";

static ISSUER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(?:issuer|originator|seller)(?:\s+name)?\s*[:\-]?\s+(.+)$")
        .expect("valid issuer regex")
});
static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:currency|denomination)\s*[:\-]?\s*(EUR|USD|GBP|CHF|SEK|NOK|DKK|PLN|JPY)\b")
        .expect("valid currency regex")
});
static CUT_OFF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\bcut[\s\-]?off(?:\s+date)?\s*[:\-]?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}[./\-]\d{1,2}[./\-]\d{4}|\d{1,2}\s+[a-z]+\s+\d{4}|[a-z]+\s+\d{1,2},\s+\d{4})",
    )
    .expect("valid cut-off regex")
});
static POOL_BALANCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:pool|portfolio|aggregate|outstanding)\s+(?:outstanding\s+)?(?:principal\s+)?balance\s*[:\-]?\s*{CURRENCY_PREFIX}({GROUPED_NUMBER}){SCALE_SUFFIX}"
    ))
    .expect("valid pool balance regex")
});
static LOAN_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:number|no\.?|count)\s+of\s+(?:loans|receivables|contracts|mortgages)\s*[:\-]?\s*({GROUPED_NUMBER})"))
        .expect("valid loan count regex")
});
static WA_RATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:weighted\s+average|w\.?\s?a\.?)\s+(?:current\s+)?(?:interest\s+rate|coupon)\s*[:\-]?\s*([0-9]+(?:[.,][0-9]+)?)\s*%?")
        .expect("valid WA rate regex")
});
static WA_TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:weighted\s+average|w\.?\s?a\.?)\s+(?:remaining\s+(?:term|maturity)|residual\s+(?:term|maturity))\s*[:\-]?\s*([0-9]+(?:[.,][0-9]+)?)\s*(years?|yrs?|months?|mths?)?")
        .expect("valid WA term regex")
});
static TRANCHE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)^class\s+([a-z][0-9]?)\b(?:\s+notes?)?\s*[:\-]?\s*{CURRENCY_PREFIX}({GROUPED_NUMBER}){SCALE_SUFFIX}"))
        .expect("valid tranche regex")
});
static PERCENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([0-9]+(?:\.[0-9]+)?)\s*%").expect("valid percent regex"));

fn number(raw: &str) -> Option<Decimal> {
    match parse_decimal(&CellValue::Text(raw.trim().to_string())) {
        Coerced::Value(v) => Some(v),
        Coerced::Empty | Coerced::Invalid(_) => None,
    }
}

fn multiplier(unit: Option<&str>) -> Decimal {
    match unit.map(str::to_lowercase).as_deref() {
        Some("k" | "thousand") => Decimal::from(1_000),
        Some("m" | "mn" | "mm" | "mln" | "million") => Decimal::from(1_000_000),
        Some("bn" | "billion") => Decimal::from(1_000_000_000),
        _ => Decimal::ONE,
    }
}

fn currency_of(symbol: &str) -> Option<&'static str> {
    match symbol.trim().to_uppercase().as_str() {
        "€" | "EUR" => Some("EUR"),
        "$" | "USD" => Some("USD"),
        "£" | "GBP" => Some("GBP"),
        "CHF" => Some("CHF"),
        _ => None,
    }
}

/// Candidate texts: each line, then each line joined to its successor for
/// label/value pairs split across two lines.
fn candidates(lines: &[String]) -> impl Iterator<Item = String> + '_ {
    let singles = lines.iter().cloned();
    let pairs = lines.windows(2).map(|w| format!("{} {}", w[0], w[1]));
    singles.chain(pairs)
}

fn first_capture<'t>(re: &Regex, texts: &'t [String]) -> Option<regex::Captures<'t>> {
    texts.iter().find_map(|t| re.captures(t))
}

fn extract_fields(out: &mut PdfExtraction) {
    let texts: Vec<String> = candidates(&out.lines).collect();
    let warnings = &mut out.warnings;

    out.issuer = out
        .lines
        .iter()
        .find_map(|l| ISSUER_RE.captures(l))
        .map(|c| c[1].trim().to_string());

    out.currency = first_capture(&CURRENCY_RE, &texts).map(|c| c[1].to_uppercase());

    if let Some(c) = first_capture(&CUT_OFF_RE, &texts) {
        out.cut_off_date = parse_date_text(&c[1]);
        if out.cut_off_date.is_none() {
            warnings.push(format!("cut-off date {:?} not understood", &c[1]));
        }
    }

    if let Some(c) = first_capture(&POOL_BALANCE_RE, &texts) {
        match number(&c[2]) {
            Some(v) => out.pool_balance = Some(v * multiplier(c.get(3).map(|m| m.as_str()))),
            None => warnings.push(format!("pool balance {:?} not understood", &c[2])),
        }
        if out.currency.is_none() {
            out.currency = c
                .get(1)
                .and_then(|m| currency_of(m.as_str()))
                .map(str::to_string);
        }
    }

    if let Some(c) = first_capture(&LOAN_COUNT_RE, &texts) {
        let digits: String = c[1].chars().filter(char::is_ascii_digit).collect();
        match digits.parse::<u32>() {
            Ok(n) => out.loan_count = Some(n),
            Err(_) => warnings.push(format!("loan count {:?} not understood", &c[1])),
        }
    }

    if let Some(c) = first_capture(&WA_RATE_RE, &texts) {
        match number(&c[1].replace(',', ".")) {
            Some(v) => out.wa_interest_rate = Some(v),
            None => warnings.push(format!("WA interest rate {:?} not understood", &c[1])),
        }
    }

    if let Some(c) = first_capture(&WA_TERM_RE, &texts) {
        match number(&c[1].replace(',', ".")) {
            Some(v) => {
                let years = c
                    .get(2)
                    .is_some_and(|u| u.as_str().to_lowercase().starts_with('y'));
                out.wa_remaining_term = Some(if years { v * Decimal::from(12) } else { v });
            }
            None => warnings.push(format!("WA remaining term {:?} not understood", &c[1])),
        }
    }

    for line in &out.lines {
        let Some(c) = TRANCHE_RE.captures(line) else {
            continue;
        };
        let name = format!("Class {}", c[1].to_uppercase());
        if out.tranches.iter().any(|t| t.name == name) {
            continue;
        }
        let size = number(&c[3]).map(|v| v * multiplier(c.get(4).map(|m| m.as_str())));
        if size.is_none() {
            warnings.push(format!("{name} size {:?} not understood", &c[3]));
        }
        let rest = &line[c.get(0).map_or(0, |m| m.end())..];
        let coupon_pct = PERCENT_RE.captures(rest).and_then(|p| number(&p[1]));
        out.tranches.push(ExtractedTranche {
            name,
            size,
            coupon_pct,
        });
    }

    if let (Some(total), false) = (out.pool_balance, out.tranches.is_empty()) {
        let tranche_sum: Decimal = out.tranches.iter().filter_map(|t| t.size).sum();
        if tranche_sum > Decimal::ZERO && (tranche_sum - total).abs() > total / Decimal::from(100) {
            warnings.push(format!(
                "tranche sizes sum to {tranche_sum}, pool balance is {total}"
            ));
        }
    }
}
