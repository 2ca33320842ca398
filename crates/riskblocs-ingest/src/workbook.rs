//! Workbook loading and worksheet selection.
//!
//! Tapes arrive as `.xlsx`/`.xlsm`/`.xls`/`.ods` (read with `calamine`) or
//! `.csv` (read with `csv`, delimiter sniffed from the first line). Every
//! format is flattened into [`Sheet`]s of [`CellValue`] rows so the tape
//! parser never sees the source format.

use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use riskblocs_types::{LoanField, Result, RiskblocsError};
use sha2::{Digest, Sha256};

use crate::coerce::CellValue;
use crate::column_map::HeaderMapping;

/// One worksheet, rows of cells in sheet order.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

/// The worksheet and header row chosen for parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct SheetSelection {
    pub sheet_index: usize,
    /// 0-based row index of the header inside the sheet.
    pub header_row: usize,
    pub mapping: HeaderMapping,
}

/// All worksheets of one uploaded file.
#[derive(Debug, Clone, PartialEq)]
pub struct Workbook {
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    /// Read a workbook from disk; the format follows the file extension.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::from_bytes(&bytes, &name)
    }

    /// Read a workbook from memory; `file_name` supplies the extension.
    pub fn from_bytes(bytes: &[u8], file_name: &str) -> Result<Self> {
        let extension = Path::new(file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "csv" | "txt" => Ok(Self {
                sheets: vec![read_csv(bytes, file_name)?],
            }),
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => read_spreadsheet(bytes),
            _ => Err(RiskblocsError::UnsupportedFormat { extension }),
        }
    }

    /// A single-sheet workbook built in memory.
    #[must_use]
    pub fn single(name: impl Into<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            sheets: vec![Sheet {
                name: name.into(),
                rows,
            }],
        }
    }

    /// Find the worksheet and header row that best describe a loan tape.
    ///
    /// Within the first `scan_rows` rows of each sheet, the row mapping the
    /// most fields is the sheet's candidate. Candidates mapping every
    /// required field win over those that don't; then the higher score
    /// wins; ties go to the earlier sheet.
    pub fn select_sheet(&self, scan_rows: usize) -> Result<SheetSelection> {
        // (complete, score, selection)
        let mut best: Option<(bool, usize, SheetSelection)> = None;

        for (sheet_index, sheet) in self.sheets.iter().enumerate() {
            for (row_index, row) in sheet.rows.iter().take(scan_rows).enumerate() {
                let headers: Vec<String> = row
                    .iter()
                    .map(|c| c.as_text().unwrap_or_default())
                    .collect();
                let mapping = HeaderMapping::from_headers(&headers);
                let score = mapping.matched_count();
                if score == 0 {
                    continue;
                }
                let complete = mapping.is_complete();
                let better = match &best {
                    None => true,
                    Some((best_complete, best_score, _)) => {
                        (complete, score) > (*best_complete, *best_score)
                    }
                };
                if better {
                    best = Some((
                        complete,
                        score,
                        SheetSelection {
                            sheet_index,
                            header_row: row_index,
                            mapping,
                        },
                    ));
                }
            }
        }

        match best {
            Some((true, score, selection)) => {
                tracing::debug!(
                    sheet = %self.sheets[selection.sheet_index].name,
                    header_row = selection.header_row,
                    score,
                    "Selected loan-tape worksheet"
                );
                Ok(selection)
            }
            Some((false, _, selection)) => Err(missing(&selection.mapping.missing_required())),
            None => Err(missing(&LoanField::required_fields())),
        }
    }
}

fn missing(fields: &[LoanField]) -> RiskblocsError {
    RiskblocsError::MissingRequiredColumns {
        missing: fields.iter().map(|f| f.column_name().to_string()).collect(),
    }
}

fn read_spreadsheet(bytes: &[u8]) -> Result<Workbook> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec())).map_err(|e| {
        RiskblocsError::WorkbookRead {
            reason: e.to_string(),
        }
    })?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| RiskblocsError::WorkbookRead {
                reason: format!("sheet {name}: {e}"),
            })?;
        let rows = range
            .rows()
            .map(|row| row.iter().map(cell_from_data).collect())
            .collect();
        sheets.push(Sheet { name, rows });
    }
    Ok(Workbook { sheets })
}

#[allow(clippy::cast_precision_loss)]
fn cell_from_data(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => {
            CellValue::Text(s.clone())
        }
        Data::Float(f) => CellValue::Number(*f),
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
    }
}

/// Pick the delimiter that occurs most often on the first line.
///
/// `max_by_key` keeps the last maximum, so the list ends with the comma
/// to make it the tie-breaker.
fn sniff_delimiter(bytes: &[u8]) -> u8 {
    let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
    [b'|', b'\t', b';', b',']
        .into_iter()
        .max_by_key(|d| first_line.iter().filter(|b| *b == d).count())
        .unwrap_or(b',')
}

fn read_csv(bytes: &[u8], file_name: &str) -> Result<Sheet> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(sniff_delimiter(bytes))
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.byte_records() {
        let record = record.map_err(|e| RiskblocsError::WorkbookRead {
            reason: e.to_string(),
        })?;
        rows.push(
            record
                .iter()
                .map(|field| CellValue::from(String::from_utf8_lossy(field).trim()))
                .collect(),
        );
    }
    Ok(Sheet {
        name: file_name.to_string(),
        rows,
    })
}

/// SHA-256 of the raw upload, hex encoded.
#[must_use]
pub fn file_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
