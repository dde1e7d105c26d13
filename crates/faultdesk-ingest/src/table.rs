//! Tabular parsing
//!
//! Converts raw spreadsheet or CSV bytes into ordered row mappings. CSV
//! decoding walks an ordered list of candidate encodings and takes the first
//! that both decodes cleanly and yields data rows.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use encoding_rs::Encoding;

use faultdesk_common::{FaultdeskError, Row};

const SUPPORTED_EXTENSIONS: [&str; 3] = [".xlsx", ".xls", ".csv"];

const UTF8_BOM: [u8; 3] = [0xef, 0xbb, 0xbf];

/// Candidate text encodings for CSV payloads, tried in order.
#[derive(Clone, Copy, Debug)]
enum CsvEncoding {
    Utf8,
    Utf8Bom,
    Gb18030,
    Gbk,
}

const CSV_ENCODINGS: [CsvEncoding; 4] = [
    CsvEncoding::Utf8,
    CsvEncoding::Utf8Bom,
    CsvEncoding::Gb18030,
    CsvEncoding::Gbk,
];

impl CsvEncoding {
    fn name(&self) -> &'static str {
        match self {
            CsvEncoding::Utf8 => "utf-8",
            CsvEncoding::Utf8Bom => "utf-8-sig",
            CsvEncoding::Gb18030 => "gb18030",
            CsvEncoding::Gbk => "gbk",
        }
    }

    /// Decode strictly; `None` means this candidate does not apply.
    fn decode(&self, content: &[u8]) -> Option<String> {
        match self {
            CsvEncoding::Utf8 => {
                // BOM-prefixed input belongs to the dedicated BOM stage,
                // otherwise the marker would leak into the first header.
                if content.starts_with(&UTF8_BOM) {
                    return None;
                }
                std::str::from_utf8(content).ok().map(str::to_owned)
            }
            CsvEncoding::Utf8Bom => {
                let rest = content.strip_prefix(&UTF8_BOM[..])?;
                std::str::from_utf8(rest).ok().map(str::to_owned)
            }
            CsvEncoding::Gb18030 => decode_with(encoding_rs::GB18030, content),
            CsvEncoding::Gbk => decode_with(encoding_rs::GBK, content),
        }
    }
}

fn decode_with(encoding: &'static Encoding, content: &[u8]) -> Option<String> {
    let (text, had_errors) = encoding.decode_without_bom_handling(content);
    if had_errors { None } else { Some(text.into_owned()) }
}

/// Lowercased dot-prefixed suffix of a filename (`".csv"`), empty when the
/// name has none.
pub fn file_suffix(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Parse spreadsheet or CSV bytes into rows, dispatched by suffix.
pub fn parse_table_rows(content: &[u8], suffix: &str) -> Result<Vec<Row>, FaultdeskError> {
    if !SUPPORTED_EXTENSIONS.contains(&suffix) {
        return Err(FaultdeskError::UnsupportedFormat(suffix.to_string()));
    }

    if suffix == ".csv" {
        parse_csv_rows(content)
    } else {
        parse_workbook_rows(content)
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Scan sheets in workbook order and return the first that yields data rows.
/// All cells are treated as text; missing cells are blank-filled.
fn parse_workbook_rows(content: &[u8]) -> Result<Vec<Row>, FaultdeskError> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(content))
        .map_err(|_| FaultdeskError::InvalidWorkbook)?;

    let sheet_names = workbook.sheet_names().to_owned();
    for sheet_name in sheet_names {
        let Ok(range) = workbook.worksheet_range(&sheet_name) else {
            continue;
        };
        let mut row_iter = range.rows();
        let Some(header_row) = row_iter.next() else {
            continue;
        };
        let headers: Vec<String> = header_row.iter().map(cell_text).collect();

        let rows: Vec<Row> = row_iter
            .map(|data_row| {
                headers
                    .iter()
                    .enumerate()
                    .map(|(i, header)| {
                        let value = data_row.get(i).map(cell_text).unwrap_or_default();
                        (header.clone(), value)
                    })
                    .collect::<HashMap<_, _>>()
            })
            .collect();
        if !rows.is_empty() {
            return Ok(rows);
        }
    }

    Err(FaultdeskError::NoDataRows)
}

fn parse_csv_rows(content: &[u8]) -> Result<Vec<Row>, FaultdeskError> {
    let mut last_error: Option<String> = None;

    for encoding in CSV_ENCODINGS {
        let Some(text) = encoding.decode(content) else {
            last_error = Some(format!("{}: decode failed", encoding.name()));
            continue;
        };

        match read_csv_records(&text) {
            Ok(rows) if rows.is_empty() => {
                // A clean decode with a header but no data rows is a final
                // verdict about the file, not about the encoding.
                return Err(FaultdeskError::NoDataRows);
            }
            Ok(rows) => return Ok(rows),
            Err(err) => {
                last_error = Some(format!("{}: {}", encoding.name(), err));
                continue;
            }
        }
    }

    Err(FaultdeskError::InvalidCsv(
        last_error.unwrap_or_else(|| "no candidate encoding applied".to_string()),
    ))
}

fn read_csv_records(text: &str) -> Result<Vec<Row>, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(text.as_bytes());
    let headers = reader.headers()?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let row: Row = headers
            .iter()
            .enumerate()
            .map(|(i, header)| {
                (
                    header.to_string(),
                    record.get(i).unwrap_or_default().to_string(),
                )
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
