//! Excel workbook loading (`.xlsx`, `.xls`).
//!
//! Only the first worksheet is read. Its first non-blank row is the header
//! row and goes through the same renaming as CSV headers. Unlike CSV, cells
//! keep the type the spreadsheet stored: numbers, booleans and dates arrive
//! native. Empty cells, empty strings and error cells (`#DIV/0!`) become `Null`.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::{raw_cell, unique_headers, LoadedTable};
use crate::api::logs::log_info;
use crate::error::{CsvError, CsvResult};
use crate::models::{parse_datetime, CellValue, Table};

/// Zip container (`.xlsx`, `.xlsm`, `.ods`).
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// OLE2 compound document (legacy `.xls`).
const OLE_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0];

/// Whether `bytes` start like a workbook container.
pub fn looks_like_workbook(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC) || bytes.starts_with(OLE_MAGIC)
}

/// Load the first worksheet of a workbook.
pub fn load_workbook_bytes(bytes: &[u8]) -> CsvResult<LoadedTable> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }

    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))?;
    let sheet = workbook.sheet_names().first().cloned().ok_or(CsvError::EmptyFile)?;
    let range = workbook.worksheet_range(&sheet)?;

    let mut rows = range.rows().filter(|row| !row.iter().all(is_blank));
    let header_row = rows.next().ok_or(CsvError::EmptyFile)?;
    let raw_headers: Vec<String> = header_row.iter().map(|cell| cell.to_string()).collect();
    if raw_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CsvError::NoHeaders);
    }
    let headers = unique_headers(raw_headers.iter().map(String::as_str));

    let data: Vec<Vec<CellValue>> = rows.map(|row| row.iter().map(workbook_cell).collect()).collect();
    let table = Table::from_rows(headers, data)?;

    log_info(format!(
        "📗 Loaded {} rows x {} columns from sheet '{}'",
        table.row_count(),
        table.column_count(),
        sheet
    ));

    Ok(LoadedTable {
        table,
        encoding: "utf-8".to_string(),
        delimiter: ',',
        sheet: Some(sheet),
    })
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.is_empty(),
        _ => false,
    }
}

fn workbook_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Null,
        Data::String(s) => raw_cell(s),
        Data::Float(f) if f.is_finite() => CellValue::Number(*f),
        Data::Float(_) => CellValue::Null,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Bool(b) => CellValue::Boolean(*b),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map_or(CellValue::Number(dt.as_f64()), CellValue::DateTime),
        Data::DateTimeIso(s) => parse_datetime(s).map_or_else(|| CellValue::text(s.as_str()), CellValue::DateTime),
        Data::DurationIso(s) => CellValue::text(s.as_str()),
    }
}
