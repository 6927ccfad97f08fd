//! Upload loading: CSV with encoding and delimiter auto-detection, plus
//! Excel workbooks (see [`workbook`]).
//!
//! Turns raw upload bytes into a [`Table`]: the first record is the header
//! row, every following record a data row. Quoting follows RFC 4180. Cells
//! are kept as raw text, except empty cells which become `Null`; typing is
//! left to the profiler and `coerce_type`. [`write_table`] goes the other way
//! for cleaned output.

pub mod workbook;

use std::io::Write;
use std::path::Path;

use crate::api::logs::log_info;
use crate::error::{CsvError, CsvResult};
use crate::models::{CellValue, Table};

pub use workbook::{load_workbook_bytes, looks_like_workbook};

/// Delimiters tried by [`detect_delimiter`], in order of preference.
const DELIMITERS: [char; 4] = [',', ';', '\t', '|'];

/// Extensions read as workbooks rather than CSV.
pub const WORKBOOK_EXTENSIONS: [&str; 2] = ["xlsx", "xls"];

/// A loaded table plus what was detected along the way.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    pub table: Table,
    pub encoding: String,
    /// Detected for CSV; `,` for workbooks, used when writing cleaned output.
    pub delimiter: char,
    /// Worksheet the table came from, workbooks only.
    pub sheet: Option<String>,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "" | "ascii" | "utf-8" | "utf8" | "utf-8-sig" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        other => other.to_string(),
    }
}

/// Decode bytes with the given encoding label.
///
/// UTF-8 must be valid. Other labels known to `encoding_rs` decode with
/// replacement characters; unknown labels fall back to lossy UTF-8.
pub fn decode_content(bytes: &[u8], encoding: &str) -> CsvResult<String> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => {
            String::from_utf8(bytes.to_vec()).map_err(|_| CsvError::EncodingError(encoding.to_string()))
        }
        "iso-8859-1" | "latin-1" | "latin1" => Ok(encoding_rs::WINDOWS_1252.decode(bytes).0.into_owned()),
        label => match encoding_rs::Encoding::for_label(label.as_bytes()) {
            Some(enc) => Ok(enc.decode(bytes).0.into_owned()),
            None => Ok(String::from_utf8_lossy(bytes).into_owned()),
        },
    }
}

/// Detect the delimiter by counting occurrences in the first non-blank line.
/// Falls back to `,` when none of the candidates appear.
pub fn detect_delimiter(content: &str) -> char {
    let first_line = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");

    let mut best_sep = DELIMITERS[0];
    let mut best_count = 0;
    for &sep in &DELIMITERS {
        let count = first_line.matches(sep).count();
        if count > best_count {
            best_count = count;
            best_sep = sep;
        }
    }
    best_sep
}

/// Parse decoded CSV text with an explicit delimiter.
///
/// Short rows are padded with `Null`; a row with more fields than the header
/// is a parse error. Blank lines are skipped.
pub fn parse_table(content: &str, delimiter: char) -> CsvResult<Table> {
    if content.trim().is_empty() {
        return Err(CsvError::EmptyFile);
    }
    let delimiter = u8::try_from(delimiter).map_err(|_| CsvError::ParseError {
        line: 1,
        message: format!("delimiter {:?} is not a single byte", delimiter),
    })?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(content.as_bytes());

    let raw_headers = reader.headers().map_err(parse_error)?.clone();
    if raw_headers.iter().all(|h| h.trim().is_empty()) {
        return Err(CsvError::NoHeaders);
    }
    let headers = unique_headers(raw_headers.iter());
    let width = headers.len();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(parse_error)?;
        if record.len() > width {
            let line = record.position().map_or(0, |p| p.line() as usize);
            return Err(CsvError::ParseError {
                line,
                message: format!("found {} fields, header has {}", record.len(), width),
            });
        }
        let mut row: Vec<CellValue> = record.iter().map(raw_cell).collect();
        row.resize(width, CellValue::Null);
        rows.push(row);
    }

    Ok(Table::from_rows(headers, rows)?)
}

/// Load CSV bytes with auto-detection of encoding and delimiter.
pub fn load_bytes(bytes: &[u8]) -> CsvResult<LoadedTable> {
    if bytes.is_empty() {
        return Err(CsvError::EmptyFile);
    }
    let encoding = detect_encoding(bytes);
    let content = decode_content(bytes, &encoding)?;
    let delimiter = detect_delimiter(&content);
    let table = parse_table(&content, delimiter)?;

    log_info(format!(
        "📄 Loaded {} rows x {} columns ({}, delimiter {:?})",
        table.row_count(),
        table.column_count(),
        encoding,
        delimiter
    ));

    Ok(LoadedTable {
        table,
        encoding,
        delimiter,
        sheet: None,
    })
}

/// Load an upload as a workbook or CSV.
///
/// A `.xlsx`/`.xls` name picks the workbook reader, any other extension
/// picks CSV. Without a usable extension the leading bytes decide.
pub fn load_upload(bytes: &[u8], file_name: Option<&str>) -> CsvResult<LoadedTable> {
    let extension = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase);

    let is_workbook = match extension.as_deref() {
        Some(ext) if WORKBOOK_EXTENSIONS.contains(&ext) => true,
        Some(_) => false,
        None => looks_like_workbook(bytes),
    };

    if is_workbook {
        load_workbook_bytes(bytes)
    } else {
        load_bytes(bytes)
    }
}

/// Load a CSV or workbook file, chosen by extension.
pub fn load_file<P: AsRef<Path>>(path: P) -> CsvResult<LoadedTable> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)?;
    load_upload(&bytes, path.file_name().and_then(|n| n.to_str()))
}

/// Write `table` as CSV: header row, then one record per row. `Null` cells
/// are written empty.
pub fn write_table<W: Write>(table: &Table, writer: W, delimiter: char) -> CsvResult<()> {
    let delimiter = u8::try_from(delimiter).map_err(|_| CsvError::ParseError {
        line: 0,
        message: format!("delimiter {:?} is not a single byte", delimiter),
    })?;
    let mut out = csv::WriterBuilder::new().delimiter(delimiter).from_writer(writer);

    out.write_record(table.column_names()).map_err(parse_error)?;
    for row in 0..table.row_count() {
        let record = table
            .columns()
            .iter()
            .map(|column| column.values()[row].to_string());
        out.write_record(record).map_err(parse_error)?;
    }
    out.flush()?;
    Ok(())
}

fn raw_cell(field: &str) -> CellValue {
    if field.is_empty() {
        CellValue::Null
    } else {
        CellValue::text(field)
    }
}

/// Trim header names, name blank ones by position and suffix repeats:
/// `id, id, id` becomes `id, id_2, id_3`.
fn unique_headers<'a>(raw: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for (i, name) in raw.enumerate() {
        let base = match name.trim() {
            "" => format!("column_{}", i + 1),
            trimmed => trimmed.to_string(),
        };
        let mut candidate = base.clone();
        let mut n = 2;
        while out.contains(&candidate) {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }
        out.push(candidate);
    }
    out
}

fn parse_error(err: csv::Error) -> CsvError {
    CsvError::ParseError {
        line: err.position().map_or(0, |p| p.line() as usize),
        message: err.to_string(),
    }
}
