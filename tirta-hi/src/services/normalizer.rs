//! Dataset normalizer
//!
//! Parses a raw tabular upload (header row + data rows, `,`/`;`/tab
//! delimited) into normalized consumption records. Granularity is inferred
//! from the first row with a parseable date; rows that disagree with it, or
//! carry unparseable dates or volumes, are dropped with a row-level warning
//! so partially malformed files degrade to their valid subset. Pure parse,
//! no side effects; errors are returned, never panicked across the boundary.

use crate::models::{ConsumptionRecord, Granularity};
use chrono::NaiveDate;
use std::collections::HashSet;
use thiserror::Error;

/// Accepted spellings for the date column header
const DATE_HEADERS: &[&str] = &["date", "tanggal", "month", "bulan", "periode"];

/// Accepted spellings for the volume column header
const VOLUME_HEADERS: &[&str] = &["total_m3", "volume", "m3", "volume_m3"];

/// Spreadsheet serial dates below this are pre-1900 artifacts, not dates
const MIN_SERIAL_DATE: f64 = 60.0;
const MAX_SERIAL_DATE: f64 = 2_958_465.0; // 9999-12-31

/// Structural validation failure; the upload is rejected as a whole
#[derive(Debug, Error)]
#[error("{}", .errors.join("; "))]
pub struct ValidationError {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// A successfully normalized upload
#[derive(Debug, Clone)]
pub struct NormalizedDataset {
    /// Records sorted ascending by normalized date key
    pub records: Vec<ConsumptionRecord>,
    /// Granularity shared by every record
    pub data_type: Granularity,
    /// Non-fatal row-level problems encountered while parsing
    pub warnings: Vec<String>,
}

/// Parse and validate raw upload bytes
pub fn normalize(raw: &[u8]) -> Result<NormalizedDataset, ValidationError> {
    let mut warnings = Vec::new();

    let text = String::from_utf8_lossy(raw);
    let rows = read_rows(&text, &mut warnings);

    if rows.len() < 2 {
        return Err(ValidationError {
            errors: vec!["File must contain at least a header and one data row".to_string()],
            warnings,
        });
    }

    let header = &rows[0];
    let date_idx = find_column(header, DATE_HEADERS);
    let volume_idx = find_column(header, VOLUME_HEADERS);

    let mut errors = Vec::new();
    if date_idx.is_none() {
        errors.push("Missing required column: date".to_string());
    }
    if volume_idx.is_none() {
        errors.push("Missing required column: total_m3".to_string());
    }
    let (Some(date_idx), Some(volume_idx)) = (date_idx, volume_idx) else {
        return Err(ValidationError { errors, warnings });
    };

    // Granularity comes from the first data row with a parseable date.
    let expected_type = rows[1..]
        .iter()
        .filter_map(|row| row.get(date_idx))
        .filter_map(|cell| parse_date_key(cell))
        .map(|(_, granularity)| granularity)
        .next();

    let Some(expected_type) = expected_type else {
        return Err(ValidationError {
            errors: vec!["No valid data rows found".to_string()],
            warnings,
        });
    };

    let mut records = Vec::new();
    let mut dates_seen: HashSet<String> = HashSet::new();

    for (index, row) in rows[1..].iter().enumerate() {
        let row_number = index + 2; // 1-based, header is row 1

        if row.iter().all(|cell| cell.trim().is_empty()) {
            warnings.push(format!("Row {}: empty row, skipped", row_number));
            continue;
        }

        let date_cell = row.get(date_idx).map(|s| s.trim()).unwrap_or("");
        if date_cell.is_empty() {
            warnings.push(format!("Row {}: missing date value, row dropped", row_number));
            continue;
        }

        let Some((date_key, actual_type)) = parse_date_key(date_cell) else {
            warnings.push(format!(
                "Row {}: unparseable date \"{}\", row dropped",
                row_number, date_cell
            ));
            continue;
        };

        if actual_type != expected_type {
            warnings.push(format!(
                "Row {}: expected {} date, got {}; row dropped",
                row_number, expected_type, actual_type
            ));
            continue;
        }

        let volume_cell = row.get(volume_idx).map(|s| s.trim()).unwrap_or("");
        let Some(volume) = parse_volume(volume_cell) else {
            warnings.push(format!(
                "Row {}: invalid total_m3 value \"{}\", row dropped",
                row_number, volume_cell
            ));
            continue;
        };

        if volume < 0.0 {
            warnings.push(format!(
                "Row {}: negative total_m3 value not allowed, row dropped",
                row_number
            ));
            continue;
        }

        // Duplicates within one file are retained; consolidation decides
        // which record wins.
        if !dates_seen.insert(date_key.clone()) {
            warnings.push(format!("Row {}: duplicate date {}", row_number, date_key));
        }

        records.push(ConsumptionRecord::new(date_key, volume));
    }

    if records.is_empty() {
        return Err(ValidationError {
            errors: vec!["No valid data rows found".to_string()],
            warnings,
        });
    }

    records.sort_by(|a, b| a.date.cmp(&b.date));

    Ok(NormalizedDataset {
        records,
        data_type: expected_type,
        warnings,
    })
}

/// Read all non-empty rows with a sniffed delimiter
fn read_rows(text: &str, warnings: &mut Vec<String>) -> Vec<Vec<String>> {
    let delimiter = sniff_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    for (index, result) in reader.records().enumerate() {
        match result {
            Ok(record) => rows.push(record.iter().map(|s| s.to_string()).collect()),
            Err(e) => warnings.push(format!("Row {}: unreadable row, skipped ({})", index + 1, e)),
        }
    }
    rows
}

/// Sniff the delimiter from the header line
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    if header.contains(';') {
        b';'
    } else if header.contains('\t') {
        b'\t'
    } else {
        b','
    }
}

/// Find a column whose header matches one of the accepted spellings
fn find_column(header: &[String], accepted: &[&str]) -> Option<usize> {
    header
        .iter()
        .position(|cell| accepted.contains(&cell.trim().to_lowercase().as_str()))
}

/// Parse a date cell into its normalized ISO key and granularity
///
/// Accepts ISO day (`YYYY-MM-DD`), ISO month (`YYYY-MM`), slash/dash locale
/// variants (`DD/MM/YYYY`, `MM/YYYY`) and spreadsheet serial-date numbers.
fn parse_date_key(cell: &str) -> Option<(String, Granularity)> {
    let s = cell.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some((date.format("%Y-%m-%d").to_string(), Granularity::Daily));
    }

    if let Some(key) = parse_iso_month(s) {
        return Some((key, Granularity::Monthly));
    }

    if let Some(parsed) = parse_separated(s, '/').or_else(|| parse_separated(s, '-')) {
        return Some(parsed);
    }

    if let Some(date) = parse_serial_date(s) {
        return Some((date.format("%Y-%m-%d").to_string(), Granularity::Daily));
    }

    None
}

/// `YYYY-MM` (month 1-12, one or two digits)
fn parse_iso_month(s: &str) -> Option<String> {
    let (year, month) = s.split_once('-')?;
    if year.len() != 4 || month.len() > 2 || month.is_empty() {
        return None;
    }
    let year: u32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    if !(1..=12).contains(&month) {
        return None;
    }
    Some(format!("{:04}-{:02}", year, month))
}

/// `DD<sep>MM<sep>YYYY` (daily) or `MM<sep>YYYY` (monthly)
fn parse_separated(s: &str, separator: char) -> Option<(String, Granularity)> {
    let parts: Vec<&str> = s.split(separator).collect();
    match parts.as_slice() {
        [day, month, year] if day.len() <= 2 && month.len() <= 2 && year.len() == 4 => {
            let day: u32 = day.parse().ok()?;
            let month: u32 = month.parse().ok()?;
            let year: i32 = year.parse().ok()?;
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            Some((date.format("%Y-%m-%d").to_string(), Granularity::Daily))
        }
        [month, year] if month.len() <= 2 && year.len() == 4 => {
            let month: u32 = month.parse().ok()?;
            let year: u32 = year.parse().ok()?;
            if !(1..=12).contains(&month) {
                return None;
            }
            Some((format!("{:04}-{:02}", year, month), Granularity::Monthly))
        }
        _ => None,
    }
}

/// Spreadsheet serial-date number (days since 1899-12-30, fraction dropped)
fn parse_serial_date(s: &str) -> Option<NaiveDate> {
    if !s.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    let serial: f64 = s.parse().ok()?;
    if !(MIN_SERIAL_DATE..=MAX_SERIAL_DATE).contains(&serial) {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_days(chrono::Days::new(serial.trunc() as u64))
}

/// Parse a volume cell tolerating locale separators
///
/// When both `.` and `,` are present the dots are treated as thousand
/// separators and the comma as the decimal mark (`1.234,5` → 1234.5).
fn parse_volume(cell: &str) -> Option<f64> {
    let cleaned: String = cell
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let normalized = if cleaned.contains(',') && cleaned.contains('.') {
        cleaned.replace('.', "").replace(',', ".")
    } else if cleaned.contains(',') {
        cleaned.replace(',', ".")
    } else {
        cleaned
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}
