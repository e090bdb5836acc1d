//! Spreadsheet row mapping (C3): positional cells → `MissionaryRecord`.
//!
//! Column indices follow the fixed layout in spec.md §6. Index 8 is unused
//! (`treatment` stays absent); indices 35-37 are filled by the mapper, never
//! read from the sheet.

use crate::error::CoreError;
use crate::models::MissionaryRecord;
use crate::normalize::{coerce_bool, coerce_date};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use chrono::{DateTime, Utc};
use std::io::Cursor;

/// Read the first worksheet of an in-memory spreadsheet and return its rows
/// as positional string cells, header row still included.
pub fn read_first_worksheet(bytes: &[u8]) -> Result<Vec<Vec<String>>, CoreError> {
    let cursor = Cursor::new(bytes);
    let mut workbook =
        open_workbook_auto_from_rs(cursor).map_err(|e| CoreError::ExcelReadFailed(e.to_string()))?;

    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| CoreError::ExcelReadFailed("workbook has no worksheets".to_string()))?;

    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|e| CoreError::ExcelReadFailed(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect())
        .collect())
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Float(f) => {
            if f.fract() == 0.0 {
                format!("{f:.0}")
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => String::new(),
    }
}

/// Number of positional columns read from the sheet (0-34 inclusive).
pub const COLUMN_COUNT: usize = 35;

fn cell(cells: &[String], idx: usize) -> &str {
    cells.get(idx).map(|s| s.as_str()).unwrap_or("")
}

fn parse_date_field(
    cells: &[String],
    idx: usize,
    field: &str,
    errors: &mut Vec<CoreError>,
) -> Option<chrono::NaiveDate> {
    let raw = cell(cells, idx);
    if raw.trim().is_empty() {
        return None;
    }
    match coerce_date(raw) {
        Some(iso) => chrono::NaiveDate::parse_from_str(&iso, "%Y-%m-%d").ok(),
        None => {
            errors.push(CoreError::DateInvalid(field.to_string()));
            None
        }
    }
}

fn parse_i64(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        trimmed.parse().ok()
    }
}

fn parse_opt_string(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Map one positional row (header row already removed) to a
/// `MissionaryRecord`. Returns `None` alongside a `RowEmpty`/`IdMissing`
/// error when the row cannot produce a valid record; otherwise returns the
/// record plus any soft validation errors collected along the way.
pub fn map_row(
    cells: &[String],
    now: DateTime<Utc>,
    generation_date: &str,
) -> (Option<MissionaryRecord>, Vec<CoreError>) {
    let mut errors = Vec::new();

    if cells.iter().all(|c| c.trim().is_empty()) {
        return (None, vec![CoreError::RowEmpty]);
    }

    let id = match parse_i64(cell(cells, 0)) {
        Some(id) if id > 0 => id,
        _ => {
            errors.push(CoreError::IdMissing);
            return (None, errors);
        }
    };

    let name = parse_opt_string(cell(cells, 9));
    if name.is_none() {
        errors.push(CoreError::NameMissing);
    }

    let record = MissionaryRecord {
        id,
        district_id: parse_i64(cell(cells, 1)),
        r#type: parse_opt_string(cell(cells, 2)),
        branch: parse_opt_string(cell(cells, 3)),
        district: parse_opt_string(cell(cells, 4)),
        country: parse_opt_string(cell(cells, 5)),
        list_number: parse_i64(cell(cells, 6)),
        companionship_number: parse_i64(cell(cells, 7)),
        treatment: None,
        name,
        companion: parse_opt_string(cell(cells, 10)),
        assigned_mission: parse_opt_string(cell(cells, 11)),
        stake: parse_opt_string(cell(cells, 12)),
        lodging: parse_opt_string(cell(cells, 13)),
        photo: parse_opt_string(cell(cells, 14)),
        arrival: parse_date_field(cells, 15, "arrival", &mut errors),
        departure: parse_date_field(cells, 16, "departure", &mut errors),
        generation: parse_opt_string(cell(cells, 17)),
        comments: parse_opt_string(cell(cells, 18)),
        endowed: coerce_bool(cell(cells, 19)),
        birth_date: parse_date_field(cells, 20, "birth_date", &mut errors),
        photo_taken: coerce_bool(cell(cells, 21)),
        passport: coerce_bool(cell(cells, 22)),
        passport_folio: parse_opt_string(cell(cells, 23)),
        fm: parse_opt_string(cell(cells, 24)),
        ipad: coerce_bool(cell(cells, 25)),
        closet: parse_opt_string(cell(cells, 26)),
        secondary_arrival: parse_date_field(cells, 27, "secondary_arrival", &mut errors),
        p_day: parse_opt_string(cell(cells, 28)),
        host: coerce_bool(cell(cells, 29)),
        three_weeks: coerce_bool(cell(cells, 30)),
        device: coerce_bool(cell(cells, 31)),
        mission_email: parse_opt_string(cell(cells, 32)),
        personal_email: parse_opt_string(cell(cells, 33)),
        in_person_date: parse_date_field(cells, 34, "in_person_date", &mut errors),
        active: true,
        created_at: now,
        updated_at: now,
        generation_date: generation_date.to_string(),
    };

    (Some(record), errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        let mut cells: Vec<String> = values.iter().map(|s| s.to_string()).collect();
        cells.resize(COLUMN_COUNT, String::new());
        cells
    }

    #[test]
    fn maps_a_complete_row() {
        let now = Utc::now();
        let cells = row(&[
            "101", "5", "Élder", "Branch A", "Centro", "Mexico", "1", "2", "", "Juan Perez",
        ]);
        let (record, errors) = map_row(&cells, now, "20250110");
        let record = record.expect("record built");
        assert_eq!(record.id, 101);
        assert_eq!(record.name.as_deref(), Some("Juan Perez"));
        assert!(record.active);
        assert_eq!(record.created_at, record.updated_at);
        assert!(errors.is_empty());
    }

    #[test]
    fn missing_id_blocks_record_creation() {
        let cells = row(&["", "", "", "", "", "", "", "", "", "Juan"]);
        let (record, errors) = map_row(&cells, Utc::now(), "20250110");
        assert!(record.is_none());
        assert!(matches!(errors[0], CoreError::IdMissing));
    }

    #[test]
    fn missing_name_is_a_soft_error() {
        let cells = row(&["101"]);
        let (record, errors) = map_row(&cells, Utc::now(), "20250110");
        assert!(record.is_some());
        assert!(matches!(errors[0], CoreError::NameMissing));
    }

    #[test]
    fn invalid_date_field_reports_field_name() {
        let mut cells = row(&["101", "", "", "", "", "", "", "", "", "Juan"]);
        cells[15] = "not-a-date".to_string();
        let (record, errors) = map_row(&cells, Utc::now(), "20250110");
        let record = record.unwrap();
        assert!(record.arrival.is_none());
        assert!(errors.iter().any(|e| matches!(e, CoreError::DateInvalid(f) if f == "arrival")));
    }

    #[test]
    fn entirely_empty_row_is_reported_and_skipped() {
        let cells = row(&[]);
        let (record, errors) = map_row(&cells, Utc::now(), "20250110");
        assert!(record.is_none());
        assert!(matches!(errors[0], CoreError::RowEmpty));
    }

    #[test]
    fn boolean_columns_default_false_when_missing() {
        let cells = row(&["101", "", "", "", "", "", "", "", "", "Juan"]);
        let (record, _) = map_row(&cells, Utc::now(), "20250110");
        let record = record.unwrap();
        assert!(!record.endowed);
        assert!(!record.passport);
    }
}
