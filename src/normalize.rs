//! Pure, I/O-free coercion and sanitization helpers (C1).
//!
//! Every function here is deterministic and side-effect free so it can be
//! unit tested without a database, mailbox, or object store in the loop.

use chrono::NaiveDate;

/// Tokens that coerce to `true` under [`coerce_bool`], case-insensitive and trimmed.
const TRUE_TOKENS: &[&str] = &["verdadero", "true", "si", "sí", "1", "x"];

const SPANISH_MONTHS: &[(&str, u32)] = &[
    ("enero", 1),
    ("febrero", 2),
    ("marzo", 3),
    ("abril", 4),
    ("mayo", 5),
    ("junio", 6),
    ("julio", 7),
    ("agosto", 8),
    ("septiembre", 9),
    ("setiembre", 9),
    ("octubre", 10),
    ("noviembre", 11),
    ("diciembre", 12),
];

/// Look up the numeric month (01-12) for a Spanish month name, case-insensitive.
pub fn spanish_month_number(name: &str) -> Option<u32> {
    let lower = name.trim().to_lowercase();
    SPANISH_MONTHS
        .iter()
        .find(|(month, _)| *month == lower)
        .map(|(_, n)| *n)
}

/// Coerce a cell value into an ISO `YYYY-MM-DD` date, or `None` if absent/unparseable.
///
/// Accepts an already-ISO date, a `D/M/YYYY` textual date (day-first, no
/// locale ambiguity), or an empty/unparseable value.
pub fn coerce_date(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date.format("%Y-%m-%d").to_string());
    }

    let parts: Vec<&str> = trimmed.split('/').collect();
    if parts.len() == 3 {
        let day: u32 = parts[0].parse().ok()?;
        let month: u32 = parts[1].parse().ok()?;
        let year: i32 = parts[2].parse().ok()?;
        return NaiveDate::from_ymd_opt(year, month, day).map(|d| d.format("%Y-%m-%d").to_string());
    }

    None
}

/// Coerce a textual cell into a boolean. Never produces absence: empty and
/// unrecognized values both coerce to `false`.
pub fn coerce_bool(value: &str) -> bool {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    TRUE_TOKENS.contains(&normalized.as_str())
}

/// Exact case-sensitive prefix match against the configured subject pattern.
/// Returns the trailing content (unchanged) when the prefix matches.
pub fn match_subject_pattern<'a>(subject: &'a str, pattern: &str) -> Option<&'a str> {
    subject.strip_prefix(pattern)
}

const FORBIDDEN_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Sanitize a filename: replace forbidden characters with `_`, collapse
/// whitespace runs to `_`, and truncate to at most 100 code points while
/// preserving the last extension. Idempotent.
pub fn sanitize_filename(name: &str) -> String {
    let mut replaced = String::with_capacity(name.len());
    let mut last_was_space = false;
    for ch in name.chars() {
        if FORBIDDEN_FILENAME_CHARS.contains(&ch) {
            replaced.push('_');
            last_was_space = false;
        } else if ch.is_whitespace() {
            if !last_was_space {
                replaced.push('_');
            }
            last_was_space = true;
        } else {
            replaced.push(ch);
            last_was_space = false;
        }
    }

    truncate_preserving_extension(&replaced, 100)
}

fn truncate_preserving_extension(name: &str, max_code_points: usize) -> String {
    let code_points: Vec<char> = name.chars().collect();
    if code_points.len() <= max_code_points {
        return name.to_string();
    }

    let (stem, ext) = match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    };

    let ext_len = ext.chars().count();
    let stem_budget = max_code_points.saturating_sub(ext_len);
    let truncated_stem: String = stem.chars().take(stem_budget).collect();
    format!("{truncated_stem}{ext}")
}

/// Resolve a collision-free filename given a sanitized candidate and a
/// predicate reporting whether a name already exists. Appends a
/// millisecond timestamp before the extension, retrying with an
/// incrementing counter on persistent collision.
pub fn resolve_collision(sanitized: &str, now_millis: i64, exists: impl Fn(&str) -> bool) -> String {
    if !exists(sanitized) {
        return sanitized.to_string();
    }

    let (stem, ext) = match sanitized.rfind('.') {
        Some(idx) if idx > 0 => (&sanitized[..idx], &sanitized[idx..]),
        _ => (sanitized, ""),
    };

    let mut candidate = format!("{stem}_{now_millis}{ext}");
    let mut counter = 1u32;
    while exists(&candidate) {
        candidate = format!("{stem}_{now_millis}_{counter}{ext}");
        counter += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn day_first_date_disambiguation() {
        assert_eq!(coerce_date("3/7/2025"), Some("2025-07-03".to_string()));
        assert_eq!(coerce_date("18/3/2025"), Some("2025-03-18".to_string()));
    }

    #[test]
    fn invalid_date_coerces_to_absence() {
        assert_eq!(coerce_date("fecha_invalida"), None);
        assert_eq!(coerce_date(""), None);
    }

    #[test]
    fn date_coercion_is_idempotent() {
        let once = coerce_date("3/7/2025").unwrap();
        let twice = coerce_date(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn bool_coercion_tokens() {
        for token in ["verdadero", "TRUE", "Si", "sí", "1", "x", " X "] {
            assert!(coerce_bool(token), "expected {token} to coerce true");
        }
        for token in ["no", "false", "", "0", "2"] {
            assert!(!coerce_bool(token), "expected {token} to coerce false");
        }
    }

    #[test]
    fn filename_sanitization_boundary() {
        assert_eq!(sanitize_filename("a/b?*.pdf"), "a_b__.pdf");
    }

    #[test]
    fn filename_sanitization_is_idempotent() {
        let once = sanitize_filename("weird <name>: \"q\".pdf");
        let twice = sanitize_filename(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn filename_truncation_preserves_extension() {
        let long_stem = "a".repeat(200);
        let name = format!("{long_stem}.pdf");
        let sanitized = sanitize_filename(&name);
        assert!(sanitized.chars().count() <= 100);
        assert!(sanitized.ends_with(".pdf"));
    }

    #[test]
    fn collision_resolution_appends_timestamp() {
        let resolved = resolve_collision("report.xlsx", 1_700_000_000_000, |n| n == "report.xlsx");
        assert_eq!(resolved, "report_1700000000000.xlsx");
    }

    #[test]
    fn collision_resolution_retries_on_persistent_collision() {
        let resolved = resolve_collision("report.xlsx", 42, |n| {
            n == "report.xlsx" || n == "report_42.xlsx"
        });
        assert_eq!(resolved, "report_42_1.xlsx");
    }

    #[test]
    fn subject_pattern_prefix_match() {
        assert_eq!(
            match_subject_pattern("Misioneros que llegan el 10 de enero", "Misioneros que llegan"),
            Some(" el 10 de enero")
        );
        assert_eq!(match_subject_pattern("Otro asunto", "Misioneros"), None);
    }
}
