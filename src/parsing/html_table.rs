//! HTML table extraction and generation-date derivation (C2).

use crate::error::CoreError;
use crate::models::{GenerationDate, ParsedTable};
use crate::normalize::spanish_month_number;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::OnceLock;

fn generation_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)generaci[oó]n\s+del\s+(\d{1,2})\s+de\s+([a-záéíóúñ]+)\s+de\s+(\d{4})",
        )
        .expect("valid generation-date regex")
    })
}

/// Search a text fragment for a `"Generación del DD de MES de YYYY"` phrase
/// and return its `YYYYMMDD` form, if one is found.
fn find_generation_date(text: &str) -> Option<GenerationDate> {
    let caps = generation_date_regex().captures(text)?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month = spanish_month_number(caps.get(2)?.as_str())?;
    let year: i32 = caps.get(3)?.as_str().parse().ok()?;
    GenerationDate::parse(&format!("{year:04}{month:02}{day:02}"))
}

/// Result of parsing a mixed text/HTML message body.
pub struct ParseOutcome {
    pub table: Option<ParsedTable>,
    pub table_errors: Vec<CoreError>,
    pub generation_date: Option<GenerationDate>,
}

/// Parse the table embedded in `html_body` (if any) and derive the
/// generation date using the three-fallback search order from the design:
/// plain body, HTML-stripped body, then each `extra_texts` entry.
pub fn parse_body(plain_body: &str, html_body: Option<&str>) -> ParseOutcome {
    let Some(html_body) = html_body else {
        return ParseOutcome {
            table: None,
            table_errors: vec![CoreError::HtmlMissing],
            generation_date: find_generation_date(plain_body),
        };
    };

    let document = Html::parse_document(html_body);
    let table_selector = Selector::parse("table").expect("valid selector");
    let Some(table_el) = document.select(&table_selector).next() else {
        return ParseOutcome {
            table: None,
            table_errors: vec![CoreError::HtmlMissing],
            generation_date: find_generation_date(plain_body)
                .or_else(|| find_generation_date(&strip_tags(html_body))),
        };
    };

    let (table, table_errors, extra_texts) = extract_table(&table_el);

    let generation_date = find_generation_date(plain_body)
        .or_else(|| find_generation_date(&strip_tags(html_body)))
        .or_else(|| extra_texts.iter().find_map(|t| find_generation_date(t)));

    ParseOutcome {
        table: Some(ParsedTable {
            headers: table.headers,
            rows: table.rows,
            extra_texts,
        }),
        table_errors,
        generation_date,
    }
}

struct RawTable {
    headers: Vec<String>,
    rows: Vec<BTreeMap<String, String>>,
}

/// Columns downstream logic treats as load-bearing: the district drives
/// per-attachment folder/file naming (`orchestrator::infer_district`), the
/// name identifies the row to a human reader. Missing header or blank cell
/// is reported, never fatal — the row still carries through to upload.
const REQUIRED_COLUMNS: [&str; 2] = ["distrito", "nombre"];

fn find_required_header(headers: &[String], needle: &str) -> Option<String> {
    headers
        .iter()
        .find(|h| h.to_lowercase().contains(needle))
        .cloned()
}

fn row_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("tr").expect("valid selector"))
}

fn cell_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("th, td").expect("valid selector"))
}

fn th_selector() -> &'static Selector {
    static SEL: OnceLock<Selector> = OnceLock::new();
    SEL.get_or_init(|| Selector::parse("th").expect("valid selector"))
}

fn cell_text(cell: &ElementRef) -> String {
    collapse_whitespace(&cell.text().collect::<Vec<_>>().join(" "))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_table(table_el: &ElementRef) -> (RawTable, Vec<CoreError>, Vec<String>) {
    let rows: Vec<ElementRef> = table_el.select(row_selector()).collect();

    let header_index = rows
        .iter()
        .position(|row| {
            let cells: Vec<ElementRef> = row.select(cell_selector()).collect();
            if cells.is_empty() {
                return false;
            }
            let all_th = row.select(th_selector()).count() == cells.len();
            if all_th {
                return true;
            }
            cells.iter().filter(|c| !cell_text(c).is_empty()).count() >= 2
        })
        .unwrap_or(0);

    let mut extra_texts: Vec<String> = Vec::new();
    for row in rows.iter().take(header_index) {
        let text = cell_text_of_row(row);
        if !text.is_empty() {
            extra_texts.push(text);
        }
    }

    let headers = rows
        .get(header_index)
        .map(|row| dedupe_headers(row.select(cell_selector()).map(|c| cell_text(&c)).collect()))
        .unwrap_or_default();

    let mut errors = Vec::new();

    let required_headers: Vec<Option<String>> = REQUIRED_COLUMNS
        .iter()
        .map(|needle| {
            let found = find_required_header(&headers, needle);
            if found.is_none() {
                errors.push(CoreError::ColumnMissing((*needle).to_string()));
            }
            found
        })
        .collect();

    let mut data_rows = Vec::new();

    for (idx, row) in rows.iter().skip(header_index + 1).enumerate() {
        let cells: Vec<String> = row.select(cell_selector()).map(|c| cell_text(&c)).collect();
        if cells.len() > headers.len() {
            errors.push(CoreError::RowOverflow(idx));
        }

        let mut mapped = BTreeMap::new();
        for (i, header) in headers.iter().enumerate() {
            let value = cells.get(i).cloned().unwrap_or_default();
            mapped.insert(header.clone(), value);
        }

        for header in required_headers.iter().flatten() {
            if mapped.get(header).map(|v| v.trim().is_empty()).unwrap_or(true) {
                errors.push(CoreError::ValueMissing {
                    col: header.clone(),
                    row: idx,
                });
            }
        }

        data_rows.push(mapped);
    }

    (
        RawTable {
            headers,
            rows: data_rows,
        },
        errors,
        extra_texts,
    )
}

fn cell_text_of_row(row: &ElementRef) -> String {
    collapse_whitespace(&row.text().collect::<Vec<_>>().join(" "))
}

fn dedupe_headers(headers: Vec<String>) -> Vec<String> {
    let mut seen: BTreeMap<String, u32> = BTreeMap::new();
    headers
        .into_iter()
        .map(|h| {
            let count = seen.entry(h.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                h
            } else {
                format!("{h} ({count})")
            }
        })
        .collect()
}

fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    collapse_whitespace(&fragment.root_element().text().collect::<Vec<_>>().join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_HTML: &str = r#"
        <html><body>
            <p>Generación del 10 de enero de 2025</p>
            <table>
                <tr><th>Nombre</th><th>Distrito</th><th>Nombre</th></tr>
                <tr><td>Juan</td><td>Centro</td><td>Extra</td></tr>
                <tr><td>Ana</td><td>Norte</td></tr>
            </table>
        </body></html>
    "#;

    #[test]
    fn extracts_headers_rows_and_generation_date() {
        let outcome = parse_body("", Some(SAMPLE_HTML));
        let table = outcome.table.expect("table present");
        assert_eq!(table.headers, vec!["Nombre", "Distrito", "Nombre (2)"]);
        assert_eq!(table.rows.len(), 2);
        for row in &table.rows {
            let keys: std::collections::BTreeSet<_> = row.keys().cloned().collect();
            let expected: std::collections::BTreeSet<_> =
                table.headers.iter().cloned().collect();
            assert_eq!(keys, expected);
        }
        assert_eq!(
            outcome.generation_date.map(|d| d.as_str().to_string()),
            Some("20250110".to_string())
        );
    }

    #[test]
    fn short_row_is_padded_with_empty_strings() {
        let outcome = parse_body("", Some(SAMPLE_HTML));
        let table = outcome.table.unwrap();
        let ana_row = &table.rows[1];
        assert_eq!(ana_row.get("Nombre (2)").unwrap(), "");
    }

    #[test]
    fn missing_html_reports_html_missing() {
        let outcome = parse_body("no html here", None);
        assert!(outcome.table.is_none());
        assert!(matches!(outcome.table_errors[0], CoreError::HtmlMissing));
    }

    #[test]
    fn generation_date_fallback_to_html_stripped_body() {
        let html = r#"
            <html><body>
                <div>Aviso importante</div>
                <div>Generación del 3 de julio de 2025</div>
                <table>
                    <tr><th>A</th><th>B</th></tr>
                    <tr><td>1</td><td>2</td></tr>
                </table>
            </body></html>
        "#;
        let outcome = parse_body("sin fecha aqui", Some(html));
        assert_eq!(
            outcome.generation_date.map(|d| d.as_str().to_string()),
            Some("20250703".to_string())
        );
    }

    #[test]
    fn generation_date_found_in_extra_texts_caption_row() {
        let html = r#"
            <html><body>
                <table>
                    <tr><td colspan="2">Generación del 5 de marzo de 2025</td></tr>
                    <tr><th>A</th><th>B</th></tr>
                    <tr><td>1</td><td>2</td></tr>
                </table>
            </body></html>
        "#;
        let outcome = parse_body("", Some(html));
        assert_eq!(
            outcome.generation_date.map(|d| d.as_str().to_string()),
            Some("20250305".to_string())
        );
    }

    #[test]
    fn missing_required_column_is_reported() {
        let html = r#"
            <html><body>
                <table>
                    <tr><th>A</th><th>B</th></tr>
                    <tr><td>1</td><td>2</td></tr>
                </table>
            </body></html>
        "#;
        let outcome = parse_body("", Some(html));
        let errors = outcome.table_errors;
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, CoreError::ColumnMissing(c) if c == "distrito"))
        );
        assert!(
            errors
                .iter()
                .any(|e| matches!(e, CoreError::ColumnMissing(c) if c == "nombre"))
        );
    }

    #[test]
    fn blank_required_cell_is_reported_as_value_missing() {
        let html = r#"
            <html><body>
                <table>
                    <tr><th>Nombre</th><th>Distrito</th></tr>
                    <tr><td>Juan</td><td>Centro</td></tr>
                    <tr><td></td><td>Norte</td></tr>
                </table>
            </body></html>
        "#;
        let outcome = parse_body("", Some(html));
        let errors = outcome.table_errors;
        assert!(errors.iter().any(
            |e| matches!(e, CoreError::ValueMissing { col, row } if col == "Nombre" && *row == 1)
        ));
        assert!(!errors.iter().any(
            |e| matches!(e, CoreError::ValueMissing { col, .. } if col == "Distrito")
        ));
    }
}
