//! Row extraction for uploaded stock files (CSV, XLSX).
//!
//! The first non-blank row is the header. Header names are trimmed and
//! lower-cased so that column aliases match regardless of spelling in the
//! file. Each data row becomes a [`RawRow`] whose `row_index` is the row
//! number a user sees in a spreadsheet (header = 1). Blank rows are skipped
//! without renumbering the rows after them.

use std::collections::BTreeMap;
use std::io::Read;

use catalog_reconcile_core::bulk::RawRow;
use catalog_reconcile_core::file_shape::FileKind;
use quick_xml::events::{BytesStart, Event};

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;
/// Maximum cells to read from the worksheet (avoids unbounded memory).
const XLSX_MAX_CELLS: usize = 1_000_000;
/// Worksheet limits of the OOXML format: columns A..=XFD, rows 1..=1048576.
const XLSX_MAX_COLUMNS: usize = 16_384;
const XLSX_MAX_ROWS: usize = 1_048_576;

const SHARED_STRINGS: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/sheet";

#[derive(Debug)]
pub enum ExtractError {
    /// Binary `.xls` workbooks are accepted at upload but cannot be read.
    LegacyXls,
    Csv(String),
    Ooxml(String),
    NoHeader,
}

impl std::fmt::Display for ExtractError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExtractError::LegacyXls => write!(
                f,
                "legacy .xls workbooks cannot be read; re-export the sheet as .xlsx or .csv"
            ),
            ExtractError::Csv(e) => write!(f, "CSV parsing failed: {}", e),
            ExtractError::Ooxml(e) => write!(f, "XLSX parsing failed: {}", e),
            ExtractError::NoHeader => write!(f, "file has no header row"),
        }
    }
}

impl std::error::Error for ExtractError {}

/// Parse a validated upload into rows.
pub fn extract_rows(bytes: &[u8], kind: FileKind) -> Result<Vec<RawRow>, ExtractError> {
    let grid = match kind {
        FileKind::Csv => read_csv(bytes)?,
        FileKind::Xlsx => read_xlsx(bytes)?,
        FileKind::Xls => return Err(ExtractError::LegacyXls),
    };
    rows_from_grid(grid)
}

/// One physical row: its 1-based row number and cells by 0-based column.
type GridRow = (usize, BTreeMap<usize, String>);

fn rows_from_grid(grid: Vec<GridRow>) -> Result<Vec<RawRow>, ExtractError> {
    let mut rows = grid.into_iter().filter(|(_, cells)| !is_blank(cells));
    let (_, header_cells) = rows.next().ok_or(ExtractError::NoHeader)?;
    let header: BTreeMap<usize, String> = header_cells
        .into_iter()
        .map(|(col, name)| (col, name.trim().to_lowercase()))
        .filter(|(_, name)| !name.is_empty())
        .collect();

    Ok(rows
        .map(|(row_number, cells)| {
            let named = cells.into_iter().filter_map(|(col, value)| {
                header
                    .get(&col)
                    .map(|name| (name.clone(), value.trim().to_string()))
            });
            RawRow::new(row_number, named)
        })
        .collect())
}

fn is_blank(cells: &BTreeMap<usize, String>) -> bool {
    cells.values().all(|v| v.trim().is_empty())
}

// ── CSV ──────────────────────────────────────────────────────────────────

fn read_csv(bytes: &[u8]) -> Result<Vec<GridRow>, ExtractError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ExtractError::Csv(format!("file is not valid UTF-8: {}", e)))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let records = split_csv(text)?;
    Ok(records
        .into_iter()
        .enumerate()
        .map(|(i, fields)| (i + 1, fields.into_iter().enumerate().collect()))
        .collect())
}

/// RFC 4180 records: quoted fields may contain commas, doubled quotes, and
/// line breaks. Both LF and CRLF end a record.
fn split_csv(text: &str) -> Result<Vec<Vec<String>>, ExtractError> {
    let mut records = Vec::new();
    let mut record: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1usize;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.trim().is_empty() => {
                field.clear();
                in_quotes = true;
            }
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\r' | '\n' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                records.push(std::mem::take(&mut record));
            }
            _ => field.push(c),
        }
    }

    if in_quotes {
        return Err(ExtractError::Csv(format!(
            "unterminated quoted field at line {}",
            line
        )));
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}

// ── XLSX ─────────────────────────────────────────────────────────────────

fn read_xlsx(bytes: &[u8]) -> Result<Vec<GridRow>, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let shared_strings = if archive.file_names().any(|n| n == SHARED_STRINGS) {
        read_shared_strings(&mut archive)?
    } else {
        Vec::new()
    };
    let sheet = first_worksheet_name(&archive)
        .ok_or_else(|| ExtractError::Ooxml("workbook has no worksheets".to_string()))?;
    let xml = read_zip_entry_bounded(&mut archive, &sheet, MAX_XML_ENTRY_BYTES)?;
    read_sheet_rows(&xml, &shared_strings)
}

fn read_zip_entry_bounded(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
    name: &str,
    max_bytes: u64,
) -> Result<Vec<u8>, ExtractError> {
    let entry = archive
        .by_name(name)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let mut out = Vec::new();
    entry
        .take(max_bytes)
        .read_to_end(&mut out)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if out.len() as u64 >= max_bytes {
        return Err(ExtractError::Ooxml(format!(
            "ZIP entry {} exceeds size limit ({} bytes)",
            name, max_bytes
        )));
    }
    Ok(out)
}

fn first_worksheet_name(archive: &zip::ZipArchive<std::io::Cursor<&[u8]>>) -> Option<String> {
    archive
        .file_names()
        .filter(|n| n.starts_with(WORKSHEET_PREFIX) && n.ends_with(".xml"))
        .min_by_key(|name| {
            name.trim_start_matches(WORKSHEET_PREFIX)
                .trim_end_matches(".xml")
                .parse::<u32>()
                .unwrap_or(u32::MAX)
        })
        .map(|s| s.to_string())
}

/// Shared string table; rich-text runs inside one `<si>` are concatenated.
fn read_shared_strings(
    archive: &mut zip::ZipArchive<std::io::Cursor<&[u8]>>,
) -> Result<Vec<String>, ExtractError> {
    let xml = read_zip_entry_bounded(archive, SHARED_STRINGS, MAX_XML_ENTRY_BYTES)?;
    let mut strings = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml.as_slice());
    let mut buf = Vec::new();
    let mut current: Option<String> = None;
    let mut in_t = false;
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"si" => current = Some(String::new()),
                b"t" => in_t = current.is_some(),
                _ => {}
            },
            Ok(Event::Text(te)) if in_t => {
                if let Some(s) = current.as_mut() {
                    s.push_str(&te.unescape().unwrap_or_default());
                }
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_t = false,
                b"si" => {
                    if let Some(s) = current.take() {
                        strings.push(s);
                    }
                }
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"si" => strings.push(String::new()),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    Ok(strings)
}

/// Where the text of the current cell comes from.
#[derive(Clone, Copy, PartialEq)]
enum CellText {
    None,
    Value,
    Inline,
}

fn read_sheet_rows(xml: &[u8], shared_strings: &[String]) -> Result<Vec<GridRow>, ExtractError> {
    let mut rows: Vec<GridRow> = Vec::new();
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();

    let mut row_number = 0usize;
    let mut cells: BTreeMap<usize, String> = BTreeMap::new();
    let mut col = 0usize;
    let mut cell_type = String::new();
    let mut value = String::new();
    let mut text = CellText::None;
    let mut cell_count = 0usize;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_number = row_number_of(attr_value(&e, b"r"), row_number);
                    cells.clear();
                    col = 0;
                }
                b"c" => {
                    col = attr_value(&e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(col);
                    cell_type = attr_value(&e, b"t").unwrap_or_default();
                    value.clear();
                }
                b"v" => text = CellText::Value,
                b"t" if cell_type == "inlineStr" => text = CellText::Inline,
                _ => {}
            },
            Ok(Event::Text(te)) if text != CellText::None => {
                value.push_str(&te.unescape().unwrap_or_default());
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"v" | b"t" => text = CellText::None,
                b"c" => {
                    if let Some(v) = cell_text(&cell_type, &value, shared_strings) {
                        cells.insert(col, v);
                        cell_count += 1;
                    }
                    col = col.saturating_add(1);
                }
                b"row" => rows.push((row_number, std::mem::take(&mut cells))),
                _ => {}
            },
            Ok(Event::Empty(e)) => match e.local_name().as_ref() {
                b"row" => {
                    row_number = row_number_of(attr_value(&e, b"r"), row_number);
                }
                b"c" => {
                    col = attr_value(&e, b"r")
                        .and_then(|r| column_index(&r))
                        .unwrap_or(col)
                        .saturating_add(1);
                }
                _ => {}
            },
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        if cell_count > XLSX_MAX_CELLS {
            return Err(ExtractError::Ooxml(format!(
                "worksheet has more than {} cells",
                XLSX_MAX_CELLS
            )));
        }
        buf.clear();
    }
    Ok(rows)
}

fn cell_text(cell_type: &str, raw: &str, shared_strings: &[String]) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    match cell_type {
        "s" => raw
            .trim()
            .parse::<usize>()
            .ok()
            .and_then(|i| shared_strings.get(i).cloned()),
        "b" => Some(if raw.trim() == "1" { "TRUE" } else { "FALSE" }.to_string()),
        _ => Some(raw.to_string()),
    }
}

fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// 0-based column index of an A1-style reference: `"B7"` → 1, `"AA3"` → 26.
///
/// `None` for references without letters or beyond column XFD; the caller
/// then falls back to the cell's position in the row.
fn column_index(reference: &str) -> Option<usize> {
    let mut n = 0usize;
    let mut any = false;
    for c in reference.chars().take_while(|c| c.is_ascii_alphabetic()) {
        let digit = c.to_ascii_uppercase() as usize - 'A' as usize + 1;
        n = n.checked_mul(26)?.checked_add(digit)?;
        if n > XLSX_MAX_COLUMNS {
            return None;
        }
        any = true;
    }
    any.then(|| n - 1)
}

/// Row number from a `<row r="…">` attribute, or the row after `previous`.
fn row_number_of(attr: Option<String>, previous: usize) -> usize {
    attr.and_then(|r| r.parse::<usize>().ok())
        .filter(|n| (1..=XLSX_MAX_ROWS).contains(n))
        .unwrap_or_else(|| previous.saturating_add(1))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;

    /// Build a minimal one-sheet workbook. `rows` cells that parse as numbers
    /// are written as numeric cells, everything else as shared strings.
    pub(crate) fn xlsx_bytes(rows: &[&[&str]]) -> Vec<u8> {
        let mut shared: Vec<String> = Vec::new();
        let mut sheet = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><sheetData>"#,
        );
        for (r, cells) in rows.iter().enumerate() {
            sheet.push_str(&format!(r#"<row r="{}">"#, r + 1));
            for (c, v) in cells.iter().enumerate() {
                if v.is_empty() {
                    continue;
                }
                let reference = format!("{}{}", (b'A' + c as u8) as char, r + 1);
                if v.parse::<f64>().is_ok() {
                    sheet.push_str(&format!(r#"<c r="{}"><v>{}</v></c>"#, reference, v));
                } else {
                    shared.push(v.to_string());
                    sheet.push_str(&format!(
                        r#"<c r="{}" t="s"><v>{}</v></c>"#,
                        reference,
                        shared.len() - 1
                    ));
                }
            }
            sheet.push_str("</row>");
        }
        sheet.push_str("</sheetData></worksheet>");

        let mut sst = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?><sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">"#,
        );
        for s in &shared {
            sst.push_str(&format!("<si><t>{}</t></si>", s));
        }
        sst.push_str("</sst>");

        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("xl/sharedStrings.xml", options).unwrap();
        zip.write_all(sst.as_bytes()).unwrap();
        zip.start_file("xl/worksheets/sheet1.xml", options).unwrap();
        zip.write_all(sheet.as_bytes()).unwrap();
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn csv_headers_are_normalized() {
        let rows = extract_rows(b" SKU ,Qty\r\nA-1,5\r\nB-2,40\r\n", FileKind::Csv).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_index, 2);
        assert_eq!(rows[0].cells.get("sku").map(String::as_str), Some("A-1"));
        assert_eq!(rows[1].cells.get("qty").map(String::as_str), Some("40"));
    }

    #[test]
    fn csv_quoted_fields() {
        let data = "sku,status,note\n\"A,1\",\"Low Stock\",\"said \"\"hi\"\"\nthen left\"\n";
        let rows = extract_rows(data.as_bytes(), FileKind::Csv).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].cells["sku"], "A,1");
        assert_eq!(rows[0].cells["note"], "said \"hi\"\nthen left");
    }

    #[test]
    fn csv_blank_rows_keep_numbering() {
        let rows = extract_rows(b"sku,quantity\nA,1\n,\n\nB,2", FileKind::Csv).unwrap();
        let idx: Vec<usize> = rows.iter().map(|r| r.row_index).collect();
        assert_eq!(idx, vec![2, 5]);
    }

    #[test]
    fn csv_unterminated_quote_is_error() {
        let err = extract_rows(b"sku\n\"A", FileKind::Csv).unwrap_err();
        assert!(matches!(err, ExtractError::Csv(_)));
    }

    #[test]
    fn empty_file_has_no_header() {
        let err = extract_rows(b"\n\n", FileKind::Csv).unwrap_err();
        assert!(matches!(err, ExtractError::NoHeader));
    }

    #[test]
    fn xlsx_first_sheet_rows() {
        let bytes = xlsx_bytes(&[&["Product Code", "Stock"], &["A", "0"], &["B", "40"]]);
        let rows = extract_rows(&bytes, FileKind::Xlsx).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].row_index, 2);
        assert_eq!(rows[0].cells["product code"], "A");
        assert_eq!(rows[1].cells["stock"], "40");
    }

    #[test]
    fn xlsx_sparse_cells_use_references() {
        let bytes = xlsx_bytes(&[&["sku", "note", "quantity"], &["A", "", "7"]]);
        let rows = extract_rows(&bytes, FileKind::Xlsx).unwrap();
        assert_eq!(rows[0].cells.get("note"), None);
        assert_eq!(rows[0].cells["quantity"], "7");
    }

    #[test]
    fn legacy_xls_and_bad_zip() {
        assert!(matches!(
            extract_rows(b"\xd0\xcf\x11\xe0", FileKind::Xls).unwrap_err(),
            ExtractError::LegacyXls
        ));
        assert!(matches!(
            extract_rows(b"not a zip", FileKind::Xlsx).unwrap_err(),
            ExtractError::Ooxml(_)
        ));
    }

    #[test]
    fn column_letters() {
        assert_eq!(column_index("A1"), Some(0));
        assert_eq!(column_index("Z9"), Some(25));
        assert_eq!(column_index("AA3"), Some(26));
        assert_eq!(column_index("12"), None);
        assert_eq!(column_index("XFD1"), Some(16_383));
        assert_eq!(column_index("XFE1"), None);
        assert_eq!(column_index("ZZZZZZZZZZZZZZZ1"), None);
    }

    #[test]
    fn oversized_references_fall_back_to_position() {
        let sheet = br#"<worksheet><sheetData>
            <row r="1"><c r="A1" t="inlineStr"><is><t>sku</t></is></c><c r="ZZZZZZZZZZZZZZZ1" t="inlineStr"><is><t>qty</t></is></c></row>
            <row r="99999999999999999999999"><c r="A2" t="inlineStr"><is><t>A-1</t></is></c><c r="B2"><v>4</v></c></row>
        </sheetData></worksheet>"#;
        let rows = read_sheet_rows(sheet, &[]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 1);
        assert_eq!(rows[0].1.get(&1).map(String::as_str), Some("qty"));
        assert_eq!(rows[1].0, 2);
        assert_eq!(rows[1].1.get(&1).map(String::as_str), Some("4"));
    }
}
