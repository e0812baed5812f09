//! Tabular uploads (CSV/TSV and spreadsheet workbooks).
//!
//! Parsing differs per format; all of them share `render_grid`, which turns a
//! row/column table into a plain-text grid a model can read cell by cell.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader};

use super::types::TextExtractor;
use super::ExtractionError;

const EMPTY_TABLE: &str = "(empty table)";

/// Delimited text tables.
pub struct DelimitedExtractor {
    delimiter: u8,
}

impl DelimitedExtractor {
    pub const CSV: Self = Self { delimiter: b',' };
    pub const TSV: Self = Self { delimiter: b'\t' };

    pub fn parse_rows(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>, ExtractionError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(bytes);

        let mut rows = Vec::new();
        for record in reader.byte_records() {
            let record = record.map_err(|e| ExtractionError::Csv(e.to_string()))?;
            rows.push(
                record
                    .iter()
                    .map(|field| String::from_utf8_lossy(field).into_owned())
                    .collect(),
            );
        }
        Ok(rows)
    }
}

impl TextExtractor for DelimitedExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        Ok(render_grid(&self.parse_rows(bytes)?))
    }
}

/// Spreadsheet workbooks (xlsx, xlsm, xlsb, xls, ods). Every sheet is
/// rendered in workbook order under a `Sheet: <name>` line.
pub struct WorkbookExtractor;

impl TextExtractor for WorkbookExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<String, ExtractionError> {
        let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes.to_vec()))
            .map_err(|e| ExtractionError::Spreadsheet(e.to_string()))?;

        let mut sections = Vec::new();
        for name in workbook.sheet_names().to_vec() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| ExtractionError::Spreadsheet(format!("sheet {name}: {e}")))?;

            let rows: Vec<Vec<String>> = range
                .rows()
                .map(|row| row.iter().map(cell_text).collect())
                .collect();

            sections.push(format!("Sheet: {name}\n{}", render_grid(&rows)));
        }

        if sections.is_empty() {
            return Ok(EMPTY_TABLE.to_string());
        }
        Ok(sections.join("\n\n"))
    }
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        other => other.to_string(),
    }
}

/// Render rows as a grid. The first row is treated as the header.
///
/// ```text
/// +------+------+
/// | 日期 | 收盘 |
/// +======+======+
/// | 1    | 2    |
/// +------+------+
/// ```
///
/// Ragged rows are padded; embedded line breaks become spaces.
pub fn render_grid(rows: &[Vec<String>]) -> String {
    let rows: Vec<Vec<String>> = rows
        .iter()
        .filter(|row| row.iter().any(|cell| !cell.trim().is_empty()))
        .map(|row| row.iter().map(|cell| flatten_cell(cell)).collect())
        .collect();

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    if columns == 0 {
        return EMPTY_TABLE.to_string();
    }

    let mut widths = vec![1usize; columns];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let border = |fill: char| {
        let mut line = String::from("+");
        for w in &widths {
            line.extend(std::iter::repeat(fill).take(w + 2));
            line.push('+');
        }
        line
    };

    let mut lines = vec![border('-')];
    for (index, row) in rows.iter().enumerate() {
        let mut line = String::from("|");
        for (i, w) in widths.iter().enumerate() {
            let cell = row.get(i).map(String::as_str).unwrap_or("");
            let pad = w - cell.chars().count();
            line.push(' ');
            line.push_str(cell);
            line.extend(std::iter::repeat(' ').take(pad + 1));
            line.push('|');
        }
        lines.push(line);
        lines.push(if index == 0 && rows.len() > 1 {
            border('=')
        } else {
            border('-')
        });
    }

    lines.join("\n")
}

fn flatten_cell(cell: &str) -> String {
    cell.split(|c: char| c == '\r' || c == '\n')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
