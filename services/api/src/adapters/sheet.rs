//! services/api/src/adapters/sheet.rs
//!
//! This module contains the tabular-file adapter, the concrete
//! implementation of the `SheetParser` port. It dispatches on the file
//! extension: CSV via the `csv` crate, Excel workbooks via `calamine`.
//! Rows come out as raw strings; validating them is the importer's job.

use std::io::Cursor;
use std::path::Path;

use calamine::{open_workbook_auto_from_rs, Data, Reader};
use inventory_core::domain::RawRecord;
use inventory_core::ports::{PortError, PortResult, SheetParser};

/// Parses `.csv`, `.xlsx`, and `.xls` uploads into raw import records.
#[derive(Clone, Default)]
pub struct TabularFileParser;

impl TabularFileParser {
    pub fn new() -> Self {
        Self
    }
}

impl SheetParser for TabularFileParser {
    fn parse(&self, file_name: &str, bytes: &[u8]) -> PortResult<Vec<RawRecord>> {
        let extension = Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| PortError::UnsupportedFormat(file_name.to_string()))?;

        match extension.as_str() {
            "csv" => parse_csv(bytes),
            "xlsx" | "xls" => parse_excel(bytes),
            _ => Err(PortError::UnsupportedFormat(file_name.to_string())),
        }
    }
}

/// Finds the `name` and `quantity` columns in a header row,
/// case-insensitively.
fn column_indices<'a, I>(header: I) -> PortResult<(usize, usize)>
where
    I: Iterator<Item = &'a str> + Clone,
{
    let position = |wanted: &str| {
        header
            .clone()
            .position(|h| h.trim().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| PortError::InvalidRecord(format!("file has no '{}' column", wanted)))
    };
    Ok((position("name")?, position("quantity")?))
}

fn parse_csv(bytes: &[u8]) -> PortResult<Vec<RawRecord>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .map_err(|e| PortError::InvalidRecord(format!("unreadable CSV header: {}", e)))?
        .clone();
    let (name_idx, quantity_idx) = column_indices(headers.iter())?;

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| PortError::InvalidRecord(format!("unreadable CSV row: {}", e)))?;
        records.push(RawRecord {
            name: row.get(name_idx).unwrap_or_default().to_string(),
            quantity: row.get(quantity_idx).unwrap_or_default().to_string(),
        });
    }
    Ok(records)
}

fn parse_excel(bytes: &[u8]) -> PortResult<Vec<RawRecord>> {
    let cursor = Cursor::new(bytes.to_vec());
    let mut workbook = open_workbook_auto_from_rs(cursor)
        .map_err(|e| PortError::InvalidRecord(format!("unreadable workbook: {}", e)))?;
    // The first sheet is the import source, matching what users expect
    // from a single-sheet template.
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| PortError::InvalidRecord("workbook has no sheets".to_string()))?
        .map_err(|e| PortError::InvalidRecord(format!("unreadable sheet: {}", e)))?;

    let mut rows = range.rows();
    let header: Vec<String> = rows
        .next()
        .ok_or_else(|| PortError::InvalidRecord("sheet has no header row".to_string()))?
        .iter()
        .map(Data::to_string)
        .collect();
    let (name_idx, quantity_idx) = column_indices(header.iter().map(String::as_str))?;

    Ok(rows
        .map(|row| RawRecord {
            name: cell_string(row.get(name_idx)),
            quantity: cell_string(row.get(quantity_idx)),
        })
        .collect())
}

fn cell_string(cell: Option<&Data>) -> String {
    cell.map(|c| c.to_string().trim().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_rows_become_raw_records() {
        let csv = b"Name,Quantity\nPen,10\nNotebook, 3 \n";
        let records = TabularFileParser::new().parse("stock.csv", csv).unwrap();
        assert_eq!(
            records,
            vec![
                RawRecord {
                    name: "Pen".into(),
                    quantity: "10".into()
                },
                RawRecord {
                    name: "Notebook".into(),
                    quantity: "3".into()
                },
            ]
        );
    }

    #[test]
    fn extension_matching_ignores_case() {
        let csv = b"name,quantity\npen,1\n";
        let records = TabularFileParser::new().parse("STOCK.CSV", csv).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn extra_columns_are_ignored() {
        let csv = b"sku,quantity,name\nA-1,5,pen\n";
        let records = TabularFileParser::new().parse("stock.csv", csv).unwrap();
        assert_eq!(records[0].name, "pen");
        assert_eq!(records[0].quantity, "5");
    }

    #[test]
    fn unsupported_extensions_are_refused() {
        let parser = TabularFileParser::new();
        assert!(matches!(
            parser.parse("stock.pdf", b"%PDF"),
            Err(PortError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            parser.parse("stock", b""),
            Err(PortError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn a_missing_required_column_fails_the_file() {
        let csv = b"name,count\npen,1\n";
        assert!(matches!(
            TabularFileParser::new().parse("stock.csv", csv),
            Err(PortError::InvalidRecord(_))
        ));
    }
}
