//! Sheet handles and the cell reader.
//!
//! The core never opens files itself during extraction: callers hand in a
//! [`Sheet`] (a calamine range, or a [`MemorySheet`] built in code) and the
//! reader only performs cell lookups by column letter and row number.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::LazyLock;

use calamine::{open_workbook_auto, Data, Range, Reader};
use regex::Regex;

use crate::errors::{FiberError, FiberResult};
use crate::models::{ColumnLayout, RawRow, NOT_SET};

static ADDRESS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Za-z]{1,3})([1-9][0-9]*)$").unwrap());

static COLUMN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]{1,3}$").unwrap());

// ---------------------------------------------------------------------------
// Cell addressing
// ---------------------------------------------------------------------------

/// An A1-style cell reference. `column` is 0-based, `row` is 1-based.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct CellAddress {
    pub column: u32,
    pub row: u32,
}

impl CellAddress {
    pub fn new(column_letters: &str, row: u32) -> FiberResult<Self> {
        if row == 0 {
            return Err(FiberError::InvalidAddress(format!("{column_letters}{row}")));
        }
        Ok(Self {
            column: column_index(column_letters)?,
            row,
        })
    }

    pub fn column_letters(&self) -> String {
        column_letters(self.column)
    }
}

impl FromStr for CellAddress {
    type Err = FiberError;

    fn from_str(s: &str) -> FiberResult<Self> {
        let caps = ADDRESS_RE
            .captures(s.trim())
            .ok_or_else(|| FiberError::InvalidAddress(s.to_string()))?;
        let row = caps[2]
            .parse::<u32>()
            .map_err(|_| FiberError::InvalidAddress(s.to_string()))?;
        CellAddress::new(&caps[1], row)
    }
}

impl std::fmt::Display for CellAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.column_letters(), self.row)
    }
}

/// `"A"` -> 0, `"Z"` -> 25, `"AA"` -> 26, `"CC"` -> 80.
pub fn column_index(letters: &str) -> FiberResult<u32> {
    if !COLUMN_RE.is_match(letters) {
        return Err(FiberError::InvalidAddress(letters.to_string()));
    }
    let index = letters
        .bytes()
        .map(|b| (b.to_ascii_uppercase() - b'A') as u32 + 1)
        .fold(0u32, |acc, d| acc * 26 + d);
    Ok(index - 1)
}

/// Inverse of [`column_index`].
pub fn column_letters(index: u32) -> String {
    let mut n = index + 1;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        letters.push((b'A' + (n % 26) as u8) as char);
        n /= 26;
    }
    letters.iter().rev().collect()
}

// ---------------------------------------------------------------------------
// Sheet handles
// ---------------------------------------------------------------------------

/// Read-only cell lookup over one worksheet.
pub trait Sheet {
    /// Last addressable row (1-based), or `None` when the handle has no grid
    /// at all.
    fn last_row(&self) -> Option<u32>;

    /// Display text of a cell, or `None` when the cell is absent.
    fn cell_text(&self, address: &CellAddress) -> Option<String>;
}

/// Converts a calamine cell to trimmed text; whole floats lose their `.0`.
pub fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.trim().to_owned(),
        Data::Float(f) => {
            if *f == f.floor() && f.abs() < 1e15 {
                format!("{}", *f as i64)
            } else {
                f.to_string()
            }
        }
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
        Data::Empty => String::new(),
    }
}

impl Sheet for Range<Data> {
    fn last_row(&self) -> Option<u32> {
        self.end().map(|(row, _)| row + 1)
    }

    fn cell_text(&self, address: &CellAddress) -> Option<String> {
        match self.get_value((address.row.checked_sub(1)?, address.column))? {
            Data::Empty => None,
            cell => Some(cell_to_string(cell)),
        }
    }
}

/// Sheet held entirely in memory, keyed by address.
#[derive(Clone, Debug, Default)]
pub struct MemorySheet {
    cells: HashMap<CellAddress, String>,
}

impl MemorySheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, address: &str, value: impl Into<String>) -> FiberResult<()> {
        let address: CellAddress = address.parse()?;
        self.cells.insert(address, value.into());
        Ok(())
    }

    /// Builder form of [`MemorySheet::set`] for literal addresses.
    pub fn with_cell(mut self, address: &str, value: impl Into<String>) -> FiberResult<Self> {
        self.set(address, value)?;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

impl Sheet for MemorySheet {
    fn last_row(&self) -> Option<u32> {
        self.cells.keys().map(|a| a.row).max()
    }

    fn cell_text(&self, address: &CellAddress) -> Option<String> {
        self.cells.get(address).map(|v| v.trim().to_string())
    }
}

/// Open a workbook (xlsx, xls, xlsb, ods) and return its first worksheet.
pub fn load_first_sheet(path: &Path) -> FiberResult<Range<Data>> {
    let mut workbook = open_workbook_auto(path)?;
    let sheet_name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| FiberError::SheetUnreadable(format!("no worksheet in {}", path.display())))?;
    Ok(workbook.worksheet_range(&sheet_name)?)
}

// ---------------------------------------------------------------------------
// Cell reader
// ---------------------------------------------------------------------------

/// Pulls the five named cells of a row at fixed column positions.
#[derive(Clone, Debug)]
pub struct CellReader {
    splice_unit: u32,
    cabinet_code: u32,
    fiber_number: u32,
    legacy_status: u32,
    legacy_distance: u32,
}

impl CellReader {
    pub fn new(layout: &ColumnLayout) -> FiberResult<Self> {
        Ok(Self {
            splice_unit: column_index(&layout.splice_unit)?,
            cabinet_code: column_index(&layout.cabinet_code)?,
            fiber_number: column_index(&layout.fiber_number)?,
            legacy_status: column_index(&layout.legacy_status)?,
            legacy_distance: column_index(&layout.legacy_distance)?,
        })
    }

    fn text<S: Sheet + ?Sized>(sheet: &S, column: u32, row: u32) -> String {
        sheet
            .cell_text(&CellAddress { column, row })
            .unwrap_or_else(|| NOT_SET.to_string())
    }

    /// Read one row; absent cells come back as [`NOT_SET`].
    pub fn read_row<S: Sheet + ?Sized>(&self, sheet: &S, row: u32) -> RawRow {
        RawRow {
            row_index: row,
            splice_unit_raw: Self::text(sheet, self.splice_unit, row),
            cabinet_code: Self::text(sheet, self.cabinet_code, row),
            fiber_number_raw: Self::text(sheet, self.fiber_number, row),
            legacy_status: Self::text(sheet, self.legacy_status, row),
            legacy_distance: Self::text(sheet, self.legacy_distance, row),
        }
    }

    /// True when the raw cabinet-code cell of `row` is absent or blank.
    pub fn cabinet_cell_blank<S: Sheet + ?Sized>(&self, sheet: &S, row: u32) -> bool {
        match sheet.cell_text(&CellAddress {
            column: self.cabinet_code,
            row,
        }) {
            None => true,
            Some(text) => text.trim().is_empty(),
        }
    }
}

impl Default for CellReader {
    fn default() -> Self {
        // Columns BP, CC, CD, K, M.
        Self {
            splice_unit: 67,
            cabinet_code: 80,
            fiber_number: 81,
            legacy_status: 10,
            legacy_distance: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_index_round_trips_letters() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("z").unwrap(), 25);
        assert_eq!(column_index("AA").unwrap(), 26);
        assert_eq!(column_index("BP").unwrap(), 67);
        assert_eq!(column_index("CC").unwrap(), 80);
        assert_eq!(column_index("CD").unwrap(), 81);
        assert_eq!(column_letters(80), "CC");
        assert_eq!(column_letters(701), "ZZ");
        assert_eq!(column_letters(702), "AAA");
    }

    #[test]
    fn column_index_rejects_garbage() {
        assert!(column_index("").is_err());
        assert!(column_index("C1").is_err());
        assert!(column_index("ABCD").is_err());
    }

    #[test]
    fn parse_cell_address() {
        let addr: CellAddress = "CC42".parse().unwrap();
        assert_eq!(addr.column, 80);
        assert_eq!(addr.row, 42);
        assert_eq!(addr.to_string(), "CC42");
        assert!("CC0".parse::<CellAddress>().is_err());
        assert!("42".parse::<CellAddress>().is_err());
    }

    #[test]
    fn default_reader_matches_default_layout() {
        let from_layout = CellReader::new(&ColumnLayout::default()).unwrap();
        let sheet = MemorySheet::new()
            .with_cell("BP3", "PBO-1")
            .unwrap()
            .with_cell("CC3", "B2-T1-MODULE-A")
            .unwrap()
            .with_cell("CD3", "4")
            .unwrap()
            .with_cell("K3", "OK")
            .unwrap()
            .with_cell("M3", "12")
            .unwrap();
        assert_eq!(
            from_layout.read_row(&sheet, 3),
            CellReader::default().read_row(&sheet, 3)
        );
    }

    #[test]
    fn read_row_fills_missing_cells_with_sentinel() {
        let sheet = MemorySheet::new()
            .with_cell("CC3", "B2-T1-MODULE-A")
            .unwrap()
            .with_cell("CD3", "7")
            .unwrap();
        let row = CellReader::default().read_row(&sheet, 3);
        assert_eq!(row.row_index, 3);
        assert_eq!(row.cabinet_code, "B2-T1-MODULE-A");
        assert_eq!(row.fiber_number_raw, "7");
        assert_eq!(row.splice_unit_raw, NOT_SET);
        assert_eq!(row.legacy_status, NOT_SET);
        assert_eq!(row.legacy_distance, NOT_SET);
    }

    #[test]
    fn calamine_range_is_a_sheet() {
        let mut range: Range<Data> = Range::new((0, 0), (3, 81));
        range.set_value((2, 80), Data::String("B2-T1-MODULE-A".to_string()));
        range.set_value((2, 81), Data::Float(3.0));
        range.set_value((2, 12), Data::Int(120));

        let reader = CellReader::default();
        let row = reader.read_row(&range, 3);
        assert_eq!(row.cabinet_code, "B2-T1-MODULE-A");
        assert_eq!(row.fiber_number_raw, "3");
        assert_eq!(row.legacy_distance, "120");
        assert_eq!(row.splice_unit_raw, NOT_SET);
        assert_eq!(range.last_row(), Some(4));
        assert!(!reader.cabinet_cell_blank(&range, 3));
        assert!(reader.cabinet_cell_blank(&range, 4));
    }

    #[test]
    fn blank_cabinet_cell_counts_as_blank() {
        let sheet = MemorySheet::new().with_cell("CC5", "   ").unwrap();
        let reader = CellReader::default();
        assert!(reader.cabinet_cell_blank(&sheet, 5));
        assert!(reader.cabinet_cell_blank(&sheet, 6));
    }

    #[test]
    fn empty_memory_sheet_has_no_grid() {
        assert_eq!(MemorySheet::new().last_row(), None);
    }

    fn fixture(name: &str) -> std::path::PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata").join(name)
    }

    #[test]
    fn loads_first_worksheet_of_xlsx() {
        let range = load_first_sheet(&fixture("plan.xlsx")).unwrap();
        assert_eq!(range.last_row(), Some(8));
        let cell = |a: &str| range.cell_text(&a.parse::<CellAddress>().unwrap());
        assert_eq!(cell("BP3").as_deref(), Some("PBO-B2-T1-MODULE-A-99"));
        assert_eq!(cell("CC3").as_deref(), Some("B2-T1-MODULE-A"));
        // Numeric cells read back without a trailing `.0`.
        assert_eq!(cell("CD3").as_deref(), Some("1"));
        assert_eq!(cell("M3").as_deref(), Some("120"));
        assert_eq!(cell("CC7"), None);

        let row = CellReader::default().read_row(&range, 4);
        assert_eq!(row.fiber_number_raw, "2");
        assert_eq!(row.legacy_status, NOT_SET);
    }
}
