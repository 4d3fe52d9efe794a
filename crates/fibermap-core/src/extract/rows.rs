//! Row iteration over a sheet, stopping at the first blank cabinet cell.
//!
//! The walker stops as soon as the raw cabinet-code cell of a row is blank,
//! even when more data follows further down. Rows after such a gap are never
//! read.

use crate::errors::{FiberError, FiberResult};
use crate::extract::sheet::{CellReader, Sheet};
use crate::models::RawRow;

pub struct RowWalker<'a, S: Sheet + ?Sized> {
    sheet: &'a S,
    reader: &'a CellReader,
    next_row: u32,
    last_row: u32,
    done: bool,
}

impl<'a, S: Sheet + ?Sized> RowWalker<'a, S> {
    /// Start at `first_row` (1-based). `max_row` caps how far the walker may go.
    pub fn new(
        sheet: &'a S,
        reader: &'a CellReader,
        first_row: u32,
        max_row: u32,
    ) -> FiberResult<Self> {
        if sheet.last_row().is_none() {
            return Err(FiberError::SheetUnreadable(
                "sheet has no addressable cells".to_string(),
            ));
        }
        Ok(Self {
            sheet,
            reader,
            next_row: first_row.max(1),
            last_row: max_row,
            done: false,
        })
    }

    /// Row the walker would read next.
    pub fn position(&self) -> u32 {
        self.next_row
    }
}

impl<S: Sheet + ?Sized> Iterator for RowWalker<'_, S> {
    type Item = RawRow;

    fn next(&mut self) -> Option<RawRow> {
        if self.done {
            return None;
        }
        if self.next_row > self.last_row || self.reader.cabinet_cell_blank(self.sheet, self.next_row)
        {
            self.done = true;
            return None;
        }
        let row = self.reader.read_row(self.sheet, self.next_row);
        self.next_row += 1;
        Some(row)
    }
}

impl<S: Sheet + ?Sized> std::iter::FusedIterator for RowWalker<'_, S> {}
