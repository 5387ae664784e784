//! A1-style range addresses.

use std::fmt;

use serde::Serialize;

use crate::error::AddressError;

pub const MAX_ROWS: u32 = 1_048_576;
pub const MAX_COLS: u32 = 16_384;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct CellRef {
    /// 1-based row.
    pub row: u32,
    /// 1-based column.
    pub col: u32,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    pub fn parse(s: &str) -> Result<Self, AddressError> {
        let s = s.trim().replace('$', "");
        let split = s
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(|| AddressError::InvalidCell(s.clone()))?;
        let (letters, digits) = s.split_at(split);
        if letters.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(AddressError::InvalidCell(s.clone()));
        }
        let col = column_index(letters).ok_or_else(|| AddressError::InvalidCell(s.clone()))?;
        let row: u32 = digits
            .parse()
            .map_err(|_| AddressError::InvalidCell(s.clone()))?;
        if row == 0 || row > MAX_ROWS || col > MAX_COLS {
            return Err(AddressError::OutOfBounds(s.clone()));
        }
        Ok(Self { row, col })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row)
    }
}

/// A rectangular range, optionally sheet-qualified.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RangeAddress {
    pub sheet: Option<String>,
    pub start: CellRef,
    pub end: CellRef,
}

impl RangeAddress {
    pub fn cell(cell: CellRef) -> Self {
        Self {
            sheet: None,
            start: cell,
            end: cell,
        }
    }

    pub fn new(start: CellRef, end: CellRef) -> Self {
        Self {
            sheet: None,
            start: CellRef::new(start.row.min(end.row), start.col.min(end.col)),
            end: CellRef::new(start.row.max(end.row), start.col.max(end.col)),
        }
    }

    /// Parses `A1`, `A1:C3`, `A:C`, `3:5`, optionally prefixed with `Sheet!`
    /// or `'Quoted Sheet'!`.
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }
        let (sheet, body) = match input.rfind('!') {
            Some(i) => {
                let raw = &input[..i];
                let name = raw
                    .strip_prefix('\'')
                    .and_then(|r| r.strip_suffix('\''))
                    .unwrap_or(raw);
                (Some(name.replace("''", "'")), &input[i + 1..])
            }
            None => (None, input),
        };
        let (a, b) = match body.split_once(':') {
            Some((a, b)) => (a, b),
            None => (body, body),
        };
        let (start, end) = if is_letters(a) && is_letters(b) {
            let c1 = column_index(a).ok_or_else(|| AddressError::InvalidCell(a.to_string()))?;
            let c2 = column_index(b).ok_or_else(|| AddressError::InvalidCell(b.to_string()))?;
            (CellRef::new(1, c1), CellRef::new(MAX_ROWS, c2))
        } else if is_digits(a) && is_digits(b) {
            let r1 = parse_row(a)?;
            let r2 = parse_row(b)?;
            (CellRef::new(r1, 1), CellRef::new(r2, MAX_COLS))
        } else {
            (CellRef::parse(a)?, CellRef::parse(b)?)
        };
        if start.col > MAX_COLS || end.col > MAX_COLS {
            return Err(AddressError::OutOfBounds(body.to_string()));
        }
        let mut range = RangeAddress::new(start, end);
        range.sheet = sheet;
        Ok(range)
    }

    pub fn rows(&self) -> u32 {
        self.end.row - self.start.row + 1
    }

    pub fn cols(&self) -> u32 {
        self.end.col - self.start.col + 1
    }

    pub fn cell_count(&self) -> u64 {
        self.rows() as u64 * self.cols() as u64
    }

    pub fn is_single_cell(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row)
            && (self.start.col..=self.end.col).contains(&cell.col)
    }

    /// Cell at a 0-based offset from the top-left corner.
    pub fn cell_at(&self, row: u32, col: u32) -> Option<CellRef> {
        let cell = CellRef::new(self.start.row + row, self.start.col + col);
        self.contains(cell).then_some(cell)
    }

    /// Shifts the range; fails when it would leave the sheet.
    pub fn offset(&self, rows: i64, cols: i64) -> Option<Self> {
        let shift = |v: u32, d: i64, max: u32| {
            let n = v as i64 + d;
            (1..=max as i64).contains(&n).then_some(n as u32)
        };
        Some(Self {
            sheet: self.sheet.clone(),
            start: CellRef::new(
                shift(self.start.row, rows, MAX_ROWS)?,
                shift(self.start.col, cols, MAX_COLS)?,
            ),
            end: CellRef::new(
                shift(self.end.row, rows, MAX_ROWS)?,
                shift(self.end.col, cols, MAX_COLS)?,
            ),
        })
    }

    /// Grows or shrinks the bottom-right corner.
    pub fn resize(&self, delta_rows: i64, delta_cols: i64) -> Option<Self> {
        let row = self.end.row as i64 + delta_rows;
        let col = self.end.col as i64 + delta_cols;
        if row < self.start.row as i64
            || col < self.start.col as i64
            || row > MAX_ROWS as i64
            || col > MAX_COLS as i64
        {
            return None;
        }
        Some(Self {
            sheet: self.sheet.clone(),
            start: self.start,
            end: CellRef::new(row as u32, col as u32),
        })
    }

    /// Address without the sheet prefix.
    pub fn local(&self) -> String {
        if self.is_single_cell() {
            self.start.to_string()
        } else {
            format!("{}:{}", self.start, self.end)
        }
    }

    pub fn cells(&self) -> impl Iterator<Item = CellRef> + '_ {
        (self.start.row..=self.end.row)
            .flat_map(move |r| (self.start.col..=self.end.col).map(move |c| CellRef::new(r, c)))
    }
}

impl fmt::Display for RangeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.sheet {
            Some(sheet) if needs_quotes(sheet) => {
                write!(f, "'{}'!{}", sheet.replace('\'', "''"), self.local())
            }
            Some(sheet) => write!(f, "{}!{}", sheet, self.local()),
            None => f.write_str(&self.local()),
        }
    }
}

fn needs_quotes(sheet: &str) -> bool {
    !sheet.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_letters(s: &str) -> bool {
    let s = s.trim_start_matches('$');
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphabetic())
}

fn is_digits(s: &str) -> bool {
    let s = s.trim_start_matches('$');
    !s.is_empty() && s.chars().all(|c| c.is_ascii_digit())
}

fn parse_row(s: &str) -> Result<u32, AddressError> {
    let row: u32 = s
        .trim_start_matches('$')
        .parse()
        .map_err(|_| AddressError::InvalidCell(s.to_string()))?;
    if row == 0 || row > MAX_ROWS {
        return Err(AddressError::OutOfBounds(s.to_string()));
    }
    Ok(row)
}

/// `A` -> 1, `Z` -> 26, `AA` -> 27.
pub fn column_index(letters: &str) -> Option<u32> {
    let letters = letters.trim_start_matches('$');
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut n: u32 = 0;
    for c in letters.chars() {
        if !c.is_ascii_alphabetic() {
            return None;
        }
        n = n * 26 + (c.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(n)
}

pub fn column_letters(mut col: u32) -> String {
    let mut out = Vec::new();
    while col > 0 {
        let rem = (col - 1) % 26;
        out.push((b'A' + rem as u8) as char);
        col = (col - 1) / 26;
    }
    out.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rectangles() {
        let r = RangeAddress::parse("B2:D10").unwrap();
        assert_eq!((r.rows(), r.cols()), (9, 3));
        assert_eq!(r.to_string(), "B2:D10");
    }

    #[test]
    fn parses_sheet_qualified() {
        let r = RangeAddress::parse("'Cash Flow'!$A$1:B2").unwrap();
        assert_eq!(r.sheet.as_deref(), Some("Cash Flow"));
        assert_eq!(r.to_string(), "'Cash Flow'!A1:B2");
    }

    #[test]
    fn whole_columns_span_the_sheet() {
        let r = RangeAddress::parse("A:C").unwrap();
        assert_eq!(r.rows(), MAX_ROWS);
        assert_eq!(r.cols(), 3);
    }

    #[test]
    fn normalises_reversed_corners() {
        let r = RangeAddress::parse("C3:A1").unwrap();
        assert_eq!(r.local(), "A1:C3");
    }

    #[test]
    fn rejects_garbage() {
        assert!(RangeAddress::parse("").is_err());
        assert!(RangeAddress::parse("A0").is_err());
        assert!(RangeAddress::parse("hello world").is_err());
    }

    #[test]
    fn column_round_trip() {
        for (letters, idx) in [("A", 1), ("Z", 26), ("AA", 27), ("XFD", 16_384)] {
            assert_eq!(column_index(letters), Some(idx));
            assert_eq!(column_letters(idx), letters);
        }
    }

    #[test]
    fn offset_and_resize() {
        let r = RangeAddress::parse("B2").unwrap();
        assert_eq!(r.offset(1, 1).unwrap().local(), "C3");
        assert!(r.offset(-2, 0).is_none());
        assert_eq!(r.resize(2, 1).unwrap().local(), "B2:C4");
    }
}
