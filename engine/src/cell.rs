//! FILENAME: engine/src/cell.rs
//! PURPOSE: Defines the fundamental data structures for a single spreadsheet cell.
//! CONTEXT: Separates the user's input (formula) from the calculated result
//! (value). Designed to be lightweight, since tens of thousands of these may
//! exist in a single store.

use serde::{Deserialize, Serialize};

use crate::style::PartialCellFormat;

/// Represents the possible errors a cell can hold (e.g., #DIV/0!).
/// `tag()` maps each variant to the wire error token spreadsheets expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellError {
    Div0,     // Division by zero -> #DIV/0!
    Ref,      // Invalid or deleted reference -> #REF!
    Name,     // Unknown function/name -> #NAME?
    Value,    // Wrong argument type -> #VALUE!
    Syntax,   // Formula failed to parse -> #SYNTAX!
    Cycle,    // Circular dependency -> #CYCLE!
    Generic,  // Catch-all evaluator failure -> #ERROR!
}

impl CellError {
    pub fn tag(&self) -> &'static str {
        match self {
            CellError::Div0 => "#DIV/0!",
            CellError::Ref => "#REF!",
            CellError::Name => "#NAME?",
            CellError::Value => "#VALUE!",
            CellError::Syntax => "#SYNTAX!",
            CellError::Cycle => "#CYCLE!",
            CellError::Generic => "#ERROR!",
        }
    }
}

/// A text value carrying an ordered, non-overlapping list of character-range
/// format overrides. Invariant (enforced by `new`): runs are sorted by
/// `start`, do not overlap, and `0 <= start < end <= text.chars().count()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedText {
    pub text: String,
    pub runs: Vec<FormatRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatRun {
    pub start: usize,
    pub end: usize,
    pub format: PartialCellFormat,
}

impl FormattedText {
    /// Builds a `FormattedText`, sorting runs by start and rejecting any
    /// run that overlaps its predecessor or falls outside the text bounds.
    pub fn new(text: String, mut runs: Vec<FormatRun>) -> Result<Self, String> {
        let len = text.chars().count();
        runs.sort_by_key(|r| r.start);
        let mut prev_end = 0usize;
        for run in &runs {
            if run.start >= run.end {
                return Err(format!("empty or inverted run [{}, {})", run.start, run.end));
            }
            if run.end > len {
                return Err(format!("run end {} exceeds text length {}", run.end, len));
            }
            if run.start < prev_end {
                return Err("format runs overlap".to_string());
            }
            prev_end = run.end;
        }
        Ok(FormattedText { text, runs })
    }

    pub fn plain_text(&self) -> &str {
        &self.text
    }

    /// Flattens to plain text for display, dropping run formatting.
    pub fn display_value(&self) -> String {
        self.text.clone()
    }
}

/// Merge-region metadata stored directly on a `Cell`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MergeMeta {
    /// The top-left cell of a merged region; it alone carries content.
    Anchor { row_span: u32, col_span: u32 },
    /// A non-anchor member of a merged region, pointing back at its anchor.
    Member { anchor_row: u32, anchor_col: u32 },
}

/// Represents the calculated result or raw data within a cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum CellValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    FormattedText(FormattedText),
    Error(CellError),
}

/// The atomic unit of the spreadsheet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cell {
    pub formula: Option<String>,
    /// Raw value for a literal cell, or the last computed result for a
    /// formula cell (stale whenever `dirty` is true).
    pub value: CellValue,
    /// Index into the owning `StyleRegistry`; carries format + borders.
    pub style_index: usize,
    pub merge: Option<MergeMeta>,
    /// True when `value` is a formula result awaiting recomputation.
    pub dirty: bool,
}

impl Cell {
    pub fn new() -> Self {
        Cell {
            formula: None,
            value: CellValue::Empty,
            style_index: 0,
            merge: None,
            dirty: false,
        }
    }

    pub fn new_number(num: f64) -> Self {
        Cell { value: CellValue::Number(num), ..Cell::new() }
    }

    pub fn new_text(text: String) -> Self {
        Cell { value: CellValue::Text(text), ..Cell::new() }
    }

    pub fn new_formula(formula: String) -> Self {
        Cell { formula: Some(formula), value: CellValue::Empty, dirty: true, ..Cell::new() }
    }

    pub fn new_boolean(value: bool) -> Self {
        Cell { value: CellValue::Boolean(value), ..Cell::new() }
    }

    pub fn is_empty(&self) -> bool {
        self.formula.is_none() && matches!(self.value, CellValue::Empty)
    }

    /// The display value of the cell as a String. `FormattedText` is
    /// flattened to its plain text, per the external display contract.
    pub fn display_value(&self) -> String {
        match &self.value {
            CellValue::Empty => String::new(),
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.0}", n)
                } else {
                    format!("{}", n)
                }
            }
            CellValue::Text(s) => s.clone(),
            CellValue::FormattedText(ft) => ft.text.clone(),
            CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Error(e) => e.tag().to_string(),
        }
    }
}

impl Default for Cell {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_value_variants() {
        assert_eq!(Cell::new_number(42.0).display_value(), "42");
        assert_eq!(Cell::new_number(1.5).display_value(), "1.5");
        assert_eq!(Cell::new_text("hi".into()).display_value(), "hi");
        assert_eq!(Cell::new_boolean(true).display_value(), "TRUE");
        let mut err_cell = Cell::new();
        err_cell.value = CellValue::Error(CellError::Div0);
        assert_eq!(err_cell.display_value(), "#DIV/0!");
    }

    #[test]
    fn test_formatted_text_rejects_overlap() {
        let runs = vec![
            FormatRun { start: 0, end: 3, format: PartialCellFormat::default() },
            FormatRun { start: 2, end: 5, format: PartialCellFormat::default() },
        ];
        assert!(FormattedText::new("hello".to_string(), runs).is_err());
    }

    #[test]
    fn test_formatted_text_sorts_runs() {
        let runs = vec![
            FormatRun { start: 3, end: 5, format: PartialCellFormat::default() },
            FormatRun { start: 0, end: 2, format: PartialCellFormat::default() },
        ];
        let ft = FormattedText::new("hello".to_string(), runs).unwrap();
        assert_eq!(ft.runs[0].start, 0);
        assert_eq!(ft.runs[1].start, 3);
    }

    #[test]
    fn test_new_formula_marks_dirty() {
        let cell = Cell::new_formula("=A1+1".to_string());
        assert!(cell.dirty);
        assert_eq!(cell.formula.as_deref(), Some("=A1+1"));
    }
}
