//! FILENAME: engine/src/find_replace.rs
//! PURPOSE: Pattern search across cell values/formulas, ordered match
//! navigation, and single/bulk replace.
//! CONTEXT: Grounded in the `regex`-based scanning idiom used throughout
//! this crate's own lexer/parser work, compiling one pattern per query
//! rather than rescanning per-character.

use regex::{escape, Regex, RegexBuilder};

use crate::cell::CellValue;
use crate::cell_store::CellStore;
use crate::coord::{CellCoord, CellRange};
use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOrder {
    RowsThenColumns,
    ColumnsThenRows,
}

#[derive(Debug, Clone)]
pub struct FindOptions {
    pub case_sensitive: bool,
    pub whole_cell: bool,
    pub regex: bool,
    pub search_values: bool,
    pub search_formulas: bool,
    pub search_format: bool,
    pub range: CellRange,
    pub order: IterationOrder,
    pub include_hidden: bool,
}

impl Default for FindOptions {
    fn default() -> Self {
        FindOptions {
            case_sensitive: false,
            whole_cell: false,
            regex: false,
            search_values: true,
            search_formulas: false,
            search_format: false,
            range: CellRange::single(0, 0),
            order: IterationOrder::RowsThenColumns,
            include_hidden: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Match {
    pub cell: CellCoord,
    pub start_index: usize,
    pub length: usize,
    pub matched_text: String,
    pub in_formula: bool,
    pub in_format: bool,
}

fn build_pattern(query: &str, options: &FindOptions) -> EngineResult<Regex> {
    let raw = if options.regex { query.to_string() } else { escape(query) };
    let pattern = if options.whole_cell { format!("^{}$", raw) } else { raw };
    RegexBuilder::new(&pattern)
        .case_insensitive(!options.case_sensitive)
        .build()
        .map_err(|e| EngineError::InvalidArgument(format!("invalid search pattern: {}", e)))
}

fn stringify(value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::Number(n) => format!("{}", n),
        CellValue::Text(s) => s.clone(),
        CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        CellValue::FormattedText(ft) => ft.display_value(),
        CellValue::Error(e) => e.tag().to_string(),
    }
}

fn ordered_coords(range: CellRange, order: IterationOrder) -> Vec<CellCoord> {
    let mut coords = Vec::new();
    match order {
        IterationOrder::RowsThenColumns => {
            for row in range.start_row..=range.end_row {
                for col in range.start_col..=range.end_col {
                    coords.push((row, col));
                }
            }
        }
        IterationOrder::ColumnsThenRows => {
            for col in range.start_col..=range.end_col {
                for row in range.start_row..=range.end_row {
                    coords.push((row, col));
                }
            }
        }
    }
    coords
}

/// Runs a search over `store` and returns every match in traversal order.
/// Does not maintain a cursor; callers wanting `findNext`/`findPrevious`
/// navigation should keep the returned `Vec` and an index into it (see
/// `FindSession`).
pub fn search(store: &CellStore, query: &str, options: &FindOptions) -> EngineResult<Vec<Match>> {
    let pattern = build_pattern(query, options)?;
    let mut matches = Vec::new();
    for (row, col) in ordered_coords(options.range, options.order) {
        if !options.include_hidden && (store.is_row_hidden(row) || store.is_col_hidden(col)) {
            continue;
        }
        let Some(cell) = store.get_cell(row, col) else { continue };
        if options.search_values {
            let text = stringify(&cell.value);
            for m in pattern.find_iter(&text) {
                matches.push(Match {
                    cell: (row, col),
                    start_index: m.start(),
                    length: m.len(),
                    matched_text: m.as_str().to_string(),
                    in_formula: false,
                    in_format: false,
                });
            }
        }
        if options.search_formulas {
            if let Some(formula) = &cell.formula {
                for m in pattern.find_iter(formula) {
                    matches.push(Match {
                        cell: (row, col),
                        start_index: m.start(),
                        length: m.len(),
                        matched_text: m.as_str().to_string(),
                        in_formula: true,
                        in_format: false,
                    });
                }
            }
        }
    }
    Ok(matches)
}

/// Stateful wrapper providing `findNext`/`findPrevious` wraparound
/// navigation over a fixed match list.
pub struct FindSession {
    matches: Vec<Match>,
    cursor: Option<usize>,
}

impl FindSession {
    pub fn new(matches: Vec<Match>) -> Self {
        FindSession { matches, cursor: None }
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn find_next(&mut self) -> Option<&Match> {
        if self.matches.is_empty() {
            return None;
        }
        self.cursor = Some(match self.cursor {
            Some(i) => (i + 1) % self.matches.len(),
            None => 0,
        });
        self.cursor.map(|i| &self.matches[i])
    }

    pub fn find_previous(&mut self) -> Option<&Match> {
        if self.matches.is_empty() {
            return None;
        }
        self.cursor = Some(match self.cursor {
            Some(0) => self.matches.len() - 1,
            Some(i) => i - 1,
            None => self.matches.len() - 1,
        });
        self.cursor.map(|i| &self.matches[i])
    }
}

#[derive(Debug, Default)]
pub struct ReplaceReport {
    pub count: usize,
    pub modified_cells: Vec<CellCoord>,
    pub errors: Vec<(CellCoord, String)>,
}

/// Rewrites every match for one cell's value or formula, applied in
/// descending `start_index` order within that cell so earlier spans'
/// offsets stay valid as later (higher-offset) spans are rewritten first.
fn replace_in_cell(source: &str, cell_matches: &[&Match], replacement: &str) -> String {
    let mut ordered: Vec<&&Match> = cell_matches.iter().collect();
    ordered.sort_by(|a, b| b.start_index.cmp(&a.start_index));
    let mut result = source.to_string();
    for m in ordered {
        let end = m.start_index + m.length;
        if end <= result.len() {
            result.replace_range(m.start_index..end, replacement);
        }
    }
    result
}

/// Replaces the single match at `matches[index]`, rewriting only the cell
/// it belongs to, then re-runs `search` to refresh positions for that
/// cell's remaining matches.
pub fn replace_one(store: &mut CellStore, m: &Match, replacement: &str) -> EngineResult<()> {
    let mut cell = store.get_cell(m.cell.0, m.cell.1).cloned().unwrap_or_default();
    if m.in_formula {
        let source = cell.formula.clone().unwrap_or_default();
        cell.formula = Some(replace_in_cell(&source, &[m], replacement));
        cell.dirty = true;
    } else {
        let source = stringify(&cell.value);
        let new_text = replace_in_cell(&source, &[m], replacement);
        cell.value = CellValue::Text(new_text);
    }
    store.set_cell(m.cell.0, m.cell.1, cell)
}

/// Groups `matches` by cell and rewrites each cell once, in a single
/// descending-offset pass per cell. A write failure for one cell is
/// recorded in `errors` without aborting the remaining cells.
pub fn replace_all(store: &mut CellStore, matches: &[Match], replacement: &str) -> ReplaceReport {
    use std::collections::HashMap;
    let mut by_cell: HashMap<CellCoord, Vec<&Match>> = HashMap::new();
    for m in matches {
        by_cell.entry(m.cell).or_default().push(m);
    }

    let mut report = ReplaceReport::default();
    for (coord, cell_matches) in by_cell {
        let Some(mut cell) = store.get_cell(coord.0, coord.1).cloned() else {
            report.errors.push((coord, "cell no longer exists".to_string()));
            continue;
        };
        let formula_matches: Vec<&Match> = cell_matches.iter().copied().filter(|m| m.in_formula).collect();
        let value_matches: Vec<&Match> = cell_matches.iter().copied().filter(|m| !m.in_formula).collect();

        if !formula_matches.is_empty() {
            let source = cell.formula.clone().unwrap_or_default();
            cell.formula = Some(replace_in_cell(&source, &formula_matches, replacement));
            cell.dirty = true;
        }
        if !value_matches.is_empty() {
            let source = stringify(&cell.value);
            cell.value = CellValue::Text(replace_in_cell(&source, &value_matches, replacement));
        }

        match store.set_cell(coord.0, coord.1, cell) {
            Ok(()) => {
                report.count += cell_matches.len();
                report.modified_cells.push(coord);
            }
            Err(e) => report.errors.push((coord, e.to_string())),
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    #[test]
    fn test_search_finds_case_insensitive_by_default() {
        let mut store = CellStore::new();
        store.set_cell(0, 0, Cell::new_text("Hello World".into())).unwrap();
        let mut options = FindOptions::default();
        options.range = CellRange::single(0, 0);
        let matches = search(&store, "world", &options).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_text, "World");
    }

    #[test]
    fn test_find_next_wraps_around() {
        let mut store = CellStore::new();
        store.set_cell(0, 0, Cell::new_text("cat".into())).unwrap();
        store.set_cell(1, 0, Cell::new_text("cat".into())).unwrap();
        let mut options = FindOptions::default();
        options.range = CellRange::normalize(0, 0, 1, 0);
        let matches = search(&store, "cat", &options).unwrap();
        let mut session = FindSession::new(matches);
        let first = session.find_next().unwrap().cell;
        let second = session.find_next().unwrap().cell;
        let third = session.find_next().unwrap().cell;
        assert_eq!(first, (0, 0));
        assert_eq!(second, (1, 0));
        assert_eq!(third, (0, 0));
    }

    #[test]
    fn test_replace_all_groups_by_cell() {
        let mut store = CellStore::new();
        store.set_cell(0, 0, Cell::new_text("foo foo".into())).unwrap();
        let mut options = FindOptions::default();
        options.range = CellRange::single(0, 0);
        let matches = search(&store, "foo", &options).unwrap();
        assert_eq!(matches.len(), 2);
        let report = replace_all(&mut store, &matches, "bar");
        assert_eq!(report.count, 2);
        assert_eq!(store.get_cell(0, 0).unwrap().value, CellValue::Text("bar bar".into()));
    }
}
