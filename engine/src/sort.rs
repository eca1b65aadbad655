//! FILENAME: engine/src/sort.rs
//! PURPOSE: Stable multi-key sort over a selected range, plus per-range
//! filter application that marks hidden rows in row metadata instead of
//! the sheet-global Filter Manager cache.
//! CONTEXT: Spec's "batch" Sort/Filter Operations, kept separate from
//! `filter.rs` because it scopes to a caller-chosen range rather than the
//! whole sheet. Reuses `filter.rs`'s predicate types so a caller can apply
//! the same rank/value-set logic to one selection.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellValue};
use crate::cell_store::CellStore;
use crate::coord::CellRange;
use crate::error::{EngineError, EngineResult};
use crate::filter::{filtered_rows_in_range, ColumnPredicate};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortRule {
    pub column: u32,
    pub order: SortOrder,
    pub custom_list: Option<Vec<String>>,
    pub case_sensitive: bool,
    pub blanks_first: bool,
}

fn normalize_sort_value(value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::Number(n) => format!("{}", n),
        CellValue::Text(s) => s.clone(),
        CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        CellValue::FormattedText(ft) => ft.display_value(),
        CellValue::Error(e) => e.tag().to_string(),
    }
}

/// Type-ordering rank for mixed-type comparisons: numbers < strings <
/// booleans < other.
fn type_rank(value: &CellValue) -> u8 {
    match value {
        CellValue::Empty => 4,
        CellValue::Number(_) => 0,
        CellValue::Text(_) | CellValue::FormattedText(_) => 1,
        CellValue::Boolean(_) => 2,
        CellValue::Error(_) => 3,
    }
}

fn is_blank(value: &CellValue) -> bool {
    matches!(value, CellValue::Empty) || matches!(value, CellValue::Text(s) if s.is_empty())
}

fn compare_one_rule(a: &CellValue, b: &CellValue, rule: &SortRule) -> Ordering {
    let a_blank = is_blank(a);
    let b_blank = is_blank(b);
    if a_blank || b_blank {
        let ord = match (a_blank, b_blank) {
            (true, true) => Ordering::Equal,
            (true, false) => if rule.blanks_first { Ordering::Less } else { Ordering::Greater },
            (false, true) => if rule.blanks_first { Ordering::Greater } else { Ordering::Less },
            (false, false) => unreachable!(),
        };
        return apply_order(ord, rule.order);
    }

    if let Some(list) = &rule.custom_list {
        let a_text = normalize_sort_value(a);
        let b_text = normalize_sort_value(b);
        let a_pos = list.iter().position(|item| item.eq_ignore_ascii_case(&a_text));
        let b_pos = list.iter().position(|item| item.eq_ignore_ascii_case(&b_text));
        match (a_pos, b_pos) {
            (Some(ai), Some(bi)) => return apply_order(ai.cmp(&bi), rule.order),
            (Some(_), None) => return apply_order(Ordering::Less, rule.order),
            (None, Some(_)) => return apply_order(Ordering::Greater, rule.order),
            (None, None) => {}
        }
    }

    let ra = type_rank(a);
    let rb = type_rank(b);
    if ra != rb {
        return apply_order(ra.cmp(&rb), rule.order);
    }

    let ord = match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (CellValue::Boolean(x), CellValue::Boolean(y)) => y.cmp(x),
        _ => {
            let a_text = normalize_sort_value(a);
            let b_text = normalize_sort_value(b);
            if rule.case_sensitive {
                a_text.cmp(&b_text)
            } else {
                a_text.to_lowercase().cmp(&b_text.to_lowercase())
            }
        }
    };
    apply_order(ord, rule.order)
}

fn apply_order(ord: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Ascending => ord,
        SortOrder::Descending => ord.reverse(),
    }
}

/// Sorts `range` by `rules` in place. `has_header` excludes the range's
/// first row from reordering. Stability is guaranteed by tiebreaking on
/// the row's original index within the sortable body.
pub fn sort_range(store: &mut CellStore, range: CellRange, rules: &[SortRule], has_header: bool) -> EngineResult<()> {
    if rules.is_empty() {
        return Err(EngineError::InvalidArgument("sort requires at least one rule".to_string()));
    }
    let body_start = if has_header { range.start_row + 1 } else { range.start_row };
    if body_start > range.end_row {
        return Ok(());
    }

    let mut payloads: Vec<(usize, Vec<Cell>)> = (body_start..=range.end_row)
        .enumerate()
        .map(|(idx, row)| {
            let cells: Vec<Cell> = (range.start_col..=range.end_col)
                .map(|col| store.get_cell(row, col).cloned().unwrap_or_default())
                .collect();
            (idx, cells)
        })
        .collect();

    payloads.sort_by(|(ai, a), (bi, b)| {
        for rule in rules {
            let col_offset = (rule.column.saturating_sub(range.start_col)) as usize;
            if col_offset >= a.len() {
                continue;
            }
            let ord = compare_one_rule(&a[col_offset].value, &b[col_offset].value, rule);
            if ord != Ordering::Equal {
                return ord;
            }
        }
        ai.cmp(bi)
    });

    for (offset, (_, cells)) in payloads.into_iter().enumerate() {
        let row = body_start + offset as u32;
        for (col_offset, cell) in cells.into_iter().enumerate() {
            let col = range.start_col + col_offset as u32;
            store.set_cell(row, col, cell)?;
        }
    }
    Ok(())
}

/// Applies `predicate` to `column` within `range`, marking every row whose
/// predicate test fails as hidden via row metadata (distinct from the
/// Filter Manager's sheet-global visible-row cache).
pub fn apply_range_filter(store: &mut CellStore, range: CellRange, column: u32, predicate: &ColumnPredicate) {
    let visible = filtered_rows_in_range(store, range, predicate, column);
    for row in range.start_row..=range.end_row {
        store.set_row_hidden(row, !visible.contains(&row));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Condition, LogicOp};

    fn build_store() -> CellStore {
        let mut store = CellStore::new();
        store.set_cell(0, 0, Cell::new_text("header".into())).unwrap();
        for (i, n) in [10.0, 20.0, 5.0, 40.0, 25.0].iter().enumerate() {
            store.set_cell(1 + i as u32, 0, Cell::new_number(*n)).unwrap();
        }
        store
    }

    #[test]
    fn test_sort_ascending_with_header() {
        let mut store = build_store();
        let range = CellRange::normalize(0, 0, 5, 0);
        let rules = vec![SortRule { column: 0, order: SortOrder::Ascending, custom_list: None, case_sensitive: false, blanks_first: false }];
        sort_range(&mut store, range, &rules, true).unwrap();
        let values: Vec<f64> = (1..=5)
            .map(|row| match store.get_cell(row, 0).unwrap().value {
                CellValue::Number(n) => n,
                _ => panic!("expected number"),
            })
            .collect();
        assert_eq!(values, vec![5.0, 10.0, 20.0, 25.0, 40.0]);
        assert_eq!(store.get_cell(0, 0).unwrap().value, CellValue::Text("header".into()));
    }

    #[test]
    fn test_filter_then_sort_scenario() {
        let mut store = build_store();
        let range = CellRange::normalize(1, 0, 5, 0);
        let rules = vec![SortRule { column: 0, order: SortOrder::Ascending, custom_list: None, case_sensitive: false, blanks_first: false }];
        sort_range(&mut store, range, &rules, false).unwrap();
        apply_range_filter(&mut store, range, 0, &ColumnPredicate::Conditions {
            conditions: vec![crate::filter::Condition::TopN { n: 2, percent: false }],
            combinator: LogicOp::And,
        });
        let hidden: Vec<bool> = (1..=5).map(|row| store.is_row_hidden(row)).collect();
        assert_eq!(hidden, vec![true, true, true, false, false]);
    }

    #[test]
    fn test_stability_equal_keys_preserve_order() {
        let mut store = CellStore::new();
        store.set_cell(0, 0, Cell::new_text("a".into())).unwrap();
        store.set_cell(0, 1, Cell::new_number(1.0)).unwrap();
        store.set_cell(1, 0, Cell::new_text("a".into())).unwrap();
        store.set_cell(1, 1, Cell::new_number(2.0)).unwrap();
        let range = CellRange::normalize(0, 0, 1, 1);
        let rules = vec![SortRule { column: 0, order: SortOrder::Ascending, custom_list: None, case_sensitive: false, blanks_first: false }];
        sort_range(&mut store, range, &rules, false).unwrap();
        assert_eq!(store.get_cell(0, 1).unwrap().value, CellValue::Number(1.0));
        assert_eq!(store.get_cell(1, 1).unwrap().value, CellValue::Number(2.0));
    }
}
