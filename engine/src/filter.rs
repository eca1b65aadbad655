//! FILENAME: engine/src/filter.rs
//! PURPOSE: Per-column filter predicates over the used range, evaluated
//! lazily into a cached visible-row set.
//! CONTEXT: A store-agnostic predicate evaluator that takes a plain
//! column-value iterator. The rank predicates (top/bottom-N, above/below
//! average) use a two-pass approach: a numeric pre-pass over the column
//! before the per-row predicate test.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::cell::CellValue;
use crate::cell_store::CellStore;
use crate::coord::CellRange;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum CompareOp {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsEmpty,
    IsNotEmpty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Compare { op: CompareOp, value: String },
    Between { low: String, high: String },
    NotBetween { low: String, high: String },
    TopN { n: u32, percent: bool },
    BottomN { n: u32, percent: bool },
    AboveAverage,
    BelowAverage,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum LogicOp {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnPredicate {
    ValueSet { values: HashSet<String>, include_blanks: bool },
    Conditions { conditions: Vec<Condition>, combinator: LogicOp },
}

fn normalize(value: &CellValue) -> String {
    match value {
        CellValue::Empty => String::new(),
        CellValue::Number(n) => format!("{}", n),
        CellValue::Text(s) => s.clone(),
        CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        CellValue::FormattedText(ft) => ft.display_value(),
        CellValue::Error(e) => e.tag().to_string(),
    }
}

fn as_number(value: &CellValue) -> Option<f64> {
    match value {
        CellValue::Number(n) => Some(*n),
        _ => None,
    }
}

/// Per-column numeric pre-pass results: the keep-threshold a rank
/// predicate resolves to for this evaluation pass.
struct RankContext {
    values: Vec<f64>,
}

impl RankContext {
    fn build(col_values: &[CellValue]) -> Self {
        RankContext { values: col_values.iter().filter_map(as_number).collect() }
    }

    fn average(&self) -> Option<f64> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().sum::<f64>() / self.values.len() as f64)
        }
    }

    fn top_threshold(&self, n: u32, percent: bool) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
        let keep = if percent {
            ((sorted.len() as f64) * (n as f64) / 100.0).ceil().max(1.0) as usize
        } else {
            n as usize
        };
        sorted.get(keep.saturating_sub(1).min(sorted.len() - 1)).copied()
    }

    fn bottom_threshold(&self, n: u32, percent: bool) -> Option<f64> {
        if self.values.is_empty() {
            return None;
        }
        let mut sorted = self.values.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let keep = if percent {
            ((sorted.len() as f64) * (n as f64) / 100.0).ceil().max(1.0) as usize
        } else {
            n as usize
        };
        sorted.get(keep.saturating_sub(1).min(sorted.len() - 1)).copied()
    }
}

fn eval_condition(cond: &Condition, value: &CellValue, text: &str, rank: &RankContext) -> bool {
    match cond {
        Condition::Compare { op, value: rhs } => match op {
            CompareOp::Equals => text.eq_ignore_ascii_case(rhs),
            CompareOp::NotEquals => !text.eq_ignore_ascii_case(rhs),
            CompareOp::Contains => text.to_lowercase().contains(&rhs.to_lowercase()),
            CompareOp::NotContains => !text.to_lowercase().contains(&rhs.to_lowercase()),
            CompareOp::StartsWith => text.to_lowercase().starts_with(&rhs.to_lowercase()),
            CompareOp::EndsWith => text.to_lowercase().ends_with(&rhs.to_lowercase()),
            CompareOp::GreaterThan => numeric_cmp(text, rhs).map(|o| o.is_gt()).unwrap_or(false),
            CompareOp::GreaterThanOrEqual => numeric_cmp(text, rhs).map(|o| o.is_ge()).unwrap_or(false),
            CompareOp::LessThan => numeric_cmp(text, rhs).map(|o| o.is_lt()).unwrap_or(false),
            CompareOp::LessThanOrEqual => numeric_cmp(text, rhs).map(|o| o.is_le()).unwrap_or(false),
            CompareOp::IsEmpty => text.is_empty(),
            CompareOp::IsNotEmpty => !text.is_empty(),
        },
        Condition::Between { low, high } => match as_number(value) {
            Some(n) => {
                let (Ok(lo), Ok(hi)) = (low.parse::<f64>(), high.parse::<f64>()) else { return false };
                n >= lo.min(hi) && n <= lo.max(hi)
            }
            None => false,
        },
        Condition::NotBetween { low, high } => !eval_condition(
            &Condition::Between { low: low.clone(), high: high.clone() },
            value,
            text,
            rank,
        ),
        Condition::TopN { n, percent } => match (as_number(value), rank.top_threshold(*n, *percent)) {
            (Some(v), Some(threshold)) => v >= threshold,
            _ => false,
        },
        Condition::BottomN { n, percent } => match (as_number(value), rank.bottom_threshold(*n, *percent)) {
            (Some(v), Some(threshold)) => v <= threshold,
            _ => false,
        },
        Condition::AboveAverage => match (as_number(value), rank.average()) {
            (Some(v), Some(avg)) => v > avg,
            _ => false,
        },
        Condition::BelowAverage => match (as_number(value), rank.average()) {
            (Some(v), Some(avg)) => v < avg,
            _ => false,
        },
    }
}

fn numeric_cmp(lhs: &str, rhs: &str) -> Option<std::cmp::Ordering> {
    let a: f64 = lhs.parse().ok()?;
    let b: f64 = rhs.parse().ok()?;
    a.partial_cmp(&b)
}

/// Per-column predicates, a used-range handle, and a lazily-populated
/// visible-row cache.
#[derive(Debug, Default)]
pub struct FilterManager {
    predicates: HashMap<u32, ColumnPredicate>,
    cache: RefCell<Option<HashSet<u32>>>,
}

impl FilterManager {
    pub fn new() -> Self {
        FilterManager { predicates: HashMap::new(), cache: RefCell::new(None) }
    }

    pub fn apply_filter(&mut self, col: u32, predicate: ColumnPredicate) {
        self.predicates.insert(col, predicate);
        self.invalidate_cache();
    }

    pub fn clear_filter(&mut self, col: u32) {
        self.predicates.remove(&col);
        self.invalidate_cache();
    }

    pub fn clear_all_filters(&mut self) {
        self.predicates.clear();
        self.invalidate_cache();
    }

    pub fn has_filters(&self) -> bool {
        !self.predicates.is_empty()
    }

    pub fn is_column_filtered(&self, col: u32) -> bool {
        self.predicates.contains_key(&col)
    }

    pub fn invalidate_cache(&self) {
        *self.cache.borrow_mut() = None;
    }

    /// Returns the set of visible row indices within the store's used
    /// range. Cached until the next `invalidate_cache`.
    pub fn get_filtered_rows(&self, store: &CellStore) -> HashSet<u32> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return cached.clone();
        }
        let Some(used) = store.get_used_range() else {
            return HashSet::new();
        };
        if self.predicates.is_empty() {
            let all: HashSet<u32> = (used.start_row..=used.end_row).collect();
            *self.cache.borrow_mut() = Some(all.clone());
            return all;
        }

        let ranks: HashMap<u32, RankContext> = self
            .predicates
            .iter()
            .filter(|(_, p)| matches!(p, ColumnPredicate::Conditions { .. }))
            .map(|(&col, _)| {
                let col_values: Vec<CellValue> = (used.start_row..=used.end_row)
                    .map(|row| store.get_cell(row, col).map(|c| c.value.clone()).unwrap_or(CellValue::Empty))
                    .collect();
                (col, RankContext::build(&col_values))
            })
            .collect();

        let mut visible = HashSet::new();
        for row in used.start_row..=used.end_row {
            let mut keep = true;
            for (&col, predicate) in &self.predicates {
                let value = store.get_cell(row, col).map(|c| c.value.clone()).unwrap_or(CellValue::Empty);
                let text = normalize(&value);
                let row_ok = match predicate {
                    ColumnPredicate::ValueSet { values, include_blanks } => {
                        if text.is_empty() {
                            *include_blanks
                        } else {
                            values.contains(&text)
                        }
                    }
                    ColumnPredicate::Conditions { conditions, combinator } => {
                        let rank = ranks.get(&col).expect("rank context built for every condition column");
                        let mut iter = conditions.iter().map(|c| eval_condition(c, &value, &text, rank));
                        match combinator {
                            LogicOp::And => iter.all(|b| b),
                            LogicOp::Or => iter.any(|b| b),
                        }
                    }
                };
                if !row_ok {
                    keep = false;
                    break;
                }
            }
            if keep {
                visible.insert(row);
            }
        }
        *self.cache.borrow_mut() = Some(visible.clone());
        visible
    }

    pub fn serialize(&self) -> EngineFilterSnapshot {
        EngineFilterSnapshot { version: 1, predicates: self.predicates.clone() }
    }

    pub fn deserialize(snapshot: EngineFilterSnapshot) -> Self {
        FilterManager { predicates: snapshot.predicates, cache: RefCell::new(None) }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EngineFilterSnapshot {
    pub version: u32,
    pub predicates: HashMap<u32, ColumnPredicate>,
}

/// Restricts a predicate evaluation pass to a sub-range for the batch
/// sort/filter operations in `sort.rs`, which need the same rank logic
/// scoped to one selection rather than the whole used range.
pub fn filtered_rows_in_range(store: &CellStore, range: CellRange, predicate: &ColumnPredicate, col: u32) -> HashSet<u32> {
    let col_values: Vec<CellValue> = (range.start_row..=range.end_row)
        .map(|row| store.get_cell(row, col).map(|c| c.value.clone()).unwrap_or(CellValue::Empty))
        .collect();
    let rank = RankContext::build(&col_values);
    let mut visible = HashSet::new();
    for row in range.start_row..=range.end_row {
        let value = store.get_cell(row, col).map(|c| c.value.clone()).unwrap_or(CellValue::Empty);
        let text = normalize(&value);
        let keep = match predicate {
            ColumnPredicate::ValueSet { values, include_blanks } => {
                if text.is_empty() {
                    *include_blanks
                } else {
                    values.contains(&text)
                }
            }
            ColumnPredicate::Conditions { conditions, combinator } => {
                let mut iter = conditions.iter().map(|c| eval_condition(c, &value, &text, &rank));
                match combinator {
                    LogicOp::And => iter.all(|b| b),
                    LogicOp::Or => iter.any(|b| b),
                }
            }
        };
        if keep {
            visible.insert(row);
        }
    }
    visible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;

    fn build_store() -> CellStore {
        let mut store = CellStore::new();
        for (i, n) in [10.0, 20.0, 5.0, 40.0, 25.0].iter().enumerate() {
            store.set_cell(i as u32, 0, Cell::new_number(*n)).unwrap();
        }
        store
    }

    #[test]
    fn test_top_n_filter() {
        let store = build_store();
        let mut mgr = FilterManager::new();
        mgr.apply_filter(0, ColumnPredicate::Conditions {
            conditions: vec![Condition::TopN { n: 2, percent: false }],
            combinator: LogicOp::And,
        });
        let visible = mgr.get_filtered_rows(&store);
        assert_eq!(visible, [3, 4].into_iter().collect());
    }

    #[test]
    fn test_value_set_filter() {
        let store = build_store();
        let mut mgr = FilterManager::new();
        mgr.apply_filter(0, ColumnPredicate::ValueSet { values: ["10", "40"].into_iter().map(String::from).collect(), include_blanks: false });
        let visible = mgr.get_filtered_rows(&store);
        assert_eq!(visible, [0, 3].into_iter().collect());
    }

    #[test]
    fn test_cache_invalidation() {
        let mut store = build_store();
        let mut mgr = FilterManager::new();
        mgr.apply_filter(0, ColumnPredicate::Conditions {
            conditions: vec![Condition::Compare { op: CompareOp::GreaterThan, value: "15".into() }],
            combinator: LogicOp::And,
        });
        let first = mgr.get_filtered_rows(&store);
        assert_eq!(first, [1, 3, 4].into_iter().collect());
        store.set_cell(2, 0, Cell::new_number(100.0)).unwrap();
        mgr.invalidate_cache();
        let second = mgr.get_filtered_rows(&store);
        assert_eq!(second, [1, 2, 3, 4].into_iter().collect());
    }
}
