//! FILENAME: engine/src/formula_engine.rs
//! PURPOSE: Owns the dependency graph, drives recalculation, and rewrites
//! formula source text when rows/columns are inserted or deleted.
//! CONTEXT: Unifies `dependency_graph::DependencyGraph`,
//! `dependency_extractor`, and `evaluator::FormulaEvaluator` under one
//! component. Reference rewriting derives the shift/sever/`#REF!` rules
//! directly from the parser's `*_absolute` markers and re-renders the
//! formula source text, operating on the AST rather than the raw string.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use parser::ast::{BuiltinFunction, Expression, Value};

use crate::cell::{CellError, CellValue};
use crate::cell_store::CellStore;
use crate::coord::{col_to_index, index_to_col, CellCoord};
use crate::dependency_extractor::GridBounds;
use crate::dependency_graph::DependencyGraph;
use crate::error::{EngineError, EngineResult};
use crate::evaluator::{EvalContext, FormulaEvaluator};

/// A structural edit that may invalidate or shift formula references.
#[derive(Debug, Clone, Copy)]
pub enum StructuralEdit {
    InsertRows { at: u32, count: u32 },
    DeleteRows { at: u32, count: u32 },
    InsertCols { at: u32, count: u32 },
    DeleteCols { at: u32, count: u32 },
}

struct StoreEvalContext<'a> {
    store: &'a CellStore,
    bounds: GridBounds,
}

impl<'a> EvalContext for StoreEvalContext<'a> {
    fn cell_value(&self, row: u32, col: u32) -> CellValue {
        self.store.get_cell(row, col).map(|c| c.value.clone()).unwrap_or(CellValue::Empty)
    }
    fn bounds(&self) -> GridBounds {
        self.bounds
    }
}

/// Progress reported after each time-budgeted slice of `calculate_async`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalcProgress {
    pub processed: usize,
    pub total: usize,
}

/// Owns the dependency graph and the pluggable evaluator; drives
/// synchronous/asynchronous recalculation and reference rewriting.
pub struct FormulaEngine {
    graph: DependencyGraph,
    evaluator: Box<dyn FormulaEvaluator>,
    dirty: HashSet<CellCoord>,
    cancelled: bool,
}

impl FormulaEngine {
    pub fn new(evaluator: Box<dyn FormulaEvaluator>) -> Self {
        FormulaEngine { graph: DependencyGraph::new(), evaluator, dirty: HashSet::new(), cancelled: false }
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    /// Drops every dependency edge and dirty mark, leaving the evaluator
    /// in place. Used when cell storage is replaced wholesale (snapshot
    /// restore) and the dependency graph must be rebuilt from scratch.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.dirty.clear();
        self.cancelled = false;
    }

    /// Parses and evaluates `source` against the store's current values,
    /// records the dependency edges, and writes the cell's value/formula.
    /// A cycle does not reject the write: every cell in the newly-formed
    /// strongly connected component is painted `#CYCLE!`.
    pub fn set_formula(
        &mut self,
        store: &mut CellStore,
        coord: CellCoord,
        source: String,
        bounds: GridBounds,
    ) -> EngineResult<()> {
        let mut cell = store.get_cell(coord.0, coord.1).cloned().unwrap_or_default();
        cell.formula = Some(source.clone());

        let outcome = {
            let ctx = StoreEvalContext { store: &*store, bounds };
            self.evaluator.evaluate(&source, &ctx)
        };

        let would_cycle = self.graph.would_create_cycle(coord, &outcome.dependencies);
        self.graph.set_dependencies(coord, outcome.dependencies);

        if would_cycle {
            let members = self.graph.cycle_members(coord);
            log::warn!("formula at ({}, {}) would create a cycle spanning {} cell(s); painting #CYCLE!", coord.0, coord.1, members.len());
            for &member in &members {
                let mut c = if member == coord {
                    cell.clone()
                } else {
                    store.get_cell(member.0, member.1).cloned().unwrap_or_default()
                };
                c.value = CellValue::Error(CellError::Cycle);
                c.dirty = false;
                store.set_cell(member.0, member.1, c)?;
                self.dirty.remove(&member);
                if let Some(deps) = self.graph.get_dependents(member).cloned() {
                    for dep in deps {
                        if !members.contains(&dep) {
                            self.dirty.insert(dep);
                        }
                    }
                }
            }
        } else {
            cell.value = outcome.value;
            cell.dirty = false;
            store.set_cell(coord.0, coord.1, cell)?;
            self.mark_dirty_transitive(coord);
        }
        Ok(())
    }

    /// Severs outgoing edges from `coord` (it is no longer a formula) and
    /// marks its former dependents dirty so their stale result is refreshed
    /// on the next recalculation.
    pub fn remove_formula(&mut self, coord: CellCoord) {
        if let Some(deps) = self.graph.get_dependents(coord).cloned() {
            self.dirty.extend(deps);
        }
        self.graph.clear_dependencies(coord);
    }

    fn mark_dirty_transitive(&mut self, coord: CellCoord) {
        self.dirty.insert(coord);
        if let Some(deps) = self.graph.get_dependents(coord).cloned() {
            self.dirty.extend(deps);
        }
    }

    fn expand_affected(&self) -> HashSet<CellCoord> {
        let mut affected: HashSet<CellCoord> = self.dirty.clone();
        let mut queue: VecDeque<CellCoord> = affected.iter().copied().collect();
        while let Some(c) = queue.pop_front() {
            if let Some(deps) = self.graph.get_dependents(c) {
                for &d in deps {
                    if affected.insert(d) {
                        queue.push_back(d);
                    }
                }
            }
        }
        affected
    }

    fn recompute_one(&mut self, store: &mut CellStore, coord: CellCoord, bounds: GridBounds) {
        let Some(cell) = store.get_cell(coord.0, coord.1) else { return };
        let Some(source) = cell.formula.clone() else { return };
        let outcome = {
            let ctx = StoreEvalContext { store: &*store, bounds };
            self.evaluator.evaluate(&source, &ctx)
        };
        self.graph.set_dependencies(coord, outcome.dependencies);
        if let Some(mut c) = store.get_cell(coord.0, coord.1).cloned() {
            c.value = outcome.value;
            c.dirty = false;
            let _ = store.set_cell(coord.0, coord.1, c);
        }
    }

    fn mark_cycle(&mut self, store: &mut CellStore, cycle: &HashSet<CellCoord>) {
        for &c in cycle {
            if let Some(mut cell) = store.get_cell(c.0, c.1).cloned() {
                cell.value = CellValue::Error(CellError::Cycle);
                cell.dirty = false;
                let _ = store.set_cell(c.0, c.1, cell);
            }
            self.dirty.remove(&c);
        }
    }

    /// Processes every dirty cell and its transitive dependents in one
    /// pass, in topological order. A cycle among the affected cells marks
    /// the whole strongly connected component `#CYCLE!` and continues with
    /// whatever remains acyclic.
    pub fn calculate_sync(&mut self, store: &mut CellStore, bounds: GridBounds) {
        if self.dirty.is_empty() {
            return;
        }
        let affected = self.expand_affected();
        log::debug!("calculate_sync: {} dirty cell(s) expand to {} affected", self.dirty.len(), affected.len());
        match self.graph.topo_order(&affected) {
            Ok(order) => {
                for coord in order {
                    self.recompute_one(store, coord, bounds);
                }
            }
            Err(cycle_err) => {
                let cycle_set: HashSet<CellCoord> = cycle_err.cycle_path.iter().copied().collect();
                log::warn!("calculate_sync: cycle detected among {} cell(s), marking #CYCLE! and continuing", cycle_set.len());
                self.mark_cycle(store, &cycle_set);
                let remaining: HashSet<CellCoord> = affected.difference(&cycle_set).copied().collect();
                if let Ok(order) = self.graph.topo_order(&remaining) {
                    for coord in order {
                        self.recompute_one(store, coord, bounds);
                    }
                }
            }
        }
        self.dirty.clear();
    }

    /// Slices the dirty topological order into `slice_budget`-sized
    /// batches, invoking `progress` after each slice with a strictly
    /// monotonic `processed` count. Checks `cancel_calculation()` between
    /// cells; a cancelled run leaves already-computed cells valid and
    /// resumes the remainder as still-dirty on the next call.
    pub fn calculate_async(
        &mut self,
        store: &mut CellStore,
        bounds: GridBounds,
        slice_budget: Duration,
        mut progress: impl FnMut(CalcProgress),
    ) {
        self.cancelled = false;
        if self.dirty.is_empty() {
            progress(CalcProgress { processed: 0, total: 0 });
            return;
        }
        let affected = self.expand_affected();
        let order = match self.graph.topo_order(&affected) {
            Ok(order) => order,
            Err(cycle_err) => {
                let cycle_set: HashSet<CellCoord> = cycle_err.cycle_path.iter().copied().collect();
                log::warn!("calculate_async: cycle detected among {} cell(s), marking #CYCLE! and continuing", cycle_set.len());
                self.mark_cycle(store, &cycle_set);
                let remaining: HashSet<CellCoord> = affected.difference(&cycle_set).copied().collect();
                self.graph.topo_order(&remaining).unwrap_or_default()
            }
        };
        let total = order.len();
        log::debug!("calculate_async: starting time-sliced recalc of {} cell(s), slice budget {:?}", total, slice_budget);
        let mut processed = 0usize;
        let mut slice_start = Instant::now();
        let mut remaining_dirty: HashSet<CellCoord> = order.iter().copied().collect();
        for coord in order {
            if self.cancelled {
                log::debug!("calculate_async: cancelled after {}/{} cell(s)", processed, total);
                break;
            }
            self.recompute_one(store, coord, bounds);
            remaining_dirty.remove(&coord);
            processed += 1;
            if slice_start.elapsed() >= slice_budget {
                progress(CalcProgress { processed, total });
                slice_start = Instant::now();
            }
        }
        progress(CalcProgress { processed, total });
        self.dirty = remaining_dirty;
    }

    pub fn cancel_calculation(&mut self) {
        log::debug!("calculate_async: cancellation requested");
        self.cancelled = true;
    }

    /// Rewrites every formula's source text for a structural edit. Must be
    /// called AFTER `CellStore::insert_rows`/`delete_rows`/etc. has already
    /// physically shifted the cells: this only fixes up what each
    /// surviving formula's text *refers to*, independent of which cell now
    /// hosts it.
    pub fn rewrite_references(&mut self, store: &mut CellStore, edit: StructuralEdit) -> EngineResult<()> {
        let Some(used) = store.get_used_range() else { return Ok(()) };
        let coords: Vec<CellCoord> = store
            .get_cells_in_range(used)
            .into_iter()
            .filter(|(_, cell)| cell.formula.is_some())
            .map(|(c, _)| c)
            .collect();
        for coord in coords {
            let Some(cell) = store.get_cell(coord.0, coord.1) else { continue };
            let source = cell.formula.clone().unwrap();
            if let Ok(expr) = parser::parse(&source) {
                let rewritten = format!("={}", unparse(&expr, &edit));
                if rewritten != source {
                    let mut c = cell.clone();
                    c.formula = Some(rewritten);
                    c.dirty = true;
                    store.set_cell(coord.0, coord.1, c)?;
                    self.dirty.insert(coord);
                }
            }
        }
        Ok(())
    }
}

// -- reference rewriting / unparsing ----------------------------------------

fn transform_row(row0: u32, edit: &StructuralEdit) -> Option<u32> {
    match *edit {
        StructuralEdit::InsertRows { at, count } => {
            if row0 >= at {
                Some(row0 + count)
            } else {
                Some(row0)
            }
        }
        StructuralEdit::DeleteRows { at, count } => {
            let end = at + count;
            if row0 >= at && row0 < end {
                None
            } else if row0 >= end {
                Some(row0 - count)
            } else {
                Some(row0)
            }
        }
        _ => Some(row0),
    }
}

fn transform_col(col: u32, edit: &StructuralEdit) -> Option<u32> {
    match *edit {
        StructuralEdit::InsertCols { at, count } => {
            if col >= at {
                Some(col + count)
            } else {
                Some(col)
            }
        }
        StructuralEdit::DeleteCols { at, count } => {
            let end = at + count;
            if col >= at && col < end {
                None
            } else if col >= end {
                Some(col - count)
            } else {
                Some(col)
            }
        }
        _ => Some(col),
    }
}

/// Renders one cell reference, applying the edit unless pinned by the `$`
/// absolute marker: absolute references stay fixed through structural
/// edits, `$` only ever means "don't shift this axis".
fn rewrite_cellref(
    sheet: &Option<String>,
    col: &str,
    row: u32,
    col_absolute: bool,
    row_absolute: bool,
    edit: &StructuralEdit,
) -> String {
    let col_idx = col_to_index(col);
    let row0 = row - 1;
    let new_col = if col_absolute { Some(col_idx) } else { transform_col(col_idx, edit) };
    let new_row = if row_absolute { Some(row0) } else { transform_row(row0, edit) };
    match (new_row, new_col) {
        (Some(r), Some(c)) => {
            let mut s = String::new();
            if let Some(sh) = sheet {
                s.push_str(sh);
                s.push('!');
            }
            if col_absolute {
                s.push('$');
            }
            s.push_str(&index_to_col(c));
            if row_absolute {
                s.push('$');
            }
            s.push_str(&(r + 1).to_string());
            s
        }
        _ => "#REF!".to_string(),
    }
}

fn fn_name(func: &BuiltinFunction) -> String {
    match func {
        BuiltinFunction::Sum => "SUM".into(),
        BuiltinFunction::Average => "AVERAGE".into(),
        BuiltinFunction::Min => "MIN".into(),
        BuiltinFunction::Max => "MAX".into(),
        BuiltinFunction::Count => "COUNT".into(),
        BuiltinFunction::CountA => "COUNTA".into(),
        BuiltinFunction::If => "IF".into(),
        BuiltinFunction::And => "AND".into(),
        BuiltinFunction::Or => "OR".into(),
        BuiltinFunction::Not => "NOT".into(),
        BuiltinFunction::True => "TRUE".into(),
        BuiltinFunction::False => "FALSE".into(),
        BuiltinFunction::Abs => "ABS".into(),
        BuiltinFunction::Round => "ROUND".into(),
        BuiltinFunction::Floor => "FLOOR".into(),
        BuiltinFunction::Ceiling => "CEILING".into(),
        BuiltinFunction::Sqrt => "SQRT".into(),
        BuiltinFunction::Power => "POWER".into(),
        BuiltinFunction::Mod => "MOD".into(),
        BuiltinFunction::Int => "INT".into(),
        BuiltinFunction::Sign => "SIGN".into(),
        BuiltinFunction::Len => "LEN".into(),
        BuiltinFunction::Upper => "UPPER".into(),
        BuiltinFunction::Lower => "LOWER".into(),
        BuiltinFunction::Trim => "TRIM".into(),
        BuiltinFunction::Concatenate => "CONCATENATE".into(),
        BuiltinFunction::Left => "LEFT".into(),
        BuiltinFunction::Right => "RIGHT".into(),
        BuiltinFunction::Mid => "MID".into(),
        BuiltinFunction::Rept => "REPT".into(),
        BuiltinFunction::Text => "TEXT".into(),
        BuiltinFunction::IsNumber => "ISNUMBER".into(),
        BuiltinFunction::IsText => "ISTEXT".into(),
        BuiltinFunction::IsBlank => "ISBLANK".into(),
        BuiltinFunction::IsError => "ISERROR".into(),
        BuiltinFunction::XLookup => "XLOOKUP".into(),
        BuiltinFunction::XLookups => "XLOOKUPS".into(),
        BuiltinFunction::GetRowHeight => "GET.ROW.HEIGHT".into(),
        BuiltinFunction::GetColumnWidth => "GET.COLUMN.WIDTH".into(),
        BuiltinFunction::GetCellFillColor => "GET.CELL.FILLCOLOR".into(),
        BuiltinFunction::Row => "ROW".into(),
        BuiltinFunction::Column => "COLUMN".into(),
        BuiltinFunction::Custom(name) => name.clone(),
    }
}

/// Re-renders an `Expression` as formula source, rewriting every
/// `CellRef`/`Range`/`ColumnRef`/`RowRef` it contains for `edit`. Named
/// ranges, 3D sheet spans, and structured table references pass through
/// unrewritten (out of scope, see `dependency_extractor`).
fn unparse(expr: &Expression, edit: &StructuralEdit) -> String {
    match expr {
        Expression::Literal(v) => match v {
            Value::Number(n) => format!("{}", n),
            Value::String(s) => format!("\"{}\"", s),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        },
        Expression::CellRef { sheet, col, row, col_absolute, row_absolute } => {
            rewrite_cellref(sheet, col, *row, *col_absolute, *row_absolute, edit)
        }
        Expression::Range { sheet, start, end } => {
            let a = unparse(start, edit);
            let b = unparse(end, edit);
            if a == "#REF!" && b == "#REF!" {
                "#REF!".to_string()
            } else {
                let prefix = sheet.as_ref().map(|s| format!("{}!", s)).unwrap_or_default();
                format!("{}{}:{}", prefix, strip_sheet(&a), strip_sheet(&b))
            }
        }
        Expression::ColumnRef { sheet, start_col, end_col, start_absolute, end_absolute } => {
            let prefix = sheet.as_ref().map(|s| format!("{}!", s)).unwrap_or_default();
            let a = if *start_absolute { format!("${}", start_col) } else { start_col.clone() };
            let b = if *end_absolute { format!("${}", end_col) } else { end_col.clone() };
            format!("{}{}:{}", prefix, a, b)
        }
        Expression::RowRef { sheet, start_row, end_row, start_absolute, end_absolute } => {
            let prefix = sheet.as_ref().map(|s| format!("{}!", s)).unwrap_or_default();
            let a = if *start_absolute { format!("${}", start_row) } else { start_row.to_string() };
            let b = if *end_absolute { format!("${}", end_row) } else { end_row.to_string() };
            format!("{}{}:{}", prefix, a, b)
        }
        Expression::BinaryOp { left, op, right } => {
            format!("{}{}{}", unparse(left, edit), op, unparse(right, edit))
        }
        Expression::UnaryOp { op, operand } => format!("{}{}", op, unparse(operand, edit)),
        Expression::FunctionCall { func, args } => {
            let rendered: Vec<String> = args.iter().map(|a| unparse(a, edit)).collect();
            format!("{}({})", fn_name(func), rendered.join(","))
        }
        Expression::NamedRef { name } => name.clone(),
        Expression::Sheet3DRef { start_sheet, end_sheet, reference } => {
            format!("{}:{}!{}", start_sheet, end_sheet, unparse(reference, edit))
        }
        Expression::TableRef { table_name, .. } => table_name.clone(),
    }
}

fn strip_sheet(rendered: &str) -> &str {
    rendered.rsplit('!').next().unwrap_or(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::Cell;
    use crate::evaluator::DefaultEvaluator;

    fn bounds() -> GridBounds {
        GridBounds { max_row: 1000, max_col: 100 }
    }

    #[test]
    fn test_sum_propagation() {
        let mut store = CellStore::new();
        let mut fe = FormulaEngine::new(Box::new(DefaultEvaluator));
        store.set_cell(0, 0, Cell::new_number(5.0)).unwrap();
        store.set_cell(0, 1, Cell::new_number(7.0)).unwrap();
        fe.set_formula(&mut store, (0, 2), "=A1+B1".to_string(), bounds()).unwrap();
        fe.calculate_sync(&mut store, bounds());
        assert_eq!(store.get_cell(0, 2).unwrap().value, CellValue::Number(12.0));

        store.set_cell(0, 0, Cell::new_number(10.0)).unwrap();
        fe.mark_dirty_transitive((0, 0));
        fe.calculate_sync(&mut store, bounds());
        assert_eq!(store.get_cell(0, 2).unwrap().value, CellValue::Number(17.0));
    }

    #[test]
    fn test_cycle_marks_both_cells() {
        let mut store = CellStore::new();
        let mut fe = FormulaEngine::new(Box::new(DefaultEvaluator));
        fe.set_formula(&mut store, (0, 0), "=B1".to_string(), bounds()).unwrap();
        fe.set_formula(&mut store, (0, 1), "=A1".to_string(), bounds()).unwrap();
        fe.calculate_sync(&mut store, bounds());
        assert_eq!(store.get_cell(0, 0).unwrap().value, CellValue::Error(CellError::Cycle));
        assert_eq!(store.get_cell(0, 1).unwrap().value, CellValue::Error(CellError::Cycle));
    }

    #[test]
    fn test_insert_rows_rewrites_relative_reference() {
        let mut store = CellStore::new();
        let mut fe = FormulaEngine::new(Box::new(DefaultEvaluator));
        store.set_cell(5, 0, Cell::new_number(3.0)).unwrap();
        fe.set_formula(&mut store, (6, 0), "=A6+1".to_string(), bounds()).unwrap();
        fe.calculate_sync(&mut store, bounds());

        store.insert_rows(3, 2).unwrap();
        fe.rewrite_references(&mut store, StructuralEdit::InsertRows { at: 3, count: 2 }).unwrap();
        fe.calculate_sync(&mut store, bounds());

        let moved = store.get_cell(8, 0).unwrap();
        assert_eq!(moved.formula.as_deref(), Some("=A8+1"));
        assert_eq!(moved.value, CellValue::Number(4.0));
    }

    #[test]
    fn test_delete_band_produces_ref_error() {
        let mut store = CellStore::new();
        let mut fe = FormulaEngine::new(Box::new(DefaultEvaluator));
        store.set_cell(2, 0, Cell::new_number(9.0)).unwrap();
        fe.set_formula(&mut store, (5, 0), "=A3+1".to_string(), bounds()).unwrap();
        store.delete_rows(2, 1).unwrap();
        fe.rewrite_references(&mut store, StructuralEdit::DeleteRows { at: 2, count: 1 }).unwrap();
        let moved = store.get_cell(4, 0).unwrap();
        assert_eq!(moved.formula.as_deref(), Some("=#REF!+1"));
    }

    #[test]
    fn test_absolute_reference_unaffected_by_insert() {
        let mut store = CellStore::new();
        let mut fe = FormulaEngine::new(Box::new(DefaultEvaluator));
        fe.set_formula(&mut store, (10, 0), "=$A$1+1".to_string(), bounds()).unwrap();
        store.insert_rows(0, 3).unwrap();
        fe.rewrite_references(&mut store, StructuralEdit::InsertRows { at: 0, count: 3 }).unwrap();
        let moved = store.get_cell(13, 0).unwrap();
        assert_eq!(moved.formula.as_deref(), Some("=$A$1+1"));
    }
}
