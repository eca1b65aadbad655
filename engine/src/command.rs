//! FILENAME: engine/src/command.rs
//! PURPOSE: Command-pattern undo/redo with byte- and count-capped history.
//! CONTEXT: Trait objects capture arbitrary pre-state (including full-range
//! snapshots for destructive structural edits) plus an approximate byte
//! cost, so the stack can enforce both a count cap and a memory bound.

use std::collections::VecDeque;

use crate::cell::Cell;
use crate::cell_store::CellStore;
use crate::error::EngineResult;
use crate::facade::SpreadsheetEngine;
use crate::formula_engine::StructuralEdit;

/// A reversible operation. `apply`/`revert` both run against the full
/// façade so a command can coordinate cell store, formula graph, merges,
/// comments, and filters in one call, matching the coordination cascade
/// the façade itself runs for a live edit.
pub trait Command: std::fmt::Debug {
    fn apply(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()>;
    fn revert(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()>;
    fn approximate_memory_cost(&self) -> usize;
    fn description(&self) -> &str;
}

fn cell_cost(cell: &Option<Cell>) -> usize {
    std::mem::size_of::<Cell>() + cell.as_ref().and_then(|c| c.formula.as_ref()).map(|f| f.len()).unwrap_or(0)
}

#[derive(Debug)]
pub struct SetCellCommand {
    pub row: u32,
    pub col: u32,
    pub before: Option<Cell>,
    pub after: Option<Cell>,
    pub description: String,
}

impl Command for SetCellCommand {
    fn apply(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        engine.restore_cell(self.row, self.col, self.after.clone())
    }
    fn revert(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        engine.restore_cell(self.row, self.col, self.before.clone())
    }
    fn approximate_memory_cost(&self) -> usize {
        cell_cost(&self.before) + cell_cost(&self.after)
    }
    fn description(&self) -> &str {
        &self.description
    }
}

/// Groups several `SetCellCommand`-shaped changes (e.g. `loadFromArray`,
/// paste) into one undo step.
#[derive(Debug)]
pub struct BatchCellCommand {
    pub changes: Vec<(u32, u32, Option<Cell>, Option<Cell>)>,
    pub description: String,
}

impl Command for BatchCellCommand {
    fn apply(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        for (row, col, _, after) in &self.changes {
            engine.restore_cell(*row, *col, after.clone())?;
        }
        Ok(())
    }
    fn revert(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        for (row, col, before, _) in &self.changes {
            engine.restore_cell(*row, *col, before.clone())?;
        }
        Ok(())
    }
    fn approximate_memory_cost(&self) -> usize {
        self.changes.iter().map(|(_, _, b, a)| cell_cost(b) + cell_cost(a)).sum()
    }
    fn description(&self) -> &str {
        &self.description
    }
}

#[derive(Debug)]
pub struct RowHeightCommand {
    pub row: u32,
    pub before: u32,
    pub after: u32,
}

impl Command for RowHeightCommand {
    fn apply(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        engine.store_mut().set_row_height(self.row, self.after);
        Ok(())
    }
    fn revert(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        engine.store_mut().set_row_height(self.row, self.before);
        Ok(())
    }
    fn approximate_memory_cost(&self) -> usize {
        std::mem::size_of::<Self>()
    }
    fn description(&self) -> &str {
        "Resize row"
    }
}

#[derive(Debug)]
pub struct ColumnWidthCommand {
    pub col: u32,
    pub before: u32,
    pub after: u32,
}

impl Command for ColumnWidthCommand {
    fn apply(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        engine.store_mut().set_col_width(self.col, self.after);
        Ok(())
    }
    fn revert(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        engine.store_mut().set_col_width(self.col, self.before);
        Ok(())
    }
    fn approximate_memory_cost(&self) -> usize {
        std::mem::size_of::<Self>()
    }
    fn description(&self) -> &str {
        "Resize column"
    }
}

#[derive(Debug)]
pub struct VisibilityCommand {
    pub is_row: bool,
    pub index: u32,
    pub before: bool,
    pub after: bool,
}

impl Command for VisibilityCommand {
    fn apply(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        if self.is_row {
            engine.store_mut().set_row_hidden(self.index, self.after);
        } else {
            engine.store_mut().set_col_hidden(self.index, self.after);
        }
        Ok(())
    }
    fn revert(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        if self.is_row {
            engine.store_mut().set_row_hidden(self.index, self.before);
        } else {
            engine.store_mut().set_col_hidden(self.index, self.before);
        }
        Ok(())
    }
    fn approximate_memory_cost(&self) -> usize {
        std::mem::size_of::<Self>()
    }
    fn description(&self) -> &str {
        if self.is_row { "Hide/show row" } else { "Hide/show column" }
    }
}

/// A full deep-clone snapshot of a structural edit's affected band,
/// captured before `apply()` runs so `revert()` can restore exactly what
/// was displaced or deleted rather than only shifting indices back.
#[derive(Debug)]
pub struct StructuralEditCommand {
    pub edit: StructuralEdit,
    pub snapshot: Vec<(u32, u32, Cell)>,
    pub description: String,
}

impl StructuralEditCommand {
    fn inverse(&self) -> StructuralEdit {
        match self.edit {
            StructuralEdit::InsertRows { at, count } => StructuralEdit::DeleteRows { at, count },
            StructuralEdit::DeleteRows { at, count } => StructuralEdit::InsertRows { at, count },
            StructuralEdit::InsertCols { at, count } => StructuralEdit::DeleteCols { at, count },
            StructuralEdit::DeleteCols { at, count } => StructuralEdit::InsertCols { at, count },
        }
    }
}

impl Command for StructuralEditCommand {
    fn apply(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        engine.run_structural_edit(self.edit)
    }
    fn revert(&self, engine: &mut SpreadsheetEngine) -> EngineResult<()> {
        engine.run_structural_edit(self.inverse())?;
        for (row, col, cell) in &self.snapshot {
            engine.restore_cell(*row, *col, Some(cell.clone()))?;
        }
        Ok(())
    }
    fn approximate_memory_cost(&self) -> usize {
        self.snapshot.iter().map(|(_, _, c)| cell_cost(&Some(c.clone()))).sum::<usize>()
            + std::mem::size_of::<StructuralEdit>()
    }
    fn description(&self) -> &str {
        &self.description
    }
}

/// Builds the pre-apply snapshot a `StructuralEditCommand` needs for a
/// delete edit: every non-empty cell in the band about to be removed.
pub fn snapshot_delete_band(store: &CellStore, edit: StructuralEdit) -> Vec<(u32, u32, Cell)> {
    use crate::coord::{CellRange, MAX_COLS, MAX_ROWS};
    let Some(used) = store.get_used_range() else { return Vec::new() };
    let range = match edit {
        StructuralEdit::DeleteRows { at, count } => {
            CellRange { start_row: at, end_row: (at + count - 1).min(used.end_row), start_col: 0, end_col: MAX_COLS - 1 }
        }
        StructuralEdit::DeleteCols { at, count } => {
            CellRange { start_row: 0, end_row: MAX_ROWS - 1, start_col: at, end_col: (at + count - 1).min(used.end_col) }
        }
        _ => return Vec::new(),
    };
    store.get_cells_in_range(range).into_iter().map(|((r, c), cell)| (r, c, cell.clone())).collect()
}

pub(crate) const DEFAULT_MAX_ENTRIES: usize = 1000;
pub(crate) const DEFAULT_MAX_BYTES: usize = 100 * 1024 * 1024;

/// Undo/redo history with FIFO eviction once either the entry count or
/// the summed `approximate_memory_cost` exceeds its configured bound.
#[derive(Default)]
pub struct UndoRedoStack {
    undo_stack: VecDeque<(Box<dyn Command>, usize)>,
    redo_stack: VecDeque<(Box<dyn Command>, usize)>,
    total_bytes: usize,
    max_entries: usize,
    max_bytes: usize,
}

impl std::fmt::Debug for UndoRedoStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UndoRedoStack")
            .field("undo_len", &self.undo_stack.len())
            .field("redo_len", &self.redo_stack.len())
            .field("total_bytes", &self.total_bytes)
            .finish()
    }
}

impl UndoRedoStack {
    pub fn new() -> Self {
        UndoRedoStack {
            undo_stack: VecDeque::new(),
            redo_stack: VecDeque::new(),
            total_bytes: 0,
            max_entries: DEFAULT_MAX_ENTRIES,
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }

    pub fn with_bounds(max_entries: usize, max_bytes: usize) -> Self {
        UndoRedoStack { undo_stack: VecDeque::new(), redo_stack: VecDeque::new(), total_bytes: 0, max_entries, max_bytes }
    }

    /// Records an already-applied command, clearing the redo stack (a
    /// fresh action invalidates any pending redo history).
    pub fn push(&mut self, command: Box<dyn Command>) {
        self.redo_stack.clear();
        let cost = command.approximate_memory_cost();
        self.total_bytes += cost;
        self.undo_stack.push_back((command, cost));
        self.evict();
    }

    fn evict(&mut self) {
        while self.undo_stack.len() > self.max_entries || self.total_bytes > self.max_bytes {
            if let Some((command, cost)) = self.undo_stack.pop_front() {
                log::debug!("undo stack evicting oldest entry {:?} ({} bytes)", command.description(), cost);
                self.total_bytes = self.total_bytes.saturating_sub(cost);
            } else {
                break;
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack.back().map(|(c, _)| c.description())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack.back().map(|(c, _)| c.description())
    }

    /// Pops the top undo command, reverts it against `engine`, and moves
    /// it to the redo stack.
    pub fn undo(&mut self, engine: &mut SpreadsheetEngine) -> EngineResult<bool> {
        let Some((command, cost)) = self.undo_stack.pop_back() else { return Ok(false) };
        self.total_bytes = self.total_bytes.saturating_sub(cost);
        command.revert(engine)?;
        self.redo_stack.push_back((command, cost));
        Ok(true)
    }

    /// Pops the top redo command, re-applies it against `engine`, and
    /// moves it back to the undo stack (without clearing redo, since this
    /// is itself a redo, not a new action).
    pub fn redo(&mut self, engine: &mut SpreadsheetEngine) -> EngineResult<bool> {
        let Some((command, cost)) = self.redo_stack.pop_back() else { return Ok(false) };
        command.apply(engine)?;
        self.total_bytes += cost;
        self.undo_stack.push_back((command, cost));
        self.evict();
        Ok(true)
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.total_bytes = 0;
    }

    pub fn stack_sizes(&self) -> (usize, usize) {
        (self.undo_stack.len(), self.redo_stack.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cell::CellValue;
    use crate::evaluator::DefaultEvaluator;

    fn make_cell(val: f64) -> Cell {
        Cell::new_number(val)
    }

    #[test]
    fn test_undo_redo_round_trip() {
        let mut engine = SpreadsheetEngine::new(Box::new(DefaultEvaluator));
        let mut stack = UndoRedoStack::new();
        let cmd = SetCellCommand { row: 0, col: 0, before: None, after: Some(make_cell(5.0)), description: "Edit cell".into() };
        cmd.apply(&mut engine).unwrap();
        stack.push(Box::new(cmd));
        assert_eq!(engine.get_cell(0, 0).unwrap().value, CellValue::Number(5.0));

        stack.undo(&mut engine).unwrap();
        assert!(engine.get_cell(0, 0).is_none());
        assert!(stack.can_redo());

        stack.redo(&mut engine).unwrap();
        assert_eq!(engine.get_cell(0, 0).unwrap().value, CellValue::Number(5.0));
    }

    #[test]
    fn test_eviction_by_entry_count() {
        let mut engine = SpreadsheetEngine::new(Box::new(DefaultEvaluator));
        let mut stack = UndoRedoStack::with_bounds(2, DEFAULT_MAX_BYTES);
        for i in 0..3u32 {
            let cmd = SetCellCommand { row: i, col: 0, before: None, after: Some(make_cell(i as f64)), description: "Edit".into() };
            cmd.apply(&mut engine).unwrap();
            stack.push(Box::new(cmd));
        }
        assert_eq!(stack.stack_sizes().0, 2);
    }

    #[test]
    fn test_new_action_clears_redo() {
        let mut engine = SpreadsheetEngine::new(Box::new(DefaultEvaluator));
        let mut stack = UndoRedoStack::new();
        let cmd1 = SetCellCommand { row: 0, col: 0, before: None, after: Some(make_cell(1.0)), description: "a".into() };
        cmd1.apply(&mut engine).unwrap();
        stack.push(Box::new(cmd1));
        stack.undo(&mut engine).unwrap();
        assert!(stack.can_redo());

        let cmd2 = SetCellCommand { row: 1, col: 1, before: None, after: Some(make_cell(2.0)), description: "b".into() };
        cmd2.apply(&mut engine).unwrap();
        stack.push(Box::new(cmd2));
        assert!(!stack.can_redo());
    }
}
