//! FILENAME: engine/src/facade.rs
//! PURPOSE: The single entry point a caller drives: owns every component,
//! runs the structural-edit coordination cascade, tracks a monotonic
//! version counter, and notifies subscribers synchronously on mutation.
//! CONTEXT: A plain Rust type with no IPC framing — every public method
//! here stands in for the command a UI layer would otherwise dispatch
//! over, minus any transport-specific plumbing a headless core has no
//! use for.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, CellValue};
use crate::cell_store::{CellStore, Direction};
use crate::comments::{CommentStore, Mention, ThreadId};
use crate::command::{
    snapshot_delete_band, BatchCellCommand, Command, ColumnWidthCommand, RowHeightCommand, SetCellCommand,
    StructuralEditCommand, UndoRedoStack, VisibilityCommand,
};
use crate::config::EngineConfig;
use crate::coord::{CellCoord, CellRange, MAX_COLS, MAX_ROWS};
use crate::dependency_extractor::GridBounds;
use crate::error::{EngineError, EngineResult};
use crate::evaluator::{EvalContext, FormulaEvaluator};
use crate::filter::{ColumnPredicate, FilterManager};
use crate::find_replace::{search, FindOptions, FindSession, Match, ReplaceReport};
use crate::formula_engine::{CalcProgress, FormulaEngine, StructuralEdit};
use crate::merge::{MergeInfo, MergeManager};
use crate::sort::{self, SortRule};
use crate::viewport::{DimensionProvider, RenderCell, VisibleEntry, Viewport};

/// Sum/average/count statistics over a selection.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SelectionStats {
    pub sum: f64,
    pub average: f64,
    pub count: usize,
    pub numeric_count: usize,
    pub min: f64,
    pub max: f64,
}

/// Aggregate counts for observability.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct EngineStats {
    pub cell_count: usize,
    pub formula_count: usize,
    pub comment_thread_count: usize,
    pub merge_count: usize,
}

struct StoreDimensionProvider<'a> {
    store: &'a CellStore,
}

impl<'a> DimensionProvider for StoreDimensionProvider<'a> {
    fn row_height(&self, row: u32) -> u32 {
        self.store.row_height(row)
    }
    fn col_width(&self, col: u32) -> u32 {
        self.store.col_width(col)
    }
    fn is_row_hidden(&self, row: u32) -> bool {
        self.store.is_row_hidden(row)
    }
    fn is_col_hidden(&self, col: u32) -> bool {
        self.store.is_col_hidden(col)
    }
    fn last_used_row(&self) -> u32 {
        self.store.get_used_range().map(|r| r.end_row).unwrap_or(0)
    }
    fn last_used_col(&self) -> u32 {
        self.store.get_used_range().map(|r| r.end_col).unwrap_or(0)
    }
}

/// The owning type for the whole spreadsheet core. Mutation methods run
/// the coordination cascade below; query methods are pure reads.
pub struct SpreadsheetEngine {
    store: CellStore,
    formulas: FormulaEngine,
    filters: FilterManager,
    comments: CommentStore,
    merges: MergeManager,
    viewport: Viewport,
    undo: UndoRedoStack,
    version: u64,
    listeners: Vec<Box<dyn Fn(u64)>>,
    bounds: GridBounds,
    config: EngineConfig,
}

impl SpreadsheetEngine {
    pub fn new(evaluator: Box<dyn FormulaEvaluator>) -> Self {
        Self::with_config(evaluator, EngineConfig::default())
    }

    /// Builds an engine with host-tunable limits (viewport buffers, undo
    /// caps, default async recalc slice) instead of the crate defaults.
    pub fn with_config(evaluator: Box<dyn FormulaEvaluator>, config: EngineConfig) -> Self {
        SpreadsheetEngine {
            store: CellStore::new(),
            formulas: FormulaEngine::new(evaluator),
            filters: FilterManager::new(),
            comments: CommentStore::new(),
            merges: MergeManager::new(),
            viewport: Viewport::with_buffers(config.viewport_buffer_rows, config.viewport_buffer_cols),
            undo: UndoRedoStack::with_bounds(config.undo_max_entries, config.undo_max_bytes),
            version: 0,
            listeners: Vec::new(),
            bounds: GridBounds { max_row: MAX_ROWS, max_col: MAX_COLS },
            config,
        }
    }

    // -- change notification -------------------------------------------

    pub fn subscribe(&mut self, listener: Box<dyn Fn(u64)>) {
        self.listeners.push(listener);
    }

    pub fn get_version(&self) -> u64 {
        self.version
    }

    fn bump_version(&mut self) {
        self.version += 1;
        for listener in &self.listeners {
            listener(self.version);
        }
    }

    // -- internals used by command.rs -----------------------------------

    pub(crate) fn store_mut(&mut self) -> &mut CellStore {
        &mut self.store
    }

    /// Writes `cell` verbatim (or clears the coordinate if `None`),
    /// re-deriving formula dependencies if it carries a formula. Used by
    /// undo/redo to restore an exact prior snapshot without re-parsing
    /// through `set_cell_value`'s `=`-prefix sniffing.
    pub(crate) fn restore_cell(&mut self, row: u32, col: u32, cell: Option<Cell>) -> EngineResult<()> {
        match cell {
            Some(c) => {
                if let Some(formula) = c.formula.clone() {
                    self.formulas.set_formula(&mut self.store, (row, col), formula, self.bounds)?;
                    let mut stored = self.store.get_cell(row, col).cloned().unwrap_or(c);
                    stored.style_index = self.store.get_cell(row, col).map(|existing| existing.style_index).unwrap_or(0);
                    self.store.set_cell(row, col, stored)?;
                } else {
                    self.formulas.remove_formula((row, col));
                    self.store.set_cell(row, col, c)?;
                }
            }
            None => {
                self.formulas.remove_formula((row, col));
                self.store.delete_cell(row, col);
            }
        }
        self.formulas.calculate_sync(&mut self.store, self.bounds);
        Ok(())
    }

    /// Runs one structural edit against the cell store and cascades it
    /// through comments, merges, and formula reference rewriting, in that
    /// order. Does not snapshot, version-bump, or push an undo command;
    /// callers needing that wrap this in a Command.
    pub(crate) fn run_structural_edit(&mut self, edit: StructuralEdit) -> EngineResult<()> {
        log::debug!("running structural edit: {:?}", edit);
        match edit {
            StructuralEdit::InsertRows { at, count } => self.store.insert_rows(at, count)?,
            StructuralEdit::DeleteRows { at, count } => self.store.delete_rows(at, count)?,
            StructuralEdit::InsertCols { at, count } => self.store.insert_columns(at, count)?,
            StructuralEdit::DeleteCols { at, count } => self.store.delete_columns(at, count)?,
        }
        self.comments.apply_structural_edit(edit);
        self.merges.apply_structural_edit(edit);
        self.formulas.rewrite_references(&mut self.store, edit)?;
        self.filters.invalidate_cache();
        self.viewport.invalidate_cache(None, None);
        Ok(())
    }

    // -- cell read/write --------------------------------------------------

    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.store.get_cell(row, col)
    }

    /// Raw value, or the flattened display string for `FormattedText`
    /// cells.
    pub fn get_cell_display_value(&self, row: u32, col: u32) -> String {
        match self.store.get_cell(row, col).map(|c| &c.value) {
            Some(CellValue::Empty) | None => String::new(),
            Some(CellValue::Number(n)) => format!("{}", n),
            Some(CellValue::Text(s)) => s.clone(),
            Some(CellValue::Boolean(b)) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Some(CellValue::FormattedText(ft)) => ft.display_value(),
            Some(CellValue::Error(e)) => e.tag().to_string(),
        }
    }

    pub fn get_used_range(&self) -> Option<CellRange> {
        self.store.get_used_range()
    }

    /// `setCellValue`: a string starting with `=` is treated as a formula;
    /// anything else is stored as a literal. Recalculation runs
    /// synchronously before this returns, matching the façade's
    /// auto-recalc contract so callers observe up-to-date values.
    pub fn set_cell_value(&mut self, row: u32, col: u32, raw: &str) -> EngineResult<()> {
        let before = self.store.get_cell(row, col).cloned();
        let is_formula = raw.starts_with('=');

        if is_formula {
            self.formulas.set_formula(&mut self.store, (row, col), raw.to_string(), self.bounds)?;
        } else {
            self.formulas.remove_formula((row, col));
            let mut cell = self.store.get_cell(row, col).cloned().unwrap_or_default();
            cell.formula = None;
            cell.value = literal_value(raw);
            cell.dirty = false;
            self.store.set_cell(row, col, cell)?;
        }
        self.formulas.calculate_sync(&mut self.store, self.bounds);
        let after = self.store.get_cell(row, col).cloned();

        self.undo.push(Box::new(SetCellCommand {
            row,
            col,
            before,
            after,
            description: format!("Edit cell ({}, {})", row, col),
        }));
        self.filters.invalidate_cache();
        self.viewport.invalidate_cache(Some(row), Some(col));
        self.bump_version();
        Ok(())
    }

    pub fn set_cell_format(&mut self, row: u32, col: u32, style_index: usize) -> EngineResult<()> {
        let before = self.store.get_cell(row, col).cloned();
        let mut cell = self.store.get_cell(row, col).cloned().unwrap_or_default();
        cell.style_index = style_index;
        self.store.set_cell(row, col, cell)?;
        let after = self.store.get_cell(row, col).cloned();
        self.undo.push(Box::new(SetCellCommand {
            row,
            col,
            before,
            after,
            description: format!("Format cell ({}, {})", row, col),
        }));
        self.bump_version();
        Ok(())
    }

    pub fn delete_selection(&mut self, range: CellRange) -> EngineResult<()> {
        let mut changes = Vec::new();
        for row in range.start_row..=range.end_row {
            for col in range.start_col..=range.end_col {
                let before = self.store.get_cell(row, col).cloned();
                if before.is_some() {
                    self.formulas.remove_formula((row, col));
                    self.store.delete_cell(row, col);
                    changes.push((row, col, before, None));
                }
            }
        }
        self.formulas.calculate_sync(&mut self.store, self.bounds);
        if !changes.is_empty() {
            self.undo.push(Box::new(BatchCellCommand { changes, description: "Clear range".to_string() }));
        }
        self.filters.invalidate_cache();
        self.viewport.invalidate_cache(Some(range.start_row), Some(range.start_col));
        self.bump_version();
        Ok(())
    }

    // -- structural edits --------------------------------------------------

    fn do_structural_edit(&mut self, edit: StructuralEdit, description: &str) -> EngineResult<()> {
        let snapshot = snapshot_delete_band(&self.store, edit);
        self.run_structural_edit(edit)?;
        self.undo.push(Box::new(StructuralEditCommand { edit, snapshot, description: description.to_string() }));
        self.bump_version();
        Ok(())
    }

    pub fn insert_rows(&mut self, at: u32, count: u32) -> EngineResult<()> {
        self.do_structural_edit(StructuralEdit::InsertRows { at, count }, "Insert rows")
    }

    pub fn delete_rows(&mut self, at: u32, count: u32) -> EngineResult<()> {
        self.do_structural_edit(StructuralEdit::DeleteRows { at, count }, "Delete rows")
    }

    pub fn insert_columns(&mut self, at: u32, count: u32) -> EngineResult<()> {
        self.do_structural_edit(StructuralEdit::InsertCols { at, count }, "Insert columns")
    }

    pub fn delete_columns(&mut self, at: u32, count: u32) -> EngineResult<()> {
        self.do_structural_edit(StructuralEdit::DeleteCols { at, count }, "Delete columns")
    }

    pub fn hide_row(&mut self, row: u32) -> EngineResult<()> {
        self.set_row_visibility(row, true)
    }
    pub fn show_row(&mut self, row: u32) -> EngineResult<()> {
        self.set_row_visibility(row, false)
    }
    pub fn hide_column(&mut self, col: u32) -> EngineResult<()> {
        self.set_col_visibility(col, true)
    }
    pub fn show_column(&mut self, col: u32) -> EngineResult<()> {
        self.set_col_visibility(col, false)
    }

    fn set_row_visibility(&mut self, row: u32, hidden: bool) -> EngineResult<()> {
        let before = self.store.is_row_hidden(row);
        self.store.set_row_hidden(row, hidden);
        self.undo.push(Box::new(VisibilityCommand { is_row: true, index: row, before, after: hidden }));
        self.viewport.invalidate_cache(Some(row), None);
        self.bump_version();
        Ok(())
    }

    fn set_col_visibility(&mut self, col: u32, hidden: bool) -> EngineResult<()> {
        let before = self.store.is_col_hidden(col);
        self.store.set_col_hidden(col, hidden);
        self.undo.push(Box::new(VisibilityCommand { is_row: false, index: col, before, after: hidden }));
        self.viewport.invalidate_cache(None, Some(col));
        self.bump_version();
        Ok(())
    }

    pub fn set_row_height(&mut self, row: u32, height: u32) -> EngineResult<()> {
        let before = self.store.row_height(row);
        self.store.set_row_height(row, height);
        self.undo.push(Box::new(RowHeightCommand { row, before, after: height }));
        self.viewport.invalidate_cache(Some(row), None);
        self.bump_version();
        Ok(())
    }

    pub fn set_col_width(&mut self, col: u32, width: u32) -> EngineResult<()> {
        let before = self.store.col_width(col);
        self.store.set_col_width(col, width);
        self.undo.push(Box::new(ColumnWidthCommand { col, before, after: width }));
        self.viewport.invalidate_cache(None, Some(col));
        self.bump_version();
        Ok(())
    }

    pub fn set_frozen_panes(&mut self, rows: u32, cols: u32) {
        self.viewport.set_frozen_panes(rows, cols);
    }

    // -- undo/redo -----------------------------------------------------

    pub fn undo(&mut self) -> EngineResult<bool> {
        let mut tmp = std::mem::take(&mut self.undo);
        let description = tmp.undo_description().map(str::to_string);
        let result = tmp.undo(self);
        self.undo = tmp;
        let did = result?;
        if did {
            log::debug!("undo: reverted {:?}", description.unwrap_or_default());
            self.bump_version();
        }
        Ok(did)
    }

    pub fn redo(&mut self) -> EngineResult<bool> {
        let mut tmp = std::mem::take(&mut self.undo);
        let description = tmp.redo_description().map(str::to_string);
        let result = tmp.redo(self);
        self.undo = tmp;
        let did = result?;
        if did {
            log::debug!("redo: re-applied {:?}", description.unwrap_or_default());
            self.bump_version();
        }
        Ok(did)
    }

    pub fn can_undo(&self) -> bool {
        self.undo.can_undo()
    }
    pub fn can_redo(&self) -> bool {
        self.undo.can_redo()
    }

    // -- recalculation ---------------------------------------------------

    pub fn calculate_sync(&mut self) {
        self.formulas.calculate_sync(&mut self.store, self.bounds);
        self.bump_version();
    }

    pub fn calculate_async(&mut self, slice_budget: Duration, progress: impl FnMut(CalcProgress)) {
        self.formulas.calculate_async(&mut self.store, self.bounds, slice_budget, progress);
        self.bump_version();
    }

    /// `calculate_async` using the engine's configured default time slice.
    pub fn calculate_async_default(&mut self, progress: impl FnMut(CalcProgress)) {
        self.calculate_async(self.config.async_recalc_slice, progress);
    }

    pub fn cancel_calculation(&mut self) {
        self.formulas.cancel_calculation();
    }

    // -- selection stats / observability ---------------------------------

    pub fn get_selection_stats(&self, range: CellRange) -> SelectionStats {
        let mut stats = SelectionStats { min: f64::INFINITY, max: f64::NEG_INFINITY, ..Default::default() };
        for (_, cell) in self.store.get_cells_in_range(range) {
            stats.count += 1;
            if let CellValue::Number(n) = &cell.value {
                stats.numeric_count += 1;
                stats.sum += *n;
                stats.min = stats.min.min(*n);
                stats.max = stats.max.max(*n);
            }
        }
        if stats.numeric_count > 0 {
            stats.average = stats.sum / stats.numeric_count as f64;
        } else {
            stats.min = 0.0;
            stats.max = 0.0;
        }
        stats
    }

    pub fn get_stats(&self) -> EngineStats {
        let used = self.store.get_used_range();
        let cell_count = used.map(|r| self.store.get_cells_in_range(r).len()).unwrap_or(0);
        EngineStats {
            cell_count,
            formula_count: self.formulas.graph().formula_cell_count(),
            comment_thread_count: self.comments.all_threads().count(),
            merge_count: self.merges.all_merges().count(),
        }
    }

    // -- viewport ---------------------------------------------------------

    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        self.viewport.set_viewport_size(width, height);
    }

    pub fn scroll_to(&mut self, x: u32, y: u32) {
        self.viewport.set_scroll(x, y);
    }

    pub fn get_visible_rows(&mut self) -> Vec<VisibleEntry> {
        let dim = StoreDimensionProvider { store: &self.store };
        self.viewport.get_visible_rows(&dim)
    }

    pub fn get_visible_columns(&mut self) -> Vec<VisibleEntry> {
        let dim = StoreDimensionProvider { store: &self.store };
        self.viewport.get_visible_columns(&dim)
    }

    pub fn get_row_top(&mut self, row: u32) -> u32 {
        let dim = StoreDimensionProvider { store: &self.store };
        self.viewport.get_row_top(row, &dim)
    }

    pub fn get_col_left(&mut self, col: u32) -> u32 {
        let dim = StoreDimensionProvider { store: &self.store };
        self.viewport.get_col_left(col, &dim)
    }

    pub fn get_max_scroll(&mut self) -> (u32, u32) {
        let dim = StoreDimensionProvider { store: &self.store };
        self.viewport.get_max_scroll(&dim)
    }

    pub fn get_cell_at_point(&mut self, x: u32, y: u32) -> (u32, u32) {
        let dim = StoreDimensionProvider { store: &self.store };
        self.viewport.get_cell_at_point(x, y, &dim)
    }

    pub fn get_cells_to_render(&mut self) -> Vec<RenderCell> {
        let dim = StoreDimensionProvider { store: &self.store };
        let merges = &self.merges;
        self.viewport.get_cells_to_render(&dim, |row, col| {
            merges.get_merge_info((row, col)).map(|info| (info.anchor_row, info.anchor_col, info.row_span, info.col_span))
        })
    }

    // -- filter / sort -----------------------------------------------------

    pub fn apply_filter(&mut self, col: u32, predicate: ColumnPredicate) {
        self.filters.apply_filter(col, predicate);
        self.viewport.invalidate_cache(None, Some(col));
        self.bump_version();
    }

    pub fn clear_filter(&mut self, col: u32) {
        self.filters.clear_filter(col);
        self.bump_version();
    }

    pub fn clear_all_filters(&mut self) {
        self.filters.clear_all_filters();
        self.bump_version();
    }

    pub fn has_filters(&self) -> bool {
        self.filters.has_filters()
    }

    pub fn is_column_filtered(&self, col: u32) -> bool {
        self.filters.is_column_filtered(col)
    }

    pub fn get_filtered_rows(&self) -> std::collections::HashSet<u32> {
        self.filters.get_filtered_rows(&self.store)
    }

    pub fn sort_range(&mut self, range: CellRange, rules: &[SortRule], has_header: bool) -> EngineResult<()> {
        let expanded = self.merges.expand_range_to_include_merges(range);
        sort::sort_range(&mut self.store, expanded, rules, has_header)?;
        self.formulas.calculate_sync(&mut self.store, self.bounds);
        self.filters.invalidate_cache();
        self.viewport.invalidate_cache(Some(expanded.start_row), Some(expanded.start_col));
        self.bump_version();
        Ok(())
    }

    pub fn apply_range_filter(&mut self, range: CellRange, column: u32, predicate: &ColumnPredicate) {
        sort::apply_range_filter(&mut self.store, range, column, predicate);
        self.viewport.invalidate_cache(Some(range.start_row), None);
        self.bump_version();
    }

    // -- find/replace -------------------------------------------------------

    pub fn find(&self, query: &str, options: &FindOptions) -> EngineResult<FindSession> {
        Ok(FindSession::new(search(&self.store, query, options)?))
    }

    pub fn replace_one(&mut self, m: &Match, replacement: &str) -> EngineResult<()> {
        self.store.get_cell(m.cell.0, m.cell.1).cloned().ok_or_else(|| EngineError::NotFound("cell".into()))?;
        crate::find_replace::replace_one(&mut self.store, m, replacement)?;
        self.formulas.calculate_sync(&mut self.store, self.bounds);
        self.filters.invalidate_cache();
        self.bump_version();
        Ok(())
    }

    pub fn replace_all(&mut self, matches: &[Match], replacement: &str) -> ReplaceReport {
        let report = crate::find_replace::replace_all(&mut self.store, matches, replacement);
        self.formulas.calculate_sync(&mut self.store, self.bounds);
        self.filters.invalidate_cache();
        self.bump_version();
        report
    }

    // -- comments ------------------------------------------------------------

    pub fn create_comment_thread(
        &mut self,
        row: u32,
        col: u32,
        author_id: String,
        author_name: String,
        text: String,
        mentions: Vec<Mention>,
    ) -> EngineResult<ThreadId> {
        let id = self.comments.create_thread(row, col, author_id, author_name, text, mentions)?;
        self.bump_version();
        Ok(id)
    }

    pub fn add_comment_reply(
        &mut self,
        thread_id: &str,
        author_id: String,
        author_name: String,
        text: String,
        mentions: Vec<Mention>,
    ) -> EngineResult<String> {
        let id = self.comments.add_reply(thread_id, author_id, author_name, text, mentions)?;
        self.bump_version();
        Ok(id)
    }

    pub fn delete_comment(&mut self, thread_id: &str, comment_id: &str, deleted_by: String) -> EngineResult<()> {
        self.comments.delete_comment(thread_id, comment_id, deleted_by)?;
        self.bump_version();
        Ok(())
    }

    pub fn undelete_comment(&mut self, thread_id: &str, comment_id: &str) -> EngineResult<()> {
        self.comments.undelete_comment(thread_id, comment_id)?;
        self.bump_version();
        Ok(())
    }

    pub fn resolve_thread(&mut self, thread_id: &str, resolved: bool, resolved_by: String) -> EngineResult<()> {
        self.comments.set_resolved(thread_id, resolved, resolved_by)?;
        self.bump_version();
        Ok(())
    }

    pub fn delete_thread(&mut self, thread_id: &str) -> EngineResult<()> {
        self.comments.delete_thread(thread_id)?;
        self.bump_version();
        Ok(())
    }

    pub fn threads_at(&self, row: u32, col: u32) -> Vec<&crate::comments::Thread> {
        self.comments.threads_at(row, col)
    }

    pub fn threads_by_author(&self, author_id: &str) -> Vec<&crate::comments::Thread> {
        self.comments.threads_by_author(author_id)
    }

    pub fn threads_containing_text(&self, query: &str) -> Vec<&crate::comments::Thread> {
        self.comments.threads_containing_text(query)
    }

    /// Drains analytics events accumulated since the last drain.
    pub fn drain_comment_events(&mut self) -> Vec<crate::comments::CommentEvent> {
        self.comments.drain_events()
    }

    // -- merges --------------------------------------------------------------

    pub fn merge_cells(&mut self, range: CellRange) -> EngineResult<MergeInfo> {
        let info = self.merges.merge(range)?;
        for row in range.start_row..=range.end_row {
            for col in range.start_col..=range.end_col {
                if let Some(mut cell) = self.store.get_cell(row, col).cloned() {
                    cell.merge = self.merges.cell_merge_meta((row, col));
                    self.store.set_cell(row, col, cell)?;
                }
            }
        }
        self.viewport.invalidate_cache(Some(range.start_row), Some(range.start_col));
        self.bump_version();
        Ok(info)
    }

    pub fn unmerge_cells(&mut self, coord: CellCoord) -> EngineResult<()> {
        let info = self.merges.unmerge(coord)?;
        let range = info.range();
        for row in range.start_row..=range.end_row {
            for col in range.start_col..=range.end_col {
                if let Some(mut cell) = self.store.get_cell(row, col).cloned() {
                    cell.merge = None;
                    self.store.set_cell(row, col, cell)?;
                }
            }
        }
        self.viewport.invalidate_cache(Some(range.start_row), Some(range.start_col));
        self.bump_version();
        Ok(())
    }

    pub fn is_merged(&self, coord: CellCoord) -> bool {
        self.merges.is_merged(coord)
    }

    pub fn get_merge_info(&self, coord: CellCoord) -> Option<MergeInfo> {
        self.merges.get_merge_info(coord)
    }

    // -- navigation helpers (used by selection/keyboard logic upstream) --

    pub fn find_next_non_empty(&self, row: u32, col: u32, direction: Direction) -> CellCoord {
        self.store.find_next_non_empty(row, col, direction)
    }

    pub fn find_current_region(&self, row: u32, col: u32) -> Option<CellRange> {
        self.store.find_current_region(row, col)
    }

    // -- data exchange --------------------------------------------------

    /// Clears the sheet and writes `rows[r][c]` as cell values, then runs
    /// one recalculation pass at the end rather than per cell.
    pub fn load_from_array(&mut self, rows: &[Vec<String>]) -> EngineResult<()> {
        self.store = CellStore::new();
        self.filters.clear_all_filters();
        self.comments = CommentStore::new();
        self.merges = MergeManager::new();
        self.undo.clear();

        for (r, row) in rows.iter().enumerate() {
            for (c, raw) in row.iter().enumerate() {
                if raw.is_empty() {
                    continue;
                }
                let row_idx = r as u32;
                let col_idx = c as u32;
                if let Some(formula) = raw.strip_prefix('=') {
                    self.formulas.set_formula(&mut self.store, (row_idx, col_idx), format!("={}", formula), self.bounds)?;
                } else {
                    self.store.set_cell(row_idx, col_idx, literal_cell(raw))?;
                }
            }
        }
        self.formulas.calculate_sync(&mut self.store, self.bounds);
        self.viewport.invalidate_cache(None, None);
        self.bump_version();
        Ok(())
    }

    /// A dense rectangle over the used range; `include_formulas` swaps a
    /// formula cell's rendered value for its source text.
    pub fn to_array(&self, include_formulas: bool) -> Vec<Vec<String>> {
        let Some(used) = self.store.get_used_range() else { return Vec::new() };
        (used.start_row..=used.end_row)
            .map(|row| {
                (used.start_col..=used.end_col)
                    .map(|col| match self.store.get_cell(row, col) {
                        Some(cell) if include_formulas && cell.formula.is_some() => cell.formula.clone().unwrap(),
                        Some(_) => self.get_cell_display_value(row, col),
                        None => String::new(),
                    })
                    .collect()
            })
            .collect()
    }

    // -- serialization ----------------------------------------------------

    pub fn serialize(&self) -> EngineSnapshot {
        EngineSnapshot { version: 1, cells: self.store.serialize(), filters: self.filters.serialize() }
    }

    /// Rebuilds cell storage and filter state from a snapshot, then
    /// re-registers every formula cell to rebuild the dependency graph
    /// (dependency edges are not part of the wire format). Comments,
    /// merges, and undo history are not covered by `EngineSnapshot` and
    /// are left untouched.
    pub fn deserialize(&mut self, snapshot: EngineSnapshot) -> EngineResult<()> {
        if snapshot.version != 1 {
            return Err(EngineError::UnsupportedFormat(format!("unknown engine snapshot version {}", snapshot.version)));
        }
        self.store = CellStore::deserialize(snapshot.cells)?;
        self.filters = FilterManager::deserialize(snapshot.filters);
        self.formulas.clear();
        if let Some(used) = self.store.get_used_range() {
            let formula_cells: Vec<(CellCoord, String)> = self
                .store
                .get_cells_in_range(used)
                .into_iter()
                .filter_map(|(coord, cell)| cell.formula.clone().map(|f| (coord, f)))
                .collect();
            for (coord, formula) in formula_cells {
                self.formulas.set_formula(&mut self.store, coord, formula, self.bounds)?;
            }
            self.formulas.calculate_sync(&mut self.store, self.bounds);
        }
        self.bump_version();
        Ok(())
    }
}

impl Default for SpreadsheetEngine {
    fn default() -> Self {
        SpreadsheetEngine::new(Box::new(crate::evaluator::DefaultEvaluator))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub version: u32,
    pub cells: crate::cell_store::CellStoreSnapshot,
    pub filters: crate::filter::EngineFilterSnapshot,
}

fn literal_value(raw: &str) -> CellValue {
    if raw.is_empty() {
        CellValue::Empty
    } else if let Ok(n) = raw.parse::<f64>() {
        CellValue::Number(n)
    } else if raw.eq_ignore_ascii_case("true") {
        CellValue::Boolean(true)
    } else if raw.eq_ignore_ascii_case("false") {
        CellValue::Boolean(false)
    } else {
        CellValue::Text(raw.to_string())
    }
}

fn literal_cell(raw: &str) -> Cell {
    let mut cell = Cell::new();
    cell.value = literal_value(raw);
    cell
}
