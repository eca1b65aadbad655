//! FILENAME: engine/src/cell_store.rs
//! PURPOSE: The authoritative sparse cell repository.
//! CONTEXT: A flat HashMap keyed by coordinate, backed by reciprocal
//! row/column indices, sparse row/column metadata, a maintained used-range,
//! and the structural edit operations (insert/delete rows/columns) a real
//! spreadsheet needs.
//! `getCell`/`setCell` stay O(1); structural edits are O(cells affected).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::cell::{Cell, MergeMeta};
use crate::coord::{coord_key, in_bounds, parse_coord_key, CellCoord, CellRange, MAX_COLS, MAX_ROWS};
use crate::error::{EngineError, EngineResult};

pub const DEFAULT_ROW_HEIGHT: u32 = 21;
pub const DEFAULT_COL_WIDTH: u32 = 72;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

/// Per-row attributes. Only rows that deviate from the default are stored.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RowMeta {
    pub height: Option<u32>,
    pub hidden: bool,
}

/// Per-column attributes. Only columns that deviate from the default are stored.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ColMeta {
    pub width: Option<u32>,
    pub hidden: bool,
}

/// The sparse coordinate -> cell repository, with reciprocal row/column
/// indices kept coherent with the primary map on every mutation.
#[derive(Debug, Clone)]
pub struct CellStore {
    cells: HashMap<CellCoord, Cell>,
    by_row: BTreeMap<u32, BTreeSet<u32>>,
    by_col: BTreeMap<u32, BTreeSet<u32>>,
    row_meta: HashMap<u32, RowMeta>,
    col_meta: HashMap<u32, ColMeta>,
    used_range: Option<CellRange>,
}

impl CellStore {
    pub fn new() -> Self {
        CellStore {
            cells: HashMap::new(),
            by_row: BTreeMap::new(),
            by_col: BTreeMap::new(),
            row_meta: HashMap::new(),
            col_meta: HashMap::new(),
            used_range: None,
        }
    }

    fn check_bounds(row: u32, col: u32) -> EngineResult<()> {
        if !in_bounds(row, col) {
            return Err(EngineError::InvalidArgument(format!(
                "coordinate ({row}, {col}) is out of bounds"
            )));
        }
        Ok(())
    }

    fn expand_used_range(&mut self, row: u32, col: u32) {
        self.used_range = Some(match self.used_range {
            None => CellRange::single(row, col),
            Some(r) => CellRange::normalize(
                r.start_row.min(row),
                r.start_col.min(col),
                r.end_row.max(row),
                r.end_col.max(col),
            ),
        });
    }

    /// Full O(n) rescan of the used range; only needed after a deletion
    /// that touched a used-range boundary.
    fn recompute_used_range(&mut self) {
        self.used_range = self.cells.keys().fold(None, |acc, &(r, c)| {
            Some(match acc {
                None => CellRange::single(r, c),
                Some(cr) => CellRange::normalize(
                    cr.start_row.min(r),
                    cr.start_col.min(c),
                    cr.end_row.max(r),
                    cr.end_col.max(c),
                ),
            })
        });
    }

    pub fn get_cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    pub fn has_cell(&self, row: u32, col: u32) -> bool {
        self.cells.contains_key(&(row, col))
    }

    pub fn set_cell(&mut self, row: u32, col: u32, cell: Cell) -> EngineResult<()> {
        Self::check_bounds(row, col)?;
        self.by_row.entry(row).or_default().insert(col);
        self.by_col.entry(col).or_default().insert(row);
        self.expand_used_range(row, col);
        self.cells.insert((row, col), cell);
        Ok(())
    }

    /// Removes a cell, returning the previous value if any. Recomputes the
    /// used range only when the removed cell touched a boundary.
    pub fn delete_cell(&mut self, row: u32, col: u32) -> Option<Cell> {
        let removed = self.cells.remove(&(row, col));
        if removed.is_some() {
            if let Some(set) = self.by_row.get_mut(&row) {
                set.remove(&col);
                if set.is_empty() {
                    self.by_row.remove(&row);
                }
            }
            if let Some(set) = self.by_col.get_mut(&col) {
                set.remove(&row);
                if set.is_empty() {
                    self.by_col.remove(&col);
                }
            }
            let touches_boundary = self
                .used_range
                .map(|r| row == r.start_row || row == r.end_row || col == r.start_col || col == r.end_col)
                .unwrap_or(false);
            if touches_boundary {
                self.recompute_used_range();
            }
        }
        removed
    }

    pub fn clear_range(&mut self, range: CellRange) {
        let coords: Vec<CellCoord> = self
            .get_cells_in_range(range)
            .into_iter()
            .map(|(coord, _)| coord)
            .collect();
        for (r, c) in coords {
            self.delete_cell(r, c);
        }
    }

    pub fn get_cells_in_range(&self, range: CellRange) -> Vec<(CellCoord, &Cell)> {
        let mut out = Vec::new();
        for (&row, cols) in self.by_row.range(range.start_row..=range.end_row) {
            for &col in cols.range(range.start_col..=range.end_col) {
                if let Some(cell) = self.cells.get(&(row, col)) {
                    out.push(((row, col), cell));
                }
            }
        }
        out
    }

    pub fn get_cells_in_row(&self, row: u32) -> Vec<(u32, &Cell)> {
        self.by_row
            .get(&row)
            .map(|cols| cols.iter().map(|&c| (c, self.cells.get(&(row, c)).unwrap())).collect())
            .unwrap_or_default()
    }

    pub fn get_cells_in_column(&self, col: u32) -> Vec<(u32, &Cell)> {
        self.by_col
            .get(&col)
            .map(|rows| rows.iter().map(|&r| (r, self.cells.get(&(r, col)).unwrap())).collect())
            .unwrap_or_default()
    }

    pub fn get_used_range(&self) -> Option<CellRange> {
        self.used_range
    }

    // -- row/column metadata -------------------------------------------------

    pub fn row_height(&self, row: u32) -> u32 {
        self.row_meta.get(&row).and_then(|m| m.height).unwrap_or(DEFAULT_ROW_HEIGHT)
    }

    pub fn set_row_height(&mut self, row: u32, height: u32) {
        self.row_meta.entry(row).or_default().height = Some(height);
    }

    pub fn is_row_hidden(&self, row: u32) -> bool {
        self.row_meta.get(&row).map(|m| m.hidden).unwrap_or(false)
    }

    pub fn set_row_hidden(&mut self, row: u32, hidden: bool) {
        self.row_meta.entry(row).or_default().hidden = hidden;
    }

    pub fn col_width(&self, col: u32) -> u32 {
        self.col_meta.get(&col).and_then(|m| m.width).unwrap_or(DEFAULT_COL_WIDTH)
    }

    pub fn set_col_width(&mut self, col: u32, width: u32) {
        self.col_meta.entry(col).or_default().width = Some(width);
    }

    pub fn is_col_hidden(&self, col: u32) -> bool {
        self.col_meta.get(&col).map(|m| m.hidden).unwrap_or(false)
    }

    pub fn set_col_hidden(&mut self, col: u32, hidden: bool) {
        self.col_meta.entry(col).or_default().hidden = hidden;
    }

    // -- navigation -----------------------------------------------------------

    /// Excel Ctrl+Arrow semantics: if the current cell is occupied and the
    /// next cell in `direction` is also occupied, jump to the last cell of
    /// that contiguous run; if the current cell is empty (or the next is
    /// empty), jump to the next non-empty cell. Stops at the grid edge.
    pub fn find_next_non_empty(&self, row: u32, col: u32, direction: Direction) -> CellCoord {
        let step = |r: u32, c: u32| -> Option<CellCoord> {
            match direction {
                Direction::Up => r.checked_sub(1).map(|r| (r, c)),
                Direction::Down => Some((r + 1, c)).filter(|(r, _)| *r < MAX_ROWS),
                Direction::Left => c.checked_sub(1).map(|c| (r, c)),
                Direction::Right => Some((r, c + 1)).filter(|(_, c)| *c < MAX_COLS),
            }
        };

        let current_occupied = self.has_cell(row, col);
        let mut pos = (row, col);
        let next = match step(pos.0, pos.1) {
            Some(p) => p,
            None => return pos,
        };
        let next_occupied = self.has_cell(next.0, next.1);

        if current_occupied && next_occupied {
            // Run to the end of the contiguous occupied band.
            let mut last = pos;
            let mut cur = next;
            loop {
                if !self.has_cell(cur.0, cur.1) {
                    break;
                }
                last = cur;
                match step(cur.0, cur.1) {
                    Some(p) => cur = p,
                    None => break,
                }
            }
            return last;
        }

        // Jump forward to the next occupied cell (or the grid edge).
        pos = next;
        loop {
            if self.has_cell(pos.0, pos.1) {
                return pos;
            }
            match step(pos.0, pos.1) {
                Some(p) => pos = p,
                None => return pos,
            }
        }
    }

    /// Flood-fills 4-connected non-empty cells starting at `(row, col)` and
    /// returns the bounding rectangle. Empty if the starting cell is empty.
    pub fn find_current_region(&self, row: u32, col: u32) -> Option<CellRange> {
        if !self.has_cell(row, col) {
            return None;
        }
        let mut seen: std::collections::HashSet<CellCoord> = std::collections::HashSet::new();
        let mut stack = vec![(row, col)];
        let mut range = CellRange::single(row, col);
        seen.insert((row, col));
        while let Some((r, c)) = stack.pop() {
            range = CellRange::normalize(
                range.start_row.min(r),
                range.start_col.min(c),
                range.end_row.max(r),
                range.end_col.max(c),
            );
            let neighbors = [
                r.checked_sub(1).map(|r| (r, c)),
                Some((r + 1, c)),
                c.checked_sub(1).map(|c| (r, c)),
                Some((r, c + 1)),
            ];
            for n in neighbors.into_iter().flatten() {
                if !seen.contains(&n) && self.has_cell(n.0, n.1) {
                    seen.insert(n);
                    stack.push(n);
                }
            }
        }
        Some(range)
    }

    // -- structural edits -----------------------------------------------------

    /// Checks whether deleting the row band `[start, start+count)` would
    /// partially (not fully) cover any merge region, consulting each
    /// affected cell's own `merge` metadata — no separate merge index
    /// needed, since `Cell::merge` already records anchor/member spans.
    fn rows_conflict_with_merges(&self, start: u32, count: u32) -> bool {
        let end = start + count;
        for row in start..end {
            for (col, cell) in self.get_cells_in_row(row) {
                match cell.merge {
                    Some(MergeMeta::Anchor { row_span, .. }) => {
                        if !(row >= start && row + row_span <= end) {
                            return true;
                        }
                    }
                    Some(MergeMeta::Member { anchor_row, anchor_col }) => {
                        if let Some(anchor) = self.get_cell(anchor_row, anchor_col) {
                            if let Some(MergeMeta::Anchor { row_span, .. }) = anchor.merge {
                                if !(anchor_row >= start && anchor_row + row_span <= end) {
                                    return true;
                                }
                            }
                        }
                        let _ = col;
                    }
                    None => {}
                }
            }
        }
        false
    }

    fn cols_conflict_with_merges(&self, start: u32, count: u32) -> bool {
        let end = start + count;
        for col in start..end {
            for (row, cell) in self.get_cells_in_column(col) {
                match cell.merge {
                    Some(MergeMeta::Anchor { col_span, .. }) => {
                        if !(col >= start && col + col_span <= end) {
                            return true;
                        }
                    }
                    Some(MergeMeta::Member { anchor_row, anchor_col }) => {
                        if let Some(anchor) = self.get_cell(anchor_row, anchor_col) {
                            if let Some(MergeMeta::Anchor { col_span, .. }) = anchor.merge {
                                if !(anchor_col >= start && anchor_col + col_span <= end) {
                                    return true;
                                }
                            }
                        }
                        let _ = row;
                    }
                    None => {}
                }
            }
        }
        false
    }

    pub fn insert_rows(&mut self, at: u32, count: u32) -> EngineResult<()> {
        if count == 0 {
            return Ok(());
        }
        let max_row_used = self.used_range.map(|r| r.end_row).unwrap_or(0);
        if max_row_used.checked_add(count).map(|m| m >= MAX_ROWS).unwrap_or(true) {
            return Err(EngineError::GridOverflow("insertRows would exceed MAX_ROWS".into()));
        }
        let moved: Vec<(CellCoord, Cell)> = self
            .cells
            .iter()
            .filter(|((r, _), _)| *r >= at)
            .map(|(&(r, c), cell)| ((r, c), cell.clone()))
            .collect();
        for &((r, c), _) in &moved {
            self.delete_cell(r, c);
        }
        for ((r, c), cell) in moved {
            self.set_cell(r + count, c, cell)?;
        }
        let moved_meta: Vec<(u32, RowMeta)> =
            self.row_meta.iter().filter(|(&r, _)| r >= at).map(|(&r, &m)| (r, m)).collect();
        for (r, _) in &moved_meta {
            self.row_meta.remove(r);
        }
        for (r, m) in moved_meta {
            self.row_meta.insert(r + count, m);
        }
        Ok(())
    }

    pub fn delete_rows(&mut self, at: u32, count: u32) -> EngineResult<()> {
        if count == 0 {
            return Ok(());
        }
        if self.rows_conflict_with_merges(at, count) {
            return Err(EngineError::Conflict(
                "deleteRows would partially cover a merge region; unmerge first or expand the deletion range".into(),
            ));
        }
        let end = at + count;
        let in_band: Vec<CellCoord> =
            self.cells.keys().filter(|&&(r, _)| r >= at && r < end).copied().collect();
        for (r, c) in in_band {
            self.delete_cell(r, c);
        }
        let shifted: Vec<(CellCoord, Cell)> = self
            .cells
            .iter()
            .filter(|((r, _), _)| *r >= end)
            .map(|(&(r, c), cell)| ((r, c), cell.clone()))
            .collect();
        for &((r, c), _) in &shifted {
            self.delete_cell(r, c);
        }
        for ((r, c), cell) in shifted {
            self.set_cell(r - count, c, cell)?;
        }

        self.row_meta.retain(|&r, _| r < at);
        let shifted_meta: Vec<(u32, RowMeta)> =
            self.row_meta.iter().filter(|(&r, _)| r >= end).map(|(&r, &m)| (r, m)).collect();
        // the retain above already drops [at, end) and keeps < at; now shift >= end down.
        for (r, _) in shifted_meta.iter() {
            self.row_meta.remove(r);
        }
        for (r, m) in shifted_meta {
            self.row_meta.insert(r - count, m);
        }
        self.recompute_used_range();
        Ok(())
    }

    pub fn insert_columns(&mut self, at: u32, count: u32) -> EngineResult<()> {
        if count == 0 {
            return Ok(());
        }
        let max_col_used = self.used_range.map(|r| r.end_col).unwrap_or(0);
        if max_col_used.checked_add(count).map(|m| m >= MAX_COLS).unwrap_or(true) {
            return Err(EngineError::GridOverflow("insertColumns would exceed MAX_COLS".into()));
        }
        let moved: Vec<(CellCoord, Cell)> = self
            .cells
            .iter()
            .filter(|((_, c), _)| *c >= at)
            .map(|(&(r, c), cell)| ((r, c), cell.clone()))
            .collect();
        for &((r, c), _) in &moved {
            self.delete_cell(r, c);
        }
        for ((r, c), cell) in moved {
            self.set_cell(r, c + count, cell)?;
        }
        let moved_meta: Vec<(u32, ColMeta)> =
            self.col_meta.iter().filter(|(&c, _)| c >= at).map(|(&c, &m)| (c, m)).collect();
        for (c, _) in &moved_meta {
            self.col_meta.remove(c);
        }
        for (c, m) in moved_meta {
            self.col_meta.insert(c + count, m);
        }
        Ok(())
    }

    pub fn delete_columns(&mut self, at: u32, count: u32) -> EngineResult<()> {
        if count == 0 {
            return Ok(());
        }
        if self.cols_conflict_with_merges(at, count) {
            return Err(EngineError::Conflict(
                "deleteColumns would partially cover a merge region; unmerge first or expand the deletion range".into(),
            ));
        }
        let end = at + count;
        let in_band: Vec<CellCoord> =
            self.cells.keys().filter(|&&(_, c)| c >= at && c < end).copied().collect();
        for (r, c) in in_band {
            self.delete_cell(r, c);
        }
        let shifted: Vec<(CellCoord, Cell)> = self
            .cells
            .iter()
            .filter(|((_, c), _)| *c >= end)
            .map(|(&(r, c), cell)| ((r, c), cell.clone()))
            .collect();
        for &((r, c), _) in &shifted {
            self.delete_cell(r, c);
        }
        for ((r, c), cell) in shifted {
            self.set_cell(r, c - count, cell)?;
        }

        self.col_meta.retain(|&c, _| c < at);
        let shifted_meta: Vec<(u32, ColMeta)> =
            self.col_meta.iter().filter(|(&c, _)| c >= end).map(|(&c, &m)| (c, m)).collect();
        for (c, _) in shifted_meta.iter() {
            self.col_meta.remove(c);
        }
        for (c, m) in shifted_meta {
            self.col_meta.insert(c - count, m);
        }
        self.recompute_used_range();
        Ok(())
    }

    /// Snapshots every non-empty cell plus sparse row/column metadata, per
    /// the `{ version, cells, row_meta, col_meta }` wire format.
    pub fn serialize(&self) -> CellStoreSnapshot {
        let cells = self
            .cells
            .iter()
            .map(|(&(row, col), cell)| CellEntry { key: coord_key(row, col), cell: cell.clone() })
            .collect();
        let row_meta = self.row_meta.iter().map(|(&row, &meta)| RowMetaEntry { row, meta }).collect();
        let col_meta = self.col_meta.iter().map(|(&col, &meta)| ColMetaEntry { col, meta }).collect();
        CellStoreSnapshot { version: 1, cells, row_meta, col_meta }
    }

    /// Rebuilds a store from a snapshot produced by `serialize`, restoring
    /// the reciprocal row/column indices and used range via ordinary
    /// `set_cell` calls rather than trusting the snapshot's own layout.
    pub fn deserialize(snapshot: CellStoreSnapshot) -> EngineResult<Self> {
        if snapshot.version != 1 {
            return Err(EngineError::UnsupportedFormat(format!(
                "unknown cell store snapshot version {}",
                snapshot.version
            )));
        }
        let mut store = CellStore::new();
        for entry in snapshot.cells {
            let (row, col) = parse_coord_key(&entry.key)
                .ok_or_else(|| EngineError::InvalidArgument(format!("malformed cell key {}", entry.key)))?;
            store.set_cell(row, col, entry.cell)?;
        }
        for entry in snapshot.row_meta {
            store.row_meta.insert(entry.row, entry.meta);
        }
        for entry in snapshot.col_meta {
            store.col_meta.insert(entry.col, entry.meta);
        }
        Ok(store)
    }
}

impl Default for CellStore {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellEntry {
    pub key: String,
    pub cell: Cell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowMetaEntry {
    pub row: u32,
    pub meta: RowMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColMetaEntry {
    pub col: u32,
    pub meta: ColMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellStoreSnapshot {
    pub version: u32,
    pub cells: Vec<CellEntry>,
    pub row_meta: Vec<RowMetaEntry>,
    pub col_meta: Vec<ColMetaEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_roundtrip() {
        let mut store = CellStore::new();
        store.set_cell(3, 4, Cell::new_number(9.0)).unwrap();
        assert_eq!(store.get_cell(3, 4).unwrap().value, crate::cell::CellValue::Number(9.0));
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let mut store = CellStore::new();
        assert!(store.set_cell(MAX_ROWS, 0, Cell::new()).is_err());
    }

    #[test]
    fn test_delete_clears_and_has_cell_false() {
        let mut store = CellStore::new();
        store.set_cell(0, 0, Cell::new_number(1.0)).unwrap();
        store.delete_cell(0, 0);
        assert!(!store.has_cell(0, 0));
    }

    #[test]
    fn test_used_range_tracks_insertions_and_deletions() {
        let mut store = CellStore::new();
        store.set_cell(2, 2, Cell::new_number(1.0)).unwrap();
        store.set_cell(5, 7, Cell::new_number(2.0)).unwrap();
        assert_eq!(store.get_used_range(), Some(CellRange::normalize(2, 2, 5, 7)));
        store.delete_cell(5, 7);
        assert_eq!(store.get_used_range(), Some(CellRange::single(2, 2)));
    }

    #[test]
    fn test_get_cells_in_range() {
        let mut store = CellStore::new();
        store.set_cell(0, 0, Cell::new_number(1.0)).unwrap();
        store.set_cell(0, 5, Cell::new_number(2.0)).unwrap();
        store.set_cell(10, 0, Cell::new_number(3.0)).unwrap();
        let found = store.get_cells_in_range(CellRange::normalize(0, 0, 1, 5));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_insert_then_delete_rows_is_identity() {
        let mut store = CellStore::new();
        store.set_cell(5, 0, Cell::new_number(3.0)).unwrap();
        store.set_cell(6, 0, Cell::new_text("x".into())).unwrap();
        let before_5 = store.get_cell(5, 0).cloned();
        let before_6 = store.get_cell(6, 0).cloned();
        store.insert_rows(3, 2).unwrap();
        store.delete_rows(3, 2).unwrap();
        assert_eq!(store.get_cell(5, 0).cloned(), before_5);
        assert_eq!(store.get_cell(6, 0).cloned(), before_6);
    }

    #[test]
    fn test_insert_rows_shifts_cells_down() {
        let mut store = CellStore::new();
        store.set_cell(5, 0, Cell::new_number(3.0)).unwrap();
        store.insert_rows(3, 2).unwrap();
        assert!(!store.has_cell(5, 0));
        assert_eq!(store.get_cell(7, 0).unwrap().value, crate::cell::CellValue::Number(3.0));
    }

    #[test]
    fn test_delete_rows_removes_band_and_shifts_up() {
        let mut store = CellStore::new();
        store.set_cell(1, 0, Cell::new_number(1.0)).unwrap();
        store.set_cell(3, 0, Cell::new_number(2.0)).unwrap();
        store.delete_rows(1, 2).unwrap();
        // row 3's cell shifts to row 1; the original row-1 cell is gone.
        assert_eq!(store.get_cell(1, 0).unwrap().value, crate::cell::CellValue::Number(2.0));
        assert!(!store.has_cell(3, 0));
    }

    #[test]
    fn test_find_next_non_empty_jumps_to_run_end() {
        let mut store = CellStore::new();
        for r in 0..5 {
            store.set_cell(r, 0, Cell::new_number(r as f64)).unwrap();
        }
        let (r, _) = store.find_next_non_empty(0, 0, Direction::Down);
        assert_eq!(r, 4);
    }

    #[test]
    fn test_find_current_region() {
        let mut store = CellStore::new();
        store.set_cell(0, 0, Cell::new_number(1.0)).unwrap();
        store.set_cell(0, 1, Cell::new_number(2.0)).unwrap();
        store.set_cell(1, 0, Cell::new_number(3.0)).unwrap();
        let region = store.find_current_region(0, 0).unwrap();
        assert_eq!(region, CellRange::normalize(0, 0, 1, 1));
    }

    #[test]
    fn test_delete_rows_rejects_partial_merge_overlap() {
        let mut store = CellStore::new();
        let mut anchor = Cell::new_number(1.0);
        anchor.merge = Some(MergeMeta::Anchor { row_span: 3, col_span: 1 });
        store.set_cell(0, 0, anchor).unwrap();
        let mut member = Cell::new();
        member.merge = Some(MergeMeta::Member { anchor_row: 0, anchor_col: 0 });
        store.set_cell(1, 0, member.clone()).unwrap();
        store.set_cell(2, 0, member).unwrap();
        // Deleting only row 1 would split the merge region: reject.
        assert!(store.delete_rows(1, 1).is_err());
        // Deleting all three rows fully covers it: allowed.
        assert!(store.delete_rows(0, 3).is_ok());
    }

    #[test]
    fn test_row_height_defaults_and_overrides() {
        let mut store = CellStore::new();
        assert_eq!(store.row_height(0), DEFAULT_ROW_HEIGHT);
        store.set_row_height(0, 40);
        assert_eq!(store.row_height(0), 40);
    }
}
