//! FILENAME: engine/src/merge.rs
//! PURPOSE: Tracks merged cell regions with an anchor/member dual index so
//! both "is this the anchor of a merge" and "which merge owns this cell"
//! resolve in O(1).
//! CONTEXT: Both directions are indexed, and `CellStore`'s own `Cell.merge`
//! field stays in lockstep with this manager (the store enforces
//! structural-edit conflicts directly against that field; this manager is
//! the source of truth callers use to drive it).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::cell::MergeMeta;
use crate::coord::{CellCoord, CellRange};
use crate::error::{EngineError, EngineResult};
use crate::formula_engine::StructuralEdit;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MergeInfo {
    pub anchor_row: u32,
    pub anchor_col: u32,
    pub row_span: u32,
    pub col_span: u32,
}

impl MergeInfo {
    pub fn range(&self) -> CellRange {
        CellRange {
            start_row: self.anchor_row,
            start_col: self.anchor_col,
            end_row: self.anchor_row + self.row_span - 1,
            end_col: self.anchor_col + self.col_span - 1,
        }
    }
}

/// Dual index: `merges` owns each region keyed by its anchor; `member_of`
/// maps every cell covered by a region (anchor included) back to that
/// anchor coordinate.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MergeManager {
    merges: HashMap<CellCoord, MergeInfo>,
    member_of: HashMap<CellCoord, CellCoord>,
}

impl MergeManager {
    pub fn new() -> Self {
        MergeManager { merges: HashMap::new(), member_of: HashMap::new() }
    }

    /// Merges `range` into one region. Rejects if any cell in `range` is
    /// already part of a different merge (no partial overlaps, no nested
    /// merges).
    pub fn merge(&mut self, range: CellRange) -> EngineResult<MergeInfo> {
        for row in range.start_row..=range.end_row {
            for col in range.start_col..=range.end_col {
                if let Some(&anchor) = self.member_of.get(&(row, col)) {
                    if anchor != (range.start_row, range.start_col) {
                        return Err(EngineError::Conflict(format!(
                            "cell ({}, {}) is already part of a merge",
                            row, col
                        )));
                    }
                }
            }
        }
        let anchor = (range.start_row, range.start_col);
        let info = MergeInfo {
            anchor_row: range.start_row,
            anchor_col: range.start_col,
            row_span: range.row_count(),
            col_span: range.col_count(),
        };
        self.merges.insert(anchor, info);
        for row in range.start_row..=range.end_row {
            for col in range.start_col..=range.end_col {
                self.member_of.insert((row, col), anchor);
            }
        }
        Ok(info)
    }

    /// Removes the merge owning `coord` (anchor or any member), returning
    /// its former extent so the caller can clear `Cell.merge` on every
    /// member.
    pub fn unmerge(&mut self, coord: CellCoord) -> EngineResult<MergeInfo> {
        let anchor = self
            .member_of
            .get(&coord)
            .copied()
            .ok_or_else(|| EngineError::NotFound(format!("no merge at ({}, {})", coord.0, coord.1)))?;
        let info = self.merges.remove(&anchor).expect("member_of entry without matching merges entry");
        let range = info.range();
        for row in range.start_row..=range.end_row {
            for col in range.start_col..=range.end_col {
                self.member_of.remove(&(row, col));
            }
        }
        Ok(info)
    }

    pub fn is_merge_anchor(&self, coord: CellCoord) -> bool {
        self.merges.contains_key(&coord)
    }

    pub fn is_merged(&self, coord: CellCoord) -> bool {
        self.member_of.contains_key(&coord)
    }

    pub fn get_merge_info(&self, coord: CellCoord) -> Option<MergeInfo> {
        self.member_of.get(&coord).and_then(|anchor| self.merges.get(anchor)).copied()
    }

    pub fn get_merge_anchor(&self, coord: CellCoord) -> Option<CellCoord> {
        self.member_of.get(&coord).copied()
    }

    /// The rectangle to paint for display purposes: a single cell's range
    /// if unmerged, else the full merge extent.
    pub fn get_display_range(&self, coord: CellCoord) -> CellRange {
        self.get_merge_info(coord).map(|info| info.range()).unwrap_or_else(|| CellRange::single(coord.0, coord.1))
    }

    /// The cell that edits typed at `coord` should actually land on: the
    /// merge's anchor if `coord` is a non-anchor member, else `coord`
    /// itself.
    pub fn get_edit_target(&self, coord: CellCoord) -> CellCoord {
        self.get_merge_anchor(coord).unwrap_or(coord)
    }

    /// Grows `range` to fully contain every merge it partially overlaps,
    /// repeating until a fixed point (a newly included merge can itself
    /// overlap another). Used before operations like sort/delete that must
    /// not split a merged region.
    pub fn expand_range_to_include_merges(&self, range: CellRange) -> CellRange {
        let mut current = range;
        loop {
            let mut expanded = current;
            for info in self.merges.values() {
                let merge_range = info.range();
                if current.intersects(&merge_range) {
                    expanded = CellRange::normalize(
                        expanded.start_row.min(merge_range.start_row),
                        expanded.start_col.min(merge_range.start_col),
                        expanded.end_row.max(merge_range.end_row),
                        expanded.end_col.max(merge_range.end_col),
                    );
                }
            }
            if expanded == current {
                return current;
            }
            current = expanded;
        }
    }

    pub fn all_merges(&self) -> impl Iterator<Item = &MergeInfo> {
        self.merges.values()
    }

    /// Shifts every merge's anchor for a structural edit. A merge whose
    /// span is wholly contained in a deleted band is dropped; one that
    /// straddles the band is left for the caller to have already rejected
    /// (`CellStore` refuses the structural edit outright when a merge
    /// only partially overlaps the deleted band).
    pub fn apply_structural_edit(&mut self, edit: StructuralEdit) {
        let old: Vec<MergeInfo> = self.merges.values().copied().collect();
        self.merges.clear();
        self.member_of.clear();
        for info in old {
            let range = info.range();
            let shifted = match edit {
                StructuralEdit::InsertRows { at, count } => {
                    if range.start_row >= at {
                        Some(CellRange {
                            start_row: range.start_row + count,
                            end_row: range.end_row + count,
                            ..range
                        })
                    } else {
                        Some(range)
                    }
                }
                StructuralEdit::DeleteRows { at, count } => {
                    let end = at + count;
                    if range.end_row < at || range.start_row >= end {
                        if range.start_row >= end {
                            Some(CellRange {
                                start_row: range.start_row - count,
                                end_row: range.end_row - count,
                                ..range
                            })
                        } else {
                            Some(range)
                        }
                    } else {
                        None
                    }
                }
                StructuralEdit::InsertCols { at, count } => {
                    if range.start_col >= at {
                        Some(CellRange {
                            start_col: range.start_col + count,
                            end_col: range.end_col + count,
                            ..range
                        })
                    } else {
                        Some(range)
                    }
                }
                StructuralEdit::DeleteCols { at, count } => {
                    let end = at + count;
                    if range.end_col < at || range.start_col >= end {
                        if range.start_col >= end {
                            Some(CellRange {
                                start_col: range.start_col - count,
                                end_col: range.end_col - count,
                                ..range
                            })
                        } else {
                            Some(range)
                        }
                    } else {
                        None
                    }
                }
            };
            if let Some(r) = shifted {
                let anchor = (r.start_row, r.start_col);
                let new_info = MergeInfo {
                    anchor_row: r.start_row,
                    anchor_col: r.start_col,
                    row_span: r.row_count(),
                    col_span: r.col_count(),
                };
                self.merges.insert(anchor, new_info);
                for row in r.start_row..=r.end_row {
                    for col in r.start_col..=r.end_col {
                        self.member_of.insert((row, col), anchor);
                    }
                }
            }
        }
    }

    pub fn cell_merge_meta(&self, coord: CellCoord) -> Option<MergeMeta> {
        let info = self.get_merge_info(coord)?;
        let anchor = (info.anchor_row, info.anchor_col);
        if anchor == coord {
            Some(MergeMeta::Anchor { row_span: info.row_span, col_span: info.col_span })
        } else {
            Some(MergeMeta::Member { anchor_row: info.anchor_row, anchor_col: info.anchor_col })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_and_unmerge() {
        let mut mgr = MergeManager::new();
        let range = CellRange::normalize(0, 0, 1, 1);
        let info = mgr.merge(range).unwrap();
        assert_eq!(info.row_span, 2);
        assert!(mgr.is_merge_anchor((0, 0)));
        assert!(mgr.is_merged((1, 1)));
        assert_eq!(mgr.get_edit_target((1, 0)), (0, 0));
        mgr.unmerge((1, 1)).unwrap();
        assert!(!mgr.is_merged((0, 0)));
    }

    #[test]
    fn test_overlap_rejected() {
        let mut mgr = MergeManager::new();
        mgr.merge(CellRange::normalize(0, 0, 2, 2)).unwrap();
        let err = mgr.merge(CellRange::normalize(1, 1, 3, 3));
        assert!(err.is_err());
    }

    #[test]
    fn test_expand_range_to_include_merges() {
        let mut mgr = MergeManager::new();
        mgr.merge(CellRange::normalize(0, 0, 1, 1)).unwrap();
        let expanded = mgr.expand_range_to_include_merges(CellRange::single(1, 1));
        assert_eq!(expanded, CellRange::normalize(0, 0, 1, 1));
    }

    #[test]
    fn test_insert_rows_shifts_merge() {
        let mut mgr = MergeManager::new();
        mgr.merge(CellRange::normalize(5, 0, 6, 0)).unwrap();
        mgr.apply_structural_edit(StructuralEdit::InsertRows { at: 2, count: 3 });
        assert!(mgr.is_merge_anchor((8, 0)));
        assert!(mgr.is_merged((9, 0)));
    }

    #[test]
    fn test_delete_rows_inside_band_drops_merge() {
        let mut mgr = MergeManager::new();
        mgr.merge(CellRange::normalize(5, 0, 6, 0)).unwrap();
        mgr.apply_structural_edit(StructuralEdit::DeleteRows { at: 4, count: 4 });
        assert!(!mgr.is_merge_anchor((5, 0)));
        assert_eq!(mgr.all_merges().count(), 0);
    }
}
