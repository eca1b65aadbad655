//! FILENAME: engine/src/viewport.rs
//! PURPOSE: Virtual viewport: scroll offset + size -> the rows/columns that
//! must be rendered.
//! CONTEXT: A cumulative-offset viewport with a dirty/invalidate
//! watermark: prefix sums over row/column sizes are rebuilt lazily after
//! an edit rather than on every mutation. The dimension data itself is
//! supplied by whatever implements `DimensionProvider` (typically
//! `CellStore`, or a filter-aware wrapper around it).

/// Supplies row/column sizing information to the viewport, decoupling it
/// from any concrete storage. A filter-aware wrapper can report filtered
/// rows as hidden without the viewport knowing filters exist.
pub trait DimensionProvider {
    fn row_height(&self, row: u32) -> u32;
    fn col_width(&self, col: u32) -> u32;
    fn is_row_hidden(&self, row: u32) -> bool;
    fn is_col_hidden(&self, col: u32) -> bool;
    fn last_used_row(&self) -> u32;
    fn last_used_col(&self) -> u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleEntry {
    pub index: u32,
    pub offset: u32,
    pub size: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCell {
    pub row: u32,
    pub col: u32,
    pub row_span: u32,
    pub col_span: u32,
}

pub(crate) const DEFAULT_BUFFER_ROWS: u32 = 5;
pub(crate) const DEFAULT_BUFFER_COLS: u32 = 3;

/// Cumulative-sum dimension index with a dirty watermark: prefix sums are
/// cached up to `known`, and `invalidate_from` rewinds the watermark rather
/// than clearing the whole cache, so small edits near the end of a large
/// sheet stay cheap.
struct PrefixSums {
    /// `offsets[i]` is the pixel offset of index `i`'s leading edge.
    offsets: Vec<u64>,
}

impl PrefixSums {
    fn new() -> Self {
        PrefixSums { offsets: vec![0] }
    }

    fn known_upto(&self) -> u32 {
        self.offsets.len() as u32 - 1
    }

    fn invalidate_from(&mut self, from: u32) {
        let keep = (from as usize + 1).min(self.offsets.len());
        self.offsets.truncate(keep.max(1));
    }

    /// Extends the cache so `offset(index)` is answerable, using `size_of`
    /// for each newly-computed index (0 for hidden indices).
    fn ensure(&mut self, index: u32, size_of: impl Fn(u32) -> u32) {
        while self.known_upto() <= index {
            let i = self.known_upto();
            let last = *self.offsets.last().unwrap();
            self.offsets.push(last + size_of(i) as u64);
        }
    }

    fn offset(&self, index: u32) -> u64 {
        self.offsets[(index as usize).min(self.offsets.len() - 1)]
    }

    /// First index whose offset is >= `target`, via binary search over the
    /// already-cached prefix (caller must `ensure` far enough first).
    fn first_at_or_after(&self, target: u64) -> u32 {
        self.offsets.partition_point(|&o| o < target) as u32
    }
}

/// Computes, given a pixel viewport size and scroll offset, which rows and
/// columns must be rendered — including a frozen band and a small buffer
/// of extra rows/columns on each side to absorb fast scrolling.
pub struct Viewport {
    width: u32,
    height: u32,
    scroll_x: u32,
    scroll_y: u32,
    frozen_rows: u32,
    frozen_cols: u32,
    buffer_rows: u32,
    buffer_cols: u32,
    rows: PrefixSums,
    cols: PrefixSums,
}

impl Viewport {
    pub fn new() -> Self {
        Self::with_buffers(DEFAULT_BUFFER_ROWS, DEFAULT_BUFFER_COLS)
    }

    /// Builds a viewport with caller-chosen buffer sizes, e.g. from
    /// `EngineConfig`, instead of the crate defaults.
    pub fn with_buffers(buffer_rows: u32, buffer_cols: u32) -> Self {
        Viewport {
            width: 0,
            height: 0,
            scroll_x: 0,
            scroll_y: 0,
            frozen_rows: 0,
            frozen_cols: 0,
            buffer_rows,
            buffer_cols,
            rows: PrefixSums::new(),
            cols: PrefixSums::new(),
        }
    }

    pub fn set_viewport_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Negative offsets are meaningless here; callers pass clamped `u32`s,
    /// so clamp-to-zero on negative scroll input is enforced at the
    /// façade boundary where signed input first arrives.
    pub fn set_scroll(&mut self, x: u32, y: u32) {
        self.scroll_x = x;
        self.scroll_y = y;
    }

    pub fn set_frozen_panes(&mut self, rows: u32, cols: u32) {
        self.frozen_rows = rows;
        self.frozen_cols = cols;
    }

    pub fn invalidate_cache(&mut self, from_row: Option<u32>, from_col: Option<u32>) {
        self.rows.invalidate_from(from_row.unwrap_or(0));
        self.cols.invalidate_from(from_col.unwrap_or(0));
    }

    /// Binary-search for the first index whose top offset is >= `scroll -
    /// buffer` worth of pixels (approximated here as an index buffer),
    /// then linear-scan forward while still inside `scroll +
    /// viewport_size`, plus `buffer` more indices past that edge. The
    /// frozen band is always included.
    fn visible_axis(
        sums: &mut PrefixSums,
        scroll: u32,
        viewport_size: u32,
        buffer: u32,
        frozen: u32,
        last_used: u32,
        size_of: impl Fn(u32) -> u32,
        hidden_of: impl Fn(u32) -> bool,
    ) -> Vec<VisibleEntry> {
        sums.ensure(last_used.max(1), &size_of);

        let first_over = sums.first_at_or_after(scroll as u64);
        let last_over = sums.first_at_or_after(scroll as u64 + viewport_size as u64);

        let start = first_over.saturating_sub(buffer).min(last_used);
        let end = last_over.saturating_add(buffer).min(last_used);

        let mut out = Vec::new();
        let mut seen = std::collections::HashSet::new();

        for i in 0..frozen.min(last_used + 1) {
            if !hidden_of(i) && seen.insert(i) {
                out.push(VisibleEntry { index: i, offset: sums.offset(i) as u32, size: size_of(i) });
            }
        }

        let scan_start = start.max(frozen);
        for i in scan_start..=end {
            if !hidden_of(i) && seen.insert(i) {
                out.push(VisibleEntry { index: i, offset: sums.offset(i) as u32, size: size_of(i) });
            }
        }
        out
    }

    pub fn get_visible_rows(&mut self, dim: &dyn DimensionProvider) -> Vec<VisibleEntry> {
        let last = dim.last_used_row();
        Self::visible_axis(
            &mut self.rows,
            self.scroll_y,
            self.height,
            self.buffer_rows,
            self.frozen_rows,
            last,
            |r| if dim.is_row_hidden(r) { 0 } else { dim.row_height(r) },
            |r| dim.is_row_hidden(r),
        )
    }

    pub fn get_visible_columns(&mut self, dim: &dyn DimensionProvider) -> Vec<VisibleEntry> {
        let last = dim.last_used_col();
        Self::visible_axis(
            &mut self.cols,
            self.scroll_x,
            self.width,
            self.buffer_cols,
            self.frozen_cols,
            last,
            |c| if dim.is_col_hidden(c) { 0 } else { dim.col_width(c) },
            |c| dim.is_col_hidden(c),
        )
    }

    pub fn get_row_top(&mut self, row: u32, dim: &dyn DimensionProvider) -> u32 {
        self.rows.ensure(row, |r| if dim.is_row_hidden(r) { 0 } else { dim.row_height(r) });
        self.rows.offset(row) as u32
    }

    pub fn get_col_left(&mut self, col: u32, dim: &dyn DimensionProvider) -> u32 {
        self.cols.ensure(col, |c| if dim.is_col_hidden(c) { 0 } else { dim.col_width(c) });
        self.cols.offset(col) as u32
    }

    pub fn get_max_scroll(&mut self, dim: &dyn DimensionProvider) -> (u32, u32) {
        let last_row = dim.last_used_row();
        let last_col = dim.last_used_col();
        let bottom = self.get_row_top(last_row, dim) + dim.row_height(last_row);
        let right = self.get_col_left(last_col, dim) + dim.col_width(last_col);
        (right.saturating_sub(self.width), bottom.saturating_sub(self.height))
    }

    /// Binary search on the prefix-sum table for the row/column containing
    /// pixel point `(x, y)`.
    pub fn get_cell_at_point(&mut self, x: u32, y: u32, dim: &dyn DimensionProvider) -> (u32, u32) {
        let last_row = dim.last_used_row();
        let last_col = dim.last_used_col();
        self.rows.ensure(last_row.max(1), |r| if dim.is_row_hidden(r) { 0 } else { dim.row_height(r) });
        self.cols.ensure(last_col.max(1), |c| if dim.is_col_hidden(c) { 0 } else { dim.col_width(c) });
        let row = self.rows.first_at_or_after(y as u64 + 1).saturating_sub(1);
        let col = self.cols.first_at_or_after(x as u64 + 1).saturating_sub(1);
        (row.min(last_row), col.min(last_col))
    }

    /// The cartesian product of visible rows x visible columns, with
    /// merge-region members suppressed in favour of their anchor: a merge
    /// renders exactly once, from its anchor, carrying its span.
    pub fn get_cells_to_render(
        &mut self,
        dim: &dyn DimensionProvider,
        merge_anchor_of: impl Fn(u32, u32) -> Option<(u32, u32, u32, u32)>,
    ) -> Vec<RenderCell> {
        let rows = self.get_visible_rows(dim);
        let cols = self.get_visible_columns(dim);
        let mut out = Vec::new();
        let mut rendered_anchors = std::collections::HashSet::new();
        for r in &rows {
            for c in &cols {
                if let Some((anchor_row, anchor_col, row_span, col_span)) = merge_anchor_of(r.index, c.index) {
                    if !rendered_anchors.insert((anchor_row, anchor_col)) {
                        continue;
                    }
                    out.push(RenderCell { row: anchor_row, col: anchor_col, row_span, col_span });
                } else {
                    out.push(RenderCell { row: r.index, col: c.index, row_span: 1, col_span: 1 });
                }
            }
        }
        out
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDim {
        hidden_rows: std::collections::HashSet<u32>,
        last_row: u32,
        last_col: u32,
    }

    impl DimensionProvider for FixedDim {
        fn row_height(&self, _row: u32) -> u32 {
            21
        }
        fn col_width(&self, _col: u32) -> u32 {
            72
        }
        fn is_row_hidden(&self, row: u32) -> bool {
            self.hidden_rows.contains(&row)
        }
        fn is_col_hidden(&self, _col: u32) -> bool {
            false
        }
        fn last_used_row(&self) -> u32 {
            self.last_row
        }
        fn last_used_col(&self) -> u32 {
            self.last_col
        }
    }

    #[test]
    fn test_row_top_cumulative() {
        let dim = FixedDim { hidden_rows: Default::default(), last_row: 100, last_col: 10 };
        let mut vp = Viewport::new();
        assert_eq!(vp.get_row_top(11, &dim), 11 * 21);
    }

    #[test]
    fn test_hidden_row_contributes_zero() {
        let mut hidden = std::collections::HashSet::new();
        hidden.insert(10);
        let dim = FixedDim { hidden_rows: hidden, last_row: 100, last_col: 10 };
        let mut vp = Viewport::new();
        // row 11's top excludes row 10's height since it's hidden.
        assert_eq!(vp.get_row_top(11, &dim), 10 * 21);
    }

    #[test]
    fn test_visible_rows_skip_hidden() {
        let mut hidden = std::collections::HashSet::new();
        hidden.insert(10);
        let dim = FixedDim { hidden_rows: hidden, last_row: 100, last_col: 10 };
        let mut vp = Viewport::new();
        vp.set_viewport_size(800, 800);
        vp.set_scroll(0, 0);
        let visible = vp.get_visible_rows(&dim);
        assert!(visible.iter().any(|e| e.index == 9));
        assert!(!visible.iter().any(|e| e.index == 10));
        assert!(visible.iter().any(|e| e.index == 11));
    }

    #[test]
    fn test_invalidate_cache_rewinds_watermark() {
        let dim = FixedDim { hidden_rows: Default::default(), last_row: 100, last_col: 10 };
        let mut vp = Viewport::new();
        vp.get_row_top(50, &dim);
        assert!(vp.rows.known_upto() >= 50);
        vp.invalidate_cache(Some(5), None);
        assert!(vp.rows.known_upto() <= 5);
    }
}
