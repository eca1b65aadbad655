//! FILENAME: engine/src/config.rs
//! PURPOSE: Host-tunable limits for the engine, separate from per-document
//! state: viewport scroll buffers, undo/redo eviction caps, and the
//! default time slice for cooperative async recalculation.
//! CONTEXT: A host embedding the engine (desktop shell, server process,
//! test harness) picks these once at construction; nothing here is part
//! of a saved document.

use std::time::Duration;

/// Tunable limits passed to `SpreadsheetEngine::with_config`. `Default`
/// reproduces the crate's built-in constants, so `SpreadsheetEngine::new`
/// and `SpreadsheetEngine::with_config(EngineConfig::default())` behave
/// identically.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineConfig {
    /// Extra rows rendered past each viewport edge, to absorb fast scrolling.
    pub viewport_buffer_rows: u32,
    /// Extra columns rendered past each viewport edge.
    pub viewport_buffer_cols: u32,
    /// Maximum number of undo entries retained before the oldest is evicted.
    pub undo_max_entries: usize,
    /// Maximum approximate byte cost of retained undo entries.
    pub undo_max_bytes: usize,
    /// Default time slice `calculate_async` uses when a caller doesn't
    /// supply one explicitly via `SpreadsheetEngine::calculate_async`.
    pub async_recalc_slice: Duration,
}

impl EngineConfig {
    pub fn with_viewport_buffers(mut self, rows: u32, cols: u32) -> Self {
        self.viewport_buffer_rows = rows;
        self.viewport_buffer_cols = cols;
        self
    }

    pub fn with_undo_bounds(mut self, max_entries: usize, max_bytes: usize) -> Self {
        self.undo_max_entries = max_entries;
        self.undo_max_bytes = max_bytes;
        self
    }

    pub fn with_async_recalc_slice(mut self, slice: Duration) -> Self {
        self.async_recalc_slice = slice;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            viewport_buffer_rows: crate::viewport::DEFAULT_BUFFER_ROWS,
            viewport_buffer_cols: crate::viewport::DEFAULT_BUFFER_COLS,
            undo_max_entries: crate::command::DEFAULT_MAX_ENTRIES,
            undo_max_bytes: crate::command::DEFAULT_MAX_BYTES,
            async_recalc_slice: Duration::from_millis(16),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_builtin_constants() {
        let config = EngineConfig::default();
        assert_eq!(config.viewport_buffer_rows, crate::viewport::DEFAULT_BUFFER_ROWS);
        assert_eq!(config.undo_max_entries, crate::command::DEFAULT_MAX_ENTRIES);
    }

    #[test]
    fn test_builder_overrides() {
        let config = EngineConfig::default()
            .with_viewport_buffers(10, 4)
            .with_undo_bounds(50, 1024);
        assert_eq!(config.viewport_buffer_rows, 10);
        assert_eq!(config.viewport_buffer_cols, 4);
        assert_eq!(config.undo_max_entries, 50);
        assert_eq!(config.undo_max_bytes, 1024);
    }
}
