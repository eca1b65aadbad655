//! FILENAME: engine/src/lib.rs
//! PURPOSE: Main library entry point for the spreadsheet engine.
//! CONTEXT: Re-exports public types and modules for use by other crates.

pub mod cell;
pub mod cell_store;
pub mod command;
pub mod comments;
pub mod config;
pub mod coord;
pub mod custom_format;
pub mod dependency_extractor;
pub mod dependency_graph;
pub mod error;
pub mod evaluator;
pub mod facade;
pub mod filter;
pub mod find_replace;
pub mod formula_engine;
pub mod merge;
pub mod number_format;
pub mod sort;
pub mod style;
pub mod viewport;

// Re-export commonly used types at the crate root
pub use cell::{Cell, CellError, CellValue, FormatRun, FormattedText, MergeMeta};
pub use cell_store::{
    CellEntry, CellStore, CellStoreSnapshot, ColMeta, ColMetaEntry, Direction, RowMeta, RowMetaEntry,
};
pub use command::{Command, UndoRedoStack};
pub use comments::{Comment, CommentStore, Mention, Thread, ThreadId};
pub use config::EngineConfig;
pub use coord::{a1_to_coord, col_to_index, coord_to_a1, index_to_col, CellCoord, CellRange};
pub use custom_format::{format_color_to_css, FormatColor, FormatResult};
pub use dependency_extractor::{extract_dependencies, GridBounds};
pub use dependency_graph::{CycleError, DependencyGraph};
pub use error::{EngineError, EngineResult};
pub use evaluator::{DefaultEvaluator, EvalContext, EvalOutcome, FormulaEvaluator};
pub use facade::{EngineSnapshot, EngineStats, SelectionStats, SpreadsheetEngine};
pub use filter::{ColumnPredicate, CompareOp, Condition, FilterManager, LogicOp};
pub use find_replace::{search, FindOptions, FindSession, IterationOrder, Match, ReplaceReport};
pub use formula_engine::{CalcProgress, FormulaEngine, StructuralEdit};
pub use merge::{MergeInfo, MergeManager};
pub use number_format::format_number;
pub use sort::{sort_range, SortOrder, SortRule};
pub use style::{
    BorderLineStyle, BorderStyle, Borders, CellStyle, Color, CurrencyPosition, FontStyle,
    NumberFormat, PartialCellFormat, StyleRegistry, TextAlign, TextRotation, VerticalAlign,
};
pub use viewport::{DimensionProvider, RenderCell, VisibleEntry, Viewport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_creates_cells() {
        let cell = Cell::new_number(42.0);
        assert_eq!(cell.value, CellValue::Number(42.0));
    }

    #[test]
    fn it_manages_cell_store() {
        let mut store = CellStore::new();
        let cell = Cell::new_text("Hello".to_string());
        store.set_cell(0, 0, cell).unwrap();

        let retrieved = store.get_cell(0, 0);
        assert!(retrieved.is_some());
        if let Some(c) = retrieved {
            assert_eq!(c.value, CellValue::Text("Hello".to_string()));
        }
    }

    #[test]
    fn integration_test_dependency_workflow() {
        let mut graph = DependencyGraph::new();
        let mut store = CellStore::new();

        let a1 = a1_to_coord("A", 1);
        store.set_cell(a1.0, a1.1, Cell::new_number(10.0)).unwrap();

        let b1 = a1_to_coord("B", 1);
        store.set_cell(b1.0, b1.1, Cell::new_number(20.0)).unwrap();

        let c1 = a1_to_coord("C", 1);
        store.set_cell(c1.0, c1.1, Cell::new_formula("=A1+B1".to_string())).unwrap();

        let mut deps = std::collections::HashSet::new();
        deps.insert(a1);
        deps.insert(b1);
        graph.set_dependencies(c1, deps);

        let order = graph.get_recalc_order(a1).unwrap();
        assert_eq!(order.len(), 1);
        assert_eq!(order[0], c1);
    }

    #[test]
    fn integration_test_cycle_prevention() {
        let mut graph = DependencyGraph::new();

        let a1 = a1_to_coord("A", 1);
        let b1 = a1_to_coord("B", 1);
        let mut deps = std::collections::HashSet::new();
        deps.insert(b1);
        graph.set_dependencies(a1, deps);

        let mut new_deps = std::collections::HashSet::new();
        new_deps.insert(a1);
        assert!(graph.would_create_cycle(b1, &new_deps));
    }

    #[test]
    fn integration_test_full_evaluation_workflow() {
        let mut engine = SpreadsheetEngine::new(Box::new(DefaultEvaluator));
        engine.set_cell_value(0, 0, "10").unwrap();
        engine.set_cell_value(0, 1, "20").unwrap();
        engine.set_cell_value(0, 2, "=A1+B1").unwrap();
        assert_eq!(engine.get_cell(0, 2).unwrap().value, CellValue::Number(30.0));
    }

    #[test]
    fn integration_test_conditional_evaluation() {
        let mut engine = SpreadsheetEngine::new(Box::new(DefaultEvaluator));
        engine.set_cell_value(0, 0, "100").unwrap();
        engine.set_cell_value(0, 1, "=IF(A1>50,A1*2,A1/2)").unwrap();
        assert_eq!(engine.get_cell(0, 1).unwrap().value, CellValue::Number(200.0));
    }

    #[test]
    fn test_style_with_number_format() {
        use number_format::*;
        use style::*;

        let mut registry = StyleRegistry::new();
        let style = CellStyle::new().with_number_format(NumberFormat::Currency {
            decimal_places: 2,
            symbol: "$".to_string(),
            symbol_position: CurrencyPosition::Before,
        });

        let idx = registry.get_or_create(style);
        let retrieved = registry.get(idx);

        let formatted = format_number(1234.56, &retrieved.number_format);
        assert!(formatted.contains("$"));
        assert!(formatted.contains("1234.56") || formatted.contains("1,234.56"));
    }
}
