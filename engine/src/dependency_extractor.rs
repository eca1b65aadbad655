//! FILENAME: engine/src/dependency_extractor.rs
//! PURPOSE: Walks a parsed formula AST to find every cell it references.
//! CONTEXT: Feeds `DependencyGraph::set_dependencies`. Ranges are expanded
//! to every cell they cover; column/row references expand within the
//! supplied `GridBounds` (derived from the store's used range, not a fixed
//! workbook size — this core has no notion of a sheet's total extent).
//!
//! Imports `parser::ast::Expression` directly rather than mirroring it
//! locally — the parser crate is already a workspace dependency, so
//! duplicating its enum only invites drift. `NamedRef`, `Sheet3DRef`, and
//! `TableRef` are parsed but contribute no dependencies here: this core
//! models one grid, not a workbook of named ranges, sheets, or structured
//! tables.

use std::collections::HashSet;

use parser::ast::Expression;

use crate::coord::{col_to_index, CellCoord};

/// Bounds used to expand open-ended column/row references (`A:A`, `1:5`)
/// into concrete cell coordinates.
#[derive(Debug, Clone, Copy)]
pub struct GridBounds {
    pub max_row: u32,
    pub max_col: u32,
}

impl Default for GridBounds {
    fn default() -> Self {
        GridBounds { max_row: 0, max_col: 0 }
    }
}

pub fn extract_dependencies(expr: &Expression, bounds: GridBounds) -> HashSet<CellCoord> {
    let mut deps = HashSet::new();
    extract_recursive(expr, &mut deps, bounds);
    deps
}

fn extract_recursive(expr: &Expression, deps: &mut HashSet<CellCoord>, bounds: GridBounds) {
    match expr {
        Expression::Literal(_) => {}

        Expression::CellRef { col, row, .. } => {
            deps.insert((row - 1, col_to_index(col)));
        }

        Expression::Range { start, end, .. } => {
            if let (
                Expression::CellRef { col: start_col, row: start_row, .. },
                Expression::CellRef { col: end_col, row: end_row, .. },
            ) = (start.as_ref(), end.as_ref())
            {
                let (c1, c2) = (col_to_index(start_col), col_to_index(end_col));
                let (r1, r2) = (start_row - 1, end_row - 1);
                for r in r1.min(r2)..=r1.max(r2) {
                    for c in c1.min(c2)..=c1.max(c2) {
                        deps.insert((r, c));
                    }
                }
            }
        }

        Expression::ColumnRef { start_col, end_col, .. } => {
            let (c1, c2) = (col_to_index(start_col), col_to_index(end_col));
            let max_col = c1.max(c2).min(bounds.max_col);
            for c in c1.min(c2)..=max_col {
                for r in 0..=bounds.max_row {
                    deps.insert((r, c));
                }
            }
        }

        Expression::RowRef { start_row, end_row, .. } => {
            let (r1, r2) = (start_row - 1, end_row - 1);
            let max_row = r1.max(r2).min(bounds.max_row);
            for r in r1.min(r2)..=max_row {
                for c in 0..=bounds.max_col {
                    deps.insert((r, c));
                }
            }
        }

        Expression::BinaryOp { left, right, .. } => {
            extract_recursive(left, deps, bounds);
            extract_recursive(right, deps, bounds);
        }

        Expression::UnaryOp { operand, .. } => {
            extract_recursive(operand, deps, bounds);
        }

        Expression::FunctionCall { args, .. } => {
            for arg in args {
                extract_recursive(arg, deps, bounds);
            }
        }

        // Named ranges, 3D sheet spans, and structured table references
        // are out of scope for a single-grid core; they contribute no
        // dependency edges and the evaluator reports them as #NAME?/#REF!.
        _ => {}
    }
}
