//! End-to-end scenarios exercising the public engine facade across several
//! subsystems at once (formulas, structural edits, filter/sort, comments,
//! viewport, undo/redo).

use engine::{
    CellValue, ColumnPredicate, Condition, CompareOp, DefaultEvaluator, LogicOp, SortOrder,
    SortRule, SpreadsheetEngine,
};
use engine::coord::CellRange;

fn engine() -> SpreadsheetEngine {
    SpreadsheetEngine::new(Box::new(DefaultEvaluator))
}

/// S1: a chain of formulas recalculates in dependency order and produces
/// the correct sum when an input changes.
#[test]
fn s1_sum_propagation() {
    let mut e = engine();
    e.set_cell_value(0, 0, "1").unwrap();
    e.set_cell_value(1, 0, "2").unwrap();
    e.set_cell_value(2, 0, "3").unwrap();
    e.set_cell_value(3, 0, "=SUM(A1:A3)").unwrap();
    assert_eq!(e.get_cell(3, 0).unwrap().value, CellValue::Number(6.0));

    e.set_cell_value(0, 0, "10").unwrap();
    assert_eq!(e.get_cell(3, 0).unwrap().value, CellValue::Number(15.0));
}

/// S2: inserting rows above a formula's referents rewrites the formula's
/// references to track the moved cells.
#[test]
fn s2_structural_shift_rewrites_formulas() {
    let mut e = engine();
    e.set_cell_value(0, 0, "5").unwrap();
    e.set_cell_value(1, 0, "=A1*2").unwrap();
    assert_eq!(e.get_cell(1, 0).unwrap().value, CellValue::Number(10.0));

    e.insert_rows(0, 1).unwrap();

    // A1 (value 5) has moved down to A2; the formula, now at row index 2,
    // should have been rewritten to follow it.
    assert_eq!(e.get_cell(0, 0), None);
    assert_eq!(e.get_cell(1, 0), None);
    assert_eq!(e.get_cell(2, 0).unwrap().value, CellValue::Number(5.0));
    let moved = e.get_cell(3, 0).unwrap();
    assert_eq!(moved.formula.as_deref(), Some("=A2*2"));
    assert_eq!(moved.value, CellValue::Number(10.0));
}

/// S3: a formula cycle is detected and every cell in the cycle is painted
/// with a cycle error instead of panicking or looping forever.
#[test]
fn s3_cycle_detection() {
    let mut e = engine();
    e.set_cell_value(0, 0, "=B1").unwrap();
    e.set_cell_value(0, 1, "=A1").unwrap();

    let a1 = e.get_cell(0, 0).unwrap();
    let b1 = e.get_cell(0, 1).unwrap();
    assert!(matches!(a1.value, CellValue::Error(_)));
    assert!(matches!(b1.value, CellValue::Error(_)));
}

/// S4: applying a filter and then sorting the visible range composes
/// correctly, and the filter is re-applied against the post-sort layout.
#[test]
fn s4_filter_and_sort_composition() {
    let mut e = engine();
    let rows = vec![
        vec!["30".to_string()],
        vec!["10".to_string()],
        vec!["20".to_string()],
        vec!["5".to_string()],
    ];
    e.load_from_array(&rows).unwrap();

    e.apply_filter(
        0,
        ColumnPredicate::Conditions {
            conditions: vec![Condition::Compare { op: CompareOp::GreaterThan, value: "5".into() }],
            combinator: LogicOp::And,
        },
    );
    let filtered = e.get_filtered_rows();
    assert!(filtered.contains(&0));
    assert!(filtered.contains(&1));
    assert!(filtered.contains(&2));
    assert!(!filtered.contains(&3));

    e.sort_range(
        CellRange { start_row: 0, start_col: 0, end_row: 3, end_col: 0 },
        &[SortRule { column: 0, order: SortOrder::Ascending, custom_list: None, case_sensitive: false, blanks_first: true }],
        false,
    )
    .unwrap();

    assert_eq!(e.get_cell(0, 0).unwrap().value, CellValue::Number(5.0));
    assert_eq!(e.get_cell(3, 0).unwrap().value, CellValue::Number(30.0));

    let filtered_after_sort = e.get_filtered_rows();
    assert!(!filtered_after_sort.contains(&0));
    assert!(filtered_after_sort.contains(&1));
    assert!(filtered_after_sort.contains(&2));
    assert!(filtered_after_sort.contains(&3));
}

/// S5: a comment thread anchored to a cell follows that cell when rows
/// are inserted above it.
#[test]
fn s5_comment_moves_with_structural_edit() {
    let mut e = engine();
    e.set_cell_value(2, 0, "hello").unwrap();
    let thread_id = e
        .create_comment_thread(2, 0, "u1".to_string(), "Alice".to_string(), "looks right".to_string(), Vec::new())
        .unwrap();
    assert!(!e.threads_at(2, 0).is_empty());

    e.insert_rows(0, 2).unwrap();

    assert!(e.threads_at(2, 0).is_empty());
    let moved = e.threads_at(4, 0);
    assert_eq!(moved.len(), 1);
    assert_eq!(moved[0].id, thread_id);
}

/// S6: hidden rows are excluded from the visible viewport range, and the
/// offsets of rows following a hidden one do not advance for it.
#[test]
fn s6_viewport_skips_hidden_rows() {
    let mut e = engine();
    for row in 0..20 {
        e.set_cell_value(row, 0, &row.to_string()).unwrap();
    }
    e.hide_row(5).unwrap();
    e.set_viewport_size(400, 200);

    let visible = e.get_visible_rows();
    assert!(!visible.iter().any(|entry| entry.index == 5));
    assert!(visible.iter().any(|entry| entry.index == 4));
    assert!(visible.iter().any(|entry| entry.index == 6));

    let top4 = e.get_row_top(4);
    let top6 = e.get_row_top(6);
    // row 5 contributes nothing to the cumulative offset once hidden.
    assert_eq!(top6 - top4, engine::cell_store::DEFAULT_ROW_HEIGHT);
}

/// S7: undo/redo round-trips a structural edit and restores the exact
/// prior cell contents, clearing the redo stack on a fresh mutation.
#[test]
fn s7_undo_redo_stack() {
    let mut e = engine();
    e.set_cell_value(0, 0, "1").unwrap();
    e.set_cell_value(1, 0, "2").unwrap();
    e.set_cell_value(2, 0, "=SUM(A1:A2)").unwrap();
    assert_eq!(e.get_cell(2, 0).unwrap().value, CellValue::Number(3.0));

    assert!(e.can_undo());
    assert!(!e.can_redo());

    e.insert_rows(0, 1).unwrap();
    assert_eq!(e.get_cell(0, 0), None);

    assert!(e.undo().unwrap());
    assert_eq!(e.get_cell(0, 0).unwrap().value, CellValue::Number(1.0));
    assert_eq!(e.get_cell(2, 0).unwrap().value, CellValue::Number(3.0));
    assert!(e.can_redo());

    assert!(e.redo().unwrap());
    assert_eq!(e.get_cell(0, 0), None);
    assert_eq!(e.get_cell(3, 0).unwrap().value, CellValue::Number(3.0));

    // a fresh mutation after undo clears the redo stack.
    e.undo().unwrap();
    e.set_cell_value(0, 1, "x").unwrap();
    assert!(!e.can_redo());
}
