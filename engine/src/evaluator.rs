//! FILENAME: engine/src/evaluator.rs
//! PURPOSE: The default, pluggable formula evaluator.
//! CONTEXT: A small function library (SUM, AVERAGE, MIN, MAX, COUNT, IF)
//! plus arithmetic/comparison/concatenation operators. Cross-sheet
//! formulas, worksheet-state GET functions (`GET.ROW.HEIGHT`, table
//! references, etc.) are out of scope for this single-grid core. Richer
//! function libraries are a pluggable `FormulaEvaluator` the caller
//! supplies.

use std::collections::HashSet;

use parser::ast::{BinaryOperator, BuiltinFunction, Expression, UnaryOperator, Value};

use crate::cell::{CellError, CellValue};
use crate::coord::{col_to_index, CellCoord};
use crate::dependency_extractor::{extract_dependencies, GridBounds};

/// Read-only view the evaluator needs into the surrounding grid: other
/// cells' computed values, and bounds for expanding open column/row refs.
pub trait EvalContext {
    fn cell_value(&self, row: u32, col: u32) -> CellValue;
    fn bounds(&self) -> GridBounds;
}

/// The result of evaluating one formula: its value plus the set of cells
/// it reads, which the caller feeds to `DependencyGraph::set_dependencies`.
pub struct EvalOutcome {
    pub value: CellValue,
    pub dependencies: HashSet<CellCoord>,
}

/// Anything that can turn formula source text into a value plus its
/// dependency set. The engine is built against this trait, not a concrete
/// evaluator, so callers may supply a richer language if they need one.
pub trait FormulaEvaluator {
    fn evaluate(&self, source: &str, ctx: &dyn EvalContext) -> EvalOutcome;
}

/// An evaluator intermediate value, distinct from `CellValue` because
/// arithmetic never produces `Empty`/`FormattedText`.
#[derive(Debug, Clone)]
enum EvalResult {
    Number(f64),
    Text(String),
    Boolean(bool),
}

impl EvalResult {
    fn to_cell_value(self) -> CellValue {
        match self {
            EvalResult::Number(n) => CellValue::Number(n),
            EvalResult::Text(s) => CellValue::Text(s),
            EvalResult::Boolean(b) => CellValue::Boolean(b),
        }
    }

    fn as_number(&self) -> Result<f64, CellError> {
        match self {
            EvalResult::Number(n) => Ok(*n),
            EvalResult::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            EvalResult::Text(s) => s.trim().parse::<f64>().map_err(|_| CellError::Value),
        }
    }

    fn as_text(&self) -> String {
        match self {
            EvalResult::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{:.0}", n)
                } else {
                    n.to_string()
                }
            }
            EvalResult::Text(s) => s.clone(),
            EvalResult::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        }
    }

    fn is_truthy(&self) -> Result<bool, CellError> {
        match self {
            EvalResult::Boolean(b) => Ok(*b),
            EvalResult::Number(n) => Ok(*n != 0.0),
            EvalResult::Text(_) => Err(CellError::Value),
        }
    }

    fn from_cell_value(v: &CellValue) -> EvalResult {
        match v {
            CellValue::Empty => EvalResult::Number(0.0),
            CellValue::Number(n) => EvalResult::Number(*n),
            CellValue::Text(s) => EvalResult::Text(s.clone()),
            CellValue::FormattedText(ft) => EvalResult::Text(ft.text.clone()),
            CellValue::Boolean(b) => EvalResult::Boolean(*b),
            // An upstream error propagates before this is ever constructed
            // (see eval_expr's CellRef arm); treated as blank defensively.
            CellValue::Error(_) => EvalResult::Number(0.0),
        }
    }
}

/// Default evaluator: arithmetic, comparisons, string concatenation, and
/// SUM/AVERAGE/MIN/MAX/COUNT/IF over cell and range references.
pub struct DefaultEvaluator;

impl FormulaEvaluator for DefaultEvaluator {
    fn evaluate(&self, source: &str, ctx: &dyn EvalContext) -> EvalOutcome {
        match parser::parse(source) {
            Ok(expr) => {
                let dependencies = extract_dependencies(&expr, ctx.bounds());
                let value = match eval_expr(&expr, ctx) {
                    Ok(result) => result.to_cell_value(),
                    Err(e) => CellValue::Error(e),
                };
                EvalOutcome { value, dependencies }
            }
            Err(_) => EvalOutcome { value: CellValue::Error(CellError::Syntax), dependencies: HashSet::new() },
        }
    }
}

fn eval_expr(expr: &Expression, ctx: &dyn EvalContext) -> Result<EvalResult, CellError> {
    match expr {
        Expression::Literal(Value::Number(n)) => Ok(EvalResult::Number(*n)),
        Expression::Literal(Value::String(s)) => Ok(EvalResult::Text(s.clone())),
        Expression::Literal(Value::Boolean(b)) => Ok(EvalResult::Boolean(*b)),

        Expression::CellRef { col, row, .. } => {
            let value = ctx.cell_value(row - 1, col_to_index(col));
            if let CellValue::Error(e) = value {
                return Err(e);
            }
            Ok(EvalResult::from_cell_value(&value))
        }

        Expression::UnaryOp { op, operand } => {
            let v = eval_expr(operand, ctx)?.as_number()?;
            match op {
                UnaryOperator::Negate => Ok(EvalResult::Number(-v)),
            }
        }

        Expression::BinaryOp { left, op, right } => eval_binary(left, *op, right, ctx),

        Expression::FunctionCall { func, args } => eval_function(func, args, ctx),

        // A bare range/column/row reference outside of a function call
        // (e.g. `=A1:A5`) has no well-defined scalar value.
        Expression::Range { .. } | Expression::ColumnRef { .. } | Expression::RowRef { .. } => {
            Err(CellError::Value)
        }

        // Named ranges, 3D sheet spans, structured table references: out
        // of scope for a single-grid core.
        _ => Err(CellError::Name),
    }
}

fn eval_binary(
    left: &Expression,
    op: BinaryOperator,
    right: &Expression,
    ctx: &dyn EvalContext,
) -> Result<EvalResult, CellError> {
    if op == BinaryOperator::Concat {
        let l = eval_expr(left, ctx)?.as_text();
        let r = eval_expr(right, ctx)?.as_text();
        return Ok(EvalResult::Text(l + &r));
    }

    let is_comparison = matches!(
        op,
        BinaryOperator::Equal
            | BinaryOperator::NotEqual
            | BinaryOperator::LessThan
            | BinaryOperator::GreaterThan
            | BinaryOperator::LessEqual
            | BinaryOperator::GreaterEqual
    );
    if is_comparison {
        let l = eval_expr(left, ctx)?;
        let r = eval_expr(right, ctx)?;
        return Ok(EvalResult::Boolean(compare(&l, &r, op)));
    }

    let l = eval_expr(left, ctx)?.as_number()?;
    let r = eval_expr(right, ctx)?.as_number()?;
    match op {
        BinaryOperator::Add => Ok(EvalResult::Number(l + r)),
        BinaryOperator::Subtract => Ok(EvalResult::Number(l - r)),
        BinaryOperator::Multiply => Ok(EvalResult::Number(l * r)),
        BinaryOperator::Divide => {
            if r == 0.0 {
                Err(CellError::Div0)
            } else {
                Ok(EvalResult::Number(l / r))
            }
        }
        BinaryOperator::Power => Ok(EvalResult::Number(l.powf(r))),
        _ => unreachable!("comparison and concat handled above"),
    }
}

/// Ordering: numbers < strings < booleans, matching the sort comparator's
/// type ranking, reused here for `=`/`<`/etc.
fn compare(l: &EvalResult, r: &EvalResult, op: BinaryOperator) -> bool {
    use std::cmp::Ordering;
    let ordering = match (l, r) {
        (EvalResult::Number(a), EvalResult::Number(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
        (EvalResult::Text(a), EvalResult::Text(b)) => a.to_lowercase().cmp(&b.to_lowercase()),
        (EvalResult::Boolean(a), EvalResult::Boolean(b)) => a.cmp(b),
        (EvalResult::Number(_), _) => Ordering::Less,
        (_, EvalResult::Number(_)) => Ordering::Greater,
        (EvalResult::Text(_), EvalResult::Boolean(_)) => Ordering::Less,
        (EvalResult::Boolean(_), EvalResult::Text(_)) => Ordering::Greater,
    };
    match op {
        BinaryOperator::Equal => ordering == Ordering::Equal,
        BinaryOperator::NotEqual => ordering != Ordering::Equal,
        BinaryOperator::LessThan => ordering == Ordering::Less,
        BinaryOperator::GreaterThan => ordering == Ordering::Greater,
        BinaryOperator::LessEqual => ordering != Ordering::Greater,
        BinaryOperator::GreaterEqual => ordering != Ordering::Less,
        _ => unreachable!(),
    }
}

/// Flattens a single argument expression (cell ref, range, or scalar) into
/// its constituent numeric values, skipping blanks and text — the
/// aggregate-function convention (`SUM`/`AVERAGE`/`MIN`/`MAX`/`COUNT`
/// ignore non-numeric cells rather than erroring).
fn flatten_numeric(expr: &Expression, ctx: &dyn EvalContext) -> Result<Vec<f64>, CellError> {
    match expr {
        Expression::Range { start, end, .. } => {
            if let (
                Expression::CellRef { col: c1, row: r1, .. },
                Expression::CellRef { col: c2, row: r2, .. },
            ) = (start.as_ref(), end.as_ref())
            {
                let (col1, col2) = (col_to_index(c1), col_to_index(c2));
                let (row1, row2) = (r1 - 1, r2 - 1);
                let mut out = Vec::new();
                for row in row1.min(row2)..=row1.max(row2) {
                    for col in col1.min(col2)..=col1.max(col2) {
                        if let CellValue::Number(n) = ctx.cell_value(row, col) {
                            out.push(n);
                        }
                    }
                }
                Ok(out)
            } else {
                Ok(Vec::new())
            }
        }
        other => match eval_expr(other, ctx) {
            Ok(EvalResult::Number(n)) => Ok(vec![n]),
            Ok(_) => Ok(Vec::new()),
            Err(e) => Err(e),
        },
    }
}

fn eval_function(func: &BuiltinFunction, args: &[Expression], ctx: &dyn EvalContext) -> Result<EvalResult, CellError> {
    match func {
        BuiltinFunction::Sum => {
            let mut total = 0.0;
            for a in args {
                total += flatten_numeric(a, ctx)?.into_iter().sum::<f64>();
            }
            Ok(EvalResult::Number(total))
        }
        BuiltinFunction::Average => {
            let mut values = Vec::new();
            for a in args {
                values.extend(flatten_numeric(a, ctx)?);
            }
            if values.is_empty() {
                return Err(CellError::Div0);
            }
            Ok(EvalResult::Number(values.iter().sum::<f64>() / values.len() as f64))
        }
        BuiltinFunction::Min => {
            let mut values = Vec::new();
            for a in args {
                values.extend(flatten_numeric(a, ctx)?);
            }
            Ok(EvalResult::Number(values.into_iter().fold(0.0_f64, f64::min)))
        }
        BuiltinFunction::Max => {
            let mut values = Vec::new();
            for a in args {
                values.extend(flatten_numeric(a, ctx)?);
            }
            Ok(EvalResult::Number(values.into_iter().fold(0.0_f64, f64::max)))
        }
        BuiltinFunction::Count => {
            let mut count = 0usize;
            for a in args {
                count += flatten_numeric(a, ctx)?.len();
            }
            Ok(EvalResult::Number(count as f64))
        }
        BuiltinFunction::If => {
            if args.len() < 2 {
                return Err(CellError::Value);
            }
            let cond = eval_expr(&args[0], ctx)?.is_truthy()?;
            if cond {
                eval_expr(&args[1], ctx)
            } else if let Some(else_branch) = args.get(2) {
                eval_expr(else_branch, ctx)
            } else {
                Ok(EvalResult::Boolean(false))
            }
        }
        _ => Err(CellError::Name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapContext {
        cells: HashMap<CellCoord, CellValue>,
    }

    impl EvalContext for MapContext {
        fn cell_value(&self, row: u32, col: u32) -> CellValue {
            self.cells.get(&(row, col)).cloned().unwrap_or(CellValue::Empty)
        }
        fn bounds(&self) -> GridBounds {
            GridBounds { max_row: 1000, max_col: 100 }
        }
    }

    fn ctx_with(cells: &[(CellCoord, CellValue)]) -> MapContext {
        MapContext { cells: cells.iter().cloned().collect() }
    }

    #[test]
    fn test_sum_of_two_cells() {
        let ctx = ctx_with(&[((0, 0), CellValue::Number(5.0)), ((0, 1), CellValue::Number(7.0))]);
        let outcome = DefaultEvaluator.evaluate("=A1+B1", &ctx);
        assert_eq!(outcome.value, CellValue::Number(12.0));
        assert!(outcome.dependencies.contains(&(0, 0)));
        assert!(outcome.dependencies.contains(&(0, 1)));
    }

    #[test]
    fn test_sum_function_over_range() {
        let ctx = ctx_with(&[
            ((0, 0), CellValue::Number(1.0)),
            ((1, 0), CellValue::Number(2.0)),
            ((2, 0), CellValue::Number(3.0)),
        ]);
        let outcome = DefaultEvaluator.evaluate("=SUM(A1:A3)", &ctx);
        assert_eq!(outcome.value, CellValue::Number(6.0));
    }

    #[test]
    fn test_if_conditional() {
        let ctx = ctx_with(&[((0, 0), CellValue::Number(5.0))]);
        let outcome = DefaultEvaluator.evaluate(r#"=IF(A1>0, "yes", "no")"#, &ctx);
        assert_eq!(outcome.value, CellValue::Text("yes".to_string()));
    }

    #[test]
    fn test_div_by_zero() {
        let ctx = ctx_with(&[]);
        let outcome = DefaultEvaluator.evaluate("=1/0", &ctx);
        assert_eq!(outcome.value, CellValue::Error(CellError::Div0));
    }

    #[test]
    fn test_missing_cell_reads_as_zero() {
        let ctx = ctx_with(&[]);
        let outcome = DefaultEvaluator.evaluate("=A1+1", &ctx);
        assert_eq!(outcome.value, CellValue::Number(1.0));
    }

    #[test]
    fn test_syntax_error() {
        let ctx = ctx_with(&[]);
        let outcome = DefaultEvaluator.evaluate("=1+", &ctx);
        assert_eq!(outcome.value, CellValue::Error(CellError::Syntax));
    }

    #[test]
    fn test_unsupported_function_is_name_error() {
        let ctx = ctx_with(&[]);
        let outcome = DefaultEvaluator.evaluate("=VLOOKUP(A1, A1:A2, 1)", &ctx);
        assert_eq!(outcome.value, CellValue::Error(CellError::Name));
    }
}
