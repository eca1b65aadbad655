//! FILENAME: engine/src/error.rs
//! PURPOSE: Crate-wide error type for the spreadsheet core.
//! CONTEXT: Every fallible public entry point returns `Result<T, EngineError>`.
//! Formula errors are NOT represented here — they live inside `CellValue::Error`
//! and are never thrown (see cell.rs).

use thiserror::Error;

/// Errors raised by the engine's mutation and query APIs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("grid overflow: {0}")]
    GridOverflow(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
