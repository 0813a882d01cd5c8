//! Compiler errors.
//!
//! User errors carry the earliest source position at which they were
//! detected and abort compilation; broken compiler invariants panic.

use std::fmt;

/// A position in a source file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Point {
    pub source: String,
    pub line: usize,
    pub col: usize,
}

impl Point {
    pub fn new(source: impl Into<String>, line: usize, col: usize) -> Point {
        Point {
            source: source.into(),
            line,
            col,
        }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.source, self.line, self.col)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// An error in the source program.
    #[error("{point}: {msg}")]
    User { point: Point, msg: String },
    #[error(transparent)]
    Circuit(#[from] qcl::CircuitError),
    #[error(transparent)]
    Garble(#[from] qcl_garble::GarbleError),
    #[error(transparent)]
    Protocol(#[from] qcl_p2p::ProtocolError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CompileError {
    pub fn user(point: &Point, msg: impl Into<String>) -> CompileError {
        CompileError::User {
            point: point.clone(),
            msg: msg.into(),
        }
    }
}
