//! Free-XOR garbling engine and the evaluator side of the streaming
//! protocol.

pub mod evaluator;
pub mod garbler;
pub mod hash;
pub mod label;
pub mod stream;

pub use evaluator::Evaluator;
pub use garbler::Garbler;
pub use label::{Delta, Label};
pub use stream::stream_evaluator;

use qcl::{Op, Wire};

/// Garbling and evaluation failures.
#[derive(Debug, thiserror::Error)]
pub enum GarbleError {
    #[error("no label for wire {0}")]
    MissingLabel(Wire),
    #[error("{op} gate with {rows} table rows")]
    BadTable { op: Op, rows: usize },
    #[error(transparent)]
    Protocol(#[from] qcl_p2p::ProtocolError),
}
