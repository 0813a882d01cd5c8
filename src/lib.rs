//! Boolean circuit core for the QCL secure computation toolchain.
//!
//! This crate holds the circuit data model shared by the compiler and the
//! garbled streaming runtime: bit-sized types, gates over the five
//! primitive operations, circuit statistics, level assignment, cleartext
//! evaluation and parsing of on-disk circuit files.

pub mod circuit;
pub mod gate;
pub mod io;
pub mod parse;
pub mod stats;
pub mod timing;
pub mod types;

pub use circuit::{Circuit, CircuitError};
pub use gate::{Gate, Op, Wire};
pub use io::{IoArg, IO};
pub use stats::Stats;
pub use types::Type;
