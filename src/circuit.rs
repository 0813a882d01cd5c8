//! The circuit container: gates, level assignment and cleartext
//! evaluation.

use bitvec::prelude::*;

use crate::gate::{Gate, Op, Wire};
use crate::io::IO;
use crate::stats::Stats;

/// Errors from circuit construction, parsing and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{path}:{line}: {msg}")]
    Parse {
        path: String,
        line: usize,
        msg: String,
    },
    #[error("wire {0} read before it is written")]
    WireNotReady(Wire),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A boolean circuit over the five primitive gates.
///
/// Wires 0 and 1 are the constant false/true wires, primary inputs
/// occupy `[2, 2 + inputs.size())`, and every gate's output follows all
/// of its inputs in wire order.
#[derive(Debug, Clone, Default)]
pub struct Circuit {
    pub inputs: IO,
    pub outputs: IO,
    pub gates: Vec<Gate>,
    pub output_wires: Vec<Wire>,
    pub num_wires: usize,
    pub stats: Stats,
}

impl Circuit {
    /// First wire id after the constant and primary input wires.
    pub fn first_internal_wire(&self) -> u32 {
        2 + self.inputs.size()
    }

    /// Relative computational cost under the free-XOR convention.
    pub fn cost(&self) -> u64 {
        self.stats.cost()
    }

    /// Assign levels to gates and fill in the depth/width statistics.
    /// The level of a gate is one plus the maximum level of its live
    /// inputs; constant and input wires are at level 0.
    pub fn assign_levels(&mut self) {
        let mut levels = vec![0u32; self.num_wires];
        let mut count_by_level = vec![0u64; self.num_wires + 1];

        let mut max = 0u32;
        for gate in &mut self.gates {
            let mut level = levels[gate.input0.index()];
            if gate.op != Op::Inv {
                level = level.max(levels[gate.input1.index()]);
            }
            gate.level = level;
            count_by_level[level as usize] += 1;

            level += 1;
            levels[gate.output.index()] = level;
            max = max.max(level);
        }

        self.stats.num_levels = u64::from(max);
        self.stats.max_width = count_by_level.iter().copied().max().unwrap_or(0);
    }

    /// Evaluate the circuit in cleartext. `inputs` is the flat input bit
    /// image; the result is the output bit image in `output_wires`
    /// order.
    pub fn eval(&self, inputs: &BitSlice) -> Result<BitVec, CircuitError> {
        let expected = self.inputs.size() as usize;
        if inputs.len() != expected {
            return Err(CircuitError::InvalidInput(format!(
                "expected {} input bits, got {}",
                expected,
                inputs.len()
            )));
        }

        let mut values = bitvec![0; self.num_wires];
        let mut written = bitvec![0; self.num_wires];
        values.set(Wire::ONE.index(), true);
        written.set(Wire::ZERO.index(), true);
        written.set(Wire::ONE.index(), true);
        for (i, bit) in inputs.iter().enumerate() {
            values.set(2 + i, *bit);
            written.set(2 + i, true);
        }

        for gate in &self.gates {
            if !written[gate.input0.index()] {
                return Err(CircuitError::WireNotReady(gate.input0));
            }
            let a = values[gate.input0.index()];
            let b = if gate.op == Op::Inv {
                false
            } else {
                if !written[gate.input1.index()] {
                    return Err(CircuitError::WireNotReady(gate.input1));
                }
                values[gate.input1.index()]
            };
            values.set(gate.output.index(), gate.op.eval(a, b));
            written.set(gate.output.index(), true);
        }

        let mut out = BitVec::with_capacity(self.output_wires.len());
        for wire in &self.output_wires {
            if !written[wire.index()] {
                return Err(CircuitError::WireNotReady(*wire));
            }
            out.push(values[wire.index()]);
        }
        Ok(out)
    }

    /// Debug dump of all gates.
    pub fn dump(&self) -> String {
        use std::fmt::Write as _;

        let mut out = format!("{self}\n");
        for (id, gate) in self.gates.iter().enumerate() {
            let _ = writeln!(out, "{id:04}\t{gate}");
        }
        out
    }
}

impl std::fmt::Display for Circuit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#gates={} ({}) #w={}",
            self.gates.len(),
            self.stats,
            self.num_wires
        )
    }
}
