//! Gate-level builders for SSA operations.
//!
//! A [`Builder`] borrows the wire allocator and a gate sink; builders
//! allocate intermediate and output wires bottom-up, so every gate's
//! inputs precede its output in wire order. Levels and statistics are
//! tracked as gates are emitted, which keeps them available in
//! streaming mode where no gate list ever exists in memory.

mod add;
mod cmp;
mod div;
mod hamming;
mod mul;
mod mux;

use qcl::{Gate, Op, Stats, Wire};

use crate::error::CompileError;
use crate::ssa::{Value, WireAllocator};

/// Consumer of emitted gates: either collected into an in-memory
/// circuit or garbled and streamed on the fly.
pub trait GateSink {
    fn gate(&mut self, gate: Gate) -> Result<(), CompileError>;

    /// A wire's label can be discarded.
    fn release(&mut self, wire: Wire) -> Result<(), CompileError>;
}

/// Gate emission context for lowering one program.
pub struct Builder<'a, S: GateSink> {
    pub walloc: &'a mut WireAllocator,
    pub sink: &'a mut S,
    levels: Vec<u32>,
    level_counts: Vec<u64>,
    stats: Stats,
}

impl<'a, S: GateSink> Builder<'a, S> {
    pub fn new(walloc: &'a mut WireAllocator, sink: &'a mut S) -> Builder<'a, S> {
        Builder {
            walloc,
            sink,
            levels: Vec::new(),
            level_counts: Vec::new(),
            stats: Stats::new(),
        }
    }

    /// Statistics of the gates emitted so far, with depth and width
    /// filled in.
    pub fn stats(&self) -> Stats {
        let mut stats = self.stats;
        stats.num_levels = u64::from(self.levels.iter().copied().max().unwrap_or(0));
        stats.max_width = self.level_counts.iter().copied().max().unwrap_or(0);
        stats
    }

    fn wire_level(&self, wire: Wire) -> u32 {
        self.levels.get(wire.index()).copied().unwrap_or(0)
    }

    /// Emit one gate with a fresh output wire.
    pub fn emit(&mut self, op: Op, input0: Wire, input1: Wire) -> Result<Wire, CompileError> {
        let output = self.walloc.fresh();

        let mut level = self.wire_level(input0);
        if op != Op::Inv {
            level = level.max(self.wire_level(input1));
        }
        if self.level_counts.len() <= level as usize {
            self.level_counts.resize(level as usize + 1, 0);
        }
        self.level_counts[level as usize] += 1;
        if self.levels.len() <= output.index() {
            self.levels.resize(output.index() + 1, 0);
        }
        self.levels[output.index()] = level + 1;
        self.stats.record(op);

        let mut gate = Gate::new(op, input0, input1, output);
        gate.level = level;
        self.sink.gate(gate)?;
        Ok(output)
    }

    pub fn xor(&mut self, a: Wire, b: Wire) -> Result<Wire, CompileError> {
        self.emit(Op::Xor, a, b)
    }

    pub fn xnor(&mut self, a: Wire, b: Wire) -> Result<Wire, CompileError> {
        self.emit(Op::Xnor, a, b)
    }

    pub fn and(&mut self, a: Wire, b: Wire) -> Result<Wire, CompileError> {
        self.emit(Op::And, a, b)
    }

    pub fn or(&mut self, a: Wire, b: Wire) -> Result<Wire, CompileError> {
        self.emit(Op::Or, a, b)
    }

    pub fn inv(&mut self, a: Wire) -> Result<Wire, CompileError> {
        self.emit(Op::Inv, a, Wire::INVALID)
    }

    /// The value's wires. Constants bind to the shared constant wires
    /// bit by bit from the least significant position upward.
    pub fn value_wires(&mut self, value: &Value) -> Vec<Wire> {
        if value.is_const() && !self.walloc.allocated(value) {
            let wires: Vec<Wire> = (0..value.typ.bits())
                .map(|bit| if value.bit(bit) { Wire::ONE } else { Wire::ZERO })
                .collect();
            self.walloc.set_wires(value, wires);
        }
        self.walloc.wires(value).to_vec()
    }

    /// Pad or truncate a wire vector to `bits`, filling with the
    /// constant zero wire, or with the sign wire when `signed`.
    pub fn extend(&self, wires: &[Wire], bits: usize, signed: bool) -> Vec<Wire> {
        let mut out = wires.to_vec();
        let fill = if signed {
            wires.last().copied().unwrap_or(Wire::ZERO)
        } else {
            Wire::ZERO
        };
        out.resize(bits, fill);
        out.truncate(bits);
        out
    }

    /// Both operands extended to a common width.
    fn operands(&mut self, a: &Value, b: &Value, bits: usize) -> (Vec<Wire>, Vec<Wire>) {
        let aw = self.value_wires(a);
        let bw = self.value_wires(b);
        let aw = self.extend(&aw, bits, a.typ.is_signed());
        let bw = self.extend(&bw, bits, b.typ.is_signed());
        (aw, bw)
    }

    /// Per-bit binary gates over operands extended to `bits`.
    pub fn bitwise(
        &mut self,
        op: Op,
        a: &Value,
        b: &Value,
        bits: usize,
    ) -> Result<Vec<Wire>, CompileError> {
        let (aw, bw) = self.operands(a, b, bits);
        aw.iter()
            .zip(&bw)
            .map(|(x, y)| self.emit(op, *x, *y))
            .collect()
    }

    /// Bitwise complement.
    pub fn complement(&mut self, a: &Value, bits: usize) -> Result<Vec<Wire>, CompileError> {
        let aw = self.value_wires(a);
        let aw = self.extend(&aw, bits, a.typ.is_signed());
        aw.iter().map(|x| self.inv(*x)).collect()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Collects gates for builder unit tests and evaluates them
    /// directly.
    #[derive(Default)]
    pub struct TestSink {
        pub gates: Vec<Gate>,
    }

    impl GateSink for TestSink {
        fn gate(&mut self, gate: Gate) -> Result<(), CompileError> {
            self.gates.push(gate);
            Ok(())
        }

        fn release(&mut self, _wire: Wire) -> Result<(), CompileError> {
            Ok(())
        }
    }

    /// Evaluate collected gates over explicit input assignments.
    pub fn eval_gates(gates: &[Gate], num_wires: usize, inputs: &[(Wire, bool)]) -> Vec<bool> {
        let mut values = vec![false; num_wires];
        values[Wire::ONE.index()] = true;
        for (wire, bit) in inputs {
            values[wire.index()] = *bit;
        }
        for gate in gates {
            let a = values[gate.input0.index()];
            let b = if gate.op == Op::Inv {
                false
            } else {
                values[gate.input1.index()]
            };
            values[gate.output.index()] = gate.op.eval(a, b);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    #[test]
    fn emit_tracks_levels_and_stats() {
        let mut walloc = WireAllocator::new(4, false);
        let mut sink = TestSink::default();
        let mut builder = Builder::new(&mut walloc, &mut sink);

        let t = builder.and(Wire(2), Wire(3)).unwrap();
        let u = builder.xor(t, Wire(2)).unwrap();
        let _ = builder.inv(u).unwrap();

        let stats = builder.stats();
        assert_eq!(stats[Op::And], 1);
        assert_eq!(stats[Op::Xor], 1);
        assert_eq!(stats[Op::Inv], 1);
        assert_eq!(stats.num_levels, 3);
        assert_eq!(stats.max_width, 1);

        assert_eq!(sink.gates[0].level, 0);
        assert_eq!(sink.gates[1].level, 1);
        assert_eq!(sink.gates[2].level, 2);
    }

    #[test]
    fn extend_pads_and_truncates() {
        let walloc = &mut WireAllocator::new(4, false);
        let sink = &mut TestSink::default();
        let builder = Builder::new(walloc, sink);

        assert_eq!(
            builder.extend(&[Wire(2), Wire(3)], 4, false),
            vec![Wire(2), Wire(3), Wire::ZERO, Wire::ZERO]
        );
        assert_eq!(
            builder.extend(&[Wire(2), Wire(3)], 4, true),
            vec![Wire(2), Wire(3), Wire(3), Wire(3)]
        );
        assert_eq!(builder.extend(&[Wire(2), Wire(3)], 1, false), vec![Wire(2)]);
    }
}
