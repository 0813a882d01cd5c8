//! Lowering SSA programs to gates.
//!
//! The same driver serves both back ends: in-memory compilation
//! collects gates into a [`Circuit`], streaming garbles and transmits
//! each gate as it is emitted.

use qcl::{Circuit, Gate, Stats, Wire};

use crate::circuits::{Builder, GateSink};
use crate::error::CompileError;
use crate::ssa::{BuiltinOp, InstrOp, Program, Step, WireAllocator};

/// Result of lowering a program.
pub struct Lowered {
    pub output_wires: Vec<Wire>,
    pub stats: Stats,
    pub num_wires: u32,
}

/// Lower all program steps into `sink`. The allocator must be fresh,
/// with its first allocatable wire right after the program's input
/// wires.
pub fn lower<S: GateSink>(
    prog: &Program,
    walloc: &mut WireAllocator,
    sink: &mut S,
) -> Result<Lowered, CompileError> {
    // Bind the parameters to the primary input wires.
    let mut at = 2u32;
    for param in &prog.params {
        let bits = param.typ.bits();
        walloc.set_wires(param, (at..at + bits).map(Wire).collect());
        at += bits;
    }

    let mut builder = Builder::new(walloc, sink);

    // Program constants bind to the shared constant wires up front.
    for konst in &prog.constants {
        builder.value_wires(konst);
    }

    let mut output_wires = Vec::new();
    for step in &prog.steps {
        lower_step(&mut builder, step, &mut output_wires)?;
    }

    let stats = builder.stats();
    Ok(Lowered {
        output_wires,
        stats,
        num_wires: walloc.num_wires(),
    })
}

fn lower_step<S: GateSink>(
    builder: &mut Builder<'_, S>,
    step: &Step,
    output_wires: &mut Vec<Wire>,
) -> Result<(), CompileError> {
    let instr = &step.instr;
    let out_bits = instr
        .out
        .as_ref()
        .map(|o| o.typ.bits() as usize)
        .unwrap_or(0);

    let wires = match instr.op {
        InstrOp::Add => builder.add(&instr.inputs[0], &instr.inputs[1], out_bits)?,
        InstrOp::Sub => builder.sub(&instr.inputs[0], &instr.inputs[1], out_bits)?,
        InstrOp::Mul => builder.mul(&instr.inputs[0], &instr.inputs[1], out_bits)?,
        InstrOp::Div => {
            let (q, _) = builder.divmod(&instr.inputs[0], &instr.inputs[1])?;
            builder.extend(&q, out_bits, false)
        }
        InstrOp::Mod => {
            let (_, r) = builder.divmod(&instr.inputs[0], &instr.inputs[1])?;
            builder.extend(&r, out_bits, false)
        }
        InstrOp::Band | InstrOp::And => {
            builder.bitwise(qcl::Op::And, &instr.inputs[0], &instr.inputs[1], out_bits)?
        }
        InstrOp::Bor | InstrOp::Or => {
            builder.bitwise(qcl::Op::Or, &instr.inputs[0], &instr.inputs[1], out_bits)?
        }
        InstrOp::Bxor => {
            builder.bitwise(qcl::Op::Xor, &instr.inputs[0], &instr.inputs[1], out_bits)?
        }
        InstrOp::Not => builder.complement(&instr.inputs[0], out_bits)?,
        InstrOp::Lt => vec![builder.lt(&instr.inputs[0], &instr.inputs[1])?],
        InstrOp::Le => vec![builder.le(&instr.inputs[0], &instr.inputs[1])?],
        InstrOp::Gt => vec![builder.gt(&instr.inputs[0], &instr.inputs[1])?],
        InstrOp::Ge => vec![builder.ge(&instr.inputs[0], &instr.inputs[1])?],
        InstrOp::Eq => vec![builder.eq(&instr.inputs[0], &instr.inputs[1])?],
        InstrOp::Neq => vec![builder.neq(&instr.inputs[0], &instr.inputs[1])?],
        InstrOp::Lshift | InstrOp::Rshift | InstrOp::Srshift => {
            let count = instr.inputs[1]
                .const_int()
                .expect("shift count is not constant")
                .try_into()
                .unwrap_or(usize::MAX);
            let src = builder.value_wires(&instr.inputs[0]);
            shift_wires(instr.op, &src, count, out_bits)
        }
        InstrOp::Slice => {
            let from = const_index(instr, 1);
            let to = const_index(instr, 2);
            let src = builder.value_wires(&instr.inputs[0]);
            let mut wires: Vec<Wire> = (from..to)
                .map(|i| src.get(i).copied().unwrap_or(Wire::ZERO))
                .collect();
            wires.resize(out_bits, Wire::ZERO);
            wires
        }
        InstrOp::Mov => {
            let src = builder.value_wires(&instr.inputs[0]);
            builder.extend(&src, out_bits, false)
        }
        InstrOp::Smov => {
            let src = builder.value_wires(&instr.inputs[0]);
            builder.extend(&src, out_bits, true)
        }
        InstrOp::Amov => {
            let from = const_index(instr, 2);
            let to = const_index(instr, 3);
            let src = builder.value_wires(&instr.inputs[0]);
            let arr = builder.value_wires(&instr.inputs[1]);
            let src = builder.extend(&src, to - from, false);

            let mut wires = arr;
            wires.resize(out_bits.max(to), Wire::ZERO);
            wires[from..to].copy_from_slice(&src);
            wires.truncate(out_bits);
            wires
        }
        InstrOp::Phi => builder.phi(
            &instr.inputs[0],
            &instr.inputs[1],
            &instr.inputs[2],
            out_bits,
        )?,
        InstrOp::Builtin(BuiltinOp::Hamming) => {
            builder.hamming(&instr.inputs[0], &instr.inputs[1], out_bits)?
        }
        InstrOp::Circ => {
            let circ = instr.circ.as_ref().expect("circ instruction without circuit");
            inline_circuit(builder, circ, &instr.inputs)?
        }
        InstrOp::Gc => {
            let dead = builder.walloc.release(&instr.inputs[0]);
            for wire in dead {
                builder.sink.release(wire)?;
            }
            return Ok(());
        }
        InstrOp::Ret => {
            for value in &instr.inputs {
                output_wires.extend(builder.value_wires(value));
            }
            return Ok(());
        }
    };

    let out = instr.out.as_ref().expect("instruction without output");
    debug_assert_eq!(wires.len(), out_bits);
    builder.walloc.set_wires(out, wires);
    Ok(())
}

fn const_index(instr: &crate::ssa::Instr, slot: usize) -> usize {
    instr.inputs[slot]
        .const_int()
        .expect("index is not constant")
        .try_into()
        .expect("index out of range")
}

/// Constant shifts are wire rearrangement; no gates are emitted.
fn shift_wires(op: InstrOp, src: &[Wire], count: usize, out_bits: usize) -> Vec<Wire> {
    let mut wires = Vec::with_capacity(out_bits);
    match op {
        InstrOp::Lshift => {
            for i in 0..out_bits {
                wires.push(if i < count {
                    Wire::ZERO
                } else {
                    src.get(i - count).copied().unwrap_or(Wire::ZERO)
                });
            }
        }
        InstrOp::Rshift | InstrOp::Srshift => {
            let fill = if op == InstrOp::Srshift {
                src.last().copied().unwrap_or(Wire::ZERO)
            } else {
                Wire::ZERO
            };
            for i in 0..out_bits {
                wires.push(src.get(i + count).copied().unwrap_or(fill));
            }
        }
        _ => unreachable!(),
    }
    wires
}

/// Inline a parsed native circuit, remapping its wires into the
/// enclosing program.
fn inline_circuit<S: GateSink>(
    builder: &mut Builder<'_, S>,
    circ: &Circuit,
    args: &[crate::ssa::Value],
) -> Result<Vec<Wire>, CompileError> {
    let mut map: Vec<Wire> = vec![Wire::INVALID; circ.num_wires];
    map[Wire::ZERO.index()] = Wire::ZERO;
    map[Wire::ONE.index()] = Wire::ONE;

    // Argument wires feed the circuit inputs, zero-extended per
    // argument.
    let mut at = 2usize;
    for (io, arg) in circ.inputs.iter().zip(args) {
        let wires = builder.value_wires(arg);
        let wires = builder.extend(&wires, io.typ.bits() as usize, false);
        for wire in wires {
            map[at] = wire;
            at += 1;
        }
    }

    for gate in &circ.gates {
        let in0 = map[gate.input0.index()];
        let in1 = if gate.op == qcl::Op::Inv {
            Wire::INVALID
        } else {
            map[gate.input1.index()]
        };
        debug_assert!(in0 != Wire::INVALID);
        let out = builder.emit(gate.op, in0, in1)?;
        map[gate.output.index()] = out;
    }

    Ok(circ
        .output_wires
        .iter()
        .map(|w| map[w.index()])
        .collect())
}

/// Sink collecting gates for in-memory compilation.
#[derive(Default)]
pub struct CollectSink {
    pub gates: Vec<Gate>,
}

impl GateSink for CollectSink {
    fn gate(&mut self, gate: Gate) -> Result<(), CompileError> {
        self.gates.push(gate);
        Ok(())
    }

    fn release(&mut self, _wire: Wire) -> Result<(), CompileError> {
        // Nothing to free; the wire ids stay monotone.
        Ok(())
    }
}

/// Compile a program into an in-memory circuit.
pub fn compile_circuit(prog: &Program) -> Result<Circuit, CompileError> {
    let mut walloc = WireAllocator::new(2 + prog.inputs.size(), false);
    let mut sink = CollectSink::default();
    let lowered = lower(prog, &mut walloc, &mut sink)?;

    let mut circuit = Circuit {
        inputs: prog.inputs.clone(),
        outputs: prog.outputs.clone(),
        gates: sink.gates,
        output_wires: lowered.output_wires,
        num_wires: lowered.num_wires as usize,
        stats: lowered.stats,
    };
    circuit.assign_levels();
    Ok(circuit)
}
