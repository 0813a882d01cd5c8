//! Structural invariants checked over compiled programs and circuits.

use std::collections::{HashMap, HashSet};

use qcl::{Circuit, Op, Wire};
use qcl_compiler::ssa::{InstrOp, Program, ValueId};
use qcl_compiler::{Compiler, Params};

const PROGRAMS: &[&str] = &[
    "package main\nfunc main(a, b uint8) uint8 {\n\treturn a & b\n}\n",
    "package main\nfunc main(a, b uint4) uint5 {\n\treturn a + b\n}\n",
    "package main\nfunc main(a, b uint8) uint16 {\n\treturn a * b + a\n}\n",
    "package main\n\
     func main(c bool, a, b uint8) uint8 {\n\
     \tvar x uint8\n\
     \tif c {\n\t\tx = a + 1\n\t} else {\n\t\tx = b\n\t}\n\
     \treturn x\n}\n",
    "package main\n\
     func main(a, b uint8) (uint8, uint8) {\n\
     \tif a < b {\n\t\treturn b, a\n\t}\n\
     \treturn a, b\n}\n",
    "package main\n\
     func main(x uint4) ([6]uint4, int32) {\n\
     \tvar dst [6]uint4\n\
     \tvar src [3]uint4\n\
     \tsrc[0] = 1\n\tsrc[1] = 2\n\tsrc[2] = 3\n\
     \tn := copy(dst[2:5], src)\n\
     \treturn dst, n\n}\n",
    "package main\n\
     func main(a, b uint4) uint4 {\n\
     \treturn native(\"hamming\", a, b)\n}\n",
];

fn program(data: &str) -> Program {
    Compiler::new(Params::default())
        .program("test.qcl", data, &[])
        .unwrap()
}

fn circuit(data: &str) -> Circuit {
    Compiler::new(Params::default())
        .compile("test.qcl", data, &[])
        .unwrap()
}

/// Every non-constant input of a step is defined by an earlier step or
/// is a program parameter.
#[test]
fn ssa_soundness() {
    for data in PROGRAMS {
        let prog = program(data);
        let mut defined: HashSet<ValueId> = prog.params.iter().map(|p| p.id).collect();
        for step in &prog.steps {
            for input in &step.instr.inputs {
                if input.is_const() {
                    continue;
                }
                assert!(
                    defined.contains(&input.id),
                    "use of undefined value {input} in {}",
                    step.instr
                );
            }
            if let Some(out) = &step.instr.out {
                assert!(defined.insert(out.id), "value {out} defined twice");
            }
        }
    }
}

/// Gate inputs precede gate outputs in wire order, and each gate is
/// strictly deeper than the gates feeding it.
#[test]
fn circuit_is_a_topological_dag() {
    for data in PROGRAMS {
        let circ = circuit(data);
        let mut producer: HashMap<Wire, usize> = HashMap::new();
        for (idx, gate) in circ.gates.iter().enumerate() {
            for input in gate.inputs() {
                assert!(
                    input.0 < gate.output.0,
                    "gate {idx} input {input} does not precede output {}",
                    gate.output
                );
                if let Some(feeder) = producer.get(&input) {
                    assert!(
                        gate.level > circ.gates[*feeder].level,
                        "gate {idx} not deeper than its input gate {feeder}"
                    );
                }
            }
            producer.insert(gate.output, idx);
        }
    }
}

/// Exactly one gate writes each non-input wire.
#[test]
fn single_writer_wires() {
    for data in PROGRAMS {
        let circ = circuit(data);
        let mut writers: HashMap<Wire, usize> = HashMap::new();
        for gate in &circ.gates {
            *writers.entry(gate.output).or_default() += 1;
            assert!(
                gate.output.0 >= circ.first_internal_wire(),
                "gate writes reserved wire {}",
                gate.output
            );
        }
        for (wire, count) in writers {
            assert_eq!(count, 1, "wire {wire} written {count} times");
        }
    }
}

/// After a `Gc` step no later non-`Ret` step reads the released value
/// or anything aliased to it.
#[test]
fn gc_never_precedes_a_use() {
    for data in PROGRAMS {
        let prog = program(data);

        // Transitive wire-sharing groups, following the aliasing
        // opcodes both ways.
        let mut alias_of: HashMap<ValueId, Vec<ValueId>> = HashMap::new();
        for step in &prog.steps {
            if step.instr.op.is_aliasing() {
                let out = step.instr.out.as_ref().unwrap().id;
                for input in &step.instr.inputs {
                    if input.is_const() {
                        continue;
                    }
                    alias_of.entry(input.id).or_default().push(out);
                    alias_of.entry(out).or_default().push(input.id);
                }
            }
        }
        let group = |id: ValueId| -> HashSet<ValueId> {
            let mut seen = HashSet::new();
            let mut work = vec![id];
            while let Some(id) = work.pop() {
                if seen.insert(id) {
                    if let Some(next) = alias_of.get(&id) {
                        work.extend(next.iter().copied());
                    }
                }
            }
            seen
        };

        let mut released: HashSet<ValueId> = HashSet::new();
        for step in &prog.steps {
            match step.instr.op {
                InstrOp::Gc => {
                    released.extend(group(step.instr.inputs[0].id));
                }
                InstrOp::Ret => {}
                _ => {
                    for input in &step.instr.inputs {
                        assert!(
                            !released.contains(&input.id),
                            "{} reads released value {input}",
                            step.instr
                        );
                    }
                }
            }
        }
    }
}

/// Each released value is released exactly once.
#[test]
fn gc_releases_once() {
    for data in PROGRAMS {
        let prog = program(data);
        let mut released = HashSet::new();
        for step in &prog.steps {
            if step.instr.op == InstrOp::Gc {
                assert!(
                    released.insert(step.instr.inputs[0].id),
                    "double release of {}",
                    step.instr.inputs[0]
                );
            }
        }
    }
}

/// `Count` sums the per-op counters and `Cost` follows the free-XOR
/// convention.
#[test]
fn stats_count_and_cost() {
    for data in PROGRAMS {
        let circ = circuit(data);
        assert_eq!(circ.stats.count(), circ.gates.len() as u64);

        let mut by_op = [0u64; Op::COUNT];
        for gate in &circ.gates {
            by_op[gate.op as usize] += 1;
        }
        for op in Op::ALL {
            assert_eq!(circ.stats[op], by_op[op as usize], "{op}");
        }
        let expected_cost = 2 * (by_op[Op::And as usize] + by_op[Op::Inv as usize])
            + 3 * by_op[Op::Or as usize];
        assert_eq!(circ.cost(), expected_cost);
    }
}

/// Levels reported in the statistics match a recomputation.
#[test]
fn levels_match_recomputation() {
    for data in PROGRAMS {
        let circ = circuit(data);
        let mut recomputed = circ.clone();
        recomputed.assign_levels();
        assert_eq!(circ.stats.num_levels, recomputed.stats.num_levels);
        assert_eq!(circ.stats.max_width, recomputed.stats.max_width);
        for (a, b) in circ.gates.iter().zip(&recomputed.gates) {
            assert_eq!(a.level, b.level);
        }
    }
}
