//! Linearized SSA programs: serialization, liveness and garbage
//! collection of dead value wires.

use std::fmt::Write as _;

use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use bitvec::prelude::*;
use qcl::IO;

use super::block::{BlockArena, BlockId};
use super::instr::{Instr, InstrOp};
use super::value::{Value, ValueId};

/// One program step: an instruction, an optional source label, and the
/// set of values live after the step (populated by the liveness pass).
#[derive(Debug, Clone)]
pub struct Step {
    pub label: Option<String>,
    pub instr: Instr,
    pub live: Option<HashSet<ValueId>>,
}

impl Step {
    fn new(label: Option<String>, instr: Instr) -> Step {
        Step {
            label,
            instr,
            live: None,
        }
    }
}

/// A linearized SSA program together with its I/O shape.
#[derive(Debug)]
pub struct Program {
    pub inputs: IO,
    pub outputs: IO,
    /// The SSA values of the main function's parameters, in input
    /// order; their wires are the circuit's input wires.
    pub params: Vec<Value>,
    /// Constants used by the program, sorted by name.
    pub constants: Vec<Value>,
    pub steps: Vec<Step>,
}

/// Linearize the CFG into steps in topological preorder: a block is
/// emitted only after all of its live predecessors, successors are
/// pushed fall-through first.
pub fn serialize(arena: &BlockArena, entry: BlockId) -> Vec<Step> {
    // Predecessor counts over reachable blocks only.
    let mut reachable = vec![false; arena.len()];
    let mut stack = vec![entry];
    while let Some(id) = stack.pop() {
        if reachable[id.0] {
            continue;
        }
        reachable[id.0] = true;
        stack.extend(arena.block(id).next);
        stack.extend(arena.block(id).branch);
    }

    let mut pending = vec![0usize; arena.len()];
    for id in 0..arena.len() {
        if !reachable[id] {
            continue;
        }
        let block = arena.block(BlockId(id));
        for succ in [block.next, block.branch].into_iter().flatten() {
            if succ != block.id {
                pending[succ.0] += 1;
            }
        }
    }
    // A block reached by both edges of the same predecessor counts
    // once.
    for id in 0..arena.len() {
        if !reachable[id] {
            continue;
        }
        let block = arena.block(BlockId(id));
        if let (Some(next), Some(branch)) = (block.next, block.branch) {
            if next == branch {
                pending[next.0] -= 1;
            }
        }
    }

    let mut code = Vec::new();
    let mut stack = vec![entry];
    let mut seen = vec![false; arena.len()];
    while let Some(id) = stack.pop() {
        if seen[id.0] {
            continue;
        }
        seen[id.0] = true;

        let block = arena.block(id);
        let mut label = if block.name.is_empty() {
            None
        } else {
            Some(block.name.clone())
        };
        for instr in &block.instr {
            code.push(Step::new(label.take(), instr.clone()));
        }

        let mut push = |succ: Option<BlockId>, stack: &mut Vec<BlockId>| {
            if let Some(succ) = succ {
                if succ != id {
                    pending[succ.0] -= 1;
                    if pending[succ.0] == 0 {
                        stack.push(succ);
                    }
                }
            }
        };
        // Branch is pushed last so the fall-through path pops first.
        push(block.branch, &mut stack);
        if block.next != block.branch {
            push(block.next, &mut stack);
        }
    }
    code
}

impl Program {
    pub fn new(inputs: IO, outputs: IO, params: Vec<Value>, constants: Vec<Value>,
               steps: Vec<Step>) -> Program {
        Program {
            inputs,
            outputs,
            params,
            constants,
            steps,
        }
    }

    /// Attach live-value sets to every step. Aliases are followed
    /// transitively: a value stays live while any alias of it is live.
    pub fn liveness(&mut self) {
        // `Slice`/`Mov` outputs alias their source; `Amov` aliases its
        // array operand only.
        let mut aliases: HashMap<ValueId, Value> = HashMap::new();
        for step in &self.steps {
            match step.instr.op {
                InstrOp::Slice | InstrOp::Mov | InstrOp::Smov => {
                    let src = &step.instr.inputs[0];
                    if !src.is_const() {
                        aliases.insert(step.instr.out.as_ref().unwrap().id, src.clone());
                    }
                }
                InstrOp::Amov => {
                    let arr = &step.instr.inputs[1];
                    if !arr.is_const() {
                        aliases.insert(step.instr.out.as_ref().unwrap().id, arr.clone());
                    }
                }
                _ => {}
            }
        }

        let mut live: HashMap<ValueId, Value> = HashMap::new();
        for step in self.steps.iter_mut().rev() {
            for input in &step.instr.inputs {
                if input.is_const() {
                    continue;
                }
                live.insert(input.id, input.clone());
            }
            if let Some(out) = &step.instr.out {
                live.remove(&out.id);
            }

            let mut step_live = HashSet::new();
            for value in live.values() {
                step_live.insert(value.id);
                let mut from = value.id;
                while let Some(to) = aliases.get(&from) {
                    step_live.insert(to.id);
                    from = to.id;
                }
            }
            step.live = Some(step_live);
        }
    }

    /// Insert `Gc` steps releasing every value's wires immediately
    /// after its last use, honoring aliases. The final step must be
    /// `Ret`; its inputs stay live to the end.
    pub fn gc(&mut self) {
        let last = self.steps.last().expect("empty program");
        if last.instr.op != InstrOp::Ret {
            panic!("last instruction is not return");
        }

        let mut set: BitVec = BitVec::new();
        let mut set_bit = |set: &mut BitVec, id: ValueId, bit: bool| {
            let idx = id.0 as usize;
            if idx >= set.len() {
                set.resize(idx + 1, false);
            }
            set.set(idx, bit);
        };
        let bit = |set: &BitVec, id: ValueId| -> bool {
            set.get(id.0 as usize).map(|b| *b).unwrap_or(false)
        };

        for input in &last.instr.inputs {
            set_bit(&mut set, input.id, true);
        }

        // Aliasing outputs keep all of their non-constant inputs
        // reachable; `id -> [alias ids]` with transitive closure below.
        let mut aliases: HashMap<ValueId, Vec<ValueId>> = HashMap::new();
        for step in &self.steps {
            if step.instr.op.is_aliasing() {
                let out = step.instr.out.as_ref().unwrap();
                for input in &step.instr.inputs {
                    if input.is_const() {
                        continue;
                    }
                    aliases.entry(input.id).or_default().push(out.id);
                }
            }
        }

        let mut steps: Vec<Step> = Vec::with_capacity(self.steps.len() * 2);
        for step in self.steps.drain(..).rev() {
            let mut gc: Vec<Step> = Vec::new();
            for input in &step.instr.inputs {
                if input.is_const() {
                    continue;
                }
                if !bit(&set, input.id) {
                    // Not live after this step; check aliases
                    // transitively before releasing.
                    let mut alive = false;
                    let mut work: Vec<ValueId> =
                        aliases.get(&input.id).cloned().unwrap_or_default();
                    let mut visited = HashSet::new();
                    while let Some(alias) = work.pop() {
                        if !visited.insert(alias) {
                            continue;
                        }
                        if bit(&set, alias) {
                            alive = true;
                            break;
                        }
                        if let Some(more) = aliases.get(&alias) {
                            work.extend(more.iter().copied());
                        }
                    }
                    if !alive {
                        gc.push(Step::new(None, Instr::gc(input.clone())));
                    }
                }
                set_bit(&mut set, input.id, true);
            }
            if let Some(out) = &step.instr.out {
                set_bit(&mut set, out.id, false);
            }

            // Releases come after the step in forward order; we are
            // walking backwards, so they are pushed first.
            steps.extend(gc);
            steps.push(step);
        }
        steps.reverse();
        self.steps = steps;
    }

    /// Pretty-print the program listing.
    pub fn pp(&self) -> String {
        let mut out = String::new();
        for (i, input) in self.inputs.iter().enumerate() {
            let _ = writeln!(out, "# Input{i}: {input}");
        }
        for (i, output) in self.outputs.iter().enumerate() {
            let _ = writeln!(out, "# Output{i}: {output}");
        }
        for step in &self.steps {
            if let Some(label) = &step.label {
                let _ = writeln!(out, "# {label}:");
            }
            let _ = writeln!(out, "\t{}", step.instr);
        }
        out
    }
}

/// Graphviz dot rendering of a CFG.
pub fn dot(arena: &BlockArena, entry: BlockId) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "digraph program {{");
    let _ = writeln!(out, "  node [shape=box fontname=\"Courier\" fontsize=\"10\"]");

    let mut seen = vec![false; arena.len()];
    let mut stack = vec![entry];
    let mut order = Vec::new();
    while let Some(id) = stack.pop() {
        if seen[id.0] {
            continue;
        }
        seen[id.0] = true;
        order.push(id);
        stack.extend(arena.block(id).next);
        stack.extend(arena.block(id).branch);
    }

    for id in &order {
        let block = arena.block(*id);
        let mut label = String::new();
        for instr in &block.instr {
            let _ = write!(label, "{instr}\\l");
        }
        let _ = writeln!(
            out,
            "  {} [label=\"{}\"]",
            block.id,
            label.replace('"', "\\\"")
        );
    }
    for id in &order {
        let block = arena.block(*id);
        if let Some(next) = block.next {
            let _ = writeln!(out, "  {} -> {next};", block.id);
        }
        if let Some(branch) = block.branch {
            let _ = writeln!(out, "  {} -> {branch} [label=\"true\"];", block.id);
        }
    }
    let _ = writeln!(out, "}}");
    out
}
