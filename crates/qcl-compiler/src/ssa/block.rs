//! Basic blocks, bindings and return-binding resolution.
//!
//! Blocks live in a program-scoped arena and reference each other by
//! index, so back-edges stay non-owning. Return-binding resolution
//! walks the CFG on an explicit work stack with three continuation
//! phases, so deeply nested branches cannot overflow the call stack.

use std::fmt;

use ahash::{HashMap, HashMapExt};
use qcl::Type;

use super::instr::Instr;
use super::value::{Generator, Value};

/// Index of a block in its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub usize);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "l{}", self.0)
    }
}

/// What a name is bound to: a concrete SSA value, or a pending merge
/// that materializes a Phi in the block that first reads it.
#[derive(Debug, Clone)]
pub enum Bound {
    Value(Value),
    Select {
        cond: Value,
        typ: Type,
        t: Box<Bound>,
        f: Box<Bound>,
    },
}

impl Bound {
    fn as_value(&self) -> Option<&Value> {
        match self {
            Bound::Value(v) => Some(v),
            Bound::Select { .. } => None,
        }
    }
}

/// Variable bindings inside a block: binding key to current bound
/// value.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    map: HashMap<String, Bound>,
}

impl Bindings {
    pub fn new() -> Bindings {
        Bindings::default()
    }

    pub fn get(&self, key: &str) -> Option<&Bound> {
        self.map.get(key)
    }

    pub fn set(&mut self, key: String, value: Value) {
        self.map.insert(key, Bound::Value(value));
    }

    pub fn set_bound(&mut self, key: String, bound: Bound) {
        self.map.insert(key, bound);
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.map.keys()
    }
}

/// A basic block. A block with both `next` and `branch` is a branching
/// block taking `branch` when `branch_cond` is true; one with neither
/// is terminal and must end in `Ret`.
#[derive(Debug)]
pub struct Block {
    pub id: BlockId,
    pub name: String,
    pub from: Vec<BlockId>,
    pub next: Option<BlockId>,
    pub branch: Option<BlockId>,
    pub branch_cond: Option<Value>,
    pub instr: Vec<Instr>,
    pub bindings: Bindings,
    pub dead: bool,
    pub processed: bool,
}

/// Program-scoped block arena.
#[derive(Debug, Default)]
pub struct BlockArena {
    blocks: Vec<Block>,
}

impl BlockArena {
    pub fn new() -> BlockArena {
        BlockArena::default()
    }

    pub fn add(&mut self, name: impl Into<String>, bindings: Bindings) -> BlockId {
        let id = BlockId(self.blocks.len());
        self.blocks.push(Block {
            id,
            name: name.into(),
            from: Vec::new(),
            next: None,
            branch: None,
            branch_cond: None,
            instr: Vec::new(),
            bindings,
            dead: false,
            processed: false,
        });
        id
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.0]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.0]
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Set the fall-through edge. Re-setting to the same block is a
    /// no-op; changing an established edge is a compiler bug.
    pub fn set_next(&mut self, block: BlockId, o: BlockId) {
        let current = self.blocks[block.0].next;
        if let Some(current) = current {
            if current != o {
                panic!("{block}.next already set to {current}, now setting to {o}");
            }
        }
        self.blocks[block.0].next = Some(o);
        self.add_from(o, block);
    }

    /// Set the branch-taken edge.
    pub fn set_branch(&mut self, block: BlockId, o: BlockId) {
        let current = self.blocks[block.0].branch;
        if let Some(current) = current {
            if current != o {
                panic!("{block}.branch already set to {current}, now setting to {o}");
            }
        }
        self.blocks[block.0].branch = Some(o);
        self.add_from(o, block);
    }

    fn add_from(&mut self, block: BlockId, from: BlockId) {
        let froms = &mut self.blocks[block.0].from;
        if !froms.contains(&from) {
            froms.push(from);
        }
    }

    pub fn add_instr(&mut self, block: BlockId, instr: Instr) {
        instr.check();
        self.blocks[block.0].instr.push(instr);
    }

    /// Turn a bound value into a concrete SSA value, materializing any
    /// pending merge as a Phi in `block`.
    pub fn materialize(&mut self, bound: &Bound, block: BlockId, gen: &mut Generator) -> Value {
        match bound {
            Bound::Value(v) => v.clone(),
            Bound::Select { cond, typ, t, f } => {
                let vt = self.materialize(t, block, gen);
                let vf = self.materialize(f, block, gen);
                if vt.equal(&vf) {
                    return vt;
                }
                let out = gen.anon_val(typ.clone());
                self.add_instr(block, Instr::phi(cond.clone(), vt, vf, out.clone()));
                out
            }
        }
    }

    /// Merge the branch-exit bindings of a branching block into its
    /// join block. Names whose values agree stay concrete; names that
    /// diverge become pending merges resolved lazily on first read.
    /// Already-pending operands are materialized in the join so merges
    /// never nest more than one level.
    pub fn merge_bindings(
        &mut self,
        cond: &Value,
        t_block: BlockId,
        f_block: BlockId,
        join: BlockId,
        gen: &mut Generator,
    ) {
        let keys: Vec<String> = self
            .block(t_block)
            .bindings
            .keys()
            .filter(|k| self.block(f_block).bindings.get(k).is_some())
            .cloned()
            .collect();

        for key in keys {
            let tb = self.block(t_block).bindings.get(&key).cloned().unwrap();
            let fb = self.block(f_block).bindings.get(&key).cloned().unwrap();

            let merged = match (tb.as_value(), fb.as_value()) {
                (Some(tv), Some(fv)) if tv.equal(fv) => Bound::Value(tv.clone()),
                _ => {
                    let tv = self.materialize(&tb, join, gen);
                    let fv = self.materialize(&fb, join, gen);
                    if tv.equal(&fv) {
                        Bound::Value(tv)
                    } else {
                        let typ = if tv.typ.bits() > fv.typ.bits() {
                            tv.typ.clone()
                        } else {
                            fv.typ.clone()
                        };
                        Bound::Select {
                            cond: cond.clone(),
                            typ,
                            t: Box::new(Bound::Value(tv)),
                            f: Box::new(Bound::Value(fv)),
                        }
                    }
                }
            };
            self.block_mut(join).bindings.set_bound(key, merged);
        }
    }

    /// Mark blocks unreachable from `entry` as dead.
    pub fn mark_dead(&mut self, entry: BlockId) {
        let mut reachable = vec![false; self.blocks.len()];
        let mut stack = vec![entry];
        while let Some(id) = stack.pop() {
            if reachable[id.0] {
                continue;
            }
            reachable[id.0] = true;
            let block = &self.blocks[id.0];
            stack.extend(block.next);
            stack.extend(block.branch);
        }
        for block in &mut self.blocks {
            block.dead = !reachable[block.id.0];
        }
    }
}

/// Cached result of one return-binding resolution.
#[derive(Debug, Clone)]
struct RbValue {
    v: Option<Value>,
    diff: bool,
}

/// Memoization context for return-binding resolution, keyed by
/// `(block, name)` so repeated walks stay linear in CFG size.
#[derive(Default)]
pub struct ReturnBindingCtx {
    cache: HashMap<(BlockId, String), RbValue>,
}

impl ReturnBindingCtx {
    pub fn new() -> ReturnBindingCtx {
        ReturnBindingCtx::default()
    }

    fn get(&self, block: BlockId, name: &str) -> Option<&RbValue> {
        self.cache.get(&(block, name.to_string()))
    }

    fn set(&mut self, block: BlockId, name: &str, value: RbValue) {
        self.cache.insert((block, name.to_string()), value);
    }
}

/// Continuation of a resolution frame: what to do with the computed
/// value of the frame's block on behalf of its parent.
enum Cont {
    /// The root request; the final registers are the answer.
    Root,
    /// Phase 1: the block is the `next` child of a sequential parent.
    SeqNext { parent: BlockId },
    /// Phase 2: the block is the `branch` child of a branching parent.
    BranchTrue { parent: BlockId },
    /// Phase 3: the block is the `next` child of a branching parent
    /// whose branch subtree already produced `v_true`.
    BranchFalse {
        parent: BlockId,
        v_true: Value,
        diff_true: bool,
    },
}

struct Frame {
    block: BlockId,
    cont: Cont,
}

impl BlockArena {
    /// Resolve the value of `name` observable after `block`'s subtree,
    /// materializing Phi instructions in `ret_block` where the branches
    /// of a block disagree. Returns the value and a `diff` bit that is
    /// true when any merge joined values of different widths.
    pub fn return_binding(
        &mut self,
        ctx: &mut ReturnBindingCtx,
        block: BlockId,
        name: &str,
        ret_block: BlockId,
        gen: &mut Generator,
    ) -> (Option<Value>, bool) {
        // Registers carrying the value of the most recently completed
        // frame.
        let mut v: Option<Value> = None;
        let mut diff = false;

        let mut stack = vec![Frame {
            block,
            cont: Cont::Root,
        }];

        while let Some(frame) = stack.pop() {
            let b = frame.block;

            if let Some(cached) = ctx.get(b, name) {
                v = cached.v.clone();
                diff = cached.diff;
            } else {
                let (next, branch) = {
                    let blk = self.block(b);
                    (blk.next, blk.branch)
                };
                match (next, branch) {
                    // Sequential block: the value is the latest binding
                    // reachable along `next`.
                    (next, branch) if branch.is_none() || next == branch => {
                        if let Some(next) = next {
                            stack.push(frame);
                            stack.push(Frame {
                                block: next,
                                cont: Cont::SeqNext { parent: b },
                            });
                            continue;
                        }
                        v = self.local_binding(b, name, ret_block, gen);
                        diff = false;
                        ctx.set(
                            b,
                            name,
                            RbValue {
                                v: v.clone(),
                                diff: false,
                            },
                        );
                    }
                    // Branching block: resolve the branch subtree
                    // first, then the fall-through subtree.
                    (_, Some(branch)) => {
                        stack.push(frame);
                        stack.push(Frame {
                            block: branch,
                            cont: Cont::BranchTrue { parent: b },
                        });
                        continue;
                    }
                    _ => unreachable!(),
                }
            }

            // Apply the continuation to the parent.
            match frame.cont {
                Cont::Root => {}
                Cont::SeqNext { parent } => {
                    if v.is_none() {
                        // Nothing bound downstream; fall back to the
                        // parent's own bindings.
                        v = self.local_binding(parent, name, ret_block, gen);
                        diff = false;
                    }
                    ctx.set(
                        parent,
                        name,
                        RbValue {
                            v: v.clone(),
                            diff,
                        },
                    );
                }
                Cont::BranchTrue { parent } => match v.clone() {
                    None => {
                        ctx.set(
                            parent,
                            name,
                            RbValue {
                                v: None,
                                diff: false,
                            },
                        );
                        diff = false;
                    }
                    Some(v_true) => {
                        let next = self
                            .block(parent)
                            .next
                            .expect("branching block without fall-through");
                        stack.push(Frame {
                            block: next,
                            cont: Cont::BranchFalse {
                                parent,
                                v_true,
                                diff_true: diff,
                            },
                        });
                        continue;
                    }
                },
                Cont::BranchFalse {
                    parent,
                    v_true,
                    diff_true,
                } => match v.clone() {
                    None => {
                        ctx.set(
                            parent,
                            name,
                            RbValue {
                                v: None,
                                diff: false,
                            },
                        );
                        diff = false;
                    }
                    Some(v_false) if v_true.equal(&v_false) => {
                        diff = diff_true || diff;
                        v = Some(v_true);
                        ctx.set(
                            parent,
                            name,
                            RbValue {
                                v: v.clone(),
                                diff,
                            },
                        );
                    }
                    Some(v_false) => {
                        let r_type: Type = if v_true.typ.bits() > v_false.typ.bits() {
                            v_true.typ.clone()
                        } else {
                            v_false.typ.clone()
                        };
                        let merged = gen.anon_val(r_type);
                        let cond = self
                            .block(parent)
                            .branch_cond
                            .clone()
                            .expect("branching block without condition");
                        self.add_instr(
                            ret_block,
                            Instr::phi(cond, v_true.clone(), v_false.clone(), merged.clone()),
                        );

                        diff = v_true.typ.bits() != v_false.typ.bits() || diff_true || diff;
                        v = Some(merged);
                        ctx.set(
                            parent,
                            name,
                            RbValue {
                                v: v.clone(),
                                diff,
                            },
                        );
                    }
                },
            }
        }

        (v, diff)
    }

    fn local_binding(
        &mut self,
        block: BlockId,
        name: &str,
        ret_block: BlockId,
        gen: &mut Generator,
    ) -> Option<Value> {
        let bound = self.block(block).bindings.get(name).cloned()?;
        Some(self.materialize(&bound, ret_block, gen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssa::instr::InstrOp;

    fn val(gen: &mut Generator, name: &str, bits: u32) -> Value {
        gen.new_val(name, Type::Uint(bits), 1)
    }

    /// entry -> (branch: t, next: f), both -> join (terminal).
    fn diamond(arena: &mut BlockArena, gen: &mut Generator) -> (BlockId, BlockId, BlockId, BlockId) {
        let entry = arena.add("", Bindings::new());
        let t = arena.add("", Bindings::new());
        let f = arena.add("", Bindings::new());
        let join = arena.add("", Bindings::new());

        let cond = val(gen, "c", 1);
        arena.block_mut(entry).branch_cond = Some(cond);
        arena.set_branch(entry, t);
        arena.set_next(entry, f);
        arena.set_next(t, join);
        arena.set_next(f, join);
        (entry, t, f, join)
    }

    #[test]
    fn sequential_chain_finds_deep_binding() {
        let mut arena = BlockArena::new();
        let mut gen = Generator::new();

        let b0 = arena.add("", Bindings::new());
        let b1 = arena.add("", Bindings::new());
        let b2 = arena.add("", Bindings::new());
        arena.set_next(b0, b1);
        arena.set_next(b1, b2);

        let x = val(&mut gen, "x", 8);
        arena
            .block_mut(b2)
            .bindings
            .set("x@1".to_string(), x.clone());

        let ret = arena.add("", Bindings::new());
        let mut ctx = ReturnBindingCtx::new();
        let (v, diff) = arena.return_binding(&mut ctx, b0, "x@1", ret, &mut gen);
        assert!(v.unwrap().equal(&x));
        assert!(!diff);
    }

    #[test]
    fn diverging_branches_materialize_a_phi() {
        let mut arena = BlockArena::new();
        let mut gen = Generator::new();
        let (entry, t, f, _join) = diamond(&mut arena, &mut gen);

        let a = val(&mut gen, "x", 8);
        let b = val(&mut gen, "x", 8);
        arena
            .block_mut(t)
            .bindings
            .set("x@1".to_string(), a.clone());
        arena
            .block_mut(f)
            .bindings
            .set("x@1".to_string(), b.clone());

        let ret = arena.add("", Bindings::new());
        let mut ctx = ReturnBindingCtx::new();
        let (v, diff) = arena.return_binding(&mut ctx, entry, "x@1", ret, &mut gen);
        let v = v.unwrap();
        assert!(!v.equal(&a) && !v.equal(&b));
        assert!(!diff);

        let phis: Vec<_> = arena
            .block(ret)
            .instr
            .iter()
            .filter(|i| i.op == InstrOp::Phi)
            .collect();
        assert_eq!(phis.len(), 1);
        assert!(phis[0].inputs[1].equal(&a));
        assert!(phis[0].inputs[2].equal(&b));
    }

    #[test]
    fn agreeing_branches_emit_no_phi() {
        let mut arena = BlockArena::new();
        let mut gen = Generator::new();
        let (entry, t, f, _join) = diamond(&mut arena, &mut gen);

        let x = val(&mut gen, "x", 8);
        arena
            .block_mut(t)
            .bindings
            .set("x@1".to_string(), x.clone());
        arena
            .block_mut(f)
            .bindings
            .set("x@1".to_string(), x.clone());

        let ret = arena.add("", Bindings::new());
        let mut ctx = ReturnBindingCtx::new();
        let (v, _) = arena.return_binding(&mut ctx, entry, "x@1", ret, &mut gen);
        assert!(v.unwrap().equal(&x));
        assert!(arena.block(ret).instr.is_empty());
    }

    #[test]
    fn width_mismatch_sets_diff_and_widens() {
        let mut arena = BlockArena::new();
        let mut gen = Generator::new();
        let (entry, t, f, _join) = diamond(&mut arena, &mut gen);

        let narrow = val(&mut gen, "x", 4);
        let wide = val(&mut gen, "x", 8);
        arena
            .block_mut(t)
            .bindings
            .set("x@1".to_string(), narrow.clone());
        arena
            .block_mut(f)
            .bindings
            .set("x@1".to_string(), wide.clone());

        let ret = arena.add("", Bindings::new());
        let mut ctx = ReturnBindingCtx::new();
        let (v, diff) = arena.return_binding(&mut ctx, entry, "x@1", ret, &mut gen);
        assert!(diff);
        assert_eq!(v.unwrap().typ.bits(), 8);
    }

    /// Resolving twice yields the same SSA id and no second Phi.
    #[test]
    fn resolution_is_idempotent() {
        let mut arena = BlockArena::new();
        let mut gen = Generator::new();
        let (entry, t, f, _join) = diamond(&mut arena, &mut gen);

        let a = val(&mut gen, "x", 8);
        let b = val(&mut gen, "x", 8);
        arena.block_mut(t).bindings.set("x@1".to_string(), a);
        arena.block_mut(f).bindings.set("x@1".to_string(), b);

        let ret = arena.add("", Bindings::new());
        let mut ctx = ReturnBindingCtx::new();
        let (first, _) = arena.return_binding(&mut ctx, entry, "x@1", ret, &mut gen);
        let (second, _) = arena.return_binding(&mut ctx, entry, "x@1", ret, &mut gen);
        assert_eq!(first.unwrap().id, second.unwrap().id);
        assert_eq!(
            arena
                .block(ret)
                .instr
                .iter()
                .filter(|i| i.op == InstrOp::Phi)
                .count(),
            1
        );
    }

    /// Deep nesting must not overflow the call stack.
    #[test]
    fn deep_nest_resolves_iteratively() {
        let mut arena = BlockArena::new();
        let mut gen = Generator::new();

        let entry = arena.add("", Bindings::new());
        let mut tail = entry;
        for _ in 0..50_000 {
            let t = arena.add("", Bindings::new());
            let join = arena.add("", Bindings::new());
            let cond = val(&mut gen, "c", 1);
            arena.block_mut(tail).branch_cond = Some(cond);
            arena.set_branch(tail, t);
            arena.set_next(tail, join);
            arena.set_next(t, join);
            arena
                .block_mut(t)
                .bindings
                .set("x@1".to_string(), val(&mut gen, "x", 8));
            arena
                .block_mut(join)
                .bindings
                .set("x@1".to_string(), val(&mut gen, "x", 8));
            tail = join;
        }

        let ret = arena.add("", Bindings::new());
        let mut ctx = ReturnBindingCtx::new();
        let (v, _) = arena.return_binding(&mut ctx, entry, "x@1", ret, &mut gen);
        assert!(v.is_some());
    }

    #[test]
    fn pending_merges_materialize_on_read() {
        let mut arena = BlockArena::new();
        let mut gen = Generator::new();
        let (_entry, t, f, join) = diamond(&mut arena, &mut gen);

        let a = val(&mut gen, "x", 8);
        let b = val(&mut gen, "x", 8);
        arena.block_mut(t).bindings.set("x@1".to_string(), a);
        arena.block_mut(f).bindings.set("x@1".to_string(), b);

        let cond = val(&mut gen, "c", 1);
        arena.merge_bindings(&cond, t, f, join, &mut gen);

        // The merge itself emits nothing.
        assert!(arena.block(join).instr.is_empty());

        // The first read materializes exactly one Phi.
        let bound = arena.block(join).bindings.get("x@1").cloned().unwrap();
        let v = arena.materialize(&bound, join, &mut gen);
        assert_eq!(v.typ.bits(), 8);
        assert_eq!(arena.block(join).instr.len(), 1);
        assert_eq!(arena.block(join).instr[0].op, InstrOp::Phi);
    }

    #[test]
    #[should_panic(expected = "already set")]
    fn resetting_next_to_a_different_block_panics() {
        let mut arena = BlockArena::new();
        let a = arena.add("", Bindings::new());
        let b = arena.add("", Bindings::new());
        let c = arena.add("", Bindings::new());
        arena.set_next(a, b);
        arena.set_next(a, c);
    }

    #[test]
    fn resetting_next_to_the_same_block_is_idempotent() {
        let mut arena = BlockArena::new();
        let a = arena.add("", Bindings::new());
        let b = arena.add("", Bindings::new());
        arena.set_next(a, b);
        arena.set_next(a, b);
        assert_eq!(arena.block(b).from, vec![a]);
    }

    #[test]
    fn mark_dead_flags_unreachable_blocks() {
        let mut arena = BlockArena::new();
        let entry = arena.add("", Bindings::new());
        let live = arena.add("", Bindings::new());
        let orphan = arena.add("", Bindings::new());
        arena.set_next(entry, live);
        arena.mark_dead(entry);
        assert!(!arena.block(entry).dead);
        assert!(!arena.block(live).dead);
        assert!(arena.block(orphan).dead);
    }
}
