//! Wire allocation for SSA values.
//!
//! Every sized value maps to a vector of wires, one per bit. Constants
//! bind to the shared constant wires LSB first. Aliasing instructions
//! share wires between values, so wires are reference counted and a
//! wire returns to the free list only when its last referencing value
//! is released. Recycling is enabled in streaming mode; in-memory
//! compilation keeps allocation monotone so the circuit stays in
//! topological wire order.

use ahash::{HashMap, HashMapExt};
use qcl::Wire;

use super::value::{Value, ValueId};

pub struct WireAllocator {
    wires: HashMap<ValueId, Vec<Wire>>,
    refcount: Vec<u32>,
    next: u32,
    free: Vec<Wire>,
    recycle: bool,
}

impl WireAllocator {
    /// `first` is the first allocatable wire id, after the constant and
    /// primary input wires.
    pub fn new(first: u32, recycle: bool) -> WireAllocator {
        WireAllocator {
            wires: HashMap::new(),
            refcount: vec![0; first as usize],
            next: first,
            free: Vec::new(),
            recycle,
        }
    }

    /// Total number of wire ids handed out.
    pub fn num_wires(&self) -> u32 {
        self.next
    }

    /// Allocate one fresh wire.
    pub fn fresh(&mut self) -> Wire {
        if let Some(wire) = self.free.pop() {
            self.refcount[wire.index()] = 1;
            return wire;
        }
        let wire = Wire(self.next);
        self.next += 1;
        self.refcount.push(1);
        wire
    }

    pub fn allocated(&self, value: &Value) -> bool {
        self.wires.contains_key(&value.id)
    }

    /// The value's wires, allocating them if the value has none yet.
    /// Constants must be bound explicitly with [`Self::set_wires`].
    pub fn wires(&mut self, value: &Value) -> &[Wire] {
        if !self.wires.contains_key(&value.id) {
            let bits = value.typ.bits();
            let wires: Vec<Wire> = (0..bits).map(|_| self.fresh()).collect();
            self.wires.insert(value.id, wires);
        }
        &self.wires[&value.id]
    }

    /// Look up without allocating.
    pub fn get(&self, value: &Value) -> Option<&[Wire]> {
        self.wires.get(&value.id).map(|w| w.as_slice())
    }

    /// Bind a value to an explicit wire vector, sharing references with
    /// any other value the wires came from.
    pub fn set_wires(&mut self, value: &Value, wires: Vec<Wire>) {
        for wire in &wires {
            let idx = wire.index();
            if idx >= self.refcount.len() {
                self.refcount.resize(idx + 1, 0);
            }
            self.refcount[idx] = self.refcount[idx].saturating_add(1);
        }
        self.wires.insert(value.id, wires);
    }

    /// Release a value. Returns the wires whose last reference this
    /// was; in streaming mode those also go back to the free list.
    pub fn release(&mut self, value: &Value) -> Vec<Wire> {
        let Some(wires) = self.wires.remove(&value.id) else {
            return Vec::new();
        };
        let mut dead = Vec::new();
        for wire in wires {
            // Constant wires are never reclaimed.
            if wire.index() < 2 {
                continue;
            }
            let rc = &mut self.refcount[wire.index()];
            if *rc > 0 {
                *rc -= 1;
            }
            if *rc == 0 {
                dead.push(wire);
                if self.recycle {
                    self.free.push(wire);
                }
            }
        }
        dead
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssa::value::Generator;
    use qcl::Type;

    #[test]
    fn allocation_is_lazy_and_stable() {
        let mut gen = Generator::new();
        let mut walloc = WireAllocator::new(10, false);
        let v = gen.new_val("x", Type::Uint(4), 1);

        let wires: Vec<Wire> = walloc.wires(&v).to_vec();
        assert_eq!(wires, vec![Wire(10), Wire(11), Wire(12), Wire(13)]);
        assert_eq!(walloc.wires(&v).to_vec(), wires);
        assert_eq!(walloc.num_wires(), 14);
    }

    #[test]
    fn no_recycling_without_streaming() {
        let mut gen = Generator::new();
        let mut walloc = WireAllocator::new(2, false);
        let v = gen.new_val("x", Type::Uint(2), 1);
        walloc.wires(&v);
        let dead = walloc.release(&v);
        assert_eq!(dead.len(), 2);

        let w = gen.new_val("y", Type::Uint(1), 1);
        // Monotone: the released ids are not reused.
        assert_eq!(walloc.wires(&w), &[Wire(4)]);
    }

    #[test]
    fn recycling_reuses_released_wires() {
        let mut gen = Generator::new();
        let mut walloc = WireAllocator::new(2, true);
        let v = gen.new_val("x", Type::Uint(2), 1);
        walloc.wires(&v);
        walloc.release(&v);

        let w = gen.new_val("y", Type::Uint(2), 1);
        let mut reused = walloc.wires(&w).to_vec();
        reused.sort();
        assert_eq!(reused, vec![Wire(2), Wire(3)]);
        assert_eq!(walloc.num_wires(), 4);
    }

    #[test]
    fn shared_wires_survive_partial_release() {
        let mut gen = Generator::new();
        let mut walloc = WireAllocator::new(2, true);
        let src = gen.new_val("src", Type::Uint(4), 1);
        let src_wires = walloc.wires(&src).to_vec();

        // An alias sharing the low half.
        let alias = gen.anon_val(Type::Uint(2));
        walloc.set_wires(&alias, src_wires[..2].to_vec());

        // Releasing the source keeps the shared wires alive.
        let dead = walloc.release(&src);
        assert_eq!(dead, vec![src_wires[2], src_wires[3]]);

        let dead = walloc.release(&alias);
        assert_eq!(dead, vec![src_wires[0], src_wires[1]]);
    }
}
