//! Two-way multiplexers, the gate-level form of `Phi`.

use qcl::Wire;

use super::{Builder, GateSink};
use crate::error::CompileError;
use crate::ssa::Value;

impl<S: GateSink> Builder<'_, S> {
    /// `cond ? t : f` per bit: `f ^ (cond & (t ^ f))`, one AND and two
    /// XOR per bit.
    pub fn mux_wires(
        &mut self,
        cond: Wire,
        t: &[Wire],
        f: &[Wire],
    ) -> Result<Vec<Wire>, CompileError> {
        debug_assert_eq!(t.len(), f.len());
        let mut out = Vec::with_capacity(t.len());
        for (x, y) in t.iter().zip(f) {
            if x == y {
                out.push(*x);
                continue;
            }
            let d = self.xor(*x, *y)?;
            let g = self.and(cond, d)?;
            out.push(self.xor(*y, g)?);
        }
        Ok(out)
    }

    /// Phi lowering: select between the branch values extended to the
    /// output width.
    pub fn phi(
        &mut self,
        cond: &Value,
        t: &Value,
        f: &Value,
        bits: usize,
    ) -> Result<Vec<Wire>, CompileError> {
        let cond_w = self.value_wires(cond)[0];
        let tw = self.value_wires(t);
        let fw = self.value_wires(f);
        let tw = self.extend(&tw, bits, t.typ.is_signed());
        let fw = self.extend(&fw, bits, f.typ.is_signed());
        self.mux_wires(cond_w, &tw, &fw)
    }

    /// Conditionally negate: `cond ? -x : x`.
    pub(super) fn cond_neg(&mut self, cond: Wire, x: &[Wire]) -> Result<Vec<Wire>, CompileError> {
        let neg = self.neg_wires(x)?;
        self.mux_wires(cond, &neg, x)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ssa::{Generator, WireAllocator};
    use qcl::Type;

    #[test]
    fn phi_selects_by_condition() {
        for cond_bit in [false, true] {
            let mut gen = Generator::new();
            let c = gen.new_val("c", Type::Bool, 1);
            let a = gen.new_val("a", Type::Uint(4), 1);
            let b = gen.new_val("b", Type::Uint(4), 1);

            let mut walloc = WireAllocator::new(2, false);
            let mut sink = TestSink::default();
            let mut builder = Builder::new(&mut walloc, &mut sink);
            let cw = builder.value_wires(&c);
            let aw = builder.value_wires(&a);
            let bw = builder.value_wires(&b);
            let out = builder.phi(&c, &a, &b, 4).unwrap();

            let mut inputs = vec![(cw[0], cond_bit)];
            for (i, w) in aw.iter().enumerate() {
                inputs.push((*w, 7 >> i & 1 == 1));
            }
            for (i, w) in bw.iter().enumerate() {
                inputs.push((*w, 9 >> i & 1 == 1));
            }
            let values = eval_gates(&sink.gates, walloc.num_wires() as usize, &inputs);
            let got = out
                .iter()
                .enumerate()
                .fold(0u64, |acc, (i, w)| acc | (values[w.index()] as u64) << i);
            assert_eq!(got, if cond_bit { 7 } else { 9 });
        }
    }
}
