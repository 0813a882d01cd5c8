//! Ripple-carry addition, subtraction and negation.

use qcl::Wire;

use super::{Builder, GateSink};
use crate::error::CompileError;
use crate::ssa::Value;

impl<S: GateSink> Builder<'_, S> {
    /// `(sum, carry)` of two bits.
    pub fn half_adder(&mut self, a: Wire, b: Wire) -> Result<(Wire, Wire), CompileError> {
        let sum = self.xor(a, b)?;
        let carry = self.and(a, b)?;
        Ok((sum, carry))
    }

    /// `(sum, carry)` of two bits and a carry-in.
    pub fn full_adder(&mut self, a: Wire, b: Wire, c: Wire) -> Result<(Wire, Wire), CompileError> {
        let axc = self.xor(a, c)?;
        let bxc = self.xor(b, c)?;
        let sum = self.xor(a, bxc)?;
        let t = self.and(axc, bxc)?;
        let carry = self.xor(c, t)?;
        Ok((sum, carry))
    }

    /// Ripple-carry sum of the operands, extended to `bits`; the final
    /// carry is dropped.
    pub fn add(&mut self, a: &Value, b: &Value, bits: usize) -> Result<Vec<Wire>, CompileError> {
        let aw = self.value_wires(a);
        let bw = self.value_wires(b);
        let aw = self.extend(&aw, bits, a.typ.is_signed());
        let bw = self.extend(&bw, bits, b.typ.is_signed());
        self.add_wires(&aw, &bw)
    }

    pub(super) fn add_wires(&mut self, aw: &[Wire], bw: &[Wire]) -> Result<Vec<Wire>, CompileError> {
        let mut out = Vec::with_capacity(aw.len());
        let mut carry = None;
        for (i, (x, y)) in aw.iter().zip(bw).enumerate() {
            let (sum, c) = match carry {
                None => self.half_adder(*x, *y)?,
                Some(c) => self.full_adder(*x, *y, c)?,
            };
            out.push(sum);
            if i + 1 < aw.len() {
                carry = Some(c);
            }
        }
        Ok(out)
    }

    /// `(diff, borrow)` of two bits.
    fn half_subtracter(&mut self, a: Wire, b: Wire) -> Result<(Wire, Wire), CompileError> {
        let diff = self.xor(a, b)?;
        let na = self.inv(a)?;
        let borrow = self.and(na, b)?;
        Ok((diff, borrow))
    }

    /// `(diff, borrow)` of two bits and a borrow-in.
    fn full_subtracter(&mut self, a: Wire, b: Wire, c: Wire) -> Result<(Wire, Wire), CompileError> {
        let bxa = self.xor(a, b)?;
        let bxc = self.xor(b, c)?;
        let diff = self.xor(bxa, c)?;
        let t = self.and(bxa, bxc)?;
        let borrow = self.xor(c, t)?;
        Ok((diff, borrow))
    }

    /// Borrow-propagating difference `a - b` at `bits` wide.
    pub fn sub(&mut self, a: &Value, b: &Value, bits: usize) -> Result<Vec<Wire>, CompileError> {
        let aw = self.value_wires(a);
        let bw = self.value_wires(b);
        let aw = self.extend(&aw, bits, a.typ.is_signed());
        let bw = self.extend(&bw, bits, b.typ.is_signed());
        Ok(self.sub_wires(&aw, &bw)?.0)
    }

    /// Difference and final borrow.
    pub(super) fn sub_wires(
        &mut self,
        aw: &[Wire],
        bw: &[Wire],
    ) -> Result<(Vec<Wire>, Wire), CompileError> {
        let mut out = Vec::with_capacity(aw.len());
        let mut borrow = None;
        for (x, y) in aw.iter().zip(bw) {
            let (diff, b) = match borrow {
                None => self.half_subtracter(*x, *y)?,
                Some(c) => self.full_subtracter(*x, *y, c)?,
            };
            out.push(diff);
            borrow = Some(b);
        }
        Ok((out, borrow.unwrap_or(Wire::ZERO)))
    }

    /// Two's complement negation.
    pub(super) fn neg_wires(&mut self, wires: &[Wire]) -> Result<Vec<Wire>, CompileError> {
        let inverted: Vec<Wire> = wires
            .iter()
            .map(|w| self.inv(*w))
            .collect::<Result<_, _>>()?;
        let one: Vec<Wire> = std::iter::once(Wire::ONE)
            .chain(std::iter::repeat(Wire::ZERO))
            .take(wires.len())
            .collect();
        self.add_wires(&inverted, &one)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ssa::{Generator, WireAllocator};
    use qcl::Type;

    /// Bind `bits`-wide inputs and run the builder body, returning the
    /// output wire values.
    fn run<F>(a_bits: u64, b_bits: u64, width: u32, out_width: usize, f: F) -> u64
    where
        F: FnOnce(&mut Builder<'_, TestSink>, &Value, &Value) -> Vec<Wire>,
    {
        let mut gen = Generator::new();
        let a = gen.new_val("a", Type::Uint(width), 1);
        let b = gen.new_val("b", Type::Uint(width), 1);

        let mut walloc = WireAllocator::new(2, false);
        let mut sink = TestSink::default();
        let mut builder = Builder::new(&mut walloc, &mut sink);
        let aw = builder.value_wires(&a);
        let bw = builder.value_wires(&b);
        let out = f(&mut builder, &a, &b);
        assert_eq!(out.len(), out_width);

        let mut inputs = Vec::new();
        for (i, w) in aw.iter().enumerate() {
            inputs.push((*w, a_bits >> i & 1 == 1));
        }
        for (i, w) in bw.iter().enumerate() {
            inputs.push((*w, b_bits >> i & 1 == 1));
        }
        let values = eval_gates(&sink.gates, walloc.num_wires() as usize, &inputs);
        out.iter()
            .enumerate()
            .fold(0u64, |acc, (i, w)| acc | (values[w.index()] as u64) << i)
    }

    #[test]
    fn add_with_carry_out() {
        // uint4 + uint4 at 5 bits: 15 + 1 = 16.
        let sum = run(15, 1, 4, 5, |b, x, y| b.add(x, y, 5).unwrap());
        assert_eq!(sum, 16);
    }

    #[test]
    fn add_exhaustive_3bit() {
        for a in 0..8u64 {
            for b in 0..8u64 {
                let sum = run(a, b, 3, 4, |bld, x, y| bld.add(x, y, 4).unwrap());
                assert_eq!(sum, a + b, "{a} + {b}");
            }
        }
    }

    #[test]
    fn sub_wraps_at_width() {
        for a in 0..8u64 {
            for b in 0..8u64 {
                let diff = run(a, b, 3, 3, |bld, x, y| bld.sub(x, y, 3).unwrap());
                assert_eq!(diff, (a.wrapping_sub(b)) & 7, "{a} - {b}");
            }
        }
    }

    #[test]
    fn neg_is_twos_complement() {
        for a in 0..16u64 {
            let neg = run(a, 0, 4, 4, |bld, x, _| {
                let aw = bld.value_wires(x);
                bld.neg_wires(&aw).unwrap()
            });
            assert_eq!(neg, a.wrapping_neg() & 15, "-{a}");
        }
    }
}
