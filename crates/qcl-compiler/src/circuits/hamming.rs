//! Hamming distance: population count of `a ^ b`.

use qcl::Wire;

use super::{Builder, GateSink};
use crate::error::CompileError;
use crate::ssa::Value;

impl<S: GateSink> Builder<'_, S> {
    /// Population count of the xor of the operands, summed with a
    /// balanced adder tree and resized to `bits`.
    pub fn hamming(&mut self, a: &Value, b: &Value, bits: usize) -> Result<Vec<Wire>, CompileError> {
        let width = (a.typ.bits().max(b.typ.bits()) as usize).max(1);
        let (aw, bw) = {
            let aw = self.value_wires(a);
            let bw = self.value_wires(b);
            (
                self.extend(&aw, width, a.typ.is_signed()),
                self.extend(&bw, width, b.typ.is_signed()),
            )
        };

        let mut terms: Vec<Vec<Wire>> = Vec::with_capacity(width);
        for (x, y) in aw.iter().zip(&bw) {
            terms.push(vec![self.xor(*x, *y)?]);
        }

        while terms.len() > 1 {
            let mut next = Vec::with_capacity(terms.len().div_ceil(2));
            let mut iter = terms.into_iter();
            while let Some(lhs) = iter.next() {
                match iter.next() {
                    Some(rhs) => {
                        let width = lhs.len().max(rhs.len()) + 1;
                        let lhs = self.extend(&lhs, width, false);
                        let rhs = self.extend(&rhs, width, false);
                        next.push(self.add_wires(&lhs, &rhs)?);
                    }
                    None => next.push(lhs),
                }
            }
            terms = next;
        }

        let count = terms.into_iter().next().unwrap_or_default();
        Ok(self.extend(&count, bits, false))
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ssa::{Generator, WireAllocator};
    use qcl::Type;

    fn hamming4(a_val: u64, b_val: u64) -> u64 {
        let mut gen = Generator::new();
        let a = gen.new_val("a", Type::Uint(4), 1);
        let b = gen.new_val("b", Type::Uint(4), 1);

        let mut walloc = WireAllocator::new(2, false);
        let mut sink = TestSink::default();
        let mut builder = Builder::new(&mut walloc, &mut sink);
        let aw = builder.value_wires(&a);
        let bw = builder.value_wires(&b);
        let out = builder.hamming(&a, &b, 4).unwrap();

        let mut inputs = Vec::new();
        for (i, w) in aw.iter().enumerate() {
            inputs.push((*w, a_val >> i & 1 == 1));
        }
        for (i, w) in bw.iter().enumerate() {
            inputs.push((*w, b_val >> i & 1 == 1));
        }
        let values = eval_gates(&sink.gates, walloc.num_wires() as usize, &inputs);
        out.iter()
            .enumerate()
            .fold(0u64, |acc, (i, w)| acc | (values[w.index()] as u64) << i)
    }

    #[test]
    fn hamming_exhaustive_4bit() {
        for a in 0..16u64 {
            for b in 0..16u64 {
                assert_eq!(hamming4(a, b), (a ^ b).count_ones() as u64, "{a} ^ {b}");
            }
        }
    }

    #[test]
    fn hamming_scenario() {
        // 0b1101 ^ 0b0111 = 0b1010, two set bits.
        assert_eq!(hamming4(0b1101, 0b0111), 2);
        assert_eq!(hamming4(0b1101, 0b0000), 3);
    }
}
