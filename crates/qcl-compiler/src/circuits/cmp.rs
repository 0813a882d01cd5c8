//! Comparators.

use qcl::Wire;

use super::{Builder, GateSink};
use crate::error::CompileError;
use crate::ssa::Value;

impl<S: GateSink> Builder<'_, S> {
    /// `a < b`. Signed when either operand's type is signed.
    pub fn lt(&mut self, a: &Value, b: &Value) -> Result<Wire, CompileError> {
        let bits = (a.typ.bits().max(b.typ.bits()) as usize).max(1);
        let signed = a.typ.is_signed() || b.typ.is_signed();
        let aw = self.value_wires(a);
        let bw = self.value_wires(b);
        let mut aw = self.extend(&aw, bits, a.typ.is_signed());
        let mut bw = self.extend(&bw, bits, b.typ.is_signed());
        if signed {
            // Offset-binary: flipping the sign bits turns signed order
            // into unsigned order.
            let last = bits - 1;
            aw[last] = self.inv(aw[last])?;
            bw[last] = self.inv(bw[last])?;
        }
        self.lt_wires(&aw, &bw)
    }

    /// Unsigned `a < b`: the final borrow of `a - b`.
    fn lt_wires(&mut self, aw: &[Wire], bw: &[Wire]) -> Result<Wire, CompileError> {
        let mut borrow: Option<Wire> = None;
        for (x, y) in aw.iter().zip(bw) {
            borrow = Some(match borrow {
                None => {
                    let nx = self.inv(*x)?;
                    self.and(nx, *y)?
                }
                Some(c) => {
                    let bxa = self.xor(*x, *y)?;
                    let bxc = self.xor(*y, c)?;
                    let t = self.and(bxa, bxc)?;
                    self.xor(c, t)?
                }
            });
        }
        Ok(borrow.unwrap_or(Wire::ZERO))
    }

    pub fn le(&mut self, a: &Value, b: &Value) -> Result<Wire, CompileError> {
        let gt = self.lt(b, a)?;
        self.inv(gt)
    }

    pub fn gt(&mut self, a: &Value, b: &Value) -> Result<Wire, CompileError> {
        self.lt(b, a)
    }

    pub fn ge(&mut self, a: &Value, b: &Value) -> Result<Wire, CompileError> {
        let lt = self.lt(a, b)?;
        self.inv(lt)
    }

    /// `a == b`: XNOR per bit, conjoined pairwise.
    pub fn eq(&mut self, a: &Value, b: &Value) -> Result<Wire, CompileError> {
        let bits = (a.typ.bits().max(b.typ.bits()) as usize).max(1);
        let aw = self.value_wires(a);
        let bw = self.value_wires(b);
        let aw = self.extend(&aw, bits, a.typ.is_signed());
        let bw = self.extend(&bw, bits, b.typ.is_signed());

        let mut acc: Vec<Wire> = aw
            .iter()
            .zip(&bw)
            .map(|(x, y)| self.xnor(*x, *y))
            .collect::<Result<_, _>>()?;
        while acc.len() > 1 {
            let mut next = Vec::with_capacity(acc.len().div_ceil(2));
            for pair in acc.chunks(2) {
                next.push(if pair.len() == 2 {
                    self.and(pair[0], pair[1])?
                } else {
                    pair[0]
                });
            }
            acc = next;
        }
        Ok(acc[0])
    }

    pub fn neq(&mut self, a: &Value, b: &Value) -> Result<Wire, CompileError> {
        let eq = self.eq(a, b)?;
        self.inv(eq)
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::ssa::{Generator, WireAllocator};
    use qcl::Type;

    fn run_cmp<F>(a_val: i64, b_val: i64, typ: Type, f: F) -> bool
    where
        F: FnOnce(&mut Builder<'_, TestSink>, &Value, &Value) -> Wire,
    {
        let mut gen = Generator::new();
        let a = gen.new_val("a", typ.clone(), 1);
        let b = gen.new_val("b", typ.clone(), 1);

        let mut walloc = WireAllocator::new(2, false);
        let mut sink = TestSink::default();
        let mut builder = Builder::new(&mut walloc, &mut sink);
        let aw = builder.value_wires(&a);
        let bw = builder.value_wires(&b);
        let out = f(&mut builder, &a, &b);

        let mut inputs = Vec::new();
        for (i, w) in aw.iter().enumerate() {
            inputs.push((*w, a_val >> i & 1 == 1));
        }
        for (i, w) in bw.iter().enumerate() {
            inputs.push((*w, b_val >> i & 1 == 1));
        }
        let values = eval_gates(&sink.gates, walloc.num_wires() as usize, &inputs);
        values[out.index()]
    }

    #[test]
    fn unsigned_comparisons_exhaustive() {
        for a in 0..8i64 {
            for b in 0..8i64 {
                assert_eq!(
                    run_cmp(a, b, Type::Uint(3), |bld, x, y| bld.lt(x, y).unwrap()),
                    a < b,
                    "{a} < {b}"
                );
                assert_eq!(
                    run_cmp(a, b, Type::Uint(3), |bld, x, y| bld.le(x, y).unwrap()),
                    a <= b
                );
                assert_eq!(
                    run_cmp(a, b, Type::Uint(3), |bld, x, y| bld.gt(x, y).unwrap()),
                    a > b
                );
                assert_eq!(
                    run_cmp(a, b, Type::Uint(3), |bld, x, y| bld.ge(x, y).unwrap()),
                    a >= b
                );
                assert_eq!(
                    run_cmp(a, b, Type::Uint(3), |bld, x, y| bld.eq(x, y).unwrap()),
                    a == b
                );
                assert_eq!(
                    run_cmp(a, b, Type::Uint(3), |bld, x, y| bld.neq(x, y).unwrap()),
                    a != b
                );
            }
        }
    }

    #[test]
    fn signed_comparisons_exhaustive() {
        for a in -4..4i64 {
            for b in -4..4i64 {
                assert_eq!(
                    run_cmp(a, b, Type::Int(3), |bld, x, y| bld.lt(x, y).unwrap()),
                    a < b,
                    "{a} < {b} signed"
                );
                assert_eq!(
                    run_cmp(a, b, Type::Int(3), |bld, x, y| bld.ge(x, y).unwrap()),
                    a >= b
                );
            }
        }
    }
}
