//! Restoring division.

use qcl::Wire;

use super::{Builder, GateSink};
use crate::error::CompileError;
use crate::ssa::Value;

impl<S: GateSink> Builder<'_, S> {
    /// `(quotient, remainder)` of the operands. Signed operands divide
    /// by magnitude with the usual sign rules (quotient negative when
    /// the signs differ, remainder takes the dividend's sign).
    pub fn divmod(&mut self, a: &Value, b: &Value) -> Result<(Vec<Wire>, Vec<Wire>), CompileError> {
        let signed = a.typ.is_signed() || b.typ.is_signed();
        let an = (a.typ.bits() as usize).max(1);
        let bn = (b.typ.bits() as usize).max(1);
        let aw = self.value_wires(a);
        let bw = self.value_wires(b);
        let aw = self.extend(&aw, an, a.typ.is_signed());
        let bw = self.extend(&bw, bn, b.typ.is_signed());

        if !signed {
            return self.udivmod(&aw, &bw);
        }

        let sa = aw[an - 1];
        let sb = bw[bn - 1];
        let abs_a = self.cond_neg(sa, &aw)?;
        let abs_b = self.cond_neg(sb, &bw)?;
        let (uq, ur) = self.udivmod(&abs_a, &abs_b)?;

        let sq = self.xor(sa, sb)?;
        let q = self.cond_neg(sq, &uq)?;
        let r = self.cond_neg(sa, &ur)?;
        Ok((q, r))
    }

    /// Unsigned restoring division: shift a dividend bit into the
    /// remainder, trial-subtract the divisor, keep the difference when
    /// it does not borrow.
    fn udivmod(&mut self, aw: &[Wire], bw: &[Wire]) -> Result<(Vec<Wire>, Vec<Wire>), CompileError> {
        let an = aw.len();
        let bn = bw.len();
        // One spare bit so the shifted remainder never overflows.
        let divisor = self.extend(bw, bn + 1, false);
        let mut rem: Vec<Wire> = vec![Wire::ZERO; bn + 1];
        let mut quot: Vec<Wire> = vec![Wire::ZERO; an];

        for i in (0..an).rev() {
            // rem = (rem << 1) | a[i]
            let mut shifted = Vec::with_capacity(bn + 1);
            shifted.push(aw[i]);
            shifted.extend_from_slice(&rem[..bn]);

            let (diff, borrow) = self.sub_wires(&shifted, &divisor)?;
            quot[i] = self.inv(borrow)?;
            rem = self.mux_wires(borrow, &shifted, &diff)?;
        }

        rem.truncate(bn);
        Ok((quot, rem))
    }
}
