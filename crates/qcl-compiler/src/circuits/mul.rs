//! Shift-and-add multiplication.

use qcl::Wire;

use super::{Builder, GateSink};
use crate::error::CompileError;
use crate::ssa::Value;

impl<S: GateSink> Builder<'_, S> {
    /// Schoolbook product truncated to `bits`.
    pub fn mul(&mut self, a: &Value, b: &Value, bits: usize) -> Result<Vec<Wire>, CompileError> {
        let aw = self.value_wires(a);
        let bw = self.value_wires(b);

        let mut acc: Option<Vec<Wire>> = None;
        for (i, y) in bw.iter().enumerate() {
            if i >= bits {
                break;
            }
            // Partial product of `a` with bit i of `b`, shifted up by i.
            let mut row: Vec<Wire> = vec![Wire::ZERO; i];
            for x in aw.iter().take(bits - i) {
                row.push(self.and(*x, *y)?);
            }
            acc = Some(match acc {
                None => row,
                Some(prev) => {
                    let width = bits.min(prev.len().max(row.len()) + 1);
                    let prev = self.extend(&prev, width, false);
                    let row = self.extend(&row, width, false);
                    self.add_wires(&prev, &row)?
                }
            });
        }

        Ok(self.extend(&acc.unwrap_or_default(), bits, false))
    }
}
