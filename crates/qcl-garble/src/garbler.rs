//! The garbler's label table and gate garbling.
//!
//! Free-XOR with point-and-permute: every wire's one-label is its
//! zero-label xored with the global delta, so `XOR`/`XNOR` cost nothing.
//! `INV` is row-reduced to a single ciphertext; `AND`/`OR` carry the
//! full four-row table, permuted by the input permute bits.

use qcl::{Op, Wire};
use qcl_p2p::{GateFrame, LabelPair};
use rand_chacha::ChaCha20Rng;

use crate::hash::{hash1, hash2};
use crate::label::{Delta, Label};
use crate::GarbleError;

/// Garbler state: the global delta and the zero-label of every live
/// wire. Wire slots are released on `GC` and may be reallocated by the
/// streaming wire allocator.
pub struct Garbler {
    delta: Delta,
    rng: ChaCha20Rng,
    labels: Vec<Option<Label>>,
    tweak: u64,
}

impl Garbler {
    pub fn new(mut rng: ChaCha20Rng) -> Garbler {
        let delta = Delta::random(&mut rng);
        Garbler {
            delta,
            rng,
            labels: Vec::new(),
            tweak: 0,
        }
    }

    /// Number of gates garbled so far.
    pub fn gates(&self) -> u64 {
        self.tweak
    }

    /// Allocate a fresh zero-label for a wire. Panics if the wire is
    /// still live; the wire allocator must release before it recycles.
    pub fn alloc(&mut self, wire: Wire) -> Label {
        let label = Label::random(&mut self.rng);
        self.bind(wire, label);
        label
    }

    fn bind(&mut self, wire: Wire, label: Label) {
        let idx = wire.index();
        if idx >= self.labels.len() {
            self.labels.resize(idx + 1, None);
        }
        if self.labels[idx].is_some() {
            panic!("wire {wire} garbled twice");
        }
        self.labels[idx] = Some(label);
    }

    /// Zero-label of a live wire.
    pub fn zero_label(&self, wire: Wire) -> Result<Label, GarbleError> {
        self.labels
            .get(wire.index())
            .copied()
            .flatten()
            .ok_or(GarbleError::MissingLabel(wire))
    }

    /// The label transmitted for a wire carrying a concrete bit.
    pub fn active_label(&self, wire: Wire, bit: bool) -> Result<Label, GarbleError> {
        Ok(self.delta.select(self.zero_label(wire)?, bit))
    }

    /// Label pair for an evaluator input wire, as handed to OT.
    pub fn label_pair(&self, wire: Wire) -> Result<LabelPair, GarbleError> {
        let zero = self.zero_label(wire)?;
        Ok((zero.into(), self.delta.one_label(zero).into()))
    }

    /// Permute bit of the wire's zero-label; the `RET` decoding table
    /// entry for an output wire.
    pub fn decode_bit(&self, wire: Wire) -> Result<bool, GarbleError> {
        Ok(self.zero_label(wire)?.permute_bit())
    }

    /// Release a dead wire's label.
    pub fn release(&mut self, wire: Wire) {
        if let Some(slot) = self.labels.get_mut(wire.index()) {
            *slot = None;
        }
    }

    /// Garble one gate: bind the output wire's zero-label and produce
    /// the frame for the evaluator.
    pub fn garble(
        &mut self,
        op: Op,
        input0: Wire,
        input1: Wire,
        output: Wire,
    ) -> Result<GateFrame, GarbleError> {
        let tweak = self.tweak;
        self.tweak += 1;

        let a0 = self.zero_label(input0)?;
        let delta = self.delta;

        let (out0, ciphertexts) = match op {
            Op::Xor => (a0 ^ self.zero_label(input1)?, Vec::new()),
            Op::Xnor => (a0 ^ self.zero_label(input1)? ^ delta.label(), Vec::new()),
            Op::Inv => {
                // Row-reduced: the row keyed by the permute-bit-zero
                // label becomes the output label itself.
                let pa = a0.permute_bit();
                let low = delta.select(a0, pa);
                let high = delta.label() ^ low;
                let k0 = hash1(low, tweak);
                let k1 = hash1(high, tweak);

                // Row 0 decrypts to the complement of `low`'s value.
                let out0 = if pa { k0 } else { k0 ^ delta.label() };
                let row1 = k1 ^ delta.select(out0, pa);
                (out0, vec![row1.into()])
            }
            Op::And | Op::Or => {
                let b0 = self.zero_label(input1)?;
                let out0 = Label::random(&mut self.rng);
                let mut rows = Vec::with_capacity(4);
                for idx in 0..4u8 {
                    let pa = idx >> 1 != 0;
                    let pb = idx & 1 != 0;
                    let va = pa ^ a0.permute_bit();
                    let vb = pb ^ b0.permute_bit();
                    let la = delta.select(a0, va);
                    let lb = delta.select(b0, vb);
                    let out = delta.select(out0, op.eval(va, vb));
                    rows.push((hash2(la, lb, tweak) ^ out).into());
                }
                (out0, rows)
            }
        };

        self.bind(output, out0);
        Ok(GateFrame {
            op,
            input0,
            input1: if op == Op::Inv { Wire::INVALID } else { input1 },
            output,
            ciphertexts,
        })
    }
}
