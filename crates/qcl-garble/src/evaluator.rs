//! Gate evaluation over received labels.

use qcl::{Op, Wire};
use qcl_p2p::GateFrame;

use crate::hash::{hash1, hash2};
use crate::label::Label;
use crate::GarbleError;

/// Evaluator state: one active label per live wire. The evaluator never
/// sees a label pair, only the label selected by the actual wire value.
#[derive(Default)]
pub struct Evaluator {
    labels: Vec<Option<Label>>,
    tweak: u64,
}

impl Evaluator {
    pub fn new() -> Evaluator {
        Evaluator::default()
    }

    /// Number of gates evaluated so far.
    pub fn gates(&self) -> u64 {
        self.tweak
    }

    /// Bind the active label of an input or constant wire.
    pub fn set_label(&mut self, wire: Wire, label: Label) {
        let idx = wire.index();
        if idx >= self.labels.len() {
            self.labels.resize(idx + 1, None);
        }
        self.labels[idx] = Some(label);
    }

    /// Active label of a live wire.
    pub fn label(&self, wire: Wire) -> Result<Label, GarbleError> {
        self.labels
            .get(wire.index())
            .copied()
            .flatten()
            .ok_or(GarbleError::MissingLabel(wire))
    }

    /// Drop a dead wire's label.
    pub fn release(&mut self, wire: Wire) {
        if let Some(slot) = self.labels.get_mut(wire.index()) {
            *slot = None;
        }
    }

    /// Evaluate one received gate and bind its output label.
    pub fn eval_gate(&mut self, frame: &GateFrame) -> Result<(), GarbleError> {
        if frame.ciphertexts.len() != GateFrame::table_size(frame.op) {
            return Err(GarbleError::BadTable {
                op: frame.op,
                rows: frame.ciphertexts.len(),
            });
        }
        let tweak = self.tweak;
        self.tweak += 1;

        let la = self.label(frame.input0)?;
        let out = match frame.op {
            Op::Xor | Op::Xnor => la ^ self.label(frame.input1)?,
            Op::Inv => {
                let key = hash1(la, tweak);
                if la.permute_bit() {
                    key ^ Label(frame.ciphertexts[0])
                } else {
                    key
                }
            }
            Op::And | Op::Or => {
                let lb = self.label(frame.input1)?;
                let idx = usize::from(la.permute_bit()) << 1 | usize::from(lb.permute_bit());
                hash2(la, lb, tweak) ^ Label(frame.ciphertexts[idx])
            }
        };
        self.set_label(frame.output, out);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_label_is_an_error() {
        let evaluator = Evaluator::new();
        assert!(matches!(
            evaluator.label(Wire(9)),
            Err(GarbleError::MissingLabel(Wire(9)))
        ));
    }

    #[test]
    fn bad_table_is_an_error() {
        let mut evaluator = Evaluator::new();
        evaluator.set_label(Wire(2), Label([1u8; 16]));
        evaluator.set_label(Wire(3), Label([2u8; 16]));
        let frame = GateFrame {
            op: Op::And,
            input0: Wire(2),
            input1: Wire(3),
            output: Wire(4),
            ciphertexts: vec![[0u8; 16]; 3],
        };
        assert!(matches!(
            evaluator.eval_gate(&frame),
            Err(GarbleError::BadTable { .. })
        ));
    }

    #[test]
    fn release_frees_the_slot() {
        let mut evaluator = Evaluator::new();
        evaluator.set_label(Wire(2), Label([1u8; 16]));
        evaluator.release(Wire(2));
        assert!(evaluator.label(Wire(2)).is_err());
    }
}
