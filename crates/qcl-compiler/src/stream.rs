//! The garbler's half of the streaming protocol.
//!
//! Gates are garbled and framed as the lowering emits them, so the
//! full circuit never exists in memory on either side. Frame order on
//! the wire is the SSA-linearized order; `GC` frames trail the last
//! gate that used the released wire.

use std::io::{Read, Write};

use bitvec::prelude::*;
use num_bigint::BigInt;
use qcl::io::value_bits;
use qcl::timing::Timing;
use qcl::{Gate, Op, Wire};
use qcl_garble::Garbler;
use qcl_p2p::{Conn, FrameKind, Message, ObliviousTransfer, RetFrame};
use rand_chacha::ChaCha20Rng;
use tracing::{debug, info};

use crate::circuits::GateSink;
use crate::compile::lower;
use crate::error::CompileError;
use crate::ssa::{Program, WireAllocator};

struct StreamSink<'a, R, W: Write> {
    garbler: &'a mut Garbler,
    conn: &'a mut Conn<R, W>,
    gates_sent: u64,
}

impl<R: Read, W: Write> GateSink for StreamSink<'_, R, W> {
    fn gate(&mut self, gate: Gate) -> Result<(), CompileError> {
        let input1 = if gate.op == Op::Inv {
            gate.input0
        } else {
            gate.input1
        };
        let frame = self
            .garbler
            .garble(gate.op, gate.input0, input1, gate.output)?;
        self.conn.send(&Message::Gate(frame))?;
        self.gates_sent += 1;
        Ok(())
    }

    fn release(&mut self, wire: Wire) -> Result<(), CompileError> {
        self.garbler.release(wire);
        self.conn.send(&Message::Gc(wire))?;
        Ok(())
    }
}

/// Garble and stream a compiled program.
///
/// The connection must already have exchanged `INPUT_SIZES` frames;
/// `garbler_params` of the program's leading parameters belong to the
/// garbler and take their values from `inputs`. Returns the program's
/// output bits as reported back by the evaluator.
pub fn stream_garbler<R: Read, W: Write>(
    conn: &mut Conn<R, W>,
    ot: &mut dyn ObliviousTransfer,
    prog: &Program,
    garbler_params: usize,
    inputs: &[BigInt],
    rng: ChaCha20Rng,
    timing: &mut Timing,
) -> Result<BitVec, CompileError> {
    let garbler_bits: u32 = prog.inputs.0[..garbler_params]
        .iter()
        .map(|a| a.typ.bits())
        .sum();
    let total_bits = prog.inputs.size();

    let mut garbler = Garbler::new(rng);
    for wire in 0..2 + total_bits {
        garbler.alloc(Wire(wire));
    }

    // Constant-wire labels and our own input labels go in the clear;
    // the wire values of the constants are public anyway.
    let mut image: BitVec = BitVec::new();
    image.push(false);
    image.push(true);
    for (arg, value) in prog.inputs.0[..garbler_params].iter().zip(inputs) {
        image.extend(value_bits(value, arg.typ.bits()).iter().by_vals());
    }
    let mut labels = Vec::with_capacity(image.len());
    for (i, bit) in image.iter().enumerate() {
        labels.push(garbler.active_label(Wire(i as u32), *bit)?.into());
    }
    conn.send(&Message::InputLabels(labels))?;
    conn.flush()?;

    // The evaluator fetches its own input labels by oblivious
    // transfer.
    let evaluator_wires: Vec<Wire> = (2 + garbler_bits..2 + total_bits).map(Wire).collect();
    let pairs: Vec<_> = evaluator_wires
        .iter()
        .map(|w| garbler.label_pair(*w))
        .collect::<Result<_, _>>()?;
    ot.send(conn, &pairs)?;
    timing.sample("OT", vec![format!("{} wires", pairs.len())]);

    let mut walloc = WireAllocator::new(2 + total_bits, true);
    let (output_wires, stats) = {
        let mut sink = StreamSink {
            garbler: &mut garbler,
            conn,
            gates_sent: 0,
        };
        let lowered = lower(prog, &mut walloc, &mut sink)?;
        debug!(gates = sink.gates_sent, "gate stream complete");
        (lowered.output_wires, lowered.stats)
    };
    timing.sample(
        "Garble",
        vec![format!("{} gates", stats.count()), format!("{stats}")],
    );

    let decode_bits: Vec<bool> = output_wires
        .iter()
        .map(|w| garbler.decode_bit(*w))
        .collect::<Result<_, _>>()?;
    conn.send(&Message::Ret(RetFrame {
        output_wires: output_wires.clone(),
        decode_bits,
    }))?;
    conn.flush()?;

    let result = match conn.recv_expect(FrameKind::Result)? {
        Message::Result(bits) => bits,
        _ => unreachable!(),
    };
    timing.sample("Result", vec![]);
    info!(
        outputs = result.len(),
        cost = stats.cost(),
        "streaming session complete"
    );
    Ok(result.into_iter().collect())
}

// Free-XOR sanity: the frame layer enforces the per-op table sizes, so
// a XOR gate can never carry ciphertexts onto the wire.
#[cfg(test)]
mod tests {
    use super::*;
    use qcl_p2p::GateFrame;

    #[test]
    fn xor_frames_have_no_ciphertexts() {
        assert_eq!(GateFrame::table_size(Op::Xor), 0);
        assert_eq!(GateFrame::table_size(Op::Xnor), 0);
    }
}
