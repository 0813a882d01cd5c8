//! The evaluator's half of the streaming protocol.
//!
//! The garbler half lives next to the compiler, which it needs for
//! lowering; this side only needs the label table and the connection.

use std::io::{Read, Write};

use bitvec::prelude::*;
use num_bigint::BigInt;
use qcl::io::value_bits;
use qcl::Wire;
use qcl_p2p::{Conn, FrameKind, Message, ObliviousTransfer, ProtocolError};
use tracing::{debug, info};

use crate::evaluator::Evaluator;
use crate::label::Label;
use crate::GarbleError;

/// Evaluate one streamed session.
///
/// Session order: send our input sizes, receive the compiled input
/// shape of the whole program back, receive the constant and garbler
/// input labels, run OT for our own input bits, then consume
/// `GATE`/`GC` frames until `RET`. Returns the output bit image after
/// answering it to the garbler with `RESULT`.
pub fn stream_evaluator<R: Read, W: Write>(
    conn: &mut Conn<R, W>,
    ot: &mut dyn ObliviousTransfer,
    inputs: &[BigInt],
    input_sizes: &[u64],
) -> Result<BitVec, GarbleError> {
    conn.send(&Message::InputSizes(
        input_sizes.iter().map(|s| vec![*s]).collect(),
    ))?;
    conn.flush()?;

    // The garbler answers with the compiled shape of every program
    // parameter; the trailing entries are ours and fix the widths of
    // our OT choice bits.
    let shape = match conn.recv_expect(FrameKind::InputSizes)? {
        Message::InputSizes(sizes) => sizes,
        _ => unreachable!(),
    };
    if shape.len() < inputs.len() {
        return Err(GarbleError::Protocol(ProtocolError::SizeMismatch(format!(
            "program has {} parameters, we supply {}",
            shape.len(),
            inputs.len()
        ))));
    }
    let garbler_args = shape.len() - inputs.len();
    let garbler_bits: u64 = shape[..garbler_args].iter().flatten().sum();
    let own_widths: Vec<u64> = shape[garbler_args..]
        .iter()
        .map(|arg| arg.iter().sum())
        .collect();
    debug!(garbler_bits, ?own_widths, "received program input shape");
    for (value_bits_needed, width) in input_sizes.iter().zip(&own_widths) {
        if value_bits_needed > width {
            return Err(GarbleError::Protocol(ProtocolError::SizeMismatch(format!(
                "input needs {value_bits_needed} bits, parameter has {width}"
            ))));
        }
    }

    let mut evaluator = Evaluator::new();

    // Constant wires and the garbler's inputs.
    let labels = match conn.recv_expect(FrameKind::InputLabels)? {
        Message::InputLabels(labels) => labels,
        _ => unreachable!(),
    };
    if labels.len() as u64 != 2 + garbler_bits {
        return Err(GarbleError::Protocol(ProtocolError::SizeMismatch(format!(
            "expected {} input labels, got {}",
            2 + garbler_bits,
            labels.len()
        ))));
    }
    for (i, label) in labels.into_iter().enumerate() {
        evaluator.set_label(Wire(i as u32), Label(label));
    }

    // Our own inputs arrive by oblivious transfer, one choice bit per
    // parameter wire.
    let mut bits: Vec<bool> = Vec::new();
    for (value, width) in inputs.iter().zip(&own_widths) {
        bits.extend(value_bits(value, *width as u32).iter().by_vals());
    }
    let own_labels = ot.receive(conn, &bits)?;
    let own_base = 2 + garbler_bits as u32;
    for (i, label) in own_labels.into_iter().enumerate() {
        evaluator.set_label(Wire(own_base + i as u32), Label(label));
    }

    loop {
        match conn.recv()? {
            Message::Gate(frame) => evaluator.eval_gate(&frame)?,
            Message::Gc(wire) => evaluator.release(wire),
            Message::Ret(ret) => {
                let mut outputs = BitVec::with_capacity(ret.output_wires.len());
                for (wire, decode) in ret.output_wires.iter().zip(&ret.decode_bits) {
                    let label = evaluator.label(*wire)?;
                    outputs.push(label.permute_bit() ^ decode);
                }
                info!(
                    gates = evaluator.gates(),
                    outputs = outputs.len(),
                    "stream complete"
                );
                conn.send(&Message::Result(outputs.iter().by_vals().collect()))?;
                conn.flush()?;
                return Ok(outputs);
            }
            other => {
                return Err(GarbleError::Protocol(ProtocolError::UnexpectedFrame {
                    expected: FrameKind::Gate,
                    got: other.kind(),
                }))
            }
        }
    }
}
