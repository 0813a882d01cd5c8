//! Wire-protocol frames.
//!
//! Every frame is `u8 kind, varint length, payload`. Multi-byte payload
//! integers are little-endian; labels and ciphertexts are raw 16-byte
//! blocks.

use std::io::{Cursor, Read};

use qcl::{Op, Wire};

use crate::varint::{read_varint, write_varint};
use crate::ProtocolError;

/// A 128-bit wire label or garbled-row ciphertext as it appears on the
/// wire.
pub type LabelBytes = [u8; 16];

/// Frame kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    InputSizes = 0,
    InputLabels = 1,
    OtRequest = 2,
    OtResponse = 3,
    Gate = 4,
    Gc = 5,
    Ret = 6,
    Result = 7,
}

impl FrameKind {
    pub fn from_u8(v: u8) -> Option<FrameKind> {
        match v {
            0 => Some(FrameKind::InputSizes),
            1 => Some(FrameKind::InputLabels),
            2 => Some(FrameKind::OtRequest),
            3 => Some(FrameKind::OtResponse),
            4 => Some(FrameKind::Gate),
            5 => Some(FrameKind::Gc),
            6 => Some(FrameKind::Ret),
            7 => Some(FrameKind::Result),
            _ => None,
        }
    }
}

/// A garbled gate as transmitted to the evaluator. The ciphertext count
/// is fixed by the operation: zero for `XOR`/`XNOR`, one for `INV`,
/// four for `AND`/`OR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateFrame {
    pub op: Op,
    pub input0: Wire,
    pub input1: Wire,
    pub output: Wire,
    pub ciphertexts: Vec<LabelBytes>,
}

impl GateFrame {
    /// Ciphertexts a garbled table carries for the operation.
    pub fn table_size(op: Op) -> usize {
        match op {
            Op::Xor | Op::Xnor => 0,
            Op::Inv => 1,
            Op::And | Op::Or => 4,
        }
    }
}

/// Program termination: the output wires and the permute-bit decoding
/// table (one bit per output wire, packed LSB first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetFrame {
    pub output_wires: Vec<Wire>,
    pub decode_bits: Vec<bool>,
}

/// A parsed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Input shape of the sending party: per argument, the widths of
    /// its elements in bits.
    InputSizes(Vec<Vec<u64>>),
    /// Labels for the constant wires and the garbler's input wires, in
    /// wire order starting at wire 0.
    InputLabels(Vec<LabelBytes>),
    /// Opaque oblivious-transfer payload, receiver to sender.
    OtRequest(Vec<u8>),
    /// Opaque oblivious-transfer payload, sender to receiver.
    OtResponse(Vec<u8>),
    Gate(GateFrame),
    /// Release the label of a dead wire.
    Gc(Wire),
    Ret(RetFrame),
    /// Output bits, evaluator to garbler, packed LSB first.
    Result(Vec<bool>),
}

impl Message {
    pub fn kind(&self) -> FrameKind {
        match self {
            Message::InputSizes(_) => FrameKind::InputSizes,
            Message::InputLabels(_) => FrameKind::InputLabels,
            Message::OtRequest(_) => FrameKind::OtRequest,
            Message::OtResponse(_) => FrameKind::OtResponse,
            Message::Gate(_) => FrameKind::Gate,
            Message::Gc(_) => FrameKind::Gc,
            Message::Ret(_) => FrameKind::Ret,
            Message::Result(_) => FrameKind::Result,
        }
    }

    /// Encode the payload (everything after the kind and length).
    pub fn encode_payload(&self) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        match self {
            Message::InputSizes(args) => {
                write_varint(&mut buf, args.len() as u64)?;
                for widths in args {
                    write_varint(&mut buf, widths.len() as u64)?;
                    for width in widths {
                        write_varint(&mut buf, *width)?;
                    }
                }
            }
            Message::InputLabels(labels) => {
                write_varint(&mut buf, labels.len() as u64)?;
                for label in labels {
                    buf.extend_from_slice(label);
                }
            }
            Message::OtRequest(data) | Message::OtResponse(data) => {
                buf.extend_from_slice(data);
            }
            Message::Gate(gate) => {
                buf.push(gate.op as u8);
                buf.extend_from_slice(&gate.input0.0.to_le_bytes());
                buf.extend_from_slice(&gate.input1.0.to_le_bytes());
                buf.extend_from_slice(&gate.output.0.to_le_bytes());
                if gate.ciphertexts.len() != GateFrame::table_size(gate.op) {
                    return Err(ProtocolError::SizeMismatch(format!(
                        "{} gate with {} ciphertexts",
                        gate.op,
                        gate.ciphertexts.len()
                    )));
                }
                for ct in &gate.ciphertexts {
                    buf.extend_from_slice(ct);
                }
            }
            Message::Gc(wire) => {
                buf.extend_from_slice(&wire.0.to_le_bytes());
            }
            Message::Ret(ret) => {
                write_varint(&mut buf, ret.output_wires.len() as u64)?;
                for wire in &ret.output_wires {
                    buf.extend_from_slice(&wire.0.to_le_bytes());
                }
                if ret.decode_bits.len() != ret.output_wires.len() {
                    return Err(ProtocolError::SizeMismatch(
                        "decoding table does not cover the output wires".to_string(),
                    ));
                }
                buf.extend_from_slice(&pack_bits(&ret.decode_bits));
            }
            Message::Result(bits) => {
                write_varint(&mut buf, bits.len() as u64)?;
                buf.extend_from_slice(&pack_bits(bits));
            }
        }
        Ok(buf)
    }

    /// Decode a payload for the given frame kind.
    pub fn decode(kind: FrameKind, payload: &[u8]) -> Result<Message, ProtocolError> {
        let mut r = Cursor::new(payload);
        let msg = match kind {
            FrameKind::InputSizes => {
                let count = read_varint(&mut r)?;
                let mut args = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let widths = read_varint(&mut r)?;
                    let mut arg = Vec::with_capacity(widths as usize);
                    for _ in 0..widths {
                        arg.push(read_varint(&mut r)?);
                    }
                    args.push(arg);
                }
                Message::InputSizes(args)
            }
            FrameKind::InputLabels => {
                let count = read_varint(&mut r)?;
                let mut labels = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    labels.push(read_label(&mut r)?);
                }
                Message::InputLabels(labels)
            }
            FrameKind::OtRequest => {
                r.set_position(payload.len() as u64);
                Message::OtRequest(payload.to_vec())
            }
            FrameKind::OtResponse => {
                r.set_position(payload.len() as u64);
                Message::OtResponse(payload.to_vec())
            }
            FrameKind::Gate => {
                let mut op = [0u8; 1];
                r.read_exact(&mut op)?;
                let op = Op::from_u8(op[0])
                    .ok_or_else(|| ProtocolError::SizeMismatch(format!("bad opcode {}", op[0])))?;
                let input0 = read_wire(&mut r)?;
                let input1 = read_wire(&mut r)?;
                let output = read_wire(&mut r)?;
                let mut ciphertexts = Vec::with_capacity(GateFrame::table_size(op));
                for _ in 0..GateFrame::table_size(op) {
                    ciphertexts.push(read_label(&mut r)?);
                }
                Message::Gate(GateFrame {
                    op,
                    input0,
                    input1,
                    output,
                    ciphertexts,
                })
            }
            FrameKind::Gc => Message::Gc(read_wire(&mut r)?),
            FrameKind::Ret => {
                let count = read_varint(&mut r)? as usize;
                let mut output_wires = Vec::with_capacity(count);
                for _ in 0..count {
                    output_wires.push(read_wire(&mut r)?);
                }
                let mut packed = vec![0u8; count.div_ceil(8)];
                r.read_exact(&mut packed)?;
                Message::Ret(RetFrame {
                    output_wires,
                    decode_bits: unpack_bits(&packed, count),
                })
            }
            FrameKind::Result => {
                let count = read_varint(&mut r)? as usize;
                let mut packed = vec![0u8; count.div_ceil(8)];
                r.read_exact(&mut packed)?;
                Message::Result(unpack_bits(&packed, count))
            }
        };
        if r.position() != payload.len() as u64 {
            return Err(ProtocolError::SizeMismatch(format!(
                "{} trailing bytes in {:?} frame",
                payload.len() as u64 - r.position(),
                kind
            )));
        }
        Ok(msg)
    }
}

fn read_wire(r: &mut impl Read) -> Result<Wire, ProtocolError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(Wire(u32::from_le_bytes(buf)))
}

fn read_label(r: &mut impl Read) -> Result<LabelBytes, ProtocolError> {
    let mut buf = [0u8; 16];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Pack bits LSB first into bytes.
pub fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (i, bit) in bits.iter().enumerate() {
        if *bit {
            packed[i / 8] |= 1 << (i % 8);
        }
    }
    packed
}

/// Unpack `count` LSB-first bits from bytes.
pub fn unpack_bits(packed: &[u8], count: usize) -> Vec<bool> {
    (0..count)
        .map(|i| packed[i / 8] & (1 << (i % 8)) != 0)
        .collect()
}
