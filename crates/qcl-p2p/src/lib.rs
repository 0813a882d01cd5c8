//! Two-party wire protocol for streamed garbled circuits.
//!
//! Frames are `u8 kind, varint length, payload` over a single ordered
//! byte stream per direction. The garbler streams garbled gates and
//! wire releases in SSA order; the evaluator answers with the program
//! result once `RET` arrives.

pub mod conn;
pub mod frame;
pub mod ot;
pub mod varint;

pub use conn::Conn;
pub use frame::{FrameKind, GateFrame, LabelBytes, Message, RetFrame};
pub use ot::{InsecureOt, LabelPair, ObliviousTransfer, OtTransport};

/// Protocol-level failures. Any of these tears the session down; there
/// are no retries.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("unknown frame kind {0:#04x}")]
    UnknownFrame(u8),
    #[error("expected {expected:?} frame, got {got:?}")]
    UnexpectedFrame { expected: FrameKind, got: FrameKind },
    #[error("size mismatch: {0}")]
    SizeMismatch(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// True when the error is a clean end-of-stream after `RET`, which
    /// both sides treat as a normal close.
    pub fn is_eof(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof
        )
    }
}

/// [`OtTransport`] over a framed connection.
impl<R: std::io::Read, W: std::io::Write> OtTransport for Conn<R, W> {
    fn send_request(&mut self, payload: Vec<u8>) -> Result<(), ProtocolError> {
        self.send(&Message::OtRequest(payload))?;
        self.flush()
    }

    fn recv_request(&mut self) -> Result<Vec<u8>, ProtocolError> {
        match self.recv_expect(FrameKind::OtRequest)? {
            Message::OtRequest(payload) => Ok(payload),
            _ => unreachable!(),
        }
    }

    fn send_response(&mut self, payload: Vec<u8>) -> Result<(), ProtocolError> {
        self.send(&Message::OtResponse(payload))?;
        self.flush()
    }

    fn recv_response(&mut self) -> Result<Vec<u8>, ProtocolError> {
        match self.recv_expect(FrameKind::OtResponse)? {
            Message::OtResponse(payload) => Ok(payload),
            _ => unreachable!(),
        }
    }
}
