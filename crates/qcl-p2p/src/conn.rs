//! Buffered framed connection between the two parties.

use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::trace;

use crate::frame::{FrameKind, Message};
use crate::varint::{read_varint, write_varint};
use crate::ProtocolError;

/// A framed peer connection. The reader and writer halves are buffered
/// independently; callers flush explicitly at protocol turn-taking
/// points.
pub struct Conn<R, W: Write> {
    reader: BufReader<R>,
    writer: BufWriter<W>,
    sent_frames: u64,
    received_frames: u64,
}

impl Conn<TcpStream, TcpStream> {
    /// Wrap a TCP stream, bounding every read and write by `timeout`.
    pub fn from_tcp(
        stream: TcpStream,
        timeout: Option<Duration>,
    ) -> std::io::Result<Conn<TcpStream, TcpStream>> {
        stream.set_read_timeout(timeout)?;
        stream.set_write_timeout(timeout)?;
        stream.set_nodelay(true)?;
        let writer = stream.try_clone()?;
        Ok(Conn::new(stream, writer))
    }
}

impl<R: Read, W: Write> Conn<R, W> {
    pub fn new(reader: R, writer: W) -> Conn<R, W> {
        Conn {
            reader: BufReader::new(reader),
            writer: BufWriter::new(writer),
            sent_frames: 0,
            received_frames: 0,
        }
    }

    /// Number of frames sent and received so far.
    pub fn frame_counts(&self) -> (u64, u64) {
        (self.sent_frames, self.received_frames)
    }

    /// Send one frame. The frame stays in the write buffer until
    /// [`Conn::flush`].
    pub fn send(&mut self, msg: &Message) -> Result<(), ProtocolError> {
        let payload = msg.encode_payload()?;
        self.writer.write_all(&[msg.kind() as u8])?;
        write_varint(&mut self.writer, payload.len() as u64)?;
        self.writer.write_all(&payload)?;
        self.sent_frames += 1;
        trace!(kind = ?msg.kind(), len = payload.len(), "frame sent");
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), ProtocolError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Receive the next frame, blocking until one arrives.
    pub fn recv(&mut self) -> Result<Message, ProtocolError> {
        let mut kind = [0u8; 1];
        self.reader.read_exact(&mut kind)?;
        let kind = FrameKind::from_u8(kind[0]).ok_or(ProtocolError::UnknownFrame(kind[0]))?;
        let len = read_varint(&mut self.reader)? as usize;
        let mut payload = vec![0u8; len];
        self.reader.read_exact(&mut payload)?;
        self.received_frames += 1;
        trace!(?kind, len, "frame received");
        Message::decode(kind, &payload)
    }

    /// Receive a frame and require a specific kind.
    pub fn recv_expect(&mut self, kind: FrameKind) -> Result<Message, ProtocolError> {
        let msg = self.recv()?;
        if msg.kind() != kind {
            return Err(ProtocolError::UnexpectedFrame {
                expected: kind,
                got: msg.kind(),
            });
        }
        Ok(msg)
    }
}
