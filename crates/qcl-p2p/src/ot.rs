//! Oblivious-transfer interface.
//!
//! The runtime treats OT as an external primitive: the garbler is the
//! sender holding a label pair per evaluator input wire, the evaluator
//! is the receiver choosing one label per wire with its input bit. The
//! protocol's `OT_REQUEST`/`OT_RESPONSE` frames are opaque to the rest
//! of the stack and move through an [`OtTransport`].

use crate::frame::LabelBytes;
use crate::ProtocolError;

/// One sender-held label pair: `(label_zero, label_one)`.
pub type LabelPair = (LabelBytes, LabelBytes);

/// Carrier for the opaque OT payloads. Requests flow receiver to
/// sender, responses sender to receiver; multi-round protocols call
/// these repeatedly.
pub trait OtTransport {
    fn send_request(&mut self, payload: Vec<u8>) -> Result<(), ProtocolError>;
    fn recv_request(&mut self) -> Result<Vec<u8>, ProtocolError>;
    fn send_response(&mut self, payload: Vec<u8>) -> Result<(), ProtocolError>;
    fn recv_response(&mut self) -> Result<Vec<u8>, ProtocolError>;
}

/// An oblivious-transfer implementation.
pub trait ObliviousTransfer {
    /// Sender side: serve one label of each pair according to the
    /// receiver's hidden choices.
    fn send(
        &mut self,
        transport: &mut dyn OtTransport,
        pairs: &[LabelPair],
    ) -> Result<(), ProtocolError>;

    /// Receiver side: obtain the label selected by each choice bit.
    fn receive(
        &mut self,
        transport: &mut dyn OtTransport,
        bits: &[bool],
    ) -> Result<Vec<LabelBytes>, ProtocolError>;
}

/// Plaintext label transfer. The receiver's choice bits travel in the
/// clear, so this provides no input privacy whatsoever; it exists for
/// tests and demos where both endpoints are trusted. Real deployments
/// plug an actual OT protocol into [`ObliviousTransfer`].
#[derive(Debug, Default)]
pub struct InsecureOt;

impl ObliviousTransfer for InsecureOt {
    fn send(
        &mut self,
        transport: &mut dyn OtTransport,
        pairs: &[LabelPair],
    ) -> Result<(), ProtocolError> {
        let request = transport.recv_request()?;
        let bits = crate::frame::unpack_bits(&request, pairs.len());
        if request.len() != pairs.len().div_ceil(8) {
            return Err(ProtocolError::SizeMismatch(format!(
                "OT request of {} bytes for {} pairs",
                request.len(),
                pairs.len()
            )));
        }
        let mut response = Vec::with_capacity(pairs.len() * 16);
        for (pair, bit) in pairs.iter().zip(&bits) {
            response.extend_from_slice(if *bit { &pair.1 } else { &pair.0 });
        }
        transport.send_response(response)
    }

    fn receive(
        &mut self,
        transport: &mut dyn OtTransport,
        bits: &[bool],
    ) -> Result<Vec<LabelBytes>, ProtocolError> {
        transport.send_request(crate::frame::pack_bits(bits))?;
        let response = transport.recv_response()?;
        if response.len() != bits.len() * 16 {
            return Err(ProtocolError::SizeMismatch(format!(
                "OT response of {} bytes for {} wires",
                response.len(),
                bits.len()
            )));
        }
        Ok(response
            .chunks_exact(16)
            .map(|chunk| {
                let mut label = [0u8; 16];
                label.copy_from_slice(chunk);
                label
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// In-memory transport shared between the two roles of one test.
    #[derive(Default)]
    struct Loopback {
        requests: VecDeque<Vec<u8>>,
        responses: VecDeque<Vec<u8>>,
    }

    impl OtTransport for Loopback {
        fn send_request(&mut self, payload: Vec<u8>) -> Result<(), ProtocolError> {
            self.requests.push_back(payload);
            Ok(())
        }

        fn recv_request(&mut self) -> Result<Vec<u8>, ProtocolError> {
            self.requests
                .pop_front()
                .ok_or_else(|| ProtocolError::SizeMismatch("no pending request".into()))
        }

        fn send_response(&mut self, payload: Vec<u8>) -> Result<(), ProtocolError> {
            self.responses.push_back(payload);
            Ok(())
        }

        fn recv_response(&mut self) -> Result<Vec<u8>, ProtocolError> {
            self.responses
                .pop_front()
                .ok_or_else(|| ProtocolError::SizeMismatch("no pending response".into()))
        }
    }

    #[test]
    fn receiver_gets_chosen_labels() {
        let pairs = vec![
            ([0u8; 16], [1u8; 16]),
            ([2u8; 16], [3u8; 16]),
            ([4u8; 16], [5u8; 16]),
        ];
        let bits = vec![true, false, true];

        let mut transport = Loopback::default();
        transport.send_request(crate::frame::pack_bits(&bits)).unwrap();
        InsecureOt.send(&mut transport, &pairs).expect("send");

        // Replay the receiver half against the recorded response.
        let response = transport.responses.front().cloned().unwrap();
        let mut receiver = Loopback::default();
        receiver.responses.push_back(response);
        let labels = InsecureOt.receive(&mut receiver, &bits).expect("receive");
        assert_eq!(labels, vec![[1u8; 16], [2u8; 16], [5u8; 16]]);
    }

    #[test]
    fn sender_rejects_short_request() {
        let pairs = vec![([0u8; 16], [1u8; 16]); 9];
        let mut transport = Loopback::default();
        transport.send_request(vec![0u8]).unwrap();
        assert!(InsecureOt.send(&mut transport, &pairs).is_err());
    }
}
