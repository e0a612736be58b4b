use crate::stream::ByteStream;

use super::reassembler::Reassembler;
use super::sequence::Wrap32;
use super::{TcpReceiverMessage, TcpSenderMessage};

/// Receiving half of a connection: translates wrapped sequence numbers into
/// absolute stream indices, drives the reassembler, and reports the
/// cumulative ack and advertised window.
#[derive(Debug, Default)]
pub struct TcpReceiver {
    zero_point: Option<Wrap32>,
}

impl TcpReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one segment from the peer's sender.
    pub fn receive(
        &mut self,
        message: TcpSenderMessage,
        reassembler: &mut Reassembler,
        inbound: &mut ByteStream,
    ) {
        if self.zero_point.is_none() {
            if !message.syn {
                // Nothing is meaningful before the ISN is known.
                return;
            }
            self.zero_point = Some(message.seqno);
        }
        let Some(zero) = self.zero_point else {
            return;
        };

        let checkpoint = 1 + inbound.bytes_pushed();
        let abs_seqno = message.seqno.unwrap(zero, checkpoint);
        // SYN occupies sequence number zero but no stream byte, so payload
        // of a non-SYN segment starts one below its absolute seqno. A bogus
        // segment at the ISN without SYN wraps to a huge index and falls
        // outside the reassembler's window.
        let first_index = if message.syn {
            abs_seqno
        } else {
            abs_seqno.wrapping_sub(1)
        };
        reassembler.insert(first_index, message.payload, message.fin, inbound);
    }

    /// Current ack and window to hand back to the peer.
    pub fn send(&self, inbound: &ByteStream) -> TcpReceiverMessage {
        let ackno = self.zero_point.map(|zero| {
            // SYN and FIN each occupy one sequence number.
            Wrap32::wrap(1 + inbound.bytes_pushed() + inbound.is_closed() as u64, zero)
        });
        TcpReceiverMessage {
            ackno,
            window_size: inbound.available_capacity().min(0xffff) as u16,
        }
    }
}
