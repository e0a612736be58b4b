use bytes::Bytes;

use crate::stream::ByteStream;

use super::reassembler::Reassembler;
use super::receiver::TcpReceiver;
use super::sender::TcpSender;
use super::sequence::Wrap32;
use super::state::{Available, State};
use super::TcpMessage;

/// One endpoint of a TCP connection: a sender and a receiver sharing the
/// two byte streams that face the application.
///
/// The connection attaches the receiver's current ack and window to every
/// outgoing segment and emits a bare ack when the peer sent something that
/// occupies sequence space and the sender has nothing queued. A passive
/// open needs no extra machinery: the first `push` after a SYN arrives
/// emits this side's SYN with the cumulative ack attached.
#[derive(Debug)]
pub struct TcpConnection {
    sender: TcpSender,
    receiver: TcpReceiver,
    reassembler: Reassembler,
    inbound: ByteStream,
    outbound: ByteStream,
    need_ack: bool,
}

impl TcpConnection {
    pub fn new(capacity: usize, initial_rto_ms: u64, fixed_isn: Option<Wrap32>) -> Self {
        Self {
            sender: TcpSender::new(initial_rto_ms, fixed_isn),
            receiver: TcpReceiver::new(),
            reassembler: Reassembler::new(),
            inbound: ByteStream::new(capacity),
            outbound: ByteStream::new(capacity),
            need_ack: false,
        }
    }

    /// Process one incoming segment and queue whatever response it demands.
    pub fn receive(&mut self, message: TcpMessage) {
        self.sender.receive(message.receiver);
        if message.sender.sequence_length() > 0 {
            self.need_ack = true;
        }
        self.receiver
            .receive(message.sender, &mut self.reassembler, &mut self.inbound);
        self.sender.push(&mut self.outbound);
    }

    /// Next segment for the wire, with the receiver's ack and window
    /// attached.
    pub fn maybe_send(&mut self) -> Option<TcpMessage> {
        let sender = match self.sender.maybe_send() {
            Some(message) => message,
            None if self.need_ack => self.sender.send_empty_message(),
            None => return None,
        };
        self.need_ack = false;
        Some(TcpMessage {
            sender,
            receiver: self.receiver.send(&self.inbound),
        })
    }

    pub fn tick(&mut self, ms_since_last_tick: u64) {
        self.sender.tick(ms_since_last_tick);
    }

    /// Write application bytes; returns how many were accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        let accepted = self.outbound.push(data);
        self.sender.push(&mut self.outbound);
        accepted
    }

    /// Take up to `n` received bytes.
    pub fn read(&mut self, n: usize) -> Bytes {
        self.inbound.read(n)
    }

    /// No more application writes; sends FIN once the window allows.
    pub fn close(&mut self) {
        self.outbound.close();
        self.sender.push(&mut self.outbound);
    }

    pub fn available(&self) -> Available {
        let mut available = Available::empty();
        if self.inbound.bytes_buffered() > 0 || self.inbound.is_finished() {
            available |= Available::READ;
        }
        if !self.outbound.is_closed() && self.outbound.available_capacity() > 0 {
            available |= Available::WRITE;
        }
        available
    }

    pub fn state(&self) -> State {
        self.sender.state()
    }

    /// Our FIN is acknowledged and the peer's stream has finished.
    pub fn is_done(&self) -> bool {
        self.state().is_terminal() && self.inbound.is_finished()
    }

    pub fn inbound(&self) -> &ByteStream {
        &self.inbound
    }

    pub fn outbound(&self) -> &ByteStream {
        &self.outbound
    }

    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.sender.sequence_numbers_in_flight()
    }

    pub fn consecutive_retransmissions(&self) -> u64 {
        self.sender.consecutive_retransmissions()
    }
}
