use std::collections::VecDeque;

use log::debug;

use crate::stream::ByteStream;

use super::sequence::Wrap32;
use super::state::State;
use super::{TcpReceiverMessage, TcpSenderMessage, MAX_PAYLOAD_SIZE, MAX_RETX_ATTEMPTS};

/// Single retransmission timer shared by all outstanding segments. The
/// countdown is reloaded with an exponentially backed-off timeout on every
/// expiry while the peer advertises a non-zero window.
#[derive(Debug)]
struct RetransmitTimer {
    initial_rto_ms: u64,
    countdown_ms: u64,
    running: bool,
}

impl RetransmitTimer {
    fn new(initial_rto_ms: u64) -> Self {
        Self {
            initial_rto_ms,
            countdown_ms: 0,
            running: false,
        }
    }

    fn arm(&mut self) {
        if !self.running {
            self.running = true;
            self.countdown_ms = self.initial_rto_ms;
        }
    }

    fn stop(&mut self) {
        self.running = false;
    }

    fn reload(&mut self, backoff: u32) {
        self.countdown_ms = self.initial_rto_ms << backoff;
    }

    /// Advance by `ms`; true when the countdown expired.
    fn advance(&mut self, ms: u64) -> bool {
        if !self.running {
            return false;
        }
        if ms >= self.countdown_ms {
            self.countdown_ms = 0;
            true
        } else {
            self.countdown_ms -= ms;
            false
        }
    }
}

/// A sent segment the peer has not acknowledged yet, remembered under its
/// absolute sequence number. The payload buffer is shared with whatever
/// retransmitted copies go back out.
#[derive(Debug)]
struct Outstanding {
    abs_seqno: u64,
    message: TcpSenderMessage,
}

/// Sending half of a connection: turns the outbound stream into segments
/// bounded by the peer's advertised window, remembers what is unacked, and
/// retransmits on timeout.
#[derive(Debug)]
pub struct TcpSender {
    isn: Wrap32,
    /// Next sequence slot to send (absolute).
    abs_seqno: u64,
    /// Highest cumulative ack accepted (absolute).
    abs_ackno: u64,
    window_size: u16,
    syn_sent: bool,
    syn_acked: bool,
    fin_sent: bool,
    pending_out: VecDeque<TcpSenderMessage>,
    outstanding: VecDeque<Outstanding>,
    timer: RetransmitTimer,
    consecutive_retx: u64,
}

impl TcpSender {
    /// A sender with the given retransmission timeout; picks a random ISN
    /// unless handed a fixed one.
    pub fn new(initial_rto_ms: u64, fixed_isn: Option<Wrap32>) -> Self {
        Self {
            isn: fixed_isn.unwrap_or_else(|| Wrap32::new(rand::random())),
            abs_seqno: 0,
            abs_ackno: 0,
            // Pretend the peer has room for the SYN until it says otherwise;
            // the zero-window probe logic stays unarmed before the first
            // reply either way.
            window_size: 1,
            syn_sent: false,
            syn_acked: false,
            fin_sent: false,
            pending_out: VecDeque::new(),
            outstanding: VecDeque::new(),
            timer: RetransmitTimer::new(initial_rto_ms),
            consecutive_retx: 0,
        }
    }

    pub fn sequence_numbers_in_flight(&self) -> u64 {
        self.abs_seqno - self.abs_ackno
    }

    pub fn consecutive_retransmissions(&self) -> u64 {
        self.consecutive_retx
    }

    pub fn state(&self) -> State {
        if !self.syn_sent {
            State::Closed
        } else if !self.syn_acked {
            State::SynSent
        } else if !self.fin_sent {
            State::Established
        } else if self.outstanding.is_empty() {
            State::FinAcked
        } else {
            State::FinSent
        }
    }

    /// Fill the window from `outbound`, emitting segments until the window
    /// is full, the stream runs dry, or FIN goes out.
    pub fn push(&mut self, outbound: &mut ByteStream) {
        if !self.syn_sent {
            self.syn_sent = true;
            let mut message = TcpSenderMessage {
                seqno: Wrap32::wrap(self.abs_seqno, self.isn),
                syn: true,
                ..Default::default()
            };
            if outbound.is_finished() && self.window_size != 0 {
                self.fin_sent = true;
                message.fin = true;
            }
            self.transmit(message);
            return;
        }
        // Nothing but the SYN may fly before the SYN is acked, and nothing
        // at all after FIN.
        if !self.syn_acked || self.fin_sent {
            return;
        }

        if self.window_size == 0 {
            // Zero window: keep exactly one probe in flight, carrying one
            // byte or the FIN.
            if !self.outstanding.is_empty() {
                return;
            }
            let mut message = TcpSenderMessage {
                seqno: Wrap32::wrap(self.abs_seqno, self.isn),
                ..Default::default()
            };
            if outbound.bytes_buffered() != 0 {
                message.payload = outbound.read(1);
            } else if outbound.is_finished() {
                self.fin_sent = true;
                message.fin = true;
            } else {
                return;
            }
            self.transmit(message);
            return;
        }

        loop {
            let window_room =
                (self.window_size as u64).saturating_sub(self.sequence_numbers_in_flight());
            if window_room == 0 {
                return;
            }
            let payload_len = (window_room as usize)
                .min(MAX_PAYLOAD_SIZE)
                .min(outbound.bytes_buffered());
            let mut message = TcpSenderMessage {
                seqno: Wrap32::wrap(self.abs_seqno, self.isn),
                payload: outbound.read(payload_len),
                ..Default::default()
            };
            // FIN rides along only when the window still has room for it;
            // otherwise it waits for a later segment.
            if (payload_len as u64) < window_room && outbound.is_finished() {
                self.fin_sent = true;
                message.fin = true;
            }
            if message.sequence_length() == 0 {
                return;
            }
            self.transmit(message);
            if self.fin_sent {
                return;
            }
        }
    }

    fn transmit(&mut self, message: TcpSenderMessage) {
        self.timer.arm();
        self.outstanding.push_back(Outstanding {
            abs_seqno: self.abs_seqno,
            message: message.clone(),
        });
        self.abs_seqno += message.sequence_length();
        self.pending_out.push_back(message);
    }

    /// Hand out the next segment queued for the wire.
    pub fn maybe_send(&mut self) -> Option<TcpSenderMessage> {
        self.pending_out.pop_front()
    }

    /// A bare segment carrying the current seqno and nothing else; used by
    /// the receiving side to ack without sending data. Does not touch any
    /// sender state.
    pub fn send_empty_message(&self) -> TcpSenderMessage {
        TcpSenderMessage {
            seqno: Wrap32::wrap(self.abs_seqno, self.isn),
            ..Default::default()
        }
    }

    /// Absorb an ack and window update from the peer's receiver.
    pub fn receive(&mut self, message: TcpReceiverMessage) {
        let Some(ackno) = message.ackno else {
            // Window update from a receiver that has not seen our SYN.
            self.window_size = message.window_size;
            return;
        };

        let new_ackno = ackno.unwrap(self.isn, self.abs_ackno);
        if new_ackno < self.abs_ackno || new_ackno > self.abs_seqno {
            debug!(
                "ignoring ack {} outside [{}, {}]",
                new_ackno, self.abs_ackno, self.abs_seqno
            );
            return;
        }
        self.window_size = message.window_size;
        if new_ackno > 0 {
            self.syn_acked = true;
        }

        while let Some(front) = self.outstanding.front() {
            if front.abs_seqno + front.message.sequence_length() <= new_ackno {
                self.outstanding.pop_front();
            } else {
                break;
            }
        }

        if new_ackno > self.abs_ackno {
            self.abs_ackno = new_ackno;
            self.consecutive_retx = 0;
            self.timer.reload(0);
            if self.outstanding.is_empty() {
                self.timer.stop();
            }
        }
    }

    /// Account for `ms` of elapsed time; on expiry retransmit the oldest
    /// outstanding segment, at most one per call.
    pub fn tick(&mut self, ms_since_last_tick: u64) {
        if !self.timer.advance(ms_since_last_tick) {
            return;
        }
        let Some(front) = self.outstanding.front() else {
            self.timer.stop();
            return;
        };
        // A zero-window probe must keep probing forever, with neither
        // backoff nor a retransmission charge.
        if self.window_size != 0 {
            self.consecutive_retx += 1;
            if self.consecutive_retx > MAX_RETX_ATTEMPTS {
                debug!("retransmission limit reached, giving up");
                self.timer.stop();
                return;
            }
        }
        debug!(
            "retransmitting seqno {} ({} in flight)",
            front.abs_seqno,
            self.sequence_numbers_in_flight()
        );
        self.pending_out.push_back(front.message.clone());
        let backoff = if self.window_size != 0 {
            self.consecutive_retx as u32
        } else {
            0
        };
        self.timer.reload(backoff);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    const RTO: u64 = 1000;

    fn sender() -> TcpSender {
        TcpSender::new(RTO, Some(Wrap32::new(0)))
    }

    fn stream_with(data: &[u8], capacity: usize) -> ByteStream {
        let mut stream = ByteStream::new(capacity);
        stream.push(data);
        stream
    }

    fn ack(ackno: u64, window: u16) -> TcpReceiverMessage {
        TcpReceiverMessage {
            ackno: Some(Wrap32::wrap(ackno, Wrap32::new(0))),
            window_size: window,
        }
    }

    #[test]
    fn syn_then_data_then_retransmit_with_backoff() {
        let mut sender = sender();
        let mut outbound = stream_with(b"abcdefgh", 4);

        sender.push(&mut outbound);
        let syn = sender.maybe_send().expect("SYN should be queued");
        assert!(syn.syn);
        assert_eq!(syn.seqno, Wrap32::new(0));
        assert_eq!(sender.maybe_send(), None);
        assert_eq!(sender.state(), State::SynSent);

        sender.receive(ack(1, 4));
        assert_eq!(sender.state(), State::Established);
        sender.push(&mut outbound);
        let data = sender.maybe_send().expect("window opened");
        assert_eq!(data.seqno, Wrap32::new(1));
        assert_eq!(data.payload, Bytes::from_static(b"abcd"));
        assert_eq!(sender.sequence_numbers_in_flight(), 4);

        sender.tick(999);
        assert_eq!(sender.maybe_send(), None);
        sender.tick(1);
        let retx = sender.maybe_send().expect("timeout expired");
        assert_eq!(retx.payload, Bytes::from_static(b"abcd"));
        assert_eq!(sender.consecutive_retransmissions(), 1);

        // Doubled timeout: nothing at 1999, retransmission at 2000.
        sender.tick(1999);
        assert_eq!(sender.maybe_send(), None);
        sender.tick(1);
        assert!(sender.maybe_send().is_some());
        assert_eq!(sender.consecutive_retransmissions(), 2);
    }

    #[test]
    fn ack_resets_the_backoff_and_stops_an_idle_timer() {
        let mut sender = sender();
        let mut outbound = stream_with(b"abcd", 8);
        sender.push(&mut outbound);
        sender.receive(ack(1, 8));
        sender.push(&mut outbound);
        sender.maybe_send();
        sender.maybe_send();

        sender.tick(RTO);
        assert_eq!(sender.consecutive_retransmissions(), 1);
        assert!(sender.maybe_send().is_some(), "retransmitted copy");
        sender.receive(ack(5, 8));
        assert_eq!(sender.consecutive_retransmissions(), 0);
        assert_eq!(sender.sequence_numbers_in_flight(), 0);
        // Timer stopped: no amount of idle time retransmits.
        sender.tick(100 * RTO);
        assert_eq!(sender.maybe_send(), None);
    }

    #[test]
    fn payload_is_split_at_the_maximum_segment_size() {
        let mut sender = sender();
        let data = vec![b'x'; MAX_PAYLOAD_SIZE + 100];
        let mut outbound = stream_with(&data, MAX_PAYLOAD_SIZE * 2);
        sender.push(&mut outbound);
        sender.receive(ack(1, u16::MAX));
        sender.push(&mut outbound);
        sender.maybe_send();
        let first = sender.maybe_send().expect("first full segment");
        let second = sender.maybe_send().expect("second partial segment");
        assert_eq!(first.payload.len(), MAX_PAYLOAD_SIZE);
        assert_eq!(second.payload.len(), 100);
    }

    #[test]
    fn respects_the_advertised_window() {
        let mut sender = sender();
        let mut outbound = stream_with(b"abcdefgh", 8);
        sender.push(&mut outbound);
        sender.receive(ack(1, 3));
        sender.push(&mut outbound);
        sender.maybe_send();
        let data = sender.maybe_send().expect("window-limited segment");
        assert_eq!(data.payload, Bytes::from_static(b"abc"));
        assert_eq!(sender.maybe_send(), None);

        sender.receive(ack(4, 3));
        sender.push(&mut outbound);
        let more = sender.maybe_send().expect("window slid forward");
        assert_eq!(more.payload, Bytes::from_static(b"def"));
    }

    #[test]
    fn fin_piggybacks_only_when_the_window_has_room() {
        // Window exactly consumed by payload: FIN must wait.
        let mut sender = sender();
        let mut outbound = stream_with(b"abcd", 8);
        outbound.close();
        sender.push(&mut outbound);
        sender.receive(ack(1, 4));
        sender.push(&mut outbound);
        sender.maybe_send();
        let data = sender.maybe_send().expect("payload fills the window");
        assert_eq!(data.payload, Bytes::from_static(b"abcd"));
        assert!(!data.fin);
        assert_eq!(sender.state(), State::Established);

        sender.receive(ack(5, 4));
        sender.push(&mut outbound);
        let fin = sender.maybe_send().expect("FIN follows");
        assert!(fin.fin);
        assert!(fin.payload.is_empty());
        assert_eq!(sender.state(), State::FinSent);

        sender.receive(ack(6, 4));
        assert_eq!(sender.state(), State::FinAcked);
    }

    #[test]
    fn fin_rides_with_the_last_payload_given_room() {
        let mut sender = sender();
        let mut outbound = stream_with(b"abcd", 8);
        outbound.close();
        sender.push(&mut outbound);
        sender.receive(ack(1, 8));
        sender.push(&mut outbound);
        sender.maybe_send();
        let data = sender.maybe_send().expect("payload plus FIN");
        assert_eq!(data.payload, Bytes::from_static(b"abcd"));
        assert!(data.fin);
        assert_eq!(sender.sequence_numbers_in_flight(), 5);
    }

    #[test]
    fn syn_carries_fin_for_an_already_finished_stream() {
        let mut sender = sender();
        let mut outbound = ByteStream::new(8);
        outbound.close();
        sender.push(&mut outbound);
        let syn = sender.maybe_send().expect("SYN+FIN");
        assert!(syn.syn);
        assert!(syn.fin);
        assert_eq!(syn.sequence_length(), 2);
    }

    #[test]
    fn zero_window_probe_is_a_single_byte_without_backoff() {
        let mut sender = sender();
        let mut outbound = stream_with(b"abc", 8);
        sender.push(&mut outbound);
        sender.receive(ack(1, 0));
        sender.push(&mut outbound);
        sender.maybe_send();
        let probe = sender.maybe_send().expect("one probe byte");
        assert_eq!(probe.payload, Bytes::from_static(b"a"));
        assert_eq!(sender.maybe_send(), None);

        // Only one probe may be outstanding.
        sender.push(&mut outbound);
        assert_eq!(sender.maybe_send(), None);

        // Probes retransmit forever at the initial RTO, uncharged.
        for _ in 0..20 {
            sender.tick(RTO);
            let retx = sender.maybe_send().expect("probe retransmitted");
            assert_eq!(retx.payload, Bytes::from_static(b"a"));
            assert_eq!(sender.consecutive_retransmissions(), 0);
        }

        sender.receive(ack(2, 4));
        sender.push(&mut outbound);
        let rest = sender.maybe_send().expect("window reopened");
        assert_eq!(rest.payload, Bytes::from_static(b"bc"));
    }

    #[test]
    fn zero_window_probe_carries_fin_at_end_of_stream() {
        let mut sender = sender();
        let mut outbound = ByteStream::new(8);
        sender.push(&mut outbound);
        sender.maybe_send();
        sender.receive(ack(1, 0));
        outbound.close();
        sender.push(&mut outbound);
        let probe = sender.maybe_send().expect("FIN probe");
        assert!(probe.fin);
    }

    #[test]
    fn gives_up_after_the_retransmission_limit() {
        let mut sender = sender();
        let mut outbound = stream_with(b"ab", 4);
        sender.push(&mut outbound);
        sender.receive(ack(1, 4));
        sender.push(&mut outbound);
        while sender.maybe_send().is_some() {}

        for attempt in 1..=MAX_RETX_ATTEMPTS {
            sender.tick(RTO << (attempt - 1));
            assert!(sender.maybe_send().is_some(), "attempt {attempt}");
            assert_eq!(sender.consecutive_retransmissions(), attempt);
        }
        // One more expiry exceeds the limit: timer stops, nothing goes out.
        sender.tick(RTO << MAX_RETX_ATTEMPTS);
        assert_eq!(sender.maybe_send(), None);
        assert_eq!(sender.consecutive_retransmissions(), MAX_RETX_ATTEMPTS + 1);
        sender.tick(u64::MAX);
        assert_eq!(sender.maybe_send(), None);
    }

    #[test]
    fn ignores_stale_and_impossible_acks() {
        let mut sender = sender();
        let mut outbound = stream_with(b"abcd", 8);
        sender.push(&mut outbound);
        sender.receive(ack(1, 8));
        sender.push(&mut outbound);

        // Beyond anything sent: ignored entirely, window untouched.
        sender.receive(ack(100, 1));
        assert_eq!(sender.sequence_numbers_in_flight(), 4);
        sender.receive(ack(5, 8));
        assert_eq!(sender.sequence_numbers_in_flight(), 0);

        // Moving backwards: ignored.
        sender.receive(ack(1, 1));
        assert_eq!(sender.sequence_numbers_in_flight(), 0);
        sender.push(&mut outbound);
        assert_eq!(sender.maybe_send(), None);
    }

    #[test]
    fn empty_message_reflects_the_next_seqno_and_sends_nothing() {
        let mut sender = sender();
        let mut outbound = stream_with(b"ab", 4);
        sender.push(&mut outbound);
        sender.receive(ack(1, 4));
        sender.push(&mut outbound);

        let empty = sender.send_empty_message();
        assert_eq!(empty.sequence_length(), 0);
        assert_eq!(empty.seqno, Wrap32::wrap(3, Wrap32::new(0)));
        // Not queued and no state advanced.
        assert_eq!(sender.sequence_numbers_in_flight(), 2);
    }

    #[test]
    fn pure_window_update_has_no_ack_side_effects() {
        let mut sender = sender();
        let mut outbound = stream_with(b"ab", 4);
        sender.push(&mut outbound);
        sender.receive(TcpReceiverMessage {
            ackno: None,
            window_size: 0,
        });
        assert_eq!(sender.state(), State::SynSent);
        // SYN is still retransmitted even though the window closed.
        sender.tick(RTO);
        assert!(sender.maybe_send().is_some());
    }
}
