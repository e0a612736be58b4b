use std::net::Ipv4Addr;

use bytes::Bytes;
use etherparse::{IpNumber, Ipv4Header, TcpHeader, TcpHeaderSlice};

use crate::tcp::{TcpMessage, TcpReceiverMessage, TcpSenderMessage, Wrap32};

use super::frame::{Ipv4Datagram, WireError};

/// Source and destination ports of a segment. The stack tracks a single
/// connection, so ports ride alongside the message rather than inside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    pub src: u16,
    pub dst: u16,
}

impl PortPair {
    pub fn flip(self) -> Self {
        Self {
            src: self.dst,
            dst: self.src,
        }
    }
}

/// Pull the TCP segment out of a datagram's payload.
pub fn parse_segment(dgram: &Ipv4Datagram) -> Result<(TcpMessage, PortPair), WireError> {
    let tcp = TcpHeaderSlice::from_slice(&dgram.payload).map_err(|_| WireError::Tcp)?;
    let header_len = tcp.slice().len();
    let message = TcpMessage {
        sender: TcpSenderMessage {
            seqno: Wrap32::new(tcp.sequence_number()),
            syn: tcp.syn(),
            payload: dgram.payload.slice(header_len..),
            fin: tcp.fin(),
        },
        receiver: TcpReceiverMessage {
            ackno: tcp
                .ack()
                .then(|| Wrap32::new(tcp.acknowledgment_number())),
            window_size: tcp.window_size(),
        },
    };
    Ok((
        message,
        PortPair {
            src: tcp.source_port(),
            dst: tcp.destination_port(),
        },
    ))
}

/// Wrap a segment in an IPv4 datagram, TCP checksum computed over the
/// pseudo-header.
pub fn build_segment(
    message: &TcpMessage,
    ports: PortPair,
    src: Ipv4Addr,
    dst: Ipv4Addr,
    ttl: u8,
) -> Result<Ipv4Datagram, WireError> {
    let mut tcp = TcpHeader::new(
        ports.src,
        ports.dst,
        message.sender.seqno.raw(),
        message.receiver.window_size,
    );
    tcp.syn = message.sender.syn;
    tcp.fin = message.sender.fin;
    if let Some(ackno) = message.receiver.ackno {
        tcp.ack = true;
        tcp.acknowledgment_number = ackno.raw();
    }

    let payload = &message.sender.payload;
    let total_len = u16::try_from(tcp.header_len() as usize + payload.len())
        .map_err(|_| WireError::Oversized)?;
    let mut header = Ipv4Header::new(total_len, ttl, IpNumber::TCP, src.octets(), dst.octets())
        .map_err(|_| WireError::Oversized)?;
    header.header_checksum = header.calc_header_checksum();
    tcp.checksum = tcp
        .calc_checksum_ipv4(&header, payload)
        .map_err(|_| WireError::Oversized)?;

    let mut bytes = Vec::with_capacity(tcp.header_len() as usize + payload.len());
    tcp.write(&mut bytes)?;
    bytes.extend_from_slice(payload);
    Ok(Ipv4Datagram {
        header,
        payload: Bytes::from(bytes),
    })
}
