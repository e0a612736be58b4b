use std::io;

use bytes::Bytes;
use etherparse::{EtherType, Ethernet2Header, Ethernet2HeaderSlice, Ipv4Header, Ipv4HeaderSlice};
use thiserror::Error;

use super::EthernetAddress;

/// Why a wire blob was rejected. Receivers drop the input either way; the
/// variants exist for logging.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("bad ethernet header")]
    Ethernet,
    #[error("bad ipv4 header")]
    Ipv4,
    #[error("bad tcp header")]
    Tcp,
    #[error("not an ARP binding of IPv4 onto Ethernet")]
    ArpBinding,
    #[error("payload too large for one datagram")]
    Oversized,
    #[error("serialize: {0}")]
    Io(#[from] io::Error),
}

/// One Ethernet II frame, payload left opaque.
#[derive(Debug, Clone)]
pub struct EthernetFrame {
    pub dst: EthernetAddress,
    pub src: EthernetAddress,
    pub ethertype: EtherType,
    pub payload: Bytes,
}

impl EthernetFrame {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let header = Ethernet2HeaderSlice::from_slice(buf).map_err(|_| WireError::Ethernet)?;
        Ok(Self {
            dst: header.destination(),
            src: header.source(),
            ethertype: header.ether_type(),
            payload: Bytes::copy_from_slice(&buf[Ethernet2Header::LEN..]),
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>, WireError> {
        let header = Ethernet2Header {
            destination: self.dst,
            source: self.src,
            ether_type: self.ethertype,
        };
        let mut out = Vec::with_capacity(Ethernet2Header::LEN + self.payload.len());
        header.write(&mut out)?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }
}

/// One IPv4 datagram: parsed header plus opaque payload.
#[derive(Debug, Clone)]
pub struct Ipv4Datagram {
    pub header: Ipv4Header,
    pub payload: Bytes,
}

impl Ipv4Datagram {
    /// A datagram around an opaque payload, header checksum included.
    pub fn new(
        src: std::net::Ipv4Addr,
        dst: std::net::Ipv4Addr,
        protocol: etherparse::IpNumber,
        ttl: u8,
        payload: Bytes,
    ) -> Result<Self, WireError> {
        let len = u16::try_from(payload.len()).map_err(|_| WireError::Oversized)?;
        let mut header = Ipv4Header::new(len, ttl, protocol, src.octets(), dst.octets())
            .map_err(|_| WireError::Oversized)?;
        header.header_checksum = header.calc_header_checksum();
        Ok(Self { header, payload })
    }

    /// Everything after the header is the payload; the declared total
    /// length is not consulted, so link-layer padding ends up in the
    /// payload of undersized frames.
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        let slice = Ipv4HeaderSlice::from_slice(buf).map_err(|_| WireError::Ipv4)?;
        let header_len = slice.slice().len();
        Ok(Self {
            header: slice.to_header(),
            payload: Bytes::copy_from_slice(&buf[header_len..]),
        })
    }

    pub fn serialize(&self) -> Result<Vec<u8>, WireError> {
        let mut out = Vec::with_capacity(self.header.header_len() as usize + self.payload.len());
        self.header.write(&mut out)?;
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    pub fn source(&self) -> std::net::Ipv4Addr {
        std::net::Ipv4Addr::from(self.header.source)
    }

    pub fn destination(&self) -> std::net::Ipv4Addr {
        std::net::Ipv4Addr::from(self.header.destination)
    }
}
