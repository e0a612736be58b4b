use std::net::Ipv4Addr;

use super::frame::WireError;
use super::EthernetAddress;

pub const OPCODE_REQUEST: u16 = 1;
pub const OPCODE_REPLY: u16 = 2;

const HARDWARE_ETHERNET: u16 = 1;
const PROTOCOL_IPV4: u16 = 0x0800;

/// An ARP message binding IPv4 onto Ethernet is always 28 bytes.
pub const MESSAGE_LEN: usize = 28;

/// ARP request or reply for the IPv4-over-Ethernet binding. Anything with
/// other hardware/protocol types fails to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArpMessage {
    pub opcode: u16,
    pub sender_mac: EthernetAddress,
    pub sender_ip: Ipv4Addr,
    pub target_mac: EthernetAddress,
    pub target_ip: Ipv4Addr,
}

impl ArpMessage {
    pub fn parse(buf: &[u8]) -> Result<Self, WireError> {
        if buf.len() < MESSAGE_LEN {
            return Err(WireError::Truncated {
                need: MESSAGE_LEN,
                have: buf.len(),
            });
        }
        let hardware = u16::from_be_bytes([buf[0], buf[1]]);
        let protocol = u16::from_be_bytes([buf[2], buf[3]]);
        if hardware != HARDWARE_ETHERNET || protocol != PROTOCOL_IPV4 || buf[4] != 6 || buf[5] != 4
        {
            return Err(WireError::ArpBinding);
        }
        let mut sender_mac = [0u8; 6];
        sender_mac.copy_from_slice(&buf[8..14]);
        let mut target_mac = [0u8; 6];
        target_mac.copy_from_slice(&buf[18..24]);
        Ok(Self {
            opcode: u16::from_be_bytes([buf[6], buf[7]]),
            sender_mac,
            sender_ip: Ipv4Addr::new(buf[14], buf[15], buf[16], buf[17]),
            target_mac,
            target_ip: Ipv4Addr::new(buf[24], buf[25], buf[26], buf[27]),
        })
    }

    pub fn to_bytes(&self) -> [u8; MESSAGE_LEN] {
        let mut buf = [0u8; MESSAGE_LEN];
        buf[0..2].copy_from_slice(&HARDWARE_ETHERNET.to_be_bytes());
        buf[2..4].copy_from_slice(&PROTOCOL_IPV4.to_be_bytes());
        buf[4] = 6;
        buf[5] = 4;
        buf[6..8].copy_from_slice(&self.opcode.to_be_bytes());
        buf[8..14].copy_from_slice(&self.sender_mac);
        buf[14..18].copy_from_slice(&self.sender_ip.octets());
        buf[18..24].copy_from_slice(&self.target_mac);
        buf[24..28].copy_from_slice(&self.target_ip.octets());
        buf
    }
}
