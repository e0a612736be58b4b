//! Link and network layer: Ethernet frames, the ARP resolver, and IPv4
//! forwarding. Header layouts come from `etherparse` except ARP, which has
//! its own fixed 28-byte codec.

pub mod arp;
pub mod frame;
pub mod interface;
pub mod router;
pub mod segment;

pub use frame::{EthernetFrame, Ipv4Datagram, WireError};
pub use interface::NetworkInterface;
pub use router::Router;

/// Six-byte IEEE 802 hardware address.
pub type EthernetAddress = [u8; 6];

/// Frames for everyone on the link.
pub const ETHERNET_BROADCAST: EthernetAddress = [0xff; 6];
