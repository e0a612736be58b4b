use std::collections::{HashMap, VecDeque};
use std::net::Ipv4Addr;

use bytes::Bytes;
use etherparse::EtherType;
use log::{debug, warn};

use super::arp::{self, ArpMessage};
use super::frame::{EthernetFrame, Ipv4Datagram};
use super::{EthernetAddress, ETHERNET_BROADCAST};

/// A cached IP-to-MAC binding stays authoritative this long.
pub const CACHE_ENTRY_TTL_MS: u64 = 30_000;
/// Minimum spacing between ARP requests for the same IP.
pub const ARP_REQUEST_INTERVAL_MS: u64 = 5_000;

#[derive(Debug)]
struct CacheEntry {
    eth_addr: EthernetAddress,
    ttl_ms: u64,
}

/// Datagrams parked while an ARP request for their next hop is in the air.
/// An entry exists iff a request went out within the last
/// `ARP_REQUEST_INTERVAL_MS` and no reply has arrived; never alongside a
/// cache entry for the same IP.
#[derive(Debug, Default)]
struct WaitlistEntry {
    queued: VecDeque<Ipv4Datagram>,
    since_request_ms: u64,
}

/// Ethernet attachment point: frames outgoing IPv4 datagrams, resolving
/// next-hop MACs with ARP, and answers ARP on behalf of its own address.
#[derive(Debug)]
pub struct NetworkInterface {
    eth_addr: EthernetAddress,
    ip_addr: Ipv4Addr,
    cache: HashMap<Ipv4Addr, CacheEntry>,
    waitlist: HashMap<Ipv4Addr, WaitlistEntry>,
    frames_out: VecDeque<EthernetFrame>,
}

impl NetworkInterface {
    pub fn new(eth_addr: EthernetAddress, ip_addr: Ipv4Addr) -> Self {
        debug!("interface {:02x?} has address {}", eth_addr, ip_addr);
        Self {
            eth_addr,
            ip_addr,
            cache: HashMap::new(),
            waitlist: HashMap::new(),
            frames_out: VecDeque::new(),
        }
    }

    pub fn eth_addr(&self) -> EthernetAddress {
        self.eth_addr
    }

    pub fn ip_addr(&self) -> Ipv4Addr {
        self.ip_addr
    }

    /// Send `dgram` toward `next_hop`, resolving its MAC first if needed.
    /// With the MAC unknown the datagram waits on the ARP reply; requests
    /// for the same IP are not repeated more than once per
    /// `ARP_REQUEST_INTERVAL_MS`.
    pub fn send_datagram(&mut self, dgram: Ipv4Datagram, next_hop: Ipv4Addr) {
        if let Some(entry) = self.cache.get(&next_hop) {
            let dst = entry.eth_addr;
            self.enqueue_ipv4(dst, &dgram);
            return;
        }

        let is_new = !self.waitlist.contains_key(&next_hop);
        let entry = self.waitlist.entry(next_hop).or_default();
        entry.queued.push_back(dgram);
        if is_new || entry.since_request_ms > ARP_REQUEST_INTERVAL_MS {
            entry.since_request_ms = 0;
            self.broadcast_request(next_hop);
        }
    }

    /// Process one frame off the wire; IPv4 payloads come back to the
    /// caller, ARP is handled internally, everything else is dropped.
    pub fn recv_frame(&mut self, frame: &EthernetFrame) -> Option<Ipv4Datagram> {
        if frame.dst != self.eth_addr && frame.dst != ETHERNET_BROADCAST {
            return None;
        }
        if frame.ethertype == EtherType::IPV4 {
            match Ipv4Datagram::parse(&frame.payload) {
                Ok(dgram) => return Some(dgram),
                Err(err) => warn!("dropping bad ipv4 payload: {err}"),
            }
        } else if frame.ethertype == EtherType::ARP {
            self.recv_arp(&frame.payload);
        } else {
            debug!("ignoring ethertype {:?}", frame.ethertype);
        }
        None
    }

    /// Age the ARP cache and the waitlist request timers.
    pub fn tick(&mut self, ms_since_last_tick: u64) {
        self.cache.retain(|ip, entry| {
            if entry.ttl_ms <= ms_since_last_tick {
                debug!("arp: expiring {ip}");
                false
            } else {
                entry.ttl_ms -= ms_since_last_tick;
                true
            }
        });
        for entry in self.waitlist.values_mut() {
            entry.since_request_ms += ms_since_last_tick;
        }
    }

    /// Hand out the next frame queued for the wire.
    pub fn maybe_send(&mut self) -> Option<EthernetFrame> {
        self.frames_out.pop_front()
    }

    fn recv_arp(&mut self, payload: &[u8]) {
        let message = match ArpMessage::parse(payload) {
            Ok(message) => message,
            Err(err) => {
                warn!("dropping bad arp payload: {err}");
                return;
            }
        };

        debug!(
            "arp: {} is-at {:02x?}",
            message.sender_ip, message.sender_mac
        );
        self.cache.insert(
            message.sender_ip,
            CacheEntry {
                eth_addr: message.sender_mac,
                ttl_ms: CACHE_ENTRY_TTL_MS,
            },
        );
        if let Some(entry) = self.waitlist.remove(&message.sender_ip) {
            for dgram in entry.queued {
                self.enqueue_ipv4(message.sender_mac, &dgram);
            }
        }

        if message.opcode == arp::OPCODE_REQUEST && message.target_ip == self.ip_addr {
            let reply = ArpMessage {
                opcode: arp::OPCODE_REPLY,
                sender_mac: self.eth_addr,
                sender_ip: self.ip_addr,
                target_mac: message.sender_mac,
                target_ip: message.sender_ip,
            };
            let frame = self.frame(
                message.sender_mac,
                EtherType::ARP,
                Bytes::copy_from_slice(&reply.to_bytes()),
            );
            self.frames_out.push_back(frame);
        }
    }

    fn broadcast_request(&mut self, target_ip: Ipv4Addr) {
        debug!("arp: who-has {target_ip}");
        let request = ArpMessage {
            opcode: arp::OPCODE_REQUEST,
            sender_mac: self.eth_addr,
            sender_ip: self.ip_addr,
            target_mac: [0; 6],
            target_ip,
        };
        let frame = self.frame(
            ETHERNET_BROADCAST,
            EtherType::ARP,
            Bytes::copy_from_slice(&request.to_bytes()),
        );
        self.frames_out.push_back(frame);
    }

    fn enqueue_ipv4(&mut self, dst: EthernetAddress, dgram: &Ipv4Datagram) {
        match dgram.serialize() {
            Ok(bytes) => {
                let frame = self.frame(dst, EtherType::IPV4, Bytes::from(bytes));
                self.frames_out.push_back(frame);
            }
            Err(err) => warn!("dropping unserializable datagram: {err}"),
        }
    }

    fn frame(&self, dst: EthernetAddress, ethertype: EtherType, payload: Bytes) -> EthernetFrame {
        EthernetFrame {
            dst,
            src: self.eth_addr,
            ethertype,
            payload,
        }
    }
}
