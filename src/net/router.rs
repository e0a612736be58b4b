use std::collections::VecDeque;
use std::net::Ipv4Addr;

use log::debug;

use super::frame::{EthernetFrame, Ipv4Datagram};
use super::interface::NetworkInterface;

#[derive(Debug)]
struct Route {
    prefix: u32,
    prefix_len: u8,
    next_hop: Option<Ipv4Addr>,
    interface_idx: usize,
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        0xffff_ffff << (32 - u32::from(prefix_len))
    }
}

/// Forwards IPv4 datagrams between its interfaces by longest-prefix match.
/// The routing table is an unordered list; ties on prefix length go to the
/// row added first.
#[derive(Debug, Default)]
pub struct Router {
    interfaces: Vec<NetworkInterface>,
    routes: Vec<Route>,
    inbound: VecDeque<Ipv4Datagram>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach an interface; returns the index to name it in routes.
    pub fn add_interface(&mut self, interface: NetworkInterface) -> usize {
        self.interfaces.push(interface);
        self.interfaces.len() - 1
    }

    pub fn interface(&mut self, idx: usize) -> &mut NetworkInterface {
        &mut self.interfaces[idx]
    }

    /// Datagrams matching `prefix`/`prefix_len` leave through interface
    /// `interface_idx`; `next_hop` of `None` means the network is directly
    /// attached and the destination itself is the next hop.
    pub fn add_route(
        &mut self,
        prefix: Ipv4Addr,
        prefix_len: u8,
        next_hop: Option<Ipv4Addr>,
        interface_idx: usize,
    ) {
        debug!("route: {prefix}/{prefix_len} => {next_hop:?} on interface {interface_idx}");
        self.routes.push(Route {
            prefix: u32::from(prefix),
            prefix_len,
            next_hop,
            interface_idx,
        });
    }

    /// Deliver a frame that arrived on interface `idx`, queueing any IPv4
    /// datagram it carried for `route`.
    pub fn recv_frame(&mut self, idx: usize, frame: &EthernetFrame) {
        if let Some(dgram) = self.interfaces[idx].recv_frame(frame) {
            self.inbound.push_back(dgram);
        }
    }

    /// Route everything received since the last call.
    pub fn route(&mut self) {
        while let Some(dgram) = self.inbound.pop_front() {
            self.route_one_datagram(dgram);
        }
    }

    pub fn route_one_datagram(&mut self, mut dgram: Ipv4Datagram) {
        if dgram.header.time_to_live <= 1 {
            debug!("ttl expired toward {}, dropping", dgram.destination());
            return;
        }

        let dst = u32::from(dgram.destination());
        let mut best: Option<&Route> = None;
        for route in &self.routes {
            if dst & mask(route.prefix_len) != route.prefix {
                continue;
            }
            if best.map_or(true, |b| route.prefix_len > b.prefix_len) {
                best = Some(route);
            }
        }
        let Some(route) = best else {
            debug!("no route to {}, dropping", dgram.destination());
            return;
        };
        let next_hop = route.next_hop.unwrap_or_else(|| dgram.destination());
        let interface_idx = route.interface_idx;

        dgram.header.time_to_live -= 1;
        dgram.header.header_checksum = dgram.header.calc_header_checksum();
        self.interfaces[interface_idx].send_datagram(dgram, next_hop);
    }

    /// Advance every interface's ARP timers.
    pub fn tick(&mut self, ms_since_last_tick: u64) {
        for interface in &mut self.interfaces {
            interface.tick(ms_since_last_tick);
        }
    }
}
