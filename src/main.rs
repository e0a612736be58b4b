use std::io;
use std::net::Ipv4Addr;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::Instant;

use etherparse::IpNumber;
use log::{debug, info, warn};
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};

use netstack::net::frame::Ipv4Datagram;
use netstack::net::segment::{build_segment, parse_segment, PortPair};
use netstack::tcp::state::Available;
use netstack::tcp::{TcpConnection, DEFAULT_CAPACITY, DEFAULT_RTO_MS};

const MTU: usize = 1500;
const TTL: u8 = 64;
const TICK_MS: u8 = 10;

/// The one live connection plus the addressing needed to answer on it.
struct Endpoint {
    connection: TcpConnection,
    local: Ipv4Addr,
    peer: Ipv4Addr,
    /// Our source/destination ports, already flipped from the peer's view.
    ports: PortPair,
}

impl Endpoint {
    /// Echo whatever arrived back into the outbound stream, close once the
    /// peer is done writing, and flush queued segments to the device.
    fn drive(&mut self, nic: &tun_tap::Iface) -> io::Result<()> {
        while self.connection.available().contains(Available::READ) {
            let room = self.connection.outbound().available_capacity();
            let have = self.connection.inbound().bytes_buffered();
            let take = room.min(have);
            if take == 0 {
                break;
            }
            let chunk = self.connection.read(take);
            self.connection.write(&chunk);
        }
        if self.connection.inbound().is_finished() && !self.connection.outbound().is_closed() {
            self.connection.close();
        }

        while let Some(message) = self.connection.maybe_send() {
            let dgram = build_segment(&message, self.ports, self.local, self.peer, TTL)
                .map_err(io::Error::other)?;
            nic.send(&dgram.serialize().map_err(io::Error::other)?)?;
        }
        Ok(())
    }
}

fn handle_packet(conn: &mut Option<Endpoint>, packet: &[u8]) {
    let dgram = match Ipv4Datagram::parse(packet) {
        Ok(dgram) => dgram,
        Err(err) => {
            debug!("ignoring packet ({} bytes): {err}", packet.len());
            return;
        }
    };
    if dgram.header.protocol != IpNumber::TCP {
        return;
    }
    let (message, ports) = match parse_segment(&dgram) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!("ignoring segment: {err}");
            return;
        }
    };

    match conn {
        Some(endpoint)
            if endpoint.peer == dgram.source()
                && endpoint.local == dgram.destination()
                && endpoint.ports == ports.flip() =>
        {
            endpoint.connection.receive(message);
        }
        Some(_) => debug!("ignoring segment from another 4-tuple"),
        None if message.sender.syn => {
            info!(
                "accepting {}:{} -> {}:{}",
                dgram.source(),
                ports.src,
                dgram.destination(),
                ports.dst
            );
            let mut connection = TcpConnection::new(DEFAULT_CAPACITY, DEFAULT_RTO_MS, None);
            connection.receive(message);
            *conn = Some(Endpoint {
                connection,
                local: dgram.destination(),
                peer: dgram.source(),
                ports: ports.flip(),
            });
        }
        None => debug!("no connection and no SYN, ignoring segment"),
    }
}

/// Single-connection TCP echo server on a tun device. Assign the device an
/// address and route, connect to any port on a neighboring address, and
/// every byte comes back.
fn main() -> io::Result<()> {
    env_logger::init();
    let nic = tun_tap::Iface::without_packet_info("tun0", tun_tap::Mode::Tun)?;
    info!("echo server up on tun0");

    let mut buf = [0u8; MTU];
    let mut conn: Option<Endpoint> = None;
    let mut last_tick = Instant::now();

    loop {
        // tun_tap only hands out a RawFd.
        let fd = unsafe { BorrowedFd::borrow_raw(nic.as_raw_fd()) };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        poll(&mut fds, PollTimeout::from(TICK_MS)).map_err(io::Error::from)?;
        let readable = fds[0]
            .revents()
            .is_some_and(|revents| revents.contains(PollFlags::POLLIN));

        let elapsed = last_tick.elapsed().as_millis() as u64;
        if elapsed > 0 {
            last_tick = Instant::now();
            if let Some(endpoint) = conn.as_mut() {
                endpoint.connection.tick(elapsed);
            }
        }

        if readable {
            let nbytes = nic.recv(&mut buf)?;
            handle_packet(&mut conn, &buf[..nbytes]);
        }

        let mut finished = false;
        if let Some(endpoint) = conn.as_mut() {
            endpoint.drive(&nic)?;
            if endpoint.connection.is_done() {
                info!("connection with {} closed", endpoint.peer);
                finished = true;
            }
        }
        if finished {
            conn = None;
        }
    }
}
