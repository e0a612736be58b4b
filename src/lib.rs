//! A user-space TCP/IP data plane: bounded byte streams, an out-of-order
//! reassembler, the sender and receiver halves of a TCP connection, and an
//! ARP-backed Ethernet layer with a longest-prefix-match router.
//!
//! Everything is single-threaded and cooperative. An external drive loop
//! feeds frames and segments in, calls `tick(ms)` for the passage of time,
//! and drains the `maybe_send` queues; no operation blocks or suspends.

pub mod net;
pub mod stream;
pub mod tcp;

pub use stream::ByteStream;
