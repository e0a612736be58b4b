use bitflags::bitflags;

/// Coarse lifecycle of the sending side of a connection.
///
/// - `Closed`: nothing sent yet.
/// - `SynSent`: SYN is on the wire but has not been acknowledged.
/// - `Established`: SYN acknowledged; the data transfer phase.
/// - `FinSent`: FIN is on the wire but some sent sequence numbers are
///   still unacknowledged.
/// - `FinAcked`: everything through FIN has been acknowledged; the sending
///   side is done.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    SynSent,
    Established,
    FinSent,
    FinAcked,
}

impl State {
    /// True once our FIN has been acknowledged.
    pub fn is_terminal(&self) -> bool {
        matches!(self, State::FinAcked)
    }
}

bitflags! {
    /// What the application can usefully do with a connection right now.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Available: u8 {
        const READ = 0b01;
        const WRITE = 0b10;
    }
}
