//! Passive-open TCP state machine
//!
//! `transition` is a pure function of the current state, the transmission
//! control block and one inbound segment. It returns the next state, the
//! updated block and the actions the connection must carry out, so it can be
//! driven without threads or a device.
//!
//! ```text
//! LISTEN -> SYN_RECEIVED -> ESTABLISHED -> CLOSE_WAIT -> LAST_ACK -> CLOSED
//! ```

use crate::error::Error;
use crate::transport::tcp::{flags, TcpSegment};

/// TCP connection states as defined in RFC 793, passive side only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcpState {
    Listen,
    SynReceived,
    Established,
    CloseWait,
    LastAck,
    Closed,
}

/// `a < b` in sequence space
pub fn seq_lt(a: u32, b: u32) -> bool {
    (a.wrapping_sub(b) as i32) < 0
}

/// `a <= b` in sequence space
pub fn seq_le(a: u32, b: u32) -> bool {
    a == b || seq_lt(a, b)
}

/// `a > b` in sequence space
pub fn seq_gt(a: u32, b: u32) -> bool {
    seq_lt(b, a)
}

/// Send sequence variables (RFC 793 S3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendSequence {
    /// oldest unacknowledged sequence number
    pub una: u32,
    /// next sequence number to send
    pub nxt: u32,
    /// peer's advertised window
    pub wnd: u32,
    pub up: u32,
    /// segment sequence number used for last window update
    pub wl1: u32,
    /// segment acknowledgment number used for last window update
    pub wl2: u32,
    /// initial send sequence number
    pub iss: u32,
}

/// Receive sequence variables (RFC 793 S3.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiveSequence {
    /// next sequence number expected
    pub nxt: u32,
    pub wnd: u32,
    pub up: u32,
    /// initial receive sequence number
    pub irs: u32,
}

/// Transmission control block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tcb {
    pub send: SendSequence,
    pub recv: ReceiveSequence,
}

/// How an acknowledgment number relates to the send sequence space
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCheck {
    /// `una < ack <= nxt`: new data acknowledged, `una` moved up
    Advanced,
    /// `ack == una`: nothing new acknowledged
    Duplicate,
    Invalid,
}

impl Tcb {
    pub fn new(iss: u32, receive_window: u16) -> Self {
        Tcb {
            send: SendSequence {
                iss,
                una: iss,
                nxt: iss,
                ..SendSequence::default()
            },
            recv: ReceiveSequence {
                wnd: receive_window as u32,
                ..ReceiveSequence::default()
            },
        }
    }

    /// Window advertised on outbound segments
    pub fn advertised_window(&self) -> u16 {
        self.recv.wnd.min(u16::MAX as u32) as u16
    }

    /// True when the segment falls outside what we are willing to accept
    pub fn is_stale(&self, segment: &TcpSegment) -> bool {
        let seq = segment.header.seq_number;
        (!segment.payload.is_empty() && self.recv.wnd == 0)
            || seq_lt(seq, self.recv.nxt)
            || seq_gt(seq, self.recv.nxt.wrapping_add(self.recv.wnd))
    }

    /// Validate the acknowledgment number, advancing `una` when it covers new
    /// data
    pub fn check_ack(&mut self, segment: &TcpSegment) -> AckCheck {
        let header = &segment.header;
        let ack = header.ack_number;
        let check = if seq_lt(self.send.una, ack) && seq_le(ack, self.send.nxt) {
            self.send.una = ack;
            AckCheck::Advanced
        } else if ack == self.send.una {
            AckCheck::Duplicate
        } else {
            return AckCheck::Invalid;
        };

        let seq = header.seq_number;
        if seq_lt(self.send.wl1, seq) || (self.send.wl1 == seq && seq_le(self.send.wl2, ack)) {
            self.send.wnd = header.window_size as u32;
            self.send.wl1 = seq;
            self.send.wl2 = ack;
        }
        check
    }

    fn outbound(&self, bits: u16, seq: u32) -> Outbound {
        Outbound {
            flags: bits,
            seq,
            ack: self.recv.nxt,
            window: self.advertised_window(),
        }
    }

    /// Bare acknowledgment of everything received so far
    pub fn ack(&self) -> Outbound {
        self.outbound(flags::ACK, self.send.nxt)
    }

    /// Reset aborting the connection; a reset carries no acknowledgment
    pub fn reset(&self) -> Outbound {
        Outbound {
            flags: flags::RST,
            seq: self.send.nxt,
            ack: 0,
            window: 0,
        }
    }
}

/// A segment to emit, without addressing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outbound {
    pub flags: u16,
    pub seq: u32,
    pub ack: u32,
    pub window: u16,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Send(Outbound),
    /// In-order payload for the application byte stream
    Deliver(Vec<u8>),
    /// No more bytes will be delivered
    CloseApplication,
}

/// Outcome of one step of the state machine
#[derive(Debug)]
pub struct Transition {
    pub state: TcpState,
    pub tcb: Tcb,
    pub actions: Vec<Action>,
    /// Set when the connection ends abnormally; the host answers with a reset
    pub error: Option<Error>,
}

impl Transition {
    fn stay(state: TcpState, tcb: Tcb) -> Self {
        Transition {
            state,
            tcb,
            actions: Vec::new(),
            error: None,
        }
    }

    fn send(&mut self, segment: Outbound) {
        self.actions.push(Action::Send(segment));
    }

    fn fail(&mut self, error: Error) {
        self.state = TcpState::Closed;
        self.error = Some(error);
    }

    /// Out-of-window segments are answered with a bare ACK and dropped
    fn accept_sequence(&mut self, segment: &TcpSegment) -> bool {
        if self.tcb.is_stale(segment) {
            let ack = self.tcb.ack();
            self.send(ack);
            return false;
        }
        true
    }

    fn listen(&mut self, segment: &TcpSegment) {
        let header = &segment.header;
        if header.is_rst() || header.is_ack() || !header.is_syn() {
            return;
        }

        let iss = self.tcb.send.iss;
        self.tcb.recv.irs = header.seq_number;
        self.tcb.recv.nxt = header.seq_number.wrapping_add(1);
        self.tcb.send.wnd = header.window_size as u32;
        self.tcb.send.wl1 = header.seq_number;
        self.tcb.send.wl2 = iss;

        let syn_ack = self.tcb.outbound(flags::SYN | flags::ACK, iss);
        self.send(syn_ack);
        self.tcb.send.una = iss;
        self.tcb.send.nxt = iss.wrapping_add(1);
        self.state = TcpState::SynReceived;
    }

    fn syn_received(&mut self, segment: &TcpSegment) {
        let header = &segment.header;
        if header.is_rst() {
            self.state = TcpState::Listen;
            return;
        }
        if !self.accept_sequence(segment) || !header.is_ack() || header.is_syn() {
            return;
        }
        if self.tcb.check_ack(segment) == AckCheck::Advanced {
            self.state = TcpState::Established;
        }
    }

    fn established(&mut self, segment: &TcpSegment) {
        let header = &segment.header;
        if header.is_rst() {
            self.fail(Error::ConnectionReset("reset while established"));
            return;
        }
        if !self.accept_sequence(segment) || !header.is_ack() {
            return;
        }
        if header.is_syn() {
            self.fail(Error::ProtocolViolation("syn while established"));
            return;
        }
        if self.tcb.check_ack(segment) == AckCheck::Invalid {
            self.fail(Error::ProtocolViolation("unacceptable ack while established"));
            return;
        }

        if header.seq_number != self.tcb.recv.nxt {
            // in window but ahead of what we expect; there is no reassembly
            if segment.seq_len() > 0 {
                let ack = self.tcb.ack();
                self.send(ack);
            }
            return;
        }

        if !segment.payload.is_empty() {
            self.actions.push(Action::Deliver(segment.payload.clone()));
            self.tcb.recv.nxt = self.tcb.recv.nxt.wrapping_add(segment.payload.len() as u32);
        }
        if header.is_fin() {
            self.tcb.recv.nxt = self.tcb.recv.nxt.wrapping_add(1);
            self.state = TcpState::CloseWait;
            return;
        }
        if !segment.payload.is_empty() {
            let ack = self.tcb.ack();
            self.send(ack);
        }
    }

    fn close_wait(&mut self) {
        let ack = self.tcb.ack();
        self.send(ack);
        self.actions.push(Action::CloseApplication);

        let fin = self.tcb.outbound(flags::FIN | flags::ACK, self.tcb.send.nxt);
        self.send(fin);
        self.tcb.send.nxt = self.tcb.send.nxt.wrapping_add(1);
        self.state = TcpState::LastAck;
    }

    fn last_ack(&mut self, segment: &TcpSegment) {
        let header = &segment.header;
        if header.is_rst() {
            self.fail(Error::ConnectionReset("reset while last-ack"));
            return;
        }
        if !self.accept_sequence(segment) || !header.is_ack() {
            return;
        }
        if header.is_syn() {
            self.fail(Error::ProtocolViolation("syn while last-ack"));
            return;
        }
        match self.tcb.check_ack(segment) {
            AckCheck::Invalid => self.fail(Error::ProtocolViolation("unacceptable ack while last-ack")),
            _ if self.tcb.send.una == self.tcb.send.nxt => self.state = TcpState::Closed,
            // a duplicate ack is tolerated here as in ESTABLISHED; wait for the ack of our FIN
            _ => {}
        }
    }
}

/// Feed one inbound segment to the state machine
///
/// `CloseWait` takes no input; a segment handed to it is dropped and the
/// immediate close-wait step runs instead. `Closed` ignores everything.
pub fn transition(state: TcpState, tcb: Tcb, segment: &TcpSegment) -> Transition {
    let mut step = Transition::stay(state, tcb);
    match state {
        TcpState::Listen => step.listen(segment),
        TcpState::SynReceived => step.syn_received(segment),
        TcpState::Established => step.established(segment),
        TcpState::CloseWait => step.close_wait(),
        TcpState::LastAck => step.last_ack(segment),
        TcpState::Closed => {}
    }
    step
}

/// Run the input-free CLOSE_WAIT step: acknowledge the peer's FIN, close the
/// application stream and send our own FIN
pub fn close_wait(tcb: Tcb) -> Transition {
    let mut step = Transition::stay(TcpState::CloseWait, tcb);
    step.close_wait();
    step
}
