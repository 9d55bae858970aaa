//! A single TCP connection running on its own thread
//!
//! The connection owns its TCB and blocks only on its inbound queue or on room
//! in the application byte stream. Everything it wants sent goes to the
//! host's output multiplexer, tagged with its key.

use std::fmt;
use std::io::{self, Read};
use std::net::Ipv4Addr;
use std::sync::mpsc::{Receiver, Sender, SyncSender, TrySendError};

use log::{debug, info, warn};

use crate::error::Error;
use crate::transport::state::{self, Action, TcpState, Tcb, Transition};
use crate::transport::tcp::TcpSegment;
use crate::transport::OutputEvent;

/// The 4-tuple identifying one connection, seen from the local side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionKey {
    pub local_addr: [u8; 4],
    pub remote_addr: [u8; 4],
    pub local_port: u16,
    pub remote_port: u16,
}

impl fmt::Display for ConnectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} <- {}:{}",
            Ipv4Addr::from(self.local_addr),
            self.local_port,
            Ipv4Addr::from(self.remote_addr),
            self.remote_port
        )
    }
}

pub(crate) struct Connection {
    key: ConnectionKey,
    state: TcpState,
    tcb: Tcb,
    inbound: Receiver<TcpSegment>,
    outbound: Sender<OutputEvent>,
    application: Option<SyncSender<Vec<u8>>>,
    /// Handed to the listener once the handshake completes
    stream: Option<TcpStream>,
    accept: SyncSender<TcpStream>,
    error: Option<Error>,
}

impl Connection {
    pub(crate) fn new(
        key: ConnectionKey,
        tcb: Tcb,
        inbound: Receiver<TcpSegment>,
        outbound: Sender<OutputEvent>,
        application: (SyncSender<Vec<u8>>, Receiver<Vec<u8>>),
        accept: SyncSender<TcpStream>,
    ) -> Self {
        let (data_tx, data_rx) = application;
        Connection {
            key,
            state: TcpState::Listen,
            tcb,
            inbound,
            outbound,
            application: Some(data_tx),
            stream: Some(TcpStream::new(key, data_rx)),
            accept,
            error: None,
        }
    }

    /// Drive the state machine until it reaches CLOSED, then tell the host
    pub(crate) fn run(mut self) {
        debug!("{}: connection started", self.key);
        loop {
            match self.state {
                TcpState::Closed => break,
                TcpState::CloseWait => {
                    let step = state::close_wait(self.tcb);
                    self.apply(step);
                }
                _ => match self.inbound.recv() {
                    Ok(segment) => {
                        let step = state::transition(self.state, self.tcb, &segment);
                        self.apply(step);
                    }
                    Err(_) => {
                        // the host closed our queue: abort without output
                        debug!("{}: inbound queue closed in {:?}", self.key, self.state);
                        self.state = TcpState::Closed;
                    }
                },
            }
        }

        match &self.error {
            Some(error) => info!("{}: closed with error: {}", self.key, error),
            None => info!("{}: closed", self.key),
        }
        let closed = OutputEvent::Closed {
            key: self.key,
            error: self.error.take(),
            send_next: self.tcb.send.nxt,
        };
        if self.outbound.send(closed).is_err() {
            debug!("{}: output multiplexer already stopped", self.key);
        }
    }

    fn apply(&mut self, step: Transition) {
        let previous = self.state;
        if step.state != previous {
            debug!("{}: {:?} -> {:?}", self.key, previous, step.state);
        }
        self.state = step.state;
        self.tcb = step.tcb;

        if previous == TcpState::SynReceived && self.state == TcpState::Established {
            self.hand_to_listener();
        }

        for action in step.actions {
            match action {
                Action::Send(segment) => {
                    let event = OutputEvent::Segment {
                        key: self.key,
                        segment,
                    };
                    if self.outbound.send(event).is_err() {
                        debug!("{}: output multiplexer already stopped", self.key);
                    }
                }
                Action::Deliver(bytes) => self.deliver(bytes),
                Action::CloseApplication => self.application = None,
            }
        }

        if step.error.is_some() {
            self.error = step.error;
        }
    }

    fn hand_to_listener(&mut self) {
        if let Some(stream) = self.stream.take() {
            match self.accept.try_send(stream) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => warn!("{}: accept backlog full", self.key),
                Err(TrySendError::Disconnected(_)) => debug!("{}: listener is gone", self.key),
            }
        }
    }

    fn deliver(&mut self, bytes: Vec<u8>) {
        if let Some(application) = &self.application {
            // blocks while the application is behind
            if application.send(bytes).is_err() {
                debug!("{}: application stopped reading", self.key);
                self.application = None;
            }
        }
    }
}

/// Application end of an accepted connection
///
/// Yields the bytes delivered in order by the peer; ends once the peer's FIN
/// closes the stream (or the connection goes away).
#[derive(Debug)]
pub struct TcpStream {
    key: ConnectionKey,
    data: Receiver<Vec<u8>>,
    pending: Vec<u8>,
    offset: usize,
}

impl TcpStream {
    fn new(key: ConnectionKey, data: Receiver<Vec<u8>>) -> Self {
        TcpStream {
            key,
            data,
            pending: Vec::new(),
            offset: 0,
        }
    }

    pub fn key(&self) -> ConnectionKey {
        self.key
    }

    /// Next chunk delivered by the peer, or None at end of stream
    pub fn recv(&mut self) -> Option<Vec<u8>> {
        if self.offset < self.pending.len() {
            let rest = self.pending.split_off(self.offset);
            self.pending.clear();
            self.offset = 0;
            return Some(rest);
        }
        self.data.recv().ok()
    }
}

impl Read for TcpStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.offset == self.pending.len() {
            match self.data.recv() {
                Ok(chunk) => {
                    self.pending = chunk;
                    self.offset = 0;
                }
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(self.pending.len() - self.offset);
        buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

/// Accepts connections opened on one local port
#[derive(Debug)]
pub struct TcpListener {
    port: u16,
    incoming: Receiver<TcpStream>,
}

impl TcpListener {
    pub(crate) fn new(port: u16, incoming: Receiver<TcpStream>) -> Self {
        TcpListener { port, incoming }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Block until a connection completes its handshake
    ///
    /// Returns None once the host has shut down.
    pub fn accept(&self) -> Option<TcpStream> {
        self.incoming.recv().ok()
    }
}
