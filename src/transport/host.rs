//! Connection directory and output multiplexer
//!
//! The read loop hands inbound segments to `TcpHost::handle`, which never
//! blocks: it finds (or creates) the matching connection and tries to enqueue
//! the segment. Connections report outbound segments and their closure on a
//! shared channel drained by a single `Multiplexer`, which owns all TCP writes
//! to the device.

use std::collections::HashMap;
use std::sync::mpsc::{channel, sync_channel, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;

use log::{debug, info, warn};

use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::iface::device::{Identity, Link};
use crate::iface::Outcome;
use crate::link::arp_cache::ArpCache;
use crate::link::ethernet::{ethertype, EthernetFrame};
use crate::network::ipv4::{protocol, Ipv4Datagram, Ipv4Header};
use crate::transport::connection::{Connection, ConnectionKey, TcpListener, TcpStream};
use crate::transport::state::{Outbound, Tcb};
use crate::transport::tcp::TcpSegment;
use crate::transport::OutputEvent;

const ACCEPT_BACKLOG: usize = 16;

struct ConnectionHandle {
    inbound: SyncSender<TcpSegment>,
    /// Link address the opening segment came from
    link_addr: [u8; 6],
}

/// The directory of live connections and listening ports
pub struct TcpHost {
    identity: Identity,
    receive_window: u16,
    inbound_queue: usize,
    application_queue: usize,
    max_connections: usize,
    connections: Mutex<HashMap<ConnectionKey, ConnectionHandle>>,
    listeners: Mutex<HashMap<u16, SyncSender<TcpStream>>>,
    output: Sender<OutputEvent>,
}

impl TcpHost {
    /// Create the host and the receiving end of its output channel
    pub fn new(config: &StackConfig) -> (Self, Receiver<OutputEvent>) {
        let (output, events) = channel();
        let host = TcpHost {
            identity: config.identity(),
            receive_window: config.receive_window,
            inbound_queue: config.inbound_queue.max(1),
            application_queue: config.application_queue.max(1),
            max_connections: config.max_connections,
            connections: Mutex::new(HashMap::new()),
            listeners: Mutex::new(HashMap::new()),
            output,
        };
        (host, events)
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<ConnectionKey, ConnectionHandle>> {
        self.connections.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, HashMap<u16, SyncSender<TcpStream>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accept passive opens on `port`
    pub fn listen(&self, port: u16) -> Result<TcpListener> {
        let mut listeners = self.listeners();
        if listeners.contains_key(&port) {
            return Err(Error::Unsupported("port already listening"));
        }
        let (accept, incoming) = sync_channel(ACCEPT_BACKLOG);
        listeners.insert(port, accept);
        info!("listening on tcp port {}", port);
        Ok(TcpListener::new(port, incoming))
    }

    pub fn connection_count(&self) -> usize {
        self.connections().len()
    }

    pub fn contains(&self, key: &ConnectionKey) -> bool {
        self.connections().contains_key(key)
    }

    /// Route the segment carried by `datagram` to its connection
    ///
    /// Never produces a synchronous reply: connections answer through the
    /// multiplexer.
    pub fn handle(&self, datagram: &Ipv4Datagram, link_src: [u8; 6]) -> Result<Outcome> {
        let header = &datagram.header;
        let segment = TcpSegment::decode(header.src_addr, header.dst_addr, &datagram.payload)?;
        let key = ConnectionKey {
            local_addr: header.dst_addr,
            remote_addr: header.src_addr,
            local_port: segment.header.dst_port,
            remote_port: segment.header.src_port,
        };

        let inbound = {
            let mut connections = self.connections();
            let existing = connections.get(&key).map(|handle| handle.inbound.clone());
            match existing {
                Some(inbound) => inbound,
                None => {
                    let tcp = &segment.header;
                    if !tcp.is_syn() || tcp.is_ack() || tcp.is_rst() {
                        debug!("{}: no connection for segment, dropped", key);
                        return Ok(Outcome::Consumed);
                    }
                    if connections.len() >= self.max_connections {
                        warn!("{}: connection limit {} reached, syn dropped", key, self.max_connections);
                        return Ok(Outcome::Consumed);
                    }
                    let inbound = self.open(key)?;
                    connections.insert(
                        key,
                        ConnectionHandle {
                            inbound: inbound.clone(),
                            link_addr: link_src,
                        },
                    );
                    inbound
                }
            }
        };

        match inbound.try_send(segment) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => warn!("{}: inbound queue full, segment dropped", key),
            Err(TrySendError::Disconnected(_)) => debug!("{}: connection is closing, segment dropped", key),
        }
        Ok(Outcome::Consumed)
    }

    /// Spawn a connection in LISTEN for `key`
    fn open(&self, key: ConnectionKey) -> Result<SyncSender<TcpSegment>> {
        let accept = match self.listeners().get(&key.local_port) {
            Some(accept) => accept.clone(),
            None => return Err(Error::Unsupported("tcp port not listening")),
        };

        let (inbound_tx, inbound_rx) = sync_channel(self.inbound_queue);
        let connection = Connection::new(
            key,
            Tcb::new(rand::random(), self.receive_window),
            inbound_rx,
            self.output.clone(),
            sync_channel(self.application_queue),
            accept,
        );
        thread::Builder::new()
            .name(format!("tcp-{}", key.remote_port))
            .spawn(move || connection.run())?;
        info!("{}: new connection", key);
        Ok(inbound_tx)
    }

    fn remove(&self, key: &ConnectionKey) -> Option<[u8; 6]> {
        self.connections().remove(key).map(|handle| handle.link_addr)
    }

    fn link_addr(&self, key: &ConnectionKey) -> Option<[u8; 6]> {
        self.connections().get(key).map(|handle| handle.link_addr)
    }

    /// Close every connection's inbound queue and stop accepting
    ///
    /// Connections observe the closed queue and end without further output.
    pub fn shutdown(&self) {
        let closed = self.connections().drain().count();
        self.listeners().clear();
        if closed > 0 {
            info!("closed {} tcp connections", closed);
        }
    }

    /// Ask the multiplexer to stop once it has drained pending events
    pub fn stop_output(&self) {
        if self.output.send(OutputEvent::Shutdown).is_err() {
            debug!("output multiplexer already stopped");
        }
    }
}

/// Serializes every connection's output onto the device
pub struct Multiplexer {
    host: Arc<TcpHost>,
    arp_cache: Arc<ArpCache>,
    link: Arc<Link>,
    events: Receiver<OutputEvent>,
}

impl Multiplexer {
    pub fn new(
        host: Arc<TcpHost>,
        arp_cache: Arc<ArpCache>,
        link: Arc<Link>,
        events: Receiver<OutputEvent>,
    ) -> Self {
        Multiplexer {
            host,
            arp_cache,
            link,
            events,
        }
    }

    pub fn run(self) {
        for event in self.events.iter() {
            match event {
                OutputEvent::Segment { key, segment } => {
                    let link_addr = self.host.link_addr(&key);
                    self.transmit(&key, segment, link_addr);
                }
                OutputEvent::Closed {
                    key,
                    error,
                    send_next,
                } => {
                    let link_addr = self.host.remove(&key);
                    if let Some(error) = error {
                        debug!("{}: sending reset after: {}", key, error);
                        let mut tcb = Tcb::default();
                        tcb.send.nxt = send_next;
                        self.transmit(&key, tcb.reset(), link_addr);
                    }
                }
                OutputEvent::Shutdown => break,
            }
        }
        debug!("output multiplexer stopped");
    }

    fn transmit(&self, key: &ConnectionKey, segment: Outbound, link_addr: Option<[u8; 6]>) {
        let dst = match self.arp_cache.lookup(&key.remote_addr) {
            Some(entry) => entry.hardware_address,
            None => match link_addr {
                Some(addr) => addr,
                None => {
                    debug!("{}: no link address for peer, segment dropped", key);
                    return;
                }
            },
        };

        let frame = build_frame(&self.host.identity, key, segment, dst);
        if let Err(e) = self.link.send(&frame) {
            warn!("{}: failed to send segment: {}", key, e);
        }
    }
}

/// Wrap an outbound segment in fresh IPv4 and Ethernet headers
pub fn build_frame(identity: &Identity, key: &ConnectionKey, segment: Outbound, dst: [u8; 6]) -> Vec<u8> {
    let mut tcp = TcpSegment::new(key.local_port, key.remote_port, segment.seq, segment.ack, segment.flags);
    tcp.header.window_size = segment.window;
    let payload = tcp.encode(key.local_addr, key.remote_addr);

    let mut datagram = Ipv4Datagram {
        header: Ipv4Header::new_simple(protocol::TCP, key.local_addr, key.remote_addr, payload.len() as u16),
        payload,
    };
    EthernetFrame::new(dst, identity.hardware_address, ethertype::IPV4, datagram.encode()).encode()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::device::testing::MemoryDevice;
    use crate::transport::tcp::flags;
    use std::time::Duration;

    const PEER_MAC: [u8; 6] = [0x52, 0x54, 0, 0, 0, 2];
    const PEER_IP: [u8; 4] = [10, 1, 0, 2];
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn config() -> StackConfig {
        StackConfig::default()
    }

    fn datagram(bits: u16, seq: u32, ack: u32, dst_port: u16) -> Ipv4Datagram {
        datagram_from(40000, bits, seq, ack, dst_port)
    }

    fn datagram_from(src_port: u16, bits: u16, seq: u32, ack: u32, dst_port: u16) -> Ipv4Datagram {
        let local = config().identity().protocol_address;
        let mut segment = TcpSegment::new(src_port, dst_port, seq, ack, bits);
        let payload = segment.encode(PEER_IP, local);
        Ipv4Datagram {
            header: Ipv4Header::new_simple(protocol::TCP, PEER_IP, local, payload.len() as u16),
            payload,
        }
    }

    fn key(port: u16) -> ConnectionKey {
        ConnectionKey {
            local_addr: config().identity().protocol_address,
            remote_addr: PEER_IP,
            local_port: port,
            remote_port: 40000,
        }
    }

    #[test]
    fn test_syn_creates_connection() {
        let (host, events) = TcpHost::new(&config());
        let _listener = host.listen(1337).unwrap();

        let outcome = host.handle(&datagram(flags::SYN, 100, 0, 1337), PEER_MAC).unwrap();
        assert_eq!(outcome, Outcome::Consumed);
        assert!(host.contains(&key(1337)));

        match events.recv_timeout(TIMEOUT).unwrap() {
            OutputEvent::Segment { key: k, segment } => {
                assert_eq!(k, key(1337));
                assert_eq!(segment.flags, flags::SYN | flags::ACK);
                assert_eq!(segment.ack, 101);
            }
            other => panic!("unexpected event {:?}", other),
        }
        host.shutdown();
        assert_eq!(host.connection_count(), 0);
    }

    #[test]
    fn test_unmatched_segments_are_dropped() {
        let (host, _events) = TcpHost::new(&config());
        let _listener = host.listen(1337).unwrap();

        host.handle(&datagram(flags::ACK, 100, 1, 1337), PEER_MAC).unwrap();
        host.handle(&datagram(flags::SYN | flags::ACK, 100, 1, 1337), PEER_MAC).unwrap();
        assert_eq!(host.connection_count(), 0);

        assert!(matches!(
            host.handle(&datagram(flags::SYN, 100, 0, 8080), PEER_MAC),
            Err(Error::Unsupported(_))
        ));
        assert_eq!(host.connection_count(), 0);
    }

    #[test]
    fn test_listen_twice() {
        let (host, _events) = TcpHost::new(&config());
        let listener = host.listen(80).unwrap();
        assert_eq!(listener.port(), 80);
        assert!(host.listen(80).is_err());
    }

    #[test]
    fn test_connection_limit() {
        let mut config = config();
        config.max_connections = 1;
        let (host, _events) = TcpHost::new(&config);
        let _listener = host.listen(1337).unwrap();

        host.handle(&datagram_from(40000, flags::SYN, 100, 0, 1337), PEER_MAC).unwrap();
        let outcome = host.handle(&datagram_from(40001, flags::SYN, 500, 0, 1337), PEER_MAC).unwrap();
        assert_eq!(outcome, Outcome::Consumed);
        assert_eq!(host.connection_count(), 1);
        assert!(host.contains(&key(1337)));

        // segments for the existing connection still get through
        host.handle(&datagram_from(40000, flags::SYN, 100, 0, 1337), PEER_MAC).unwrap();
        assert_eq!(host.connection_count(), 1);
        host.shutdown();
    }

    #[test]
    fn test_corrupt_segment() {
        let (host, _events) = TcpHost::new(&config());
        let mut datagram = datagram(flags::SYN, 100, 0, 1337);
        datagram.payload[4] ^= 0xFF;
        assert!(matches!(
            host.handle(&datagram, PEER_MAC),
            Err(Error::Checksum { .. })
        ));
    }

    #[test]
    fn test_multiplexer_writes_frames_and_resets() {
        let (host, events) = TcpHost::new(&config());
        let host = Arc::new(host);
        let device = Arc::new(MemoryDevice::default());
        let link = Arc::new(Link::new(device.clone()));
        let cache = Arc::new(ArpCache::default());
        cache.insert(PEER_IP, PEER_MAC).unwrap();

        let output = host.output.clone();
        let multiplexer = Multiplexer::new(host.clone(), cache, link, events);
        let worker = thread::spawn(move || multiplexer.run());

        let segment = Outbound {
            flags: flags::ACK,
            seq: 7,
            ack: 9,
            window: 100,
        };
        output.send(OutputEvent::Segment { key: key(1337), segment }).unwrap();
        output
            .send(OutputEvent::Closed {
                key: key(1337),
                error: Some(Error::ProtocolViolation("test")),
                send_next: 8,
            })
            .unwrap();
        output
            .send(OutputEvent::Closed {
                key: key(1338),
                error: None,
                send_next: 1,
            })
            .unwrap();
        host.stop_output();
        worker.join().unwrap();

        let written = device.written();
        assert_eq!(written.len(), 2);

        let local = config().identity();
        let frame = EthernetFrame::decode(&written[0]).unwrap();
        assert_eq!(written[0].len(), 60);
        assert_eq!(frame.dst_addr, PEER_MAC);
        assert_eq!(frame.src_addr, local.hardware_address);
        assert_eq!(frame.ethertype, ethertype::IPV4);

        let ip = Ipv4Datagram::decode(&frame.payload).unwrap();
        assert_eq!(ip.header.src_addr, local.protocol_address);
        assert_eq!(ip.header.dst_addr, PEER_IP);
        let tcp = TcpSegment::decode(ip.header.src_addr, ip.header.dst_addr, &ip.payload).unwrap();
        assert_eq!(tcp.header.src_port, 1337);
        assert_eq!(tcp.header.dst_port, 40000);
        assert_eq!(tcp.header.seq_number, 7);
        assert_eq!(tcp.header.ack_number, 9);
        assert_eq!(tcp.header.window_size, 100);

        let frame = EthernetFrame::decode(&written[1]).unwrap();
        let ip = Ipv4Datagram::decode(&frame.payload).unwrap();
        let reset = TcpSegment::decode(ip.header.src_addr, ip.header.dst_addr, &ip.payload).unwrap();
        assert!(reset.header.is_rst());
        assert!(!reset.header.is_ack());
        assert_eq!(reset.header.seq_number, 8);
    }
}
