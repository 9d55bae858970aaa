//! Network interface: frame processing and the device read loop
//!
//! This module provides the main entry point of the stack:
//! - Ethernet frame reception and EtherType dispatch (ARP, IPv4)
//! - Synchronous replies for ARP and ICMP, written straight back
//! - Hand-off of TCP segments to the connection host
//! - Start and orderly stop of the TCP output multiplexer

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use log::{debug, info, trace, warn};

use crate::config::StackConfig;
use crate::error::{Error, Result};
use crate::iface::device::{Device, Identity, Link};
use crate::iface::Outcome;
use crate::link::arp;
use crate::link::arp_cache::ArpCache;
use crate::link::ethernet::{ethertype, EthernetFrame};
use crate::transport::{Multiplexer, TcpHost, TcpListener};

/// Large enough for any frame a TAP device hands over
const RECV_BUFFER_LEN: usize = 1 << 13;

pub struct NetworkInterface {
    pub(crate) identity: Identity,
    link: Arc<Link>,
    arp_cache: Arc<ArpCache>,
    pub(crate) tcp: Arc<TcpHost>,
    multiplexer: Option<JoinHandle<()>>,
}

impl NetworkInterface {
    /// Build the stack on top of `device` and start the output multiplexer
    pub fn new(device: Arc<dyn Device>, config: &StackConfig) -> Result<Self> {
        let identity = config.identity();
        let link = Arc::new(Link::new(device));
        let arp_cache = Arc::new(ArpCache::new(config.arp_capacity));
        let (tcp, events) = TcpHost::new(config);
        let tcp = Arc::new(tcp);

        let multiplexer = Multiplexer::new(tcp.clone(), arp_cache.clone(), link.clone(), events);
        let handle = thread::Builder::new()
            .name("tcp-output".to_string())
            .spawn(move || multiplexer.run())?;

        info!(
            "interface up: {} / {:02x?}",
            config.protocol_address, identity.hardware_address
        );
        Ok(NetworkInterface {
            identity,
            link,
            arp_cache,
            tcp,
            multiplexer: Some(handle),
        })
    }

    pub fn identity(&self) -> Identity {
        self.identity
    }

    pub fn arp_cache(&self) -> &ArpCache {
        &self.arp_cache
    }

    pub fn tcp(&self) -> &TcpHost {
        &self.tcp
    }

    /// Accept passive TCP opens on `port`
    pub fn listen(&self, port: u16) -> Result<TcpListener> {
        self.tcp.listen(port)
    }

    /// Run one frame through the protocol chain
    ///
    /// Returns the encoded reply frame, if the frame is answered
    /// synchronously. Errors mean the frame is dropped.
    pub fn process_frame(&self, data: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut frame = EthernetFrame::decode(data)?;

        let outcome = match frame.ethertype {
            ethertype::ARP => arp::handle(&mut frame, &self.identity, &self.arp_cache)?,
            ethertype::IPV4 => self.process_ipv4(&mut frame)?,
            _ => return Err(Error::Unsupported("ethertype")),
        };

        match outcome {
            Outcome::Reply => {
                frame.src_addr = self.identity.hardware_address;
                Ok(Some(frame.encode()))
            }
            Outcome::Consumed => Ok(None),
        }
    }

    /// Read and process frames until end of stream, a device error or
    /// `shutdown` is set
    ///
    /// The flag is checked once per frame. On return every connection has
    /// been closed and the output multiplexer stopped.
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<()> {
        let mut buf = vec![0u8; RECV_BUFFER_LEN];
        let mut frames: u64 = 0;

        let result = loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested");
                break Ok(());
            }
            let len = match self.link.recv(&mut buf) {
                Ok(0) => {
                    info!("device reached end of stream");
                    break Ok(());
                }
                Ok(len) => len,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(Error::Io(e)),
            };

            frames += 1;
            trace!("frame #{}: {} bytes", frames, len);
            match self.process_frame(&buf[..len]) {
                Ok(Some(reply)) => {
                    if let Err(e) = self.link.send(&reply) {
                        warn!("failed to send reply: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("frame #{} dropped: {}", frames, e),
            }
        };

        self.stop();
        result
    }

    /// Close all connections and stop the output multiplexer
    pub fn stop(&mut self) {
        if let Some(handle) = self.multiplexer.take() {
            self.tcp.shutdown();
            self.tcp.stop_output();
            if handle.join().is_err() {
                warn!("output multiplexer panicked");
            }
        }
    }
}

impl Drop for NetworkInterface {
    fn drop(&mut self) {
        self.stop();
    }
}
