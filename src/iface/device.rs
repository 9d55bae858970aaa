//! Device boundary
//!
//! The stack only needs a byte-oriented device that reads and writes whole
//! link frames. Opening and configuring the TAP interface happens outside the
//! stack.

use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use tun_tap::Iface;

/// A device carrying one Ethernet frame per read or write
///
/// `read` returning `Ok(0)` means end of stream. Closing is dropping.
pub trait Device: Send + Sync {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize>;
    fn write(&self, buf: &[u8]) -> io::Result<usize>;
}

impl Device for Iface {
    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.recv(buf)
    }

    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf)
    }
}

/// The addresses the host owns, fixed before processing starts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub hardware_address: [u8; 6],
    pub protocol_address: [u8; 4],
}

/// Shared access to the device
///
/// Writes are serialized so frames from the read loop and from the TCP
/// multiplexer never interleave.
pub struct Link {
    device: Arc<dyn Device>,
    write_lock: Mutex<()>,
}

impl Link {
    pub fn new(device: Arc<dyn Device>) -> Self {
        Link {
            device,
            write_lock: Mutex::new(()),
        }
    }

    pub fn recv(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.device.read(buf)
    }

    /// Write one complete frame
    pub fn send(&self, frame: &[u8]) -> io::Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let written = self.device.write(frame)?;
        if written != frame.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short frame write ({} of {} bytes)", written, frame.len()),
            ));
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryDevice;
    use super::*;

    struct ShortWrites;

    impl Device for ShortWrites {
        fn read(&self, _buf: &mut [u8]) -> io::Result<usize> {
            Ok(0)
        }

        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len() / 2)
        }
    }

    #[test]
    fn test_send_writes_whole_frame() {
        let device = Arc::new(MemoryDevice::default());
        let link = Link::new(device.clone());
        link.send(&[1, 2, 3]).unwrap();
        assert_eq!(device.written(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_short_write_is_an_error() {
        let link = Link::new(Arc::new(ShortWrites));
        let err = link.send(&[0; 60]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WriteZero);
    }

    #[test]
    fn test_recv_end_of_stream() {
        let device = Arc::new(MemoryDevice::default());
        device.push(vec![9; 60]);
        let link = Link::new(device);
        let mut buf = [0u8; 1514];
        assert_eq!(link.recv(&mut buf).unwrap(), 60);
        assert_eq!(link.recv(&mut buf).unwrap(), 0);
    }
}
