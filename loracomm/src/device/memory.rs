//! In-process radio medium.
//!
//! An [Ether] models the shared air: every packet sent by one attached [MemoryTransport]
//! reaches every other enabled endpoint, tagged with the link metrics configured for the
//! receiving endpoint. Each endpoint keeps at most [RECEIVE_BACKLOG] packets, the oldest
//! one is overwritten when a new packet arrives on a full backlog.
//!
//! ```rust
//! use loracomm::device::memory::Ether;
//! use loracomm::device::Transport;
//!
//! let ether = Ether::new();
//! let mut a = ether.attach(-60, 9.5);
//! let mut b = ether.attach(-80, 4.0);
//! a.send(&[1, 2, 3]).unwrap();
//!
//! let mut buf = [0u8; 255];
//! let info = b.receive(&mut buf).unwrap().unwrap();
//! assert_eq!(&buf[..info.size], &[1, 2, 3]);
//! assert_eq!(info.rssi, -80);
//! ```
use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use log::trace;
use ringbuf::{HeapRb, Rb};

use super::device::{PacketInfo, Transport};
use super::frame::MAX_PACKET_SIZE;

/// Packets buffered per endpoint before the oldest ones get dropped.
pub const RECEIVE_BACKLOG: usize = 8;

struct Packet {
    data: Vec<u8>,
    rssi: i16,
    snr: f32,
}

struct Endpoint {
    backlog: HeapRb<Packet>,
    rssi: i16,
    snr: f32,
    enabled: bool,
}

/// Shared medium, cheap to clone.
#[derive(Clone, Default)]
pub struct Ether {
    endpoints: Rc<RefCell<Vec<Endpoint>>>,
}

/// Endpoint of an [Ether], enabled on creation.
pub struct MemoryTransport {
    endpoints: Rc<RefCell<Vec<Endpoint>>>,
    index: usize,
}

impl Ether {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a new endpoint, receiving every packet with the given link metrics.
    pub fn attach(&self, rssi: i16, snr: f32) -> MemoryTransport {
        let mut endpoints = self.endpoints.borrow_mut();
        endpoints.push(Endpoint {
            backlog: HeapRb::new(RECEIVE_BACKLOG),
            rssi,
            snr,
            enabled: true,
        });
        MemoryTransport {
            endpoints: self.endpoints.clone(),
            index: endpoints.len() - 1,
        }
    }
}

impl MemoryTransport {
    /// Pushes raw bytes in this endpoint backlog, as if they came from the air.
    pub fn inject(&mut self, bytes: &[u8], rssi: i16, snr: f32) {
        let mut endpoints = self.endpoints.borrow_mut();
        let endpoint = &mut endpoints[self.index];
        let len = bytes.len().min(MAX_PACKET_SIZE);
        let _ = endpoint.backlog.push_overwrite(Packet {
            data: bytes[..len].to_vec(),
            rssi,
            snr,
        });
    }
}

impl Transport for MemoryTransport {
    type Error = Infallible;

    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error> {
        let len = packet.len().min(MAX_PACKET_SIZE);
        let mut endpoints = self.endpoints.borrow_mut();
        if !endpoints[self.index].enabled {
            trace!("Endpoint {} asleep, {} bytes not sent.", self.index, len);
            return Ok(());
        }
        for (i, endpoint) in endpoints.iter_mut().enumerate() {
            if i == self.index || !endpoint.enabled {
                continue;
            }
            let _ = endpoint.backlog.push_overwrite(Packet {
                data: packet[..len].to_vec(),
                rssi: endpoint.rssi,
                snr: endpoint.snr,
            });
        }
        trace!("Endpoint {} sent {} bytes.", self.index, len);
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<PacketInfo>, Self::Error> {
        let mut endpoints = self.endpoints.borrow_mut();
        match endpoints[self.index].backlog.pop() {
            Some(packet) => {
                let size = packet.data.len().min(buf.len());
                buf[..size].copy_from_slice(&packet.data[..size]);
                Ok(Some(PacketInfo {
                    size,
                    rssi: packet.rssi,
                    snr: packet.snr,
                }))
            }
            None => Ok(None),
        }
    }

    fn enable(&mut self) -> Result<(), Self::Error> {
        self.endpoints.borrow_mut()[self.index].enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Self::Error> {
        self.endpoints.borrow_mut()[self.index].enabled = false;
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.endpoints.borrow()[self.index].enabled
    }
}
