//! Reliable point-to-point messaging over LoRa.
//!
//! A Gateway talks with many Terminals, each Terminal only talks with Gateways. Messages are
//! framed with a CRC-32 checksum, dispatched by tag to the registered handlers and, on
//! demand, acknowledged and retransmitted until acknowledged. See [LoRaComm].
pub mod comm;
pub mod config;
pub mod device;
pub mod registry;
pub mod send_queue;
pub mod signal;

pub use comm::{LoRaComm, MaintainError, ReceiveError, Received, Statistics};
pub use config::{CommConfig, Role};

/// Serial of a Terminal.
pub type RadioId = u32;
/// Per-sender frame sequence number.
pub type SeqId = u16;
