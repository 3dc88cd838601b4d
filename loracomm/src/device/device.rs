use std::fmt::Debug;

use crate::{RadioId, SeqId};

/// Link metrics of a packet surfaced by a [Transport].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct PacketInfo {
    /// Number of bytes written in the receive buffer.
    pub size: usize,
    /// Received signal strength, in dBm.
    pub rssi: i16,
    /// Signal to noise ratio, in dB.
    pub snr: f32,
}

/// Unreliable, half-duplex packet transport (the radio driver).
///
/// Every call must return immediately: `receive` polls, it never waits for a packet.
pub trait Transport {
    type Error: Debug;

    /// Best-effort transmission, bytes beyond the transport maximum packet size are dropped.
    fn send(&mut self, packet: &[u8]) -> Result<(), Self::Error>;

    /// True while a previous transmission is still on air, a `send` would be refused.
    fn is_busy(&mut self) -> Result<bool, Self::Error> {
        Ok(false)
    }

    /// Copies the next inbound packet (if any) into `buf`, truncating it to `buf.len()`.
    fn receive(&mut self, buf: &mut [u8]) -> Result<Option<PacketInfo>, Self::Error>;

    /// Idle/standby, the device is able to send and receive.
    fn enable(&mut self) -> Result<(), Self::Error>;

    /// Sleep.
    fn disable(&mut self) -> Result<(), Self::Error>;

    fn is_enabled(&self) -> bool;
}

/// Application message handed to an [RxClient].
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InboundMessage<'a> {
    pub radio_id: RadioId,
    pub tag: u8,
    pub seq_id: SeqId,
    /// Payload without the frame header.
    pub payload: &'a [u8],
    pub rssi: i16,
    pub snr: f32,
}

/// Receiver of the messages of one tag.
pub trait RxClient {
    fn receive(&mut self, message: &InboundMessage<'_>);
}

impl<F> RxClient for F
where
    F: FnMut(&InboundMessage<'_>),
{
    fn receive(&mut self, message: &InboundMessage<'_>) {
        self(message)
    }
}

/// Delivery reports for queued transmissions.
///
/// Every method defaults to a NO-OP.
pub trait TxClient {
    /// The frame `seq_id` went on air. Acknowledgment replies are not reported.
    fn transmission_done(&mut self, _seq_id: SeqId) {}

    /// The peer acknowledged the frame `seq_id`.
    fn transmission_successful(&mut self, _radio_id: RadioId, _seq_id: SeqId) {}

    /// No acknowledgment arrived after all retries, the frame has been dropped.
    fn transmission_failed(&mut self, _radio_id: RadioId, _seq_id: SeqId, _tag: u8, _payload: &[u8]) {}
}
