//! LoRa communication layer.
//!
//! [LoRaComm] owns every piece of state of the layer: the send queue, the tag handlers, the
//! signal quality of the peers and the statistics. It is driven by [LoRaComm::maintain], to be
//! called periodically by the application loop: each call handles at most one inbound packet
//! and then at most one outbound frame, and never blocks.
//!
//! ## Usages
//! ```rust
//! use std::time::Instant;
//! use loracomm::device::memory::Ether;
//! use loracomm::device::InboundMessage;
//! use loracomm::{CommConfig, LoRaComm};
//!
//! let ether = Ether::new();
//! let mut gateway = LoRaComm::new(ether.attach(-70, 8.0), CommConfig::gateway());
//! let mut terminal = LoRaComm::new(ether.attach(-70, 8.0), CommConfig::terminal(42));
//! terminal
//!     .register_handler(5, |msg: &InboundMessage<'_>| println!("{:?}", msg.payload))
//!     .unwrap();
//!
//! let now = Instant::now();
//! let seq_id = gateway.send(42, 5, true, &[1, 2, 3], now).unwrap();
//! gateway.maintain(now).unwrap(); // frame on air
//! terminal.maintain(now).unwrap(); // handler called, ACK queued then sent
//! gateway.maintain(now).unwrap(); // ACK received
//! assert_eq!(gateway.pending(), 0);
//! # let _ = seq_id;
//! ```
use std::fmt::Debug;
use std::time::{Duration, Instant};

use log::{debug, info, trace, warn};

use crate::config::{CommConfig, Role};
use crate::device::device::{InboundMessage, RxClient, Transport, TxClient};
use crate::device::frame::{FrameCodec, FrameError, FrameFlags, FrameHeader, MAX_PACKET_SIZE};
use crate::registry::{HandlerRegistry, RegistryError};
use crate::send_queue::{Outbound, QueueError, SendQueue, SlotId};
use crate::signal::{SignalQuality, SignalTracker};
use crate::{RadioId, SeqId};

/// Traffic counters, they only ever increase.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Statistics {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub packets_sent: u64,
    /// Every packet surfaced by the transport, valid or not.
    pub packets_received: u64,
    /// Packets with a valid checksum.
    pub packets_valid: u64,
}

/// What happened to an accepted frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Received {
    /// Handed to the handler of `tag`.
    Delivered { tag: u8 },
    /// No handler registered for `tag`, ignored.
    UnknownTag { tag: u8 },
    /// Acknowledgment freeing the queued frame `seq_id`.
    Acked { seq_id: SeqId },
    /// Acknowledgment matching no queued frame (duplicate, or already out of retries).
    UnmatchedAck { seq_id: SeqId },
}

/// Reasons for an inbound packet to be dropped. Never fatal, only reported for diagnostics.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    #[error("Bad frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Frame for radio {:#x} is not addressed to this device.", .radio_id)]
    NotAddressedToMe { radio_id: RadioId },
}

#[derive(thiserror::Error, Debug)]
pub enum MaintainError<E>
where
    E: Debug,
{
    #[error("Transport error: {:?}", .0)]
    Transport(E),
}

/// Reliable messaging on top of an unreliable packet [Transport].
pub struct LoRaComm<T: Transport> {
    transport: T,
    config: CommConfig,
    codec: FrameCodec,
    next_seq_id: SeqId,
    queue: SendQueue,
    handlers: HandlerRegistry,
    signal: SignalTracker,
    tx_client: Option<Box<dyn TxClient>>,
    stats: Statistics,
}

impl<T: Transport> LoRaComm<T> {
    pub fn new(transport: T, config: CommConfig) -> Self {
        Self {
            transport,
            codec: FrameCodec::new(config.phrase),
            config,
            next_seq_id: 0,
            queue: SendQueue::new(),
            handlers: HandlerRegistry::new(),
            signal: SignalTracker::new(),
            tx_client: None,
            stats: Statistics::default(),
        }
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Registers the handler of `tag`, replacing any previous one.
    pub fn register_handler<H>(&mut self, tag: u8, handler: H) -> Result<(), RegistryError>
    where
        H: RxClient + 'static,
    {
        self.handlers.register(tag, Box::new(handler)).map(|_| ())
    }

    /// Returns true if `tag` had a handler.
    pub fn unregister_handler(&mut self, tag: u8) -> bool {
        self.handlers.unregister(tag).is_some()
    }

    pub fn set_transmit_client(&mut self, client: Box<dyn TxClient>) {
        self.tx_client = Some(client);
    }

    /// Queues `payload` for `radio_id`, to be sent by the next [maintain](LoRaComm::maintain).
    ///
    /// `radio_id` is the serial of the Terminal: the recipient when sent by a Gateway, the
    /// sender itself when sent by a Terminal.
    pub fn send(
        &mut self,
        radio_id: RadioId,
        tag: u8,
        requires_ack: bool,
        payload: &[u8],
        now: Instant,
    ) -> Result<SeqId, QueueError> {
        self.send_after(radio_id, tag, requires_ack, payload, Duration::ZERO, now)
    }

    /// Same as [send](LoRaComm::send), the first transmission waiting for `delay`.
    pub fn send_after(
        &mut self,
        radio_id: RadioId,
        tag: u8,
        requires_ack: bool,
        payload: &[u8],
        delay: Duration,
        now: Instant,
    ) -> Result<SeqId, QueueError> {
        let mut flags = self.own_flags();
        if requires_ack {
            flags |= FrameFlags::REQUIRES_ACK;
        }
        let outbound = Outbound {
            flags,
            tag,
            seq_id: self.next_seq_id,
            radio_id,
            payload,
        };
        let seq_id = self
            .queue
            .enqueue(outbound, requires_ack, delay, now)
            .map_err(|err| {
                match err {
                    QueueError::PayloadTooLarge { .. } => warn!("Send rejected: {}", err),
                    _ => debug!("Send rejected: {}", err),
                }
                err
            })?;
        self.next_seq_id = self.next_seq_id.wrapping_add(1);
        Ok(seq_id)
    }

    /// Drops the queued frame `seq_id`, returns false if it is not queued anymore.
    ///
    /// Only frames returned by [send](LoRaComm::send) are concerned, acknowledgment replies
    /// are left alone.
    pub fn cancel(&mut self, seq_id: SeqId) -> bool {
        match self.queue.find_own(seq_id) {
            Some(slot) => self.queue.remove(slot).is_some(),
            None => false,
        }
    }

    /// Number of frames waiting in the send queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn statistics(&self) -> Statistics {
        self.stats
    }

    /// Last link quality heard from `radio_id` (Gateway only).
    pub fn signal_quality(&self, radio_id: RadioId) -> Option<&SignalQuality> {
        self.signal.get(radio_id)
    }

    pub fn signal_qualities(&self) -> impl Iterator<Item = &SignalQuality> {
        self.signal.iter()
    }

    pub fn enable(&mut self) -> Result<(), T::Error> {
        self.transport.enable()
    }

    pub fn disable(&mut self) -> Result<(), T::Error> {
        self.transport.disable()
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_enabled()
    }

    /// Keeps the communication alive: handles one inbound packet, then sends one due frame.
    ///
    /// Does nothing while the transport is disabled. Only transport failures are returned,
    /// bad or foreign frames are dropped silently.
    pub fn maintain(&mut self, now: Instant) -> Result<(), MaintainError<T::Error>> {
        if !self.transport.is_enabled() {
            return Ok(());
        }
        self.poll_receive(now)?;
        self.poll_send(now)
    }

    /// Validates, filters and dispatches one inbound packet.
    ///
    /// Statistics are updated even for packets that get rejected.
    pub fn handle_packet(
        &mut self,
        bytes: &[u8],
        rssi: i16,
        snr: f32,
        now: Instant,
    ) -> Result<Received, ReceiveError> {
        self.stats.bytes_received += bytes.len() as u64;
        self.stats.packets_received += 1;

        let frame = self.codec.decode(bytes).map_err(|err| {
            trace!("Received unknown payload: [size: {}] [rssi: {}] [snr: {:.2}] {}", bytes.len(), rssi, snr, err);
            err
        })?;
        self.stats.packets_valid += 1;

        let header = frame.header;
        if !self.is_addressed_to_me(&header) {
            trace!("Frame ignored, not addressed to us: [radioId: {:#x}] [flags: {:?}]", header.radio_id, header.flags);
            return Err(ReceiveError::NotAddressedToMe {
                radio_id: header.radio_id,
            });
        }
        debug!(
            "Received: [radioId: {:#x}] [tagId: {}] [seqId: {}] [size: {}] [rssi: {}] [snr: {:.2}]",
            header.radio_id,
            header.tag,
            header.seq_id,
            frame.payload.len(),
            rssi,
            snr
        );

        if !self.config.role.is_terminal() {
            self.signal.update(header.radio_id, rssi, snr, now);
        }

        if header.is_ack() {
            return Ok(self.handle_ack(&header, frame.payload));
        }

        let message = InboundMessage {
            radio_id: header.radio_id,
            tag: header.tag,
            seq_id: header.seq_id,
            payload: frame.payload,
            rssi,
            snr,
        };
        let received = match self.handlers.get_mut(header.tag) {
            Some(handler) => {
                handler.receive(&message);
                Received::Delivered { tag: header.tag }
            }
            None => {
                debug!("No handler for tag {}, message ignored.", header.tag);
                Received::UnknownTag { tag: header.tag }
            }
        };
        if header.requires_ack() {
            self.queue_ack(&header, now);
        }
        Ok(received)
    }

    fn own_flags(&self) -> FrameFlags {
        if self.config.role.is_terminal() {
            FrameFlags::TERMINAL
        } else {
            FrameFlags::empty()
        }
    }

    /// Terminals only listen to Gateways using their serial, Gateways only listen to Terminals.
    fn is_addressed_to_me(&self, header: &FrameHeader) -> bool {
        match self.config.role {
            Role::Terminal { radio_id } => !header.is_terminal() && header.radio_id == radio_id,
            Role::Gateway => header.is_terminal(),
        }
    }

    /// An ACK frees the frame with the same seq id and radio id, whose checksum it carries.
    fn handle_ack(&mut self, header: &FrameHeader, payload: &[u8]) -> Received {
        let slot = self
            .queue
            .find_pending_ack(header.seq_id, header.radio_id)
            .filter(|slot| match self.queue.get(*slot) {
                Some(entry) => {
                    let checksum = self.codec.frame_checksum(&entry.header(), entry.payload());
                    payload == &checksum.to_le_bytes()[..]
                }
                None => false,
            });
        match slot.and_then(|slot| self.queue.remove(slot)) {
            Some(entry) => {
                info!("ACK received: [radioId: {:#x}] [seqId: {}] after {} transmission(s)", entry.radio_id, entry.seq_id, entry.retry_count);
                if let Some(client) = self.tx_client.as_mut() {
                    client.transmission_successful(entry.radio_id, entry.seq_id);
                }
                Received::Acked {
                    seq_id: header.seq_id,
                }
            }
            None => {
                debug!("ACK for seqId {} matches no queued frame.", header.seq_id);
                Received::UnmatchedAck {
                    seq_id: header.seq_id,
                }
            }
        }
    }

    /// Queues the acknowledgment of `header`, its payload is the checksum of the acknowledged frame.
    fn queue_ack(&mut self, header: &FrameHeader, now: Instant) {
        let checksum = header.checksum.to_le_bytes();
        let outbound = Outbound {
            flags: self.own_flags() | FrameFlags::ACK,
            tag: header.tag,
            seq_id: header.seq_id,
            radio_id: header.radio_id,
            payload: &checksum,
        };
        match self
            .queue
            .enqueue(outbound, false, self.config.ack_delay, now)
        {
            Ok(_) => debug!("ACK of seqId {} queued.", header.seq_id),
            Err(err) => warn!("ACK of seqId {} dropped: {}", header.seq_id, err),
        }
    }

    fn poll_receive(&mut self, now: Instant) -> Result<(), MaintainError<T::Error>> {
        let mut buf = [0u8; MAX_PACKET_SIZE];
        let info = match self
            .transport
            .receive(&mut buf)
            .map_err(MaintainError::Transport)?
        {
            Some(info) => info,
            None => return Ok(()),
        };
        let size = info.size.min(buf.len());
        match self.handle_packet(&buf[..size], info.rssi, info.snr, now) {
            Ok(received) => trace!("Packet handled: {:?}", received),
            Err(err) => trace!("Packet dropped: {}", err),
        }
        Ok(())
    }

    fn drop_exhausted(&mut self, slot: SlotId) {
        if let Some(entry) = self.queue.remove(slot) {
            warn!(
                "Retry exhausted, frame dropped: [radioId: {:#x}] [seqId: {}] [tagId: {}]",
                entry.radio_id, entry.seq_id, entry.tag
            );
            if let Some(client) = self.tx_client.as_mut() {
                client.transmission_failed(entry.radio_id, entry.seq_id, entry.tag, entry.payload());
            }
        }
    }

    /// Sends the first due frame, dropping on the way the frames out of retries.
    fn poll_send(&mut self, now: Instant) -> Result<(), MaintainError<T::Error>> {
        while let Some(slot) = self.queue.next_ready(now) {
            let exhausted = match self.queue.get(slot) {
                Some(entry) => {
                    entry.requires_ack
                        && (entry.retry_count > self.config.retry_max
                            || entry.retry_count == u8::MAX)
                }
                None => break,
            };
            if exhausted {
                self.drop_exhausted(slot);
                continue;
            }

            if self.transport.is_busy().map_err(MaintainError::Transport)? {
                trace!("Transport busy, sending postponed.");
                break;
            }

            let mut buf = [0u8; MAX_PACKET_SIZE];
            let encoded = match self.queue.get(slot) {
                Some(entry) => (
                    self.codec.encode_into(&entry.header(), entry.payload(), &mut buf),
                    entry.seq_id,
                    entry.requires_ack,
                    entry.is_ack(),
                ),
                None => break,
            };
            let (len, seq_id, requires_ack, is_ack) = match encoded {
                (Ok(len), seq_id, requires_ack, is_ack) => (len, seq_id, requires_ack, is_ack),
                (Err(err), seq_id, _, _) => {
                    warn!("Frame {} dropped: {}", seq_id, err);
                    self.queue.remove(slot);
                    continue;
                }
            };

            self.transport
                .send(&buf[..len])
                .map_err(MaintainError::Transport)?;
            self.stats.bytes_sent += len as u64;
            self.stats.packets_sent += 1;
            trace!("Sent frame {} ({} bytes).", seq_id, len);

            if requires_ack {
                if let Some(entry) = self.queue.get_mut(slot) {
                    entry.retry_count = entry.retry_count.saturating_add(1);
                    entry.next_retry_at = now + self.config.retry_interval;
                    if entry.retry_count > 1 {
                        info!("Frame {} retransmitted ({}/{}), next check at +{:?}.", seq_id, entry.retry_count - 1, self.config.retry_max, self.config.retry_interval);
                    }
                }
            } else {
                self.queue.remove(slot);
            }
            if !is_ack {
                if let Some(client) = self.tx_client.as_mut() {
                    client.transmission_done(seq_id);
                }
            }
            break;
        }
        Ok(())
    }
}
