//! Bounded queue of outbound frames waiting for their (re)transmission.
//!
//! The queue is a fixed array of [SEND_QUEUE_SLOTS] slots, a new entry takes the first free
//! slot. Running out of slots is an expected condition surfaced to the caller as
//! [QueueError::QueueFull]. Slots are addressed through [SlotId] handles, only valid until
//! the slot is freed.
use std::time::{Duration, Instant};

use log::debug;

use crate::device::frame::{FrameFlags, FrameHeader, MAX_PAYLOAD};
use crate::{RadioId, SeqId};

/// Number of frames that can wait for transmission at once.
pub const SEND_QUEUE_SLOTS: usize = 8;

/// Handle on an occupied queue slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

/// Description of a frame to queue.
#[derive(Copy, Clone, Debug)]
pub struct Outbound<'a> {
    pub flags: FrameFlags,
    pub tag: u8,
    pub seq_id: SeqId,
    pub radio_id: RadioId,
    pub payload: &'a [u8],
}

/// A queued frame.
#[derive(Clone, Debug)]
pub struct QueueEntry {
    /// Kept in the queue after transmission until acknowledged or out of retries.
    pub requires_ack: bool,
    /// Number of transmissions done so far.
    pub retry_count: u8,
    /// The entry is not handed to the transport before this instant.
    pub next_retry_at: Instant,
    pub flags: FrameFlags,
    pub tag: u8,
    pub seq_id: SeqId,
    pub radio_id: RadioId,
    payload: [u8; MAX_PAYLOAD],
    payload_size: usize,
}

impl QueueEntry {
    pub fn payload(&self) -> &[u8] {
        &self.payload[..self.payload_size]
    }

    /// Acknowledgment reply queued for a peer frame.
    pub fn is_ack(&self) -> bool {
        self.flags.contains(FrameFlags::ACK)
    }

    /// Header to encode for the next transmission of this entry.
    pub fn header(&self) -> FrameHeader {
        FrameHeader::new(self.flags, self.tag, self.seq_id, self.radio_id)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    #[error("Send queue is full ({} entries).", SEND_QUEUE_SLOTS)]
    QueueFull,

    #[error("Payload is too large to be sent (is: {}B, max: {}B).", .size, MAX_PAYLOAD)]
    PayloadTooLarge { size: usize },

    #[error("Payload is empty, at least one byte is needed.")]
    EmptyPayload,
}

pub struct SendQueue {
    slots: [Option<QueueEntry>; SEND_QUEUE_SLOTS],
}

impl Default for SendQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SendQueue {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Copies `outbound` in the first free slot, due at `now + delay`.
    ///
    /// Returns the seq id of the queued frame.
    pub fn enqueue(
        &mut self,
        outbound: Outbound<'_>,
        requires_ack: bool,
        delay: Duration,
        now: Instant,
    ) -> Result<SeqId, QueueError> {
        let size = outbound.payload.len();
        if size > MAX_PAYLOAD {
            return Err(QueueError::PayloadTooLarge { size });
        }
        if size == 0 {
            return Err(QueueError::EmptyPayload);
        }
        let (index, slot) = match self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, slot)| slot.is_none())
        {
            Some(free) => free,
            None => {
                debug!("Send queue is full.");
                return Err(QueueError::QueueFull);
            }
        };
        let mut payload = [0u8; MAX_PAYLOAD];
        payload[..size].copy_from_slice(outbound.payload);
        let next_retry_at = now + delay;
        *slot = Some(QueueEntry {
            requires_ack,
            retry_count: 0,
            next_retry_at,
            flags: outbound.flags,
            tag: outbound.tag,
            seq_id: outbound.seq_id,
            radio_id: outbound.radio_id,
            payload,
            payload_size: size,
        });
        debug!(
            "Added to send queue: [slot: {}] [seqId: {}] [payloadSize: {}] [requiresACK: {}] [delay: {:?}]",
            index, outbound.seq_id, size, requires_ack, delay
        );
        Ok(outbound.seq_id)
    }

    /// First entry (lowest slot) due at `now`.
    pub fn next_ready(&self, now: Instant) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(entry) if entry.next_retry_at <= now))
            .map(SlotId)
    }

    /// Entry exchanged with `radio_id` awaiting an acknowledgment for `seq_id`.
    pub fn find_pending_ack(&self, seq_id: SeqId, radio_id: RadioId) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| {
                matches!(slot, Some(entry) if entry.requires_ack
                    && entry.seq_id == seq_id
                    && entry.radio_id == radio_id)
            })
            .map(SlotId)
    }

    /// Entry carrying `seq_id`, whatever its state.
    pub fn find(&self, seq_id: SeqId) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(entry) if entry.seq_id == seq_id))
            .map(SlotId)
    }

    /// Entry carrying `seq_id` numbered by this device.
    ///
    /// Acknowledgment replies reuse the seq id of the peer frame, they are skipped.
    pub fn find_own(&self, seq_id: SeqId) -> Option<SlotId> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(entry) if entry.seq_id == seq_id && !entry.is_ack()))
            .map(SlotId)
    }

    pub fn get(&self, slot: SlotId) -> Option<&QueueEntry> {
        self.slots.get(slot.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut QueueEntry> {
        self.slots.get_mut(slot.0).and_then(Option::as_mut)
    }

    /// Frees the slot, returning its entry.
    pub fn remove(&mut self, slot: SlotId) -> Option<QueueEntry> {
        let entry = self.slots.get_mut(slot.0).and_then(Option::take);
        if let Some(entry) = &entry {
            debug!("Removed from send queue: [slot: {}] [seqId: {}]", slot.0, entry.seq_id);
        }
        entry
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() == SEND_QUEUE_SLOTS
    }
}
