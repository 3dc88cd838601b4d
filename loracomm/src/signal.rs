//! Last known link quality of the peers heard by a Gateway.
//!
//! The tracker is a fixed array of [SIGNAL_SLOTS] records. Updating a peer reuses its record,
//! or the first empty slot met while scanning, whichever comes first. When neither exists the
//! record with the oldest update is evicted. A peer met after an empty slot therefore gets a
//! second record: this is not a true LRU and is kept as is.
use std::time::Instant;

use log::trace;

use crate::RadioId;

/// Number of peers tracked at once.
pub const SIGNAL_SLOTS: usize = 16;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SignalQuality {
    pub radio_id: RadioId,
    pub rssi: i16,
    pub snr: f32,
    pub last_update_at: Instant,
}

#[derive(Clone, Debug)]
pub struct SignalTracker {
    slots: [Option<SignalQuality>; SIGNAL_SLOTS],
}

impl Default for SignalTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalTracker {
    pub fn new() -> Self {
        Self {
            slots: [None; SIGNAL_SLOTS],
        }
    }

    /// Records the link metrics of a frame received from `radio_id`.
    pub fn update(&mut self, radio_id: RadioId, rssi: i16, snr: f32, now: Instant) {
        let mut oldest: Option<(usize, Instant)> = None;
        let mut selected = None;
        for (i, slot) in self.slots.iter().enumerate() {
            match slot {
                None => {
                    selected = Some(i);
                    break;
                }
                Some(record) => {
                    if oldest.map_or(true, |(_, at)| record.last_update_at < at) {
                        oldest = Some((i, record.last_update_at));
                    }
                    if record.radio_id == radio_id {
                        selected = Some(i);
                        break;
                    }
                }
            }
        }
        let index = selected.or(oldest.map(|(i, _)| i)).unwrap_or(0);
        if selected.is_none() {
            trace!("Signal quality of {:#x} evicted by {:#x}.", self.slots[index].map_or(0, |r| r.radio_id), radio_id);
        }
        self.slots[index] = Some(SignalQuality {
            radio_id,
            rssi,
            snr,
            last_update_at: now,
        });
    }

    /// Most recent record of `radio_id`.
    pub fn get(&self, radio_id: RadioId) -> Option<&SignalQuality> {
        self.slots
            .iter()
            .flatten()
            .filter(|record| record.radio_id == radio_id)
            .max_by_key(|record| record.last_update_at)
    }

    pub fn iter(&self) -> impl Iterator<Item = &SignalQuality> {
        self.slots.iter().flatten()
    }

    /// Raw slot view, in slot order.
    pub fn slots(&self) -> &[Option<SignalQuality>] {
        &self.slots
    }
}
