use std::time::Duration;

use crate::RadioId;

/// Role of the device in the network, same analogy as a cellular network.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Role {
    /// Base station: talks with many Terminals and tracks their signal quality.
    Gateway,
    /// Leaf node, only accepts Gateway frames carrying its own serial.
    Terminal { radio_id: RadioId },
}

impl Role {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Role::Terminal { .. })
    }
}

/// Communication layer parameters, fixed for the lifetime of a [LoRaComm](crate::LoRaComm).
#[derive(Clone, Debug, PartialEq)]
pub struct CommConfig {
    pub role: Role,
    /// Value known by both ends mixed in the checksum, 0 disables it.
    pub phrase: u8,
    /// Delay between two transmissions of a frame waiting for its acknowledgment.
    pub retry_interval: Duration,
    /// Retransmissions allowed after the first transmission before dropping a frame.
    pub retry_max: u8,
    /// Delay before an acknowledgment reply goes on air.
    pub ack_delay: Duration,
}

impl Default for CommConfig {
    fn default() -> Self {
        Self {
            role: Role::Gateway,
            phrase: 0,
            retry_interval: Duration::from_secs(3),
            retry_max: 3,
            ack_delay: Duration::ZERO,
        }
    }
}

impl CommConfig {
    pub fn gateway() -> Self {
        Self::default()
    }

    pub fn terminal(radio_id: RadioId) -> Self {
        Self {
            role: Role::Terminal { radio_id },
            ..Self::default()
        }
    }

    pub fn with_phrase(mut self, phrase: u8) -> Self {
        self.phrase = phrase;
        self
    }

    pub fn with_retry_interval(mut self, retry_interval: Duration) -> Self {
        self.retry_interval = retry_interval;
        self
    }

    pub fn with_retry_max(mut self, retry_max: u8) -> Self {
        self.retry_max = retry_max;
        self
    }

    pub fn with_ack_delay(mut self, ack_delay: Duration) -> Self {
        self.ack_delay = ack_delay;
        self
    }
}
