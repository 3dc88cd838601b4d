//! Tag handler registry.
//!
//! Maps a tag to the [RxClient] receiving its messages. At most [HANDLER_SLOTS] tags can be
//! registered, registering an already known tag replaces its handler.
use log::debug;

use crate::device::device::RxClient;
use crate::device::frame::TAG_UNKNOWN;

/// Number of tags that can be subscribed at once.
pub const HANDLER_SLOTS: usize = 16;

struct Entry {
    tag: u8,
    handler: Box<dyn RxClient>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No free handler slot for tag {} (max: {} tags).", .tag, HANDLER_SLOTS)]
    Full { tag: u8 },

    #[error("Tag {} is reserved.", TAG_UNKNOWN)]
    ReservedTag,
}

#[derive(Default)]
pub struct HandlerRegistry {
    slots: [Option<Entry>; HANDLER_SLOTS],
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `tag`, replacing (and returning) the previous one.
    pub fn register(
        &mut self,
        tag: u8,
        handler: Box<dyn RxClient>,
    ) -> Result<Option<Box<dyn RxClient>>, RegistryError> {
        if tag == TAG_UNKNOWN {
            return Err(RegistryError::ReservedTag);
        }
        if let Some(entry) = self.slots.iter_mut().flatten().find(|entry| entry.tag == tag) {
            debug!("Handler of tag {} replaced.", tag);
            return Ok(Some(std::mem::replace(&mut entry.handler, handler)));
        }
        match self.slots.iter_mut().find(|slot| slot.is_none()) {
            Some(slot) => {
                *slot = Some(Entry { tag, handler });
                debug!("Handler of tag {} registered.", tag);
                Ok(None)
            }
            None => Err(RegistryError::Full { tag }),
        }
    }

    /// Unregisters the handler of `tag`, if any.
    pub fn unregister(&mut self, tag: u8) -> Option<Box<dyn RxClient>> {
        self.slots
            .iter_mut()
            .find(|slot| matches!(slot, Some(entry) if entry.tag == tag))
            .and_then(Option::take)
            .map(|entry| entry.handler)
    }

    pub fn get_mut(&mut self, tag: u8) -> Option<&mut (dyn RxClient + 'static)> {
        self.slots
            .iter_mut()
            .flatten()
            .find(|entry| entry.tag == tag)
            .map(|entry| entry.handler.as_mut())
    }

    pub fn contains(&self, tag: u8) -> bool {
        self.slots.iter().flatten().any(|entry| entry.tag == tag)
    }

    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::device::InboundMessage;
    use std::sync::mpsc::channel;

    fn message(tag: u8) -> InboundMessage<'static> {
        InboundMessage {
            radio_id: 1,
            tag,
            seq_id: 0,
            payload: b"p",
            rssi: 0,
            snr: 0.0,
        }
    }

    #[test]
    fn test_last_registration_wins() {
        let (sender, receiver) = channel();
        let first = sender.clone();
        let mut registry = HandlerRegistry::new();
        registry
            .register(3, Box::new(move |_: &InboundMessage<'_>| first.send("first").unwrap()))
            .unwrap();
        let previous = registry
            .register(3, Box::new(move |_: &InboundMessage<'_>| sender.send("second").unwrap()))
            .unwrap();
        assert!(previous.is_some());
        assert_eq!(registry.len(), 1);

        registry.get_mut(3).unwrap().receive(&message(3));
        assert_eq!(receiver.try_recv(), Ok("second"));
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_unregister() {
        let mut registry = HandlerRegistry::new();
        registry.register(9, Box::new(|_: &InboundMessage<'_>| {})).unwrap();
        assert!(registry.contains(9));
        assert!(registry.unregister(9).is_some());
        assert!(registry.unregister(9).is_none());
        assert!(registry.get_mut(9).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_capacity_and_reserved_tag() {
        let mut registry = HandlerRegistry::new();
        assert_eq!(
            registry.register(TAG_UNKNOWN, Box::new(|_: &InboundMessage<'_>| {})).err(),
            Some(RegistryError::ReservedTag)
        );
        for tag in 1..=HANDLER_SLOTS as u8 {
            registry.register(tag, Box::new(|_: &InboundMessage<'_>| {})).unwrap();
        }
        assert_eq!(
            registry.register(200, Box::new(|_: &InboundMessage<'_>| {})).err(),
            Some(RegistryError::Full { tag: 200 })
        );
        // Replacing a known tag needs no free slot.
        assert!(registry.register(1, Box::new(|_: &InboundMessage<'_>| {})).is_ok());

        registry.unregister(4);
        registry.register(200, Box::new(|_: &InboundMessage<'_>| {})).unwrap();
        assert!(registry.contains(200));
    }
}
