//! Event bus for host-side observation of engine outcomes.

use crossbeam_channel::{bounded, Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::catalog::{EffectId, ItemClass, RarityTier};
use arcanum_common::{ActorId, ItemHandle};

/// Events the engine publishes as applies and sessions resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
    /// An augment was rolled and written to a slot
    AugmentApplied {
        /// Acting actor
        actor: ActorId,
        /// Target item
        item: ItemHandle,
        /// Rolled effect
        effect: EffectId,
        /// Rolled effect's rarity tier
        tier: RarityTier,
        /// Slot the roll was written to
        slot: usize,
        /// Whether the pity ceiling forced the roll
        forced: bool,
    },
    /// The pity ceiling forced a top-tier roll
    PityTriggered {
        /// Acting actor
        actor: ActorId,
        /// Item class the ceiling applied to
        class: ItemClass,
    },
    /// A full item opened a slot-selection session
    SelectionOpened {
        /// Acting actor
        actor: ActorId,
        /// Target item
        item: ItemHandle,
        /// Item capacity (number of selectable slots)
        capacity: u8,
    },
    /// A pending selection was resolved by the actor
    SelectionResolved {
        /// Acting actor
        actor: ActorId,
        /// Target item
        item: ItemHandle,
        /// Chosen slot
        slot: usize,
    },
    /// A pending selection lapsed without a choice
    SessionExpired {
        /// Acting actor
        actor: ActorId,
        /// Target item of the lapsed session
        item: ItemHandle,
    },
    /// An item's slot capacity grew
    CapacityExpanded {
        /// Target item
        item: ItemHandle,
        /// New capacity
        capacity: u8,
    },
}

/// Event bus for broadcasting engine events to host consumers.
#[derive(Debug)]
pub struct EventBus {
    /// Sender for broadcasting events
    sender: Sender<EngineEvent>,
    /// Receiver for collecting events
    receiver: Receiver<EngineEvent>,
    /// Channel capacity
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl EventBus {
    /// Creates a new event bus with the given capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            capacity,
        }
    }

    /// Publishes an event to the bus.
    pub fn publish(&self, event: EngineEvent) {
        // Non-blocking send - if full, event is dropped
        let _ = self.sender.try_send(event);
    }

    /// Drains all pending events.
    pub fn drain(&self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Returns the number of pending events.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.receiver.len()
    }

    /// Returns the channel capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Creates a new sender handle for publishing events.
    #[must_use]
    pub fn sender(&self) -> Sender<EngineEvent> {
        self.sender.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_drain() {
        let bus = EventBus::new(8);
        bus.publish(EngineEvent::CapacityExpanded {
            item: ItemHandle::new(1),
            capacity: 2,
        });
        bus.publish(EngineEvent::SessionExpired {
            actor: ActorId::from_raw(1),
            item: ItemHandle::new(1),
        });
        assert_eq!(bus.pending_count(), 2);

        let events = bus.drain();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], EngineEvent::CapacityExpanded { .. }));
        assert_eq!(bus.pending_count(), 0);
    }

    #[test]
    fn test_full_bus_drops_instead_of_blocking() {
        let bus = EventBus::new(1);
        for _ in 0..5 {
            bus.publish(EngineEvent::CapacityExpanded {
                item: ItemHandle::new(1),
                capacity: 3,
            });
        }
        assert_eq!(bus.pending_count(), 1);
        assert_eq!(bus.capacity(), 1);
    }
}
