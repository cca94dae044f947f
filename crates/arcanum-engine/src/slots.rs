//! Slot storage over the host's opaque per-item metadata blob.
//!
//! The [`SlotStore`] is the only component that touches the persisted
//! blob; it decodes on every read (no cached copies across actions),
//! performs the legacy-format migration at the read boundary, and writes
//! the whole state back in a single all-or-nothing blob write.

use crate::catalog::{CatalogTable, EffectId, ItemClass};
use crate::codec::{self, CodecError, EquipmentAugmentState, SlotRecord, MAX_SLOTS};
use arcanum_common::ItemHandle;
use thiserror::Error;
use tracing::debug;

/// Slot store error types.
#[derive(Debug, Clone, Error)]
pub enum SlotError {
    /// Slot index outside the item's capacity
    #[error("invalid slot index {index}: capacity {capacity}")]
    InvalidIndex {
        /// Requested index
        index: usize,
        /// Item capacity
        capacity: u8,
    },
    /// The persisted blob could not be decoded
    #[error("slot blob error: {0}")]
    Codec(#[from] CodecError),
}

/// Result type for slot store operations.
pub type SlotResult<T> = Result<T, SlotError>;

/// Host collaborator owning item identity and the opaque metadata blob.
///
/// The engine reads and writes augment state exclusively through this
/// trait and never interprets any other part of the item.
pub trait ItemStore {
    /// Reads the item's augment blob, if the item exists and has one.
    fn read_blob(&self, item: ItemHandle) -> Option<Vec<u8>>;

    /// Replaces the item's augment blob.
    fn write_blob(&mut self, item: ItemHandle, blob: Vec<u8>);

    /// The item's equipment class, or `None` if the handle does not
    /// refer to augmentable equipment.
    fn item_class(&self, item: ItemHandle) -> Option<ItemClass>;

    /// A value that changes whenever the item's identity or stack
    /// changes. Used to detect stale selection-session targets.
    fn signature(&self, item: ItemHandle) -> u64;
}

/// Read/write access to an item's augment slots.
#[derive(Debug, Default, Clone, Copy)]
pub struct SlotStore;

impl SlotStore {
    /// Creates a slot store.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Reads the item's full augment state.
    ///
    /// Missing or empty blobs produce the default single-slot state; a
    /// legacy single-effect blob is migrated to slot 0 here and nowhere
    /// else.
    pub fn state<S: ItemStore>(
        &self,
        store: &S,
        item: ItemHandle,
    ) -> SlotResult<EquipmentAugmentState> {
        match store.read_blob(item) {
            None => Ok(EquipmentAugmentState::default()),
            Some(blob) if blob.is_empty() => Ok(EquipmentAugmentState::default()),
            Some(blob) => {
                if codec::is_legacy(&blob) {
                    debug!("Migrating legacy single-effect blob on item {:?}", item);
                }
                Ok(codec::decode(&blob)?)
            }
        }
    }

    /// Writes the item's full augment state as one blob write.
    pub fn write_state<S: ItemStore>(
        &self,
        store: &mut S,
        item: ItemHandle,
        state: &EquipmentAugmentState,
    ) {
        store.write_blob(item, codec::encode(state));
    }

    /// All slot records of the item, in slot order.
    pub fn get_slots<S: ItemStore>(
        &self,
        store: &S,
        item: ItemHandle,
    ) -> SlotResult<Vec<SlotRecord>> {
        Ok(self.state(store, item)?.slots().to_vec())
    }

    /// The item's slot capacity.
    pub fn capacity<S: ItemStore>(&self, store: &S, item: ItemHandle) -> SlotResult<u8> {
        Ok(self.state(store, item)?.capacity())
    }

    /// Grows the item's capacity to `capacity`, clamped to the current
    /// value on the low side and 4 on the high side. Returns the stored
    /// capacity after the call.
    pub fn set_capacity<S: ItemStore>(
        &self,
        store: &mut S,
        item: ItemHandle,
        capacity: u8,
    ) -> SlotResult<u8> {
        let mut state = self.state(store, item)?;
        if capacity > state.capacity() {
            state.grow_capacity(capacity);
            self.write_state(store, item, &state);
        }
        Ok(state.capacity())
    }

    /// Grows the item's capacity by one slot. Returns `true` if it grew,
    /// `false` if the item was already at the maximum.
    pub fn expand_capacity<S: ItemStore>(
        &self,
        store: &mut S,
        item: ItemHandle,
    ) -> SlotResult<bool> {
        let current = self.capacity(store, item)?;
        if current >= MAX_SLOTS {
            return Ok(false);
        }
        self.set_capacity(store, item, current + 1)?;
        Ok(true)
    }

    /// Index of the item's first empty slot, if any.
    pub fn first_empty_slot<S: ItemStore>(
        &self,
        store: &S,
        item: ItemHandle,
    ) -> SlotResult<Option<usize>> {
        Ok(self.state(store, item)?.first_empty())
    }

    /// Writes a record into a slot. Returns the record it replaced.
    pub fn set_slot<S: ItemStore>(
        &self,
        store: &mut S,
        item: ItemHandle,
        index: usize,
        record: SlotRecord,
    ) -> SlotResult<SlotRecord> {
        let mut state = self.state(store, item)?;
        let previous = state
            .set_slot(index, record)
            .ok_or(SlotError::InvalidIndex {
                index,
                capacity: state.capacity(),
            })?;
        self.write_state(store, item, &state);
        Ok(previous)
    }

    /// Empties a slot. Returns the record it removed.
    pub fn remove_slot<S: ItemStore>(
        &self,
        store: &mut S,
        item: ItemHandle,
        index: usize,
    ) -> SlotResult<SlotRecord> {
        self.set_slot(store, item, index, SlotRecord::empty())
    }

    /// Sum of `value1` across the item's slots holding the given effect.
    pub fn sum_value1<S: ItemStore>(
        &self,
        store: &S,
        item: ItemHandle,
        effect: &EffectId,
    ) -> SlotResult<f64> {
        Ok(self.state(store, item)?.sum_value1(effect))
    }

    /// Sum of `value2` across the item's slots holding the given effect.
    pub fn sum_value2<S: ItemStore>(
        &self,
        store: &S,
        item: ItemHandle,
        effect: &EffectId,
    ) -> SlotResult<i32> {
        Ok(self.state(store, item)?.sum_value2(effect))
    }

    /// Human-readable per-slot descriptions for selection prompts.
    pub fn slot_descriptions<S: ItemStore>(
        &self,
        store: &S,
        item: ItemHandle,
        table: &CatalogTable,
    ) -> SlotResult<Vec<String>> {
        Ok(self
            .state(store, item)?
            .slots()
            .iter()
            .map(|slot| match &slot.effect {
                Some(effect) => table.describe(effect, slot.value1, slot.value2),
                None => "(empty)".to_string(),
            })
            .collect())
    }
}

/// In-memory item store used by unit tests across the crate.
#[cfg(test)]
pub struct MemoryItemStore {
    blobs: std::collections::HashMap<ItemHandle, Vec<u8>>,
    classes: std::collections::HashMap<ItemHandle, ItemClass>,
    signatures: std::collections::HashMap<ItemHandle, u64>,
    /// Number of blob writes, for all-or-nothing assertions.
    pub writes: usize,
}

#[cfg(test)]
impl MemoryItemStore {
    pub fn new() -> Self {
        Self {
            blobs: std::collections::HashMap::new(),
            classes: std::collections::HashMap::new(),
            signatures: std::collections::HashMap::new(),
            writes: 0,
        }
    }

    pub fn add_item(&mut self, item: ItemHandle, class: ItemClass) {
        self.classes.insert(item, class);
        self.signatures.insert(item, item.raw());
    }

    pub fn set_blob(&mut self, item: ItemHandle, blob: &[u8]) {
        self.blobs.insert(item, blob.to_vec());
    }

    pub fn bump_signature(&mut self, item: ItemHandle) {
        *self.signatures.entry(item).or_insert(0) += 1;
    }
}

#[cfg(test)]
impl ItemStore for MemoryItemStore {
    fn read_blob(&self, item: ItemHandle) -> Option<Vec<u8>> {
        self.blobs.get(&item).cloned()
    }

    fn write_blob(&mut self, item: ItemHandle, blob: Vec<u8>) {
        self.writes += 1;
        self.blobs.insert(item, blob);
    }

    fn item_class(&self, item: ItemHandle) -> Option<ItemClass> {
        self.classes.get(&item).copied()
    }

    fn signature(&self, item: ItemHandle) -> u64 {
        self.signatures.get(&item).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{keys, CatalogConfig, CatalogTable};

    fn setup() -> (SlotStore, MemoryItemStore, ItemHandle) {
        let mut store = MemoryItemStore::new();
        let item = ItemHandle::new(1);
        store.add_item(item, ItemClass::Offense);
        (SlotStore::new(), store, item)
    }

    fn keen(value1: f64, value2: i32) -> SlotRecord {
        SlotRecord::filled(EffectId::new(keys::KEEN_EDGE), value1, value2)
    }

    #[test]
    fn test_missing_blob_reads_default_state() {
        let (slots, store, item) = setup();
        let state = slots.state(&store, item).expect("reads");
        assert_eq!(state.capacity(), 1);
        assert_eq!(state.occupied(), 0);
    }

    #[test]
    fn test_set_slot_roundtrips_through_blob() {
        let (slots, mut store, item) = setup();
        slots.set_capacity(&mut store, item, 3).expect("grows");
        let previous = slots
            .set_slot(&mut store, item, 1, keen(2.5, 0))
            .expect("writes");
        assert!(previous.is_empty());

        let records = slots.get_slots(&store, item).expect("reads");
        assert_eq!(records.len(), 3);
        assert_eq!(records[1], keen(2.5, 0));
        assert_eq!(
            slots.first_empty_slot(&store, item).expect("reads"),
            Some(0)
        );
    }

    #[test]
    fn test_capacity_monotonic_and_clamped() {
        let (slots, mut store, item) = setup();
        assert_eq!(slots.set_capacity(&mut store, item, 3).expect("ok"), 3);
        // Shrinking is ignored.
        assert_eq!(slots.set_capacity(&mut store, item, 2).expect("ok"), 3);
        // Above the maximum clamps.
        assert_eq!(slots.set_capacity(&mut store, item, 9).expect("ok"), 4);
        assert_eq!(slots.capacity(&store, item).expect("ok"), 4);
    }

    #[test]
    fn test_expand_capacity_stops_at_max() {
        let (slots, mut store, item) = setup();
        assert!(slots.expand_capacity(&mut store, item).expect("ok"));
        assert!(slots.expand_capacity(&mut store, item).expect("ok"));
        assert!(slots.expand_capacity(&mut store, item).expect("ok"));
        assert!(!slots.expand_capacity(&mut store, item).expect("ok"));
        assert_eq!(slots.capacity(&store, item).expect("ok"), MAX_SLOTS);
    }

    #[test]
    fn test_invalid_index_rejected_without_write() {
        let (slots, mut store, item) = setup();
        let writes_before = store.writes;
        let result = slots.set_slot(&mut store, item, 2, keen(1.0, 0));
        assert!(matches!(
            result,
            Err(SlotError::InvalidIndex {
                index: 2,
                capacity: 1
            })
        ));
        assert_eq!(store.writes, writes_before);
    }

    #[test]
    fn test_sums_include_legacy_migrated_slot() {
        let (slots, mut store, item) = setup();
        store.set_blob(item, b"keen_edge:2:1");

        let id = EffectId::new(keys::KEEN_EDGE);
        assert!((slots.sum_value1(&store, item, &id).expect("ok") - 2.0).abs() < 1e-9);

        // Growing capacity rewrites in the new format; sums then span
        // the migrated slot and a newly written one.
        slots.set_capacity(&mut store, item, 2).expect("ok");
        slots
            .set_slot(&mut store, item, 1, keen(3.0, 4))
            .expect("ok");
        assert!((slots.sum_value1(&store, item, &id).expect("ok") - 5.0).abs() < 1e-9);
        assert_eq!(slots.sum_value2(&store, item, &id).expect("ok"), 5);
    }

    #[test]
    fn test_remove_slot_returns_previous() {
        let (slots, mut store, item) = setup();
        slots
            .set_slot(&mut store, item, 0, keen(1.5, 0))
            .expect("ok");
        let removed = slots.remove_slot(&mut store, item, 0).expect("ok");
        assert_eq!(removed, keen(1.5, 0));
        assert_eq!(slots.state(&store, item).expect("ok").occupied(), 0);
    }

    #[test]
    fn test_slot_descriptions() {
        let (slots, mut store, item) = setup();
        let table = CatalogTable::build(CatalogConfig::standard()).expect("valid");
        slots.set_capacity(&mut store, item, 2).expect("ok");
        slots
            .set_slot(&mut store, item, 0, keen(3.0, 0))
            .expect("ok");

        let descriptions = slots.slot_descriptions(&store, item, &table).expect("ok");
        assert_eq!(descriptions[0], "+3 damage on every hit");
        assert_eq!(descriptions[1], "(empty)");
    }
}
