//! Persistent slot records and the slot blob codec.
//!
//! This module owns the only persisted representation of an item's augment
//! state. Nothing outside it parses or formats the raw blob.
//!
//! Format (one ASCII line, stored as UTF-8 bytes in the host's opaque
//! per-item metadata blob):
//!
//! ```text
//! ARCS|<major>|<capacity>|<slot>;<slot>;...
//! slot := <effectId>:<value1>:<value2> | -
//! ```
//!
//! Exactly `capacity` slot fields are written; `-` marks an empty slot.
//! Effect ids are snake_case keys and never contain the delimiters.
//!
//! A blob that does not start with the magic is treated as the legacy
//! single-effect format: one bare `effectId:value1:value2` triple, which
//! decodes to slot 0 of a capacity-1 state. Encoding always produces the
//! current format, so the migration happens exactly once.

use crate::catalog::EffectId;
use arcanum_common::{MagicBytes, SchemaVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Slot codec error types.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// Blob is not valid UTF-8
    #[error("slot blob is not valid UTF-8")]
    NotText,
    /// Blob structure does not match the format
    #[error("malformed slot blob: {0}")]
    Malformed(String),
    /// Blob was written by an incompatible newer format
    #[error("unsupported slot blob version: {found}")]
    UnsupportedVersion {
        /// Major version found in the blob
        found: u16,
    },
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Maximum number of augment slots an item can carry.
pub const MAX_SLOTS: u8 = 4;

/// Minimum (and default) slot capacity.
pub const MIN_SLOTS: u8 = 1;

/// Sentinel marking an empty slot in the encoded blob.
const EMPTY_SENTINEL: &str = "-";

/// One persistent slot on an item: a rolled effect instance, or empty.
///
/// Rolled values are frozen at roll time and never re-rolled in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotRecord {
    /// Rolled effect id; `None` marks an empty slot
    pub effect: Option<EffectId>,
    /// Frozen primary magnitude
    pub value1: f64,
    /// Frozen secondary parameter
    pub value2: i32,
}

impl SlotRecord {
    /// An empty slot.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            effect: None,
            value1: 0.0,
            value2: 0,
        }
    }

    /// A filled slot with frozen rolled values.
    #[must_use]
    pub fn filled(effect: EffectId, value1: f64, value2: i32) -> Self {
        Self {
            effect: Some(effect),
            value1,
            value2,
        }
    }

    /// Checks whether the slot is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.effect.is_none()
    }
}

impl Default for SlotRecord {
    fn default() -> Self {
        Self::empty()
    }
}

/// The ordered augment slots of one item, plus its capacity.
///
/// Invariants: `1 <= capacity <= 4`, the slot vector always holds exactly
/// `capacity` records, and capacity never decreases once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentAugmentState {
    capacity: u8,
    slots: Vec<SlotRecord>,
}

impl EquipmentAugmentState {
    /// Creates an empty state with the given capacity (clamped to 1..=4).
    #[must_use]
    pub fn new(capacity: u8) -> Self {
        let capacity = capacity.clamp(MIN_SLOTS, MAX_SLOTS);
        Self {
            capacity,
            slots: vec![SlotRecord::empty(); capacity as usize],
        }
    }

    /// The item's slot capacity.
    #[must_use]
    pub const fn capacity(&self) -> u8 {
        self.capacity
    }

    /// Grows capacity to `capacity` (clamped to 1..=4). Capacity is
    /// monotonic: a smaller request leaves the state unchanged.
    pub fn grow_capacity(&mut self, capacity: u8) {
        let capacity = capacity.clamp(MIN_SLOTS, MAX_SLOTS);
        while self.capacity < capacity {
            self.capacity += 1;
            self.slots.push(SlotRecord::empty());
        }
    }

    /// All slot records, in slot order.
    #[must_use]
    pub fn slots(&self) -> &[SlotRecord] {
        &self.slots
    }

    /// One slot record by index.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&SlotRecord> {
        self.slots.get(index)
    }

    /// Index of the first empty slot, if any.
    #[must_use]
    pub fn first_empty(&self) -> Option<usize> {
        self.slots.iter().position(SlotRecord::is_empty)
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_empty()).count()
    }

    /// Checks whether every slot is occupied.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.first_empty().is_none()
    }

    /// Replaces the record at `index`. Returns the previous record, or
    /// `None` if the index is out of range (state unchanged).
    pub fn set_slot(&mut self, index: usize, record: SlotRecord) -> Option<SlotRecord> {
        let slot = self.slots.get_mut(index)?;
        Some(std::mem::replace(slot, record))
    }

    /// Empties the record at `index`. Returns the previous record, or
    /// `None` if the index is out of range.
    pub fn clear_slot(&mut self, index: usize) -> Option<SlotRecord> {
        self.set_slot(index, SlotRecord::empty())
    }

    /// Sum of `value1` across occupied slots holding the given effect.
    #[must_use]
    pub fn sum_value1(&self, effect: &EffectId) -> f64 {
        self.slots
            .iter()
            .filter(|s| s.effect.as_ref() == Some(effect))
            .map(|s| s.value1)
            .sum()
    }

    /// Sum of `value2` across occupied slots holding the given effect.
    #[must_use]
    pub fn sum_value2(&self, effect: &EffectId) -> i32 {
        self.slots
            .iter()
            .filter(|s| s.effect.as_ref() == Some(effect))
            .map(|s| s.value2)
            .sum()
    }
}

impl Default for EquipmentAugmentState {
    fn default() -> Self {
        Self::new(MIN_SLOTS)
    }
}

// ============================================================================
// Encode / decode
// ============================================================================

/// Encodes a state into its persisted blob.
#[must_use]
pub fn encode(state: &EquipmentAugmentState) -> Vec<u8> {
    let mut out = String::with_capacity(16 + state.slots().len() * 24);
    out.push_str(MagicBytes::SLOTS.as_str());
    out.push('|');
    out.push_str(&SchemaVersion::SLOT_BLOB.major.to_string());
    out.push('|');
    out.push_str(&state.capacity().to_string());
    out.push('|');
    for (i, slot) in state.slots().iter().enumerate() {
        if i > 0 {
            out.push(';');
        }
        match &slot.effect {
            Some(effect) => {
                out.push_str(effect.as_str());
                out.push(':');
                out.push_str(&slot.value1.to_string());
                out.push(':');
                out.push_str(&slot.value2.to_string());
            }
            None => out.push_str(EMPTY_SENTINEL),
        }
    }
    out.into_bytes()
}

/// Decodes a persisted blob into a state.
///
/// Decoding is lenient where leniency cannot violate invariants: missing
/// trailing slots pad as empty, an unparseable slot triple decodes as
/// empty with a warning, and an out-of-range capacity is clamped.
/// Structural damage (wrong field count, unreadable capacity) is an error.
pub fn decode(blob: &[u8]) -> CodecResult<EquipmentAugmentState> {
    let text = std::str::from_utf8(blob).map_err(|_| CodecError::NotText)?;
    if !MagicBytes::SLOTS.matches(blob) {
        return decode_legacy(text);
    }

    let mut fields = text.splitn(4, '|');
    let _magic = fields.next();
    let version: u16 = fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CodecError::Malformed("missing version".to_string()))?;
    if version > SchemaVersion::SLOT_BLOB.major {
        return Err(CodecError::UnsupportedVersion { found: version });
    }
    let capacity: u8 = fields
        .next()
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CodecError::Malformed("missing capacity".to_string()))?;
    let slot_text = fields
        .next()
        .ok_or_else(|| CodecError::Malformed("missing slot list".to_string()))?;

    let mut state = EquipmentAugmentState::new(capacity);
    for (i, field) in slot_text.split(';').enumerate() {
        if i >= state.capacity() as usize {
            warn!("Slot blob carries more slots than capacity; extra slots dropped");
            break;
        }
        if field == EMPTY_SENTINEL || field.is_empty() {
            continue;
        }
        match parse_triple(field) {
            Some(record) => {
                state.set_slot(i, record);
            }
            None => warn!("Unparseable slot record {:?}; slot left empty", field),
        }
    }
    Ok(state)
}

/// Checks whether a blob is in the legacy single-effect format.
#[must_use]
pub fn is_legacy(blob: &[u8]) -> bool {
    !blob.is_empty() && !MagicBytes::SLOTS.matches(blob)
}

/// Decodes the legacy single-effect format: one bare triple, no capacity.
fn decode_legacy(text: &str) -> CodecResult<EquipmentAugmentState> {
    let record = parse_triple(text.trim())
        .ok_or_else(|| CodecError::Malformed(format!("unreadable legacy record {text:?}")))?;
    let mut state = EquipmentAugmentState::new(MIN_SLOTS);
    state.set_slot(0, record);
    Ok(state)
}

/// Parses one `effectId:value1:value2` triple.
fn parse_triple(field: &str) -> Option<SlotRecord> {
    let mut parts = field.splitn(3, ':');
    let id = parts.next().filter(|s| !s.is_empty())?;
    let value1: f64 = parts.next()?.parse().ok().filter(|v: &f64| v.is_finite())?;
    let value2: i32 = parts.next()?.parse().ok()?;
    Some(SlotRecord::filled(EffectId::new(id), value1, value2))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keen(value1: f64, value2: i32) -> SlotRecord {
        SlotRecord::filled(EffectId::new("keen_edge"), value1, value2)
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut state = EquipmentAugmentState::new(3);
        state.set_slot(0, keen(2.75, 0));
        state.set_slot(2, SlotRecord::filled(EffectId::new("thorns"), 12.5, 15));

        let blob = encode(&state);
        assert_eq!(
            String::from_utf8(blob.clone()).expect("ascii"),
            "ARCS|1|3|keen_edge:2.75:0;-;thorns:12.5:15"
        );
        let decoded = decode(&blob).expect("decodes");
        assert_eq!(decoded, state);
    }

    #[test]
    fn test_empty_state_roundtrip() {
        let state = EquipmentAugmentState::new(1);
        let decoded = decode(&encode(&state)).expect("decodes");
        assert_eq!(decoded, state);
        assert_eq!(decoded.first_empty(), Some(0));
    }

    #[test]
    fn test_legacy_blob_migrates_to_slot_zero() {
        let decoded = decode(b"keen_edge:3.5:2").expect("decodes");
        assert_eq!(decoded.capacity(), 1);
        assert_eq!(decoded.slot(0), Some(&keen(3.5, 2)));
        assert!(decoded.is_full());

        // Re-encoding produces the current format.
        let blob = encode(&decoded);
        assert!(MagicBytes::SLOTS.matches(&blob));
        assert!(!is_legacy(&blob));
    }

    #[test]
    fn test_legacy_detection() {
        assert!(is_legacy(b"keen_edge:3.5:2"));
        assert!(!is_legacy(b""));
        assert!(!is_legacy(b"ARCS|1|1|-"));
    }

    #[test]
    fn test_bad_slot_field_decodes_empty() {
        let decoded = decode(b"ARCS|1|2|keen_edge:oops:0;thorns:10:5").expect("decodes");
        assert!(decoded.slot(0).is_some_and(SlotRecord::is_empty));
        assert_eq!(
            decoded.slot(1).and_then(|s| s.effect.clone()),
            Some(EffectId::new("thorns"))
        );
    }

    #[test]
    fn test_missing_trailing_slots_pad_empty() {
        let decoded = decode(b"ARCS|1|4|keen_edge:1:0").expect("decodes");
        assert_eq!(decoded.capacity(), 4);
        assert_eq!(decoded.occupied(), 1);
        assert_eq!(decoded.first_empty(), Some(1));
    }

    #[test]
    fn test_capacity_clamped() {
        let decoded = decode(b"ARCS|1|9|-").expect("decodes");
        assert_eq!(decoded.capacity(), MAX_SLOTS);
        let decoded = decode(b"ARCS|1|0|-").expect("decodes");
        assert_eq!(decoded.capacity(), MIN_SLOTS);
    }

    #[test]
    fn test_newer_major_version_rejected() {
        assert!(matches!(
            decode(b"ARCS|2|1|-"),
            Err(CodecError::UnsupportedVersion { found: 2 })
        ));
    }

    #[test]
    fn test_structurally_broken_blob_rejected() {
        assert!(decode(b"ARCS|1").is_err());
        assert!(decode(b"not a record at all").is_err());
        assert!(decode(&[0xff, 0xfe, 0x01]).is_err());
    }

    #[test]
    fn test_grow_capacity_monotonic() {
        let mut state = EquipmentAugmentState::new(2);
        state.grow_capacity(1);
        assert_eq!(state.capacity(), 2);
        state.grow_capacity(4);
        assert_eq!(state.capacity(), 4);
        assert_eq!(state.slots().len(), 4);
        state.grow_capacity(9);
        assert_eq!(state.capacity(), 4);
    }

    #[test]
    fn test_sums_aggregate_matching_slots_only() {
        let mut state = EquipmentAugmentState::new(4);
        state.set_slot(0, keen(2.0, 1));
        state.set_slot(1, SlotRecord::filled(EffectId::new("thorns"), 9.0, 9));
        state.set_slot(2, keen(3.5, 2));

        let id = EffectId::new("keen_edge");
        assert!((state.sum_value1(&id) - 5.5).abs() < 1e-9);
        assert_eq!(state.sum_value2(&id), 3);
    }

    #[test]
    fn test_set_slot_out_of_range_is_noop() {
        let mut state = EquipmentAugmentState::new(1);
        assert!(state.set_slot(3, keen(1.0, 0)).is_none());
        assert_eq!(state.occupied(), 0);
    }
}
