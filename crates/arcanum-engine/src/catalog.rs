//! Effect catalog: definitions, rarity tiers, weights, and reload.
//!
//! This module provides:
//! - Effect definitions with value ranges and applicability categories
//! - Rarity tiers with configurable weights
//! - The RON catalog config format and the built-in standard table
//! - Atomic whole-table reload (readers hold a snapshot reference)

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Catalog error types.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// I/O error reading a catalog file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file failed to parse
    #[error("Catalog parse error: {0}")]
    Parse(String),

    /// Two definitions share an effect id
    #[error("Duplicate effect id: {0}")]
    DuplicateEffect(String),

    /// A definition carries an inverted value range
    #[error("Invalid value range on effect {effect}: min {min} > max {max}")]
    InvalidRange {
        /// Offending effect id
        effect: String,
        /// Range minimum
        min: f64,
        /// Range maximum
        max: f64,
    },

    /// A weight is negative or non-finite
    #[error("Invalid weight on {what}: {weight}")]
    InvalidWeight {
        /// Tier or effect the weight belongs to
        what: String,
        /// Offending weight
        weight: f64,
    },

    /// Pity threshold must be at least 1
    #[error("Pity threshold must be >= 1, got {0}")]
    InvalidPityThreshold(u32),
}

/// Result type for catalog operations.
pub type CatalogResult<T> = Result<T, CatalogError>;

// ============================================================================
// Categories and tiers
// ============================================================================

/// The equipment class a token may target and an action reads from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemClass {
    /// Weapons and other offense items.
    Offense,
    /// Armor and other defense items.
    Defense,
    /// Tools, rods, and other gathering items.
    Gather,
}

impl ItemClass {
    /// All item classes.
    pub const ALL: [Self; 3] = [Self::Offense, Self::Defense, Self::Gather];
}

impl std::fmt::Display for ItemClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Offense => write!(f, "offense"),
            Self::Defense => write!(f, "defense"),
            Self::Gather => write!(f, "gather"),
        }
    }
}

/// The applicability category of an effect definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectCategory {
    /// Applies to offense items only.
    Offense,
    /// Applies to defense items only.
    Defense,
    /// Applies to gathering items only.
    Gather,
    /// Applies to any item class.
    Universal,
}

impl EffectCategory {
    /// Checks whether an effect of this category can roll onto (or fire
    /// from) an item of the given class.
    #[must_use]
    pub fn applies_to(self, class: ItemClass) -> bool {
        match self {
            Self::Universal => true,
            Self::Offense => class == ItemClass::Offense,
            Self::Defense => class == ItemClass::Defense,
            Self::Gather => class == ItemClass::Gather,
        }
    }
}

/// Rarity tier grouping effect definitions by roll weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RarityTier {
    /// Baseline tier.
    Common,
    /// Slightly rarer than common.
    Uncommon,
    /// Mid tier.
    Rare,
    /// High tier.
    Epic,
    /// Top tier; the pity ceiling target.
    Legendary,
}

impl RarityTier {
    /// All tiers, lowest to highest.
    pub const ALL: [Self; 5] = [
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
    ];

    /// Checks whether this tier is the pity/ceiling target.
    #[must_use]
    pub const fn is_ceiling(self) -> bool {
        matches!(self, Self::Legendary)
    }

    /// Returns the next lower tier, if any.
    #[must_use]
    pub const fn next_lower(self) -> Option<Self> {
        match self {
            Self::Common => None,
            Self::Uncommon => Some(Self::Common),
            Self::Rare => Some(Self::Uncommon),
            Self::Epic => Some(Self::Rare),
            Self::Legendary => Some(Self::Epic),
        }
    }

    /// Display name for notifications and feedback.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Uncommon => "Uncommon",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
        }
    }
}

// ============================================================================
// Effect definitions
// ============================================================================

/// Stable string key identifying an effect definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EffectId(String);

impl EffectId {
    /// Creates an effect id from a key string.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EffectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EffectId {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}

/// Continuous value range for an effect's primary magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    /// Minimum rolled value (inclusive)
    pub min: f64,
    /// Maximum rolled value (inclusive)
    pub max: f64,
}

impl ValueRange {
    /// Creates a new range.
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Fixed range producing a single value.
    #[must_use]
    pub const fn fixed(value: f64) -> Self {
        Self {
            min: value,
            max: value,
        }
    }

    /// Checks whether a value lies inside the range (inclusive).
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Integer value range for an effect's secondary parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntRange {
    /// Minimum rolled value (inclusive)
    pub min: i32,
    /// Maximum rolled value (inclusive)
    pub max: i32,
}

impl IntRange {
    /// Creates a new range.
    #[must_use]
    pub const fn new(min: i32, max: i32) -> Self {
        Self { min, max }
    }

    /// Unused secondary value (always rolls 0).
    pub const UNUSED: Self = Self { min: 0, max: 0 };

    /// Checks whether a value lies inside the range (inclusive).
    #[must_use]
    pub fn contains(&self, value: i32) -> bool {
        value >= self.min && value <= self.max
    }
}

/// A named, weighted effect template with value ranges and a category.
///
/// Immutable once loaded into a catalog table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectDefinition {
    /// Stable string key
    pub id: EffectId,
    /// Display name
    pub name: String,
    /// Applicability category
    pub category: EffectCategory,
    /// Rarity tier
    pub tier: RarityTier,
    /// Primary magnitude range (continuous)
    pub value1: ValueRange,
    /// Secondary parameter range (integer, zero if unused)
    pub value2: IntRange,
    /// Description template; `{1}` and `{2}` expand to the rolled values
    pub description: String,
    /// Whether this effect can roll and resolve
    pub enabled: bool,
    /// Optional weight override; defaults to the tier's base weight
    pub weight: Option<f64>,
}

/// Effect key constants for the standard table.
pub mod keys {
    /// Flat bonus damage.
    pub const KEEN_EDGE: &str = "keen_edge";
    /// Percentage bonus damage.
    pub const SAVAGE_STRIKE: &str = "savage_strike";
    /// Bonus damage against weakened targets.
    pub const EXECUTIONER: &str = "executioner";
    /// Heal for a share of damage dealt.
    pub const VAMPIRIC_EDGE: &str = "vampiric_edge";
    /// Consecutive-hit combo damage.
    pub const STORMFURY: &str = "stormfury";
    /// Chance for currency on a killing blow.
    pub const BOUNTY_HUNTER: &str = "bounty_hunter";
    /// Speed burst after a killing blow.
    pub const ADRENALINE: &str = "adrenaline";
    /// Chance to slow the target on hit.
    pub const FROST_EDGE: &str = "frost_edge";
    /// Bonus damage on ranged attacks.
    pub const LONGSHOT: &str = "longshot";
    /// Percentage bonus damage on weakened targets plus on-kill heal.
    pub const REAPER_MARK: &str = "reaper_mark";
    /// Flat incoming damage reduction.
    pub const IRON_BULWARK: &str = "iron_bulwark";
    /// Percentage incoming damage reduction.
    pub const DEFLECTION: &str = "deflection";
    /// Chance to reflect damage to the attacker.
    pub const THORNS: &str = "thorns";
    /// Chance to gain an absorb shield when hit.
    pub const AEGIS_BARRIER: &str = "aegis_barrier";
    /// Regeneration after going unhurt for a while.
    pub const SECOND_WIND: &str = "second_wind";
    /// Stealth after going idle for a while.
    pub const SHADOWMELD: &str = "shadowmeld";
    /// Survive a lethal hit, on a cooldown.
    pub const GUARDIAN_SPIRIT: &str = "guardian_spirit";
    /// Chance for multiplied gathering yield.
    pub const PROSPECTOR: &str = "prospector";
    /// Chance for currency while gathering.
    pub const GILDED_TOUCH: &str = "gilded_touch";
    /// Faster gathering.
    pub const QUARRY_HASTE: &str = "quarry_haste";
    /// Chance for extra crops and a replant.
    pub const GREEN_THUMB: &str = "green_thumb";
    /// Shorter fishing waits.
    pub const ANGLERS_LUCK: &str = "anglers_luck";
    /// Chance for treasure while fishing.
    pub const TREASURE_LINE: &str = "treasure_line";
    /// Chance for a triple yield plus currency.
    pub const MOTHERLODE: &str = "motherlode";
    /// Bonus experience from any source.
    pub const SCHOLARS_INSIGHT: &str = "scholars_insight";
    /// Critical strike chance, pooled across equipped items.
    pub const CRITICAL_FOCUS: &str = "critical_focus";
}

// ============================================================================
// Catalog config (RON)
// ============================================================================

/// Per-tier base roll weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierWeights {
    /// Common tier weight
    pub common: f64,
    /// Uncommon tier weight
    pub uncommon: f64,
    /// Rare tier weight
    pub rare: f64,
    /// Epic tier weight
    pub epic: f64,
    /// Legendary tier weight
    pub legendary: f64,
}

impl Default for TierWeights {
    fn default() -> Self {
        Self {
            common: 100.0,
            uncommon: 55.0,
            rare: 25.0,
            epic: 8.0,
            legendary: 2.0,
        }
    }
}

impl TierWeights {
    /// Returns the base weight for a tier.
    #[must_use]
    pub const fn weight(&self, tier: RarityTier) -> f64 {
        match tier {
            RarityTier::Common => self.common,
            RarityTier::Uncommon => self.uncommon,
            RarityTier::Rare => self.rare,
            RarityTier::Epic => self.epic,
            RarityTier::Legendary => self.legendary,
        }
    }
}

/// Default pity threshold: a legendary is guaranteed on the 150th roll
/// since the last one.
pub const DEFAULT_PITY_THRESHOLD: u32 = 150;

/// Default slot-selection session timeout in seconds.
pub const DEFAULT_SESSION_TIMEOUT: f64 = 30.0;

/// The catalog configuration document (RON on disk).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Per-tier base weights
    pub tier_weights: TierWeights,
    /// Rolls since the last top-tier result before one is forced
    pub pity_threshold: u32,
    /// Seconds before a slot-selection session expires
    pub session_timeout: f64,
    /// Effect definitions
    pub effects: Vec<EffectDefinition>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::standard()
    }
}

/// Shorthand for building a standard-table definition.
fn def(
    id: &str,
    name: &str,
    category: EffectCategory,
    tier: RarityTier,
    value1: ValueRange,
    value2: IntRange,
    description: &str,
) -> EffectDefinition {
    EffectDefinition {
        id: EffectId::new(id),
        name: name.to_string(),
        category,
        tier,
        value1,
        value2,
        description: description.to_string(),
        enabled: true,
        weight: None,
    }
}

impl CatalogConfig {
    /// The built-in standard effect table.
    ///
    /// Hosts that ship no catalog file get this table; a RON file with the
    /// same shape can replace or extend it at load time.
    #[must_use]
    pub fn standard() -> Self {
        use EffectCategory::{Defense, Gather, Offense, Universal};
        use RarityTier::{Common, Epic, Legendary, Rare, Uncommon};

        let effects = vec![
            // Offense
            def(
                keys::KEEN_EDGE,
                "Keen Edge",
                Offense,
                Common,
                ValueRange::new(1.0, 4.0),
                IntRange::UNUSED,
                "+{1} damage on every hit",
            ),
            def(
                keys::SAVAGE_STRIKE,
                "Savage Strike",
                Offense,
                Uncommon,
                ValueRange::new(3.0, 9.0),
                IntRange::UNUSED,
                "+{1}% damage on every hit",
            ),
            def(
                keys::EXECUTIONER,
                "Executioner",
                Offense,
                Rare,
                ValueRange::new(10.0, 25.0),
                IntRange::new(20, 35),
                "+{1}% damage against targets below {2}% health",
            ),
            def(
                keys::VAMPIRIC_EDGE,
                "Vampiric Edge",
                Offense,
                Rare,
                ValueRange::new(2.0, 6.0),
                IntRange::UNUSED,
                "Heal for {1}% of damage dealt",
            ),
            def(
                keys::STORMFURY,
                "Stormfury",
                Offense,
                Epic,
                ValueRange::new(2.0, 5.0),
                IntRange::new(3, 6),
                "Consecutive hits within {2}s each add {1}% damage",
            ),
            def(
                keys::BOUNTY_HUNTER,
                "Bounty Hunter",
                Offense,
                Uncommon,
                ValueRange::new(5.0, 20.0),
                IntRange::new(10, 25),
                "{2}% chance for {1} coins on a killing blow",
            ),
            def(
                keys::ADRENALINE,
                "Adrenaline",
                Offense,
                Rare,
                ValueRange::new(10.0, 30.0),
                IntRange::new(3, 6),
                "+{1}% speed for {2}s after a killing blow",
            ),
            def(
                keys::FROST_EDGE,
                "Frost Edge",
                Offense,
                Uncommon,
                ValueRange::new(15.0, 35.0),
                IntRange::new(5, 15),
                "{2}% chance to slow the target by {1}%",
            ),
            def(
                keys::LONGSHOT,
                "Longshot",
                Offense,
                Uncommon,
                ValueRange::new(5.0, 15.0),
                IntRange::UNUSED,
                "+{1}% damage on ranged attacks",
            ),
            def(
                keys::REAPER_MARK,
                "Reaper's Mark",
                Offense,
                Legendary,
                ValueRange::new(20.0, 40.0),
                IntRange::new(5, 15),
                "+{1}% damage against weakened targets; killing blows heal {2}",
            ),
            // Defense
            def(
                keys::IRON_BULWARK,
                "Iron Bulwark",
                Defense,
                Common,
                ValueRange::new(0.5, 2.0),
                IntRange::UNUSED,
                "-{1} damage from every hit",
            ),
            def(
                keys::DEFLECTION,
                "Deflection",
                Defense,
                Uncommon,
                ValueRange::new(2.0, 6.0),
                IntRange::UNUSED,
                "-{1}% damage from every hit",
            ),
            def(
                keys::THORNS,
                "Thorns",
                Defense,
                Uncommon,
                ValueRange::new(10.0, 30.0),
                IntRange::new(10, 25),
                "{2}% chance to reflect {1}% of incoming damage",
            ),
            def(
                keys::AEGIS_BARRIER,
                "Aegis Barrier",
                Defense,
                Epic,
                ValueRange::new(4.0, 12.0),
                IntRange::new(5, 15),
                "{2}% chance when hit to gain a shield absorbing {1} damage",
            ),
            def(
                keys::SECOND_WIND,
                "Second Wind",
                Defense,
                Rare,
                ValueRange::new(0.5, 2.0),
                IntRange::new(5, 10),
                "Regenerate {1} health per second after {2}s unhurt",
            ),
            def(
                keys::SHADOWMELD,
                "Shadowmeld",
                Defense,
                Epic,
                ValueRange::fixed(1.0),
                IntRange::new(8, 15),
                "Fade from sight after {2}s of stillness",
            ),
            def(
                keys::GUARDIAN_SPIRIT,
                "Guardian Spirit",
                Defense,
                Legendary,
                ValueRange::new(2.0, 6.0),
                IntRange::new(90, 180),
                "Survive a lethal hit with {1} health ({2}s cooldown)",
            ),
            // Gathering
            def(
                keys::PROSPECTOR,
                "Prospector",
                Gather,
                Uncommon,
                ValueRange::fixed(2.0),
                IntRange::new(8, 20),
                "{2}% chance for double yield",
            ),
            def(
                keys::GILDED_TOUCH,
                "Gilded Touch",
                Gather,
                Rare,
                ValueRange::new(1.0, 5.0),
                IntRange::new(5, 12),
                "{2}% chance for {1} coins while gathering",
            ),
            def(
                keys::QUARRY_HASTE,
                "Quarry Haste",
                Gather,
                Common,
                ValueRange::new(5.0, 15.0),
                IntRange::UNUSED,
                "+{1}% gathering speed",
            ),
            def(
                keys::GREEN_THUMB,
                "Green Thumb",
                Gather,
                Uncommon,
                ValueRange::new(1.0, 3.0),
                IntRange::new(10, 30),
                "{2}% chance for {1} extra crops and a free replant",
            ),
            def(
                keys::ANGLERS_LUCK,
                "Angler's Luck",
                Gather,
                Uncommon,
                ValueRange::new(5.0, 20.0),
                IntRange::UNUSED,
                "-{1}% fishing wait time",
            ),
            def(
                keys::TREASURE_LINE,
                "Treasure Line",
                Gather,
                Epic,
                ValueRange::new(10.0, 50.0),
                IntRange::new(3, 8),
                "{2}% chance to reel in treasure worth {1} coins",
            ),
            def(
                keys::MOTHERLODE,
                "Motherlode",
                Gather,
                Legendary,
                ValueRange::new(5.0, 25.0),
                IntRange::new(5, 10),
                "{2}% chance for triple yield and {1} coins",
            ),
            // Universal
            def(
                keys::SCHOLARS_INSIGHT,
                "Scholar's Insight",
                Universal,
                Rare,
                ValueRange::new(3.0, 10.0),
                IntRange::UNUSED,
                "+{1}% experience from every source",
            ),
            def(
                keys::CRITICAL_FOCUS,
                "Critical Focus",
                Universal,
                Legendary,
                ValueRange::new(2.0, 8.0),
                IntRange::UNUSED,
                "+{1}% critical strike chance",
            ),
        ];

        Self {
            tier_weights: TierWeights::default(),
            pity_threshold: DEFAULT_PITY_THRESHOLD,
            session_timeout: DEFAULT_SESSION_TIMEOUT,
            effects,
        }
    }

    /// Parses a catalog config from a RON string.
    pub fn from_ron_str(text: &str) -> CatalogResult<Self> {
        ron::from_str(text).map_err(|e| CatalogError::Parse(e.to_string()))
    }

    /// Loads a catalog config from a RON file.
    pub fn load_from_path(path: &Path) -> CatalogResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron_str(&text)?;
        info!(
            "Loaded catalog config from {:?}: {} effects",
            path,
            config.effects.len()
        );
        Ok(config)
    }
}

// ============================================================================
// Catalog table and atomic reload
// ============================================================================

/// A validated, immutable catalog table built from a config.
#[derive(Debug)]
pub struct CatalogTable {
    effects: AHashMap<EffectId, EffectDefinition>,
    /// Definition ids in config order, for stable listings.
    order: Vec<EffectId>,
    tier_weights: TierWeights,
    pity_threshold: u32,
    session_timeout: f64,
}

impl CatalogTable {
    /// Builds and validates a table from a config.
    pub fn build(config: CatalogConfig) -> CatalogResult<Self> {
        if config.pity_threshold == 0 {
            return Err(CatalogError::InvalidPityThreshold(0));
        }
        for tier in RarityTier::ALL {
            let w = config.tier_weights.weight(tier);
            if !w.is_finite() || w < 0.0 {
                return Err(CatalogError::InvalidWeight {
                    what: format!("tier {}", tier.display_name()),
                    weight: w,
                });
            }
        }

        let mut effects = AHashMap::with_capacity(config.effects.len());
        let mut order = Vec::with_capacity(config.effects.len());
        for effect in config.effects {
            if effect.value1.min > effect.value1.max {
                return Err(CatalogError::InvalidRange {
                    effect: effect.id.to_string(),
                    min: effect.value1.min,
                    max: effect.value1.max,
                });
            }
            if effect.value2.min > effect.value2.max {
                return Err(CatalogError::InvalidRange {
                    effect: effect.id.to_string(),
                    min: f64::from(effect.value2.min),
                    max: f64::from(effect.value2.max),
                });
            }
            if let Some(w) = effect.weight {
                if !w.is_finite() || w < 0.0 {
                    return Err(CatalogError::InvalidWeight {
                        what: format!("effect {}", effect.id),
                        weight: w,
                    });
                }
            }
            if effects.contains_key(&effect.id) {
                return Err(CatalogError::DuplicateEffect(effect.id.to_string()));
            }
            order.push(effect.id.clone());
            effects.insert(effect.id.clone(), effect);
        }

        Ok(Self {
            effects,
            order,
            tier_weights: config.tier_weights,
            pity_threshold: config.pity_threshold,
            session_timeout: config.session_timeout,
        })
    }

    /// Looks up a definition by id.
    #[must_use]
    pub fn get(&self, id: &EffectId) -> Option<&EffectDefinition> {
        self.effects.get(id)
    }

    /// Checks whether an effect exists and is enabled.
    #[must_use]
    pub fn is_enabled(&self, id: &EffectId) -> bool {
        self.effects.get(id).is_some_and(|e| e.enabled)
    }

    /// All enabled definitions applicable to the given item class,
    /// in stable config order.
    pub fn effects_for(&self, class: ItemClass) -> impl Iterator<Item = &EffectDefinition> {
        self.order
            .iter()
            .filter_map(|id| self.effects.get(id))
            .filter(move |e| e.enabled && e.category.applies_to(class))
    }

    /// The configured roll weight of a definition (override or tier base).
    #[must_use]
    pub fn weight(&self, effect: &EffectDefinition) -> f64 {
        effect
            .weight
            .unwrap_or_else(|| self.tier_weights.weight(effect.tier))
    }

    /// Base weight of a tier.
    #[must_use]
    pub const fn tier_weight(&self, tier: RarityTier) -> f64 {
        self.tier_weights.weight(tier)
    }

    /// Rolls since the last top-tier result before one is forced.
    #[must_use]
    pub const fn pity_threshold(&self) -> u32 {
        self.pity_threshold
    }

    /// Seconds before a slot-selection session expires.
    #[must_use]
    pub const fn session_timeout(&self) -> f64 {
        self.session_timeout
    }

    /// Total number of definitions (enabled or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    /// Checks whether the table has no definitions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Expands an effect's description template with rolled values.
    ///
    /// Unknown ids fall back to the bare key so callers always get text.
    #[must_use]
    pub fn describe(&self, id: &EffectId, value1: f64, value2: i32) -> String {
        match self.effects.get(id) {
            Some(effect) => effect
                .description
                .replace("{1}", &format_magnitude(value1))
                .replace("{2}", &value2.to_string()),
            None => id.to_string(),
        }
    }
}

/// Formats a rolled magnitude for display (one decimal, trimmed).
fn format_magnitude(value: f64) -> String {
    let text = format!("{value:.1}");
    match text.strip_suffix(".0") {
        Some(trimmed) => trimmed.to_string(),
        None => text,
    }
}

/// The effect catalog: a validated table behind an atomically swapped
/// reference.
///
/// Readers take a [`CatalogTable`] snapshot and never observe a
/// half-updated table; reload builds a complete replacement and swaps the
/// reference.
#[derive(Debug)]
pub struct EffectCatalog {
    table: RwLock<Arc<CatalogTable>>,
}

impl EffectCatalog {
    /// Builds a catalog from a config.
    pub fn from_config(config: CatalogConfig) -> CatalogResult<Self> {
        let table = CatalogTable::build(config)?;
        Ok(Self {
            table: RwLock::new(Arc::new(table)),
        })
    }

    /// Builds the catalog with the built-in standard table.
    #[must_use]
    pub fn standard() -> Self {
        Self::from_config(CatalogConfig::standard())
            .expect("built-in standard catalog must validate")
    }

    /// Returns the current table snapshot.
    ///
    /// The snapshot stays internally consistent for as long as the caller
    /// holds it, even across a concurrent reload.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CatalogTable> {
        Arc::clone(&self.table.read())
    }

    /// Replaces the whole table atomically.
    pub fn reload(&self, config: CatalogConfig) -> CatalogResult<()> {
        let effect_count = config.effects.len();
        let table = CatalogTable::build(config)?;
        *self.table.write() = Arc::new(table);
        info!("Reloaded effect catalog: {} effects", effect_count);
        Ok(())
    }

    /// Reloads from a RON file, keeping the old table on failure.
    pub fn reload_from_path(&self, path: &Path) -> CatalogResult<()> {
        match CatalogConfig::load_from_path(path) {
            Ok(config) => self.reload(config),
            Err(e) => {
                warn!("Catalog reload from {:?} failed: {}", path, e);
                Err(e)
            }
        }
    }

    /// Checks whether an effect exists and is enabled.
    #[must_use]
    pub fn is_enabled(&self, id: &EffectId) -> bool {
        self.snapshot().is_enabled(id)
    }

    /// The configured weight of an effect, if it exists.
    #[must_use]
    pub fn weight(&self, id: &EffectId) -> Option<f64> {
        let table = self.snapshot();
        table.get(id).map(|e| table.weight(e))
    }

    /// Expands an effect's description template with rolled values.
    #[must_use]
    pub fn describe(&self, id: &EffectId, value1: f64, value2: i32) -> String {
        self.snapshot().describe(id, value1, value2)
    }
}
