//! # Arcanum Engine
//!
//! The augment engine for Project Arcanum: actors consume a single-use
//! augment token to roll a weighted-random bonus effect into one of an
//! item's persistent slots, and gameplay actions resolve the rolled
//! effects across equipped items.
//!
//! This crate provides:
//! - Effect catalog with rarity weights and atomic reload
//! - Weighted rolling with a per-actor pity ceiling
//! - Persistent slot storage over the host's opaque item blobs
//! - Slot-selection sessions for overwriting full items
//! - The apply flow (validate, roll, write, consume exactly once)
//! - Event-driven effect resolution across gameplay action categories
//! - Engine event bus for host-side observation
//!
//! The host owns items, tokens, currency, notifications, and rendering;
//! the engine reaches them only through the collaborator traits.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod catalog;
pub mod codec;
pub mod dispatch;
pub mod events;
pub mod formula;
pub mod roller;
pub mod runtime;
pub mod service;
pub mod session;
pub mod slots;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::catalog::*;
    pub use crate::codec::*;
    pub use crate::dispatch::*;
    pub use crate::events::*;
    pub use crate::formula::*;
    pub use crate::roller::*;
    pub use crate::runtime::*;
    pub use crate::service::*;
    pub use crate::session::*;
    pub use crate::slots::*;
}

pub use prelude::*;
