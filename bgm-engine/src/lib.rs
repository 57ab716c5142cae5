//! # Board Group Engine
//!
//! Keeps named groups of contiguous storyboard panels consistent while the
//! host reorders, inserts and deletes panels behind its back.
//!
//! Components, leaves first:
//! - [`identity`]: stable identifier ↔ current position index
//! - [`store`]: group records keyed by id
//! - [`reconcile`]: drift repair after every sequence mutation
//! - [`classify`]: join/leave decisions for drag-to-reorder moves
//! - [`snapshot`]: flat serialization of the group store
//!
//! [`GroupEngine`] ties them together and is what hosts normally hold.

pub mod classify;
pub mod engine;
pub mod error;
pub mod group;
pub mod identity;
pub mod reconcile;
pub mod snapshot;
pub mod store;

pub use bgm_common::{GroupId, ItemId, Position};
pub use classify::{GroupEdge, MoveAction, MoveClassifier};
pub use engine::GroupEngine;
pub use error::{Error, Result};
pub use group::{Group, GroupPayload};
pub use identity::{IdentityHost, IdentityIndex, SequenceEntry, SequenceSnapshot};
pub use reconcile::{GroupSpan, ReconcileReport};
pub use store::GroupStore;
