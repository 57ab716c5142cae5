//! # Board Group Manager Common Library
//!
//! Shared code for the board group manager crates including:
//! - Item and group identifier types
//! - Group event types (GroupEvent enum)
//! - Configuration loading
//! - Logging bootstrap

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod logging;

pub use error::{Error, Result};
pub use ids::{GroupId, ItemId, Position};
