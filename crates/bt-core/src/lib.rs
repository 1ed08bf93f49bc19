//! bt-core/src/lib.rs
//!
//! The central domain logic and interface definitions for Basket Talk.

pub mod community;
pub mod counters;
pub mod error;
pub mod feed;
pub mod join;
pub mod likes;
pub mod models;
pub mod moderation;
pub mod schedule;
pub mod teams;
pub mod traits;
pub mod validation;
pub mod views;

// Re-exporting for easier access in other crates
pub use community::{Community, FeedLimits};
pub use error::*;
pub use models::*;
pub use traits::*;
