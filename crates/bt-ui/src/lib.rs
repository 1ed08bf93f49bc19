//! # bt-ui
//!
//! Server-rendered pages (askama) and the formatting helpers they share.

pub mod format;
pub mod pages;

pub use pages::*;
