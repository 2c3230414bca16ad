//! Core domain + interaction logic for artbot.
//!
//! This crate is framework-agnostic. The chat platform and artwork sites live
//! behind ports (traits) implemented in adapter crates.

pub mod artwork;
pub mod config;
pub mod crosspost;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod interaction;
pub mod logging;
pub mod messaging;
pub mod post_cache;
pub mod repost;
pub mod settings;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{Error, Result};
