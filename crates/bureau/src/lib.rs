//! Umbrella crate for Bureau.
//!
//! This crate is intentionally small: it re-exports the engine and protocol crates
//! so downstream code can depend on a single crate name (`bureau`).

pub use bureau_engine as engine;
pub use bureau_protocol as protocol;
