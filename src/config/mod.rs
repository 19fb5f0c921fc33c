//! Configuration constants for frame sizing, metadata, and cache lifetime.

mod constants;

pub use constants::*;
