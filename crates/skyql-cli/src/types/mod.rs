//! Shared front-end types.

pub mod error;

pub use error::*;
