//! Adapters - Concrete implementations of ports.

pub mod memory;

#[cfg(feature = "local")]
pub mod local;

#[cfg(feature = "remote")]
pub mod remote;
