//! Ports - Trait definitions implemented by adapters.

use std::error::Error;

pub mod capabilities;
pub mod index;
pub mod queue;
pub mod repository;

/// Error type of the infrastructure ports (queue, storage).
pub type BoxError = Box<dyn Error + Send + Sync>;
