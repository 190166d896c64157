//! Drivers shipped with the crate.
//!
//! Real management backends (SPDK application servers and the like) live
//! outside this crate and plug in through
//! [`RegisterDriver`](crate::RegisterDriver). The drivers here are for
//! development and testing:
//!
//! - [`MemoryDriver`]: in-process inventory with full state tracking
//! - [`ChaoticDriver`]: wraps another driver and injects failures

mod chaotic;
mod memory;

pub use chaotic::{ChaosError, ChaoticDriver};
pub use memory::{MemoryDriver, MemoryDriverError};
