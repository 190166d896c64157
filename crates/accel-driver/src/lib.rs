//! Accelerator driver registry.
//!
//! Resolves a server-type tag to a concrete accelerator management backend
//! and defines the operations every backend provides.
//!
//! # Architecture
//!
//! Backends implement [`AcceleratorDriver`] (discover, install, uninstall,
//! list, update, attach, detach) and announce themselves through
//! [`RegisterDriver`]. A [`DriverRegistryBuilder`] collects them at startup;
//! the frozen [`DriverRegistry`] then constructs drivers by tag with
//! [`DriverRegistry::create`].
//!
//! ```
//! use accel_driver::{DriverRegistry, Options};
//!
//! let registry = DriverRegistry::builtin()?;
//! let args = Options::new().with("accelerators", serde_json::json!(["nvme0", "nvme1"]));
//! let driver = registry.create("memory", &args)?;
//!
//! assert_eq!(driver.discover_accelerator()?.len(), 2);
//! # Ok::<(), accel_driver::DriverError>(())
//! ```
//!
//! # Components
//!
//! - [`DriverRegistry`]: Frozen tag -> factory table
//! - [`AcceleratorDriver`]: Capability contract
//! - [`MemoryDriver`]: In-process backend with full state tracking
//! - [`ChaoticDriver`]: Fault-injecting wrapper for tests

#![forbid(unsafe_code)]

pub mod backends;
mod driver;
mod error;
mod registry;
mod types;

pub use backends::{ChaosError, ChaoticDriver, MemoryDriver, MemoryDriverError};
pub use driver::{AcceleratorDriver, Operation, RegisterDriver};
pub use error::{BackendError, DriverError};
pub use registry::{
    DriverDescriptor, DriverFactory, DriverRegistry, DriverRegistryBuilder, DuplicatePolicy,
    RegistryConfig, global, install_global,
};
pub use types::{AcceleratorHandle, Instance, Options};
