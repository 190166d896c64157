//! Accelerator driver capability contract.
//!
//! Every management backend (an SPDK-compatible application server, the
//! in-process memory backend, ...) implements [`AcceleratorDriver`]. The trait
//! has no default bodies: a backend either supplies an operation or says
//! explicitly that it does not support it by returning
//! [`DriverError::NotImplemented`].
//!
//! # Invariants
//!
//! - `discover_accelerator` never mutates accelerator state
//! - `accelerator_list` reports known state, it does not probe
//! - Backend errors are returned as-is; the contract does not retry

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::DriverError,
    types::{AcceleratorHandle, Instance, Options},
};

/// The capability operations of the driver contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// [`AcceleratorDriver::discover_accelerator`]
    DiscoverAccelerator,
    /// [`AcceleratorDriver::install_accelerator`]
    InstallAccelerator,
    /// [`AcceleratorDriver::uninstall_accelerator`]
    UninstallAccelerator,
    /// [`AcceleratorDriver::accelerator_list`]
    AcceleratorList,
    /// [`AcceleratorDriver::update`]
    Update,
    /// [`AcceleratorDriver::attach_instance`]
    AttachInstance,
    /// [`AcceleratorDriver::detach_instance`]
    DetachInstance,
}

impl Operation {
    /// All operations, in contract order.
    pub const ALL: [Operation; 7] = [
        Operation::DiscoverAccelerator,
        Operation::InstallAccelerator,
        Operation::UninstallAccelerator,
        Operation::AcceleratorList,
        Operation::Update,
        Operation::AttachInstance,
        Operation::DetachInstance,
    ];

    /// Snake-case operation name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DiscoverAccelerator => "discover_accelerator",
            Self::InstallAccelerator => "install_accelerator",
            Self::UninstallAccelerator => "uninstall_accelerator",
            Self::AcceleratorList => "accelerator_list",
            Self::Update => "update",
            Self::AttachInstance => "attach_instance",
            Self::DetachInstance => "detach_instance",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Accelerator management operations a backend must provide.
///
/// Must be `Send + Sync` so a constructed driver can be shared between
/// threads. Methods take `&self`; backends with mutable state use interior
/// locking. All methods are synchronous and may block on backend I/O.
pub trait AcceleratorDriver: Send + Sync {
    /// Server type this driver was registered under.
    fn server_type(&self) -> &str;

    /// Enumerate accelerators visible to this backend.
    ///
    /// Probes the backend. Must not change accelerator state.
    fn discover_accelerator(&self) -> Result<Vec<AcceleratorHandle>, DriverError>;

    /// Provision a driver of `driver_type` for accelerator `driver_id`.
    ///
    /// Fails if the id/type combination is invalid or the resource is
    /// unavailable.
    fn install_accelerator(&self, driver_id: &str, driver_type: &str) -> Result<(), DriverError>;

    /// Reverse of [`AcceleratorDriver::install_accelerator`].
    ///
    /// Whether uninstalling something that is not installed succeeds is up to
    /// the backend.
    fn uninstall_accelerator(&self, driver_id: &str, driver_type: &str)
    -> Result<(), DriverError>;

    /// Currently known accelerators.
    ///
    /// Returns cached state; unlike discovery this does not probe.
    fn accelerator_list(&self) -> Result<Vec<AcceleratorHandle>, DriverError>;

    /// Apply `options` to every accelerator of `driver_type`.
    fn update(&self, driver_type: &str, options: &Options) -> Result<(), DriverError>;

    /// Bind an instance to an accelerator.
    fn attach_instance(&self, instance_id: &str) -> Result<Instance, DriverError>;

    /// Unbind a previously attached instance.
    fn detach_instance(&self, instance_id: &str) -> Result<Instance, DriverError>;
}

impl<D: AcceleratorDriver + ?Sized> AcceleratorDriver for Box<D> {
    fn server_type(&self) -> &str {
        (**self).server_type()
    }

    fn discover_accelerator(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        (**self).discover_accelerator()
    }

    fn install_accelerator(&self, driver_id: &str, driver_type: &str) -> Result<(), DriverError> {
        (**self).install_accelerator(driver_id, driver_type)
    }

    fn uninstall_accelerator(
        &self,
        driver_id: &str,
        driver_type: &str,
    ) -> Result<(), DriverError> {
        (**self).uninstall_accelerator(driver_id, driver_type)
    }

    fn accelerator_list(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        (**self).accelerator_list()
    }

    fn update(&self, driver_type: &str, options: &Options) -> Result<(), DriverError> {
        (**self).update(driver_type, options)
    }

    fn attach_instance(&self, instance_id: &str) -> Result<Instance, DriverError> {
        (**self).attach_instance(instance_id)
    }

    fn detach_instance(&self, instance_id: &str) -> Result<Instance, DriverError> {
        (**self).detach_instance(instance_id)
    }
}

/// A driver type that can register itself with a
/// [`DriverRegistry`](crate::DriverRegistry).
///
/// Turned into a table entry by
/// [`DriverDescriptor::of`](crate::DriverDescriptor::of).
pub trait RegisterDriver: AcceleratorDriver + Sized + 'static {
    /// Tag this driver is looked up by.
    const SERVER_TYPE: &'static str;

    /// One-line description for listings.
    const DESCRIPTION: &'static str = "";

    /// Construct the driver from implementation-specific arguments.
    ///
    /// The registry hands `args` over without looking at them.
    fn from_args(args: &Options) -> Result<Self, DriverError>;
}
