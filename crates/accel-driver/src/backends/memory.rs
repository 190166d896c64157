//! In-memory accelerator backend.
//!
//! Keeps a seeded device inventory plus install and attach state behind a
//! mutex. Discovery reports the whole inventory; the accelerator list reports
//! installed devices only.

#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};

use serde_json::Value;
use thiserror::Error;

use crate::{
    driver::{AcceleratorDriver, RegisterDriver},
    error::DriverError,
    types::{AcceleratorHandle, Instance, Options},
};

/// Driver type assumed when an inventory entry does not name one.
const DEFAULT_DRIVER_TYPE: &str = "nvmf";

/// Errors produced by [`MemoryDriver`].
///
/// Surfaced to callers as [`DriverError::Backend`]; use
/// [`DriverError::backend_error`] to get them back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryDriverError {
    /// No accelerator with this id in the inventory
    #[error("unknown accelerator {0}")]
    UnknownAccelerator(String),

    /// The accelerator exists but belongs to another driver type
    #[error("accelerator {id} is driven by {actual}, not {requested}")]
    DriverTypeMismatch {
        /// Accelerator id
        id: String,
        /// Driver type the accelerator has
        actual: String,
        /// Driver type the caller asked for
        requested: String,
    },

    /// Install called on an installed accelerator
    #[error("accelerator {0} is already installed")]
    AlreadyInstalled(String),

    /// Uninstall called while an instance is still attached
    #[error("accelerator {id} is in use by instance {instance_id}")]
    InUse {
        /// Accelerator id
        id: String,
        /// Attached instance
        instance_id: String,
    },

    /// Update found no installed accelerator of the driver type
    #[error("no installed accelerator of type {0}")]
    NoAcceleratorOfType(String),

    /// Attach called for an instance that is already attached
    #[error("instance {instance_id} is already attached to {accelerator_id}")]
    AlreadyAttached {
        /// Instance id
        instance_id: String,
        /// Accelerator it is bound to
        accelerator_id: String,
    },

    /// Every installed accelerator is taken
    #[error("no free accelerator to attach {0}")]
    NoFreeAccelerator(String),

    /// Detach called for an instance that is not attached
    #[error("instance {0} is not attached")]
    NotAttached(String),

    /// A thread panicked while holding the state lock
    #[error("memory driver state lock poisoned")]
    Poisoned,
}

impl From<MemoryDriverError> for DriverError {
    fn from(err: MemoryDriverError) -> Self {
        DriverError::backend(err)
    }
}

/// Per-device state.
#[derive(Debug, Clone)]
struct Device {
    handle: AcceleratorHandle,
    installed: bool,
    /// Instance currently bound to this device
    instance: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryDriverInner {
    /// Accelerator id -> device, ordered by id
    devices: BTreeMap<String, Device>,
    /// Instance id -> accelerator id
    attachments: HashMap<String, String>,
}

/// In-memory accelerator backend, registered as `"memory"`.
///
/// Clones share the same state. Each accelerator hosts at most one instance.
#[derive(Debug, Clone, Default)]
pub struct MemoryDriver {
    inner: Arc<Mutex<MemoryDriverInner>>,
}

impl MemoryDriver {
    /// Backend with an empty inventory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend with `accelerators` visible but not installed.
    ///
    /// Later entries replace earlier ones with the same id.
    pub fn with_accelerators(accelerators: impl IntoIterator<Item = AcceleratorHandle>) -> Self {
        let devices = accelerators
            .into_iter()
            .map(|handle| {
                (handle.id.clone(), Device { handle, installed: false, instance: None })
            })
            .collect();

        Self {
            inner: Arc::new(Mutex::new(MemoryDriverInner { devices, attachments: HashMap::new() })),
        }
    }

    /// Number of installed accelerators.
    pub fn installed_count(&self) -> Result<usize, DriverError> {
        Ok(self.lock()?.devices.values().filter(|d| d.installed).count())
    }

    /// Number of attached instances.
    pub fn attached_count(&self) -> Result<usize, DriverError> {
        Ok(self.lock()?.attachments.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryDriverInner>, MemoryDriverError> {
        self.inner.lock().map_err(|_| MemoryDriverError::Poisoned)
    }

    /// Parse one `accelerators` entry: an id string or an object.
    fn parse_entry(
        entry: &Value,
        default_type: &str,
    ) -> Result<(AcceleratorHandle, bool), DriverError> {
        match entry {
            Value::String(id) => Ok((AcceleratorHandle::new(id.as_str(), default_type), false)),
            Value::Object(fields) => {
                let mut attributes: Options =
                    fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect();

                let id = match attributes.remove("id") {
                    Some(Value::String(id)) => id,
                    _ => {
                        return Err(DriverError::invalid_argument(
                            "accelerators",
                            "every entry needs a string \"id\"",
                        ));
                    },
                };
                let driver_type = match attributes.remove("driver_type") {
                    None => default_type.to_string(),
                    Some(Value::String(t)) => t,
                    Some(other) => {
                        return Err(DriverError::invalid_argument(
                            "accelerators",
                            format!("driver_type of {id} must be a string, got {other}"),
                        ));
                    },
                };
                let installed = match attributes.remove("installed") {
                    None => false,
                    Some(Value::Bool(b)) => b,
                    Some(other) => {
                        return Err(DriverError::invalid_argument(
                            "accelerators",
                            format!("installed of {id} must be a bool, got {other}"),
                        ));
                    },
                };

                Ok((AcceleratorHandle { id, driver_type, attributes }, installed))
            },
            other => Err(DriverError::invalid_argument(
                "accelerators",
                format!("expected id string or object, got {other}"),
            )),
        }
    }
}

impl RegisterDriver for MemoryDriver {
    const SERVER_TYPE: &'static str = "memory";
    const DESCRIPTION: &'static str = "In-process accelerator inventory for development and tests";

    /// Recognized arguments:
    ///
    /// - `accelerators`: array of id strings or `{ "id", "driver_type",
    ///   "installed", ...attributes }` objects
    /// - `default_driver_type`: driver type for entries that omit one
    fn from_args(args: &Options) -> Result<Self, DriverError> {
        let default_type = args.get_str("default_driver_type")?.unwrap_or(DEFAULT_DRIVER_TYPE);

        let entries = match args.get("accelerators") {
            None => return Ok(Self::new()),
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                return Err(DriverError::invalid_argument(
                    "accelerators",
                    format!("expected array, got {other}"),
                ));
            },
        };

        let mut devices = BTreeMap::new();
        for entry in entries {
            let (handle, installed) = Self::parse_entry(entry, default_type)?;
            let id = handle.id.clone();
            let device = Device { handle, installed, instance: None };
            if devices.insert(id.clone(), device).is_some() {
                return Err(DriverError::invalid_argument(
                    "accelerators",
                    format!("duplicate accelerator id {id}"),
                ));
            }
        }

        tracing::debug!(accelerators = devices.len(), "seeded memory driver");
        Ok(Self {
            inner: Arc::new(Mutex::new(MemoryDriverInner { devices, attachments: HashMap::new() })),
        })
    }
}

impl AcceleratorDriver for MemoryDriver {
    fn server_type(&self) -> &str {
        Self::SERVER_TYPE
    }

    fn discover_accelerator(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        let inner = self.lock()?;
        Ok(inner.devices.values().map(|d| d.handle.clone()).collect())
    }

    fn install_accelerator(&self, driver_id: &str, driver_type: &str) -> Result<(), DriverError> {
        let mut inner = self.lock()?;
        let device = inner
            .devices
            .get_mut(driver_id)
            .ok_or_else(|| MemoryDriverError::UnknownAccelerator(driver_id.to_string()))?;

        check_type(device, driver_type)?;
        if device.installed {
            return Err(MemoryDriverError::AlreadyInstalled(driver_id.to_string()).into());
        }

        device.installed = true;
        tracing::info!(driver_id, driver_type, "installed accelerator");
        Ok(())
    }

    fn uninstall_accelerator(
        &self,
        driver_id: &str,
        driver_type: &str,
    ) -> Result<(), DriverError> {
        let mut inner = self.lock()?;
        let device = inner
            .devices
            .get_mut(driver_id)
            .ok_or_else(|| MemoryDriverError::UnknownAccelerator(driver_id.to_string()))?;

        check_type(device, driver_type)?;
        if let Some(instance_id) = &device.instance {
            return Err(MemoryDriverError::InUse {
                id: driver_id.to_string(),
                instance_id: instance_id.clone(),
            }
            .into());
        }

        if device.installed {
            device.installed = false;
            tracing::info!(driver_id, driver_type, "uninstalled accelerator");
        } else {
            tracing::debug!(driver_id, "uninstall of accelerator that is not installed");
        }
        Ok(())
    }

    fn accelerator_list(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        let inner = self.lock()?;
        Ok(inner.devices.values().filter(|d| d.installed).map(|d| d.handle.clone()).collect())
    }

    fn update(&self, driver_type: &str, options: &Options) -> Result<(), DriverError> {
        let mut inner = self.lock()?;

        let mut updated = 0usize;
        for device in inner.devices.values_mut() {
            if device.installed && device.handle.driver_type == driver_type {
                device.handle.attributes.merge(options);
                updated += 1;
            }
        }

        if updated == 0 {
            return Err(MemoryDriverError::NoAcceleratorOfType(driver_type.to_string()).into());
        }

        tracing::info!(driver_type, updated, options = options.len(), "updated accelerators");
        Ok(())
    }

    fn attach_instance(&self, instance_id: &str) -> Result<Instance, DriverError> {
        let mut inner = self.lock()?;

        if let Some(accelerator_id) = inner.attachments.get(instance_id) {
            return Err(MemoryDriverError::AlreadyAttached {
                instance_id: instance_id.to_string(),
                accelerator_id: accelerator_id.clone(),
            }
            .into());
        }

        let device = inner
            .devices
            .values_mut()
            .find(|d| d.installed && d.instance.is_none())
            .ok_or_else(|| MemoryDriverError::NoFreeAccelerator(instance_id.to_string()))?;

        device.instance = Some(instance_id.to_string());
        let accelerator_id = device.handle.id.clone();
        inner.attachments.insert(instance_id.to_string(), accelerator_id.clone());

        tracing::info!(instance_id, %accelerator_id, "attached instance");
        Ok(Instance { instance_id: instance_id.to_string(), accelerator_id })
    }

    fn detach_instance(&self, instance_id: &str) -> Result<Instance, DriverError> {
        let mut inner = self.lock()?;

        let accelerator_id = inner
            .attachments
            .remove(instance_id)
            .ok_or_else(|| MemoryDriverError::NotAttached(instance_id.to_string()))?;

        if let Some(device) = inner.devices.get_mut(&accelerator_id) {
            device.instance = None;
        }

        tracing::info!(instance_id, %accelerator_id, "detached instance");
        Ok(Instance { instance_id: instance_id.to_string(), accelerator_id })
    }
}

fn check_type(device: &Device, requested: &str) -> Result<(), MemoryDriverError> {
    if device.handle.driver_type == requested {
        Ok(())
    } else {
        Err(MemoryDriverError::DriverTypeMismatch {
            id: device.handle.id.clone(),
            actual: device.handle.driver_type.clone(),
            requested: requested.to_string(),
        })
    }
}
