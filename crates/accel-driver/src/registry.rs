//! Driver registry for server-type dispatch.
//!
//! The registry is an append-only table of [`DriverDescriptor`]s, filled in by
//! a [`DriverRegistryBuilder`] during initialization and frozen by
//! [`DriverRegistryBuilder::build`]. Lookups scan the table in registration
//! order and construct the first driver whose tag matches.
//!
//! A frozen [`DriverRegistry`] is never mutated, so it can be shared across
//! threads without locking. [`install_global`] publishes one registry for the
//! whole process.

use std::{fmt, sync::OnceLock};

use crate::{
    backends::{ChaoticDriver, MemoryDriver},
    driver::{AcceleratorDriver, RegisterDriver},
    error::DriverError,
    types::Options,
};

/// Constructs a driver from implementation-specific arguments.
pub type DriverFactory = fn(&Options) -> Result<Box<dyn AcceleratorDriver>, DriverError>;

/// A registry table entry: one concrete driver implementation.
#[derive(Clone, Copy)]
pub struct DriverDescriptor {
    server_type: &'static str,
    description: &'static str,
    factory: DriverFactory,
}

impl DriverDescriptor {
    /// Descriptor with an explicit factory function.
    pub const fn new(
        server_type: &'static str,
        description: &'static str,
        factory: DriverFactory,
    ) -> Self {
        Self { server_type, description, factory }
    }

    /// Descriptor for a [`RegisterDriver`] type.
    pub fn of<D: RegisterDriver>() -> Self {
        Self::new(D::SERVER_TYPE, D::DESCRIPTION, construct::<D>)
    }

    /// Tag this driver is looked up by.
    pub fn server_type(&self) -> &'static str {
        self.server_type
    }

    /// Human-readable description.
    pub fn description(&self) -> &'static str {
        self.description
    }

    /// Run the factory.
    pub fn construct(&self, args: &Options) -> Result<Box<dyn AcceleratorDriver>, DriverError> {
        (self.factory)(args)
    }
}

impl fmt::Debug for DriverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverDescriptor")
            .field("server_type", &self.server_type)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

fn construct<D: RegisterDriver>(args: &Options) -> Result<Box<dyn AcceleratorDriver>, DriverError> {
    Ok(Box::new(D::from_args(args)?))
}

/// What to do when a server type is registered twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// Keep both entries; lookups resolve to the first one registered.
    #[default]
    FirstWins,
    /// Reject the second registration with
    /// [`DriverError::DuplicateServerType`].
    Reject,
}

/// Registry configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryConfig {
    /// Duplicate tag handling
    pub duplicate_policy: DuplicatePolicy,
}

/// Mutable registration phase of a [`DriverRegistry`].
#[derive(Debug, Default)]
pub struct DriverRegistryBuilder {
    config: RegistryConfig,
    entries: Vec<DriverDescriptor>,
}

impl DriverRegistryBuilder {
    /// Empty builder with the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty builder with an explicit configuration.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self { config, entries: Vec::new() }
    }

    /// Append a descriptor to the table.
    ///
    /// Under [`DuplicatePolicy::Reject`] a tag that is already present fails
    /// and the table is left unchanged. Under [`DuplicatePolicy::FirstWins`]
    /// the entry is appended but shadowed by the earlier one.
    pub fn register(&mut self, descriptor: DriverDescriptor) -> Result<&mut Self, DriverError> {
        let server_type = descriptor.server_type();

        if self.contains(server_type) {
            match self.config.duplicate_policy {
                DuplicatePolicy::Reject => {
                    return Err(DriverError::DuplicateServerType(server_type.to_string()));
                },
                DuplicatePolicy::FirstWins => {
                    tracing::warn!(
                        server_type,
                        "driver registered twice; lookups keep resolving to the first"
                    );
                },
            }
        }

        tracing::trace!(server_type, "registered driver");
        self.entries.push(descriptor);
        Ok(self)
    }

    /// Append the descriptor of a [`RegisterDriver`] type.
    pub fn register_driver<D: RegisterDriver>(&mut self) -> Result<&mut Self, DriverError> {
        self.register(DriverDescriptor::of::<D>())
    }

    /// Whether a tag is already registered.
    pub fn contains(&self, server_type: &str) -> bool {
        self.entries.iter().any(|d| d.server_type() == server_type)
    }

    /// Freeze the table.
    pub fn build(self) -> DriverRegistry {
        DriverRegistry { entries: self.entries }
    }
}

/// Frozen table of driver implementations, keyed by server type.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    /// Descriptors in registration order, shadowed duplicates included
    entries: Vec<DriverDescriptor>,
}

impl DriverRegistry {
    /// Start a registration phase with the default configuration.
    pub fn builder() -> DriverRegistryBuilder {
        DriverRegistryBuilder::new()
    }

    /// Registry holding the drivers shipped with this crate.
    pub fn builtin() -> Result<Self, DriverError> {
        let mut builder = DriverRegistryBuilder::with_config(RegistryConfig {
            duplicate_policy: DuplicatePolicy::Reject,
        });
        builder
            .register_driver::<MemoryDriver>()?
            .register_driver::<ChaoticDriver<MemoryDriver>>()?;
        Ok(builder.build())
    }

    /// Construct the driver registered under `server_type`.
    ///
    /// `args` go to the driver's factory unexamined. Factory errors are
    /// returned unchanged.
    pub fn create(
        &self,
        server_type: &str,
        args: &Options,
    ) -> Result<Box<dyn AcceleratorDriver>, DriverError> {
        let descriptor = self.descriptor(server_type).ok_or_else(|| {
            tracing::debug!(server_type, "no driver registered");
            DriverError::DriverNotFound { server_type: server_type.to_string() }
        })?;

        let driver = descriptor.construct(args)?;
        tracing::debug!(server_type, args = args.len(), "constructed driver");
        Ok(driver)
    }

    /// Descriptor a lookup of `server_type` resolves to.
    pub fn descriptor(&self, server_type: &str) -> Option<&DriverDescriptor> {
        self.entries.iter().find(|d| d.server_type() == server_type)
    }

    /// Whether `server_type` resolves to a driver.
    pub fn contains(&self, server_type: &str) -> bool {
        self.descriptor(server_type).is_some()
    }

    /// Distinct registered tags, in registration order.
    pub fn server_types(&self) -> Vec<&'static str> {
        let mut tags: Vec<&'static str> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            if !tags.contains(&entry.server_type()) {
                tags.push(entry.server_type());
            }
        }
        tags
    }

    /// Every table entry in registration order, shadowed duplicates included.
    pub fn descriptors(&self) -> &[DriverDescriptor] {
        &self.entries
    }

    /// Number of table entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no driver is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static GLOBAL_REGISTRY: OnceLock<DriverRegistry> = OnceLock::new();

/// Publish `registry` as the process-wide registry.
///
/// Succeeds once. Later calls fail with
/// [`DriverError::GlobalAlreadyInstalled`] and leave the first registry in
/// place.
pub fn install_global(registry: DriverRegistry) -> Result<&'static DriverRegistry, DriverError> {
    GLOBAL_REGISTRY.set(registry).map_err(|_| DriverError::GlobalAlreadyInstalled)?;
    GLOBAL_REGISTRY.get().ok_or(DriverError::GlobalAlreadyInstalled)
}

/// The process-wide registry, if one was installed.
pub fn global() -> Option<&'static DriverRegistry> {
    GLOBAL_REGISTRY.get()
}
