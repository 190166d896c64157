//! Chaotic driver wrapper for fault injection testing
//!
//! Driver wrapper that randomly fails operations to check that callers
//! propagate backend failures instead of swallowing them.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use thiserror::Error;

use super::MemoryDriver;
use crate::{
    driver::{AcceleratorDriver, Operation, RegisterDriver},
    error::DriverError,
    types::{AcceleratorHandle, Instance, Options},
};

/// Tag the registry factory is registered under.
const CHAOTIC_SERVER_TYPE: &str = "chaotic";

/// Seed used when the caller does not pick one.
const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;

/// Failure rate used by the registry factory when none is given.
const DEFAULT_FAILURE_RATE: f64 = 0.1;

/// Failure injected by [`ChaoticDriver`].
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("chaotic failure injected into {operation}")]
pub struct ChaosError {
    /// Operation that was failed
    pub operation: Operation,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator, so runs are reproducible from the seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next_f64(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

/// Driver wrapper that randomly injects failures.
///
/// Delegates to `inner` but fails each operation with probability
/// `failure_rate`. Failures surface as [`DriverError::Backend`] holding a
/// [`ChaosError`]. Errors from `inner` are returned unchanged.
pub struct ChaoticDriver<D> {
    inner: D,
    server_type: String,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: AtomicUsize,
}

impl<D: AcceleratorDriver> ChaoticDriver<D> {
    /// Wrap `inner` with the default seed.
    pub fn new(inner: D, failure_rate: f64) -> Result<Self, DriverError> {
        Self::with_seed(inner, failure_rate, DEFAULT_SEED)
    }

    /// Wrap `inner` with an explicit seed for reproducible chaos.
    ///
    /// `failure_rate` must be within `[0.0, 1.0]`.
    pub fn with_seed(inner: D, failure_rate: f64, seed: u64) -> Result<Self, DriverError> {
        if !(0.0..=1.0).contains(&failure_rate) {
            return Err(DriverError::invalid_argument(
                "failure_rate",
                format!("must be between 0.0 and 1.0, got {failure_rate}"),
            ));
        }

        Ok(Self {
            inner,
            server_type: CHAOTIC_SERVER_TYPE.to_string(),
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: AtomicUsize::new(0),
        })
    }

    /// Wrapped driver (for checking state after chaos).
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Total number of operations attempted, failed ones included.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Count the operation and decide whether it fails.
    fn roll(&self, operation: Operation) -> Result<(), DriverError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        // RNG state stays usable after a panic elsewhere
        let sample = self.rng.lock().unwrap_or_else(PoisonError::into_inner).next_f64();

        if sample < self.failure_rate {
            tracing::warn!(%operation, "injecting chaotic failure");
            return Err(DriverError::backend(ChaosError { operation }));
        }
        Ok(())
    }
}

impl RegisterDriver for ChaoticDriver<MemoryDriver> {
    const SERVER_TYPE: &'static str = CHAOTIC_SERVER_TYPE;
    const DESCRIPTION: &'static str = "Memory driver with seeded random failure injection";

    /// `failure_rate` and `seed` configure the chaos; every other argument
    /// goes to the wrapped [`MemoryDriver`].
    fn from_args(args: &Options) -> Result<Self, DriverError> {
        let failure_rate = args.get_f64("failure_rate")?.unwrap_or(DEFAULT_FAILURE_RATE);
        let seed = args.get_u64("seed")?.unwrap_or(DEFAULT_SEED);

        let mut rest = args.clone();
        rest.remove("failure_rate");
        rest.remove("seed");

        Self::with_seed(MemoryDriver::from_args(&rest)?, failure_rate, seed)
    }
}

impl<D: AcceleratorDriver> AcceleratorDriver for ChaoticDriver<D> {
    fn server_type(&self) -> &str {
        &self.server_type
    }

    fn discover_accelerator(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        self.roll(Operation::DiscoverAccelerator)?;
        self.inner.discover_accelerator()
    }

    fn install_accelerator(&self, driver_id: &str, driver_type: &str) -> Result<(), DriverError> {
        self.roll(Operation::InstallAccelerator)?;
        self.inner.install_accelerator(driver_id, driver_type)
    }

    fn uninstall_accelerator(
        &self,
        driver_id: &str,
        driver_type: &str,
    ) -> Result<(), DriverError> {
        self.roll(Operation::UninstallAccelerator)?;
        self.inner.uninstall_accelerator(driver_id, driver_type)
    }

    fn accelerator_list(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        self.roll(Operation::AcceleratorList)?;
        self.inner.accelerator_list()
    }

    fn update(&self, driver_type: &str, options: &Options) -> Result<(), DriverError> {
        self.roll(Operation::Update)?;
        self.inner.update(driver_type, options)
    }

    fn attach_instance(&self, instance_id: &str) -> Result<Instance, DriverError> {
        self.roll(Operation::AttachInstance)?;
        self.inner.attach_instance(instance_id)
    }

    fn detach_instance(&self, instance_id: &str) -> Result<Instance, DriverError> {
        self.roll(Operation::DetachInstance)?;
        self.inner.detach_instance(instance_id)
    }
}
