//! Fuzz target for driver operations under injected failures
//!
//! Runs arbitrary operation sequences against a chaotic memory driver and a
//! plain model of the expected install and attach state.
//!
//! # Strategy
//!
//! - Variable failure rates (0% to 90%)
//! - Operations on known, unknown and mismatched accelerators
//! - Attach/detach of repeated and unknown instances
//!
//! # Invariants
//!
//! - Operations NEVER panic
//! - Injected failures leave backend state untouched
//! - Discovery always reports the full inventory
//! - The accelerator list matches the model's installed set
//! - Attached instances never outnumber installed accelerators

#![no_main]

use std::collections::{BTreeMap, BTreeSet};

use accel_driver::{
    AcceleratorDriver, AcceleratorHandle, ChaosError, ChaoticDriver, MemoryDriver, Options,
};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

const INVENTORY: [(&str, &str); 4] =
    [("nvme0", "nvmf"), ("nvme1", "nvmf"), ("vhost0", "vhost"), ("vhost1", "vhost")];

const DRIVER_TYPES: [&str; 3] = ["nvmf", "vhost", "rdma"];

#[derive(Debug, Arbitrary)]
struct Scenario {
    chaos_seed: u64,
    /// Failure rate 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<Op>,
}

#[derive(Debug, Arbitrary)]
enum Op {
    Install { device: u8, driver_type: u8 },
    Uninstall { device: u8, driver_type: u8 },
    Update { driver_type: u8 },
    Attach { instance: u8 },
    Detach { instance: u8 },
    List,
    Discover,
}

/// Expected backend state.
#[derive(Default)]
struct Model {
    installed: BTreeSet<String>,
    /// Instance -> accelerator
    attached: BTreeMap<String, String>,
}

impl Model {
    fn busy(&self, device: &str) -> bool {
        self.attached.values().any(|d| d == device)
    }
}

/// Device ids include one past the inventory (unknown accelerator).
fn device_id(index: u8) -> String {
    match INVENTORY.get(index as usize % (INVENTORY.len() + 1)) {
        Some((id, _)) => (*id).to_string(),
        None => "ghost0".to_string(),
    }
}

fn device_type(id: &str) -> Option<&'static str> {
    INVENTORY.iter().find(|(d, _)| *d == id).map(|(_, t)| *t)
}

fuzz_target!(|scenario: Scenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let inventory = MemoryDriver::with_accelerators(
        INVENTORY.iter().map(|(id, driver_type)| AcceleratorHandle::new(*id, *driver_type)),
    );
    let Ok(driver) = ChaoticDriver::with_seed(inventory, failure_rate, scenario.chaos_seed) else {
        return;
    };

    let mut model = Model::default();

    for op in scenario.operations {
        // (result, whether the model says the operation should succeed)
        let (result, expected_ok) = match op {
            Op::Install { device, driver_type } => {
                let id = device_id(device);
                let driver_type = DRIVER_TYPES[driver_type as usize % DRIVER_TYPES.len()];
                let expected_ok =
                    device_type(&id) == Some(driver_type) && !model.installed.contains(&id);
                let result = driver.install_accelerator(&id, driver_type);
                if result.is_ok() {
                    model.installed.insert(id);
                }
                (result, expected_ok)
            },
            Op::Uninstall { device, driver_type } => {
                let id = device_id(device);
                let driver_type = DRIVER_TYPES[driver_type as usize % DRIVER_TYPES.len()];
                let expected_ok = device_type(&id) == Some(driver_type) && !model.busy(&id);
                let result = driver.uninstall_accelerator(&id, driver_type);
                if result.is_ok() {
                    model.installed.remove(&id);
                }
                (result, expected_ok)
            },
            Op::Update { driver_type } => {
                let driver_type = DRIVER_TYPES[driver_type as usize % DRIVER_TYPES.len()];
                let expected_ok =
                    model.installed.iter().any(|id| device_type(id) == Some(driver_type));
                (driver.update(driver_type, &Options::new().with("touched", true)), expected_ok)
            },
            Op::Attach { instance } => {
                let instance_id = format!("vm-{}", instance % 8);
                let free = model.installed.iter().any(|id| !model.busy(id));
                let expected_ok = !model.attached.contains_key(&instance_id) && free;
                let result = driver.attach_instance(&instance_id).map(|bound| {
                    assert!(!model.busy(&bound.accelerator_id));
                    model.attached.insert(bound.instance_id, bound.accelerator_id);
                });
                (result, expected_ok)
            },
            Op::Detach { instance } => {
                let instance_id = format!("vm-{}", instance % 8);
                let expected = model.attached.get(&instance_id).cloned();
                let expected_ok = expected.is_some();
                let result = driver.detach_instance(&instance_id).map(|released| {
                    assert_eq!(expected.as_deref(), Some(released.accelerator_id.as_str()));
                    model.attached.remove(&instance_id);
                });
                (result, expected_ok)
            },
            Op::List => {
                let result = driver.accelerator_list().map(|listed| {
                    let ids: BTreeSet<String> = listed.into_iter().map(|h| h.id).collect();
                    assert_eq!(ids, model.installed);
                });
                (result, true)
            },
            Op::Discover => {
                let result = driver.discover_accelerator().map(|found| {
                    assert_eq!(found.len(), INVENTORY.len());
                });
                (result, true)
            },
        };

        match result {
            Ok(()) => assert!(expected_ok, "backend accepted an operation the model rejects"),
            // Injected failures short-circuit before the backend runs
            Err(err) if err.backend_error::<ChaosError>().is_some() => {},
            Err(err) => assert!(!expected_ok, "backend rejected a valid operation: {err}"),
        }

        let installed = driver.inner().installed_count().unwrap_or_default();
        let attached = driver.inner().attached_count().unwrap_or_default();
        assert_eq!(installed, model.installed.len());
        assert_eq!(attached, model.attached.len());
        assert!(attached <= installed);
    }
});
