//! Integration tests for driver resolution and dispatch.
//!
//! Drives the registry the way a management service would: register drivers
//! at startup, freeze, then create drivers by server type and call the
//! capability operations on them.

use accel_driver::{
    AcceleratorDriver, AcceleratorHandle, ChaosError, ChaoticDriver, DriverError, DriverRegistry,
    DriverRegistryBuilder, DuplicatePolicy, Instance, MemoryDriverError, Operation, Options,
    RegisterDriver, RegistryConfig,
};
use serde_json::json;

/// Backend that only knows how to discover a fixed inventory.
struct FakeDriver;

impl FakeDriver {
    fn unsupported(operation: Operation) -> DriverError {
        DriverError::not_implemented(Self::SERVER_TYPE, operation)
    }
}

impl RegisterDriver for FakeDriver {
    const SERVER_TYPE: &'static str = "fake";
    const DESCRIPTION: &'static str = "Fixed two-device inventory";

    fn from_args(_: &Options) -> Result<Self, DriverError> {
        Ok(Self)
    }
}

impl AcceleratorDriver for FakeDriver {
    fn server_type(&self) -> &str {
        Self::SERVER_TYPE
    }

    fn discover_accelerator(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        Ok(vec![AcceleratorHandle::new("A1", "nvmf"), AcceleratorHandle::new("A2", "nvmf")])
    }

    fn install_accelerator(&self, _: &str, _: &str) -> Result<(), DriverError> {
        Err(Self::unsupported(Operation::InstallAccelerator))
    }

    fn uninstall_accelerator(&self, _: &str, _: &str) -> Result<(), DriverError> {
        Err(Self::unsupported(Operation::UninstallAccelerator))
    }

    fn accelerator_list(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        Err(Self::unsupported(Operation::AcceleratorList))
    }

    fn update(&self, _: &str, _: &Options) -> Result<(), DriverError> {
        Err(Self::unsupported(Operation::Update))
    }

    fn attach_instance(&self, _: &str) -> Result<Instance, DriverError> {
        Err(Self::unsupported(Operation::AttachInstance))
    }

    fn detach_instance(&self, _: &str) -> Result<Instance, DriverError> {
        Err(Self::unsupported(Operation::DetachInstance))
    }
}

fn fake_registry() -> DriverRegistry {
    let mut builder = DriverRegistry::builder();
    builder.register_driver::<FakeDriver>().unwrap();
    builder.build()
}

#[test]
fn fake_driver_end_to_end() {
    let registry = fake_registry();

    let driver = registry.create("fake", &Options::new()).unwrap();
    let ids: Vec<String> =
        driver.discover_accelerator().unwrap().into_iter().map(|h| h.id).collect();
    assert_eq!(ids, vec!["A1", "A2"]);

    let result = registry.create("other", &Options::new());
    assert!(matches!(
        result,
        Err(DriverError::DriverNotFound { ref server_type }) if server_type == "other"
    ));
}

#[test]
fn unsupported_operations_fail_loudly() {
    let registry = fake_registry();
    let driver = registry.create("fake", &Options::new()).unwrap();

    let results = [
        (Operation::InstallAccelerator, driver.install_accelerator("A1", "nvmf").err()),
        (Operation::UninstallAccelerator, driver.uninstall_accelerator("A1", "nvmf").err()),
        (Operation::AcceleratorList, driver.accelerator_list().err()),
        (Operation::Update, driver.update("nvmf", &Options::new()).err()),
        (Operation::AttachInstance, driver.attach_instance("vm").err()),
        (Operation::DetachInstance, driver.detach_instance("vm").err()),
    ];

    for (expected, err) in results {
        match err {
            Some(DriverError::NotImplemented { server_type, operation }) => {
                assert_eq!(server_type, "fake");
                assert_eq!(operation, expected);
            },
            other => panic!("{expected} returned {other:?}"),
        }
    }
}

#[test]
fn chaos_wrapper_preserves_not_implemented() {
    let created = fake_registry().create("fake", &Options::new()).unwrap();
    let driver = ChaoticDriver::new(created, 0.0).unwrap();

    let err = driver.attach_instance("vm").unwrap_err();
    assert!(matches!(
        err,
        DriverError::NotImplemented { operation: Operation::AttachInstance, .. }
    ));
    assert_eq!(driver.discover_accelerator().unwrap().len(), 2);
}

#[test]
fn created_driver_reports_its_server_type() {
    let mut builder = DriverRegistryBuilder::with_config(RegistryConfig {
        duplicate_policy: DuplicatePolicy::Reject,
    });
    builder
        .register_driver::<FakeDriver>()
        .unwrap()
        .register_driver::<accel_driver::MemoryDriver>()
        .unwrap();
    let registry = builder.build();

    for tag in registry.server_types() {
        let driver = registry.create(tag, &Options::new()).unwrap();
        assert_eq!(driver.server_type(), tag);
    }
}

#[test]
fn memory_lifecycle_through_registry() {
    let registry = DriverRegistry::builtin().unwrap();
    let args = Options::new().with(
        "accelerators",
        json!([
            { "id": "nvme0", "driver_type": "nvmf" },
            { "id": "vhost0", "driver_type": "vhost" }
        ]),
    );
    let driver = registry.create("memory", &args).unwrap();

    assert_eq!(driver.discover_accelerator().unwrap().len(), 2);
    assert!(driver.accelerator_list().unwrap().is_empty());

    driver.install_accelerator("nvme0", "nvmf").unwrap();
    driver.update("nvmf", &Options::new().with("qos", "gold")).unwrap();

    let listed = driver.accelerator_list().unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].attributes.get("qos"), Some(&json!("gold")));

    let attached = driver.attach_instance("vm-1").unwrap();
    assert_eq!(attached, Instance { instance_id: "vm-1".into(), accelerator_id: "nvme0".into() });

    let err = driver.uninstall_accelerator("nvme0", "nvmf").unwrap_err();
    assert!(matches!(
        err.backend_error::<MemoryDriverError>(),
        Some(MemoryDriverError::InUse { .. })
    ));

    assert_eq!(driver.detach_instance("vm-1").unwrap(), attached);
    driver.uninstall_accelerator("nvme0", "nvmf").unwrap();
    assert!(driver.accelerator_list().unwrap().is_empty());
}

#[test]
fn chaotic_driver_through_registry() {
    let registry = DriverRegistry::builtin().unwrap();

    let always = Options::new().with("failure_rate", 1.0).with("accelerators", json!(["nvme0"]));
    let driver = registry.create("chaotic", &always).unwrap();
    assert_eq!(driver.server_type(), "chaotic");

    let err = driver.discover_accelerator().unwrap_err();
    assert_eq!(
        err.backend_error::<ChaosError>(),
        Some(&ChaosError { operation: Operation::DiscoverAccelerator })
    );

    let bad = Options::new().with("failure_rate", 2.0);
    assert!(matches!(
        registry.create("chaotic", &bad),
        Err(DriverError::InvalidArgument { ref key, .. }) if key == "failure_rate"
    ));
}

#[test]
fn frozen_registry_is_shared_between_threads() {
    let registry = DriverRegistry::builtin().unwrap();
    let args = Options::new().with("accelerators", json!(["nvme0", "nvme1", "nvme2"]));

    std::thread::scope(|scope| {
        for _ in 0..4 {
            scope.spawn(|| {
                let driver = registry.create("memory", &args).unwrap();
                assert_eq!(driver.discover_accelerator().unwrap().len(), 3);
            });
        }
    });
}
