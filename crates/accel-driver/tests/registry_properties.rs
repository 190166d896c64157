//! Property-based tests for `DriverRegistry`

use accel_driver::{
    AcceleratorDriver, AcceleratorHandle, DriverDescriptor, DriverError, DriverFactory,
    DriverRegistry, DriverRegistryBuilder, DuplicatePolicy, Instance, Operation, Options,
    RegistryConfig,
};
use proptest::prelude::*;

/// Server types the properties draw from.
const TAGS: [&str; 6] = ["nvmf", "vhost", "iscsi", "rdma", "virtio", "fake"];

/// Driver that reports which registration slot built it.
struct Slot(usize);

impl AcceleratorDriver for Slot {
    fn server_type(&self) -> &str {
        "slot"
    }

    fn discover_accelerator(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        Ok(vec![AcceleratorHandle::new(self.0.to_string(), "nvmf")])
    }

    fn install_accelerator(&self, _: &str, _: &str) -> Result<(), DriverError> {
        Err(DriverError::not_implemented("slot", Operation::InstallAccelerator))
    }

    fn uninstall_accelerator(&self, _: &str, _: &str) -> Result<(), DriverError> {
        Err(DriverError::not_implemented("slot", Operation::UninstallAccelerator))
    }

    fn accelerator_list(&self) -> Result<Vec<AcceleratorHandle>, DriverError> {
        Err(DriverError::not_implemented("slot", Operation::AcceleratorList))
    }

    fn update(&self, _: &str, _: &Options) -> Result<(), DriverError> {
        Err(DriverError::not_implemented("slot", Operation::Update))
    }

    fn attach_instance(&self, _: &str) -> Result<Instance, DriverError> {
        Err(DriverError::not_implemented("slot", Operation::AttachInstance))
    }

    fn detach_instance(&self, _: &str) -> Result<Instance, DriverError> {
        Err(DriverError::not_implemented("slot", Operation::DetachInstance))
    }
}

fn slot<const N: usize>(_: &Options) -> Result<Box<dyn AcceleratorDriver>, DriverError> {
    Ok(Box::new(Slot(N)))
}

/// Factory for each registration position.
const FACTORIES: [DriverFactory; 8] =
    [slot::<0>, slot::<1>, slot::<2>, slot::<3>, slot::<4>, slot::<5>, slot::<6>, slot::<7>];

fn slot_of(registry: &DriverRegistry, tag: &str) -> Result<usize, DriverError> {
    let driver = registry.create(tag, &Options::new())?;
    let handles = driver.discover_accelerator()?;
    Ok(handles[0].id.parse().unwrap())
}

fn registration_order() -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(0..TAGS.len(), 0..FACTORIES.len())
}

/// Property: every registered tag resolves to its first registration
#[test]
fn prop_lookup_resolves_first_registration() {
    proptest!(|(order in registration_order())| {
        let mut builder = DriverRegistry::builder();
        for (position, &tag) in order.iter().enumerate() {
            builder.register(DriverDescriptor::new(TAGS[tag], "", FACTORIES[position]))?;
        }
        let registry = builder.build();

        prop_assert_eq!(registry.len(), order.len());

        for (index, tag) in TAGS.iter().enumerate() {
            match order.iter().position(|&t| t == index) {
                Some(first) => prop_assert_eq!(slot_of(&registry, tag)?, first),
                None => {
                    let is_not_found =
                        matches!(slot_of(&registry, tag), Err(DriverError::DriverNotFound { .. }));
                    prop_assert!(is_not_found);
                },
            }
        }
    });
}

/// Property: reject policy keeps exactly one entry per tag
#[test]
fn prop_reject_policy_keeps_distinct_tags() {
    proptest!(|(order in registration_order())| {
        let mut builder = DriverRegistryBuilder::with_config(RegistryConfig {
            duplicate_policy: DuplicatePolicy::Reject,
        });

        let mut seen = Vec::new();
        for (position, &tag) in order.iter().enumerate() {
            let descriptor = DriverDescriptor::new(TAGS[tag], "", FACTORIES[position]);
            let result = builder.register(descriptor);
            if seen.contains(&tag) {
                let is_duplicate = matches!(result, Err(DriverError::DuplicateServerType(_)));
                prop_assert!(is_duplicate);
            } else {
                prop_assert!(result.is_ok());
                seen.push(tag);
            }
        }
        let registry = builder.build();

        prop_assert_eq!(registry.len(), seen.len());
        let expected: Vec<&str> = seen.iter().map(|&t| TAGS[t]).collect();
        prop_assert_eq!(registry.server_types(), expected);
    });
}

/// Property: arbitrary unregistered tags never resolve
#[test]
fn prop_unknown_tags_are_not_found() {
    proptest!(|(tag in "[a-z0-9_-]{1,16}")| {
        prop_assume!(tag != "memory" && tag != "chaotic");
        let registry = DriverRegistry::builtin().unwrap();

        let result = registry.create(&tag, &Options::new());
        let is_not_found = matches!(
            result,
            Err(DriverError::DriverNotFound { ref server_type }) if *server_type == tag
        );
        prop_assert!(is_not_found);
    });
}
