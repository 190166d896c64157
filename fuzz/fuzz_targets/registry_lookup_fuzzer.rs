//! Fuzz target for server-type lookup and driver construction
//!
//! # Strategy
//!
//! - Arbitrary server type strings, including near-misses of real tags
//! - Arbitrary construction arguments for the built-in drivers
//!
//! # Invariants
//!
//! - Lookup NEVER panics
//! - Only registered tags construct a driver
//! - Unknown tags fail with `DriverNotFound` naming the requested tag
//! - Malformed arguments fail with an error, not a panic

#![no_main]

use accel_driver::{DriverError, DriverRegistry, Options};
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct LookupInput {
    server_type: String,
    /// Construction arguments as raw JSON text
    args_json: String,
}

fuzz_target!(|input: LookupInput| {
    let Ok(registry) = DriverRegistry::builtin() else {
        return;
    };

    let args: Options = serde_json::from_str(&input.args_json).unwrap_or_default();

    match registry.create(&input.server_type, &args) {
        Ok(driver) => {
            assert!(registry.contains(&input.server_type));
            assert_eq!(driver.server_type(), input.server_type);
        },
        Err(DriverError::DriverNotFound { server_type }) => {
            assert!(!registry.contains(&input.server_type));
            assert_eq!(server_type, input.server_type);
        },
        Err(_) => {
            // Argument errors from a registered driver
            assert!(registry.contains(&input.server_type));
        },
    }
});
