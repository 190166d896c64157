//! Value types passed through the driver contract.
//!
//! The registry treats all of these as opaque: backends produce them and
//! callers consume them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DriverError;

/// Open string-keyed configuration bag.
///
/// Used for driver construction arguments and for `update` options. Which
/// keys are recognized is up to each backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Options(Map<String, Value>);

impl Options {
    /// Create an empty bag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any previous value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style [`Options::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Raw value under `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Remove and return the value under `key`.
    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    /// String value under `key`.
    ///
    /// `Ok(None)` if absent, `InvalidArgument` if present but not a string.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>, DriverError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => {
                Err(DriverError::invalid_argument(key, format!("expected string, got {other}")))
            },
        }
    }

    /// Unsigned integer value under `key`.
    pub fn get_u64(&self, key: &str) -> Result<Option<u64>, DriverError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                DriverError::invalid_argument(key, format!("expected integer >= 0, got {value}"))
            }),
        }
    }

    /// Floating point value under `key`. Integers are accepted.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>, DriverError> {
        match self.0.get(key) {
            None => Ok(None),
            Some(value) => value.as_f64().map(Some).ok_or_else(|| {
                DriverError::invalid_argument(key, format!("expected number, got {value}"))
            }),
        }
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the bag is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy every entry of `other` into `self`, overwriting existing keys.
    pub fn merge(&mut self, other: &Options) {
        for (key, value) in other.iter() {
            self.0.insert(key.clone(), value.clone());
        }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Options {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A discovered accelerator device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceleratorHandle {
    /// Backend-assigned device identifier
    pub id: String,
    /// Driver type the device is provisioned with (e.g. `nvmf`, `vhost`)
    pub driver_type: String,
    /// Backend-specific attributes
    #[serde(default, skip_serializing_if = "Options::is_empty")]
    pub attributes: Options,
}

impl AcceleratorHandle {
    /// Handle with no attributes.
    pub fn new(id: impl Into<String>, driver_type: impl Into<String>) -> Self {
        Self { id: id.into(), driver_type: driver_type.into(), attributes: Options::new() }
    }
}

/// A compute instance bound to (or released from) an accelerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance identifier supplied by the caller
    pub instance_id: String,
    /// Accelerator the instance is, or was, bound to
    pub accelerator_id: String,
}
