//! Driver error types.
//!
//! Defines errors that can occur while resolving or driving a backend:
//! - `DriverNotFound`: No registered implementation matches the server type
//! - `NotImplemented`: The backend does not support the requested operation
//! - `DuplicateServerType`: Registration rejected by the duplicate policy
//! - `Backend`: Backend-specific failure, passed through untouched

use thiserror::Error;

use crate::driver::Operation;

/// Boxed backend error, as produced by concrete drivers.
pub type BackendError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur in the registry or in a driver operation.
#[derive(Error, Debug)]
pub enum DriverError {
    /// No registered driver matches the requested server type.
    ///
    /// Returned by [`DriverRegistry::create`](crate::DriverRegistry::create).
    /// Not recoverable by the registry itself.
    #[error("could not find the driver for server {server_type}")]
    DriverNotFound {
        /// Server type that was requested
        server_type: String,
    },

    /// The driver does not support this operation.
    ///
    /// Backends return this explicitly; nothing in the registry turns it into
    /// a silent success.
    #[error("{server_type} driver does not implement {operation}")]
    NotImplemented {
        /// Server type of the driver that was called
        server_type: String,
        /// Operation that was invoked
        operation: Operation,
    },

    /// A second driver was registered under a tag that is already taken.
    ///
    /// Only produced under [`DuplicatePolicy::Reject`](crate::DuplicatePolicy).
    #[error("server type {0} is already registered")]
    DuplicateServerType(String),

    /// The process-wide registry was already installed.
    #[error("global driver registry is already installed")]
    GlobalAlreadyInstalled,

    /// A backend rejected a construction or update argument.
    #[error("invalid argument {key}: {reason}")]
    InvalidArgument {
        /// Argument key
        key: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Backend-specific error, forwarded unchanged.
    #[error(transparent)]
    Backend(BackendError),
}

impl DriverError {
    /// Shorthand for a [`DriverError::NotImplemented`].
    pub fn not_implemented(server_type: impl Into<String>, operation: Operation) -> Self {
        Self::NotImplemented { server_type: server_type.into(), operation }
    }

    /// Shorthand for a [`DriverError::InvalidArgument`].
    pub fn invalid_argument(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument { key: key.into(), reason: reason.into() }
    }

    /// Wrap a backend-specific error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(err))
    }

    /// Downcast a [`DriverError::Backend`] to the concrete backend error.
    ///
    /// `None` for any other variant or a different backend error type.
    pub fn backend_error<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Self::Backend(err) => err.downcast_ref::<E>(),
            _ => None,
        }
    }
}
