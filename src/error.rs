//! Error taxonomy for the interrupt/eventfd binding registry.
//!
//! Every failure is reported synchronously and leaves the registry unchanged.
//! Callers that live in the `AxResult` world can use `?` directly thanks to
//! the [`From<IrqFdError>`] implementation for [`AxError`].

use core::fmt;

use axerrno::AxError;

/// Errors returned by the registry and the control protocol handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqFdError {
    /// The caller-supplied device reference could not be resolved.
    InvalidDeviceReference,
    /// The resolved device has no live binding.
    DeviceNotRegistered,
    /// A binding for this identity is already registered.
    AlreadyRegistered,
    /// The event index is negative or not below the binding's event count.
    EventIndexOutOfRange,
    /// The requested event count exceeds the configured limit.
    InvalidEventCount,
    /// The slot already holds a notification handle.
    AlreadyBound,
    /// The slot holds no notification handle.
    NotBound,
    /// The caller-supplied notification reference could not be converted.
    InvalidNotificationReference,
    /// The slot array could not be allocated.
    AllocationFailure,
    /// The command number is not part of the control protocol.
    UnknownCommand,
}

/// A specialized [`Result`] type for registry operations.
pub type IrqFdResult<T = ()> = Result<T, IrqFdError>;

impl IrqFdError {
    /// Returns a short human-readable description.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidDeviceReference => "invalid device reference",
            Self::DeviceNotRegistered => "device not registered",
            Self::AlreadyRegistered => "device already registered",
            Self::EventIndexOutOfRange => "event index out of range",
            Self::InvalidEventCount => "invalid event count",
            Self::AlreadyBound => "event already bound",
            Self::NotBound => "event not bound",
            Self::InvalidNotificationReference => "invalid notification reference",
            Self::AllocationFailure => "failed to allocate event slots",
            Self::UnknownCommand => "unknown command",
        }
    }

    /// Maps this error onto the closest generic ArceOS error code.
    pub const fn as_ax_error(&self) -> AxError {
        match self {
            Self::InvalidDeviceReference => AxError::BadAddress,
            Self::DeviceNotRegistered => AxError::NotFound,
            Self::AlreadyRegistered => AxError::AlreadyExists,
            Self::EventIndexOutOfRange => AxError::InvalidInput,
            Self::InvalidEventCount => AxError::InvalidInput,
            Self::AlreadyBound => AxError::ResourceBusy,
            Self::NotBound => AxError::BadState,
            Self::InvalidNotificationReference => AxError::BadAddress,
            Self::AllocationFailure => AxError::NoMemory,
            Self::UnknownCommand => AxError::Unsupported,
        }
    }
}

impl fmt::Display for IrqFdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<IrqFdError> for AxError {
    fn from(err: IrqFdError) -> Self {
        err.as_ax_error()
    }
}
