//! Boundary traits for the collaborators the registry relies on.
//!
//! The registry never creates notification primitives nor interprets device
//! references itself. Both capabilities are injected:
//!
//! - [`DeviceResolver`] turns a raw device reference (e.g. a file descriptor
//!   handed in by user space) into a stable [`DeviceIdentity`].
//! - [`EventFdSource`] turns a raw notification reference into an owned
//!   [`EventFdHandle`].
//!
//! A handle is released by dropping the registry's `Arc`; other holders keep
//! the primitive alive.

use alloc::sync::Arc;

use axerrno::AxResult;

use crate::error::IrqFdResult;

/// Raw device reference supplied by a control request.
pub type RawDeviceRef = i32;

/// Raw notification reference supplied by an attach request.
pub type RawEventFdRef = i32;

/// Stable identity of the resource backing a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceIdentity(pub usize);

/// A notification primitive that a producer can signal and a consumer can
/// wait on.
pub trait EventFd: Send + Sync {
    /// Adds `count` to the primitive's counter, waking any waiter.
    fn signal(&self, count: u64) -> AxResult;
}

/// Owned reference to a notification primitive held by a slot.
pub type EventFdHandle = Arc<dyn EventFd>;

/// Converts raw notification references into owned handles.
pub trait EventFdSource: Send + Sync {
    /// Acquires a reference to the primitive named by `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`IrqFdError::InvalidNotificationReference`](crate::IrqFdError::InvalidNotificationReference)
    /// if `raw` does not name a notification primitive.
    fn fdget(&self, raw: RawEventFdRef) -> IrqFdResult<EventFdHandle>;
}

/// Resolves raw device references to device identities.
pub trait DeviceResolver: Send + Sync {
    /// Returns the identity of the device named by `raw`, or `None` if the
    /// reference is invalid.
    fn resolve(&self, raw: RawDeviceRef) -> Option<DeviceIdentity>;
}

impl<F> DeviceResolver for F
where
    F: Fn(RawDeviceRef) -> Option<DeviceIdentity> + Send + Sync,
{
    fn resolve(&self, raw: RawDeviceRef) -> Option<DeviceIdentity> {
        self(raw)
    }
}
