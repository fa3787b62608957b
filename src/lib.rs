#![no_std]

//! # ArceOS interrupt/eventfd binding registry
//!
//! This crate lets a device own a fixed set of interrupt-indexed *events* and
//! lets a control channel bind each event to an eventfd-like notification
//! handle. When the driver sees an interrupt cause fire it signals the bound
//! handle, waking the waiter without a round-trip per event.
//!
//! It is designed for `no_std` environments and uses the `alloc` crate for
//! dynamic memory allocation.
//!
//! ## Architecture
//!
//! - [`IrqFdRegistry`]: the set of live [`EventBinding`]s, keyed by [`DeviceIdentity`]
//! - [`EventBinding`]: one device's slot array, each slot empty or holding one [`EventFdHandle`]
//! - [`BindingState`]: Active/Removing/Removed lifecycle used to quiesce a binding
//! - [`IrqFdControl`]: dispatches attach/detach/query requests against the registry
//!
//! The collaborators the registry does not own are injected as traits:
//! [`DeviceResolver`] maps raw device references to identities and
//! [`EventFdSource`] converts raw notification references to handles.
//!
//! ## Slot state machine
//!
//! ```text
//! ┌───────┐  attach   ┌───────┐
//! │ Empty │ ────────> │ Bound │
//! └───────┘ <──────── └───────┘
//!             detach
//! ```
//!
//! Attach on `Bound` fails with [`IrqFdError::AlreadyBound`], detach on
//! `Empty` with [`IrqFdError::NotBound`].
//!
//! ## Examples
//!
//! ```rust,ignore
//! use axirqfd::{DeviceIdentity, IrqFdArg, IrqFdCommand, IrqFdConfig, IrqFdControl, IrqFdRegistry};
//!
//! let registry = Arc::new(IrqFdRegistry::new(IrqFdConfig::default()));
//!
//! // Driver side, at device-attach time.
//! let binding = registry.register(DeviceIdentity(inode), 4)?;
//!
//! // Control side.
//! let control = IrqFdControl::new(registry.clone(), resolver, eventfds);
//! control.dispatch(IrqFdCommand::Attach as u32, IrqFdArg::attach(dfd, 2, efd))?;
//!
//! // Driver side, in the interrupt handler.
//! binding.signal(2, 1)?;
//!
//! // Driver side, at device-detach time.
//! registry.unregister(&binding)?;
//! ```

extern crate alloc;
#[macro_use]
extern crate log;

mod binding;
mod config;
mod control;
mod error;
mod eventfd;
mod lifecycle;
mod registry;

pub use binding::{BindingHandle, BindingStats, EventBinding};
pub use config::{DEFAULT_DEVICE_NAME, DEFAULT_MAX_EVENTS, IrqFdConfig};
pub use control::{IrqFdArg, IrqFdCommand, IrqFdControl};
pub use error::{IrqFdError, IrqFdResult};
pub use eventfd::{
    DeviceIdentity, DeviceResolver, EventFd, EventFdHandle, EventFdSource, RawDeviceRef,
    RawEventFdRef,
};
pub use lifecycle::BindingState;
pub use registry::IrqFdRegistry;
