//! Control protocol: the attach/detach/query requests user space issues
//! against the registry.
//!
//! A request names a device through a raw reference, which the injected
//! [`DeviceResolver`] turns into an identity; attach requests also carry a raw
//! notification reference, converted by the injected [`EventFdSource`].

use alloc::sync::Arc;

use log::Level;

use crate::binding::BindingHandle;
use crate::error::{IrqFdError, IrqFdResult};
use crate::eventfd::{DeviceResolver, EventFdSource, RawDeviceRef, RawEventFdRef};
use crate::registry::IrqFdRegistry;

/// Control commands, encoded with their ioctl numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum IrqFdCommand {
    /// Bind a notification handle to an event.
    Attach = 0x0600,
    /// Unbind and release the handle bound to an event.
    Detach = 0x0601,
    /// Report how many events the device exposes.
    QueryEventCount = 0x0602,
}

impl TryFrom<u32> for IrqFdCommand {
    type Error = IrqFdError;

    fn try_from(value: u32) -> IrqFdResult<Self> {
        match value {
            0x0600 => Ok(Self::Attach),
            0x0601 => Ok(Self::Detach),
            0x0602 => Ok(Self::QueryEventCount),
            _ => Err(IrqFdError::UnknownCommand),
        }
    }
}

/// Request/response record exchanged over the control channel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(C)]
pub struct IrqFdArg {
    /// Reference to the device which owns the interrupt.
    pub device_ref: RawDeviceRef,
    /// Reference to the notification primitive to attach.
    pub eventfd_ref: RawEventFdRef,
    /// Index of the event to attach or detach.
    pub event_index: i32,
    /// Number of events the device supports; filled in by `QueryEventCount`.
    pub event_count: i32,
}

impl IrqFdArg {
    /// Builds an attach request.
    pub const fn attach(device_ref: RawDeviceRef, event_index: i32, eventfd_ref: RawEventFdRef) -> Self {
        Self {
            device_ref,
            eventfd_ref,
            event_index,
            event_count: 0,
        }
    }

    /// Builds a detach request.
    pub const fn detach(device_ref: RawDeviceRef, event_index: i32) -> Self {
        Self::attach(device_ref, event_index, -1)
    }

    /// Builds an event count query.
    pub const fn query(device_ref: RawDeviceRef) -> Self {
        Self::attach(device_ref, 0, -1)
    }
}

/// Handles control requests on behalf of the registry.
pub struct IrqFdControl {
    registry: Arc<IrqFdRegistry>,
    resolver: Arc<dyn DeviceResolver>,
    source: Arc<dyn EventFdSource>,
}

impl IrqFdControl {
    /// Creates a handler serving `registry`.
    ///
    /// # Arguments
    ///
    /// * `registry` - The registry requests are served from.
    /// * `resolver` - Resolves raw device references to identities.
    /// * `source` - Converts raw notification references to handles.
    pub fn new(
        registry: Arc<IrqFdRegistry>,
        resolver: Arc<dyn DeviceResolver>,
        source: Arc<dyn EventFdSource>,
    ) -> Self {
        Self {
            registry,
            resolver,
            source,
        }
    }

    /// Gets the registry this handler serves.
    pub fn registry(&self) -> &Arc<IrqFdRegistry> {
        &self.registry
    }

    /// Executes one control request and returns the response record.
    ///
    /// # Errors
    ///
    /// - [`IrqFdError::UnknownCommand`] if `cmd` is not a known command
    /// - [`IrqFdError::InvalidDeviceReference`] if the device reference does not resolve
    /// - [`IrqFdError::DeviceNotRegistered`] if no live binding matches the device
    /// - [`IrqFdError::EventIndexOutOfRange`], [`IrqFdError::AlreadyBound`],
    ///   [`IrqFdError::NotBound`], [`IrqFdError::InvalidNotificationReference`]
    ///   from the slot operation
    ///
    /// A failed request leaves the registry unchanged.
    pub fn dispatch(&self, cmd: u32, arg: IrqFdArg) -> IrqFdResult<IrqFdArg> {
        let name = self.registry.config().name;
        let level = if self.registry.config().verbose {
            Level::Info
        } else {
            Level::Trace
        };
        log!(
            level,
            "{}: ioctl cmd({:#x}) dfd({}) efd({}) eidx({})",
            name, cmd, arg.device_ref, arg.eventfd_ref, arg.event_index
        );

        let result = IrqFdCommand::try_from(cmd).and_then(|command| {
            let binding = self.lookup(arg.device_ref)?;
            self.execute(command, &binding, arg)
        });
        if let Err(err) = result {
            warn!("{}: cmd({:#x}) failed: {}", name, cmd, err);
        }
        result
    }

    fn lookup(&self, device_ref: RawDeviceRef) -> IrqFdResult<BindingHandle> {
        let identity = self
            .resolver
            .resolve(device_ref)
            .ok_or(IrqFdError::InvalidDeviceReference)?;
        self.registry
            .find(identity)
            .ok_or(IrqFdError::DeviceNotRegistered)
    }

    fn execute(&self, command: IrqFdCommand, binding: &BindingHandle, mut arg: IrqFdArg) -> IrqFdResult<IrqFdArg> {
        match command {
            IrqFdCommand::Attach => {
                let index = event_index(arg.event_index)?;
                binding.attach_with(index, || self.source.fdget(arg.eventfd_ref))?;
            }
            IrqFdCommand::Detach => {
                let index = event_index(arg.event_index)?;
                // Dropping the registry's reference releases it.
                drop(binding.detach(index)?);
            }
            IrqFdCommand::QueryEventCount => {
                arg.event_count = i32::try_from(binding.query_event_count()?)
                    .map_err(|_| IrqFdError::InvalidEventCount)?;
            }
        }
        Ok(arg)
    }
}

fn event_index(raw: i32) -> IrqFdResult<usize> {
    usize::try_from(raw).map_err(|_| IrqFdError::EventIndexOutOfRange)
}
