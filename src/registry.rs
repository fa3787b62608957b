//! Binding registry: the set of live device bindings, keyed by identity.
//!
//! This module provides:
//! - Registration of a device's event set at device-attach time
//! - Quiesced, draining unregistration at device-detach time
//! - Lookup by identity under the registry lock
//! - Forced teardown of every remaining binding

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;

use spin::RwLock;

use crate::binding::{BindingHandle, EventBinding};
use crate::config::IrqFdConfig;
use crate::error::{IrqFdError, IrqFdResult};
use crate::eventfd::DeviceIdentity;

/// Registry of device bindings.
///
/// The registry is an ordinary value: construct it once, share it by
/// reference (or `Arc`) with the drivers and the control handler, and tear it
/// down explicitly or by dropping it.
///
/// # Concurrency
///
/// A read-write lock covers the binding map. Lookups hold the read lock for
/// the whole traversal; registration and removal take the write lock. Slot
/// operations do not touch the registry lock at all: each binding guards its
/// own slots and tracks in-flight accesses so that removal can wait for them.
pub struct IrqFdRegistry {
    bindings: RwLock<BTreeMap<DeviceIdentity, BindingHandle>>,
    config: IrqFdConfig,
}

impl IrqFdRegistry {
    /// Creates a new empty registry.
    pub fn new(config: IrqFdConfig) -> Self {
        debug!("{}: registry created ({:?})", config.name, config);
        Self {
            bindings: RwLock::new(BTreeMap::new()),
            config,
        }
    }

    /// Gets the registry configuration.
    #[inline]
    pub fn config(&self) -> &IrqFdConfig {
        &self.config
    }

    /// Registers a device exposing `event_count` events.
    ///
    /// Returns the handle the owning driver keeps to signal events and to
    /// unregister later.
    ///
    /// # Errors
    ///
    /// - [`IrqFdError::InvalidEventCount`] if `event_count` exceeds the configured limit
    /// - [`IrqFdError::AllocationFailure`] if the slot array cannot be allocated
    /// - [`IrqFdError::AlreadyRegistered`] if `identity` already has a binding
    ///
    /// On error the registry is left unchanged.
    pub fn register(&self, identity: DeviceIdentity, event_count: usize) -> IrqFdResult<BindingHandle> {
        if event_count > self.config.max_events {
            warn!(
                "{}: {:?} asks for {} events, limit is {}",
                self.config.name, identity, event_count, self.config.max_events
            );
            return Err(IrqFdError::InvalidEventCount);
        }

        let binding = Arc::new(EventBinding::new(identity, event_count).inspect_err(|_| {
            error!("{}: failed to allocate {} event slots", self.config.name, event_count)
        })?);

        {
            let mut bindings = self.bindings.write();
            if bindings.contains_key(&identity) {
                warn!("{}: {:?} already registered", self.config.name, identity);
                return Err(IrqFdError::AlreadyRegistered);
            }
            bindings.insert(identity, Arc::clone(&binding));
        }

        debug!(
            "{}: registered {:?} with {} events",
            self.config.name, identity, event_count
        );
        Ok(binding)
    }

    /// Unregisters a binding and releases every handle still bound to it.
    ///
    /// This performs a graceful removal:
    /// 1. Marks the binding as `Removing` (new requests fail with `DeviceNotRegistered`)
    /// 2. Waits for in-flight requests to complete
    /// 3. Removes it from the registry
    /// 4. Marks it as `Removed` and drains its slots
    ///
    /// Returns the number of handles that were still bound.
    ///
    /// # Errors
    ///
    /// Returns [`IrqFdError::DeviceNotRegistered`] if the binding is not
    /// live in this registry.
    pub fn unregister(&self, binding: &BindingHandle) -> IrqFdResult<usize> {
        let identity = binding.identity();
        let owned = self
            .bindings
            .read()
            .get(&identity)
            .is_some_and(|live| Arc::ptr_eq(live, binding));
        if !owned || !binding.lifecycle().begin_removal() {
            warn!("{}: {:?} is not registered", self.config.name, identity);
            return Err(IrqFdError::DeviceNotRegistered);
        }

        binding.lifecycle().wait_idle();
        self.bindings.write().remove(&identity);
        binding.lifecycle().complete_removal();

        let released = binding.drain();
        if released > 0 {
            warn!(
                "{}: {:?} unregistered with {} events still bound, released",
                self.config.name, identity, released
            );
        }
        debug!("{}: unregistered {:?}", self.config.name, identity);
        Ok(released)
    }

    /// Finds the live binding for `identity`.
    pub fn find(&self, identity: DeviceIdentity) -> Option<BindingHandle> {
        self.bindings
            .read()
            .get(&identity)
            .filter(|binding| binding.is_active())
            .cloned()
    }

    /// Lists the identities of all registered bindings.
    pub fn identities(&self) -> Vec<DeviceIdentity> {
        self.bindings.read().keys().copied().collect()
    }

    /// Gets the number of registered bindings.
    pub fn binding_count(&self) -> usize {
        self.bindings.read().len()
    }

    /// Unregisters every binding, releasing all handles still bound.
    ///
    /// Returns the total number of handles released.
    pub fn teardown(&self) -> usize {
        let remaining: Vec<BindingHandle> = self.bindings.read().values().cloned().collect();
        if !remaining.is_empty() {
            warn!(
                "{}: tearing down with {} bindings still registered",
                self.config.name,
                remaining.len()
            );
        }

        remaining
            .iter()
            // A concurrent `unregister` may win the race; it drains for us.
            .filter_map(|binding| self.unregister(binding).ok())
            .sum()
    }
}

impl Default for IrqFdRegistry {
    fn default() -> Self {
        Self::new(IrqFdConfig::default())
    }
}

impl Drop for IrqFdRegistry {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl core::fmt::Debug for IrqFdRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("IrqFdRegistry")
            .field("config", &self.config)
            .field("bindings", &self.binding_count())
            .finish()
    }
}
