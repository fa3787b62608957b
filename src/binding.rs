//! Per-device event binding: a fixed array of slots, each optionally holding
//! one notification handle.

use alloc::boxed::Box;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

use axerrno::AxResult;
use spin::Mutex;

use crate::error::{IrqFdError, IrqFdResult};
use crate::eventfd::{DeviceIdentity, EventFdHandle};
use crate::lifecycle::{AccessGuard, BindingLifecycle, BindingState};

/// Shared handle to a registered binding, returned to the owning driver.
pub type BindingHandle = Arc<EventBinding>;

/// Counters for operations performed on a binding.
#[derive(Debug, Default)]
pub struct BindingStats {
    attach_count: AtomicU64,
    detach_count: AtomicU64,
    signal_count: AtomicU64,
    error_count: AtomicU64,
}

impl BindingStats {
    /// Creates a new statistics tracker.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    fn record<T>(&self, counter: &AtomicU64, result: &IrqFdResult<T>) {
        match result {
            Ok(_) => counter.fetch_add(1, Ordering::Relaxed),
            Err(_) => self.error_count.fetch_add(1, Ordering::Relaxed),
        };
    }

    /// Gets the number of successful attaches.
    #[inline]
    pub fn attaches(&self) -> u64 {
        self.attach_count.load(Ordering::Relaxed)
    }

    /// Gets the number of successful detaches.
    #[inline]
    pub fn detaches(&self) -> u64 {
        self.detach_count.load(Ordering::Relaxed)
    }

    /// Gets the number of handles signaled.
    #[inline]
    pub fn signals(&self) -> u64 {
        self.signal_count.load(Ordering::Relaxed)
    }

    /// Gets the number of rejected operations.
    #[inline]
    pub fn errors(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// One device's exposed event set.
///
/// # Concurrency
///
/// Each slot has its own lock, so attach/detach on the same slot are
/// linearizable while different slots proceed independently. Every slot
/// operation also holds an [`AccessGuard`] for its whole duration; the
/// registry waits for those to drain before tearing the binding down.
pub struct EventBinding {
    identity: DeviceIdentity,
    slots: Box<[Mutex<Option<EventFdHandle>>]>,
    lifecycle: BindingLifecycle,
    stats: BindingStats,
}

impl EventBinding {
    /// Creates a binding with `event_count` empty slots.
    ///
    /// # Errors
    ///
    /// Returns [`IrqFdError::AllocationFailure`] if the slot array cannot be
    /// allocated.
    pub(crate) fn new(identity: DeviceIdentity, event_count: usize) -> IrqFdResult<Self> {
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(event_count)
            .map_err(|_| IrqFdError::AllocationFailure)?;
        slots.extend((0..event_count).map(|_| Mutex::new(None)));

        Ok(Self {
            identity,
            slots: slots.into_boxed_slice(),
            lifecycle: BindingLifecycle::new(),
            stats: BindingStats::new(),
        })
    }

    /// Gets the identity this binding is matched against.
    #[inline]
    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    /// Gets the number of events (slots) this binding exposes.
    #[inline]
    pub fn event_count(&self) -> usize {
        self.slots.len()
    }

    /// Gets the lifecycle state.
    #[inline]
    pub fn state(&self) -> BindingState {
        self.lifecycle.state()
    }

    /// Checks if the binding is registered and accepts requests.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.state() == BindingState::Active
    }

    /// Gets a reference to the statistics.
    #[inline]
    pub fn stats(&self) -> &BindingStats {
        &self.stats
    }

    pub(crate) fn lifecycle(&self) -> &BindingLifecycle {
        &self.lifecycle
    }

    fn access(&self) -> IrqFdResult<AccessGuard<'_>> {
        self.lifecycle
            .try_access()
            .ok_or(IrqFdError::DeviceNotRegistered)
    }

    fn slot(&self, index: usize) -> IrqFdResult<&Mutex<Option<EventFdHandle>>> {
        self.slots.get(index).ok_or(IrqFdError::EventIndexOutOfRange)
    }

    /// Binds the handle produced by `acquire` to slot `index`.
    ///
    /// `acquire` runs only once the slot is known to be empty, with the slot
    /// lock released; if it fails the slot stays empty. If another attach
    /// fills the slot meanwhile, the acquired handle is released and the call
    /// fails with `AlreadyBound`.
    ///
    /// # Errors
    ///
    /// - [`IrqFdError::DeviceNotRegistered`] if the binding is being removed
    /// - [`IrqFdError::EventIndexOutOfRange`] if `index >= event_count`
    /// - [`IrqFdError::AlreadyBound`] if the slot is occupied
    /// - whatever `acquire` returns
    pub fn attach_with<F>(&self, index: usize, acquire: F) -> IrqFdResult
    where
        F: FnOnce() -> IrqFdResult<EventFdHandle>,
    {
        let result = self.access().and_then(|_guard| {
            let slot = self.slot(index)?;
            if slot.lock().is_some() {
                return Err(IrqFdError::AlreadyBound);
            }
            let handle = acquire()?;

            let mut slot = slot.lock();
            if slot.is_some() {
                return Err(IrqFdError::AlreadyBound);
            }
            *slot = Some(handle);
            Ok(())
        });

        self.stats.record(&self.stats.attach_count, &result);
        match result {
            Ok(()) => trace!("{:?}: event {} attached", self.identity, index),
            Err(err) => warn!("{:?}: attach event {} failed: {}", self.identity, index, err),
        }
        result
    }

    /// Binds `handle` to slot `index`.
    ///
    /// See [`attach_with`](Self::attach_with) for the error conditions.
    pub fn attach(&self, index: usize, handle: EventFdHandle) -> IrqFdResult {
        self.attach_with(index, || Ok(handle))
    }

    /// Takes the handle out of slot `index`, leaving it empty.
    ///
    /// The returned handle is the registry's reference; dropping it releases it.
    ///
    /// # Errors
    ///
    /// - [`IrqFdError::DeviceNotRegistered`] if the binding is being removed
    /// - [`IrqFdError::EventIndexOutOfRange`] if `index >= event_count`
    /// - [`IrqFdError::NotBound`] if the slot is empty
    pub fn detach(&self, index: usize) -> IrqFdResult<EventFdHandle> {
        let result = self.access().and_then(|_guard| {
            self.slot(index)?
                .lock()
                .take()
                .ok_or(IrqFdError::NotBound)
        });

        self.stats.record(&self.stats.detach_count, &result);
        match &result {
            Ok(_) => trace!("{:?}: event {} detached", self.identity, index),
            Err(err) => warn!("{:?}: detach event {} failed: {}", self.identity, index, err),
        }
        result
    }

    /// Signals the handle bound to slot `index`, if any.
    ///
    /// Returns `Ok(false)` when the slot is empty. This is the call an owning
    /// driver makes when the corresponding interrupt cause fires. Rejected
    /// signals count as errors in [`stats`](Self::stats).
    pub fn signal(&self, index: usize, count: u64) -> AxResult<bool> {
        let handle = self
            .access()
            .and_then(|_guard| Ok(self.slot(index)?.lock().clone()))
            .inspect_err(|err| {
                self.stats.error_count.fetch_add(1, Ordering::Relaxed);
                warn!("{:?}: signal event {} failed: {}", self.identity, index, err);
            })?;

        match handle {
            Some(handle) => {
                handle.signal(count).inspect_err(|_| {
                    self.stats.error_count.fetch_add(1, Ordering::Relaxed);
                })?;
                self.stats.signal_count.fetch_add(1, Ordering::Relaxed);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Gets the event count on behalf of a control request.
    ///
    /// Unlike [`event_count`](Self::event_count) this holds an access for the
    /// read, so it fails once removal has started and `unregister` waits for it.
    ///
    /// # Errors
    ///
    /// Returns [`IrqFdError::DeviceNotRegistered`] if the binding is being removed.
    pub fn query_event_count(&self) -> IrqFdResult<usize> {
        let _guard = self.access()?;
        Ok(self.event_count())
    }

    /// Checks if slot `index` holds a handle. Out-of-range indices are unbound.
    pub fn is_bound(&self, index: usize) -> bool {
        self.slots
            .get(index)
            .is_some_and(|slot| slot.lock().is_some())
    }

    /// Counts the occupied slots.
    pub fn bound_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.lock().is_some()).count()
    }

    /// Releases every bound handle. Returns how many were released.
    ///
    /// Only called once the binding has been quiesced.
    pub(crate) fn drain(&self) -> usize {
        self.slots
            .iter()
            .filter_map(|slot| slot.lock().take())
            .count()
    }
}

impl core::fmt::Debug for EventBinding {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventBinding")
            .field("identity", &self.identity)
            .field("event_count", &self.event_count())
            .field("lifecycle", &self.lifecycle)
            .field("stats", &format_args!(
                "attaches={}, detaches={}, signals={}, errors={}",
                self.stats.attaches(),
                self.stats.detaches(),
                self.stats.signals(),
                self.stats.errors()
            ))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eventfd::EventFd;

    #[derive(Default)]
    struct CountingEventFd {
        value: AtomicU64,
    }

    impl EventFd for CountingEventFd {
        fn signal(&self, count: u64) -> AxResult {
            self.value.fetch_add(count, Ordering::SeqCst);
            Ok(())
        }
    }

    fn handle() -> Arc<CountingEventFd> {
        Arc::new(CountingEventFd::default())
    }

    #[test]
    fn test_binding_attach_detach_same_handle() {
        let binding = EventBinding::new(DeviceIdentity(1), 4).unwrap();
        let efd = handle();

        binding.attach(2, efd.clone()).unwrap();
        assert!(binding.is_bound(2));
        assert_eq!(binding.bound_count(), 1);

        let detached = binding.detach(2).unwrap();
        assert!(core::ptr::addr_eq(Arc::as_ptr(&detached), Arc::as_ptr(&efd)));
        assert!(!binding.is_bound(2));
        assert_eq!(binding.stats().attaches(), 1);
        assert_eq!(binding.stats().detaches(), 1);
    }

    #[test]
    fn test_binding_rejects_double_attach() {
        let binding = EventBinding::new(DeviceIdentity(1), 2).unwrap();
        let first = handle();

        binding.attach(0, first.clone()).unwrap();
        assert_eq!(binding.attach(0, handle()), Err(IrqFdError::AlreadyBound));

        let kept = binding.detach(0).unwrap();
        assert!(core::ptr::addr_eq(Arc::as_ptr(&kept), Arc::as_ptr(&first)));
        assert_eq!(binding.stats().errors(), 1);
    }

    #[test]
    fn test_binding_attach_with_not_called_when_bound() {
        let binding = EventBinding::new(DeviceIdentity(1), 1).unwrap();
        binding.attach(0, handle()).unwrap();

        let result = binding.attach_with(0, || panic!("acquire must not run"));
        assert_eq!(result, Err(IrqFdError::AlreadyBound));
    }

    #[test]
    fn test_binding_failed_acquire_leaves_slot_empty() {
        let binding = EventBinding::new(DeviceIdentity(1), 1).unwrap();

        let result = binding.attach_with(0, || Err(IrqFdError::InvalidNotificationReference));
        assert_eq!(result, Err(IrqFdError::InvalidNotificationReference));
        assert!(!binding.is_bound(0));
    }

    #[test]
    fn test_binding_detach_empty() {
        let binding = EventBinding::new(DeviceIdentity(1), 3).unwrap();
        assert_eq!(binding.detach(1).err(), Some(IrqFdError::NotBound));
        assert_eq!(binding.bound_count(), 0);
    }

    #[test]
    fn test_binding_index_out_of_range() {
        for count in 0..4 {
            let binding = EventBinding::new(DeviceIdentity(1), count).unwrap();
            assert_eq!(binding.attach(count, handle()), Err(IrqFdError::EventIndexOutOfRange));
            assert_eq!(binding.detach(count).err(), Some(IrqFdError::EventIndexOutOfRange));
            assert!(!binding.is_bound(count));
        }
    }

    #[test]
    fn test_binding_signal() {
        let binding = EventBinding::new(DeviceIdentity(1), 2).unwrap();
        let efd = handle();
        binding.attach(1, efd.clone()).unwrap();

        assert_eq!(binding.signal(1, 3), Ok(true));
        assert_eq!(binding.signal(0, 1), Ok(false));
        assert_eq!(efd.value.load(Ordering::SeqCst), 3);
        assert_eq!(binding.stats().signals(), 1);
        assert!(binding.signal(2, 1).is_err());
        assert_eq!(binding.stats().errors(), 1);
    }

    #[test]
    fn test_binding_signal_rejected_while_removing() {
        let binding = EventBinding::new(DeviceIdentity(1), 1).unwrap();
        let efd = handle();
        binding.attach(0, efd.clone()).unwrap();
        assert!(binding.lifecycle().begin_removal());

        assert_eq!(binding.signal(0, 1), Err(axerrno::AxError::NotFound));
        assert_eq!(efd.value.load(Ordering::SeqCst), 0);
        assert_eq!(binding.stats().signals(), 0);
        assert_eq!(binding.stats().errors(), 1);
    }

    #[test]
    fn test_binding_acquire_may_reenter_slot() {
        let binding = EventBinding::new(DeviceIdentity(1), 2).unwrap();

        binding
            .attach_with(1, || {
                assert!(!binding.is_bound(1));
                assert_eq!(binding.signal(1, 1), Ok(false));
                Ok(handle())
            })
            .unwrap();
        assert!(binding.is_bound(1));
    }

    #[test]
    fn test_binding_attach_loses_race_during_acquire() {
        let binding = EventBinding::new(DeviceIdentity(1), 1).unwrap();
        let winner = handle();
        let loser = handle();

        let result = binding.attach_with(0, || {
            binding.attach(0, winner.clone()).unwrap();
            Ok(loser.clone())
        });
        assert_eq!(result, Err(IrqFdError::AlreadyBound));
        // The handle acquired by the losing attach has been released.
        assert_eq!(Arc::strong_count(&loser), 1);

        let bound = binding.detach(0).unwrap();
        assert!(core::ptr::addr_eq(Arc::as_ptr(&bound), Arc::as_ptr(&winner)));
    }

    #[test]
    fn test_binding_drain_releases_handles() {
        let binding = EventBinding::new(DeviceIdentity(1), 3).unwrap();
        let efd = handle();
        binding.attach(0, efd.clone()).unwrap();
        binding.attach(2, efd.clone()).unwrap();
        assert_eq!(Arc::strong_count(&efd), 3);

        assert_eq!(binding.drain(), 2);
        assert_eq!(Arc::strong_count(&efd), 1);
        assert_eq!(binding.bound_count(), 0);
    }

    #[test]
    fn test_binding_rejects_access_while_removing() {
        let binding = EventBinding::new(DeviceIdentity(1), 1).unwrap();
        assert!(binding.lifecycle().begin_removal());

        assert_eq!(binding.attach(0, handle()), Err(IrqFdError::DeviceNotRegistered));
        assert_eq!(binding.detach(0).err(), Some(IrqFdError::DeviceNotRegistered));
        assert!(!binding.is_active());
    }

    #[test]
    fn test_binding_query_rejected_while_removing() {
        let binding = EventBinding::new(DeviceIdentity(1), 4).unwrap();
        assert_eq!(binding.query_event_count(), Ok(4));

        assert!(binding.lifecycle().begin_removal());
        assert_eq!(binding.query_event_count(), Err(IrqFdError::DeviceNotRegistered));
        assert_eq!(binding.event_count(), 4);
    }

    #[test]
    fn test_binding_query_holds_access() {
        let binding = EventBinding::new(DeviceIdentity(1), 2).unwrap();
        let guard = binding.lifecycle().try_access().unwrap();
        assert_eq!(binding.query_event_count(), Ok(2));
        // The query's own access has ended; only ours is left.
        assert_eq!(binding.lifecycle().active_accesses(), 1);
        drop(guard);
    }
}
