//! Binding lifecycle with an atomic state machine and in-flight access tracking.
//!
//! A binding must be quiesced before its slots are drained: `unregister`
//! flips the state to `Removing` (new accesses are refused), waits until the
//! access count drops to zero, and only then tears the slots down.
//!
//! State and count live in a single `AtomicU32` so that "is it active?" and
//! "count me in" happen in one CAS.
//!
//! Layout: `[state(8 bits) | access_count(24 bits)]`

use core::sync::atomic::{AtomicU32, Ordering};

/// Binding lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BindingState {
    /// Binding is registered and accepts control requests.
    Active = 0,
    /// Binding is being unregistered; new requests are rejected.
    Removing = 1,
    /// Binding has been unregistered and its slots drained.
    Removed = 2,
}

impl BindingState {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            0 => Self::Active,
            1 => Self::Removing,
            _ => Self::Removed,
        }
    }
}

const STATE_SHIFT: u32 = 24;
const COUNT_MASK: u32 = (1 << STATE_SHIFT) - 1;

/// Combined state and in-flight access count.
struct StateAndCount(AtomicU32);

impl StateAndCount {
    const fn new() -> Self {
        Self(AtomicU32::new((BindingState::Active as u32) << STATE_SHIFT))
    }

    #[inline]
    fn state(&self) -> BindingState {
        BindingState::from_bits(self.0.load(Ordering::Acquire) >> STATE_SHIFT)
    }

    #[inline]
    fn count(&self) -> u32 {
        self.0.load(Ordering::Acquire) & COUNT_MASK
    }

    /// Increments the access count if and only if the state is `Active`.
    fn try_acquire(&self) -> Result<(), BindingState> {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            let state = BindingState::from_bits(current >> STATE_SHIFT);
            if state != BindingState::Active {
                return Err(state);
            }
            if current & COUNT_MASK == COUNT_MASK {
                return Err(state);
            }
            match self.0.compare_exchange_weak(
                current,
                current + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Ok(()),
                Err(actual) => current = actual,
            }
        }
    }

    #[inline]
    fn release(&self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }

    /// Moves `Active` to `Removing`, keeping the count.
    ///
    /// Returns `false` if the state was not `Active`.
    fn set_removing(&self) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if current >> STATE_SHIFT != BindingState::Active as u32 {
                return false;
            }
            let new_value = ((BindingState::Removing as u32) << STATE_SHIFT) | (current & COUNT_MASK);
            match self.0.compare_exchange_weak(
                current,
                new_value,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    fn set_removed(&self) {
        self.0
            .store((BindingState::Removed as u32) << STATE_SHIFT, Ordering::Release);
    }
}

/// Tracks whether a binding may be accessed and how many accesses are in flight.
///
/// ```text
/// ┌─────────┐  begin_removal()  ┌──────────┐  complete_removal()  ┌─────────┐
/// │ Active  │ ────────────────> │ Removing │ ───────────────────> │ Removed │
/// └─────────┘                   └──────────┘                      └─────────┘
/// ```
pub struct BindingLifecycle {
    state_count: StateAndCount,
}

impl BindingLifecycle {
    /// Creates a lifecycle in the `Active` state.
    pub const fn new() -> Self {
        Self {
            state_count: StateAndCount::new(),
        }
    }

    /// Gets the current state.
    #[inline]
    pub fn state(&self) -> BindingState {
        self.state_count.state()
    }

    /// Gets the number of accesses currently in flight.
    #[inline]
    pub fn active_accesses(&self) -> usize {
        self.state_count.count() as usize
    }

    /// Registers an access; the returned guard ends it when dropped.
    ///
    /// Returns `None` if the binding is no longer `Active`.
    #[inline]
    pub fn try_access(&self) -> Option<AccessGuard<'_>> {
        self.state_count
            .try_acquire()
            .ok()
            .map(|_| AccessGuard { lifecycle: self })
    }

    /// Transitions `Active` to `Removing`.
    ///
    /// Returns `false` if removal already started.
    pub fn begin_removal(&self) -> bool {
        self.state_count.set_removing()
    }

    /// Spins until no access is in flight.
    pub fn wait_idle(&self) {
        while self.state_count.count() != 0 {
            for _ in 0..100 {
                core::hint::spin_loop();
            }
        }
    }

    /// Transitions to `Removed`. Call only after [`wait_idle`](Self::wait_idle).
    pub fn complete_removal(&self) {
        self.state_count.set_removed();
    }
}

impl Default for BindingLifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for BindingLifecycle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BindingLifecycle")
            .field("state", &self.state())
            .field("active_accesses", &self.active_accesses())
            .finish()
    }
}

/// RAII marker for an in-flight access to a binding.
pub struct AccessGuard<'a> {
    lifecycle: &'a BindingLifecycle,
}

impl Drop for AccessGuard<'_> {
    fn drop(&mut self) {
        self.lifecycle.state_count.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_initial_state() {
        let lifecycle = BindingLifecycle::new();
        assert_eq!(lifecycle.state(), BindingState::Active);
        assert_eq!(lifecycle.active_accesses(), 0);
    }

    #[test]
    fn test_lifecycle_guard_tracks_accesses() {
        let lifecycle = BindingLifecycle::new();

        let first = lifecycle.try_access().unwrap();
        let second = lifecycle.try_access().unwrap();
        assert_eq!(lifecycle.active_accesses(), 2);

        drop(first);
        assert_eq!(lifecycle.active_accesses(), 1);
        drop(second);
        assert_eq!(lifecycle.active_accesses(), 0);
    }

    #[test]
    fn test_lifecycle_removal_rejects_new_access() {
        let lifecycle = BindingLifecycle::new();
        let guard = lifecycle.try_access().unwrap();

        assert!(lifecycle.begin_removal());
        assert_eq!(lifecycle.state(), BindingState::Removing);
        assert!(lifecycle.try_access().is_none());
        // The access that was already in flight still counts.
        assert_eq!(lifecycle.active_accesses(), 1);

        drop(guard);
        lifecycle.wait_idle();
        lifecycle.complete_removal();
        assert_eq!(lifecycle.state(), BindingState::Removed);
        assert!(lifecycle.try_access().is_none());
    }

    #[test]
    fn test_lifecycle_double_removal() {
        let lifecycle = BindingLifecycle::new();
        assert!(lifecycle.begin_removal());
        assert!(!lifecycle.begin_removal());

        lifecycle.complete_removal();
        assert!(!lifecycle.begin_removal());
    }
}
