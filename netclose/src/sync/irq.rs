// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Critical sections against the event context

use core::cell::UnsafeCell;
use core::marker::PhantomData;
use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::InterruptMaskProvider;

/// An RAII witness that the event context is masked. When this structure is dropped (falls out of
/// scope), the previous interrupt state is restored.
///
/// Critical sections nest: entering one while already inside one is allowed, and only the
/// outermost exit actually unmasks.
#[must_use = "the critical section ends as soon as this is dropped"]
pub struct CriticalSection<'a, Platform: InterruptMaskProvider> {
    platform: &'a Platform,
    saved: Platform::IrqState,
    // Not Send or Sync--the mask belongs to the context that took it.
    _phantom: PhantomData<*mut ()>,
}

impl<'a, Platform: InterruptMaskProvider> CriticalSection<'a, Platform> {
    /// Mask the event context until the returned guard is dropped.
    pub fn enter(platform: &'a Platform) -> Self {
        let saved = platform.mask_interrupts();
        Self {
            platform,
            saved,
            _phantom: PhantomData,
        }
    }
}

impl<Platform: InterruptMaskProvider> Drop for CriticalSection<'_, Platform> {
    fn drop(&mut self) {
        // SAFETY: `saved` came from the `mask_interrupts` in `enter`, and guards cannot be moved
        // across contexts, nor outlive a guard created after them in the same scope.
        unsafe { self.platform.restore_interrupts(self.saved) };
    }
}

/// State shared between task context and event context.
///
/// Access requires a [`CriticalSection`], which guarantees that no other context is accessing the
/// state at the same time. Re-entrant access to the _same_ cell (e.g., from within a callback run
/// while the cell is borrowed) is a bug, and panics.
pub struct IrqCell<Platform: InterruptMaskProvider, T> {
    borrowed: AtomicBool,
    data: UnsafeCell<T>,
    _platform: PhantomData<fn(&Platform)>,
}

// SAFETY: `IrqCell` only hands out access to `T` from within a critical section, which the
// platform guarantees is held by at most one context at a time, so it's OK to share a reference to
// it between threads as long as `T` can be _sent_ between threads.
unsafe impl<Platform: InterruptMaskProvider, T: Send> Sync for IrqCell<Platform, T> {}

impl<Platform: InterruptMaskProvider, T> IrqCell<Platform, T> {
    /// Returns a new cell wrapping the given value.
    pub const fn new(val: T) -> Self {
        Self {
            borrowed: AtomicBool::new(false),
            data: UnsafeCell::new(val),
            _platform: PhantomData,
        }
    }

    /// Run `f` with exclusive access to the contained value.
    ///
    /// # Panics
    ///
    /// Panics if the cell is already being accessed further up the current call stack.
    #[track_caller]
    pub fn with<R>(&self, _cs: &CriticalSection<'_, Platform>, f: impl FnOnce(&mut T) -> R) -> R {
        // Only the holder of the critical section can get here, so the flag only ever catches
        // re-entrancy from the same context.
        assert!(
            !self.borrowed.swap(true, Ordering::Acquire),
            "re-entrant access to interrupt-shared state"
        );
        let _release = crate::utilities::defer(|| self.borrowed.store(false, Ordering::Release));
        // SAFETY: the critical section excludes every other context, and the `borrowed` flag
        // excludes re-entrant access from this one, so this is the only reference to the data.
        f(unsafe { &mut *self.data.get() })
    }

    /// Returns a mutable reference to the underlying data.
    ///
    /// This is safe because we have `&mut self`, so no other context can have access to the data.
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::platform::mock::MockPlatform;

    #[test]
    fn nested_sections_unmask_once() {
        let platform = MockPlatform::new();
        let outer = CriticalSection::enter(platform);
        let inner = CriticalSection::enter(platform);
        drop(inner);
        assert_eq!(platform.irq_mask_count(), 1);
        drop(outer);
        let _again = CriticalSection::enter(platform);
        assert_eq!(platform.irq_mask_count(), 2);
    }

    #[test]
    fn cell_access_excludes_other_threads() {
        let platform = MockPlatform::new();
        let cell: IrqCell<MockPlatform, u32> = IrqCell::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    for _ in 0..1000 {
                        let cs = CriticalSection::enter(platform);
                        cell.with(&cs, |v| {
                            let old = *v;
                            std::thread::yield_now();
                            *v = old + 1;
                        });
                    }
                });
            }
        });
        let cs = CriticalSection::enter(platform);
        assert_eq!(cell.with(&cs, |v| *v), 4000);
    }

    #[test]
    #[should_panic(expected = "re-entrant access")]
    fn reentrant_access_panics() {
        let platform = MockPlatform::new();
        let cell: IrqCell<MockPlatform, u32> = IrqCell::new(0);
        let cs = CriticalSection::enter(platform);
        cell.with(&cs, |_| cell.with(&cs, |_| ()));
    }
}
