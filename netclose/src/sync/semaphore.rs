// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Single-permit semaphores

use core::sync::atomic::Ordering::{Acquire, Relaxed, Release};

use crate::platform::RawMutex as _;

use super::RawSyncPrimitivesProvider;

/// A semaphore holding at most one permit, initially unavailable.
///
/// The underlying atomic of the raw mutex is the permit:
///
/// - 0: no permit posted
/// - 1: permit posted, not yet taken
///
/// A [`post`](Self::post) that happens before the matching [`wait`](Self::wait) is not lost; the
/// wait simply returns immediately.
pub struct BinarySemaphore<Platform: RawSyncPrimitivesProvider> {
    raw: Platform::RawMutex,
}

impl<Platform: RawSyncPrimitivesProvider> Default for BinarySemaphore<Platform> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Platform: RawSyncPrimitivesProvider> BinarySemaphore<Platform> {
    /// A new semaphore with no permit.
    #[inline]
    pub const fn new() -> Self {
        Self {
            raw: <Platform::RawMutex as crate::platform::RawMutex>::INIT,
        }
    }

    /// Make the permit available, waking up a waiter if there is one.
    ///
    /// Never blocks, so it is safe to call from event context.
    pub fn post(&self) {
        self.raw.underlying_atomic().store(1, Release);
        self.raw.wake_one();
    }

    /// Take the permit if it is available, without blocking. Returns `true` if the permit was
    /// taken.
    #[must_use]
    pub fn try_wait(&self) -> bool {
        self.raw
            .underlying_atomic()
            .compare_exchange(1, 0, Acquire, Relaxed)
            .is_ok()
    }

    /// Blocks the current thread until the permit is available, then takes it.
    pub fn wait(&self) {
        while !self.try_wait() {
            // Only sleeps if the permit is (still) missing; a post in between the check above and
            // this call makes the block return immediately.
            let _ = self.raw.block(0);
        }
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use core::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::platform::mock::MockPlatform;

    #[test]
    fn post_before_wait_is_not_lost() {
        let sem: BinarySemaphore<MockPlatform> = BinarySemaphore::new();
        sem.post();
        sem.wait();
        assert!(!sem.try_wait());
    }

    #[test]
    fn posts_do_not_accumulate() {
        let sem: BinarySemaphore<MockPlatform> = BinarySemaphore::new();
        sem.post();
        sem.post();
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
    }

    #[test]
    fn wait_blocks_until_posted_from_another_thread() {
        let sem: BinarySemaphore<MockPlatform> = BinarySemaphore::new();
        let released = AtomicBool::new(false);
        std::thread::scope(|s| {
            let waiter = s.spawn(|| {
                sem.wait();
                assert!(released.load(Ordering::SeqCst));
            });
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert!(!waiter.is_finished());
            released.store(true, Ordering::SeqCst);
            sem.post();
        });
    }
}
