// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Crate-local test-only mock platform for easily running tests in the various modules.

// Pull in `std` for the test-only world, so that we have a nicer/easier time writing tests
extern crate std;

use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::string::String;
use std::sync::{Condvar, Mutex};
use std::thread::ThreadId;
use std::vec::Vec;

use super::*;

/// A mock platform that is a [`platform::Provider`](Provider), useful purely for testing within
/// this crate.
///
/// Some great features of this mock platform are:
///
/// - The "interrupt mask" is an owner-tracked lock, so a separate test thread can play the role of
///   the event context, and it will properly be kept out while a task holds the mask
/// - Every link-layer output notification is recorded (see [`Self::output_notifications`])
/// - Debug output goes to stderr, and is kept around (see [`Self::debug_log`])
pub(crate) struct MockPlatform {
    irq_owner: Mutex<Option<ThreadId>>,
    irq_mask_count: AtomicUsize,
    pub(crate) output_notifications: Mutex<Vec<IpAddress>>,
    pub(crate) debug_log: Mutex<Vec<String>>,
}

impl MockPlatform {
    pub(crate) fn new() -> &'static Self {
        //  Since this is used entirely for tests, leaking a bit of memory is perfectly fine in
        //  order to give ourselves a statically lived platform easily.
        alloc::boxed::Box::leak(alloc::boxed::Box::new(MockPlatform {
            irq_owner: Mutex::new(None),
            irq_mask_count: AtomicUsize::new(0),
            output_notifications: Mutex::new(Vec::new()),
            debug_log: Mutex::new(Vec::new()),
        }))
    }

    /// Number of times the interrupt mask has been freshly taken (nested re-masks do not count).
    pub(crate) fn irq_mask_count(&self) -> usize {
        self.irq_mask_count.load(Ordering::SeqCst)
    }

    /// Whether any logged line contains `needle`.
    pub(crate) fn logged(&self, needle: &str) -> bool {
        self.debug_log
            .lock()
            .unwrap()
            .iter()
            .any(|line| line.contains(needle))
    }
}

impl Provider for MockPlatform {}

/// A futex-alike built from `std` primitives.
///
/// Every wake bumps a generation counter; a blocked thread returns once it observes a generation
/// newer than the one it started blocking at.
pub(crate) struct MockRawMutex {
    inner: AtomicU32,
    internal_state: Mutex<MockRawMutexInternalState>,
    wakeup: Condvar,
}

struct MockRawMutexInternalState {
    generation: u64,
    number_blocked: usize,
}

impl RawMutex for MockRawMutex {
    const INIT: Self = Self {
        inner: AtomicU32::new(0),
        internal_state: Mutex::new(MockRawMutexInternalState {
            generation: 0,
            number_blocked: 0,
        }),
        wakeup: Condvar::new(),
    };

    fn underlying_atomic(&self) -> &AtomicU32 {
        &self.inner
    }

    fn wake_many(&self, n: usize) -> usize {
        let mut internal_state = self.internal_state.lock().unwrap();
        let woken = internal_state.number_blocked.min(n);
        internal_state.generation += 1;
        drop(internal_state);
        // Waking more than asked for is fine: futex users must tolerate spurious wake-ups.
        self.wakeup.notify_all();
        woken
    }

    fn block(&self, val: u32) -> Result<(), ImmediatelyWokenUp> {
        // The value check happens with the internal state locked, so that a waker that changes the
        // value and then wakes cannot slip in between the check and the wait.
        let mut internal_state = self.internal_state.lock().unwrap();
        if self.inner.load(Ordering::SeqCst) != val {
            return Err(ImmediatelyWokenUp);
        }
        let generation = internal_state.generation;
        internal_state.number_blocked += 1;
        while internal_state.generation == generation {
            internal_state = self.wakeup.wait(internal_state).unwrap();
        }
        internal_state.number_blocked -= 1;
        Ok(())
    }
}

impl RawMutexProvider for MockPlatform {
    type RawMutex = MockRawMutex;
}

/// Whether the mock interrupt mask was already held by the masking thread.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum MockIrqState {
    Enabled,
    AlreadyMasked,
}

// SAFETY: the mask is an exclusive lock across threads (re-entrant for its owner), and every
// context of execution in tests (including the thread simulating the event context) reaches shared
// state only through it.
unsafe impl InterruptMaskProvider for MockPlatform {
    type IrqState = MockIrqState;

    fn mask_interrupts(&self) -> MockIrqState {
        let current = std::thread::current().id();
        loop {
            let mut owner = self.irq_owner.lock().unwrap();
            match *owner {
                None => {
                    *owner = Some(current);
                    self.irq_mask_count.fetch_add(1, Ordering::SeqCst);
                    return MockIrqState::Enabled;
                }
                Some(id) if id == current => return MockIrqState::AlreadyMasked,
                Some(_) => {
                    drop(owner);
                    std::thread::yield_now();
                }
            }
        }
    }

    unsafe fn restore_interrupts(&self, state: MockIrqState) {
        let mut owner = self.irq_owner.lock().unwrap();
        assert_eq!(*owner, Some(std::thread::current().id()));
        if state == MockIrqState::Enabled {
            *owner = None;
        }
    }
}

impl LinkOutputProvider for MockPlatform {
    fn notify_output_pending(&self, destination: IpAddress) {
        self.output_notifications.lock().unwrap().push(destination);
    }
}

impl DebugLogProvider for MockPlatform {
    fn debug_log_print(&self, msg: &str) {
        std::eprint!("{msg}");
        self.debug_log.lock().unwrap().push(msg.into());
    }
}
