// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! The underlying platform upon which the network stack resides.
//!
//! The top-level trait that denotes something is a valid platform is [`Provider`]. This trait is
//! merely a collection of subtraits that could be composed independently from various other crates
//! that implement them upon various types.
//!
//! The stack assumes two contexts of execution on the platform: _task context_, where ordinary
//! callers (e.g., a `close`) run and are allowed to block, and _event context_ (an interrupt
//! handler, or a dedicated driver thread), where the protocol engine delivers events for
//! connections. The [`InterruptMaskProvider`] is what separates the two.

#[cfg(test)]
pub(crate) mod mock;

use smoltcp::wire::IpAddress;

/// A provider of a platform upon which the network stack can execute.
///
/// Ideally, a [`Provider`] is zero-sized, and only exists to provide access to functionality
/// provided by it. _However_, most of the provided APIs within the provider act upon an `&self` to
/// allow storage of any useful "globals" within it necessary.
pub trait Provider:
    RawMutexProvider + InterruptMaskProvider + LinkOutputProvider + DebugLogProvider + Sync + 'static
{
}

/// A provider of raw mutexes
pub trait RawMutexProvider {
    type RawMutex: RawMutex;
}

/// A raw mutex/lock API; expected to roughly match (or even be implemented using) a Linux futex.
pub trait RawMutex: Send + Sync {
    /// An initial value for a raw mutex; its underlying atomic is zero.
    const INIT: Self;

    /// Returns a reference to the underlying atomic value
    fn underlying_atomic(&self) -> &core::sync::atomic::AtomicU32;

    /// Wake up `n` threads blocked on on this raw mutex.
    ///
    /// Returns the number of waiters that were woken up.
    fn wake_many(&self, n: usize) -> usize;

    /// Wake up one thread blocked on this raw mutex.
    ///
    /// Returns true if this actually woke up such a thread, or false if no thread was waiting on
    /// this raw mutex.
    fn wake_one(&self) -> bool {
        self.wake_many(1) > 0
    }

    /// If the underlying value is `val`, block until a wake operation wakes us up.
    ///
    /// Spurious wake-ups are permitted; callers re-check their condition.
    fn block(&self, val: u32) -> Result<(), ImmediatelyWokenUp>;
}

/// A zero-sized struct indicating that the block was immediately unblocked (due to non-matching
/// value).
pub struct ImmediatelyWokenUp;

/// Masking of the event context.
///
/// On a single-core embedded target this is typically "disable interrupts, returning the previous
/// interrupt state"; on a hosted platform that runs its driver on a separate thread, it can be an
/// exclusive (re-entrant for its holder) lock that the driver thread also takes before delivering
/// any event.
///
/// # Safety
///
/// Between a [`mask_interrupts`](Self::mask_interrupts) call that returns a state and the matching
/// [`restore_interrupts`](Self::restore_interrupts), no other context of execution (neither the
/// event context, nor any other task) may run code that has also masked interrupts. Nested calls
/// from the holder itself must succeed immediately. Crate-internal shared state is accessed without
/// further locking based on this guarantee.
pub unsafe trait InterruptMaskProvider {
    /// The saved interrupt state, handed back on restore.
    type IrqState: Copy;

    /// Mask the event context, returning the previous state.
    fn mask_interrupts(&self) -> Self::IrqState;

    /// Restore the interrupt state saved by the matching [`mask_interrupts`](Self::mask_interrupts).
    ///
    /// # Safety
    ///
    /// `state` must have been returned by the most recent unmatched call to `mask_interrupts` made
    /// by the current context of execution.
    unsafe fn restore_interrupts(&self, state: Self::IrqState);
}

/// The link layer, as seen by the connection-level code.
pub trait LinkOutputProvider {
    /// Hint to the device driver that there is data (possibly only protocol control data, such as
    /// a FIN) waiting to be sent towards `destination`.
    ///
    /// This is best-effort: the driver is expected to poll the stack for output on its next
    /// opportunity, and must not call back into the stack from within this call.
    fn notify_output_pending(&self, destination: IpAddress);
}

/// An interface to dumping debug output for tracing purposes.
pub trait DebugLogProvider {
    /// Print `msg` to the debug log
    ///
    /// Newlines are *not* automatically appended to `msg`, thus the caller must make sure to
    /// include newlines if necessary.
    ///
    /// This may be invoked from event context, so implementations must not block for long.
    fn debug_log_print(&self, msg: &str);
}
