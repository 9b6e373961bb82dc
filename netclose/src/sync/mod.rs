// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Synchronization between task context and event context
//!
//! Two kinds of primitives live here:
//!
//! - [`CriticalSection`] and [`IrqCell`]: state that both contexts touch (connection records, the
//!   socket table) is kept in an [`IrqCell`], which can only be accessed while holding a
//!   [`CriticalSection`], i.e., while the event context is masked via the
//!   [`platform`](crate::platform).
//! - [`BinarySemaphore`]: the one thing a task is ever allowed to _block_ on, built upon the
//!   platform's futex-like [`RawMutex`](crate::platform::RawMutex). Blocking must never happen
//!   inside a critical section, otherwise the event that would release the task can never run.

use crate::platform;

mod irq;
mod semaphore;

pub use irq::{CriticalSection, IrqCell};
pub use semaphore::BinarySemaphore;

/// A convenience name for specific requirements from the platform
pub trait RawSyncPrimitivesProvider:
    platform::RawMutexProvider + platform::InterruptMaskProvider + Sync + 'static
{
}
impl<Platform> RawSyncPrimitivesProvider for Platform where
    Platform: platform::RawMutexProvider + platform::InterruptMaskProvider + Sync + 'static
{
}
