// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Crate-internal utilities

/// Capacity of a single debug log line, in bytes. Longer lines are truncated.
pub(crate) const LOG_LINE_CAPACITY: usize = 256;

/// A `println!` style macro that uses `debug_log_print` but gives a nicer interface.
///
/// Formats into a fixed-size buffer, so that it can be used from event context without allocating.
/// A message that does not fit is truncated rather than causing a panic.
macro_rules! debug_log_println {
    ($platform:expr, $($tt:tt)*) => {{
        use core::fmt::Write as _;
        let mut t: arrayvec::ArrayString<{ $crate::utilities::LOG_LINE_CAPACITY }> =
            arrayvec::ArrayString::new();
        let _ = writeln!(t, $($tt)*);
        $crate::platform::DebugLogProvider::debug_log_print($platform, &t);
    }};
}
pub(crate) use debug_log_println;

/// An object that will run a closure when it goes out of scope.
pub(crate) struct Defer<F: FnOnce()>(Option<F>);

impl<F: FnOnce()> Drop for Defer<F> {
    fn drop(&mut self) {
        if let Some(f) = self.0.take() {
            f();
        }
    }
}

/// Returns an object that will run `f` when it goes out of scope, including during unwinding.
#[must_use = "Must be bound to a variable to defer until scope end; variable name cannot be just '_' (but '_foo' is fine)."]
pub(crate) fn defer(f: impl FnOnce()) -> Defer<impl FnOnce()> {
    Defer(Some(f))
}
