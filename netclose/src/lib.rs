// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! # netclose
//!
//! > Graceful close for the sockets of a small, event-driven TCP/IP stack.
//!
//! The stack is shared between two contexts: the _task_ context, in which applications create and
//! close sockets, and the _event_ context (e.g., an interrupt handler), in which the protocol engine
//! reports what happens on the wire. The two only meet through state guarded by a
//! [`sync::CriticalSection`], and through the one thing a task may block on, a
//! [`sync::BinarySemaphore`].
//!
//! To use this crate, you must provide a type that implements the [`platform::Provider`] trait;
//! then, one obtains the socket layer via [`net::Network`]. Closing a connected stream socket with
//! [`net::Network::close`] blocks until the peer has taken part in tearing the connection down.

#![no_std]

extern crate alloc;

pub mod errno;
pub mod fd;
pub mod net;
pub mod platform;
pub mod sync;

mod utilities;
