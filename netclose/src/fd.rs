// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Socket descriptors

use alloc::vec::Vec;

use bitflags::bitflags;

use crate::net::conn::ConnectionId;

/// Maximum number of sockets that can ever be open at once
pub(crate) const MAX_NUMBER_OF_SOCKETS: usize = 1024;

/// A handle to a socket.
///
/// Unlike an owned descriptor, this is a plain (copyable) number: it may be stale, or never have
/// been valid at all. Every operation re-validates it against the descriptor table, failing with an
/// "invalid descriptor" error if it does not resolve.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct SocketFd {
    raw: u32,
}

impl SocketFd {
    /// Produce a handle from its raw integer value.
    pub const fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    /// The raw integer value of the handle.
    pub const fn as_raw(self) -> u32 {
        self.raw
    }

    fn as_usize(self) -> usize {
        // `u32` always fits on the targets we support.
        self.raw as usize
    }
}

impl core::fmt::Display for SocketFd {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// The kind of a socket
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[non_exhaustive]
pub enum SocketKind {
    /// `SOCK_STREAM`: connection-oriented, backed by a TCP connection record.
    Stream,
    /// `SOCK_DGRAM`: connectionless, backed by a UDP connection record.
    Datagram,
    /// `SOCK_RAW`: no connection record. The stack does not know how to tear these down, thus
    /// closing them fails.
    Raw,
}

bitflags! {
    /// Socket state flags
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct SocketFlags: u8 {
        /// The socket is accepting inbound connections.
        const LISTENING = 0x02;
        /// The socket has a live connection to a peer.
        const CONNECTED = 0x04;
    }
}

/// A single socket, as stored in the [`Descriptors`] table.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Socket {
    pub(crate) kind: SocketKind,
    pub(crate) flags: SocketFlags,
    /// The protocol-specific connection record; `None` only for [`SocketKind::Raw`].
    pub(crate) conn: Option<ConnectionId>,
    /// A `close` is currently tearing this socket down.
    pub(crate) closing: bool,
}

impl Socket {
    pub(crate) fn new(kind: SocketKind, conn: Option<ConnectionId>) -> Self {
        Self {
            kind,
            flags: SocketFlags::empty(),
            conn,
            closing: false,
        }
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.flags.contains(SocketFlags::CONNECTED)
    }
}

/// Storage of socket descriptors and their sockets.
pub(crate) struct Descriptors {
    entries: Vec<Option<Socket>>,
}

impl Descriptors {
    /// Create a new empty descriptor table.
    pub(crate) const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Insert `socket` into the lowest free slot of the table, returning its handle.
    ///
    /// Returns `None` if the table is full.
    pub(crate) fn insert(&mut self, socket: Socket) -> Option<SocketFd> {
        let idx = match self.entries.iter().position(Option::is_none) {
            Some(idx) => idx,
            None if self.entries.len() < MAX_NUMBER_OF_SOCKETS => {
                self.entries.push(None);
                self.entries.len() - 1
            }
            None => return None,
        };
        let old = self.entries[idx].replace(socket);
        assert!(old.is_none());
        Some(SocketFd::from_raw(u32::try_from(idx).ok()?))
    }

    /// The socket at `fd`, if `fd` refers to an open socket.
    ///
    /// Sockets that are in the middle of being closed do not resolve.
    pub(crate) fn resolve(&self, fd: SocketFd) -> Option<&Socket> {
        self.entries
            .get(fd.as_usize())?
            .as_ref()
            .filter(|socket| !socket.closing)
    }

    /// Mutable variant of [`Self::resolve`].
    pub(crate) fn resolve_mut(&mut self, fd: SocketFd) -> Option<&mut Socket> {
        self.entries
            .get_mut(fd.as_usize())?
            .as_mut()
            .filter(|socket| !socket.closing)
    }

    /// Read the connection state of the socket at `fd`, including a socket that is being closed.
    pub(crate) fn flags(&self, fd: SocketFd) -> Option<SocketFlags> {
        self.entries
            .get(fd.as_usize())?
            .as_ref()
            .map(|socket| socket.flags)
    }

    /// Clear `flags` on the socket at `fd`, including a socket that is being closed.
    pub(crate) fn clear_flags(&mut self, fd: SocketFd, flags: SocketFlags) {
        if let Some(socket) = self.entries.get_mut(fd.as_usize()).and_then(Option::as_mut) {
            socket.flags.remove(flags);
        }
    }

    /// Releases the entry at `fd`, making the handle invalid (and the slot reusable).
    ///
    /// # Panics
    ///
    /// Panics if there is no socket at `fd`.
    pub(crate) fn release(&mut self, fd: SocketFd) -> Socket {
        let Some(old) = self.entries.get_mut(fd.as_usize()).and_then(Option::take) else {
            unreachable!("releasing a descriptor that is not in the table")
        };
        old
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_reuses_lowest_free_slot() {
        let mut descriptors = Descriptors::new();
        let a = descriptors.insert(Socket::new(SocketKind::Raw, None)).unwrap();
        let b = descriptors.insert(Socket::new(SocketKind::Raw, None)).unwrap();
        assert_eq!((a.as_raw(), b.as_raw()), (0, 1));
        descriptors.release(a);
        let c = descriptors.insert(Socket::new(SocketKind::Raw, None)).unwrap();
        assert_eq!(c, a);
        assert!(descriptors.resolve(b).is_some());
    }

    #[test]
    fn closing_sockets_do_not_resolve() {
        let mut descriptors = Descriptors::new();
        let fd = descriptors.insert(Socket::new(SocketKind::Raw, None)).unwrap();
        descriptors.resolve_mut(fd).unwrap().closing = true;
        assert!(descriptors.resolve(fd).is_none());
        assert!(descriptors.flags(fd).is_some());
        assert!(descriptors.resolve(SocketFd::from_raw(1000)).is_none());
    }

    #[test]
    fn flags_can_be_cleared_while_closing() {
        let mut descriptors = Descriptors::new();
        let fd = descriptors.insert(Socket::new(SocketKind::Raw, None)).unwrap();
        let socket = descriptors.resolve_mut(fd).unwrap();
        socket.flags = SocketFlags::CONNECTED | SocketFlags::LISTENING;
        socket.closing = true;
        descriptors.clear_flags(fd, SocketFlags::CONNECTED);
        assert_eq!(descriptors.flags(fd), Some(SocketFlags::LISTENING));
        descriptors.clear_flags(SocketFd::from_raw(1000), SocketFlags::CONNECTED);
    }

    #[test]
    fn table_is_bounded() {
        let mut descriptors = Descriptors::new();
        for _ in 0..MAX_NUMBER_OF_SOCKETS {
            assert!(descriptors.insert(Socket::new(SocketKind::Raw, None)).is_some());
        }
        assert!(descriptors.insert(Socket::new(SocketKind::Raw, None)).is_none());
    }
}
