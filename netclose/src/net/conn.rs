// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Protocol-specific connection records, and the registry holding them.
//!
//! Connection records belong to the stack; sockets only refer to them by [`ConnectionId`]. All
//! access goes through the [`IrqCell`](crate::sync::IrqCell) in [`Network`](super::Network), since
//! the protocol engine also reaches them from event context.

use alloc::sync::Arc;
use alloc::vec::Vec;

use bitflags::bitflags;
use smoltcp::wire::IpEndpoint;

use crate::fd::SocketFd;
use crate::sync::RawSyncPrimitivesProvider;

use super::close::CloseWait;

/// An index into the TCP or UDP half of the [`ConnectionTable`]; which half is determined by the
/// kind of the socket that refers to it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct ConnectionId(u32);

impl core::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

bitflags! {
    /// Events the protocol engine reports to a TCP connection's observer, and the responses the
    /// observer hands back.
    ///
    /// On the way back out of an observer, [`CLOSE`](Self::CLOSE) and [`ABORT`](Self::ABORT) are
    /// requests to the engine (close, or reset, the connection on its next pass) and
    /// [`NEWDATA`](Self::NEWDATA) means the incoming payload has been taken.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct TcpEvents: u8 {
        /// Previously sent data has been acknowledged.
        const ACKDATA   = 0x01;
        /// New data has arrived.
        const NEWDATA   = 0x02;
        /// Data needs to be retransmitted.
        const REXMIT    = 0x04;
        /// Periodic poll of an otherwise idle connection.
        const POLL      = 0x08;
        /// The remote closed the connection (or, outgoing: close it).
        const CLOSE     = 0x10;
        /// The remote aborted the connection (or, outgoing: abort it).
        const ABORT     = 0x20;
        /// The connection has been established.
        const CONNECTED = 0x40;
        /// The connection timed out.
        const TIMEDOUT  = 0x80;

        /// The events that end a connection's life from the remote side.
        const TERMINAL = Self::CLOSE.bits() | Self::ABORT.bits();
        /// The events after which there is no connection to the peer anymore.
        const DISCONNECTED = Self::TERMINAL.bits() | Self::TIMEDOUT.bits();
    }
}

/// The inbound frame currently held by the device, as far as event delivery is concerned.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RxFrame {
    len: usize,
}

impl RxFrame {
    /// A frame carrying `len` bytes of payload for the connection.
    pub const fn new(len: usize) -> Self {
        Self { len }
    }

    /// Payload bytes still to be delivered to the application.
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether there is no payload (left) to deliver.
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Drop the payload, so that it never reaches the application.
    pub fn discard(&mut self) {
        self.len = 0;
    }
}

/// The handler slot of a TCP connection: whoever is currently interested in the connection's
/// events.
///
/// Runs in event context, with the connection record borrowed exclusively, so it must neither
/// block nor reach back into the [`Network`](super::Network).
pub trait TcpEventObserver<Platform: RawSyncPrimitivesProvider>: Send + Sync {
    /// Called when events of interest occur; returns the flags to hand back to the engine.
    fn on_events(
        &self,
        conn: &mut TcpConnection<Platform>,
        frame: &mut RxFrame,
        events: TcpEvents,
    ) -> TcpEvents;
}

/// A TCP connection record.
pub struct TcpConnection<Platform: RawSyncPrimitivesProvider> {
    /// The socket this record backs
    pub(crate) owner: Option<SocketFd>,
    /// The local port, once bound
    pub(crate) local_port: Option<u16>,
    /// The peer, once connected
    pub(crate) remote: Option<IpEndpoint>,
    /// Which events the observer wants to hear about
    pub(crate) event_mask: TcpEvents,
    /// The close that is currently waiting on this connection, if any
    pub(crate) close_wait: Option<Arc<CloseWait<Platform>>>,
    /// The handler for events on this connection
    pub(crate) observer: Option<Arc<dyn TcpEventObserver<Platform>>>,
}

impl<Platform: RawSyncPrimitivesProvider> TcpConnection<Platform> {
    pub(crate) const fn new() -> Self {
        Self {
            owner: None,
            local_port: None,
            remote: None,
            event_mask: TcpEvents::empty(),
            close_wait: None,
            observer: None,
        }
    }

    /// Whether nothing is listening for events on this connection anymore.
    pub(crate) fn is_quiescent(&self) -> bool {
        self.event_mask.is_empty() && self.close_wait.is_none() && self.observer.is_none()
    }

    /// Deliver `events` to the observer, if it asked for any of them.
    fn deliver(&mut self, frame: &mut RxFrame, events: TcpEvents) -> TcpEvents {
        if !self.event_mask.intersects(events) {
            return events;
        }
        let Some(observer) = self.observer.clone() else {
            return events;
        };
        observer.on_events(self, frame, events)
    }
}

/// A UDP connection record.
#[derive(Default)]
pub(crate) struct UdpConnection {
    /// The default peer, once connected
    pub(crate) remote: Option<IpEndpoint>,
}

/// All connection records, plus the set of ports that accept inbound TCP connections.
pub(crate) struct ConnectionTable<Platform: RawSyncPrimitivesProvider> {
    tcp: Vec<Option<TcpConnection<Platform>>>,
    udp: Vec<Option<UdpConnection>>,
    listen_ports: Vec<u16>,
}

fn alloc_slot<T>(slots: &mut Vec<Option<T>>, record: T) -> ConnectionId {
    let idx = slots.iter().position(Option::is_none).unwrap_or_else(|| {
        slots.push(None);
        slots.len() - 1
    });
    slots[idx] = Some(record);
    // The descriptor table bounds how many records can exist at once.
    ConnectionId(u32::try_from(idx).unwrap_or_else(|_| unreachable!()))
}

fn slot_mut<T>(slots: &mut [Option<T>], id: ConnectionId) -> Option<&mut T> {
    slots.get_mut(usize::try_from(id.0).ok()?)?.as_mut()
}

impl<Platform: RawSyncPrimitivesProvider> ConnectionTable<Platform> {
    pub(crate) const fn new() -> Self {
        Self {
            tcp: Vec::new(),
            udp: Vec::new(),
            listen_ports: Vec::new(),
        }
    }

    pub(crate) fn alloc_tcp(&mut self) -> ConnectionId {
        alloc_slot(&mut self.tcp, TcpConnection::new())
    }

    pub(crate) fn alloc_udp(&mut self) -> ConnectionId {
        alloc_slot(&mut self.udp, UdpConnection::default())
    }

    pub(crate) fn tcp_mut(&mut self, id: ConnectionId) -> Option<&mut TcpConnection<Platform>> {
        slot_mut(&mut self.tcp, id)
    }

    pub(crate) fn udp_mut(&mut self, id: ConnectionId) -> Option<&mut UdpConnection> {
        slot_mut(&mut self.udp, id)
    }

    /// Release the TCP record at `id`.
    ///
    /// The record must no longer have anyone waiting on, or observing, it.
    pub(crate) fn free_tcp(&mut self, id: ConnectionId) {
        let Some(conn) = usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.tcp.get_mut(idx))
            .and_then(Option::take)
        else {
            unreachable!("freeing a TCP connection that is not allocated")
        };
        assert!(conn.is_quiescent(), "freeing a TCP connection that is still observed");
    }

    /// Release the UDP record at `id`.
    pub(crate) fn free_udp(&mut self, id: ConnectionId) {
        let freed = usize::try_from(id.0)
            .ok()
            .and_then(|idx| self.udp.get_mut(idx))
            .and_then(Option::take);
        assert!(freed.is_some(), "freeing a UDP connection that is not allocated");
    }

    /// Start accepting inbound connections on `port` for the connection at `id`.
    pub(crate) fn listen(&mut self, id: ConnectionId, port: u16) -> bool {
        if self.listen_ports.contains(&port) {
            return false;
        }
        let Some(conn) = self.tcp_mut(id) else {
            return false;
        };
        conn.local_port = Some(port);
        self.listen_ports.push(port);
        true
    }

    /// Stop accepting inbound connections for the connection at `id`.
    pub(crate) fn unlisten(&mut self, id: ConnectionId) {
        if let Some(port) = self.tcp_mut(id).and_then(|conn| conn.local_port) {
            self.listen_ports.retain(|&p| p != port);
        }
    }

    pub(crate) fn is_listening(&self, port: u16) -> bool {
        self.listen_ports.contains(&port)
    }

    /// Hand `events` to the TCP connection at `id`, returning the flags for the engine to act on,
    /// along with the socket that lost its connection, if these events ended it outside of a close.
    ///
    /// Events for connections that no longer exist are returned unchanged.
    pub(crate) fn dispatch_tcp(
        &mut self,
        id: ConnectionId,
        frame: &mut RxFrame,
        events: TcpEvents,
    ) -> (TcpEvents, Option<SocketFd>) {
        let Some(conn) = self.tcp_mut(id) else {
            return (events, None);
        };
        // A pending close learns about the end of the connection through its notifier instead.
        let lost = if conn.close_wait.is_none() && events.intersects(TcpEvents::DISCONNECTED) {
            conn.owner
        } else {
            None
        };
        (conn.deliver(frame, events), lost)
    }

    #[cfg(test)]
    pub(crate) fn tcp_count(&self) -> usize {
        self.tcp.iter().filter(|c| c.is_some()).count()
    }

    #[cfg(test)]
    pub(crate) fn udp_count(&self) -> usize {
        self.udp.iter().filter(|c| c.is_some()).count()
    }
}
