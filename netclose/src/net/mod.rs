// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Network-related functionality

use smoltcp::wire::IpEndpoint;

use crate::fd::{Descriptors, Socket, SocketFd, SocketFlags, SocketKind};
use crate::platform;
use crate::sync::{CriticalSection, IrqCell};
use crate::utilities::debug_log_println;

mod close;
pub mod conn;
pub mod errors;


use conn::{ConnectionId, ConnectionTable, RxFrame, TcpEvents};
use errors::{EstablishError, ListenError, SocketError};

/// The `Network` provides access to the socket layer of the stack.
///
/// A `Network` is parametric in the platform it runs on. It is shared between the task context
/// (sockets being created, closed, ...) and the event context, where the protocol engine reports
/// what happens on the wire via [`dispatch_tcp_event`](Self::dispatch_tcp_event).
pub struct Network<Platform: platform::Provider> {
    platform: &'static Platform,
    /// The set of sockets; the position/index corresponds to the raw value of the [`SocketFd`]
    descriptors: IrqCell<Platform, Descriptors>,
    /// The protocol-specific connection records backing the sockets
    connections: IrqCell<Platform, ConnectionTable<Platform>>,
}

impl<Platform: platform::Provider> Network<Platform> {
    /// Construct a new `Network` instance
    ///
    /// This function is expected to only be invoked once per platform, as an initialization step,
    /// and the created `Network` handle is expected to be shared across all usage over the
    /// system.
    pub fn new(platform: &'static Platform) -> Self {
        Self {
            platform,
            descriptors: IrqCell::new(Descriptors::new()),
            connections: IrqCell::new(ConnectionTable::new()),
        }
    }

    fn with_descriptors<R>(&self, f: impl FnOnce(&mut Descriptors) -> R) -> R {
        let cs = CriticalSection::enter(self.platform);
        self.descriptors.with(&cs, f)
    }

    fn with_connections<R>(&self, f: impl FnOnce(&mut ConnectionTable<Platform>) -> R) -> R {
        let cs = CriticalSection::enter(self.platform);
        self.connections.with(&cs, f)
    }

    /// Creates a socket of the given `kind`, along with its connection record.
    pub fn socket(&self, kind: SocketKind) -> Result<SocketFd, SocketError> {
        let cs = CriticalSection::enter(self.platform);
        let conn = self.connections.with(&cs, |table| match kind {
            SocketKind::Stream => Some(table.alloc_tcp()),
            SocketKind::Datagram => Some(table.alloc_udp()),
            SocketKind::Raw => None,
        });
        let fd = self
            .descriptors
            .with(&cs, |descriptors| descriptors.insert(Socket::new(kind, conn)));
        match fd {
            Some(fd) => {
                if let (SocketKind::Stream, Some(conn)) = (kind, conn) {
                    self.connections.with(&cs, |table| {
                        if let Some(record) = table.tcp_mut(conn) {
                            record.owner = Some(fd);
                        }
                    });
                }
                Ok(fd)
            }
            None => {
                // Out of descriptors: give back the record we just took.
                self.connections.with(&cs, |table| match (kind, conn) {
                    (SocketKind::Stream, Some(conn)) => table.free_tcp(conn),
                    (SocketKind::Datagram, Some(conn)) => table.free_udp(conn),
                    _ => {}
                });
                Err(SocketError::TooManySockets)
            }
        }
    }

    /// The connection record backing the socket at `fd`, if any.
    pub fn connection(&self, fd: SocketFd) -> Option<ConnectionId> {
        self.with_descriptors(|descriptors| descriptors.resolve(fd)?.conn)
    }

    /// Start accepting inbound connections on `port` for the stream socket at `fd`.
    pub fn listen(&self, fd: SocketFd, port: u16) -> Result<(), ListenError> {
        let cs = CriticalSection::enter(self.platform);
        self.descriptors.with(&cs, |descriptors| {
            let socket = descriptors.resolve_mut(fd).ok_or(ListenError::InvalidFd)?;
            let (SocketKind::Stream, Some(conn)) = (socket.kind, socket.conn) else {
                return Err(ListenError::NotTcpSocket);
            };
            if socket.flags.contains(SocketFlags::LISTENING) {
                return Err(ListenError::AlreadyListening);
            }
            if !self.connections.with(&cs, |table| table.listen(conn, port)) {
                return Err(ListenError::PortAlreadyInUse(port));
            }
            socket.flags |= SocketFlags::LISTENING;
            Ok(())
        })
    }

    /// Whether some stream socket is accepting inbound connections on `port`.
    pub fn is_listening(&self, port: u16) -> bool {
        self.with_connections(|table| table.is_listening(port))
    }

    /// Record that the socket at `fd` is now connected to `remote`.
    ///
    /// Invoked by the protocol engine once a connection is established (for stream sockets), or
    /// once a default peer has been set (for datagram sockets). May be called from either context.
    pub fn establish(&self, fd: SocketFd, remote: IpEndpoint) -> Result<(), EstablishError> {
        let cs = CriticalSection::enter(self.platform);
        self.descriptors.with(&cs, |descriptors| {
            let socket = descriptors
                .resolve_mut(fd)
                .ok_or(EstablishError::InvalidFd)?;
            if socket.is_connected() {
                return Err(EstablishError::AlreadyConnected);
            }
            let Some(conn) = socket.conn else {
                return Err(EstablishError::NoConnectionRecord);
            };
            self.connections.with(&cs, |table| {
                let slot = match socket.kind {
                    SocketKind::Stream => table.tcp_mut(conn).map(|c| &mut c.remote),
                    SocketKind::Datagram => table.udp_mut(conn).map(|c| &mut c.remote),
                    SocketKind::Raw => None,
                };
                if let Some(slot) = slot {
                    *slot = Some(remote);
                }
            });
            socket.flags |= SocketFlags::CONNECTED;
            Ok(())
        })
    }

    /// Report `events` on the TCP connection `conn` to whoever is interested in them.
    ///
    /// This is the protocol engine's entry point, and is meant to be invoked from event context.
    /// `frame` describes the payload that arrived with the events (if any); an observer may
    /// consume or discard it. Returns the flags the engine should act upon, e.g., with
    /// [`TcpEvents::CLOSE`] set if the connection should be closed on the next pass.
    ///
    /// If the events end the connection (see [`TcpEvents::DISCONNECTED`]) while no close is
    /// waiting on it, the owning socket stops being connected, so that a later close does not wait
    /// for the peer again.
    pub fn dispatch_tcp_event(
        &self,
        conn: ConnectionId,
        events: TcpEvents,
        frame: &mut RxFrame,
    ) -> TcpEvents {
        let cs = CriticalSection::enter(self.platform);
        let (out, lost) = self
            .connections
            .with(&cs, |table| table.dispatch_tcp(conn, frame, events));
        if let Some(fd) = lost {
            self.descriptors
                .with(&cs, |descriptors| descriptors.clear_flags(fd, SocketFlags::CONNECTED));
            debug_log_println!(
                self.platform,
                "fd {fd}: connection {conn} lost, flags {:#04x}",
                events.bits()
            );
        }
        out
    }
}
