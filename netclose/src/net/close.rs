// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Closing sockets
//!
//! Closing a stream socket that has a live connection is a hand-off between two contexts:
//!
//! - In task context, [`Network::close`] arms the connection with a [`CloseWait`] and the
//!   [`CloseNotifier`], nudges the link layer so that the FIN actually goes out, and then blocks.
//! - In event context, the protocol engine keeps reporting events for the connection. The notifier
//!   turns every non-terminal event into another close request, until the peer either closes or
//!   aborts, at which point it disarms the connection and releases the blocked task.
//!
//! ```text
//!   Connected ──arm──▶ ClosePending ──CLOSE/ABORT──▶ Closed
//!       └──────────── (not connected) ─────────────────┘
//! ```
//!
//! There is no timeout: if the peer never finishes the handshake, the close never returns.

use alloc::sync::Arc;

use crate::fd::{SocketFd, SocketFlags, SocketKind};
use crate::platform;
use crate::sync::{BinarySemaphore, CriticalSection, RawSyncPrimitivesProvider};
use crate::utilities::debug_log_println;

use super::Network;
use super::conn::{ConnectionId, RxFrame, TcpConnection, TcpEventObserver, TcpEvents};
use super::errors::CloseError;

/// The per-close state correlating a blocked `close` with the connection it is waiting on.
///
/// Attached to exactly one connection record between arming and disarming; the connection holds
/// the only other reference to it in the meantime.
pub(crate) struct CloseWait<Platform: RawSyncPrimitivesProvider> {
    /// The socket being closed
    socket: SocketFd,
    /// Posted once the connection is gone
    disconnected: BinarySemaphore<Platform>,
}

impl<Platform: RawSyncPrimitivesProvider> CloseWait<Platform> {
    fn new(socket: SocketFd) -> Self {
        Self {
            socket,
            disconnected: BinarySemaphore::new(),
        }
    }
}

/// The event handler installed on a TCP connection for the duration of a close.
pub(crate) struct CloseNotifier<Platform: platform::DebugLogProvider + 'static> {
    platform: &'static Platform,
}

impl<Platform> TcpEventObserver<Platform> for CloseNotifier<Platform>
where
    Platform: RawSyncPrimitivesProvider + platform::DebugLogProvider,
{
    fn on_events(
        &self,
        conn: &mut TcpConnection<Platform>,
        frame: &mut RxFrame,
        events: TcpEvents,
    ) -> TcpEvents {
        debug_log_println!(self.platform, "close notifier: flags {:#04x}", events.bits());

        if conn.close_wait.is_none() {
            // Not (or no longer) closing; nothing to do with us.
            return events;
        }

        if events.intersects(TcpEvents::TERMINAL) {
            // The peer has closed or aborted: the disconnection is complete. Disarm before
            // posting, so that nothing can reach the wait context once the closer resumes.
            conn.event_mask = TcpEvents::empty();
            conn.observer = None;
            if let Some(wait) = conn.close_wait.take() {
                debug_log_println!(
                    self.platform,
                    "close notifier: resuming close of fd {}",
                    wait.socket
                );
                wait.disconnected.post();
            }
            events
        } else {
            // Drop any data received in this state, and make sure the engine (re)sends the close.
            frame.discard();
            events.difference(TcpEvents::NEWDATA).union(TcpEvents::CLOSE)
        }
    }
}

/// What `close` has to tear down, once it has claimed a socket.
enum Teardown {
    Stream { conn: ConnectionId, listening: bool },
    Datagram(ConnectionId),
}

impl<Platform: platform::Provider> Network<Platform> {
    /// Close the socket at `fd`.
    ///
    /// For a stream socket, this stops it from accepting further connections and then, if it is
    /// connected, blocks until the peer has acknowledged the close (or aborted the connection),
    /// before releasing the connection record. Datagram sockets are released immediately.
    ///
    /// On success, `fd` no longer refers to anything. On failure, nothing has been changed.
    pub fn close(&self, fd: SocketFd) -> Result<(), CloseError> {
        let teardown = {
            let cs = CriticalSection::enter(self.platform);
            self.descriptors.with(&cs, |descriptors| {
                let socket = descriptors.resolve_mut(fd)?;
                let teardown = match (socket.kind, socket.conn) {
                    (SocketKind::Stream, Some(conn)) => Teardown::Stream {
                        conn,
                        listening: socket.flags.contains(SocketFlags::LISTENING),
                    },
                    (SocketKind::Datagram, Some(conn)) => Teardown::Datagram(conn),
                    _ => return None,
                };
                // Claimed: from here on, the handle no longer resolves for anyone else.
                socket.closing = true;
                Some(teardown)
            })
        };
        let Some(teardown) = teardown else {
            debug_log_println!(self.platform, "close: fd {fd} is not a closable socket");
            return Err(CloseError::InvalidFd);
        };

        match teardown {
            Teardown::Stream { conn, listening } => {
                // No longer accepting connections, before possibly waiting on the current one.
                if listening {
                    self.with_connections(|table| table.unlisten(conn));
                }
                self.disconnect(fd, conn);
                self.with_connections(|table| table.free_tcp(conn));
            }
            Teardown::Datagram(conn) => {
                self.with_connections(|table| table.free_udp(conn));
            }
        }

        self.with_descriptors(|descriptors| descriptors.release(fd));
        Ok(())
    }

    /// Break the current connection of the stream socket at `fd`, if any, blocking until it is
    /// gone.
    fn disconnect(&self, fd: SocketFd, id: ConnectionId) {
        let cs = CriticalSection::enter(self.platform);

        let connected = self.descriptors.with(&cs, |descriptors| {
            descriptors
                .flags(fd)
                .is_some_and(|flags| flags.contains(SocketFlags::CONNECTED))
        });
        if !connected {
            return;
        }

        let wait = Arc::new(CloseWait::new(fd));
        let notifier: Arc<dyn TcpEventObserver<Platform>> = Arc::new(CloseNotifier {
            platform: self.platform,
        });
        let armed = self.connections.with(&cs, |table| {
            let conn = table.tcp_mut(id)?;
            assert!(
                conn.close_wait.is_none(),
                "a second close is already waiting on this connection"
            );
            conn.event_mask = TcpEvents::NEWDATA | TcpEvents::CLOSE | TcpEvents::ABORT;
            conn.close_wait = Some(Arc::clone(&wait));
            conn.observer = Some(notifier);
            Some(conn.remote)
        });
        let Some(remote) = armed else {
            return;
        };

        debug_log_println!(
            self.platform,
            "close: fd {fd} waiting for connection {id} to disconnect"
        );
        // Make sure the driver polls us for output, so that the close actually reaches the peer
        // even when there is no application data queued.
        if let Some(remote) = remote {
            self.platform.notify_output_pending(remote.addr);
        }

        // The notifier can only ever run while we are not in the critical section.
        drop(cs);
        wait.disconnected.wait();

        let cs = CriticalSection::enter(self.platform);
        self.connections.with(&cs, |table| {
            if let Some(conn) = table.tcp_mut(id) {
                conn.event_mask = TcpEvents::empty();
                conn.observer = None;
                conn.close_wait = None;
            }
        });
        drop(cs);
        debug_log_println!(self.platform, "close: fd {fd} disconnected");
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;
    use crate::platform::mock::MockPlatform;

    fn armed(
        platform: &'static MockPlatform,
    ) -> (TcpConnection<MockPlatform>, Arc<CloseWait<MockPlatform>>) {
        let wait = Arc::new(CloseWait::new(SocketFd::from_raw(3)));
        let mut conn = TcpConnection::new();
        conn.event_mask = TcpEvents::NEWDATA | TcpEvents::CLOSE | TcpEvents::ABORT;
        conn.close_wait = Some(Arc::clone(&wait));
        conn.observer = Some(Arc::new(CloseNotifier { platform }));
        (conn, wait)
    }

    #[test]
    fn ignores_everything_without_a_pending_close() {
        let platform = MockPlatform::new();
        let notifier = CloseNotifier { platform };
        let mut conn: TcpConnection<MockPlatform> = TcpConnection::new();
        for bits in 0..=u8::MAX {
            let events = TcpEvents::from_bits_retain(bits);
            let mut frame = RxFrame::new(16);
            assert_eq!(notifier.on_events(&mut conn, &mut frame, events), events);
            assert_eq!(frame.len(), 16);
        }
        assert!(conn.is_quiescent());
    }

    #[test]
    fn incoming_data_is_dropped_and_close_requested() {
        let platform = MockPlatform::new();
        let notifier = CloseNotifier { platform };
        let (mut conn, wait) = armed(platform);

        let mut frame = RxFrame::new(100);
        let out = notifier.on_events(
            &mut conn,
            &mut frame,
            TcpEvents::NEWDATA | TcpEvents::ACKDATA,
        );
        assert_eq!(out, TcpEvents::ACKDATA | TcpEvents::CLOSE);
        assert!(frame.is_empty());

        // Still waiting, still armed.
        assert!(!wait.disconnected.try_wait());
        assert!(conn.close_wait.is_some());
        assert!(!conn.event_mask.is_empty());

        let mut frame = RxFrame::new(0);
        assert_eq!(
            notifier.on_events(&mut conn, &mut frame, TcpEvents::POLL),
            TcpEvents::POLL | TcpEvents::CLOSE
        );
    }

    #[test]
    fn terminal_event_releases_the_closer_exactly_once() {
        for terminal in [TcpEvents::CLOSE, TcpEvents::ABORT, TcpEvents::TERMINAL] {
            let platform = MockPlatform::new();
            let notifier = CloseNotifier { platform };
            let (mut conn, wait) = armed(platform);

            let mut frame = RxFrame::new(8);
            let events = terminal | TcpEvents::NEWDATA;
            assert_eq!(notifier.on_events(&mut conn, &mut frame, events), events);
            assert!(conn.is_quiescent());
            assert!(wait.disconnected.try_wait());
            assert!(platform.logged("resuming close of fd 3"));

            // Anything after that is none of the notifier's business.
            assert_eq!(notifier.on_events(&mut conn, &mut frame, events), events);
            assert!(!wait.disconnected.try_wait());
        }
    }
}
