// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Possible errors from [`Network`]

#[expect(
    unused_imports,
    reason = "used for doc string links to work out, but not for code"
)]
use super::Network;

use thiserror::Error;

/// Possible errors from [`Network::socket`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Maximum number of sockets already open")]
    TooManySockets,
}

/// Possible errors from [`Network::close`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum CloseError {
    #[error("Not a valid open file descriptor")]
    InvalidFd,
}

/// Possible errors from [`Network::listen`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ListenError {
    #[error("Not a valid open file descriptor")]
    InvalidFd,
    #[error("Not a TCP socket")]
    NotTcpSocket,
    #[error("Socket is already listening")]
    AlreadyListening,
    #[error("Port {0} already in use")]
    PortAlreadyInUse(u16),
}

/// Possible errors from [`Network::establish`]
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum EstablishError {
    #[error("Not a valid open file descriptor")]
    InvalidFd,
    #[error("Socket has no connection record")]
    NoConnectionRecord,
    #[error("Socket is already connected")]
    AlreadyConnected,
}
