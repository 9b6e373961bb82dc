// Copyright (c) Microsoft Corporation.
// Licensed under the MIT license.

//! Error numbers handed back to callers. See [`Errno`].

use thiserror::Error;

use crate::net::errors::{CloseError, EstablishError, ListenError, SocketError};

/// POSIX error numbers
///
/// This is a transparent wrapper around the (Linux-numbered) error numbers intended to provide some
/// type safety by expecting explicit conversions to/from integers. Only the numbers that the socket
/// layer can actually produce are named.
#[derive(PartialEq, Eq, Clone, Copy, Error)]
pub struct Errno {
    value: core::num::NonZeroU8,
}

impl From<Errno> for i32 {
    fn from(e: Errno) -> Self {
        e.value.get().into()
    }
}

impl core::fmt::Display for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl core::fmt::Debug for Errno {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Errno({} = {})", self.value.get(), self.as_str())
    }
}

impl Errno {
    /// Bad file descriptor
    pub const EBADF: Self = Self::from_const(9);
    /// Invalid argument
    pub const EINVAL: Self = Self::from_const(22);
    /// Too many open files
    pub const EMFILE: Self = Self::from_const(24);
    /// Operation not supported
    pub const EOPNOTSUPP: Self = Self::from_const(95);
    /// Address already in use
    pub const EADDRINUSE: Self = Self::from_const(98);
    /// Transport endpoint is already connected
    pub const EISCONN: Self = Self::from_const(106);

    /// Provide the negative integer representation of the error
    ///
    /// ```
    /// # use netclose::errno::Errno;
    /// assert_eq!(-9, Errno::EBADF.as_neg());
    /// // Direct conversion to i32 will give the positive variant
    /// assert_eq!(9, i32::from(Errno::EBADF));
    /// ```
    pub fn as_neg(self) -> i32 {
        -i32::from(self)
    }

    /// A human-readable description of the error
    pub const fn as_str(self) -> &'static str {
        match self.value.get() {
            9 => "EBADF: Bad file descriptor",
            22 => "EINVAL: Invalid argument",
            24 => "EMFILE: Too many open files",
            95 => "EOPNOTSUPP: Operation not supported",
            98 => "EADDRINUSE: Address already in use",
            106 => "EISCONN: Transport endpoint is already connected",
            _ => "Unknown error number",
        }
    }

    const fn from_const(v: u8) -> Self {
        Self {
            value: core::num::NonZeroU8::new(v).unwrap(),
        }
    }
}

/// Errors when converting to an [`Errno`]
#[derive(Error, Debug)]
pub enum ErrnoConversionError {
    #[error("Expected positive error number")]
    ExpectedPositive,
    #[error("Error number cannot be zero")]
    ExpectedNonZero,
}

impl TryFrom<i32> for Errno {
    type Error = ErrnoConversionError;
    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let value: u8 = value
            .try_into()
            .or(Err(ErrnoConversionError::ExpectedPositive))?;
        let value =
            core::num::NonZeroU8::new(value).ok_or(ErrnoConversionError::ExpectedNonZero)?;
        Ok(Self { value })
    }
}

impl From<CloseError> for Errno {
    fn from(value: CloseError) -> Self {
        match value {
            CloseError::InvalidFd => Errno::EBADF,
        }
    }
}

impl From<SocketError> for Errno {
    fn from(value: SocketError) -> Self {
        match value {
            SocketError::TooManySockets => Errno::EMFILE,
        }
    }
}

impl From<ListenError> for Errno {
    fn from(value: ListenError) -> Self {
        match value {
            ListenError::InvalidFd => Errno::EBADF,
            ListenError::NotTcpSocket => Errno::EOPNOTSUPP,
            ListenError::AlreadyListening => Errno::EINVAL,
            ListenError::PortAlreadyInUse(_) => Errno::EADDRINUSE,
        }
    }
}

impl From<EstablishError> for Errno {
    fn from(value: EstablishError) -> Self {
        match value {
            EstablishError::InvalidFd => Errno::EBADF,
            EstablishError::NoConnectionRecord => Errno::EOPNOTSUPP,
            EstablishError::AlreadyConnected => Errno::EISCONN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_failure_is_ebadf() {
        let errno = Errno::from(CloseError::InvalidFd);
        assert_eq!(errno, Errno::EBADF);
        assert_eq!(errno.as_neg(), -9);
    }

    #[test]
    fn numbers_round_trip() {
        assert_eq!(Errno::try_from(106).unwrap(), Errno::EISCONN);
        assert!(matches!(
            Errno::try_from(0),
            Err(ErrnoConversionError::ExpectedNonZero)
        ));
        assert!(matches!(
            Errno::try_from(-9),
            Err(ErrnoConversionError::ExpectedPositive)
        ));
    }

    #[test]
    fn conversions_pick_the_posix_number() {
        assert_eq!(Errno::from(SocketError::TooManySockets), Errno::EMFILE);
        assert_eq!(Errno::from(ListenError::PortAlreadyInUse(80)), Errno::EADDRINUSE);
        assert_eq!(Errno::from(ListenError::NotTcpSocket), Errno::EOPNOTSUPP);
        assert_eq!(Errno::from(ListenError::AlreadyListening), Errno::EINVAL);
        assert_eq!(Errno::from(EstablishError::AlreadyConnected), Errno::EISCONN);
        assert_eq!(
            alloc::format!("{}", Errno::EBADF),
            "EBADF: Bad file descriptor"
        );
    }
}
