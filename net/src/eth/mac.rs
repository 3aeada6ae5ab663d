// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Mac address type, parsing, and sequential allocation.

use std::fmt::Display;
use std::str::FromStr;
use thiserror::Error;

/// A [MAC Address] type.
///
/// `Mac` is a transparent wrapper around `[u8; 6]` which provides a
/// small collection of methods and type safety.
///
/// [MAC Address]: https://en.wikipedia.org/wiki/MAC_address
#[repr(transparent)]
#[cfg_attr(test, derive(bolero::TypeGenerator))]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub struct Mac(pub [u8; 6]);

/// Errors produced by [`Mac`] parsing and by [`MacAllocator`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MacError {
    /// Invalid string representation of mac address
    #[error("invalid string representation of mac address: {0}")]
    Invalid(String),
    /// No addresses left to hand out
    #[error("the 48-bit MAC address space has been exhausted")]
    Exhausted,
}

impl From<[u8; 6]> for Mac {
    fn from(value: [u8; 6]) -> Self {
        Mac(value)
    }
}

impl From<Mac> for [u8; 6] {
    fn from(value: Mac) -> Self {
        value.0
    }
}

impl AsRef<[u8; 6]> for Mac {
    fn as_ref(&self) -> &[u8; 6] {
        &self.0
    }
}

impl Mac {
    /// The broadcast `Mac`
    pub const BROADCAST: Mac = Mac([u8::MAX; 6]);
    /// The zero `Mac`.
    ///
    /// `ZERO` is illegal as a source or destination `Mac` in most contexts.
    pub const ZERO: Mac = Mac([0; 6]);

    /// Returns true iff the binary representation of the [`Mac`] is exclusively ones.
    #[must_use]
    pub fn is_broadcast(&self) -> bool {
        self == &Mac::BROADCAST
    }

    /// Returns true iff the least significant bit of the first octet of the [`Mac`] is one.
    #[must_use]
    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 == 0x01
    }

    /// Returns true iff the least significant bit of the first octet of the [`Mac`] is zero.
    #[must_use]
    pub fn is_unicast(&self) -> bool {
        !self.is_multicast()
    }

    /// Returns true iff the binary representation of the [`Mac`] is exclusively zeros.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self == &Mac::ZERO
    }

    /// The next address in 48-bit counting order, or `None` past the
    /// all-ones address.
    #[must_use]
    pub fn successor(&self) -> Option<Mac> {
        let mut octets = self.0;
        for octet in octets.iter_mut().rev() {
            *octet = octet.wrapping_add(1);
            if *octet != 0 {
                return Some(Mac(octets));
            }
        }
        None
    }
}

impl FromStr for Mac {
    type Err = MacError;

    fn from_str(s: &str) -> Result<Mac, MacError> {
        let mut octets = [0u8; 6];
        let mut parts = s.split(':');
        for octet in &mut octets {
            let part = parts.next().ok_or_else(|| MacError::Invalid(s.to_string()))?;
            if part.len() != 2 {
                return Err(MacError::Invalid(s.to_string()));
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| MacError::Invalid(s.to_string()))?;
        }
        if parts.next().is_some() {
            return Err(MacError::Invalid(s.to_string()));
        }
        Ok(Mac(octets))
    }
}

impl Display for Mac {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

/// Hands out successive unicast MAC addresses, starting at `00:…:01`.
///
/// The all-zero address is unassignable and is skipped from the start. The
/// allocator fails permanently once the counter would pass the all-ones
/// address.
#[derive(Debug, Clone)]
pub struct MacAllocator {
    next: Mac,
}

impl MacAllocator {
    #[must_use]
    pub fn new() -> MacAllocator {
        MacAllocator {
            next: Mac([0, 0, 0, 0, 0, 1]),
        }
    }

    /// Hand out the next address.
    ///
    /// # Errors
    /// Fails iff advancing the counter wraps past [`Mac::BROADCAST`].
    pub fn allocate(&mut self) -> Result<Mac, MacError> {
        let next = self.next.successor().ok_or(MacError::Exhausted)?;
        Ok(std::mem::replace(&mut self.next, next))
    }

    /// Fill `buf` with consecutive addresses.
    ///
    /// # Errors
    /// Fails iff any step wraps; the buffer contents are then unspecified.
    pub fn take(&mut self, buf: &mut [Mac]) -> Result<(), MacError> {
        for slot in buf.iter_mut() {
            *slot = self.allocate()?;
        }
        Ok(())
    }
}

impl Default for MacAllocator {
    fn default() -> MacAllocator {
        MacAllocator::new()
    }
}
