// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Canonical IPv4 network prefixes.

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PrefixError {
    #[error("Invalid prefix: {0}")]
    Invalid(String),
    #[error("Mask length {0} is invalid")]
    InvalidLength(u8),
    #[error("{0} is too small to be split into {1} fragments")]
    TooSmall(Ipv4Prefix, u32),
}

/// An IPv4 CIDR block in canonical form.
///
/// The wrapped [`Ipv4Net`] always has its host bits zeroed; canonicalisation
/// happens on construction, so two prefixes describing the same block compare
/// equal regardless of the address they were built from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ipv4Prefix(Ipv4Net);

#[allow(clippy::len_without_is_empty)]
impl Ipv4Prefix {
    pub const MAX_LEN: u8 = 32;

    /// Build a prefix from an address and a mask length, zeroing host bits.
    ///
    /// # Errors
    /// Fails if the mask length exceeds [`Ipv4Prefix::MAX_LEN`].
    pub fn new(addr: Ipv4Addr, len: u8) -> Result<Ipv4Prefix, PrefixError> {
        let net = Ipv4Net::new(addr, len).map_err(|_| PrefixError::InvalidLength(len))?;
        Ok(Ipv4Prefix(net.trunc()))
    }

    /// Build 0.0.0.0/0. "Default" is a very overloaded term. Calling this `root`.
    #[must_use]
    pub fn root() -> Ipv4Prefix {
        Ipv4Prefix(Ipv4Net::default())
    }

    /// Get the canonical (network) address.
    #[must_use]
    pub fn addr(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Get the mask length.
    #[must_use]
    pub fn len(&self) -> u8 {
        self.0.prefix_len()
    }

    /// Get the network mask.
    #[must_use]
    pub fn net_mask(&self) -> Ipv4Addr {
        self.0.netmask()
    }

    /// Get the host mask (complement of the network mask).
    #[must_use]
    pub fn host_mask(&self) -> Ipv4Addr {
        self.0.hostmask()
    }

    /// Get the first address covered by the prefix.
    #[must_use]
    pub fn first(&self) -> Ipv4Addr {
        self.0.network()
    }

    /// Get the last address covered by the prefix.
    #[must_use]
    pub fn last(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    /// Check whether the prefix covers a given address.
    #[must_use]
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        self.0.contains(&addr)
    }

    /// Check whether two prefixes cover any address in common. Equivalent to
    /// comparing both network addresses under the mask of the wider prefix.
    #[must_use]
    pub fn overlaps(&self, other: &Ipv4Prefix) -> bool {
        self.0.contains(&other.0) || other.0.contains(&self.0)
    }

    /// Get the number of covered addresses. When `exclude_reserved` is set,
    /// the network and broadcast addresses are not counted; prefixes of
    /// length 31 and 32 have no reserved addresses.
    #[must_use]
    pub fn size(&self, exclude_reserved: bool) -> u64 {
        let count = 1u64 << (32 - u32::from(self.len()));
        if exclude_reserved && self.has_reserved() {
            count - 2
        } else {
            count
        }
    }

    /// Tell whether the prefix reserves its first and last addresses for
    /// network and broadcast use.
    #[must_use]
    pub fn has_reserved(&self) -> bool {
        self.len() <= 30
    }
}

impl FromStr for Ipv4Prefix {
    type Err = PrefixError;

    /// Parse strict `a.b.c.d/len` CIDR notation, canonicalising host bits.
    fn from_str(s: &str) -> Result<Ipv4Prefix, PrefixError> {
        let Some((addr_str, len_str)) = s.split_once('/') else {
            return Err(PrefixError::Invalid(s.to_string()));
        };
        let addr =
            Ipv4Addr::from_str(addr_str).map_err(|_| PrefixError::Invalid(s.to_string()))?;
        let len = u8::from_str(len_str).map_err(|_| PrefixError::Invalid(s.to_string()))?;
        Ipv4Prefix::new(addr, len)
    }
}

impl From<Ipv4Prefix> for Ipv4Net {
    fn from(value: Ipv4Prefix) -> Ipv4Net {
        value.0
    }
}

impl From<Ipv4Net> for Ipv4Prefix {
    fn from(value: Ipv4Net) -> Ipv4Prefix {
        Ipv4Prefix(value.trunc())
    }
}

/// Only for testing. Will panic with badly formatted prefix strings
#[cfg(any(test, feature = "testing"))]
impl From<&str> for Ipv4Prefix {
    fn from(s: &str) -> Ipv4Prefix {
        s.parse().expect("Invalid prefix")
    }
}

impl Display for Ipv4Prefix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.addr(), self.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_canonicalises_host_bits() {
        let prefix: Ipv4Prefix = "192.168.1.130/25".parse().expect("Should parse");
        assert_eq!(prefix.addr(), Ipv4Addr::new(192, 168, 1, 128));
        assert_eq!(prefix.len(), 25);
        assert_eq!(prefix.first(), Ipv4Addr::new(192, 168, 1, 128));
        assert_eq!(prefix.last(), Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(prefix.size(false), 128);
        assert_eq!(prefix.size(true), 126);
        assert!(prefix.has_reserved());

        assert_eq!(
            "10.0.0.5/24".parse::<Ipv4Prefix>().expect("Should parse"),
            "10.0.0.0/24".parse::<Ipv4Prefix>().expect("Should parse"),
        );
    }

    #[test]
    fn parse_format_round_trip() {
        for s in ["0.0.0.0/0", "10.0.0.0/8", "192.168.1.128/25", "1.2.3.4/32"] {
            let prefix: Ipv4Prefix = s.parse().expect("Should parse");
            assert_eq!(prefix.to_string(), s);
            assert_eq!(
                prefix.to_string().parse::<Ipv4Prefix>().expect("Should parse"),
                prefix
            );
        }
    }

    #[test]
    fn parse_rejects_malformed_input() {
        assert!("10.0.0.0".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0/8".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.0/".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.0/33".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.0/-1".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.0/8x".parse::<Ipv4Prefix>().is_err());
        assert!("10.0.0.X/8".parse::<Ipv4Prefix>().is_err());
        assert_eq!(
            Ipv4Prefix::new(Ipv4Addr::new(10, 0, 0, 0), 33),
            Err(PrefixError::InvalidLength(33))
        );
    }

    #[test]
    fn masks_and_containment() {
        let prefix = Ipv4Prefix::from("10.1.2.0/24");
        assert_eq!(prefix.net_mask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(prefix.host_mask(), Ipv4Addr::new(0, 0, 0, 255));
        assert!(prefix.contains(Ipv4Addr::new(10, 1, 2, 7)));
        assert!(!prefix.contains(Ipv4Addr::new(10, 1, 3, 7)));
        assert!(Ipv4Prefix::root().contains(Ipv4Addr::new(255, 255, 255, 255)));
    }

    #[test]
    fn overlap_uses_the_wider_mask() {
        let wide = Ipv4Prefix::from("10.0.0.0/8");
        let narrow = Ipv4Prefix::from("10.200.0.0/16");
        let other = Ipv4Prefix::from("11.0.0.0/8");
        assert!(wide.overlaps(&narrow));
        assert!(narrow.overlaps(&wide));
        assert!(!wide.overlaps(&other));
        assert!(wide.overlaps(&wide));
    }

    #[test]
    fn size_at_the_short_prefix_boundary() {
        assert_eq!(Ipv4Prefix::from("10.0.0.0/30").size(true), 2);
        assert_eq!(Ipv4Prefix::from("10.0.0.0/31").size(true), 2);
        assert_eq!(Ipv4Prefix::from("10.0.0.0/32").size(true), 1);
        assert!(!Ipv4Prefix::from("10.0.0.0/31").has_reserved());
        assert!(!Ipv4Prefix::from("10.0.0.0/32").has_reserved());
    }

    #[test]
    fn canonicalisation_is_idempotent() {
        bolero::check!().with_type().for_each(|(raw, len): &(u32, u8)| {
            let len = len % (Ipv4Prefix::MAX_LEN + 1);
            let prefix =
                Ipv4Prefix::new(Ipv4Addr::from(*raw), len).expect("length is in range");
            let again = Ipv4Prefix::new(prefix.addr(), prefix.len()).expect("length is in range");
            assert_eq!(prefix, again);
            assert_eq!(
                u32::from(prefix.addr()) & u32::from(prefix.host_mask()),
                0,
                "host bits must be zero"
            );
        });
    }
}
