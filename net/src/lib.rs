// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Address types and address-space arithmetic for the network emulator.
//!
//! This crate owns the numeric groundwork of the emulator: IPv4 prefixes and
//! their canonicalisation, enumeration of host addresses with avoid-lists,
//! splitting a prefix into power-of-two fragments, and sequential MAC
//! address allocation.

pub mod eth;
pub mod ipv4;

pub use eth::mac::{Mac, MacAllocator, MacError};
pub use ipv4::frag::FragmentIter;
pub use ipv4::hosts::Ipv4HostIter;
pub use ipv4::prefix::{Ipv4Prefix, PrefixError};
