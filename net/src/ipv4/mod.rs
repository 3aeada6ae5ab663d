// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! IPv4 prefix type and the address-space iterators built on top of it.

pub mod frag;
pub mod hosts;
pub mod prefix;
