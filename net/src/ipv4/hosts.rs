// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Enumeration of the host addresses of a prefix with avoid-lists.

use crate::ipv4::prefix::Ipv4Prefix;
use std::net::Ipv4Addr;

/// A host-order interval of addresses that the iterator must skip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct IgnoreRange {
    start: i64,
    end: i64,
}

/// Iterator over every address of a parent prefix that lies outside a set of
/// avoid-prefixes, in ascending host order.
///
/// With `exclude_reserved`, the parent's network and broadcast addresses are
/// skipped as well (only meaningful when the parent actually reserves them).
/// Avoid-prefixes may overlap each other and the parent arbitrarily.
#[derive(Debug, Clone)]
pub struct Ipv4HostIter {
    current: i64, // host order, one below the next candidate
    last: i64,    // host order, inclusive
    ignores: Vec<IgnoreRange>,
    cursor: usize,
}

impl Ipv4HostIter {
    #[must_use]
    pub fn new(parent: Ipv4Prefix, exclude_reserved: bool, avoid: &[Ipv4Prefix]) -> Ipv4HostIter {
        let start = i64::from(u32::from(parent.first()));
        let last = i64::from(u32::from(parent.last()));

        let mut ignores = Vec::with_capacity(avoid.len() + 2);
        for subnet in avoid {
            ignores.push(IgnoreRange {
                start: i64::from(u32::from(subnet.first())),
                end: i64::from(u32::from(subnet.last())),
            });
        }
        if exclude_reserved && parent.has_reserved() {
            ignores.push(IgnoreRange { start, end: start });
            ignores.push(IgnoreRange { start: last, end: last });
        }
        // Sort the ranges so that we skip over the maximum possible (largest
        // comes first)
        ignores.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));

        Ipv4HostIter {
            current: start - 1,
            last,
            ignores,
            cursor: 0,
        }
    }
}

impl Iterator for Ipv4HostIter {
    type Item = Ipv4Addr;

    fn next(&mut self) -> Option<Ipv4Addr> {
        if self.current >= self.last {
            return None;
        }
        self.current += 1;

        loop {
            // We need to check containment in case ignore ranges overlap
            let Some(range) = self.ignores.get(self.cursor) else {
                break;
            };
            if self.current < range.start || self.current > range.end {
                break;
            }

            // Skip the ignored range
            self.current = range.end + 1;

            // We may have skipped over multiple ranges
            loop {
                self.cursor += 1;
                match self.ignores.get(self.cursor) {
                    Some(next) if self.current > next.end => {}
                    _ => break,
                }
            }
        }

        if self.current > self.last {
            return None;
        }
        Some(Ipv4Addr::from(self.current as u32))
    }
}
