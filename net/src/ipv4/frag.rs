// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Splitting a prefix into a fixed number of power-of-two fragments.

use crate::ipv4::prefix::{Ipv4Prefix, PrefixError};
use std::net::Ipv4Addr;

/// Iterator that splits a parent prefix into exactly `count` non-overlapping
/// fragments covering a leading portion of the parent.
///
/// The strategy is to split the prefix into "small" and "large" fragments.
/// Large fragments are exactly twice as large as small fragments. We simply
/// choose the largest possible size for the small fragments so that we have
/// enough space, and then grant some fragments twice as much space until we
/// have used up the leftover addresses. Large fragments are placed first,
/// from the low end of the parent.
#[derive(Debug, Clone)]
pub struct FragmentIter {
    first: bool,
    current: u64, // host order
    small: u64,
    small_len: u8,
    large_remaining: u64,
    remaining: u64,
}

impl FragmentIter {
    /// Prepare a split of `parent` into `count` fragments.
    ///
    /// # Errors
    /// Fails if the parent holds fewer than `count` addresses (or `count` is
    /// zero).
    pub fn new(parent: Ipv4Prefix, count: u32) -> Result<FragmentIter, PrefixError> {
        let parent_size = parent.size(false);
        if count == 0 || parent_size < u64::from(count) {
            return Err(PrefixError::TooSmall(parent, count));
        }
        let count = u64::from(count);

        let ideal = parent_size / count;
        let small_pow2 = ideal.ilog2();
        let small = 1u64 << small_pow2;
        // Both terms are multiples of `small`, so the division is exact. The
        // large-fragment count never reaches `count`.
        let large = (parent_size - count * small) / small;

        Ok(FragmentIter {
            first: true,
            current: u64::from(u32::from(parent.first())),
            small,
            small_len: (32 - small_pow2) as u8,
            large_remaining: large,
            remaining: count,
        })
    }

    fn fragment(&self) -> Ipv4Prefix {
        let len = if self.large_remaining > 0 {
            self.small_len - 1
        } else {
            self.small_len
        };
        let addr = Ipv4Addr::from(self.current as u32);
        let Ok(prefix) = Ipv4Prefix::new(addr, len) else {
            // len <= 32 by construction
            unreachable!("Invalid fragment length");
        };
        prefix
    }
}

impl Iterator for FragmentIter {
    type Item = Ipv4Prefix;

    fn next(&mut self) -> Option<Ipv4Prefix> {
        if self.remaining == 0 {
            return None;
        }
        if self.first {
            // The first fragment was prepared at construction
            self.first = false;
        } else {
            let is_large = self.large_remaining > 0;
            if is_large {
                self.large_remaining -= 1;
            }
            self.current += self.small * if is_large { 2 } else { 1 };
            self.remaining -= 1;
            if self.remaining == 0 {
                return None;
            }
        }
        Some(self.fragment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fragments(parent: &str, count: u32) -> Vec<Ipv4Prefix> {
        FragmentIter::new(Ipv4Prefix::from(parent), count)
            .expect("Should split")
            .collect()
    }

    #[test]
    fn three_way_split_uses_one_large_fragment() {
        assert_eq!(
            fragments("10.0.0.0/24", 3),
            vec![
                Ipv4Prefix::from("10.0.0.0/25"),
                Ipv4Prefix::from("10.0.0.128/26"),
                Ipv4Prefix::from("10.0.0.192/26"),
            ]
        );
    }

    #[test]
    fn single_fragment_is_the_parent_itself() {
        assert_eq!(fragments("10.0.0.0/24", 1), vec![Ipv4Prefix::from("10.0.0.0/24")]);
        assert_eq!(fragments("10.0.0.4/30", 1), vec![Ipv4Prefix::from("10.0.0.4/30")]);
    }

    #[test]
    fn even_split_uses_equal_fragments() {
        assert_eq!(
            fragments("10.0.0.0/24", 4),
            vec![
                Ipv4Prefix::from("10.0.0.0/26"),
                Ipv4Prefix::from("10.0.0.64/26"),
                Ipv4Prefix::from("10.0.0.128/26"),
                Ipv4Prefix::from("10.0.0.192/26"),
            ]
        );
    }

    #[test]
    fn five_way_split_of_a_slash_24() {
        // ideal 51, small 32, three large fragments absorb the leftover 96
        assert_eq!(
            fragments("10.0.0.0/24", 5),
            vec![
                Ipv4Prefix::from("10.0.0.0/26"),
                Ipv4Prefix::from("10.0.0.64/26"),
                Ipv4Prefix::from("10.0.0.128/26"),
                Ipv4Prefix::from("10.0.0.192/27"),
                Ipv4Prefix::from("10.0.0.224/27"),
            ]
        );
    }

    #[test]
    fn fragments_are_disjoint_and_inside_the_parent() {
        let parent = Ipv4Prefix::from("172.16.0.0/20");
        for count in [1u32, 2, 3, 7, 100, 1000] {
            let frags: Vec<Ipv4Prefix> =
                FragmentIter::new(parent, count).expect("Should split").collect();
            assert_eq!(frags.len(), count as usize);
            let mut expected_start = u64::from(u32::from(parent.first()));
            for frag in &frags {
                assert!(parent.overlaps(frag));
                assert_eq!(u64::from(u32::from(frag.first())), expected_start);
                expected_start += frag.size(false);
            }
            assert!(expected_start <= u64::from(u32::from(parent.last())) + 1);
        }
    }

    #[test]
    fn too_small_parent_is_rejected() {
        assert!(FragmentIter::new(Ipv4Prefix::from("10.0.0.0/30"), 5).is_err());
        assert!(FragmentIter::new(Ipv4Prefix::from("10.0.0.0/24"), 0).is_err());
        assert_eq!(
            FragmentIter::new(Ipv4Prefix::from("10.0.0.0/32"), 2).err(),
            Some(PrefixError::TooSmall(Ipv4Prefix::from("10.0.0.0/32"), 2))
        );
    }

    #[test]
    fn maximum_split_yields_host_prefixes() {
        let frags = fragments("10.0.0.0/29", 8);
        assert_eq!(frags.len(), 8);
        assert!(frags.iter().all(|f| f.len() == 32));
    }
}
