// SPDX-License-Identifier: Apache-2.0
// Copyright NetMirage Authors

//! Ethernet-layer types.

pub mod mac;
