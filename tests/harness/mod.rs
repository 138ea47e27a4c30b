// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test harness for the registry client.
//!
//! Provides a fake registry server and a concurrent load driver for
//! exercising the sliding window limiter.

#![allow(dead_code)]

pub mod load;
pub mod registry;
