// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Small platform layer shared by the ATE host runtime crates: errno-based
//! error handling, ioctl wrappers and an mmap-backed memory region, plus the
//! `log` facade every other crate logs through.

mod errno;
mod ioctl;
mod mmap;

pub use errno::{Error, Result};
pub use ioctl::{ioctl, ioctl_with_mut_ref, ioctl_with_ref, ioctl_with_val};
pub use mmap::MemoryMapping;

pub use log::*;
