// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Safe-ish wrappers around `libc::ioctl`. The `gcore` character device
//! exposes its control surface entirely through ioctls (see
//! `board/driver.h` in the vendor driver sources), so every register
//! read/write and DMA kickoff in `transport` goes through one of these.

use std::os::unix::io::AsRawFd;

use libc::c_int;
use libc::c_ulong;

use crate::errno::Error;
use crate::errno::Result;

/// Runs an ioctl with no argument payload.
pub fn ioctl<F: AsRawFd>(fd: &F, nr: c_ulong) -> Result<()> {
    // SAFETY: `nr` takes no argument; the kernel driver only reads `fd`.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), nr, 0) };
    if ret < 0 {
        return Err(Error::last());
    }
    Ok(())
}

/// Runs an ioctl that reads `arg` into the kernel (e.g. a register write).
pub fn ioctl_with_ref<F: AsRawFd, T>(fd: &F, nr: c_ulong, arg: &T) -> Result<()> {
    // SAFETY: `arg` is a valid reference for the lifetime of the call and
    // the ioctl number's layout matches `T` by construction of the caller.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), nr, arg as *const T as *const libc::c_void) };
    if ret < 0 {
        return Err(Error::last());
    }
    Ok(())
}

/// Runs an ioctl that writes into `arg` (e.g. a register read).
pub fn ioctl_with_mut_ref<F: AsRawFd, T>(fd: &F, nr: c_ulong, arg: &mut T) -> Result<()> {
    // SAFETY: `arg` is a valid, exclusively-borrowed reference for the call.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), nr, arg as *mut T as *mut libc::c_void) };
    if ret < 0 {
        return Err(Error::last());
    }
    Ok(())
}

/// Runs an ioctl that takes a plain integer argument (e.g. DMA start/stop).
pub fn ioctl_with_val<F: AsRawFd>(fd: &F, nr: c_ulong, arg: c_ulong) -> Result<c_int> {
    // SAFETY: the ioctl takes its argument by value, not by pointer.
    let ret = unsafe { libc::ioctl(fd.as_raw_fd(), nr, arg) };
    if ret < 0 {
        return Err(Error::last());
    }
    Ok(ret)
}
