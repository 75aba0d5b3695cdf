// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Ioctl numbers and argument layouts for `/dev/gcore`, ported from
//! `examples/original_source/board/driver.h`. These are the 13 raw
//! operations the `Device` trait exposes (§6.2); everything above this
//! module is pure sequencing.

use libc::c_ulong;
use zerocopy::AsBytes;
use zerocopy::FromBytes;
use zerocopy::FromZeroes;

/// `GCORE_IOCTL_BASE` is `'W'`; the kernel driver uses bare `_IO(base, nr)`
/// numbers rather than the usual direction-encoded `_IOR`/`_IOW` macros, so
/// the ioctl number is just the low byte shifted in by glibc's `_IO`.
const fn io(nr: c_ulong) -> c_ulong {
    // _IO(type, nr) == (type << 8) | nr on the Linux ioctl ABI this driver
    // targets.
    (('W' as c_ulong) << 8) | nr
}

pub const GCORE_REGS_READ: c_ulong = io(0);
pub const GCORE_USERDEVS_READ: c_ulong = io(1);
pub const GCORE_SUBCORE_LOAD: c_ulong = io(2);
pub const GCORE_SUBCORE_RUN: c_ulong = io(3);
pub const GCORE_SUBCORE_IDLE: c_ulong = io(4);
pub const GCORE_SUBCORE_STATE: c_ulong = io(5);
pub const GCORE_SUBCORE_RESET: c_ulong = io(6);
pub const GCORE_ARTIX_SYNC: c_ulong = io(7);
pub const GCORE_CTRL_WRITE: c_ulong = io(8);
pub const GCORE_CTRL_READ: c_ulong = io(9);
pub const GCORE_DMA_CONFIG: c_ulong = io(10);
pub const GCORE_DMA_PREP: c_ulong = io(11);
pub const GCORE_DMA_START: c_ulong = io(12);
pub const GCORE_DMA_STOP: c_ulong = io(13);

/// Total addressable space behind one artix unit (8 GiB).
pub const ARTIX_MEM_BYTES: u64 = 8_589_934_592;
/// Largest single DMA transfer the driver will carve up in one shot.
pub const MAX_CHUNK_SIZE: u64 = 536_870_912;
pub const BURST_BYTES: u32 = 1024;
pub const BEAT_BYTES: u32 = 128;
pub const NUM_BEATS_PER_BURST: u32 = 8;
pub const WORD_BYTES: u32 = 8;
pub const NUM_WORDS_PER_BEAT: u32 = 16;

/// The memcore burst-size control register value used for every write and
/// read burst (`artix.h`'s `MEMCORE_BURST_CFG`).
pub const MEMCORE_BURST_CFG: u32 = 0x0000_f610;

/// Bit in `a1_status`/`a2_status` recording that `AGENT_STARTUP` has
/// already completed this power cycle; skips re-running it
/// (`helper.c`'s `helper_agent_load`).
pub const AGENT_STARTUP_DONE_MASK: u32 = 0x0000_0001;
/// Bit in the subcore `status` register set if agent startup's
/// init/calibration failed. Fatal.
pub const STATUS_INIT_ERROR_MASK: u32 = 0x0000_0002;

/// Mirrors `struct gcore_cfg`: requests a subcore state transition for one
/// (or, for the sync line, both) artix unit.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct GcoreCfg {
    pub subcore_state: u32,
    pub artix_select: u32,
}

/// Mirrors `struct gcore_userdev`.
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct GcoreUserdev {
    pub tx_chan: u32,
    pub tx_cmp: u32,
    pub rx_chan: u32,
    pub rx_cmp: u32,
}

/// Mirrors `struct gcore_registers`.
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct GcoreRegisters {
    pub control: u32,
    pub status: u32,
    pub addr: u32,
    pub data: u32,
    pub a1_status: u32,
    pub a2_status: u32,
}

/// Mirrors `struct gcore_ctrl_packet`: one word written or read over the
/// control AXI bus that fans out to the agent/gvpu/memcore layers.
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct GcoreCtrlPacket {
    pub rank_select: u32,
    pub addr: u32,
    pub data: u32,
}

/// Mirrors `enum gcore_direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum GcoreDirection {
    MemToDev = 0,
    DevToMem = 1,
    TransNone = 2,
}

/// Mirrors `struct gcore_chan_cfg`.
#[derive(Debug, Clone, Copy, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct GcoreChanCfg {
    pub chan: u32,
    pub dir: u32,
    pub buf_offset: u32,
    pub buf_size: u32,
    pub completion: u32,
    pub cookie: u32,
}

/// Mirrors `struct gcore_transfer`.
#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes, FromZeroes)]
#[repr(C)]
pub struct GcoreTransfer {
    pub chan: u32,
    pub completion: u32,
    pub cookie: u32,
    pub wait: u32,
    pub wait_time_msecs: u32,
    pub buf_size: u32,
    pub duration_usecs: u32,
}

/// Splits an 8 GiB-addressable artix memory address into the rank-select
/// bit and the low 32 address bits the control packet actually carries
/// (inferred from `helper.c`'s inline `(addr & 0x100000000) >> 32` /
/// `addr & 0xFFFFFFFF` masking; `ARTIX_MEM_BYTES` is `2^33` so rank select
/// is exactly bit 32).
pub fn split_rank_addr(addr: u64) -> (u32, u32) {
    let rank_select = ((addr & 0x1_0000_0000) >> 32) as u32;
    let addr_low = (addr & 0xFFFF_FFFF) as u32;
    (rank_select, addr_low)
}
