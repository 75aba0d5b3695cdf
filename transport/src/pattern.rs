// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Pattern execution (§4.5.7), grounded on
//! `examples/original_source/board/artix.c`'s `artix_dut_test` and
//! `get_dut_test_fail_pins`.

use crate::device::Device;
use crate::device::DmaChannel;
use crate::regs;
use crate::states::ArtixSelect;
use crate::states::ExecUnitState;
use crate::states::SubcoreState;
use crate::Transport;
use crate::TransportError;
use crate::TransportResult;

/// One byte per DUT I/O index `[0,199]` for one engine; `0x00` enables the
/// pin, `0xff` masks it out of the test (§4.5.7 step 1).
pub const ENABLE_MASK_SIZE: usize = 256;
const ENABLED: u8 = 0x00;
const DISABLED: u8 = 0xff;

/// Builds the 256-byte enable mask for one engine from the set of DUT I/O
/// indices (already reduced to that engine's `[0,199]` range) that the
/// pattern's pin set actually drives.
pub fn build_enable_mask(active_dut_io_ids: &[u32]) -> [u8; ENABLE_MASK_SIZE] {
    let mut mask = [DISABLED; ENABLE_MASK_SIZE];
    for &id in active_dut_io_ids {
        if (id as usize) < vector::DUT_NUM_PINS as usize {
            mask[id as usize] = ENABLED;
        }
    }
    mask
}

/// Result of one `run_pattern` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternOutcome {
    pub failed: bool,
    /// The reconciled cycle count (§4.5.7 step 7: the lower of the two in
    /// dual mode).
    pub cycle_count: u64,
    /// 400-byte fail-pin vector, A1 at `[0,199]`, A2 at `[200,399]`, only
    /// populated when `failed` is true.
    pub fail_pins: Option<[bool; vector::DUT_TOTAL_NUM_PINS as usize]>,
    /// Set if either engine's read FIFO stalled during the run; informational
    /// only, never flips `failed` (§4.5.7 step 9).
    pub read_fifo_stalled: bool,
}

const TEST_RUN_STATUS_MASK: u32 = 0x0000_00f0;
const TEST_RUN_STATUS_SHIFT: u32 = 4;
const TEST_FAILED_STATUS_MASK: u32 = 0x000f_0000;
const TEST_FAILED_STATUS_VALUE: u32 = 0x0001_0000;
const READ_FIFO_STALL_MASK: u32 = 0xf000_0000;

impl<D: Device> Transport<D> {
    /// Runs a compiled pattern already DMA'd into on-board memory at
    /// `addr` for the given engine(s). `a1`/`a2` are each `Some(enable
    /// mask)` if that engine participates; both `Some` means dual mode.
    pub fn run_pattern(
        &mut self,
        a1: Option<&[u8; ENABLE_MASK_SIZE]>,
        a2: Option<&[u8; ENABLE_MASK_SIZE]>,
        addr: u64,
        total_unrolled_vecs: u64,
    ) -> TransportResult<PatternOutcome> {
        let dual = a1.is_some() && a2.is_some();
        if let Some(mask) = a1 {
            self.test_setup(ArtixSelect::A1, mask, addr)?;
        }
        if let Some(mask) = a2 {
            self.test_setup(ArtixSelect::A2, mask, addr)?;
        }

        self.device.artix_sync(ArtixSelect::Both, dual as u32)?;

        if a1.is_some() {
            self.gvpu_load(ArtixSelect::A1, ExecUnitState::TestRun as u32)?;
        }
        if a2.is_some() {
            self.gvpu_load(ArtixSelect::A2, ExecUnitState::TestRun as u32)?;
        }

        let master = if a1.is_some() { ArtixSelect::A1 } else { ArtixSelect::A2 };
        self.poll_until_run_exits(master)?;

        let master_packet = self.agent_status(master)?;
        let master_failed = master_packet.data & TEST_FAILED_STATUS_MASK == TEST_FAILED_STATUS_VALUE;
        let master_cycle = self.agent_status_cycle(master)?;
        let master_stalled = (master_packet.addr & READ_FIFO_STALL_MASK) != 0;

        let (failed, cycle_count, stalled) = if dual {
            let slave_packet = self.agent_status(ArtixSelect::A2)?;
            let slave_failed = slave_packet.data & TEST_FAILED_STATUS_MASK == TEST_FAILED_STATUS_VALUE;
            let slave_cycle = self.agent_status_cycle(ArtixSelect::A2)?;
            let slave_stalled = (slave_packet.addr & READ_FIFO_STALL_MASK) != 0;

            if master_cycle != slave_cycle {
                return Err(TransportError::CycleMismatch {
                    a1: master_cycle,
                    a2: slave_cycle,
                });
            }

            let mut m_failed = master_failed;
            let mut s_failed = slave_failed;
            if !m_failed && master_cycle != total_unrolled_vecs {
                m_failed = true;
            }
            if !s_failed && slave_cycle != total_unrolled_vecs {
                s_failed = true;
            }

            (m_failed || s_failed, master_cycle, master_stalled || slave_stalled)
        } else {
            let mut failed = master_failed;
            if !failed && master_cycle != total_unrolled_vecs {
                failed = true;
            }
            (failed, master_cycle, master_stalled)
        };

        let fail_pins = if failed {
            Some(self.read_fail_pins(a1.is_some(), a2.is_some())?)
        } else {
            None
        };

        Ok(PatternOutcome {
            failed,
            cycle_count,
            fail_pins,
            read_fifo_stalled: stalled,
        })
    }

    /// One engine's `TEST_SETUP`: loads the one-burst enable mask, DMAs it
    /// in, then `TEST_CLEANUP` to reset the cycle counter and fail flag.
    fn test_setup(
        &mut self,
        select: ArtixSelect,
        mask: &[u8; ENABLE_MASK_SIZE],
        addr: u64,
    ) -> TransportResult<()> {
        self.ensure_started(select)?;
        self.gvpu_load(select, ExecUnitState::TestSetup as u32)?;
        self.agent_load(select, crate::states::AgentState::BurstLoad as u32)?;
        self.subcore_load(select, SubcoreState::SetupBurst as u32)?;
        self.subcore_load(select, SubcoreState::DmaWrite as u32)?;

        let (rank_select, addr_low) = regs::split_rank_addr(addr);
        let chan = DmaChannel {
            chan: rank_select,
            buf_offset: addr_low,
            buf_size: mask.len() as u32,
        };
        self.device.dma_write(chan, mask)?;

        self.gvpu_load(select, ExecUnitState::TestCleanup as u32)?;
        self.device.wait_idle()
    }

    /// Polls the master engine's gvpu stage until it exits `TEST_RUN`,
    /// snapshotting status every 2^20 polls to bound latency (§4.5.7 step 6).
    fn poll_until_run_exits(&mut self, master: ArtixSelect) -> TransportResult<()> {
        const SNAPSHOT_INTERVAL: u32 = 0x0010_0000;
        let mut counter = 0u32;
        loop {
            let packet = self.agent_status(master)?;
            let stage = (packet.data & TEST_RUN_STATUS_MASK) >> TEST_RUN_STATUS_SHIFT;
            if stage != ExecUnitState::TestRun as u32 {
                return Ok(());
            }
            counter += 1;
            if counter >= SNAPSHOT_INTERVAL {
                let _ = self.agent_status_cycle(master)?;
                return Ok(());
            }
        }
    }

    /// Reads each involved engine's 200-byte fail-pin buffer and merges it
    /// into a global 400-byte vector (A1 at `[0,199]`, A2 at `[200,399]`).
    fn read_fail_pins(
        &mut self,
        a1: bool,
        a2: bool,
    ) -> TransportResult<[bool; vector::DUT_TOTAL_NUM_PINS as usize]> {
        let mut merged = [false; vector::DUT_TOTAL_NUM_PINS as usize];
        if a1 {
            let bytes = self.read_engine_fail_pins(ArtixSelect::A1)?;
            for (i, b) in bytes.iter().enumerate() {
                merged[i] = *b != 0;
            }
        }
        if a2 {
            let bytes = self.read_engine_fail_pins(ArtixSelect::A2)?;
            for (i, b) in bytes.iter().enumerate() {
                merged[vector::DUT_NUM_PINS as usize + i] = *b != 0;
            }
        }
        Ok(merged)
    }

    fn read_engine_fail_pins(&mut self, select: ArtixSelect) -> TransportResult<[u8; vector::DUT_NUM_PINS as usize]> {
        self.gvpu_load(select, ExecUnitState::TestFailPins as u32)?;
        self.agent_load(select, crate::states::AgentState::GvpuRead as u32)?;
        self.subcore_load(select, SubcoreState::SetupBurst as u32)?;
        self.subcore_load(select, SubcoreState::DmaRead as u32)?;

        let mut buf = [0u8; vector::DUT_NUM_PINS as usize];
        let chan = DmaChannel {
            chan: 0,
            buf_offset: 0,
            buf_size: buf.len() as u32,
        };
        self.device.dma_read(chan, &mut buf)?;
        self.device.wait_idle()?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CtrlPacket;
    use crate::device::MockDevice;

    fn not_running(failed: bool) -> CtrlPacket {
        CtrlPacket {
            rank_select: 0,
            addr: 0,
            data: if failed { TEST_FAILED_STATUS_VALUE } else { 0 },
        }
    }

    fn cycle(n: u64) -> CtrlPacket {
        CtrlPacket {
            rank_select: 0,
            addr: (n >> 32) as u32,
            data: n as u32,
        }
    }

    /// Property 8: a single-engine run whose reported cycle count equals
    /// the total unrolled vector count, with no fail flag set, passes.
    #[test]
    fn property_8_single_engine_pass_cycle_semantics() {
        let mut device = MockDevice::new();
        device.push_response(ArtixSelect::A1, not_running(false));
        device.push_response(ArtixSelect::A1, not_running(false));
        device.push_response(ArtixSelect::A1, cycle(5));
        let mut t = Transport::new(device);

        let mask = build_enable_mask(&[0, 1, 2]);
        let outcome = t.run_pattern(Some(&mask), None, 0, 5).unwrap();

        assert!(!outcome.failed);
        assert_eq!(outcome.cycle_count, 5);
        assert!(outcome.fail_pins.is_none());
    }

    /// Property 8: a cycle count short of the total with no fail flag set
    /// (truncation/runaway) is still reported as a failure.
    #[test]
    fn property_8_cycle_short_of_total_is_a_failure() {
        let mut device = MockDevice::new();
        device.push_response(ArtixSelect::A1, not_running(false));
        device.push_response(ArtixSelect::A1, not_running(false));
        device.push_response(ArtixSelect::A1, cycle(3));
        device.a1_mem = vec![0u8; vector::DUT_NUM_PINS as usize];
        device.a1_mem[7] = 1;
        let mut t = Transport::new(device);

        let mask = build_enable_mask(&[0, 1, 2]);
        let outcome = t.run_pattern(Some(&mask), None, 0, 5).unwrap();

        assert!(outcome.failed);
        assert_eq!(outcome.cycle_count, 3);
    }

    /// Property 9: fail pins are projected into the 400-wide global vector
    /// at the right offset per engine (A1 `[0,199]`, A2 `[200,399]`).
    #[test]
    fn property_9_fail_pin_projection_by_engine() {
        let mut device = MockDevice::new();
        device.push_response(ArtixSelect::A1, not_running(true));
        device.push_response(ArtixSelect::A1, not_running(true));
        device.push_response(ArtixSelect::A1, cycle(5));
        device.push_response(ArtixSelect::A2, not_running(false));
        device.push_response(ArtixSelect::A2, cycle(5));
        device.a1_mem = vec![0u8; vector::DUT_NUM_PINS as usize];
        device.a1_mem[3] = 1;
        device.a2_mem = vec![0u8; vector::DUT_NUM_PINS as usize];
        device.a2_mem[10] = 1;
        let mut t = Transport::new(device);

        let a1_mask = build_enable_mask(&[3]);
        let a2_mask = build_enable_mask(&[10]);
        let outcome = t.run_pattern(Some(&a1_mask), Some(&a2_mask), 0, 5).unwrap();

        assert!(outcome.failed);
        let pins = outcome.fail_pins.unwrap();
        assert!(pins[3]);
        assert!(pins[vector::DUT_NUM_PINS as usize + 10]);
        assert!(!pins[4]);
    }

    /// Scenario S6: in dual mode, any mismatch between the two engines'
    /// reported cycle counts is unconditionally fatal, regardless of
    /// pass/fail state.
    #[test]
    fn scenario_s6_dual_engine_cycle_mismatch_is_fatal() {
        let mut device = MockDevice::new();
        device.push_response(ArtixSelect::A1, not_running(false));
        device.push_response(ArtixSelect::A1, not_running(false));
        device.push_response(ArtixSelect::A1, cycle(5));
        device.push_response(ArtixSelect::A2, not_running(false));
        device.push_response(ArtixSelect::A2, cycle(4));
        let mut t = Transport::new(device);

        let a1_mask = build_enable_mask(&[0]);
        let a2_mask = build_enable_mask(&[0]);
        let err = t
            .run_pattern(Some(&a1_mask), Some(&a2_mask), 0, 5)
            .unwrap_err();

        assert!(matches!(
            err,
            TransportError::CycleMismatch { a1: 5, a2: 4 }
        ));
    }

    /// Scenario S6 (pass path): matching cycle counts across both engines
    /// reconcile cleanly and the run passes.
    #[test]
    fn scenario_s6_dual_engine_matching_cycles_pass() {
        let mut device = MockDevice::new();
        device.push_response(ArtixSelect::A1, not_running(false));
        device.push_response(ArtixSelect::A1, not_running(false));
        device.push_response(ArtixSelect::A1, cycle(5));
        device.push_response(ArtixSelect::A2, not_running(false));
        device.push_response(ArtixSelect::A2, cycle(5));
        let mut t = Transport::new(device);

        let a1_mask = build_enable_mask(&[0]);
        let a2_mask = build_enable_mask(&[0]);
        let outcome = t
            .run_pattern(Some(&a1_mask), Some(&a2_mask), 0, 5)
            .unwrap();

        assert!(!outcome.failed);
        assert_eq!(outcome.cycle_count, 5);
    }
}
