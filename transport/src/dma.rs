// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Memory write/read framing (§4.5.5/§4.5.6), grounded on
//! `examples/original_source/board/{artix.c,dma.c}`'s burst/DMA sequencing.

use crate::device::Device;
use crate::device::DmaChannel;
use crate::regs;
use crate::states::ArtixSelect;
use crate::states::ExecUnitState;
use crate::states::MemcoreState;
use crate::states::SubcoreState;
use crate::Transport;
use crate::TransportError;
use crate::TransportResult;

/// Host-side arena cap for one `mem_write`/`mem_read` call (§4.5.5's
/// "maximum single call"; matches `common.h`'s `MAX_CHUNK_SIZE`).
pub const MAX_CALL_SIZE: usize = regs::MAX_CHUNK_SIZE as usize;
/// Per-descriptor DMA write frame cap: a multiple of both 1024 and the
/// 4096 B kernel page (§4.5.5 step 4).
pub const MAX_WRITE_FRAME_BYTES: usize = 8_384_512;
/// Per-transaction DMA read burst cap, `(2^23 - 4096) / 128` (§4.5.6).
pub const MAX_READ_BURSTS_PER_FRAME: u32 = 65_504;

fn bursts_for(len: usize) -> u32 {
    ((len + regs::BURST_BYTES as usize - 1) / regs::BURST_BYTES as usize) as u32
}

impl<D: Device> Transport<D> {
    /// Writes `data` to engine memory at address `addr` (§4.5.5). `data`
    /// must fit in one call (`MAX_CALL_SIZE`); larger payloads are the
    /// caller's responsibility to split into multiple calls.
    pub fn mem_write(&mut self, select: ArtixSelect, addr: u64, data: &[u8]) -> TransportResult<usize> {
        if select == ArtixSelect::Both {
            return Err(TransportError::BothEnginesSelected);
        }
        if data.len() > MAX_CALL_SIZE {
            return Err(TransportError::PayloadTooLarge(data.len(), MAX_CALL_SIZE));
        }
        self.ensure_started(select)?;

        let total_bursts = bursts_for(data.len());
        self.load_memcore_burst(select, MemcoreState::WriteBurst, total_bursts)?;
        self.gvpu_load(select, ExecUnitState::MemWrite as u32)?;
        self.agent_load(select, crate::states::AgentState::BurstLoad as u32)?;
        self.subcore_load(select, SubcoreState::SetupBurst as u32)?;
        self.subcore_load(select, SubcoreState::DmaWrite as u32)?;

        let (rank_select, addr_low) = regs::split_rank_addr(addr);
        let mut written = 0usize;
        for frame in data.chunks(MAX_WRITE_FRAME_BYTES) {
            let chan = DmaChannel {
                chan: rank_select,
                buf_offset: addr_low.wrapping_add(written as u32),
                buf_size: frame.len() as u32,
            };
            self.device.dma_write(chan, frame)?;
            written += frame.len();
        }

        self.gvpu_load(select, ExecUnitState::TestCleanup as u32)?;
        self.device.wait_idle()?;
        Ok((total_bursts as usize) * regs::BURST_BYTES as usize)
    }

    /// Reads `len` bytes from engine memory at address `addr` into `out`
    /// (§4.5.6). `len` must fit in one call.
    pub fn mem_read(&mut self, select: ArtixSelect, addr: u64, out: &mut [u8]) -> TransportResult<usize> {
        if select == ArtixSelect::Both {
            return Err(TransportError::BothEnginesSelected);
        }
        if out.len() > MAX_CALL_SIZE {
            return Err(TransportError::PayloadTooLarge(out.len(), MAX_CALL_SIZE));
        }
        self.ensure_started(select)?;

        let (rank_select, addr_low) = regs::split_rank_addr(addr);
        let max_frame_bytes = MAX_READ_BURSTS_PER_FRAME as usize * regs::BURST_BYTES as usize;
        let mut read = 0usize;
        for frame in out.chunks_mut(max_frame_bytes) {
            let frame_bursts = bursts_for(frame.len());
            self.load_memcore_burst(select, MemcoreState::ReadBurst, frame_bursts)?;
            self.gvpu_load(select, ExecUnitState::MemRead as u32)?;
            self.agent_load(select, crate::states::AgentState::BurstLoad as u32)?;
            self.subcore_load(select, SubcoreState::SetupBurst as u32)?;
            self.subcore_load(select, SubcoreState::DmaRead as u32)?;

            let chan = DmaChannel {
                chan: rank_select,
                buf_offset: addr_low.wrapping_add(read as u32),
                buf_size: frame.len() as u32,
            };
            self.device.dma_read(chan, frame)?;
            read += frame.len();
        }

        self.gvpu_load(select, ExecUnitState::TestCleanup as u32)?;
        self.device.wait_idle()?;
        Ok(read)
    }

    /// Places memcore in `state` with `num_bursts` as its operand, then
    /// verifies the state and burst count echo back in status
    /// (`helper_memcore_load`/`helper_memcore_check_state`).
    fn load_memcore_burst(
        &mut self,
        select: ArtixSelect,
        state: MemcoreState,
        num_bursts: u32,
    ) -> TransportResult<()> {
        self.gvpu_load(select, ExecUnitState::MemLoad as u32)?;
        let status = self.agent_status(select)?;
        if (status.data & 0x0000_00f0) != 0x0000_0030 {
            return Err(TransportError::InitError);
        }
        self.gvpu_load(select, state as u32 | (num_bursts << 8))?;
        self.gvpu_load(select, ExecUnitState::MemRun as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CtrlPacket;
    use crate::device::MockDevice;

    fn mem_load_ack() -> CtrlPacket {
        CtrlPacket {
            rank_select: 0,
            addr: 0,
            data: 0x0000_0030,
        }
    }

    #[test]
    fn mem_write_then_read_round_trips_through_mock_memory() {
        let mut device = MockDevice::new();
        device.push_response(ArtixSelect::A1, mem_load_ack());
        device.push_response(ArtixSelect::A1, mem_load_ack());
        let mut t = Transport::new(device);

        let payload = vec![0xabu8; 4096];
        let written = t.mem_write(ArtixSelect::A1, 0, &payload).unwrap();
        assert_eq!(written, bursts_for(payload.len()) as usize * regs::BURST_BYTES as usize);

        let mut readback = vec![0u8; payload.len()];
        let read = t.mem_read(ArtixSelect::A1, 0, &mut readback).unwrap();
        assert_eq!(read, payload.len());
        assert_eq!(readback, payload);
    }

    #[test]
    fn mem_write_rejects_both_engines_selected() {
        let mut t = Transport::new(MockDevice::new());
        let err = t.mem_write(ArtixSelect::Both, 0, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, TransportError::BothEnginesSelected));
    }

    #[test]
    fn bursts_for_rounds_up_to_whole_bursts() {
        assert_eq!(bursts_for(1), 1);
        assert_eq!(bursts_for(regs::BURST_BYTES as usize), 1);
        assert_eq!(bursts_for(regs::BURST_BYTES as usize + 1), 2);
    }
}
