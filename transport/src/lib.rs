// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Device transport: the layered driver FSM, DMA framing and pattern
//! execution sequencing that sits between `stim`'s compiled vectors and the
//! `/dev/gcore` character device. Grounded on
//! `examples/original_source/board/{helper.c,subcore.c,artix.c,dma.c}`.

pub mod config;
pub mod device;
pub mod dma;
pub mod memtest;
pub mod pattern;
pub mod regs;
pub mod states;

use remain::sorted;
use thiserror::Error;

pub use device::CtrlPacket;
pub use device::Device;
pub use device::DmaChannel;
pub use device::KernelDevice;
pub use device::MockDevice;
pub use device::Registers;
pub use pattern::PatternOutcome;
pub use states::ArtixSelect;

#[sorted]
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("cannot select both engines for a load operation")]
    BothEnginesSelected,
    #[error("dual-mode test cycle mismatch between engines (a1: {a1}, a2: {a2})")]
    CycleMismatch { a1: u64, a2: u64 },
    #[error("dma buffer too small: requested {requested} bytes, available {available}")]
    DmaBufferTooSmall { requested: usize, available: usize },
    #[error("subcore reported INIT_ERROR after agent startup")]
    InitError,
    #[error(transparent)]
    Io(#[from] base::Error),
    #[error("payload of {0} bytes exceeds the {1}-byte single-call arena cap")]
    PayloadTooLarge(usize, usize),
    #[error("no engine selected for this operation")]
    NoEngineSelected,
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Drives the layered FSM on top of a `Device`: agent startup, memory
/// write/read framing, pattern execution and the FPGA config shortcut.
/// Generic over the backend so tests run against `MockDevice` and
/// production code runs against `KernelDevice` with identical sequencing.
pub struct Transport<D: Device> {
    device: D,
    a1_started: bool,
    a2_started: bool,
}

impl<D: Device> Transport<D> {
    pub fn new(device: D) -> Transport<D> {
        Transport {
            device,
            a1_started: false,
            a2_started: false,
        }
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn engine_started(&self, select: ArtixSelect) -> bool {
        match select {
            ArtixSelect::A1 => self.a1_started,
            ArtixSelect::A2 => self.a2_started,
            _ => false,
        }
    }

    fn mark_started(&mut self, select: ArtixSelect) {
        match select {
            ArtixSelect::A1 => self.a1_started = true,
            ArtixSelect::A2 => self.a2_started = true,
            _ => {}
        }
    }

    /// Runs `subcore load(state) -> run -> wait_idle`, the one-shot
    /// primitive every higher sequence in this module is built from
    /// (`helper_subcore_load`).
    fn subcore_load(&mut self, select: ArtixSelect, subcore_state: u32) -> TransportResult<()> {
        if select == ArtixSelect::Both {
            return Err(TransportError::BothEnginesSelected);
        }
        self.device.load_state(select, subcore_state)?;
        self.device.run()?;
        self.device.wait_idle()
    }

    /// Proxies one control word to the agent: load `CTRL_WRITE`, write the
    /// word, wait idle, load `CTRL_RUN`, wait idle again
    /// (`helper_agent_load`'s tail after startup).
    fn agent_load(&mut self, select: ArtixSelect, agent_state: u32) -> TransportResult<()> {
        self.ensure_started(select)?;
        self.ctrl_write_word(select, agent_state)?;
        self.subcore_load(select, states::SubcoreState::CtrlRun as u32)
    }

    fn ctrl_write_word(&mut self, select: ArtixSelect, data: u32) -> TransportResult<()> {
        self.subcore_load(select, states::SubcoreState::CtrlWrite as u32)?;
        self.device.ctrl_write(CtrlPacket {
            rank_select: 0,
            addr: 0,
            data,
        })
    }

    fn ctrl_read_word(&mut self, select: ArtixSelect) -> TransportResult<CtrlPacket> {
        self.subcore_load(select, states::SubcoreState::CtrlRead as u32)?;
        let packet = self.device.ctrl_read()?;
        self.device.wait_idle()?;
        Ok(packet)
    }

    /// Loads the gvpu with `gvpu_state` by proxying through the agent: put
    /// the agent in `GVPU_LOAD` proxy mode, write the word, then run it
    /// with `GVPU_RUN` (`helper_gvpu_load`/`helper_gvpu_packet_write`).
    fn gvpu_load(&mut self, select: ArtixSelect, gvpu_state: u32) -> TransportResult<()> {
        self.agent_load(select, states::AgentState::GvpuLoad as u32)?;
        self.ctrl_write_word(select, gvpu_state)?;
        self.device.wait_idle()?;
        self.agent_load(select, states::AgentState::GvpuRun as u32)
    }

    /// The one-shot `AGENT_STARTUP` handshake (§4.5.4). `INIT_ERROR` in the
    /// subcore status after it is fatal. Safe to call repeatedly; a no-op
    /// once the engine has already started this power cycle.
    fn ensure_started(&mut self, select: ArtixSelect) -> TransportResult<()> {
        if self.engine_started(select) {
            return Ok(());
        }
        let already_done = {
            let regs = self.device.regs()?;
            let status = match select {
                ArtixSelect::A1 => regs.a1_status,
                ArtixSelect::A2 => regs.a2_status,
                _ => return Err(TransportError::NoEngineSelected),
            };
            status & regs::AGENT_STARTUP_DONE_MASK == regs::AGENT_STARTUP_DONE_MASK
        };
        if !already_done {
            self.subcore_load(select, states::SubcoreState::AgentStartup as u32)?;
            let regs = self.device.regs()?;
            if regs.status & regs::STATUS_INIT_ERROR_MASK == regs::STATUS_INIT_ERROR_MASK {
                return Err(TransportError::InitError);
            }
        }
        self.mark_started(select);
        Ok(())
    }

    /// The agent/gvpu status word, read through a `STATUS` ctrl-read
    /// round-trip (`helper_get_agent_status`).
    fn agent_status(&mut self, select: ArtixSelect) -> TransportResult<CtrlPacket> {
        self.agent_load(select, states::AgentState::Status as u32)?;
        self.ctrl_read_word(select)
    }

    /// `(cycle_count_high << 32) | cycle_count_low`, via the `GVPU_CYCLE`
    /// proxy state (`helper_get_agent_status_cycle`). `GVPU_CYCLE` is not
    /// among the named `AgentState` variants in the state table (§4.5.3);
    /// it shares the agent's `STATUS` proxy slot, distinguished on-wire by
    /// the exec unit having already been placed in `TEST_RUN`/`TEST_FAIL_PINS`.
    fn agent_status_cycle(&mut self, select: ArtixSelect) -> TransportResult<u64> {
        let packet = self.agent_status(select)?;
        Ok(((packet.addr as u64) << 32) | packet.data as u64)
    }
}
