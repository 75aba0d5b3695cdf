// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The four nested state-machine layers of one engine (§4.5.1-§4.5.3).
//! Values are carried over verbatim from
//! `examples/original_source/board/driver.h`'s `enum subcore_states`/
//! `enum agent_states`/`enum gvpu_states`/`enum memcore_states`/
//! `enum artix_selects`.

/// Which engine a control word is routed to. `Both` is only legal for the
/// cross-engine sync line (§4.5.1: "never addressed to more than one
/// engine at a time; `ARTIX_SELECT_BOTH` is forbidden for load
/// operations").
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ArtixSelect {
    #[default]
    None = 0,
    A1 = 1,
    A2 = 2,
    Both = 3,
}

impl From<profile::Engine> for ArtixSelect {
    fn from(e: profile::Engine) -> ArtixSelect {
        match e {
            profile::Engine::A1 => ArtixSelect::A1,
            profile::Engine::A2 => ArtixSelect::A2,
            profile::Engine::Dual => ArtixSelect::Both,
            profile::Engine::None => ArtixSelect::None,
        }
    }
}

/// The host-facing layer (§4.5.2). Every transition is `Idle -> target ->
/// Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SubcoreState {
    Idle = 0,
    Paused = 1,
    ConfigSetup = 2,
    ConfigLoad = 3,
    ConfigWait = 4,
    AgentStartup = 5,
    SetupBurst = 6,
    SetupWrite = 7,
    SetupRead = 8,
    SetupCleanup = 9,
    CtrlWrite = 10,
    CtrlRead = 11,
    CtrlRun = 12,
    DmaWrite = 13,
    DmaRead = 14,
    GpioDna = 15,
}

/// The agent layer, proxied to through subcore `CtrlWrite`/`CtrlRead`
/// (§4.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AgentState {
    Init = 0,
    Idle = 1,
    Paused = 2,
    Status = 3,
    BurstLoad = 4,
    GvpuLoad = 5,
    GvpuRun = 6,
    GvpuWrite = 7,
    GvpuRead = 8,
    GvpuStatus = 9,
    GvpuReset = 10,
}

/// The execution-unit ("gvpu") layer, proxied to through the agent
/// (§4.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ExecUnitState {
    Idle = 0,
    Paused = 1,
    MemBurst = 2,
    MemLoad = 3,
    MemRun = 4,
    MemWrite = 5,
    MemRead = 6,
    MemTest = 7,
    TestInit = 8,
    TestSetup = 9,
    TestRun = 10,
    TestFailPins = 11,
    TestCleanup = 12,
}

/// The memory-controller layer, proxied to through the execution unit
/// (§4.5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum MemcoreState {
    Idle = 0,
    Paused = 1,
    SetupBurst = 2,
    WriteBurst = 3,
    ReadBurst = 4,
}
