// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Program runtime (§3.6/§4.6): loads, places, executes and reports results
//! for many patterns per test program, with the verb table of §4.6 exposed
//! as plain methods (the scripting interpreter that calls them is out of
//! scope per §1). Grounded on `examples/original_source/prgm.h`/`prgm.c`.

mod db;
mod loader;

use std::collections::BTreeMap;
use std::path::Path;

use profile::Engine;
use profile::Profile;
use profile::ProfilePin;
use remain::sorted;
use stim::Stim;
use thiserror::Error;
use transport::Device;
use transport::Transport;

pub use db::Db;
pub use db::DbError;
pub use loader::read_stim_by_path;
pub use loader::write_stim_to_path;

/// The `prgms`/`stims`/`jobs` state bitmask (§6.3), mirrored in-memory so
/// `state()` answers even when no database is attached. The original always
/// maintained this on the in-memory program regardless of persistence; it
/// is additive bookkeeping, not excluded by any Non-goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    None,
    Idle,
    Pending,
    Running,
    Killing,
    Killed,
    Done,
}

#[sorted]
#[derive(Error, Debug)]
pub enum ProgramError {
    #[error("address {addr} is already loaded on engine {engine:?}")]
    AlreadyLoaded { addr: u64, engine: Engine },
    #[error("failed to read/write {0}: {1}")]
    Io(String, #[source] std::io::Error),
    #[error("no pattern loaded at address {addr} on engine {engine:?}")]
    NotLoaded { addr: u64, engine: Engine },
    #[error(transparent)]
    Persistence(#[from] DbError),
    #[error(transparent)]
    Profile(#[from] profile::ProfileError),
    #[error(transparent)]
    Stim(#[from] stim::StimError),
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
    #[error("unknown stimulus file extension: {0}")]
    UnknownStimExtension(String),
}

pub type Result<T> = std::result::Result<T, ProgramError>;

/// A pair of per-engine on-board addresses identifying one loaded pattern.
/// A single-engine pattern leaves the other field `None`; a dual pattern
/// carries the same numeric address in both (§4.6: "a dual stimulus
/// occupies matching addresses in both engines").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AddrPair {
    pub a1: Option<u64>,
    pub a2: Option<u64>,
}

impl AddrPair {
    pub fn single(engine: Engine, addr: u64) -> AddrPair {
        match engine {
            Engine::A1 => AddrPair { a1: Some(addr), a2: None },
            Engine::A2 => AddrPair { a1: None, a2: Some(addr) },
            Engine::Dual => AddrPair { a1: Some(addr), a2: Some(addr) },
            Engine::None => AddrPair::default(),
        }
    }
}

/// The aggregate result of one `run`/`runc` call (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunSummary {
    pub tests_ran: usize,
    pub failed: bool,
    /// The first failing pattern's cycle count, or the last pattern's cycle
    /// count if every pattern passed.
    pub fail_cycle: u64,
}

/// Everything needed to re-run or unload one already-loaded pattern on one
/// engine. Two entries (one per engine table) back a dual pattern.
#[derive(Debug, Clone)]
struct LoadedPattern {
    /// The column pin list the source stim was compiled against; used both
    /// to derive the per-engine enable mask and to answer `get-pin-names`.
    pins: Vec<ProfilePin>,
    num_unrolled_vecs: u64,
    num_padding_vecs: u32,
    path: String,
}

/// The last pattern that finished `run`/`runc`, kept for the result-query
/// verbs (§4.6: "operate on the last pattern that finished run/runc").
struct LastPattern {
    pins: Vec<ProfilePin>,
    fail_pins: Option<[bool; vector::DUT_TOTAL_NUM_PINS as usize]>,
}

/// Ties together the board profile, the transport, the per-engine load
/// address allocators and (optionally) persistence (§3.6).
pub struct Program<D: Device> {
    profile: Profile,
    transport: Transport<D>,
    a1_addr: u64,
    a2_addr: u64,
    a1_loaded: BTreeMap<u64, LoadedPattern>,
    a2_loaded: BTreeMap<u64, LoadedPattern>,
    last_pattern: Option<LastPattern>,
    db: Option<Db>,
    prgm_id: Option<i64>,
    state: ProgramState,
}

/// §3.1: the config-pin `dut_id` assumed for bitstream-sourced stimuli read
/// through `reads`/`load`. The verb table has no `dut_id` argument, so a
/// single-DUT-per-program assumption (the common case for one test program)
/// is the simplest resolution; multi-DUT profiles would need a richer verb.
const DEFAULT_DUT_ID: u32 = 0;

impl<D: Device> Program<D> {
    /// Builds a program runtime with no persistence; every §4.6.1 call
    /// becomes a no-op.
    pub fn new(profile: Profile, device: D) -> Program<D> {
        Program {
            profile,
            transport: Transport::new(device),
            a1_addr: 0,
            a2_addr: 0,
            a1_loaded: BTreeMap::new(),
            a2_loaded: BTreeMap::new(),
            last_pattern: None,
            db: None,
            prgm_id: None,
            state: ProgramState::Idle,
        }
    }

    /// Builds a program runtime with persistence enabled (§4.6.1/§6.3):
    /// opens (creating if needed) the database at `db_path`, registers a
    /// new `prgms` row for `program_path` under `job_id`, and records its
    /// id as "the program id" every later `run`/`runc` call logs against.
    pub fn with_persistence(
        profile: Profile,
        device: D,
        db_path: impl AsRef<Path>,
        job_id: Option<i64>,
        program_path: &str,
    ) -> Result<Program<D>> {
        let db = Db::open(db_path)?;
        let prgm_id = db.insert_prgm(job_id, program_path)?;
        let mut program = Program::new(profile, device);
        program.db = Some(db);
        program.prgm_id = Some(prgm_id);
        Ok(program)
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// The program's current `PRGM_*` state (§3.6/§6.3), maintained
    /// in-memory whether or not persistence is attached.
    pub fn state(&self) -> ProgramState {
        self.state
    }

    /// `exit`: out-of-process termination is the embedding CLI's
    /// responsibility (§1), so in library form this only marks the
    /// in-memory state `Killed` and is otherwise a no-op.
    pub fn exit(&mut self) {
        self.state = ProgramState::Killed;
    }

    pub fn transport_mut(&mut self) -> &mut Transport<D> {
        &mut self.transport
    }

    /// `set-profile`: replaces the board profile (§4.6). Any patterns
    /// already loaded stay loaded under the old profile's pin list; only
    /// subsequent `reads`/`load` calls see the new one.
    pub fn set_profile(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.profile = Profile::load(path)?;
        Ok(())
    }

    /// `reads`: compiles or deserializes `path` into a `Stim` handle the
    /// caller then passes to `writes`/`loads`/`loada`.
    pub fn reads(&self, path: impl AsRef<Path>) -> Result<Stim> {
        let config_pins = self
            .profile
            .config_profile_pins(DEFAULT_DUT_ID)?
            .into_iter()
            .cloned()
            .collect();
        Ok(loader::read_stim_by_path(path.as_ref(), config_pins)?)
    }

    /// `writes`: serializes `stim` to `path` in the RAW container format,
    /// the only stimulus writer this runtime implements (§4.4.6).
    pub fn writes(&self, stim: &mut Stim, path: impl AsRef<Path>) -> Result<()> {
        loader::write_stim_to_path(stim, path.as_ref())?;
        Ok(())
    }

    /// `load`: reads `path` then loads it at the next free address per
    /// engine it occupies.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<AddrPair> {
        let path = path.as_ref();
        let mut stim = self.reads(path)?;
        self.loads_named(&mut stim, path.display().to_string())
    }

    /// `loads`: loads an already-built `Stim` at the next free address per
    /// engine it occupies (§4.6).
    pub fn loads(&mut self, stim: &mut Stim) -> Result<AddrPair> {
        self.loads_named(stim, "<in-memory>".to_string())
    }

    fn loads_named(&mut self, stim: &mut Stim, path: String) -> Result<AddrPair> {
        let touches_a1 = !stim.a1_vec_chunks.is_empty();
        let touches_a2 = !stim.a2_vec_chunks.is_empty();
        let addr = if touches_a1 && touches_a2 {
            self.a1_addr.max(self.a2_addr)
        } else if touches_a1 {
            self.a1_addr
        } else {
            self.a2_addr
        };
        self.loada_named(stim, addr, path)
    }

    /// `loada`: loads `stim` at the caller-chosen address `addr`, the same
    /// address used on both engines for a dual stimulus. Loading twice at
    /// the same address on the same engine is an error.
    pub fn loada(&mut self, stim: &mut Stim, addr: u64) -> Result<AddrPair> {
        self.loada_named(stim, addr, "<in-memory>".to_string())
    }

    fn loada_named(&mut self, stim: &mut Stim, addr: u64, path: String) -> Result<AddrPair> {
        let mut result = AddrPair::default();

        if !stim.a1_vec_chunks.is_empty() {
            self.load_one_engine(stim, Engine::A1, addr, &path)?;
            result.a1 = Some(addr);
        }
        if !stim.a2_vec_chunks.is_empty() {
            self.load_one_engine(stim, Engine::A2, addr, &path)?;
            result.a2 = Some(addr);
        }
        Ok(result)
    }

    fn load_one_engine(&mut self, stim: &mut Stim, engine: Engine, addr: u64, path: &str) -> Result<()> {
        let table = match engine {
            Engine::A1 => &self.a1_loaded,
            Engine::A2 => &self.a2_loaded,
            _ => unreachable!("load_one_engine is only called with A1/A2"),
        };
        if table.contains_key(&addr) {
            return Err(ProgramError::AlreadyLoaded { addr, engine });
        }

        let select = transport::ArtixSelect::from(engine);
        let mut offset = 0u64;
        while let Some(chunk) = stim.load_next_chunk(engine)? {
            let data = chunk.vec_data.as_ref().expect("ensure_loaded just populated this chunk");
            self.transport.mem_write(select, addr + offset, data)?;
            offset += data.len() as u64;
        }

        let entry = LoadedPattern {
            pins: stim.pins.clone(),
            num_unrolled_vecs: stim.num_unrolled_vecs,
            num_padding_vecs: stim.num_padding_vecs,
            path: path.to_string(),
        };
        match engine {
            Engine::A1 => {
                self.a1_loaded.insert(addr, entry);
                self.a1_addr = self.a1_addr.max(addr + offset);
            }
            Engine::A2 => {
                self.a2_loaded.insert(addr, entry);
                self.a2_addr = self.a2_addr.max(addr + offset);
            }
            _ => unreachable!(),
        }
        Ok(())
    }

    /// `unload`: removes the loaded-pattern entries at `addrs`. Unloading an
    /// address that isn't currently loaded is a no-op on that engine; a
    /// dual stimulus whose two matching addresses are passed together is
    /// only ever removed once per engine table (there is exactly one entry
    /// per table regardless of how many times its address is named).
    pub fn unload(&mut self, addrs: AddrPair) -> Result<()> {
        if let Some(a) = addrs.a1 {
            self.a1_loaded.remove(&a);
        }
        if let Some(a) = addrs.a2 {
            self.a2_loaded.remove(&a);
        }
        Ok(())
    }

    /// `unload-all`: clears every loaded pattern on both engines and resets
    /// both load-address cursors to 0. Returns the count removed per engine.
    pub fn unload_all(&mut self) -> (usize, usize) {
        let a1_count = self.a1_loaded.len();
        let a2_count = self.a2_loaded.len();
        self.a1_loaded.clear();
        self.a2_loaded.clear();
        self.a1_addr = 0;
        self.a2_addr = 0;
        (a1_count, a2_count)
    }

    fn engine_mask(pins: &[ProfilePin], want: Engine) -> [u8; transport::pattern::ENABLE_MASK_SIZE] {
        let ids: Vec<u32> = pins
            .iter()
            .filter(|p| p.engine() == want)
            .filter_map(|p| p.clamped_dut_io_id())
            .collect();
        transport::pattern::build_enable_mask(&ids)
    }

    /// Runs the pattern loaded at `addrs`, recording it as the last pattern
    /// and (if persistence is enabled) logging the outcome.
    fn run_one(&mut self, addrs: AddrPair) -> Result<transport::PatternOutcome> {
        let a1_entry = match addrs.a1 {
            Some(a) => Some(
                self.a1_loaded
                    .get(&a)
                    .cloned()
                    .ok_or(ProgramError::NotLoaded { addr: a, engine: Engine::A1 })?,
            ),
            None => None,
        };
        let a2_entry = match addrs.a2 {
            Some(a) => Some(
                self.a2_loaded
                    .get(&a)
                    .cloned()
                    .ok_or(ProgramError::NotLoaded { addr: a, engine: Engine::A2 })?,
            ),
            None => None,
        };

        let source = a1_entry.as_ref().or(a2_entry.as_ref()).expect("at least one engine loaded");
        let pins = source.pins.clone();
        let total_unrolled = source.num_unrolled_vecs + source.num_padding_vecs as u64;
        let run_addr = addrs.a1.or(addrs.a2).expect("at least one address present");
        let path = source.path.clone();

        let a1_mask = a1_entry.as_ref().map(|e| Self::engine_mask(&e.pins, Engine::A1));
        let a2_mask = a2_entry.as_ref().map(|e| Self::engine_mask(&e.pins, Engine::A2));

        let outcome = self
            .transport
            .run_pattern(a1_mask.as_ref(), a2_mask.as_ref(), run_addr, total_unrolled)?;

        self.last_pattern = Some(LastPattern {
            pins: pins.clone(),
            fail_pins: outcome.fail_pins,
        });

        self.log_run(&path, &outcome)?;

        Ok(outcome)
    }

    /// §4.6.1: records one `stims` row plus any `fail_pins` rows, and
    /// updates the `prgms` aggregate columns, all in one transaction. A
    /// failure to write is itself fatal so results are never silently lost.
    fn log_run(&mut self, path: &str, outcome: &transport::PatternOutcome) -> Result<()> {
        let (db, prgm_id) = match (self.db.as_mut(), self.prgm_id) {
            (Some(db), Some(id)) => (db, id),
            _ => return Ok(()),
        };
        let tx = db.begin()?;
        let stim_id = db::insert_stim(&tx, prgm_id, path)?;
        db::update_stim_result(&tx, stim_id, outcome.failed, outcome.cycle_count as i64)?;
        if let Some(fail_pins) = &outcome.fail_pins {
            for (dut_io_id, failed) in fail_pins.iter().enumerate() {
                if *failed {
                    db::insert_fail_pin(&tx, stim_id, dut_io_id as i64)?;
                }
            }
        }
        db::update_prgm_result(&tx, prgm_id, stim_id, outcome.failed, outcome.cycle_count as i64)?;
        db::insert_prgm_log(
            &tx,
            prgm_id,
            &format!("ran {path}: failed={} cycle={}", outcome.failed, outcome.cycle_count),
        )?;
        tx.commit()?;
        Ok(())
    }

    /// `run`: executes each address pair in order, stopping at the first
    /// failure.
    pub fn run(&mut self, addrs: &[AddrPair]) -> Result<RunSummary> {
        self.run_impl(addrs, true)
    }

    /// `runc`: executes every address pair regardless of intermediate
    /// failures.
    pub fn runc(&mut self, addrs: &[AddrPair]) -> Result<RunSummary> {
        self.run_impl(addrs, false)
    }

    fn run_impl(&mut self, addrs: &[AddrPair], stop_on_fail: bool) -> Result<RunSummary> {
        self.state = ProgramState::Running;
        let mut summary = RunSummary::default();
        for &pair in addrs {
            let outcome = self.run_one(pair)?;
            summary.tests_ran += 1;
            summary.fail_cycle = outcome.cycle_count;
            if outcome.failed {
                summary.failed = true;
                if stop_on_fail {
                    break;
                }
            }
        }
        self.state = ProgramState::Done;
        Ok(summary)
    }

    /// `get-pin-names`: the last finished pattern's column pin names, or
    /// empty if none has run yet.
    pub fn get_pin_names(&self) -> Vec<String> {
        match &self.last_pattern {
            Some(p) => p.pins.iter().map(|pin| pin.pin_name.clone()).collect(),
            None => Vec::new(),
        }
    }

    /// `get-fail-pins`: a boolean list parallel to `get-pin-names`, true at
    /// each pin whose `dut_io_id` failed in the last finished pattern.
    pub fn get_fail_pins(&self) -> Vec<bool> {
        match &self.last_pattern {
            Some(p) => p
                .pins
                .iter()
                .map(|pin| match (p.fail_pins, pin.dut_io_id) {
                    (Some(bits), id) if (0..vector::DUT_TOTAL_NUM_PINS as i32).contains(&id) => bits[id as usize],
                    _ => false,
                })
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profile::{Dest, ProfileTag};
    use transport::device::MockDevice;
    use transport::device::CtrlPacket;

    fn pin(name: &str, tag: ProfileTag, dut_io_id: i32, tag_data: i32) -> ProfilePin {
        ProfilePin {
            pin_name: name.to_string(),
            comp_name: "A1".to_string(),
            net_name: format!("n_{name}"),
            net_alias: None,
            tag,
            tag_data,
            dut_io_id,
            dests: vec![Dest { dut_id: 0, pin_name: name.to_string() }],
        }
    }

    fn single_pin_profile() -> Profile {
        Profile {
            path: None,
            board_name: "unit-test".to_string(),
            description: String::new(),
            revision: 1,
            num_duts: 1,
            pins: vec![pin("P0", ProfileTag::None, 0, -1)],
        }
    }

    fn tiny_stim(profile: &Profile) -> Stim {
        let pins: Vec<ProfilePin> = profile.pins.clone();
        let mut dots = dots::Dots::new(1, 8);
        for _ in 0..8 {
            dots.append(1, "1", 0).unwrap();
        }
        stim::compile_from_dots(pins, &mut dots).unwrap()
    }

    fn not_running(failed: bool) -> CtrlPacket {
        CtrlPacket { rank_select: 0, addr: 0, data: if failed { 0x0001_0000 } else { 0 } }
    }

    fn cycle(n: u64) -> CtrlPacket {
        CtrlPacket { rank_select: 0, addr: (n >> 32) as u32, data: n as u32 }
    }

    #[test]
    fn load_run_and_unload_round_trip_on_a_single_engine() {
        let profile = single_pin_profile();
        let mut stim = tiny_stim(&profile);

        let mut device = MockDevice::new();
        device.push_response(transport::ArtixSelect::A1, not_running(false));
        device.push_response(transport::ArtixSelect::A1, not_running(false));
        device.push_response(transport::ArtixSelect::A1, cycle(8));
        let mut program = Program::new(profile, device);

        let addrs = program.loads(&mut stim).unwrap();
        assert_eq!(addrs.a1, Some(0));
        assert_eq!(addrs.a2, None);

        let summary = program.run(&[addrs]).unwrap();
        assert_eq!(summary.tests_ran, 1);
        assert!(!summary.failed);
        assert_eq!(summary.fail_cycle, 8);

        assert_eq!(program.get_pin_names(), vec!["P0".to_string()]);
        assert_eq!(program.get_fail_pins(), vec![false]);

        program.unload(addrs).unwrap();
        let (a1_count, a2_count) = program.unload_all();
        assert_eq!((a1_count, a2_count), (0, 0));
    }

    #[test]
    fn loading_twice_at_the_same_address_is_an_error() {
        let profile = single_pin_profile();
        let mut stim_a = tiny_stim(&profile);
        let mut stim_b = tiny_stim(&profile);
        let mut program = Program::new(profile, MockDevice::new());

        program.loada(&mut stim_a, 0).unwrap();
        let err = program.loada(&mut stim_b, 0).unwrap_err();
        assert!(matches!(err, ProgramError::AlreadyLoaded { addr: 0, engine: Engine::A1 }));
    }

    #[test]
    fn runc_keeps_going_past_a_failure_while_run_stops() {
        let profile = single_pin_profile();
        let mut device = MockDevice::new();
        for _ in 0..2 {
            device.push_response(transport::ArtixSelect::A1, not_running(true));
            device.push_response(transport::ArtixSelect::A1, not_running(true));
            device.push_response(transport::ArtixSelect::A1, cycle(8));
        }
        let mut program = Program::new(profile.clone(), device);

        let mut stim_a = tiny_stim(&profile);
        let mut stim_b = tiny_stim(&profile);
        let addr_a = program.loada(&mut stim_a, 0).unwrap();
        let addr_b = program.loada(&mut stim_b, 1024).unwrap();

        let summary = program.run(&[addr_a, addr_b]).unwrap();
        assert_eq!(summary.tests_ran, 1);
        assert!(summary.failed);
    }

    #[test]
    fn state_tracks_idle_running_done_and_exit() {
        let profile = single_pin_profile();
        let mut device = MockDevice::new();
        device.push_response(transport::ArtixSelect::A1, not_running(false));
        device.push_response(transport::ArtixSelect::A1, not_running(false));
        device.push_response(transport::ArtixSelect::A1, cycle(8));
        let mut program = Program::new(profile.clone(), device);
        assert_eq!(program.state(), ProgramState::Idle);

        let mut stim = tiny_stim(&profile);
        let addrs = program.loads(&mut stim).unwrap();
        program.run(&[addrs]).unwrap();
        assert_eq!(program.state(), ProgramState::Done);

        program.exit();
        assert_eq!(program.state(), ProgramState::Killed);
    }

    #[test]
    fn persistence_records_a_stim_row_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let profile = single_pin_profile();
        let mut device = MockDevice::new();
        device.push_response(transport::ArtixSelect::A1, not_running(false));
        device.push_response(transport::ArtixSelect::A1, not_running(false));
        device.push_response(transport::ArtixSelect::A1, cycle(8));

        let mut program = Program::with_persistence(
            profile.clone(),
            device,
            dir.path().join("ate.sqlite3"),
            None,
            "/tmp/my.prgm",
        )
        .unwrap();

        let mut stim = tiny_stim(&profile);
        let addrs = program.loads(&mut stim).unwrap();
        program.run(&[addrs]).unwrap();

        let db = program.db.as_ref().unwrap();
        let count: i64 = db
            .conn_for_test()
            .query_row("SELECT COUNT(*) FROM stims", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
