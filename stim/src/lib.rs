// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The stimulus compiler: turns dots programs or FPGA bitstreams into
//! chunked, per-engine sequences of 128-byte vectors, and serializes the
//! result to/from the RAW container. Grounded on
//! `examples/original_source/stim.h`/`stim.c`.

pub mod bitstream;
pub mod chunk;
pub mod compile;
pub mod container;

use dots::config_templates::{self, ConfigType};
use dots::Dots;
use profile::{Engine, ProfilePin};
use remain::sorted;
use thiserror::Error;

pub use bitstream::{BinReader, BitReader, BitstreamError, BitstreamWords, RbtReader, SyncEndian};
pub use chunk::VecChunk;
pub use compile::CompileError;
pub use container::ContainerError;

#[sorted]
#[derive(Error, Debug)]
pub enum StimError {
    #[error(transparent)]
    Bitstream(#[from] BitstreamError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("no chunks exist for engine {0:?}")]
    NoChunksForEngine(Engine),
    #[error("cannot iterate engine {wanted:?}'s chunks while engine {other:?}'s iteration is incomplete")]
    OtherEngineIterationIncomplete { wanted: Engine, other: Engine },
    #[error("profile pins have no valid engine affinity")]
    NoValidAffinity,
}

pub type Result<T> = std::result::Result<T, StimError>;

/// The source kind a stim was compiled or parsed from, retained for
/// deserialization dispatch (§3.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StimType {
    None,
    Rbt,
    Bin,
    Bit,
    Dots,
    Raw,
}

/// A compiled stimulus: two independent per-engine chunk arrays plus the
/// column pin list used to compile them (§3.5).
pub struct Stim {
    pub stim_type: StimType,
    pub pins: Vec<ProfilePin>,
    pub num_vecs: u32,
    pub num_unrolled_vecs: u64,
    pub num_padding_vecs: u32,
    pub a1_vec_chunks: Vec<VecChunk>,
    pub a2_vec_chunks: Vec<VecChunk>,
    cur_a1_chunk_id: Option<u32>,
    cur_a2_chunk_id: Option<u32>,
    iterating_engine: Option<Engine>,
}

impl Stim {
    /// §4.4.5: returns chunks in id order, unloading the previous one.
    /// Iterating engine B while engine A's iteration has not completed is
    /// rejected as fatal misuse.
    pub fn load_next_chunk(&mut self, engine: Engine) -> Result<Option<&VecChunk>> {
        if let Some(cur) = self.iterating_engine {
            if cur != engine {
                return Err(StimError::OtherEngineIterationIncomplete { wanted: engine, other: cur });
            }
        }
        match engine {
            Engine::A1 => {
                if let Some(id) = self.cur_a1_chunk_id {
                    self.a1_vec_chunks[id as usize].unload();
                }
                let next_id = self.cur_a1_chunk_id.map(|i| i + 1).unwrap_or(0);
                if next_id as usize >= self.a1_vec_chunks.len() {
                    self.iterating_engine = None;
                    self.cur_a1_chunk_id = None;
                    return Ok(None);
                }
                self.a1_vec_chunks[next_id as usize].ensure_loaded()?;
                self.cur_a1_chunk_id = Some(next_id);
                self.iterating_engine = Some(Engine::A1);
                Ok(Some(&self.a1_vec_chunks[next_id as usize]))
            }
            Engine::A2 => {
                if let Some(id) = self.cur_a2_chunk_id {
                    self.a2_vec_chunks[id as usize].unload();
                }
                let next_id = self.cur_a2_chunk_id.map(|i| i + 1).unwrap_or(0);
                if next_id as usize >= self.a2_vec_chunks.len() {
                    self.iterating_engine = None;
                    self.cur_a2_chunk_id = None;
                    return Ok(None);
                }
                self.a2_vec_chunks[next_id as usize].ensure_loaded()?;
                self.cur_a2_chunk_id = Some(next_id);
                self.iterating_engine = Some(Engine::A2);
                Ok(Some(&self.a2_vec_chunks[next_id as usize]))
            }
            other => Err(StimError::NoChunksForEngine(other)),
        }
    }
}

fn pin_refs(pins: &[ProfilePin]) -> Vec<&ProfilePin> {
    pins.iter().collect()
}

/// Builds burst-aligned, engine-partitioned chunk arrays for `compiled`
/// (§4.4.1/§4.4.4), filling each chunk in id order.
fn build_and_fill_chunks(
    compiled: &[compile::CompiledVec],
    pins: &[&ProfilePin],
    engine: Engine,
) -> Result<Vec<VecChunk>> {
    let total_vecs = compiled.len() as u32;
    let k = chunk::chunk_count(total_vecs);
    let mut chunks = Vec::with_capacity(k as usize);
    let mut cursor = 0usize;
    for id in 0..k {
        let n = chunk::vecs_in_chunk(id, k, total_vecs);
        let mut c = VecChunk::new(id, n);
        c.load();
        compile::fill_chunk(&mut c, compiled, &mut cursor, pins, engine)?;
        c.is_filled = true;
        chunks.push(c);
    }
    Ok(chunks)
}

/// Compiles a pure `dots::Dots` program (type `DOTS`) into a `Stim`,
/// partitioning vectors into A1/A2 chunk arrays by each pin's engine
/// affinity (§4.3/§4.4).
pub fn compile_from_dots(pins: Vec<ProfilePin>, dots: &mut Dots) -> Result<Stim> {
    let refs = pin_refs(&pins);
    let engine = profile::engine_affinity(&refs).map_err(|_| StimError::NoValidAffinity)?;

    let compiled = compile::expand_all(dots, 0..0, None)?;
    let num_vecs_uncompressed = compiled.len() as u32;
    let num_padding_vecs = compile::burst_padding(num_vecs_uncompressed);
    let num_vecs = num_vecs_uncompressed + num_padding_vecs;
    let num_unrolled_vecs: u64 = compiled
        .iter()
        .map(|cv| cv.repeat as u64 * if cv.has_clk { 2 } else { 1 })
        .sum();
    compile::check_bounds(num_vecs, num_unrolled_vecs)?;

    let mut padded = compiled;
    if num_padding_vecs > 0 {
        let last = padded.last().map(|cv| cv.subvecs.clone()).unwrap_or_default();
        for _ in 0..num_padding_vecs {
            padded.push(compile::CompiledVec {
                repeat: 1,
                has_clk: false,
                subvecs: last.clone(),
            });
        }
    }

    let (a1_vec_chunks, a2_vec_chunks) = match engine {
        Engine::A1 => (build_and_fill_chunks(&padded, &refs, Engine::A1)?, vec![]),
        Engine::A2 => (vec![], build_and_fill_chunks(&padded, &refs, Engine::A2)?),
        Engine::Dual => (
            build_and_fill_chunks(&padded, &refs, Engine::A1)?,
            build_and_fill_chunks(&padded, &refs, Engine::A2)?,
        ),
        Engine::None => return Err(StimError::NoValidAffinity),
    };

    Ok(Stim {
        stim_type: StimType::Dots,
        pins,
        num_vecs,
        num_unrolled_vecs,
        num_padding_vecs,
        a1_vec_chunks,
        a2_vec_chunks,
        cur_a1_chunk_id: None,
        cur_a2_chunk_id: None,
        iterating_engine: None,
    })
}

/// Compiles an FPGA configuration bitstream (RBT/BIN/BIT) into a `Stim`
/// using the frozen header/body/footer templates (§3.4/§4.4.3/§4.4.4).
/// `pins` must be the 39-entry `config_profile_pins` order (§4.1).
pub fn compile_from_bitstream(
    stim_type: StimType,
    pins: Vec<ProfilePin>,
    mut words: impl BitstreamWords,
) -> Result<Stim> {
    let refs = pin_refs(&pins);
    let engine = profile::engine_affinity(&refs).map_err(|_| StimError::NoValidAffinity)?;
    let num_columns = config_templates::NUM_CONFIG_COLUMNS + profile::NUM_DATA_PINS as usize;

    let body_words: Vec<u32> = std::iter::from_fn(|| words.next_word()).collect();

    let mut dots = Dots::new(num_columns, 8 + body_words.len() + 4 + 8);
    for entry in config_templates::CONFIG_HEADER {
        dots.append(entry.repeat, entry.vec_str, profile::NUM_DATA_PINS as usize)?;
    }
    let body_start = dots.len();
    for _ in &body_words {
        let body = config_templates::CONFIG_BODY[0];
        dots.append(body.repeat, body.vec_str, profile::NUM_DATA_PINS as usize)?;
    }
    let body_range = body_start..dots.len();
    for entry in config_templates::CONFIG_FOOTER {
        dots.append(entry.repeat, entry.vec_str, profile::NUM_DATA_PINS as usize)?;
    }

    let num_vecs_uncompressed = dots.len() as u32;
    let num_padding_vecs = compile::burst_padding(num_vecs_uncompressed);
    let last_footer = *config_templates::CONFIG_FOOTER.last().expect("footer is non-empty");
    for _ in 0..num_padding_vecs {
        dots.append(last_footer.repeat, last_footer.vec_str, profile::NUM_DATA_PINS as usize)?;
    }

    let mut word_iter = body_words.into_iter();
    struct DrainWords<'a>(&'a mut std::vec::IntoIter<u32>);
    impl<'a> BitstreamWords for DrainWords<'a> {
        fn next_word(&mut self) -> Option<u32> {
            self.0.next()
        }
    }
    let mut feed = DrainWords(&mut word_iter);
    let compiled = compile::expand_all(&mut dots, body_range.clone(), Some(&mut feed))?;

    let num_vecs = num_vecs_uncompressed + num_padding_vecs;
    let header_unrolled = config_templates::unrolled_num_vecs_by_type(ConfigType::Header);
    let footer_unrolled = config_templates::unrolled_num_vecs_by_type(ConfigType::Footer);
    let body_unrolled = compiled[body_range]
        .iter()
        .map(|cv| cv.repeat as u64 * if cv.has_clk { 2 } else { 1 })
        .sum::<u64>();
    let num_unrolled_vecs = header_unrolled + body_unrolled + footer_unrolled + num_padding_vecs as u64;
    compile::check_bounds(num_vecs, num_unrolled_vecs)?;

    let (a1_vec_chunks, a2_vec_chunks) = match engine {
        Engine::A1 => (build_and_fill_chunks(&compiled, &refs, Engine::A1)?, vec![]),
        Engine::A2 => (vec![], build_and_fill_chunks(&compiled, &refs, Engine::A2)?),
        Engine::Dual => (
            build_and_fill_chunks(&compiled, &refs, Engine::A1)?,
            build_and_fill_chunks(&compiled, &refs, Engine::A2)?,
        ),
        Engine::None => return Err(StimError::NoValidAffinity),
    };

    Ok(Stim {
        stim_type,
        pins,
        num_vecs,
        num_unrolled_vecs,
        num_padding_vecs,
        a1_vec_chunks,
        a2_vec_chunks,
        cur_a1_chunk_id: None,
        cur_a2_chunk_id: None,
        iterating_engine: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use profile::{Dest, ProfileTag};
    use vector::Subvec;

    fn config_pin(name: &str, tag: ProfileTag, dut_io_id: i32, tag_data: i32) -> ProfilePin {
        ProfilePin {
            pin_name: name.to_string(),
            comp_name: "A1".to_string(),
            net_name: format!("n_{name}"),
            net_alias: None,
            tag,
            tag_data,
            dut_io_id,
            dests: vec![Dest {
                dut_id: 0,
                pin_name: name.to_string(),
            }],
        }
    }

    fn sample_config_pins() -> Vec<ProfilePin> {
        let mut pins = vec![
            config_pin("CCLK", ProfileTag::Cclk, 0, -1),
            config_pin("RESET_B", ProfileTag::ResetB, 1, -1),
            config_pin("CSI_B", ProfileTag::CsiB, 2, -1),
            config_pin("RDWR_B", ProfileTag::RdwrB, 3, -1),
            config_pin("PROGRAM_B", ProfileTag::ProgramB, 4, -1),
            config_pin("INIT_B", ProfileTag::InitB, 5, -1),
            config_pin("DONE", ProfileTag::Done, 6, -1),
        ];
        for i in 0..32 {
            pins.push(config_pin(&format!("D{i}"), ProfileTag::Data, 7 + i, i));
        }
        pins
    }

    struct FixedWords(std::vec::IntoIter<u32>);
    impl BitstreamWords for FixedWords {
        fn next_word(&mut self) -> Option<u32> {
            self.0.next()
        }
    }

    /// Scenario S5 (§8): compiling a tiny bitstream round trips through the
    /// RAW container.
    #[test]
    fn scenario_s5_bitstream_compile_and_container_round_trip() {
        let pins = sample_config_pins();
        let words = FixedWords(vec![0xAA995566u32, 0x0000_0001].into_iter());
        let mut stim = compile_from_bitstream(StimType::Bin, pins, words).unwrap();

        assert!(!stim.a1_vec_chunks.is_empty());
        assert_eq!(stim.a2_vec_chunks.len(), 0);
        assert_eq!(stim.num_vecs % chunk::STIM_NUM_VECS_PER_BURST, 0);

        let mut buf = Vec::new();
        container::serialize(&mut stim, &mut buf).unwrap();
        let mut restored = container::deserialize(&mut &buf[..]).unwrap();
        assert_eq!(restored.num_vecs, stim.num_vecs);
        assert_eq!(restored.pins.len(), stim.pins.len());
        let chunk = restored.load_next_chunk(Engine::A1).unwrap().unwrap();
        assert!(chunk.is_loaded);
    }

    #[test]
    fn load_next_chunk_rejects_interleaving_engines_in_dual_mode() {
        let mut pins = sample_config_pins();
        // shift half the pins into the A2 dut_io_id range to force Dual affinity.
        for p in pins.iter_mut().take(7) {
            p.dut_io_id += 200;
        }
        let words = FixedWords(vec![0xAA995566u32].into_iter());
        let mut stim = compile_from_bitstream(StimType::Bin, pins, words).unwrap();
        assert!(!stim.a1_vec_chunks.is_empty());
        assert!(!stim.a2_vec_chunks.is_empty());

        stim.load_next_chunk(Engine::A1).unwrap();
        let err = stim.load_next_chunk(Engine::A2).unwrap_err();
        assert!(matches!(err, StimError::OtherEngineIterationIncomplete { .. }));
    }

    #[test]
    fn compile_from_dots_partitions_by_engine_affinity() {
        let pins = vec![config_pin("P0", ProfileTag::None, 0, -1)];
        let mut dots = Dots::new(1, 8);
        for _ in 0..8 {
            dots.append(1, "1", 0).unwrap();
        }
        let stim = compile_from_dots(pins, &mut dots).unwrap();
        assert_eq!(stim.a1_vec_chunks.len(), 1);
        assert_eq!(stim.a2_vec_chunks.len(), 0);
        assert_eq!(stim.num_vecs, 8);
        let _ = Subvec::Drive1;
    }
}
