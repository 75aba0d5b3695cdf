// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Turns a `dots::Dots` (plus, for bitstream sources, a word reader) into
//! packed 128-byte vectors and fills `VecChunk`s with them. Grounded on
//! `examples/original_source/stim.c`'s `stim_fill_chunk`/
//! `stim_fill_chunk_by_dots` and `examples/original_source/config.c`'s
//! `create_config`.

use dots::Dots;
use profile::{Engine, ProfilePin};
use remain::sorted;
use thiserror::Error;
use vector::{Opcode, Subvec, Vector, STIM_VEC_SIZE};

use crate::bitstream::{word_to_subvecs, BitstreamWords};
use crate::chunk::{VecChunk, STIM_NUM_VECS_PER_BURST};

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompileError {
    #[error("dots vec for bitstream body must have repeat 1, got {0}")]
    BodyRepeatNotOne(u32),
    #[error("dots vec has {got} columns, expected {expected}")]
    ColumnMismatch { got: usize, expected: usize },
    #[error("bitstream ended before the declared body word count was reached")]
    BitstreamTruncated,
    #[error("num_unrolled_vecs {0} exceeds 2^37")]
    UnrolledOverflow(u64),
    #[error("num_vecs {0} exceeds 2^26")]
    VecOverflow(u32),
}

pub type Result<T> = std::result::Result<T, CompileError>;

/// `num_unrolled_vecs` past this bound (but within `2^37`) is allowed but
/// logged as a warning (§3.5).
pub const WARN_UNROLLED_VECS: u64 = 1 << 35;
pub const MAX_UNROLLED_VECS: u64 = 1 << 37;
pub const MAX_VECS: u32 = 1 << 26;

/// The `repeat`/`has_clk`/opcode triple used to pack one compressed vector,
/// chosen per §4.4.3 step 4: `VECCLK(repeat)` if clocked, else
/// `VECLOOP(repeat)` if `repeat > 1`, else `VEC(repeat)`.
fn opcode_for(repeat: u32, has_clk: bool) -> Opcode {
    if has_clk {
        Opcode::VecClk
    } else if repeat > 1 {
        Opcode::VecLoop
    } else {
        Opcode::Vec
    }
}

/// Packs one compressed vector for a single engine from a full per-column
/// subvec array, skipping columns whose pin lies outside `engine` (§4.4.3
/// step 3). `pins` and `subvecs` must be the same length and in the same
/// column order (`profile::Profile::config_profile_pins`'s order for
/// bitstream compiles, or the caller's chosen pin order for a dots source).
pub fn pack_vector_for_engine(
    pins: &[&ProfilePin],
    subvecs: &[Subvec],
    repeat: u32,
    has_clk: bool,
    engine: Engine,
) -> Result<[u8; STIM_VEC_SIZE]> {
    if pins.len() != subvecs.len() {
        return Err(CompileError::ColumnMismatch {
            got: subvecs.len(),
            expected: pins.len(),
        });
    }
    let mut vector = Vector::blank();
    for (pin, &subvec) in pins.iter().zip(subvecs.iter()) {
        if pin.dut_io_id < 0 {
            continue;
        }
        if pin.engine() != engine {
            continue;
        }
        // pin.dut_io_id is in-range by construction of a validated profile.
        let _ = vector.pack_subvec(pin.dut_io_id as u32, subvec);
    }
    vector.pack_opcode_operand(opcode_for(repeat, has_clk), repeat);
    Ok(*vector.as_bytes())
}

/// One fully expanded dots vec ready to be packed: `(repeat, has_clk,
/// subvecs)`.
pub struct CompiledVec {
    pub repeat: u32,
    pub has_clk: bool,
    pub subvecs: Vec<Subvec>,
}

/// Expands every entry of `dots` in order into `CompiledVec`s. Entries whose
/// index falls in `body_range` get their DATA columns injected from
/// `next_word` (§4.4.3: a bitstream body entry's `repeat` must be 1);
/// entries outside it (header/footer) are expanded with no data, leaving
/// their DATA columns `DontCare`.
pub fn expand_all(
    dots: &mut Dots,
    body_range: std::ops::Range<usize>,
    mut next_word: Option<&mut dyn BitstreamWords>,
) -> Result<Vec<CompiledVec>> {
    let mut out = Vec::with_capacity(dots.len());
    for id in 0..dots.len() {
        let data = if body_range.contains(&id) {
            if dots.get(id).expect("id within len").repeat != 1 {
                return Err(CompileError::BodyRepeatNotOne(
                    dots.get(id).expect("id within len").repeat,
                ));
            }
            let reader = next_word.as_deref_mut().ok_or(CompileError::BitstreamTruncated)?;
            let word = reader.next_word().ok_or(CompileError::BitstreamTruncated)?;
            Some(word_to_subvecs(word).to_vec())
        } else {
            None
        };
        dots.expand(id, data.as_deref()).expect("id within len, not yet expanded");
        let dv = dots.get(id).expect("id within len");
        out.push(CompiledVec {
            repeat: dv.repeat,
            has_clk: dv.has_clk,
            subvecs: dv.subvecs.clone().expect("just expanded"),
        });
    }
    Ok(out)
}

/// Fills `chunk` with packed vectors from `compiled[cursor..]`, advancing
/// `cursor` and stopping when the chunk is full or `compiled` is exhausted
/// (§4.4.5: "advance the chunk's vector cursor by one... carry the dots
/// cursor forward across chunks").
pub fn fill_chunk(
    chunk: &mut VecChunk,
    compiled: &[CompiledVec],
    cursor: &mut usize,
    pins: &[&ProfilePin],
    engine: Engine,
) -> Result<()> {
    while !chunk.is_full() && *cursor < compiled.len() {
        let cv = &compiled[*cursor];
        let bytes = pack_vector_for_engine(pins, &cv.subvecs, cv.repeat, cv.has_clk, engine)?;
        chunk.push_vec(&bytes);
        *cursor += 1;
    }
    Ok(())
}

/// `num_padding_vecs` needed so `num_vecs` becomes a multiple of
/// `STIM_NUM_VECS_PER_BURST` (§3.5/`init_stim`).
pub fn burst_padding(num_vecs: u32) -> u32 {
    let rem = num_vecs % STIM_NUM_VECS_PER_BURST;
    if rem == 0 {
        0
    } else {
        STIM_NUM_VECS_PER_BURST - rem
    }
}

/// Validates the two size invariants of §3.5.
pub fn check_bounds(num_vecs: u32, num_unrolled_vecs: u64) -> Result<()> {
    if num_vecs > MAX_VECS {
        return Err(CompileError::VecOverflow(num_vecs));
    }
    if num_unrolled_vecs > MAX_UNROLLED_VECS {
        return Err(CompileError::UnrolledOverflow(num_unrolled_vecs));
    }
    if num_unrolled_vecs > WARN_UNROLLED_VECS {
        log::warn!("num_unrolled_vecs {num_unrolled_vecs} exceeds {WARN_UNROLLED_VECS}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use profile::Dest;

    fn pin(name: &str, tag: profile::ProfileTag, dut_io_id: i32) -> ProfilePin {
        ProfilePin {
            pin_name: name.to_string(),
            comp_name: "A1".to_string(),
            net_name: format!("n_{name}"),
            net_alias: None,
            tag,
            tag_data: -1,
            dut_io_id,
            dests: Vec::<Dest>::new(),
        }
    }

    #[test]
    fn burst_padding_rounds_up_to_multiple_of_eight() {
        assert_eq!(burst_padding(8), 0);
        assert_eq!(burst_padding(9), 7);
        assert_eq!(burst_padding(0), 0);
    }

    #[test]
    fn pack_vector_for_engine_skips_other_engine_columns() {
        let a1 = pin("A1_PIN", profile::ProfileTag::None, 0);
        let a2 = pin("A2_PIN", profile::ProfileTag::None, 200);
        let pins = vec![&a1, &a2];
        let subvecs = vec![Subvec::Drive1, Subvec::Drive1];
        let bytes = pack_vector_for_engine(&pins, &subvecs, 1, false, Engine::A1).unwrap();
        let v = Vector::from_bytes(bytes);
        assert_eq!(v.get_subvec(0).unwrap(), Subvec::Drive1);
        // A2's pin (clamped to local index 0 too) was skipped for the A1
        // engine pack, so the byte is untouched (blank = None).
        assert_eq!(v.opcode(), Some(Opcode::Vec));
    }

    #[test]
    fn expand_all_injects_bitstream_words_into_body_entries() {
        let mut dots = Dots::new(9, 1);
        let id = dots.append(1, "C1001HX", 2).unwrap();
        let _ = id;
        struct OneWord(Option<u32>);
        impl BitstreamWords for OneWord {
            fn next_word(&mut self) -> Option<u32> {
                self.0.take()
            }
        }
        let mut words = OneWord(Some(0b11));
        let compiled = expand_all(&mut dots, 0..1, Some(&mut words)).unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(compiled[0].subvecs.len(), 9);
    }

    #[test]
    fn expand_all_leaves_header_entries_undriven_on_data_columns() {
        let mut dots = Dots::new(9, 1);
        dots.append(5, "C1001HX", 2).unwrap();
        let compiled = expand_all(&mut dots, 0..0, None).unwrap();
        assert_eq!(compiled.len(), 1);
        assert_eq!(&compiled[0].subvecs[7..], &[Subvec::DontCare, Subvec::DontCare]);
    }

    #[test]
    fn check_bounds_rejects_oversized_vec_counts() {
        assert!(check_bounds(MAX_VECS + 1, 0).is_err());
        assert!(check_bounds(0, MAX_UNROLLED_VECS + 1).is_err());
        assert!(check_bounds(8, 8).is_ok());
    }
}
