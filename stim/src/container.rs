// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The RAW on-disk container (§4.4.6/§6.1): a typed, length-prefixed
//! record streamed chunk-by-chunk so peak memory is bounded to one raw
//! chunk plus one compressed chunk at a time.

use std::io::{self, Read, Write};

use profile::{Dest, ProfilePin, ProfileTag};
use remain::sorted;
use thiserror::Error;

use crate::chunk::VecChunk;
use crate::{Stim, StimType};

const MAGIC: &[u8; 8] = b"ATEQRAW1";

#[sorted]
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error(transparent)]
    Decompress(#[from] lz4_flex::block::DecompressError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("bad magic bytes, not a RAW stim container")]
    NotRaw,
    #[error("unknown profile tag byte {0:#x}")]
    UnknownTag(u8),
    #[error("unknown stim type byte {0:#x}")]
    UnknownType(u8),
}

pub type Result<T> = std::result::Result<T, ContainerError>;

fn tag_to_byte(tag: ProfileTag) -> u8 {
    match tag {
        ProfileTag::None => 0,
        ProfileTag::Cclk => 1,
        ProfileTag::ResetB => 2,
        ProfileTag::CsiB => 3,
        ProfileTag::RdwrB => 4,
        ProfileTag::ProgramB => 5,
        ProfileTag::InitB => 6,
        ProfileTag::Done => 7,
        ProfileTag::Data => 8,
        ProfileTag::Gpio => 9,
    }
}

fn byte_to_tag(b: u8) -> Result<ProfileTag> {
    Ok(match b {
        0 => ProfileTag::None,
        1 => ProfileTag::Cclk,
        2 => ProfileTag::ResetB,
        3 => ProfileTag::CsiB,
        4 => ProfileTag::RdwrB,
        5 => ProfileTag::ProgramB,
        6 => ProfileTag::InitB,
        7 => ProfileTag::Done,
        8 => ProfileTag::Data,
        9 => ProfileTag::Gpio,
        other => return Err(ContainerError::UnknownTag(other)),
    })
}

fn type_to_byte(ty: StimType) -> u8 {
    match ty {
        StimType::None => 0,
        StimType::Rbt => 1,
        StimType::Bin => 2,
        StimType::Bit => 3,
        StimType::Dots => 4,
        StimType::Raw => 5,
    }
}

fn byte_to_type(b: u8) -> Result<StimType> {
    Ok(match b {
        0 => StimType::None,
        1 => StimType::Rbt,
        2 => StimType::Bin,
        3 => StimType::Bit,
        4 => StimType::Dots,
        5 => StimType::Raw,
        other => return Err(ContainerError::UnknownType(other)),
    })
}

fn write_text(w: &mut impl Write, s: &str) -> Result<()> {
    let bytes = s.as_bytes();
    w.write_all(&(bytes.len() as u16).to_le_bytes())?;
    w.write_all(bytes)?;
    Ok(())
}

fn read_text(r: &mut impl Read) -> Result<String> {
    let mut len_buf = [0u8; 2];
    r.read_exact(&mut len_buf)?;
    let len = u16::from_le_bytes(len_buf) as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn write_pin(w: &mut impl Write, pin: &ProfilePin) -> Result<()> {
    write_text(w, &pin.pin_name)?;
    write_text(w, &pin.comp_name)?;
    write_text(w, &pin.net_name)?;
    write_text(w, pin.net_alias.as_deref().unwrap_or(""))?;
    w.write_all(&[tag_to_byte(pin.tag)])?;
    w.write_all(&pin.tag_data.to_le_bytes())?;
    w.write_all(&pin.dut_io_id.to_le_bytes())?;
    w.write_all(&(pin.dests.len() as u32).to_le_bytes())?;
    for dest in &pin.dests {
        w.write_all(&dest.dut_id.to_le_bytes())?;
        write_text(w, &dest.pin_name)?;
    }
    Ok(())
}

fn read_pin(r: &mut impl Read) -> Result<ProfilePin> {
    let pin_name = read_text(r)?;
    let comp_name = read_text(r)?;
    let net_name = read_text(r)?;
    let net_alias = read_text(r)?;
    let mut tag_buf = [0u8; 1];
    r.read_exact(&mut tag_buf)?;
    let tag = byte_to_tag(tag_buf[0])?;
    let mut i32_buf = [0u8; 4];
    r.read_exact(&mut i32_buf)?;
    let tag_data = i32::from_le_bytes(i32_buf);
    r.read_exact(&mut i32_buf)?;
    let dut_io_id = i32::from_le_bytes(i32_buf);
    let mut u32_buf = [0u8; 4];
    r.read_exact(&mut u32_buf)?;
    let num_dests = u32::from_le_bytes(u32_buf);
    let mut dests = Vec::with_capacity(num_dests as usize);
    for _ in 0..num_dests {
        r.read_exact(&mut u32_buf)?;
        let dut_id = u32::from_le_bytes(u32_buf);
        let pin_name = read_text(r)?;
        dests.push(Dest { dut_id, pin_name });
    }
    Ok(ProfilePin {
        pin_name,
        comp_name,
        net_name,
        net_alias: if net_alias.is_empty() { None } else { Some(net_alias) },
        tag,
        tag_data,
        dut_io_id,
        dests,
    })
}

fn write_chunk(w: &mut impl Write, chunk: &VecChunk, artix_select: u8) -> Result<()> {
    w.write_all(&chunk.id.to_le_bytes())?;
    w.write_all(&[artix_select])?;
    w.write_all(&chunk.num_vecs.to_le_bytes())?;
    let vec_data_size = chunk.vec_data_size() as u32;
    w.write_all(&vec_data_size.to_le_bytes())?;
    let raw = chunk.vec_data.as_deref().expect("chunk must be loaded to serialize");
    let compressed = lz4_flex::compress(raw);
    w.write_all(&(compressed.len() as u32).to_le_bytes())?;
    w.write_all(&compressed)?;
    Ok(())
}

fn read_chunk(r: &mut impl Read) -> Result<VecChunk> {
    let mut u32_buf = [0u8; 4];
    r.read_exact(&mut u32_buf)?;
    let id = u32::from_le_bytes(u32_buf);
    let mut byte_buf = [0u8; 1];
    r.read_exact(&mut byte_buf)?;
    r.read_exact(&mut u32_buf)?;
    let num_vecs = u32::from_le_bytes(u32_buf);
    r.read_exact(&mut u32_buf)?;
    let _vec_data_size = u32::from_le_bytes(u32_buf);
    r.read_exact(&mut u32_buf)?;
    let compressed_len = u32::from_le_bytes(u32_buf) as usize;
    let mut compressed = vec![0u8; compressed_len];
    r.read_exact(&mut compressed)?;

    let mut chunk = VecChunk::new(id, num_vecs);
    chunk.compressed = Some(compressed);
    Ok(chunk)
}

/// Streams `stim` to `w`. Each chunk is loaded (if not already), compressed,
/// written, then immediately unloaded so peak memory stays at one raw plus
/// one compressed chunk (§4.4.6).
pub fn serialize(stim: &mut Stim, w: &mut impl Write) -> Result<()> {
    w.write_all(MAGIC)?;
    w.write_all(&[type_to_byte(stim.stim_type)])?;
    w.write_all(&(stim.pins.len() as u16).to_le_bytes())?;
    w.write_all(&stim.num_vecs.to_le_bytes())?;
    w.write_all(&stim.num_unrolled_vecs.to_le_bytes())?;
    w.write_all(&stim.num_padding_vecs.to_le_bytes())?;
    w.write_all(&(stim.a1_vec_chunks.len() as u32).to_le_bytes())?;
    w.write_all(&(stim.a2_vec_chunks.len() as u32).to_le_bytes())?;
    for pin in &stim.pins {
        write_pin(w, pin)?;
    }
    for i in 0..stim.a1_vec_chunks.len() {
        stim.a1_vec_chunks[i].ensure_loaded()?;
        write_chunk(w, &stim.a1_vec_chunks[i], 1)?;
        stim.a1_vec_chunks[i].unload();
    }
    for i in 0..stim.a2_vec_chunks.len() {
        stim.a2_vec_chunks[i].ensure_loaded()?;
        write_chunk(w, &stim.a2_vec_chunks[i], 2)?;
        stim.a2_vec_chunks[i].unload();
    }
    Ok(())
}

/// Parses a RAW container header and pin table eagerly; chunk payloads stay
/// compressed in the returned `Stim` until `VecChunk::ensure_loaded` is
/// called on them (§4.4.6 "materializes raw chunks lazily").
pub fn deserialize(r: &mut impl Read) -> Result<Stim> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(ContainerError::NotRaw);
    }
    let mut byte_buf = [0u8; 1];
    r.read_exact(&mut byte_buf)?;
    let stim_type = byte_to_type(byte_buf[0])?;

    let mut u16_buf = [0u8; 2];
    r.read_exact(&mut u16_buf)?;
    let num_pins = u16::from_le_bytes(u16_buf);

    let mut u32_buf = [0u8; 4];
    r.read_exact(&mut u32_buf)?;
    let num_vecs = u32::from_le_bytes(u32_buf);
    let mut u64_buf = [0u8; 8];
    r.read_exact(&mut u64_buf)?;
    let num_unrolled_vecs = u64::from_le_bytes(u64_buf);
    r.read_exact(&mut u32_buf)?;
    let num_padding_vecs = u32::from_le_bytes(u32_buf);
    r.read_exact(&mut u32_buf)?;
    let num_a1_chunks = u32::from_le_bytes(u32_buf);
    r.read_exact(&mut u32_buf)?;
    let num_a2_chunks = u32::from_le_bytes(u32_buf);

    let mut pins = Vec::with_capacity(num_pins as usize);
    for _ in 0..num_pins {
        pins.push(read_pin(r)?);
    }

    let mut a1_vec_chunks = Vec::with_capacity(num_a1_chunks as usize);
    for _ in 0..num_a1_chunks {
        a1_vec_chunks.push(read_chunk(r)?);
    }
    let mut a2_vec_chunks = Vec::with_capacity(num_a2_chunks as usize);
    for _ in 0..num_a2_chunks {
        a2_vec_chunks.push(read_chunk(r)?);
    }

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
    use crate::chunk::STIM_NUM_VECS_PER_BURST;
    use vector::STIM_VEC_SIZE;

    fn sample_pin() -> ProfilePin {
        ProfilePin {
            pin_name: "CCLK".to_string(),
            comp_name: "A1".to_string(),
            net_name: "n_cclk".to_string(),
            net_alias: None,
            tag: ProfileTag::Cclk,
            tag_data: -1,
            dut_io_id: -1,
            dests: vec![Dest {
                dut_id: 0,
                pin_name: "CCLK".to_string(),
            }],
        }
    }

    /// Property 6 (§8): RAW container round trip.
    #[test]
    fn property_6_container_round_trip() {
        let mut chunk = VecChunk::new(0, STIM_NUM_VECS_PER_BURST);
        chunk.load();
        let bytes = [0xABu8; STIM_VEC_SIZE];
        for _ in 0..STIM_NUM_VECS_PER_BURST {
            chunk.push_vec(&bytes);
        }

        let mut stim = Stim {
            stim_type: StimType::Raw,
            pins: vec![sample_pin()],
            num_vecs: STIM_NUM_VECS_PER_BURST,
            num_unrolled_vecs: STIM_NUM_VECS_PER_BURST as u64,
            num_padding_vecs: 0,
            a1_vec_chunks: vec![chunk],
            a2_vec_chunks: vec![],
            cur_a1_chunk_id: None,
            cur_a2_chunk_id: None,
            iterating_engine: None,
        };

        let mut buf = Vec::new();
        serialize(&mut stim, &mut buf).unwrap();
        let mut restored = deserialize(&mut &buf[..]).unwrap();

        assert_eq!(restored.pins.len(), 1);
        assert_eq!(restored.pins[0].pin_name, "CCLK");
        assert_eq!(restored.num_vecs, STIM_NUM_VECS_PER_BURST);
        assert_eq!(restored.a1_vec_chunks.len(), 1);
        restored.a1_vec_chunks[0].ensure_loaded().unwrap();
        assert_eq!(
            restored.a1_vec_chunks[0].vec_data.as_ref().unwrap(),
            &vec![0xABu8; STIM_VEC_SIZE * STIM_NUM_VECS_PER_BURST as usize]
        );
    }

    #[test]
    fn rejects_bad_magic() {
        let buf = vec![0u8; 16];
        assert!(matches!(deserialize(&mut &buf[..]), Err(ContainerError::NotRaw)));
    }
}
