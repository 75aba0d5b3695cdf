// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Vector chunk sizing and the in-memory chunk buffer. Grounded on
//! `examples/original_source/stim.h`'s `struct vec_chunk` and `stim.c`'s
//! `create_vec_chunk`/`stim_load_next_chunk`/`stim_unload_chunk`.

use vector::STIM_VEC_SIZE;

/// `STIM_CHUNK_SIZE`: the maximum uncompressed payload of one chunk, `2^28`
/// bytes (256 MiB).
pub const STIM_CHUNK_SIZE: usize = 1 << 28;
/// One DMA burst holds this many vectors; `num_vecs` within a chunk must be
/// a multiple of it.
pub const STIM_NUM_VECS_PER_BURST: u32 = 8;

/// §4.4.1: `k = ceil(V * 128 / 2^28)` chunks for `V` total vectors
/// (`num_vecs + num_padding_vecs`, already burst-aligned).
pub fn chunk_count(total_vecs: u32) -> u32 {
    let payload = total_vecs as u64 * STIM_VEC_SIZE as u64;
    let k = payload.div_ceil(STIM_CHUNK_SIZE as u64);
    k.max(1) as u32
}

/// How many vectors chunk `id` (of `num_chunks`) holds, given `total_vecs`
/// vectors split evenly except for a possibly-partial last chunk. Mirrors
/// `init_stim`'s `vecs_per_chunk` loop.
pub fn vecs_in_chunk(id: u32, num_chunks: u32, total_vecs: u32) -> u32 {
    let vecs_per_full_chunk = (STIM_CHUNK_SIZE / STIM_VEC_SIZE) as u32;
    if id + 1 == num_chunks {
        let consumed = vecs_per_full_chunk * id;
        total_vecs - consumed
    } else {
        vecs_per_full_chunk
    }
}

/// One chunk of compiled vectors. `vec_data` is `None` while unloaded; its
/// length is always `num_vecs * STIM_VEC_SIZE` bytes once loaded.
#[derive(Debug, Clone)]
pub struct VecChunk {
    pub id: u32,
    pub num_vecs: u32,
    pub cur_vec_id: u32,
    pub vec_data: Option<Vec<u8>>,
    pub is_loaded: bool,
    pub is_filled: bool,
    /// Present when this chunk was deserialized from a RAW container: the
    /// still-compressed payload, decompressed on demand by `ensure_loaded`
    /// (§4.4.6 "materializes raw chunks lazily").
    pub compressed: Option<Vec<u8>>,
}

impl VecChunk {
    pub fn new(id: u32, num_vecs: u32) -> VecChunk {
        assert!(num_vecs > 0, "num_vecs == 0");
        assert_eq!(
            num_vecs % STIM_NUM_VECS_PER_BURST,
            0,
            "chunk {id}'s num_vecs {num_vecs} must be a multiple of {STIM_NUM_VECS_PER_BURST}"
        );
        VecChunk {
            id,
            num_vecs,
            cur_vec_id: 0,
            vec_data: None,
            is_loaded: false,
            is_filled: false,
            compressed: None,
        }
    }

    pub fn vec_data_size(&self) -> usize {
        self.num_vecs as usize * STIM_VEC_SIZE
    }

    /// `stim_load_next_chunk`'s allocation step: fills a fresh buffer with
    /// `0xff` (the blank/`NOP` fill) and resets the fill cursor.
    pub fn load(&mut self) {
        self.vec_data = Some(vec![0xff; self.vec_data_size()]);
        self.cur_vec_id = 0;
        self.is_loaded = true;
        self.is_filled = false;
    }

    /// `stim_unload_chunk`: frees the buffer, a no-op if already unloaded.
    pub fn unload(&mut self) {
        if !self.is_loaded {
            return;
        }
        self.vec_data = None;
        self.is_loaded = false;
    }

    /// Used by the chunk iterator (§4.4.5): allocates a blank buffer only
    /// if one isn't already present, so a chunk filled eagerly at compile
    /// time isn't blown away by a later iteration pass. Decompresses a
    /// stored RAW payload (if any) rather than blank-filling.
    pub fn ensure_loaded(&mut self) -> Result<(), lz4_flex::block::DecompressError> {
        if self.vec_data.is_some() {
            self.is_loaded = true;
            return Ok(());
        }
        if let Some(compressed) = self.compressed.clone() {
            self.load_from_compressed(&compressed)?;
        } else {
            self.load();
        }
        Ok(())
    }

    /// Decompresses `compressed` (an LZ4 block, see §4.4.6/§6.1) directly
    /// into a fresh buffer of this chunk's exact expected size.
    pub fn load_from_compressed(&mut self, compressed: &[u8]) -> Result<(), lz4_flex::block::DecompressError> {
        let data = lz4_flex::decompress(compressed, self.vec_data_size())?;
        self.vec_data = Some(data);
        self.cur_vec_id = self.num_vecs;
        self.is_loaded = true;
        self.is_filled = true;
        Ok(())
    }

    /// Writes `bytes` (one packed vector) at the current cursor and
    /// advances it. Panics if the chunk is not loaded or is already full —
    /// both are fatal misuse per §4.3/§4.4.5.
    pub fn push_vec(&mut self, bytes: &[u8; STIM_VEC_SIZE]) {
        assert!(self.cur_vec_id < self.num_vecs, "chunk {} is full", self.id);
        let data = self.vec_data.as_mut().expect("chunk is not loaded");
        let start = self.cur_vec_id as usize * STIM_VEC_SIZE;
        data[start..start + STIM_VEC_SIZE].copy_from_slice(bytes);
        self.cur_vec_id += 1;
    }

    pub fn is_full(&self) -> bool {
        self.cur_vec_id == self.num_vecs
    }

    pub fn remaining(&self) -> u32 {
        self.num_vecs - self.cur_vec_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Property 4 (§8): chunk invariants.
    #[test]
    fn property_4_chunk_size_and_burst_alignment() {
        for total in [8u32, 16, STIM_NUM_VECS_PER_BURST * 3] {
            let k = chunk_count(total);
            let mut seen = 0u32;
            for id in 0..k {
                let n = vecs_in_chunk(id, k, total);
                assert_eq!(n % STIM_NUM_VECS_PER_BURST, 0);
                assert!(n > 0);
                seen += n;
            }
            assert_eq!(seen, total);
        }
    }

    #[test]
    fn chunk_count_splits_large_payloads() {
        let vecs_per_chunk = (STIM_CHUNK_SIZE / STIM_VEC_SIZE) as u32;
        assert_eq!(chunk_count(vecs_per_chunk), 1);
        assert_eq!(chunk_count(vecs_per_chunk + STIM_NUM_VECS_PER_BURST), 2);
    }

    #[test]
    fn push_vec_fills_in_order() {
        let mut chunk = VecChunk::new(0, 8);
        chunk.load();
        let mut bytes = [0u8; STIM_VEC_SIZE];
        bytes[0] = 0xAB;
        chunk.push_vec(&bytes);
        assert_eq!(chunk.vec_data.as_ref().unwrap()[0], 0xAB);
        assert_eq!(chunk.cur_vec_id, 1);
    }

    #[test]
    #[should_panic(expected = "is full")]
    fn push_vec_past_capacity_panics() {
        let mut chunk = VecChunk::new(0, 8);
        chunk.load();
        let bytes = [0xffu8; STIM_VEC_SIZE];
        for _ in 0..8 {
            chunk.push_vec(&bytes);
        }
        chunk.push_vec(&bytes);
    }
}
