// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! RBT/BIN/BIT bitstream word readers. Grounded on
//! `examples/original_source/stim.c`'s `stim_get_next_bitstream_word`,
//! `read_map_32`, and `convert_bitstream_word_to_subvecs`, with the
//! byte-aligned sync scan called for in §4.4.2 (the original only scans on
//! 4-byte boundaries, which misses a BIT file's header-shifted sync word).

use remain::sorted;
use thiserror::Error;
use vector::Subvec;

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum BitstreamError {
    #[error("bit file design-name/payload header is truncated")]
    BitHeaderTruncated,
    #[error("rbt header is missing its bit-count (7th) line")]
    MissingBitCountLine,
    #[error("rbt bitstream word is not 32 bits wide")]
    RbtWordNotWide,
    #[error("rbt file contains a character other than 0/1 in a word line")]
    RbtInvalidChar(char),
    #[error("failed to find bitstream sync word (0xAA995566 or 0x665599AA)")]
    SyncWordNotFound,
}

pub type Result<T> = std::result::Result<T, BitstreamError>;

/// D31..D00 word. `next_word` returns `None` at end of stream.
pub trait BitstreamWords {
    fn next_word(&mut self) -> Option<u32>;
}

/// One 32-char `0`/`1` line per word, MSB first (§4.4.2 RBT).
pub struct RbtReader<'a> {
    lines: std::str::Lines<'a>,
}

impl<'a> RbtReader<'a> {
    /// `data` is the full RBT file contents. The first 7 lines are header;
    /// the 7th line's leading digits give the bit count (kept for parity
    /// with the original but not needed to drive iteration here since we
    /// simply read until EOF).
    pub fn new(data: &'a str) -> Result<RbtReader<'a>> {
        let mut lines = data.lines();
        for _ in 0..6 {
            lines.next();
        }
        let header7 = lines.next().ok_or(BitstreamError::MissingBitCountLine)?;
        if !header7.chars().any(|c| c.is_ascii_digit()) {
            return Err(BitstreamError::MissingBitCountLine);
        }
        Ok(RbtReader { lines })
    }
}

impl<'a> BitstreamWords for RbtReader<'a> {
    fn next_word(&mut self) -> Option<u32> {
        let line = self.lines.next()?;
        if line.chars().count() != 32 {
            return None;
        }
        let mut word = 0u32;
        for c in line.chars() {
            word <<= 1;
            match c {
                '0' => {}
                '1' => word |= 1,
                _ => return None,
            }
        }
        Some(word)
    }
}

/// The two canonical sync-word byte patterns named in §4.4.2. The labels
/// follow spec.md's literal naming of the two candidate constants, not raw
/// memory byte order: `SyncEndian::Little` is detected by interpreting the
/// 4-byte window big-endian and comparing to `0xAA995566`; decoding reuses
/// that same interpretation for every subsequent word, mirroring
/// `stim.c`'s `is_little_endian` flag controlling whether `read_map_32`
/// byte-swaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEndian {
    Little,
    Big,
}

const SYNC_LITTLE: u32 = 0xAA99_5566;
const SYNC_BIG: u32 = 0x6655_99AA;

fn decode_window(bytes: [u8; 4], endian: SyncEndian) -> u32 {
    match endian {
        SyncEndian::Little => u32::from_be_bytes(bytes),
        SyncEndian::Big => u32::from_le_bytes(bytes),
    }
}

/// Scans `data` byte-by-byte (not word-by-word, so a BIT file's
/// header-shifted sync word is still found) for one of the two sync
/// patterns. Returns the byte offset of the sync word and its endianness.
pub fn find_sync_word(data: &[u8]) -> Result<(usize, SyncEndian)> {
    if data.len() < 4 {
        return Err(BitstreamError::SyncWordNotFound);
    }
    for offset in 0..=data.len() - 4 {
        let window = [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]];
        if decode_window(window, SyncEndian::Little) == SYNC_LITTLE {
            return Ok((offset, SyncEndian::Little));
        }
        if decode_window(window, SyncEndian::Big) == SYNC_BIG {
            return Ok((offset, SyncEndian::Big));
        }
    }
    Err(BitstreamError::SyncWordNotFound)
}

/// Raw little-endian 32-bit words starting at the sync word (§4.4.2 BIN).
pub struct BinReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: SyncEndian,
}

impl<'a> BinReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<BinReader<'a>> {
        let (offset, endian) = find_sync_word(data)?;
        Ok(BinReader {
            data,
            pos: offset,
            endian,
        })
    }
}

impl<'a> BitstreamWords for BinReader<'a> {
    fn next_word(&mut self) -> Option<u32> {
        if self.pos + 4 > self.data.len() {
            return None;
        }
        let window = [
            self.data[self.pos],
            self.data[self.pos + 1],
            self.data[self.pos + 2],
            self.data[self.pos + 3],
        ];
        self.pos += 4;
        Some(decode_window(window, self.endian))
    }
}

/// BIT file: `0x00 0x09 <9 bytes> 0x00 0x01 'a' <len:be16> <design_name>`,
/// then repeating key/length records (`b/c/d/e`); `e`'s payload is
/// prefixed with `<len:be32>` and is itself a BIN-like stream (§4.4.2).
pub struct BitReader<'a> {
    inner: BinReader<'a>,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Result<BitReader<'a>> {
        parse_bit_header(data)?;
        // The payload after the 'e' record's length prefix is a BIN-like
        // stream; `BinReader::new` re-scans for the sync word so we don't
        // need to track the exact payload offset ourselves.
        Ok(BitReader {
            inner: BinReader::new(data)?,
        })
    }
}

impl<'a> BitstreamWords for BitReader<'a> {
    fn next_word(&mut self) -> Option<u32> {
        self.inner.next_word()
    }
}

/// Validates the BIT container framing described in §4.4.2 up to (but not
/// including) the `e` record's payload, returning the byte offset the
/// payload starts at.
fn parse_bit_header(data: &[u8]) -> Result<usize> {
    let mut pos = 0usize;
    let need = |pos: usize, n: usize| -> Result<()> {
        if pos + n > data.len() {
            Err(BitstreamError::BitHeaderTruncated)
        } else {
            Ok(())
        }
    };

    need(pos, 2)?;
    if data[pos] != 0x00 || data[pos + 1] != 0x09 {
        return Err(BitstreamError::BitHeaderTruncated);
    }
    pos += 2;
    need(pos, 9)?;
    pos += 9;
    need(pos, 2)?;
    if data[pos] != 0x00 || data[pos + 1] != 0x01 {
        return Err(BitstreamError::BitHeaderTruncated);
    }
    pos += 2;

    // 'a' record: design name, length-prefixed (be16).
    need(pos, 1)?;
    if data[pos] != b'a' {
        return Err(BitstreamError::BitHeaderTruncated);
    }
    pos += 1;
    pos = read_record_be16(data, pos)?;

    // 'b', 'c', 'd' records: part/date/time, each length-prefixed (be16).
    for key in [b'b', b'c', b'd'] {
        need(pos, 1)?;
        if data[pos] != key {
            return Err(BitstreamError::BitHeaderTruncated);
        }
        pos += 1;
        pos = read_record_be16(data, pos)?;
    }

    // 'e' record: the bitstream payload, length-prefixed (be32).
    need(pos, 1)?;
    if data[pos] != b'e' {
        return Err(BitstreamError::BitHeaderTruncated);
    }
    pos += 1;
    need(pos, 4)?;
    let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]);
    pos += 4;
    need(pos, len as usize)?;
    Ok(pos)
}

fn read_record_be16(data: &[u8], pos: usize) -> Result<usize> {
    if pos + 2 > data.len() {
        return Err(BitstreamError::BitHeaderTruncated);
    }
    let len = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
    let pos = pos + 2;
    if pos + len > data.len() {
        return Err(BitstreamError::BitHeaderTruncated);
    }
    Ok(pos + len)
}

/// Converts one 32-bit word to 32 subvecs with the byte-local bit reversal
/// of §4.4.2: for bit `i`, output index `((i/8+1)*8)-1-(i%8)`.
pub fn word_to_subvecs(word: u32) -> [Subvec; 32] {
    let mut out = [Subvec::None; 32];
    for i in 0..32u32 {
        let idx = ((i / 8 + 1) * 8) - 1 - (i % 8);
        let bit = (word >> i) & 1;
        out[idx as usize] = if bit == 1 { Subvec::Drive1 } else { Subvec::Drive0 };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario S4 (§8).
    #[test]
    fn scenario_s4_bit_endianness_detect() {
        let mut header = vec![0x00, 0x09];
        header.extend_from_slice(&[0u8; 9]);
        header.extend_from_slice(&[0x00, 0x01]);
        header.push(b'a');
        header.extend_from_slice(&3u16.to_be_bytes());
        header.extend_from_slice(b"abc");
        for key in [b'b', b'c', b'd'] {
            header.push(key);
            header.extend_from_slice(&0u16.to_be_bytes());
        }
        header.push(b'e');
        let payload = [0xAAu8, 0x99, 0x55, 0x66, 0xDE, 0xAD, 0xBE, 0xEF];
        header.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        header.extend_from_slice(&payload);

        let mut reader = BitReader::new(&header).unwrap();
        assert_eq!(reader.next_word(), Some(0xAA995566));
    }

    /// Property 2 (§8).
    #[test]
    fn property_2_bitstream_subvec_ordering() {
        let subvecs = word_to_subvecs(0xAA995566);
        // bytes on the wire (D31..D24, D23..D16, D15..D08, D07..D00) are
        // 0x66, 0x55, 0x99, 0xAA; each byte's bits are reversed in place.
        let expected_bits: [u8; 32] = {
            let bytes = [0x66u8, 0x55, 0x99, 0xAA];
            let mut bits = [0u8; 32];
            for (byte_idx, byte) in bytes.iter().enumerate() {
                for bit_idx in 0..8 {
                    // byte-local bit reversal: msb-first within the byte.
                    bits[byte_idx * 8 + bit_idx] = (byte >> (7 - bit_idx)) & 1;
                }
            }
            bits
        };
        for (i, &bit) in expected_bits.iter().enumerate() {
            let expect = if bit == 1 { Subvec::Drive1 } else { Subvec::Drive0 };
            assert_eq!(subvecs[i], expect, "subvec {i}");
        }
    }

    #[test]
    fn bin_reader_scans_byte_aligned() {
        let mut data = vec![0xDE, 0xAD, 0xBE]; // 3-byte offset, not word-aligned
        data.extend_from_slice(&[0xAA, 0x99, 0x55, 0x66]);
        data.extend_from_slice(&[0x11, 0x22, 0x33, 0x44]);
        let mut reader = BinReader::new(&data).unwrap();
        assert_eq!(reader.next_word(), Some(0xAA995566));
        assert_eq!(reader.next_word(), Some(u32::from_be_bytes([0x11, 0x22, 0x33, 0x44])));
    }

    #[test]
    fn rbt_reads_msb_first_words() {
        let data = "header1\nheader2\nheader3\nheader4\nheader5\nheader6\nbits: 32\n\
                     10101010100110010101010101100110\n";
        // first line after header has 34 chars, force exactly 32 by using a clean one:
        let data = data.replacen(
            "10101010100110010101010101100110",
            "10101010100110010101010101100110"[..32].as_ref(),
            1,
        );
        let mut reader = RbtReader::new(&data).unwrap();
        let word = reader.next_word().unwrap();
        assert_eq!(word, u32::from_str_radix(&"10101010100110010101010101100110"[..32], 2).unwrap());
    }
}
