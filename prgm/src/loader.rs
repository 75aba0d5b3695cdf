// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reads/writes a `Stim` from/to a file path by dispatching on its
//! extension, the counterpart of `examples/original_source/prgm.c`'s
//! `get_stim_by_path`/`stim_serialize_to_path` (never defined in the
//! retrieved source, so the dispatch table is authored fresh from
//! `stim::bitstream`'s three reader types plus the RAW container).

use std::fs;
use std::path::Path;

use profile::ProfilePin;
use stim::{container, BinReader, BitReader, RbtReader, Stim, StimType};

use crate::ProgramError;

/// Reads a stim from `path`. `.raw` deserializes the RAW container
/// directly; `.rbt`/`.bin`/`.bit` compile a bitstream against
/// `config_pins` (the 39-pin `config_profile_pins` order, §4.1).
pub fn read_stim_by_path(path: &Path, config_pins: Vec<ProfilePin>) -> Result<Stim, ProgramError> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .ok_or_else(|| ProgramError::UnknownStimExtension(path.display().to_string()))?;

    match ext.as_str() {
        "raw" => {
            let bytes = fs::read(path).map_err(|e| ProgramError::Io(path.display().to_string(), e))?;
            Ok(container::deserialize(&mut &bytes[..])?)
        }
        "rbt" => {
            let text = fs::read_to_string(path).map_err(|e| ProgramError::Io(path.display().to_string(), e))?;
            let reader = RbtReader::new(&text)?;
            Ok(stim::compile_from_bitstream(StimType::Rbt, config_pins, reader)?)
        }
        "bin" => {
            let bytes = fs::read(path).map_err(|e| ProgramError::Io(path.display().to_string(), e))?;
            let reader = BinReader::new(&bytes)?;
            Ok(stim::compile_from_bitstream(StimType::Bin, config_pins, reader)?)
        }
        "bit" => {
            let bytes = fs::read(path).map_err(|e| ProgramError::Io(path.display().to_string(), e))?;
            let reader = BitReader::new(&bytes)?;
            Ok(stim::compile_from_bitstream(StimType::Bit, config_pins, reader)?)
        }
        other => Err(ProgramError::UnknownStimExtension(other.to_string())),
    }
}

/// Writes `stim` to `path`, always in the RAW container format: it is the
/// only stimulus writer this runtime implements (§4.4.6/§6.1).
pub fn write_stim_to_path(stim: &mut Stim, path: &Path) -> Result<(), ProgramError> {
    let mut buf = Vec::new();
    container::serialize(stim, &mut buf)?;
    fs::write(path, buf).map_err(|e| ProgramError::Io(path.display().to_string(), e))?;
    Ok(())
}
