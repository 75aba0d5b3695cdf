// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! FPGA configuration shortcut (§4.5.9), grounded on
//! `examples/original_source/board/artix.c`'s `artix_config`.

use crate::device::Device;
use crate::regs;
use crate::states::ArtixSelect;
use crate::states::SubcoreState;
use crate::Transport;
use crate::TransportError;
use crate::TransportResult;

const DONE_ERROR_MASK: u32 = 0x0000_0004;
const DONE_PIN_MASK_A1: u32 = 0x0000_0010;
const DONE_PIN_MASK_A2: u32 = 0x0000_0020;

impl<D: Device> Transport<D> {
    /// Configures `select`'s FPGA from an already byte-swapped BIN image:
    /// `CONFIG_SETUP` then a single `DMA_WRITE` of the whole bitstream,
    /// polling `DONE_ERROR` and the engine's `DONE` pin. Returns on
    /// success; errors on `DONE_ERROR`.
    pub fn config(&mut self, select: ArtixSelect, bitstream: &[u8]) -> TransportResult<()> {
        if select == ArtixSelect::Both {
            return Err(TransportError::BothEnginesSelected);
        }
        if bitstream.len() > regs::MAX_CHUNK_SIZE as usize {
            return Err(TransportError::PayloadTooLarge(
                bitstream.len(),
                regs::MAX_CHUNK_SIZE as usize,
            ));
        }

        self.subcore_load(select, SubcoreState::ConfigSetup as u32)?;
        self.subcore_load(select, SubcoreState::DmaWrite as u32)?;

        let chan = crate::device::DmaChannel {
            chan: select as u32,
            buf_offset: 0,
            buf_size: bitstream.len() as u32,
        };
        self.device.dma_write(chan, bitstream)?;

        self.subcore_load(select, SubcoreState::ConfigWait as u32)?;
        let regs = self.device.regs()?;
        if regs.status & DONE_ERROR_MASK != 0 {
            return Err(TransportError::InitError);
        }
        let done_mask = match select {
            ArtixSelect::A1 => DONE_PIN_MASK_A1,
            ArtixSelect::A2 => DONE_PIN_MASK_A2,
            _ => return Err(TransportError::NoEngineSelected),
        };
        if regs.status & done_mask == 0 {
            return Err(TransportError::InitError);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MockDevice;

    #[test]
    fn config_rejects_both_engines_selected() {
        let mut t = Transport::new(MockDevice::new());
        let err = t.config(ArtixSelect::Both, &[0u8; 16]).unwrap_err();
        assert!(matches!(err, TransportError::BothEnginesSelected));
    }

    #[test]
    fn config_succeeds_when_done_pin_is_set_and_no_error() {
        let mut device = MockDevice::new();
        device.regs.status = DONE_PIN_MASK_A1;
        let mut t = Transport::new(device);

        t.config(ArtixSelect::A1, &[0xffu8; 16]).unwrap();
    }

    #[test]
    fn config_fails_on_done_error_bit() {
        let mut device = MockDevice::new();
        device.regs.status = DONE_ERROR_MASK | DONE_PIN_MASK_A1;
        let mut t = Transport::new(device);

        let err = t.config(ArtixSelect::A1, &[0xffu8; 16]).unwrap_err();
        assert!(matches!(err, TransportError::InitError));
    }

    #[test]
    fn config_fails_when_done_pin_never_asserts() {
        let mut t = Transport::new(MockDevice::new());
        let err = t.config(ArtixSelect::A1, &[0xffu8; 16]).unwrap_err();
        assert!(matches!(err, TransportError::InitError));
    }

    #[test]
    fn config_fails_when_wrong_engines_done_pin_is_set() {
        let mut device = MockDevice::new();
        device.regs.status = DONE_PIN_MASK_A2;
        let mut t = Transport::new(device);
        assert!(t.config(ArtixSelect::A1, &[0xffu8; 16]).is_err());
    }
}
