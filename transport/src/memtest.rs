// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Memory self-test (§4.5.8): an offline smoke test, not required for
//! regular pattern runs.

use crate::device::Device;
use crate::states::ArtixSelect;
use crate::states::ExecUnitState;
use crate::Transport;
use crate::TransportResult;

/// Writes `payload` to engine memory at `addr`, optionally runs the exec
/// unit's built-in CRC check, reads the buffer back and byte-compares.
/// Returns `true` if the read-back matches.
impl<D: Device> Transport<D> {
    pub fn mem_self_test(
        &mut self,
        select: ArtixSelect,
        addr: u64,
        payload: &[u8],
        use_builtin_crc: bool,
    ) -> TransportResult<bool> {
        self.mem_write(select, addr, payload)?;

        if use_builtin_crc {
            self.gvpu_load(select, ExecUnitState::MemTest as u32)?;
            self.device.wait_idle()?;
        }

        let mut readback = vec![0u8; payload.len()];
        self.mem_read(select, addr, &mut readback)?;
        Ok(readback == payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::CtrlPacket;
    use crate::device::MockDevice;

    fn mem_load_ack() -> CtrlPacket {
        CtrlPacket {
            rank_select: 0,
            addr: 0,
            data: 0x0000_0030,
        }
    }

    #[test]
    fn self_test_detects_a_clean_read_back() {
        let mut device = MockDevice::new();
        device.push_response(ArtixSelect::A1, mem_load_ack());
        device.push_response(ArtixSelect::A1, mem_load_ack());
        let mut t = Transport::new(device);

        let payload = vec![0x5au8; 1024];
        let ok = t.mem_self_test(ArtixSelect::A1, 0, &payload, false).unwrap();
        assert!(ok);
    }

    #[test]
    fn corrupted_backing_memory_fails_the_byte_compare() {
        let mut device = MockDevice::new();
        device.push_response(ArtixSelect::A1, mem_load_ack());
        device.push_response(ArtixSelect::A1, mem_load_ack());
        let mut t = Transport::new(device);

        let payload = vec![0x5au8; 1024];
        t.mem_write(ArtixSelect::A1, 0, &payload).unwrap();
        t.device_mut().a1_mem[0] = 0x00;

        let mut readback = vec![0u8; payload.len()];
        t.mem_read(ArtixSelect::A1, 0, &mut readback).unwrap();
        assert_ne!(readback, payload);
    }
}
