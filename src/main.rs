// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! `atebench`: a minimal demonstration binary over the program runtime.
//! The real CLI/scripting surface is out of scope (§1) — this binary only
//! proves the verb table of §4.6 wires together against a real device node.

use std::path::PathBuf;

use log::error;
use log::info;
use transport::KernelDevice;

fn run() -> anyhow::Result<()> {
    let mut args = std::env::args().skip(1);
    let device_path = args.next().unwrap_or_else(|| "/dev/gcore".to_string());
    let profile_path: PathBuf = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: atebench <device-path> <profile.json> [stim-path]"))?
        .into();

    let profile = profile::Profile::load(&profile_path)?;
    info!(
        "loaded profile {:?} ({} duts, {} pins)",
        profile.board_name,
        profile.num_duts,
        profile.pins.len()
    );

    let device = KernelDevice::open(&device_path, 1 << 23)?;
    let mut program = prgm::Program::new(profile, device);

    if let Some(stim_path) = args.next() {
        let addrs = program.load(&stim_path)?;
        info!("loaded {stim_path} at {addrs:?}");
        let summary = program.run(&[addrs])?;
        info!(
            "ran {} pattern(s), failed={}, cycle={}",
            summary.tests_ran, summary.failed, summary.fail_cycle
        );
        if summary.failed {
            std::process::exit(1);
        }
    }

    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        error!("{e:#}");
        std::process::exit(2);
    }
}
