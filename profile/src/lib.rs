// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Board profile: an immutable, tabular description of one mezzanine board
//! — a connector-pin-to-DUT-I/O-index map loaded from JSON. See
//! `examples/original_source/profile.h` for the model this crate reimplements.

use std::collections::HashSet;
use std::fmt;
use std::fs;
use std::path::Path;

use remain::sorted;
use serde::Deserialize;
use thiserror::Error;

/// Number of `DATA` pins per DUT (Xilinx SelectMap config data bus width).
pub const NUM_DATA_PINS: u32 = 32;

/// Inclusive bound on connector-pin counts from the A1/A2 connectors.
pub const MAX_PINS: usize = 400;

#[sorted]
#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("duplicate connector pin name: {0}")]
    DuplicatePinName(String),
    #[error("singular tag {tag:?} appears {count} times for dut {dut_id}, expected exactly 1")]
    DuplicateSingularTag {
        tag: ProfileTag,
        dut_id: i32,
        count: usize,
    },
    #[error("dut {dut_id} has {count} DATA pins, expected exactly {NUM_DATA_PINS}")]
    DataPinCount { dut_id: i32, count: usize },
    #[error("dut {dut_id} DATA tag_data values are not exactly [0,{NUM_DATA_PINS})")]
    DataTagDataRange { dut_id: i32 },
    #[error("dut_io_id {0} out of range [-1,399]")]
    DutIoIdOutOfRange(i32),
    #[error("failed to read profile file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed profile JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("no pin named {0}")]
    NoSuchPin(String),
    #[error("engine affinity is mixed across A1 and A2 for this pin set")]
    NoSingleAffinity,
    #[error("pin set has no valid dut_io_id, cannot derive engine affinity")]
    NoValidAffinity,
    #[error("dut_id {0} out of range")]
    NoSuchDut(i32),
    #[error("unknown profile tag name: {0}")]
    UnknownTag(String),
}

pub type Result<T> = std::result::Result<T, ProfileError>;

/// A pin's role on the board. Order matches `examples/original_source/profile.h`'s
/// `enum profile_tags` and `config_profile_pins`'s fixed iteration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProfileTag {
    None,
    Cclk,
    ResetB,
    CsiB,
    RdwrB,
    ProgramB,
    InitB,
    Done,
    Data,
    Gpio,
}

impl ProfileTag {
    pub fn name(self) -> &'static str {
        match self {
            ProfileTag::None => "NONE",
            ProfileTag::Cclk => "CCLK",
            ProfileTag::ResetB => "RESET_B",
            ProfileTag::CsiB => "CSI_B",
            ProfileTag::RdwrB => "RDWR_B",
            ProfileTag::ProgramB => "PROGRAM_B",
            ProfileTag::InitB => "INIT_B",
            ProfileTag::Done => "DONE",
            ProfileTag::Data => "DATA",
            ProfileTag::Gpio => "GPIO",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        Ok(match name {
            "NONE" => ProfileTag::None,
            "CCLK" => ProfileTag::Cclk,
            "RESET_B" => ProfileTag::ResetB,
            "CSI_B" => ProfileTag::CsiB,
            "RDWR_B" => ProfileTag::RdwrB,
            "PROGRAM_B" => ProfileTag::ProgramB,
            "INIT_B" => ProfileTag::InitB,
            "DONE" => ProfileTag::Done,
            "DATA" => ProfileTag::Data,
            "GPIO" => ProfileTag::Gpio,
            other => return Err(ProfileError::UnknownTag(other.to_string())),
        })
    }

    /// Tags that must appear at most once per DUT (everything but DATA/GPIO).
    fn is_singular(self) -> bool {
        !matches!(self, ProfileTag::Data | ProfileTag::Gpio | ProfileTag::None)
    }
}

impl fmt::Display for ProfileTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The fixed config-pin order used by `config_profile_pins`:
/// `CCLK, RESET_B, CSI_B, RDWR_B, PROGRAM_B, INIT_B, DONE, DATA[0..31]`.
pub const CONFIG_SINGULAR_TAGS: [ProfileTag; 7] = [
    ProfileTag::Cclk,
    ProfileTag::ResetB,
    ProfileTag::CsiB,
    ProfileTag::RdwrB,
    ProfileTag::ProgramB,
    ProfileTag::InitB,
    ProfileTag::Done,
];

/// An engine ("A1"/"A2") a pin's DUT I/O index belongs to, or the combined
/// affinity of a set of pins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    None,
    A1,
    A2,
    Dual,
}

/// One destination load for a (possibly shorted) connector pin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dest {
    pub dut_id: u32,
    pub pin_name: String,
}

/// One connector pin's full description. See `examples/original_source/profile.h`'s
/// `struct profile_pin`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfilePin {
    pub pin_name: String,
    pub comp_name: String,
    pub net_name: String,
    pub net_alias: Option<String>,
    pub tag: ProfileTag,
    pub tag_data: i32,
    pub dut_io_id: i32,
    pub dests: Vec<Dest>,
}

impl ProfilePin {
    /// The engine this pin's `dut_io_id` belongs to, or `None` if unassigned.
    pub fn engine(&self) -> Engine {
        match self.dut_io_id {
            0..=199 => Engine::A1,
            200..=399 => Engine::A2,
            _ => Engine::None,
        }
    }

    /// `dut_io_id` clamped into `[0,199]` the way the packer consumes it
    /// (`dut_io_id % 200`), per §3.2.
    pub fn clamped_dut_io_id(&self) -> Option<u32> {
        if self.dut_io_id < 0 {
            None
        } else {
            Some((self.dut_io_id as u32) % 200)
        }
    }
}

/// A fully validated board profile. See `examples/original_source/profile.h`'s
/// `struct profile`.
#[derive(Debug, Clone)]
pub struct Profile {
    pub path: Option<String>,
    pub board_name: String,
    pub description: String,
    pub revision: u32,
    pub num_duts: u32,
    pub pins: Vec<ProfilePin>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireDest {
    dut_id: u32,
    pin_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WirePin {
    pin_name: String,
    comp_name: String,
    net_name: String,
    #[serde(default)]
    net_alias: Option<String>,
    #[serde(default = "default_tag")]
    tag: String,
    #[serde(default)]
    tag_data: i32,
    #[serde(default = "default_dut_io_id")]
    dut_io_id: i32,
    #[serde(default)]
    dests: Vec<WireDest>,
}

fn default_tag() -> String {
    "NONE".to_string()
}

fn default_dut_io_id() -> i32 {
    -1
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireProfile {
    board_name: String,
    #[serde(default)]
    description: String,
    revision: u32,
    num_duts: u32,
    pins: Vec<WirePin>,
}

impl Profile {
    /// Parses and validates a profile JSON document. See §4.1/§3.1.
    pub fn load(path: impl AsRef<Path>) -> Result<Profile> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ProfileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let wire: WireProfile = serde_json::from_str(&text).map_err(|source| ProfileError::Json {
            path: path.display().to_string(),
            source,
        })?;

        let mut pins = Vec::with_capacity(wire.pins.len());
        for p in wire.pins {
            let tag = ProfileTag::from_name(&p.tag)?;
            if !(-1..=399).contains(&p.dut_io_id) {
                return Err(ProfileError::DutIoIdOutOfRange(p.dut_io_id));
            }
            pins.push(ProfilePin {
                pin_name: p.pin_name,
                comp_name: p.comp_name,
                net_name: p.net_name,
                net_alias: p.net_alias,
                tag,
                tag_data: p.tag_data,
                dut_io_id: p.dut_io_id,
                dests: p
                    .dests
                    .into_iter()
                    .map(|d| Dest {
                        dut_id: d.dut_id,
                        pin_name: d.pin_name,
                    })
                    .collect(),
            });
        }

        let profile = Profile {
            path: Some(path.display().to_string()),
            board_name: wire.board_name,
            description: wire.description,
            revision: wire.revision,
            num_duts: wire.num_duts,
            pins,
        };
        profile.validate()?;
        log::debug!(
            "loaded profile {:?}: {} pins, {} duts",
            profile.board_name,
            profile.pins.len(),
            profile.num_duts
        );
        Ok(profile)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for pin in &self.pins {
            if !seen.insert(pin.pin_name.as_str()) {
                return Err(ProfileError::DuplicatePinName(pin.pin_name.clone()));
            }
        }

        for dut_id in 0..self.num_duts as i32 {
            for &tag in CONFIG_SINGULAR_TAGS.iter() {
                let count = self
                    .pins
                    .iter()
                    .filter(|p| p.tag == tag && pin_belongs_to_dut(p, dut_id))
                    .count();
                if tag.is_singular() && count > 1 {
                    return Err(ProfileError::DuplicateSingularTag {
                        tag,
                        dut_id,
                        count,
                    });
                }
            }

            let data_pins: Vec<&ProfilePin> = self
                .pins
                .iter()
                .filter(|p| p.tag == ProfileTag::Data && pin_belongs_to_dut(p, dut_id))
                .collect();
            if dut_id >= 0 {
                if data_pins.len() != NUM_DATA_PINS as usize {
                    return Err(ProfileError::DataPinCount {
                        dut_id,
                        count: data_pins.len(),
                    });
                }
                let mut tag_data: Vec<i32> = data_pins.iter().map(|p| p.tag_data).collect();
                tag_data.sort_unstable();
                if tag_data != (0..NUM_DATA_PINS as i32).collect::<Vec<_>>() {
                    return Err(ProfileError::DataTagDataRange { dut_id });
                }
            }
        }

        Ok(())
    }

    /// Ordered pins carrying `tag`, scoped to one DUT (or all DUTs when
    /// `dut_id` is `None`, i.e. the `-1` convention in §4.1).
    pub fn pins_by_tag(&self, dut_id: Option<u32>, tag: ProfileTag) -> Result<Vec<&ProfilePin>> {
        let dut_id_i32 = dut_id.map(|d| d as i32).unwrap_or(-1);
        let mut pins: Vec<&ProfilePin> = self
            .pins
            .iter()
            .filter(|p| p.tag == tag && pin_belongs_to_dut(p, dut_id_i32))
            .collect();

        if tag.is_singular() && dut_id.is_some() && pins.len() != 1 {
            return Err(ProfileError::DuplicateSingularTag {
                tag,
                dut_id: dut_id_i32,
                count: pins.len(),
            });
        }
        if tag == ProfileTag::Data {
            pins = sort_pins_by_tag_data(pins);
        }
        Ok(pins)
    }

    /// The 39-pin config set in fixed order: `CCLK, RESET_B, CSI_B, RDWR_B,
    /// PROGRAM_B, INIT_B, DONE, DATA[0..31]`. See §4.1.
    pub fn config_profile_pins(&self, dut_id: u32) -> Result<Vec<&ProfilePin>> {
        let mut out = Vec::with_capacity(7 + NUM_DATA_PINS as usize);
        for &tag in CONFIG_SINGULAR_TAGS.iter() {
            out.extend(self.pins_by_tag(Some(dut_id), tag)?);
        }
        out.extend(self.pins_by_tag(Some(dut_id), ProfileTag::Data)?);
        Ok(out)
    }

    pub fn pin_by_pin_name(&self, pin_name: &str) -> Result<&ProfilePin> {
        self.pins
            .iter()
            .find(|p| p.pin_name == pin_name)
            .ok_or_else(|| ProfileError::NoSuchPin(pin_name.to_string()))
    }

    pub fn pin_by_net_name(&self, net_name: &str) -> Result<&ProfilePin> {
        self.pins
            .iter()
            .find(|p| p.net_name == net_name)
            .ok_or_else(|| ProfileError::NoSuchPin(net_name.to_string()))
    }

    pub fn pin_by_dest_pin_name(&self, dut_id: u32, dest_pin_name: &str) -> Result<&ProfilePin> {
        self.pins
            .iter()
            .find(|p| {
                p.dests
                    .iter()
                    .any(|d| d.dut_id == dut_id && d.pin_name == dest_pin_name)
            })
            .ok_or_else(|| ProfileError::NoSuchPin(dest_pin_name.to_string()))
    }

    pub fn pin_by_net_alias(&self, dut_id: u32, alias: &str) -> Result<&ProfilePin> {
        self.pins
            .iter()
            .find(|p| {
                p.net_alias.as_deref() == Some(alias) && pin_belongs_to_dut(p, dut_id as i32)
            })
            .ok_or_else(|| ProfileError::NoSuchPin(alias.to_string()))
    }

    pub fn pin_by_dut_io_id(&self, dut_io_id: i32) -> Result<&ProfilePin> {
        self.pins
            .iter()
            .find(|p| p.dut_io_id == dut_io_id)
            .ok_or_else(|| ProfileError::DutIoIdOutOfRange(dut_io_id))
    }

    /// Debug dump analogous to the original's `print_profile`.
    pub fn describe(&self) -> String {
        let mut s = format!(
            "profile {} rev {} ({} duts, {} pins)\n",
            self.board_name,
            self.revision,
            self.num_duts,
            self.pins.len()
        );
        for pin in &self.pins {
            s.push_str(&format!(
                "  {:<24} tag={:<8} tag_data={:<4} dut_io_id={}\n",
                pin.pin_name,
                pin.tag.name(),
                pin.tag_data,
                pin.dut_io_id
            ));
        }
        s
    }
}

/// A dut_id of `-1` means "any dut" (match all); otherwise an exact match.
/// Pins whose `dests` list has no entry for `dut_id` but whose tag applies
/// board-wide (dut_io_id-less pins like `CCLK`) are still scoped per-dut via
/// `dests`; pins with no `dests` are treated as belonging to every dut that
/// is queried, matching the "one profile pin may serve many duts" model in
/// `examples/original_source/profile.h`.
fn pin_belongs_to_dut(pin: &ProfilePin, dut_id: i32) -> bool {
    if dut_id < 0 {
        return true;
    }
    if pin.dests.is_empty() {
        return true;
    }
    pin.dests.iter().any(|d| d.dut_id as i32 == dut_id)
}

/// Stable sort by `tag_data`, ascending. See §4.1 (`DATA` pins sorted
/// ascending by `tag_data`) and `sort_profile_pins_by_tag_data` in
/// `examples/original_source/profile.h`.
pub fn sort_pins_by_tag_data<'a>(mut pins: Vec<&'a ProfilePin>) -> Vec<&'a ProfilePin> {
    pins.sort_by_key(|p| p.tag_data);
    pins
}

/// Derives the combined engine affinity of a pin set. See §3.1/§4.2.
pub fn engine_affinity(pins: &[&ProfilePin]) -> Result<Engine> {
    let mut saw_a1 = false;
    let mut saw_a2 = false;
    for pin in pins {
        match pin.engine() {
            Engine::A1 => saw_a1 = true,
            Engine::A2 => saw_a2 = true,
            Engine::None | Engine::Dual => {}
        }
    }
    match (saw_a1, saw_a2) {
        (true, true) => Ok(Engine::Dual),
        (true, false) => Ok(Engine::A1),
        (false, true) => Ok(Engine::A2),
        (false, false) => Err(ProfileError::NoValidAffinity),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_profile(json: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(json.as_bytes()).unwrap();
        f
    }

    fn sample_json() -> String {
        let mut pins = Vec::new();
        pins.push(r#"{"pin_name":"CCLK","comp_name":"A1","net_name":"n_cclk","tag":"CCLK","dut_io_id":-1}"#.to_string());
        pins.push(r#"{"pin_name":"RESET_B","comp_name":"A1","net_name":"n_rst","tag":"RESET_B","dut_io_id":-1}"#.to_string());
        pins.push(r#"{"pin_name":"CSI_B","comp_name":"A1","net_name":"n_csi","tag":"CSI_B","dut_io_id":-1}"#.to_string());
        pins.push(r#"{"pin_name":"RDWR_B","comp_name":"A1","net_name":"n_rdwr","tag":"RDWR_B","dut_io_id":-1}"#.to_string());
        pins.push(r#"{"pin_name":"PROGRAM_B","comp_name":"A1","net_name":"n_prog","tag":"PROGRAM_B","dut_io_id":-1}"#.to_string());
        pins.push(r#"{"pin_name":"INIT_B","comp_name":"A1","net_name":"n_init","tag":"INIT_B","dut_io_id":-1}"#.to_string());
        pins.push(r#"{"pin_name":"DONE","comp_name":"A1","net_name":"n_done","tag":"DONE","dut_io_id":-1}"#.to_string());
        for i in 0..32 {
            pins.push(format!(
                r#"{{"pin_name":"D{i}","comp_name":"A1","net_name":"n_d{i}","tag":"DATA","tag_data":{i},"dut_io_id":{i}}}"#
            ));
        }
        format!(
            r#"{{"board_name":"unit-test","description":"","revision":1,"num_duts":1,"pins":[{}]}}"#,
            pins.join(",")
        )
    }

    #[test]
    fn load_profile_validates_shape() {
        let f = write_profile(&sample_json());
        let profile = Profile::load(f.path()).unwrap();
        assert_eq!(profile.num_duts, 1);
        assert_eq!(profile.pins.len(), 39);
    }

    #[test]
    fn duplicate_pin_name_is_rejected() {
        let json = sample_json().replacen("RESET_B", "CCLK", 1);
        let f = write_profile(&json);
        assert!(matches!(
            Profile::load(f.path()),
            Err(ProfileError::DuplicatePinName(_))
        ));
    }

    #[test]
    fn config_profile_pins_has_fixed_order_and_count() {
        let f = write_profile(&sample_json());
        let profile = Profile::load(f.path()).unwrap();
        let pins = profile.config_profile_pins(0).unwrap();
        assert_eq!(pins.len(), 39);
        assert_eq!(pins[0].tag, ProfileTag::Cclk);
        assert_eq!(pins[6].tag, ProfileTag::Done);
        for (i, pin) in pins[7..].iter().enumerate() {
            assert_eq!(pin.tag, ProfileTag::Data);
            assert_eq!(pin.tag_data, i as i32);
        }
    }

    #[test]
    fn engine_affinity_detects_dual() {
        let f = write_profile(&sample_json());
        let profile = Profile::load(f.path()).unwrap();
        let mut pins: Vec<&ProfilePin> = profile.pins.iter().collect();
        assert_eq!(engine_affinity(&pins).unwrap(), Engine::A1);

        let mut extra = profile.pins[0].clone();
        extra.dut_io_id = 250;
        pins.push(&extra);
        assert_eq!(engine_affinity(&pins).unwrap(), Engine::Dual);
    }
}
