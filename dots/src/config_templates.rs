// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Frozen FPGA-config vector recipes, carried over byte-for-byte from
//! `examples/original_source/config.c`'s `config_header`/`config_body`/
//! `config_footer` arrays. Columns are `profile::CONFIG_SINGULAR_TAGS`:
//! `[CCLK, RESET_B, CSI_B, RDWR_B, PROGRAM_B, INIT_B, DONE]`.

use profile::CONFIG_SINGULAR_TAGS;

/// One `(repeat, vec_str)` template entry.
#[derive(Debug, Clone, Copy)]
pub struct TemplateEntry {
    pub repeat: u32,
    pub vec_str: &'static str,
}

/// Which of the three frozen tables a template entry set belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigType {
    Header,
    Body,
    Footer,
}

pub const NUM_CONFIG_COLUMNS: usize = CONFIG_SINGULAR_TAGS.len();

/// `config_header` from `config.c`: initial state, reset pulse, prog_b/
/// init_b handshake, cclk-on.
pub const CONFIG_HEADER: &[TemplateEntry] = &[
    TemplateEntry { repeat: 5, vec_str: "011111X" },
    TemplateEntry { repeat: 5, vec_str: "001111X" },
    TemplateEntry { repeat: 5, vec_str: "011111X" },
    TemplateEntry { repeat: 30, vec_str: "011100X" },
    TemplateEntry { repeat: 50000, vec_str: "C11110X" },
    TemplateEntry { repeat: 1, vec_str: "C11111L" },
    TemplateEntry { repeat: 30, vec_str: "C11011L" },
    TemplateEntry { repeat: 1, vec_str: "C10011L" },
];

/// `config_body` from `config.c`: exactly one entry, repeated once per
/// bitstream word by the compiler with a 32-subvec DATA payload injected
/// per repetition (§3.4).
pub const CONFIG_BODY: &[TemplateEntry] = &[TemplateEntry {
    repeat: 1,
    vec_str: "C1001HX",
}];

/// `config_footer` from `config.c`: cclk-off, wait for `DONE`, de-assert.
/// The last entry must not carry a clock or a repeat > 1 since it is also
/// used to pad a chunk (preserved verbatim from the original's warning
/// comment).
pub const CONFIG_FOOTER: &[TemplateEntry] = &[
    TemplateEntry { repeat: 33, vec_str: "C1101HX" },
    TemplateEntry { repeat: 50000, vec_str: "C1101HX" },
    TemplateEntry { repeat: 5, vec_str: "C1101HH" },
    TemplateEntry { repeat: 1, vec_str: "011111X" },
];

pub fn template(ty: ConfigType) -> &'static [TemplateEntry] {
    match ty {
        ConfigType::Header => CONFIG_HEADER,
        ConfigType::Body => CONFIG_BODY,
        ConfigType::Footer => CONFIG_FOOTER,
    }
}

/// `get_config_num_vecs_by_type`: the number of `(repeat, vec_str)` entries.
pub fn num_vecs_by_type(ty: ConfigType) -> u32 {
    template(ty).len() as u32
}

/// `get_config_unrolled_num_vecs_by_type`: sum of each entry's `repeat`,
/// doubled when its `vec_str` contains a clock column.
pub fn unrolled_num_vecs_by_type(ty: ConfigType) -> u64 {
    template(ty)
        .iter()
        .map(|e| e.repeat as u64 * if e.vec_str.contains('C') { 2 } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_is_exactly_one_entry() {
        assert_eq!(num_vecs_by_type(ConfigType::Body), 1);
        assert_eq!(CONFIG_BODY[0].repeat, 1);
        assert!(CONFIG_BODY[0].vec_str.contains('C'));
    }

    #[test]
    fn footer_last_entry_has_no_clock_and_repeat_one() {
        let last = CONFIG_FOOTER.last().unwrap();
        assert_eq!(last.repeat, 1);
        assert!(!last.vec_str.contains('C'));
    }

    #[test]
    fn template_entries_match_column_count() {
        for ty in [ConfigType::Header, ConfigType::Body, ConfigType::Footer] {
            for entry in template(ty) {
                assert_eq!(entry.vec_str.chars().count(), NUM_CONFIG_COLUMNS);
            }
        }
    }

    #[test]
    fn unrolled_count_doubles_clocked_entries() {
        let expected: u64 = CONFIG_HEADER
            .iter()
            .map(|e| e.repeat as u64 * if e.vec_str.contains('C') { 2 } else { 1 })
            .sum();
        assert_eq!(unrolled_num_vecs_by_type(ConfigType::Header), expected);
        assert!(expected > CONFIG_HEADER.iter().map(|e| e.repeat as u64).sum::<u64>());
    }
}
