// Copyright 2026 ATE Host Runtime Contributors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Dots: an ordered, appendable sequence of `(repeat, vec_str)` records that
//! expands into per-column subvec arrays. Grounded on
//! `examples/original_source/dots.h`/`dots.c`.

pub mod config_templates;

use thiserror::Error;
use vector::Subvec;

use remain::sorted;

#[sorted]
#[derive(Error, Debug, PartialEq, Eq)]
pub enum DotsError {
    #[error("dots vec {0} is already expanded")]
    AlreadyExpanded(usize),
    #[error("dots vec {0} is not expanded")]
    NotExpanded(usize),
    #[error("no dots vec at index {0}")]
    OutOfRange(usize),
    #[error("repeat must be >= 1")]
    RepeatZero,
    #[error("unknown vec_str character {0:?}")]
    UnknownChar(char),
    #[error("vec_str length {got} does not match expected {expected}")]
    VecStrLen { got: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, DotsError>;

/// One `(repeat, vec_str)` record and its expansion state. See
/// `examples/original_source/dots.h`'s `struct dots_vec`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotsVec {
    pub repeat: u32,
    pub vec_str: String,
    pub has_clk: bool,
    pub is_expanded: bool,
    pub subvecs: Option<Vec<Subvec>>,
}

impl DotsVec {
    /// A dots vector is a NOP when every column (as authored, before a
    /// DATA injector is appended) is `X` (§3.3).
    pub fn is_nop(&self) -> bool {
        self.vec_str.chars().all(|c| c == 'X')
    }

    /// Total engine cycles this entry expands to: `repeat`, doubled if
    /// clocked (GLOSSARY "unrolled vector count").
    pub fn unrolled_count(&self) -> u64 {
        self.repeat as u64 * if self.has_clk { 2 } else { 1 }
    }
}

/// An ordered pin-list-bound sequence of dots vectors with independent A1/A2
/// read cursors for dual compilation (§3.3).
#[derive(Debug, Clone)]
pub struct Dots {
    /// `|pins|`: the full column count a fully expanded subvec array must
    /// have (including any DATA columns injected at expand time).
    num_columns: usize,
    dots_vecs: Vec<DotsVec>,
    cur_a1_dots_vec_id: usize,
    cur_a2_dots_vec_id: usize,
}

impl Dots {
    /// `create_dots(pins, expected_vector_count)` (§4.3). `num_columns` is
    /// `|pins|`; `expected_vector_count` only pre-sizes the backing `Vec`.
    pub fn new(num_columns: usize, expected_vector_count: usize) -> Dots {
        Dots {
            num_columns,
            dots_vecs: Vec::with_capacity(expected_vector_count),
            cur_a1_dots_vec_id: 0,
            cur_a2_dots_vec_id: 0,
        }
    }

    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn len(&self) -> usize {
        self.dots_vecs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dots_vecs.is_empty()
    }

    pub fn get(&self, id: usize) -> Result<&DotsVec> {
        self.dots_vecs.get(id).ok_or(DotsError::OutOfRange(id))
    }

    /// Appends a `(repeat, vec_str)` record. `n_data` is the width of the
    /// DATA injector that will be supplied at `expand` time (0 if none);
    /// `vec_str`'s length must equal `num_columns - n_data` (§4.3).
    pub fn append(&mut self, repeat: u32, vec_str: &str, n_data: usize) -> Result<usize> {
        if repeat == 0 {
            return Err(DotsError::RepeatZero);
        }
        let expected = self.num_columns - n_data;
        if vec_str.chars().count() != expected {
            return Err(DotsError::VecStrLen {
                got: vec_str.chars().count(),
                expected,
            });
        }
        for c in vec_str.chars() {
            if Subvec::from_char(c).is_none() {
                return Err(DotsError::UnknownChar(c));
            }
        }
        let has_clk = vec_str.contains('C');
        self.dots_vecs.push(DotsVec {
            repeat,
            vec_str: vec_str.to_string(),
            has_clk,
            is_expanded: false,
            subvecs: None,
        });
        Ok(self.dots_vecs.len() - 1)
    }

    /// Grows the tail with `count` NOP vectors of `vec_str_len` `X`
    /// columns (§4.3 `append_nop_vecs`, used to satisfy burst alignment).
    pub fn append_nop_vecs(&mut self, count: usize, vec_str_len: usize) {
        for _ in 0..count {
            self.dots_vecs.push(DotsVec {
                repeat: 1,
                vec_str: "X".repeat(vec_str_len),
                has_clk: false,
                is_expanded: false,
                subvecs: None,
            });
        }
    }

    /// Expands entry `id`'s `vec_str` into `num_columns` subvecs, appending
    /// `data_subvecs` (if any) after the `vec_str`-derived subvecs and
    /// padding any remaining columns with `DontCare` (§4.3). Header/footer
    /// entries declare a DATA gap at `append` time but pass `None` here —
    /// those columns are left un-driven, matching
    /// `examples/original_source/dots.c`'s `expand_dots_vec_subvecs`, which
    /// pre-fills the whole subvec array with `X` and only overwrites the
    /// tail when `data_subvecs` is non-NULL.
    pub fn expand(&mut self, id: usize, data_subvecs: Option<&[Subvec]>) -> Result<()> {
        let num_columns = self.num_columns;
        let dv = self.dots_vecs.get_mut(id).ok_or(DotsError::OutOfRange(id))?;
        if dv.is_expanded {
            return Err(DotsError::AlreadyExpanded(id));
        }
        let mut subvecs: Vec<Subvec> = dv
            .vec_str
            .chars()
            .map(|c| Subvec::from_char(c).ok_or(DotsError::UnknownChar(c)))
            .collect::<Result<_>>()?;
        if let Some(data) = data_subvecs {
            subvecs.extend_from_slice(data);
        }
        subvecs.resize(num_columns, Subvec::DontCare);
        dv.subvecs = Some(subvecs);
        dv.is_expanded = true;
        Ok(())
    }

    /// Frees entry `id`'s expanded subvec array (§4.3 `unexpand`).
    pub fn unexpand(&mut self, id: usize) -> Result<()> {
        let dv = self.dots_vecs.get_mut(id).ok_or(DotsError::OutOfRange(id))?;
        if !dv.is_expanded {
            return Err(DotsError::NotExpanded(id));
        }
        dv.subvecs = None;
        dv.is_expanded = false;
        Ok(())
    }

    /// `unrolled_count(dots) = sum(repeat_i * (has_clk_i ? 2 : 1))` (§4.3).
    pub fn unrolled_count(&self) -> u64 {
        self.dots_vecs.iter().map(DotsVec::unrolled_count).sum()
    }

    /// Advances and returns the next unread entry for `engine`'s cursor,
    /// or `None` when exhausted. `which_a1` selects `cur_a1_dots_vec_id`
    /// vs `cur_a2_dots_vec_id` so the same dots can be consumed
    /// independently per engine in dual compilation (§3.3).
    pub fn next_for_engine(&mut self, which_a1: bool) -> Option<usize> {
        let cursor = if which_a1 {
            &mut self.cur_a1_dots_vec_id
        } else {
            &mut self.cur_a2_dots_vec_id
        };
        if *cursor >= self.dots_vecs.len() {
            return None;
        }
        let id = *cursor;
        *cursor += 1;
        Some(id)
    }

    pub fn cur_a1_dots_vec_id(&self) -> usize {
        self.cur_a1_dots_vec_id
    }

    pub fn cur_a2_dots_vec_id(&self) -> usize {
        self.cur_a2_dots_vec_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Scenario S3 (§8).
    #[test]
    fn scenario_s3_dots_expansion() {
        let mut dots = Dots::new(3, 1);
        let id = dots.append(3, "CX1", 0).unwrap();
        dots.expand(id, None).unwrap();
        let dv = dots.get(id).unwrap();
        assert_eq!(
            dv.subvecs.as_ref().unwrap(),
            &[Subvec::Clock, Subvec::DontCare, Subvec::Drive1]
        );
        assert!(dv.has_clk);
        assert_eq!(dots.unrolled_count(), 6);
    }

    #[test]
    fn append_rejects_wrong_length() {
        let mut dots = Dots::new(39, 1);
        assert_eq!(
            dots.append(1, "C1001HX", 0),
            Err(DotsError::VecStrLen {
                got: 7,
                expected: 39
            })
        );
        // with a 32-wide DATA injector declared, 7 is the right length.
        assert!(dots.append(1, "C1001HX", 32).is_ok());
    }

    #[test]
    fn expand_appends_data_subvecs_after_vec_str() {
        let mut dots = Dots::new(9, 1);
        let id = dots.append(1, "C1001HX", 2).unwrap();
        let data = vec![Subvec::Drive1, Subvec::Drive0];
        dots.expand(id, Some(&data)).unwrap();
        let subvecs = dots.get(id).unwrap().subvecs.as_ref().unwrap();
        assert_eq!(subvecs.len(), 9);
        assert_eq!(&subvecs[7..], &[Subvec::Drive1, Subvec::Drive0]);
    }

    #[test]
    fn expand_pads_undriven_tail_with_dont_care_when_no_data_given() {
        // header/footer entries declare a DATA gap at append time but
        // supply no data at expand time; the gap is left un-driven.
        let mut dots = Dots::new(9, 1);
        let id = dots.append(1, "C1001HX", 2).unwrap();
        dots.expand(id, None).unwrap();
        let subvecs = dots.get(id).unwrap().subvecs.as_ref().unwrap();
        assert_eq!(subvecs.len(), 9);
        assert_eq!(&subvecs[7..], &[Subvec::DontCare, Subvec::DontCare]);
    }

    #[test]
    fn nop_vec_is_all_x() {
        let mut dots = Dots::new(3, 2);
        dots.append_nop_vecs(2, 3);
        assert!(dots.get(0).unwrap().is_nop());
        assert!(dots.get(1).unwrap().is_nop());
    }

    #[test]
    fn engine_cursors_are_independent() {
        let mut dots = Dots::new(1, 2);
        dots.append(1, "X", 0).unwrap();
        dots.append(1, "1", 0).unwrap();
        assert_eq!(dots.next_for_engine(true), Some(0));
        assert_eq!(dots.next_for_engine(false), Some(0));
        assert_eq!(dots.next_for_engine(true), Some(1));
        assert_eq!(dots.next_for_engine(true), None);
        assert_eq!(dots.next_for_engine(false), Some(1));
    }
}
