//! Frame numbers, ranges and frame sequences.
//!
//! A [`Sequence`] is an ordered list of inclusive [`Range`]s plus a zero-pad
//! width used when rendering file names. Ranges are kept in insertion order
//! and never merged, so `1-3,2-5` is a sequence of 7 frames where frames 2
//! and 3 appear twice.
//!
//! # String Form
//!
//! ```text
//! 1-5,10-12        two ranges
//! 0001-0005        pad 4
//! -10--5,7         negative numbers
//! ```
//!
//! ```rust
//! use reel_core::frame::{Range, Sequence};
//!
//! let mut seq = Sequence::from_ranges([Range::new(1, 5), Range::new(10, 12)]);
//! seq.set_pad(4);
//! assert_eq!(seq.to_string(), "0001-0005,0010-0012");
//! assert_eq!(seq.get_frame_count(), 8);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Frame number.
pub type Number = i64;

/// Position of a frame inside a sequence.
pub type Index = usize;

/// Frame number sentinel.
pub const INVALID: Number = Number::MAX;

/// Index sentinel.
pub const INVALID_INDEX: Index = Index::MAX;

/// Inclusive frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Range {
    /// First frame.
    pub min: Number,
    /// Last frame.
    pub max: Number,
}

impl Range {
    /// Creates a range; the bounds are swapped if given in reverse.
    pub fn new(a: Number, b: Number) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Range holding one frame.
    pub const fn single(frame: Number) -> Self {
        Self {
            min: frame,
            max: frame,
        }
    }

    /// Whether `frame` lies inside the range.
    pub fn contains(&self, frame: Number) -> bool {
        frame >= self.min && frame <= self.max
    }

    /// Frame count, `max - min + 1`.
    pub fn len(&self) -> usize {
        (self.max - self.min) as usize + 1
    }

    /// Always false; a range holds at least one frame.
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl From<Number> for Range {
    fn from(frame: Number) -> Self {
        Self::single(frame)
    }
}

/// Ordered list of frame ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sequence {
    ranges: Vec<Range>,
    pad: usize,
}

impl Sequence {
    /// Empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence of one range.
    pub fn from_range(range: Range) -> Self {
        Self {
            ranges: vec![range],
            pad: 0,
        }
    }

    /// Sequence of several ranges, kept in the given order.
    pub fn from_ranges(ranges: impl IntoIterator<Item = Range>) -> Self {
        Self {
            ranges: ranges.into_iter().collect(),
            pad: 0,
        }
    }

    /// Same sequence with a pad width.
    pub fn with_pad(mut self, pad: usize) -> Self {
        self.pad = pad;
        self
    }

    /// Appends a range. Adjacent or overlapping ranges are not merged.
    pub fn add(&mut self, range: Range) {
        self.ranges.push(range);
    }

    /// Ranges in insertion order.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Zero-pad width.
    pub fn pad(&self) -> usize {
        self.pad
    }

    /// Sets the zero-pad width.
    pub fn set_pad(&mut self, pad: usize) {
        self.pad = pad;
    }

    /// True if there are no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total frame count over all ranges.
    pub fn get_frame_count(&self) -> usize {
        self.ranges.iter().map(Range::len).sum()
    }

    /// Frame at `index`, or [`INVALID`] when out of range.
    pub fn get_frame(&self, index: Index) -> Number {
        let mut i = index;
        for r in &self.ranges {
            let len = r.len();
            if i < len {
                return r.min + i as Number;
            }
            i -= len;
        }
        INVALID
    }

    /// Index of the first occurrence of `frame`, or [`INVALID_INDEX`].
    pub fn get_index(&self, frame: Number) -> Index {
        let mut base = 0;
        for r in &self.ranges {
            if r.contains(frame) {
                return base + (frame - r.min) as usize;
            }
            base += r.len();
        }
        INVALID_INDEX
    }

    /// `get_frame_count() - 1`, or [`INVALID_INDEX`] when empty.
    pub fn get_last_index(&self) -> Index {
        match self.get_frame_count() {
            0 => INVALID_INDEX,
            n => n - 1,
        }
    }

    /// Whether any range holds `frame`.
    pub fn contains(&self, frame: Number) -> bool {
        self.ranges.iter().any(|r| r.contains(frame))
    }

    /// First frame, or [`INVALID`] when empty.
    pub fn first(&self) -> Number {
        self.get_frame(0)
    }

    /// Last frame, or [`INVALID`] when empty.
    pub fn last(&self) -> Number {
        self.ranges.last().map_or(INVALID, |r| r.max)
    }
}

/// Every frame of a range.
pub fn range_to_frames(range: &Range) -> Vec<Number> {
    (range.min..=range.max).collect()
}

/// Every frame of a sequence, in order, duplicates included.
pub fn to_frames(seq: &Sequence) -> Vec<Number> {
    seq.ranges.iter().flat_map(|r| r.min..=r.max).collect()
}

/// Groups consecutive frames into ranges.
///
/// The input order is kept: `[1, 2, 3, 7, 5, 6]` yields `1-3,7,5-6`.
pub fn from_frames(frames: &[Number]) -> Sequence {
    let mut seq = Sequence::new();
    let mut iter = frames.iter().copied();
    let Some(first) = iter.next() else {
        return seq;
    };
    let mut cur = Range::single(first);
    for f in iter {
        if cur.max != INVALID && f == cur.max + 1 {
            cur.max = f;
        } else {
            seq.add(cur);
            cur = Range::single(f);
        }
    }
    seq.add(cur);
    seq
}

/// Renders a frame number zero-filled to `pad` digits.
///
/// Negative numbers carry a leading `-` outside the padded digits.
pub fn number_to_string(n: Number, pad: usize) -> String {
    if n < 0 {
        format!("-{:0pad$}", n.unsigned_abs())
    } else {
        format!("{n:0pad$}")
    }
}

/// Renders `min-max`, or a single number when `min == max`.
pub fn range_to_string(range: &Range, pad: usize) -> String {
    if range.min == range.max {
        number_to_string(range.min, pad)
    } else {
        format!(
            "{}-{}",
            number_to_string(range.min, pad),
            number_to_string(range.max, pad)
        )
    }
}

impl fmt::Display for Sequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, r) in self.ranges.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(&range_to_string(r, self.pad))?;
        }
        Ok(())
    }
}

/// Parses one number token, returning the value and its padded width.
fn parse_number(token: &str) -> Result<(Number, usize)> {
    let digits = token.strip_prefix('-').unwrap_or(token);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::invalid_argument(format!("bad frame number '{token}'")));
    }
    let value: Number = token
        .parse()
        .map_err(|_| Error::invalid_argument(format!("frame number '{token}' out of range")))?;
    let pad = if digits.len() >= 2 && digits.starts_with('0') {
        digits.len()
    } else {
        0
    };
    Ok((value, pad))
}

/// Parses `N`, `N-M` and comma-joined lists of those.
///
/// The pad width is the widest zero-led token. Reversed ranges are rejected.
pub fn parse_sequence(s: &str) -> Result<Sequence> {
    let mut seq = Sequence::new();
    let s = s.trim();
    if s.is_empty() {
        return Ok(seq);
    }
    let mut pad = 0;
    for token in s.split(',') {
        let token = token.trim();
        if token.is_empty() {
            return Err(Error::invalid_argument(format!("empty range in '{s}'")));
        }
        // Skip a leading sign when looking for the separator.
        let split = token
            .char_indices()
            .skip(1)
            .find(|&(_, c)| c == '-')
            .map(|(i, _)| i);
        let range = match split {
            Some(i) => {
                let (a, pa) = parse_number(&token[..i])?;
                let (b, pb) = parse_number(&token[i + 1..])?;
                if b < a {
                    return Err(Error::invalid_argument(format!("reversed range '{token}'")));
                }
                pad = pad.max(pa).max(pb);
                Range { min: a, max: b }
            }
            None => {
                let (a, pa) = parse_number(token)?;
                pad = pad.max(pa);
                Range::single(a)
            }
        };
        seq.add(range);
    }
    seq.pad = pad;
    Ok(seq)
}

impl FromStr for Sequence {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_sequence(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_normalizes() {
        let r = Range::new(5, 1);
        assert_eq!((r.min, r.max), (1, 5));
        assert_eq!(r.len(), 5);
        assert!(r.contains(3));
        assert!(!r.contains(6));
    }

    #[test]
    fn test_sequence_indexing() {
        let seq = Sequence::from_ranges([Range::new(1, 5), Range::new(10, 12)]);
        assert_eq!(seq.get_frame_count(), 8);
        assert_eq!(seq.get_frame(0), 1);
        assert_eq!(seq.get_frame(5), 10);
        assert_eq!(seq.get_frame(7), 12);
        assert_eq!(seq.get_frame(8), INVALID);
        assert_eq!(seq.get_index(11), 6);
        assert_eq!(seq.get_index(7), INVALID_INDEX);
        assert_eq!(seq.get_last_index(), 7);
        assert_eq!(Sequence::new().get_last_index(), INVALID_INDEX);
    }

    #[test]
    fn test_index_frame_inverse() {
        let seq = Sequence::from_ranges([Range::new(-3, 2), Range::new(100, 104)]);
        for i in 0..seq.get_frame_count() {
            assert_eq!(seq.get_index(seq.get_frame(i)), i);
        }
    }

    #[test]
    fn test_add_does_not_merge() {
        let mut seq = Sequence::from_range(Range::new(1, 3));
        seq.add(Range::new(2, 5));
        seq.add(Range::single(6));
        assert_eq!(seq.ranges().len(), 3);
        assert_eq!(seq.get_frame_count(), 8);
        assert_eq!(seq.to_string(), "1-3,2-5,6");
    }

    #[test]
    fn test_display_padded() {
        let seq = Sequence::from_ranges([Range::new(1, 5), Range::new(10, 12)]).with_pad(4);
        assert_eq!(seq.to_string(), "0001-0005,0010-0012");
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(number_to_string(7, 0), "7");
        assert_eq!(number_to_string(7, 4), "0007");
        assert_eq!(number_to_string(-7, 3), "-007");
        assert_eq!(number_to_string(12345, 3), "12345");
    }

    #[test]
    fn test_parse() {
        let seq: Sequence = "0001-0005,0010-0012".parse().unwrap();
        assert_eq!(seq.ranges(), &[Range::new(1, 5), Range::new(10, 12)]);
        assert_eq!(seq.pad(), 4);

        let seq = parse_sequence("1-3, 7").unwrap();
        assert_eq!(seq.pad(), 0);
        assert_eq!(to_frames(&seq), [1, 2, 3, 7]);

        let seq = parse_sequence("-10--5,0").unwrap();
        assert_eq!(seq.ranges(), &[Range::new(-10, -5), Range::single(0)]);

        assert!(parse_sequence("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_round_trip() {
        for s in ["1-5,10-12", "0001-0005,0010-0012", "7", "-3-2", "0100,0102-0110"] {
            assert_eq!(parse_sequence(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for s in ["1-", "a", "1,,2", "5-1", "1-2-3", "--1", "1.5"] {
            let err = parse_sequence(s).unwrap_err();
            assert!(matches!(err, Error::InvalidArgument(_)), "{s}");
        }
    }

    #[test]
    fn test_from_frames_groups_runs() {
        let seq = from_frames(&[1, 2, 3, 7, 5, 6]);
        assert_eq!(seq.to_string(), "1-3,7,5-6");
        assert_eq!(to_frames(&seq), [1, 2, 3, 7, 5, 6]);
        assert!(from_frames(&[]).is_empty());
    }

    #[test]
    fn test_range_to_frames() {
        assert_eq!(range_to_frames(&Range::new(3, 5)), [3, 4, 5]);
    }
}
