//! Time base arithmetic, BCD timecode and film keycode.
//!
//! # Timecode
//!
//! SMPTE timecode is stored as packed BCD, two decimal digits per field:
//!
//! ```text
//! bits  31-28 27-24 23-20 19-16 15-12 11-8  7-4   3-0
//!       H10   H1    M10   M1    S10   S1    F10   F1
//! ```
//!
//! Frame/timecode conversion multiplies by the float rate and truncates,
//! so NTSC rates round-trip within one frame.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::frame::Number;
use crate::speed::Speed;

/// Ticks per second of the shared time base.
///
/// Divisible by every common video and audio rate.
pub const TIMEBASE: i64 = 705_600_000;

/// Rescales `value` counted at rate `from` into a count at rate `to`,
/// rounding to nearest.
///
/// Returns 0 when either speed is invalid.
pub fn scale(value: i64, from: Speed, to: Speed) -> i64 {
    let b = from.den as i128 * to.num as i128;
    let c = from.num as i128 * to.den as i128;
    if c == 0 {
        return 0;
    }
    ((value as i128 * b + c / 2) / c) as i64
}

/// Frame number to time base ticks.
pub fn frame_to_ticks(frame: Number, speed: Speed) -> i64 {
    scale(frame, speed, Speed::new(TIMEBASE as u32, 1))
}

/// Time base ticks to frame number.
pub fn ticks_to_frame(ticks: i64, speed: Speed) -> Number {
    scale(ticks, Speed::new(TIMEBASE as u32, 1), speed)
}

/// Packed BCD timecode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timecode(pub u32);

impl Timecode {
    /// Packs hours, minutes, seconds and frames (each 0..=99).
    pub const fn from_time(h: u32, m: u32, s: u32, f: u32) -> Self {
        Self(
            ((h / 10) & 0xf) << 28
                | ((h % 10) & 0xf) << 24
                | ((m / 10) & 0xf) << 20
                | ((m % 10) & 0xf) << 16
                | ((s / 10) & 0xf) << 12
                | ((s % 10) & 0xf) << 8
                | ((f / 10) & 0xf) << 4
                | (f % 10) & 0xf,
        )
    }

    /// Unpacks into `(hours, minutes, seconds, frames)`.
    pub const fn to_time(&self) -> (u32, u32, u32, u32) {
        let v = self.0;
        (
            (v >> 28 & 0xf) * 10 + (v >> 24 & 0xf),
            (v >> 20 & 0xf) * 10 + (v >> 16 & 0xf),
            (v >> 12 & 0xf) * 10 + (v >> 8 & 0xf),
            (v >> 4 & 0xf) * 10 + (v & 0xf),
        )
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (h, m, s, fr) = self.to_time();
        write!(f, "{h:02}:{m:02}:{s:02}:{fr:02}")
    }
}

impl FromStr for Timecode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        string_to_timecode(s)
    }
}

/// `(h * 3600 + m * 60 + s) * fps + f`, or 0 for an invalid speed.
///
/// Rounds up to the first frame whose timecode is `tc`, which makes this the
/// exact inverse of [`frame_to_timecode`] at fractional rates.
pub fn timecode_to_frame(tc: Timecode, speed: Speed) -> Number {
    if !speed.is_valid() {
        return 0;
    }
    let (h, m, s, f) = tc.to_time();
    let secs = h as i128 * 3600 + m as i128 * 60 + s as i128;
    let (num, den) = (speed.num as i128, speed.den as i128);
    let ticks = secs * num + f as i128 * den;
    ticks.div_euclid(den) as Number + (ticks.rem_euclid(den) != 0) as Number
}

/// Breaks a frame number into a timecode, truncating each field.
///
/// Works in whole ticks of the rational speed, so the seconds and frame
/// fields are exact at NTSC rates. Negative frames clamp to zero.
/// Returns a zero timecode for an invalid speed.
pub fn frame_to_timecode(frame: Number, speed: Speed) -> Timecode {
    if !speed.is_valid() {
        return Timecode(0);
    }
    let (num, den) = (speed.num as i128, speed.den as i128);
    let ticks = frame.max(0) as i128 * den;
    let secs = ticks / num;
    let f = (ticks - secs * num) / den;
    Timecode::from_time(
        (secs / 3600) as u32,
        (secs % 3600 / 60) as u32,
        (secs % 60) as u32,
        f as u32,
    )
}

/// `"HH:MM:SS:FF"`.
pub fn timecode_to_string(tc: Timecode) -> String {
    tc.to_string()
}

/// Parses `FF`, `SS:FF`, `MM:SS:FF` or `HH:MM:SS:FF`.
pub fn string_to_timecode(s: &str) -> Result<Timecode> {
    let pieces = s
        .trim()
        .split(':')
        .map(|p| {
            p.trim()
                .parse::<u32>()
                .map_err(|_| Error::invalid_argument(format!("bad timecode '{s}'")))
        })
        .collect::<Result<Vec<u32>>>()?;
    let (h, m, sec, f) = match pieces.as_slice() {
        [f] => (0, 0, 0, *f),
        [sec, f] => (0, 0, *sec, *f),
        [m, sec, f] => (0, *m, *sec, *f),
        [h, m, sec, f] => (*h, *m, *sec, *f),
        _ => return Err(Error::invalid_argument(format!("bad timecode '{s}'"))),
    };
    Ok(Timecode::from_time(h, m, sec, f))
}

/// How frame numbers are shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// `HH:MM:SS:FF`
    #[default]
    Timecode,
    /// Plain frame numbers.
    Frames,
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Timecode => "timecode",
            Self::Frames => "frames",
        })
    }
}

impl FromStr for Units {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timecode" => Ok(Self::Timecode),
            "frames" => Ok(Self::Frames),
            _ => Err(Error::invalid_argument(format!("unknown time units '{s}'"))),
        }
    }
}

/// Renders a frame number in the given units.
pub fn to_string(frame: Number, speed: Speed, units: Units) -> String {
    match units {
        Units::Timecode => frame_to_timecode(frame, speed).to_string(),
        Units::Frames => frame.to_string(),
    }
}

/// Parses a frame number in the given units.
pub fn from_string(s: &str, speed: Speed, units: Units) -> Result<Number> {
    match units {
        Units::Timecode => Ok(timecode_to_frame(string_to_timecode(s)?, speed)),
        Units::Frames => s
            .trim()
            .parse()
            .map_err(|_| Error::invalid_argument(format!("bad frame number '{s}'"))),
    }
}

/// Splits seconds into `(hours, minutes, seconds)`.
pub fn seconds_to_time(secs: f64) -> (i32, i32, f64) {
    let h = (secs / 3600.0) as i32;
    let rest = secs - h as f64 * 3600.0;
    let m = (rest / 60.0) as i32;
    (h, m, rest - m as f64 * 60.0)
}

/// `"HH:MM:SS"` for a duration in seconds.
pub fn label(secs: f64) -> String {
    let (h, m, s) = seconds_to_time(secs);
    format!("{h:02}:{m:02}:{:02}", s as i32)
}

/// Film edge code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Keycode {
    /// Manufacturer id.
    pub id: i32,
    /// Film type.
    pub kind: i32,
    /// Prefix.
    pub prefix: i32,
    /// Count.
    pub count: i32,
    /// Perforation offset.
    pub offset: i32,
}

impl fmt::Display for Keycode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.id, self.kind, self.prefix, self.count, self.offset
        )
    }
}

impl FromStr for Keycode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let bad = || Error::invalid_argument(format!("bad keycode '{s}'"));
        let v = s
            .split(':')
            .map(|p| p.trim().parse::<i32>().map_err(|_| bad()))
            .collect::<Result<Vec<i32>>>()?;
        match v.as_slice() {
            [id, kind, prefix, count, offset] => Ok(Self {
                id: *id,
                kind: *kind,
                prefix: *prefix,
                count: *count,
                offset: *offset,
            }),
            _ => Err(bad()),
        }
    }
}

/// `"id:type:prefix:count:offset"`.
pub fn keycode_to_string(id: i32, kind: i32, prefix: i32, count: i32, offset: i32) -> String {
    Keycode {
        id,
        kind,
        prefix,
        count,
        offset,
    }
    .to_string()
}

/// Parses exactly five colon-separated integers.
pub fn string_to_keycode(s: &str) -> Result<Keycode> {
    s.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speed::Fps;

    #[test]
    fn test_scale() {
        let fps24 = Speed::new(24, 1);
        assert_eq!(frame_to_ticks(24, fps24), TIMEBASE);
        assert_eq!(ticks_to_frame(TIMEBASE, fps24), 24);
        assert_eq!(scale(48, fps24, Speed::new(48, 1)), 96);
        assert_eq!(scale(1, fps24, Speed::new(0, 1)), 0);
    }

    #[test]
    fn test_bcd_packing() {
        let tc = Timecode::from_time(1, 2, 3, 4);
        assert_eq!(tc.0, 0x0102_0304);
        assert_eq!(tc.to_time(), (1, 2, 3, 4));
        assert_eq!(tc.to_string(), "01:02:03:04");
    }

    #[test]
    fn test_timecode_to_frame() {
        let tc = Timecode::from_time(1, 0, 0, 0);
        assert_eq!(timecode_to_frame(tc, Speed::new(24, 1)), 86400);
        assert_eq!(timecode_to_frame(tc, Speed::new(0, 0)), 0);
        assert_eq!(frame_to_timecode(86400, Speed::new(24, 1)), tc);
        assert_eq!(frame_to_timecode(10, Speed::new(24, 0)), Timecode(0));
    }

    #[test]
    fn test_frame_timecode_round_trip() {
        for speed in [Fps::Fps24.speed(), Fps::Fps25.speed(), Fps::Fps23_976.speed(), Fps::Fps29_97.speed()] {
            for f in (0..200_000).step_by(997) {
                let back = timecode_to_frame(frame_to_timecode(f, speed), speed);
                assert_eq!(back, f, "{speed}");
            }
        }
    }

    #[test]
    fn test_timecode_frame_round_trip() {
        for speed in [Fps::Fps29_97.speed(), Fps::Fps23_976.speed(), Fps::Fps24.speed()] {
            for f in 0..200_000 {
                let tc = frame_to_timecode(f, speed);
                assert_eq!(frame_to_timecode(timecode_to_frame(tc, speed), speed), tc, "{speed}: {f}");
            }
        }
        let ntsc = Speed::new(30000, 1001);
        assert_eq!(frame_to_timecode(30, ntsc).to_string(), "00:00:01:00");
        assert_eq!(timecode_to_frame(Timecode::from_time(0, 0, 1, 0), ntsc), 30);
        assert_eq!(frame_to_timecode(-5, ntsc), Timecode(0));
    }

    #[test]
    fn test_string_to_timecode() {
        assert_eq!(string_to_timecode("01:02:03:04").unwrap(), Timecode::from_time(1, 2, 3, 4));
        assert_eq!(string_to_timecode("03:04").unwrap(), Timecode::from_time(0, 0, 3, 4));
        assert_eq!(string_to_timecode("7").unwrap(), Timecode::from_time(0, 0, 0, 7));
        assert!(string_to_timecode("1:2:3:4:5").is_err());
        assert!(string_to_timecode("aa:bb").is_err());
    }

    #[test]
    fn test_units() {
        let speed = Speed::new(24, 1);
        assert_eq!(to_string(48, speed, Units::Timecode), "00:00:02:00");
        assert_eq!(to_string(48, speed, Units::Frames), "48");
        assert_eq!(from_string("00:00:02:00", speed, Units::Timecode).unwrap(), 48);
        assert_eq!(from_string("48", speed, Units::Frames).unwrap(), 48);
        assert!(from_string("x", speed, Units::Frames).is_err());
        assert_eq!("Frames".parse::<Units>().unwrap(), Units::Frames);
    }

    #[test]
    fn test_label() {
        assert_eq!(label(3725.5), "01:02:05");
        let (h, m, s) = seconds_to_time(3725.5);
        assert_eq!((h, m), (1, 2));
        assert!((s - 5.5).abs() < 1e-9);
    }

    #[test]
    fn test_keycode() {
        assert_eq!(keycode_to_string(1, 2, 3, 4, 5), "1:2:3:4:5");
        let k = string_to_keycode("1:2:3:4:5").unwrap();
        assert_eq!((k.id, k.kind, k.prefix, k.count, k.offset), (1, 2, 3, 4, 5));
        assert!(string_to_keycode("1:2:3:4").is_err());
    }
}
