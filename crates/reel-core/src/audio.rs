//! Audio sample types and interleaved sample buffers.
//!
//! Samples are stored interleaved (`L R L R ...`) in native byte order.
//! [`AudioBuffer::sample_count`] counts individual samples across all
//! channels, so a stereo buffer of 100 frames holds 200 samples.
//!
//! # Conversion Rules
//!
//! | From -> To | Rule |
//! |------------|------|
//! | int -> float | `v / 2^(n-1)`; U8 is offset binary, `(v - 128) / 128` |
//! | float -> int | clamp `[-1, 1]`, `* 2^(n-1)`, round half away from zero, clamp to domain |
//! | int -> int | shift, e.g. `S8 -> S16` is `v << 8`; U8 <-> S8 flips the sign bit |
//! | F32 <-> F64 | cast |
//!
//! Integer kinds are widened to a signed 32-bit domain before re-narrowing,
//! which makes every int -> int pair a pair of shifts.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Audio sample representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SampleType {
    /// Unset.
    #[default]
    None,
    /// Unsigned 8-bit, offset binary (128 = silence).
    U8,
    /// Signed 8-bit.
    S8,
    /// Signed 16-bit.
    S16,
    /// Signed 32-bit.
    S32,
    /// 32-bit float in `[-1, 1]`.
    F32,
    /// 64-bit float in `[-1, 1]`.
    F64,
}

impl SampleType {
    /// Every concrete sample type.
    pub const ALL: [SampleType; 6] = [Self::U8, Self::S8, Self::S16, Self::S32, Self::F32, Self::F64];

    /// Bytes per sample.
    pub const fn byte_count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::U8 | Self::S8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Bits per sample.
    pub const fn bit_depth(&self) -> u8 {
        (self.byte_count() * 8) as u8
    }

    /// True for F32 and F64.
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// True for everything but `None`.
    pub const fn is_valid(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Value range as `(min, max)`.
    ///
    /// Signed ranges are asymmetric: S16 is `(-32768, 32767)`.
    pub fn range(&self) -> (f64, f64) {
        match self {
            Self::None => (0.0, 0.0),
            Self::U8 => (0.0, u8::MAX as f64),
            Self::S8 => (i8::MIN as f64, i8::MAX as f64),
            Self::S16 => (i16::MIN as f64, i16::MAX as f64),
            Self::S32 => (i32::MIN as f64, i32::MAX as f64),
            Self::F32 | Self::F64 => (-1.0, 1.0),
        }
    }

    /// Integer sample type for a bit depth (8 maps to U8, as WAV does).
    pub fn from_int_bits(bits: u16) -> Self {
        match bits {
            8 => Self::U8,
            16 => Self::S16,
            32 => Self::S32,
            _ => Self::None,
        }
    }

    /// Float sample type for a bit depth.
    pub fn from_float_bits(bits: u16) -> Self {
        match bits {
            32 => Self::F32,
            64 => Self::F64,
            _ => Self::None,
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::U8 => "U8",
            Self::S8 => "S8",
            Self::S16 => "S16",
            Self::S32 => "S32",
            Self::F32 => "F32",
            Self::F64 => "F64",
        };
        f.write_str(s)
    }
}

// === Scalar conversions ===

/// Flips the sign bit.
#[inline]
pub const fn u8_to_s8(v: u8) -> i8 {
    (v ^ 0x80) as i8
}

/// Flips the sign bit.
#[inline]
pub const fn s8_to_u8(v: i8) -> u8 {
    (v as u8) ^ 0x80
}

/// `v << 8`
#[inline]
pub const fn s8_to_s16(v: i8) -> i16 {
    (v as i16) << 8
}

/// `v >> 8`
#[inline]
pub const fn s16_to_s8(v: i16) -> i8 {
    (v >> 8) as i8
}

/// `v << 16`
#[inline]
pub const fn s16_to_s32(v: i16) -> i32 {
    (v as i32) << 16
}

/// `v >> 16`
#[inline]
pub const fn s32_to_s16(v: i32) -> i16 {
    (v >> 16) as i16
}

/// `v / 32768`
#[inline]
pub fn s16_to_f32(v: i16) -> f32 {
    v as f32 / 32768.0
}

/// `v / 2^31`
#[inline]
pub fn s32_to_f32(v: i32) -> f32 {
    (v as f64 / 2_147_483_648.0) as f32
}

/// `(v - 128) / 128`
#[inline]
pub fn u8_to_f32(v: u8) -> f32 {
    (v as f32 - 128.0) / 128.0
}

/// Clamps, scales by `2^(bits-1)`, rounds and clamps to the signed domain.
#[inline]
fn float_to_signed(v: f64, bits: u32) -> i64 {
    let scale = (1i64 << (bits - 1)) as f64;
    let max = (1i64 << (bits - 1)) - 1;
    let min = -(1i64 << (bits - 1));
    ((v.clamp(-1.0, 1.0) * scale).round() as i64).clamp(min, max)
}

/// Float to S16.
#[inline]
pub fn f32_to_s16(v: f32) -> i16 {
    float_to_signed(v as f64, 16) as i16
}

/// Float to S32.
#[inline]
pub fn f32_to_s32(v: f32) -> i32 {
    float_to_signed(v as f64, 32) as i32
}

/// Float to offset-binary U8.
#[inline]
pub fn f32_to_u8(v: f32) -> u8 {
    (float_to_signed(v as f64, 8) + 128) as u8
}

/// A decoded sample: integers widened to the S32 domain, floats as f64.
#[derive(Debug, Clone, Copy)]
enum Wide {
    Int(i32),
    Float(f64),
}

#[inline]
fn load(t: SampleType, b: &[u8]) -> Wide {
    match t {
        SampleType::U8 => Wide::Int((u8_to_s8(b[0]) as i32) << 24),
        SampleType::S8 => Wide::Int((b[0] as i8 as i32) << 24),
        SampleType::S16 => Wide::Int((i16::from_ne_bytes([b[0], b[1]]) as i32) << 16),
        SampleType::S32 => Wide::Int(i32::from_ne_bytes([b[0], b[1], b[2], b[3]])),
        SampleType::F32 => Wide::Float(f32::from_ne_bytes([b[0], b[1], b[2], b[3]]) as f64),
        SampleType::F64 => {
            let mut w = [0u8; 8];
            w.copy_from_slice(&b[..8]);
            Wide::Float(f64::from_ne_bytes(w))
        }
        SampleType::None => Wide::Int(0),
    }
}

#[inline]
fn store(t: SampleType, v: Wide, b: &mut [u8]) {
    let to_float = |v: Wide| match v {
        Wide::Int(i) => i as f64 / 2_147_483_648.0,
        Wide::Float(f) => f,
    };
    let to_int = |v: Wide, bits: u32| match v {
        Wide::Int(i) => (i >> (32 - bits)) as i64,
        Wide::Float(f) => float_to_signed(f, bits),
    };
    match t {
        SampleType::U8 => b[0] = s8_to_u8(to_int(v, 8) as i8),
        SampleType::S8 => b[0] = to_int(v, 8) as i8 as u8,
        SampleType::S16 => b[..2].copy_from_slice(&(to_int(v, 16) as i16).to_ne_bytes()),
        SampleType::S32 => b[..4].copy_from_slice(&(to_int(v, 32) as i32).to_ne_bytes()),
        SampleType::F32 => b[..4].copy_from_slice(&(to_float(v) as f32).to_ne_bytes()),
        SampleType::F64 => b[..8].copy_from_slice(&to_float(v).to_ne_bytes()),
        SampleType::None => {}
    }
}

// === Buffers ===

/// Audio stream description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Interleaved channel count.
    pub channels: u8,
    /// Sample representation.
    pub sample_type: SampleType,
    /// Frames per second.
    pub sample_rate: u32,
}

impl AudioInfo {
    /// Creates an audio description.
    pub fn new(channels: u8, sample_type: SampleType, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_type,
            sample_rate,
        }
    }

    /// `channels > 0 && sample_type != None && sample_rate > 0`.
    pub fn is_valid(&self) -> bool {
        self.channels > 0 && self.sample_type.is_valid() && self.sample_rate > 0
    }

    /// Bytes per sample frame (one sample of every channel).
    pub fn frame_byte_count(&self) -> usize {
        self.channels as usize * self.sample_type.byte_count()
    }
}

/// Interleaved audio samples.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    info: AudioInfo,
    sample_count: usize,
    data: Vec<u8>,
}

impl AudioBuffer {
    /// Zero-filled buffer holding `sample_count` samples.
    pub fn new(info: AudioInfo, sample_count: usize) -> Self {
        Self {
            info,
            sample_count,
            data: vec![0u8; sample_count * info.sample_type.byte_count()],
        }
    }

    /// Wraps existing interleaved bytes.
    pub fn from_vec(info: AudioInfo, data: Vec<u8>) -> Result<Self> {
        let bytes = info.sample_type.byte_count();
        if bytes == 0 {
            return Err(Error::invalid_argument("audio sample type is None"));
        }
        if data.len() % bytes != 0 {
            let expected = data.len() / bytes * bytes;
            return Err(Error::buffer_size(expected, data.len()));
        }
        Ok(Self {
            info,
            sample_count: data.len() / bytes,
            data,
        })
    }

    /// Stream description.
    pub fn info(&self) -> &AudioInfo {
        &self.info
    }

    /// Sample type shortcut.
    pub fn sample_type(&self) -> SampleType {
        self.info.sample_type
    }

    /// Samples across all channels.
    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// Sample frames: `sample_count / channels`.
    pub fn frame_count(&self) -> usize {
        match self.info.channels {
            0 => 0,
            c => self.sample_count / c as usize,
        }
    }

    /// `sample_count * bytes_per_sample`.
    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        match self.info.sample_rate {
            0 => 0.0,
            r => self.frame_count() as f64 / r as f64,
        }
    }

    /// Raw bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the buffer, returning the bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Samples per parallel work item.
const CHUNK_SAMPLES: usize = 8192;

/// Converts every sample to `sample_type`.
///
/// Channel count and rate are kept.
///
/// # Errors
///
/// [`Error::InvalidArgument`] if either sample type is `None`.
pub fn convert(src: &AudioBuffer, sample_type: SampleType) -> Result<AudioBuffer> {
    let from = src.sample_type();
    if !from.is_valid() || !sample_type.is_valid() {
        return Err(Error::invalid_argument(format!(
            "cannot convert audio {from} to {sample_type}"
        )));
    }
    let info = AudioInfo {
        sample_type,
        ..src.info
    };
    if from == sample_type {
        return Ok(AudioBuffer {
            info,
            sample_count: src.sample_count,
            data: src.data.clone(),
        });
    }

    let mut out = AudioBuffer::new(info, src.sample_count);
    let sb = from.byte_count();
    let db = sample_type.byte_count();
    if src.sample_count == 0 {
        return Ok(out);
    }
    out.data
        .par_chunks_mut(CHUNK_SAMPLES * db)
        .zip(src.data.par_chunks(CHUNK_SAMPLES * sb))
        .for_each(|(d, s)| {
            for (dv, sv) in d.chunks_exact_mut(db).zip(s.chunks_exact(sb)) {
                store(sample_type, load(from, sv), dv);
            }
        });
    Ok(out)
}

/// Planar (`LLLL RRRR`) to interleaved (`L R L R`).
///
/// Each plane holds `sample_count / channels` samples.
pub fn planar_interleave(src: &AudioBuffer) -> AudioBuffer {
    reorder(src, false)
}

/// Interleaved (`L R L R`) to planar (`LLLL RRRR`).
pub fn planar_deinterleave(src: &AudioBuffer) -> AudioBuffer {
    reorder(src, true)
}

fn reorder(src: &AudioBuffer, to_planar: bool) -> AudioBuffer {
    let channels = src.info.channels as usize;
    let bytes = src.sample_type().byte_count();
    let mut out = AudioBuffer::new(src.info, src.sample_count);
    if channels <= 1 || bytes == 0 {
        out.data.copy_from_slice(&src.data);
        return out;
    }

    let plane = src.sample_count / channels;
    for c in 0..channels {
        for i in 0..plane {
            let planar = (c * plane + i) * bytes;
            let interleaved = (i * channels + c) * bytes;
            let (from, to) = if to_planar {
                (interleaved, planar)
            } else {
                (planar, interleaved)
            };
            out.data[to..to + bytes].copy_from_slice(&src.data[from..from + bytes]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn buffer<T: Copy, const N: usize>(t: SampleType, channels: u8, v: [T; N], f: fn(T) -> Vec<u8>) -> AudioBuffer {
        let data = v.iter().flat_map(|s| f(*s)).collect();
        AudioBuffer::from_vec(AudioInfo::new(channels, t, 48000), data).unwrap()
    }

    fn f32_samples(buf: &AudioBuffer) -> Vec<f32> {
        buf.data()
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn test_sample_type_table() {
        assert_eq!(SampleType::S16.byte_count(), 2);
        assert_eq!(SampleType::F64.byte_count(), 8);
        assert_eq!(SampleType::S16.range(), (-32768.0, 32767.0));
        assert!(SampleType::F32.is_float());
        assert!(!SampleType::S32.is_float());
        assert_eq!(SampleType::from_int_bits(8), SampleType::U8);
        assert_eq!(SampleType::from_float_bits(64), SampleType::F64);
    }

    #[test]
    fn test_scalar_rules() {
        assert_eq!(u8_to_s8(128), 0);
        assert_eq!(u8_to_s8(0), -128);
        assert_eq!(s8_to_u8(127), 255);
        assert_eq!(s8_to_s16(-1), -256);
        assert_eq!(s16_to_s8(0x7fff), 0x7f);
        assert_eq!(s16_to_f32(-32768), -1.0);
        assert_eq!(f32_to_s16(1.0), 32767);
        assert_eq!(f32_to_s16(-1.0), -32768);
        assert_eq!(f32_to_s16(2.0), 32767);
        assert_eq!(f32_to_s32(1.0), i32::MAX);
        assert_eq!(f32_to_u8(0.0), 128);
        assert_eq!(u8_to_f32(0), -1.0);
    }

    #[test]
    fn test_convert_s16_to_f32() {
        let src = buffer(SampleType::S16, 2, [-32768i16, 0, 16384, 32767], |v| v.to_ne_bytes().to_vec());
        let out = convert(&src, SampleType::F32).unwrap();
        assert_eq!(out.sample_count(), 4);
        assert_eq!(out.frame_count(), 2);
        assert_eq!(out.byte_count(), 16);
        let s = f32_samples(&out);
        assert_eq!(s[0], -1.0);
        assert_eq!(s[1], 0.0);
        assert_eq!(s[2], 0.5);
        assert_abs_diff_eq!(s[3], 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_int_pairs_shift() {
        let src = buffer(SampleType::S16, 1, [0x1234i16, -2], |v| v.to_ne_bytes().to_vec());
        let out = convert(&src, SampleType::S32).unwrap();
        let v: Vec<i32> = out
            .data()
            .chunks_exact(4)
            .map(|b| i32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(v, [0x1234_0000, -0x2_0000]);

        let back = convert(&out, SampleType::S16).unwrap();
        assert_eq!(back.data(), src.data());

        let u8s = convert(&src, SampleType::U8).unwrap();
        assert_eq!(u8s.data(), &[0x12 ^ 0x80, 0xff ^ 0x80]);
    }

    #[test]
    fn test_float_round_trip_is_exact_for_ints() {
        for t in [SampleType::U8, SampleType::S8, SampleType::S16] {
            let n = 1usize << t.bit_depth();
            let data: Vec<u8> = match t {
                SampleType::S16 => (0..n).flat_map(|i| (i as u16).to_ne_bytes()).collect(),
                _ => (0..n).map(|i| i as u8).collect(),
            };
            let src = AudioBuffer::from_vec(AudioInfo::new(1, t, 44100), data).unwrap();
            for f in [SampleType::F32, SampleType::F64] {
                let back = convert(&convert(&src, f).unwrap(), t).unwrap();
                assert_eq!(back.data(), src.data(), "{t} via {f}");
            }
        }
    }

    #[test]
    fn test_convert_none_fails() {
        let src = AudioBuffer::new(AudioInfo::new(1, SampleType::S16, 48000), 4);
        assert!(matches!(convert(&src, SampleType::None), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_from_vec_rejects_partial_sample() {
        let info = AudioInfo::new(1, SampleType::S16, 48000);
        assert!(AudioBuffer::from_vec(info, vec![0; 3]).is_err());
    }

    #[test]
    fn test_planar_round_trip() {
        let planar = buffer(SampleType::U8, 2, [1u8, 2, 3, 10, 20, 30], |v| vec![v]);
        let inter = planar_interleave(&planar);
        assert_eq!(inter.data(), &[1, 10, 2, 20, 3, 30]);
        let back = planar_deinterleave(&inter);
        assert_eq!(back.data(), planar.data());
    }

    #[test]
    fn test_duration() {
        let buf = AudioBuffer::new(AudioInfo::new(2, SampleType::F32, 48000), 96000);
        assert_eq!(buf.frame_count(), 48000);
        assert_eq!(buf.duration(), 1.0);
    }
}
