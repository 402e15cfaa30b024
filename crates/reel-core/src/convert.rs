//! Pixel conversion matrix.
//!
//! Two layers:
//!
//! - **Scalar conversions** between the six channel kinds (U8, U10, U16,
//!   U32, F16, F32). Each ordered pair has its own function so the rounding
//!   is fixed per pair and does not drift with a generic formula.
//! - **Buffer conversions** that apply the scalar functions per channel per
//!   pixel, including channel expansion and contraction.
//!
//! # Scalar Rules
//!
//! | From -> To | Rule |
//! |------------|------|
//! | int -> wider int | bit replication, e.g. `u8 -> u16` is `v << 8 \| v` |
//! | int -> narrower int | right shift, e.g. `u16 -> u8` is `v >> 8` |
//! | int -> float | `v / max` into `[0, 1]` |
//! | float -> int | clamp to `[0, 1]`, `* max`, round half away from zero |
//! | f32 <-> f16 | IEEE narrowing via [`half`] |
//!
//! # Channel Rules
//!
//! | From -> To | Rule |
//! |------------|------|
//! | L -> RGB | luminance replicated |
//! | RGB -> L | `(r + g + b) / 3` in the source kind, truncated |
//! | adding alpha | filled with max (1.0 for float) |
//! | LA -> RGBA | alpha copied |
//! | dropping alpha | alpha discarded |
//!
//! # Parallelism
//!
//! Pixels are independent, so buffers are split by scanline (images) or by
//! fixed-size chunks (flat slices) and converted on the rayon pool.
//!
//! # Example
//!
//! ```rust
//! use reel_core::convert::convert;
//! use reel_core::PixelType;
//!
//! let src = [255u8];
//! let mut dst = [0u8; 4];
//! convert(&src, PixelType::L_U8, &mut dst, PixelType::RGBA_U8, 1).unwrap();
//! assert_eq!(dst, [255, 255, 255, 255]);
//! ```

use half::f16;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::image::{Endian, ImageBuffer, Layout};
use crate::pixel::{Channels, DataType, PixelType, U10};

// === Scalar conversions ===

/// `v << 2 | v >> 6`
#[inline]
pub const fn u8_to_u10(v: u8) -> u16 {
    ((v as u16) << 2) | ((v as u16) >> 6)
}

/// `v << 8 | v`
#[inline]
pub const fn u8_to_u16(v: u8) -> u16 {
    ((v as u16) << 8) | v as u16
}

/// `v * 0x01010101`
#[inline]
pub const fn u8_to_u32(v: u8) -> u32 {
    v as u32 * 0x0101_0101
}

/// `u8` -> `f32`.
#[inline]
pub fn u8_to_f32(v: u8) -> f32 {
    v as f32 / 255.0
}

/// `u10` -> `u8`.
#[inline]
pub const fn u10_to_u8(v: u16) -> u8 {
    (v >> 2) as u8
}

/// `v << 6 | v >> 4`
#[inline]
pub const fn u10_to_u16(v: u16) -> u16 {
    (v << 6) | (v >> 4)
}

/// `u10` -> `u32`.
#[inline]
pub const fn u10_to_u32(v: u16) -> u32 {
    let v = v as u32;
    (v << 22) | (v << 12) | (v << 2) | (v >> 8)
}

/// `u10` -> `f32`.
#[inline]
pub fn u10_to_f32(v: u16) -> f32 {
    v as f32 / 1023.0
}

/// `u16` -> `u8`.
#[inline]
pub const fn u16_to_u8(v: u16) -> u8 {
    (v >> 8) as u8
}

/// `u16` -> `u10`.
#[inline]
pub const fn u16_to_u10(v: u16) -> u16 {
    v >> 6
}

/// `v << 16 | v`
#[inline]
pub const fn u16_to_u32(v: u16) -> u32 {
    ((v as u32) << 16) | v as u32
}

/// `u16` -> `f32`.
#[inline]
pub fn u16_to_f32(v: u16) -> f32 {
    v as f32 / 65535.0
}

/// `u32` -> `u8`.
#[inline]
pub const fn u32_to_u8(v: u32) -> u8 {
    (v >> 24) as u8
}

/// `u32` -> `u10`.
#[inline]
pub const fn u32_to_u10(v: u32) -> u16 {
    (v >> 22) as u16
}

/// `u32` -> `u16`.
#[inline]
pub const fn u32_to_u16(v: u32) -> u16 {
    (v >> 16) as u16
}

/// `u32` -> `f32`.
#[inline]
pub fn u32_to_f32(v: u32) -> f32 {
    u32_to_f64(v) as f32
}

/// Full-precision `u32 -> [0, 1]`, exact on the way back through [`f64_to_u32`].
#[inline]
pub fn u32_to_f64(v: u32) -> f64 {
    v as f64 / u32::MAX as f64
}

/// `f32` -> `u8`.
#[inline]
pub fn f32_to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// `f32` -> `u10`.
#[inline]
pub fn f32_to_u10(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 1023.0).round() as u16
}

/// `f32` -> `u16`.
#[inline]
pub fn f32_to_u16(v: f32) -> u16 {
    (v.clamp(0.0, 1.0) * 65535.0).round() as u16
}

/// `f32` -> `u32`.
#[inline]
pub fn f32_to_u32(v: f32) -> u32 {
    f64_to_u32(v as f64)
}

/// `f64` -> `u32`.
#[inline]
pub fn f64_to_u32(v: f64) -> u32 {
    (v.clamp(0.0, 1.0) * u32::MAX as f64).round() as u32
}

/// `f32` -> `f16`.
#[inline]
pub fn f32_to_f16(v: f32) -> f16 {
    f16::from_f32(v)
}

/// `f16` -> `f32`.
#[inline]
pub fn f16_to_f32(v: f16) -> f32 {
    v.to_f32()
}

// === Sample kinds ===

/// 10-bit sample; only appears inside packed RGB_U10 words.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct U10s(u16);

/// One channel kind as stored in a buffer.
trait Sample: Copy + Default + Send + Sync + 'static {
    const BYTES: usize;
    /// Alpha fill value.
    const MAX: Self;

    fn load(b: &[u8], swap: bool) -> Self;
    fn store(self, b: &mut [u8], swap: bool);
    /// Luminance from RGB, computed in this kind.
    fn average(a: Self, b: Self, c: Self) -> Self;

    #[inline]
    fn pixel_bytes(channels: usize) -> usize {
        channels * Self::BYTES
    }

    #[inline]
    fn load_pixel(src: &[u8], channels: usize, swap: bool, out: &mut [Self; 4]) {
        for (c, v) in out.iter_mut().take(channels).enumerate() {
            *v = Self::load(&src[c * Self::BYTES..], swap);
        }
    }

    #[inline]
    fn store_pixel(px: &[Self; 4], channels: usize, dst: &mut [u8], swap: bool) {
        for (c, v) in px.iter().take(channels).enumerate() {
            v.store(&mut dst[c * Self::BYTES..], swap);
        }
    }
}

impl Sample for u8 {
    const BYTES: usize = 1;
    const MAX: Self = u8::MAX;

    #[inline]
    fn load(b: &[u8], _swap: bool) -> Self {
        b[0]
    }

    #[inline]
    fn store(self, b: &mut [u8], _swap: bool) {
        b[0] = self;
    }

    #[inline]
    fn average(a: Self, b: Self, c: Self) -> Self {
        ((a as f32 + b as f32 + c as f32) / 3.0) as u8
    }
}

impl Sample for u16 {
    const BYTES: usize = 2;
    const MAX: Self = u16::MAX;

    #[inline]
    fn load(b: &[u8], swap: bool) -> Self {
        let v = u16::from_ne_bytes([b[0], b[1]]);
        if swap { v.swap_bytes() } else { v }
    }

    #[inline]
    fn store(self, b: &mut [u8], swap: bool) {
        let v = if swap { self.swap_bytes() } else { self };
        b[..2].copy_from_slice(&v.to_ne_bytes());
    }

    #[inline]
    fn average(a: Self, b: Self, c: Self) -> Self {
        ((a as f32 + b as f32 + c as f32) / 3.0) as u16
    }
}

impl Sample for u32 {
    const BYTES: usize = 4;
    const MAX: Self = u32::MAX;

    #[inline]
    fn load(b: &[u8], swap: bool) -> Self {
        let v = u32::from_ne_bytes([b[0], b[1], b[2], b[3]]);
        if swap { v.swap_bytes() } else { v }
    }

    #[inline]
    fn store(self, b: &mut [u8], swap: bool) {
        let v = if swap { self.swap_bytes() } else { self };
        b[..4].copy_from_slice(&v.to_ne_bytes());
    }

    #[inline]
    fn average(a: Self, b: Self, c: Self) -> Self {
        ((a as f64 + b as f64 + c as f64) / 3.0) as u32
    }
}

impl Sample for f16 {
    const BYTES: usize = 2;
    const MAX: Self = f16::ONE;

    #[inline]
    fn load(b: &[u8], swap: bool) -> Self {
        f16::from_bits(u16::load(b, swap))
    }

    #[inline]
    fn store(self, b: &mut [u8], swap: bool) {
        self.to_bits().store(b, swap);
    }

    #[inline]
    fn average(a: Self, b: Self, c: Self) -> Self {
        f16::from_f32((a.to_f32() + b.to_f32() + c.to_f32()) / 3.0)
    }
}

impl Sample for f32 {
    const BYTES: usize = 4;
    const MAX: Self = 1.0;

    #[inline]
    fn load(b: &[u8], swap: bool) -> Self {
        f32::from_bits(u32::load(b, swap))
    }

    #[inline]
    fn store(self, b: &mut [u8], swap: bool) {
        self.to_bits().store(b, swap);
    }

    #[inline]
    fn average(a: Self, b: Self, c: Self) -> Self {
        (a + b + c) / 3.0
    }
}

impl Sample for U10s {
    const BYTES: usize = 2;
    const MAX: Self = U10s(0x3ff);

    #[inline]
    fn load(b: &[u8], swap: bool) -> Self {
        U10s(u16::load(b, swap) & 0x3ff)
    }

    #[inline]
    fn store(self, b: &mut [u8], swap: bool) {
        self.0.store(b, swap);
    }

    #[inline]
    fn average(a: Self, b: Self, c: Self) -> Self {
        U10s(((a.0 as f32 + b.0 as f32 + c.0 as f32) / 3.0) as u16)
    }

    #[inline]
    fn pixel_bytes(_channels: usize) -> usize {
        4
    }

    #[inline]
    fn load_pixel(src: &[u8], _channels: usize, swap: bool, out: &mut [Self; 4]) {
        let p = U10::unpack_msb(u32::load(src, swap));
        out[0] = U10s(p.r);
        out[1] = U10s(p.g);
        out[2] = U10s(p.b);
    }

    #[inline]
    fn store_pixel(px: &[Self; 4], _channels: usize, dst: &mut [u8], swap: bool) {
        U10::new(px[0].0, px[1].0, px[2].0).pack_msb().store(dst, swap);
    }
}

/// Scalar conversion between two sample kinds.
trait Cast<T> {
    fn cast(self) -> T;
}

macro_rules! impl_cast {
    ($($from:ty => $to:ty : $f:expr;)*) => {
        $(
            impl Cast<$to> for $from {
                #[inline]
                fn cast(self) -> $to {
                    let f: fn($from) -> $to = $f;
                    f(self)
                }
            }
        )*
    };
}

impl_cast! {
    u8 => u8: |v| v;
    u8 => U10s: |v| U10s(u8_to_u10(v));
    u8 => u16: u8_to_u16;
    u8 => u32: u8_to_u32;
    u8 => f16: |v| f32_to_f16(u8_to_f32(v));
    u8 => f32: u8_to_f32;

    U10s => u8: |v| u10_to_u8(v.0);
    U10s => U10s: |v| v;
    U10s => u16: |v| u10_to_u16(v.0);
    U10s => u32: |v| u10_to_u32(v.0);
    U10s => f16: |v| f32_to_f16(u10_to_f32(v.0));
    U10s => f32: |v| u10_to_f32(v.0);

    u16 => u8: u16_to_u8;
    u16 => U10s: |v| U10s(u16_to_u10(v));
    u16 => u16: |v| v;
    u16 => u32: u16_to_u32;
    u16 => f16: |v| f32_to_f16(u16_to_f32(v));
    u16 => f32: u16_to_f32;

    u32 => u8: u32_to_u8;
    u32 => U10s: |v| U10s(u32_to_u10(v));
    u32 => u16: u32_to_u16;
    u32 => u32: |v| v;
    u32 => f16: |v| f32_to_f16(u32_to_f32(v));
    u32 => f32: u32_to_f32;

    f16 => u8: |v| f32_to_u8(f16_to_f32(v));
    f16 => U10s: |v| U10s(f32_to_u10(f16_to_f32(v)));
    f16 => u16: |v| f32_to_u16(f16_to_f32(v));
    f16 => u32: |v| f32_to_u32(f16_to_f32(v));
    f16 => f16: |v| v;
    f16 => f32: f16_to_f32;

    f32 => u8: f32_to_u8;
    f32 => U10s: |v| U10s(f32_to_u10(v));
    f32 => u16: f32_to_u16;
    f32 => u32: f32_to_u32;
    f32 => f16: f32_to_f16;
    f32 => f32: |v| v;
}

// === Row kernels ===

/// Per-row parameters shared by every kernel call of one conversion.
#[derive(Debug, Clone, Copy)]
struct RowSpec {
    src_channels: Channels,
    src_swap: bool,
    dst_channels: Channels,
    dst_swap: bool,
    flip_x: bool,
}

type RowKernel = fn(&RowSpec, &[u8], &mut [u8], usize);

#[inline]
fn map_channels<S, D>(src: Channels, dst: Channels, px: &[S; 4]) -> [D; 4]
where
    S: Sample + Cast<D>,
    D: Sample,
{
    use Channels::*;
    let z = D::default();
    match (src, dst) {
        (L | LA, L) => [px[0].cast(), z, z, z],
        (L, LA) => [px[0].cast(), D::MAX, z, z],
        (LA, LA) => [px[0].cast(), px[1].cast(), z, z],
        (L | LA, RGB) => {
            let l = px[0].cast();
            [l, l, l, z]
        }
        (L, RGBA) => {
            let l = px[0].cast();
            [l, l, l, D::MAX]
        }
        (LA, RGBA) => {
            let l = px[0].cast();
            [l, l, l, px[1].cast()]
        }
        (RGB | RGBA, L) => [S::average(px[0], px[1], px[2]).cast(), z, z, z],
        (RGB, LA) => [S::average(px[0], px[1], px[2]).cast(), D::MAX, z, z],
        (RGBA, LA) => [S::average(px[0], px[1], px[2]).cast(), px[3].cast(), z, z],
        (RGB | RGBA, RGB) => [px[0].cast(), px[1].cast(), px[2].cast(), z],
        (RGB, RGBA) => [px[0].cast(), px[1].cast(), px[2].cast(), D::MAX],
        (RGBA, RGBA) => [px[0].cast(), px[1].cast(), px[2].cast(), px[3].cast()],
        _ => [z; 4],
    }
}

fn convert_row<S, D>(spec: &RowSpec, src: &[u8], dst: &mut [u8], count: usize)
where
    S: Sample + Cast<D>,
    D: Sample,
{
    let sc = spec.src_channels.count();
    let dc = spec.dst_channels.count();
    let sb = S::pixel_bytes(sc);
    let db = D::pixel_bytes(dc);
    let mut px = [S::default(); 4];
    for x in 0..count {
        let sx = if spec.flip_x { count - 1 - x } else { x };
        S::load_pixel(&src[sx * sb..], sc, spec.src_swap, &mut px);
        let out = map_channels::<S, D>(spec.src_channels, spec.dst_channels, &px);
        D::store_pixel(&out, dc, &mut dst[x * db..], spec.dst_swap);
    }
}

fn kernel_for_dst<S>(dst: DataType) -> Option<RowKernel>
where
    S: Sample + Cast<u8> + Cast<U10s> + Cast<u16> + Cast<u32> + Cast<f16> + Cast<f32>,
{
    let k: RowKernel = match dst {
        DataType::None => return None,
        DataType::U8 => convert_row::<S, u8>,
        DataType::U10 => convert_row::<S, U10s>,
        DataType::U16 => convert_row::<S, u16>,
        DataType::U32 => convert_row::<S, u32>,
        DataType::F16 => convert_row::<S, f16>,
        DataType::F32 => convert_row::<S, f32>,
    };
    Some(k)
}

/// Picks the row kernel for a scalar pair from the 6x6 table.
fn kernel(src: DataType, dst: DataType) -> Option<RowKernel> {
    match src {
        DataType::None => None,
        DataType::U8 => kernel_for_dst::<u8>(dst),
        DataType::U10 => kernel_for_dst::<U10s>(dst),
        DataType::U16 => kernel_for_dst::<u16>(dst),
        DataType::U32 => kernel_for_dst::<u32>(dst),
        DataType::F16 => kernel_for_dst::<f16>(dst),
        DataType::F32 => kernel_for_dst::<f32>(dst),
    }
}

fn require_types(src: PixelType, dst: PixelType) -> Result<RowKernel> {
    if !src.is_valid() || !dst.is_valid() {
        return Err(Error::invalid_argument(format!(
            "cannot convert {src} to {dst}"
        )));
    }
    kernel(src.data_type(), dst.data_type())
        .ok_or_else(|| Error::invalid_argument(format!("no conversion from {src} to {dst}")))
}

// === Buffer conversions ===

/// Pixels per parallel work item for flat conversions.
const CHUNK_PIXELS: usize = 4096;

/// Converts `count` tightly packed, native-endian pixels.
///
/// # Errors
///
/// [`Error::InvalidArgument`] if either type is `None` and
/// [`Error::BufferSize`] if a slice is shorter than `count` pixels.
pub fn convert(
    src: &[u8],
    src_type: PixelType,
    dst: &mut [u8],
    dst_type: PixelType,
    count: usize,
) -> Result<()> {
    let kernel = require_types(src_type, dst_type)?;
    let sb = src_type.byte_count();
    let db = dst_type.byte_count();
    if src.len() < count * sb {
        return Err(Error::buffer_size(count * sb, src.len()));
    }
    if dst.len() < count * db {
        return Err(Error::buffer_size(count * db, dst.len()));
    }
    if count == 0 {
        return Ok(());
    }

    let spec = RowSpec {
        src_channels: src_type.channels(),
        src_swap: false,
        dst_channels: dst_type.channels(),
        dst_swap: false,
        flip_x: false,
    };
    dst[..count * db]
        .par_chunks_mut(CHUNK_PIXELS * db)
        .zip(src[..count * sb].par_chunks(CHUNK_PIXELS * sb))
        .for_each(|(d, s)| kernel(&spec, s, d, d.len() / db));
    Ok(())
}

/// Converts `src` into the already allocated `dst`.
///
/// Sizes must match. Source and destination byte order, scanline alignment
/// and mirroring are all honoured; rows are converted in parallel.
pub fn convert_into(src: &ImageBuffer, dst: &mut ImageBuffer) -> Result<()> {
    let si = src.info().clone();
    let di = dst.info().clone();
    let kernel = require_types(si.pixel_type, di.pixel_type)?;
    if si.size != di.size {
        return Err(Error::invalid_argument(format!(
            "size mismatch: {}x{} vs {}x{}",
            si.size.w, si.size.h, di.size.w, di.size.h
        )));
    }
    if !si.is_valid() {
        return Err(Error::invalid_argument("cannot convert an empty image"));
    }
    if src.byte_count() < si.data_byte_count() {
        return Err(Error::buffer_size(si.data_byte_count(), src.byte_count()));
    }

    let native = Endian::native();
    let spec = RowSpec {
        src_channels: si.pixel_type.channels(),
        src_swap: si.layout.endian != native,
        dst_channels: di.pixel_type.channels(),
        dst_swap: di.layout.endian != native,
        flip_x: si.layout.mirror.x != di.layout.mirror.x,
    };
    let flip_y = si.layout.mirror.y != di.layout.mirror.y;
    let w = si.size.w as usize;
    let h = si.size.h as usize;
    let src_stride = si.scanline_byte_count();
    let dst_stride = di.scanline_byte_count();
    let src_row_bytes = w * si.pixel_byte_count();
    let dst_row_bytes = w * di.pixel_byte_count();
    let src_data = src.data();

    dst.data_mut()
        .par_chunks_mut(dst_stride)
        .enumerate()
        .for_each(|(y, row)| {
            let sy = if flip_y { h - 1 - y } else { y };
            let s = &src_data[sy * src_stride..sy * src_stride + src_row_bytes];
            kernel(&spec, s, &mut row[..dst_row_bytes], w);
        });
    Ok(())
}

/// Converts an image to a new pixel type.
///
/// The result keeps the source size, mirroring, alignment and tags, and is
/// stored in native byte order.
pub fn convert_image(src: &ImageBuffer, pixel_type: PixelType) -> Result<ImageBuffer> {
    let layout = Layout {
        endian: Endian::native(),
        ..src.info().layout
    };
    let info = src.info().with_type(pixel_type).with_layout(layout);
    let mut out = ImageBuffer::new(info);
    convert_into(src, &mut out)?;
    out.set_tags(src.tags().clone());
    Ok(out)
}

/// Reverses the byte order of every multi-byte word in place.
///
/// Word size follows the pixel type: 2 for U16/F16, 4 for U32/F32 and for
/// packed RGB_U10 words. 8-bit data is left untouched.
pub fn swap_endian(data: &mut [u8], pixel_type: PixelType) {
    let word = match pixel_type {
        PixelType::RGB_U10 => 4,
        t => t.data_type().byte_count(),
    };
    if word < 2 {
        return;
    }
    data.par_chunks_exact_mut(word).for_each(|w| w.reverse());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ImageInfo, Mirror, Size};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_scalar_widening() {
        assert_eq!(u8_to_u16(0xab), 0xabab);
        assert_eq!(u8_to_u32(0xab), 0xabab_abab);
        assert_eq!(u8_to_u10(0xff), 0x3ff);
        assert_eq!(u8_to_u10(0x80), 0x202);
        assert_eq!(u10_to_u16(0x3ff), 0xffff);
        assert_eq!(u10_to_u32(0x3ff), 0xffff_ffff);
        assert_eq!(u16_to_u32(0x1234), 0x1234_1234);
    }

    #[test]
    fn test_scalar_narrowing() {
        assert_eq!(u16_to_u8(0xabcd), 0xab);
        assert_eq!(u16_to_u10(0xffff), 0x3ff);
        assert_eq!(u32_to_u8(0xabcd_ef01), 0xab);
        assert_eq!(u32_to_u10(0xffff_ffff), 0x3ff);
        assert_eq!(u32_to_u16(0xabcd_ef01), 0xabcd);
        assert_eq!(u10_to_u8(0x3ff), 0xff);
    }

    #[test]
    fn test_widen_then_narrow_is_lossless() {
        for v in 0..=u8::MAX {
            assert_eq!(u10_to_u8(u8_to_u10(v)), v);
            assert_eq!(u16_to_u8(u8_to_u16(v)), v);
            assert_eq!(u32_to_u8(u8_to_u32(v)), v);
        }
        for v in 0..=0x3ffu16 {
            assert_eq!(u16_to_u10(u10_to_u16(v)), v);
            assert_eq!(u32_to_u10(u10_to_u32(v)), v);
        }
        for v in 0..=u16::MAX {
            assert_eq!(u32_to_u16(u16_to_u32(v)), v);
        }
    }

    #[test]
    fn test_int_float_int_is_exact() {
        for v in 0..=u8::MAX {
            assert_eq!(f32_to_u8(u8_to_f32(v)), v);
        }
        for v in 0..=0x3ffu16 {
            assert_eq!(f32_to_u10(u10_to_f32(v)), v);
        }
        for v in 0..=u16::MAX {
            assert_eq!(f32_to_u16(u16_to_f32(v)), v);
        }
        for v in (0..=u32::MAX).step_by(65_521).chain([u32::MAX - 1, u32::MAX]) {
            assert_eq!(f64_to_u32(u32_to_f64(v)), v);
        }
    }

    #[test]
    fn test_float_to_int_clamps_and_rounds() {
        assert_eq!(f32_to_u8(-0.5), 0);
        assert_eq!(f32_to_u8(2.0), 255);
        assert_eq!(f32_to_u8(0.5), 128);
        assert_eq!(f32_to_u16(1.0), 65535);
        assert_eq!(f32_to_u8(f32::NAN), 0);
    }

    #[test]
    fn test_half_float() {
        assert_abs_diff_eq!(f16_to_f32(f32_to_f16(0.333)), 0.333, epsilon = 1e-3);
        assert_eq!(f16_to_f32(f32_to_f16(1.0)), 1.0);
    }

    #[test]
    fn test_luminance_to_rgba_fills_alpha() {
        let count = 64 * 64;
        let mut src = vec![0u8; count];
        src[0] = 255;
        let mut dst = vec![0u8; count * 4];
        convert(&src, PixelType::L_U8, &mut dst, PixelType::RGBA_U8, count).unwrap();
        assert_eq!(&dst[..4], &[255, 255, 255, 255]);
        assert_eq!(&dst[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_rgb_to_luminance_averages() {
        let src = [30u8, 60, 91];
        let mut dst = [0u8; 1];
        convert(&src, PixelType::RGB_U8, &mut dst, PixelType::L_U8, 1).unwrap();
        assert_eq!(dst[0], 60);

        let src: Vec<u8> = [0.3f32, 0.6, 0.9].iter().flat_map(|v| v.to_ne_bytes()).collect();
        let mut dst = [0u8; 4];
        convert(&src, PixelType::RGB_F32, &mut dst, PixelType::L_F32, 1).unwrap();
        assert_abs_diff_eq!(f32::from_ne_bytes(dst), 0.6, epsilon = 1e-6);
    }

    #[test]
    fn test_la_to_rgba_copies_alpha() {
        let src = [200u8, 17];
        let mut dst = [0u8; 4];
        convert(&src, PixelType::LA_U8, &mut dst, PixelType::RGBA_U8, 1).unwrap();
        assert_eq!(dst, [200, 200, 200, 17]);
    }

    #[test]
    fn test_float_alpha_fill_is_one() {
        let src = [0u8, 0, 0];
        let mut dst = [0u8; 16];
        convert(&src, PixelType::RGB_U8, &mut dst, PixelType::RGBA_F32, 1).unwrap();
        let a = f32::from_ne_bytes([dst[12], dst[13], dst[14], dst[15]]);
        assert_eq!(a, 1.0);
    }

    #[test]
    fn test_rgb_u10_round_trip() {
        let word = U10::new(1023, 512, 3).pack_msb();
        let src = word.to_ne_bytes();
        let mut wide = [0u8; 6];
        convert(&src, PixelType::RGB_U10, &mut wide, PixelType::RGB_U16, 1).unwrap();
        let r = u16::from_ne_bytes([wide[0], wide[1]]);
        assert_eq!(r, 0xffff);

        let mut back = [0u8; 4];
        convert(&wide, PixelType::RGB_U16, &mut back, PixelType::RGB_U10, 1).unwrap();
        assert_eq!(U10::unpack_msb(u32::from_ne_bytes(back)), U10::new(1023, 512, 3));
    }

    #[test]
    fn test_none_is_invalid_argument() {
        let mut dst = [0u8; 4];
        let err = convert(&[0u8; 4], PixelType::None, &mut dst, PixelType::RGBA_U8, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        let err = convert(&[0u8; 4], PixelType::RGBA_U8, &mut dst, PixelType::None, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_short_buffer_is_rejected() {
        let mut dst = [0u8; 3];
        let err = convert(&[0u8; 2], PixelType::L_U8, &mut dst, PixelType::RGB_U8, 2).unwrap_err();
        assert_eq!(err, Error::buffer_size(6, 3));
    }

    #[test]
    fn test_every_pair_converts() {
        let count = 3;
        for src_t in PixelType::ALL {
            let src = vec![0x5au8; count * src_t.byte_count()];
            for dst_t in PixelType::ALL {
                let mut dst = vec![0u8; count * dst_t.byte_count()];
                convert(&src, src_t, &mut dst, dst_t, count)
                    .unwrap_or_else(|e| panic!("{src_t} -> {dst_t}: {e}"));
            }
        }
    }

    #[test]
    fn test_integer_pairs_round_trip() {
        let ints: Vec<PixelType> = PixelType::ALL.iter().copied().filter(|t| !t.is_float()).collect();
        for a in &ints {
            for b in &ints {
                if a.channels() != b.channels() || b.bit_depth() < a.bit_depth() {
                    continue;
                }
                let n = 16;
                let src: Vec<u8> = (0..n * a.byte_count()).map(|i| (i * 37 % 251) as u8).collect();
                let mut mid = vec![0u8; n * b.byte_count()];
                let mut back = vec![0u8; n * a.byte_count()];
                convert(&src, *a, &mut mid, *b, n).unwrap();
                convert(&mid, *b, &mut back, *a, n).unwrap();
                if *a == PixelType::RGB_U10 {
                    for (s, d) in src.chunks(4).zip(back.chunks(4)) {
                        let s = U10::unpack_msb(u32::from_ne_bytes([s[0], s[1], s[2], s[3]]));
                        let d = U10::unpack_msb(u32::from_ne_bytes([d[0], d[1], d[2], d[3]]));
                        assert_eq!(s, d, "{a} -> {b}");
                    }
                } else {
                    assert_eq!(src, back, "{a} -> {b}");
                }
            }
        }
    }

    #[test]
    fn test_convert_image_swaps_and_aligns() {
        let mut info = ImageInfo::new(Size::new(3, 2), PixelType::L_U16);
        info.layout.endian = Endian::native().opposite();
        info.layout.alignment = 4;
        let mut src = ImageBuffer::new(info);
        src.scanline_mut(0)[..2].copy_from_slice(&0x1234u16.swap_bytes().to_ne_bytes());
        src.tags_mut().set("Creator", "test");

        let out = convert_image(&src, PixelType::L_U16).unwrap();
        assert_eq!(out.info().layout.endian, Endian::native());
        assert_eq!(out.info().scanline_byte_count(), 8);
        assert_eq!(u16::from_ne_bytes([out.data()[0], out.data()[1]]), 0x1234);
        assert_eq!(out.tags().get("Creator"), Some("test"));
    }

    #[test]
    fn test_convert_into_flips_rows() {
        let src_info = ImageInfo::new(Size::new(1, 3), PixelType::L_U8);
        let src = ImageBuffer::from_vec(src_info.clone(), vec![1, 2, 3]).unwrap();
        let mut dst_info = src_info.with_type(PixelType::L_U8);
        dst_info.layout.mirror = Mirror { x: false, y: true };
        let mut dst = ImageBuffer::new(dst_info);
        convert_into(&src, &mut dst).unwrap();
        assert_eq!(dst.data(), &[3, 2, 1]);
    }

    #[test]
    fn test_swap_endian() {
        let mut data = vec![1, 2, 3, 4];
        swap_endian(&mut data, PixelType::L_U16);
        assert_eq!(data, [2, 1, 4, 3]);
        swap_endian(&mut data, PixelType::RGB_U10);
        assert_eq!(data, [3, 4, 1, 2]);
        swap_endian(&mut data, PixelType::RGBA_U8);
        assert_eq!(data, [3, 4, 1, 2]);
    }
}
