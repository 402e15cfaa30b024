//! Pixel type model.
//!
//! This module defines the closed set of pixel representations the engine
//! understands. Everything here is pure metadata: channel counts, bit depths,
//! byte sizes and the OpenGL-equivalent tokens renderers use to describe a
//! buffer. No I/O and no GL dependency.
//!
//! # Types
//!
//! - [`DataType`] - Scalar kind of one channel sample (U8, U10, U16, U32, F16, F32)
//! - [`Channels`] - Channel layout (L, LA, RGB, RGBA)
//! - [`PixelType`] - Channel layout x scalar kind, the unit the conversion matrix works on
//! - [`GlFormat`], [`GlType`] - Opaque GL-style tokens
//! - [`U10`] - Packed 10-bit RGB helpers
//!
//! # Stable Identifiers
//!
//! [`PixelType`] discriminants are part of the public contract: callers such as
//! thumbnail caches store them by value. New types may only be appended.
//!
//! | Index | Type | Channels | Bits | Bytes/pixel |
//! |-------|------|----------|------|-------------|
//! | 0 | None | 0 | 0 | 0 |
//! | 1-5 | L_U8 .. L_F32 | 1 | 8/16/32/16/32 | 1/2/4/2/4 |
//! | 6-10 | LA_U8 .. LA_F32 | 2 | 8/16/32/16/32 | 2/4/8/4/8 |
//! | 11-16 | RGB_U8 .. RGB_F32 | 3 | 8/10/16/32/16/32 | 3/4/6/12/6/12 |
//! | 17-21 | RGBA_U8 .. RGBA_F32 | 4 | 8/16/32/16/32 | 4/8/16/8/16 |
//!
//! # Usage
//!
//! ```rust
//! use reel_core::pixel::{get_int_type, get_float_type, PixelType};
//!
//! assert_eq!(get_int_type(3, 10), PixelType::RGB_U10);
//! assert_eq!(get_int_type(1, 10), PixelType::None); // 10-bit is RGB only
//! assert_eq!(get_float_type(4, 16), PixelType::RGBA_F16);
//! assert_eq!(PixelType::RGB_U10.byte_count(), 4);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// === Scalar kind ===

/// Scalar kind of a single channel sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataType {
    /// No data.
    #[default]
    None,
    /// 8-bit unsigned integer.
    U8,
    /// 10-bit unsigned integer, only found packed in [`PixelType::RGB_U10`].
    U10,
    /// 16-bit unsigned integer.
    U16,
    /// 32-bit unsigned integer.
    U32,
    /// 16-bit IEEE half float.
    F16,
    /// 32-bit IEEE float.
    F32,
}

impl DataType {
    /// Bits per sample. Returns 0 for None.
    #[inline]
    pub const fn bit_depth(&self) -> u8 {
        match self {
            Self::None => 0,
            Self::U8 => 8,
            Self::U10 => 10,
            Self::U16 => 16,
            Self::U32 => 32,
            Self::F16 => 16,
            Self::F32 => 32,
        }
    }

    /// Storage bytes per sample.
    ///
    /// U10 reports 2; packed RGB_U10 pixels are sized by [`PixelType::byte_count`].
    #[inline]
    pub const fn byte_count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::U8 => 1,
            Self::U10 | Self::U16 | Self::F16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }

    /// Whether this is a floating-point kind.
    #[inline]
    pub const fn is_float(&self) -> bool {
        matches!(self, Self::F16 | Self::F32)
    }

    /// Maximum integer code value. Returns 0 for float kinds and None.
    #[inline]
    pub const fn max_value(&self) -> u32 {
        match self {
            Self::U8 => 0xff,
            Self::U10 => 0x3ff,
            Self::U16 => 0xffff,
            Self::U32 => 0xffff_ffff,
            _ => 0,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::U8 => "U8",
            Self::U10 => "U10",
            Self::U16 => "U16",
            Self::U32 => "U32",
            Self::F16 => "F16",
            Self::F32 => "F32",
        };
        f.write_str(s)
    }
}

// === Channel layout ===

/// Channel layout of a pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Channels {
    /// No channels.
    #[default]
    None,
    /// Luminance.
    L,
    /// Luminance + alpha.
    LA,
    /// Red, green, blue.
    RGB,
    /// Red, green, blue, alpha.
    RGBA,
}

impl Channels {
    /// Number of channels.
    #[inline]
    pub const fn count(&self) -> usize {
        match self {
            Self::None => 0,
            Self::L => 1,
            Self::LA => 2,
            Self::RGB => 3,
            Self::RGBA => 4,
        }
    }

    /// Layout for a channel count, None when out of range.
    #[inline]
    pub const fn from_count(count: usize) -> Self {
        match count {
            1 => Self::L,
            2 => Self::LA,
            3 => Self::RGB,
            4 => Self::RGBA,
            _ => Self::None,
        }
    }

    /// Whether the last channel is alpha.
    #[inline]
    pub const fn has_alpha(&self) -> bool {
        matches!(self, Self::LA | Self::RGBA)
    }

    /// Whether the layout carries color (RGB or RGBA).
    #[inline]
    pub const fn is_color(&self) -> bool {
        matches!(self, Self::RGB | Self::RGBA)
    }
}

// === GL tokens ===

/// OpenGL-style pixel format token.
///
/// Carried as metadata for renderers; the core never talks to OpenGL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlFormat {
    /// `GL_RED`
    Red,
    /// `GL_RG`
    Rg,
    /// `GL_RGB`
    Rgb,
    /// `GL_RGBA`
    Rgba,
}

impl GlFormat {
    /// Numeric GL enum value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::Red => 0x1903,
            Self::Rg => 0x8227,
            Self::Rgb => 0x1907,
            Self::Rgba => 0x1908,
        }
    }
}

/// OpenGL-style component type token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GlType {
    /// `GL_UNSIGNED_BYTE`
    UnsignedByte,
    /// `GL_UNSIGNED_SHORT`
    UnsignedShort,
    /// `GL_UNSIGNED_INT`
    UnsignedInt,
    /// `GL_UNSIGNED_INT_10_10_10_2`
    UnsignedInt10_10_10_2,
    /// `GL_HALF_FLOAT`
    HalfFloat,
    /// `GL_FLOAT`
    Float,
}

impl GlType {
    /// Numeric GL enum value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::UnsignedByte => 0x1401,
            Self::UnsignedShort => 0x1403,
            Self::UnsignedInt => 0x1405,
            Self::UnsignedInt10_10_10_2 => 0x8036,
            Self::HalfFloat => 0x140B,
            Self::Float => 0x1406,
        }
    }
}

// === Pixel type ===

/// Closed enumeration of pixel representations.
///
/// `None` is the only invalid value. Discriminants are stable.
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum PixelType {
    #[default]
    None = 0,
    L_U8,
    L_U16,
    L_U32,
    L_F16,
    L_F32,
    LA_U8,
    LA_U16,
    LA_U32,
    LA_F16,
    LA_F32,
    RGB_U8,
    /// Three 10-bit samples packed into one 32-bit word, see [`U10`].
    RGB_U10,
    RGB_U16,
    RGB_U32,
    RGB_F16,
    RGB_F32,
    RGBA_U8,
    RGBA_U16,
    RGBA_U32,
    RGBA_F16,
    RGBA_F32,
}

impl PixelType {
    /// Every valid pixel type, in discriminant order.
    pub const ALL: [PixelType; 21] = [
        Self::L_U8,
        Self::L_U16,
        Self::L_U32,
        Self::L_F16,
        Self::L_F32,
        Self::LA_U8,
        Self::LA_U16,
        Self::LA_U32,
        Self::LA_F16,
        Self::LA_F32,
        Self::RGB_U8,
        Self::RGB_U10,
        Self::RGB_U16,
        Self::RGB_U32,
        Self::RGB_F16,
        Self::RGB_F32,
        Self::RGBA_U8,
        Self::RGBA_U16,
        Self::RGBA_U32,
        Self::RGBA_F16,
        Self::RGBA_F32,
    ];

    /// Stable numeric identifier.
    #[inline]
    pub const fn index(&self) -> u8 {
        *self as u8
    }

    /// Looks up a type by its stable identifier.
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::None),
            i => Self::ALL.get(i as usize - 1).copied(),
        }
    }

    /// Whether this is a real pixel type.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Channel layout.
    pub const fn channels(&self) -> Channels {
        use PixelType::*;
        match self {
            None => Channels::None,
            L_U8 | L_U16 | L_U32 | L_F16 | L_F32 => Channels::L,
            LA_U8 | LA_U16 | LA_U32 | LA_F16 | LA_F32 => Channels::LA,
            RGB_U8 | RGB_U10 | RGB_U16 | RGB_U32 | RGB_F16 | RGB_F32 => Channels::RGB,
            RGBA_U8 | RGBA_U16 | RGBA_U32 | RGBA_F16 | RGBA_F32 => Channels::RGBA,
        }
    }

    /// Scalar kind of each channel.
    pub const fn data_type(&self) -> DataType {
        use PixelType::*;
        match self {
            None => DataType::None,
            L_U8 | LA_U8 | RGB_U8 | RGBA_U8 => DataType::U8,
            RGB_U10 => DataType::U10,
            L_U16 | LA_U16 | RGB_U16 | RGBA_U16 => DataType::U16,
            L_U32 | LA_U32 | RGB_U32 | RGBA_U32 => DataType::U32,
            L_F16 | LA_F16 | RGB_F16 | RGBA_F16 => DataType::F16,
            L_F32 | LA_F32 | RGB_F32 | RGBA_F32 => DataType::F32,
        }
    }

    /// Number of channels per pixel.
    #[inline]
    pub const fn channel_count(&self) -> usize {
        self.channels().count()
    }

    /// Bits per channel.
    #[inline]
    pub const fn bit_depth(&self) -> u8 {
        self.data_type().bit_depth()
    }

    /// Bytes per pixel.
    #[inline]
    pub const fn byte_count(&self) -> usize {
        match self {
            Self::RGB_U10 => 4,
            _ => self.channel_count() * self.data_type().byte_count(),
        }
    }

    /// Whether the type carries an alpha channel.
    #[inline]
    pub const fn has_alpha(&self) -> bool {
        self.channels().has_alpha()
    }

    /// Whether samples are floating point.
    #[inline]
    pub const fn is_float(&self) -> bool {
        self.data_type().is_float()
    }

    /// GL format token, `None` for [`PixelType::None`].
    pub const fn gl_format(&self) -> Option<GlFormat> {
        match self {
            Self::RGB_U10 => Some(GlFormat::Rgba),
            _ => match self.channels() {
                Channels::None => None,
                Channels::L => Some(GlFormat::Red),
                Channels::LA => Some(GlFormat::Rg),
                Channels::RGB => Some(GlFormat::Rgb),
                Channels::RGBA => Some(GlFormat::Rgba),
            },
        }
    }

    /// GL component type token, `None` for [`PixelType::None`].
    pub const fn gl_type(&self) -> Option<GlType> {
        match self.data_type() {
            DataType::None => None,
            DataType::U8 => Some(GlType::UnsignedByte),
            DataType::U10 => Some(GlType::UnsignedInt10_10_10_2),
            DataType::U16 => Some(GlType::UnsignedShort),
            DataType::U32 => Some(GlType::UnsignedInt),
            DataType::F16 => Some(GlType::HalfFloat),
            DataType::F32 => Some(GlType::Float),
        }
    }

    /// Builds a type from a channel layout and scalar kind.
    ///
    /// Returns [`PixelType::None`] for combinations that do not exist.
    pub fn from_parts(channels: Channels, data_type: DataType) -> Self {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.channels() == channels && t.data_type() == data_type)
            .unwrap_or(Self::None)
    }

    /// Same scalar kind with a different channel layout.
    ///
    /// RGB_U10 has no 10-bit siblings and maps to the U16 family.
    pub fn with_channels(&self, channels: Channels) -> Self {
        let data_type = match self.data_type() {
            DataType::U10 if channels != Channels::RGB => DataType::U16,
            d => d,
        };
        Self::from_parts(channels, data_type)
    }

    /// Canonical name, e.g. `"RGBA_U16"`.
    pub const fn name(&self) -> &'static str {
        use PixelType::*;
        match self {
            None => "None",
            L_U8 => "L_U8",
            L_U16 => "L_U16",
            L_U32 => "L_U32",
            L_F16 => "L_F16",
            L_F32 => "L_F32",
            LA_U8 => "LA_U8",
            LA_U16 => "LA_U16",
            LA_U32 => "LA_U32",
            LA_F16 => "LA_F16",
            LA_F32 => "LA_F32",
            RGB_U8 => "RGB_U8",
            RGB_U10 => "RGB_U10",
            RGB_U16 => "RGB_U16",
            RGB_U32 => "RGB_U32",
            RGB_F16 => "RGB_F16",
            RGB_F32 => "RGB_F32",
            RGBA_U8 => "RGBA_U8",
            RGBA_U16 => "RGBA_U16",
            RGBA_U32 => "RGBA_U32",
            RGBA_F16 => "RGBA_F16",
            RGBA_F32 => "RGBA_F32",
        }
    }
}

impl fmt::Display for PixelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let upper = s.trim().to_ascii_uppercase();
        if upper == "NONE" {
            return Ok(Self::None);
        }
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.name() == upper)
            .ok_or_else(|| Error::invalid_argument(format!("unknown pixel type '{s}'")))
    }
}

// === Lookups ===

/// Integer pixel type for a channel count and bit depth.
///
/// Returns [`PixelType::None`] when the combination is not defined; callers
/// treat that as "unsupported", not as a failure of the lookup.
pub fn get_int_type(channels: usize, bit_depth: u8) -> PixelType {
    use PixelType::*;
    match (channels, bit_depth) {
        (1, 8) => L_U8,
        (1, 16) => L_U16,
        (1, 32) => L_U32,
        (2, 8) => LA_U8,
        (2, 16) => LA_U16,
        (2, 32) => LA_U32,
        (3, 8) => RGB_U8,
        (3, 10) => RGB_U10,
        (3, 16) => RGB_U16,
        (3, 32) => RGB_U32,
        (4, 8) => RGBA_U8,
        (4, 16) => RGBA_U16,
        (4, 32) => RGBA_U32,
        _ => None,
    }
}

/// Float pixel type for a channel count and bit depth (16 or 32).
pub fn get_float_type(channels: usize, bit_depth: u8) -> PixelType {
    use PixelType::*;
    match (channels, bit_depth) {
        (1, 16) => L_F16,
        (1, 32) => L_F32,
        (2, 16) => LA_F16,
        (2, 32) => LA_F32,
        (3, 16) => RGB_F16,
        (3, 32) => RGB_F32,
        (4, 16) => RGBA_F16,
        (4, 32) => RGBA_F32,
        _ => None,
    }
}

// === Packed 10-bit ===

/// Three 10-bit samples stored in one 32-bit word.
///
/// Two bit layouts exist in the wild:
///
/// ```text
/// MSB: RRRRRRRRRR GGGGGGGGGG BBBBBBBBBB xx   (R = bits 31-22, film scanners)
/// LSB: xx BBBBBBBBBB GGGGGGGGGG RRRRRRRRRR   (R = bits 9-0)
/// ```
///
/// [`PixelType::RGB_U10`] buffers use the MSB layout; the word itself is
/// stored in the buffer's [`crate::image::Endian`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct U10 {
    /// Red, 0..=1023
    pub r: u16,
    /// Green, 0..=1023
    pub g: u16,
    /// Blue, 0..=1023
    pub b: u16,
}

impl U10 {
    /// Creates a packed pixel; samples are masked to 10 bits.
    #[inline]
    pub const fn new(r: u16, g: u16, b: u16) -> Self {
        Self {
            r: r & 0x3ff,
            g: g & 0x3ff,
            b: b & 0x3ff,
        }
    }

    /// Packs with red in the most significant bits.
    #[inline]
    pub const fn pack_msb(&self) -> u32 {
        ((self.r as u32 & 0x3ff) << 22) | ((self.g as u32 & 0x3ff) << 12) | ((self.b as u32 & 0x3ff) << 2)
    }

    /// Unpacks a word in the MSB layout.
    #[inline]
    pub const fn unpack_msb(word: u32) -> Self {
        Self {
            r: ((word >> 22) & 0x3ff) as u16,
            g: ((word >> 12) & 0x3ff) as u16,
            b: ((word >> 2) & 0x3ff) as u16,
        }
    }

    /// Packs with red in the least significant bits.
    #[inline]
    pub const fn pack_lsb(&self) -> u32 {
        (self.r as u32 & 0x3ff) | ((self.g as u32 & 0x3ff) << 10) | ((self.b as u32 & 0x3ff) << 20)
    }

    /// Unpacks a word in the LSB layout.
    #[inline]
    pub const fn unpack_lsb(word: u32) -> Self {
        Self {
            r: (word & 0x3ff) as u16,
            g: ((word >> 10) & 0x3ff) as u16,
            b: ((word >> 20) & 0x3ff) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables() {
        let channels: Vec<usize> = PixelType::ALL.iter().map(|t| t.channel_count()).collect();
        assert_eq!(
            channels,
            [1, 1, 1, 1, 1, 2, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4]
        );
        let bits: Vec<u8> = PixelType::ALL.iter().map(|t| t.bit_depth()).collect();
        assert_eq!(
            bits,
            [8, 16, 32, 16, 32, 8, 16, 32, 16, 32, 8, 10, 16, 32, 16, 32, 8, 16, 32, 16, 32]
        );
        let bytes: Vec<usize> = PixelType::ALL.iter().map(|t| t.byte_count()).collect();
        assert_eq!(
            bytes,
            [1, 2, 4, 2, 4, 2, 4, 8, 4, 8, 3, 4, 6, 12, 6, 12, 4, 8, 16, 8, 16]
        );
    }

    #[test]
    fn test_none_is_only_sentinel() {
        assert!(!PixelType::None.is_valid());
        assert_eq!(PixelType::None.channel_count(), 0);
        assert_eq!(PixelType::None.byte_count(), 0);
        for t in PixelType::ALL {
            assert!(t.is_valid());
            assert!(t.channel_count() > 0 && t.bit_depth() > 0 && t.byte_count() > 0);
        }
    }

    #[test]
    fn test_stable_indices() {
        assert_eq!(PixelType::None.index(), 0);
        assert_eq!(PixelType::L_U8.index(), 1);
        assert_eq!(PixelType::RGB_U10.index(), 12);
        assert_eq!(PixelType::RGBA_F32.index(), 21);
        for t in PixelType::ALL {
            assert_eq!(PixelType::from_index(t.index()), Some(t));
        }
        assert_eq!(PixelType::from_index(22), None);
    }

    #[test]
    fn test_lookups() {
        assert_eq!(get_int_type(1, 8), PixelType::L_U8);
        assert_eq!(get_int_type(4, 32), PixelType::RGBA_U32);
        assert_eq!(get_int_type(3, 10), PixelType::RGB_U10);
        assert_eq!(get_int_type(4, 10), PixelType::None);
        assert_eq!(get_int_type(5, 8), PixelType::None);
        assert_eq!(get_float_type(2, 16), PixelType::LA_F16);
        assert_eq!(get_float_type(3, 8), PixelType::None);
        for t in PixelType::ALL {
            let found = if t.is_float() {
                get_float_type(t.channel_count(), t.bit_depth())
            } else {
                get_int_type(t.channel_count(), t.bit_depth())
            };
            assert_eq!(found, t);
        }
    }

    #[test]
    fn test_gl_tokens() {
        assert_eq!(PixelType::RGB_U10.gl_format(), Some(GlFormat::Rgba));
        assert_eq!(PixelType::RGB_U10.gl_type(), Some(GlType::UnsignedInt10_10_10_2));
        assert_eq!(PixelType::LA_F16.gl_format(), Some(GlFormat::Rg));
        assert_eq!(PixelType::LA_F16.gl_type(), Some(GlType::HalfFloat));
        assert_eq!(PixelType::None.gl_format(), None);
        assert_eq!(GlType::Float.value(), 0x1406);
    }

    #[test]
    fn test_parse_names() {
        for t in PixelType::ALL {
            assert_eq!(t.to_string().parse::<PixelType>(), Ok(t));
        }
        assert_eq!("rgba_u16".parse::<PixelType>(), Ok(PixelType::RGBA_U16));
        assert!("RGB_U12".parse::<PixelType>().is_err());
    }

    #[test]
    fn test_with_channels() {
        assert_eq!(PixelType::L_F16.with_channels(Channels::RGBA), PixelType::RGBA_F16);
        assert_eq!(PixelType::RGB_U10.with_channels(Channels::RGBA), PixelType::RGBA_U16);
        assert_eq!(PixelType::RGB_U16.with_channels(Channels::RGB), PixelType::RGB_U16);
    }

    #[test]
    fn test_u10_packing() {
        let p = U10::new(1023, 512, 1);
        assert_eq!(U10::unpack_msb(p.pack_msb()), p);
        assert_eq!(U10::unpack_lsb(p.pack_lsb()), p);
        assert_eq!(U10::new(1023, 0, 0).pack_msb(), 0xffc0_0000);
        assert_eq!(U10::new(0, 0, 1023).pack_msb(), 0x0000_0ffc);
        assert_eq!(U10::new(1023, 0, 0).pack_lsb(), 0x0000_03ff);
    }
}
