//! Image metadata and single-owner pixel buffers.
//!
//! - [`ImageInfo`] describes a buffer: size, pixel type, memory layout.
//! - [`ImageBuffer`] owns the bytes plus the info and free-form [`Tags`].
//!
//! Buffers move through the pipeline (decoder -> conversion -> consumer) by
//! value. Once a frame is final it can be frozen with
//! [`ImageBuffer::into_shared`] and handed out behind an `Arc`.
//!
//! # Layout
//!
//! Scanlines are padded to [`Layout::alignment`] bytes:
//!
//! ```text
//! scanline_byte_count = ceil(width * byte_count(type) / alignment) * alignment
//! data_byte_count     = height * scanline_byte_count
//! ```
//!
//! Multi-byte samples are stored in [`Layout::endian`] order and the
//! [`Mirror`] flags record rows or columns stored in reverse.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::convert::swap_endian;
use crate::error::{Error, Result};
use crate::pixel::PixelType;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Size {
    /// Width
    pub w: u16,
    /// Height
    pub h: u16,
}

impl Size {
    /// Creates a size.
    #[inline]
    pub const fn new(w: u16, h: u16) -> Self {
        Self { w, h }
    }

    /// Both dimensions are non-zero.
    #[inline]
    pub const fn is_valid(&self) -> bool {
        self.w > 0 && self.h > 0
    }

    /// Width over height, 0 for an empty size.
    pub fn aspect(&self) -> f32 {
        if self.h > 0 {
            self.w as f32 / self.h as f32
        } else {
            0.0
        }
    }

    /// Converts 32-bit file dimensions, rejecting values over `u16::MAX`.
    pub fn from_u32(w: u32, h: u32) -> Result<Self> {
        match (u16::try_from(w), u16::try_from(h)) {
            (Ok(w), Ok(h)) => Ok(Self { w, h }),
            _ => Err(Error::invalid_argument(format!("image size {w}x{h} out of range"))),
        }
    }
}

/// Rows (`y`) or columns (`x`) stored in reverse order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Mirror {
    /// Columns run right to left.
    pub x: bool,
    /// Rows run bottom to top.
    pub y: bool,
}

/// Byte order of multi-byte samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endian {
    /// Most significant byte first (big endian).
    Msb,
    /// Least significant byte first (little endian).
    Lsb,
}

impl Endian {
    /// Byte order of the running machine.
    #[inline]
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            Self::Msb
        } else {
            Self::Lsb
        }
    }

    /// The other byte order.
    #[inline]
    pub const fn opposite(&self) -> Self {
        match self {
            Self::Msb => Self::Lsb,
            Self::Lsb => Self::Msb,
        }
    }
}

impl Default for Endian {
    fn default() -> Self {
        Self::native()
    }
}

/// Memory layout of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Layout {
    /// Reversed rows/columns.
    pub mirror: Mirror,
    /// Scanline alignment in bytes (1 = tightly packed).
    pub alignment: u8,
    /// Sample byte order.
    pub endian: Endian,
}

impl Default for Layout {
    fn default() -> Self {
        Self {
            mirror: Mirror::default(),
            alignment: 1,
            endian: Endian::native(),
        }
    }
}

impl Layout {
    /// Layout with the given scanline alignment.
    pub fn aligned(alignment: u8) -> Self {
        Self {
            alignment,
            ..Self::default()
        }
    }
}

/// Description of a pixel buffer.
///
/// Built by a plugin while parsing a file header. Immutable afterwards
/// except through [`ImageInfo::with_type`], which the conversion step uses
/// to re-tag a buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageInfo {
    /// Layer or file name.
    pub name: String,
    /// Dimensions.
    pub size: Size,
    /// Pixel aspect ratio (1.0 = square).
    pub pixel_aspect_ratio: f32,
    /// Pixel representation.
    pub pixel_type: PixelType,
    /// Memory layout.
    pub layout: Layout,
    /// Codec name when the source is compressed.
    pub codec: Option<String>,
}

impl Default for ImageInfo {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: Size::default(),
            pixel_aspect_ratio: 1.0,
            pixel_type: PixelType::None,
            layout: Layout::default(),
            codec: None,
        }
    }
}

impl ImageInfo {
    /// Creates info with default layout.
    pub fn new(size: Size, pixel_type: PixelType) -> Self {
        Self {
            size,
            pixel_type,
            ..Self::default()
        }
    }

    /// Same info, different pixel type.
    pub fn with_type(&self, pixel_type: PixelType) -> Self {
        Self {
            pixel_type,
            ..self.clone()
        }
    }

    /// Same info, different layout.
    pub fn with_layout(&self, layout: Layout) -> Self {
        Self {
            layout,
            ..self.clone()
        }
    }

    /// `width > 0 && height > 0 && type != None`.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.size.is_valid() && self.pixel_type.is_valid()
    }

    /// Display aspect: width / height * pixel aspect.
    pub fn aspect_ratio(&self) -> f32 {
        self.size.aspect() * self.pixel_aspect_ratio
    }

    /// Bytes per pixel.
    #[inline]
    pub fn pixel_byte_count(&self) -> usize {
        self.pixel_type.byte_count()
    }

    /// Bytes per scanline including alignment padding.
    pub fn scanline_byte_count(&self) -> usize {
        let align = self.layout.alignment.max(1) as usize;
        let bytes = self.size.w as usize * self.pixel_byte_count();
        bytes.div_ceil(align) * align
    }

    /// Total bytes: `height * scanline_byte_count`.
    #[inline]
    pub fn data_byte_count(&self) -> usize {
        self.size.h as usize * self.scanline_byte_count()
    }
}

/// Free-form string metadata (timecode, creator, film keycode...).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tags {
    map: BTreeMap<String, String>,
}

impl Tags {
    /// Empty tag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a tag, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.map.insert(key.into(), value.into());
    }

    /// Gets a tag value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Whether a tag is present.
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Number of tags.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// True if there are no tags.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates tags in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Copies every tag of `other` into `self`.
    pub fn merge(&mut self, other: &Tags) {
        for (k, v) in other.iter() {
            self.set(k, v);
        }
    }
}

/// Pixel bytes plus their description.
///
/// Exclusively owned; transfer by move.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageBuffer {
    info: ImageInfo,
    tags: Tags,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Zero-filled buffer sized by `info`.
    pub fn new(info: ImageInfo) -> Self {
        let data = vec![0u8; info.data_byte_count()];
        Self {
            info,
            tags: Tags::new(),
            data,
        }
    }

    /// Wraps existing bytes; the length must equal `info.data_byte_count()`.
    pub fn from_vec(info: ImageInfo, data: Vec<u8>) -> Result<Self> {
        let expected = info.data_byte_count();
        if data.len() != expected {
            return Err(Error::buffer_size(expected, data.len()));
        }
        Ok(Self {
            info,
            tags: Tags::new(),
            data,
        })
    }

    /// Buffer description.
    #[inline]
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// Pixel type shortcut.
    #[inline]
    pub fn pixel_type(&self) -> PixelType {
        self.info.pixel_type
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> usize {
        self.info.size.w as usize
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> usize {
        self.info.size.h as usize
    }

    /// Metadata tags.
    #[inline]
    pub fn tags(&self) -> &Tags {
        &self.tags
    }

    /// Mutable metadata tags.
    #[inline]
    pub fn tags_mut(&mut self) -> &mut Tags {
        &mut self.tags
    }

    /// Replaces the tag set.
    pub fn set_tags(&mut self, tags: Tags) {
        self.tags = tags;
    }

    /// Raw bytes.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable raw bytes.
    #[inline]
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the buffer, returning the bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Total bytes.
    #[inline]
    pub fn byte_count(&self) -> usize {
        self.data.len()
    }

    /// Bytes of scanline `y` without alignment padding.
    pub fn scanline(&self, y: usize) -> &[u8] {
        let stride = self.info.scanline_byte_count();
        let len = self.width() * self.info.pixel_byte_count();
        &self.data[y * stride..y * stride + len]
    }

    /// Mutable bytes of scanline `y` without alignment padding.
    pub fn scanline_mut(&mut self, y: usize) -> &mut [u8] {
        let stride = self.info.scanline_byte_count();
        let len = self.width() * self.info.pixel_byte_count();
        &mut self.data[y * stride..y * stride + len]
    }

    /// Bytes of one pixel.
    pub fn pixel(&self, x: usize, y: usize) -> &[u8] {
        let bpp = self.info.pixel_byte_count();
        &self.scanline(y)[x * bpp..(x + 1) * bpp]
    }

    /// Re-tags the buffer with new info of identical byte size.
    pub fn retag(&mut self, info: ImageInfo) -> Result<()> {
        let expected = info.data_byte_count();
        if expected != self.data.len() {
            return Err(Error::buffer_size(expected, self.data.len()));
        }
        self.info = info;
        Ok(())
    }

    /// Freezes the buffer for sharing between readers.
    pub fn into_shared(self) -> Arc<ImageBuffer> {
        Arc::new(self)
    }

    /// Copy with mirroring applied, native byte order and no padding.
    ///
    /// Writers use this to get top-down, left-to-right scanlines.
    pub fn normalize_layout(&self) -> ImageBuffer {
        let layout = self.info.layout;
        let info = self.info.with_layout(Layout::default());
        if layout == Layout::default() {
            return ImageBuffer {
                info,
                tags: self.tags.clone(),
                data: self.data.clone(),
            };
        }

        let w = self.width();
        let h = self.height();
        let bpp = self.info.pixel_byte_count();
        let mut out = ImageBuffer::new(info);
        out.tags = self.tags.clone();
        for y in 0..h {
            let src_y = if layout.mirror.y { h - 1 - y } else { y };
            let src = self.scanline(src_y);
            let dst = out.scanline_mut(y);
            if layout.mirror.x {
                for x in 0..w {
                    let sx = w - 1 - x;
                    dst[x * bpp..(x + 1) * bpp].copy_from_slice(&src[sx * bpp..(sx + 1) * bpp]);
                }
            } else {
                dst.copy_from_slice(src);
            }
        }
        if layout.endian != Endian::native() {
            swap_endian(out.data_mut(), self.info.pixel_type);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_validity() {
        assert!(!ImageInfo::default().is_valid());
        assert!(!ImageInfo::new(Size::new(0, 10), PixelType::RGB_U8).is_valid());
        assert!(!ImageInfo::new(Size::new(10, 10), PixelType::None).is_valid());
        assert!(ImageInfo::new(Size::new(10, 10), PixelType::RGB_U8).is_valid());
    }

    #[test]
    fn test_scanline_alignment() {
        let mut info = ImageInfo::new(Size::new(3, 2), PixelType::RGB_U8);
        assert_eq!(info.scanline_byte_count(), 9);
        assert_eq!(info.data_byte_count(), 18);

        info.layout.alignment = 4;
        assert_eq!(info.scanline_byte_count(), 12);
        assert_eq!(info.data_byte_count(), 24);

        let info = ImageInfo::new(Size::new(5, 1), PixelType::RGB_U10);
        assert_eq!(info.scanline_byte_count(), 20);
    }

    #[test]
    fn test_from_vec_checks_size() {
        let info = ImageInfo::new(Size::new(2, 2), PixelType::L_U16);
        assert!(ImageBuffer::from_vec(info.clone(), vec![0; 8]).is_ok());
        assert_eq!(
            ImageBuffer::from_vec(info, vec![0; 7]).unwrap_err(),
            Error::buffer_size(8, 7)
        );
    }

    #[test]
    fn test_normalize_layout_flips() {
        let mut info = ImageInfo::new(Size::new(2, 2), PixelType::L_U8);
        info.layout.mirror = Mirror { x: true, y: true };
        let buf = ImageBuffer::from_vec(info, vec![1, 2, 3, 4]).unwrap();
        let out = buf.normalize_layout();
        assert_eq!(out.data(), &[4, 3, 2, 1]);
        assert_eq!(out.info().layout, Layout::default());
    }

    #[test]
    fn test_normalize_layout_swaps_endian() {
        let mut info = ImageInfo::new(Size::new(1, 1), PixelType::L_U16);
        info.layout.endian = Endian::native().opposite();
        let buf = ImageBuffer::from_vec(info, vec![0x12, 0x34]).unwrap();
        assert_eq!(buf.normalize_layout().data(), &[0x34, 0x12]);
    }

    #[test]
    fn test_normalize_layout_drops_padding() {
        let mut info = ImageInfo::new(Size::new(1, 2), PixelType::L_U8);
        info.layout.alignment = 4;
        let buf = ImageBuffer::from_vec(info, vec![7, 0, 0, 0, 9, 0, 0, 0]).unwrap();
        assert_eq!(buf.normalize_layout().data(), &[7, 9]);
    }

    #[test]
    fn test_tags() {
        let mut tags = Tags::new();
        tags.set("Timecode", "01:00:00:00");
        tags.set("Creator", "reel");
        assert_eq!(tags.get("Creator"), Some("reel"));
        let keys: Vec<&str> = tags.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, ["Creator", "Timecode"]);
    }
}
