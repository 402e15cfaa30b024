//! DPX (Digital Picture Exchange) format support.
//!
//! Industry standard for film scanning and digital intermediate work.
//! Commonly used in VFX pipelines for frame sequences.
//!
//! # Features
//!
//! - L, RGB and RGBA at 8 and 16 bits
//! - 10-bit RGB packed three to a word (method A), kept packed as `RGB_U10`
//! - 12-bit samples filled into 16-bit words, widened to U16
//! - Big-endian and little-endian files, V1.0 and V2.0 headers
//! - File, source, film and TV header fields as tags
//!
//! # Bit Depth
//!
//! | Depth | Packing | Decoded as | Max Value |
//! |-------|---------|------------|-----------|
//! | 8-bit | any | `*_U8` | 255 |
//! | 10-bit | method A | `RGB_U10` | 1023 |
//! | 12-bit | method A | `*_U16` | 4095 |
//! | 16-bit | any | `*_U16` | 65535 |
//!
//! # Format Details
//!
//! DPX is defined by SMPTE 268M. Key characteristics:
//! - Magic: "SDPX" (big-endian) or "XPDS" (little-endian)
//! - Header: 2048 bytes (file + image + orientation + film + TV headers)
//! - Data: uncompressed, one image element, byte order of the header
//!
//! Pixels are returned in the file's byte order and orientation; the
//! buffer's [`Layout`] records both.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use reel_core::convert::convert_into;
use reel_core::time::keycode_to_string;
use reel_core::{
    get_int_type, Channels, DataType, Endian, ImageBuffer, ImageInfo, Layout, Mirror, PixelType,
    Size, Speed, Tags, Timecode,
};
use tracing::{debug, trace};

use crate::config::{DpxVersion, IoConfig};
use crate::header::{
    digits, read_tags, valid_f32, valid_u32, write_digits_at,
    write_tags, write_text_at, write_u16_at, write_u32_at, Field, Fields,
};
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{IoError, IoResult};

// === Constants ===

/// DPX magic number (big-endian): "SDPX"
const MAGIC_BE: u32 = 0x53445058;
/// DPX magic number (little-endian): "XPDS"
const MAGIC_LE: u32 = 0x58504453;
/// Standard header size
const HEADER_SIZE: usize = 2048;
/// Generic + industry header sizes written.
const GENERIC_SIZE: u32 = 1664;
const INDUSTRY_SIZE: u32 = 384;

// Header offsets.
const IMAGE_OFFSET: usize = 4;
const VERSION: usize = 8;
const FILE_SIZE: usize = 16;
const DITTO_KEY: usize = 20;
const GENERIC_HEADER_SIZE: usize = 24;
const INDUSTRY_HEADER_SIZE: usize = 28;
const USER_HEADER_SIZE: usize = 32;
const ENCRYPTION_KEY: usize = 660;
const ORIENT: usize = 768;
const ELEMENT_COUNT: usize = 770;
const WIDTH: usize = 772;
const HEIGHT: usize = 776;
const DATA_SIGN: usize = 780;
const LOW_DATA: usize = 784;
const HIGH_DATA: usize = 792;
const DESCRIPTOR: usize = 800;
const TRANSFER: usize = 801;
const COLORIMETRIC: usize = 802;
const BIT_DEPTH: usize = 803;
const PACKING: usize = 804;
const ENCODING: usize = 806;
const DATA_OFFSET: usize = 808;
const LINE_PADDING: usize = 812;
const ELEMENT_PADDING: usize = 816;
const FILM_ID: usize = 1664;
const FILM_TYPE: usize = 1666;
const FILM_OFFSET: usize = 1668;
const FILM_PREFIX: usize = 1670;
const FILM_COUNT: usize = 1676;
const FILM_FRAME_RATE: usize = 1724;
const TV_TIMECODE: usize = 1920;
const TV_FRAME_RATE: usize = 1940;

/// String fields cleared to NUL instead of 0xff in a fresh header.
const TEXT_FIELDS: &[(usize, usize)] = &[
    (VERSION, 8),
    (36, 100),
    (136, 24),
    (160, 100),
    (260, 200),
    (460, 200),
    (820, 32),
    (1432, 100),
    (1532, 24),
    (1556, 32),
    (1588, 32),
    (1680, 32),
    (1732, 32),
    (1764, 100),
];

/// Header fields surfaced as tags.
const TAGS: &[(&str, Field)] = &[
    ("Time", Field::Text(136, 24)),
    ("Creator", Field::Text(160, 100)),
    ("Project", Field::Text(260, 200)),
    ("Copyright", Field::Text(460, 200)),
    ("Source Offset", Field::U32Pair(1408)),
    ("Source Center", Field::F32Pair(1416)),
    ("Source Size", Field::U32Pair(1424)),
    ("Source File", Field::Text(1432, 100)),
    ("Source Time", Field::Text(1532, 24)),
    ("Source Input Device", Field::Text(1556, 32)),
    ("Source Input Serial", Field::Text(1588, 32)),
    ("Source Border", Field::U16Quad(1620)),
    ("Source Pixel Aspect", Field::U32Pair(1628)),
    ("Source Scan Size", Field::F32Pair(1636)),
    ("Film Format", Field::Text(1680, 32)),
    ("Film Frame", Field::U32(1712)),
    ("Film Sequence", Field::U32(1716)),
    ("Film Hold", Field::U32(1720)),
    ("Film Frame Rate", Field::F32(FILM_FRAME_RATE)),
    ("Film Shutter", Field::F32(1728)),
    ("Film Frame ID", Field::Text(1732, 32)),
    ("Film Slate", Field::Text(1764, 100)),
    ("TV Interlace", Field::U8(1928)),
    ("TV Field", Field::U8(1929)),
    ("TV Video Signal", Field::U8(1930)),
    ("TV Sample Rate", Field::F32Pair(1932)),
    ("TV Frame Rate", Field::F32(TV_FRAME_RATE)),
    ("TV Time Offset", Field::F32(1944)),
    ("TV Gamma", Field::F32(1948)),
    ("TV Black Level", Field::F32(1952)),
    ("TV Black Gain", Field::F32(1956)),
    ("TV Breakpoint", Field::F32(1960)),
    ("TV White Level", Field::F32(1964)),
    ("TV Integration Times", Field::F32(1968)),
];

// === Bit Depth Enum ===

/// DPX bit depth options.
///
/// # Storage
///
/// | Depth | Storage | Bytes/pixel (RGB) |
/// |-------|---------|-------------------|
/// | 8-bit | 1 byte/channel | 3 |
/// | 10-bit | Packed 3 per u32 | 4 |
/// | 12-bit | 2 bytes/channel | 6 |
/// | 16-bit | 2 bytes/channel | 6 |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    /// 8 bits per channel (0-255).
    Bit8,
    /// 10 bits per channel, packed (0-1023). Film standard.
    Bit10,
    /// 12 bits per channel (0-4095).
    Bit12,
    /// 16 bits per channel (0-65535).
    Bit16,
}

impl BitDepth {
    /// Returns the bit depth as a number.
    #[inline]
    pub fn bits(&self) -> u8 {
        match self {
            BitDepth::Bit8 => 8,
            BitDepth::Bit10 => 10,
            BitDepth::Bit12 => 12,
            BitDepth::Bit16 => 16,
        }
    }

    /// Returns the maximum value for this bit depth.
    #[inline]
    pub fn max_value(&self) -> u32 {
        match self {
            BitDepth::Bit8 => 255,
            BitDepth::Bit10 => 1023,
            BitDepth::Bit12 => 4095,
            BitDepth::Bit16 => 65535,
        }
    }

    /// Creates BitDepth from bit count.
    pub fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            8 => Some(BitDepth::Bit8),
            10 => Some(BitDepth::Bit10),
            12 => Some(BitDepth::Bit12),
            16 => Some(BitDepth::Bit16),
            _ => None,
        }
    }
}

/// Component descriptor of the image element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Descriptor {
    L = 6,
    Rgb = 50,
    Rgba = 51,
}

impl Descriptor {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            6 => Some(Self::L),
            50 => Some(Self::Rgb),
            51 => Some(Self::Rgba),
            _ => None,
        }
    }

    fn channels(self) -> usize {
        match self {
            Self::L => 1,
            Self::Rgb => 3,
            Self::Rgba => 4,
        }
    }
}

/// Transfer characteristic codes.
const TRANSFER_FILM_PRINT: u8 = 1;
const TRANSFER_LINEAR: u8 = 2;

// === Header ===

/// Parsed DPX header.
#[derive(Debug, Clone)]
struct Header {
    endian: Endian,
    image_offset: usize,
    image: ImageInfo,
    /// 12-bit samples in the high bits of 16-bit words.
    filled_12bit: bool,
    film_print: bool,
    tags: Tags,
    speed: Option<Speed>,
}

impl Header {
    fn parse(buf: &[u8]) -> IoResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IoError::CorruptData("DPX header: unexpected end of file".into()));
        }

        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let big_endian = match magic {
            MAGIC_BE => true,
            MAGIC_LE => false,
            _ => {
                return Err(IoError::CorruptData(format!(
                    "invalid DPX magic: 0x{:08X}",
                    magic
                )))
            }
        };
        let f = Fields::new(buf, big_endian);

        let elements = f.u16(ELEMENT_COUNT);
        if elements != 1 {
            return Err(IoError::UnsupportedVariant(format!(
                "DPX with {elements} image elements"
            )));
        }

        let (w, h) = (f.u32(WIDTH), f.u32(HEIGHT));
        if w == 0 || h == 0 {
            return Err(IoError::CorruptData(format!("invalid DPX size {w}x{h}")));
        }
        let size = Size::from_u32(w, h)
            .map_err(|_| IoError::UnsupportedVariant(format!("DPX size {w}x{h}")))?;

        let descriptor = Descriptor::from_u8(f.u8(DESCRIPTOR)).ok_or_else(|| {
            IoError::UnsupportedVariant(format!("DPX descriptor {}", f.u8(DESCRIPTOR)))
        })?;
        let channels = descriptor.channels();
        let bits = f.u8(BIT_DEPTH);
        let packing = f.u16(PACKING);

        let (pixel_type, filled_12bit) = match (BitDepth::from_bits(bits), packing) {
            (Some(BitDepth::Bit8 | BitDepth::Bit16), 0 | 1) => (get_int_type(channels, bits), false),
            (Some(BitDepth::Bit10), 1) if descriptor == Descriptor::Rgb => (PixelType::RGB_U10, false),
            (Some(BitDepth::Bit12), 1) => (get_int_type(channels, 16), true),
            _ => {
                return Err(IoError::UnsupportedVariant(format!(
                    "DPX {bits}-bit {descriptor:?} with packing {packing}"
                )))
            }
        };

        if f.u16(ENCODING) != 0 {
            return Err(IoError::UnsupportedVariant("RLE-encoded DPX".into()));
        }
        let line_padding = f.u32(LINE_PADDING);
        if valid_u32(line_padding) && line_padding != 0 {
            return Err(IoError::UnsupportedVariant("DPX line padding".into()));
        }

        let orient = f.u16(ORIENT);
        let mirror = Mirror {
            x: matches!(orient, 1 | 3),
            y: matches!(orient, 2 | 3),
        };
        let endian = if big_endian { Endian::Msb } else { Endian::Lsb };
        let mut image = ImageInfo::new(size, pixel_type).with_layout(Layout {
            mirror,
            alignment: 1,
            endian,
        });
        if let Some(aspect) = pixel_aspect(&f) {
            image.pixel_aspect_ratio = aspect;
        }

        let mut tags = Tags::new();
        read_tags(&f, TAGS, &mut tags);
        if let (Some(id), Some(kind), Some(offset), Some(prefix), Some(count)) = (
            digits(&f, FILM_ID, 2),
            digits(&f, FILM_TYPE, 2),
            digits(&f, FILM_OFFSET, 2),
            digits(&f, FILM_PREFIX, 6),
            digits(&f, FILM_COUNT, 4),
        ) {
            tags.set("Keycode", keycode_to_string(id, kind, prefix, count, offset));
        }
        let timecode = f.u32(TV_TIMECODE);
        if timecode != 0xffff_ffff {
            tags.set("Timecode", Timecode(timecode).to_string());
        }

        let rate = |off: usize| {
            let v = f.f32(off);
            (valid_f32(v) && v > 0.000_001).then(|| Speed::from_fps(v))
        };
        let speed = rate(TV_FRAME_RATE).or_else(|| rate(FILM_FRAME_RATE));

        Ok(Self {
            endian,
            image_offset: f.u32(IMAGE_OFFSET) as usize,
            image,
            filled_12bit,
            film_print: f.u8(TRANSFER) == TRANSFER_FILM_PRINT,
            tags,
            speed,
        })
    }

    /// Tags plus the color profile derived from the transfer code.
    fn tags(&self, config: &IoConfig) -> Tags {
        let mut tags = self.tags.clone();
        crate::cineon::set_color_profile(&mut tags, self.film_print, config);
        tags
    }
}

fn pixel_aspect(f: &Fields<'_>) -> Option<f32> {
    let (a, b) = (f.u32(1628), f.u32(1632));
    (valid_u32(a) && valid_u32(b) && a > 0 && b > 0).then(|| a as f32 / b as f32)
}

// === Decode ===

/// Decodes a DPX file held in memory.
pub fn decode(data: &[u8], config: &IoConfig) -> IoResult<ImageBuffer> {
    let header = Header::parse(data)?;
    let info = &header.image;
    let expected = info.data_byte_count();
    let end = header.image_offset.checked_add(expected);
    let pixels = match end {
        Some(end) if end <= data.len() => &data[header.image_offset..end],
        _ => {
            return Err(IoError::CorruptData(format!(
                "incomplete DPX: {} of {} pixel bytes",
                data.len().saturating_sub(header.image_offset),
                expected
            )))
        }
    };

    let mut bytes = pixels.to_vec();
    if header.filled_12bit {
        widen_12bit(&mut bytes, header.endian);
    }
    trace!(size = ?info.size, pixel_type = %info.pixel_type, "DPX decode");

    let mut image = ImageBuffer::from_vec(info.clone(), bytes)?;
    image.set_tags(header.tags(config));
    Ok(image)
}

/// Scales 12-bit samples stored in the high bits of 16-bit words to full range.
fn widen_12bit(bytes: &mut [u8], endian: Endian) {
    for w in bytes.chunks_exact_mut(2) {
        let raw = match endian {
            Endian::Msb => u16::from_be_bytes([w[0], w[1]]),
            Endian::Lsb => u16::from_le_bytes([w[0], w[1]]),
        };
        let v12 = raw >> 4;
        let v16 = (v12 << 4) | (v12 >> 8);
        w.copy_from_slice(&match endian {
            Endian::Msb => v16.to_be_bytes(),
            Endian::Lsb => v16.to_le_bytes(),
        });
    }
}

// === Encode ===

/// Pixel type written for `src`: L/RGB/RGBA at 8, 10 (RGB only) or 16 bits.
fn output_type(src: PixelType) -> PixelType {
    let channels = match src.channels() {
        Channels::L => Channels::L,
        Channels::RGB => Channels::RGB,
        _ => Channels::RGBA,
    };
    let data_type = match src.data_type() {
        DataType::U8 => DataType::U8,
        DataType::U10 => DataType::U10,
        _ => DataType::U16,
    };
    PixelType::from_parts(channels, data_type)
}

/// Encodes an image as a complete DPX file.
pub fn encode(image: &ImageBuffer, config: &IoConfig) -> IoResult<Vec<u8>> {
    let info = image.info();
    if !info.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an empty image".into()));
    }
    let endian = config.dpx.endian.resolve();
    let big_endian = endian == Endian::Msb;
    let pixel_type = output_type(info.pixel_type);

    let out_info = ImageInfo::new(info.size, pixel_type).with_layout(Layout {
        mirror: Mirror::default(),
        alignment: 1,
        endian,
    });
    let mut pixels = ImageBuffer::new(out_info);
    convert_into(image, &mut pixels)?;

    let mut buf = vec![0xffu8; HEADER_SIZE];
    for &(off, len) in TEXT_FIELDS {
        buf[off..off + len].fill(0);
    }
    let total = HEADER_SIZE + pixels.byte_count();
    let version = match config.dpx.version {
        DpxVersion::V1 => "V1.0",
        DpxVersion::V2 => "V2.0",
    };

    write_u32_at(&mut buf, 0, MAGIC_BE, big_endian);
    write_u32_at(&mut buf, IMAGE_OFFSET, HEADER_SIZE as u32, big_endian);
    write_text_at(&mut buf, VERSION, 8, version);
    write_u32_at(&mut buf, FILE_SIZE, total as u32, big_endian);
    write_u32_at(&mut buf, DITTO_KEY, 0, big_endian);
    write_u32_at(&mut buf, GENERIC_HEADER_SIZE, GENERIC_SIZE, big_endian);
    write_u32_at(&mut buf, INDUSTRY_HEADER_SIZE, INDUSTRY_SIZE, big_endian);
    write_u32_at(&mut buf, USER_HEADER_SIZE, 0, big_endian);
    write_u32_at(&mut buf, ENCRYPTION_KEY, 0, big_endian);
    write_text_at(&mut buf, 160, 100, concat!("reel ", env!("CARGO_PKG_VERSION")));

    write_u16_at(&mut buf, ORIENT, 0, big_endian);
    write_u16_at(&mut buf, ELEMENT_COUNT, 1, big_endian);
    write_u32_at(&mut buf, WIDTH, u32::from(info.size.w), big_endian);
    write_u32_at(&mut buf, HEIGHT, u32::from(info.size.h), big_endian);

    let descriptor = match pixel_type.channels() {
        Channels::L => Descriptor::L,
        Channels::RGB => Descriptor::Rgb,
        _ => Descriptor::Rgba,
    };
    let depth = match pixel_type.data_type() {
        DataType::U8 => BitDepth::Bit8,
        DataType::U10 => BitDepth::Bit10,
        _ => BitDepth::Bit16,
    };
    let film_print = crate::cineon::wants_film_print(image.tags(), config);
    let (transfer, colorimetric) = match (film_print, config.dpx.version) {
        (true, DpxVersion::V1) => (TRANSFER_FILM_PRINT, 1),
        (true, DpxVersion::V2) => (TRANSFER_FILM_PRINT, 0),
        (false, DpxVersion::V2) => (TRANSFER_LINEAR, 1),
        (false, DpxVersion::V1) => (TRANSFER_LINEAR, 0),
    };

    write_u32_at(&mut buf, DATA_SIGN, 0, big_endian);
    write_u32_at(&mut buf, LOW_DATA, 0, big_endian);
    write_u32_at(&mut buf, HIGH_DATA, depth.max_value(), big_endian);
    buf[DESCRIPTOR] = descriptor as u8;
    buf[TRANSFER] = transfer;
    buf[COLORIMETRIC] = colorimetric;
    buf[BIT_DEPTH] = depth.bits();
    let packing = if depth == BitDepth::Bit10 { 1 } else { 0 };
    write_u16_at(&mut buf, PACKING, packing, big_endian);
    write_u16_at(&mut buf, ENCODING, 0, big_endian);
    write_u32_at(&mut buf, DATA_OFFSET, HEADER_SIZE as u32, big_endian);
    write_u32_at(&mut buf, LINE_PADDING, 0, big_endian);
    write_u32_at(&mut buf, ELEMENT_PADDING, 0, big_endian);

    write_header_tags(&mut buf, image.tags(), big_endian);
    let aspect = info.pixel_aspect_ratio;
    if aspect > 0.0 && (aspect - 1.0).abs() > f32::EPSILON && !image.tags().contains("Source Pixel Aspect") {
        write_u32_at(&mut buf, 1628, (aspect * 1000.0).round() as u32, big_endian);
        write_u32_at(&mut buf, 1632, 1000, big_endian);
    }

    debug!(
        size = ?info.size,
        pixel_type = %pixel_type,
        version,
        endian = ?endian,
        "DPX encode"
    );
    buf.extend_from_slice(pixels.data());
    Ok(buf)
}

fn write_header_tags(buf: &mut [u8], tags: &Tags, big_endian: bool) {
    write_tags(buf, TAGS, tags, big_endian);
    if let Some(keycode) = tags.get("Keycode").and_then(|k| k.parse::<reel_core::Keycode>().ok()) {
        let ok = write_digits_at(buf, FILM_ID, 2, keycode.id)
            && write_digits_at(buf, FILM_TYPE, 2, keycode.kind)
            && write_digits_at(buf, FILM_OFFSET, 2, keycode.offset)
            && write_digits_at(buf, FILM_PREFIX, 6, keycode.prefix)
            && write_digits_at(buf, FILM_COUNT, 4, keycode.count);
        if !ok {
            buf[FILM_ID..FILM_COUNT + 4].fill(0xff);
        }
    }
    if let Some(tc) = tags.get("Timecode").and_then(|t| t.parse::<Timecode>().ok()) {
        write_u32_at(buf, TV_TIMECODE, tc.0, big_endian);
    }
}

// === Plugin ===

/// DPX still codec.
#[derive(Debug)]
pub struct DpxCodec;

/// DPX file or sequence handle.
pub type DpxReader = StillReader<DpxCodec>;

impl StillCodec for DpxCodec {
    const KIND: PluginKind = PluginKind::Dpx;

    fn read_info(path: &Path, config: &IoConfig) -> IoResult<StillInfo> {
        let mut buf = vec![0u8; HEADER_SIZE];
        File::open(path)?
            .read_exact(&mut buf)
            .map_err(|e| IoError::truncated(e, "DPX header"))?;
        let header = Header::parse(&buf)?;
        Ok(StillInfo {
            tags: header.tags(config),
            image: header.image,
            speed: header.speed,
        })
    }

    fn read(path: &Path, config: &IoConfig) -> IoResult<ImageBuffer> {
        decode(&std::fs::read(path)?, config)
    }
}

/// Opens a DPX file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Dpx(DpxReader::open(path, config)?))
}

/// Writes an image as DPX.
///
/// L, RGB and RGBA are written as-is at 8, 10 (RGB) or 16 bits; LA gains
/// an opaque alpha as RGBA and deeper or float data is stored at 16 bits.
pub fn write(path: &Path, image: &ImageBuffer, config: &IoConfig) -> IoResult<()> {
    let bytes = encode(image, config)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

// === Tests ===
