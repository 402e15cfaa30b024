//! Kodak Cineon format support.
//!
//! The film-scanner predecessor of DPX. Only the layout every scanner
//! actually produced is handled: three channels of 10-bit printing density
//! packed into 32-bit words, which decodes straight to `RGB_U10`.
//!
//! - Magic: `0x802A5FD7`, in either byte order
//! - Header: 1024-byte generic section, 1024-byte industry section
//! - Writes are always big-endian with the data at offset 2048

use std::fs::File;
use std::io::Read;
use std::path::Path;

use reel_core::convert::convert_into;
use reel_core::time::keycode_to_string;
use reel_core::{Endian, ImageBuffer, ImageInfo, Keycode, Layout, Mirror, PixelType, Size, Speed, Tags};
use tracing::{debug, trace};

use crate::config::{ColorProfile, IoConfig};
use crate::header::{
    read_tags, valid_f32, valid_u32, valid_u8, write_tags, write_text_at,
    write_u32_at, Field, Fields,
};
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{IoError, IoResult};

const MAGIC: u32 = 0x802A_5FD7;
const MAGIC_SWAPPED: u32 = 0xD75F_2A80;
const HEADER_SIZE: usize = 2048;

/// Tag carrying the colour interpretation of decoded code values.
pub const COLOR_PROFILE_TAG: &str = "Color Profile";

// File section.
const IMAGE_OFFSET: usize = 4;
const GENERIC_HEADER_SIZE: usize = 8;
const INDUSTRY_HEADER_SIZE: usize = 12;
const USER_HEADER_SIZE: usize = 16;
const FILE_SIZE: usize = 20;
const VERSION: usize = 24;
const FILE_NAME: usize = 32;
// Image section.
const ORIENT: usize = 192;
const CHANNEL_COUNT: usize = 193;
const CHANNELS: usize = 196;
const CHANNEL_STRIDE: usize = 28;
const LABEL: usize = 452;
const INTERLEAVE: usize = 680;
const PACKING: usize = 681;
const DATA_SIGN: usize = 682;
const DATA_SENSE: usize = 683;
const LINE_PADDING: usize = 684;
const CHANNEL_PADDING: usize = 688;
// Source section.
const SOURCE_OFFSET: usize = 712;
const SOURCE_PITCH: usize = 972;
const SOURCE_GAMMA: usize = 980;
// Film section.
const FILM_ID: usize = 1024;
const FILM_TYPE: usize = 1025;
const FILM_OFFSET: usize = 1026;
const FILM_PREFIX: usize = 1028;
const FILM_COUNT: usize = 1032;
const FILM_FRAME_RATE: usize = 1072;

// Offsets within one channel record.
const CH_DESCRIPTOR: usize = 1;
const CH_BIT_DEPTH: usize = 2;
const CH_WIDTH: usize = 4;
const CH_HEIGHT: usize = 8;
const CH_LOW_DATA: usize = 12;
const CH_LOW_QUANTITY: usize = 16;
const CH_HIGH_DATA: usize = 20;
const CH_HIGH_QUANTITY: usize = 24;

/// Channel descriptor codes (second descriptor byte).
const DESCRIPTOR_LUMINANCE: u8 = 0;
const DESCRIPTOR_RED_FILM_PRINT: u8 = 1;

const INT_UNSET: u32 = 0x8000_0000;
const FLOAT_UNSET: u32 = 0x7F80_0000;

const TEXT_FIELDS: &[(usize, usize)] = &[
    (VERSION, 8),
    (FILE_NAME, 100),
    (132, 24),
    (LABEL, 200),
    (720, 100),
    (820, 24),
    (844, 64),
    (908, 32),
    (940, 32),
    (1036, 32),
    (1076, 32),
    (1108, 200),
];

const TAGS: &[(&str, Field)] = &[
    ("Time", Field::Text(132, 24)),
    ("Source Offset", Field::I32Pair(SOURCE_OFFSET)),
    ("Source File", Field::Text(720, 100)),
    ("Source Time", Field::Text(820, 24)),
    ("Source Input Device", Field::Text(844, 64)),
    ("Source Input Model", Field::Text(908, 32)),
    ("Source Input Serial", Field::Text(940, 32)),
    ("Source Input Pitch", Field::F32Pair(SOURCE_PITCH)),
    ("Source Gamma", Field::F32(SOURCE_GAMMA)),
    ("Film Format", Field::Text(1036, 32)),
    ("Film Frame", Field::U32(1068)),
    ("Film Frame Rate", Field::F32(FILM_FRAME_RATE)),
    ("Film Frame ID", Field::Text(1076, 32)),
    ("Film Slate", Field::Text(1108, 200)),
];

/// Sets [`COLOR_PROFILE_TAG`] from the configured profile, or from the file
/// when the configuration leaves it to the file.
pub(crate) fn set_color_profile(tags: &mut Tags, film_print: bool, config: &IoConfig) {
    let profile = match config.cineon.color_profile {
        ColorProfile::Auto if film_print => Some("FilmPrint"),
        ColorProfile::Auto => None,
        ColorProfile::Raw => Some("Raw"),
        ColorProfile::FilmPrint => Some("FilmPrint"),
    };
    if let Some(p) = profile {
        tags.set(COLOR_PROFILE_TAG, p);
    }
}

/// Whether a writer should label its output as printing density.
pub(crate) fn wants_film_print(tags: &Tags, config: &IoConfig) -> bool {
    match config.cineon.color_profile {
        ColorProfile::Auto => tags.get(COLOR_PROFILE_TAG) == Some("FilmPrint"),
        ColorProfile::Raw => false,
        ColorProfile::FilmPrint => true,
    }
}

#[derive(Debug, Clone)]
struct Header {
    endian: Endian,
    image_offset: usize,
    image: ImageInfo,
    film_print: bool,
    tags: Tags,
    speed: Option<Speed>,
}

impl Header {
    fn parse(buf: &[u8]) -> IoResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IoError::CorruptData("Cineon header: unexpected end of file".into()));
        }
        let magic = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let big_endian = match magic {
            MAGIC => true,
            MAGIC_SWAPPED => false,
            _ => return Err(IoError::CorruptData(format!("invalid Cineon magic: 0x{magic:08X}"))),
        };
        let f = Fields::new(buf, big_endian);

        let count = f.u8(CHANNEL_COUNT) as usize;
        if count == 0 || count > 8 {
            return Err(IoError::CorruptData(format!("Cineon with {count} channels")));
        }
        let ch = |i: usize, off: usize| CHANNELS + i * CHANNEL_STRIDE + off;
        let (w, h, bits) = (f.u32(ch(0, CH_WIDTH)), f.u32(ch(0, CH_HEIGHT)), f.u8(ch(0, CH_BIT_DEPTH)));
        let uniform = (1..count).all(|i| {
            f.u32(ch(i, CH_WIDTH)) == w && f.u32(ch(i, CH_HEIGHT)) == h && f.u8(ch(i, CH_BIT_DEPTH)) == bits
        });
        if !uniform {
            return Err(IoError::UnsupportedVariant(
                "Cineon channels differ in size or bit depth".into(),
            ));
        }
        if count != 3 || bits != 10 {
            return Err(IoError::UnsupportedVariant(format!(
                "Cineon with {count} channels of {bits} bits"
            )));
        }
        for (what, off) in [("line", LINE_PADDING), ("channel", CHANNEL_PADDING)] {
            let pad = f.u32(off);
            if valid_u32(pad) && pad != 0 {
                return Err(IoError::UnsupportedVariant(format!("Cineon {what} padding")));
            }
        }
        if w == 0 || h == 0 {
            return Err(IoError::CorruptData(format!("invalid Cineon size {w}x{h}")));
        }
        let size = Size::from_u32(w, h)
            .map_err(|_| IoError::UnsupportedVariant(format!("Cineon size {w}x{h}")))?;

        let mirror = match f.u8(ORIENT) {
            1 => Mirror { x: false, y: true },
            2 => Mirror { x: true, y: false },
            3 => Mirror { x: true, y: true },
            _ => Mirror::default(),
        };
        let endian = if big_endian { Endian::Msb } else { Endian::Lsb };
        let image = ImageInfo::new(size, PixelType::RGB_U10).with_layout(Layout {
            mirror,
            alignment: 1,
            endian,
        });

        let mut tags = Tags::new();
        read_tags(&f, TAGS, &mut tags);
        let (id, kind, offset) = (f.u8(FILM_ID), f.u8(FILM_TYPE), f.u8(FILM_OFFSET));
        let (prefix, film_count) = (f.u32(FILM_PREFIX), f.u32(FILM_COUNT));
        if valid_u8(id) && valid_u8(kind) && valid_u8(offset) && valid_u32(prefix) && valid_u32(film_count) {
            tags.set(
                "Keycode",
                keycode_to_string(id.into(), kind.into(), prefix as i32, film_count as i32, offset.into()),
            );
        }
        let rate = f.f32(FILM_FRAME_RATE);
        let speed = (valid_f32(rate) && rate >= 0.000_001).then(|| Speed::from_fps(rate));

        Ok(Self {
            endian,
            image_offset: f.u32(IMAGE_OFFSET) as usize,
            image,
            film_print: f.u8(ch(0, CH_DESCRIPTOR)) == DESCRIPTOR_RED_FILM_PRINT,
            tags,
            speed,
        })
    }

    fn tags(&self, config: &IoConfig) -> Tags {
        let mut tags = self.tags.clone();
        set_color_profile(&mut tags, self.film_print, config);
        tags
    }
}

/// Decodes a Cineon file held in memory.
pub fn decode(data: &[u8], config: &IoConfig) -> IoResult<ImageBuffer> {
    let header = Header::parse(data)?;
    let expected = header.image.data_byte_count();
    let pixels = header
        .image_offset
        .checked_add(expected)
        .filter(|&end| end <= data.len())
        .map(|end| &data[header.image_offset..end])
        .ok_or_else(|| IoError::CorruptData("incomplete Cineon file".into()))?;
    trace!(size = ?header.image.size, endian = ?header.endian, "Cineon decode");

    let mut image = ImageBuffer::from_vec(header.image.clone(), pixels.to_vec())?;
    image.set_tags(header.tags(config));
    Ok(image)
}

/// Encodes an image as a big-endian 10-bit Cineon file.
pub fn encode(image: &ImageBuffer, config: &IoConfig) -> IoResult<Vec<u8>> {
    let info = image.info();
    if !info.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an empty image".into()));
    }
    let out_info = ImageInfo::new(info.size, PixelType::RGB_U10).with_layout(Layout {
        mirror: Mirror::default(),
        alignment: 1,
        endian: Endian::Msb,
    });
    let mut pixels = ImageBuffer::new(out_info);
    convert_into(image, &mut pixels)?;

    let mut buf = vec![0xffu8; HEADER_SIZE];
    for &(off, len) in TEXT_FIELDS {
        buf[off..off + len].fill(0);
    }
    for i in 0..8 {
        let base = CHANNELS + i * CHANNEL_STRIDE;
        write_u32_at(&mut buf, base + CH_LOW_DATA, INT_UNSET, true);
        write_u32_at(&mut buf, base + CH_LOW_QUANTITY, FLOAT_UNSET, true);
        write_u32_at(&mut buf, base + CH_HIGH_DATA, INT_UNSET, true);
        write_u32_at(&mut buf, base + CH_HIGH_QUANTITY, FLOAT_UNSET, true);
    }
    write_u32_at(&mut buf, SOURCE_OFFSET, INT_UNSET, true);
    write_u32_at(&mut buf, SOURCE_OFFSET + 4, INT_UNSET, true);
    for off in [SOURCE_PITCH, SOURCE_PITCH + 4, SOURCE_GAMMA, FILM_FRAME_RATE] {
        write_u32_at(&mut buf, off, FLOAT_UNSET, true);
    }

    let total = HEADER_SIZE + pixels.byte_count();
    write_u32_at(&mut buf, 0, MAGIC, true);
    write_u32_at(&mut buf, IMAGE_OFFSET, HEADER_SIZE as u32, true);
    write_u32_at(&mut buf, GENERIC_HEADER_SIZE, 1024, true);
    write_u32_at(&mut buf, INDUSTRY_HEADER_SIZE, 1024, true);
    write_u32_at(&mut buf, USER_HEADER_SIZE, 0, true);
    write_u32_at(&mut buf, FILE_SIZE, total as u32, true);
    write_text_at(&mut buf, VERSION, 8, "V4.5");

    let film_print = wants_film_print(image.tags(), config);
    buf[ORIENT] = 0;
    buf[CHANNEL_COUNT] = 3;
    for i in 0..3u8 {
        let base = CHANNELS + i as usize * CHANNEL_STRIDE;
        buf[base] = 0;
        buf[base + CH_DESCRIPTOR] = if film_print {
            DESCRIPTOR_RED_FILM_PRINT + i
        } else {
            DESCRIPTOR_LUMINANCE
        };
        buf[base + CH_BIT_DEPTH] = 10;
        write_u32_at(&mut buf, base + CH_WIDTH, u32::from(info.size.w), true);
        write_u32_at(&mut buf, base + CH_HEIGHT, u32::from(info.size.h), true);
        write_u32_at(&mut buf, base + CH_LOW_DATA, 0, true);
        write_u32_at(&mut buf, base + CH_HIGH_DATA, 1023, true);
    }
    buf[INTERLEAVE] = 0;
    buf[PACKING] = 5;
    buf[DATA_SIGN] = 0;
    buf[DATA_SENSE] = 0;
    write_u32_at(&mut buf, LINE_PADDING, 0, true);
    write_u32_at(&mut buf, CHANNEL_PADDING, 0, true);

    write_tags(&mut buf, TAGS, image.tags(), true);
    if let Some(k) = image.tags().get("Keycode").and_then(|k| k.parse::<Keycode>().ok()) {
        if let (Ok(id), Ok(kind), Ok(offset)) =
            (u8::try_from(k.id), u8::try_from(k.kind), u8::try_from(k.offset))
        {
            buf[FILM_ID] = id;
            buf[FILM_TYPE] = kind;
            buf[FILM_OFFSET] = offset;
            write_u32_at(&mut buf, FILM_PREFIX, k.prefix as u32, true);
            write_u32_at(&mut buf, FILM_COUNT, k.count as u32, true);
        }
    }

    debug!(size = ?info.size, film_print, "Cineon encode");
    buf.extend_from_slice(pixels.data());
    Ok(buf)
}

/// Cineon still codec.
#[derive(Debug)]
pub struct CineonCodec;

/// Cineon file or sequence handle.
pub type CineonReader = StillReader<CineonCodec>;

impl StillCodec for CineonCodec {
    const KIND: PluginKind = PluginKind::Cineon;

    fn read_info(path: &Path, config: &IoConfig) -> IoResult<StillInfo> {
        let mut buf = vec![0u8; HEADER_SIZE];
        File::open(path)?
            .read_exact(&mut buf)
            .map_err(|e| IoError::truncated(e, "Cineon header"))?;
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

/// Opens a Cineon file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Cineon(CineonReader::open(path, config)?))
}

/// Writes an image as 10-bit Cineon; any pixel type is converted to `RGB_U10`.
pub fn write(path: &Path, image: &ImageBuffer, config: &IoConfig) -> IoResult<()> {
    std::fs::write(path, encode(image, config)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use reel_core::convert::convert_image;
    use reel_core::U10;

    fn ramp(w: u16, h: u16) -> ImageBuffer {
        let mut img = ImageBuffer::new(ImageInfo::new(Size::new(w, h), PixelType::RGB_U16));
        for (i, px) in img.data_mut().chunks_exact_mut(6).enumerate() {
            let v = (i * 64 % 65536) as u16;
            px[0..2].copy_from_slice(&v.to_ne_bytes());
            px[2..4].copy_from_slice(&(v / 2).to_ne_bytes());
            px[4..6].copy_from_slice(&(65535 - v).to_ne_bytes());
        }
        img
    }

    #[test]
    fn test_roundtrip() {
        let src = convert_image(&ramp(32, 8), PixelType::RGB_U10).unwrap();
        let c = IoConfig::default();
        let bytes = encode(&src, &c).unwrap();
        assert_eq!(&bytes[..4], &[0x80, 0x2a, 0x5f, 0xd7]);
        assert_eq!(bytes.len(), HEADER_SIZE + 32 * 8 * 4);

        let back = decode(&bytes, &c).unwrap().normalize_layout();
        assert_eq!(back.pixel_type(), PixelType::RGB_U10);
        for (a, b) in src.data().chunks_exact(4).zip(back.data().chunks_exact(4)) {
            let wa = U10::unpack_msb(u32::from_ne_bytes(a.try_into().unwrap()));
            let wb = U10::unpack_msb(u32::from_ne_bytes(b.try_into().unwrap()));
            assert_eq!(wa, wb);
        }
    }

    #[test]
    fn test_color_profile() {
        let mut c = IoConfig::default();
        c.cineon.color_profile = ColorProfile::FilmPrint;
        let bytes = encode(&ramp(2, 2), &c).unwrap();
        assert_eq!(bytes[CHANNELS + CH_DESCRIPTOR], DESCRIPTOR_RED_FILM_PRINT);

        let auto = IoConfig::default();
        let img = decode(&bytes, &auto).unwrap();
        assert_eq!(img.tags().get(COLOR_PROFILE_TAG), Some("FilmPrint"));

        let raw = encode(&ramp(2, 2), &auto).unwrap();
        assert!(!decode(&raw, &auto).unwrap().tags().contains(COLOR_PROFILE_TAG));
    }

    #[test]
    fn test_tags_and_speed() {
        let mut img = ramp(4, 4);
        img.tags_mut().set("Film Frame Rate", "25");
        img.tags_mut().set("Source File", "scan_0001.cin");
        img.tags_mut().set("Keycode", "1:2:123456:42:3");
        let bytes = encode(&img, &IoConfig::default()).unwrap();

        let header = Header::parse(&bytes).unwrap();
        assert_eq!(header.speed, Some(Speed::from_fps(25.0)));
        assert_eq!(header.tags.get("Source File"), Some("scan_0001.cin"));
        assert_eq!(header.tags.get("Keycode"), Some("1:2:123456:42:3"));
        assert!(!header.tags.contains("Source Gamma"));
        assert!(!header.tags.contains("Source Offset"));
    }

    #[test]
    fn test_little_endian_file() {
        let bytes = encode(&ramp(3, 2), &IoConfig::default()).unwrap();
        let mut le = bytes.clone();
        // Swap every 32-bit header word the reader consults.
        for off in [0, IMAGE_OFFSET, CHANNELS + CH_WIDTH, CHANNELS + CH_HEIGHT] {
            le[off..off + 4].reverse();
        }
        for i in 1..3 {
            let base = CHANNELS + i * CHANNEL_STRIDE;
            le[base + CH_WIDTH..base + CH_WIDTH + 4].reverse();
            le[base + CH_HEIGHT..base + CH_HEIGHT + 4].reverse();
        }
        for w in le[HEADER_SIZE..].chunks_exact_mut(4) {
            w.reverse();
        }
        let header = Header::parse(&le).unwrap();
        assert_eq!(header.endian, Endian::Lsb);
        let a = decode(&bytes, &IoConfig::default()).unwrap().normalize_layout();
        let b = decode(&le, &IoConfig::default()).unwrap().normalize_layout();
        assert_eq!(a.data(), b.data());
    }

    #[test]
    fn test_rejects() {
        let c = IoConfig::default();
        let bytes = encode(&ramp(4, 4), &c).unwrap();
        assert_eq!(decode(&bytes[..HEADER_SIZE + 10], &c).unwrap_err().kind(), ErrorKind::CorruptData);

        let mut padded = bytes.clone();
        write_u32_at(&mut padded, LINE_PADDING, 4, true);
        assert_eq!(decode(&padded, &c).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let mut mixed = bytes.clone();
        mixed[CHANNELS + CHANNEL_STRIDE + CH_BIT_DEPTH] = 8;
        assert_eq!(decode(&mixed, &c).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let mut none = bytes;
        none[CHANNEL_COUNT] = 0;
        assert_eq!(decode(&none, &c).unwrap_err().kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_orientation() {
        let mut bytes = encode(&ramp(2, 2), &IoConfig::default()).unwrap();
        bytes[ORIENT] = 1;
        assert!(Header::parse(&bytes).unwrap().image.layout.mirror.y);
        bytes[ORIENT] = 2;
        let m = Header::parse(&bytes).unwrap().image.layout.mirror;
        assert!(m.x && !m.y);
    }
}
