//! Wavefront RLA (`.rla`, `.rpf`) support.
//!
//! Big-endian, bottom row first. A scanline offset table follows the
//! 740-byte header; each scanline holds every channel in turn behind a
//! 16-bit length. Integer channels are run-length encoded one byte plane
//! at a time, high byte first. Float channels are stored raw.
//!
//! The format has no signature, so files are only found by extension.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use reel_core::{
    get_float_type, get_int_type, Endian, ImageBuffer, ImageInfo, Layout, Mirror, Size, Tags,
};
use tracing::trace;

use crate::config::IoConfig;
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{IoError, IoResult};

const HEADER_SIZE: usize = 740;
const FLOAT_TYPE: i16 = 3;

#[derive(Debug, Clone)]
struct Header {
    image: ImageInfo,
    channels: usize,
    bytes: usize,
    float: bool,
    description: Option<String>,
}

impl Header {
    fn parse(buf: &[u8]) -> IoResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IoError::CorruptData("RLA header: unexpected end of file".into()));
        }
        let i16_at = |off: usize| BigEndian::read_i16(&buf[off..off + 2]);
        let (left, right, bottom, top) = (i16_at(8), i16_at(10), i16_at(12), i16_at(14));
        let color_type = i16_at(18);
        let color_channels = i16_at(20);
        let matte_channels = i16_at(22);
        let field = i16_at(612);
        let color_bits = i16_at(658);
        let matte_type = i16_at(660);
        let matte_bits = i16_at(662);

        let width = i32::from(right) - i32::from(left) + 1;
        let height = i32::from(top) - i32::from(bottom) + 1;
        if width <= 0 || height <= 0 {
            return Err(IoError::CorruptData(format!("invalid RLA size {width}x{height}")));
        }
        let size = Size::from_u32(width as u32, height as u32)
            .map_err(|_| IoError::UnsupportedVariant(format!("RLA size {width}x{height}")))?;

        if matte_channels > 1 {
            return Err(IoError::UnsupportedVariant(format!(
                "RLA with {matte_channels} matte channels"
            )));
        }
        if matte_channels == 1 && (matte_type != color_type || matte_bits != color_bits) {
            return Err(IoError::UnsupportedVariant(
                "RLA matte differs from color channels".into(),
            ));
        }
        if field != 0 {
            return Err(IoError::UnsupportedVariant("RLA fields".into()));
        }
        if !(0..=4).contains(&color_channels) {
            return Err(IoError::CorruptData(format!(
                "RLA with {color_channels} color channels"
            )));
        }
        let channels = (color_channels + matte_channels.max(0)) as usize;

        let float = color_type == FLOAT_TYPE;
        let (pixel_type, bytes) = match (float, color_bits) {
            (true, _) => (get_float_type(channels, 32), 4),
            (false, 1..=8) => (get_int_type(channels, 8), 1),
            (false, 9..=16) => (get_int_type(channels, 16), 2),
            _ => (reel_core::PixelType::None, 0),
        };
        if !pixel_type.is_valid() {
            return Err(IoError::UnsupportedVariant(format!(
                "RLA with {channels} channels of {color_bits} bits"
            )));
        }

        let image = ImageInfo::new(size, pixel_type).with_layout(Layout {
            mirror: Mirror { x: false, y: true },
            alignment: 1,
            endian: Endian::Msb,
        });
        let raw = &buf[272..400];
        let end = raw.iter().position(|&c| c == 0).unwrap_or(raw.len());
        let description = String::from_utf8_lossy(&raw[..end]).trim().to_string();

        Ok(Self {
            image,
            channels,
            bytes,
            float,
            description: (!description.is_empty()).then_some(description),
        })
    }
}

/// Expands one run-length channel into every `stride`-th byte of `out`.
///
/// Each byte plane is a series of signed counts: a count `n >= 0` repeats
/// the next byte `n + 1` times, a negative count copies `-n` bytes.
fn decode_channel(
    input: &[u8],
    out: &mut [u8],
    width: usize,
    bytes: usize,
    stride: usize,
) -> Option<()> {
    let mut i = 0;
    for b in 0..bytes {
        let mut x = 0;
        while x < width {
            let count = *input.get(i)? as i8;
            i += 1;
            if count >= 0 {
                let value = *input.get(i)?;
                i += 1;
                for _ in 0..(count as usize + 1).min(width - x) {
                    out[x * stride + b] = value;
                    x += 1;
                }
            } else {
                let n = usize::from(count.unsigned_abs());
                let src = input.get(i..i + n)?;
                i += n;
                for &value in src.iter().take(width - x) {
                    out[x * stride + b] = value;
                    x += 1;
                }
            }
        }
    }
    Some(())
}

/// Decodes an RLA file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    let header = Header::parse(data)?;
    let (w, h) = (header.image.size.w as usize, header.image.size.h as usize);
    let (channels, bytes) = (header.channels, header.bytes);
    let stride = channels * bytes;
    let mut pixels = vec![0u8; w * h * stride];

    let table = data
        .get(HEADER_SIZE..HEADER_SIZE + h * 4)
        .ok_or_else(|| IoError::CorruptData("RLA offset table truncated".into()))?;
    for (y, row) in pixels.chunks_exact_mut(w * stride).enumerate() {
        let corrupt = || IoError::CorruptData(format!("RLA scanline {y} is corrupt"));
        let mut at = usize::try_from(BigEndian::read_i32(&table[y * 4..])).map_err(|_| corrupt())?;
        for c in 0..channels {
            let len = data.get(at..at + 2).ok_or_else(corrupt)?;
            let len = usize::try_from(BigEndian::read_i16(len)).map_err(|_| corrupt())?;
            let input = data.get(at + 2..at + 2 + len).ok_or_else(corrupt)?;
            at += 2 + len;
            let out = &mut row[c * bytes..];
            if header.float {
                if input.len() < w * 4 {
                    return Err(corrupt());
                }
                for (x, sample) in input.chunks_exact(4).take(w).enumerate() {
                    out[x * stride..x * stride + 4].copy_from_slice(sample);
                }
            } else {
                decode_channel(input, out, w, bytes, stride).ok_or_else(corrupt)?;
            }
        }
    }
    trace!(width = w, height = h, channels, bytes, "RLA decode");

    let mut image = ImageBuffer::from_vec(header.image, pixels)?;
    if let Some(description) = header.description {
        image.tags_mut().set("Description", description);
    }
    Ok(image)
}

/// Wavefront RLA still codec.
#[derive(Debug)]
pub struct RlaCodec;

/// RLA file or sequence handle.
pub type RlaReader = StillReader<RlaCodec>;

impl StillCodec for RlaCodec {
    const KIND: PluginKind = PluginKind::Rla;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let mut buf = vec![0u8; HEADER_SIZE];
        File::open(path)?
            .read_exact(&mut buf)
            .map_err(|e| IoError::truncated(e, "RLA header"))?;
        let header = Header::parse(&buf)?;
        let mut tags = Tags::new();
        if let Some(description) = header.description {
            tags.set("Description", description);
        }
        Ok(StillInfo {
            image: header.image,
            tags,
            speed: None,
        })
    }

    fn read(path: &Path, _config: &IoConfig) -> IoResult<ImageBuffer> {
        decode(&std::fs::read(path)?)
    }
}

/// Opens an RLA file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Rla(RlaReader::open(path, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use reel_core::PixelType;

    fn header(w: i16, h: i16, kind: i16, color: i16, matte: i16, bits: i16) -> Vec<u8> {
        let mut b = vec![0u8; HEADER_SIZE];
        let mut put = |off: usize, v: i16| b[off..off + 2].copy_from_slice(&v.to_be_bytes());
        put(8, 0);
        put(10, w - 1);
        put(12, 0);
        put(14, h - 1);
        put(18, kind);
        put(20, color);
        put(22, matte);
        put(658, bits);
        put(660, kind);
        put(662, bits);
        b[272..278].copy_from_slice(b"beauty");
        b
    }

    /// Appends the offset table and scanlines, each a list of channel blobs.
    fn body(file: &mut Vec<u8>, rows: &[Vec<Vec<u8>>]) {
        let mut at = file.len() + rows.len() * 4;
        let mut data = Vec::new();
        for row in rows {
            file.extend_from_slice(&(at as i32).to_be_bytes());
            for blob in row {
                data.extend_from_slice(&(blob.len() as i16).to_be_bytes());
                data.extend_from_slice(blob);
                at += 2 + blob.len();
            }
        }
        file.extend_from_slice(&data);
    }

    #[test]
    fn test_rgba_u8() {
        let mut file = header(3, 1, 0, 3, 1, 8);
        body(
            &mut file,
            &[vec![
                vec![2, 9],
                vec![-3i8 as u8, 1, 2, 3],
                vec![0, 4, -2i8 as u8, 5, 6],
                vec![2, 255],
            ]],
        );
        let img = decode(&file).unwrap();
        assert_eq!(img.pixel_type(), PixelType::RGBA_U8);
        assert_eq!(img.data(), &[9, 1, 4, 255, 9, 2, 5, 255, 9, 3, 6, 255]);
        assert!(img.info().layout.mirror.y);
        assert_eq!(img.tags().get("Description"), Some("beauty"));
    }

    #[test]
    fn test_u16_planes() {
        // One channel, two pixels: high plane then low plane.
        let mut file = header(2, 2, 0, 1, 0, 16);
        let row = |hi: u8| vec![vec![1, hi, -2i8 as u8, 0x34, 0x56]];
        body(&mut file, &[row(0x12), row(0xab)]);
        let img = decode(&file).unwrap();
        assert_eq!(img.pixel_type(), PixelType::L_U16);
        assert_eq!(img.data(), &[0x12, 0x34, 0x12, 0x56, 0xab, 0x34, 0xab, 0x56]);
        let native = img.normalize_layout();
        let first = u16::from_ne_bytes([native.data()[0], native.data()[1]]);
        assert_eq!(first, 0xab34);
    }

    #[test]
    fn test_float() {
        let mut file = header(2, 1, FLOAT_TYPE, 1, 0, 32);
        let blob = [0.5f32.to_be_bytes(), 2.0f32.to_be_bytes()].concat();
        body(&mut file, &[vec![blob]]);
        let img = decode(&file).unwrap();
        assert_eq!(img.pixel_type(), PixelType::L_F32);
        let native = img.normalize_layout();
        let d = native.data();
        assert_eq!(f32::from_ne_bytes([d[4], d[5], d[6], d[7]]), 2.0);
    }

    #[test]
    fn test_rejects() {
        let two_mattes = header(1, 1, 0, 3, 2, 8);
        assert_eq!(decode(&two_mattes).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let mut mixed = header(1, 1, 0, 3, 1, 8);
        mixed[662..664].copy_from_slice(&16i16.to_be_bytes());
        assert_eq!(decode(&mixed).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let mut fields = header(1, 1, 0, 3, 0, 8);
        fields[612..614].copy_from_slice(&1i16.to_be_bytes());
        assert_eq!(decode(&fields).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let deep = header(1, 1, 0, 3, 0, 32);
        assert_eq!(decode(&deep).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let no_table = header(2, 2, 0, 1, 0, 8);
        assert_eq!(decode(&no_table).unwrap_err().kind(), ErrorKind::CorruptData);

        let mut short_run = header(4, 1, 0, 1, 0, 8);
        body(&mut short_run, &[vec![vec![1, 7]]]);
        assert_eq!(decode(&short_run).unwrap_err().kind(), ErrorKind::CorruptData);

        let empty = header(0, 1, 0, 1, 0, 8);
        assert_eq!(decode(&empty).unwrap_err().kind(), ErrorKind::CorruptData);
    }
}
