//! Maya IFF (`.iff`, `.z`) support.
//!
//! A `FOR4`/`CIMG` form holding a `TBHD` header, an optional `AUTH` chunk
//! and a `FOR4`/`TBMP` form of `RGBA` tiles. RGB and RGBA at 8 or 16 bits
//! per channel, big-endian. Raw tiles store each pixel with its channels
//! reversed; compressed tiles store one run-length encoded byte plane per
//! channel byte, last plane first. A tile is compressed when its chunk is
//! smaller than the raw pixels would be.
//!
//! The writer cuts 64x64 tiles and falls back to raw storage for any tile
//! that run-length encoding does not shrink.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, WriteBytesExt};
use reel_core::convert::convert_into;
use reel_core::{get_int_type, DataType, Endian, ImageBuffer, ImageInfo, Layout, Size, Tags};
use tracing::{debug, trace};

use crate::config::{Compression, IoConfig};
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{rle, IoError, IoResult};

const FLAG_RGB: u32 = 0x1;
const FLAG_ALPHA: u32 = 0x2;
const FLAG_12BIT: u32 = 0x2000;
const TILE: usize = 64;
const TILE_HEADER: usize = 8;
const HEADER_BYTES: u64 = 64 * 1024;

fn align4(n: usize) -> usize {
    (n + 3) & !3
}

/// Returns the chunk at `at` and the offset of the next one.
fn next_chunk(data: &[u8], at: usize) -> IoResult<Option<(&[u8], &[u8], usize)>> {
    let Some(head) = data.get(at..at + 8) else {
        return Ok(None);
    };
    let size = BigEndian::read_u32(&head[4..8]) as usize;
    let body = data.get(at + 8..at + 8 + size).ok_or_else(|| {
        IoError::CorruptData(format!(
            "IFF chunk {} truncated",
            String::from_utf8_lossy(&head[..4])
        ))
    })?;
    Ok(Some((&head[..4], body, at + 8 + align4(size))))
}

#[derive(Debug, Clone)]
struct Header {
    image: ImageInfo,
    channels: usize,
    bytes: usize,
    creator: Option<String>,
    /// Offset of the first chunk after the header chunks.
    body_at: usize,
}

impl Header {
    /// Reads the header chunks, stopping at the first nested form.
    fn parse(data: &[u8]) -> IoResult<Self> {
        if data.len() < 12 || &data[0..4] != b"FOR4" || &data[8..12] != b"CIMG" {
            return Err(IoError::CorruptData("not an IFF image".into()));
        }
        let mut tbhd = None;
        let mut creator = None;
        let mut at = 12;
        while data.get(at..at + 4).is_some_and(|tag| tag != b"FOR4") {
            let Some((tag, body, next)) = next_chunk(data, at)? else {
                break;
            };
            match tag {
                b"TBHD" => tbhd = Some(body),
                b"AUTH" => {
                    let end = body.iter().position(|&c| c == 0).unwrap_or(body.len());
                    let text = String::from_utf8_lossy(&body[..end]).trim().to_string();
                    creator = (!text.is_empty()).then_some(text);
                }
                _ => {}
            }
            at = next;
        }
        let tbhd = tbhd.ok_or_else(|| IoError::CorruptData("IFF without TBHD".into()))?;
        if tbhd.len() < 24 {
            return Err(IoError::CorruptData("IFF TBHD too short".into()));
        }

        let width = BigEndian::read_u32(&tbhd[0..4]);
        let height = BigEndian::read_u32(&tbhd[4..8]);
        let flags = BigEndian::read_u32(&tbhd[12..16]);
        let depth = BigEndian::read_u16(&tbhd[16..18]);
        if width == 0 || height == 0 {
            return Err(IoError::CorruptData(format!("invalid IFF size {width}x{height}")));
        }
        let size = Size::from_u32(width, height)
            .map_err(|_| IoError::UnsupportedVariant(format!("IFF size {width}x{height}")))?;

        let channels = match (flags & FLAG_RGB != 0, flags & FLAG_ALPHA != 0) {
            (true, false) => 3,
            (true, true) => 4,
            _ => {
                return Err(IoError::UnsupportedVariant(format!("IFF flags {flags:#x}")));
            }
        };
        // 12-bit data is carried in 16-bit samples.
        let bytes = if depth == 0 && flags & FLAG_12BIT == 0 { 1 } else { 2 };
        let image = ImageInfo::new(size, get_int_type(channels, bytes as u8 * 8))
            .with_layout(Layout {
                endian: Endian::Msb,
                ..Layout::default()
            });

        Ok(Self {
            image,
            channels,
            bytes,
            creator,
            body_at: at,
        })
    }
}

/// Output byte offset within a pixel of compressed plane `c`.
///
/// For 16-bit data, planes below `channels` hold low bytes and the rest
/// hold high bytes.
fn plane_offset(c: usize, channels: usize, bytes: usize) -> usize {
    match bytes {
        1 => c,
        _ if c < channels => c * 2 + 1,
        _ => (c - channels) * 2,
    }
}

/// Decodes one `RGBA` tile chunk into `pixels`.
fn decode_tile(body: &[u8], header: &Header, pixels: &mut [u8]) -> IoResult<()> {
    let corrupt = |what: &str| IoError::CorruptData(format!("IFF tile {what}"));
    let coords = body.get(..TILE_HEADER).ok_or_else(|| corrupt("truncated"))?;
    let xmin = BigEndian::read_u16(&coords[0..2]) as usize;
    let ymin = BigEndian::read_u16(&coords[2..4]) as usize;
    let xmax = BigEndian::read_u16(&coords[4..6]) as usize;
    let ymax = BigEndian::read_u16(&coords[6..8]) as usize;
    let (w, h) = (header.image.size.w as usize, header.image.size.h as usize);
    if xmin > xmax || ymin > ymax || xmax >= w || ymax >= h {
        return Err(corrupt("outside the image"));
    }
    let (tw, th) = (xmax - xmin + 1, ymax - ymin + 1);
    let (channels, bytes) = (header.channels, header.bytes);
    let pixel = channels * bytes;
    let payload = &body[TILE_HEADER..];
    let at = |k: usize| ((ymin + k / tw) * w + xmin + k % tw) * pixel;

    if payload.len() < tw * th * pixel {
        let mut plane = vec![0u8; tw * th];
        let mut i = 0;
        for c in (0..pixel).rev() {
            let input = payload.get(i..).unwrap_or_default();
            i += rle::decode(input, &mut plane, 1).ok_or_else(|| corrupt("RLE data is short"))?;
            let offset = plane_offset(c, channels, bytes);
            for (k, &value) in plane.iter().enumerate() {
                pixels[at(k) + offset] = value;
            }
        }
    } else {
        for (k, src) in payload.chunks_exact(pixel).take(tw * th).enumerate() {
            let dst = &mut pixels[at(k)..at(k) + pixel];
            for c in 0..channels {
                let from = (channels - 1 - c) * bytes;
                dst[c * bytes..(c + 1) * bytes].copy_from_slice(&src[from..from + bytes]);
            }
        }
    }
    Ok(())
}

/// Decodes an IFF file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    let header = Header::parse(data)?;
    let mut pixels = vec![0u8; header.image.data_byte_count()];
    let mut tiles = 0;

    let mut at = header.body_at;
    while let Some((tag, body, next)) = next_chunk(data, at)? {
        at = next;
        if tag != b"FOR4" || body.get(..4) != Some(b"TBMP".as_slice()) {
            continue;
        }
        let mut inner = 4;
        while let Some((tag, tile, next)) = next_chunk(body, inner)? {
            inner = next;
            if tag == b"RGBA" {
                decode_tile(tile, &header, &mut pixels)?;
                tiles += 1;
            }
        }
    }
    if tiles == 0 {
        return Err(IoError::CorruptData("IFF without RGBA tiles".into()));
    }
    trace!(
        width = header.image.size.w,
        height = header.image.size.h,
        channels = header.channels,
        tiles,
        "IFF decode"
    );

    let mut image = ImageBuffer::from_vec(header.image, pixels)?;
    if let Some(creator) = header.creator {
        image.tags_mut().set("Creator", creator);
    }
    Ok(image)
}

/// Appends a chunk, padded to four bytes.
fn put_chunk(out: &mut Vec<u8>, tag: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
    out.resize(align4(out.len()), 0);
}

/// Appends a form header and returns where its size goes.
fn begin_form(out: &mut Vec<u8>, kind: &[u8; 4]) -> usize {
    out.extend_from_slice(b"FOR4");
    let at = out.len();
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(kind);
    at
}

fn end_form(out: &mut [u8], at: usize) {
    let size = (out.len() - at - 4) as u32;
    BigEndian::write_u32(&mut out[at..at + 4], size);
}

/// Encodes an image as an IFF file.
///
/// Luminance is widened to RGB; 8-bit data stays 8-bit and everything else
/// is stored at 16 bits. A `Creator` tag becomes the `AUTH` chunk.
pub fn encode(image: &ImageBuffer, config: &IoConfig) -> IoResult<Vec<u8>> {
    let info = image.info();
    if !info.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an empty image".into()));
    }
    let alpha = matches!(info.pixel_type.channel_count(), 2 | 4);
    let channels = if alpha { 4 } else { 3 };
    let bytes = if info.pixel_type.data_type() == DataType::U8 { 1 } else { 2 };
    let stored_info = ImageInfo::new(info.size, get_int_type(channels, bytes as u8 * 8))
        .with_layout(Layout {
            endian: Endian::Msb,
            ..Layout::default()
        });
    let mut stored = ImageBuffer::new(stored_info);
    convert_into(image, &mut stored)?;

    let (w, h) = (info.size.w as usize, info.size.h as usize);
    let tiles = w.div_ceil(TILE) * h.div_ceil(TILE);
    let tile_count = u16::try_from(tiles)
        .map_err(|_| IoError::UnsupportedVariant(format!("IFF with {tiles} tiles")))?;
    let compress = config.iff.compression == Compression::Rle;
    let pixel = channels * bytes;
    let data = stored.data();

    let mut out = Vec::new();
    let form = begin_form(&mut out, b"CIMG");
    let mut tbhd = Vec::with_capacity(32);
    tbhd.write_u32::<BigEndian>(w as u32)?;
    tbhd.write_u32::<BigEndian>(h as u32)?;
    tbhd.write_u16::<BigEndian>(1)?;
    tbhd.write_u16::<BigEndian>(1)?;
    tbhd.write_u32::<BigEndian>(if alpha { FLAG_RGB | FLAG_ALPHA } else { FLAG_RGB })?;
    tbhd.write_u16::<BigEndian>(bytes as u16 - 1)?;
    tbhd.write_u16::<BigEndian>(tile_count)?;
    tbhd.write_u32::<BigEndian>(compress as u32)?;
    tbhd.write_u32::<BigEndian>(0)?;
    tbhd.write_u32::<BigEndian>(0)?;
    put_chunk(&mut out, b"TBHD", &tbhd);
    if let Some(creator) = image.tags().get("Creator") {
        put_chunk(&mut out, b"AUTH", creator.as_bytes());
    }

    let tbmp = begin_form(&mut out, b"TBMP");
    let mut packed = 0;
    for ymin in (0..h).step_by(TILE) {
        for xmin in (0..w).step_by(TILE) {
            let (xmax, ymax) = ((xmin + TILE).min(w) - 1, (ymin + TILE).min(h) - 1);
            let (tw, th) = (xmax - xmin + 1, ymax - ymin + 1);
            let at = |k: usize| ((ymin + k / tw) * w + xmin + k % tw) * pixel;

            let mut body = Vec::with_capacity(TILE_HEADER + tw * th * pixel);
            for v in [xmin, ymin, xmax, ymax] {
                body.write_u16::<BigEndian>(v as u16)?;
            }
            let mut rle_data = Vec::new();
            if compress {
                let mut plane = vec![0u8; tw * th];
                for c in (0..pixel).rev() {
                    let offset = plane_offset(c, channels, bytes);
                    for (k, value) in plane.iter_mut().enumerate() {
                        *value = data[at(k) + offset];
                    }
                    rle::encode(&plane, 1, &mut rle_data);
                }
            }
            if compress && rle_data.len() < tw * th * pixel {
                body.extend_from_slice(&rle_data);
                packed += 1;
            } else {
                for k in 0..tw * th {
                    let src = &data[at(k)..at(k) + pixel];
                    for c in (0..channels).rev() {
                        body.extend_from_slice(&src[c * bytes..(c + 1) * bytes]);
                    }
                }
            }
            put_chunk(&mut out, b"RGBA", &body);
        }
    }
    end_form(&mut out, tbmp);
    end_form(&mut out, form);
    trace!(tiles, packed, "IFF encode");
    Ok(out)
}

/// Writes an image as IFF.
pub fn write(path: &Path, image: &ImageBuffer, config: &IoConfig) -> IoResult<()> {
    let bytes = encode(image, config)?;
    std::fs::write(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "IFF written");
    Ok(())
}

/// Maya IFF still codec.
#[derive(Debug)]
pub struct IffCodec;

/// IFF file or sequence handle.
pub type IffReader = StillReader<IffCodec>;

impl StillCodec for IffCodec {
    const KIND: PluginKind = PluginKind::Iff;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let mut buf = Vec::new();
        File::open(path)?.take(HEADER_BYTES).read_to_end(&mut buf)?;
        let header = Header::parse(&buf)?;
        let mut tags = Tags::new();
        if let Some(creator) = header.creator {
            tags.set("Creator", creator);
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

/// Opens an IFF file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Iff(IffReader::open(path, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use reel_core::PixelType;

    fn tbhd(w: u32, h: u32, flags: u32, depth: u16) -> Vec<u8> {
        let mut b = Vec::new();
        b.extend_from_slice(&w.to_be_bytes());
        b.extend_from_slice(&h.to_be_bytes());
        b.extend_from_slice(&[0, 1, 0, 1]);
        b.extend_from_slice(&flags.to_be_bytes());
        b.extend_from_slice(&depth.to_be_bytes());
        b.extend_from_slice(&1u16.to_be_bytes());
        b.extend_from_slice(&[0; 4]);
        b
    }

    fn file(header: &[u8], tiles: &[Vec<u8>]) -> Vec<u8> {
        let mut out = Vec::new();
        let form = begin_form(&mut out, b"CIMG");
        put_chunk(&mut out, b"TBHD", header);
        put_chunk(&mut out, b"AUTH", b"lighting\0");
        let tbmp = begin_form(&mut out, b"TBMP");
        for tile in tiles {
            put_chunk(&mut out, b"RGBA", tile);
        }
        end_form(&mut out, tbmp);
        end_form(&mut out, form);
        out
    }

    fn tile(xmin: u16, ymin: u16, xmax: u16, ymax: u16, payload: &[u8]) -> Vec<u8> {
        let mut b = Vec::new();
        for v in [xmin, ymin, xmax, ymax] {
            b.extend_from_slice(&v.to_be_bytes());
        }
        b.extend_from_slice(payload);
        b
    }

    #[test]
    fn test_raw_tile_reverses_channels() {
        let data = file(
            &tbhd(2, 1, FLAG_RGB | FLAG_ALPHA, 0),
            &[tile(0, 0, 1, 0, &[4, 3, 2, 1, 40, 30, 20, 10])],
        );
        let img = decode(&data).unwrap();
        assert_eq!(img.pixel_type(), PixelType::RGBA_U8);
        assert_eq!(img.data(), &[1, 2, 3, 4, 10, 20, 30, 40]);
        assert_eq!(img.tags().get("Creator"), Some("lighting"));
    }

    #[test]
    fn test_compressed_tile_planes() {
        // 2x2 RGB, planes B, G, R: each a run of four.
        let payload = [0x83, 30, 0x83, 20, 0x83, 10];
        let data = file(&tbhd(2, 2, FLAG_RGB, 0), &[tile(0, 0, 1, 1, &payload)]);
        let img = decode(&data).unwrap();
        assert_eq!(img.pixel_type(), PixelType::RGB_U8);
        assert_eq!(img.data(), &[10u8, 20, 30].repeat(4)[..]);
    }

    #[test]
    fn test_compressed_16bit_planes() {
        // 4x1 RGB: high byte planes blue first, then low byte planes.
        let payload = [0x83, 0xa2, 0x83, 0xa1, 0x83, 0xa0, 0x83, 0xb2, 0x83, 0xb1, 0x83, 0xb0];
        let header = tbhd(4, 1, FLAG_RGB, 1);
        let data = file(&header, &[tile(0, 0, 3, 0, &payload)]);
        let img = decode(&data).unwrap();
        assert_eq!(img.pixel_type(), PixelType::RGB_U16);
        assert_eq!(img.pixel(3, 0), &[0xa0, 0xb0, 0xa1, 0xb1, 0xa2, 0xb2]);
        let native = img.normalize_layout();
        let red = u16::from_ne_bytes([native.data()[0], native.data()[1]]);
        assert_eq!(red, 0xa0b0);
    }

    #[test]
    fn test_plane_offset() {
        let rgba: Vec<_> = (0..8).map(|c| plane_offset(c, 4, 2)).collect();
        assert_eq!(rgba, vec![1, 3, 5, 7, 0, 2, 4, 6]);
        let rgb: Vec<_> = (0..6).map(|c| plane_offset(c, 3, 2)).collect();
        assert_eq!(rgb, vec![1, 3, 5, 0, 2, 4]);
        assert_eq!(plane_offset(2, 3, 1), 2);
    }

    #[test]
    fn test_write_read() {
        let mut src = ImageBuffer::new(ImageInfo::new(Size::new(70, 66), PixelType::RGBA_U16));
        for (i, b) in src.data_mut().iter_mut().enumerate() {
            *b = (i / 64) as u8;
        }
        src.tags_mut().set("Creator", "comp");

        for compression in [Compression::None, Compression::Rle] {
            let mut config = IoConfig::default();
            config.iff.compression = compression;
            let bytes = encode(&src, &config).unwrap();
            let back = decode(&bytes).unwrap();
            assert_eq!(back.pixel_type(), PixelType::RGBA_U16);
            assert_eq!(back.normalize_layout().data(), src.data());
            assert_eq!(back.tags().get("Creator"), Some("comp"));
        }

        // Noise does not shrink under RLE and falls back to raw tiles.
        let mut noise = ImageBuffer::new(ImageInfo::new(Size::new(5, 3), PixelType::L_U8));
        for (i, b) in noise.data_mut().iter_mut().enumerate() {
            *b = (i * 37 % 251) as u8;
        }
        let bytes = encode(&noise, &IoConfig::default()).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.pixel_type(), PixelType::RGB_U8);
        assert_eq!(back.pixel(4, 2), &[noise.data()[14]; 3]);
    }

    #[test]
    fn test_rejects() {
        let no_header = file(&[], &[]);
        assert_eq!(decode(&no_header).unwrap_err().kind(), ErrorKind::CorruptData);

        let alpha_only = file(&tbhd(1, 1, FLAG_ALPHA, 0), &[]);
        assert_eq!(decode(&alpha_only).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let outside = file(&tbhd(2, 2, FLAG_RGB, 0), &[tile(0, 0, 2, 0, &[0; 9])]);
        assert_eq!(decode(&outside).unwrap_err().kind(), ErrorKind::CorruptData);

        let short_rle = file(&tbhd(2, 2, FLAG_RGB, 0), &[tile(0, 0, 1, 1, &[0x83, 1])]);
        assert_eq!(decode(&short_rle).unwrap_err().kind(), ErrorKind::CorruptData);

        let no_tiles = file(&tbhd(2, 2, FLAG_RGB, 0), &[]);
        assert_eq!(decode(&no_tiles).unwrap_err().kind(), ErrorKind::CorruptData);

        let huge = file(&tbhd(70_000, 1, FLAG_RGB, 0), &[]);
        assert_eq!(decode(&huge).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let mut truncated = file(&tbhd(2, 2, FLAG_RGB, 0), &[tile(0, 0, 1, 1, &[0; 12])]);
        truncated.truncate(truncated.len() - 6);
        assert_eq!(decode(&truncated).unwrap_err().kind(), ErrorKind::CorruptData);
    }
}
