//! SGI image (`.sgi`, `.rgb`, `.rgba`, `.bw`) support.
//!
//! Big-endian, 8 or 16 bits per channel, stored channel-planar and bottom
//! row first, optionally run-length encoded per scanline. Planes are
//! interleaved on read; the bottom-up order is left to the mirror flag.
//! The writer keeps 8-bit data at 8 bits and stores everything else at 16.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use reel_core::convert::convert_into;
use reel_core::{
    get_int_type, DataType, Endian, ImageBuffer, ImageInfo, Layout, Mirror, Size, Tags,
};
use tracing::{debug, trace};

use crate::config::{Compression, IoConfig};
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{rle, IoError, IoResult};

const MAGIC: u16 = 474;
const HEADER_SIZE: usize = 512;

#[derive(Debug, Clone)]
struct Header {
    rle: bool,
    bytes: usize,
    channels: usize,
    image: ImageInfo,
    name: Option<String>,
}

impl Header {
    fn parse(buf: &[u8]) -> IoResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IoError::CorruptData("SGI header: unexpected end of file".into()));
        }
        let magic = BigEndian::read_u16(&buf[0..2]);
        if magic != MAGIC {
            return Err(IoError::CorruptData(format!("invalid SGI magic: {magic}")));
        }
        let storage = buf[2];
        let bytes = buf[3] as usize;
        let dimension = BigEndian::read_u16(&buf[4..6]);
        let width = BigEndian::read_u16(&buf[6..8]);
        let height = match dimension {
            1 => 1,
            _ => BigEndian::read_u16(&buf[8..10]),
        };
        let channels = match dimension {
            1 | 2 => 1,
            _ => BigEndian::read_u16(&buf[10..12]) as usize,
        };

        let pixel_type = match bytes {
            1 => get_int_type(channels, 8),
            2 => get_int_type(channels, 16),
            _ => reel_core::PixelType::None,
        };
        if !pixel_type.is_valid() {
            return Err(IoError::UnsupportedVariant(format!(
                "SGI with {channels} channels of {bytes} bytes"
            )));
        }
        if storage > 1 {
            return Err(IoError::UnsupportedVariant(format!("SGI storage {storage}")));
        }
        if width == 0 || height == 0 {
            return Err(IoError::CorruptData(format!("invalid SGI size {width}x{height}")));
        }

        let image = ImageInfo::new(Size::new(width, height), pixel_type).with_layout(Layout {
            mirror: Mirror { x: false, y: true },
            alignment: 1,
            endian: Endian::Msb,
        });
        let raw_name = &buf[24..104];
        let end = raw_name.iter().position(|&c| c == 0).unwrap_or(raw_name.len());
        let name = String::from_utf8_lossy(&raw_name[..end]).trim().to_string();

        Ok(Self {
            rle: storage == 1,
            bytes,
            channels,
            image,
            name: (!name.is_empty()).then_some(name),
        })
    }
}

/// Expands one RLE scanline of `bytes`-wide samples into `out`.
///
/// A control word's low seven bits give the count; with the high bit set
/// that many literal samples follow, otherwise one sample repeats. A zero
/// count ends the row.
fn decode_rle_row(input: &[u8], out: &mut [u8], bytes: usize) -> Option<()> {
    let read = |at: usize| -> Option<usize> {
        let s = input.get(at..at + bytes)?;
        Some(if bytes == 1 { s[0] as usize } else { BigEndian::read_u16(s) as usize })
    };
    let mut i = 0;
    let mut o = 0;
    while o < out.len() {
        let control = read(i)?;
        i += bytes;
        let count = control & 0x7f;
        if count == 0 {
            break;
        }
        let n = count * bytes;
        let dst = out.get_mut(o..o + n)?;
        if control & 0x80 != 0 {
            dst.copy_from_slice(input.get(i..i + n)?);
            i += n;
        } else {
            let sample = input.get(i..i + bytes)?;
            for chunk in dst.chunks_exact_mut(bytes) {
                chunk.copy_from_slice(sample);
            }
            i += bytes;
        }
        o += n;
    }
    (o == out.len()).then_some(())
}

/// Decodes an SGI file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    let header = Header::parse(data)?;
    let w = header.image.size.w as usize;
    let h = header.image.size.h as usize;
    let (bytes, channels) = (header.bytes, header.channels);
    let row = w * bytes;
    let plane = row * h;
    let mut planar = vec![0u8; plane * channels];

    if header.rle {
        let rows = h * channels;
        let tables = data
            .get(HEADER_SIZE..HEADER_SIZE + rows * 8)
            .ok_or_else(|| IoError::CorruptData("SGI RLE tables truncated".into()))?;
        for (r, out) in planar.chunks_exact_mut(row).enumerate() {
            let start = BigEndian::read_u32(&tables[r * 4..]) as usize;
            let len = BigEndian::read_u32(&tables[(rows + r) * 4..]) as usize;
            let input = data
                .get(start..start.saturating_add(len))
                .ok_or_else(|| IoError::CorruptData(format!("SGI scanline {r} out of bounds")))?;
            decode_rle_row(input, out, bytes)
                .ok_or_else(|| IoError::CorruptData(format!("SGI scanline {r} is corrupt")))?;
        }
    } else {
        let src = data
            .get(HEADER_SIZE..HEADER_SIZE + planar.len())
            .ok_or_else(|| IoError::CorruptData("incomplete SGI file".into()))?;
        planar.copy_from_slice(src);
    }
    trace!(width = w, height = h, channels, rle = header.rle, "SGI decode");

    let pixel = bytes * channels;
    let mut interleaved = vec![0u8; plane * channels];
    for c in 0..channels {
        let src_plane = &planar[c * plane..(c + 1) * plane];
        for (p, sample) in src_plane.chunks_exact(bytes).enumerate() {
            let at = p * pixel + c * bytes;
            interleaved[at..at + bytes].copy_from_slice(sample);
        }
    }

    let mut image = ImageBuffer::from_vec(header.image.clone(), interleaved)?;
    if let Some(name) = header.name {
        image.tags_mut().set("Description", name);
    }
    Ok(image)
}

/// Appends one scanline of `bytes`-wide samples, closed by a zero control.
fn encode_rle_row(row: &[u8], bytes: usize, out: &mut Vec<u8>) {
    let control = |out: &mut Vec<u8>, value: usize| {
        if bytes == 1 {
            out.push(value as u8);
        } else {
            out.extend_from_slice(&(value as u16).to_be_bytes());
        }
    };
    let at = |i: usize| &row[i * bytes..(i + 1) * bytes];
    for p in rle::plan(row.len() / bytes, 0x7f, |a, b| at(a) == at(b)) {
        if p.run {
            control(out, p.len);
            out.extend_from_slice(at(p.start));
        } else {
            control(out, 0x80 | p.len);
            out.extend_from_slice(&row[p.start * bytes..(p.start + p.len) * bytes]);
        }
    }
    control(out, 0);
}

/// Encodes an image as an SGI file.
///
/// A `Description` tag becomes the image name.
pub fn encode(image: &ImageBuffer, config: &IoConfig) -> IoResult<Vec<u8>> {
    let info = image.info();
    if !info.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an empty image".into()));
    }
    let channels = info.pixel_type.channel_count();
    let bits = if info.pixel_type.data_type() == DataType::U8 { 8 } else { 16 };
    let bytes = bits as usize / 8;
    let stored_info = ImageInfo::new(info.size, get_int_type(channels, bits)).with_layout(Layout {
        mirror: Mirror { x: false, y: true },
        alignment: 1,
        endian: Endian::Msb,
    });
    let mut stored = ImageBuffer::new(stored_info);
    convert_into(image, &mut stored)?;

    let (w, h) = (info.size.w as usize, info.size.h as usize);
    let row = w * bytes;
    let plane = row * h;
    let mut planar = vec![0u8; plane * channels];
    for (p, px) in stored.data().chunks_exact(bytes * channels).enumerate() {
        for (c, sample) in px.chunks_exact(bytes).enumerate() {
            let at = c * plane + p * bytes;
            planar[at..at + bytes].copy_from_slice(sample);
        }
    }

    let rle = config.sgi.compression == Compression::Rle;
    let dimension: u16 = match (channels, h) {
        (1, 1) => 1,
        (1, _) => 2,
        _ => 3,
    };
    let mut out = vec![0u8; HEADER_SIZE];
    BigEndian::write_u16(&mut out[0..2], MAGIC);
    out[2] = rle as u8;
    out[3] = bytes as u8;
    BigEndian::write_u16(&mut out[4..6], dimension);
    BigEndian::write_u16(&mut out[6..8], info.size.w);
    BigEndian::write_u16(&mut out[8..10], info.size.h);
    BigEndian::write_u16(&mut out[10..12], channels as u16);
    BigEndian::write_u32(&mut out[12..16], 0);
    BigEndian::write_u32(&mut out[16..20], if bytes == 1 { 255 } else { 65535 });
    if let Some(name) = image.tags().get("Description") {
        let name = name.as_bytes();
        let n = name.len().min(79);
        out[24..24 + n].copy_from_slice(&name[..n]);
    }

    if rle {
        let rows = h * channels;
        out.resize(HEADER_SIZE + rows * 8, 0);
        for r in 0..rows {
            let start = out.len();
            encode_rle_row(&planar[r * row..(r + 1) * row], bytes, &mut out);
            let len = out.len() - start;
            BigEndian::write_u32(&mut out[HEADER_SIZE + r * 4..], start as u32);
            BigEndian::write_u32(&mut out[HEADER_SIZE + (rows + r) * 4..], len as u32);
        }
    } else {
        out.extend_from_slice(&planar);
    }
    Ok(out)
}

/// Writes an image as SGI.
pub fn write(path: &Path, image: &ImageBuffer, config: &IoConfig) -> IoResult<()> {
    let bytes = encode(image, config)?;
    std::fs::write(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "SGI written");
    Ok(())
}

/// SGI still codec.
#[derive(Debug)]
pub struct SgiCodec;

/// SGI file or sequence handle.
pub type SgiReader = StillReader<SgiCodec>;

impl StillCodec for SgiCodec {
    const KIND: PluginKind = PluginKind::Sgi;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let mut buf = vec![0u8; HEADER_SIZE];
        File::open(path)?
            .read_exact(&mut buf)
            .map_err(|e| IoError::truncated(e, "SGI header"))?;
        let header = Header::parse(&buf)?;
        let mut tags = Tags::new();
        if let Some(name) = header.name {
            tags.set("Description", name);
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

/// Opens an SGI file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Sgi(SgiReader::open(path, config)?))
}
