//! Softimage PIC (`.pic`) support.
//!
//! Big-endian, 8 bits per channel, bottom row first. A chain of channel
//! packets follows the header; each names the channels it carries and
//! whether its data is raw or mixed run-length. RGB, RGBA and RGB chained
//! with a separate alpha packet are read.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{BigEndian, ByteOrder};
use reel_core::{ImageBuffer, ImageInfo, Layout, Mirror, PixelType, Size, Tags};
use tracing::trace;

use crate::config::IoConfig;
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{IoError, IoResult};

const MAGIC: u32 = 0x5380_f634;
const HEADER_SIZE: usize = 104;
const PACKET_SIZE: usize = 4;
const MAX_PACKETS: usize = 8;

const CHANNEL_R: u8 = 0x80;
const CHANNEL_G: u8 = 0x40;
const CHANNEL_B: u8 = 0x20;
const CHANNEL_A: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Raw,
    Mixed,
}

/// One channel packet: which output channels it fills and how.
#[derive(Debug, Clone)]
struct Packet {
    encoding: Encoding,
    channels: Vec<usize>,
}

#[derive(Debug, Clone)]
struct Header {
    image: ImageInfo,
    packets: Vec<Packet>,
    data_offset: usize,
    comment: Option<String>,
}

impl Header {
    fn parse(buf: &[u8]) -> IoResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IoError::CorruptData("PIC header: unexpected end of file".into()));
        }
        let magic = BigEndian::read_u32(&buf[0..4]);
        if magic != MAGIC {
            return Err(IoError::CorruptData(format!("invalid PIC magic: {magic:#x}")));
        }
        if &buf[88..92] != b"PICT" {
            return Err(IoError::UnsupportedVariant("PIC without PICT id".into()));
        }
        let width = BigEndian::read_u16(&buf[92..94]);
        let height = BigEndian::read_u16(&buf[94..96]);
        if width == 0 || height == 0 {
            return Err(IoError::CorruptData(format!("invalid PIC size {width}x{height}")));
        }

        let mut packets = Vec::new();
        let mut mask = 0u8;
        let mut at = HEADER_SIZE;
        loop {
            let raw = buf
                .get(at..at + PACKET_SIZE)
                .ok_or_else(|| IoError::CorruptData("PIC channel packets truncated".into()))?;
            at += PACKET_SIZE;
            let (chained, size, kind, channel) = (raw[0], raw[1], raw[2], raw[3]);
            if size != 8 {
                return Err(IoError::UnsupportedVariant(format!("PIC with {size}-bit channels")));
            }
            let encoding = match kind {
                0 => Encoding::Raw,
                2 => Encoding::Mixed,
                _ => {
                    return Err(IoError::UnsupportedVariant(format!("PIC encoding {kind}")));
                }
            };
            if channel & mask != 0 || channel & 0xf0 == 0 {
                return Err(IoError::CorruptData(format!("PIC channel mask {channel:#x}")));
            }
            mask |= channel;
            let channels = [CHANNEL_R, CHANNEL_G, CHANNEL_B, CHANNEL_A]
                .iter()
                .enumerate()
                .filter(|(_, bit)| channel & **bit != 0)
                .map(|(i, _)| i)
                .collect();
            packets.push(Packet { encoding, channels });
            if chained == 0 {
                break;
            }
            if packets.len() == MAX_PACKETS {
                return Err(IoError::CorruptData("PIC channel chain too long".into()));
            }
        }

        let rgb = CHANNEL_R | CHANNEL_G | CHANNEL_B;
        let pixel_type = match mask {
            m if m == rgb => PixelType::RGB_U8,
            m if m == rgb | CHANNEL_A => PixelType::RGBA_U8,
            m => {
                return Err(IoError::UnsupportedVariant(format!("PIC channels {m:#x}")));
            }
        };

        let image = ImageInfo::new(Size::new(width, height), pixel_type).with_layout(Layout {
            mirror: Mirror { x: false, y: true },
            ..Layout::default()
        });
        let raw_comment = &buf[8..88];
        let end = raw_comment.iter().position(|&c| c == 0).unwrap_or(raw_comment.len());
        let comment = String::from_utf8_lossy(&raw_comment[..end]).trim().to_string();

        Ok(Self {
            image,
            packets,
            data_offset: at,
            comment: (!comment.is_empty()).then_some(comment),
        })
    }
}

/// Fills the packet's channels of one scanline, returning the bytes consumed.
///
/// Mixed encoding: a count byte below 128 is followed by count + 1 literal
/// pixels; 128 by a 16-bit count and one pixel to repeat; anything above
/// by one pixel repeated count - 127 times.
fn decode_row(input: &[u8], row: &mut [u8], pixel: usize, packet: &Packet) -> Option<usize> {
    let width = row.len() / pixel;
    let n = packet.channels.len();
    let put = |row: &mut [u8], x: usize, value: &[u8]| {
        for (&c, &v) in packet.channels.iter().zip(value) {
            row[x * pixel + c] = v;
        }
    };

    let mut i = 0;
    let mut x = 0;
    match packet.encoding {
        Encoding::Raw => {
            while x < width {
                put(row, x, input.get(i..i + n)?);
                i += n;
                x += 1;
            }
        }
        Encoding::Mixed => {
            while x < width {
                let count = *input.get(i)? as usize;
                i += 1;
                if count < 128 {
                    let run = (count + 1).min(width - x);
                    for _ in 0..run {
                        put(row, x, input.get(i..i + n)?);
                        i += n;
                        x += 1;
                    }
                    continue;
                }
                let run = if count == 128 {
                    let long = BigEndian::read_u16(input.get(i..i + 2)?) as usize;
                    i += 2;
                    long
                } else {
                    count - 127
                };
                if run == 0 {
                    return None;
                }
                let value = input.get(i..i + n)?;
                i += n;
                for _ in 0..run.min(width - x) {
                    put(row, x, value);
                    x += 1;
                }
            }
        }
    }
    Some(i)
}

/// Decodes a PIC file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    let header = Header::parse(data)?;
    let pixel = header.image.pixel_type.channel_count();
    let row_bytes = header.image.size.w as usize * pixel;
    let mut pixels = vec![0u8; header.image.data_byte_count()];

    let mut at = header.data_offset;
    for (y, row) in pixels.chunks_exact_mut(row_bytes).enumerate() {
        for packet in &header.packets {
            let input = data.get(at..).unwrap_or_default();
            at += decode_row(input, row, pixel, packet)
                .ok_or_else(|| IoError::CorruptData(format!("PIC scanline {y} is corrupt")))?;
        }
    }
    trace!(
        width = header.image.size.w,
        height = header.image.size.h,
        packets = header.packets.len(),
        "PIC decode"
    );

    let mut image = ImageBuffer::from_vec(header.image, pixels)?;
    if let Some(comment) = header.comment {
        image.tags_mut().set("Description", comment);
    }
    Ok(image)
}

/// Softimage PIC still codec.
#[derive(Debug)]
pub struct PicCodec;

/// PIC file or sequence handle.
pub type PicReader = StillReader<PicCodec>;

impl StillCodec for PicCodec {
    const KIND: PluginKind = PluginKind::Pic;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + PACKET_SIZE * MAX_PACKETS);
        File::open(path)?
            .take((HEADER_SIZE + PACKET_SIZE * MAX_PACKETS) as u64)
            .read_to_end(&mut buf)?;
        let header = Header::parse(&buf)?;
        let mut tags = Tags::new();
        if let Some(comment) = header.comment {
            tags.set("Description", comment);
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

/// Opens a PIC file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Pic(PicReader::open(path, config)?))
}
