//! Truevision Targa (TGA) support.
//!
//! Grayscale (types 3/11), true-color (types 2/10) and color-mapped
//! (types 1/9) images at 8 bits per channel, raw or run-length encoded.
//! True-color data is stored BGR(A) and swapped to RGB(A) on read.
//! Row and column order come from the image descriptor and are recorded
//! in the buffer's mirror flags rather than applied.
//!
//! The writer stores 8-bit gray or true-color bottom row first, with
//! run-length encoding per scanline when configured.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use reel_core::convert::convert_into;
use reel_core::{get_int_type, ImageBuffer, ImageInfo, Layout, Mirror, PixelType, Size, Tags};
use tracing::{debug, trace};

use crate::config::{Compression, IoConfig};
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{rle, IoError, IoResult};

const HEADER_SIZE: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Storage {
    Gray,
    TrueColor,
    ColorMapped,
}

#[derive(Debug, Clone)]
struct Header {
    id_size: usize,
    cmap_type: u8,
    cmap_start: u16,
    cmap_size: u16,
    cmap_bits: u8,
    width: u16,
    height: u16,
    pixel_bits: u8,
    storage: Storage,
    rle: bool,
    image: ImageInfo,
}

impl Header {
    fn parse(buf: &[u8]) -> IoResult<Self> {
        if buf.len() < HEADER_SIZE {
            return Err(IoError::CorruptData("Targa header: unexpected end of file".into()));
        }
        let id_size = buf[0] as usize;
        let cmap_type = buf[1];
        let image_type = buf[2];
        let cmap_start = LittleEndian::read_u16(&buf[3..5]);
        let cmap_size = LittleEndian::read_u16(&buf[5..7]);
        let cmap_bits = buf[7];
        let width = LittleEndian::read_u16(&buf[12..14]);
        let height = LittleEndian::read_u16(&buf[14..16]);
        let pixel_bits = buf[16];
        let descriptor = buf[17];

        let alpha_bits = descriptor & 0x0f;
        if !matches!(alpha_bits, 0 | 8) {
            return Err(IoError::UnsupportedVariant(format!(
                "Targa with {alpha_bits} alpha bits"
            )));
        }

        let (storage, pixel_type) = match (image_type, pixel_bits) {
            (3 | 11, 8) => (Storage::Gray, PixelType::L_U8),
            (3 | 11, 16) => (Storage::Gray, PixelType::LA_U8),
            (2 | 10, 24) => (Storage::TrueColor, PixelType::RGB_U8),
            (2 | 10, 32) => (Storage::TrueColor, PixelType::RGBA_U8),
            (1 | 9, 8) if cmap_type == 1 && cmap_bits == 24 => {
                (Storage::ColorMapped, PixelType::RGB_U8)
            }
            (1 | 9, 8) if cmap_type == 1 && cmap_bits == 32 => {
                (Storage::ColorMapped, PixelType::RGBA_U8)
            }
            _ => {
                return Err(IoError::UnsupportedVariant(format!(
                    "Targa type {image_type} with {pixel_bits} bits per pixel"
                )))
            }
        };
        if storage != Storage::ColorMapped {
            let bits = pixel_bits as usize + alpha_bits as usize;
            if bits < pixel_type.channel_count() * 8 || bits % 8 != 0 {
                return Err(IoError::UnsupportedVariant(format!(
                    "Targa with {pixel_bits} pixel bits and {alpha_bits} alpha bits"
                )));
            }
        }
        if width == 0 || height == 0 {
            return Err(IoError::CorruptData(format!("invalid Targa size {width}x{height}")));
        }

        let mirror = Mirror {
            x: (descriptor >> 4) & 1 == 1,
            y: (descriptor >> 5) & 1 == 0,
        };
        let image = ImageInfo::new(Size::new(width, height), pixel_type).with_layout(Layout {
            mirror,
            ..Layout::default()
        });

        Ok(Self {
            id_size,
            cmap_type,
            cmap_start,
            cmap_size,
            cmap_bits,
            width,
            height,
            pixel_bits,
            storage,
            rle: matches!(image_type, 9 | 10 | 11),
            image,
        })
    }

    fn cmap_bytes(&self) -> usize {
        if self.cmap_type == 1 {
            self.cmap_size as usize * (self.cmap_bits as usize).div_ceil(8)
        } else {
            0
        }
    }

    fn data_offset(&self) -> usize {
        HEADER_SIZE + self.id_size + self.cmap_bytes()
    }
}

/// Decodes a Targa file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    let header = Header::parse(data)?;
    let start = header.data_offset();
    let body = data
        .get(start..)
        .ok_or_else(|| IoError::CorruptData("incomplete Targa file".into()))?;

    let file_channels = (header.pixel_bits / 8) as usize;
    let pixels = header.width as usize * header.height as usize;
    let mut raw = vec![0u8; pixels * file_channels];
    if header.rle {
        rle::decode(body, &mut raw, file_channels)
            .ok_or_else(|| IoError::CorruptData("Targa RLE data ends early".into()))?;
    } else {
        let src = body
            .get(..raw.len())
            .ok_or_else(|| IoError::CorruptData("incomplete Targa file".into()))?;
        raw.copy_from_slice(src);
    }
    trace!(
        width = header.width,
        height = header.height,
        rle = header.rle,
        "Targa decode"
    );

    let bytes = match header.storage {
        Storage::Gray => raw,
        Storage::TrueColor => {
            for px in raw.chunks_exact_mut(file_channels) {
                px.swap(0, 2);
            }
            raw
        }
        Storage::ColorMapped => {
            let palette = &data[HEADER_SIZE + header.id_size..start];
            let entry = (header.cmap_bits as usize).div_ceil(8);
            let mut out = Vec::with_capacity(pixels * entry);
            for &index in &raw {
                let i = (index as usize)
                    .checked_sub(header.cmap_start as usize)
                    .filter(|&i| i < header.cmap_size as usize)
                    .ok_or_else(|| {
                        IoError::CorruptData(format!("Targa palette index {index} out of range"))
                    })?;
                let bgr = &palette[i * entry..(i + 1) * entry];
                out.extend_from_slice(&[bgr[2], bgr[1], bgr[0]]);
                if entry == 4 {
                    out.push(bgr[3]);
                }
            }
            out
        }
    };

    let mut image = ImageBuffer::from_vec(header.image.clone(), bytes)?;
    if header.id_size > 0 {
        let id = &data[HEADER_SIZE..HEADER_SIZE + header.id_size];
        let text = String::from_utf8_lossy(id).trim_end_matches('\0').trim().to_string();
        if !text.is_empty() {
            image.tags_mut().set("Description", text);
        }
    }
    Ok(image)
}

/// Encodes an image as a Targa file.
///
/// Every type is stored at 8 bits per channel. A `Description` tag becomes
/// the image ID.
pub fn encode(image: &ImageBuffer, config: &IoConfig) -> IoResult<Vec<u8>> {
    let info = image.info();
    if !info.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an empty image".into()));
    }
    let channels = info.pixel_type.channel_count();
    let stored_info = ImageInfo::new(info.size, get_int_type(channels, 8)).with_layout(Layout {
        mirror: Mirror { x: false, y: true },
        ..Layout::default()
    });
    let mut stored = ImageBuffer::new(stored_info);
    convert_into(image, &mut stored)?;
    if channels >= 3 {
        for px in stored.data_mut().chunks_exact_mut(channels) {
            px.swap(0, 2);
        }
    }

    let rle = config.targa.compression == Compression::Rle;
    let id: Vec<u8> = image
        .tags()
        .get("Description")
        .map(|d| d.bytes().take(255).collect())
        .unwrap_or_default();
    let image_type = match (channels >= 3, rle) {
        (false, false) => 3,
        (true, false) => 2,
        (false, true) => 11,
        (true, true) => 10,
    };
    let alpha_bits: u8 = if channels % 2 == 0 { 8 } else { 0 };

    let mut out = Vec::with_capacity(HEADER_SIZE + id.len() + stored.byte_count());
    out.push(id.len() as u8);
    out.push(0);
    out.push(image_type);
    out.extend_from_slice(&[0; 5]);
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(0)?;
    out.write_u16::<LittleEndian>(info.size.w)?;
    out.write_u16::<LittleEndian>(info.size.h)?;
    out.push((channels * 8) as u8);
    out.push(alpha_bits);
    out.extend_from_slice(&id);

    if rle {
        for row in stored.data().chunks_exact(stored.info().scanline_byte_count()) {
            rle::encode(row, channels, &mut out);
        }
    } else {
        out.extend_from_slice(stored.data());
    }
    Ok(out)
}

/// Writes an image as Targa.
pub fn write(path: &Path, image: &ImageBuffer, config: &IoConfig) -> IoResult<()> {
    let bytes = encode(image, config)?;
    std::fs::write(path, &bytes)?;
    debug!(path = %path.display(), bytes = bytes.len(), "Targa written");
    Ok(())
}

/// Targa still codec.
#[derive(Debug)]
pub struct TargaCodec;

/// Targa file or sequence handle.
pub type TargaReader = StillReader<TargaCodec>;

impl StillCodec for TargaCodec {
    const KIND: PluginKind = PluginKind::Targa;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let mut buf = [0u8; HEADER_SIZE];
        File::open(path)?
            .read_exact(&mut buf)
            .map_err(|e| IoError::truncated(e, "Targa header"))?;
        let header = Header::parse(&buf)?;
        Ok(StillInfo {
            image: header.image,
            tags: Tags::new(),
            speed: None,
        })
    }

    fn read(path: &Path, _config: &IoConfig) -> IoResult<ImageBuffer> {
        decode(&std::fs::read(path)?)
    }
}

/// Opens a Targa file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Targa(TargaReader::open(path, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn header(image_type: u8, w: u16, h: u16, bits: u8, descriptor: u8) -> Vec<u8> {
        let mut b = vec![0u8; HEADER_SIZE];
        b[2] = image_type;
        b[12..14].copy_from_slice(&w.to_le_bytes());
        b[14..16].copy_from_slice(&h.to_le_bytes());
        b[16] = bits;
        b[17] = descriptor;
        b
    }

    #[test]
    fn test_truecolor_raw() {
        // Top-left origin.
        let mut file = header(2, 2, 1, 24, 0x20);
        file.extend_from_slice(&[1, 2, 3, 4, 5, 6]);
        let img = decode(&file).unwrap();
        assert_eq!(img.pixel_type(), PixelType::RGB_U8);
        assert_eq!(img.data(), &[3, 2, 1, 6, 5, 4]);
        assert!(!img.info().layout.mirror.y);
    }

    #[test]
    fn test_bottom_up_default() {
        let mut file = header(3, 1, 2, 8, 0);
        file.extend_from_slice(&[10, 20]);
        let img = decode(&file).unwrap();
        assert!(img.info().layout.mirror.y);
        assert_eq!(img.normalize_layout().data(), &[20, 10]);
    }

    #[test]
    fn test_rle_bgra() {
        let mut file = header(10, 3, 1, 32, 0x28);
        // Run of two, then one literal.
        file.extend_from_slice(&[0x81, 1, 2, 3, 4, 0x00, 5, 6, 7, 8]);
        let img = decode(&file).unwrap();
        assert_eq!(img.pixel_type(), PixelType::RGBA_U8);
        assert_eq!(img.data(), &[3, 2, 1, 4, 3, 2, 1, 4, 7, 6, 5, 8]);
    }

    #[test]
    fn test_rle_spans_scanlines() {
        let mut file = header(11, 2, 2, 8, 0x20);
        file.extend_from_slice(&[0x83, 9]);
        assert_eq!(decode(&file).unwrap().data(), &[9, 9, 9, 9]);
    }

    #[test]
    fn test_color_mapped() {
        let mut file = header(1, 2, 1, 8, 0x20);
        file[1] = 1;
        file[5..7].copy_from_slice(&2u16.to_le_bytes());
        file[7] = 24;
        file.extend_from_slice(&[0, 0, 255, 255, 0, 0]);
        file.extend_from_slice(&[1, 0]);
        let img = decode(&file).unwrap();
        assert_eq!(img.pixel_type(), PixelType::RGB_U8);
        assert_eq!(img.data(), &[0, 0, 255, 255, 0, 0]);

        let mut bad = file.clone();
        let last = bad.len() - 1;
        bad[last] = 7;
        assert_eq!(decode(&bad).unwrap_err().kind(), ErrorKind::CorruptData);
    }

    #[test]
    fn test_color_mapped_alpha() {
        let mut file = header(1, 2, 1, 8, 0x20);
        file[1] = 1;
        file[5..7].copy_from_slice(&2u16.to_le_bytes());
        file[7] = 32;
        file.extend_from_slice(&[0, 0, 255, 128, 255, 0, 0, 255]);
        file.extend_from_slice(&[0, 1]);
        let img = decode(&file).unwrap();
        assert_eq!(img.pixel_type(), PixelType::RGBA_U8);
        assert_eq!(img.data(), &[255, 0, 0, 128, 0, 0, 255, 255]);
    }

    #[test]
    fn test_write_read() {
        let mut src = ImageBuffer::new(ImageInfo::new(Size::new(5, 3), PixelType::RGBA_U8));
        for (i, b) in src.data_mut().iter_mut().enumerate() {
            *b = (i / 8) as u8;
        }
        src.tags_mut().set("Description", "slate");

        for compression in [Compression::None, Compression::Rle] {
            let mut config = IoConfig::default();
            config.targa.compression = compression;
            let bytes = encode(&src, &config).unwrap();
            assert_eq!(bytes[2], if compression == Compression::Rle { 10 } else { 2 });
            let back = decode(&bytes).unwrap();
            assert_eq!(back.pixel_type(), PixelType::RGBA_U8);
            assert!(back.info().layout.mirror.y);
            assert_eq!(back.normalize_layout().data(), src.data());
            assert_eq!(back.tags().get("Description"), Some("slate"));
        }

        let gray = ImageBuffer::new(ImageInfo::new(Size::new(4, 4), PixelType::L_U16));
        let back = decode(&encode(&gray, &IoConfig::default()).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::L_U8);
    }

    #[test]
    fn test_rejects() {
        let mut alpha4 = header(2, 1, 1, 32, 0x04);
        alpha4.extend_from_slice(&[0; 4]);
        assert_eq!(decode(&alpha4).unwrap_err().kind(), ErrorKind::UnsupportedVariant);

        let mut short = header(2, 4, 4, 24, 0);
        short.extend_from_slice(&[0; 5]);
        assert_eq!(decode(&short).unwrap_err().kind(), ErrorKind::CorruptData);

        let mut rle = header(10, 4, 4, 24, 0);
        rle.extend_from_slice(&[0x8f, 1, 2]);
        assert_eq!(decode(&rle).unwrap_err().kind(), ErrorKind::CorruptData);

        assert_eq!(decode(&[0; 4]).unwrap_err().kind(), ErrorKind::CorruptData);
    }
}
