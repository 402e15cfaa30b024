//! PNG format support.
//!
//! Palette, low bit-depth gray and `tRNS` transparency are expanded on read,
//! so every file decodes to 8 or 16-bit L, LA, RGB or RGBA. 16-bit samples
//! stay big-endian as stored; the buffer layout says so. Text chunks become
//! tags under their keyword.
//!
//! Writing stores 8-bit images as 8-bit and everything deeper as 16-bit.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Cursor, Seek, Write};
use std::path::Path;

use png::{BitDepth, ColorType, Transformations};
use reel_core::convert::convert_into;
use reel_core::{
    get_int_type, DataType, Endian, ImageBuffer, ImageInfo, Layout, PixelType, Size, Tags,
};
use tracing::{debug, trace, warn};

use crate::config::IoConfig;
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{IoError, IoResult};

fn map_read_err(err: png::DecodingError) -> IoError {
    match err {
        png::DecodingError::IoError(e) => IoError::truncated(e, "PNG"),
        png::DecodingError::Format(e) => IoError::CorruptData(format!("PNG: {e}")),
        png::DecodingError::LimitsExceeded => {
            IoError::UnsupportedVariant("PNG exceeds decoder limits".into())
        }
        other => IoError::DecodeFailure(format!("PNG: {other}")),
    }
}

fn map_write_err(err: png::EncodingError) -> IoError {
    match err {
        png::EncodingError::IoError(e) => IoError::Io(e),
        other => IoError::EncodeFailure(format!("PNG: {other}")),
    }
}

fn pixel_type(color: ColorType, depth: BitDepth) -> IoResult<PixelType> {
    let channels = match color {
        ColorType::Grayscale => 1,
        ColorType::GrayscaleAlpha => 2,
        ColorType::Rgb => 3,
        ColorType::Rgba => 4,
        ColorType::Indexed => {
            return Err(IoError::UnsupportedVariant("unexpanded PNG palette".into()));
        }
    };
    let bits = match depth {
        BitDepth::Eight => 8,
        BitDepth::Sixteen => 16,
        other => {
            return Err(IoError::UnsupportedVariant(format!("PNG bit depth {other:?}")));
        }
    };
    Ok(get_int_type(channels, bits))
}

fn open_reader<R: BufRead + Seek>(r: R) -> IoResult<png::Reader<R>> {
    let mut decoder = png::Decoder::new(r);
    decoder.set_transformations(Transformations::EXPAND);
    decoder.read_info().map_err(map_read_err)
}

fn header<R: BufRead + Seek>(reader: &png::Reader<R>) -> IoResult<(ImageInfo, Tags)> {
    let info = reader.info();
    let (color, depth) = reader.output_color_type();
    let pt = pixel_type(color, depth)?;
    let size = Size::from_u32(info.width, info.height).map_err(|_| {
        IoError::UnsupportedVariant(format!("PNG size {}x{}", info.width, info.height))
    })?;
    let mut image = ImageInfo::new(size, pt).with_layout(Layout {
        endian: Endian::Msb,
        ..Layout::default()
    });
    if let Some(dims) = info.pixel_dims {
        if dims.xppu > 0 && dims.yppu > 0 {
            image.pixel_aspect_ratio = dims.yppu as f32 / dims.xppu as f32;
        }
    }

    let mut tags = Tags::new();
    for chunk in &info.uncompressed_latin1_text {
        tags.set(chunk.keyword.clone(), chunk.text.clone());
    }
    for chunk in &info.compressed_latin1_text {
        if let Ok(text) = chunk.get_text() {
            tags.set(chunk.keyword.clone(), text);
        }
    }
    for chunk in &info.utf8_text {
        if let Ok(text) = chunk.get_text() {
            tags.set(chunk.keyword.clone(), text);
        }
    }
    Ok((image, tags))
}

fn decode_from<R: BufRead + Seek>(r: R) -> IoResult<ImageBuffer> {
    let mut reader = open_reader(r)?;
    let (info, tags) = header(&reader)?;
    let size = reader
        .output_buffer_size()
        .ok_or_else(|| IoError::UnsupportedVariant("PNG too large for memory".into()))?;
    let mut buf = vec![0u8; size];
    let frame = reader.next_frame(&mut buf).map_err(map_read_err)?;
    buf.truncate(frame.buffer_size());
    trace!(width = frame.width, height = frame.height, pixel_type = %info.pixel_type, "PNG decode");

    let mut image = ImageBuffer::from_vec(info, buf)?;
    image.set_tags(tags);
    Ok(image)
}

/// Decodes a PNG file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    decode_from(Cursor::new(data))
}

fn encode_to<W: Write>(out: W, image: &ImageBuffer) -> IoResult<()> {
    let src_type = image.pixel_type();
    if !src_type.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an image without pixels".into()));
    }
    let (dt, depth) = match src_type.data_type() {
        DataType::U8 => (DataType::U8, BitDepth::Eight),
        _ => (DataType::U16, BitDepth::Sixteen),
    };
    let pt = PixelType::from_parts(src_type.channels(), dt);
    let color = match pt.channel_count() {
        1 => ColorType::Grayscale,
        2 => ColorType::GrayscaleAlpha,
        3 => ColorType::Rgb,
        _ => ColorType::Rgba,
    };

    let info = ImageInfo::new(image.info().size, pt).with_layout(Layout {
        endian: Endian::Msb,
        ..Layout::default()
    });
    let mut stored = ImageBuffer::new(info);
    convert_into(image, &mut stored)?;

    let mut encoder = png::Encoder::new(out, stored.width() as u32, stored.height() as u32);
    encoder.set_color(color);
    encoder.set_depth(depth);
    encoder.set_compression(png::Compression::default());
    for (key, value) in image.tags().iter() {
        if let Err(e) = encoder.add_text_chunk(key.to_string(), value.to_string()) {
            warn!(tag = key, error = %e, "PNG text chunk skipped");
        }
    }
    if !image.tags().contains("Software") {
        encoder
            .add_text_chunk("Software".into(), concat!("reel ", env!("CARGO_PKG_VERSION")).into())
            .map_err(map_write_err)?;
    }
    let mut writer = encoder.write_header().map_err(map_write_err)?;
    writer.write_image_data(stored.data()).map_err(map_write_err)?;
    writer.finish().map_err(map_write_err)?;
    Ok(())
}

/// Serializes `image` as PNG.
pub fn encode(image: &ImageBuffer) -> IoResult<Vec<u8>> {
    let mut out = Vec::new();
    encode_to(&mut out, image)?;
    Ok(out)
}

/// Writes `image` to `path`.
pub fn write(path: &Path, image: &ImageBuffer, _config: &IoConfig) -> IoResult<()> {
    let mut file = BufWriter::new(File::create(path)?);
    encode_to(&mut file, image)?;
    file.flush()?;
    debug!(path = %path.display(), pixel_type = %image.pixel_type(), "PNG written");
    Ok(())
}

/// PNG still codec.
#[derive(Debug)]
pub struct PngCodec;

/// PNG file or sequence handle.
pub type PngReader = StillReader<PngCodec>;

impl StillCodec for PngCodec {
    const KIND: PluginKind = PluginKind::Png;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let reader = open_reader(BufReader::new(File::open(path)?))?;
        let (image, tags) = header(&reader)?;
        Ok(StillInfo {
            image,
            tags,
            speed: None,
        })
    }

    fn read(path: &Path, _config: &IoConfig) -> IoResult<ImageBuffer> {
        decode_from(BufReader::new(File::open(path)?))
    }
}

/// Opens a PNG file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Png(PngReader::open(path, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn image(pt: PixelType, w: u16, h: u16) -> ImageBuffer {
        let mut img = ImageBuffer::new(ImageInfo::new(Size::new(w, h), pt));
        for (i, b) in img.data_mut().iter_mut().enumerate() {
            *b = (i * 13) as u8;
        }
        img
    }

    #[test]
    fn test_rgba8_round_trip() {
        let mut src = image(PixelType::RGBA_U8, 7, 5);
        src.tags_mut().set("Description", "test card");
        let back = decode(&encode(&src).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::RGBA_U8);
        assert_eq!(back.data(), src.data());
        assert_eq!(back.tags().get("Description"), Some("test card"));
        assert!(back.tags().contains("Software"));
    }

    #[test]
    fn test_16bit_is_big_endian() {
        let mut src = ImageBuffer::new(ImageInfo::new(Size::new(1, 1), PixelType::L_U16));
        src.data_mut().copy_from_slice(&0x1234u16.to_ne_bytes());
        let back = decode(&encode(&src).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::L_U16);
        assert_eq!(back.info().layout.endian, Endian::Msb);
        assert_eq!(back.data(), &[0x12, 0x34]);
        let native = back.normalize_layout();
        assert_eq!(native.data(), &0x1234u16.to_ne_bytes());
    }

    #[test]
    fn test_float_stored_as_16bit() {
        let mut src = ImageBuffer::new(ImageInfo::new(Size::new(1, 1), PixelType::L_F32));
        src.data_mut().copy_from_slice(&1.0f32.to_ne_bytes());
        let back = decode(&encode(&src).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::L_U16);
        assert_eq!(back.data(), &[0xff, 0xff]);
    }

    #[test]
    fn test_gray_alpha() {
        let src = image(PixelType::LA_U8, 3, 3);
        let back = decode(&encode(&src).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::LA_U8);
        assert_eq!(back.data(), src.data());
    }

    #[test]
    fn test_rejects() {
        let bytes = encode(&image(PixelType::RGB_U8, 4, 4)).unwrap();
        assert_eq!(decode(&bytes[..12]).unwrap_err().kind(), ErrorKind::CorruptData);
        assert!(decode(b"\x89PNG\r\n\x1a\nnonsense").is_err());
    }

    #[test]
    fn test_oversized_is_unsupported() {
        let mut bytes = Vec::new();
        let mut encoder = png::Encoder::new(&mut bytes, 70_000, 1);
        encoder.set_color(ColorType::Grayscale);
        encoder.set_depth(BitDepth::Eight);
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&vec![0u8; 70_000]).unwrap();
        writer.finish().unwrap();
        assert_eq!(decode(&bytes).unwrap_err().kind(), ErrorKind::UnsupportedVariant);
    }
}
