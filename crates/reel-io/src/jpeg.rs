//! JPEG/JFIF format support.
//!
//! Decodes 8-bit gray, 8-bit RGB and 16-bit gray (lossless) streams. CMYK
//! files are reported as an unsupported variant rather than approximated.
//! The writer stores 8-bit gray or RGB at the quality set in
//! [`JpegOptions`](crate::config::JpegOptions); alpha is dropped and deeper
//! images are reduced to 8 bits.

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::Path;

use jpeg_decoder::PixelFormat;
use jpeg_encoder::{ColorType as JpegColorType, Encoder, EncodingError};
use reel_core::convert::convert_into;
use reel_core::{Channels, Endian, ImageBuffer, ImageInfo, Layout, PixelType, Size, Tags};
use tracing::{debug, trace};

use crate::config::IoConfig;
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{IoError, IoResult};

fn map_read_err(err: jpeg_decoder::Error) -> IoError {
    match err {
        jpeg_decoder::Error::Format(msg) => IoError::CorruptData(format!("JPEG: {msg}")),
        jpeg_decoder::Error::Unsupported(what) => {
            IoError::UnsupportedVariant(format!("JPEG {what:?}"))
        }
        jpeg_decoder::Error::Io(e) => IoError::truncated(e, "JPEG"),
        other => IoError::DecodeFailure(format!("JPEG: {other}")),
    }
}

fn image_info(info: &jpeg_decoder::ImageInfo) -> IoResult<ImageInfo> {
    let (pt, endian) = match info.pixel_format {
        PixelFormat::L8 => (PixelType::L_U8, Endian::native()),
        PixelFormat::RGB24 => (PixelType::RGB_U8, Endian::native()),
        // 16-bit lossless samples come out big-endian.
        PixelFormat::L16 => (PixelType::L_U16, Endian::Msb),
        other => {
            return Err(IoError::UnsupportedVariant(format!("JPEG pixel format {other:?}")));
        }
    };
    Ok(
        ImageInfo::new(Size::new(info.width, info.height), pt).with_layout(Layout {
            endian,
            ..Layout::default()
        }),
    )
}

fn decode_from<R: Read>(r: R) -> IoResult<ImageBuffer> {
    let mut decoder = jpeg_decoder::Decoder::new(r);
    let pixels = decoder.decode().map_err(map_read_err)?;
    let info = decoder
        .info()
        .ok_or_else(|| IoError::CorruptData("JPEG without a frame header".into()))?;
    let info = image_info(&info)?;
    if pixels.len() < info.data_byte_count() {
        return Err(IoError::CorruptData("JPEG scan ends early".into()));
    }
    trace!(width = info.size.w, height = info.size.h, pixel_type = %info.pixel_type, "JPEG decode");
    Ok(ImageBuffer::from_vec(info, pixels)?)
}

/// Decodes a JPEG file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    decode_from(Cursor::new(data))
}

fn map_write_err(err: EncodingError) -> IoError {
    match err {
        EncodingError::IoError(e) => IoError::Io(e),
        other => IoError::EncodeFailure(format!("JPEG: {other}")),
    }
}

/// Serializes `image` as baseline JPEG at `quality` (1-100).
pub fn encode(image: &ImageBuffer, quality: u8) -> IoResult<Vec<u8>> {
    let src_type = image.pixel_type();
    if !src_type.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an image without pixels".into()));
    }
    let (pt, color) = match src_type.channels() {
        Channels::L | Channels::LA => (PixelType::L_U8, JpegColorType::Luma),
        Channels::RGB | Channels::RGBA => (PixelType::RGB_U8, JpegColorType::Rgb),
        Channels::None => unreachable!("rejected above"),
    };
    let mut stored = ImageBuffer::new(ImageInfo::new(image.info().size, pt));
    convert_into(image, &mut stored)?;

    let mut out = Vec::new();
    let encoder = Encoder::new(&mut out, quality.clamp(1, 100));
    encoder
        .encode(
            stored.data(),
            stored.width() as u16,
            stored.height() as u16,
            color,
        )
        .map_err(map_write_err)?;
    Ok(out)
}

/// Writes `image` to `path` using the configured quality.
pub fn write(path: &Path, image: &ImageBuffer, config: &IoConfig) -> IoResult<()> {
    let bytes = encode(image, config.jpeg.quality)?;
    std::fs::write(path, bytes)?;
    debug!(path = %path.display(), quality = config.jpeg.quality, "JPEG written");
    Ok(())
}

/// JPEG still codec.
#[derive(Debug)]
pub struct JpegCodec;

/// JPEG file or sequence handle.
pub type JpegReader = StillReader<JpegCodec>;

impl StillCodec for JpegCodec {
    const KIND: PluginKind = PluginKind::Jpeg;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let mut decoder = jpeg_decoder::Decoder::new(BufReader::new(File::open(path)?));
        decoder.read_info().map_err(map_read_err)?;
        let info = decoder
            .info()
            .ok_or_else(|| IoError::CorruptData("JPEG without a frame header".into()))?;
        Ok(StillInfo {
            image: image_info(&info)?,
            tags: Tags::new(),
            speed: None,
        })
    }

    fn read(path: &Path, _config: &IoConfig) -> IoResult<ImageBuffer> {
        decode_from(BufReader::new(File::open(path)?))
    }
}

/// Opens a JPEG file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Jpeg(JpegReader::open(path, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn flat(pt: PixelType, value: u8) -> ImageBuffer {
        let mut img = ImageBuffer::new(ImageInfo::new(Size::new(16, 16), pt));
        img.data_mut().fill(value);
        img
    }

    #[test]
    fn test_rgb_round_trip() {
        let src = flat(PixelType::RGB_U8, 128);
        let back = decode(&encode(&src, 95).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::RGB_U8);
        assert_eq!(back.info().size, Size::new(16, 16));
        // Lossy, but a flat field survives almost exactly.
        assert!(back.data().iter().all(|&v| v.abs_diff(128) <= 2));
    }

    #[test]
    fn test_gray_and_alpha() {
        let back = decode(&encode(&flat(PixelType::LA_U8, 200), 90).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::L_U8);
        assert!(back.data().iter().all(|&v| v.abs_diff(200) <= 2));

        let back = decode(&encode(&flat(PixelType::RGBA_U8, 60), 90).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::RGB_U8);
    }

    #[test]
    fn test_quality_changes_size() {
        let mut src = ImageBuffer::new(ImageInfo::new(Size::new(32, 32), PixelType::RGB_U8));
        for (i, b) in src.data_mut().iter_mut().enumerate() {
            *b = (i * 31 % 251) as u8;
        }
        let low = encode(&src, 10).unwrap();
        let high = encode(&src, 100).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_rejects() {
        let bytes = encode(&flat(PixelType::RGB_U8, 1), 90).unwrap();
        let err = decode(&bytes[..10]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData);
        assert!(decode(b"\xff\xd8\xff\xe0garbage").is_err());
    }
}
