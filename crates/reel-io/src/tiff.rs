//! TIFF format support.
//!
//! Reads gray, gray+alpha, RGB and RGBA images with 8, 16 or 32-bit unsigned
//! samples or 32-bit float samples. Palette, CMYK, YCbCr and signed images
//! are reported as unsupported variants.
//!
//! Writing is uncompressed. Gray+alpha is widened to RGBA since the encoder
//! has no two-channel color type, 10-bit becomes 16-bit and half float is
//! stored as 32-bit float.

use std::fs::File;
use std::io::{BufReader, BufWriter, Cursor, Read, Seek, Write};
use std::path::Path;

use reel_core::convert::convert_image;
use reel_core::{Channels, DataType, ImageBuffer, ImageInfo, PixelType, Size, Tags};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};
use tiff::tags::Tag;
use tiff::{ColorType, TiffError};
use tracing::{debug, trace};

use crate::config::IoConfig;
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{IoError, IoResult};

/// ASCII tags carried into image metadata.
const TAGS: &[(Tag, &str)] = &[
    (Tag::Artist, "Creator"),
    (Tag::ImageDescription, "Description"),
    (Tag::Copyright, "Copyright"),
    (Tag::DateTime, "Time"),
    (Tag::Software, "Software"),
];

fn map_read_err(err: TiffError) -> IoError {
    match err {
        TiffError::FormatError(e) => IoError::CorruptData(format!("TIFF: {e}")),
        TiffError::UnsupportedError(e) => IoError::UnsupportedVariant(format!("TIFF {e}")),
        TiffError::LimitsExceeded => IoError::UnsupportedVariant("TIFF exceeds decoder limits".into()),
        TiffError::IoError(e) => IoError::truncated(e, "TIFF"),
        other => IoError::DecodeFailure(format!("TIFF: {other}")),
    }
}

fn map_write_err(err: TiffError) -> IoError {
    match err {
        TiffError::IoError(e) => IoError::Io(e),
        other => IoError::EncodeFailure(format!("TIFF: {other}")),
    }
}

fn pixel_type(color: ColorType) -> IoResult<PixelType> {
    let pt = match color {
        ColorType::Gray(8) => PixelType::L_U8,
        ColorType::Gray(16) => PixelType::L_U16,
        ColorType::Gray(32) => PixelType::L_U32,
        ColorType::GrayA(8) => PixelType::LA_U8,
        ColorType::GrayA(16) => PixelType::LA_U16,
        ColorType::GrayA(32) => PixelType::LA_U32,
        ColorType::RGB(8) => PixelType::RGB_U8,
        ColorType::RGB(16) => PixelType::RGB_U16,
        ColorType::RGB(32) => PixelType::RGB_U32,
        ColorType::RGBA(8) => PixelType::RGBA_U8,
        ColorType::RGBA(16) => PixelType::RGBA_U16,
        ColorType::RGBA(32) => PixelType::RGBA_U32,
        other => return Err(IoError::UnsupportedVariant(format!("TIFF color type {other:?}"))),
    };
    Ok(pt)
}

struct Header {
    image: ImageInfo,
    tags: Tags,
}

fn read_header<R: Read + Seek>(decoder: &mut Decoder<R>) -> IoResult<Header> {
    let (w, h) = decoder.dimensions().map_err(map_read_err)?;
    let color = decoder.colortype().map_err(map_read_err)?;
    let pt = pixel_type(color)?;
    let mut tags = Tags::new();
    for &(tag, key) in TAGS {
        if let Ok(value) = decoder.get_tag_ascii_string(tag) {
            let value = value.trim_end_matches('\0').trim();
            if !value.is_empty() {
                tags.set(key, value);
            }
        }
    }
    Ok(Header {
        image: ImageInfo::new(
            Size::from_u32(w, h)
                .map_err(|_| IoError::UnsupportedVariant(format!("TIFF size {w}x{h}")))?,
            pt,
        ),
        tags,
    })
}

fn to_bytes(result: DecodingResult, info: &ImageInfo) -> IoResult<(PixelType, Vec<u8>)> {
    let pt = info.pixel_type;
    let (pt, data) = match result {
        DecodingResult::U8(v) => (pt, v),
        DecodingResult::U16(v) => (pt, v.iter().flat_map(|s| s.to_ne_bytes()).collect()),
        DecodingResult::U32(v) => (pt, v.iter().flat_map(|s| s.to_ne_bytes()).collect()),
        // 32-bit float samples carry the same color type as 32-bit integers.
        DecodingResult::F32(v) => (
            PixelType::from_parts(pt.channels(), DataType::F32),
            v.iter().flat_map(|s| s.to_ne_bytes()).collect(),
        ),
        _ => {
            return Err(IoError::UnsupportedVariant(format!(
                "TIFF sample format for {pt}"
            )));
        }
    };
    Ok((pt, data))
}

fn decode_from<R: Read + Seek>(reader: R) -> IoResult<ImageBuffer> {
    let mut decoder = Decoder::new(reader).map_err(map_read_err)?;
    let header = read_header(&mut decoder)?;
    let result = decoder.read_image().map_err(map_read_err)?;
    let (pt, data) = to_bytes(result, &header.image)?;
    let info = header.image.with_type(pt);
    if data.len() < info.data_byte_count() {
        return Err(IoError::CorruptData(format!(
            "TIFF holds {} bytes, expected {}",
            data.len(),
            info.data_byte_count()
        )));
    }
    trace!(width = info.size.w, height = info.size.h, pixel_type = %pt, "TIFF decode");
    let mut image = ImageBuffer::from_vec(info, data)?;
    image.set_tags(header.tags);
    Ok(image)
}

/// Decodes a TIFF file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    decode_from(Cursor::new(data))
}

/// Pixel type the writer stores for `pt`.
fn output_type(pt: PixelType) -> PixelType {
    let channels = match pt.channels() {
        Channels::LA => Channels::RGBA,
        c => c,
    };
    let dt = match pt.data_type() {
        DataType::U8 => DataType::U8,
        DataType::U10 | DataType::U16 => DataType::U16,
        DataType::U32 => DataType::U32,
        DataType::F16 | DataType::F32 => DataType::F32,
        DataType::None => unreachable!("caller rejects PixelType::None"),
    };
    PixelType::from_parts(channels, dt)
}

fn samples<T, const N: usize>(data: &[u8], from: fn([u8; N]) -> T) -> Vec<T> {
    data.chunks_exact(N)
        .map(|c| {
            let mut b = [0u8; N];
            b.copy_from_slice(c);
            from(b)
        })
        .collect()
}

macro_rules! write_as {
    ($tiff:expr, $ct:ty, $w:expr, $h:expr, $tags:expr, $data:expr) => {{
        let mut image = $tiff.new_image::<$ct>($w, $h).map_err(map_write_err)?;
        for &(tag, key) in TAGS {
            if let Some(value) = $tags.get(key) {
                image.encoder().write_tag(tag, value).map_err(map_write_err)?;
            }
        }
        if !$tags.contains("Software") {
            image
                .encoder()
                .write_tag(Tag::Software, concat!("reel ", env!("CARGO_PKG_VERSION")))
                .map_err(map_write_err)?;
        }
        image.write_data($data).map_err(map_write_err)?;
    }};
}

fn encode_to<W: Write + Seek>(out: W, image: &ImageBuffer) -> IoResult<()> {
    let src_type = image.pixel_type();
    if !src_type.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an image without pixels".into()));
    }
    let pt = output_type(src_type);
    let src = if pt == src_type {
        image.normalize_layout()
    } else {
        convert_image(image, pt)?.normalize_layout()
    };
    let (w, h) = (src.width() as u32, src.height() as u32);
    let tags = image.tags();
    let data = src.data();

    let mut tiff = TiffEncoder::new(out).map_err(map_write_err)?;
    match pt {
        PixelType::L_U8 => write_as!(tiff, colortype::Gray8, w, h, tags, data),
        PixelType::RGB_U8 => write_as!(tiff, colortype::RGB8, w, h, tags, data),
        PixelType::RGBA_U8 => write_as!(tiff, colortype::RGBA8, w, h, tags, data),
        PixelType::L_U16 => {
            write_as!(tiff, colortype::Gray16, w, h, tags, &samples(data, u16::from_ne_bytes))
        }
        PixelType::RGB_U16 => {
            write_as!(tiff, colortype::RGB16, w, h, tags, &samples(data, u16::from_ne_bytes))
        }
        PixelType::RGBA_U16 => {
            write_as!(tiff, colortype::RGBA16, w, h, tags, &samples(data, u16::from_ne_bytes))
        }
        PixelType::L_U32 => {
            write_as!(tiff, colortype::Gray32, w, h, tags, &samples(data, u32::from_ne_bytes))
        }
        PixelType::RGB_U32 => {
            write_as!(tiff, colortype::RGB32, w, h, tags, &samples(data, u32::from_ne_bytes))
        }
        PixelType::RGBA_U32 => {
            write_as!(tiff, colortype::RGBA32, w, h, tags, &samples(data, u32::from_ne_bytes))
        }
        PixelType::L_F32 => write_as!(
            tiff,
            colortype::Gray32Float,
            w,
            h,
            tags,
            &samples(data, f32::from_ne_bytes)
        ),
        PixelType::RGB_F32 => write_as!(
            tiff,
            colortype::RGB32Float,
            w,
            h,
            tags,
            &samples(data, f32::from_ne_bytes)
        ),
        PixelType::RGBA_F32 => write_as!(
            tiff,
            colortype::RGBA32Float,
            w,
            h,
            tags,
            &samples(data, f32::from_ne_bytes)
        ),
        other => {
            return Err(IoError::EncodeFailure(format!("TIFF cannot store {other}")));
        }
    }
    Ok(())
}

/// Serializes `image` as an uncompressed TIFF.
pub fn encode(image: &ImageBuffer) -> IoResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    encode_to(&mut out, image)?;
    Ok(out.into_inner())
}

/// Writes `image` to `path`.
pub fn write(path: &Path, image: &ImageBuffer, _config: &IoConfig) -> IoResult<()> {
    let mut file = BufWriter::new(File::create(path)?);
    encode_to(&mut file, image)?;
    file.flush()?;
    debug!(path = %path.display(), pixel_type = %image.pixel_type(), "TIFF written");
    Ok(())
}

/// TIFF still codec.
#[derive(Debug)]
pub struct TiffCodec;

/// TIFF file or sequence handle.
pub type TiffReader = StillReader<TiffCodec>;

impl StillCodec for TiffCodec {
    const KIND: PluginKind = PluginKind::Tiff;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let mut decoder =
            Decoder::new(BufReader::new(File::open(path)?)).map_err(map_read_err)?;
        let header = read_header(&mut decoder)?;
        Ok(StillInfo {
            image: header.image,
            tags: header.tags,
            speed: None,
        })
    }

    fn read(path: &Path, _config: &IoConfig) -> IoResult<ImageBuffer> {
        decode_from(BufReader::new(File::open(path)?))
    }
}

/// Opens a TIFF file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Tiff(TiffReader::open(path, config)?))
}
