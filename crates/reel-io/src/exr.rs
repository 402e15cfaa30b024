//! OpenEXR format support.
//!
//! Reads the first valid layer of a scanline or tiled file at its largest
//! resolution level. Channels are matched by their base name (the part after
//! the last `.`), so `diffuse.R` counts as red:
//!
//! | Present | Pixel type |
//! |---------|------------|
//! | `R G B [A]` | RGB / RGBA |
//! | `Y [A]` | L / LA |
//! | one channel of any name | L |
//!
//! Samples keep their stored type (F16, F32 or U32); a layer mixing types is
//! promoted to F32. Writing stores F16, F32 or U32 channels; integer images
//! of other depths are written as F16.

use std::io::Cursor;
use std::path::Path;

use exr::meta::attribute::{KeyCode, TimeCode};
use exr::prelude::*;
use reel_core::convert::convert_image;
use reel_core::{
    Channels, DataType, ImageBuffer, ImageInfo, Keycode, PixelType, Size, Speed, Tags, Timecode,
};
use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::config::IoConfig;
use crate::plugin::{PluginKind, Reader, StillCodec, StillInfo, StillReader};
use crate::{IoError, IoResult};

type FlatImage = Image<Layer<AnyChannels<FlatSamples>>>;

fn map_read_err(err: exr::error::Error) -> IoError {
    use exr::error::Error;
    match err {
        Error::NotSupported(msg) => IoError::UnsupportedVariant(format!("OpenEXR {msg}")),
        Error::Invalid(msg) => IoError::CorruptData(format!("OpenEXR: {msg}")),
        Error::Io(e) => IoError::truncated(e, "OpenEXR"),
        Error::Aborted => IoError::DecodeFailure("OpenEXR read aborted".into()),
    }
}

fn map_write_err(err: exr::error::Error) -> IoError {
    match err {
        exr::error::Error::Io(e) => IoError::Io(e),
        other => IoError::EncodeFailure(format!("OpenEXR: {other}")),
    }
}

fn base_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Picks the channels to decode and their order in the output pixel.
fn select_channels(names: &[String]) -> Option<(Channels, Vec<usize>)> {
    let find = |c: &str| names.iter().position(|n| base_name(n).eq_ignore_ascii_case(c));
    let alpha = find("A");
    if let (Some(r), Some(g), Some(b)) = (find("R"), find("G"), find("B")) {
        return Some(match alpha {
            Some(a) => (Channels::RGBA, vec![r, g, b, a]),
            None => (Channels::RGB, vec![r, g, b]),
        });
    }
    if let Some(y) = find("Y") {
        return Some(match alpha {
            Some(a) => (Channels::LA, vec![y, a]),
            None => (Channels::L, vec![y]),
        });
    }
    (names.len() == 1).then(|| (Channels::L, vec![0]))
}

fn data_type(types: impl Iterator<Item = SampleType>) -> DataType {
    let mut common = None;
    for t in types {
        match common {
            None => common = Some(t),
            Some(c) if c == t => {}
            Some(_) => return DataType::F32,
        }
    }
    match common {
        Some(SampleType::F16) => DataType::F16,
        Some(SampleType::U32) => DataType::U32,
        _ => DataType::F32,
    }
}

fn pixel_type(names: &[String], types: &[SampleType]) -> IoResult<(PixelType, Vec<usize>)> {
    let (channels, order) = select_channels(names).ok_or_else(|| {
        IoError::UnsupportedVariant(format!("OpenEXR channel set [{}]", names.join(", ")))
    })?;
    let dt = data_type(order.iter().map(|&i| types[i]));
    Ok((PixelType::from_parts(channels, dt), order))
}

fn text(value: &Option<Text>) -> Option<String> {
    value.as_ref().map(|t| t.to_string()).filter(|s| !s.is_empty())
}

fn read_tags(image: &ImageAttributes, layer: &LayerAttributes, tags: &mut Tags) {
    let strings = [
        ("Name", &layer.layer_name),
        ("Owner", &layer.owner),
        ("Comments", &layer.comments),
        ("Capture Date", &layer.capture_date),
        ("Software", &layer.software_name),
        ("Rendering Transform", &layer.rendering_transform_name),
        ("Look Modification Transform", &layer.look_modification_transform_name),
        ("Wrap Modes", &layer.wrap_mode_name),
        ("View", &layer.view_name),
    ];
    for (key, value) in strings {
        if let Some(v) = text(value) {
            tags.set(key, v);
        }
    }
    let floats = [
        ("UTC Offset", layer.utc_offset),
        ("Longitude", layer.longitude),
        ("Latitude", layer.latitude),
        ("Altitude", layer.altitude),
        ("Focus", layer.focus),
        ("Exposure Time", layer.exposure),
        ("Aperture", layer.aperture),
        ("ISO Speed", layer.iso_speed),
        ("White Luminance", layer.white_luminance),
        ("X Density", layer.horizontal_density),
    ];
    for (key, value) in floats {
        if let Some(v) = value {
            tags.set(key, v.to_string());
        }
    }
    tags.set("Pixel Aspect Ratio", image.pixel_aspect.to_string());
    if let Some(k) = layer.film_key_code {
        let code = Keycode {
            id: k.film_manufacturer_code,
            kind: k.film_type,
            prefix: k.film_roll_prefix,
            count: k.count,
            offset: k.perforation_offset,
        };
        tags.set("Keycode", code.to_string());
    }
    if let Some(tc) = image.time_code {
        let tc = Timecode::from_time(
            tc.hours as u32,
            tc.minutes as u32,
            tc.seconds as u32,
            tc.frame as u32,
        );
        tags.set("Timecode", tc.to_string());
    }
}

fn read_speed(layer: &LayerAttributes) -> Option<Speed> {
    match layer.frames_per_second {
        Some((num, den)) if num > 0 && den > 0 => Some(Speed::new(num as u32, den)),
        _ => None,
    }
}

fn header_info(meta: &MetaData) -> IoResult<StillInfo> {
    let header = meta
        .headers
        .iter()
        .find(|h| !h.deep)
        .ok_or_else(|| IoError::UnsupportedVariant("OpenEXR without a flat layer".into()))?;
    let names: Vec<String> = header.channels.list.iter().map(|c| c.name.to_string()).collect();
    let types: Vec<SampleType> = header.channels.list.iter().map(|c| c.sample_type).collect();
    let (pt, _) = pixel_type(&names, &types)?;

    let size = Size::from_u32(header.layer_size.width() as u32, header.layer_size.height() as u32)?;
    let mut image = ImageInfo::new(size, pt);
    image.pixel_aspect_ratio = header.shared_attributes.pixel_aspect;
    if let Some(name) = text(&header.own_attributes.layer_name) {
        image.name = name;
    }

    let mut tags = Tags::new();
    read_tags(&header.shared_attributes, &header.own_attributes, &mut tags);
    tags.set("Channels", names.join(" "));
    tags.set("Compression", format!("{:?}", header.compression));
    Ok(StillInfo {
        image,
        tags,
        speed: read_speed(&header.own_attributes),
    })
}

fn write_sample(samples: &FlatSamples, i: usize, dt: DataType, out: &mut [u8]) {
    match (samples, dt) {
        (FlatSamples::F16(v), DataType::F16) => out.copy_from_slice(&v[i].to_ne_bytes()),
        (FlatSamples::U32(v), DataType::U32) => out.copy_from_slice(&v[i].to_ne_bytes()),
        (FlatSamples::F32(v), _) => out.copy_from_slice(&v[i].to_ne_bytes()),
        (FlatSamples::F16(v), _) => out.copy_from_slice(&v[i].to_f32().to_ne_bytes()),
        (FlatSamples::U32(v), _) => out.copy_from_slice(&(v[i] as f32).to_ne_bytes()),
    }
}

fn from_flat(image: FlatImage) -> IoResult<ImageBuffer> {
    let layer = &image.layer_data;
    let list = &layer.channel_data.list;
    let names: Vec<String> = list.iter().map(|c| c.name.to_string()).collect();
    let types: Vec<SampleType> = list
        .iter()
        .map(|c| match c.sample_data {
            FlatSamples::F16(_) => SampleType::F16,
            FlatSamples::F32(_) => SampleType::F32,
            FlatSamples::U32(_) => SampleType::U32,
        })
        .collect();
    let (pt, order) = pixel_type(&names, &types)?;

    let size = Size::from_u32(layer.size.width() as u32, layer.size.height() as u32)?;
    let mut info = ImageInfo::new(size, pt);
    info.pixel_aspect_ratio = image.attributes.pixel_aspect;
    if let Some(name) = text(&layer.attributes.layer_name) {
        info.name = name;
    }

    let dt = pt.data_type();
    let width = dt.byte_count();
    let pixel = pt.byte_count();
    let mut data = vec![0u8; info.data_byte_count()];
    for (c, &index) in order.iter().enumerate() {
        let samples = &list[index].sample_data;
        for (i, px) in data.chunks_exact_mut(pixel).enumerate() {
            write_sample(samples, i, dt, &mut px[c * width..(c + 1) * width]);
        }
    }
    trace!(width = size.w, height = size.h, pixel_type = %pt, "OpenEXR decode");

    let mut buffer = ImageBuffer::from_vec(info, data)?;
    read_tags(&image.attributes, &layer.attributes, buffer.tags_mut());
    buffer.tags_mut().set("Channels", names.join(" "));
    Ok(buffer)
}

/// Decodes an OpenEXR file held in memory.
pub fn decode(data: &[u8]) -> IoResult<ImageBuffer> {
    let image = read()
        .no_deep_data()
        .largest_resolution_level()
        .all_channels()
        .first_valid_layer()
        .all_attributes()
        .from_buffered(Cursor::new(data))
        .map_err(map_read_err)?;
    from_flat(image)
}

fn channel_names(channels: Channels) -> &'static [&'static str] {
    match channels {
        Channels::L => &["Y"],
        Channels::LA => &["Y", "A"],
        Channels::RGB => &["R", "G", "B"],
        Channels::RGBA => &["R", "G", "B", "A"],
        Channels::None => unreachable!("caller rejects PixelType::None"),
    }
}

fn set_text(slot: &mut Option<Text>, value: Option<&str>) {
    if let Some(t) = value.and_then(Text::new_or_none) {
        *slot = Some(t);
    }
}

fn to_flat(image: &ImageBuffer) -> IoResult<FlatImage> {
    let src_type = image.pixel_type();
    if !src_type.is_valid() {
        return Err(IoError::InvalidArgument("cannot write an image without pixels".into()));
    }
    let dt = match src_type.data_type() {
        d @ (DataType::F16 | DataType::F32 | DataType::U32) => d,
        _ => DataType::F16,
    };
    let pt = PixelType::from_parts(src_type.channels(), dt);
    let src = if pt == src_type {
        image.normalize_layout()
    } else {
        convert_image(image, pt)?.normalize_layout()
    };

    let pixels = src.width() * src.height();
    let width = dt.byte_count();
    let pixel = pt.byte_count();
    let channels: SmallVec<[AnyChannel<FlatSamples>; 4]> = channel_names(pt.channels())
        .iter()
        .enumerate()
        .map(|(c, &name)| {
            let at = |i: usize| &src.data()[i * pixel + c * width..i * pixel + (c + 1) * width];
            let samples = match dt {
                DataType::F16 => FlatSamples::F16(
                    (0..pixels)
                        .map(|i| f16::from_ne_bytes([at(i)[0], at(i)[1]]))
                        .collect(),
                ),
                DataType::U32 => FlatSamples::U32(
                    (0..pixels)
                        .map(|i| u32::from_ne_bytes([at(i)[0], at(i)[1], at(i)[2], at(i)[3]]))
                        .collect(),
                ),
                _ => FlatSamples::F32(
                    (0..pixels)
                        .map(|i| f32::from_ne_bytes([at(i)[0], at(i)[1], at(i)[2], at(i)[3]]))
                        .collect(),
                ),
            };
            AnyChannel::new(name, samples)
        })
        .collect();

    let tags = image.tags();
    let mut attributes = LayerAttributes::default();
    set_text(&mut attributes.owner, tags.get("Owner"));
    set_text(&mut attributes.comments, tags.get("Comments"));
    set_text(&mut attributes.capture_date, tags.get("Capture Date"));
    set_text(
        &mut attributes.software_name,
        Some(concat!("reel ", env!("CARGO_PKG_VERSION"))),
    );
    if let Some(k) = tags.get("Keycode").and_then(|s| s.parse::<Keycode>().ok()) {
        attributes.film_key_code = Some(KeyCode {
            film_manufacturer_code: k.id,
            film_type: k.kind,
            film_roll_prefix: k.prefix,
            count: k.count,
            perforation_offset: k.offset,
            perforations_per_frame: 4,
            perforations_per_count: 64,
        });
    }

    let size = (src.width(), src.height());
    let layer = Layer::new(
        size,
        attributes,
        Encoding::FAST_LOSSLESS,
        AnyChannels::sort(channels),
    );
    let mut flat = Image::from_layer(layer);
    flat.attributes.pixel_aspect = image.info().pixel_aspect_ratio;
    if let Some(tc) = tags.get("Timecode").and_then(|s| s.parse::<Timecode>().ok()) {
        let (hours, minutes, seconds, frame) = tc.to_time();
        flat.attributes.time_code = Some(TimeCode {
            hours: hours as u8,
            minutes: minutes as u8,
            seconds: seconds as u8,
            frame: frame as u8,
            drop_frame: false,
            color_frame: false,
            field_phase: false,
            binary_group_flags: [false; 3],
            binary_groups: [0; 8],
        });
    }
    Ok(flat)
}

/// Serializes `image` as a single-layer OpenEXR file.
pub fn encode(image: &ImageBuffer) -> IoResult<Vec<u8>> {
    let flat = to_flat(image)?;
    let mut out = Cursor::new(Vec::new());
    flat.write().to_buffered(&mut out).map_err(map_write_err)?;
    Ok(out.into_inner())
}

/// Writes `image` to `path`.
pub fn write(path: &Path, image: &ImageBuffer, _config: &IoConfig) -> IoResult<()> {
    let flat = to_flat(image)?;
    flat.write().to_file(path).map_err(map_write_err)?;
    debug!(path = %path.display(), pixel_type = %image.pixel_type(), "OpenEXR written");
    Ok(())
}

/// OpenEXR still codec.
#[derive(Debug)]
pub struct ExrCodec;

/// OpenEXR file or sequence handle.
pub type ExrReader = StillReader<ExrCodec>;

impl StillCodec for ExrCodec {
    const KIND: PluginKind = PluginKind::Exr;

    fn read_info(path: &Path, _config: &IoConfig) -> IoResult<StillInfo> {
        let meta = MetaData::read_from_file(path, false).map_err(map_read_err)?;
        header_info(&meta)
    }

    fn read(path: &Path, _config: &IoConfig) -> IoResult<ImageBuffer> {
        let image = read()
            .no_deep_data()
            .largest_resolution_level()
            .all_channels()
            .first_valid_layer()
            .all_attributes()
            .from_file(path)
            .map_err(map_read_err)?;
        from_flat(image)
    }
}

/// Opens an OpenEXR file or sequence.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Exr(ExrReader::open(path, config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use approx::assert_relative_eq;

    fn rgba_f32(w: u16, h: u16) -> ImageBuffer {
        let info = ImageInfo::new(Size::new(w, h), PixelType::RGBA_F32);
        let mut img = ImageBuffer::new(info);
        for (i, px) in img.data_mut().chunks_exact_mut(16).enumerate() {
            let v = [i as f32 * 0.25, 0.5, -1.0, 1.0];
            for (c, s) in v.iter().enumerate() {
                px[c * 4..c * 4 + 4].copy_from_slice(&s.to_ne_bytes());
            }
        }
        img
    }

    fn f32_at(img: &ImageBuffer, i: usize) -> f32 {
        f32::from_ne_bytes(img.data()[i * 4..i * 4 + 4].try_into().unwrap())
    }

    #[test]
    fn test_select_channels() {
        let names = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let (c, order) = select_channels(&names(&["A", "B", "G", "R"])).unwrap();
        assert_eq!(c, Channels::RGBA);
        assert_eq!(order, vec![3, 2, 1, 0]);
        let (c, order) = select_channels(&names(&["diffuse.B", "diffuse.G", "diffuse.R"])).unwrap();
        assert_eq!(c, Channels::RGB);
        assert_eq!(order, vec![2, 1, 0]);
        assert_eq!(select_channels(&names(&["A", "Y"])).unwrap().0, Channels::LA);
        assert_eq!(select_channels(&names(&["Z"])).unwrap().0, Channels::L);
        assert!(select_channels(&names(&["U", "V"])).is_none());
    }

    #[test]
    fn test_mixed_types_promote() {
        assert_eq!(data_type([SampleType::F16, SampleType::F16].into_iter()), DataType::F16);
        assert_eq!(data_type([SampleType::U32].into_iter()), DataType::U32);
        assert_eq!(data_type([SampleType::F16, SampleType::F32].into_iter()), DataType::F32);
    }

    #[test]
    fn test_f32_round_trip() {
        let src = rgba_f32(4, 3);
        let back = decode(&encode(&src).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::RGBA_F32);
        assert_eq!(back.info().size, Size::new(4, 3));
        assert_eq!(back.byte_count(), back.info().data_byte_count());
        for i in 0..12 * 4 {
            assert_relative_eq!(f32_at(&back, i), f32_at(&src, i));
        }
        assert!(back.tags().get("Software").unwrap().starts_with("reel"));
    }

    #[test]
    fn test_u8_written_as_half() {
        let mut src = ImageBuffer::new(ImageInfo::new(Size::new(2, 1), PixelType::L_U8));
        src.data_mut().copy_from_slice(&[0, 255]);
        let back = decode(&encode(&src).unwrap()).unwrap();
        assert_eq!(back.pixel_type(), PixelType::L_F16);
        let hi = f16::from_ne_bytes([back.data()[2], back.data()[3]]);
        assert_relative_eq!(hi.to_f32(), 1.0);
    }

    #[test]
    fn test_mirrored_source_written_top_down() {
        let mut src = rgba_f32(1, 2);
        let mut layout = src.info().layout;
        layout.mirror.y = true;
        src.retag(src.info().with_layout(layout)).unwrap();
        let back = decode(&encode(&src).unwrap()).unwrap();
        // Row 0 of the file is the last stored row.
        assert_relative_eq!(f32_at(&back, 0), 0.25);
        assert_relative_eq!(f32_at(&back, 4), 0.0);
    }

    #[test]
    fn test_tags_round_trip() {
        let mut src = rgba_f32(2, 2);
        src.tags_mut().set("Owner", "studio");
        src.tags_mut().set("Timecode", "01:02:03:04");
        src.tags_mut().set("Keycode", "1:2:3:4:5");
        let back = decode(&encode(&src).unwrap()).unwrap();
        assert_eq!(back.tags().get("Owner"), Some("studio"));
        assert_eq!(back.tags().get("Timecode"), Some("01:02:03:04"));
        assert_eq!(back.tags().get("Keycode"), Some("1:2:3:4:5"));
    }

    #[test]
    fn test_truncated_is_corrupt() {
        let bytes = encode(&rgba_f32(8, 8)).unwrap();
        for cut in [3, 40] {
            let err = decode(&bytes[..cut]).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::CorruptData, "cut at {cut}: {err}");
        }
    }
}
