//! Plugin contract.
//!
//! Every format is a [`PluginKind`]. Opening a file yields a [`Reader`], one
//! closed enum over the per-format handles, which exposes the parsed [`Info`]
//! and decodes [`Frame`]s on request.
//!
//! Still-image formats share one handle type, [`StillReader`], parameterised
//! by a [`StillCodec`] that knows how to read the header and the pixels of a single file. The
//! handle adds sequence resolution, frame lookup and scanline alignment on
//! top.

use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use reel_core::convert::convert_into;
use reel_core::frame::{Number, Sequence};
use reel_core::{AudioBuffer, AudioInfo, ImageBuffer, ImageInfo, Speed, Tags};
use tracing::{debug, trace};

use crate::config::IoConfig;
use crate::sequence::FileSequence;
use crate::{IoError, IoResult};

/// The closed set of built-in formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PluginKind {
    /// Kodak Cineon.
    Cineon,
    /// SMPTE DPX.
    Dpx,
    /// OpenEXR.
    Exr,
    /// TIFF.
    Tiff,
    /// PNG.
    Png,
    /// JPEG/JFIF.
    Jpeg,
    /// Truevision Targa.
    Targa,
    /// SGI image.
    Sgi,
    /// Maya IFF.
    Iff,
    /// Softimage PIC.
    Pic,
    /// Wavefront RLA.
    Rla,
    /// RIFF WAVE audio.
    Wav,
    /// Movies through the external `ffmpeg` tools.
    Ffmpeg,
}

/// What a plugin can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Capabilities {
    /// Decodes files.
    pub read: bool,
    /// Encodes images.
    pub write: bool,
    /// Opens numbered files as a frame sequence.
    pub sequence: bool,
}

impl PluginKind {
    /// Every kind, in registration order.
    pub const ALL: [PluginKind; 13] = [
        Self::Exr,
        Self::Tiff,
        Self::Cineon,
        Self::Dpx,
        Self::Png,
        Self::Jpeg,
        Self::Targa,
        Self::Sgi,
        Self::Iff,
        Self::Pic,
        Self::Rla,
        Self::Wav,
        Self::Ffmpeg,
    ];

    /// Short lower-case name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Cineon => "cineon",
            Self::Dpx => "dpx",
            Self::Exr => "exr",
            Self::Tiff => "tiff",
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::Targa => "targa",
            Self::Sgi => "sgi",
            Self::Iff => "iff",
            Self::Pic => "pic",
            Self::Rla => "rla",
            Self::Wav => "wav",
            Self::Ffmpeg => "ffmpeg",
        }
    }

    /// Claimed file extensions, lower-case with the dot.
    pub const fn extensions(&self) -> &'static [&'static str] {
        match self {
            Self::Cineon => &[".cin"],
            Self::Dpx => &[".dpx"],
            Self::Exr => &[".exr"],
            Self::Tiff => &[".tif", ".tiff"],
            Self::Png => &[".png"],
            Self::Jpeg => &[".jpg", ".jpeg", ".jfif"],
            Self::Targa => &[".tga"],
            Self::Sgi => &[".sgi", ".rgb", ".rgba", ".bw"],
            Self::Iff => &[".iff", ".z"],
            Self::Pic => &[".pic"],
            Self::Rla => &[".rla", ".rpf"],
            Self::Wav => &[".wav"],
            Self::Ffmpeg => &[".mov", ".mp4", ".m4v", ".mkv", ".avi", ".webm"],
        }
    }

    /// Checks the leading bytes of a file for this format's signature.
    ///
    /// Targa has no signature and only checks its header fields loosely.
    /// RLA has none at all and is found by extension only.
    pub fn can_read(&self, header: &[u8]) -> bool {
        match self {
            Self::Cineon => {
                header.len() >= 4
                    && matches!(header[..4], [0x80, 0x2a, 0x5f, 0xd7] | [0xd7, 0x5f, 0x2a, 0x80])
            }
            Self::Dpx => header.starts_with(b"SDPX") || header.starts_with(b"XPDS"),
            Self::Exr => header.starts_with(&[0x76, 0x2f, 0x31, 0x01]),
            Self::Tiff => header.starts_with(b"II*\0") || header.starts_with(b"MM\0*"),
            Self::Png => header.starts_with(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]),
            Self::Jpeg => header.starts_with(&[0xff, 0xd8, 0xff]),
            Self::Targa => {
                header.len() >= 18
                    && header[1] <= 1
                    && matches!(header[2], 1 | 2 | 3 | 9 | 10 | 11)
                    && matches!(header[16], 8 | 15 | 16 | 24 | 32)
            }
            Self::Sgi => header.starts_with(&[0x01, 0xda]),
            Self::Iff => header.len() >= 12 && &header[..4] == b"FOR4" && &header[8..12] == b"CIMG",
            Self::Pic => header.starts_with(&[0x53, 0x80, 0xf6, 0x34]),
            Self::Rla => false,
            Self::Wav => header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WAVE",
            Self::Ffmpeg => {
                (header.len() >= 8 && &header[4..8] == b"ftyp")
                    || header.starts_with(&[0x1a, 0x45, 0xdf, 0xa3])
                    || (header.len() >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"AVI ")
            }
        }
    }

    /// Read/write support.
    pub const fn capabilities(&self) -> Capabilities {
        let (read, write, sequence) = match self {
            Self::Cineon
            | Self::Dpx
            | Self::Exr
            | Self::Tiff
            | Self::Png
            | Self::Jpeg
            | Self::Targa
            | Self::Sgi
            | Self::Iff => (true, true, true),
            Self::Pic | Self::Rla => (true, false, true),
            Self::Wav => (true, true, false),
            Self::Ffmpeg => (true, false, false),
        };
        Capabilities {
            read,
            write,
            sequence,
        }
    }

    /// The kind claiming `ext` (with or without the dot, any case).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|k| k.extensions().iter().any(|e| e[1..] == ext))
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parsed description of an opened file or sequence.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Info {
    /// Path the reader was opened with.
    pub file_name: String,
    /// Video layers. Still formats have exactly one.
    pub video: Vec<ImageInfo>,
    /// Audio stream.
    pub audio: Option<AudioInfo>,
    /// Playback speed.
    pub speed: Speed,
    /// Frames available. Empty for a single still.
    pub sequence: Sequence,
    /// File metadata.
    pub tags: Tags,
}

impl Info {
    /// Number of decodable frames, at least 1.
    pub fn frame_count(&self) -> usize {
        self.sequence.get_frame_count().max(1)
    }

    /// Frame number to pass to `decode` for playback index `index`.
    pub fn frame_at(&self, index: usize) -> Option<Number> {
        if self.sequence.is_empty() {
            None
        } else {
            Some(self.sequence.get_frame(index))
        }
    }

    /// Whether the source decodes to images.
    pub fn has_video(&self) -> bool {
        !self.video.is_empty()
    }
}

/// One decoded unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// An image.
    Video(ImageBuffer),
    /// A block of audio.
    Audio(AudioBuffer),
}

impl Frame {
    /// The image, if this is video.
    pub fn as_video(&self) -> Option<&ImageBuffer> {
        match self {
            Self::Video(img) => Some(img),
            Self::Audio(_) => None,
        }
    }

    /// The audio, if this is audio.
    pub fn as_audio(&self) -> Option<&AudioBuffer> {
        match self {
            Self::Audio(a) => Some(a),
            Self::Video(_) => None,
        }
    }

    /// Takes the image out.
    pub fn into_video(self) -> Option<ImageBuffer> {
        match self {
            Self::Video(img) => Some(img),
            Self::Audio(_) => None,
        }
    }
}

/// Operations every open handle supports.
pub trait MediaReader {
    /// Parsed description.
    fn info(&self) -> &Info;

    /// Decodes `frame`, or the opened file itself for `None`.
    fn decode(&mut self, frame: Option<Number>) -> IoResult<Frame>;

    /// Releases the handle. Calling it again does nothing.
    fn close(&mut self);
}

/// Header summary of a single still file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StillInfo {
    /// Image description as decoded.
    pub image: ImageInfo,
    /// Metadata.
    pub tags: Tags,
    /// Frame rate stored in the header.
    pub speed: Option<Speed>,
}

/// Single-file access for a still-image format.
pub trait StillCodec {
    /// Format implemented.
    const KIND: PluginKind;

    /// Reads the header only.
    fn read_info(path: &Path, config: &IoConfig) -> IoResult<StillInfo>;

    /// Reads header and pixels.
    fn read(path: &Path, config: &IoConfig) -> IoResult<ImageBuffer>;
}

/// Handle over a still file or a sequence of them.
#[derive(Debug)]
pub struct StillReader<C> {
    path: PathBuf,
    files: Option<FileSequence>,
    info: Info,
    config: IoConfig,
    closed: bool,
    codec: PhantomData<C>,
}

impl<C: StillCodec> StillReader<C> {
    /// Opens `path`, detecting the sequence it belongs to.
    ///
    /// A missing numbered path still opens when siblings exist.
    pub fn open(path: &Path, config: &IoConfig) -> IoResult<Self> {
        let files = FileSequence::detect(path)?;
        let first = if path.is_file() {
            path.to_path_buf()
        } else {
            files
                .as_ref()
                .and_then(FileSequence::first_path)
                .ok_or_else(|| IoError::not_found(path))?
        };

        let header = C::read_info(&first, config)?;
        debug!(
            plugin = C::KIND.name(),
            path = %first.display(),
            size = ?header.image.size,
            pixel_type = %header.image.pixel_type,
            frames = files.as_ref().map_or(1, FileSequence::frame_count),
            "opened"
        );

        let info = Info {
            file_name: path.display().to_string(),
            video: vec![header.image],
            audio: None,
            speed: header.speed.unwrap_or_default(),
            sequence: files
                .as_ref()
                .map(|f| f.sequence().clone())
                .unwrap_or_default(),
            tags: header.tags,
        };

        Ok(Self {
            path: first,
            files,
            info,
            config: config.clone(),
            closed: false,
            codec: PhantomData,
        })
    }

    /// The detected sequence, if the path is numbered.
    pub fn files(&self) -> Option<&FileSequence> {
        self.files.as_ref()
    }

    fn resolve(&self, frame: Option<Number>) -> PathBuf {
        match (frame, &self.files) {
            (Some(n), Some(files)) => files.path_for(n),
            _ => self.path.clone(),
        }
    }
}

impl<C: StillCodec> MediaReader for StillReader<C> {
    fn info(&self) -> &Info {
        &self.info
    }

    fn decode(&mut self, frame: Option<Number>) -> IoResult<Frame> {
        if self.closed {
            return Err(IoError::InvalidArgument("reader is closed".into()));
        }
        let path = self.resolve(frame);
        if !path.is_file() {
            return Err(IoError::not_found(&path));
        }
        trace!(plugin = C::KIND.name(), path = %path.display(), "decode");
        let image = C::read(&path, &self.config)?;
        Ok(Frame::Video(align(image, self.config.alignment)?))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Re-lays `image` with the requested scanline alignment.
pub(crate) fn align(image: ImageBuffer, alignment: u8) -> IoResult<ImageBuffer> {
    if alignment <= 1 || image.info().layout.alignment == alignment {
        return Ok(image);
    }
    let mut layout = image.info().layout;
    layout.alignment = alignment;
    let mut out = ImageBuffer::new(image.info().with_layout(layout));
    convert_into(&image, &mut out)?;
    out.set_tags(image.tags().clone());
    Ok(out)
}

/// Reads exactly `N` bytes at the start of a file, fewer if it is shorter.
pub(crate) fn read_magic<const N: usize>(path: &Path) -> IoResult<Vec<u8>> {
    use std::io::Read;
    let file = std::fs::File::open(path)?;
    let mut buf = Vec::with_capacity(N);
    file.take(N as u64).read_to_end(&mut buf)?;
    Ok(buf)
}

/// Open handle for any built-in format.
#[derive(Debug)]
#[non_exhaustive]
pub enum Reader {
    /// Cineon file or sequence.
    Cineon(crate::cineon::CineonReader),
    /// DPX file or sequence.
    Dpx(crate::dpx::DpxReader),
    /// OpenEXR file or sequence.
    #[cfg(feature = "exr")]
    Exr(crate::exr::ExrReader),
    /// TIFF file or sequence.
    #[cfg(feature = "tiff")]
    Tiff(crate::tiff::TiffReader),
    /// PNG file or sequence.
    #[cfg(feature = "png")]
    Png(crate::png::PngReader),
    /// JPEG file or sequence.
    #[cfg(feature = "jpeg")]
    Jpeg(crate::jpeg::JpegReader),
    /// Targa file or sequence.
    Targa(crate::targa::TargaReader),
    /// SGI file or sequence.
    Sgi(crate::sgi::SgiReader),
    /// IFF file or sequence.
    Iff(crate::iff::IffReader),
    /// PIC file or sequence.
    Pic(crate::pic::PicReader),
    /// RLA file or sequence.
    Rla(crate::rla::RlaReader),
    /// WAV audio.
    Wav(crate::wav::WavReader),
    /// Movie through ffmpeg.
    #[cfg(feature = "ffmpeg")]
    Ffmpeg(crate::ffmpeg::FfmpegReader),
}

macro_rules! dispatch {
    ($self:expr, $r:ident => $body:expr) => {
        match $self {
            Reader::Cineon($r) => $body,
            Reader::Dpx($r) => $body,
            #[cfg(feature = "exr")]
            Reader::Exr($r) => $body,
            #[cfg(feature = "tiff")]
            Reader::Tiff($r) => $body,
            #[cfg(feature = "png")]
            Reader::Png($r) => $body,
            #[cfg(feature = "jpeg")]
            Reader::Jpeg($r) => $body,
            Reader::Targa($r) => $body,
            Reader::Sgi($r) => $body,
            Reader::Iff($r) => $body,
            Reader::Pic($r) => $body,
            Reader::Rla($r) => $body,
            Reader::Wav($r) => $body,
            #[cfg(feature = "ffmpeg")]
            Reader::Ffmpeg($r) => $body,
        }
    };
}

impl Reader {
    /// Format of the handle.
    pub fn kind(&self) -> PluginKind {
        match self {
            Self::Cineon(_) => PluginKind::Cineon,
            Self::Dpx(_) => PluginKind::Dpx,
            #[cfg(feature = "exr")]
            Self::Exr(_) => PluginKind::Exr,
            #[cfg(feature = "tiff")]
            Self::Tiff(_) => PluginKind::Tiff,
            #[cfg(feature = "png")]
            Self::Png(_) => PluginKind::Png,
            #[cfg(feature = "jpeg")]
            Self::Jpeg(_) => PluginKind::Jpeg,
            Self::Targa(_) => PluginKind::Targa,
            Self::Sgi(_) => PluginKind::Sgi,
            Self::Iff(_) => PluginKind::Iff,
            Self::Pic(_) => PluginKind::Pic,
            Self::Rla(_) => PluginKind::Rla,
            Self::Wav(_) => PluginKind::Wav,
            #[cfg(feature = "ffmpeg")]
            Self::Ffmpeg(_) => PluginKind::Ffmpeg,
        }
    }
}

impl MediaReader for Reader {
    fn info(&self) -> &Info {
        dispatch!(self, r => r.info())
    }

    fn decode(&mut self, frame: Option<Number>) -> IoResult<Frame> {
        dispatch!(self, r => r.decode(frame))
    }

    fn close(&mut self) {
        dispatch!(self, r => r.close())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extensions_unique() {
        let mut seen = std::collections::HashSet::new();
        for kind in PluginKind::ALL {
            for ext in kind.extensions() {
                assert!(ext.starts_with('.'));
                assert_eq!(*ext, ext.to_ascii_lowercase());
                assert!(seen.insert(*ext), "{ext} claimed twice");
            }
        }
    }

    #[test]
    fn test_from_extension() {
        assert_eq!(PluginKind::from_extension("EXR"), Some(PluginKind::Exr));
        assert_eq!(PluginKind::from_extension(".tiff"), Some(PluginKind::Tiff));
        assert_eq!(PluginKind::from_extension("rgb"), Some(PluginKind::Sgi));
        assert_eq!(PluginKind::from_extension("xyz"), None);
    }

    #[test]
    fn test_can_read_magic() {
        assert!(PluginKind::Dpx.can_read(b"SDPX...."));
        assert!(PluginKind::Dpx.can_read(b"XPDS...."));
        assert!(PluginKind::Cineon.can_read(&[0xd7, 0x5f, 0x2a, 0x80]));
        assert!(PluginKind::Exr.can_read(&[0x76, 0x2f, 0x31, 0x01, 2, 0, 0, 0]));
        assert!(PluginKind::Wav.can_read(b"RIFF\0\0\0\0WAVEfmt "));
        assert!(!PluginKind::Wav.can_read(b"RIFF\0\0\0\0AVI LIST"));
        assert!(PluginKind::Ffmpeg.can_read(b"RIFF\0\0\0\0AVI LIST"));
        assert!(PluginKind::Ffmpeg.can_read(b"\0\0\0\x20ftypisom"));
        assert!(!PluginKind::Png.can_read(b"SDPX"));
        assert!(!PluginKind::Cineon.can_read(&[0x80]));
        assert!(PluginKind::Iff.can_read(b"FOR4\0\0\0\x28CIMGTBHD"));
        assert!(!PluginKind::Iff.can_read(b"FOR4\0\0\0\x28TBMP"));
        assert!(PluginKind::Pic.can_read(&[0x53, 0x80, 0xf6, 0x34, 0x40]));
        assert!(!PluginKind::Rla.can_read(&[0; 32]));
    }

    #[test]
    fn test_capabilities() {
        assert!(PluginKind::Dpx.capabilities().write);
        assert!(PluginKind::Targa.capabilities().write);
        assert!(PluginKind::Iff.capabilities().write);
        assert!(!PluginKind::Pic.capabilities().write);
        assert!(!PluginKind::Wav.capabilities().sequence);
        assert!(PluginKind::ALL.iter().all(|k| k.capabilities().read));
    }

    #[test]
    fn test_info_frames() {
        let mut info = Info::default();
        assert_eq!(info.frame_count(), 1);
        assert_eq!(info.frame_at(0), None);
        info.sequence = Sequence::from_range(reel_core::Range::new(10, 12));
        assert_eq!(info.frame_count(), 3);
        assert_eq!(info.frame_at(2), Some(12));
    }

    #[test]
    fn test_align() {
        use reel_core::{PixelType, Size};
        let mut img = ImageBuffer::new(ImageInfo::new(Size::new(3, 2), PixelType::RGB_U8));
        img.data_mut().copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18]);
        let out = align(img, 4).unwrap();
        assert_eq!(out.info().scanline_byte_count(), 12);
        assert_eq!(out.scanline(1), &[10, 11, 12, 13, 14, 15, 16, 17, 18]);
    }
}
