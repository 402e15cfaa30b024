//! # reel-io
//!
//! Media I/O for the reel engine.
//!
//! Reads and writes the still, audio and movie formats used in film and
//! animation review:
//!
//! - **Cineon**, **DPX** - film scans, 10-bit packed RGB
//! - **EXR** - OpenEXR half/float
//! - **TIFF**, **PNG**, **JPEG** - general purpose stills
//! - **Targa**, **SGI**, **IFF** - legacy stills, optional RLE
//! - **PIC**, **RLA** - legacy stills, read only
//! - **WAV** - PCM and float audio
//! - **FFmpeg** - movies through the external `ffmpeg`/`ffprobe` tools
//!
//! # Architecture
//!
//! - [`Registry`] - extension table of plugins, built explicitly and shared
//! - [`Reader`] - open handle of any plugin, driven through [`MediaReader`]
//! - [`FileSequence`] - numbered files grouped into frame sequences
//! - [`Playback`] - background decode thread with a bounded read-ahead queue
//! - [`read`] / [`write`] - one-shot helpers over the built-in registry
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::path::Path;
//! use reel_core::PixelType;
//! use reel_core::convert::convert_image;
//!
//! let image = reel_io::read(Path::new("scan.0101.dpx"))?;
//! let half = convert_image(&image, PixelType::RGB_F16)?;
//! reel_io::write(Path::new("scan.0101.exr"), &half)?;
//! # Ok::<(), reel_io::IoError>(())
//! ```
//!
//! # Feature Flags
//!
//! - `exr` - OpenEXR support (default)
//! - `tiff` - TIFF support (default)
//! - `png` - PNG support (default)
//! - `jpeg` - JPEG support (default)
//! - `ffmpeg` - movie support through external tools (default)
//!
//! Cineon, DPX, Targa, SGI, IFF, PIC, RLA and WAV are always built.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

mod error;
mod header;
mod rle;

pub mod config;
pub mod playback;
pub mod plugin;
pub mod registry;
pub mod sequence;

pub mod cineon;
pub mod dpx;
pub mod iff;
pub mod pic;
pub mod rla;
pub mod sgi;
pub mod targa;
pub mod wav;

#[cfg(feature = "exr")]
pub mod exr;

#[cfg(feature = "tiff")]
pub mod tiff;

#[cfg(feature = "png")]
pub mod png;

#[cfg(feature = "jpeg")]
pub mod jpeg;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use config::IoConfig;
pub use error::{ErrorKind, IoError, IoResult};
pub use playback::{DecodedFrame, Playback, PlaybackOptions};
pub use plugin::{Capabilities, Frame, Info, MediaReader, PluginKind, Reader};
pub use registry::{PluginEntry, Registry};
pub use sequence::{FileSequence, ScanEntry, scan_dir, scan_dir_with};

use std::path::Path;

use reel_core::ImageBuffer;

/// Reads the image stored at `path`.
///
/// The plugin is chosen by extension, then by signature. Numbered paths read
/// that one file, not the sequence.
///
/// ```rust,no_run
/// let image = reel_io::read(std::path::Path::new("plate.0001.exr"))?;
/// println!("{}x{}", image.width(), image.height());
/// # Ok::<(), reel_io::IoError>(())
/// ```
pub fn read(path: &Path) -> IoResult<ImageBuffer> {
    let mut reader = Registry::with_builtin().open(path)?;
    let frame = reader.decode(None)?;
    reader.close();
    frame.into_video().ok_or_else(|| {
        IoError::UnsupportedVariant(format!("{} holds no image", path.display()))
    })
}

/// Writes `image` to `path` in the format named by its extension.
pub fn write(path: &Path, image: &ImageBuffer) -> IoResult<()> {
    Registry::with_builtin().write(path, image)
}
