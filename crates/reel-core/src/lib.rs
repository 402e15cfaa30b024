//! # reel-core
//!
//! Core media types for the reel engine.
//!
//! - [`PixelType`] - closed set of 21 pixel representations (plus `None`)
//! - [`ImageInfo`], [`ImageBuffer`] - pixel buffers with layout and tags
//! - [`convert`] - the pixel conversion matrix between every pair of types
//! - [`audio`] - sample types, interleaved buffers and their conversions
//! - [`frame`] - frame numbers, ranges and sequences
//! - [`speed`], [`time`] - rational frame rates, timecode and keycode
//!
//! ## Crate Structure
//!
//! Nothing here touches the filesystem. File formats live in `reel-io`,
//! which builds on these types:
//!
//! ```text
//! reel-core (this crate)
//!    ^
//!    |
//!    +-- reel-io (plugins, registry, sequences, playback)
//!           ^
//!           +-- reel-cli
//! ```
//!
//! ## Example
//!
//! ```rust
//! use reel_core::prelude::*;
//!
//! let info = ImageInfo::new(Size::new(4, 4), PixelType::L_U8);
//! let img = ImageBuffer::new(info);
//! let rgba = convert_image(&img, PixelType::RGBA_F32).unwrap();
//! assert_eq!(rgba.byte_count(), 4 * 4 * 16);
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod audio;
pub mod convert;
pub mod error;
pub mod frame;
pub mod image;
pub mod pixel;
pub mod speed;
pub mod time;

pub use audio::{AudioBuffer, AudioInfo, SampleType};
pub use error::*;
pub use frame::{Range, Sequence};
pub use image::*;
pub use pixel::*;
pub use speed::{Fps, Speed};
pub use time::{Keycode, Timecode, Units};

/// Prelude module for convenient imports.
///
/// # Usage
///
/// ```
/// use reel_core::prelude::*;
/// ```
pub mod prelude {
    pub use crate::audio::{AudioBuffer, AudioInfo, SampleType};
    pub use crate::convert::{convert, convert_image, convert_into};
    pub use crate::error::{Error, Result};
    pub use crate::frame::{Number, Range, Sequence};
    pub use crate::image::{Endian, ImageBuffer, ImageInfo, Layout, Mirror, Size, Tags};
    pub use crate::pixel::{Channels, DataType, PixelType};
    pub use crate::speed::{Fps, Speed};
    pub use crate::time::{Timecode, Units};
}
