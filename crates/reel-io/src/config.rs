//! I/O configuration.
//!
//! One [`IoConfig`] is shared by every plugin opened through a registry.
//! All fields have defaults, so a YAML file only needs the keys it changes:
//!
//! ```yaml
//! read_ahead: 16
//! dpx:
//!   version: v1
//!   endian: lsb
//! cineon:
//!   color_profile: film_print
//! targa:
//!   compression: rle
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{IoError, IoResult};

/// Engine-wide I/O settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IoConfig {
    /// Decoded frames buffered ahead of the consumer.
    pub read_ahead: usize,
    /// Worker threads for conversion, 0 for the rayon default.
    pub threads: usize,
    /// Scanline alignment of decoded buffers in bytes.
    pub alignment: u8,
    /// DPX writer settings.
    pub dpx: DpxOptions,
    /// Cineon settings.
    pub cineon: CineonOptions,
    /// JPEG writer settings.
    pub jpeg: JpegOptions,
    /// Targa writer settings.
    pub targa: TargaOptions,
    /// SGI writer settings.
    pub sgi: SgiOptions,
    /// IFF writer settings.
    pub iff: IffOptions,
    /// External FFmpeg tools.
    pub ffmpeg: FfmpegOptions,
}

impl Default for IoConfig {
    fn default() -> Self {
        Self {
            read_ahead: 8,
            threads: 0,
            alignment: 1,
            dpx: DpxOptions::default(),
            cineon: CineonOptions::default(),
            jpeg: JpegOptions::default(),
            targa: TargaOptions::default(),
            sgi: SgiOptions::default(),
            iff: IffOptions::default(),
            ffmpeg: FfmpegOptions::default(),
        }
    }
}

impl IoConfig {
    /// Parses YAML text.
    pub fn from_yaml_str(s: &str) -> IoResult<Self> {
        let config: Self = serde_yaml::from_str(s).map_err(|e| IoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a YAML file.
    pub fn load(path: &Path) -> IoResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| IoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&text)
    }

    /// Renders the configuration as YAML.
    pub fn to_yaml(&self) -> IoResult<String> {
        serde_yaml::to_string(self).map_err(|e| IoError::Config(e.to_string()))
    }

    fn validate(&self) -> IoResult<()> {
        if self.read_ahead == 0 {
            return Err(IoError::Config("read_ahead must be at least 1".into()));
        }
        if !matches!(self.alignment, 1 | 2 | 4 | 8) {
            return Err(IoError::Config(format!(
                "alignment must be 1, 2, 4 or 8, got {}",
                self.alignment
            )));
        }
        Ok(())
    }
}

/// DPX header version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DpxVersion {
    /// SMPTE 268M-1994, "V1.0".
    V1,
    /// SMPTE 268M-2003, "V2.0".
    #[default]
    V2,
}

/// Byte order choice for writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndianChoice {
    /// Native byte order of the machine.
    Auto,
    /// Big endian.
    #[default]
    Msb,
    /// Little endian.
    Lsb,
}

impl EndianChoice {
    /// Resolves to a concrete byte order.
    pub fn resolve(&self) -> reel_core::Endian {
        match self {
            Self::Auto => reel_core::Endian::native(),
            Self::Msb => reel_core::Endian::Msb,
            Self::Lsb => reel_core::Endian::Lsb,
        }
    }
}

/// DPX settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DpxOptions {
    /// Header version written.
    pub version: DpxVersion,
    /// Byte order written.
    pub endian: EndianChoice,
}

/// How Cineon code values are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorProfile {
    /// Let the file decide.
    #[default]
    Auto,
    /// Pass code values through.
    Raw,
    /// Printing density log.
    FilmPrint,
}

/// Cineon settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CineonOptions {
    /// Color profile tag attached to decoded frames.
    pub color_profile: ColorProfile,
}

/// JPEG writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JpegOptions {
    /// Quality 1-100.
    pub quality: u8,
}

impl Default for JpegOptions {
    fn default() -> Self {
        Self { quality: 90 }
    }
}

/// Run-length compression switch for the simple raster writers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    /// Raw pixels.
    #[default]
    None,
    /// Run-length encoded.
    Rle,
}

/// Targa writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargaOptions {
    /// Pixel data compression.
    pub compression: Compression,
}

/// SGI writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SgiOptions {
    /// Pixel data compression.
    pub compression: Compression,
}

/// IFF writer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IffOptions {
    /// Tile compression. A tile that does not shrink is stored raw.
    pub compression: Compression,
}

impl Default for IffOptions {
    fn default() -> Self {
        Self {
            compression: Compression::Rle,
        }
    }
}

/// External FFmpeg tool locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FfmpegOptions {
    /// `ffmpeg` executable.
    pub ffmpeg: PathBuf,
    /// `ffprobe` executable.
    pub ffprobe: PathBuf,
}

impl Default for FfmpegOptions {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let c = IoConfig::default();
        assert_eq!(c.read_ahead, 8);
        assert_eq!(c.alignment, 1);
        assert_eq!(c.dpx.version, DpxVersion::V2);
        assert_eq!(c.dpx.endian, EndianChoice::Msb);
        assert_eq!(c.jpeg.quality, 90);
        assert_eq!(c.targa.compression, Compression::None);
        assert_eq!(c.sgi.compression, Compression::None);
        assert_eq!(c.iff.compression, Compression::Rle);
    }

    #[test]
    fn test_partial_yaml() {
        let c = IoConfig::from_yaml_str("read_ahead: 3\ndpx:\n  endian: lsb\n").unwrap();
        assert_eq!(c.read_ahead, 3);
        assert_eq!(c.dpx.endian, EndianChoice::Lsb);
        assert_eq!(c.dpx.version, DpxVersion::V2);
        assert_eq!(c.ffmpeg.ffprobe, PathBuf::from("ffprobe"));

        let c = IoConfig::from_yaml_str("sgi:\n  compression: rle\niff:\n  compression: none\n").unwrap();
        assert_eq!(c.sgi.compression, Compression::Rle);
        assert_eq!(c.iff.compression, Compression::None);
        assert!(IoConfig::from_yaml_str("targa:\n  compression: zip\n").is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut c = IoConfig::default();
        c.cineon.color_profile = ColorProfile::FilmPrint;
        let text = c.to_yaml().unwrap();
        assert!(text.contains("film_print"));
        assert_eq!(IoConfig::from_yaml_str(&text).unwrap(), c);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(IoConfig::from_yaml_str("read_ahead: 0"), Err(IoError::Config(_))));
        assert!(matches!(IoConfig::from_yaml_str("alignment: 3"), Err(IoError::Config(_))));
        assert!(matches!(IoConfig::from_yaml_str("read_ahead: [1"), Err(IoError::Config(_))));
    }
}
