//! CLI command implementations

pub mod convert;
pub mod info;
pub mod ls;

use anyhow::{Context, Result};
use reel_io::{Info, IoConfig, Registry};
use std::path::Path;

/// Built-in registry, configured from `config` when given.
pub fn registry(config: Option<&Path>) -> Result<Registry> {
    let config = match config {
        Some(path) => IoConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => IoConfig::default(),
    };
    Ok(Registry::with_builtin().with_config(config))
}

/// Formats file size in human-readable form.
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// One-line summary: `1920x1080 RGB_U10`, `2ch S16 48000Hz` or both.
pub fn summary(info: &Info) -> String {
    let mut parts = Vec::new();
    if let Some(video) = info.video.first() {
        parts.push(format!("{}x{} {}", video.size.w, video.size.h, video.pixel_type));
    }
    if let Some(audio) = info.audio {
        parts.push(format!(
            "{}ch {} {}Hz",
            audio.channels, audio.sample_type, audio.sample_rate
        ));
    }
    parts.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_core::{AudioInfo, ImageInfo, PixelType, SampleType, Size};

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn test_summary() {
        let mut info = Info::default();
        info.video.push(ImageInfo::new(Size::new(2048, 1556), PixelType::RGB_U10));
        assert_eq!(summary(&info), "2048x1556 RGB_U10");
        info.audio = Some(AudioInfo::new(2, SampleType::S16, 48000));
        assert_eq!(summary(&info), "2048x1556 RGB_U10, 2ch S16 48000Hz");
    }
}
