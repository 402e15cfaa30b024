//! Plugin registry.
//!
//! A [`Registry`] maps file extensions to [`PluginEntry`] function tables and
//! opens or writes files through them. It is an ordinary value: build one,
//! then share it by reference or `Arc`. Nothing is global.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use reel_io::{MediaReader, Registry};
//!
//! let registry = Registry::with_builtin();
//! let mut reader = registry.open(Path::new("render.0001.exr"))?;
//! println!("{} frames", reader.info().frame_count());
//! let frame = reader.decode(Some(1))?;
//! # Ok::<(), reel_io::IoError>(())
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use reel_core::ImageBuffer;
use tracing::{debug, trace};

use crate::config::IoConfig;
use crate::plugin::{read_magic, Capabilities, PluginKind, Reader};
use crate::{IoError, IoResult};

/// Function table of one plugin.
#[derive(Clone, Copy)]
pub struct PluginEntry {
    /// Display name.
    pub name: &'static str,
    /// Format identity.
    pub kind: PluginKind,
    /// Signature check on the leading bytes of a file.
    pub can_read: fn(&[u8]) -> bool,
    /// Opens a file or sequence.
    pub open: fn(&Path, &IoConfig) -> IoResult<Reader>,
    /// Writes one image, when the format supports it.
    pub write: Option<fn(&Path, &ImageBuffer, &IoConfig) -> IoResult<()>>,
}

impl PluginEntry {
    /// Read/write support.
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            write: self.write.is_some(),
            ..self.kind.capabilities()
        }
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("write", &self.write.is_some())
            .finish()
    }
}

/// Extension table of plugins plus the shared I/O configuration.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<PluginEntry>,
    by_extension: HashMap<String, usize>,
    config: IoConfig,
}

impl Registry {
    /// Empty registry with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in plugin enabled at compile time.
    ///
    /// Order: EXR, TIFF, Cineon, DPX, PNG, JPEG, Targa, SGI, WAV, FFmpeg.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register_builtin();
        registry
    }

    /// Replaces the configuration handed to plugins.
    pub fn with_config(mut self, config: IoConfig) -> Self {
        self.config = config;
        self
    }

    /// Configuration handed to plugins.
    pub fn config(&self) -> &IoConfig {
        &self.config
    }

    fn register_builtin(&mut self) {
        #[cfg(feature = "exr")]
        self.register(
            PluginKind::Exr.extensions(),
            PluginEntry {
                name: "OpenEXR",
                kind: PluginKind::Exr,
                can_read: |h| PluginKind::Exr.can_read(h),
                open: |p, c| crate::exr::open(p, c),
                write: Some(|p, i, c| crate::exr::write(p, i, c)),
            },
        );

        #[cfg(feature = "tiff")]
        self.register(
            PluginKind::Tiff.extensions(),
            PluginEntry {
                name: "TIFF",
                kind: PluginKind::Tiff,
                can_read: |h| PluginKind::Tiff.can_read(h),
                open: |p, c| crate::tiff::open(p, c),
                write: Some(|p, i, c| crate::tiff::write(p, i, c)),
            },
        );

        self.register(
            PluginKind::Cineon.extensions(),
            PluginEntry {
                name: "Cineon",
                kind: PluginKind::Cineon,
                can_read: |h| PluginKind::Cineon.can_read(h),
                open: |p, c| crate::cineon::open(p, c),
                write: Some(|p, i, c| crate::cineon::write(p, i, c)),
            },
        );

        self.register(
            PluginKind::Dpx.extensions(),
            PluginEntry {
                name: "DPX",
                kind: PluginKind::Dpx,
                can_read: |h| PluginKind::Dpx.can_read(h),
                open: |p, c| crate::dpx::open(p, c),
                write: Some(|p, i, c| crate::dpx::write(p, i, c)),
            },
        );

        #[cfg(feature = "png")]
        self.register(
            PluginKind::Png.extensions(),
            PluginEntry {
                name: "PNG",
                kind: PluginKind::Png,
                can_read: |h| PluginKind::Png.can_read(h),
                open: |p, c| crate::png::open(p, c),
                write: Some(|p, i, c| crate::png::write(p, i, c)),
            },
        );

        #[cfg(feature = "jpeg")]
        self.register(
            PluginKind::Jpeg.extensions(),
            PluginEntry {
                name: "JPEG",
                kind: PluginKind::Jpeg,
                can_read: |h| PluginKind::Jpeg.can_read(h),
                open: |p, c| crate::jpeg::open(p, c),
                write: Some(|p, i, c| crate::jpeg::write(p, i, c)),
            },
        );

        self.register(
            PluginKind::Targa.extensions(),
            PluginEntry {
                name: "Targa",
                kind: PluginKind::Targa,
                can_read: |h| PluginKind::Targa.can_read(h),
                open: |p, c| crate::targa::open(p, c),
                write: Some(|p, i, c| crate::targa::write(p, i, c)),
            },
        );

        self.register(
            PluginKind::Sgi.extensions(),
            PluginEntry {
                name: "SGI",
                kind: PluginKind::Sgi,
                can_read: |h| PluginKind::Sgi.can_read(h),
                open: |p, c| crate::sgi::open(p, c),
                write: Some(|p, i, c| crate::sgi::write(p, i, c)),
            },
        );

        self.register(
            PluginKind::Iff.extensions(),
            PluginEntry {
                name: "IFF",
                kind: PluginKind::Iff,
                can_read: |h| PluginKind::Iff.can_read(h),
                open: |p, c| crate::iff::open(p, c),
                write: Some(|p, i, c| crate::iff::write(p, i, c)),
            },
        );

        self.register(
            PluginKind::Pic.extensions(),
            PluginEntry {
                name: "PIC",
                kind: PluginKind::Pic,
                can_read: |h| PluginKind::Pic.can_read(h),
                open: |p, c| crate::pic::open(p, c),
                write: None,
            },
        );

        self.register(
            PluginKind::Rla.extensions(),
            PluginEntry {
                name: "RLA",
                kind: PluginKind::Rla,
                can_read: |h| PluginKind::Rla.can_read(h),
                open: |p, c| crate::rla::open(p, c),
                write: None,
            },
        );

        self.register(
            PluginKind::Wav.extensions(),
            PluginEntry {
                name: "WAV",
                kind: PluginKind::Wav,
                can_read: |h| PluginKind::Wav.can_read(h),
                open: |p, c| crate::wav::open(p, c),
                write: None,
            },
        );

        #[cfg(feature = "ffmpeg")]
        self.register(
            PluginKind::Ffmpeg.extensions(),
            PluginEntry {
                name: "FFmpeg",
                kind: PluginKind::Ffmpeg,
                can_read: |h| PluginKind::Ffmpeg.can_read(h),
                open: |p, c| crate::ffmpeg::open(p, c),
                write: None,
            },
        );
    }

    /// Adds a plugin for `extensions`.
    ///
    /// An extension already claimed keeps its first plugin.
    pub fn register(&mut self, extensions: &[&str], entry: PluginEntry) {
        let index = self.entries.len();
        self.entries.push(entry);
        for ext in extensions {
            let key = normalize_extension(ext);
            match self.by_extension.get(&key) {
                Some(&existing) => debug!(
                    extension = %key,
                    kept = self.entries[existing].name,
                    ignored = entry.name,
                    "extension already registered"
                ),
                None => {
                    self.by_extension.insert(key, index);
                }
            }
        }
    }

    /// Plugin claiming the extension of `path`.
    pub fn lookup(&self, path: &Path) -> Option<&PluginEntry> {
        let ext = path.extension()?.to_str()?;
        self.lookup_extension(ext)
    }

    /// Plugin claiming `ext` (with or without the dot, any case).
    pub fn lookup_extension(&self, ext: &str) -> Option<&PluginEntry> {
        self.by_extension
            .get(&normalize_extension(ext))
            .map(|&i| &self.entries[i])
    }

    /// Plugin whose signature matches the leading bytes of an existing file.
    pub fn sniff(&self, path: &Path) -> IoResult<Option<&PluginEntry>> {
        let header = read_magic::<32>(path)?;
        Ok(self.entries.iter().find(|e| (e.can_read)(&header)))
    }

    /// Opens `path` with the plugin claiming its extension.
    ///
    /// Existing files with an unknown extension are matched by signature.
    pub fn open(&self, path: &Path) -> IoResult<Reader> {
        let entry = match self.lookup(path) {
            Some(entry) => entry,
            None if path.is_file() => self
                .sniff(path)?
                .ok_or_else(|| unsupported(path))?,
            None => return Err(unsupported(path)),
        };
        trace!(plugin = entry.name, path = %path.display(), "open");
        (entry.open)(path, &self.config)
    }

    /// Writes `image` with the plugin claiming the extension of `path`.
    pub fn write(&self, path: &Path, image: &ImageBuffer) -> IoResult<()> {
        let entry = self.lookup(path).ok_or_else(|| unsupported(path))?;
        let write = entry.write.ok_or_else(|| {
            IoError::UnsupportedFormat(format!("{} files cannot be written", entry.name))
        })?;
        debug!(plugin = entry.name, path = %path.display(), pixel_type = %image.pixel_type(), "write");
        write(path, image, &self.config)
    }

    /// Registered extensions, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }

    /// Registered plugins in registration order.
    pub fn plugins(&self) -> &[PluginEntry] {
        &self.entries
    }
}

fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase())
}

fn unsupported(path: &Path) -> IoError {
    IoError::UnsupportedFormat(path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn dummy_open(_: &Path, _: &IoConfig) -> IoResult<Reader> {
        Err(IoError::DecodeFailure("dummy".into()))
    }

    fn dummy(name: &'static str) -> PluginEntry {
        PluginEntry {
            name,
            kind: PluginKind::Targa,
            can_read: |_| false,
            open: dummy_open,
            write: None,
        }
    }

    #[test]
    fn test_builtin_order() {
        let registry = Registry::with_builtin();
        let kinds: Vec<PluginKind> = registry.plugins().iter().map(|e| e.kind).collect();
        let expected: Vec<PluginKind> = PluginKind::ALL
            .into_iter()
            .filter(|k| kinds.contains(k))
            .collect();
        assert_eq!(kinds, expected);
        assert!(kinds.contains(&PluginKind::Dpx));
        assert!(kinds.contains(&PluginKind::Cineon));
    }

    #[test]
    fn test_lookup_case_insensitive() {
        let registry = Registry::with_builtin();
        assert_eq!(registry.lookup(Path::new("a/b.DPX")).map(|e| e.kind), Some(PluginKind::Dpx));
        assert_eq!(registry.lookup(Path::new("x.Cin")).map(|e| e.kind), Some(PluginKind::Cineon));
        assert!(registry.lookup(Path::new("noext")).is_none());
        assert!(registry.lookup_extension("xyz").is_none());
    }

    #[test]
    fn test_first_registration_wins() {
        let mut registry = Registry::new();
        registry.register(&[".foo", "BAR"], dummy("first"));
        registry.register(&["foo", ".baz"], dummy("second"));
        assert_eq!(registry.lookup_extension("foo").unwrap().name, "first");
        assert_eq!(registry.lookup_extension(".bar").unwrap().name, "first");
        assert_eq!(registry.lookup_extension("baz").unwrap().name, "second");
        assert_eq!(registry.extensions(), vec![".bar", ".baz", ".foo"]);
    }

    #[test]
    fn test_open_unknown_extension() {
        let registry = Registry::with_builtin();
        let err = registry.open(Path::new("missing.xyz")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }

    #[test]
    fn test_open_missing_file() {
        let registry = Registry::with_builtin();
        let err = registry.open(Path::new("/nonexistent/dir/plate.dpx")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FileNotFound);
    }

    #[test]
    fn test_write_without_writer() {
        let registry = Registry::with_builtin();
        let img = ImageBuffer::new(reel_core::ImageInfo::new(
            reel_core::Size::new(1, 1),
            reel_core::PixelType::RGB_U8,
        ));
        let err = registry.write(Path::new("out.pic"), &img).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
    }
}
