//! File-sequence detection.
//!
//! Numbered files that differ only in their frame token form a sequence:
//!
//! ```text
//! render.0001.exr
//! render.0002.exr      ->  render.0001-0003.exr
//! render.0003.exr
//! ```
//!
//! The frame token is the last digit run before the extension, so digits in
//! extensions (`clip.mp4`) never count. A `-` right after a separator marks a
//! negative frame (`shot.-005.exr`).
//!
//! # Example
//!
//! ```rust
//! use reel_io::sequence::FileSequence;
//!
//! let seq = FileSequence::from_path("shots/render.0042.exr").unwrap();
//! assert_eq!(seq.prefix(), "render.");
//! assert_eq!(seq.pattern(), "render.####.exr");
//! assert_eq!(seq.path_for(7), std::path::Path::new("shots/render.0007.exr"));
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use reel_core::frame::{self, Number, Sequence};
use tracing::{debug, warn};

use crate::plugin::{Info, MediaReader};
use crate::registry::Registry;
use crate::{ErrorKind, IoResult};

/// Files sharing a prefix, suffix and frame token width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSequence {
    dir: PathBuf,
    prefix: String,
    suffix: String,
    sequence: Sequence,
}

impl FileSequence {
    /// Creates a sequence from its parts.
    pub fn new(
        dir: impl Into<PathBuf>,
        prefix: impl Into<String>,
        suffix: impl Into<String>,
        sequence: Sequence,
    ) -> Self {
        Self {
            dir: dir.into(),
            prefix: prefix.into(),
            suffix: suffix.into(),
            sequence,
        }
    }

    /// Sequence holding the single numbered file `path`.
    ///
    /// Returns `None` when the file name carries no frame number.
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let path = path.as_ref();
        let name = path.file_name()?.to_str()?;
        let token = FrameToken::parse(name)?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Some(Self::new(
            dir,
            token.prefix,
            token.suffix,
            Sequence::from_range(token.frame.into()).with_pad(token.pad),
        ))
    }

    /// Parses a hash (`render.####.exr`) or printf (`render.%04d.exr`) pattern.
    ///
    /// The result has no frames yet.
    pub fn from_pattern(pattern: impl AsRef<Path>) -> Option<Self> {
        let path = pattern.as_ref();
        let name = path.file_name()?.to_str()?;
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        if let Some(start) = name.find('#') {
            let end = name[start..]
                .find(|c| c != '#')
                .map_or(name.len(), |i| start + i);
            let pad = end - start;
            let seq = Sequence::new().with_pad(if pad > 1 { pad } else { 0 });
            return Some(Self::new(dir, &name[..start], &name[end..], seq));
        }

        let start = name.find('%')?;
        let rest = &name[start + 1..];
        let d = rest.find('d')?;
        let spec = &rest[..d];
        if !spec.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let pad = spec.trim_start_matches('0').parse().unwrap_or(0);
        let seq = Sequence::new().with_pad(pad);
        Some(Self::new(dir, &name[..start], &rest[d + 1..], seq))
    }

    /// Finds the on-disk sequence `path` belongs to.
    ///
    /// `path` itself does not have to exist; any sibling with the same prefix,
    /// suffix and a compatible token width is enough. Returns `None` for an
    /// unnumbered name or when no sibling exists.
    pub fn detect(path: &Path) -> IoResult<Option<Self>> {
        let Some(opened) = Self::from_path(path) else {
            return Ok(None);
        };
        let dir = opened.dir.clone();
        let listing = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir.as_path()
        };
        if !listing.is_dir() {
            return Ok(None);
        }

        let names = list_files(listing)?
            .into_iter()
            .filter(|n| n.starts_with(&opened.prefix) && n.ends_with(&opened.suffix))
            .collect::<Vec<_>>();

        let mut candidates: Vec<Self> = group_names(&dir, &names)
            .into_iter()
            .filter_map(|e| match e {
                ScanEntry::Sequence(seq) => Some(seq),
                ScanEntry::File(p) => Self::from_path(&p),
            })
            .filter(|seq| {
                seq.prefix == opened.prefix
                    && seq.suffix == opened.suffix
                    && pad_fits(opened.pad(), opened.token_width(), seq.pad())
            })
            .collect();

        // Prefer the group that already holds the frame.
        let frame = opened.sequence.first();
        let pick = candidates
            .iter()
            .position(|seq| seq.sequence.contains(frame))
            .or(if candidates.is_empty() { None } else { Some(0) });
        Ok(pick.map(|i| candidates.swap_remove(i)))
    }

    /// Directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name part before the frame token.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// File name part after the frame token.
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Frames present.
    pub fn sequence(&self) -> &Sequence {
        &self.sequence
    }

    /// Zero-pad width of the frame token, 0 for unpadded.
    pub fn pad(&self) -> usize {
        self.sequence.pad()
    }

    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        self.sequence.get_frame_count()
    }

    /// Path of `frame`, whether or not it exists.
    pub fn path_for(&self, frame: Number) -> PathBuf {
        let name = format!(
            "{}{}{}",
            self.prefix,
            frame::number_to_string(frame, self.pad()),
            self.suffix
        );
        self.dir.join(name)
    }

    /// Path of the first frame.
    pub fn first_path(&self) -> Option<PathBuf> {
        if self.sequence.is_empty() {
            None
        } else {
            Some(self.path_for(self.sequence.first()))
        }
    }

    /// Paths of every frame in order.
    pub fn paths(&self) -> impl Iterator<Item = PathBuf> + '_ {
        frame::to_frames(&self.sequence)
            .into_iter()
            .map(|f| self.path_for(f))
    }

    /// Hash pattern, `render.####.exr`.
    pub fn pattern(&self) -> String {
        let hashes = "#".repeat(self.pad().max(1));
        format!("{}{}{}", self.prefix, hashes, self.suffix)
    }

    fn token_width(&self) -> usize {
        let first = self.sequence.first();
        frame::number_to_string(first, 0).trim_start_matches('-').len()
    }
}

impl fmt::Display for FileSequence {
    /// `render.0001-0010.exr`, without the directory.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.prefix, self.sequence, self.suffix)
    }
}

/// Splits a file name into `(prefix, frame token, suffix)`.
///
/// The token is the last digit run before the extension, with a leading `-`
/// when that follows a separator.
///
/// ```rust
/// use reel_io::sequence::split_frame_number;
///
/// assert_eq!(split_frame_number("shot_v2.0042.exr"), Some(("shot_v2.", "0042", ".exr")));
/// assert_eq!(split_frame_number("shot.-005.exr"), Some(("shot.", "-005", ".exr")));
/// assert_eq!(split_frame_number("clip.mp4"), None);
/// ```
pub fn split_frame_number(file_name: &str) -> Option<(&str, &str, &str)> {
    let stem_end = match file_name.rfind('.') {
        Some(0) | None => file_name.len(),
        Some(i) => i,
    };
    let bytes = file_name.as_bytes();

    let end = bytes[..stem_end].iter().rposition(u8::is_ascii_digit)? + 1;
    let mut start = end;
    while start > 0 && bytes[start - 1].is_ascii_digit() {
        start -= 1;
    }
    if start >= 2 && bytes[start - 1] == b'-' && is_separator(bytes[start - 2]) {
        start -= 1;
    } else if start == 1 && bytes[0] == b'-' {
        start = 0;
    }

    Some((&file_name[..start], &file_name[start..end], &file_name[end..]))
}

fn is_separator(b: u8) -> bool {
    matches!(b, b'.' | b'_' | b' ')
}

/// Parsed frame token of one file name.
struct FrameToken<'a> {
    prefix: &'a str,
    suffix: &'a str,
    frame: Number,
    pad: usize,
    width: usize,
}

impl<'a> FrameToken<'a> {
    fn parse(name: &'a str) -> Option<Self> {
        let (prefix, token, suffix) = split_frame_number(name)?;
        let frame: Number = token.parse().ok()?;
        let digits = token.trim_start_matches('-');
        let pad = if digits.len() >= 2 && digits.starts_with('0') {
            digits.len()
        } else {
            0
        };
        Some(Self {
            prefix,
            suffix,
            frame,
            pad,
            width: digits.len(),
        })
    }
}

/// Whether a token of `pad`/`width` belongs to a sequence padded to `seq_pad`.
fn pad_fits(pad: usize, width: usize, seq_pad: usize) -> bool {
    pad == seq_pad || (pad == 0 && width >= seq_pad)
}

/// One result of a directory scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEntry {
    /// A file outside any sequence.
    File(PathBuf),
    /// Two or more numbered files.
    Sequence(FileSequence),
}

impl ScanEntry {
    /// First file of the entry.
    pub fn path(&self) -> PathBuf {
        match self {
            Self::File(p) => p.clone(),
            Self::Sequence(s) => s.first_path().unwrap_or_else(|| s.dir.clone()),
        }
    }

    /// Display name, sequences collapsed.
    pub fn name(&self) -> String {
        match self {
            Self::File(p) => p
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            Self::Sequence(s) => s.to_string(),
        }
    }

    /// The sequence, if any.
    pub fn as_sequence(&self) -> Option<&FileSequence> {
        match self {
            Self::Sequence(s) => Some(s),
            Self::File(_) => None,
        }
    }
}

fn list_files(dir: &Path) -> IoResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)?.flatten() {
        let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
        if !is_file {
            continue;
        }
        match entry.file_name().into_string() {
            Ok(name) => names.push(name),
            Err(name) => debug!(name = ?name, "skipping non-UTF-8 file name"),
        }
    }
    Ok(names)
}

/// Groups file names of one directory into sequences and single files.
///
/// Tokens group by prefix and suffix, then by pad width. An unpadded token
/// (`1000`) joins the widest padded group it fits (`0999`).
fn group_names(dir: &Path, names: &[String]) -> Vec<ScanEntry> {
    type Key<'a> = (&'a str, &'a str);
    let mut groups: BTreeMap<Key<'_>, Vec<FrameToken<'_>>> = BTreeMap::new();
    let mut entries = Vec::new();

    for name in names {
        match FrameToken::parse(name) {
            Some(token) => groups
                .entry((token.prefix, token.suffix))
                .or_default()
                .push(token),
            None => entries.push(ScanEntry::File(dir.join(name))),
        }
    }

    for ((prefix, suffix), tokens) in groups {
        let mut pads: Vec<usize> = tokens.iter().map(|t| t.pad).filter(|&p| p > 0).collect();
        pads.sort_unstable();
        pads.dedup();

        let mut by_pad: BTreeMap<usize, Vec<Number>> = BTreeMap::new();
        for t in &tokens {
            let pad = if t.pad > 0 {
                t.pad
            } else {
                pads.iter().copied().filter(|&p| p <= t.width).max().unwrap_or(0)
            };
            by_pad.entry(pad).or_default().push(t.frame);
        }

        for (pad, mut frames) in by_pad {
            frames.sort_unstable();
            frames.dedup();
            if frames.len() == 1 {
                let name = format!(
                    "{prefix}{}{suffix}",
                    frame::number_to_string(frames[0], pad)
                );
                entries.push(ScanEntry::File(dir.join(name)));
            } else {
                let seq = frame::from_frames(&frames).with_pad(pad);
                entries.push(ScanEntry::Sequence(FileSequence::new(dir, prefix, suffix, seq)));
            }
        }
    }

    entries.sort_by_key(|e| e.name());
    entries
}

/// Lists `dir` with numbered files collapsed into sequences.
///
/// Subdirectories are skipped. Output is sorted by display name.
pub fn scan_dir(dir: &Path) -> IoResult<Vec<ScanEntry>> {
    let names = list_files(dir)?;
    let entries = group_names(dir, &names);
    debug!(dir = %dir.display(), files = names.len(), entries = entries.len(), "scanned");
    Ok(entries)
}

/// Scans `dir` and opens the first file of every entry.
///
/// Failures are returned per entry and never abort the scan.
pub fn scan_dir_with(dir: &Path, registry: &Registry) -> IoResult<Vec<(ScanEntry, IoResult<Info>)>> {
    let entries = scan_dir(dir)?;
    let results = entries
        .into_iter()
        .map(|entry| {
            let path = entry.path();
            let info = registry.open(&path).map(|mut reader| {
                let info = reader.info().clone();
                reader.close();
                info
            });
            if let Err(e) = &info {
                match e.kind() {
                    ErrorKind::UnsupportedFormat => {
                        debug!(path = %path.display(), "no plugin")
                    }
                    _ => warn!(path = %path.display(), error = %e, "cannot open"),
                }
            }
            (entry, info)
        })
        .collect();
    Ok(results)
}
