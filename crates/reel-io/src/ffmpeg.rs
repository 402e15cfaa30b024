//! Movie files through the external `ffmpeg` and `ffprobe` tools.
//!
//! `ffprobe` describes the container as JSON: the first video stream becomes
//! an `RGBA_U8` layer, the first audio stream an `F32` audio description and
//! the container metadata becomes tags. Frames are decoded by an `ffmpeg`
//! child writing raw RGBA to a pipe. Sequential requests keep reading the
//! same pipe; any other request restarts the child at that frame.
//!
//! Tool locations come from [`FfmpegOptions`](crate::config::FfmpegOptions).

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};

use reel_core::frame::{Number, Range, Sequence};
use reel_core::{
    AudioBuffer, AudioInfo, ImageBuffer, ImageInfo, PixelType, SampleType, Size, Speed,
};
use serde::Deserialize;
use tracing::{debug, trace, warn};

use crate::config::{FfmpegOptions, IoConfig};
use crate::plugin::{align, Frame, Info, MediaReader, Reader};
use crate::{IoError, IoResult};

#[derive(Debug, Default, Deserialize)]
struct StreamReport {
    #[serde(default)]
    streams: Vec<ReportStream>,
    #[serde(default)]
    format: ReportFormat,
}

#[derive(Debug, Default, Deserialize)]
struct ReportStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
    sample_aspect_ratio: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u32>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
struct ReportFormat {
    format_name: Option<String>,
    duration: Option<String>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

/// Parses `"num/den"` or `"num:den"`.
fn parse_ratio(s: &str) -> Option<(u32, u32)> {
    let (num, den) = s.split_once(['/', ':'])?;
    let num = num.trim().parse().ok()?;
    let den = den.trim().parse().ok()?;
    (num > 0 && den > 0).then_some((num, den))
}

#[derive(Debug, Clone, PartialEq)]
struct Described {
    info: Info,
    frame_count: usize,
}

fn describe(path: &Path, json: &[u8]) -> IoResult<Described> {
    let report: StreamReport = serde_json::from_slice(json)
        .map_err(|e| IoError::CorruptData(format!("ffprobe output: {e}")))?;
    let video = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"));
    let audio = report
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    if video.is_none() && audio.is_none() {
        return Err(IoError::UnsupportedVariant(format!(
            "{} has no video or audio stream",
            path.display()
        )));
    }

    let mut info = Info {
        file_name: path.display().to_string(),
        ..Info::default()
    };
    let mut frame_count = 0;
    if let Some(v) = video {
        let (w, h) = match (v.width, v.height) {
            (Some(w), Some(h)) => (w, h),
            _ => return Err(IoError::CorruptData("ffprobe reports no video size".into())),
        };
        let mut image = ImageInfo::new(Size::from_u32(w, h)?, PixelType::RGBA_U8);
        image.codec = v.codec_name.clone();
        if let Some((x, y)) = v.sample_aspect_ratio.as_deref().and_then(parse_ratio) {
            image.pixel_aspect_ratio = x as f32 / y as f32;
        }
        info.video.push(image);

        let rate = v
            .r_frame_rate
            .as_deref()
            .and_then(parse_ratio)
            .or_else(|| v.avg_frame_rate.as_deref().and_then(parse_ratio));
        if let Some((num, den)) = rate {
            info.speed = Speed::new(num, den);
        }
        let duration = v
            .duration
            .as_deref()
            .or(report.format.duration.as_deref())
            .and_then(|d| d.parse::<f64>().ok());
        frame_count = match v.nb_frames.as_deref().and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n > 0 => n,
            _ => duration.map_or(0, |d| (d * info.speed.to_f64()).round() as usize),
        };
        if frame_count > 0 {
            info.sequence = Sequence::from_range(Range::new(0, frame_count as Number - 1));
        }
        for (key, value) in &v.tags {
            info.tags.set(key.clone(), value.clone());
        }
    }
    if let Some(a) = audio {
        let rate = a.sample_rate.as_deref().and_then(|r| r.parse::<u32>().ok()).unwrap_or(0);
        let channels = a.channels.and_then(|c| u8::try_from(c).ok()).unwrap_or(0);
        let audio = AudioInfo::new(channels, SampleType::F32, rate);
        if audio.is_valid() {
            info.audio = Some(audio);
        } else {
            warn!(path = %path.display(), channels, rate, "ignoring malformed audio stream");
        }
    }
    for (key, value) in &report.format.tags {
        info.tags.set(key.clone(), value.clone());
    }
    if let Some(name) = &report.format.format_name {
        info.tags.set("Format", name.clone());
    }
    Ok(Described { info, frame_count })
}

fn read_info(path: &Path, tools: &FfmpegOptions) -> IoResult<Described> {
    let out = Command::new(&tools.ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| IoError::DecodeFailure(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(IoError::CorruptData(format!(
            "ffprobe failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    describe(path, &out.stdout)
}

/// Running `ffmpeg` child streaming raw frames.
#[derive(Debug)]
struct Pipe {
    child: Child,
    stdout: ChildStdout,
    next: Number,
}

impl Pipe {
    fn spawn(tools: &FfmpegOptions, path: &Path, start: Number, speed: Speed) -> IoResult<Self> {
        let seconds = start as f64 / speed.to_f64();
        let mut child = Command::new(&tools.ffmpeg)
            .args(["-v", "error", "-nostdin", "-ss", &format!("{seconds:.9}")])
            .arg("-i")
            .arg(path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgba", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| IoError::DecodeFailure(format!("failed to run ffmpeg: {e}")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| IoError::DecodeFailure("ffmpeg stdout unavailable".into()))?;
        debug!(path = %path.display(), start, "ffmpeg pipe started");
        Ok(Self {
            child,
            stdout,
            next: start,
        })
    }

    fn stop(&mut self) {
        if let Err(e) = self.child.kill() {
            trace!(error = %e, "ffmpeg already exited");
        }
        let _ = self.child.wait();
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open movie.
#[derive(Debug)]
pub struct FfmpegReader {
    path: PathBuf,
    tools: FfmpegOptions,
    alignment: u8,
    info: Info,
    frame_count: usize,
    pipe: Option<Pipe>,
    closed: bool,
}

impl FfmpegReader {
    /// Describes `path` with `ffprobe`.
    pub fn open(path: &Path, config: &IoConfig) -> IoResult<Self> {
        if !path.is_file() {
            return Err(IoError::not_found(path));
        }
        let Described { info, frame_count } = read_info(path, &config.ffmpeg)?;
        debug!(
            path = %path.display(),
            frames = frame_count,
            speed = %info.speed,
            audio = info.audio.is_some(),
            "opened"
        );
        Ok(Self {
            path: path.to_path_buf(),
            tools: config.ffmpeg.clone(),
            alignment: config.alignment,
            info,
            frame_count,
            pipe: None,
            closed: false,
        })
    }

    fn read_video(&mut self, frame: Number) -> IoResult<ImageBuffer> {
        let image = self
            .info
            .video
            .first()
            .cloned()
            .ok_or_else(|| IoError::InvalidArgument("source has no video".into()))?;
        if frame < 0 || (self.frame_count > 0 && frame as usize >= self.frame_count) {
            return Err(IoError::InvalidArgument(format!(
                "frame {frame} outside 0..{}",
                self.frame_count
            )));
        }

        let reuse = matches!(&self.pipe, Some(p) if p.next == frame);
        if !reuse {
            self.pipe = None;
            self.pipe = Some(Pipe::spawn(&self.tools, &self.path, frame, self.info.speed)?);
        }
        let pipe = self
            .pipe
            .as_mut()
            .ok_or_else(|| IoError::DecodeFailure("ffmpeg pipe missing".into()))?;

        let mut data = vec![0u8; image.data_byte_count()];
        if let Err(e) = pipe.stdout.read_exact(&mut data) {
            self.pipe = None;
            return Err(IoError::DecodeFailure(format!(
                "ffmpeg stream for '{}' ended at frame {frame}: {e}",
                self.path.display()
            )));
        }
        pipe.next = frame + 1;
        trace!(path = %self.path.display(), frame, "decode");
        let buffer = ImageBuffer::from_vec(image, data)?;
        align(buffer, self.alignment)
    }

    /// Decodes the whole audio stream as interleaved `F32`.
    pub fn read_audio(&self) -> IoResult<AudioBuffer> {
        let audio = self
            .info
            .audio
            .ok_or_else(|| IoError::InvalidArgument("source has no audio".into()))?;
        let out = Command::new(&self.tools.ffmpeg)
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&self.path)
            .args(["-vn", "-f", "f32le", "-acodec", "pcm_f32le"])
            .args(["-ac", &audio.channels.to_string()])
            .args(["-ar", &audio.sample_rate.to_string(), "pipe:1"])
            .output()
            .map_err(|e| IoError::DecodeFailure(format!("failed to run ffmpeg: {e}")))?;
        if !out.status.success() {
            return Err(IoError::DecodeFailure(format!(
                "ffmpeg audio decode failed for '{}': {}",
                self.path.display(),
                String::from_utf8_lossy(&out.stderr).trim()
            )));
        }
        let mut data = out.stdout;
        data.truncate(data.len() / audio.frame_byte_count() * audio.frame_byte_count());
        if cfg!(target_endian = "big") {
            for s in data.chunks_exact_mut(4) {
                s.reverse();
            }
        }
        Ok(AudioBuffer::from_vec(audio, data)?)
    }
}

impl MediaReader for FfmpegReader {
    fn info(&self) -> &Info {
        &self.info
    }

    fn decode(&mut self, frame: Option<Number>) -> IoResult<Frame> {
        if self.closed {
            return Err(IoError::InvalidArgument("reader is closed".into()));
        }
        if self.info.video.is_empty() {
            return Ok(Frame::Audio(self.read_audio()?));
        }
        Ok(Frame::Video(self.read_video(frame.unwrap_or(0))?))
    }

    fn close(&mut self) {
        self.pipe = None;
        self.closed = true;
    }
}

/// Opens a movie file.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Ffmpeg(FfmpegReader::open(path, config)?))
}
