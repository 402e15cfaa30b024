//! RIFF WAVE audio.
//!
//! Reads PCM (8/16/32-bit integer) and IEEE float (32/64-bit) streams,
//! including `WAVE_FORMAT_EXTENSIBLE` headers carrying either. Samples are
//! stored little-endian in the file and native in the returned buffers.
//!
//! For playback the stream is cut into chunks of one video frame's worth of
//! samples at the default speed, so `Info::sequence` indexes chunks.

use std::fs::File;
use std::io::{BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use reel_core::frame::{Number, Range, Sequence};
use reel_core::{AudioBuffer, AudioInfo, SampleType, Speed};
use tracing::{debug, trace, warn};

use crate::config::IoConfig;
use crate::plugin::{Frame, Info, MediaReader, Reader};
use crate::{IoError, IoResult};

const FORMAT_PCM: u16 = 0x0001;
const FORMAT_FLOAT: u16 = 0x0003;
const FORMAT_EXTENSIBLE: u16 = 0xfffe;

/// Where the samples live and how they are stored.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Layout {
    audio: AudioInfo,
    data_offset: u64,
    data_len: u64,
}

impl Layout {
    fn frame_count(&self) -> u64 {
        self.data_len / self.audio.frame_byte_count() as u64
    }
}

fn riff_err(e: std::io::Error) -> IoError {
    IoError::truncated(e, "WAV header")
}

fn parse<R: Read + Seek>(r: &mut R) -> IoResult<Layout> {
    let mut id = [0u8; 4];
    r.read_exact(&mut id).map_err(riff_err)?;
    let _riff_len = r.read_u32::<LittleEndian>().map_err(riff_err)?;
    let mut form = [0u8; 4];
    r.read_exact(&mut form).map_err(riff_err)?;
    if &id != b"RIFF" || &form != b"WAVE" {
        return Err(IoError::CorruptData("not a RIFF WAVE file".into()));
    }
    let file_len = r.seek(SeekFrom::End(0))?;
    r.seek(SeekFrom::Start(12))?;

    let mut audio = None;
    loop {
        let mut chunk = [0u8; 4];
        r.read_exact(&mut chunk).map_err(riff_err)?;
        let size = r.read_u32::<LittleEndian>().map_err(riff_err)? as u64;
        let start = r.stream_position()?;
        trace!(chunk = %String::from_utf8_lossy(&chunk), size, "WAV chunk");

        match &chunk {
            b"fmt " => audio = Some(parse_format(r, size)?),
            b"data" => {
                let audio = audio
                    .ok_or_else(|| IoError::CorruptData("WAV data chunk before fmt".into()))?;
                let mut data_len = size;
                if start + size > file_len {
                    warn!(declared = size, available = file_len - start, "WAV data chunk truncated");
                    data_len = file_len - start;
                }
                let frame = audio.frame_byte_count() as u64;
                return Ok(Layout {
                    audio,
                    data_offset: start,
                    data_len: data_len / frame * frame,
                });
            }
            _ => {}
        }
        // Chunks are padded to even sizes.
        r.seek(SeekFrom::Start(start + size + (size & 1)))?;
    }
}

fn parse_format<R: Read>(r: &mut R, size: u64) -> IoResult<AudioInfo> {
    if size < 16 {
        return Err(IoError::CorruptData(format!("WAV fmt chunk of {size} bytes")));
    }
    let mut tag = r.read_u16::<LittleEndian>().map_err(riff_err)?;
    let channels = r.read_u16::<LittleEndian>().map_err(riff_err)?;
    let rate = r.read_u32::<LittleEndian>().map_err(riff_err)?;
    let _byte_rate = r.read_u32::<LittleEndian>().map_err(riff_err)?;
    let _block_align = r.read_u16::<LittleEndian>().map_err(riff_err)?;
    let bits = r.read_u16::<LittleEndian>().map_err(riff_err)?;

    if tag == FORMAT_EXTENSIBLE {
        if size < 40 {
            return Err(IoError::CorruptData("short WAVE_FORMAT_EXTENSIBLE header".into()));
        }
        let mut ext = [0u8; 24];
        r.read_exact(&mut ext).map_err(riff_err)?;
        // cbSize, valid bits, channel mask, then the sub-format GUID.
        tag = u16::from_le_bytes([ext[8], ext[9]]);
    }

    let sample_type = match tag {
        FORMAT_PCM => SampleType::from_int_bits(bits),
        FORMAT_FLOAT => SampleType::from_float_bits(bits),
        other => {
            return Err(IoError::UnsupportedVariant(format!("WAV format tag {other:#06x}")));
        }
    };
    if !sample_type.is_valid() {
        return Err(IoError::UnsupportedVariant(format!("WAV with {bits}-bit samples")));
    }
    let channels = u8::try_from(channels)
        .ok()
        .filter(|&c| c > 0)
        .ok_or_else(|| IoError::UnsupportedVariant(format!("WAV with {channels} channels")))?;
    if rate == 0 {
        return Err(IoError::CorruptData("WAV sample rate is zero".into()));
    }
    Ok(AudioInfo::new(channels, sample_type, rate))
}

/// Reorders little-endian samples of `width` bytes into native order.
fn le_to_native(data: &mut [u8], width: usize) {
    if cfg!(target_endian = "big") && width > 1 {
        for s in data.chunks_exact_mut(width) {
            s.reverse();
        }
    }
}

fn read_samples<R: Read + Seek>(
    r: &mut R,
    layout: &Layout,
    first_frame: u64,
    frames: u64,
) -> IoResult<AudioBuffer> {
    let frame_bytes = layout.audio.frame_byte_count() as u64;
    r.seek(SeekFrom::Start(layout.data_offset + first_frame * frame_bytes))?;
    let mut data = vec![0u8; (frames * frame_bytes) as usize];
    r.read_exact(&mut data)
        .map_err(|e| IoError::truncated(e, "WAV samples"))?;
    le_to_native(&mut data, layout.audio.sample_type.byte_count());
    Ok(AudioBuffer::from_vec(layout.audio, data)?)
}

/// Decodes a whole WAV file held in memory.
pub fn decode(data: &[u8]) -> IoResult<AudioBuffer> {
    let mut cursor = Cursor::new(data);
    let layout = parse(&mut cursor)?;
    read_samples(&mut cursor, &layout, 0, layout.frame_count())
}

/// Serializes `audio` as a canonical 44-byte-header WAV.
///
/// `S8` is stored as offset-binary `U8`, the only 8-bit form WAV has.
pub fn encode(audio: &AudioBuffer) -> IoResult<Vec<u8>> {
    let converted;
    let audio = match audio.sample_type() {
        SampleType::None => {
            return Err(IoError::InvalidArgument("audio sample type is None".into()));
        }
        SampleType::S8 => {
            converted = reel_core::audio::convert(audio, SampleType::U8)?;
            &converted
        }
        _ => audio,
    };
    let info = *audio.info();
    if info.channels == 0 || info.sample_rate == 0 {
        return Err(IoError::InvalidArgument(format!(
            "cannot write {} channels at {} Hz",
            info.channels, info.sample_rate
        )));
    }
    let width = info.sample_type.byte_count();
    let data_len = u32::try_from(audio.byte_count())
        .map_err(|_| IoError::EncodeFailure("audio too long for a RIFF file".into()))?;
    let tag = if info.sample_type.is_float() { FORMAT_FLOAT } else { FORMAT_PCM };
    let block_align = info.frame_byte_count() as u16;

    let mut out = Vec::with_capacity(44 + audio.byte_count() + 1);
    out.extend_from_slice(b"RIFF");
    out.write_u32::<LittleEndian>(36 + data_len + (data_len & 1))?;
    out.extend_from_slice(b"WAVEfmt ");
    out.write_u32::<LittleEndian>(16)?;
    out.write_u16::<LittleEndian>(tag)?;
    out.write_u16::<LittleEndian>(info.channels as u16)?;
    out.write_u32::<LittleEndian>(info.sample_rate)?;
    out.write_u32::<LittleEndian>(info.sample_rate * block_align as u32)?;
    out.write_u16::<LittleEndian>(block_align)?;
    out.write_u16::<LittleEndian>(info.sample_type.bit_depth() as u16)?;
    out.extend_from_slice(b"data");
    out.write_u32::<LittleEndian>(data_len)?;

    let start = out.len();
    out.extend_from_slice(audio.data());
    // Native to little-endian is the same byte reversal.
    le_to_native(&mut out[start..], width);
    if data_len & 1 == 1 {
        out.push(0);
    }
    Ok(out)
}

/// Writes `audio` to `path`.
pub fn write(path: &Path, audio: &AudioBuffer) -> IoResult<()> {
    let bytes = encode(audio)?;
    let mut w = BufWriter::new(File::create(path)?);
    w.write_all(&bytes)?;
    w.flush()?;
    debug!(path = %path.display(), samples = audio.sample_count(), "WAV written");
    Ok(())
}

/// Open WAV file.
#[derive(Debug)]
pub struct WavReader {
    path: PathBuf,
    file: Option<File>,
    layout: Layout,
    chunk_frames: u64,
    info: Info,
}

impl WavReader {
    /// Parses the header of `path`.
    pub fn open(path: &Path, _config: &IoConfig) -> IoResult<Self> {
        if !path.is_file() {
            return Err(IoError::not_found(path));
        }
        let mut file = File::open(path)?;
        let layout = parse(&mut file)?;

        let speed = Speed::default();
        let chunk_frames = chunk_frames(layout.audio.sample_rate, speed);
        let chunks = layout.frame_count().div_ceil(chunk_frames);
        let sequence = match chunks {
            0 => Sequence::new(),
            n => Sequence::from_range(Range::new(0, n as Number - 1)),
        };
        debug!(
            path = %path.display(),
            channels = layout.audio.channels,
            sample_type = %layout.audio.sample_type,
            rate = layout.audio.sample_rate,
            frames = layout.frame_count(),
            "opened"
        );

        let info = Info {
            file_name: path.display().to_string(),
            video: Vec::new(),
            audio: Some(layout.audio),
            speed,
            sequence,
            tags: Default::default(),
        };
        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
            layout,
            chunk_frames,
            info,
        })
    }

    /// Sample frames per playback chunk.
    pub fn chunk_frames(&self) -> u64 {
        self.chunk_frames
    }
}

fn chunk_frames(sample_rate: u32, speed: Speed) -> u64 {
    let fps = speed.to_f64();
    if fps <= 0.0 {
        return sample_rate as u64;
    }
    ((sample_rate as f64 / fps).round() as u64).max(1)
}

impl MediaReader for WavReader {
    fn info(&self) -> &Info {
        &self.info
    }

    fn decode(&mut self, frame: Option<Number>) -> IoResult<Frame> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| IoError::InvalidArgument("reader is closed".into()))?;
        let total = self.layout.frame_count();
        let (first, count) = match frame {
            None => (0, total),
            Some(n) => {
                let first = u64::try_from(n)
                    .ok()
                    .and_then(|n| n.checked_mul(self.chunk_frames))
                    .filter(|&f| f < total)
                    .ok_or_else(|| {
                        IoError::InvalidArgument(format!(
                            "audio chunk {n} outside {}",
                            self.path.display()
                        ))
                    })?;
                (first, self.chunk_frames.min(total - first))
            }
        };
        trace!(path = %self.path.display(), first, count, "decode");
        Ok(Frame::Audio(read_samples(file, &self.layout, first, count)?))
    }

    fn close(&mut self) {
        self.file = None;
    }
}

/// Opens a WAV file.
pub fn open(path: &Path, config: &IoConfig) -> IoResult<Reader> {
    Ok(Reader::Wav(WavReader::open(path, config)?))
}
