//! Read-ahead playback.
//!
//! [`Playback`] opens a source and decodes it on one background thread that
//! owns the [`Reader`]. Decoded frames queue in a bounded channel of
//! `read_ahead` slots, so the decoder blocks once it is that far ahead.
//!
//! Seeking bumps a generation counter and tells the decoder where to resume.
//! Frames already queued carry the old generation and are dropped by
//! [`Playback::recv`]. A decode error ends the thread and is always
//! delivered, even when a seek raced it. Cancellation is checked between
//! frames, never inside a decode.
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use reel_io::{Playback, PlaybackOptions, Registry};
//!
//! let registry = Arc::new(Registry::with_builtin());
//! let playback = Playback::start(registry, Path::new("plate.0001.dpx"), PlaybackOptions::default())?;
//! while let Some(frame) = playback.recv() {
//!     let frame = frame?;
//!     println!("frame {:?}", frame.frame_number);
//! }
//! # Ok::<(), reel_io::IoError>(())
//! ```

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread;

use kanal::{Receiver, Sender};
use reel_core::PixelType;
use reel_core::convert::convert_image;
use reel_core::frame::Number;
use tracing::{debug, error, trace};

use crate::plugin::{Frame, Info, MediaReader, Reader};
use crate::registry::Registry;
use crate::{IoError, IoResult};

/// Playback settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlaybackOptions {
    /// Converts decoded images to this type on the decode thread.
    pub target: Option<PixelType>,
    /// Playback index to start at.
    pub start: usize,
}

/// A frame delivered by [`Playback`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    /// Position in playback order, from 0.
    pub index: usize,
    /// Frame number in the source sequence, `None` for a single file.
    pub frame_number: Option<Number>,
    /// Decoded content.
    pub frame: Frame,
}

enum Payload {
    Frame(DecodedFrame),
    Error(IoError),
    End,
}

struct Packet {
    generation: u64,
    payload: Payload,
}

enum Command {
    Seek { index: usize, generation: u64 },
}

/// Background decoder with a bounded frame queue.
pub struct Playback {
    info: Info,
    frames: Receiver<Packet>,
    commands: Sender<Command>,
    generation: Arc<AtomicU64>,
    cancelled: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Playback {
    /// Opens `path` through `registry` and starts decoding.
    ///
    /// Queue depth is the registry's `read_ahead` setting.
    pub fn start(registry: Arc<Registry>, path: &Path, options: PlaybackOptions) -> IoResult<Self> {
        let reader = registry.open(path)?;
        let info = reader.info().clone();
        let read_ahead = registry.config().read_ahead.max(1);

        let (frame_tx, frame_rx) = kanal::bounded::<Packet>(read_ahead);
        let (command_tx, command_rx) = kanal::unbounded::<Command>();
        let generation = Arc::new(AtomicU64::new(0));
        let cancelled = Arc::new(AtomicBool::new(false));

        let worker = Worker {
            reader,
            target: options.target,
            frames: frame_tx,
            commands: command_rx,
            cancelled: cancelled.clone(),
        };
        let start = options.start;
        let thread = thread::Builder::new()
            .name("reel-decode".into())
            .spawn(move || worker.run(start))?;

        debug!(
            path = %path.display(),
            frames = info.frame_count(),
            read_ahead,
            "playback started"
        );
        Ok(Self {
            info,
            frames: frame_rx,
            commands: command_tx,
            generation,
            cancelled,
            thread: Some(thread),
        })
    }

    /// Description of the source.
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Blocks for the next frame.
    ///
    /// Returns `None` at the end of the source, after cancellation, or once
    /// an error has been delivered and the decoder has stopped.
    pub fn recv(&self) -> Option<IoResult<DecodedFrame>> {
        loop {
            let packet = self.frames.recv().ok()?;
            if let Some(out) = self.accept(packet) {
                return out;
            }
        }
    }

    /// Returns a queued frame without blocking.
    pub fn try_recv(&self) -> Option<IoResult<DecodedFrame>> {
        loop {
            let packet = self.frames.try_recv().ok()??;
            if let Some(out) = self.accept(packet) {
                return out;
            }
        }
    }

    /// `None` for a stale packet, otherwise what `recv` hands out.
    #[allow(clippy::option_option)]
    fn accept(&self, packet: Packet) -> Option<Option<IoResult<DecodedFrame>>> {
        // An error stops the decoder, so it is delivered whatever its generation.
        let stale = packet.generation != self.generation.load(Ordering::Acquire);
        if stale && !matches!(packet.payload, Payload::Error(_)) {
            trace!(generation = packet.generation, "dropping stale frame");
            return None;
        }
        Some(match packet.payload {
            Payload::Frame(frame) => Some(Ok(frame)),
            Payload::Error(e) => Some(Err(e)),
            Payload::End => None,
        })
    }

    /// Restarts delivery at playback index `index`.
    pub fn seek(&self, index: usize) -> IoResult<()> {
        if index >= self.info.frame_count() {
            return Err(IoError::InvalidArgument(format!(
                "seek to {index} outside 0..{}",
                self.info.frame_count()
            )));
        }
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(index, generation, "seek");
        self.commands
            .send(Command::Seek { index, generation })
            .map_err(|_| IoError::DecodeFailure("decode thread has stopped".into()))
    }

    /// Stops the decoder after the frame in progress.
    pub fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            debug!("playback cancelled");
        }
        let _ = self.frames.close();
        let _ = self.commands.close();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("decode thread panicked");
            }
        }
    }
}

impl std::fmt::Debug for Playback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Playback")
            .field("file_name", &self.info.file_name)
            .field("generation", &self.generation.load(Ordering::Relaxed))
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

struct Worker {
    reader: Reader,
    target: Option<PixelType>,
    frames: Sender<Packet>,
    commands: Receiver<Command>,
    cancelled: Arc<AtomicBool>,
}

impl Worker {
    fn run(mut self, start: usize) {
        let count = self.reader.info().frame_count();
        let mut index = start;
        let mut generation = 0;

        loop {
            if self.cancelled.load(Ordering::Acquire) {
                break;
            }
            match self.commands.try_recv() {
                Ok(Some(Command::Seek { index: i, generation: g })) => {
                    index = i;
                    generation = g;
                    continue;
                }
                Ok(None) => {}
                Err(_) => break,
            }

            if index >= count {
                let end = Packet {
                    generation,
                    payload: Payload::End,
                };
                if self.frames.send(end).is_err() {
                    break;
                }
                // Idle until a seek or shutdown.
                match self.commands.recv() {
                    Ok(Command::Seek { index: i, generation: g }) => {
                        index = i;
                        generation = g;
                        continue;
                    }
                    Err(_) => break,
                }
            }

            let payload = match self.decode(index) {
                Ok(frame) => Payload::Frame(frame),
                Err(e) => {
                    error!(index, error = %e, "decode failed");
                    let _ = self.frames.send(Packet {
                        generation,
                        payload: Payload::Error(e),
                    });
                    break;
                }
            };
            if self.frames.send(Packet { generation, payload }).is_err() {
                break;
            }
            index += 1;
        }

        self.reader.close();
        trace!("decode thread finished");
    }

    fn decode(&mut self, index: usize) -> IoResult<DecodedFrame> {
        let frame_number = self.reader.info().frame_at(index);
        let frame = match self.reader.decode(frame_number)? {
            Frame::Video(img) => match self.target {
                Some(pt) if pt != img.pixel_type() => Frame::Video(convert_image(&img, pt)?),
                _ => Frame::Video(img),
            },
            audio => audio,
        };
        trace!(index, ?frame_number, "decoded");
        Ok(DecodedFrame {
            index,
            frame_number,
            frame,
        })
    }
}
