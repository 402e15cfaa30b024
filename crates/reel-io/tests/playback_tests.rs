//! Integration tests for read-ahead playback.

use std::path::Path;
use std::sync::Arc;

use reel_core::{ImageBuffer, ImageInfo, PixelType, Size};
use reel_io::{DecodedFrame, ErrorKind, IoConfig, Playback, PlaybackOptions, Registry};

/// Writes `count` DPX frames starting at 1, each filled with its frame number.
fn write_frames(dir: &Path, count: u8) -> Arc<Registry> {
    let config = IoConfig {
        read_ahead: 2,
        ..IoConfig::default()
    };
    let registry = Registry::with_builtin().with_config(config);
    for frame in 1..=count {
        let mut img = ImageBuffer::new(ImageInfo::new(Size::new(4, 4), PixelType::L_U8));
        img.data_mut().fill(frame);
        registry
            .write(&dir.join(format!("seq.{frame:04}.dpx")), &img)
            .unwrap();
    }
    Arc::new(registry)
}

fn value(frame: &DecodedFrame) -> u8 {
    frame.frame.as_video().unwrap().data()[0]
}

#[test]
fn playback_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let registry = write_frames(dir.path(), 5);
    let playback = Playback::start(
        registry,
        &dir.path().join("seq.0001.dpx"),
        PlaybackOptions::default(),
    )
    .unwrap();
    assert_eq!(playback.info().frame_count(), 5);

    let mut seen = Vec::new();
    while let Some(frame) = playback.recv() {
        let frame = frame.unwrap();
        assert_eq!(frame.frame_number, Some(frame.index as i64 + 1));
        seen.push(value(&frame));
    }
    assert_eq!(seen, vec![1, 2, 3, 4, 5]);
}

#[test]
fn playback_seek() {
    let dir = tempfile::tempdir().unwrap();
    let registry = write_frames(dir.path(), 6);
    let playback = Playback::start(
        registry,
        &dir.path().join("seq.0001.dpx"),
        PlaybackOptions::default(),
    )
    .unwrap();

    let first = playback.recv().unwrap().unwrap();
    assert_eq!(first.index, 0);

    playback.seek(4).unwrap();
    let next = playback.recv().unwrap().unwrap();
    assert_eq!(next.index, 4);
    assert_eq!(value(&next), 5);
    assert_eq!(playback.recv().unwrap().unwrap().index, 5);
    assert!(playback.recv().is_none());

    // The decoder idles at the end and still answers seeks.
    playback.seek(1).unwrap();
    assert_eq!(playback.recv().unwrap().unwrap().index, 1);

    let err = playback.seek(6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn playback_start_index_and_target() {
    let dir = tempfile::tempdir().unwrap();
    let registry = write_frames(dir.path(), 3);
    let options = PlaybackOptions {
        target: Some(PixelType::RGBA_F32),
        start: 2,
    };
    let playback = Playback::start(registry, &dir.path().join("seq.0002.dpx"), options).unwrap();

    let frame = playback.recv().unwrap().unwrap();
    assert_eq!(frame.index, 2);
    let img = frame.frame.as_video().unwrap();
    assert_eq!(img.pixel_type(), PixelType::RGBA_F32);
    let alpha = f32::from_ne_bytes(img.data()[12..16].try_into().unwrap());
    approx::assert_relative_eq!(alpha, 1.0);
    assert!(playback.recv().is_none());
}

#[test]
fn playback_cancel() {
    let dir = tempfile::tempdir().unwrap();
    let registry = write_frames(dir.path(), 8);
    let playback = Playback::start(
        registry,
        &dir.path().join("seq.0001.dpx"),
        PlaybackOptions::default(),
    )
    .unwrap();

    assert!(playback.recv().unwrap().is_ok());
    playback.cancel();
    assert!(playback.is_cancelled());

    let mut rest = 0;
    while playback.recv().is_some() {
        rest += 1;
    }
    assert!(rest < 7);
}

#[test]
fn playback_forwards_errors() {
    let dir = tempfile::tempdir().unwrap();
    let registry = write_frames(dir.path(), 3);
    std::fs::write(dir.path().join("seq.0002.dpx"), b"SDPX").unwrap();

    let playback = Playback::start(
        registry,
        &dir.path().join("seq.0001.dpx"),
        PlaybackOptions::default(),
    )
    .unwrap();
    assert_eq!(value(&playback.recv().unwrap().unwrap()), 1);
    let err = playback.recv().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptData);
    assert!(playback.recv().is_none());
}

#[test]
fn playback_error_survives_seek() {
    let dir = tempfile::tempdir().unwrap();
    let registry = write_frames(dir.path(), 4);
    for frame in 2..=4 {
        std::fs::write(dir.path().join(format!("seq.{frame:04}.dpx")), b"SDPX").unwrap();
    }

    let options = PlaybackOptions {
        start: 1,
        ..PlaybackOptions::default()
    };
    let playback = Playback::start(registry, &dir.path().join("seq.0001.dpx"), options).unwrap();
    // Races the failing decode; the thread may already be gone.
    let _ = playback.seek(2);

    let err = playback.recv().expect("error delivered").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptData);
    assert!(playback.recv().is_none());
}

#[test]
fn playback_open_failure() {
    let dir = tempfile::tempdir().unwrap();
    let err = Playback::start(
        Arc::new(Registry::with_builtin()),
        &dir.path().join("nothing.0001.dpx"),
        PlaybackOptions::default(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::FileNotFound);
}
