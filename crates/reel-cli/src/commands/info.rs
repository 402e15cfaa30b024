//! File info command.
//!
//! Opens each input through the registry and prints its header: video
//! layers, audio, speed, frame range and tags.

use crate::InfoArgs;
use anyhow::{Context, Result};
use reel_core::time::{self, Units};
use reel_io::{MediaReader, Reader, Registry};
use std::fs;
use std::path::Path;
use tracing::trace;

/// Runs the info command.
pub fn run(args: InfoArgs, registry: &Registry, verbose: u8) -> Result<()> {
    for (i, path) in args.input.iter().enumerate() {
        trace!(path = %path.display(), "info::run");
        if i > 0 {
            println!();
        }
        let mut reader = registry
            .open(path)
            .with_context(|| format!("Failed to open: {}", path.display()))?;
        print_text(path, &reader, verbose);
        reader.close();
    }
    Ok(())
}

fn print_text(path: &Path, reader: &Reader, verbose: u8) {
    let info = reader.info();
    println!("{}", path.display());
    println!("  Plugin:     {}", reader.kind());
    if let Ok(meta) = fs::metadata(path) {
        println!("  File size:  {}", super::format_size(meta.len()));
    }

    for (idx, video) in info.video.iter().enumerate() {
        let label = if info.video.len() > 1 {
            format!("  Layer {idx}:    ")
        } else {
            "  Resolution: ".to_string()
        };
        println!("{label}{}x{}", video.size.w, video.size.h);
        println!("  Pixel type: {}", video.pixel_type);
        println!("  Aspect:     {:.4}", video.aspect_ratio());
        if (video.pixel_aspect_ratio - 1.0).abs() > f32::EPSILON {
            println!("  Pixel aspect: {:.4}", video.pixel_aspect_ratio);
        }
        if let Some(codec) = &video.codec {
            println!("  Codec:      {codec}");
        }
        if verbose > 0 {
            let layout = video.layout;
            println!(
                "  Layout:     {:?} endian, align {}, mirror x={} y={}",
                layout.endian, layout.alignment, layout.mirror.x, layout.mirror.y
            );
        }
    }

    if let Some(audio) = info.audio {
        println!(
            "  Audio:      {} ch, {}, {} Hz",
            audio.channels, audio.sample_type, audio.sample_rate
        );
    }

    let fps = info.speed.to_f64();
    println!("  Speed:      {:.3} fps ({})", fps, info.speed);
    if !info.sequence.is_empty() {
        let count = info.sequence.get_frame_count();
        println!("  Frames:     {} ({} frames)", info.sequence, count);
        println!(
            "  Duration:   {}",
            time::to_string(count as i64, info.speed, Units::Timecode)
        );
    }

    if !info.tags.is_empty() {
        println!("  Tags:");
        for (key, value) in info.tags.iter() {
            println!("    {key}: {value}");
        }
    }
}
