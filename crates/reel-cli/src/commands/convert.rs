//! Format conversion command.
//!
//! Single files are decoded, converted and written directly. Sequences run
//! through a [`Playback`] so decoding and pixel conversion overlap with
//! writing; output names come from a `####` pattern or a numbered file name.

use crate::ConvertArgs;
use anyhow::{Context, Result, bail};
use reel_core::convert::convert_image;
use reel_core::frame::Number;
use reel_core::{ImageBuffer, PixelType, Sequence};
use reel_io::{FileSequence, Info, MediaReader, Playback, PlaybackOptions, Registry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// Runs the convert command.
pub fn run(args: ConvertArgs, registry: Registry, verbose: u8) -> Result<()> {
    trace!(input = %args.input.display(), output = %args.output.display(), "convert::run");

    let target = args
        .pixel_type
        .as_deref()
        .map(str::parse::<PixelType>)
        .transpose()
        .context("Invalid --type")?;

    let writable = registry
        .lookup(&args.output)
        .is_some_and(|e| e.capabilities().write);
    if !writable {
        bail!("No writer for output: {}", args.output.display());
    }

    let mut reader = registry
        .open(&args.input)
        .with_context(|| format!("Failed to open: {}", args.input.display()))?;
    let source = reader.info().clone();
    if !source.has_video() {
        bail!("{} holds no images", args.input.display());
    }

    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        target = ?target,
        frames = source.frame_count(),
        "Converting"
    );
    if verbose > 0 {
        println!("Converting {} -> {}", args.input.display(), args.output.display());
    }

    if source.sequence.is_empty() {
        if args.frames.is_some() {
            warn!("--frames ignored for a single file");
        }
        let image = reader
            .decode(None)?
            .into_video()
            .context("Decoded frame holds no image")?;
        reader.close();
        let image = retype(image, target)?;
        return save(&registry, &args.output, &image);
    }
    reader.close();

    let wanted = select_frames(&source, args.frames.as_deref())?;
    let names = output_names(&args.output, &wanted)?;
    convert_sequence(Arc::new(registry), &args.input, &source, &wanted, &names, target, verbose)
}

fn retype(image: ImageBuffer, target: Option<PixelType>) -> Result<ImageBuffer> {
    match target {
        Some(pt) if pt != image.pixel_type() => {
            debug!(from = %image.pixel_type(), to = %pt, "Converting pixel type");
            Ok(convert_image(&image, pt)?)
        }
        _ => Ok(image),
    }
}

fn save(registry: &Registry, path: &Path, image: &ImageBuffer) -> Result<()> {
    registry
        .write(path, image)
        .with_context(|| format!("Failed to save: {}", path.display()))
}

/// Playback indices to convert, in order.
fn select_frames(source: &Info, frames: Option<&str>) -> Result<Vec<(usize, Number)>> {
    let requested = match frames {
        Some(s) => s
            .parse::<Sequence>()
            .with_context(|| format!("Invalid --frames: {s}"))?,
        None => source.sequence.clone(),
    };

    let mut wanted = Vec::new();
    for i in 0..requested.get_frame_count() {
        let frame = requested.get_frame(i);
        if source.sequence.contains(frame) {
            wanted.push((source.sequence.get_index(frame), frame));
        } else {
            warn!(frame, "Frame not in source, skipped");
        }
    }
    wanted.sort_unstable();
    wanted.dedup();
    if wanted.is_empty() {
        bail!("No frames to convert (source has {})", source.sequence);
    }
    Ok(wanted)
}

/// Output path per wanted frame.
fn output_names(output: &Path, wanted: &[(usize, Number)]) -> Result<Vec<PathBuf>> {
    let name = output.to_string_lossy();
    let pattern = if name.contains('#') || name.contains('%') {
        FileSequence::from_pattern(output)
    } else {
        FileSequence::from_path(output)
    };
    match pattern {
        Some(seq) => Ok(wanted.iter().map(|&(_, frame)| seq.path_for(frame)).collect()),
        None if wanted.len() == 1 => Ok(vec![output.to_path_buf()]),
        None => bail!(
            "Output {} needs a frame number or #### pattern for {} frames",
            output.display(),
            wanted.len()
        ),
    }
}

fn convert_sequence(
    registry: Arc<Registry>,
    input: &Path,
    source: &Info,
    wanted: &[(usize, Number)],
    names: &[PathBuf],
    target: Option<PixelType>,
    verbose: u8,
) -> Result<()> {
    let options = PlaybackOptions {
        target,
        start: wanted[0].0,
    };
    let playback = Playback::start(registry.clone(), input, options)
        .with_context(|| format!("Failed to open: {}", input.display()))?;

    for (n, (&(index, frame), path)) in wanted.iter().zip(names).enumerate() {
        let decoded = loop {
            let decoded = playback
                .recv()
                .context("Decoder stopped early")?
                .with_context(|| format!("Failed to decode frame {frame}"))?;
            if decoded.index == index {
                break decoded;
            }
            trace!(index = decoded.index, "skipping unselected frame");
        };
        let image = decoded
            .frame
            .into_video()
            .context("Decoded frame holds no image")?;
        save(&registry, path, &image)?;
        if verbose > 0 {
            println!("  {} -> {}", frame, path.display());
        }

        // Jump over gaps in the selection instead of decoding them.
        if let Some(&(next, _)) = wanted.get(n + 1) {
            if next != index + 1 {
                playback.seek(next)?;
            }
        }
    }

    debug!(frames = wanted.len(), sequence = %source.sequence, "Sequence converted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_core::Range;

    fn source(a: Number, b: Number) -> Info {
        Info {
            sequence: Sequence::from_range(Range::new(a, b)).with_pad(4),
            ..Info::default()
        }
    }

    #[test]
    fn test_select_frames() {
        let info = source(1, 10);
        let all = select_frames(&info, None).unwrap();
        assert_eq!(all.len(), 10);
        assert_eq!(all[0], (0, 1));

        let some = select_frames(&info, Some("3-4,9-12")).unwrap();
        assert_eq!(some, vec![(2, 3), (3, 4), (8, 9), (9, 10)]);

        assert!(select_frames(&info, Some("20-30")).is_err());
        assert!(select_frames(&info, Some("x")).is_err());
    }

    #[test]
    fn test_output_names() {
        let wanted = [(0, 1), (1, 2)];
        let names = output_names(Path::new("out/plate.####.exr"), &wanted).unwrap();
        assert_eq!(
            names,
            vec![PathBuf::from("out/plate.0001.exr"), PathBuf::from("out/plate.0002.exr")]
        );

        let names = output_names(Path::new("plate.0001.tif"), &wanted).unwrap();
        assert_eq!(names[1], PathBuf::from("plate.0002.tif"));

        let single = output_names(Path::new("still.png"), &wanted[..1]).unwrap();
        assert_eq!(single, vec![PathBuf::from("still.png")]);
        assert!(output_names(Path::new("still.png"), &wanted).is_err());
    }
}
