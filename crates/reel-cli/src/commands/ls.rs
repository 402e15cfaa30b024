//! Directory listing with numbered files collapsed into sequences.

use crate::LsArgs;
use anyhow::{Context, Result};
use reel_io::{ErrorKind, Registry, ScanEntry, scan_dir, scan_dir_with};
use tracing::trace;

/// Runs the ls command.
///
/// With `--long`, every entry is opened; entries that fail are reported
/// inline and the listing goes on.
pub fn run(args: LsArgs, registry: &Registry) -> Result<()> {
    trace!(dir = %args.dir.display(), long = args.long, "ls::run");
    let read_err = || format!("Failed to read directory: {}", args.dir.display());

    if !args.long {
        for entry in scan_dir(&args.dir).with_context(read_err)? {
            println!("{}", entry.name());
        }
        return Ok(());
    }

    let entries = scan_dir_with(&args.dir, registry).with_context(read_err)?;
    let width = entries.iter().map(|(e, _)| e.name().len()).max().unwrap_or(0);
    let mut failed = 0usize;
    for (entry, info) in &entries {
        let detail = match info {
            Ok(info) => {
                let frames = match entry {
                    ScanEntry::Sequence(seq) => format!("  [{} frames]", seq.frame_count()),
                    ScanEntry::File(_) => String::new(),
                };
                format!("{}{frames}", super::summary(info))
            }
            Err(e) if e.kind() == ErrorKind::UnsupportedFormat => "-".to_string(),
            Err(e) => {
                failed += 1;
                format!("error: {e}")
            }
        };
        println!("{:<width$}  {detail}", entry.name());
    }
    if failed > 0 {
        eprintln!("{failed} entries could not be read");
    }
    Ok(())
}
