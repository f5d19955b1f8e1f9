//! Validate command: pre-flight check without decoding.

use crate::ValidateArgs;
use anyhow::{bail, Context, Result};
use std::fs;

use rawstack_core::{Compression, SourceLocation};
use rawstack_io::{is_gzip_name, validate};

/// Runs the validate command.
///
/// Local files are checked against their length; gzip files and remote
/// sources only get the size and offset checks.
pub fn run(args: ValidateArgs, verbose: bool) -> Result<()> {
    let desc = super::build_descriptor(&args.source)?;
    let mut options = super::decode_options(&args.source, true)?;
    options.validation_threshold = args.threshold;

    let probed_length = match (&desc.source, desc.resolved_path()) {
        (SourceLocation::Directory(_), Some(path)) if !is_gzip_name(&desc.file_name) => {
            let meta = fs::metadata(&path)
                .with_context(|| format!("Failed to stat: {}", path.display()))?;
            Some(meta.len())
        }
        _ => None,
    };

    let mut checked = desc.clone();
    if is_gzip_name(&desc.file_name) {
        checked.compression = Compression::Unknown;
    }
    if let Err(err) = validate(&checked, probed_length, &options) {
        bail!("{}", err);
    }

    println!("{}: OK", desc.file_name);
    if verbose {
        let frames = desc.frame_bytes().saturating_mul(desc.number_of_images as u64);
        println!("  Expected:   {}", super::format_size(frames));
        if let Some(len) = probed_length {
            println!("  File size:  {}", super::format_size(len));
        }
    }
    Ok(())
}
