//! Info command: decode an image or stack and describe it.

use crate::InfoArgs;
use anyhow::{bail, Result};
use std::io::Write;
use tracing::debug;

use rawstack_core::{ColorModelSpec, Completeness, DecodedImage, FileDescriptor, PixelBuffer};
use rawstack_io::{DecodeObserver, FileOpener, ValidationError};

/// Prints progress on stderr and validation diagnostics in full.
struct ConsoleObserver;

impl DecodeObserver for ConsoleObserver {
    fn show_progress(&self, done: u32, total: u32) {
        let mut err = std::io::stderr();
        let _ = write!(err, "\rReading: {}/{}", done, total);
        if done == total {
            let _ = writeln!(err);
        }
        let _ = err.flush();
    }

    fn validation_failed(&self, error: &ValidationError) {
        eprintln!("{}", error);
    }
}

/// Runs the info command.
pub fn run(args: InfoArgs, verbose: bool) -> Result<()> {
    let desc = super::build_descriptor(&args.source)?;
    let options = super::decode_options(&args.source, args.quiet)?;
    debug!(source = %source_label(&desc), encoding = %desc.encoding, images = desc.number_of_images, "opening");

    let observer = ConsoleObserver;
    let Some(image) = FileOpener::new(&options).with_observer(&observer).open(&desc)? else {
        bail!("Nothing decoded from {}", source_label(&desc));
    };

    print_text(&args, &desc, &image, verbose);
    Ok(())
}

fn source_label(desc: &FileDescriptor) -> String {
    desc.resolved_url()
        .or_else(|| desc.resolved_path().map(|p| p.display().to_string()))
        .unwrap_or_else(|| desc.file_name.clone())
}

fn print_text(args: &InfoArgs, desc: &FileDescriptor, image: &DecodedImage, verbose: bool) {
    let cal = &image.calibration;

    println!("{}", image.name);
    println!("  Resolution: {}x{}", image.width, image.height);
    println!("  Encoding:   {}", image.encoding);
    println!("  Bit depth:  {}", image.bit_depth());
    match image.completeness {
        Completeness::Complete => println!("  Frames:     {}", image.frame_count()),
        Completeness::Partial { requested, reason } => println!(
            "  Frames:     {} of {} ({:?})",
            image.frame_count(),
            requested,
            reason
        ),
    }
    if !image.channel_labels.is_empty() {
        println!("  Channels:   {}", image.channel_labels.join(", "));
    }
    let frame_size = desc.frame_bytes();
    println!("  Frame size: {}", super::format_size(frame_size));

    if cal.is_scaled() {
        println!(
            "  Pixel size: {} x {} x {} {}",
            cal.pixel_width, cal.pixel_height, cal.pixel_depth, cal.unit
        );
    }
    if let Some((lo, hi)) = cal.display_range {
        println!("  Display:    {} - {}", lo, hi);
    }
    if let Some(intensity) = &cal.intensity {
        println!(
            "  Values:     {:?} {:?} ({})",
            intensity.function, intensity.coefficients, intensity.value_unit
        );
    }

    if verbose || args.all {
        println!("  Byte order: {:?}", desc.byte_order);
        println!("  Compression: {}", desc.compression);
        println!("  Offset:     {}", desc.header_offset);
        match &image.color_model {
            ColorModelSpec::Indexed(lut) => println!("  Palette:    {} entries", lut.len()),
            ColorModelSpec::Grayscale { inverted } => {
                println!("  Palette:    gray{}", if *inverted { " (inverted)" } else { "" })
            }
        }
    }

    if args.all {
        println!("  Origin:     {}, {}, {}", cal.x_origin, cal.y_origin, cal.z_origin);
        println!("  Units:      {} / {} / {}", cal.unit, cal.y_unit(), cal.z_unit());
        if cal.frame_interval != 0.0 {
            println!("  Interval:   {} {}", cal.frame_interval, cal.time_unit);
        }
        if cal.fps != 0.0 {
            println!("  FPS:        {}{}", cal.fps, if cal.loop_playback { " (loop)" } else { "" });
        }
        let dims = cal.dimensions;
        if dims.product() > 1 {
            println!(
                "  Hyperstack: c={} z={} t={}{}",
                dims.channels,
                dims.slices,
                dims.frames,
                if cal.hyperstack { "" } else { " (not marked)" }
            );
        }
        if let Some(mode) = cal.composite_mode {
            println!("  Mode:       {:?}", mode);
        }
        if let Some(info) = cal.info.as_ref().or(image.info.as_ref()) {
            println!("  Info:       {}", info);
        }
    }

    if args.stats || args.all {
        let (min, max, mean) = compute_stats(image);
        println!("  Min value:  {:.6}", min);
        println!("  Max value:  {:.6}", max);
        println!("  Avg value:  {:.6}", mean);
    }

    if args.frames {
        for (idx, frame) in image.frames.iter().enumerate() {
            let range = frame
                .data
                .sample_range()
                .map(|(lo, hi)| format!("{} - {}", lo, hi))
                .unwrap_or_default();
            println!(
                "    [{}] {} {}",
                idx,
                frame.label.as_deref().unwrap_or("-"),
                range
            );
        }
    }
}

/// Min, max and mean over every sample of every frame.
///
/// RGB pixels contribute their three channels.
fn compute_stats(image: &DecodedImage) -> (f64, f64, f64) {
    let mut min = f64::MAX;
    let mut max = f64::MIN;
    let mut sum = 0.0f64;
    let mut count = 0u64;

    let mut add = |v: f64| {
        min = min.min(v);
        max = max.max(v);
        sum += v;
        count += 1;
    };
    for plane in image.frames.iter().flat_map(|f| f.data.planes()) {
        match plane {
            PixelBuffer::Byte(v) => v.iter().for_each(|&s| add(s as f64)),
            PixelBuffer::Short(v) => v.iter().for_each(|&s| add(s as f64)),
            PixelBuffer::Float(v) => v.iter().filter(|s| !s.is_nan()).for_each(|&s| add(s as f64)),
            PixelBuffer::Rgb(v) => v.iter().for_each(|&p| {
                add(((p >> 16) & 0xff) as f64);
                add(((p >> 8) & 0xff) as f64);
                add((p & 0xff) as f64);
            }),
        }
    }

    if count == 0 {
        (0.0, 0.0, 0.0)
    } else {
        (min, max, sum / count as f64)
    }
}
